//! MAVLink mission protocol endpoint
//!
//! Implements the vehicle side of the MAVLink mission microservice for one
//! transport channel:
//!
//! - **Manager**: transfer state machine, message dispatch, persistence
//!   adaptation, progress broadcasting
//! - **Wire / Codec**: dual-encoding (float/int) item translation
//! - **Status**: STATUSTEXT construction for operator-visible outcomes
//!
//! The host delivers decoded [`mavlink::common::MavMessage`]s to
//! [`manager::MissionManager::handle_message`] and calls
//! [`manager::MissionManager::tick`] periodically; both return bounded
//! batches of outbound messages.

pub mod codec;
pub mod manager;
pub mod rate_limiter;
pub mod status;
pub mod wire;

pub use manager::{MissionManager, MissionParams, Responses};
pub use wire::{Encoding, WireCoords, WireItem};

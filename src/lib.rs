#![cfg_attr(not(test), no_std)]

//! mission_link - MAVLink mission microservice endpoint for small autopilots
//!
//! This library implements the vehicle side of the MAVLink mission protocol:
//! upload and download of flight missions, geofence boundaries and rally/safe
//! points, plus continuous mission progress broadcasting.
//!
//! # Architecture
//!
//! - [`communication`]: MAVLink protocol endpoint (state machine, item codec,
//!   progress publisher)
//! - [`mission`]: Mission data model and process-wide registry
//! - [`storage`]: Persistent key/value store boundary ("dataman") and slot
//!   layout
//! - [`pubsub`]: Navigator-facing publish/subscribe boundary
//! - [`core`]: Logging and synchronized-state abstractions
//!
//! # Concurrency model
//!
//! The protocol core is single-threaded cooperative: the host task loop
//! delivers inbound messages and calls `tick(now_us)` periodically. All
//! outbound traffic is returned as bounded message batches; nothing blocks
//! except the injected storage backend. State shared between endpoints on
//! different transport channels lives in [`mission::MissionRegistry`] behind
//! the [`core::traits::SharedState`] abstraction.

pub mod communication;
pub mod core;
pub mod mission;
pub mod pubsub;
pub mod storage;

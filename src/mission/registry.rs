//! Process-wide mission registry
//!
//! One vehicle can expose the mission protocol on several transport channels
//! at once (serial GCS link, WiFi telemetry, companion computer). The item
//! stores, counts and the upload-exclusion flag are properties of the
//! vehicle, not of a single channel, so they live here and every endpoint
//! accesses them through [`crate::core::traits::SharedState`].
//!
//! Everything else (transfer cursor, partner identity, encoding mode,
//! timers) is per-endpoint state owned by the manager.

use super::{DatamanId, MissionHeader, MissionKind};

/// State shared by all mission protocol endpoints of the process.
#[derive(Debug, Clone, Copy)]
pub struct MissionRegistry {
    /// Which mission buffer is active
    pub dataman_id: DatamanId,
    /// Item count of the active flight mission
    pub mission_count: u16,
    /// Stored geofence point count
    pub fence_count: u16,
    /// Stored rally point count
    pub rally_count: u16,
    /// Current mission item, -1 if none
    pub current_seq: i32,
    /// Last reached mission item, -1 if none
    pub last_reached: i32,
    /// An upload is streaming into the inactive buffer somewhere
    pub transfer_in_progress: bool,
    /// Bumped on every successful fence write
    pub fence_update_counter: u16,
    /// Startup load from dataman has run
    pub loaded: bool,
}

impl Default for MissionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MissionRegistry {
    /// Empty registry; `loaded` is false until an endpoint runs the startup
    /// load.
    pub const fn new() -> Self {
        Self {
            dataman_id: DatamanId::Zero,
            mission_count: 0,
            fence_count: 0,
            rally_count: 0,
            current_seq: 0,
            last_reached: -1,
            transfer_in_progress: false,
            fence_update_counter: 0,
            loaded: false,
        }
    }

    /// Stored item count for a list kind. `All` has no list of its own.
    pub fn count(&self, kind: MissionKind) -> u16 {
        match kind {
            MissionKind::Mission => self.mission_count,
            MissionKind::Fence => self.fence_count,
            MissionKind::Rally => self.rally_count,
            MissionKind::All => 0,
        }
    }

    /// Set the stored item count for a list kind.
    pub fn set_count(&mut self, kind: MissionKind, count: u16) {
        match kind {
            MissionKind::Mission => self.mission_count = count,
            MissionKind::Fence => self.fence_count = count,
            MissionKind::Rally => self.rally_count = count,
            MissionKind::All => {}
        }
    }

    /// Apply a committed mission header (upload completion, set-current,
    /// clear).
    pub fn apply_mission_header(&mut self, header: &MissionHeader) {
        self.dataman_id = header.dataman_id;
        self.mission_count = header.count;
        self.current_seq = header.current_seq;
    }

    /// The active mission header as currently known.
    pub fn mission_header(&self) -> MissionHeader {
        MissionHeader {
            dataman_id: self.dataman_id,
            count: self.mission_count,
            current_seq: self.current_seq,
        }
    }
}

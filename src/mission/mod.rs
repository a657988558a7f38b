//! Mission data model
//!
//! Types shared by the protocol endpoint, the storage layout and the
//! navigator boundary: the three transferable list kinds, the
//! double-buffer id for the mission store, and the two small persisted
//! headers (mission state, fence/rally stats).

pub mod item;
pub mod registry;

pub use item::{FencePoint, ItemOrigin, MissionItem, SafePoint};
pub use registry::MissionRegistry;

use mavlink::common::MavMissionType;

/// Maximum number of items in a flight mission (per buffer).
pub const MAX_MISSION_ITEMS: u16 = 2000;

/// Maximum number of geofence points (slot 0 of the namespace holds stats).
pub const MAX_FENCE_POINTS: u16 = 63;

/// Maximum number of rally/safe points (slot 0 of the namespace holds stats).
pub const MAX_SAFE_POINTS: u16 = 7;

/// Which of the three ordered lists a transfer or query refers to.
///
/// `All` is only valid for clear-all requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionKind {
    /// Flight mission (waypoints, loiter, takeoff/land, DO_* actions)
    Mission,
    /// Geofence boundary (polygon vertices, circles, return point)
    Fence,
    /// Rally/safe points
    Rally,
    /// All three lists; clear-all only
    All,
}

impl MissionKind {
    /// Map a wire mission type to a list kind.
    pub fn from_wire(mission_type: MavMissionType) -> Self {
        match mission_type {
            MavMissionType::MAV_MISSION_TYPE_MISSION => MissionKind::Mission,
            MavMissionType::MAV_MISSION_TYPE_FENCE => MissionKind::Fence,
            MavMissionType::MAV_MISSION_TYPE_RALLY => MissionKind::Rally,
            MavMissionType::MAV_MISSION_TYPE_ALL => MissionKind::All,
        }
    }

    /// Wire representation of this kind.
    pub fn to_wire(self) -> MavMissionType {
        match self {
            MissionKind::Mission => MavMissionType::MAV_MISSION_TYPE_MISSION,
            MissionKind::Fence => MavMissionType::MAV_MISSION_TYPE_FENCE,
            MissionKind::Rally => MavMissionType::MAV_MISSION_TYPE_RALLY,
            MissionKind::All => MavMissionType::MAV_MISSION_TYPE_ALL,
        }
    }

    /// Capacity of the backing store for this kind.
    ///
    /// `All` has no store of its own and reports 0.
    pub fn max_item_count(self) -> u16 {
        match self {
            MissionKind::Mission => MAX_MISSION_ITEMS,
            MissionKind::Fence => MAX_FENCE_POINTS,
            MissionKind::Rally => MAX_SAFE_POINTS,
            MissionKind::All => 0,
        }
    }
}

/// Identity of one of the two mission buffers in the dataman store.
///
/// Uploads always stream into the inactive buffer; the active id only flips
/// once the upload has committed, so the navigator reads either the complete
/// old list or the complete new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DatamanId {
    #[default]
    Zero,
    One,
}

impl DatamanId {
    /// The other buffer.
    pub fn other(self) -> Self {
        match self {
            DatamanId::Zero => DatamanId::One,
            DatamanId::One => DatamanId::Zero,
        }
    }

    /// Numeric form used in the persisted mission header.
    pub fn as_u8(self) -> u8 {
        match self {
            DatamanId::Zero => 0,
            DatamanId::One => 1,
        }
    }

    /// Parse the persisted numeric form.
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(DatamanId::Zero),
            1 => Some(DatamanId::One),
            _ => None,
        }
    }
}

/// Persisted mission state header.
///
/// Written whenever an upload completes or the current item changes; the
/// same record is published to the navigator so it can reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MissionHeader {
    /// Which buffer holds the active mission
    pub dataman_id: DatamanId,
    /// Number of items in the active mission
    pub count: u16,
    /// Current item, or -1 if the upload marked none as current
    pub current_seq: i32,
}

/// Persisted per-namespace stats for fence and rally stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsEntry {
    /// Number of stored points
    pub num_items: u16,
    /// Bumped on every fence rewrite so consumers reload
    pub update_counter: u16,
}

//! Mission item records
//!
//! Internal representation of a single list entry, as handed to the
//! navigator through the dataman store. The wide [`MissionItem`] carries the
//! decoded union of all command-specific fields; fence and rally points use
//! the narrower per-slot records.

use bitflags::bitflags;
use mavlink::common::{MavCmd, MavFrame};

/// Where an item record originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemOrigin {
    /// Received over the MAVLink mission protocol
    #[default]
    Mavlink,
    /// Generated on the vehicle (e.g. by the navigator itself)
    Onboard,
}

impl ItemOrigin {
    pub fn as_u8(self) -> u8 {
        match self {
            ItemOrigin::Mavlink => 0,
            ItemOrigin::Onboard => 1,
        }
    }

    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(ItemOrigin::Mavlink),
            1 => Some(ItemOrigin::Onboard),
            _ => None,
        }
    }
}

bitflags! {
    /// Boolean item fields packed into one byte for the persisted record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ItemFlags: u8 {
        /// Altitude is relative to home rather than AMSL
        const ALT_RELATIVE = 0b0000_0001;
        /// Continue to the next item without operator input
        const AUTOCONTINUE = 0b0000_0010;
        /// Exit loiter tangentially to the next waypoint course
        const LOITER_EXIT_XTRACK = 0b0000_0100;
        /// Enforce the given heading while loitering
        const FORCE_HEADING = 0b0000_1000;
    }
}

/// A single mission item in internal form.
///
/// The wire codec populates the command-specific fields named by the
/// protocol mapping; everything else stays at its default. `params` is only
/// meaningful for non-geographic items (`frame == MAV_FRAME_MISSION`), where
/// it carries the seven raw wire parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MissionItem {
    /// Navigation command
    pub nav_cmd: MavCmd,
    /// Coordinate frame the item was received in
    pub frame: MavFrame,
    /// Latitude (degrees)
    pub lat: f64,
    /// Longitude (degrees)
    pub lon: f64,
    /// Altitude (metres)
    pub altitude: f32,
    /// Altitude is relative to home
    pub altitude_is_relative: bool,
    /// Hold time inside the acceptance radius (seconds)
    pub time_inside: f32,
    /// Acceptance radius (metres)
    pub acceptance_radius: f32,
    /// Loiter radius (metres, sign selects direction)
    pub loiter_radius: f32,
    /// Exit loiter on the crosstrack course to the next item
    pub loiter_exit_xtrack: bool,
    /// Enforce heading while loitering to altitude
    pub force_heading: bool,
    /// Minimum pitch during takeoff (degrees)
    pub pitch_min: f32,
    /// Yaw (radians, wrapped to (-pi, pi])
    pub yaw: f32,
    /// Polygon vertex count (fence polygon commands)
    pub vertex_count: u16,
    /// Circle radius (fence circle commands, metres)
    pub circle_radius: f32,
    /// Jump target item index (DO_JUMP)
    pub do_jump_mission_index: u16,
    /// Number of times to take the jump (DO_JUMP)
    pub do_jump_repeat_count: u16,
    /// Jumps already taken; maintained by the navigator
    pub do_jump_current_count: u16,
    /// Continue to the next item automatically
    pub autocontinue: bool,
    /// Source of this record
    pub origin: ItemOrigin,
    /// Raw wire parameters for non-geographic items
    pub params: [f32; 7],
}

impl Default for MissionItem {
    fn default() -> Self {
        Self {
            nav_cmd: MavCmd::MAV_CMD_NAV_WAYPOINT,
            frame: MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT,
            lat: 0.0,
            lon: 0.0,
            altitude: 0.0,
            altitude_is_relative: false,
            time_inside: 0.0,
            acceptance_radius: 0.0,
            loiter_radius: 0.0,
            loiter_exit_xtrack: false,
            force_heading: false,
            pitch_min: 0.0,
            yaw: 0.0,
            vertex_count: 0,
            circle_radius: 0.0,
            do_jump_mission_index: 0,
            do_jump_repeat_count: 0,
            do_jump_current_count: 0,
            autocontinue: true,
            origin: ItemOrigin::Mavlink,
            params: [0.0; 7],
        }
    }
}

impl MissionItem {
    /// Pack the boolean fields for persistence.
    pub fn flags(&self) -> ItemFlags {
        let mut flags = ItemFlags::empty();
        flags.set(ItemFlags::ALT_RELATIVE, self.altitude_is_relative);
        flags.set(ItemFlags::AUTOCONTINUE, self.autocontinue);
        flags.set(ItemFlags::LOITER_EXIT_XTRACK, self.loiter_exit_xtrack);
        flags.set(ItemFlags::FORCE_HEADING, self.force_heading);
        flags
    }

    /// Restore the boolean fields from a persisted flag byte.
    pub fn apply_flags(&mut self, flags: ItemFlags) {
        self.altitude_is_relative = flags.contains(ItemFlags::ALT_RELATIVE);
        self.autocontinue = flags.contains(ItemFlags::AUTOCONTINUE);
        self.loiter_exit_xtrack = flags.contains(ItemFlags::LOITER_EXIT_XTRACK);
        self.force_heading = flags.contains(ItemFlags::FORCE_HEADING);
    }
}

/// A geofence point as stored per slot.
///
/// Polygon vertex commands carry `vertex_count`; circle commands carry
/// `circle_radius`; the return point carries neither.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FencePoint {
    pub nav_cmd: MavCmd,
    pub frame: MavFrame,
    pub lat: f64,
    pub lon: f64,
    pub alt: f32,
    pub vertex_count: u16,
    pub circle_radius: f32,
}

impl FencePoint {
    /// Build the stored fence record from a decoded mission item.
    pub fn from_item(item: &MissionItem) -> Self {
        Self {
            nav_cmd: item.nav_cmd,
            frame: item.frame,
            lat: item.lat,
            lon: item.lon,
            alt: item.altitude,
            vertex_count: item.vertex_count,
            circle_radius: item.circle_radius,
        }
    }

    /// View the stored record as a mission item for the wire codec.
    pub fn to_item(&self) -> MissionItem {
        MissionItem {
            nav_cmd: self.nav_cmd,
            frame: self.frame,
            lat: self.lat,
            lon: self.lon,
            altitude: self.alt,
            vertex_count: self.vertex_count,
            circle_radius: self.circle_radius,
            ..MissionItem::default()
        }
    }
}

/// A rally/safe point as stored per slot. The command is implicit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafePoint {
    pub frame: MavFrame,
    pub lat: f64,
    pub lon: f64,
    pub alt: f32,
}

impl SafePoint {
    pub fn from_item(item: &MissionItem) -> Self {
        Self {
            frame: item.frame,
            lat: item.lat,
            lon: item.lon,
            alt: item.altitude,
        }
    }

    pub fn to_item(&self) -> MissionItem {
        MissionItem {
            nav_cmd: MavCmd::MAV_CMD_NAV_RALLY_POINT,
            frame: self.frame,
            lat: self.lat,
            lon: self.lon,
            altitude: self.alt,
            ..MissionItem::default()
        }
    }
}

//! Wire-level view of mission items
//!
//! MISSION_ITEM and MISSION_ITEM_INT are semantically one message whose
//! coordinate fields differ in representation: float degrees versus degrees
//! scaled by 1e7 as integers. Both decode into [`WireItem`] with the
//! representation captured in [`WireCoords`], so the item codec has a single
//! code path and no type punning.

use mavlink::common::{
    MavCmd, MavFrame, MavMissionType, MISSION_ITEM_DATA, MISSION_ITEM_INT_DATA,
};

/// Coordinate scale factor of the int variant (degrees × 1e7).
pub const INT_COORD_SCALE: f64 = 1e7;

/// Which protocol variant the endpoint currently speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// MISSION_ITEM / MISSION_REQUEST (float degrees)
    #[default]
    Float,
    /// MISSION_ITEM_INT / MISSION_REQUEST_INT (scaled integer degrees)
    Int,
}

impl Encoding {
    /// The other variant; used when a partner rejects the current one.
    pub fn flipped(self) -> Self {
        match self {
            Encoding::Float => Encoding::Int,
            Encoding::Int => Encoding::Float,
        }
    }
}

/// Coordinate pair as it appeared on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WireCoords {
    Float { x: f32, y: f32 },
    Int { x: i32, y: i32 },
}

impl WireCoords {
    /// The encoding this pair arrived in.
    pub fn encoding(&self) -> Encoding {
        match self {
            WireCoords::Float { .. } => Encoding::Float,
            WireCoords::Int { .. } => Encoding::Int,
        }
    }

    /// Latitude in degrees.
    pub fn lat_deg(&self) -> f64 {
        match *self {
            WireCoords::Float { x, .. } => x as f64,
            WireCoords::Int { x, .. } => x as f64 / INT_COORD_SCALE,
        }
    }

    /// Longitude in degrees.
    pub fn lon_deg(&self) -> f64 {
        match *self {
            WireCoords::Float { y, .. } => y as f64,
            WireCoords::Int { y, .. } => y as f64 / INT_COORD_SCALE,
        }
    }

    /// The x field as a plain parameter value (MAV_FRAME_MISSION items carry
    /// params, not coordinates, in these fields).
    pub fn param_x(&self) -> f32 {
        match *self {
            WireCoords::Float { x, .. } => x,
            WireCoords::Int { x, .. } => x as f32,
        }
    }

    /// The y field as a plain parameter value.
    pub fn param_y(&self) -> f32 {
        match *self {
            WireCoords::Float { y, .. } => y,
            WireCoords::Int { y, .. } => y as f32,
        }
    }
}

/// One decoded mission item message, either wire variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WireItem {
    pub seq: u16,
    pub frame: MavFrame,
    pub command: MavCmd,
    pub current: bool,
    pub autocontinue: bool,
    pub mission_type: MavMissionType,
    pub param1: f32,
    pub param2: f32,
    pub param3: f32,
    pub param4: f32,
    pub coords: WireCoords,
    pub z: f32,
}

impl From<&MISSION_ITEM_DATA> for WireItem {
    fn from(data: &MISSION_ITEM_DATA) -> Self {
        Self {
            seq: data.seq,
            frame: data.frame,
            command: data.command,
            current: data.current != 0,
            autocontinue: data.autocontinue != 0,
            mission_type: data.mission_type,
            param1: data.param1,
            param2: data.param2,
            param3: data.param3,
            param4: data.param4,
            coords: WireCoords::Float {
                x: data.x,
                y: data.y,
            },
            z: data.z,
        }
    }
}

impl From<&MISSION_ITEM_INT_DATA> for WireItem {
    fn from(data: &MISSION_ITEM_INT_DATA) -> Self {
        Self {
            seq: data.seq,
            frame: data.frame,
            command: data.command,
            current: data.current != 0,
            autocontinue: data.autocontinue != 0,
            mission_type: data.mission_type,
            param1: data.param1,
            param2: data.param2,
            param3: data.param3,
            param4: data.param4,
            coords: WireCoords::Int {
                x: data.x,
                y: data.y,
            },
            z: data.z,
        }
    }
}

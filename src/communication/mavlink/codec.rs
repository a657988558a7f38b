//! Mission item codec
//!
//! Bidirectional mapping between the wire item ([`WireItem`]) and the
//! internal [`MissionItem`] record, keyed by frame first and command second.
//!
//! Geographic frames (`GLOBAL`, `GLOBAL_RELATIVE_ALT` and their `_INT`
//! variants) map `param1..param4` into named fields per command;
//! `MAV_FRAME_MISSION` items carry their seven wire parameters opaquely,
//! with `DO_JUMP` additionally extracting its jump fields. Yaw crosses the
//! wire in degrees and is stored in radians wrapped to (-pi, pi].
//!
//! The codec never retries and never touches transfer state; failures are
//! reported as the `MavMissionResult` the caller acks with.

use super::wire::{Encoding, WireItem, INT_COORD_SCALE};
use crate::mission::item::{ItemOrigin, MissionItem};
use mavlink::common::{
    MavCmd, MavFrame, MavMessage, MavMissionResult, MavMissionType, MISSION_ITEM_DATA,
    MISSION_ITEM_INT_DATA,
};

const DEG_TO_RAD: f32 = core::f32::consts::PI / 180.0;
const RAD_TO_DEG: f32 = 180.0 / core::f32::consts::PI;

/// Wrap an angle in radians to (-pi, pi].
pub fn wrap_pi(mut angle: f32) -> f32 {
    use core::f32::consts::PI;

    if !angle.is_finite() {
        return angle;
    }

    while angle > PI {
        angle -= 2.0 * PI;
    }
    while angle <= -PI {
        angle += 2.0 * PI;
    }
    angle
}

fn yaw_from_wire(param4: f32) -> f32 {
    wrap_pi(param4 * DEG_TO_RAD)
}

fn is_geographic(frame: MavFrame) -> bool {
    matches!(
        frame,
        MavFrame::MAV_FRAME_GLOBAL
            | MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT
            | MavFrame::MAV_FRAME_GLOBAL_INT
            | MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT_INT
    )
}

fn is_int_frame(frame: MavFrame) -> bool {
    matches!(
        frame,
        MavFrame::MAV_FRAME_GLOBAL_INT | MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT_INT
    )
}

/// Translate a received wire item into the internal record.
///
/// Fails with the `MavMissionResult` the transfer should be acked with:
/// `UNSUPPORTED` for a command outside the supported set,
/// `UNSUPPORTED_FRAME` for a frame outside the supported set or an int
/// frame arriving in a float-encoded message.
pub fn item_from_wire(wire: &WireItem) -> Result<MissionItem, MavMissionResult> {
    if is_geographic(wire.frame) {
        // An int frame in a float message would force reinterpreting
        // coordinate fields; reject instead of guessing.
        if is_int_frame(wire.frame) && wire.coords.encoding() == Encoding::Float {
            return Err(MavMissionResult::MAV_MISSION_UNSUPPORTED_FRAME);
        }

        let mut item = MissionItem {
            nav_cmd: wire.command,
            frame: wire.frame,
            lat: wire.coords.lat_deg(),
            lon: wire.coords.lon_deg(),
            altitude: wire.z,
            altitude_is_relative: matches!(
                wire.frame,
                MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT
                    | MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT_INT
            ),
            autocontinue: wire.autocontinue,
            origin: ItemOrigin::Mavlink,
            ..MissionItem::default()
        };

        match wire.command {
            MavCmd::MAV_CMD_NAV_WAYPOINT => {
                item.time_inside = wire.param1;
                item.acceptance_radius = wire.param2;
                item.yaw = yaw_from_wire(wire.param4);
            }

            MavCmd::MAV_CMD_NAV_LOITER_UNLIM => {
                item.loiter_radius = wire.param3;
                item.yaw = yaw_from_wire(wire.param4);
            }

            MavCmd::MAV_CMD_NAV_LOITER_TIME => {
                item.time_inside = wire.param1;
                item.loiter_radius = wire.param3;
                item.loiter_exit_xtrack = wire.param4 > 0.0;
            }

            MavCmd::MAV_CMD_NAV_LAND => {
                // param1 (abort altitude) has no internal field yet
                item.yaw = yaw_from_wire(wire.param4);
            }

            MavCmd::MAV_CMD_NAV_TAKEOFF => {
                item.pitch_min = wire.param1;
                item.yaw = yaw_from_wire(wire.param4);
            }

            MavCmd::MAV_CMD_NAV_LOITER_TO_ALT => {
                item.force_heading = wire.param1 > 0.0;
                item.loiter_radius = wire.param2;
                item.loiter_exit_xtrack = wire.param4 > 0.0;
            }

            MavCmd::MAV_CMD_NAV_VTOL_TAKEOFF | MavCmd::MAV_CMD_NAV_VTOL_LAND => {
                item.yaw = yaw_from_wire(wire.param4);
            }

            MavCmd::MAV_CMD_NAV_FENCE_RETURN_POINT => {}

            MavCmd::MAV_CMD_NAV_FENCE_POLYGON_VERTEX_INCLUSION
            | MavCmd::MAV_CMD_NAV_FENCE_POLYGON_VERTEX_EXCLUSION => {
                item.vertex_count = (wire.param1 + 0.5) as u16;
            }

            MavCmd::MAV_CMD_NAV_FENCE_CIRCLE_INCLUSION
            | MavCmd::MAV_CMD_NAV_FENCE_CIRCLE_EXCLUSION => {
                item.circle_radius = wire.param1;
            }

            MavCmd::MAV_CMD_NAV_RALLY_POINT => {}

            _ => return Err(MavMissionResult::MAV_MISSION_UNSUPPORTED),
        }

        Ok(item)
    } else if wire.frame == MavFrame::MAV_FRAME_MISSION {
        // Item without coordinates; the seven wire fields travel as params
        let mut item = MissionItem {
            nav_cmd: wire.command,
            frame: MavFrame::MAV_FRAME_MISSION,
            autocontinue: wire.autocontinue,
            origin: ItemOrigin::Mavlink,
            params: [
                wire.param1,
                wire.param2,
                wire.param3,
                wire.param4,
                wire.coords.param_x(),
                wire.coords.param_y(),
                wire.z,
            ],
            ..MissionItem::default()
        };

        match wire.command {
            MavCmd::MAV_CMD_DO_JUMP => {
                item.do_jump_mission_index = wire.param1 as u16;
                item.do_jump_current_count = 0;
                item.do_jump_repeat_count = wire.param2 as u16;
            }

            MavCmd::MAV_CMD_DO_CHANGE_SPEED
            | MavCmd::MAV_CMD_DO_SET_SERVO
            | MavCmd::MAV_CMD_DO_LAND_START
            | MavCmd::MAV_CMD_DO_TRIGGER_CONTROL
            | MavCmd::MAV_CMD_DO_DIGICAM_CONTROL
            | MavCmd::MAV_CMD_DO_MOUNT_CONFIGURE
            | MavCmd::MAV_CMD_DO_MOUNT_CONTROL
            | MavCmd::MAV_CMD_IMAGE_START_CAPTURE
            | MavCmd::MAV_CMD_IMAGE_STOP_CAPTURE
            | MavCmd::MAV_CMD_VIDEO_START_CAPTURE
            | MavCmd::MAV_CMD_VIDEO_STOP_CAPTURE
            | MavCmd::MAV_CMD_DO_SET_ROI
            | MavCmd::MAV_CMD_NAV_ROI
            | MavCmd::MAV_CMD_DO_SET_CAM_TRIGG_DIST
            | MavCmd::MAV_CMD_DO_SET_CAM_TRIGG_INTERVAL
            | MavCmd::MAV_CMD_SET_CAMERA_MODE
            | MavCmd::MAV_CMD_DO_VTOL_TRANSITION
            | MavCmd::MAV_CMD_NAV_DELAY
            | MavCmd::MAV_CMD_NAV_RETURN_TO_LAUNCH => {}

            _ => return Err(MavMissionResult::MAV_MISSION_UNSUPPORTED),
        }

        Ok(item)
    } else {
        Err(MavMissionResult::MAV_MISSION_UNSUPPORTED_FRAME)
    }
}

/// Translate an internal record into the outbound wire message.
///
/// The emitted frame follows the requested encoding and the item's relative
/// altitude flag for geographic items; `MAV_FRAME_MISSION` items replay
/// their stored params (with DO_JUMP fields refreshed, so the GCS sees the
/// live remaining count). Fails with a generic error for commands the
/// mapping does not cover; nothing is emitted in that case.
#[allow(clippy::too_many_arguments)]
pub fn item_to_wire(
    item: &MissionItem,
    seq: u16,
    current: bool,
    encoding: Encoding,
    target_system: u8,
    target_component: u8,
    mission_type: MavMissionType,
) -> Result<MavMessage, MavMissionResult> {
    let mut param1 = 0.0f32;
    let mut param2 = 0.0f32;
    let mut param3 = 0.0f32;
    let mut param4 = 0.0f32;
    let frame;
    let x_deg: f64;
    let y_deg: f64;
    let z: f32;

    if item.frame == MavFrame::MAV_FRAME_MISSION {
        param1 = item.params[0];
        param2 = item.params[1];
        param3 = item.params[2];
        param4 = item.params[3];

        match item.nav_cmd {
            MavCmd::MAV_CMD_DO_JUMP => {
                param1 = item.do_jump_mission_index as f32;
                param2 = item.do_jump_repeat_count as f32;
            }

            MavCmd::MAV_CMD_DO_CHANGE_SPEED
            | MavCmd::MAV_CMD_DO_SET_SERVO
            | MavCmd::MAV_CMD_DO_LAND_START
            | MavCmd::MAV_CMD_DO_TRIGGER_CONTROL
            | MavCmd::MAV_CMD_DO_DIGICAM_CONTROL
            | MavCmd::MAV_CMD_DO_MOUNT_CONFIGURE
            | MavCmd::MAV_CMD_DO_MOUNT_CONTROL
            | MavCmd::MAV_CMD_IMAGE_START_CAPTURE
            | MavCmd::MAV_CMD_IMAGE_STOP_CAPTURE
            | MavCmd::MAV_CMD_VIDEO_START_CAPTURE
            | MavCmd::MAV_CMD_VIDEO_STOP_CAPTURE
            | MavCmd::MAV_CMD_DO_SET_ROI
            | MavCmd::MAV_CMD_NAV_ROI
            | MavCmd::MAV_CMD_DO_SET_CAM_TRIGG_DIST
            | MavCmd::MAV_CMD_DO_SET_CAM_TRIGG_INTERVAL
            | MavCmd::MAV_CMD_SET_CAMERA_MODE
            | MavCmd::MAV_CMD_DO_VTOL_TRANSITION
            | MavCmd::MAV_CMD_NAV_DELAY
            | MavCmd::MAV_CMD_NAV_RETURN_TO_LAUNCH => {}

            _ => return Err(MavMissionResult::MAV_MISSION_ERROR),
        }

        frame = MavFrame::MAV_FRAME_MISSION;
        x_deg = item.params[4] as f64;
        y_deg = item.params[5] as f64;
        z = item.params[6];
    } else {
        match item.nav_cmd {
            MavCmd::MAV_CMD_NAV_WAYPOINT => {
                param1 = item.time_inside;
                param2 = item.acceptance_radius;
                param4 = item.yaw * RAD_TO_DEG;
            }

            MavCmd::MAV_CMD_NAV_LOITER_UNLIM => {
                param3 = item.loiter_radius;
                param4 = item.yaw * RAD_TO_DEG;
            }

            MavCmd::MAV_CMD_NAV_LOITER_TIME => {
                param1 = item.time_inside;
                param3 = item.loiter_radius;
                param4 = if item.loiter_exit_xtrack { 1.0 } else { 0.0 };
            }

            MavCmd::MAV_CMD_NAV_LAND => {
                // param1 (abort altitude) has no internal field yet
                param4 = item.yaw * RAD_TO_DEG;
            }

            MavCmd::MAV_CMD_NAV_TAKEOFF => {
                param1 = item.pitch_min;
                param4 = item.yaw * RAD_TO_DEG;
            }

            MavCmd::MAV_CMD_NAV_LOITER_TO_ALT => {
                param1 = if item.force_heading { 1.0 } else { 0.0 };
                param2 = item.loiter_radius;
                param4 = if item.loiter_exit_xtrack { 1.0 } else { 0.0 };
            }

            MavCmd::MAV_CMD_NAV_VTOL_TAKEOFF | MavCmd::MAV_CMD_NAV_VTOL_LAND => {
                param4 = item.yaw * RAD_TO_DEG;
            }

            MavCmd::MAV_CMD_NAV_FENCE_RETURN_POINT => {}

            MavCmd::MAV_CMD_NAV_FENCE_POLYGON_VERTEX_INCLUSION
            | MavCmd::MAV_CMD_NAV_FENCE_POLYGON_VERTEX_EXCLUSION => {
                param1 = item.vertex_count as f32;
            }

            MavCmd::MAV_CMD_NAV_FENCE_CIRCLE_INCLUSION
            | MavCmd::MAV_CMD_NAV_FENCE_CIRCLE_EXCLUSION => {
                param1 = item.circle_radius;
            }

            MavCmd::MAV_CMD_NAV_RALLY_POINT => {}

            _ => return Err(MavMissionResult::MAV_MISSION_ERROR),
        }

        frame = match (item.altitude_is_relative, encoding) {
            (true, Encoding::Int) => MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT_INT,
            (true, Encoding::Float) => MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT,
            (false, Encoding::Int) => MavFrame::MAV_FRAME_GLOBAL_INT,
            (false, Encoding::Float) => MavFrame::MAV_FRAME_GLOBAL,
        };
        x_deg = item.lat;
        y_deg = item.lon;
        z = item.altitude;
    }

    let msg = match encoding {
        Encoding::Int => MavMessage::MISSION_ITEM_INT(MISSION_ITEM_INT_DATA {
            target_system,
            target_component,
            seq,
            frame,
            command: item.nav_cmd,
            current: current as u8,
            autocontinue: item.autocontinue as u8,
            param1,
            param2,
            param3,
            param4,
            x: if frame == MavFrame::MAV_FRAME_MISSION {
                x_deg as i32
            } else {
                (x_deg * INT_COORD_SCALE) as i32
            },
            y: if frame == MavFrame::MAV_FRAME_MISSION {
                y_deg as i32
            } else {
                (y_deg * INT_COORD_SCALE) as i32
            },
            z,
            mission_type,
            ..Default::default()
        }),
        Encoding::Float => MavMessage::MISSION_ITEM(MISSION_ITEM_DATA {
            target_system,
            target_component,
            seq,
            frame,
            command: item.nav_cmd,
            current: current as u8,
            autocontinue: item.autocontinue as u8,
            param1,
            param2,
            param3,
            param4,
            x: x_deg as f32,
            y: y_deg as f32,
            z,
            mission_type,
            ..Default::default()
        }),
    };

    Ok(msg)
}

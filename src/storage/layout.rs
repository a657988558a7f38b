//! Storage layout for mission records
//!
//! Fixed-size little-endian record codecs plus the slot conventions of the
//! mission stores:
//!
//! - `MissionState` slot 0: the mission header (active buffer id, count,
//!   current item)
//! - `WaypointsOffboard{0,1}` slot `seq`: one mission item per slot
//! - `FencePoints` / `SafePoints` slot 0: a stats record; points live at
//!   slot `seq + 1`
//!
//! Keeping the `+ 1` offset here means no caller ever does slot arithmetic.

use super::{Dataman, Namespace, PersistClass, Result, StorageError};
use crate::mission::item::{FencePoint, ItemFlags, ItemOrigin, MissionItem, SafePoint};
use crate::mission::{DatamanId, MissionHeader, StatsEntry};
use mavlink::common::{MavCmd, MavFrame};

/// Serialized mission item record size
pub const MISSION_ITEM_RECORD: usize = 88;

/// Serialized fence point record size
pub const FENCE_POINT_RECORD: usize = 32;

/// Serialized safe point record size
pub const SAFE_POINT_RECORD: usize = 24;

/// Serialized mission header record size
pub const MISSION_HEADER_RECORD: usize = 8;

/// Serialized stats record size
pub const STATS_RECORD: usize = 4;

// ---------------------------------------------------------------------------
// little-endian field helpers
// ---------------------------------------------------------------------------

fn put_f64(buf: &mut [u8], offset: usize, value: f64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn put_f32(buf: &mut [u8], offset: usize, value: f32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_i32(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn get_f64(buf: &[u8], offset: usize) -> f64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[offset..offset + 8]);
    f64::from_le_bytes(b)
}

fn get_f32(buf: &[u8], offset: usize) -> f32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[offset..offset + 4]);
    f32::from_le_bytes(b)
}

fn get_u16(buf: &[u8], offset: usize) -> u16 {
    let mut b = [0u8; 2];
    b.copy_from_slice(&buf[offset..offset + 2]);
    u16::from_le_bytes(b)
}

fn get_i32(buf: &[u8], offset: usize) -> i32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[offset..offset + 4]);
    i32::from_le_bytes(b)
}

// ---------------------------------------------------------------------------
// command / frame discriminants
// ---------------------------------------------------------------------------

/// Restore a persisted command discriminant.
///
/// Only the commands the wire codec accepts can ever have been stored, so
/// the table mirrors that set.
pub fn cmd_from_u16(raw: u16) -> Option<MavCmd> {
    let cmd = match raw {
        16 => MavCmd::MAV_CMD_NAV_WAYPOINT,
        17 => MavCmd::MAV_CMD_NAV_LOITER_UNLIM,
        19 => MavCmd::MAV_CMD_NAV_LOITER_TIME,
        20 => MavCmd::MAV_CMD_NAV_RETURN_TO_LAUNCH,
        21 => MavCmd::MAV_CMD_NAV_LAND,
        22 => MavCmd::MAV_CMD_NAV_TAKEOFF,
        31 => MavCmd::MAV_CMD_NAV_LOITER_TO_ALT,
        80 => MavCmd::MAV_CMD_NAV_ROI,
        84 => MavCmd::MAV_CMD_NAV_VTOL_TAKEOFF,
        85 => MavCmd::MAV_CMD_NAV_VTOL_LAND,
        93 => MavCmd::MAV_CMD_NAV_DELAY,
        177 => MavCmd::MAV_CMD_DO_JUMP,
        178 => MavCmd::MAV_CMD_DO_CHANGE_SPEED,
        183 => MavCmd::MAV_CMD_DO_SET_SERVO,
        189 => MavCmd::MAV_CMD_DO_LAND_START,
        201 => MavCmd::MAV_CMD_DO_SET_ROI,
        203 => MavCmd::MAV_CMD_DO_DIGICAM_CONTROL,
        204 => MavCmd::MAV_CMD_DO_MOUNT_CONFIGURE,
        205 => MavCmd::MAV_CMD_DO_MOUNT_CONTROL,
        206 => MavCmd::MAV_CMD_DO_SET_CAM_TRIGG_DIST,
        214 => MavCmd::MAV_CMD_DO_SET_CAM_TRIGG_INTERVAL,
        530 => MavCmd::MAV_CMD_SET_CAMERA_MODE,
        2000 => MavCmd::MAV_CMD_IMAGE_START_CAPTURE,
        2001 => MavCmd::MAV_CMD_IMAGE_STOP_CAPTURE,
        2003 => MavCmd::MAV_CMD_DO_TRIGGER_CONTROL,
        2500 => MavCmd::MAV_CMD_VIDEO_START_CAPTURE,
        2501 => MavCmd::MAV_CMD_VIDEO_STOP_CAPTURE,
        3000 => MavCmd::MAV_CMD_DO_VTOL_TRANSITION,
        5000 => MavCmd::MAV_CMD_NAV_FENCE_RETURN_POINT,
        5001 => MavCmd::MAV_CMD_NAV_FENCE_POLYGON_VERTEX_INCLUSION,
        5002 => MavCmd::MAV_CMD_NAV_FENCE_POLYGON_VERTEX_EXCLUSION,
        5003 => MavCmd::MAV_CMD_NAV_FENCE_CIRCLE_INCLUSION,
        5004 => MavCmd::MAV_CMD_NAV_FENCE_CIRCLE_EXCLUSION,
        5100 => MavCmd::MAV_CMD_NAV_RALLY_POINT,
        _ => return None,
    };
    Some(cmd)
}

/// Restore a persisted frame discriminant.
pub fn frame_from_u8(raw: u8) -> Option<MavFrame> {
    let frame = match raw {
        0 => MavFrame::MAV_FRAME_GLOBAL,
        2 => MavFrame::MAV_FRAME_MISSION,
        3 => MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT,
        5 => MavFrame::MAV_FRAME_GLOBAL_INT,
        6 => MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT_INT,
        _ => return None,
    };
    Some(frame)
}

// ---------------------------------------------------------------------------
// record codecs
// ---------------------------------------------------------------------------

/// Serialize a mission item record.
pub fn encode_mission_item(item: &MissionItem) -> [u8; MISSION_ITEM_RECORD] {
    let mut buf = [0u8; MISSION_ITEM_RECORD];

    put_f64(&mut buf, 0, item.lat);
    put_f64(&mut buf, 8, item.lon);
    put_f32(&mut buf, 16, item.altitude);
    put_f32(&mut buf, 20, item.yaw);
    put_f32(&mut buf, 24, item.loiter_radius);
    put_f32(&mut buf, 28, item.acceptance_radius);
    put_f32(&mut buf, 32, item.time_inside);
    put_f32(&mut buf, 36, item.pitch_min);
    put_f32(&mut buf, 40, item.circle_radius);

    for (i, p) in item.params.iter().enumerate() {
        put_f32(&mut buf, 44 + i * 4, *p);
    }

    put_u16(&mut buf, 72, item.nav_cmd as u16);
    put_u16(&mut buf, 74, item.do_jump_mission_index);
    put_u16(&mut buf, 76, item.do_jump_repeat_count);
    put_u16(&mut buf, 78, item.do_jump_current_count);
    put_u16(&mut buf, 80, item.vertex_count);
    buf[82] = item.frame as u8;
    buf[83] = item.origin.as_u8();
    buf[84] = item.flags().bits();

    buf
}

/// Deserialize a mission item record; None on a corrupt discriminant.
pub fn decode_mission_item(buf: &[u8; MISSION_ITEM_RECORD]) -> Option<MissionItem> {
    let mut item = MissionItem {
        lat: get_f64(buf, 0),
        lon: get_f64(buf, 8),
        altitude: get_f32(buf, 16),
        yaw: get_f32(buf, 20),
        loiter_radius: get_f32(buf, 24),
        acceptance_radius: get_f32(buf, 28),
        time_inside: get_f32(buf, 32),
        pitch_min: get_f32(buf, 36),
        circle_radius: get_f32(buf, 40),
        do_jump_mission_index: get_u16(buf, 74),
        do_jump_repeat_count: get_u16(buf, 76),
        do_jump_current_count: get_u16(buf, 78),
        vertex_count: get_u16(buf, 80),
        nav_cmd: cmd_from_u16(get_u16(buf, 72))?,
        frame: frame_from_u8(buf[82])?,
        origin: ItemOrigin::from_u8(buf[83])?,
        ..MissionItem::default()
    };

    for i in 0..7 {
        item.params[i] = get_f32(buf, 44 + i * 4);
    }

    item.apply_flags(ItemFlags::from_bits_truncate(buf[84]));
    Some(item)
}

/// Serialize a fence point record.
pub fn encode_fence_point(point: &FencePoint) -> [u8; FENCE_POINT_RECORD] {
    let mut buf = [0u8; FENCE_POINT_RECORD];
    put_f64(&mut buf, 0, point.lat);
    put_f64(&mut buf, 8, point.lon);
    put_f32(&mut buf, 16, point.alt);
    put_f32(&mut buf, 20, point.circle_radius);
    put_u16(&mut buf, 24, point.nav_cmd as u16);
    put_u16(&mut buf, 26, point.vertex_count);
    buf[28] = point.frame as u8;
    buf
}

/// Deserialize a fence point record; None on a corrupt discriminant.
pub fn decode_fence_point(buf: &[u8; FENCE_POINT_RECORD]) -> Option<FencePoint> {
    Some(FencePoint {
        lat: get_f64(buf, 0),
        lon: get_f64(buf, 8),
        alt: get_f32(buf, 16),
        circle_radius: get_f32(buf, 20),
        nav_cmd: cmd_from_u16(get_u16(buf, 24))?,
        vertex_count: get_u16(buf, 26),
        frame: frame_from_u8(buf[28])?,
    })
}

/// Serialize a safe point record.
pub fn encode_safe_point(point: &SafePoint) -> [u8; SAFE_POINT_RECORD] {
    let mut buf = [0u8; SAFE_POINT_RECORD];
    put_f64(&mut buf, 0, point.lat);
    put_f64(&mut buf, 8, point.lon);
    put_f32(&mut buf, 16, point.alt);
    buf[20] = point.frame as u8;
    buf
}

/// Deserialize a safe point record; None on a corrupt discriminant.
pub fn decode_safe_point(buf: &[u8; SAFE_POINT_RECORD]) -> Option<SafePoint> {
    Some(SafePoint {
        lat: get_f64(buf, 0),
        lon: get_f64(buf, 8),
        alt: get_f32(buf, 16),
        frame: frame_from_u8(buf[20])?,
    })
}

/// Serialize the mission header record.
pub fn encode_mission_header(header: &MissionHeader) -> [u8; MISSION_HEADER_RECORD] {
    let mut buf = [0u8; MISSION_HEADER_RECORD];
    buf[0] = header.dataman_id.as_u8();
    put_u16(&mut buf, 2, header.count);
    put_i32(&mut buf, 4, header.current_seq);
    buf
}

/// Deserialize the mission header record.
pub fn decode_mission_header(buf: &[u8; MISSION_HEADER_RECORD]) -> Option<MissionHeader> {
    Some(MissionHeader {
        dataman_id: DatamanId::from_u8(buf[0])?,
        count: get_u16(buf, 2),
        current_seq: get_i32(buf, 4),
    })
}

/// Serialize a stats record.
pub fn encode_stats(stats: &StatsEntry) -> [u8; STATS_RECORD] {
    let mut buf = [0u8; STATS_RECORD];
    put_u16(&mut buf, 0, stats.num_items);
    put_u16(&mut buf, 2, stats.update_counter);
    buf
}

/// Deserialize a stats record.
pub fn decode_stats(buf: &[u8; STATS_RECORD]) -> StatsEntry {
    StatsEntry {
        num_items: get_u16(buf, 0),
        update_counter: get_u16(buf, 2),
    }
}

// ---------------------------------------------------------------------------
// typed store accessors
// ---------------------------------------------------------------------------

/// Read the mission header from slot 0 of the mission state namespace.
pub fn read_mission_header<D: Dataman>(dm: &mut D) -> Result<MissionHeader> {
    let mut buf = [0u8; MISSION_HEADER_RECORD];
    let n = dm.read(Namespace::MissionState, 0, &mut buf)?;
    if n != MISSION_HEADER_RECORD {
        return Err(StorageError::SizeMismatch);
    }
    decode_mission_header(&buf).ok_or(StorageError::Io)
}

/// Write the mission header to slot 0 of the mission state namespace.
pub fn write_mission_header<D: Dataman>(dm: &mut D, header: &MissionHeader) -> Result<()> {
    let buf = encode_mission_header(header);
    let n = dm.write(Namespace::MissionState, 0, PersistClass::PowerOnReset, &buf)?;
    if n != MISSION_HEADER_RECORD {
        return Err(StorageError::SizeMismatch);
    }
    Ok(())
}

/// Read the stats record at slot 0 of a point namespace.
pub fn read_stats<D: Dataman>(dm: &mut D, ns: Namespace) -> Result<StatsEntry> {
    let mut buf = [0u8; STATS_RECORD];
    let n = dm.read(ns, 0, &mut buf)?;
    if n != STATS_RECORD {
        return Err(StorageError::SizeMismatch);
    }
    Ok(decode_stats(&buf))
}

/// Write the stats record at slot 0 of a point namespace.
pub fn write_stats<D: Dataman>(dm: &mut D, ns: Namespace, stats: &StatsEntry) -> Result<()> {
    let buf = encode_stats(stats);
    let n = dm.write(ns, 0, PersistClass::PowerOnReset, &buf)?;
    if n != STATS_RECORD {
        return Err(StorageError::SizeMismatch);
    }
    Ok(())
}

/// Read one mission item from the given buffer.
pub fn read_mission_item<D: Dataman>(dm: &mut D, id: DatamanId, seq: u16) -> Result<MissionItem> {
    let mut buf = [0u8; MISSION_ITEM_RECORD];
    let n = dm.read(Namespace::waypoints(id), seq, &mut buf)?;
    if n != MISSION_ITEM_RECORD {
        return Err(StorageError::SizeMismatch);
    }
    decode_mission_item(&buf).ok_or(StorageError::Io)
}

/// Write one mission item into the given buffer.
pub fn write_mission_item<D: Dataman>(
    dm: &mut D,
    id: DatamanId,
    seq: u16,
    item: &MissionItem,
) -> Result<()> {
    let buf = encode_mission_item(item);
    let n = dm.write(Namespace::waypoints(id), seq, PersistClass::PowerOnReset, &buf)?;
    if n != MISSION_ITEM_RECORD {
        return Err(StorageError::SizeMismatch);
    }
    Ok(())
}

/// Read the fence point with transfer sequence `seq` (stored at `seq + 1`).
pub fn read_fence_point<D: Dataman>(dm: &mut D, seq: u16) -> Result<FencePoint> {
    let mut buf = [0u8; FENCE_POINT_RECORD];
    let n = dm.read(Namespace::FencePoints, seq + 1, &mut buf)?;
    if n != FENCE_POINT_RECORD {
        return Err(StorageError::SizeMismatch);
    }
    decode_fence_point(&buf).ok_or(StorageError::Io)
}

/// Write the fence point with transfer sequence `seq` (stored at `seq + 1`).
pub fn write_fence_point<D: Dataman>(dm: &mut D, seq: u16, point: &FencePoint) -> Result<()> {
    let buf = encode_fence_point(point);
    let n = dm.write(
        Namespace::FencePoints,
        seq + 1,
        PersistClass::PowerOnReset,
        &buf,
    )?;
    if n != FENCE_POINT_RECORD {
        return Err(StorageError::SizeMismatch);
    }
    Ok(())
}

/// Read the rally point with transfer sequence `seq` (stored at `seq + 1`).
pub fn read_safe_point<D: Dataman>(dm: &mut D, seq: u16) -> Result<SafePoint> {
    let mut buf = [0u8; SAFE_POINT_RECORD];
    let n = dm.read(Namespace::SafePoints, seq + 1, &mut buf)?;
    if n != SAFE_POINT_RECORD {
        return Err(StorageError::SizeMismatch);
    }
    decode_safe_point(&buf).ok_or(StorageError::Io)
}

/// Write the rally point with transfer sequence `seq` (stored at `seq + 1`).
pub fn write_safe_point<D: Dataman>(dm: &mut D, seq: u16, point: &SafePoint) -> Result<()> {
    let buf = encode_safe_point(point);
    let n = dm.write(
        Namespace::SafePoints,
        seq + 1,
        PersistClass::PowerOnReset,
        &buf,
    )?;
    if n != SAFE_POINT_RECORD {
        return Err(StorageError::SizeMismatch);
    }
    Ok(())
}

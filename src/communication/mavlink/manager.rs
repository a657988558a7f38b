//! Mission protocol manager
//!
//! One `MissionManager` serves one transport channel. It runs the transfer
//! state machine (IDLE / SENDLIST / GETLIST), adapts accepted lists into the
//! dataman store, publishes mission progress and keeps its channel in sync
//! when another channel replaces the mission.
//!
//! # Upload (GCS -> vehicle, GETLIST)
//!
//! 1. GCS sends MISSION_COUNT
//! 2. Vehicle requests items one by one (MISSION_REQUEST[_INT])
//! 3. Items stream into the inactive store buffer
//! 4. On the last item the header commits, the active buffer flips and the
//!    vehicle acks ACCEPTED
//!
//! # Download (vehicle -> GCS, SENDLIST)
//!
//! 1. GCS sends MISSION_REQUEST_LIST, vehicle answers MISSION_COUNT
//! 2. GCS requests items one by one, vehicle answers MISSION_ITEM[_INT]
//! 3. GCS acks ACCEPTED
//!
//! # Timeouts
//!
//! Lost messages are recovered by the retry timer (resend since last send);
//! an abandoned transfer is dropped back to IDLE by the action timeout
//! (since last receive). Both run from [`MissionManager::tick`].

use super::codec;
use super::rate_limiter::RateLimiter;
use super::status;
use super::wire::{Encoding, WireItem};
use crate::core::traits::SharedState;
use crate::mission::item::{FencePoint, MissionItem, SafePoint};
use crate::mission::{DatamanId, MissionKind, MissionRegistry, StatsEntry};
use crate::pubsub::NavigatorBus;
use crate::storage::{layout, Dataman, Namespace};
use heapless::Vec;
use mavlink::common::{
    MavCmd, MavMessage, MavMissionResult, MISSION_ACK_DATA, MISSION_CLEAR_ALL_DATA,
    MISSION_COUNT_DATA, MISSION_CURRENT_DATA, MISSION_ITEM_REACHED_DATA, MISSION_REQUEST_DATA,
    MISSION_REQUEST_INT_DATA, MISSION_REQUEST_LIST_DATA, MISSION_SET_CURRENT_DATA,
};

/// Upper bound of outbound messages produced by one call.
pub const MAX_RESPONSES: usize = 8;

/// Outbound message batch returned by `handle_message` and `tick`.
pub type Responses = Vec<MavMessage, MAX_RESPONSES>;

/// MAV_COMP_ID_MISSIONPLANNER; accepted as an alias for our component.
const MISSION_PLANNER_COMPID: u8 = 190;

/// MAV_COMP_ID_ALL; broadcast component.
const BROADCAST_COMPID: u8 = 0;

/// Protocol timing and error-reporting knobs.
#[derive(Debug, Clone, Copy)]
pub struct MissionParams {
    /// Abort a transfer after this long without a message from the partner
    pub action_timeout_us: u64,
    /// Resend the last outbound step after this long without progress
    pub retry_timeout_us: u64,
    /// Minimum spacing of periodic MISSION_CURRENT broadcasts
    pub progress_interval_us: u64,
    /// Re-emit MISSION_ITEM_REACHED for this long after a reach event
    pub reached_resend_window_us: u64,
    /// Stop emitting storage-failure statustexts after this many errors
    pub fs_errcount_notify_limit: u8,
}

impl Default for MissionParams {
    fn default() -> Self {
        Self {
            action_timeout_us: 5_000_000,
            retry_timeout_us: 500_000,
            progress_interval_us: 100_000,
            reached_resend_window_us: 300_000,
            fs_errcount_notify_limit: 2,
        }
    }
}

/// Transfer state of this endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum TransferState {
    /// No transfer running
    #[default]
    Idle,
    /// Sending items to the GCS (download)
    SendList,
    /// Receiving items from the GCS (upload)
    GetList,
}

/// Mission protocol endpoint for one transport channel.
///
/// Shares the process-wide [`MissionRegistry`] with the endpoints of other
/// channels; everything else here is channel-local.
pub struct MissionManager<'a, S: SharedState<MissionRegistry>> {
    registry: &'a S,
    sysid: u8,
    compid: u8,
    params: MissionParams,

    state: TransferState,
    kind: MissionKind,
    encoding: Encoding,

    time_last_recv_us: u64,
    time_last_sent_us: u64,
    time_last_reached_us: u64,

    partner_sysid: u8,
    partner_compid: u8,
    transfer_count: u16,
    transfer_seq: u16,
    transfer_dataman_id: DatamanId,
    transfer_current_seq: i32,

    my_dataman_id: DatamanId,
    fence_locked: bool,
    fs_errcount: u8,
    initialized: bool,
    progress_limiter: RateLimiter,
}

impl<'a, S: SharedState<MissionRegistry>> MissionManager<'a, S> {
    /// Create an endpoint for the channel identified by `sysid`/`compid`.
    pub fn new(registry: &'a S, sysid: u8, compid: u8, params: MissionParams) -> Self {
        let progress_limiter = RateLimiter::new(params.progress_interval_us);
        Self {
            registry,
            sysid,
            compid,
            params,
            state: TransferState::Idle,
            kind: MissionKind::Mission,
            encoding: Encoding::Float,
            time_last_recv_us: 0,
            time_last_sent_us: 0,
            time_last_reached_us: 0,
            partner_sysid: 0,
            partner_compid: 0,
            transfer_count: 0,
            transfer_seq: 0,
            transfer_dataman_id: DatamanId::Zero,
            transfer_current_seq: -1,
            my_dataman_id: DatamanId::Zero,
            fence_locked: false,
            fs_errcount: 0,
            initialized: false,
            progress_limiter,
        }
    }

    /// Whether no transfer is running on this endpoint.
    pub fn is_idle(&self) -> bool {
        self.state == TransferState::Idle
    }

    /// Protocol variant currently spoken on this channel.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    // ------------------------------------------------------------------
    // startup load
    // ------------------------------------------------------------------

    /// One-shot restore of counts and the active buffer id from storage.
    ///
    /// The first endpoint to run performs the dataman reads; later endpoints
    /// only adopt the registry's buffer id.
    fn ensure_initialized<D: Dataman>(&mut self, dm: &mut D) {
        let loaded = self.registry.with(|r| r.loaded);

        if !loaded {
            self.registry.with_mut(|r| r.loaded = true);

            match layout::read_mission_header(dm) {
                Ok(header) => {
                    self.registry.with_mut(|r| r.apply_mission_header(&header));
                }
                Err(crate::storage::StorageError::NotFound) => {}
                Err(_e) => {
                    crate::log_error!("mission state restore failed: {}", _e);
                }
            }

            self.load_fence_stats(dm);
            self.load_rally_stats(dm);
        }

        if !self.initialized {
            self.my_dataman_id = self.registry.with(|r| r.dataman_id);
            self.initialized = true;
        }
    }

    fn load_fence_stats<D: Dataman>(&mut self, dm: &mut D) {
        if let Ok(stats) = layout::read_stats(dm, Namespace::FencePoints) {
            self.registry.with_mut(|r| {
                r.fence_count = stats.num_items;
                r.fence_update_counter = stats.update_counter;
            });
        }
    }

    fn load_rally_stats<D: Dataman>(&mut self, dm: &mut D) {
        if let Ok(stats) = layout::read_stats(dm, Namespace::SafePoints) {
            self.registry.with_mut(|r| r.rally_count = stats.num_items);
        }
    }

    // ------------------------------------------------------------------
    // persistence adaptation
    // ------------------------------------------------------------------

    /// Commit a new active mission header and notify the navigator.
    fn update_active_mission<D: Dataman, B: NavigatorBus>(
        &mut self,
        dm: &mut D,
        bus: &mut B,
        out: &mut Responses,
        dataman_id: DatamanId,
        count: u16,
        current_seq: i32,
    ) -> Result<(), ()> {
        let header = crate::mission::MissionHeader {
            dataman_id,
            count,
            current_seq,
        };

        match layout::write_mission_header(dm, &header) {
            Ok(()) => {
                self.registry.with_mut(|r| r.apply_mission_header(&header));
                self.my_dataman_id = dataman_id;
                bus.publish_mission(&header);
                Ok(())
            }
            Err(_e) => {
                crate::log_error!("can't save mission state: {}", _e);
                self.notify_storage_error(out, "Mission storage: state write failed");
                Err(())
            }
        }
    }

    /// Rewrite the fence stats slot, bumping the update counter so the
    /// navigator reloads.
    fn update_fence_count<D: Dataman>(
        &mut self,
        dm: &mut D,
        out: &mut Responses,
        count: u16,
    ) -> Result<(), ()> {
        let counter = self.registry.with_mut(|r| {
            r.fence_update_counter = r.fence_update_counter.wrapping_add(1);
            r.fence_update_counter
        });
        let stats = StatsEntry {
            num_items: count,
            update_counter: counter,
        };

        match layout::write_stats(dm, Namespace::FencePoints, &stats) {
            Ok(()) => {
                self.registry.with_mut(|r| r.fence_count = count);
                Ok(())
            }
            Err(_e) => {
                crate::log_error!("can't save fence stats: {}", _e);
                self.notify_storage_error(out, "Mission storage: fence write failed");
                Err(())
            }
        }
    }

    /// Rewrite the rally stats slot.
    fn update_rally_count<D: Dataman>(
        &mut self,
        dm: &mut D,
        out: &mut Responses,
        count: u16,
    ) -> Result<(), ()> {
        let stats = StatsEntry {
            num_items: count,
            update_counter: 0,
        };

        match layout::write_stats(dm, Namespace::SafePoints, &stats) {
            Ok(()) => {
                self.registry.with_mut(|r| r.rally_count = count);
                Ok(())
            }
            Err(_e) => {
                crate::log_error!("can't save rally stats: {}", _e);
                self.notify_storage_error(out, "Mission storage: rally write failed");
                Err(())
            }
        }
    }

    /// Storage-failure statustext, bounded so a dead card can't flood the
    /// link.
    fn notify_storage_error(&mut self, out: &mut Responses, text: &str) {
        if self.fs_errcount < self.params.fs_errcount_notify_limit {
            let _ = out.push(status::critical(text));
        }
        self.fs_errcount = self.fs_errcount.saturating_add(1);
    }

    // ------------------------------------------------------------------
    // outbound building blocks
    // ------------------------------------------------------------------

    fn targets_me(&self, target_system: u8, target_component: u8) -> bool {
        target_system == self.sysid
            && (target_component == self.compid
                || target_component == MISSION_PLANNER_COMPID
                || target_component == BROADCAST_COMPID)
    }

    fn emit_ack(&mut self, out: &mut Responses, sysid: u8, compid: u8, result: MavMissionResult) {
        let _ = out.push(MavMessage::MISSION_ACK(MISSION_ACK_DATA {
            target_system: sysid,
            target_component: compid,
            mavtype: result,
            mission_type: self.kind.to_wire(),
            ..Default::default()
        }));
        crate::log_debug!("WPM: send ACK {} to {}", result as u32, sysid);
    }

    fn emit_count(
        &mut self,
        out: &mut Responses,
        now_us: u64,
        sysid: u8,
        compid: u8,
        count: u16,
        kind: MissionKind,
    ) {
        self.time_last_sent_us = now_us;
        let _ = out.push(MavMessage::MISSION_COUNT(MISSION_COUNT_DATA {
            target_system: sysid,
            target_component: compid,
            count,
            mission_type: kind.to_wire(),
            ..Default::default()
        }));
        crate::log_debug!("WPM: send COUNT {} to {}", count, sysid);
    }

    fn emit_request(&mut self, out: &mut Responses, now_us: u64, sysid: u8, compid: u8, seq: u16) {
        if seq >= self.kind.max_item_count() {
            crate::log_error!("WPM: REQUEST seq {} exceeds list capacity", seq);
            let _ = out.push(status::critical("ERROR: Waypoint index exceeds list capacity"));
            return;
        }

        self.time_last_sent_us = now_us;
        let msg = match self.encoding {
            Encoding::Int => MavMessage::MISSION_REQUEST_INT(MISSION_REQUEST_INT_DATA {
                target_system: sysid,
                target_component: compid,
                seq,
                mission_type: self.kind.to_wire(),
                ..Default::default()
            }),
            Encoding::Float => MavMessage::MISSION_REQUEST(MISSION_REQUEST_DATA {
                target_system: sysid,
                target_component: compid,
                seq,
                mission_type: self.kind.to_wire(),
                ..Default::default()
            }),
        };
        let _ = out.push(msg);
        crate::log_debug!("WPM: send REQUEST seq {} to {}", seq, sysid);
    }

    /// Read one stored item and emit it to the partner.
    fn emit_item<D: Dataman>(
        &mut self,
        out: &mut Responses,
        now_us: u64,
        dm: &mut D,
        sysid: u8,
        compid: u8,
        seq: u16,
    ) {
        let read_result: Result<MissionItem, crate::storage::StorageError> = match self.kind {
            MissionKind::Mission => {
                let id = self.registry.with(|r| r.dataman_id);
                layout::read_mission_item(dm, id, seq)
            }
            MissionKind::Fence => layout::read_fence_point(dm, seq).map(|p| p.to_item()),
            MissionKind::Rally => layout::read_safe_point(dm, seq).map(|p| p.to_item()),
            MissionKind::All => {
                let _ = out.push(status::critical("Received unknown mission type, abort."));
                return;
            }
        };

        let item = match read_result {
            Ok(item) => item,
            Err(_e) => {
                crate::log_error!("WPM: could not read seq {}: {}", seq, _e);
                let (psysid, pcompid) = (self.partner_sysid, self.partner_compid);
                self.emit_ack(out, psysid, pcompid, MavMissionResult::MAV_MISSION_ERROR);
                self.notify_storage_error(out, "Mission storage: read failed");
                return;
            }
        };

        let current = self.registry.with(|r| r.current_seq) == seq as i32;
        match codec::item_to_wire(
            &item,
            seq,
            current,
            self.encoding,
            sysid,
            compid,
            self.kind.to_wire(),
        ) {
            Ok(msg) => {
                self.time_last_sent_us = now_us;
                let _ = out.push(msg);
                crate::log_debug!("WPM: send ITEM seq {} to {}", seq, sysid);
            }
            Err(result) => {
                crate::log_error!("WPM: could not format stored seq {}", seq);
                let (psysid, pcompid) = (self.partner_sysid, self.partner_compid);
                self.emit_ack(out, psysid, pcompid, result);
            }
        }
    }

    /// Broadcast the current mission item.
    fn emit_current(&mut self, out: &mut Responses, seq: i32) {
        let count = self.registry.with(|r| r.mission_count);

        if seq >= 0 && (seq as u32) < count as u32 {
            let _ = out.push(MavMessage::MISSION_CURRENT(MISSION_CURRENT_DATA {
                seq: seq as u16,
                ..Default::default()
            }));
        } else if seq == 0 && count == 0 {
            // nothing to broadcast without a mission
        } else {
            crate::log_error!("WPM: MISSION_CURRENT seq {} out of bounds", seq);
            let _ = out.push(status::critical("ERROR: wp index out of bounds"));
        }
    }

    fn emit_reached(&mut self, out: &mut Responses, seq: u16) {
        let _ = out.push(MavMessage::MISSION_ITEM_REACHED(MISSION_ITEM_REACHED_DATA {
            seq,
        }));
    }

    /// Leave any transfer state. The fence lock is released on every path
    /// through here so no failure mode can keep it held.
    fn switch_to_idle<D: Dataman>(&mut self, dm: &mut D) {
        if self.fence_locked {
            dm.unlock(Namespace::FencePoints);
            self.fence_locked = false;
            crate::log_debug!("WPM: fence store unlocked");
        }

        self.state = TransferState::Idle;
    }

    // ------------------------------------------------------------------
    // periodic work
    // ------------------------------------------------------------------

    /// Periodic driver: progress broadcast, retries, timeouts and
    /// cross-channel mission re-sync. Call at a steady rate; 10 ms keeps
    /// the retry timing accurate.
    pub fn tick<D: Dataman, B: NavigatorBus>(
        &mut self,
        now_us: u64,
        dm: &mut D,
        bus: &mut B,
    ) -> Responses {
        let mut out = Responses::new();

        self.ensure_initialized(dm);
        self.check_active_mission(&mut out, now_us);

        if let Some(result) = bus.poll_mission_result() {
            self.registry.with_mut(|r| r.current_seq = result.seq_current);

            if result.reached {
                self.time_last_reached_us = now_us;
                self.registry.with_mut(|r| r.last_reached = result.seq_reached);
                self.emit_reached(&mut out, result.seq_reached as u16);
            } else {
                self.registry.with_mut(|r| r.last_reached = -1);
            }

            self.emit_current(&mut out, result.seq_current);

            if result.item_do_jump_changed {
                // replay the item so the GCS sees the decremented jump count
                let (sysid, compid) = (self.partner_sysid, self.partner_compid);
                self.emit_item(&mut out, now_us, dm, sysid, compid, result.item_changed_index);
            }
        } else if self.progress_limiter.check(now_us) {
            let (current, last_reached) =
                self.registry.with(|r| (r.current_seq, r.last_reached));
            self.emit_current(&mut out, current);

            // repeat the reached notice briefly for lossy links
            if last_reached >= 0
                && now_us.saturating_sub(self.time_last_reached_us)
                    < self.params.reached_resend_window_us
            {
                self.emit_reached(&mut out, last_reached as u16);
            }
        }

        self.run_timeouts(&mut out, now_us, dm);

        out
    }

    fn run_timeouts<D: Dataman>(&mut self, out: &mut Responses, now_us: u64, dm: &mut D) {
        let sent_elapsed = now_us.saturating_sub(self.time_last_sent_us);
        let recv_elapsed = now_us.saturating_sub(self.time_last_recv_us);

        if self.state == TransferState::GetList
            && self.time_last_sent_us > 0
            && sent_elapsed > self.params.retry_timeout_us
        {
            // our REQUEST or the item got lost; ask again
            let (sysid, compid, seq) = (self.partner_sysid, self.partner_compid, self.transfer_seq);
            self.emit_request(out, now_us, sysid, compid, seq);
        } else if self.state == TransferState::SendList
            && self.time_last_sent_us > 0
            && sent_elapsed > self.params.retry_timeout_us
        {
            let (sysid, compid) = (self.partner_sysid, self.partner_compid);
            if self.transfer_seq == 0 {
                let (count, kind) = (self.transfer_count, self.kind);
                self.emit_count(out, now_us, sysid, compid, count, kind);
            } else {
                crate::log_warn!("WPM: item re-send timeout");
                let seq = self.transfer_seq - 1;
                self.emit_item(out, now_us, dm, sysid, compid, seq);
            }
        } else if self.state != TransferState::Idle
            && self.time_last_recv_us > 0
            && recv_elapsed > self.params.action_timeout_us
        {
            crate::log_warn!("WPM: transfer timed out, back to idle");
            let _ = out.push(status::critical("Operation timeout"));
            self.switch_to_idle(dm);
            self.registry.with_mut(|r| r.transfer_in_progress = false);
        } else if self.state == TransferState::Idle {
            self.time_last_sent_us = 0;
            self.time_last_recv_us = 0;
        }
    }

    /// Detect a mission replaced over another channel and push the new count
    /// to this channel's partner so its GCS re-syncs.
    fn check_active_mission(&mut self, out: &mut Responses, now_us: u64) {
        let (reg_id, count) = self.registry.with(|r| (r.dataman_id, r.mission_count));

        if self.my_dataman_id != reg_id {
            crate::log_info!("WPM: new mission detected on another channel");
            self.my_dataman_id = reg_id;
            let (sysid, compid) = (self.partner_sysid, self.partner_compid);
            self.emit_count(out, now_us, sysid, compid, count, MissionKind::Mission);
        }
    }

    // ------------------------------------------------------------------
    // inbound dispatch
    // ------------------------------------------------------------------

    /// Route one inbound MAVLink message.
    ///
    /// Messages not belonging to the mission protocol, or addressed to
    /// another system/component, produce no responses.
    pub fn handle_message<D: Dataman, B: NavigatorBus>(
        &mut self,
        header: &mavlink::MavHeader,
        message: &MavMessage,
        now_us: u64,
        dm: &mut D,
        bus: &mut B,
    ) -> Responses {
        let mut out = Responses::new();
        self.ensure_initialized(dm);

        let sender = (header.system_id, header.component_id);

        match message {
            MavMessage::MISSION_ACK(data) => {
                self.handle_mission_ack(data, sender, now_us, dm, &mut out)
            }
            MavMessage::MISSION_SET_CURRENT(data) => {
                self.handle_mission_set_current(data, now_us, dm, bus, &mut out)
            }
            MavMessage::MISSION_REQUEST_LIST(data) => {
                self.handle_mission_request_list(data, sender, now_us, dm, &mut out)
            }
            MavMessage::MISSION_REQUEST(data) => {
                // the partner speaks the old float variant; follow it
                self.encoding = Encoding::Float;
                self.handle_mission_request_common(
                    data.target_system,
                    data.target_component,
                    data.seq,
                    MissionKind::from_wire(data.mission_type),
                    sender,
                    now_us,
                    dm,
                    &mut out,
                );
            }
            MavMessage::MISSION_REQUEST_INT(data) => {
                // the partner speaks the int variant; follow it
                self.encoding = Encoding::Int;
                self.handle_mission_request_common(
                    data.target_system,
                    data.target_component,
                    data.seq,
                    MissionKind::from_wire(data.mission_type),
                    sender,
                    now_us,
                    dm,
                    &mut out,
                );
            }
            MavMessage::MISSION_COUNT(data) => {
                self.handle_mission_count(data, sender, now_us, dm, bus, &mut out)
            }
            MavMessage::MISSION_ITEM(data) => {
                self.encoding = Encoding::Float;
                let wire = WireItem::from(data);
                self.handle_mission_item(&wire, data.target_system, data.target_component, now_us, dm, bus, &mut out);
            }
            MavMessage::MISSION_ITEM_INT(data) => {
                self.encoding = Encoding::Int;
                let wire = WireItem::from(data);
                self.handle_mission_item(&wire, data.target_system, data.target_component, now_us, dm, bus, &mut out);
            }
            MavMessage::MISSION_CLEAR_ALL(data) => {
                self.handle_mission_clear_all(data, sender, now_us, dm, bus, &mut out)
            }
            _ => {}
        }

        out
    }

    fn handle_mission_ack<D: Dataman>(
        &mut self,
        data: &MISSION_ACK_DATA,
        sender: (u8, u8),
        now_us: u64,
        dm: &mut D,
        out: &mut Responses,
    ) {
        if !self.targets_me(data.target_system, data.target_component) {
            return;
        }

        if sender != (self.partner_sysid, self.partner_compid) {
            crate::log_warn!("WPM: ACK from unexpected partner");
            let _ = out.push(status::critical("REJ. WP CMD: partner id mismatch"));
            return;
        }

        if self.state == TransferState::SendList
            && self.kind == MissionKind::from_wire(data.mission_type)
        {
            self.time_last_recv_us = now_us;

            let count = self.registry.with(|r| r.count(self.kind));
            if self.transfer_seq == count {
                crate::log_info!("WPM: all items sent, ack received");
            } else {
                let _ = out.push(status::critical("WPM: ERR: not all items sent -> IDLE"));
            }

            self.switch_to_idle(dm);
        } else if self.state == TransferState::GetList
            && data.mavtype != MavMissionResult::MAV_MISSION_ACCEPTED
        {
            // partner rejected our request variant; try the other one
            self.encoding = self.encoding.flipped();
        }
    }

    fn handle_mission_set_current<D: Dataman, B: NavigatorBus>(
        &mut self,
        data: &MISSION_SET_CURRENT_DATA,
        now_us: u64,
        dm: &mut D,
        bus: &mut B,
        out: &mut Responses,
    ) {
        if !self.targets_me(data.target_system, data.target_component) {
            return;
        }

        if self.state != TransferState::Idle {
            crate::log_warn!("WPM: SET_CURRENT while busy");
            let _ = out.push(status::critical("WPM: IGN WP CURR CMD: Busy"));
            return;
        }

        self.time_last_recv_us = now_us;

        let (id, count) = self.registry.with(|r| (r.dataman_id, r.mission_count));
        if data.seq < count {
            if self
                .update_active_mission(dm, bus, out, id, count, data.seq as i32)
                .is_err()
            {
                let _ = out.push(status::critical("WPM: WP CURR CMD: Error setting ID"));
            }
        } else {
            crate::log_warn!("WPM: SET_CURRENT seq {} not in list", data.seq);
            let _ = out.push(status::critical("WPM: WP CURR CMD: Not in list"));
        }
    }

    fn handle_mission_request_list<D: Dataman>(
        &mut self,
        data: &MISSION_REQUEST_LIST_DATA,
        sender: (u8, u8),
        now_us: u64,
        dm: &mut D,
        out: &mut Responses,
    ) {
        if !self.targets_me(data.target_system, data.target_component) {
            return;
        }

        let kind = MissionKind::from_wire(data.mission_type);
        let re_request = self.state == TransferState::SendList && self.kind == kind;

        if self.state != TransferState::Idle && !re_request {
            crate::log_warn!("WPM: REQUEST_LIST while busy");
            let _ = out.push(status::critical("IGN REQUEST LIST: Busy"));
            return;
        }

        self.time_last_recv_us = now_us;
        self.state = TransferState::SendList;
        self.kind = kind;

        // counts may have changed behind our back; re-read the stats
        match kind {
            MissionKind::Fence => self.load_fence_stats(dm),
            MissionKind::Rally => self.load_rally_stats(dm),
            _ => {}
        }

        self.transfer_seq = 0;
        self.transfer_count = self.registry.with(|r| r.count(kind));
        self.partner_sysid = sender.0;
        self.partner_compid = sender.1;

        crate::log_info!(
            "WPM: REQUEST_LIST, {} items to send",
            self.transfer_count
        );

        let count = self.transfer_count;
        self.emit_count(out, now_us, sender.0, sender.1, count, kind);
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_mission_request_common<D: Dataman>(
        &mut self,
        target_system: u8,
        target_component: u8,
        seq: u16,
        kind: MissionKind,
        sender: (u8, u8),
        now_us: u64,
        dm: &mut D,
        out: &mut Responses,
    ) {
        if !self.targets_me(target_system, target_component) {
            return;
        }

        if sender != (self.partner_sysid, self.partner_compid) {
            crate::log_warn!("WPM: REQUEST from unexpected partner");
            let _ = out.push(status::critical("WPM: REJ. CMD: partner id mismatch"));
            return;
        }

        match self.state {
            TransferState::SendList => {
                if self.kind != kind {
                    crate::log_warn!("WPM: REQUEST with unexpected mission type");
                    return;
                }

                self.time_last_recv_us = now_us;

                if seq == self.transfer_seq && self.transfer_seq < self.transfer_count {
                    self.transfer_seq += 1;
                } else if self.transfer_seq > 0 && seq == self.transfer_seq - 1 {
                    // rebroadcast of the previous request; resend the item
                } else {
                    crate::log_error!(
                        "WPM: REQUEST seq {} unexpected (cursor {})",
                        seq,
                        self.transfer_seq
                    );
                    self.switch_to_idle(dm);
                    let (psysid, pcompid) = (self.partner_sysid, self.partner_compid);
                    self.emit_ack(out, psysid, pcompid, MavMissionResult::MAV_MISSION_ERROR);
                    let _ = out.push(status::critical("WPM: REJ. CMD: Req. WP was unexpected"));
                    return;
                }

                // the list may have shrunk between COUNT and this request
                if seq < self.registry.with(|r| r.count(self.kind)) {
                    let (psysid, pcompid) = (self.partner_sysid, self.partner_compid);
                    self.emit_item(out, now_us, dm, psysid, pcompid, seq);
                } else {
                    crate::log_error!("WPM: REQUEST seq {} out of bounds", seq);
                    self.switch_to_idle(dm);
                    let (psysid, pcompid) = (self.partner_sysid, self.partner_compid);
                    self.emit_ack(out, psysid, pcompid, MavMissionResult::MAV_MISSION_ERROR);
                    let _ = out.push(status::critical("WPM: REJ. CMD: Req. WP was unexpected"));
                }
            }

            TransferState::Idle => {
                // some OSDs fire stray requests; ignore quietly
                crate::log_warn!("WPM: REQUEST without transfer");
            }

            TransferState::GetList => {
                crate::log_warn!("WPM: REQUEST while receiving");
                let _ = out.push(status::critical("WPM: REJ. CMD: Busy"));
            }
        }
    }

    fn handle_mission_count<D: Dataman, B: NavigatorBus>(
        &mut self,
        data: &MISSION_COUNT_DATA,
        sender: (u8, u8),
        now_us: u64,
        dm: &mut D,
        bus: &mut B,
        out: &mut Responses,
    ) {
        if !self.targets_me(data.target_system, data.target_component) {
            return;
        }

        match self.state {
            TransferState::Idle => {
                self.time_last_recv_us = now_us;

                if self.registry.with(|r| r.transfer_in_progress) {
                    // another channel already owns the write buffer
                    self.emit_ack(out, sender.0, sender.1, MavMissionResult::MAV_MISSION_ERROR);
                    return;
                }
                self.registry.with_mut(|r| r.transfer_in_progress = true);

                let kind = MissionKind::from_wire(data.mission_type);
                self.kind = kind;

                if data.count > kind.max_item_count() {
                    crate::log_error!(
                        "WPM: COUNT {} exceeds capacity {}",
                        data.count,
                        kind.max_item_count()
                    );
                    self.emit_ack(out, sender.0, sender.1, MavMissionResult::MAV_MISSION_NO_SPACE);
                    self.registry.with_mut(|r| r.transfer_in_progress = false);
                    return;
                }

                if data.count == 0 {
                    // an upload of nothing is a clear
                    let id = self.registry.with(|r| r.dataman_id);
                    match kind {
                        MissionKind::Mission => {
                            let _ = self.update_active_mission(dm, bus, out, id.other(), 0, 0);
                        }
                        MissionKind::Fence => {
                            let _ = self.update_fence_count(dm, out, 0);
                        }
                        MissionKind::Rally => {
                            let _ = self.update_rally_count(dm, out, 0);
                        }
                        MissionKind::All => {
                            crate::log_error!("WPM: COUNT 0 with type ALL not handled");
                        }
                    }

                    self.emit_ack(out, sender.0, sender.1, MavMissionResult::MAV_MISSION_ACCEPTED);
                    self.registry.with_mut(|r| r.transfer_in_progress = false);
                    return;
                }

                crate::log_info!("WPM: COUNT {}, receiving", data.count);

                self.state = TransferState::GetList;
                self.transfer_seq = 0;
                self.partner_sysid = sender.0;
                self.partner_compid = sender.1;
                self.transfer_count = data.count;
                self.transfer_dataman_id = self.registry.with(|r| r.dataman_id).other();
                self.transfer_current_seq = -1;

                if kind == MissionKind::Fence {
                    // hold the lock for the whole rewrite; released on every
                    // path back to idle
                    match dm.lock(Namespace::FencePoints) {
                        Ok(()) => self.fence_locked = true,
                        Err(_e) => {
                            crate::log_error!("fence store locking failed: {}", _e);
                        }
                    }
                }
            }

            TransferState::GetList => {
                self.time_last_recv_us = now_us;

                if self.transfer_seq == 0 {
                    // our first REQUEST was lost; answer it again
                    crate::log_info!("WPM: COUNT {} repeated", data.count);
                } else {
                    crate::log_warn!("WPM: COUNT while already receiving");
                    let _ = out.push(status::critical("WPM: REJ. CMD: Busy"));
                    return;
                }
            }

            TransferState::SendList => {
                crate::log_warn!("WPM: COUNT while sending");
                let _ = out.push(status::critical("WPM: IGN MISSION_COUNT: Busy"));
                return;
            }
        }

        let (sysid, compid, seq) = (self.partner_sysid, self.partner_compid, self.transfer_seq);
        self.emit_request(out, now_us, sysid, compid, seq);
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_mission_item<D: Dataman, B: NavigatorBus>(
        &mut self,
        wire: &WireItem,
        target_system: u8,
        target_component: u8,
        now_us: u64,
        dm: &mut D,
        bus: &mut B,
        out: &mut Responses,
    ) {
        if !self.targets_me(target_system, target_component) {
            return;
        }

        if MissionKind::from_wire(wire.mission_type) != self.kind {
            crate::log_warn!("WPM: ITEM with unexpected mission type");
            return;
        }

        match self.state {
            TransferState::GetList => {
                self.time_last_recv_us = now_us;

                if wire.seq != self.transfer_seq {
                    // stale or duplicated item; the retry timer will
                    // re-request the one we want
                    crate::log_warn!(
                        "WPM: ITEM seq {} != expected {}",
                        wire.seq,
                        self.transfer_seq
                    );
                    return;
                }
            }
            TransferState::Idle => {
                crate::log_warn!("WPM: ITEM without transfer");
                let _ = out.push(status::critical("IGN MISSION_ITEM: No transfer"));
                return;
            }
            TransferState::SendList => {
                crate::log_warn!("WPM: ITEM while sending");
                let _ = out.push(status::critical("IGN MISSION_ITEM: Busy"));
                return;
            }
        }

        let item = match codec::item_from_wire(wire) {
            Ok(item) => item,
            Err(result) => {
                crate::log_error!("WPM: ITEM seq {} invalid", wire.seq);
                let _ = out.push(status::critical("IGN MISSION_ITEM: invalid item"));
                let (psysid, pcompid) = (self.partner_sysid, self.partner_compid);
                self.emit_ack(out, psysid, pcompid, result);
                self.switch_to_idle(dm);
                self.registry.with_mut(|r| r.transfer_in_progress = false);
                return;
            }
        };

        let mut write_failed = false;
        let mut check_failed = false;

        match self.kind {
            MissionKind::Mission => {
                // hardening against clients that mix list types
                if matches!(
                    item.nav_cmd,
                    MavCmd::MAV_CMD_NAV_FENCE_POLYGON_VERTEX_INCLUSION
                        | MavCmd::MAV_CMD_NAV_FENCE_POLYGON_VERTEX_EXCLUSION
                        | MavCmd::MAV_CMD_NAV_FENCE_CIRCLE_INCLUSION
                        | MavCmd::MAV_CMD_NAV_FENCE_CIRCLE_EXCLUSION
                        | MavCmd::MAV_CMD_NAV_RALLY_POINT
                ) {
                    check_failed = true;
                } else {
                    write_failed = layout::write_mission_item(
                        dm,
                        self.transfer_dataman_id,
                        wire.seq,
                        &item,
                    )
                    .is_err();
                }
            }

            MissionKind::Fence => {
                let point = FencePoint::from_item(&item);

                let is_polygon = matches!(
                    item.nav_cmd,
                    MavCmd::MAV_CMD_NAV_FENCE_POLYGON_VERTEX_INCLUSION
                        | MavCmd::MAV_CMD_NAV_FENCE_POLYGON_VERTEX_EXCLUSION
                );

                if is_polygon && item.vertex_count < 3 {
                    crate::log_error!("fence: polygon with too few vertices");
                    check_failed = true;
                    let _ = self.update_fence_count(dm, out, 0);
                } else {
                    write_failed = layout::write_fence_point(dm, wire.seq, &point).is_err();
                }
            }

            MissionKind::Rally => {
                let point = SafePoint::from_item(&item);
                write_failed = layout::write_safe_point(dm, wire.seq, &point).is_err();
            }

            MissionKind::All => {
                let _ = out.push(status::critical("Received unknown mission type, abort."));
                check_failed = true;
            }
        }

        if write_failed || check_failed {
            crate::log_error!("WPM: error storing seq {}", wire.seq);
            let (psysid, pcompid) = (self.partner_sysid, self.partner_compid);
            self.emit_ack(out, psysid, pcompid, MavMissionResult::MAV_MISSION_ERROR);

            if write_failed {
                self.notify_storage_error(out, "Mission storage: item write failed");
            }

            self.switch_to_idle(dm);
            self.registry.with_mut(|r| r.transfer_in_progress = false);
            return;
        }

        if wire.current {
            self.transfer_current_seq = wire.seq as i32;
        }

        self.transfer_seq = wire.seq + 1;

        if self.transfer_seq == self.transfer_count {
            crate::log_info!("WPM: got all {} items", self.transfer_count);

            let commit_ok = match self.kind {
                MissionKind::Mission => {
                    let (id, count, current) = (
                        self.transfer_dataman_id,
                        self.transfer_count,
                        self.transfer_current_seq,
                    );
                    self.update_active_mission(dm, bus, out, id, count, current).is_ok()
                }
                MissionKind::Fence => {
                    let count = self.transfer_count;
                    self.update_fence_count(dm, out, count).is_ok()
                }
                MissionKind::Rally => {
                    let count = self.transfer_count;
                    self.update_rally_count(dm, out, count).is_ok()
                }
                MissionKind::All => false,
            };

            // idle after the commit so the fence unlock follows the stats
            // write
            self.switch_to_idle(dm);

            let (psysid, pcompid) = (self.partner_sysid, self.partner_compid);
            let result = if commit_ok {
                MavMissionResult::MAV_MISSION_ACCEPTED
            } else {
                MavMissionResult::MAV_MISSION_ERROR
            };
            self.emit_ack(out, psysid, pcompid, result);

            self.registry.with_mut(|r| r.transfer_in_progress = false);
        } else {
            let (psysid, pcompid, seq) =
                (self.partner_sysid, self.partner_compid, self.transfer_seq);
            self.emit_request(out, now_us, psysid, pcompid, seq);
        }
    }

    fn handle_mission_clear_all<D: Dataman, B: NavigatorBus>(
        &mut self,
        data: &MISSION_CLEAR_ALL_DATA,
        sender: (u8, u8),
        now_us: u64,
        dm: &mut D,
        bus: &mut B,
        out: &mut Responses,
    ) {
        if !self.targets_me(data.target_system, data.target_component) {
            return;
        }

        if self.state != TransferState::Idle {
            crate::log_warn!("WPM: CLEAR_ALL while busy");
            let _ = out.push(status::critical("WPM: IGN CLEAR CMD: Busy"));
            return;
        }

        self.time_last_recv_us = now_us;

        // item storage keeps its slots; only the headers change
        let kind = MissionKind::from_wire(data.mission_type);
        self.kind = kind;

        let id = self.registry.with(|r| r.dataman_id);
        let ok = match kind {
            MissionKind::Mission => self
                .update_active_mission(dm, bus, out, id.other(), 0, 0)
                .is_ok(),
            MissionKind::Fence => self.update_fence_count(dm, out, 0).is_ok(),
            MissionKind::Rally => self.update_rally_count(dm, out, 0).is_ok(),
            MissionKind::All => {
                let mission_ok = self
                    .update_active_mission(dm, bus, out, id.other(), 0, 0)
                    .is_ok();
                let fence_ok = self.update_fence_count(dm, out, 0).is_ok();
                let rally_ok = self.update_rally_count(dm, out, 0).is_ok();
                mission_ok && fence_ok && rally_ok
            }
        };

        let result = if ok {
            crate::log_info!("WPM: CLEAR_ALL ok");
            MavMissionResult::MAV_MISSION_ACCEPTED
        } else {
            MavMissionResult::MAV_MISSION_ERROR
        };
        self.emit_ack(out, sender.0, sender.1, result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::MockState;
    use crate::pubsub::{MissionResult, MockNavigatorBus};
    use crate::storage::MockDataman;
    use mavlink::common::{
        MavFrame, MavMissionType, MISSION_ITEM_INT_DATA, MISSION_REQUEST_DATA,
    };

    const GCS_SYSID: u8 = 255;
    const GCS_COMPID: u8 = 190;

    fn gcs_header() -> mavlink::MavHeader {
        mavlink::MavHeader {
            system_id: GCS_SYSID,
            component_id: GCS_COMPID,
            sequence: 0,
        }
    }

    fn registry() -> MockState<MissionRegistry> {
        MockState::new(MissionRegistry::new())
    }

    fn manager<'a>(reg: &'a MockState<MissionRegistry>) -> MissionManager<'a, MockState<MissionRegistry>> {
        MissionManager::new(reg, 1, 1, MissionParams::default())
    }

    fn count_msg(kind: MavMissionType, count: u16) -> MavMessage {
        MavMessage::MISSION_COUNT(MISSION_COUNT_DATA {
            target_system: 1,
            target_component: 1,
            count,
            mission_type: kind,
            ..Default::default()
        })
    }

    fn item_int_msg(seq: u16, current: u8) -> MavMessage {
        MavMessage::MISSION_ITEM_INT(MISSION_ITEM_INT_DATA {
            target_system: 1,
            target_component: 1,
            seq,
            frame: MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT_INT,
            command: MavCmd::MAV_CMD_NAV_WAYPOINT,
            current,
            autocontinue: 1,
            param1: 0.0,
            param2: 5.0,
            param3: 0.0,
            param4: 0.0,
            x: 471000000 + seq as i32,
            y: 85000000 + seq as i32,
            z: 100.0,
            mission_type: MavMissionType::MAV_MISSION_TYPE_MISSION,
            ..Default::default()
        })
    }

    fn fence_item_msg(seq: u16, vertex_count: f32) -> MavMessage {
        MavMessage::MISSION_ITEM_INT(MISSION_ITEM_INT_DATA {
            target_system: 1,
            target_component: 1,
            seq,
            frame: MavFrame::MAV_FRAME_GLOBAL_INT,
            command: MavCmd::MAV_CMD_NAV_FENCE_POLYGON_VERTEX_INCLUSION,
            current: 0,
            autocontinue: 1,
            param1: vertex_count,
            param2: 0.0,
            param3: 0.0,
            param4: 0.0,
            x: 471000000,
            y: 85000000,
            z: 0.0,
            mission_type: MavMissionType::MAV_MISSION_TYPE_FENCE,
            ..Default::default()
        })
    }

    fn request_msg(seq: u16) -> MavMessage {
        MavMessage::MISSION_REQUEST(MISSION_REQUEST_DATA {
            target_system: 1,
            target_component: 1,
            seq,
            mission_type: MavMissionType::MAV_MISSION_TYPE_MISSION,
            ..Default::default()
        })
    }

    fn find_ack(responses: &Responses) -> Option<MISSION_ACK_DATA> {
        responses.iter().find_map(|m| match m {
            MavMessage::MISSION_ACK(d) => Some(d.clone()),
            _ => None,
        })
    }

    fn find_request_seq(responses: &Responses) -> Option<u16> {
        responses.iter().find_map(|m| match m {
            MavMessage::MISSION_REQUEST(d) => Some(d.seq),
            MavMessage::MISSION_REQUEST_INT(d) => Some(d.seq),
            _ => None,
        })
    }

    #[test]
    fn test_happy_upload() {
        let reg = registry();
        let mut mgr = manager(&reg);
        let mut dm = MockDataman::new();
        let mut bus = MockNavigatorBus::new();

        let responses = mgr.handle_message(
            &gcs_header(),
            &count_msg(MavMissionType::MAV_MISSION_TYPE_MISSION, 3),
            0,
            &mut dm,
            &mut bus,
        );
        assert_eq!(find_request_seq(&responses), Some(0));
        assert!(reg.with(|r| r.transfer_in_progress));

        for seq in 0..3u16 {
            let responses = mgr.handle_message(
                &gcs_header(),
                &item_int_msg(seq, (seq == 0) as u8),
                1000,
                &mut dm,
                &mut bus,
            );

            if seq < 2 {
                assert_eq!(find_request_seq(&responses), Some(seq + 1));
            } else {
                let ack = find_ack(&responses).expect("final ack");
                assert_eq!(ack.mavtype, MavMissionResult::MAV_MISSION_ACCEPTED);
            }
        }

        assert!(mgr.is_idle());
        assert!(reg.with(|r| !r.transfer_in_progress));
        assert_eq!(reg.with(|r| r.mission_count), 3);
        assert_eq!(reg.with(|r| r.current_seq), 0);
        // fresh registry starts on buffer zero; the upload flips it
        assert_eq!(reg.with(|r| r.dataman_id), DatamanId::One);

        // persisted items land in the formerly inactive buffer
        for seq in 0..3u16 {
            let item = layout::read_mission_item(&mut dm, DatamanId::One, seq).unwrap();
            assert!((item.lat - (47.1 + seq as f64 * 1e-7)).abs() < 1e-9);
        }

        // and the navigator saw exactly one commit
        assert_eq!(bus.published().len(), 1);
        assert_eq!(bus.last_published().unwrap().count, 3);
    }

    #[test]
    fn test_happy_download() {
        let reg = registry();
        reg.with_mut(|r| {
            r.loaded = true;
            r.mission_count = 2;
            r.current_seq = 0;
        });
        let mut mgr = manager(&reg);
        let mut dm = MockDataman::new();
        let mut bus = MockNavigatorBus::new();

        for seq in 0..2u16 {
            let item = MissionItem {
                lat: 47.1,
                lon: 8.5,
                altitude: 50.0 + seq as f32,
                altitude_is_relative: true,
                ..MissionItem::default()
            };
            layout::write_mission_item(&mut dm, DatamanId::Zero, seq, &item).unwrap();
        }

        let responses = mgr.handle_message(
            &gcs_header(),
            &MavMessage::MISSION_REQUEST_LIST(MISSION_REQUEST_LIST_DATA {
                target_system: 1,
                target_component: 1,
                mission_type: MavMissionType::MAV_MISSION_TYPE_MISSION,
                ..Default::default()
            }),
            0,
            &mut dm,
            &mut bus,
        );
        let count = responses
            .iter()
            .find_map(|m| match m {
                MavMessage::MISSION_COUNT(d) => Some(d.count),
                _ => None,
            })
            .expect("count reply");
        assert_eq!(count, 2);

        for seq in 0..2u16 {
            let responses =
                mgr.handle_message(&gcs_header(), &request_msg(seq), 1000, &mut dm, &mut bus);
            let item = responses
                .iter()
                .find_map(|m| match m {
                    MavMessage::MISSION_ITEM(d) => Some(d.clone()),
                    _ => None,
                })
                .expect("item reply");
            assert_eq!(item.seq, seq);
            assert_eq!(item.z, 50.0 + seq as f32);
            assert_eq!(item.current, (seq == 0) as u8);
        }

        let responses = mgr.handle_message(
            &gcs_header(),
            &MavMessage::MISSION_ACK(MISSION_ACK_DATA {
                target_system: 1,
                target_component: 1,
                mavtype: MavMissionResult::MAV_MISSION_ACCEPTED,
                mission_type: MavMissionType::MAV_MISSION_TYPE_MISSION,
                ..Default::default()
            }),
            2000,
            &mut dm,
            &mut bus,
        );
        assert!(responses.is_empty());
        assert!(mgr.is_idle());
    }

    #[test]
    fn test_upload_retry_after_lost_item() {
        let reg = registry();
        let mut mgr = manager(&reg);
        let mut dm = MockDataman::new();
        let mut bus = MockNavigatorBus::new();

        mgr.handle_message(
            &gcs_header(),
            &count_msg(MavMissionType::MAV_MISSION_TYPE_MISSION, 2),
            0,
            &mut dm,
            &mut bus,
        );
        mgr.handle_message(&gcs_header(), &item_int_msg(0, 1), 1000, &mut dm, &mut bus);

        // the GCS item for seq 1 is lost; before the retry timeout we stay
        // quiet, after it the request goes out again
        let responses = mgr.tick(200_000, &mut dm, &mut bus);
        assert_eq!(find_request_seq(&responses), None);

        let responses = mgr.tick(1000 + 500_001, &mut dm, &mut bus);
        assert_eq!(find_request_seq(&responses), Some(1));

        // transfer still completes
        let responses =
            mgr.handle_message(&gcs_header(), &item_int_msg(1, 0), 600_000, &mut dm, &mut bus);
        let ack = find_ack(&responses).expect("final ack");
        assert_eq!(ack.mavtype, MavMissionResult::MAV_MISSION_ACCEPTED);
    }

    #[test]
    fn test_repeated_count_answers_lost_request() {
        let reg = registry();
        let mut mgr = manager(&reg);
        let mut dm = MockDataman::new();
        let mut bus = MockNavigatorBus::new();

        mgr.handle_message(
            &gcs_header(),
            &count_msg(MavMissionType::MAV_MISSION_TYPE_MISSION, 2),
            0,
            &mut dm,
            &mut bus,
        );

        // our REQUEST(0) was lost, so the GCS repeats the COUNT
        let responses = mgr.handle_message(
            &gcs_header(),
            &count_msg(MavMissionType::MAV_MISSION_TYPE_MISSION, 2),
            100_000,
            &mut dm,
            &mut bus,
        );
        assert_eq!(find_request_seq(&responses), Some(0));
        assert!(!mgr.is_idle());

        // once an item arrived, a stray COUNT is refused instead
        mgr.handle_message(&gcs_header(), &item_int_msg(0, 1), 200_000, &mut dm, &mut bus);
        let responses = mgr.handle_message(
            &gcs_header(),
            &count_msg(MavMissionType::MAV_MISSION_TYPE_MISSION, 2),
            300_000,
            &mut dm,
            &mut bus,
        );
        assert_eq!(find_request_seq(&responses), None);
        assert!(responses
            .iter()
            .any(|m| matches!(m, MavMessage::STATUSTEXT(_))));
    }

    #[test]
    fn test_over_capacity_rejected() {
        let reg = registry();
        let mut mgr = manager(&reg);
        let mut dm = MockDataman::new();
        let mut bus = MockNavigatorBus::new();

        let responses = mgr.handle_message(
            &gcs_header(),
            &count_msg(
                MavMissionType::MAV_MISSION_TYPE_MISSION,
                crate::mission::MAX_MISSION_ITEMS + 1,
            ),
            0,
            &mut dm,
            &mut bus,
        );

        let ack = find_ack(&responses).expect("ack");
        assert_eq!(ack.mavtype, MavMissionResult::MAV_MISSION_NO_SPACE);
        assert!(mgr.is_idle());
        assert!(reg.with(|r| !r.transfer_in_progress));
    }

    #[test]
    fn test_count_at_capacity_accepted() {
        let reg = registry();
        let mut mgr = manager(&reg);
        let mut dm = MockDataman::new();
        let mut bus = MockNavigatorBus::new();

        let responses = mgr.handle_message(
            &gcs_header(),
            &count_msg(
                MavMissionType::MAV_MISSION_TYPE_RALLY,
                crate::mission::MAX_SAFE_POINTS,
            ),
            0,
            &mut dm,
            &mut bus,
        );
        assert_eq!(find_request_seq(&responses), Some(0));
        assert!(find_ack(&responses).is_none());
    }

    #[test]
    fn test_count_zero_clears_mission() {
        let reg = registry();
        reg.with_mut(|r| {
            r.loaded = true;
            r.mission_count = 5;
            r.current_seq = 2;
        });
        let mut mgr = manager(&reg);
        let mut dm = MockDataman::new();
        let mut bus = MockNavigatorBus::new();

        let responses = mgr.handle_message(
            &gcs_header(),
            &count_msg(MavMissionType::MAV_MISSION_TYPE_MISSION, 0),
            0,
            &mut dm,
            &mut bus,
        );

        let ack = find_ack(&responses).expect("ack");
        assert_eq!(ack.mavtype, MavMissionResult::MAV_MISSION_ACCEPTED);
        assert!(mgr.is_idle());
        assert_eq!(reg.with(|r| r.mission_count), 0);
        assert_eq!(reg.with(|r| r.current_seq), 0);
        // the buffer id flips so the navigator notices the change
        assert_eq!(reg.with(|r| r.dataman_id), DatamanId::One);
        assert_eq!(bus.published().len(), 1);
    }

    #[test]
    fn test_second_upload_rejected_while_transfer_in_progress() {
        let reg = registry();
        reg.with_mut(|r| {
            r.loaded = true;
            r.transfer_in_progress = true;
        });
        let mut mgr = manager(&reg);
        let mut dm = MockDataman::new();
        let mut bus = MockNavigatorBus::new();

        let responses = mgr.handle_message(
            &gcs_header(),
            &count_msg(MavMissionType::MAV_MISSION_TYPE_MISSION, 3),
            0,
            &mut dm,
            &mut bus,
        );

        let ack = find_ack(&responses).expect("ack");
        assert_eq!(ack.mavtype, MavMissionResult::MAV_MISSION_ERROR);
        assert!(mgr.is_idle());
        // the flag belongs to the other channel's transfer and stays up
        assert!(reg.with(|r| r.transfer_in_progress));
    }

    #[test]
    fn test_fence_upload_locks_and_rejects_thin_polygon() {
        let reg = registry();
        let mut mgr = manager(&reg);
        let mut dm = MockDataman::new();
        let mut bus = MockNavigatorBus::new();

        mgr.handle_message(
            &gcs_header(),
            &count_msg(MavMissionType::MAV_MISSION_TYPE_FENCE, 4),
            0,
            &mut dm,
            &mut bus,
        );
        assert_eq!(dm.locked(), Some(Namespace::FencePoints));

        let responses =
            mgr.handle_message(&gcs_header(), &fence_item_msg(0, 2.0), 1000, &mut dm, &mut bus);

        let ack = find_ack(&responses).expect("ack");
        assert_eq!(ack.mavtype, MavMissionResult::MAV_MISSION_ERROR);
        assert!(mgr.is_idle());
        assert_eq!(dm.locked(), None);
        assert_eq!(reg.with(|r| r.fence_count), 0);
        assert!(reg.with(|r| !r.transfer_in_progress));
    }

    #[test]
    fn test_fence_upload_completes_and_bumps_counter() {
        let reg = registry();
        let mut mgr = manager(&reg);
        let mut dm = MockDataman::new();
        let mut bus = MockNavigatorBus::new();

        let counter_before = reg.with(|r| r.fence_update_counter);

        mgr.handle_message(
            &gcs_header(),
            &count_msg(MavMissionType::MAV_MISSION_TYPE_FENCE, 3),
            0,
            &mut dm,
            &mut bus,
        );
        for seq in 0..3u16 {
            mgr.handle_message(
                &gcs_header(),
                &fence_item_msg(seq, 3.0),
                1000,
                &mut dm,
                &mut bus,
            );
        }

        assert!(mgr.is_idle());
        assert_eq!(dm.locked(), None);
        assert_eq!(reg.with(|r| r.fence_count), 3);
        assert!(reg.with(|r| r.fence_update_counter) > counter_before);

        let stats = layout::read_stats(&mut dm, Namespace::FencePoints).unwrap();
        assert_eq!(stats.num_items, 3);
    }

    #[test]
    fn test_upload_timeout_returns_to_idle() {
        let reg = registry();
        let mut mgr = manager(&reg);
        let mut dm = MockDataman::new();
        let mut bus = MockNavigatorBus::new();

        mgr.handle_message(
            &gcs_header(),
            &count_msg(MavMissionType::MAV_MISSION_TYPE_MISSION, 3),
            0,
            &mut dm,
            &mut bus,
        );
        mgr.handle_message(&gcs_header(), &item_int_msg(0, 1), 1000, &mut dm, &mut bus);

        // first tick past the deadline spends its turn on a retry; the next
        // one lands in the action timeout
        mgr.tick(1000 + 5_000_001, &mut dm, &mut bus);
        let responses = mgr.tick(1000 + 5_010_000, &mut dm, &mut bus);
        assert!(responses
            .iter()
            .any(|m| matches!(m, MavMessage::STATUSTEXT(_))));
        assert!(mgr.is_idle());
        assert!(reg.with(|r| !r.transfer_in_progress));
        // the active mission never changed
        assert_eq!(reg.with(|r| r.mission_count), 0);
        assert_eq!(reg.with(|r| r.dataman_id), DatamanId::Zero);
    }

    #[test]
    fn test_stale_item_seq_ignored() {
        let reg = registry();
        let mut mgr = manager(&reg);
        let mut dm = MockDataman::new();
        let mut bus = MockNavigatorBus::new();

        mgr.handle_message(
            &gcs_header(),
            &count_msg(MavMissionType::MAV_MISSION_TYPE_MISSION, 3),
            0,
            &mut dm,
            &mut bus,
        );

        // seq 2 while expecting 0: dropped without a reply, the retry timer
        // handles re-requesting
        let responses =
            mgr.handle_message(&gcs_header(), &item_int_msg(2, 0), 1000, &mut dm, &mut bus);
        assert!(responses.is_empty());
        assert!(!mgr.is_idle());
    }

    #[test]
    fn test_item_write_failure_fails_transfer() {
        let reg = registry();
        let mut mgr = manager(&reg);
        let mut dm = MockDataman::new();
        let mut bus = MockNavigatorBus::new();

        mgr.handle_message(
            &gcs_header(),
            &count_msg(MavMissionType::MAV_MISSION_TYPE_MISSION, 2),
            0,
            &mut dm,
            &mut bus,
        );

        dm.set_fail_writes(true);
        let responses =
            mgr.handle_message(&gcs_header(), &item_int_msg(0, 1), 1000, &mut dm, &mut bus);

        let ack = find_ack(&responses).expect("ack");
        assert_eq!(ack.mavtype, MavMissionResult::MAV_MISSION_ERROR);
        assert!(mgr.is_idle());
        assert!(reg.with(|r| !r.transfer_in_progress));
        assert_eq!(reg.with(|r| r.mission_count), 0);
    }

    #[test]
    fn test_storage_statustext_is_bounded() {
        let reg = registry();
        let mut mgr = manager(&reg);
        let mut dm = MockDataman::new();
        let mut bus = MockNavigatorBus::new();
        dm.set_fail_writes(true);

        let mut statustexts = 0;
        for round in 0..4 {
            mgr.handle_message(
                &gcs_header(),
                &count_msg(MavMissionType::MAV_MISSION_TYPE_MISSION, 2),
                round * 10_000,
                &mut dm,
                &mut bus,
            );
            let responses = mgr.handle_message(
                &gcs_header(),
                &item_int_msg(0, 0),
                round * 10_000 + 1000,
                &mut dm,
                &mut bus,
            );
            statustexts += responses
                .iter()
                .filter(|m| matches!(m, MavMessage::STATUSTEXT(_)))
                .count();
        }

        // the write failure is acked every time but the operator text stops
        // after the notify limit
        assert_eq!(statustexts, 2);
    }

    #[test]
    fn test_cross_type_item_in_mission_upload_rejected() {
        let reg = registry();
        let mut mgr = manager(&reg);
        let mut dm = MockDataman::new();
        let mut bus = MockNavigatorBus::new();

        mgr.handle_message(
            &gcs_header(),
            &count_msg(MavMissionType::MAV_MISSION_TYPE_MISSION, 2),
            0,
            &mut dm,
            &mut bus,
        );

        let mut rogue = fence_item_msg(0, 4.0);
        if let MavMessage::MISSION_ITEM_INT(data) = &mut rogue {
            data.mission_type = MavMissionType::MAV_MISSION_TYPE_MISSION;
        }
        let responses = mgr.handle_message(&gcs_header(), &rogue, 1000, &mut dm, &mut bus);

        let ack = find_ack(&responses).expect("ack");
        assert_eq!(ack.mavtype, MavMissionResult::MAV_MISSION_ERROR);
        assert!(mgr.is_idle());
    }

    #[test]
    fn test_request_switches_encoding() {
        let reg = registry();
        reg.with_mut(|r| {
            r.loaded = true;
            r.mission_count = 1;
        });
        let mut mgr = manager(&reg);
        let mut dm = MockDataman::new();
        let mut bus = MockNavigatorBus::new();

        let item = MissionItem {
            lat: 47.1,
            lon: 8.5,
            altitude: 100.0,
            ..MissionItem::default()
        };
        layout::write_mission_item(&mut dm, DatamanId::Zero, 0, &item).unwrap();

        mgr.handle_message(
            &gcs_header(),
            &MavMessage::MISSION_REQUEST_LIST(MISSION_REQUEST_LIST_DATA {
                target_system: 1,
                target_component: 1,
                mission_type: MavMissionType::MAV_MISSION_TYPE_MISSION,
                ..Default::default()
            }),
            0,
            &mut dm,
            &mut bus,
        );
        assert_eq!(mgr.encoding(), Encoding::Float);

        // the GCS asks in the int variant; we follow and scale coordinates
        let responses = mgr.handle_message(
            &gcs_header(),
            &MavMessage::MISSION_REQUEST_INT(MISSION_REQUEST_INT_DATA {
                target_system: 1,
                target_component: 1,
                seq: 0,
                mission_type: MavMissionType::MAV_MISSION_TYPE_MISSION,
                ..Default::default()
            }),
            1000,
            &mut dm,
            &mut bus,
        );

        assert_eq!(mgr.encoding(), Encoding::Int);
        let item = responses
            .iter()
            .find_map(|m| match m {
                MavMessage::MISSION_ITEM_INT(d) => Some(d.clone()),
                _ => None,
            })
            .expect("int item");
        assert_eq!(item.x, 471000000);
        assert_eq!(item.y, 85000000);
    }

    #[test]
    fn test_ack_rejection_flips_encoding_during_upload() {
        let reg = registry();
        let mut mgr = manager(&reg);
        let mut dm = MockDataman::new();
        let mut bus = MockNavigatorBus::new();

        mgr.handle_message(
            &gcs_header(),
            &count_msg(MavMissionType::MAV_MISSION_TYPE_MISSION, 2),
            0,
            &mut dm,
            &mut bus,
        );
        assert_eq!(mgr.encoding(), Encoding::Float);

        mgr.handle_message(
            &gcs_header(),
            &MavMessage::MISSION_ACK(MISSION_ACK_DATA {
                target_system: 1,
                target_component: 1,
                mavtype: MavMissionResult::MAV_MISSION_UNSUPPORTED,
                mission_type: MavMissionType::MAV_MISSION_TYPE_MISSION,
                ..Default::default()
            }),
            1000,
            &mut dm,
            &mut bus,
        );

        // the transfer itself keeps running; only the variant changes
        assert_eq!(mgr.encoding(), Encoding::Int);
        assert!(!mgr.is_idle());
    }

    #[test]
    fn test_partner_mismatch_rejected() {
        let reg = registry();
        reg.with_mut(|r| {
            r.loaded = true;
            r.mission_count = 1;
        });
        let mut mgr = manager(&reg);
        let mut dm = MockDataman::new();
        let mut bus = MockNavigatorBus::new();

        mgr.handle_message(
            &gcs_header(),
            &MavMessage::MISSION_REQUEST_LIST(MISSION_REQUEST_LIST_DATA {
                target_system: 1,
                target_component: 1,
                mission_type: MavMissionType::MAV_MISSION_TYPE_MISSION,
                ..Default::default()
            }),
            0,
            &mut dm,
            &mut bus,
        );

        // a different GCS interferes mid-download
        let intruder = mavlink::MavHeader {
            system_id: 42,
            component_id: 1,
            sequence: 0,
        };
        let responses = mgr.handle_message(&intruder, &request_msg(0), 1000, &mut dm, &mut bus);

        assert!(responses
            .iter()
            .any(|m| matches!(m, MavMessage::STATUSTEXT(_))));
        assert!(responses
            .iter()
            .all(|m| !matches!(m, MavMessage::MISSION_ITEM(_))));
        assert!(!mgr.is_idle());
    }

    #[test]
    fn test_wrong_target_ignored() {
        let reg = registry();
        let mut mgr = manager(&reg);
        let mut dm = MockDataman::new();
        let mut bus = MockNavigatorBus::new();

        let responses = mgr.handle_message(
            &gcs_header(),
            &MavMessage::MISSION_COUNT(MISSION_COUNT_DATA {
                target_system: 7,
                target_component: 1,
                count: 3,
                mission_type: MavMissionType::MAV_MISSION_TYPE_MISSION,
                ..Default::default()
            }),
            0,
            &mut dm,
            &mut bus,
        );

        assert!(responses.is_empty());
        assert!(mgr.is_idle());
    }

    #[test]
    fn test_set_current_persists_and_publishes() {
        let reg = registry();
        reg.with_mut(|r| {
            r.loaded = true;
            r.mission_count = 4;
            r.current_seq = 0;
        });
        let mut mgr = manager(&reg);
        let mut dm = MockDataman::new();
        let mut bus = MockNavigatorBus::new();

        mgr.handle_message(
            &gcs_header(),
            &MavMessage::MISSION_SET_CURRENT(MISSION_SET_CURRENT_DATA {
                target_system: 1,
                target_component: 1,
                seq: 2,
            }),
            0,
            &mut dm,
            &mut bus,
        );

        assert_eq!(reg.with(|r| r.current_seq), 2);
        assert_eq!(bus.last_published().unwrap().current_seq, 2);
        assert_eq!(layout::read_mission_header(&mut dm).unwrap().current_seq, 2);

        // out of range: state untouched, operator notified
        let responses = mgr.handle_message(
            &gcs_header(),
            &MavMessage::MISSION_SET_CURRENT(MISSION_SET_CURRENT_DATA {
                target_system: 1,
                target_component: 1,
                seq: 9,
            }),
            1000,
            &mut dm,
            &mut bus,
        );
        assert!(responses
            .iter()
            .any(|m| matches!(m, MavMessage::STATUSTEXT(_))));
        assert_eq!(reg.with(|r| r.current_seq), 2);
    }

    #[test]
    fn test_progress_broadcast_and_reached() {
        let reg = registry();
        reg.with_mut(|r| {
            r.loaded = true;
            r.mission_count = 3;
        });
        let mut mgr = manager(&reg);
        let mut dm = MockDataman::new();
        let mut bus = MockNavigatorBus::new();

        bus.push_result(MissionResult {
            seq_current: 1,
            seq_reached: 0,
            reached: true,
            ..MissionResult::default()
        });

        let responses = mgr.tick(1_000_000, &mut dm, &mut bus);
        assert!(responses
            .iter()
            .any(|m| matches!(m, MavMessage::MISSION_ITEM_REACHED(d) if d.seq == 0)));
        assert!(responses
            .iter()
            .any(|m| matches!(m, MavMessage::MISSION_CURRENT(d) if d.seq == 1)));
        assert_eq!(reg.with(|r| r.current_seq), 1);

        // shortly after, the reached notice repeats with the periodic
        // broadcast
        let responses = mgr.tick(1_200_000, &mut dm, &mut bus);
        assert!(responses
            .iter()
            .any(|m| matches!(m, MavMessage::MISSION_ITEM_REACHED(d) if d.seq == 0)));

        // past the resend window it stops
        let responses = mgr.tick(1_500_000, &mut dm, &mut bus);
        assert!(!responses
            .iter()
            .any(|m| matches!(m, MavMessage::MISSION_ITEM_REACHED(_))));
    }

    #[test]
    fn test_current_suppressed_without_mission() {
        let reg = registry();
        reg.with_mut(|r| r.loaded = true);
        let mut mgr = manager(&reg);
        let mut dm = MockDataman::new();
        let mut bus = MockNavigatorBus::new();

        for t in 1..20u64 {
            let responses = mgr.tick(t * 150_000, &mut dm, &mut bus);
            assert!(responses.is_empty());
        }
    }

    #[test]
    fn test_current_rate_limited() {
        let reg = registry();
        reg.with_mut(|r| {
            r.loaded = true;
            r.mission_count = 2;
            r.current_seq = 1;
        });
        let mut mgr = manager(&reg);
        let mut dm = MockDataman::new();
        let mut bus = MockNavigatorBus::new();

        // one simulated second of 10 ms ticks
        let mut sent = 0;
        for t in 0..100u64 {
            let responses = mgr.tick(1_000_000 + t * 10_000, &mut dm, &mut bus);
            sent += responses
                .iter()
                .filter(|m| matches!(m, MavMessage::MISSION_CURRENT(_)))
                .count();
        }
        assert!(sent <= 10, "sent {} MISSION_CURRENT in 1 s", sent);
        assert!(sent >= 9);
    }

    #[test]
    fn test_mission_replaced_on_other_channel_triggers_count() {
        let reg = registry();
        reg.with_mut(|r| r.loaded = true);
        let mut mgr = manager(&reg);
        let mut dm = MockDataman::new();
        let mut bus = MockNavigatorBus::new();

        // adopt the current buffer id
        mgr.tick(10_000, &mut dm, &mut bus);

        // another channel commits a new mission
        reg.with_mut(|r| {
            r.dataman_id = DatamanId::One;
            r.mission_count = 5;
        });

        let responses = mgr.tick(20_000, &mut dm, &mut bus);
        let count = responses
            .iter()
            .find_map(|m| match m {
                MavMessage::MISSION_COUNT(d) => Some(d.count),
                _ => None,
            })
            .expect("unsolicited count");
        assert_eq!(count, 5);

        // only once per change
        let responses = mgr.tick(30_000, &mut dm, &mut bus);
        assert!(!responses
            .iter()
            .any(|m| matches!(m, MavMessage::MISSION_COUNT(_))));
    }

    #[test]
    fn test_clear_all() {
        let reg = registry();
        reg.with_mut(|r| {
            r.loaded = true;
            r.mission_count = 3;
            r.fence_count = 2;
            r.rally_count = 1;
            r.current_seq = 1;
        });
        let mut mgr = manager(&reg);
        let mut dm = MockDataman::new();
        let mut bus = MockNavigatorBus::new();

        let responses = mgr.handle_message(
            &gcs_header(),
            &MavMessage::MISSION_CLEAR_ALL(MISSION_CLEAR_ALL_DATA {
                target_system: 1,
                target_component: 1,
                mission_type: MavMissionType::MAV_MISSION_TYPE_ALL,
                ..Default::default()
            }),
            0,
            &mut dm,
            &mut bus,
        );

        let ack = find_ack(&responses).expect("ack");
        assert_eq!(ack.mavtype, MavMissionResult::MAV_MISSION_ACCEPTED);
        assert_eq!(reg.with(|r| r.mission_count), 0);
        assert_eq!(reg.with(|r| r.fence_count), 0);
        assert_eq!(reg.with(|r| r.rally_count), 0);
        assert_eq!(reg.with(|r| r.current_seq), 0);
        assert_eq!(reg.with(|r| r.dataman_id), DatamanId::One);
    }

    #[test]
    fn test_download_request_rebroadcast_tolerated() {
        let reg = registry();
        reg.with_mut(|r| {
            r.loaded = true;
            r.mission_count = 2;
        });
        let mut mgr = manager(&reg);
        let mut dm = MockDataman::new();
        let mut bus = MockNavigatorBus::new();

        for seq in 0..2u16 {
            layout::write_mission_item(&mut dm, DatamanId::Zero, seq, &MissionItem::default())
                .unwrap();
        }

        mgr.handle_message(
            &gcs_header(),
            &MavMessage::MISSION_REQUEST_LIST(MISSION_REQUEST_LIST_DATA {
                target_system: 1,
                target_component: 1,
                mission_type: MavMissionType::MAV_MISSION_TYPE_MISSION,
                ..Default::default()
            }),
            0,
            &mut dm,
            &mut bus,
        );

        // seq 0, then seq 0 again (rebroadcast), then an out-of-order jump
        mgr.handle_message(&gcs_header(), &request_msg(0), 1000, &mut dm, &mut bus);
        let responses = mgr.handle_message(&gcs_header(), &request_msg(0), 2000, &mut dm, &mut bus);
        assert!(responses
            .iter()
            .any(|m| matches!(m, MavMessage::MISSION_ITEM(d) if d.seq == 0)));
        assert!(!mgr.is_idle());

        let responses = mgr.handle_message(&gcs_header(), &request_msg(5), 3000, &mut dm, &mut bus);
        let ack = find_ack(&responses).expect("error ack");
        assert_eq!(ack.mavtype, MavMissionResult::MAV_MISSION_ERROR);
        assert!(mgr.is_idle());
    }

    #[test]
    fn test_request_in_idle_ignored_quietly() {
        let reg = registry();
        reg.with_mut(|r| r.loaded = true);
        let mut mgr = manager(&reg);
        let mut dm = MockDataman::new();
        let mut bus = MockNavigatorBus::new();

        // empty-list download establishes the partner and completes at once
        mgr.handle_message(
            &gcs_header(),
            &MavMessage::MISSION_REQUEST_LIST(MISSION_REQUEST_LIST_DATA {
                target_system: 1,
                target_component: 1,
                mission_type: MavMissionType::MAV_MISSION_TYPE_MISSION,
                ..Default::default()
            }),
            0,
            &mut dm,
            &mut bus,
        );
        mgr.handle_message(
            &gcs_header(),
            &MavMessage::MISSION_ACK(MISSION_ACK_DATA {
                target_system: 1,
                target_component: 1,
                mavtype: MavMissionResult::MAV_MISSION_ACCEPTED,
                mission_type: MavMissionType::MAV_MISSION_TYPE_MISSION,
                ..Default::default()
            }),
            1000,
            &mut dm,
            &mut bus,
        );
        assert!(mgr.is_idle());

        // a stray request from that partner is dropped without a reply
        let responses =
            mgr.handle_message(&gcs_header(), &request_msg(0), 2000, &mut dm, &mut bus);
        assert!(responses.is_empty());
    }

    #[test]
    fn test_startup_load_restores_state() {
        let mut dm = MockDataman::new();
        layout::write_mission_header(
            &mut dm,
            &crate::mission::MissionHeader {
                dataman_id: DatamanId::One,
                count: 6,
                current_seq: 3,
            },
        )
        .unwrap();
        layout::write_stats(
            &mut dm,
            Namespace::FencePoints,
            &StatsEntry {
                num_items: 4,
                update_counter: 9,
            },
        )
        .unwrap();
        layout::write_stats(
            &mut dm,
            Namespace::SafePoints,
            &StatsEntry {
                num_items: 2,
                update_counter: 0,
            },
        )
        .unwrap();

        let reg = registry();
        let mut mgr = manager(&reg);
        let mut bus = MockNavigatorBus::new();
        mgr.tick(10_000, &mut dm, &mut bus);

        assert_eq!(reg.with(|r| r.dataman_id), DatamanId::One);
        assert_eq!(reg.with(|r| r.mission_count), 6);
        assert_eq!(reg.with(|r| r.current_seq), 3);
        assert_eq!(reg.with(|r| r.fence_count), 4);
        assert_eq!(reg.with(|r| r.fence_update_counter), 9);
        assert_eq!(reg.with(|r| r.rally_count), 2);
    }
}

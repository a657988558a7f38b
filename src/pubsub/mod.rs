//! Navigator-facing publish/subscribe boundary
//!
//! The mission manager consumes `mission_result` updates produced by the
//! navigator and publishes the active mission header whenever a commit
//! changes it. The concrete bus (uORB-style topics, channels, queues) is the
//! host's concern; the manager only sees this trait.

use crate::mission::MissionHeader;

/// Navigator progress report, one per tick at most.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MissionResult {
    /// Item the navigator is currently flying
    pub seq_current: i32,
    /// Item that was just reached (valid when `reached`)
    pub seq_reached: i32,
    /// An item was reached since the last report
    pub reached: bool,
    /// A DO_JUMP remaining-count changed
    pub item_do_jump_changed: bool,
    /// Index of the item whose jump count changed
    pub item_changed_index: u16,
}

/// Bus connecting the mission manager to the navigator.
pub trait NavigatorBus {
    /// Latest unseen mission result, consumed on read.
    fn poll_mission_result(&mut self) -> Option<MissionResult>;

    /// Publish a committed mission header so the navigator reloads.
    fn publish_mission(&mut self, header: &MissionHeader);
}

/// Test double: queued results in, published headers recorded.
pub struct MockNavigatorBus {
    results: heapless::Deque<MissionResult, 8>,
    published: heapless::Vec<MissionHeader, 16>,
}

impl Default for MockNavigatorBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNavigatorBus {
    pub fn new() -> Self {
        Self {
            results: heapless::Deque::new(),
            published: heapless::Vec::new(),
        }
    }

    /// Queue a mission result for the next poll.
    pub fn push_result(&mut self, result: MissionResult) {
        let _ = self.results.push_back(result);
    }

    /// Headers published so far, oldest first.
    pub fn published(&self) -> &[MissionHeader] {
        &self.published
    }

    /// The most recently published header.
    pub fn last_published(&self) -> Option<&MissionHeader> {
        self.published.last()
    }
}

impl NavigatorBus for MockNavigatorBus {
    fn poll_mission_result(&mut self) -> Option<MissionResult> {
        self.results.pop_front()
    }

    fn publish_mission(&mut self, header: &MissionHeader) {
        let _ = self.published.push(*header);
    }
}

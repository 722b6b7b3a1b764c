//! ## Stall watchdog
//!
//! Detects that no elevator is making progress while there are hall requests to serve.
//! When it fires, the assignment logic should take over all hall requests locally,
//! without waiting for the other nodes to agree.
//!
//! Progress means any node reporting a different floor than the last time we saw it.

use crate::print;
use crate::world_view::{GlobalState, NodeId};

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};


/// Sent when the watchdog fires: consider taking over all hall requests now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogTimeout {
    /// When the deadline was found to have passed
    pub fired_at: Instant,
}


/// Timer state. Owned by the task running [Watchdog::run].
#[derive(Debug)]
pub struct Watchdog {
    timeout: Duration,
    last_known_floor: HashMap<NodeId, i32>,
    enabled: bool,
    deadline: Instant,
}

impl Watchdog {
    /// Creates a disabled watchdog with a full window ahead of `now`
    pub fn new(timeout: Duration, now: Instant) -> Self {
        Self {
            timeout,
            last_known_floor: HashMap::new(),
            enabled: false,
            deadline: now + timeout,
        }
    }

    /// `true` while there are hall requests
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// When the watchdog fires next, if enabled
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    fn rearm(&mut self, now: Instant) {
        self.deadline = now + self.timeout;
    }

    /// Updates the timer from a new global state.
    ///
    /// ## Behavior
    /// - Enabled iff any hall request is set
    /// - Every node seen at another floor than last recorded restarts the window
    /// - Floors are recorded for every node, also the first time a node is seen
    /// - While disabled, and on the change from disabled to enabled, the window is restarted
    ///   so enabling always gives a full window
    pub fn observe(&mut self, state: &GlobalState, now: Instant) {
        let was_enabled = self.enabled;
        self.enabled = state.has_hall_requests();

        for (id, node) in &state.nodes {
            if let Some(prev) = self.last_known_floor.insert(id.clone(), node.floor) {
                if prev != node.floor {
                    self.rearm(now);
                }
            }
        }

        if !self.enabled || !was_enabled {
            self.rearm(now);
        }
    }

    /// Housekeeping, called on every tick and when the deadline is reached.
    ///
    /// ## Returns
    /// - `true` exactly once per passed deadline while enabled. The window is restarted at the same time
    /// - `false` otherwise. While disabled the window is kept fresh
    pub fn poll(&mut self, now: Instant) -> bool {
        if !self.enabled {
            self.rearm(now);
            return false;
        }
        if now >= self.deadline {
            self.rearm(now);
            return true;
        }
        false
    }

    /// Runs the watchdog.
    ///
    /// ## Parameters
    /// `state_rx`: The global state as it is published
    /// `timeout_tx`: [WatchdogTimeout]s for the assignment logic
    /// `tick_period`: Time between housekeeping ticks
    ///
    /// ## Note
    /// Returns when `state_rx` is closed.
    pub async fn run(
        mut self,
        mut state_rx: mpsc::Receiver<GlobalState>,
        timeout_tx: mpsc::Sender<WatchdogTimeout>,
        tick_period: Duration,
    ) {
        let mut tick = time::interval(tick_period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self.deadline;
            let fire_check = tokio::select! {
                update = state_rx.recv() => {
                    let Some(state) = update else { return };
                    self.observe(&state, Instant::now());
                    false
                }
                _ = time::sleep_until(deadline), if self.enabled => true,
                _ = tick.tick() => true,
            };

            if fire_check {
                let now = Instant::now();
                if self.poll(now) {
                    print::warn("Watchdog: no progress on outstanding hall requests".to_string());
                    let _ = timeout_tx.send(WatchdogTimeout { fired_at: now }).await;
                }
            }
        }
    }
}

//! ## Peer liveness
//!
//! Turns the raw stream of [GlobalState]s from the receiver into
//! - a filtered stream of peer states, with our own broadcasts and malformed snapshots removed
//! - lost-peer events, sent exactly once when a peer has been silent for longer than the peer timeout
//!
//! A peer that comes back after being reported lost is treated as a new peer.

use crate::config::NodeConfig;
use crate::print;
use crate::world_view::{GlobalState, NodeId};

use std::collections::HashMap;
use std::time::Duration;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};


/// Fault injection hook deciding whether an accepted packet is dropped on purpose.
pub trait PacketLoss: Send {
    /// Returns `true` if the packet should be thrown away
    fn drop_packet(&mut self) -> bool;
}

/// Never drops anything. Used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLoss;

impl PacketLoss for NoLoss {
    fn drop_packet(&mut self) -> bool {
        false
    }
}

/// Drops packets with a fixed probability
#[derive(Debug)]
pub struct RandomLoss {
    probability: f64,
    rng: StdRng,
}

impl RandomLoss {
    /// Creates a loss simulator seeded from OS entropy.
    pub fn new(probability: f64) -> Self {
        Self { probability, rng: StdRng::from_entropy() }
    }

    /// Creates a reproducible loss simulator. Only meant for tests.
    pub fn with_seed(probability: f64, seed: u64) -> Self {
        Self { probability, rng: StdRng::seed_from_u64(seed) }
    }
}

impl PacketLoss for RandomLoss {
    fn drop_packet(&mut self) -> bool {
        self.rng.gen::<f64>() < self.probability
    }
}

/// Picks [NoLoss] for a zero probability and [RandomLoss] otherwise
pub fn packet_loss(probability: f64) -> Box<dyn PacketLoss> {
    if probability > 0.0 {
        print::warn(format!("Simulating {:.0}% packet loss", probability * 100.0));
        Box::new(RandomLoss::new(probability))
    } else {
        Box::new(NoLoss)
    }
}


/// Liveness ledger for all peers we currently hear from.
///
/// Owned by the task running [PeerMonitor::run], never shared.
pub struct PeerMonitor {
    local_id: NodeId,
    n_floors: usize,
    n_buttons: usize,
    timeout: Duration,
    last_seen: HashMap<NodeId, Instant>,
    loss: Box<dyn PacketLoss>,
}

impl PeerMonitor {
    /// Creates a monitor with an empty ledger
    pub fn new(config: &NodeConfig, loss: Box<dyn PacketLoss>) -> Self {
        Self {
            local_id: config.local_id.clone(),
            n_floors: config.n_floors,
            n_buttons: config.n_buttons,
            timeout: config.peer_timeout,
            last_seen: HashMap::new(),
            loss,
        }
    }

    /// Decides whether a received state should be forwarded.
    ///
    /// ## Behavior
    /// - Own broadcasts reflected back are discarded
    /// - Snapshots with a hall request matrix of the wrong shape are discarded
    /// - Packets picked by the [PacketLoss] hook are discarded
    /// - Otherwise the origin is marked as seen at `now`
    ///
    /// ## Returns
    /// - `true` if the state should be forwarded
    pub fn accept(&mut self, state: &GlobalState, now: Instant) -> bool {
        if state.origin_id == self.local_id {
            return false;
        }
        if !state.has_dimensions(self.n_floors, self.n_buttons) {
            print::debug(format!("peer_monitor.rs: dropped state from {} with wrong dimensions", state.origin_id));
            return false;
        }
        if self.loss.drop_packet() {
            return false;
        }

        if self.last_seen.insert(state.origin_id.clone(), now).is_none() {
            print::ok(format!("New peer: {}", state.origin_id));
        }
        true
    }

    /// Removes every peer silent for longer than the peer timeout.
    ///
    /// ## Returns
    /// - Ids of the removed peers. Each lost peer is returned once, until it is accepted again
    pub fn sweep(&mut self, now: Instant) -> Vec<NodeId> {
        let timeout = self.timeout;
        let lost: Vec<NodeId> = self.last_seen
            .iter()
            .filter(|(_, seen)| now.saturating_duration_since(**seen) > timeout)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &lost {
            self.last_seen.remove(id);
        }
        lost
    }

    /// Ids of the peers currently considered alive
    pub fn peers(&self) -> Vec<NodeId> {
        self.last_seen.keys().cloned().collect()
    }

    /// Runs the monitor.
    ///
    /// ## Parameters
    /// `network_rx`: States decoded by the receiver
    /// `lost_tx`: Ids of lost peers
    /// `state_tx`: Accepted peer states
    /// `sweep_period`: Time between liveness sweeps
    ///
    /// ## Behavior
    /// - Sweeps on a fixed tick whether packets arrive or not
    ///
    /// ## Note
    /// Returns when `network_rx` is closed.
    pub async fn run(
        mut self,
        mut network_rx: mpsc::Receiver<GlobalState>,
        lost_tx: mpsc::Sender<NodeId>,
        state_tx: mpsc::Sender<GlobalState>,
        sweep_period: Duration,
    ) {
        let mut sweep = time::interval(sweep_period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                packet = network_rx.recv() => {
                    let Some(state) = packet else { return };
                    if self.accept(&state, Instant::now()) {
                        let _ = state_tx.send(state).await;
                    }
                }
                _ = sweep.tick() => {
                    for id in self.sweep(Instant::now()) {
                        print::warn(format!("Lost peer: {}", id));
                        let _ = lost_tx.send(id).await;
                    }
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    struct DropAll;
    impl PacketLoss for DropAll {
        fn drop_packet(&mut self) -> bool {
            true
        }
    }

    fn config() -> NodeConfig {
        let mut cfg = NodeConfig::new("a");
        cfg.peer_timeout = Duration::from_millis(500);
        cfg
    }

    fn monitor() -> PeerMonitor {
        PeerMonitor::new(&config(), Box::new(NoLoss))
    }

    #[test]
    fn own_states_are_never_tracked() {
        let mut pm = monitor();
        let now = Instant::now();
        assert!(!pm.accept(&GlobalState::new("a", 4, 2), now));
        assert!(pm.peers().is_empty());
        assert!(pm.sweep(now + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn wrong_dimensions_are_dropped() {
        let mut pm = monitor();
        assert!(!pm.accept(&GlobalState::new("b", 3, 2), Instant::now()));
        assert!(pm.peers().is_empty());
    }

    #[test]
    fn simulated_loss_drops_before_tracking() {
        let mut pm = PeerMonitor::new(&config(), Box::new(DropAll));
        assert!(!pm.accept(&GlobalState::new("b", 4, 2), Instant::now()));
        assert!(pm.peers().is_empty());
    }

    #[test]
    fn random_loss_is_roughly_the_probability() {
        let mut loss = RandomLoss::with_seed(0.25, 7);
        let dropped = (0..10_000).filter(|_| loss.drop_packet()).count();
        assert!((2000..3000).contains(&dropped), "dropped {}", dropped);

        let mut none = RandomLoss::with_seed(0.0, 7);
        assert!((0..1000).all(|_| !none.drop_packet()));
    }

    #[test]
    fn lost_peer_is_reported_exactly_once() {
        let mut pm = monitor();
        let t0 = Instant::now();
        assert!(pm.accept(&GlobalState::new("b", 4, 2), t0));
        assert!(pm.accept(&GlobalState::new("c", 4, 2), t0 + Duration::from_millis(400)));

        assert!(pm.sweep(t0 + Duration::from_millis(500)).is_empty());
        assert_eq!(pm.sweep(t0 + Duration::from_millis(501)), vec!["b".to_string()]);
        assert!(pm.sweep(t0 + Duration::from_millis(600)).is_empty());
        assert_eq!(pm.peers(), vec!["c".to_string()]);

        // Kjem tilbake som ny peer
        assert!(pm.accept(&GlobalState::new("b", 4, 2), t0 + Duration::from_millis(700)));
        assert!(pm.sweep(t0 + Duration::from_millis(1000)).contains(&"c".to_string()));
        assert!(pm.sweep(t0 + Duration::from_millis(1000)).is_empty());
        assert_eq!(pm.sweep(t0 + Duration::from_millis(1201)), vec!["b".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeps_run_without_input() {
        let (network_tx, network_rx) = mpsc::channel(10);
        let (lost_tx, mut lost_rx) = mpsc::channel(10);
        let (state_tx, mut state_rx) = mpsc::channel(10);
        tokio::spawn(monitor().run(network_rx, lost_tx, state_tx, Duration::from_millis(10)));

        network_tx.send(GlobalState::new("a", 4, 2)).await.unwrap();
        network_tx.send(GlobalState::new("b", 4, 2)).await.unwrap();
        assert_eq!(state_rx.recv().await.unwrap().origin_id, "b");

        // Ingen fleire pakker: peer timeout må likevel oppdagast
        let lost = lost_rx.recv().await.unwrap();
        assert_eq!(lost, "b");
        time::sleep(Duration::from_secs(2)).await;
        assert!(lost_rx.try_recv().is_err());
        assert!(state_rx.try_recv().is_err());
    }
}

//! ## Merging local and network updates
//!
//! The local elevator only knows about itself, and peers send complete snapshots as they see
//! the system. [Merger] turns the two into one stream of complete [GlobalState]s.
//!
//! ## Open question
//! No reconciliation is done between a local update and a peer snapshot arriving at about the
//! same time. Whichever is handled first is forwarded first, so a consumer holding its own copy
//! ends up with the last one delivered. If the two disagree on a hall request bit, the last one
//! wins and the other node's change is lost until it is broadcast again.

use super::{GlobalState, NodeId, NodeState};

use tokio::sync::mpsc;


/// Holds the most recent known snapshot. Owned by the task running [merge_update_channels].
#[derive(Debug, Clone)]
pub struct Merger {
    local_id: NodeId,
    latest: GlobalState,
}

impl Merger {
    /// Starts from `initial`, normally [GlobalState::new] for the local node
    pub fn new(initial: GlobalState) -> Self {
        Self {
            local_id: initial.origin_id.clone(),
            latest: initial,
        }
    }

    /// Splices the local elevator's state into the latest snapshot.
    ///
    /// All other nodes are kept as last known. The result is stamped with the local id,
    /// since it is now our view.
    ///
    /// ## Returns
    /// - The complete snapshot to forward
    pub fn on_local(&mut self, node: NodeState) -> GlobalState {
        self.latest.origin_id = self.local_id.clone();
        self.latest.nodes.insert(self.local_id.clone(), node);
        self.latest.clone()
    }

    /// A peer snapshot is already complete. It is forwarded as is and becomes the latest known snapshot.
    pub fn on_peer(&mut self, state: GlobalState) -> GlobalState {
        self.latest = state;
        self.latest.clone()
    }

    /// The most recent known snapshot
    pub fn latest(&self) -> &GlobalState {
        &self.latest
    }
}


/// Merges the local elevator's updates and peer snapshots into `out_tx`.
///
/// ## Parameters
/// `merger`: Holds the starting snapshot
/// `network_rx`: Accepted peer snapshots from the [PeerMonitor](crate::network::peer_monitor::PeerMonitor)
/// `local_rx`: State updates from the local elevator
/// `out_tx`: Complete snapshots, in the order the inputs were handled
///
/// ## Note
/// Returns when both inputs are closed, or `out_tx` is.
pub async fn merge_update_channels(
    mut merger: Merger,
    mut network_rx: mpsc::Receiver<GlobalState>,
    mut local_rx: mpsc::Receiver<NodeState>,
    out_tx: mpsc::Sender<GlobalState>,
) {
    let mut network_open = true;
    let mut local_open = true;

    while network_open || local_open {
        let merged = tokio::select! {
            update = network_rx.recv(), if network_open => match update {
                Some(state) => merger.on_peer(state),
                None => { network_open = false; continue; }
            },
            update = local_rx.recv(), if local_open => match update {
                Some(node) => merger.on_local(node),
                None => { local_open = false; continue; }
            },
        };

        if out_tx.send(merged).await.is_err() {
            return;
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::world_view::{Dirn, ElevatorBehaviour};

    fn at_floor(floor: i32) -> NodeState {
        NodeState {
            floor,
            direction: Dirn::Idle,
            behaviour: ElevatorBehaviour::Idle,
            cab_requests: vec![false; 4],
        }
    }

    fn peer_snapshot() -> GlobalState {
        let mut peer = GlobalState::new("B", 4, 2);
        peer.nodes.insert("A".to_string(), at_floor(3));
        peer.nodes.insert("B".to_string(), at_floor(1));
        peer.hall_requests[0][1] = true;
        peer
    }

    #[test]
    fn local_update_is_spliced_into_latest_peer_snapshot() {
        let mut merger = Merger::new(GlobalState::new("A", 4, 2));
        let peer = peer_snapshot();
        assert_eq!(merger.on_peer(peer.clone()), peer);

        let merged = merger.on_local(at_floor(4));
        assert_eq!(merged.origin_id, "A");
        assert_eq!(merged.nodes.len(), 2);
        assert_eq!(merged.nodes["A"].floor, 4);
        assert_eq!(merged.nodes["B"].floor, 1);
        assert_eq!(merged.hall_requests, peer.hall_requests);
    }

    #[test]
    fn local_updates_keep_earlier_nodes() {
        let mut merger = Merger::new(GlobalState::new("A", 4, 2));
        merger.on_local(at_floor(1));
        let merged = merger.on_local(at_floor(2));
        assert_eq!(merged.nodes.len(), 1);
        assert_eq!(merged.nodes["A"].floor, 2);
        assert_eq!(merger.latest(), &merged);
    }

    #[tokio::test]
    async fn forwards_in_handling_order() {
        let (network_tx, network_rx) = mpsc::channel(10);
        let (local_tx, local_rx) = mpsc::channel(10);
        let (out_tx, mut out_rx) = mpsc::channel(10);
        tokio::spawn(merge_update_channels(
            Merger::new(GlobalState::new("A", 4, 2)),
            network_rx,
            local_rx,
            out_tx,
        ));

        network_tx.send(peer_snapshot()).await.unwrap();
        assert_eq!(out_rx.recv().await.unwrap(), peer_snapshot());

        local_tx.send(at_floor(4)).await.unwrap();
        let merged = out_rx.recv().await.unwrap();
        assert_eq!(merged.nodes["A"].floor, 4);
        assert_eq!(merged.nodes["B"].floor, 1);

        drop(network_tx);
        drop(local_tx);
        assert!(out_rx.recv().await.is_none());
    }
}

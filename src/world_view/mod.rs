//! ## World view
//!
//! The types describing what one node believes about the whole system:
//! every node's [NodeState] and the shared hall request matrix, bundled in a [GlobalState].
//!
//! ## Sub-modules
//! - [world_view_update]: merges local elevator updates with snapshots received from peers

pub mod world_view_update;

use serde::{Serialize, Deserialize};
use std::collections::HashMap;

use crate::network::bcast::Tagged;


/// Identifier of a node on the network
pub type NodeId = String;

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Direction an elevator is taking calls in.
pub enum Dirn {
    Down = -1,
    Idle = 0,
    Up = 1,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// The current behaviour of an elevator
pub enum ElevatorBehaviour {
    Idle,
    Moving,
    DoorOpen,
}


/// State of one elevator, as reported by the node owning it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeState {
    /// Last floor the elevator was seen at
    pub floor: i32,

    /// [Dirn]
    ///  Default: [Dirn::Idle]
    pub direction: Dirn,

    /// The current behaviour of the elevator
    ///  Default: [ElevatorBehaviour::Idle]
    pub behaviour: ElevatorBehaviour,

    /// One entry per floor
    pub cab_requests: Vec<bool>,
}

impl NodeState {
    /// Initial state of an elevator on a building with `n_floors` floors
    pub fn new(n_floors: usize) -> Self {
        Self {
            floor: 0,
            direction: Dirn::Idle,
            behaviour: ElevatorBehaviour::Idle,
            cab_requests: vec![false; n_floors],
        }
    }
}


/// Represents one node's view of the system.
///
/// Sent on the network as it is, and forwarded between the local tasks by value.
/// `origin_id` tells who produced the snapshot. It is only used to filter out our own
/// broadcasts when they come back, never to decide which snapshot wins.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GlobalState {
    /// The node that produced this snapshot
    pub origin_id: NodeId,

    /// Every node known to the origin
    pub nodes: HashMap<NodeId, NodeState>,

    /// `hall_requests[floor][button]`. Dimensions are fixed for the lifetime of the process
    pub hall_requests: Vec<Vec<bool>>,
}

impl Tagged for GlobalState {
    const TAG: &'static str = "world_view.GlobalState";
}

impl GlobalState {
    /// Creates a snapshot containing only `origin_id` in its initial state,
    /// and no hall requests.
    pub fn new(origin_id: impl Into<NodeId>, n_floors: usize, n_buttons: usize) -> Self {
        let origin_id = origin_id.into();
        let mut nodes = HashMap::new();
        nodes.insert(origin_id.clone(), NodeState::new(n_floors));
        Self {
            origin_id,
            nodes,
            hall_requests: vec![vec![false; n_buttons]; n_floors],
        }
    }

    /// Returns `true` if at least one hall request is set anywhere in the matrix.
    pub fn has_hall_requests(&self) -> bool {
        self.hall_requests.iter().flatten().any(|r| *r)
    }

    /// Returns `true` if the hall request matrix is `n_floors` x `n_buttons`.
    pub fn has_dimensions(&self, n_floors: usize, n_buttons: usize) -> bool {
        self.hall_requests.len() == n_floors
            && self.hall_requests.iter().all(|row| row.len() == n_buttons)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_contains_only_origin() {
        let state = GlobalState::new("a", 4, 2);
        assert_eq!(state.nodes.len(), 1);
        assert_eq!(state.nodes["a"], NodeState::new(4));
        assert!(state.has_dimensions(4, 2));
        assert!(!state.has_dimensions(4, 3));
        assert!(!state.has_hall_requests());
    }

    #[test]
    fn any_cell_enables_hall_requests() {
        let mut state = GlobalState::new("a", 4, 2);
        state.hall_requests[3][1] = true;
        assert!(state.has_hall_requests());
    }

    #[test]
    fn json_round_trip() {
        let mut state = GlobalState::new("a", 4, 2);
        state.hall_requests[2][0] = true;
        state.nodes.insert("b".to_string(), NodeState {
            floor: 3,
            direction: Dirn::Down,
            behaviour: ElevatorBehaviour::Moving,
            cab_requests: vec![true, false, false, true],
        });

        let json = serde_json::to_string(&state).unwrap();
        assert!(json.starts_with('{'));
        assert!(json.contains("\"hallRequests\""));
        let back: GlobalState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}

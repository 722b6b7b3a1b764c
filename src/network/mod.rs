//! ## Network module
//!
//! This module is responsible for everything that goes between the nodes.
//! Nodes only talk through UDP broadcast, which may drop packets, and there is no central coordinator.
//!
//! ## Sub-modules
//! - [medium]: The raw broadcast medium, UDP or in-process
//! - [bcast]: Multiplexing typed message streams onto one medium
//! - [peer_monitor]: Filtering received states and detecting lost peers
//! - [broadcaster]: Re-sending the latest global state on a fixed interval
//!
//! ## Key Features
//! - Any number of message types can share one port, told apart by a type tag in front of the JSON
//! - Lost packets are made up for by periodic re-broadcast, not by retransmission
//! - Only the transport tasks touch the sockets

pub mod medium;
pub mod bcast;
pub mod peer_monitor;
pub mod broadcaster;

#![warn(missing_docs)]
//! # This projects library
//!
//! This library keeps the global state of a group of elevator nodes approximately synchronized over
//! an unreliable broadcast network, without any central coordinator, and detects lost peers and
//! stalled elevators.
//!
//! ## Overview
//! - **config**: Default parameters and the runtime configuration of a node.
//! - **init**: Reading arguments and spawning the tasks of a node.
//! - **print**: Color coded terminal logging.
//! - **network**: The multiplexed broadcast transport, peer liveness and periodic re-broadcast.
//! - **world_view**: The global state, and merging of local and network updates into it.
//! - **manager**: Signals for the hall request assignment, the stall watchdog.

/// Global variables
pub mod config;

/// Initialize functions
pub mod init;

/// Print functions with color coding
pub mod print;

pub mod network;

pub mod world_view;

pub mod manager;

//! ## Manager module
//!
//! Signals for the hall request assignment. The assignment itself runs outside this crate;
//! what it gets from here is the merged global state, lost peers, and [watchdog] timeouts.

pub mod watchdog;

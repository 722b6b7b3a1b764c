//! # config.rs – Centralized Parameter Store
//!
//! This module holds the default program parameters used throughout the system,
//! and the [NodeConfig] struct carrying the values a running node actually uses.
//! Keeping configuration in one place makes tuning, experimentation, and testing easier.
//!
//! The defaults can be overridden on the command line, see [crate::init::parse_args].

use std::sync::Mutex;
use std::time::Duration;
use once_cell::sync::Lazy;

//
// ──────────────────────────────────────────────────────────────
//   1. NETWORK SETTINGS
// ──────────────────────────────────────────────────────────────
//

/// Port the global state is broadcast on
pub static BROADCAST_PORT: u16 = 42069;

/// UDP broadcast listen address (bind address)
pub static BC_LISTEN_ADDR: &str = "0.0.0.0";

/// Broadcast address used for system-wide state sharing
pub static BC_ADDR: &str = "255.255.255.255";

/// Size of UDP receive buffer in bytes
pub const UDP_BUFFER: usize = u16::MAX as usize;

//
// ──────────────────────────────────────────────────────────────
//   2. SYSTEM & ELEVATOR PARAMETERS
// ──────────────────────────────────────────────────────────────
//

/// Default number of floors in Sanntidshallen setup
pub const DEFAULT_NUM_FLOORS: usize = 4;

/// Default number of hall button types (up, down)
pub const DEFAULT_NUM_BUTTONS: usize = 2;

/// Capacity of the bounded channels between tasks
pub const CHANNEL_CAPACITY: usize = 10;

//
// ──────────────────────────────────────────────────────────────
//   3. TIMING & TIMEOUTS & INTERVALS
// ──────────────────────────────────────────────────────────────
//

/// Time between each re-broadcast of the latest global state
pub const BCAST_INTERVAL: Duration = Duration::from_millis(100);

/// A peer not heard from in this long is reported lost
pub const PEER_TIMEOUT: Duration = Duration::from_millis(1000);

/// Time without progress (while hall requests exist) before the watchdog fires
pub const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(8);

/// Period of the housekeeping tick in the peer monitor and the watchdog
pub const SWEEP_PERIOD: Duration = Duration::from_millis(10);

//
// ──────────────────────────────────────────────────────────────
//   4. FAULT INJECTION
// ──────────────────────────────────────────────────────────────
//

/// Probability of dropping an accepted packet on purpose. Must stay 0.0 outside testing.
pub const PACKET_LOSS_PROBABILITY: f64 = 0.0;

//
// ──────────────────────────────────────────────────────────────
//   5. LOGGING CONFIGURATION
// ──────────────────────────────────────────────────────────────
//

/// Enable/disable printing of the global state
pub static PRINT_STATE_ON: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::new(false));

/// Enable/disable printing of errors
pub static PRINT_ERR_ON: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::new(true));

/// Enable/disable printing of warnings
pub static PRINT_WARN_ON: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::new(true));

/// Enable/disable printing of success messages
pub static PRINT_OK_ON: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::new(true));

/// Enable/disable printing of general info
pub static PRINT_INFO_ON: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::new(true));

/// Enable/disable printing of dropped datagrams and other noise
pub static PRINT_DEBUG_ON: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::new(false));


/// Runtime configuration of one node.
///
/// Built from the defaults above and overridden by [crate::init::parse_args].
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    /// The id this node broadcasts as. Default: local IPv4 address
    pub local_id: String,
    /// Number of floors, fixes the row count of the hall request matrix
    pub n_floors: usize,
    /// Number of hall button types, fixes the column count of the hall request matrix
    pub n_buttons: usize,
    /// UDP port the global state is broadcast on
    pub broadcast_port: u16,
    /// See [WATCHDOG_TIMEOUT]
    pub watchdog_timeout: Duration,
    /// See [PEER_TIMEOUT]
    pub peer_timeout: Duration,
    /// See [BCAST_INTERVAL]
    pub bcast_interval: Duration,
    /// See [SWEEP_PERIOD]
    pub sweep_period: Duration,
    /// See [PACKET_LOSS_PROBABILITY]
    pub packet_loss: f64,
}

impl NodeConfig {
    /// Creates a config with all defaults and the given node id
    pub fn new(local_id: impl Into<String>) -> Self {
        Self {
            local_id: local_id.into(),
            n_floors: DEFAULT_NUM_FLOORS,
            n_buttons: DEFAULT_NUM_BUTTONS,
            broadcast_port: BROADCAST_PORT,
            watchdog_timeout: WATCHDOG_TIMEOUT,
            peer_timeout: PEER_TIMEOUT,
            bcast_interval: BCAST_INTERVAL,
            sweep_period: SWEEP_PERIOD,
            packet_loss: PACKET_LOSS_PROBABILITY,
        }
    }

    /// Checks that the values make sense before any task is started.
    ///
    /// ## Returns
    /// - `Err` describing the first offending value
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.local_id.is_empty() {
            anyhow::bail!("node id can not be empty");
        }
        if self.n_floors == 0 || self.n_buttons == 0 {
            anyhow::bail!("need at least one floor and one button type, got {}x{}", self.n_floors, self.n_buttons);
        }
        let durations = [
            ("watchdog_timeout", self.watchdog_timeout),
            ("peer_timeout", self.peer_timeout),
            ("bcast_interval", self.bcast_interval),
            ("sweep_period", self.sweep_period),
        ];
        for (name, d) in durations {
            if d.is_zero() {
                anyhow::bail!("{} can not be zero", name);
            }
        }
        if !(0.0..1.0).contains(&self.packet_loss) {
            anyhow::bail!("packet_loss must be in [0, 1), got {}", self.packet_loss);
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(NodeConfig::new("node1").validate().is_ok());
    }

    #[test]
    fn rejects_bad_values() {
        let mut cfg = NodeConfig::new("");
        assert!(cfg.validate().is_err());

        cfg.local_id = "node1".to_string();
        cfg.n_buttons = 0;
        assert!(cfg.validate().is_err());

        cfg.n_buttons = 2;
        cfg.sweep_period = Duration::ZERO;
        assert!(cfg.validate().is_err());

        cfg.sweep_period = SWEEP_PERIOD;
        cfg.packet_loss = 1.0;
        assert!(cfg.validate().is_err());
    }
}

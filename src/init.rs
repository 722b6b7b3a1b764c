//! ## Startup
//!
//! Reading the configuration from the command line, and spawning the tasks of one node
//! with the channels between them.

use crate::config::{self, NodeConfig};
use crate::manager::watchdog::{Watchdog, WatchdogTimeout};
use crate::network::bcast::{Receiver, Transmitter, TransportConfigError};
use crate::network::broadcaster;
use crate::network::medium::Medium;
use crate::network::peer_monitor::{PacketLoss, PeerMonitor};
use crate::print;
use crate::world_view::world_view_update::{self, Merger};
use crate::world_view::{GlobalState, NodeId, NodeState};

use std::time::Duration;
use anyhow::{bail, Context};
use local_ip_address::local_ip;
use tokio::sync::mpsc;
use tokio::time::Instant;


/// ### Reads arguments from `cargo run`
///
/// Arguments are on the form `key::value`. Available options:
///
/// `id::<string>` &rarr; Node id. Default: the local IPv4 address
/// `floors::<n>` &rarr; Number of floors
/// `buttons::<n>` &rarr; Number of hall button types
/// `port::<n>` &rarr; UDP broadcast port
/// `watchdog_ms::<n>` &rarr; Watchdog timeout
/// `peer_timeout_ms::<n>` &rarr; Time before a silent peer is reported lost
/// `bcast_ms::<n>` &rarr; Interval between re-broadcasts
/// `sweep_ms::<n>` &rarr; Housekeeping tick
/// `packet_loss::<p>` &rarr; Simulated packet loss, 0.0 - 1.0. Testing only
/// `print_state::(true/false)` &rarr; Prints the global state twice per second
/// `print_err::(true/false)` &rarr; Prints error messages
/// `print_warn::(true/false)` &rarr; Prints warning messages
/// `print_ok::(true/false)` &rarr; Prints OK messages
/// `print_info::(true/false)` &rarr; Prints informational messages
/// `print_debug::(true/false)` &rarr; Prints dropped datagrams
/// `debug` &rarr; Disables all prints except error messages
/// `help` &rarr; Displays all possible arguments without starting the program
///
/// ## Returns
/// - The configuration, not yet validated
/// - `Err` on unknown keys or values that do not parse, or if no id is given and the local IP can not be read
pub fn parse_args<I: IntoIterator<Item = String>>(args: I) -> anyhow::Result<NodeConfig> {
    let mut cfg = NodeConfig::new("");
    let mut id: Option<String> = None;

    for arg in args {
        let lower = arg.to_lowercase();
        if lower == "help" {
            print_help();
            std::process::exit(0);
        }
        if lower == "debug" {
            for flag in [&config::PRINT_STATE_ON, &config::PRINT_WARN_ON, &config::PRINT_OK_ON, &config::PRINT_INFO_ON, &config::PRINT_DEBUG_ON] {
                set_flag(flag, false);
            }
            continue;
        }

        let Some((key, value)) = arg.split_once("::") else {
            bail!("unknown argument '{}', try 'help'", arg);
        };
        let key = key.to_lowercase();
        let is_true = value.to_lowercase() == "true";

        match key.as_str() {
            "id" => id = Some(value.to_string()),
            "floors" => cfg.n_floors = value.parse().with_context(|| format!("floors::{}", value))?,
            "buttons" => cfg.n_buttons = value.parse().with_context(|| format!("buttons::{}", value))?,
            "port" => cfg.broadcast_port = value.parse().with_context(|| format!("port::{}", value))?,
            "watchdog_ms" => cfg.watchdog_timeout = parse_millis(&key, value)?,
            "peer_timeout_ms" => cfg.peer_timeout = parse_millis(&key, value)?,
            "bcast_ms" => cfg.bcast_interval = parse_millis(&key, value)?,
            "sweep_ms" => cfg.sweep_period = parse_millis(&key, value)?,
            "packet_loss" => cfg.packet_loss = value.parse().with_context(|| format!("packet_loss::{}", value))?,
            "print_state" => set_flag(&config::PRINT_STATE_ON, is_true),
            "print_err" => set_flag(&config::PRINT_ERR_ON, is_true),
            "print_warn" => set_flag(&config::PRINT_WARN_ON, is_true),
            "print_ok" => set_flag(&config::PRINT_OK_ON, is_true),
            "print_info" => set_flag(&config::PRINT_INFO_ON, is_true),
            "print_debug" => set_flag(&config::PRINT_DEBUG_ON, is_true),
            _ => bail!("unknown argument '{}', try 'help'", arg),
        }
    }

    cfg.local_id = match id {
        Some(id) => id,
        None => local_ip().context("no id:: given and failed to get local IP")?.to_string(),
    };
    Ok(cfg)
}

fn parse_millis(key: &str, value: &str) -> anyhow::Result<Duration> {
    let ms: u64 = value.parse().with_context(|| format!("{}::{}", key, value))?;
    Ok(Duration::from_millis(ms))
}

fn set_flag(flag: &std::sync::Mutex<bool>, on: bool) {
    if let Ok(mut f) = flag.lock() {
        *f = on;
    }
}

fn print_help() {
    println!("Tilgjengelige argument:");
    println!("  id::<string>            (standard: lokal IP)");
    println!("  floors::<n>             (standard: {})", config::DEFAULT_NUM_FLOORS);
    println!("  buttons::<n>            (standard: {})", config::DEFAULT_NUM_BUTTONS);
    println!("  port::<n>               (standard: {})", config::BROADCAST_PORT);
    println!("  watchdog_ms::<n>        (standard: {})", config::WATCHDOG_TIMEOUT.as_millis());
    println!("  peer_timeout_ms::<n>    (standard: {})", config::PEER_TIMEOUT.as_millis());
    println!("  bcast_ms::<n>           (standard: {})", config::BCAST_INTERVAL.as_millis());
    println!("  sweep_ms::<n>           (standard: {})", config::SWEEP_PERIOD.as_millis());
    println!("  packet_loss::<0.0-1.0>  (kun testing)");
    println!("  print_state::true/false");
    println!("  print_err::true/false");
    println!("  print_warn::true/false");
    println!("  print_ok::true/false");
    println!("  print_info::true/false");
    println!("  print_debug::true/false");
    println!("  debug (kun error-meldingar vises)");
}


/// The channel ends a running node exposes to the local elevator and the assignment logic.
pub struct NodeHandles {
    /// Updates from the local elevator, into the merger
    pub local_state_tx: mpsc::Sender<NodeState>,

    /// Complete global states from the merger
    pub state_update_rx: mpsc::Receiver<GlobalState>,

    /// The global state as decided by the assignment logic.
    /// Goes to the broadcaster and the watchdog
    pub publish_tx: mpsc::Sender<GlobalState>,

    /// Ids of lost peers
    pub lost_peer_rx: mpsc::Receiver<NodeId>,

    /// Watchdog timeouts
    pub watchdog_timeout_rx: mpsc::Receiver<WatchdogTimeout>,
}

/// ### Spawns all tasks of one node
///
/// ## Parameters
/// `config`: Validated configuration
/// `tx_medium`: Medium the transmitter broadcasts on
/// `rx_medium`: Medium the receiver listens on
/// `loss`: Packet loss hook for the peer monitor
///
/// ## Behavior
/// - Builds the transport first. A bad registration table stops here, before any task is spawned
/// - Spawns transmitter, receiver, peer monitor, merger, broadcaster, watchdog, and a task
///   copying every published state to both the broadcaster and the watchdog
///
/// ## Note
/// Must be called from within a tokio runtime. The tasks run until their input channels close.
pub fn spawn_node<Mt: Medium, Mr: Medium>(
    config: &NodeConfig,
    tx_medium: Mt,
    rx_medium: Mr,
    loss: Box<dyn PacketLoss>,
) -> Result<NodeHandles, TransportConfigError> {
    let cap = config::CHANNEL_CAPACITY;

    let (network_tx, network_tx_rx) = mpsc::channel::<GlobalState>(cap);
    let (network_rx_tx, network_rx) = mpsc::channel::<GlobalState>(cap);
    let transmitter = Transmitter::builder().stream(network_tx_rx).build()?;
    let receiver = Receiver::builder().stream(network_rx_tx).build()?;

    let (peer_state_tx, peer_state_rx) = mpsc::channel::<GlobalState>(cap);
    let (lost_peer_tx, lost_peer_rx) = mpsc::channel::<NodeId>(cap);
    let (local_state_tx, local_state_rx) = mpsc::channel::<NodeState>(cap);
    let (state_update_tx, state_update_rx) = mpsc::channel::<GlobalState>(cap);
    let (publish_tx, publish_rx) = mpsc::channel::<GlobalState>(cap);
    let (bcast_update_tx, bcast_update_rx) = mpsc::channel::<GlobalState>(cap);
    let (watchdog_state_tx, watchdog_state_rx) = mpsc::channel::<GlobalState>(cap);
    let (watchdog_timeout_tx, watchdog_timeout_rx) = mpsc::channel::<WatchdogTimeout>(cap);

    tokio::spawn(transmitter.run(tx_medium));
    tokio::spawn(async move {
        if let Err(e) = receiver.run(rx_medium).await {
            print::err(format!("init.rs, receiver stopped: {}", e));
        }
    });

    let monitor = PeerMonitor::new(config, loss);
    tokio::spawn(monitor.run(network_rx, lost_peer_tx, peer_state_tx, config.sweep_period));

    let merger = Merger::new(GlobalState::new(config.local_id.clone(), config.n_floors, config.n_buttons));
    tokio::spawn(world_view_update::merge_update_channels(merger, peer_state_rx, local_state_rx, state_update_tx));

    tokio::spawn(broadcaster::broadcast_state(bcast_update_rx, network_tx, config.bcast_interval));

    let watchdog = Watchdog::new(config.watchdog_timeout, Instant::now());
    tokio::spawn(watchdog.run(watchdog_state_rx, watchdog_timeout_tx, config.sweep_period));

    tokio::spawn(fan_out(publish_rx, bcast_update_tx, watchdog_state_tx));

    Ok(NodeHandles {
        local_state_tx,
        state_update_rx,
        publish_tx,
        lost_peer_rx,
        watchdog_timeout_rx,
    })
}

/// Copies every published state to the broadcaster and the watchdog
async fn fan_out(
    mut publish_rx: mpsc::Receiver<GlobalState>,
    bcast_update_tx: mpsc::Sender<GlobalState>,
    watchdog_state_tx: mpsc::Sender<GlobalState>,
) {
    while let Some(state) = publish_rx.recv().await {
        let _ = watchdog_state_tx.send(state.clone()).await;
        let _ = bcast_update_tx.send(state).await;
    }
}

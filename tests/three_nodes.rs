//! Three nodes on one in-process broadcast medium.

use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};

use elevatorsync::config::NodeConfig;
use elevatorsync::init::{self, NodeHandles};
use elevatorsync::network::medium::MemoryHub;
use elevatorsync::network::peer_monitor::NoLoss;
use elevatorsync::world_view::GlobalState;

const BCAST: Duration = Duration::from_millis(100);
const WATCHDOG: Duration = Duration::from_secs(3);
const PEER_TIMEOUT: Duration = Duration::from_secs(1);

fn config(id: &str) -> NodeConfig {
    let mut cfg = NodeConfig::new(id);
    cfg.n_floors = 4;
    cfg.n_buttons = 2;
    cfg.bcast_interval = BCAST;
    cfg.watchdog_timeout = WATCHDOG;
    cfg.peer_timeout = PEER_TIMEOUT;
    cfg.sweep_period = Duration::from_millis(10);
    cfg
}

struct Node {
    publish_tx: mpsc::Sender<GlobalState>,
    lost_peer_rx: mpsc::Receiver<String>,
    watchdog_timeout_rx: mpsc::Receiver<elevatorsync::manager::watchdog::WatchdogTimeout>,
    /// Fires the first time this node sees node1's hall request
    saw_request: Option<oneshot::Receiver<Instant>>,
}

/// Starts a node and keeps its merged state stream drained, so the pipeline never backs up
async fn start(hub: &MemoryHub, id: &str) -> Node {
    let cfg = config(id);
    let NodeHandles {
        local_state_tx: _,
        mut state_update_rx,
        publish_tx,
        lost_peer_rx,
        watchdog_timeout_rx,
    } = init::spawn_node(&cfg, hub.attach(), hub.attach(), Box::new(NoLoss)).unwrap();

    let (seen_tx, saw_request) = oneshot::channel();
    tokio::spawn(async move {
        let mut seen_tx = Some(seen_tx);
        while let Some(state) = state_update_rx.recv().await {
            if state.origin_id == "node1" && state.hall_requests[2][0] {
                if let Some(tx) = seen_tx.take() {
                    let _ = tx.send(Instant::now());
                }
            }
        }
    });

    publish_tx.send(GlobalState::new(id, 4, 2)).await.unwrap();
    Node { publish_tx, lost_peer_rx, watchdog_timeout_rx, saw_request: Some(saw_request) }
}

#[tokio::test(start_paused = true)]
async fn hall_request_spreads_and_stalled_node_takes_over() {
    let hub = MemoryHub::new(256);
    let mut node1 = start(&hub, "node1").await;
    let mut node2 = start(&hub, "node2").await;
    let mut node3 = start(&hub, "node3").await;
    time::sleep(BCAST * 3).await;

    let mut with_request = GlobalState::new("node1", 4, 2);
    with_request.hall_requests[2][0] = true;
    node1.publish_tx.send(with_request.clone()).await.unwrap();
    let published_at = Instant::now();

    for node in [&mut node2, &mut node3] {
        let saw_request = node.saw_request.take().unwrap();
        let seen_at = time::timeout(BCAST * 2, saw_request).await.unwrap().unwrap();
        assert!(seen_at - published_at <= BCAST, "seen after {:?}", seen_at - published_at);
        assert!(node.watchdog_timeout_rx.try_recv().is_err());
    }

    // node1 står i ro: éin timeout per vindauge, dei andre har ingenting å ta over
    time::sleep_until(published_at + WATCHDOG * 3 + WATCHDOG / 2).await;
    let mut fired = Vec::new();
    while let Ok(timeout) = node1.watchdog_timeout_rx.try_recv() {
        fired.push(timeout.fired_at);
    }
    assert_eq!(fired.len(), 3);
    assert!(fired[0] >= published_at + WATCHDOG);
    for pair in fired.windows(2) {
        assert!(pair[1] - pair[0] >= WATCHDOG);
    }

    // Bestillinga er ekspedert
    node1.publish_tx.send(GlobalState::new("node1", 4, 2)).await.unwrap();
    time::sleep(WATCHDOG * 2).await;
    assert!(node1.watchdog_timeout_rx.try_recv().is_err());

    // Alle tre har broadcasta heile vegen
    for node in [&mut node1, &mut node2, &mut node3] {
        assert!(node.lost_peer_rx.try_recv().is_err());
        assert!(!node.publish_tx.is_closed());
    }
}

#[tokio::test(start_paused = true)]
async fn silent_peer_is_lost_once() {
    let hub = MemoryHub::new(256);
    let mut node1 = start(&hub, "node1").await;
    let mut node2 = start(&hub, "node2").await;
    let node3 = start(&hub, "node3").await;
    time::sleep(BCAST * 3).await;

    // Utan publish-kanal stoppar broadcastinga til node3
    drop(node3);
    let silenced_at = Instant::now();

    for node in [&mut node1, &mut node2] {
        let lost = time::timeout(PEER_TIMEOUT * 2, node.lost_peer_rx.recv()).await.unwrap();
        assert_eq!(lost.as_deref(), Some("node3"));
    }
    assert!(Instant::now() - silenced_at >= PEER_TIMEOUT - BCAST);

    time::sleep(PEER_TIMEOUT * 3).await;
    assert!(node1.lost_peer_rx.try_recv().is_err());
    assert!(node2.lost_peer_rx.try_recv().is_err());
}

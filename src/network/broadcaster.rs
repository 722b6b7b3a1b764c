//! ## Periodic re-broadcast of the latest global state

use crate::world_view::GlobalState;

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};


/// Keeps re-sending the latest known [GlobalState] on a fixed interval.
///
/// ## Parameters
/// `update_rx`: New snapshots to broadcast. Each replaces the one held
/// `network_tx`: Outbound stream registered on the [Transmitter](super::bcast::Transmitter)
/// `interval`: Time between each broadcast
///
/// ## Behavior
/// - Waits for the first snapshot before sending anything
/// - Sends the held snapshot every `interval`, also when nothing has changed,
///   so a lost packet is made up for by the next one
/// - New snapshots are not sent immediately, only on the next tick
///
/// ## Note
/// Returns when `update_rx` or `network_tx` is closed.
pub async fn broadcast_state(
    mut update_rx: mpsc::Receiver<GlobalState>,
    network_tx: mpsc::Sender<GlobalState>,
    interval: Duration,
) {
    let Some(mut latest) = update_rx.recv().await else { return };

    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if network_tx.send(latest.clone()).await.is_err() {
                    return;
                }
            }
            update = update_rx.recv() => {
                match update {
                    Some(state) => latest = state,
                    None => return,
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn resends_latest_every_interval() {
        let (update_tx, update_rx) = mpsc::channel(10);
        let (network_tx, mut network_rx) = mpsc::channel(10);
        tokio::spawn(broadcast_state(update_rx, network_tx, Duration::from_millis(100)));

        // Ingenting før første snapshot
        time::sleep(Duration::from_millis(350)).await;
        assert!(network_rx.try_recv().is_err());

        update_tx.send(GlobalState::new("a", 4, 2)).await.unwrap();
        for _ in 0..3 {
            assert_eq!(network_rx.recv().await.unwrap().origin_id, "a");
        }

        let mut newer = GlobalState::new("a", 4, 2);
        newer.hall_requests[1][1] = true;
        update_tx.send(newer.clone()).await.unwrap();
        // Maks éin gammal i kø før den nye kjem fram
        let mut got = network_rx.recv().await.unwrap();
        if got != newer {
            got = network_rx.recv().await.unwrap();
        }
        assert_eq!(got, newer);
    }
}

use std::time::Duration;
use anyhow::Context;

use elevatorsync::network::medium::UdpMedium;
use elevatorsync::network::peer_monitor;
use elevatorsync::world_view::GlobalState;
use elevatorsync::{init, print};


#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = init::parse_args(std::env::args().skip(1))?;
    config.validate().context("invalid configuration")?;
    print::info(format!("Starter node '{}' på port {}", config.local_id, config.broadcast_port));

    /* START ----------- Init av nettverk og tasks ---------------------- */
    let tx_medium = UdpMedium::sender(config.broadcast_port).context("failed to open broadcast socket")?;
    let rx_medium = UdpMedium::bind(config.broadcast_port).context("failed to bind broadcast listener")?;
    let loss = peer_monitor::packet_loss(config.packet_loss);

    let mut node = init::spawn_node(&config, tx_medium, rx_medium, loss)
        .context("invalid transport configuration")?;
    /* SLUTT ----------- Init av nettverk og tasks ---------------------- */

    // Første tilstand til den lokale heisen, så vi har noko å broadcaste
    let mut latest = GlobalState::new(config.local_id.clone(), config.n_floors, config.n_buttons);
    node.local_state_tx.send(latest.nodes[&config.local_id].clone()).await?;
    print::ok("System initiated".to_string());

    // Stand-in for tildelinga: publiser den samanslåtte tilstanden som vår eigen
    let mut print_timer = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            Some(mut state) = node.state_update_rx.recv() => {
                state.origin_id = config.local_id.clone();
                latest = state.clone();
                node.publish_tx.send(state).await?;
            }
            Some(id) = node.lost_peer_rx.recv() => {
                latest.nodes.remove(&id);
                node.publish_tx.send(latest.clone()).await?;
            }
            Some(timeout) = node.watchdog_timeout_rx.recv() => {
                print::warn(format!("Watchdog timeout at {:?}: all hall requests should be served locally", timeout.fired_at));
            }
            _ = print_timer.tick() => print::global_state(&latest),
        }
    }
}

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::runtime::Builder;
use tracing::info;
use tracing_subscriber::EnvFilter;

use netsim::{ProtocolRegistry, SimulationConfig, SimulationDriver};

#[derive(Parser)]
#[command(name = "netsim", about = "Run a simulated router network")]
struct Cli {
    /// Scenario file describing devices and links
    #[arg(long)]
    config: PathBuf,

    /// Override the tick interval from the scenario
    #[arg(long)]
    tick_ms: Option<u64>,

    #[arg(long, default_value_t = 60)]
    duration_secs: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = SimulationConfig::load(&cli.config)
        .with_context(|| format!("loading scenario {}", cli.config.display()))?;
    let tick = Duration::from_millis(cli.tick_ms.unwrap_or(config.driver.tick_interval_ms));

    let rt = Builder::new_multi_thread().enable_all().build()?;

    rt.block_on(async {
        let network = config.build_network(&ProtocolRegistry::with_defaults()).await?;
        let stats = network.network_statistics();
        info!(
            devices = stats.total_devices,
            connections = stats.total_connections,
            "Network built"
        );

        let driver = SimulationDriver::new(network.clone(), tick);
        let handle = driver.start();

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(cli.duration_secs)) => {
                info!("Simulation time elapsed");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
            }
        }
        driver.stop();
        handle.await?;

        for device in network.devices() {
            info!("=== {} ({}) routing table ===", device.name(), device.vendor());
            for route in device.routing_table() {
                info!(
                    "  {:<18} via {:<15} dev {:<10} {} [{}/{}]",
                    route.destination.to_string(),
                    route.next_hop.to_string(),
                    route.interface,
                    route.protocol,
                    route.administrative_distance,
                    route.metric
                );
            }
        }
        info!(ticks = driver.ticks(), "Done");
        Ok::<(), anyhow::Error>(())
    })
}

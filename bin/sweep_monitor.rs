//! # Sweep Monitor Service
//!
//! Runs the threshold monitor against the wallets in PostgreSQL and sweeps every
//! wallet whose total USD value rises above the configured threshold.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin sweep_monitor -- --config Config.toml
//! cargo run --bin sweep_monitor -- --once --threshold-usd 250
//! ```
//!
//! Press Ctrl+C to stop. A cycle already in progress finishes first.

use anyhow::Result;
use clap::Parser;
use custody_sweep_sdk::{
    monitor::StartOutcome,
    notifications::{LogSink, NotificationSink, WebhookSink},
    BalanceAggregator, LiveGateway, PgWalletStore, PriceCache, Settings, SweepExecutor,
    ThresholdMonitor, WalletStore,
};
use log::{info, warn};
use std::sync::Arc;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(name = "sweep_monitor", about = "Threshold-triggered multi-chain sweep monitor")]
struct Args {
    /// Settings file (TOML)
    #[arg(long, default_value = "Config.toml")]
    config: String,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Poll interval used when the store holds no monitor config
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Threshold used when the store holds no monitor config
    #[arg(long)]
    threshold_usd: Option<f64>,

    /// Prometheus listen address
    #[cfg(feature = "observability")]
    #[arg(long, default_value = "0.0.0.0:9090")]
    metrics_addr: std::net::SocketAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    println!("🚀 Starting Sweep Monitor");
    println!("═══════════════════════════════════════════════════════════════════\n");

    let settings = Settings::load(&args.config)?;
    println!("✅ Settings loaded from {}", args.config);

    #[cfg(feature = "observability")]
    {
        custody_sweep_sdk::metrics::install_exporter(args.metrics_addr)?;
        println!("✅ Metrics exporter listening on {}", args.metrics_addr);
    }

    let store: Arc<dyn WalletStore> = Arc::new(PgWalletStore::connect(&settings.database).await?);
    println!("✅ Database connected");

    let gateway = Arc::new(LiveGateway::from_settings(&settings)?);
    let prices = Arc::new(PriceCache::from_settings(&settings.price)?);
    println!("✅ Chain gateway and price cache ready");

    let sink: Arc<dyn NotificationSink> = match &settings.notifications.webhook_url {
        Some(url) => {
            println!("✅ Notifications: webhook {}", url);
            Arc::new(WebhookSink::new(url.clone())?)
        }
        None => {
            println!("✅ Notifications: log only");
            Arc::new(LogSink)
        }
    };

    let executor = SweepExecutor::new(store.clone(), gateway.clone(), gateway.clone(), sink.clone());
    let monitor = ThresholdMonitor::new(
        store,
        BalanceAggregator::new(gateway),
        prices,
        executor,
        sink,
        settings.monitor.clone(),
    );

    if args.once {
        let report = monitor.run_cycle().await?;
        println!(
            "✅ Cycle complete: {} wallets, {} sweeps attempted, {} failed ({:?})",
            report.wallets.len(),
            report.sweeps_attempted(),
            report.sweeps_failed(),
            report.elapsed
        );
        return Ok(());
    }

    let interval_ms = args.interval_ms.unwrap_or(settings.monitor.interval_ms);
    let threshold_usd = args.threshold_usd.unwrap_or(settings.monitor.threshold_usd);
    match monitor.start(interval_ms, threshold_usd).await? {
        StartOutcome::Started(Ok(report)) => info!(
            "First cycle: {} wallets, {} sweeps attempted",
            report.wallets.len(),
            report.sweeps_attempted()
        ),
        StartOutcome::Started(Err(e)) => {
            warn!("⚠️ First cycle failed ({}); monitor keeps polling", e.classification())
        }
        StartOutcome::AlreadyRunning => {}
    }

    println!("\nPress Ctrl+C to stop gracefully...\n");
    signal::ctrl_c().await?;
    println!("\n🛑 Shutdown signal received, stopping monitor...");
    monitor.stop();
    if monitor.is_running() {
        warn!("⚠️ Monitor still reports running after stop");
    }

    println!("✅ Sweep monitor stopped");
    Ok(())
}

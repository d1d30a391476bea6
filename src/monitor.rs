// src/monitor.rs

//! Threshold monitor.
//!
//! Periodically values every stored wallet and hands the ones whose total USD value
//! is strictly above the configured threshold to the [`SweepExecutor`].
//!
//! ## Lifecycle
//!
//! `Stopped -> start() -> Running -> stop() -> Stopped`. `start` on a running
//! monitor is a no-op. A failed cycle, the first one included, is logged and
//! the monitor keeps running. `stop` only prevents future cycles; a cycle already
//! in flight runs to completion.
//!
//! ## Configuration
//!
//! Every cycle takes a fresh [`MonitorConfig`] snapshot from the store and never
//! mutates it. When the store holds no configuration, the values passed to
//! `start` (or the `[monitor]` settings) are used instead.

use crate::balance_aggregator::{value_balances, BalanceAggregator};
use crate::database::WalletStore;
use crate::error::{Result, SweepError};
use crate::metrics;
use crate::notifications::{NotificationEvent, NotificationSink};
use crate::price_cache::PriceCache;
use crate::settings::{MonitorSettings, ResweepPolicy};
use crate::sweep::SweepExecutor;
use crate::types::{MonitorConfig, SweepOutcome, Wallet};
use dashmap::DashMap;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use uuid::Uuid;

/// Strictly greater: a total equal to the threshold does not trigger a sweep.
pub fn exceeds_threshold(total_usd: f64, threshold_usd: f64) -> bool {
    total_usd > threshold_usd
}

#[derive(Debug, Clone, PartialEq)]
pub enum SweepStatus {
    BelowThreshold,
    /// Above threshold but already swept when it first crossed (`on_crossing` policy).
    Suppressed,
    Completed(Vec<SweepOutcome>),
    Failed { classification: &'static str, error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct WalletCycle {
    pub wallet_id: Uuid,
    pub total_usd: f64,
    pub failed_balances: usize,
    pub sweep: SweepStatus,
}

/// What one monitoring cycle saw and did.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub config: MonitorConfig,
    pub wallets: Vec<WalletCycle>,
    pub elapsed: Duration,
}

/// Result of [`ThresholdMonitor::start`].
#[derive(Debug)]
pub enum StartOutcome {
    AlreadyRunning,
    /// The monitor is running; holds the result of the cycle run at startup.
    Started(Result<CycleReport>),
}

impl CycleReport {
    pub fn sweeps_attempted(&self) -> usize {
        self.wallets
            .iter()
            .filter(|w| matches!(w.sweep, SweepStatus::Completed(_) | SweepStatus::Failed { .. }))
            .count()
    }

    pub fn sweeps_failed(&self) -> usize {
        self.wallets
            .iter()
            .filter(|w| matches!(w.sweep, SweepStatus::Failed { .. }))
            .count()
    }
}

struct MonitorInner {
    store: Arc<dyn WalletStore>,
    aggregator: BalanceAggregator,
    prices: Arc<PriceCache>,
    executor: SweepExecutor,
    sink: Arc<dyn NotificationSink>,
    settings: MonitorSettings,
    running: AtomicBool,
    /// Bumped by every start/stop; a scheduling loop exits once it no longer
    /// matches the epoch it was started with.
    epoch: watch::Sender<u64>,
    /// `(interval_ms, threshold_usd)` passed to the last `start`.
    start_args: RwLock<Option<(u64, f64)>>,
    /// Wallets swept while above the threshold and not yet seen below it again.
    swept_above: DashMap<Uuid, ()>,
}

#[derive(Clone)]
pub struct ThresholdMonitor {
    inner: Arc<MonitorInner>,
}

impl ThresholdMonitor {
    pub fn new(
        store: Arc<dyn WalletStore>,
        aggregator: BalanceAggregator,
        prices: Arc<PriceCache>,
        executor: SweepExecutor,
        sink: Arc<dyn NotificationSink>,
        settings: MonitorSettings,
    ) -> Self {
        let (epoch, _) = watch::channel(0);
        Self {
            inner: Arc::new(MonitorInner {
                store,
                aggregator,
                prices,
                executor,
                sink,
                settings,
                running: AtomicBool::new(false),
                epoch,
                start_args: RwLock::new(None),
                swept_above: DashMap::new(),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Runs one cycle now and schedules the following ones.
    ///
    /// Returns [`StartOutcome::AlreadyRunning`] when the monitor was already running.
    /// Once started, the monitor keeps running even if the first cycle fails; that
    /// failure is handed back in [`StartOutcome::Started`]. `Err` means the
    /// configuration could not be loaded and the monitor stays stopped.
    pub async fn start(&self, interval_ms: u64, threshold_usd: f64) -> Result<StartOutcome> {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Monitor already running; start ignored");
            return Ok(StartOutcome::AlreadyRunning);
        }
        if let Ok(mut args) = self.inner.start_args.write() {
            *args = Some((interval_ms, threshold_usd));
        }

        if let Err(e) = self.inner.load_config().await {
            self.inner.running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let mut epoch = 0;
        self.inner.epoch.send_modify(|e| {
            *e += 1;
            epoch = *e;
        });
        info!(
            "▶️ Threshold monitor started (interval {}ms, threshold ${:.2})",
            interval_ms, threshold_usd
        );

        let first = self.inner.run_cycle().await;
        let next_interval = match &first {
            Ok(report) => report.config.poll_interval_ms,
            Err(e) => {
                error!("❌ Initial monitor cycle failed: {}", e);
                self.inner.fallback_interval_ms()
            }
        };

        let inner = Arc::clone(&self.inner);
        let mut rx = self.inner.epoch.subscribe();
        tokio::spawn(async move {
            let mut interval_ms = next_interval;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(interval_ms)) => {}
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                if *rx.borrow() != epoch || !inner.running.load(Ordering::SeqCst) {
                    break;
                }
                interval_ms = match inner.run_cycle().await {
                    Ok(report) => report.config.poll_interval_ms,
                    Err(e) => {
                        error!("❌ Monitor cycle failed: {}", e);
                        inner.fallback_interval_ms()
                    }
                };
            }
            info!("⏹️ Threshold monitor loop exited");
        });

        Ok(StartOutcome::Started(first))
    }

    /// Cancels future cycles. Does not wait for or interrupt a cycle in flight.
    pub fn stop(&self) {
        if self.inner.running.swap(false, Ordering::SeqCst) {
            self.inner.epoch.send_modify(|e| *e += 1);
            info!("⏹️ Threshold monitor stopping");
        }
    }

    /// One full pass over every wallet. Usable whether or not the monitor is running.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        self.inner.run_cycle().await
    }

    pub async fn load_config(&self) -> Result<MonitorConfig> {
        self.inner.load_config().await
    }
}

impl MonitorInner {
    fn fallback_interval_ms(&self) -> u64 {
        self.start_args
            .read()
            .ok()
            .and_then(|args| args.map(|(interval, _)| interval))
            .unwrap_or(self.settings.interval_ms)
    }

    async fn load_config(&self) -> Result<MonitorConfig> {
        let config = match self.store.load_monitor_config().await? {
            Some(config) => config,
            None => {
                let (interval_ms, threshold_usd) = self
                    .start_args
                    .read()
                    .ok()
                    .and_then(|args| *args)
                    .unwrap_or((self.settings.interval_ms, self.settings.threshold_usd));
                MonitorConfig {
                    threshold_usd,
                    destinations: self.settings.destinations.clone(),
                    poll_interval_ms: interval_ms,
                }
            }
        };

        if !config.threshold_usd.is_finite() || config.threshold_usd < 0.0 {
            return Err(SweepError::Validation(format!(
                "threshold_usd must be a non-negative number, got {}",
                config.threshold_usd
            )));
        }
        if config.poll_interval_ms == 0 {
            return Err(SweepError::Validation("poll_interval_ms must be positive".into()));
        }
        config.destinations.validate()?;
        Ok(config)
    }

    async fn run_cycle(&self) -> Result<CycleReport> {
        let started = Instant::now();
        let config = self.load_config().await?;
        let wallets = self.store.list_wallets().await?;
        metrics::set_last_cycle_wallets(wallets.len());
        debug!(
            "🔄 Monitor cycle: {} wallets, threshold ${:.2}",
            wallets.len(),
            config.threshold_usd
        );

        let mut results = Vec::with_capacity(wallets.len());
        for wallet in &wallets {
            results.push(self.check_wallet(wallet, &config).await);
        }

        let report = CycleReport {
            config,
            wallets: results,
            elapsed: started.elapsed(),
        };
        info!(
            "✅ Monitor cycle done in {:?}: {} wallets, {} sweeps ({} failed)",
            report.elapsed,
            report.wallets.len(),
            report.sweeps_attempted(),
            report.sweeps_failed()
        );
        Ok(report)
    }

    async fn check_wallet(&self, wallet: &Wallet, config: &MonitorConfig) -> WalletCycle {
        let items = self.aggregator.aggregate(&wallet.networks).await;
        let summary = value_balances(&items, &self.prices).await;
        let exceeded = exceeds_threshold(summary.total_usd, config.threshold_usd);
        if !exceeded {
            self.swept_above.remove(&wallet.id);
        }
        let already_swept = self.swept_above.contains_key(&wallet.id);

        for failure in summary.failed.iter().filter_map(|item| item.fetch_error()) {
            warn!("⚠️ Wallet {}: {}", wallet.id, failure);
        }
        debug!(
            "Wallet {} holds ${:.2} ({} failed balances)",
            wallet.id,
            summary.total_usd,
            summary.failed.len()
        );

        let sweep = if !exceeded {
            SweepStatus::BelowThreshold
        } else if already_swept && self.settings.resweep_policy == ResweepPolicy::OnCrossing {
            debug!("Wallet {} still above threshold; already swept on crossing", wallet.id);
            SweepStatus::Suppressed
        } else {
            info!(
                "💰 Wallet {} at ${:.2} exceeds ${:.2}; sweeping",
                wallet.id, summary.total_usd, config.threshold_usd
            );
            let event =
                NotificationEvent::threshold_exceeded(wallet.id, summary.total_usd, config.threshold_usd);
            if let Err(e) = self.sink.notify(event).await {
                warn!("⚠️ threshold notification failed: {}", e);
            }
            match self
                .executor
                .sweep(wallet, &summary.valued, &config.destinations)
                .await
            {
                Ok(outcomes) => {
                    self.swept_above.insert(wallet.id, ());
                    SweepStatus::Completed(outcomes)
                }
                // not marked swept, so the next cycle retries even under on_crossing
                Err(e) => SweepStatus::Failed {
                    classification: e.classification(),
                    error: e.to_string(),
                },
            }
        };

        WalletCycle {
            wallet_id: wallet.id,
            total_usd: summary.total_usd,
            failed_balances: summary.failed.len(),
            sweep,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_strict() {
        assert!(!exceeds_threshold(100.0, 100.0));
        assert!(exceeds_threshold(100.01, 100.0));
        assert!(!exceeds_threshold(0.0, 0.0));
    }
}

// src/notifications.rs

use crate::error::SweepError;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    WalletCreated,
    ThresholdExceeded,
    SweepSucceeded,
    SweepFailed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WalletCreated => "wallet_created",
            Self::ThresholdExceeded => "threshold_exceeded",
            Self::SweepSucceeded => "sweep_succeeded",
            Self::SweepFailed => "sweep_failed",
        }
    }
}

/// Structured event delivered to operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub wallet_id: Uuid,
    pub chain: Option<String>,
    /// Human-readable amounts, e.g. `"12 ETH"`.
    pub amounts: Vec<String>,
    pub addresses: Vec<String>,
    pub tx_hash: Option<String>,
    pub error: Option<String>,
    /// Stable label from [`SweepError::classification`].
    pub classification: Option<String>,
    pub total_usd: Option<f64>,
    pub at: DateTime<Utc>,
}

impl NotificationEvent {
    fn new(kind: EventKind, wallet_id: Uuid) -> Self {
        Self {
            kind,
            wallet_id,
            chain: None,
            amounts: Vec::new(),
            addresses: Vec::new(),
            tx_hash: None,
            error: None,
            classification: None,
            total_usd: None,
            at: Utc::now(),
        }
    }

    pub fn wallet_created(wallet_id: Uuid, addresses: Vec<String>) -> Self {
        Self {
            addresses,
            ..Self::new(EventKind::WalletCreated, wallet_id)
        }
    }

    pub fn threshold_exceeded(wallet_id: Uuid, total_usd: f64, threshold_usd: f64) -> Self {
        Self {
            total_usd: Some(total_usd),
            amounts: vec![format!("threshold ${:.2}", threshold_usd)],
            ..Self::new(EventKind::ThresholdExceeded, wallet_id)
        }
    }

    pub fn sweep_succeeded(
        wallet_id: Uuid,
        total_usd: f64,
        amounts: Vec<String>,
        addresses: Vec<String>,
        tx_hash: Option<String>,
    ) -> Self {
        Self {
            total_usd: Some(total_usd),
            amounts,
            addresses,
            tx_hash,
            ..Self::new(EventKind::SweepSucceeded, wallet_id)
        }
    }

    pub fn sweep_failed(wallet_id: Uuid, chain: &str, err: &SweepError, addresses: Vec<String>) -> Self {
        Self {
            chain: Some(chain.to_string()),
            error: Some(err.to_string()),
            classification: Some(err.classification().to_string()),
            addresses,
            ..Self::new(EventKind::SweepFailed, wallet_id)
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: NotificationEvent) -> Result<()>;
}

/// Writes events to the log only.
#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, event: NotificationEvent) -> Result<()> {
        match event.kind {
            EventKind::SweepFailed => error!(
                "🚨 [{}] wallet {} chain {} ({}): {}",
                event.kind.as_str(),
                event.wallet_id,
                event.chain.as_deref().unwrap_or("-"),
                event.classification.as_deref().unwrap_or("-"),
                event.error.as_deref().unwrap_or("-")
            ),
            EventKind::ThresholdExceeded => warn!(
                "💰 [{}] wallet {} holds ${:.2} ({})",
                event.kind.as_str(),
                event.wallet_id,
                event.total_usd.unwrap_or_default(),
                event.amounts.join(", ")
            ),
            _ => info!(
                "📣 [{}] wallet {} amounts=[{}] tx={}",
                event.kind.as_str(),
                event.wallet_id,
                event.amounts.join(", "),
                event.tx_hash.as_deref().unwrap_or("-")
            ),
        }
        Ok(())
    }
}

/// POSTs each event as JSON and also logs it.
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
    log: LogSink,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            log: LogSink,
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn notify(&self, event: NotificationEvent) -> Result<()> {
        self.log.notify(event.clone()).await?;
        self.client
            .post(&self.url)
            .json(&event)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

// src/database.rs

use crate::derivation::SeedPhrase;
use crate::error::{Result, SweepError};
use crate::settings::DatabaseSettings;
use crate::types::{Destinations, LedgerEntry, MonitorConfig, NetworkAddress, Wallet};
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres, Row};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use uuid::Uuid;
use zeroize::Zeroizing;

/// PostgreSQL connection pool type alias.
pub type DbPool = Pool<Postgres>;

/// Database schema name
pub const SCHEMA: &str = "custody";

/// Everything the engine reads from or writes to persistent storage.
#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn list_wallets(&self) -> Result<Vec<Wallet>>;

    async fn wallet_networks(&self, wallet_id: Uuid) -> Result<Vec<NetworkAddress>>;

    /// `None` when no configuration row has been written yet.
    async fn load_monitor_config(&self) -> Result<Option<MonitorConfig>>;

    async fn save_monitor_config(&self, config: &MonitorConfig) -> Result<()>;

    async fn load_seed_phrase(&self, wallet_id: Uuid) -> Result<SeedPhrase>;

    async fn create_wallet(
        &self,
        name: &str,
        owner_ref: Option<&str>,
        seed: &SeedPhrase,
    ) -> Result<Wallet>;

    /// Fails with `Validation` if the wallet already has an address on that chain.
    async fn add_network_address(&self, address: &NetworkAddress) -> Result<()>;

    async fn remove_network_address(&self, wallet_id: Uuid, chain_id: &str) -> Result<bool>;

    /// Removes the wallet together with its addresses and secret.
    async fn delete_wallet(&self, wallet_id: Uuid) -> Result<bool>;

    async fn record_transfer(&self, entry: &LedgerEntry) -> Result<()>;
}

pub async fn connect(settings: &DatabaseSettings) -> anyhow::Result<DbPool> {
    env::set_var("PGCLIENTENCODING", "UTF8");

    let database_url = settings
        .url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("database.url (or DATABASE_URL) must be set"))?;

    // Add retries with exponential backoff to survive DNS/startup races in Compose
    let mut last_err: Option<anyhow::Error> = None;
    let max_attempts: u32 = 10;
    for attempt in 1..=max_attempts {
        match PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&database_url)
            .await
        {
            Ok(pool) => {
                log::info!(
                    "✅ Successfully connected to database (attempt {}/{}).",
                    attempt,
                    max_attempts
                );
                if let Err(e) = initialize_database(&pool).await {
                    last_err = Some(e);
                } else {
                    return Ok(pool);
                }
            }
            Err(e) => {
                last_err = Some(e.into());
            }
        }
        let delay_ms = (1u64 << attempt.min(6)) * 200; // 200ms, 400ms, 800ms, ... capped at ~12.8s
        log::warn!(
            "DB connect/init attempt {}/{} failed. Retrying in {} ms...",
            attempt,
            max_attempts,
            delay_ms
        );
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Unknown DB connection error")))
}

pub async fn initialize_database(pool: &DbPool) -> anyhow::Result<()> {
    const MIGRATION_LOCK_ID: i64 = 0x435553544F4459; // "CUSTODY"

    let mut tx = pool.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(MIGRATION_LOCK_ID)
        .execute(tx.as_mut())
        .await?;

    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", SCHEMA))
        .execute(tx.as_mut())
        .await?;
    sqlx::query("CREATE EXTENSION IF NOT EXISTS pgcrypto")
        .execute(tx.as_mut())
        .await?;

    create_tables(&mut tx).await?;

    tx.commit().await?;
    log::info!("Database initialization complete, transaction committed.");
    Ok(())
}

async fn create_tables(tx: &mut sqlx::Transaction<'_, sqlx::Postgres>) -> anyhow::Result<()> {
    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {}.wallets (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL,
            owner_ref TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
        SCHEMA
    ))
    .execute(tx.as_mut())
    .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {0}.wallet_secrets (
            wallet_id UUID PRIMARY KEY REFERENCES {0}.wallets(id) ON DELETE CASCADE,
            seed_ciphertext BYTEA NOT NULL
        )",
        SCHEMA
    ))
    .execute(tx.as_mut())
    .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {0}.network_addresses (
            id BIGSERIAL PRIMARY KEY,
            wallet_id UUID NOT NULL REFERENCES {0}.wallets(id) ON DELETE CASCADE,
            chain_id TEXT NOT NULL,
            address TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (wallet_id, chain_id)
        )",
        SCHEMA
    ))
    .execute(tx.as_mut())
    .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {}.monitor_config (
            id SMALLINT PRIMARY KEY CHECK (id = 1),
            threshold_usd DOUBLE PRECISION NOT NULL,
            destination_evm TEXT,
            destination_utxo TEXT,
            destination_tron TEXT,
            poll_interval_ms BIGINT NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
        SCHEMA
    ))
    .execute(tx.as_mut())
    .await?;

    // No FK on wallet_id: history outlives deleted wallets.
    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {}.transfer_ledger (
            id BIGSERIAL PRIMARY KEY,
            wallet_id UUID NOT NULL,
            chain_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            symbol TEXT NOT NULL,
            amount NUMERIC(78, 0) NOT NULL,
            value_usd DOUBLE PRECISION NOT NULL,
            tx_hash TEXT NOT NULL,
            source TEXT NOT NULL,
            destination TEXT NOT NULL,
            confirmed BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL
        )",
        SCHEMA
    ))
    .execute(tx.as_mut())
    .await?;

    sqlx::query(&format!(
        "ALTER TABLE {}.transfer_ledger ADD COLUMN IF NOT EXISTS confirmed BOOLEAN NOT NULL DEFAULT TRUE",
        SCHEMA
    ))
    .execute(tx.as_mut())
    .await?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_transfer_ledger_wallet ON {}.transfer_ledger (wallet_id, created_at)",
        SCHEMA
    ))
    .execute(tx.as_mut())
    .await?;

    Ok(())
}

/// Postgres-backed [`WalletStore`]. Seed phrases are encrypted with pgcrypto.
#[derive(Clone)]
pub struct PgWalletStore {
    pool: DbPool,
    seed_key: Zeroizing<String>,
}

impl PgWalletStore {
    pub fn new(pool: DbPool, seed_key: impl Into<String>) -> Self {
        Self {
            pool,
            seed_key: Zeroizing::new(seed_key.into()),
        }
    }

    pub async fn connect(settings: &DatabaseSettings) -> anyhow::Result<Self> {
        let seed_key = settings.seed_encryption_key.clone().ok_or_else(|| {
            anyhow::anyhow!("database.seed_encryption_key (or SWEEP_SEED_ENCRYPTION_KEY) must be set")
        })?;
        let pool = connect(settings).await?;
        Ok(Self::new(pool, seed_key))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn row_to_address(row: &sqlx::postgres::PgRow) -> Result<NetworkAddress> {
    Ok(NetworkAddress {
        wallet_id: row.try_get("wallet_id")?,
        chain_id: row.try_get("chain_id")?,
        address: row.try_get("address")?,
    })
}

#[async_trait]
impl WalletStore for PgWalletStore {
    async fn list_wallets(&self) -> Result<Vec<Wallet>> {
        let wallet_rows = sqlx::query(&format!(
            "SELECT id, name, owner_ref FROM {}.wallets ORDER BY created_at, id",
            SCHEMA
        ))
        .fetch_all(&self.pool)
        .await?;

        let address_rows = sqlx::query(&format!(
            "SELECT wallet_id, chain_id, address FROM {}.network_addresses ORDER BY chain_id",
            SCHEMA
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut by_wallet: HashMap<Uuid, Vec<NetworkAddress>> = HashMap::new();
        for row in &address_rows {
            let address = row_to_address(row)?;
            by_wallet.entry(address.wallet_id).or_default().push(address);
        }

        wallet_rows
            .iter()
            .map(|row| {
                let id: Uuid = row.try_get("id")?;
                Ok(Wallet {
                    id,
                    name: row.try_get("name")?,
                    owner_ref: row.try_get("owner_ref")?,
                    networks: by_wallet.remove(&id).unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn wallet_networks(&self, wallet_id: Uuid) -> Result<Vec<NetworkAddress>> {
        let rows = sqlx::query(&format!(
            "SELECT wallet_id, chain_id, address FROM {}.network_addresses WHERE wallet_id = $1 ORDER BY chain_id",
            SCHEMA
        ))
        .bind(wallet_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_address).collect()
    }

    async fn load_monitor_config(&self) -> Result<Option<MonitorConfig>> {
        let row = sqlx::query(&format!(
            "SELECT threshold_usd, destination_evm, destination_utxo, destination_tron, poll_interval_ms
             FROM {}.monitor_config WHERE id = 1",
            SCHEMA
        ))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let poll_interval_ms: i64 = row.try_get("poll_interval_ms")?;
        Ok(Some(MonitorConfig {
            threshold_usd: row.try_get("threshold_usd")?,
            destinations: Destinations {
                evm: row.try_get("destination_evm")?,
                utxo: row.try_get("destination_utxo")?,
                tron: row.try_get("destination_tron")?,
            },
            poll_interval_ms: u64::try_from(poll_interval_ms).map_err(|_| {
                SweepError::Config(format!("negative poll interval {}", poll_interval_ms))
            })?,
        }))
    }

    async fn save_monitor_config(&self, config: &MonitorConfig) -> Result<()> {
        config.destinations.validate()?;
        let poll_interval_ms = i64::try_from(config.poll_interval_ms)
            .map_err(|_| SweepError::Config("poll interval out of range".into()))?;
        sqlx::query(&format!(
            "INSERT INTO {}.monitor_config
                (id, threshold_usd, destination_evm, destination_utxo, destination_tron, poll_interval_ms, updated_at)
             VALUES (1, $1, $2, $3, $4, $5, NOW())
             ON CONFLICT (id) DO UPDATE SET
                threshold_usd = EXCLUDED.threshold_usd,
                destination_evm = EXCLUDED.destination_evm,
                destination_utxo = EXCLUDED.destination_utxo,
                destination_tron = EXCLUDED.destination_tron,
                poll_interval_ms = EXCLUDED.poll_interval_ms,
                updated_at = NOW()",
            SCHEMA
        ))
        .bind(config.threshold_usd)
        .bind(&config.destinations.evm)
        .bind(&config.destinations.utxo)
        .bind(&config.destinations.tron)
        .bind(poll_interval_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_seed_phrase(&self, wallet_id: Uuid) -> Result<SeedPhrase> {
        let row = sqlx::query(&format!(
            "SELECT pgp_sym_decrypt(seed_ciphertext, $2) AS phrase FROM {}.wallet_secrets WHERE wallet_id = $1",
            SCHEMA
        ))
        .bind(wallet_id)
        .bind(self.seed_key.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| SweepError::Persistence(format!("no seed phrase stored for wallet {}", wallet_id)))?;

        let phrase: Zeroizing<String> = Zeroizing::new(row.try_get("phrase")?);
        SeedPhrase::parse(&phrase)
    }

    async fn create_wallet(
        &self,
        name: &str,
        owner_ref: Option<&str>,
        seed: &SeedPhrase,
    ) -> Result<Wallet> {
        let id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO {}.wallets (id, name, owner_ref) VALUES ($1, $2, $3)",
            SCHEMA
        ))
        .bind(id)
        .bind(name)
        .bind(owner_ref)
        .execute(tx.as_mut())
        .await?;

        sqlx::query(&format!(
            "INSERT INTO {}.wallet_secrets (wallet_id, seed_ciphertext) VALUES ($1, pgp_sym_encrypt($2, $3))",
            SCHEMA
        ))
        .bind(id)
        .bind(seed.phrase())
        .bind(self.seed_key.as_str())
        .execute(tx.as_mut())
        .await?;

        tx.commit().await?;
        log::info!("🆕 Created wallet {} ({})", id, name);

        Ok(Wallet {
            id,
            name: name.to_string(),
            owner_ref: owner_ref.map(str::to_string),
            networks: Vec::new(),
        })
    }

    async fn add_network_address(&self, address: &NetworkAddress) -> Result<()> {
        let inserted = sqlx::query(&format!(
            "INSERT INTO {}.network_addresses (wallet_id, chain_id, address) VALUES ($1, $2, $3)
             ON CONFLICT (wallet_id, chain_id) DO NOTHING",
            SCHEMA
        ))
        .bind(address.wallet_id)
        .bind(&address.chain_id)
        .bind(&address.address)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Err(SweepError::Validation(format!(
                "wallet {} already has an address on {}",
                address.wallet_id, address.chain_id
            )));
        }
        Ok(())
    }

    async fn remove_network_address(&self, wallet_id: Uuid, chain_id: &str) -> Result<bool> {
        let removed = sqlx::query(&format!(
            "DELETE FROM {}.network_addresses WHERE wallet_id = $1 AND chain_id = $2",
            SCHEMA
        ))
        .bind(wallet_id)
        .bind(chain_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(removed > 0)
    }

    async fn delete_wallet(&self, wallet_id: Uuid) -> Result<bool> {
        let removed = sqlx::query(&format!("DELETE FROM {}.wallets WHERE id = $1", SCHEMA))
            .bind(wallet_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if removed > 0 {
            log::info!("🗑️ Deleted wallet {}", wallet_id);
        }
        Ok(removed > 0)
    }

    async fn record_transfer(&self, entry: &LedgerEntry) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO {}.transfer_ledger
                (wallet_id, chain_id, kind, symbol, amount, value_usd, tx_hash, source, destination, confirmed, created_at)
             VALUES ($1, $2, $3, $4, $5::numeric, $6, $7, $8, $9, $10, $11)",
            SCHEMA
        ))
        .bind(entry.wallet_id)
        .bind(&entry.chain_id)
        .bind(&entry.kind)
        .bind(&entry.symbol)
        .bind(&entry.amount)
        .bind(entry.value_usd)
        .bind(&entry.tx_hash)
        .bind(&entry.source)
        .bind(&entry.destination)
        .bind(entry.confirmed)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

//! Cluster-wide exclusive lease
//!
//! Serializes the artifact expiry sweep: at most one sweep instance runs at
//! a time across the whole deployment. This is the only cross-process lock
//! in the engine.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("lease backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for LeaseError {
    fn from(err: sqlx::Error) -> Self {
        LeaseError::Backend(err.to_string())
    }
}

/// A time-bounded exclusive lease.
#[async_trait]
pub trait SweepLease: Send + Sync {
    /// Attempts to take the lease. `false` means another holder is active.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool, LeaseError>;

    /// Releases the lease if this instance holds it.
    async fn release(&self, key: &str) -> Result<(), LeaseError>;
}

/// In-process lease for tests and single-node development.
#[derive(Debug, Default)]
pub struct MemoryLease {
    held: Mutex<HashMap<String, Instant>>,
}

impl MemoryLease {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SweepLease for MemoryLease {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool, LeaseError> {
        let mut held = self.held.lock().expect("lease lock poisoned");
        let now = Instant::now();

        match held.get(key) {
            Some(expires_at) if *expires_at > now => Ok(false),
            _ => {
                held.insert(key.to_string(), now + ttl);
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str) -> Result<(), LeaseError> {
        self.held.lock().expect("lease lock poisoned").remove(key);
        Ok(())
    }
}

/// Postgres advisory-lock lease.
///
/// The lock is held on a dedicated connection checked out of the pool, so
/// it survives for exactly as long as this instance keeps it: released
/// explicitly, or by the server when the connection dies. The TTL is
/// advisory here; crash recovery comes from connection teardown rather
/// than expiry.
pub struct PgAdvisoryLease {
    pool: PgPool,
    holding: tokio::sync::Mutex<Option<sqlx::pool::PoolConnection<sqlx::Postgres>>>,
}

impl PgAdvisoryLease {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            holding: tokio::sync::Mutex::new(None),
        }
    }

    /// Stable 64-bit lock id for a lease key.
    fn lock_id(key: &str) -> i64 {
        key.bytes()
            .fold(0i64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as i64))
    }
}

#[async_trait]
impl SweepLease for PgAdvisoryLease {
    async fn try_acquire(&self, key: &str, _ttl: Duration) -> Result<bool, LeaseError> {
        let mut holding = self.holding.lock().await;
        if holding.is_some() {
            return Ok(false);
        }

        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query("SELECT pg_try_advisory_lock($1) AS acquired")
            .bind(Self::lock_id(key))
            .fetch_one(&mut *conn)
            .await?;
        let acquired: bool = row.try_get("acquired")?;

        if acquired {
            *holding = Some(conn);
        }

        Ok(acquired)
    }

    async fn release(&self, key: &str) -> Result<(), LeaseError> {
        let mut holding = self.holding.lock().await;

        if let Some(mut conn) = holding.take() {
            sqlx::query("SELECT pg_advisory_unlock($1)")
                .bind(Self::lock_id(key))
                .execute(&mut *conn)
                .await?;
        }

        Ok(())
    }
}

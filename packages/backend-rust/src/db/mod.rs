//! Card, review-log and audit stores.
//!
//! Services talk to [`Store`] for reads and open a [`UnitOfWork`] for every
//! write path. A unit of work wraps one database transaction: it is committed
//! explicitly and rolled back when dropped.

pub mod config;
pub mod migrate;
pub mod postgres;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;
use vocab_srs::CardStatus;

use crate::db::config::{DbBackend, DbConfig, DbConfigError};
use crate::db::migrate::MigrationError;
use crate::model::{AuditRecord, Card, DashboardStats, DictionaryEntry, EntityType, ReviewLog};

pub use crate::db::postgres::PostgresStore;
pub use crate::db::sqlite::SqliteStore;

// ==================== Errors ====================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("record already exists")]
    Duplicate,
    #[error("timed out waiting for a database lock")]
    LockTimeout,
    #[error("failed to decode row: {0}")]
    Decode(String),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if is_lock_timeout(&err) {
            return StoreError::LockTimeout;
        }
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::Duplicate,
            other => StoreError::Sqlx(other),
        }
    }
}

/// SQLite BUSY/LOCKED, Postgres lock_not_available and query_canceled, and
/// pool acquire timeouts.
fn is_lock_timeout(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => {
            let code = db.code();
            let code = code.as_deref();
            if db.try_downcast_ref::<sqlx::sqlite::SqliteError>().is_some() {
                code.and_then(|c| c.parse::<i32>().ok())
                    .map(sqlite_code_is_lock_timeout)
                    .unwrap_or(false)
            } else {
                matches!(code, Some("55P03") | Some("57014"))
            }
        }
        _ => false,
    }
}

/// SQLITE_BUSY_SNAPSHOT (517) is returned without ever waiting on the busy
/// handler: a reader tried to upgrade to a writer over a stale snapshot.
/// It is a conflict, not a lock wait that ran out.
const SQLITE_BUSY_SNAPSHOT: i32 = 517;

fn sqlite_code_is_lock_timeout(code: i32) -> bool {
    code != SQLITE_BUSY_SNAPSHOT && matches!(code & 0xff, 5 | 6)
}

pub type StoreResult<T> = Result<T, StoreError>;

// ==================== Queries ====================

#[derive(Debug, Clone, PartialEq)]
pub struct DueCardsQuery {
    pub now: DateTime<Utc>,
    pub limit: i64,
    /// Never empty; the service resolves the default filter.
    pub statuses: Vec<CardStatus>,
}

// ==================== Traits ====================

#[async_trait]
pub trait Store: Send + Sync {
    fn backend(&self) -> DbBackend;

    /// Opens a write transaction. Backends that lock at database level take
    /// the write lock here, before the unit of work issues its first read.
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;

    async fn get_card(&self, id: Uuid) -> StoreResult<Option<Card>>;

    /// Cards with `due_at` null or at/before `now`, most overdue first.
    async fn due_cards(&self, query: &DueCardsQuery) -> StoreResult<Vec<Card>>;

    /// Unordered batch lookup.
    async fn entries_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<DictionaryEntry>>;

    /// Newest first.
    async fn review_logs_for_card(&self, card_id: Uuid, limit: i64) -> StoreResult<Vec<ReviewLog>>;

    /// Oldest first.
    async fn audit_records_for(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> StoreResult<Vec<AuditRecord>>;

    async fn dashboard_stats(&self, now: DateTime<Utc>) -> StoreResult<DashboardStats>;

    async fn ping(&self) -> StoreResult<()>;

    async fn close(&self);
}

#[async_trait]
pub trait UnitOfWork: Send {
    /// Fetches the card and holds its row lock until commit or drop.
    async fn lock_card(&mut self, id: Uuid) -> StoreResult<Option<Card>>;

    async fn get_entry(&mut self, id: Uuid) -> StoreResult<Option<DictionaryEntry>>;

    async fn find_card_by_entry(&mut self, entry_id: Uuid) -> StoreResult<Option<Card>>;

    async fn insert_entry(&mut self, entry: &DictionaryEntry) -> StoreResult<()>;

    async fn insert_card(&mut self, card: &Card) -> StoreResult<()>;

    /// Writes the scheduling fields; `NotFound` when the row is gone.
    async fn update_card_schedule(&mut self, card: &Card) -> StoreResult<()>;

    async fn append_review_log(&mut self, log: &ReviewLog) -> StoreResult<()>;

    async fn append_audit(&mut self, record: &AuditRecord) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

// ==================== Connect ====================

#[derive(Debug, Error)]
pub enum DbInitError {
    #[error(transparent)]
    Config(#[from] DbConfigError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] MigrationError),
}

/// Opens the store selected by the URL scheme and applies pending migrations.
pub async fn connect(config: &DbConfig) -> Result<Arc<dyn Store>, DbInitError> {
    let store: Arc<dyn Store> = match config.backend {
        DbBackend::Postgres => {
            let store = PostgresStore::connect(config).await?;
            if config.run_migrations {
                migrate::run_postgres_migrations(store.pool()).await?;
            }
            Arc::new(store)
        }
        DbBackend::Sqlite => {
            let store = SqliteStore::connect(config).await?;
            if config.run_migrations {
                migrate::run_sqlite_migrations(store.pool()).await?;
            }
            Arc::new(store)
        }
    };

    tracing::info!(backend = config.backend.as_str(), "database connected");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_busy_and_locked_are_lock_timeouts() {
        // SQLITE_BUSY, SQLITE_LOCKED, SQLITE_BUSY_RECOVERY, SQLITE_LOCKED_SHAREDCACHE
        for code in [5, 6, 261, 262] {
            assert!(sqlite_code_is_lock_timeout(code), "code {code}");
        }
    }

    #[test]
    fn busy_snapshot_is_not_a_lock_timeout() {
        assert!(!sqlite_code_is_lock_timeout(SQLITE_BUSY_SNAPSHOT));
        // SQLITE_CONSTRAINT_UNIQUE
        assert!(!sqlite_code_is_lock_timeout(2067));
    }

    #[test]
    fn pool_timeouts_count_as_lock_timeouts() {
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolTimedOut),
            StoreError::LockTimeout
        ));
        assert!(matches!(
            StoreError::from(sqlx::Error::RowNotFound),
            StoreError::NotFound
        ));
    }
}

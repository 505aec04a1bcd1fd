//! SQLite store.
//!
//! SQLite has no row locks. `begin` instead makes every unit of work a
//! writer before it reads: a no-op `UPDATE` takes the database write lock
//! (waiting up to `busy_timeout`), the same way `BEGIN IMMEDIATE` would.
//! Writers are serialized, every read inside a unit of work sees all
//! previously committed writes, and a deferred reader never has to upgrade
//! over a stale WAL snapshot (`SQLITE_BUSY_SNAPSHOT`).

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;
use vocab_srs::{CardStatus, Grade, SchedulerSnapshot};

use crate::db::config::{DbBackend, DbConfig};
use crate::db::{DueCardsQuery, Store, StoreError, StoreResult, UnitOfWork};
use crate::model::{
    AuditAction, AuditRecord, Card, ChangeSet, DashboardStats, DictionaryEntry, EntityType,
    ReviewLog,
};

const CARD_COLUMNS: &str = r#""id","entry_id","status","due_at","interval_days","ease_factor","review_count","lapses","created_at","updated_at""#;
const ENTRY_COLUMNS: &str = r#""id","text","text_normalized","created_at","updated_at""#;
const REVIEW_LOG_COLUMNS: &str =
    r#""id","card_id","grade","duration_ms","reviewed_at","state_before","state_after""#;
const AUDIT_COLUMNS: &str =
    r#""id","entity_type","entity_id","action","changes","created_at""#;

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(config: &DbConfig) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.lock_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn backend(&self) -> DbBackend {
        DbBackend::Sqlite
    }

    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(r#"UPDATE "cards" SET "id" = "id" WHERE 0"#)
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(SqliteUnitOfWork { tx }))
    }

    async fn get_card(&self, id: Uuid) -> StoreResult<Option<Card>> {
        let sql = format!(r#"SELECT {CARD_COLUMNS} FROM "cards" WHERE "id" = $1"#);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_card).transpose()
    }

    async fn due_cards(&self, query: &DueCardsQuery) -> StoreResult<Vec<Card>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            r#"SELECT {CARD_COLUMNS} FROM "cards" WHERE ("due_at" IS NULL OR "due_at" <= "#
        ));
        qb.push_bind(encode_ts(query.now));
        qb.push(r#") AND "status" IN ("#);
        {
            let mut sep = qb.separated(", ");
            for status in &query.statuses {
                sep.push_bind(status.as_str());
            }
        }
        // NULL sorts first in ascending order.
        qb.push(r#") ORDER BY "due_at" ASC, "created_at" ASC, "id" ASC LIMIT "#);
        qb.push_bind(query.limit);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(map_card).collect()
    }

    async fn entries_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<DictionaryEntry>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            r#"SELECT {ENTRY_COLUMNS} FROM "dictionary_entries" WHERE "id" IN ("#
        ));
        {
            let mut sep = qb.separated(", ");
            for id in ids {
                sep.push_bind(id.to_string());
            }
        }
        qb.push(")");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(map_entry).collect()
    }

    async fn review_logs_for_card(&self, card_id: Uuid, limit: i64) -> StoreResult<Vec<ReviewLog>> {
        let sql = format!(
            r#"SELECT {REVIEW_LOG_COLUMNS} FROM "review_logs"
            WHERE "card_id" = $1
            ORDER BY "reviewed_at" DESC, rowid DESC
            LIMIT $2"#
        );
        let rows = sqlx::query(&sql)
            .bind(card_id.to_string())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(map_review_log).collect()
    }

    async fn audit_records_for(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> StoreResult<Vec<AuditRecord>> {
        let sql = format!(
            r#"SELECT {AUDIT_COLUMNS} FROM "audit_records"
            WHERE "entity_type" = $1 AND "entity_id" = $2
            ORDER BY "created_at" ASC, rowid ASC"#
        );
        let rows = sqlx::query(&sql)
            .bind(entity_type.as_str())
            .bind(entity_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(map_audit).collect()
    }

    async fn dashboard_stats(&self, now: DateTime<Utc>) -> StoreResult<DashboardStats> {
        let row = sqlx::query(
            r#"
            SELECT
              (SELECT COUNT(*) FROM "dictionary_entries") AS "total_entries",
              COUNT(*) AS "total_cards",
              COALESCE(SUM(CASE WHEN "status" = 'NEW' THEN 1 ELSE 0 END), 0) AS "new_cards",
              COALESCE(SUM(CASE WHEN "status" = 'LEARNING' THEN 1 ELSE 0 END), 0) AS "learning_cards",
              COALESCE(SUM(CASE WHEN "status" = 'REVIEW' THEN 1 ELSE 0 END), 0) AS "review_cards",
              COALESCE(SUM(CASE WHEN "status" = 'MASTERED' THEN 1 ELSE 0 END), 0) AS "mastered_cards",
              COALESCE(SUM(CASE WHEN "status" <> 'MASTERED'
                                 AND ("due_at" IS NULL OR "due_at" <= $1) THEN 1 ELSE 0 END), 0) AS "due_now"
            FROM "cards"
            "#,
        )
        .bind(encode_ts(now))
        .fetch_one(&self.pool)
        .await?;

        Ok(DashboardStats {
            total_entries: row.try_get("total_entries")?,
            total_cards: row.try_get("total_cards")?,
            new_cards: row.try_get("new_cards")?,
            learning_cards: row.try_get("learning_cards")?,
            review_cards: row.try_get("review_cards")?,
            mastered_cards: row.try_get("mastered_cards")?,
            due_now: row.try_get("due_now")?,
        })
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

// ==================== Unit of Work ====================

pub struct SqliteUnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl UnitOfWork for SqliteUnitOfWork {
    // The write lock is already held since `begin`.
    async fn lock_card(&mut self, id: Uuid) -> StoreResult<Option<Card>> {
        let sql = format!(r#"SELECT {CARD_COLUMNS} FROM "cards" WHERE "id" = $1"#);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(map_card).transpose()
    }

    async fn get_entry(&mut self, id: Uuid) -> StoreResult<Option<DictionaryEntry>> {
        let sql = format!(r#"SELECT {ENTRY_COLUMNS} FROM "dictionary_entries" WHERE "id" = $1"#);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(map_entry).transpose()
    }

    async fn find_card_by_entry(&mut self, entry_id: Uuid) -> StoreResult<Option<Card>> {
        let sql = format!(r#"SELECT {CARD_COLUMNS} FROM "cards" WHERE "entry_id" = $1"#);
        let row = sqlx::query(&sql)
            .bind(entry_id.to_string())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(map_card).transpose()
    }

    async fn insert_entry(&mut self, entry: &DictionaryEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO "dictionary_entries" ("id","text","text_normalized","created_at","updated_at")
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(&entry.text)
        .bind(&entry.text_normalized)
        .bind(encode_ts(entry.created_at))
        .bind(encode_ts(entry.updated_at))
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_card(&mut self, card: &Card) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO "cards"
              ("id","entry_id","status","due_at","interval_days","ease_factor","review_count","lapses","created_at","updated_at")
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(card.id.to_string())
        .bind(card.entry_id.to_string())
        .bind(card.status.as_str())
        .bind(card.due_at.map(encode_ts))
        .bind(card.interval_days)
        .bind(card.ease_factor)
        .bind(card.review_count)
        .bind(card.lapses)
        .bind(encode_ts(card.created_at))
        .bind(encode_ts(card.updated_at))
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_card_schedule(&mut self, card: &Card) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE "cards"
            SET "status" = $2, "due_at" = $3, "interval_days" = $4, "ease_factor" = $5,
                "review_count" = $6, "lapses" = $7, "updated_at" = $8
            WHERE "id" = $1
            "#,
        )
        .bind(card.id.to_string())
        .bind(card.status.as_str())
        .bind(card.due_at.map(encode_ts))
        .bind(card.interval_days)
        .bind(card.ease_factor)
        .bind(card.review_count)
        .bind(card.lapses)
        .bind(encode_ts(card.updated_at))
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn append_review_log(&mut self, log: &ReviewLog) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO "review_logs"
              ("id","card_id","grade","duration_ms","reviewed_at","state_before","state_after")
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(log.id.to_string())
        .bind(log.card_id.to_string())
        .bind(log.grade.to_string())
        .bind(log.duration_ms)
        .bind(encode_ts(log.reviewed_at))
        .bind(serde_json::to_string(&log.state_before)?)
        .bind(serde_json::to_string(&log.state_after)?)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn append_audit(&mut self, record: &AuditRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO "audit_records" ("id","entity_type","entity_id","action","changes","created_at")
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.entity_type.as_str())
        .bind(record.entity_id.to_string())
        .bind(record.action.as_str())
        .bind(serde_json::to_string(&record.changes)?)
        .bind(encode_ts(record.created_at))
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

// ==================== Encoding ====================

/// Fixed-width UTC text so that string order equals time order.
pub(crate) fn encode_ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_ts(raw: &str, column: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode(format!("{column}: {e}")))
}

fn ts_column(row: &SqliteRow, column: &str) -> StoreResult<DateTime<Utc>> {
    let raw: String = row.try_get(column)?;
    decode_ts(&raw, column)
}

fn opt_ts_column(row: &SqliteRow, column: &str) -> StoreResult<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|value| decode_ts(&value, column)).transpose()
}

fn uuid_column(row: &SqliteRow, column: &str) -> StoreResult<Uuid> {
    let raw: String = row.try_get(column)?;
    Uuid::parse_str(&raw).map_err(|e| StoreError::Decode(format!("{column}: {e}")))
}

fn json_column<T: serde::de::DeserializeOwned>(row: &SqliteRow, column: &str) -> StoreResult<T> {
    let raw: String = row.try_get(column)?;
    Ok(serde_json::from_str(&raw)?)
}

// ==================== Row Mapping ====================

fn map_card(row: &SqliteRow) -> StoreResult<Card> {
    let status: String = row.try_get("status")?;
    Ok(Card {
        id: uuid_column(row, "id")?,
        entry_id: uuid_column(row, "entry_id")?,
        status: CardStatus::from_str(&status).map_err(|e| StoreError::Decode(e.to_string()))?,
        due_at: opt_ts_column(row, "due_at")?,
        interval_days: row.try_get("interval_days")?,
        ease_factor: row.try_get("ease_factor")?,
        review_count: row.try_get("review_count")?,
        lapses: row.try_get("lapses")?,
        created_at: ts_column(row, "created_at")?,
        updated_at: ts_column(row, "updated_at")?,
    })
}

fn map_entry(row: &SqliteRow) -> StoreResult<DictionaryEntry> {
    Ok(DictionaryEntry {
        id: uuid_column(row, "id")?,
        text: row.try_get("text")?,
        text_normalized: row.try_get("text_normalized")?,
        created_at: ts_column(row, "created_at")?,
        updated_at: ts_column(row, "updated_at")?,
    })
}

fn map_review_log(row: &SqliteRow) -> StoreResult<ReviewLog> {
    let grade: String = row.try_get("grade")?;
    let state_before: SchedulerSnapshot = json_column(row, "state_before")?;
    let state_after: SchedulerSnapshot = json_column(row, "state_after")?;
    Ok(ReviewLog {
        id: uuid_column(row, "id")?,
        card_id: uuid_column(row, "card_id")?,
        grade: Grade::from_str(&grade).map_err(|e| StoreError::Decode(e.to_string()))?,
        duration_ms: row.try_get("duration_ms")?,
        reviewed_at: ts_column(row, "reviewed_at")?,
        state_before,
        state_after,
    })
}

fn map_audit(row: &SqliteRow) -> StoreResult<AuditRecord> {
    let entity_type: String = row.try_get("entity_type")?;
    let action: String = row.try_get("action")?;
    let changes: ChangeSet = json_column(row, "changes")?;
    Ok(AuditRecord {
        id: uuid_column(row, "id")?,
        entity_type: EntityType::from_str(&entity_type).map_err(StoreError::Decode)?,
        entity_id: uuid_column(row, "entity_id")?,
        action: AuditAction::from_str(&action).map_err(StoreError::Decode)?,
        changes,
        created_at: ts_column(row, "created_at")?,
    })
}

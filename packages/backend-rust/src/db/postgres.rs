use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
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
pub struct PostgresStore {
    pool: PgPool,
    lock_timeout_ms: u64,
}

impl PostgresStore {
    pub async fn connect(config: &DbConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await?;

        Ok(Self::from_pool(pool, config.lock_timeout.as_millis() as u64))
    }

    pub fn from_pool(pool: PgPool, lock_timeout_ms: u64) -> Self {
        Self {
            pool,
            lock_timeout_ms,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PostgresStore {
    fn backend(&self) -> DbBackend {
        DbBackend::Postgres
    }

    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresUnitOfWork {
            tx,
            lock_timeout_ms: self.lock_timeout_ms,
        }))
    }

    async fn get_card(&self, id: Uuid) -> StoreResult<Option<Card>> {
        let sql = format!(r#"SELECT {CARD_COLUMNS} FROM "cards" WHERE "id" = $1"#);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(map_card).transpose()
    }

    async fn due_cards(&self, query: &DueCardsQuery) -> StoreResult<Vec<Card>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            r#"SELECT {CARD_COLUMNS} FROM "cards" WHERE ("due_at" IS NULL OR "due_at" <= "#
        ));
        qb.push_bind(query.now);
        qb.push(r#") AND "status" IN ("#);
        {
            let mut sep = qb.separated(", ");
            for status in &query.statuses {
                sep.push_bind(status.as_str());
            }
        }
        qb.push(r#") ORDER BY "due_at" ASC NULLS FIRST, "created_at" ASC, "id" ASC LIMIT "#);
        qb.push_bind(query.limit);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(map_card).collect()
    }

    async fn entries_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<DictionaryEntry>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(r#"SELECT {ENTRY_COLUMNS} FROM "dictionary_entries" WHERE "id" = ANY($1)"#);
        let rows = sqlx::query(&sql).bind(ids).fetch_all(&self.pool).await?;
        rows.iter().map(map_entry).collect()
    }

    async fn review_logs_for_card(&self, card_id: Uuid, limit: i64) -> StoreResult<Vec<ReviewLog>> {
        let sql = format!(
            r#"SELECT {REVIEW_LOG_COLUMNS} FROM "review_logs"
            WHERE "card_id" = $1
            ORDER BY "reviewed_at" DESC, "seq" DESC
            LIMIT $2"#
        );
        let rows = sqlx::query(&sql)
            .bind(card_id)
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
            ORDER BY "created_at" ASC, "seq" ASC"#
        );
        let rows = sqlx::query(&sql)
            .bind(entity_type.as_str())
            .bind(entity_id)
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
        .bind(now)
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

pub struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
    lock_timeout_ms: u64,
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn lock_card(&mut self, id: Uuid) -> StoreResult<Option<Card>> {
        // Scoped to this transaction; waiting longer raises 55P03.
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout_ms))
            .execute(&mut *self.tx)
            .await?;

        let sql = format!(r#"SELECT {CARD_COLUMNS} FROM "cards" WHERE "id" = $1 FOR UPDATE"#);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(map_card).transpose()
    }

    async fn get_entry(&mut self, id: Uuid) -> StoreResult<Option<DictionaryEntry>> {
        let sql = format!(r#"SELECT {ENTRY_COLUMNS} FROM "dictionary_entries" WHERE "id" = $1"#);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(map_entry).transpose()
    }

    async fn find_card_by_entry(&mut self, entry_id: Uuid) -> StoreResult<Option<Card>> {
        let sql = format!(r#"SELECT {CARD_COLUMNS} FROM "cards" WHERE "entry_id" = $1"#);
        let row = sqlx::query(&sql)
            .bind(entry_id)
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
        .bind(entry.id)
        .bind(&entry.text)
        .bind(&entry.text_normalized)
        .bind(entry.created_at)
        .bind(entry.updated_at)
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
        .bind(card.id)
        .bind(card.entry_id)
        .bind(card.status.as_str())
        .bind(card.due_at)
        .bind(card.interval_days)
        .bind(card.ease_factor)
        .bind(card.review_count)
        .bind(card.lapses)
        .bind(card.created_at)
        .bind(card.updated_at)
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
        .bind(card.id)
        .bind(card.status.as_str())
        .bind(card.due_at)
        .bind(card.interval_days)
        .bind(card.ease_factor)
        .bind(card.review_count)
        .bind(card.lapses)
        .bind(card.updated_at)
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
        .bind(log.id)
        .bind(log.card_id)
        .bind(log.grade.to_string())
        .bind(log.duration_ms)
        .bind(log.reviewed_at)
        .bind(Json(log.state_before))
        .bind(Json(log.state_after))
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
        .bind(record.id)
        .bind(record.entity_type.as_str())
        .bind(record.entity_id)
        .bind(record.action.as_str())
        .bind(Json(&record.changes))
        .bind(record.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

// ==================== Row Mapping ====================

fn map_card(row: &PgRow) -> StoreResult<Card> {
    let status: String = row.try_get("status")?;
    Ok(Card {
        id: row.try_get("id")?,
        entry_id: row.try_get("entry_id")?,
        status: CardStatus::from_str(&status).map_err(|e| StoreError::Decode(e.to_string()))?,
        due_at: row.try_get("due_at")?,
        interval_days: row.try_get("interval_days")?,
        ease_factor: row.try_get("ease_factor")?,
        review_count: row.try_get("review_count")?,
        lapses: row.try_get("lapses")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_entry(row: &PgRow) -> StoreResult<DictionaryEntry> {
    Ok(DictionaryEntry {
        id: row.try_get("id")?,
        text: row.try_get("text")?,
        text_normalized: row.try_get("text_normalized")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_review_log(row: &PgRow) -> StoreResult<ReviewLog> {
    let grade: String = row.try_get("grade")?;
    let Json(state_before): Json<SchedulerSnapshot> = row.try_get("state_before")?;
    let Json(state_after): Json<SchedulerSnapshot> = row.try_get("state_after")?;
    Ok(ReviewLog {
        id: row.try_get("id")?,
        card_id: row.try_get("card_id")?,
        grade: Grade::from_str(&grade).map_err(|e| StoreError::Decode(e.to_string()))?,
        duration_ms: row.try_get("duration_ms")?,
        reviewed_at: row.try_get("reviewed_at")?,
        state_before,
        state_after,
    })
}

fn map_audit(row: &PgRow) -> StoreResult<AuditRecord> {
    let entity_type: String = row.try_get("entity_type")?;
    let action: String = row.try_get("action")?;
    let Json(changes): Json<ChangeSet> = row.try_get("changes")?;
    Ok(AuditRecord {
        id: row.try_get("id")?,
        entity_type: EntityType::from_str(&entity_type).map_err(StoreError::Decode)?,
        entity_id: row.try_get("entity_id")?,
        action: AuditAction::from_str(&action).map_err(StoreError::Decode)?,
        changes,
        created_at: row.try_get("created_at")?,
    })
}

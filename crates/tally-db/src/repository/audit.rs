//! # Audit Repository
//!
//! Append-only record of who did what, when.
//!
//! ```text
//!   CheckoutEngine ──append_in(tx)──► audit_log ──► report screens (read)
//!         │
//!         └── after commit ──publish()──► tracing target "tally::audit"
//! ```
//!
//! The engine only ever writes here. Rows cannot be updated or deleted
//! (triggers in the schema enforce it).

use chrono::Utc;
use serde_json::Value;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DbResult;
use tally_core::AuditEvent;

/// Action names written to `audit_log.action`.
pub mod actions {
    pub const SALE_COMPLETED: &str = "sale.completed";
    pub const SALE_RETURNED: &str = "sale.returned";
    pub const STOCK_MOVEMENT: &str = "stock.movement";
}

/// An audit event about to be appended.
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub actor_id: String,
    pub action: &'static str,
    pub entity_type: &'static str,
    pub entity_id: String,
    pub details: Value,
}

impl NewAuditEvent {
    pub fn new(
        actor_id: impl Into<String>,
        action: &'static str,
        entity_type: &'static str,
        entity_id: impl Into<String>,
    ) -> Self {
        NewAuditEvent {
            actor_id: actor_id.into(),
            action,
            entity_type,
            entity_id: entity_id.into(),
            details: Value::Object(Default::default()),
        }
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Repository for the audit log.
#[derive(Debug, Clone)]
pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AuditRepository { pool }
    }

    /// Appends an event inside the caller's transaction.
    ///
    /// The event becomes visible only if that transaction commits. Call
    /// [`AuditRepository::publish`] with the returned record once it has.
    pub async fn append_in(conn: &mut SqliteConnection, event: NewAuditEvent) -> DbResult<AuditEvent> {
        let record = AuditEvent {
            id: Uuid::new_v4().to_string(),
            actor_id: event.actor_id,
            action: event.action.to_string(),
            entity_type: event.entity_type.to_string(),
            entity_id: event.entity_id,
            details: event.details.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO audit_log (id, actor_id, action, entity_type, entity_id, details, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&record.id)
        .bind(&record.actor_id)
        .bind(&record.action)
        .bind(&record.entity_type)
        .bind(&record.entity_id)
        .bind(&record.details)
        .bind(record.created_at)
        .execute(&mut *conn)
        .await?;

        debug!(action = %record.action, entity_id = %record.entity_id, "Audit event staged");

        Ok(record)
    }

    /// Mirrors a committed event to the `tally::audit` tracing target.
    pub fn publish(record: &AuditEvent) {
        info!(
            target: "tally::audit",
            actor_id = %record.actor_id,
            action = %record.action,
            entity_type = %record.entity_type,
            entity_id = %record.entity_id,
            details = %record.details,
            "audit event"
        );
    }

    /// Events for one entity, oldest first.
    pub async fn for_entity(&self, entity_type: &str, entity_id: &str) -> DbResult<Vec<AuditEvent>> {
        let events = sqlx::query_as::<_, AuditEvent>(
            r#"
            SELECT id, actor_id, action, entity_type, entity_id, details, created_at
            FROM audit_log
            WHERE entity_type = ?1 AND entity_id = ?2
            ORDER BY created_at, rowid
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// Total number of events (diagnostics and tests).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_log")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

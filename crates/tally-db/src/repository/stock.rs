//! # Stock Ledger
//!
//! The authoritative per-product quantity plus its append-only movement log.
//!
//! ## Ledger Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Stock Ledger                                    │
//! │                                                                         │
//! │  stock_movements (append-only)          products.quantity (cache)      │
//! │  ─────────────────────────────          ─────────────────────────      │
//! │  +24  receive     admin                                                │
//! │   -2  sale        cashier-1  INV-...                                   │
//! │   -1  sale        cashier-2  INV-...                                   │
//! │   +2  return      manager    INV-...                                   │
//! │  ────                                                                   │
//! │   23  = SUM(delta)  ══════════════════════►  23                        │
//! │                                                                         │
//! │  Every change to the cache and its movement row commit together, so   │
//! │  no reader ever sees them disagree.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarded Update
//! ```text
//!   UPDATE products SET quantity = quantity + Δ
//!   WHERE id = ? AND quantity + Δ >= 0
//!
//!   rows_affected = 1 → applied, append movement
//!   rows_affected = 0 → product missing     → DbError::NotFound
//!                       or would go negative → DbError::NegativeStockRejected
//! ```
//! The check and the write are one statement, so two registers selling the
//! last unit cannot both succeed.

use chrono::Utc;
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::audit::{actions, AuditRepository, NewAuditEvent};
use tally_core::validation::validate_delta;
use tally_core::{MovementCause, StockMovement};

// =============================================================================
// New Movement
// =============================================================================

/// A stock movement about to be recorded.
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub product_id: String,
    /// Signed change. Never zero.
    pub delta: i64,
    pub cause: MovementCause,
    pub actor_id: String,
    pub reference_id: Option<String>,
    pub note: Option<String>,
}

impl NewMovement {
    pub fn new(
        product_id: impl Into<String>,
        delta: i64,
        cause: MovementCause,
        actor_id: impl Into<String>,
    ) -> Self {
        NewMovement {
            product_id: product_id.into(),
            delta,
            cause,
            actor_id: actor_id.into(),
            reference_id: None,
            note: None,
        }
    }

    /// Links the movement to a sale.
    pub fn reference(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

// =============================================================================
// Stock Ledger
// =============================================================================

/// Repository for stock quantities and movements.
#[derive(Debug, Clone)]
pub struct StockLedger {
    pool: SqlitePool,
}

impl StockLedger {
    pub fn new(pool: SqlitePool) -> Self {
        StockLedger { pool }
    }

    /// Cached quantity on hand.
    pub async fn current_quantity(&self, product_id: &str) -> DbResult<i64> {
        let quantity: Option<i64> = sqlx::query_scalar("SELECT quantity FROM products WHERE id = ?1")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;

        quantity.ok_or_else(|| DbError::not_found("Product", product_id))
    }

    /// Records a movement as its own unit of work.
    ///
    /// Used by stock desks (receive, adjustment, transfer) that bypass the
    /// sale flow. Appends a `stock.movement` audit event in the same
    /// transaction.
    ///
    /// ```rust,ignore
    /// db.stock()
    ///     .record_movement(&product_id, 24, MovementCause::Receive, "clerk-3", Some("PO-118"))
    ///     .await?;
    /// ```
    pub async fn record_movement(
        &self,
        product_id: &str,
        delta: i64,
        cause: MovementCause,
        actor_id: &str,
        note: Option<&str>,
    ) -> DbResult<StockMovement> {
        let mut movement = NewMovement::new(product_id, delta, cause, actor_id);
        if let Some(note) = note {
            movement = movement.note(note);
        }

        let mut tx = self.pool.begin().await?;

        let recorded = Self::record_movement_in(&mut tx, movement).await?;
        let event = AuditRepository::append_in(
            &mut tx,
            NewAuditEvent::new(actor_id, actions::STOCK_MOVEMENT, "product", product_id).details(
                json!({
                    "movement_id": recorded.id,
                    "delta": recorded.delta,
                    "cause": recorded.cause,
                    "note": recorded.note,
                }),
            ),
        )
        .await?;

        tx.commit().await?;
        AuditRepository::publish(&event);

        info!(
            product_id = %product_id,
            delta = delta,
            cause = %cause,
            "Stock movement recorded"
        );
        Ok(recorded)
    }

    /// Applies a movement inside the caller's transaction.
    ///
    /// One guarded `UPDATE` then one `INSERT`. On a file database the
    /// `UPDATE` takes SQLite's write lock if the transaction doesn't hold it
    /// yet, waiting up to `busy_timeout`.
    pub async fn record_movement_in(
        conn: &mut SqliteConnection,
        movement: NewMovement,
    ) -> DbResult<StockMovement> {
        validate_delta(movement.delta)?;

        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE products
            SET quantity = quantity + ?1,
                updated_at = ?2
            WHERE id = ?3
              AND quantity + ?1 >= 0
            "#,
        )
        .bind(movement.delta)
        .bind(now)
        .bind(&movement.product_id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            let available: Option<i64> =
                sqlx::query_scalar("SELECT quantity FROM products WHERE id = ?1")
                    .bind(&movement.product_id)
                    .fetch_optional(&mut *conn)
                    .await?;

            return match available {
                None => Err(DbError::not_found("Product", &movement.product_id)),
                Some(available) => {
                    warn!(
                        product_id = %movement.product_id,
                        delta = movement.delta,
                        available = available,
                        "Stock movement rejected: would go negative"
                    );
                    Err(DbError::NegativeStockRejected {
                        product_id: movement.product_id,
                        delta: movement.delta,
                        available,
                    })
                }
            };
        }

        let recorded = StockMovement {
            id: Uuid::new_v4().to_string(),
            product_id: movement.product_id,
            delta: movement.delta,
            cause: movement.cause,
            actor_id: movement.actor_id,
            reference_id: movement.reference_id,
            note: movement.note,
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO stock_movements (
                id, product_id, delta, cause, actor_id, reference_id, note, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&recorded.id)
        .bind(&recorded.product_id)
        .bind(recorded.delta)
        .bind(recorded.cause)
        .bind(&recorded.actor_id)
        .bind(&recorded.reference_id)
        .bind(&recorded.note)
        .bind(recorded.created_at)
        .execute(&mut *conn)
        .await?;

        debug!(
            product_id = %recorded.product_id,
            delta = recorded.delta,
            cause = %recorded.cause,
            "Movement applied"
        );
        Ok(recorded)
    }

    /// Credits back every line of a sale with a `Return` movement.
    ///
    /// The caller owns the status transition; this only touches stock.
    pub async fn reverse_sale_in(
        conn: &mut SqliteConnection,
        sale_id: &str,
        actor_id: &str,
    ) -> DbResult<Vec<StockMovement>> {
        let lines: Vec<(String, i64)> = sqlx::query_as(
            "SELECT product_id, quantity FROM sale_items WHERE sale_id = ?1 ORDER BY rowid",
        )
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;

        if lines.is_empty() {
            error!(sale_id = %sale_id, "Sale has no items to reverse");
            return Err(DbError::InvariantViolation(format!(
                "sale {} has no items",
                sale_id
            )));
        }

        let mut movements = Vec::with_capacity(lines.len());
        for (product_id, quantity) in lines {
            let movement = NewMovement::new(product_id, quantity, MovementCause::Return, actor_id)
                .reference(sale_id);
            movements.push(Self::record_movement_in(conn, movement).await?);
        }

        debug!(sale_id = %sale_id, lines = movements.len(), "Sale reversed");
        Ok(movements)
    }

    /// Movements for a product, oldest first.
    pub async fn movements(&self, product_id: &str) -> DbResult<Vec<StockMovement>> {
        let movements = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT id, product_id, delta, cause, actor_id, reference_id, note, created_at
            FROM stock_movements
            WHERE product_id = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }

    /// Movements that reference a sale (its debits and any return credits).
    pub async fn movements_for_reference(&self, reference_id: &str) -> DbResult<Vec<StockMovement>> {
        let movements = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT id, product_id, delta, cause, actor_id, reference_id, note, created_at
            FROM stock_movements
            WHERE reference_id = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(reference_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }

    /// `SUM(delta)` over a product's movements (0 when none).
    pub async fn movement_sum(&self, product_id: &str) -> DbResult<i64> {
        let sum: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(delta), 0) FROM stock_movements WHERE product_id = ?1",
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(sum)
    }

    /// Checks `products.quantity == SUM(delta)` for one product.
    ///
    /// Both values are read in one statement so they come from the same
    /// snapshot. Returns the verified quantity.
    pub async fn verify_cached_quantity(&self, product_id: &str) -> DbResult<i64> {
        let row: Option<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT p.quantity,
                   COALESCE((SELECT SUM(m.delta) FROM stock_movements m WHERE m.product_id = p.id), 0)
            FROM products p
            WHERE p.id = ?1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        let (cached, folded) = row.ok_or_else(|| DbError::not_found("Product", product_id))?;

        if cached != folded {
            error!(
                product_id = %product_id,
                cached = cached,
                movement_sum = folded,
                "Cached quantity disagrees with movement ledger"
            );
            return Err(DbError::InvariantViolation(format!(
                "product {} caches quantity {} but its movements sum to {}",
                product_id, cached, folded
            )));
        }

        Ok(cached)
    }

    /// Runs [`verify_cached_quantity`](Self::verify_cached_quantity) over
    /// every product. Returns how many were checked.
    pub async fn verify_all(&self) -> DbResult<usize> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM products ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        for id in &ids {
            self.verify_cached_quantity(id).await?;
        }
        Ok(ids.len())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::product::NewProduct;
    use crate::{Database, DbConfig};

    async fn setup(opening_stock: i64) -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .products()
            .insert(&NewProduct::new("COKE-330", "Coca-Cola 330ml", 150).opening_stock(opening_stock), "admin")
            .await
            .unwrap();
        (db, product.id)
    }

    #[tokio::test]
    async fn test_opening_stock_is_a_receive_movement() {
        let (db, id) = setup(24).await;

        let movements = db.stock().movements(&id).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].delta, 24);
        assert_eq!(movements[0].cause, MovementCause::Receive);

        assert_eq!(db.stock().current_quantity(&id).await.unwrap(), 24);
        assert_eq!(db.stock().verify_cached_quantity(&id).await.unwrap(), 24);
    }

    #[tokio::test]
    async fn test_record_movement_updates_cache_and_ledger() {
        let (db, id) = setup(10).await;
        let ledger = db.stock();

        ledger
            .record_movement(&id, -3, MovementCause::Adjustment, "manager", Some("damaged"))
            .await
            .unwrap();
        ledger
            .record_movement(&id, 5, MovementCause::Transfer, "manager", None)
            .await
            .unwrap();

        assert_eq!(ledger.current_quantity(&id).await.unwrap(), 12);
        assert_eq!(ledger.movement_sum(&id).await.unwrap(), 12);
        assert_eq!(ledger.verify_all().await.unwrap(), 1);

        let audit = db.audit().for_entity("product", &id).await.unwrap();
        assert_eq!(audit.len(), 2);
        assert!(audit.iter().all(|e| e.action == "stock.movement"));
    }

    #[tokio::test]
    async fn test_negative_stock_rejected_without_side_effects() {
        let (db, id) = setup(2).await;
        let ledger = db.stock();

        let err = ledger
            .record_movement(&id, -3, MovementCause::Adjustment, "manager", None)
            .await
            .unwrap_err();

        match err {
            DbError::NegativeStockRejected {
                product_id,
                delta,
                available,
            } => {
                assert_eq!(product_id, id);
                assert_eq!(delta, -3);
                assert_eq!(available, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(ledger.current_quantity(&id).await.unwrap(), 2);
        assert_eq!(ledger.movements(&id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_debit_to_exactly_zero_is_allowed() {
        let (db, id) = setup(2).await;

        db.stock()
            .record_movement(&id, -2, MovementCause::Adjustment, "manager", None)
            .await
            .unwrap();

        assert_eq!(db.stock().current_quantity(&id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_product_and_zero_delta() {
        let (db, _) = setup(1).await;
        let ledger = db.stock();

        assert!(matches!(
            ledger.record_movement("missing", 1, MovementCause::Receive, "admin", None).await,
            Err(DbError::NotFound { .. })
        ));
        assert!(matches!(
            ledger.current_quantity("missing").await,
            Err(DbError::NotFound { .. })
        ));
        assert!(matches!(
            ledger.record_movement("missing", 0, MovementCause::Receive, "admin", None).await,
            Err(DbError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_rolled_back_movement_leaves_no_trace() {
        let (db, id) = setup(5).await;

        {
            let mut tx = db.begin().await.unwrap();
            StockLedger::record_movement_in(
                &mut tx,
                NewMovement::new(id.clone(), -4, MovementCause::Sale, "cashier-1"),
            )
            .await
            .unwrap();
            // dropped without commit
        }

        assert_eq!(db.stock().current_quantity(&id).await.unwrap(), 5);
        assert_eq!(db.stock().movements(&id).await.unwrap().len(), 1);
        db.stock().verify_cached_quantity(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_verify_detects_cache_drift() {
        let (db, id) = setup(5).await;

        // Bypass the ledger on purpose
        sqlx::query("UPDATE products SET quantity = 7 WHERE id = ?1")
            .bind(&id)
            .execute(db.pool())
            .await
            .unwrap();

        assert!(matches!(
            db.stock().verify_cached_quantity(&id).await,
            Err(DbError::InvariantViolation(_))
        ));
    }
}

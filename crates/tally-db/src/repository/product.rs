//! # Product Repository
//!
//! Catalog reads and writes. Quantity is never written here directly:
//! opening stock goes through the stock ledger as a `Receive` movement, and
//! `update_details` leaves `quantity` alone.
//!
//! ## Key Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  insert(new, actor)                                                    │
//! │    BEGIN                                                               │
//! │    INSERT products (quantity = 0)                                      │
//! │    StockLedger::record_movement_in(+opening_stock, Receive)            │
//! │    COMMIT                                                              │
//! │                                                                         │
//! │  get_by_id / get_by_sku / list_active / low_stock / count              │
//! │  update_details / soft_delete                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::stock::{NewMovement, StockLedger};
use tally_core::validation::validate_price_cents;
use tally_core::{MovementCause, Product, ValidationError};

const PRODUCT_COLUMNS: &str = r#"
    id, sku, name, cost_cents, price_cents, quantity, min_quantity,
    is_active, created_at, updated_at
"#;

/// A product to create.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub cost_cents: i64,
    pub price_cents: i64,
    pub min_quantity: i64,
    /// Recorded as a `Receive` movement when > 0.
    pub opening_stock: i64,
}

impl NewProduct {
    pub fn new(sku: impl Into<String>, name: impl Into<String>, price_cents: i64) -> Self {
        NewProduct {
            sku: sku.into(),
            name: name.into(),
            cost_cents: 0,
            price_cents,
            min_quantity: 0,
            opening_stock: 0,
        }
    }

    pub fn cost_cents(mut self, cost_cents: i64) -> Self {
        self.cost_cents = cost_cents;
        self
    }

    pub fn min_quantity(mut self, min_quantity: i64) -> Self {
        self.min_quantity = min_quantity;
        self
    }

    pub fn opening_stock(mut self, opening_stock: i64) -> Self {
        self.opening_stock = opening_stock;
        self
    }
}

/// Editable catalog fields. Quantity is not one of them.
#[derive(Debug, Clone)]
pub struct ProductDetails {
    pub name: String,
    pub cost_cents: i64,
    pub price_cents: i64,
    pub min_quantity: i64,
    pub is_active: bool,
}

impl From<&Product> for ProductDetails {
    fn from(product: &Product) -> Self {
        ProductDetails {
            name: product.name.clone(),
            cost_cents: product.cost_cents,
            price_cents: product.price_cents,
            min_quantity: product.min_quantity,
            is_active: product.is_active,
        }
    }
}

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS);
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Gets a product by its SKU (e.g. "COKE-330").
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {} FROM products WHERE sku = ?1", PRODUCT_COLUMNS);
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(sku)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Inserts a product and records its opening stock.
    ///
    /// ## Returns
    /// * `Ok(Product)` - the stored product, quantity = opening stock
    /// * `Err(DbError::UniqueViolation)` - SKU already exists
    pub async fn insert(&self, new: &NewProduct, actor_id: &str) -> DbResult<Product> {
        validate_price_cents(new.price_cents)?;
        if new.opening_stock < 0 {
            return Err(ValidationError::OutOfRange {
                field: "opening_stock".to_string(),
                min: 0,
                max: i64::MAX,
            }
            .into());
        }

        debug!(sku = %new.sku, opening_stock = new.opening_stock, "Inserting product");

        let id = generate_product_id();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, cost_cents, price_cents, quantity, min_quantity,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, 1, ?7, ?7)
            "#,
        )
        .bind(&id)
        .bind(&new.sku)
        .bind(&new.name)
        .bind(new.cost_cents)
        .bind(new.price_cents)
        .bind(new.min_quantity)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::duplicate(field, new.sku.clone()),
            other => other,
        })?;

        if new.opening_stock > 0 {
            StockLedger::record_movement_in(
                &mut tx,
                NewMovement::new(id.clone(), new.opening_stock, MovementCause::Receive, actor_id)
                    .note("opening stock"),
            )
            .await?;
        }

        tx.commit().await?;

        self.get_by_id(&id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", &id))
    }

    /// Updates catalog fields. Stock is untouched.
    pub async fn update_details(&self, id: &str, details: &ProductDetails) -> DbResult<()> {
        validate_price_cents(details.price_cents)?;
        debug!(id = %id, "Updating product details");

        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = ?2,
                cost_cents = ?3,
                price_cents = ?4,
                min_quantity = ?5,
                is_active = ?6,
                updated_at = ?7
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(&details.name)
        .bind(details.cost_cents)
        .bind(details.price_cents)
        .bind(details.min_quantity)
        .bind(details.is_active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Soft-deletes a product by setting is_active = false.
    ///
    /// Historical sales and movements keep referencing it.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Soft-deleting product");

        let result = sqlx::query("UPDATE products SET is_active = 0, updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Active products sorted by name.
    pub async fn list_active(&self, limit: u32) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {} FROM products WHERE is_active = 1 ORDER BY name LIMIT ?1",
            PRODUCT_COLUMNS
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(products)
    }

    /// Active products at or below their reorder threshold, emptiest first.
    pub async fn low_stock(&self) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {} FROM products WHERE is_active = 1 AND quantity <= min_quantity ORDER BY quantity, name",
            PRODUCT_COLUMNS
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(products)
    }

    /// Counts active products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Generates a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let db = db().await;
        let repo = db.products();

        let product = repo
            .insert(
                &NewProduct::new("COKE-330", "Coca-Cola 330ml", 150)
                    .cost_cents(90)
                    .min_quantity(6)
                    .opening_stock(24),
                "admin",
            )
            .await
            .unwrap();

        assert_eq!(product.quantity, 24);
        assert!(product.is_active);

        let by_sku = repo.get_by_sku("COKE-330").await.unwrap().unwrap();
        assert_eq!(by_sku.id, product.id);
        assert_eq!(by_sku.cost_cents, 90);
        assert!(repo.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_sku_rejected() {
        let db = db().await;
        let repo = db.products();

        repo.insert(&NewProduct::new("SKU-1", "One", 100), "admin")
            .await
            .unwrap();
        let err = repo
            .insert(&NewProduct::new("SKU-1", "Again", 100), "admin")
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::UniqueViolation { ref value, .. } if value == "SKU-1"));
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalid_new_product_rejected() {
        let db = db().await;
        let repo = db.products();

        assert!(matches!(
            repo.insert(&NewProduct::new("NEG", "Negative", -1), "admin").await,
            Err(DbError::InvalidInput(_))
        ));
        assert!(matches!(
            repo.insert(&NewProduct::new("NEG", "Negative", 1).opening_stock(-5), "admin")
                .await,
            Err(DbError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_update_details_keeps_quantity() {
        let db = db().await;
        let repo = db.products();
        let product = repo
            .insert(&NewProduct::new("SKU-1", "One", 100).opening_stock(7), "admin")
            .await
            .unwrap();

        let mut details = ProductDetails::from(&product);
        details.name = "One (new label)".to_string();
        details.price_cents = 120;
        repo.update_details(&product.id, &details).await.unwrap();

        let updated = repo.get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(updated.name, "One (new label)");
        assert_eq!(updated.price_cents, 120);
        assert_eq!(updated.quantity, 7);

        assert!(matches!(
            repo.update_details("missing", &details).await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_soft_delete_and_low_stock() {
        let db = db().await;
        let repo = db.products();

        let plenty = repo
            .insert(&NewProduct::new("A", "Apples", 50).min_quantity(5).opening_stock(40), "admin")
            .await
            .unwrap();
        let low = repo
            .insert(&NewProduct::new("B", "Bananas", 30).min_quantity(5).opening_stock(3), "admin")
            .await
            .unwrap();
        let gone = repo
            .insert(&NewProduct::new("C", "Cherries", 80).min_quantity(5), "admin")
            .await
            .unwrap();

        repo.soft_delete(&gone.id).await.unwrap();

        let active = repo.list_active(10).await.unwrap();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].id, plenty.id);

        let low_stock = repo.low_stock().await.unwrap();
        assert_eq!(low_stock.len(), 1);
        assert_eq!(low_stock[0].id, low.id);
        assert!(low_stock[0].is_low_stock());

        assert_eq!(repo.count().await.unwrap(), 2);
    }
}

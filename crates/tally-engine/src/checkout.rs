//! # Checkout
//!
//! Turns a cart and a payment into a committed sale, atomically.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Checkout Phases                                   │
//! │                                                                         │
//! │  Building ──► Validating ──────────► Committing ──────────► Committed  │
//! │  (caller's     │ empty cart?           │ BEGIN                          │
//! │   Cart)        │ re-read stock         │ guarded debit × n  (write lock)│
//! │                │ totals                │ INSERT sale  (invoice retry)   │
//! │                │ reconcile payment     │ INSERT sale_items              │
//! │                │ invoice number        │ INSERT audit_log               │
//! │                ▼                       │ COMMIT                         │
//! │             Rejected                   ▼                                │
//! │             (nothing written)        Failed (rolled back)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Validation reads run on the pool with no transaction open. The commit
//! phase's first statement is a write, so SQLite hands out the write lock
//! before anything inside the unit is read; a stale validation read is
//! caught by the guarded debit and reported as `StockConflict`.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use tally_core::invoice;
use tally_core::validation::{validate_actor_id, validate_uuid};
use tally_core::{
    reconcile, Cart, CartTotals, MovementCause, PaymentInfo, PaymentResult, Sale, SaleItem,
    SaleStatus, TaxRate,
};
use tally_db::repository::sale::{generate_sale_id, generate_sale_item_id};
use tally_db::{
    actions, AuditRepository, Database, DbError, NewAuditEvent, NewMovement, SaleRepository,
    StockLedger,
};

use crate::config::EngineConfig;
use crate::error::{CheckoutError, EngineResult};
use crate::receipt::{Receipt, ReceiptLine};

/// How many invoice numbers a checkout tries before giving up.
pub const INVOICE_ATTEMPTS: u32 = 3;

/// Where a checkout is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutPhase {
    Building,
    Validating,
    Rejected,
    Committing,
    Committed,
    Failed,
}

impl fmt::Display for CheckoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CheckoutPhase::Building => "building",
            CheckoutPhase::Validating => "validating",
            CheckoutPhase::Rejected => "rejected",
            CheckoutPhase::Committing => "committing",
            CheckoutPhase::Committed => "committed",
            CheckoutPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Output of the validation phase.
#[derive(Debug)]
struct Validated {
    totals: CartTotals,
    payment: PaymentResult,
    invoice_number: String,
}

/// The transaction engine.
///
/// Cheap to clone and safe to share across tasks: it holds a pool handle
/// and an `Arc`'d config.
///
/// ## Example
/// ```rust,ignore
/// let engine = CheckoutEngine::new(db, EngineConfig::default());
///
/// let mut cart = Cart::new();
/// cart.add_item(&widget, 2)?;
///
/// let receipt = engine
///     .checkout(&cart, PaymentInfo::cash(Money::from_cents(2500)), "cashier-1", None)
///     .await?;
/// println!("{} change {}", receipt.invoice_number, receipt.change);
/// ```
#[derive(Debug, Clone)]
pub struct CheckoutEngine {
    pub(crate) db: Database,
    pub(crate) config: Arc<EngineConfig>,
}

impl CheckoutEngine {
    pub fn new(db: Database, config: EngineConfig) -> Self {
        CheckoutEngine {
            db,
            config: Arc::new(config),
        }
    }

    /// Opens the database named in `config` (running migrations) and
    /// builds an engine over it.
    pub async fn connect(config: EngineConfig) -> EngineResult<Self> {
        let db = Database::new(config.db_config()).await?;
        Ok(Self::new(db, config))
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tax_rate(&self) -> TaxRate {
        self.config.tax_rate
    }

    /// Commits a sale for `cart`.
    ///
    /// On success stock is debited, the sale and its items are stored and
    /// a `sale.completed` audit event is written, all in one transaction.
    /// On any error nothing is written.
    ///
    /// ## Returns
    /// * `Err(EmptyCart | InsufficientStock | InsufficientPayment | InvalidInput)`
    ///   from validation
    /// * `Err(StockConflict)` if stock moved after validation
    /// * `Err(Unavailable)` on lock or pool timeouts (safe to retry)
    #[instrument(skip(self, cart, payment), fields(lines = cart.item_count(), method = %payment.method))]
    pub async fn checkout(
        &self,
        cart: &Cart,
        payment: PaymentInfo,
        cashier_id: &str,
        customer_id: Option<&str>,
    ) -> EngineResult<Receipt> {
        debug!(phase = %CheckoutPhase::Building, "Checkout requested");

        debug!(phase = %CheckoutPhase::Validating, "Validating checkout");
        let validated = match self.validate(cart, payment, cashier_id, customer_id).await {
            Ok(validated) => validated,
            Err(e) => {
                debug!(phase = %CheckoutPhase::Rejected, error = %e, "Checkout rejected");
                return Err(e);
            }
        };

        debug!(
            phase = %CheckoutPhase::Committing,
            invoice_number = %validated.invoice_number,
            total = %validated.totals.total,
            "Committing checkout"
        );
        match self.commit(cart, validated, cashier_id, customer_id).await {
            Ok(receipt) => {
                debug!(phase = %CheckoutPhase::Committed, sale_id = %receipt.sale_id, "Checkout committed");
                info!(
                    sale_id = %receipt.sale_id,
                    invoice_number = %receipt.invoice_number,
                    total = %receipt.total,
                    items = receipt.item_count(),
                    cashier_id = %cashier_id,
                    "Sale completed"
                );
                Ok(receipt)
            }
            Err(e) => {
                debug!(phase = %CheckoutPhase::Failed, error = %e, "Checkout rolled back");
                Err(e)
            }
        }
    }

    /// Local checks. Reads only, no transaction.
    async fn validate(
        &self,
        cart: &Cart,
        payment: PaymentInfo,
        cashier_id: &str,
        customer_id: Option<&str>,
    ) -> EngineResult<Validated> {
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        cart.verify()?;

        validate_actor_id("cashier_id", cashier_id)?;
        if let Some(customer_id) = customer_id {
            validate_actor_id("customer_id", customer_id)?;
        }

        // The cart's known_stock may be minutes old
        let stock = self.db.stock();
        for line in cart.lines() {
            let available = stock.current_quantity(&line.product_id).await?;
            if line.quantity > available {
                return Err(CheckoutError::InsufficientStock {
                    product_id: line.product_id.clone(),
                    requested: line.quantity,
                    available,
                });
            }
        }

        let totals = cart.totals(self.config.tax_rate);
        let payment = reconcile(totals.total, payment.method, payment.tendered)?;

        Ok(Validated {
            totals,
            payment,
            invoice_number: invoice::next_invoice_number(),
        })
    }

    /// The single unit of work. Any `?` drops `tx`, which rolls back.
    async fn commit(
        &self,
        cart: &Cart,
        validated: Validated,
        cashier_id: &str,
        customer_id: Option<&str>,
    ) -> EngineResult<Receipt> {
        let Validated {
            totals,
            payment,
            invoice_number,
        } = validated;

        let sale_id = generate_sale_id();
        let now = Utc::now();

        let mut tx = self.db.begin().await?;

        for line in cart.lines() {
            let movement = NewMovement::new(&line.product_id, -line.quantity, MovementCause::Sale, cashier_id)
                .reference(&sale_id);

            StockLedger::record_movement_in(&mut tx, movement)
                .await
                .map_err(|e| {
                    if let DbError::NegativeStockRejected { available, .. } = &e {
                        warn!(
                            product_id = %line.product_id,
                            requested = line.quantity,
                            available = *available,
                            "Stock changed during checkout"
                        );
                    }
                    CheckoutError::from(e)
                })?;
        }

        let mut sale = Sale {
            id: sale_id.clone(),
            invoice_number,
            cashier_id: cashier_id.to_string(),
            customer_id: customer_id.map(str::to_string),
            status: SaleStatus::Completed,
            subtotal_cents: totals.subtotal.cents(),
            tax_cents: totals.tax.cents(),
            total_cents: totals.total.cents(),
            tax_rate: totals.tax_rate.as_decimal().to_string(),
            payment_method: payment.method,
            tendered_cents: payment.tendered.cents(),
            change_cents: payment.change.cents(),
            created_at: now,
            returned_at: None,
        };

        let mut attempt = 1;
        loop {
            match SaleRepository::insert_in(&mut tx, &sale).await {
                Ok(()) => break,
                Err(e) if e.is_unique_violation_on("invoice_number") && attempt < INVOICE_ATTEMPTS => {
                    error!(
                        invoice_number = %sale.invoice_number,
                        attempt = attempt,
                        "Invoice number collision, regenerating"
                    );
                    sale.invoice_number = invoice::next_invoice_number();
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let mut lines = Vec::with_capacity(cart.item_count());
        for line in cart.lines() {
            let item = SaleItem {
                id: generate_sale_item_id(),
                sale_id: sale_id.clone(),
                product_id: line.product_id.clone(),
                sku_snapshot: line.sku.clone(),
                name_snapshot: line.name.clone(),
                quantity: line.quantity,
                unit_price_cents: line.unit_price.cents(),
                line_total_cents: line.line_total().cents(),
                created_at: now,
            };
            SaleRepository::add_item_in(&mut tx, &item).await?;
            lines.push(ReceiptLine::from(&item));
        }

        let event = AuditRepository::append_in(
            &mut tx,
            NewAuditEvent::new(cashier_id, actions::SALE_COMPLETED, "sale", &sale_id).details(json!({
                "invoice_number": sale.invoice_number,
                "total_cents": sale.total_cents,
                "item_count": lines.len(),
                "payment_method": sale.payment_method,
                "customer_id": sale.customer_id,
            })),
        )
        .await?;

        tx.commit().await.map_err(DbError::from)?;
        AuditRepository::publish(&event);

        Ok(Receipt {
            sale_id,
            invoice_number: sale.invoice_number,
            store_name: self.config.store_name.clone(),
            lines,
            subtotal: totals.subtotal,
            tax: totals.tax,
            total: totals.total,
            tax_rate: totals.tax_rate,
            payment_method: payment.method,
            tendered: payment.tendered,
            change: payment.change,
            cashier_id: sale.cashier_id,
            customer_id: sale.customer_id,
            timestamp: now,
        })
    }

    /// Rebuilds the receipt of a stored sale.
    pub async fn reprint_receipt(&self, sale_id: &str) -> EngineResult<Receipt> {
        validate_uuid(sale_id)?;

        let sales = self.db.sales();
        let sale = sales
            .get_by_id(sale_id)
            .await?
            .ok_or_else(|| CheckoutError::SaleNotFound(sale_id.to_string()))?;
        let items = sales.get_items(sale_id).await?;

        Receipt::from_sale(&sale, &items, &self.config.store_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{Money, PaymentMethod, Product};
    use tally_db::{DbConfig, NewProduct};

    async fn engine_with(rate_bps: u32) -> CheckoutEngine {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let config = EngineConfig {
            store_name: "Test Store".into(),
            tax_rate: TaxRate::from_bps(rate_bps),
            ..EngineConfig::default()
        };
        CheckoutEngine::new(db, config)
    }

    async fn product(engine: &CheckoutEngine, sku: &str, price: i64, stock: i64) -> Product {
        engine
            .db()
            .products()
            .insert(&NewProduct::new(sku, "Widget", price).opening_stock(stock), "admin")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_checkout_commits_everything() {
        let engine = engine_with(1000).await;
        let widget = product(&engine, "SKU-1", 1000, 5).await;

        let mut cart = Cart::new();
        cart.add_item(&widget, 2).unwrap();

        let receipt = engine
            .checkout(&cart, PaymentInfo::cash(Money::from_cents(2500)), "cashier-1", None)
            .await
            .unwrap();

        assert_eq!(receipt.subtotal, Money::from_cents(2000));
        assert_eq!(receipt.tax, Money::from_cents(200));
        assert_eq!(receipt.total, Money::from_cents(2200));
        assert_eq!(receipt.change, Money::from_cents(300));
        assert_eq!(receipt.store_name, "Test Store");
        assert!(invoice::is_well_formed(&receipt.invoice_number));

        let db = engine.db();
        assert_eq!(db.stock().current_quantity(&widget.id).await.unwrap(), 3);

        let sale = db.sales().get_by_id(&receipt.sale_id).await.unwrap().unwrap();
        assert_eq!(sale.status, SaleStatus::Completed);
        assert_eq!(db.sales().get_items(&sale.id).await.unwrap().len(), 1);

        let debits = db.stock().movements_for_reference(&sale.id).await.unwrap();
        assert_eq!(debits.len(), 1);
        assert_eq!(debits[0].delta, -2);
        assert_eq!(debits[0].cause, MovementCause::Sale);

        let events = db.audit().for_entity("sale", &sale.id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, actions::SALE_COMPLETED);
    }

    #[tokio::test]
    async fn test_empty_cart_rejected() {
        let engine = engine_with(0).await;
        let err = engine
            .checkout(&Cart::new(), PaymentInfo::card(), "cashier-1", None)
            .await
            .unwrap_err();
        assert_eq!(err, CheckoutError::EmptyCart);
    }

    #[tokio::test]
    async fn test_deserialized_cart_with_bad_line_rejected_before_any_write() {
        let engine = engine_with(0).await;
        let a = product(&engine, "SKU-A", 400, 5).await;
        let b = product(&engine, "SKU-B", 600, 5).await;

        let mut cart = Cart::new();
        cart.add_item(&a, 1).unwrap();
        cart.add_item(&b, 2).unwrap();

        let mut json = serde_json::to_value(&cart).unwrap();
        json["lines"][1]["quantity"] = json!(-1);
        let forged: Cart = serde_json::from_value(json).unwrap();

        let err = engine
            .checkout(&forged, PaymentInfo::card(), "cashier-1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidInput(_)), "{err:?}");
        assert!(!err.is_retryable());

        let mut json = serde_json::to_value(&cart).unwrap();
        json["lines"][1]["product_id"] = json!(a.id.clone());
        let duplicated: Cart = serde_json::from_value(json).unwrap();
        let err = engine
            .checkout(&duplicated, PaymentInfo::card(), "cashier-1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidInput(_)), "{err:?}");

        let stock = engine.db().stock();
        assert_eq!(stock.current_quantity(&a.id).await.unwrap(), 5);
        assert_eq!(stock.current_quantity(&b.id).await.unwrap(), 5);
        assert_eq!(engine.db().sales().list_recent(10).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_stale_cart_rejected_by_fresh_stock_read() {
        let engine = engine_with(0).await;
        let widget = product(&engine, "SKU-1", 1000, 5).await;

        let mut cart = Cart::new();
        cart.add_item(&widget, 4).unwrap();

        // Someone else shrinks stock after the cart was built
        engine
            .db()
            .stock()
            .record_movement(&widget.id, -3, MovementCause::Adjustment, "manager", Some("damaged"))
            .await
            .unwrap();

        let err = engine
            .checkout(&cart, PaymentInfo::card(), "cashier-1", None)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            CheckoutError::InsufficientStock {
                product_id: widget.id.clone(),
                requested: 4,
                available: 2,
            }
        );
        assert_eq!(engine.db().sales().list_recent(10).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_underpayment_writes_nothing() {
        let engine = engine_with(1000).await;
        let widget = product(&engine, "SKU-1", 1000, 5).await;

        let mut cart = Cart::new();
        cart.add_item(&widget, 2).unwrap();

        let err = engine
            .checkout(&cart, PaymentInfo::cash(Money::from_cents(2000)), "cashier-1", None)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            CheckoutError::InsufficientPayment {
                total: Money::from_cents(2200),
                tendered: Money::from_cents(2000),
            }
        );
        assert_eq!(engine.db().stock().current_quantity(&widget.id).await.unwrap(), 5);
        assert_eq!(engine.db().audit().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_conflict_on_later_line_rolls_back_earlier_debits() {
        let engine = engine_with(0).await;
        let first = product(&engine, "SKU-1", 500, 5).await;
        let second = product(&engine, "SKU-2", 700, 5).await;

        // A cart built from a stale read that believed 10 were on hand
        let mut stale = second.clone();
        stale.quantity = 10;

        let mut cart = Cart::new();
        cart.add_item(&first, 2).unwrap();
        cart.add_item(&stale, 8).unwrap();

        let totals = cart.totals(engine.tax_rate());
        let validated = Validated {
            payment: reconcile(totals.total, PaymentMethod::Card, Money::zero()).unwrap(),
            totals,
            invoice_number: invoice::next_invoice_number(),
        };

        let err = engine
            .commit(&cart, validated, "cashier-1", None)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            CheckoutError::StockConflict {
                product_id: second.id.clone(),
                requested: 8,
                available: 5,
            }
        );
        assert!(err.is_retryable());

        let db = engine.db();
        assert_eq!(db.stock().current_quantity(&first.id).await.unwrap(), 5);
        assert_eq!(db.stock().current_quantity(&second.id).await.unwrap(), 5);
        assert_eq!(db.sales().list_recent(10).await.unwrap().len(), 0);
        assert_eq!(db.stock().verify_all().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_card_payment_is_exact() {
        let engine = engine_with(825).await;
        let widget = product(&engine, "SKU-1", 1000, 5).await;

        let mut cart = Cart::new();
        cart.add_item(&widget, 1).unwrap();

        let receipt = engine
            .checkout(&cart, PaymentInfo::card(), "cashier-1", Some("customer-7"))
            .await
            .unwrap();

        assert_eq!(receipt.total, Money::from_cents(1083));
        assert_eq!(receipt.tendered, receipt.total);
        assert!(receipt.change.is_zero());
        assert_eq!(receipt.customer_id.as_deref(), Some("customer-7"));
    }

    #[tokio::test]
    async fn test_blank_cashier_rejected() {
        let engine = engine_with(0).await;
        let widget = product(&engine, "SKU-1", 1000, 5).await;

        let mut cart = Cart::new();
        cart.add_item(&widget, 1).unwrap();

        let err = engine
            .checkout(&cart, PaymentInfo::card(), "", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_reprint_matches_original() {
        let engine = engine_with(1000).await;
        let widget = product(&engine, "SKU-1", 1000, 5).await;

        let mut cart = Cart::new();
        cart.add_item(&widget, 2).unwrap();

        let receipt = engine
            .checkout(&cart, PaymentInfo::cash(Money::from_cents(3000)), "cashier-1", None)
            .await
            .unwrap();
        let reprint = engine.reprint_receipt(&receipt.sale_id).await.unwrap();

        assert_eq!(reprint.invoice_number, receipt.invoice_number);
        assert_eq!(reprint.lines, receipt.lines);
        assert_eq!(reprint.total, receipt.total);
        assert_eq!(reprint.change, Money::from_cents(800));
        assert_eq!(reprint.tax_rate, receipt.tax_rate);

        let unknown = generate_sale_id();
        let missing = engine.reprint_receipt(&unknown).await.unwrap_err();
        assert_eq!(missing, CheckoutError::SaleNotFound(unknown));

        let malformed = engine.reprint_receipt("nope").await.unwrap_err();
        assert!(matches!(malformed, CheckoutError::InvalidInput(_)));
    }
}

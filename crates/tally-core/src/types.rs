//! # Domain Types
//!
//! Core domain types shared by the cart, the stock ledger and the
//! transaction engine.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Sale       │   │ StockMovement   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  product_id     │       │
//! │  │  sku            │   │  invoice_number │   │  delta (±)      │       │
//! │  │  price_cents    │   │  status         │   │  cause          │       │
//! │  │  quantity       │◄──│  total_cents    │   │  actor_id       │       │
//! │  └─────────────────┘   └────────┬────────┘   └─────────────────┘       │
//! │                                 │ 1..n                                  │
//! │                        ┌────────▼────────┐   ┌─────────────────┐       │
//! │                        │    SaleItem     │   │   AuditEvent    │       │
//! │                        │  (snapshot)     │   │  (append-only)  │       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Referenced entities (cashier, customer) are plain identifiers, never
//! object graphs.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// A tax rate expressed as a decimal fraction (`0.10` = 10%).
///
/// ## Why Decimal?
/// Admins type rates like `0.0825`. As an `f64` that is
/// `0.08249999999999999`, which rounds a $10.00 sale's tax the wrong way.
/// `Decimal` keeps the typed value exactly.
///
/// Always within `[0, 1]`; construction outside that range fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(try_from = "Decimal", into = "Decimal")]
#[ts(export)]
pub struct TaxRate(#[ts(type = "string")] Decimal);

impl TaxRate {
    /// Creates a tax rate from a decimal fraction.
    ///
    /// ```rust
    /// use rust_decimal::Decimal;
    /// use tally_core::types::TaxRate;
    ///
    /// let rate = TaxRate::from_fraction(Decimal::new(10, 2)).unwrap(); // 0.10
    /// assert_eq!(rate.to_string(), "10.00%");
    /// assert!(TaxRate::from_fraction(Decimal::new(-1, 2)).is_err());
    /// ```
    pub fn from_fraction(fraction: Decimal) -> Result<Self, ValidationError> {
        if fraction < Decimal::ZERO || fraction > Decimal::ONE {
            return Err(ValidationError::InvalidFormat {
                field: "tax_rate".to_string(),
                reason: format!("{} is outside 0..=1", fraction),
            });
        }
        Ok(TaxRate(fraction.normalize()))
    }

    /// Creates a tax rate from basis points (825 = 8.25%).
    ///
    /// Values above 10000 are clamped to 100%.
    pub fn from_bps(bps: u32) -> Self {
        TaxRate(Decimal::new(i64::from(bps.min(10_000)), 4).normalize())
    }

    /// Returns the rate as a decimal fraction.
    #[inline]
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn zero() -> Self {
        TaxRate(Decimal::ZERO)
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

impl TryFrom<Decimal> for TaxRate {
    type Error = ValidationError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        TaxRate::from_fraction(value)
    }
}

impl From<TaxRate> for Decimal {
    fn from(rate: TaxRate) -> Self {
        rate.0
    }
}

impl FromStr for TaxRate {
    type Err = ValidationError;

    /// Parses `"0.10"`-style fractions (as stored in config and on sales).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fraction = Decimal::from_str(s.trim()).map_err(|e| ValidationError::InvalidFormat {
            field: "tax_rate".to_string(),
            reason: e.to_string(),
        })?;
        TaxRate::from_fraction(fraction)
    }
}

/// Percentage with two decimals, e.g. `8.25%`.
impl fmt::Display for TaxRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}%", self.0 * Decimal::ONE_HUNDRED)
    }
}

// =============================================================================
// Product
// =============================================================================

/// A product as seen by the engine.
///
/// `quantity` is the cached projection of the stock ledger; it only ever
/// changes through a recorded movement.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub sku: String,
    pub name: String,
    /// Unit cost in cents (for margin reports).
    pub cost_cents: i64,
    /// Unit price in cents.
    pub price_cents: i64,
    /// Current stock, never negative after a commit.
    pub quantity: i64,
    /// Low-stock threshold.
    pub min_quantity: i64,
    /// Inactive products cannot be added to a cart (soft delete).
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// True when stock is at or below the reorder threshold.
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.min_quantity
    }
}

// =============================================================================
// Sale Status
// =============================================================================

/// The status of a committed sale.
///
/// ```text
///   checkout ──► Completed ──► Returned
/// ```
/// `Pending` and `Cancelled` exist for parked / abandoned tickets written
/// by other workflows; the engine never transitions into them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Completed,
    Pending,
    Cancelled,
    Returned,
}

impl SaleStatus {
    /// Whether `self → next` is a legal post-commit transition.
    pub fn can_transition_to(&self, next: SaleStatus) -> bool {
        matches!((self, next), (SaleStatus::Completed, SaleStatus::Returned))
    }

    /// Lowercase name, as stored in the `sales.status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Completed => "completed",
            SaleStatus::Pending => "pending",
            SaleStatus::Cancelled => "cancelled",
            SaleStatus::Returned => "returned",
        }
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash; change is given.
    Cash,
    /// Card on an external terminal; always the exact amount.
    Card,
    /// Mobile wallet / QR; always the exact amount.
    Mobile,
}

impl PaymentMethod {
    /// Cash-like methods accept over-tender and give change.
    pub fn gives_change(&self) -> bool {
        matches!(self, PaymentMethod::Cash)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Mobile => "mobile",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A committed sale header.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    /// Human-facing unique identifier, assigned at commit.
    pub invoice_number: String,
    pub cashier_id: String,
    pub customer_id: Option<String>,
    pub status: SaleStatus,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    /// Rate the tax was computed with, as a decimal fraction string.
    pub tax_rate: String,
    pub payment_method: PaymentMethod,
    pub tendered_cents: i64,
    pub change_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub returned_at: Option<DateTime<Utc>>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

// =============================================================================
// Sale Item
// =============================================================================

/// A line of a committed sale.
///
/// Snapshot pattern: sku, name and price are frozen at checkout so the
/// sale reads the same after the catalog changes.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    pub sku_snapshot: String,
    pub name_snapshot: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    /// `unit_price_cents × quantity`, exact.
    pub line_total_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl SaleItem {
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

// =============================================================================
// Stock Movement
// =============================================================================

/// Why a stock movement happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementCause {
    Sale,
    Return,
    Receive,
    Adjustment,
    Transfer,
}

impl fmt::Display for MovementCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MovementCause::Sale => "sale",
            MovementCause::Return => "return",
            MovementCause::Receive => "receive",
            MovementCause::Adjustment => "adjustment",
            MovementCause::Transfer => "transfer",
        };
        f.write_str(name)
    }
}

/// One signed change to a product's stock. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockMovement {
    pub id: String,
    pub product_id: String,
    pub delta: i64,
    pub cause: MovementCause,
    pub actor_id: String,
    /// Sale id for `Sale` / `Return` movements.
    pub reference_id: Option<String>,
    pub note: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Audit Event
// =============================================================================

/// Who did what, when. Written by the engine, read only by reports.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct AuditEvent {
    pub id: String,
    pub actor_id: String,
    /// Dotted action name: `sale.completed`, `sale.returned`, `stock.movement`.
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    /// JSON details.
    pub details: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

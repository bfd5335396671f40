//! # Cart
//!
//! The in-memory cart a checkout session builds before commit.
//!
//! ## Cart Operations Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart Operations                                      │
//! │                                                                         │
//! │  Screen Action            Cart Method             Effect                │
//! │  ─────────────            ───────────             ──────                │
//! │                                                                         │
//! │  Scan / click product ──► add_item() ───────────► push or merge line    │
//! │                                                                         │
//! │  Change quantity ───────► set_quantity() ───────► line.qty = n          │
//! │                                                   (n <= 0 removes)      │
//! │                                                                         │
//! │  Click remove ──────────► remove_item() ────────► line dropped          │
//! │                                                                         │
//! │  Show totals ───────────► totals(rate) ─────────► CartTotals snapshot   │
//! │                                                                         │
//! │  NOTE: stock checks here are SOFT. They use the quantity the product    │
//! │        had when it was scanned. The engine re-reads stock at checkout.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rounding
//! Line totals and the subtotal are exact integer sums. The only rounding
//! step is tax, applied once to the subtotal. The total is `subtotal + tax`.
//!
//! ```rust
//! use tally_core::cart::Cart;
//! # use tally_core::types::{Product, TaxRate};
//! # use chrono::Utc;
//! # let product = Product {
//! #     id: "p-1".into(), sku: "SKU-1".into(), name: "Widget".into(),
//! #     cost_cents: 500, price_cents: 1000, quantity: 10, min_quantity: 0,
//! #     is_active: true, created_at: Utc::now(), updated_at: Utc::now(),
//! # };
//! let mut cart = Cart::new();
//! cart.add_item(&product, 2).unwrap();
//!
//! let totals = cart.totals("0.10".parse::<TaxRate>().unwrap());
//! assert_eq!(totals.subtotal.cents(), 2000);
//! assert_eq!(totals.tax.cents(), 200);
//! assert_eq!(totals.total.cents(), 2200);
//! ```

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{Product, TaxRate};
use crate::validation::{validate_price_cents, validate_quantity};
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

// =============================================================================
// Cart Line
// =============================================================================

/// A line in the cart.
///
/// ## Snapshot Fields
/// `sku`, `name` and `unit_price` are frozen when the product is added, so
/// the price a customer was shown is the price they pay. `known_stock` is
/// the quantity on hand at that moment, used only for the soft check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartLine {
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub unit_price: Money,
    /// Always > 0.
    pub quantity: i64,
    pub known_stock: i64,
    #[ts(as = "String")]
    pub added_at: DateTime<Utc>,
}

impl CartLine {
    /// Creates a line from a product, freezing its price.
    pub fn from_product(product: &Product, quantity: i64) -> Self {
        CartLine {
            product_id: product.id.clone(),
            sku: product.sku.clone(),
            name: product.name.clone(),
            unit_price: product.price(),
            quantity,
            known_stock: product.quantity,
            added_at: Utc::now(),
        }
    }

    /// Unit price × quantity, exact.
    #[inline]
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Cart
// =============================================================================

/// The shopping cart.
///
/// ## Invariants
/// - Lines are unique by `product_id`; adding the same product merges.
/// - Every line has `0 < quantity <= MAX_ITEM_QUANTITY`.
/// - At most `MAX_CART_ITEMS` lines.
///
/// Owned by one checkout session. It is `Send` so it can move into a task,
/// but it is never shared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Cart {
    lines: Vec<CartLine>,
    #[ts(as = "String")]
    created_at: DateTime<Utc>,
}

impl Cart {
    pub fn new() -> Self {
        Cart {
            lines: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Adds a product, or increases the quantity of its existing line.
    ///
    /// ## Errors
    /// - `Validation` when `quantity <= 0` or the price is out of range
    /// - `QuantityTooLarge` when the line would exceed `MAX_ITEM_QUANTITY`
    /// - `ProductInactive` for soft-deleted products
    /// - `InsufficientStock` when the line would exceed `product.quantity`
    /// - `CartTooLarge` when a new line would exceed `MAX_CART_ITEMS`
    pub fn add_item(&mut self, product: &Product, quantity: i64) -> CoreResult<()> {
        if quantity <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            }
            .into());
        }

        if !product.is_active {
            return Err(CoreError::ProductInactive(product.id.clone()));
        }
        validate_price_cents(product.price_cents)?;

        if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product.id) {
            let new_qty = line.quantity.saturating_add(quantity);
            check_line_quantity(&product.id, new_qty, product.quantity)?;

            line.quantity = new_qty;
            line.known_stock = product.quantity;
            return Ok(());
        }

        if self.lines.len() >= MAX_CART_ITEMS {
            return Err(CoreError::CartTooLarge {
                max: MAX_CART_ITEMS,
            });
        }

        check_line_quantity(&product.id, quantity, product.quantity)?;
        self.lines.push(CartLine::from_product(product, quantity));
        Ok(())
    }

    /// Removes a product's line.
    pub fn remove_item(&mut self, product_id: &str) -> CoreResult<()> {
        let initial_len = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);

        if self.lines.len() == initial_len {
            Err(CoreError::NotInCart(product_id.to_string()))
        } else {
            Ok(())
        }
    }

    /// Sets a line's quantity. `quantity <= 0` removes the line.
    ///
    /// The soft stock check uses the stock known when the line was added.
    pub fn set_quantity(&mut self, product_id: &str, quantity: i64) -> CoreResult<()> {
        if quantity <= 0 {
            return self.remove_item(product_id);
        }

        let line = self
            .lines
            .iter_mut()
            .find(|l| l.product_id == product_id)
            .ok_or_else(|| CoreError::NotInCart(product_id.to_string()))?;

        check_line_quantity(product_id, quantity, line.known_stock)?;
        line.quantity = quantity;
        Ok(())
    }

    /// Re-checks every cart invariant.
    ///
    /// A cart deserialized from a screen never went through `add_item`, so
    /// the engine calls this before it touches stock.
    pub fn verify(&self) -> CoreResult<()> {
        if self.lines.len() > MAX_CART_ITEMS {
            return Err(CoreError::CartTooLarge {
                max: MAX_CART_ITEMS,
            });
        }

        let mut seen = HashSet::with_capacity(self.lines.len());
        for line in &self.lines {
            validate_quantity(line.quantity)?;
            validate_price_cents(line.unit_price.cents())?;

            if !seen.insert(line.product_id.as_str()) {
                return Err(ValidationError::InvalidFormat {
                    field: "cart".to_string(),
                    reason: format!("product {} is on more than one line", line.product_id),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Empties the cart and restarts its clock.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.created_at = Utc::now();
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines in insertion order (display order).
    #[inline]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn line(&self, product_id: &str) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }

    /// Number of distinct products.
    #[inline]
    pub fn item_count(&self) -> usize {
        self.lines.len()
    }

    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    // -------------------------------------------------------------------------
    // Totals
    // -------------------------------------------------------------------------

    /// Sum of line totals. Exact.
    pub fn subtotal(&self) -> Money {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// `subtotal × rate`, rounded half-up to whole cents.
    pub fn tax(&self, rate: TaxRate) -> Money {
        self.subtotal().apply_rate(rate)
    }

    /// `subtotal + tax`.
    pub fn total(&self, rate: TaxRate) -> Money {
        self.totals(rate).total
    }

    /// Computes every figure a screen or receipt needs in one pass.
    pub fn totals(&self, rate: TaxRate) -> CartTotals {
        let subtotal = self.subtotal();
        let tax = subtotal.apply_rate(rate);

        CartTotals {
            item_count: self.item_count(),
            total_quantity: self.total_quantity(),
            subtotal,
            tax,
            total: subtotal + tax,
            tax_rate: rate,
        }
    }
}

impl Default for Cart {
    fn default() -> Self {
        Self::new()
    }
}

/// Soft check shared by `add_item` and `set_quantity`.
fn check_line_quantity(product_id: &str, requested: i64, available: i64) -> CoreResult<()> {
    if requested > MAX_ITEM_QUANTITY {
        return Err(CoreError::QuantityTooLarge {
            requested,
            max: MAX_ITEM_QUANTITY,
        });
    }
    validate_quantity(requested)?;

    if requested > available {
        return Err(CoreError::InsufficientStock {
            product_id: product_id.to_string(),
            requested,
            available,
        });
    }

    Ok(())
}

// =============================================================================
// Cart Totals
// =============================================================================

/// Snapshot of the cart's figures at one tax rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartTotals {
    pub item_count: usize,
    pub total_quantity: i64,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    pub tax_rate: TaxRate,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_product(id: &str, price_cents: i64, quantity: i64) -> Product {
        Product {
            id: id.to_string(),
            sku: format!("SKU-{}", id),
            name: format!("Product {}", id),
            cost_cents: price_cents / 2,
            price_cents,
            quantity,
            min_quantity: 0,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn rate(s: &str) -> TaxRate {
        s.parse().unwrap()
    }

    #[test]
    fn test_two_units_at_ten_percent() {
        let mut cart = Cart::new();
        cart.add_item(&test_product("1", 1000, 10), 2).unwrap();

        let totals = cart.totals(rate("0.10"));
        assert_eq!(totals.subtotal, Money::from_cents(2000));
        assert_eq!(totals.tax, Money::from_cents(200));
        assert_eq!(totals.total, Money::from_cents(2200));
        assert_eq!(cart.total(rate("0.10")), Money::from_cents(2200));
    }

    #[test]
    fn test_add_same_product_merges_lines() {
        let mut cart = Cart::new();
        let product = test_product("1", 999, 10);

        cart.add_item(&product, 2).unwrap();
        cart.add_item(&product, 3).unwrap();

        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.total_quantity(), 5);
        assert_eq!(cart.subtotal(), Money::from_cents(4995));
    }

    #[test]
    fn test_add_rejects_more_than_known_stock() {
        let mut cart = Cart::new();
        let product = test_product("1", 500, 3);

        let err = cart.add_item(&product, 4).unwrap_err();
        assert_eq!(
            err,
            CoreError::InsufficientStock {
                product_id: "1".to_string(),
                requested: 4,
                available: 3,
            }
        );
        assert!(cart.is_empty());
    }

    #[test]
    fn test_merge_is_capped_by_stock() {
        let mut cart = Cart::new();
        let product = test_product("1", 500, 3);

        cart.add_item(&product, 2).unwrap();
        let err = cart.add_item(&product, 2).unwrap_err();

        assert!(matches!(
            err,
            CoreError::InsufficientStock {
                requested: 4,
                available: 3,
                ..
            }
        ));
        assert_eq!(cart.line("1").unwrap().quantity, 2);
    }

    #[test]
    fn test_add_rejects_inactive_and_non_positive() {
        let mut cart = Cart::new();
        let mut product = test_product("1", 500, 3);

        assert!(matches!(
            cart.add_item(&product, 0),
            Err(CoreError::Validation(_))
        ));

        product.is_active = false;
        assert_eq!(
            cart.add_item(&product, 1),
            Err(CoreError::ProductInactive("1".to_string()))
        );
    }

    #[test]
    fn test_quantity_limit() {
        let mut cart = Cart::new();
        let product = test_product("1", 1, 10_000);

        assert_eq!(
            cart.add_item(&product, MAX_ITEM_QUANTITY + 1),
            Err(CoreError::QuantityTooLarge {
                requested: MAX_ITEM_QUANTITY + 1,
                max: MAX_ITEM_QUANTITY,
            })
        );
    }

    #[test]
    fn test_cart_line_limit() {
        let mut cart = Cart::new();
        for i in 0..MAX_CART_ITEMS {
            cart.add_item(&test_product(&i.to_string(), 100, 5), 1).unwrap();
        }

        let err = cart.add_item(&test_product("extra", 100, 5), 1).unwrap_err();
        assert_eq!(err, CoreError::CartTooLarge { max: MAX_CART_ITEMS });
    }

    #[test]
    fn test_price_above_cap_rejected() {
        let mut cart = Cart::new();
        let err = cart
            .add_item(&test_product("1", i64::MAX / 2, 10), 3)
            .unwrap_err();

        assert!(matches!(err, CoreError::Validation(ValidationError::OutOfRange { .. })));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_verify_catches_forged_lines() {
        let mut cart = Cart::new();
        cart.add_item(&test_product("1", 500, 10), 2).unwrap();
        cart.add_item(&test_product("2", 300, 10), 1).unwrap();
        assert!(cart.verify().is_ok());

        let mut json: serde_json::Value = serde_json::to_value(&cart).unwrap();
        json["lines"][1]["quantity"] = serde_json::json!(-1);
        let forged: Cart = serde_json::from_value(json).unwrap();
        assert!(matches!(forged.verify(), Err(CoreError::Validation(_))));

        let mut json: serde_json::Value = serde_json::to_value(&cart).unwrap();
        json["lines"][1]["unit_price"] = serde_json::json!(-300);
        let forged: Cart = serde_json::from_value(json).unwrap();
        assert!(forged.verify().is_err());

        let mut json: serde_json::Value = serde_json::to_value(&cart).unwrap();
        json["lines"][1]["product_id"] = serde_json::json!("1");
        let forged: Cart = serde_json::from_value(json).unwrap();
        assert!(matches!(
            forged.verify(),
            Err(CoreError::Validation(ValidationError::InvalidFormat { .. }))
        ));
    }

    #[test]
    fn test_set_quantity() {
        let mut cart = Cart::new();
        cart.add_item(&test_product("1", 250, 5), 1).unwrap();

        cart.set_quantity("1", 5).unwrap();
        assert_eq!(cart.total_quantity(), 5);

        assert!(matches!(
            cart.set_quantity("1", 6),
            Err(CoreError::InsufficientStock { available: 5, .. })
        ));
        assert_eq!(
            cart.set_quantity("missing", 1),
            Err(CoreError::NotInCart("missing".to_string()))
        );

        cart.set_quantity("1", 0).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cart = Cart::new();
        cart.add_item(&test_product("1", 100, 5), 1).unwrap();
        cart.add_item(&test_product("2", 200, 5), 1).unwrap();

        cart.remove_item("1").unwrap();
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].product_id, "2");
        assert!(cart.remove_item("1").is_err());

        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(cart.subtotal(), Money::zero());
    }

    #[test]
    fn test_price_is_frozen_at_add_time() {
        let mut cart = Cart::new();
        let mut product = test_product("1", 1000, 10);
        cart.add_item(&product, 1).unwrap();

        product.price_cents = 5000;
        cart.add_item(&product, 1).unwrap();

        assert_eq!(cart.line("1").unwrap().unit_price, Money::from_cents(1000));
        assert_eq!(cart.subtotal(), Money::from_cents(2000));
    }

    #[test]
    fn test_tax_rounds_once_on_subtotal() {
        // Three lines of $0.05 at 10%: per-line rounding would give 3 × 1 = 3
        // cents, the subtotal rounding gives round(1.5) = 2.
        let mut cart = Cart::new();
        for id in ["a", "b", "c"] {
            cart.add_item(&test_product(id, 5, 10), 1).unwrap();
        }

        assert_eq!(cart.subtotal(), Money::from_cents(15));
        assert_eq!(cart.tax(rate("0.10")), Money::from_cents(2));
        assert_eq!(cart.total(rate("0.10")), Money::from_cents(17));
    }
}

//! # Payment Reconciliation
//!
//! Turns a total due plus what the customer handed over into a
//! [`PaymentResult`], or rejects it.
//!
//! ```text
//!   method   tendered            result
//!   ──────   ─────────────────   ───────────────────────────────
//!   Cash     >= total            change = tendered - total
//!   Cash     <  total            InsufficientPayment
//!   Card     (ignored)           tendered = total, change = 0
//!   Mobile   (ignored)           tendered = total, change = 0
//! ```
//!
//! Quick-amount buttons (+$10, +$20) live in the UI. This module only ever
//! sees the final tendered amount.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::PaymentMethod;

/// What the cashier submits with a checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentInfo {
    pub method: PaymentMethod,
    /// Cash handed over. Ignored for exact-amount methods.
    pub tendered: Money,
}

impl PaymentInfo {
    pub fn cash(tendered: Money) -> Self {
        PaymentInfo {
            method: PaymentMethod::Cash,
            tendered,
        }
    }

    pub fn card() -> Self {
        PaymentInfo {
            method: PaymentMethod::Card,
            tendered: Money::zero(),
        }
    }

    pub fn mobile() -> Self {
        PaymentInfo {
            method: PaymentMethod::Mobile,
            tendered: Money::zero(),
        }
    }
}

/// Accepted payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentResult {
    pub method: PaymentMethod,
    pub tendered: Money,
    /// Never negative.
    pub change: Money,
}

/// Reconciles a tendered payment against the total due.
///
/// ```rust
/// use tally_core::money::Money;
/// use tally_core::payment::reconcile;
/// use tally_core::types::PaymentMethod;
///
/// let result = reconcile(Money::from_cents(2200), PaymentMethod::Cash, Money::from_cents(2500)).unwrap();
/// assert_eq!(result.change, Money::from_cents(300));
/// ```
pub fn reconcile(total: Money, method: PaymentMethod, tendered: Money) -> CoreResult<PaymentResult> {
    if total.is_negative() {
        return Err(CoreError::InvalidPaymentAmount {
            reason: format!("total {} is negative", total),
        });
    }

    if !method.gives_change() {
        return Ok(PaymentResult {
            method,
            tendered: total,
            change: Money::zero(),
        });
    }

    if tendered < total {
        return Err(CoreError::InsufficientPayment { total, tendered });
    }

    Ok(PaymentResult {
        method,
        tendered,
        change: tendered - total,
    })
}

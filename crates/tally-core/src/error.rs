//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core (this file)                                                │
//! │  ├── CoreError        - Cart / payment / state-machine rule violations │
//! │  └── ValidationError  - Malformed input                                │
//! │                                                                         │
//! │  tally-db                                                              │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  tally-engine                                                          │
//! │  └── CheckoutError    - What POS screens see                           │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError ─┐                                  │
//! │                         DbError ────┴─► CheckoutError → UI adapter     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant carries the ids and quantities a screen needs to render an
//! actionable message ("only 3 left of COKE-330").

use thiserror::Error;

use crate::money::Money;
use crate::types::SaleStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations raised by pure domain logic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Requested quantity exceeds known stock.
    ///
    /// ## User Workflow
    /// ```text
    /// Add to Cart (qty: 5)
    ///      │
    ///      ▼
    /// Known stock: 3
    ///      │
    ///      ▼
    /// InsufficientStock { product_id, requested: 5, available: 3 }
    ///      │
    ///      ▼
    /// UI shows: "Only 3 in stock"
    /// ```
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: String,
        requested: i64,
        available: i64,
    },

    /// Cash tendered is less than the amount due.
    #[error("Insufficient payment: total {total}, tendered {tendered}")]
    InsufficientPayment { total: Money, tendered: Money },

    /// Product is soft-deleted and cannot be sold.
    #[error("Product {0} is not active")]
    ProductInactive(String),

    /// Cart mutation referenced a product that has no line.
    #[error("Product {0} is not in the cart")]
    NotInCart(String),

    /// Cart has reached its line limit.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// Line quantity exceeds the per-line limit.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// Payment amount is malformed (negative total or tender).
    #[error("Invalid payment amount: {reason}")]
    InvalidPaymentAmount { reason: String },

    /// Sale status does not allow the requested transition.
    #[error("Sale {sale_id} cannot move from {from} to {to}")]
    InvalidStateTransition {
        sale_id: String,
        from: SaleStatus,
        to: SaleStatus,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g. invalid UUID, tax rate outside 0..=1).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product_id: "p-1".to_string(),
            requested: 5,
            available: 3,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for product p-1: requested 5, available 3"
        );

        let err = CoreError::InsufficientPayment {
            total: Money::from_cents(2200),
            tendered: Money::from_cents(2000),
        };
        assert_eq!(err.to_string(), "Insufficient payment: total $22.00, tendered $20.00");
    }

    #[test]
    fn test_transition_message() {
        let err = CoreError::InvalidStateTransition {
            sale_id: "s-1".to_string(),
            from: SaleStatus::Returned,
            to: SaleStatus::Returned,
        };
        assert_eq!(err.to_string(), "Sale s-1 cannot move from returned to returned");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "cashier_id".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}

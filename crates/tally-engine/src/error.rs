//! # Engine Error Types
//!
//! Typed failures of `checkout` and `return_sale`, plus configuration errors.
//!
//! ## Error Taxonomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CheckoutError by Kind                                │
//! │                                                                         │
//! │  Validation   EmptyCart, InsufficientStock,     nothing written;       │
//! │               InsufficientPayment, InvalidInput fix the cart, retry    │
//! │                                                                         │
//! │  Conflict     StockConflict                     lost a race; re-read   │
//! │                                                 stock, retry           │
//! │                                                                         │
//! │  Transient    Unavailable                       busy / timeout /       │
//! │                                                 connectivity; retry    │
//! │                                                                         │
//! │  Invariant    Invariant                         a bug; logged loudly,  │
//! │                                                 panics in debug builds │
//! │                                                                         │
//! │  State        InvalidStateTransition,           return of a sale that  │
//! │               SaleNotFound                      can't be returned      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every error is returned after the transaction was dropped, so no
//! variant ever implies partial state.

use serde::Serialize;
use thiserror::Error;
use tracing::error;

use tally_core::{CoreError, Money, SaleStatus, ValidationError};
use tally_db::DbError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, CheckoutError>;

/// Errors returned by [`CheckoutEngine`](crate::CheckoutEngine).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    /// Checkout was called with no lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// Current stock (re-read at checkout) cannot cover a line.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: String,
        requested: i64,
        available: i64,
    },

    /// Cash tendered is less than the total.
    #[error("Insufficient payment: total {total}, tendered {tendered}")]
    InsufficientPayment { total: Money, tendered: Money },

    /// Bad identifiers, unknown or inactive products, oversized carts.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Another checkout took the stock between validation and the debit.
    ///
    /// ## User Workflow
    /// ```text
    /// Register A: validate (3 ≥ 2) ─────────────── debit -2 ✓
    /// Register B: validate (3 ≥ 2) ── wait lock ── debit -2 ✗ (1 left)
    ///                                                    │
    ///                                                    ▼
    ///                          StockConflict { requested: 2, available: 1 }
    /// ```
    #[error("Stock for product {product_id} changed during checkout: requested {requested}, available {available}")]
    StockConflict {
        product_id: String,
        requested: i64,
        available: i64,
    },

    /// Lock wait, pool wait or connection failure. Nothing was committed.
    #[error("Store database unavailable: {0}")]
    Unavailable(String),

    /// Persisted state contradicts an engine invariant.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Sale {sale_id} cannot move from {from} to {to}")]
    InvalidStateTransition {
        sale_id: String,
        from: SaleStatus,
        to: SaleStatus,
    },

    #[error("Sale not found: {0}")]
    SaleNotFound(String),
}

/// Coarse grouping of [`CheckoutError`] for the caller's retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    Conflict,
    Transient,
    Invariant,
    State,
}

impl CheckoutError {
    /// Builds an [`CheckoutError::Invariant`], logging it at `error!`.
    ///
    /// Panics in debug builds.
    pub fn invariant(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(message = %message, "Engine invariant violated");
        if cfg!(debug_assertions) {
            panic!("invariant violated: {}", message);
        }
        CheckoutError::Invariant(message)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CheckoutError::EmptyCart
            | CheckoutError::InsufficientStock { .. }
            | CheckoutError::InsufficientPayment { .. }
            | CheckoutError::InvalidInput(_) => ErrorKind::Validation,
            CheckoutError::StockConflict { .. } => ErrorKind::Conflict,
            CheckoutError::Unavailable(_) => ErrorKind::Transient,
            CheckoutError::Invariant(_) => ErrorKind::Invariant,
            CheckoutError::InvalidStateTransition { .. } | CheckoutError::SaleNotFound(_) => {
                ErrorKind::State
            }
        }
    }

    /// True when re-running the whole checkout unchanged may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict | ErrorKind::Transient)
    }

    /// Message for the register screen.
    ///
    /// Validation and conflict errors name the product and the gap.
    /// Infrastructure errors get a generic "try again".
    pub fn user_message(&self) -> String {
        match self {
            CheckoutError::InsufficientStock {
                available,
                requested,
                ..
            }
            | CheckoutError::StockConflict {
                available,
                requested,
                ..
            } => format!("Only {} in stock, {} requested", available, requested),
            CheckoutError::InsufficientPayment { total, tendered } => {
                format!("Tendered {} is less than the total {}", tendered, total)
            }
            CheckoutError::Unavailable(_) => "The store database is busy. Please try again.".to_string(),
            CheckoutError::Invariant(_) => "Something went wrong. Please call a manager.".to_string(),
            other => other.to_string(),
        }
    }
}

/// Converts database errors to engine errors.
impl From<DbError> for CheckoutError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NegativeStockRejected {
                product_id,
                delta,
                available,
            } => CheckoutError::StockConflict {
                product_id,
                requested: -delta,
                available,
            },
            DbError::NotFound { entity, id } => {
                CheckoutError::InvalidInput(format!("{} not found: {}", entity, id))
            }
            DbError::InvalidInput(e) => CheckoutError::InvalidInput(e.to_string()),
            DbError::Busy(msg) => CheckoutError::Unavailable(msg),
            DbError::PoolExhausted => CheckoutError::Unavailable("connection pool exhausted".into()),
            DbError::ConnectionFailed(msg)
            | DbError::QueryFailed(msg)
            | DbError::TransactionFailed(msg)
            | DbError::MigrationFailed(msg) => {
                error!(error = %msg, "Database failure during engine operation");
                CheckoutError::Unavailable(msg)
            }
            DbError::UniqueViolation { field, value } => {
                CheckoutError::invariant(format!("duplicate {} '{}'", field, value))
            }
            DbError::ForeignKeyViolation { message } => {
                CheckoutError::invariant(format!("dangling reference: {}", message))
            }
            DbError::ConstraintViolation(msg) => {
                CheckoutError::invariant(format!("schema constraint rejected a write: {}", msg))
            }
            DbError::InvariantViolation(msg) | DbError::Internal(msg) => {
                CheckoutError::invariant(msg)
            }
        }
    }
}

/// Converts core errors to engine errors.
impl From<CoreError> for CheckoutError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InsufficientStock {
                product_id,
                requested,
                available,
            } => CheckoutError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            CoreError::InsufficientPayment { total, tendered } => {
                CheckoutError::InsufficientPayment { total, tendered }
            }
            CoreError::InvalidStateTransition { sale_id, from, to } => {
                CheckoutError::InvalidStateTransition { sale_id, from, to }
            }
            other => CheckoutError::InvalidInput(other.to_string()),
        }
    }
}

impl From<ValidationError> for CheckoutError {
    fn from(err: ValidationError) -> Self {
        CheckoutError::InvalidInput(err.to_string())
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors loading or validating [`EngineConfig`](crate::config::EngineConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_and_retry() {
        assert_eq!(CheckoutError::EmptyCart.kind(), ErrorKind::Validation);
        assert!(!CheckoutError::EmptyCart.is_retryable());

        let conflict = CheckoutError::StockConflict {
            product_id: "p-1".into(),
            requested: 2,
            available: 1,
        };
        assert_eq!(conflict.kind(), ErrorKind::Conflict);
        assert!(conflict.is_retryable());

        assert!(CheckoutError::Unavailable("locked".into()).is_retryable());
        assert_eq!(CheckoutError::Invariant("x".into()).kind(), ErrorKind::Invariant);
        assert_eq!(CheckoutError::SaleNotFound("s".into()).kind(), ErrorKind::State);
    }

    #[test]
    fn test_negative_stock_becomes_conflict() {
        let err = CheckoutError::from(DbError::NegativeStockRejected {
            product_id: "p-1".into(),
            delta: -2,
            available: 1,
        });
        assert_eq!(
            err,
            CheckoutError::StockConflict {
                product_id: "p-1".into(),
                requested: 2,
                available: 1,
            }
        );
    }

    #[test]
    fn test_busy_and_pool_are_transient() {
        let busy = CheckoutError::from(DbError::Busy("database is locked".into()));
        assert_eq!(busy.kind(), ErrorKind::Transient);

        let pool = CheckoutError::from(DbError::PoolExhausted);
        assert_eq!(pool.kind(), ErrorKind::Transient);
        assert_eq!(pool.user_message(), "The store database is busy. Please try again.");
    }

    #[test]
    fn test_connectivity_failures_are_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "disk unplugged");
        let err = CheckoutError::from(DbError::from(sqlx::Error::Io(io)));
        assert!(matches!(err, CheckoutError::Unavailable(ref msg) if msg.contains("disk unplugged")));
        assert!(err.is_retryable());

        let err = CheckoutError::from(DbError::from(sqlx::Error::WorkerCrashed));
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[test]
    #[should_panic(expected = "schema constraint rejected a write")]
    #[cfg(debug_assertions)]
    fn test_constraint_violation_is_an_invariant() {
        let _ = CheckoutError::from(DbError::ConstraintViolation(
            "CHECK constraint failed: quantity > 0".into(),
        ));
    }

    #[test]
    fn test_core_errors_keep_their_context() {
        let err = CheckoutError::from(CoreError::InsufficientStock {
            product_id: "p-9".into(),
            requested: 5,
            available: 3,
        });
        assert_eq!(err.user_message(), "Only 3 in stock, 5 requested");

        let err = CheckoutError::from(CoreError::ProductInactive("p-9".into()));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    #[should_panic(expected = "invariant violated")]
    #[cfg(debug_assertions)]
    fn test_invariant_panics_in_debug() {
        let _ = CheckoutError::from(DbError::InvariantViolation("negative stock".into()));
    }
}

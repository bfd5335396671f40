//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← result code / message categorised             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  CheckoutError (tally-engine) ← Validation / Conflict / Transient ...  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  POS screen shows an actionable or "try again" message                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## SQLite Result Codes We Care About
//! ```text
//!   5    SQLITE_BUSY               ┐
//!   261  SQLITE_BUSY_RECOVERY      │ → DbError::Busy (transient)
//!   517  SQLITE_BUSY_SNAPSHOT      │
//!   6    SQLITE_LOCKED             ┘
//!   2067 SQLITE_CONSTRAINT_UNIQUE    → DbError::UniqueViolation
//!   1555 SQLITE_CONSTRAINT_PRIMARYKEY→ DbError::UniqueViolation
//!   787  SQLITE_CONSTRAINT_FOREIGNKEY→ DbError::ForeignKeyViolation
//!   275  SQLITE_CONSTRAINT_CHECK     ┐
//!   1299 SQLITE_CONSTRAINT_NOTNULL   │ → DbError::ConstraintViolation
//!   1811 SQLITE_CONSTRAINT_TRIGGER   │
//!   19   SQLITE_CONSTRAINT           ┘
//! ```

use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Inserting a duplicate SKU
    /// - Invoice number collision (the engine regenerates and retries)
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// A CHECK, NOT NULL or trigger constraint rejected a row.
    ///
    /// The repositories validate before writing, so reaching the schema's
    /// own constraints means a caller bypassed validation.
    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    /// A guarded stock update would have driven quantity below zero.
    ///
    /// `available` is the quantity observed by the failed guard.
    #[error("Stock for product {product_id} cannot change by {delta}: only {available} available")]
    NegativeStockRejected {
        product_id: String,
        delta: i64,
        available: i64,
    },

    /// Persisted state contradicts a ledger invariant.
    ///
    /// ## When This Occurs
    /// Never, unless something wrote to `products.quantity` without a
    /// matching movement.
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    /// The database stayed locked past `busy_timeout`.
    #[error("Database busy: {0}")]
    Busy(String),

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file can't be created
    /// - File permissions issue
    /// - Disk full
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// No pooled connection became free within `acquire_timeout`.
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Input rejected before any SQL ran.
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] tally_core::ValidationError),

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// True for errors where retrying the whole unit of work is safe and
    /// may succeed (lock contention, pool saturation).
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Busy(_) | DbError::PoolExhausted)
    }

    /// True when this is a unique violation on the given column.
    ///
    /// SQLite reports the column as `table.column`.
    pub fn is_unique_violation_on(&self, column: &str) -> bool {
        match self {
            DbError::UniqueViolation { field, .. } => field.ends_with(column),
            _ => false,
        }
    }
}

/// SQLite primary and extended result codes that mean "locked, try later".
fn is_busy_code(code: &str) -> bool {
    matches!(code, "5" | "6" | "261" | "262" | "517")
}

/// SQLite result codes for constraint failures other than unique and FK.
fn is_constraint_code(code: &str) -> bool {
    matches!(code, "19" | "275" | "1299" | "1811")
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → result code, then message, decides
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Io / WorkerCrashed / PoolClosed → DbError::ConnectionFailed
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();

                if is_busy_code(&code) || msg.contains("database is locked") {
                    DbError::Busy(msg.to_string())
                } else if db_err.is_unique_violation() || msg.contains("UNIQUE constraint failed") {
                    // "UNIQUE constraint failed: <table>.<column>"
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if db_err.is_foreign_key_violation()
                    || msg.contains("FOREIGN KEY constraint failed")
                {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if is_constraint_code(&code) || msg.contains("constraint failed") {
                    DbError::ConstraintViolation(msg.to_string())
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed => DbError::ConnectionFailed(err.to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

//! # tally-engine: Sale / Stock Transaction Engine
//!
//! The single entry point POS screens call to sell and to return.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Transaction Engine                                │
//! │                                                                         │
//! │  POS screen (counter, tablet)                                          │
//! │      │  builds a tally_core::Cart                                       │
//! │      ▼                                                                  │
//! │  CheckoutEngine::checkout(&cart, PaymentInfo, cashier, customer?)      │
//! │      │                                                                  │
//! │      ├── Ok(Receipt)          ──► render / print                        │
//! │      └── Err(CheckoutError)   ──► kind(): Validation | Conflict |       │
//! │                                   Transient | Invariant | State         │
//! │                                                                         │
//! │  CheckoutEngine::return_sale(sale_id, actor)                           │
//! │      └── Ok(ReturnOutcome) / Err(SaleNotFound | InvalidStateTransition)│
//! │                                                                         │
//! │  Stock desks (receive, adjust, transfer) go straight to                │
//! │  tally_db::StockLedger::record_movement                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//! ```rust,ignore
//! use tally_engine::{init_tracing, CheckoutEngine, EngineConfig};
//!
//! init_tracing();
//! let engine = CheckoutEngine::connect(EngineConfig::load(None)?).await?;
//! let receipt = engine.checkout(&cart, payment, "cashier-1", None).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod checkout;
pub mod config;
pub mod error;
pub mod receipt;
pub mod returns;
pub mod telemetry;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use checkout::{CheckoutEngine, CheckoutPhase};
pub use config::EngineConfig;
pub use error::{CheckoutError, ConfigError, EngineResult, ErrorKind};
pub use receipt::{Receipt, ReceiptLine};
pub use returns::ReturnOutcome;
pub use telemetry::init_tracing;

//! # Repository Module
//!
//! Database repositories for the Tally engine.
//!
//! ## Two Calling Styles
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Standalone (owns its unit of work)                                     │
//! │                                                                         │
//! │     db.products().insert(&new, actor)                                  │
//! │     db.stock().record_movement(id, Δ, cause, actor, note)              │
//! │     db.sales().get_by_id(id)                                           │
//! │                                                                         │
//! │  Composed (runs inside the caller's transaction)                       │
//! │                                                                         │
//! │     let mut tx = db.begin().await?;                                    │
//! │     StockLedger::record_movement_in(&mut tx, movement)                 │
//! │     SaleRepository::insert_in(&mut tx, &sale)                          │
//! │     AuditRepository::append_in(&mut tx, event)                         │
//! │     tx.commit().await?;                                                │
//! │                                                                         │
//! │  `*_in` functions take `&mut SqliteConnection` and never commit.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Catalog CRUD
//! - [`SaleRepository`](sale::SaleRepository) - Sales and sale items
//! - [`StockLedger`](stock::StockLedger) - Quantities and movements
//! - [`AuditRepository`](audit::AuditRepository) - Append-only audit log

pub mod audit;
pub mod product;
pub mod sale;
pub mod stock;

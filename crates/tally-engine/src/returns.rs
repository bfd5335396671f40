//! # Returns
//!
//! Whole-sale returns: `Completed → Returned`, stock credited back.
//!
//! ```text
//!   BEGIN
//!   UPDATE sales SET status='returned' WHERE id=? AND status='completed'
//!     │
//!     ├─ 0 rows ─► read sale ─► SaleNotFound / InvalidStateTransition
//!     │
//!     └─ 1 row  ─► +qty Return movement per line
//!                  audit sale.returned
//!                  COMMIT
//! ```
//!
//! The status update is the first statement, so two concurrent returns of
//! the same sale serialize on the write lock and the second sees 0 rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};
use ts_rs::TS;

use tally_core::validation::{validate_actor_id, validate_uuid};
use tally_core::{Money, PaymentMethod, SaleStatus, StockMovement};
use tally_db::{actions, AuditRepository, DbError, NewAuditEvent, SaleRepository, StockLedger};

use crate::checkout::CheckoutEngine;
use crate::error::{CheckoutError, EngineResult};

/// What a completed return did.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReturnOutcome {
    pub sale_id: String,
    pub invoice_number: String,
    /// Amount to hand back, the full sale total.
    pub refund: Money,
    /// How the sale was originally paid.
    pub payment_method: PaymentMethod,
    /// The `Return` credits, one per sale line.
    pub movements: Vec<StockMovement>,
    pub actor_id: String,
    #[ts(as = "String")]
    pub returned_at: DateTime<Utc>,
}

impl CheckoutEngine {
    /// Returns a completed sale in full.
    ///
    /// ## Returns
    /// * `Err(InvalidInput)` when `sale_id` is not a UUID
    /// * `Err(SaleNotFound)` for an unknown id
    /// * `Err(InvalidStateTransition)` if the sale is not `Completed`
    ///   (including a second return of the same sale)
    #[instrument(skip(self))]
    pub async fn return_sale(&self, sale_id: &str, actor_id: &str) -> EngineResult<ReturnOutcome> {
        validate_uuid(sale_id)?;
        validate_actor_id("actor_id", actor_id)?;

        let returned_at = Utc::now();
        let mut tx = self.db.begin().await?;

        if !SaleRepository::mark_returned_in(&mut tx, sale_id, returned_at).await? {
            let current = SaleRepository::get_by_id_in(&mut tx, sale_id).await?;
            return Err(match current {
                None => CheckoutError::SaleNotFound(sale_id.to_string()),
                Some(sale) if sale.status.can_transition_to(SaleStatus::Returned) => {
                    CheckoutError::invariant(format!(
                        "sale {} is {} but its return did not apply",
                        sale_id, sale.status
                    ))
                }
                Some(sale) => CheckoutError::InvalidStateTransition {
                    sale_id: sale_id.to_string(),
                    from: sale.status,
                    to: SaleStatus::Returned,
                },
            });
        }

        let sale = SaleRepository::get_by_id_in(&mut tx, sale_id)
            .await?
            .ok_or_else(|| CheckoutError::invariant(format!("sale {} vanished mid-return", sale_id)))?;

        let movements = StockLedger::reverse_sale_in(&mut tx, sale_id, actor_id).await?;

        let event = AuditRepository::append_in(
            &mut tx,
            NewAuditEvent::new(actor_id, actions::SALE_RETURNED, "sale", sale_id).details(json!({
                "invoice_number": sale.invoice_number,
                "refund_cents": sale.total_cents,
                "payment_method": sale.payment_method,
                "lines": movements.len(),
            })),
        )
        .await?;

        tx.commit().await.map_err(DbError::from)?;
        AuditRepository::publish(&event);

        info!(
            sale_id = %sale_id,
            invoice_number = %sale.invoice_number,
            refund = %sale.total(),
            actor_id = %actor_id,
            "Sale returned"
        );

        Ok(ReturnOutcome {
            sale_id: sale.id.clone(),
            refund: sale.total(),
            invoice_number: sale.invoice_number,
            payment_method: sale.payment_method,
            movements,
            actor_id: actor_id.to_string(),
            returned_at,
        })
    }
}

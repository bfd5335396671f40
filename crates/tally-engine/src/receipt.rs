//! # Receipt
//!
//! The value a successful checkout returns. Screens render it and printers
//! print it. The engine never formats it for display.
//!
//! ```text
//!   Corner Shop
//!   INV-20261018-143205117-0042-9f3a        2026-10-18 14:32
//!   ─────────────────────────────────────────────────────────
//!   Widget            2 × $10.00                      $20.00
//!   ─────────────────────────────────────────────────────────
//!   Subtotal                                          $20.00
//!   Tax (10.00%)                                       $2.00
//!   Total                                             $22.00
//!   Cash                                              $25.00
//!   Change                                             $3.00
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use tally_core::{Money, PaymentMethod, Sale, SaleItem, TaxRate};

use crate::error::{CheckoutError, EngineResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReceiptLine {
    pub sku: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub line_total: Money,
}

impl From<&SaleItem> for ReceiptLine {
    fn from(item: &SaleItem) -> Self {
        ReceiptLine {
            sku: item.sku_snapshot.clone(),
            name: item.name_snapshot.clone(),
            quantity: item.quantity,
            unit_price: Money::from_cents(item.unit_price_cents),
            line_total: item.line_total(),
        }
    }
}

/// Immutable summary of a committed sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Receipt {
    pub sale_id: String,
    pub invoice_number: String,
    pub store_name: String,
    pub lines: Vec<ReceiptLine>,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    pub tax_rate: TaxRate,
    pub payment_method: PaymentMethod,
    pub tendered: Money,
    /// Always zero for card and mobile payments.
    pub change: Money,
    pub cashier_id: String,
    pub customer_id: Option<String>,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
}

impl Receipt {
    /// Rebuilds a receipt from stored rows (reprints).
    pub fn from_sale(sale: &Sale, items: &[SaleItem], store_name: &str) -> EngineResult<Self> {
        let tax_rate: TaxRate = sale.tax_rate.parse().map_err(|_| {
            CheckoutError::invariant(format!(
                "sale {} has unreadable tax rate '{}'",
                sale.id, sale.tax_rate
            ))
        })?;

        Ok(Receipt {
            sale_id: sale.id.clone(),
            invoice_number: sale.invoice_number.clone(),
            store_name: store_name.to_string(),
            lines: items.iter().map(ReceiptLine::from).collect(),
            subtotal: Money::from_cents(sale.subtotal_cents),
            tax: Money::from_cents(sale.tax_cents),
            total: sale.total(),
            tax_rate,
            payment_method: sale.payment_method,
            tendered: Money::from_cents(sale.tendered_cents),
            change: Money::from_cents(sale.change_cents),
            cashier_id: sale.cashier_id.clone(),
            customer_id: sale.customer_id.clone(),
            timestamp: sale.created_at,
        })
    }

    pub fn item_count(&self) -> usize {
        self.lines.len()
    }

    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}

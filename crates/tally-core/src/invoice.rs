//! Invoice number generation.
//!
//! ```text
//!   INV-20261018-143205117-0042-9f3a
//!       ──────── ───────── ──── ────
//!       date     time+ms   seq  random
//! ```
//!
//! Numbers sort by creation time at millisecond granularity. Uniqueness is
//! likely from the per-process sequence plus random suffix, and guaranteed
//! by the `UNIQUE` index on `sales.invoice_number`.

use std::sync::atomic::{AtomicU16, Ordering};

use chrono::{DateTime, Utc};

const PREFIX: &str = "INV";

static SEQUENCE: AtomicU16 = AtomicU16::new(0);

/// Generates an invoice number for the current instant.
pub fn next_invoice_number() -> String {
    invoice_number_at(Utc::now())
}

/// Generates an invoice number stamped with `at`.
pub fn invoice_number_at(at: DateTime<Utc>) -> String {
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed) % 10_000;
    let random = uuid::Uuid::new_v4();
    let bytes = random.as_bytes();

    format!(
        "{}-{}-{:04}-{:02x}{:02x}",
        PREFIX,
        at.format("%Y%m%d-%H%M%S%3f"),
        seq,
        bytes[0],
        bytes[1]
    )
}

/// Checks the `INV-YYYYMMDD-HHMMSSmmm-SSSS-RRRR` shape.
pub fn is_well_formed(invoice: &str) -> bool {
    let parts: Vec<&str> = invoice.split('-').collect();
    let digits = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_digit());

    parts.len() == 5
        && parts[0] == PREFIX
        && digits(parts[1], 8)
        && digits(parts[2], 9)
        && digits(parts[3], 4)
        && parts[4].len() == 4
        && parts[4].bytes().all(|b| b.is_ascii_hexdigit())
}

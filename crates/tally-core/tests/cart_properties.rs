//! Property tests for cart arithmetic.
//!
//! Random carts of up to 20 lines with random cent prices must always
//! satisfy the totals identities exactly.

use chrono::Utc;
use proptest::prelude::*;
use tally_core::{Cart, Money, Product, TaxRate};

fn product(index: usize, price_cents: i64) -> Product {
    Product {
        id: format!("p-{}", index),
        sku: format!("SKU-{}", index),
        name: format!("Product {}", index),
        cost_cents: 0,
        price_cents,
        quantity: 10_000,
        min_quantity: 0,
        is_active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// (price in cents, quantity) per line.
fn lines_strategy() -> impl Strategy<Value = Vec<(i64, i64)>> {
    prop::collection::vec((0i64..=1_000_000, 1i64..=999), 1..=20)
}

fn build_cart(lines: &[(i64, i64)]) -> Cart {
    let mut cart = Cart::new();
    for (i, (price, qty)) in lines.iter().enumerate() {
        cart.add_item(&product(i, *price), *qty).unwrap();
    }
    cart
}

/// Round-half-up in integer arithmetic, independent of `Decimal`.
fn expected_tax(subtotal: i64, bps: u32) -> i64 {
    (subtotal * i64::from(bps) + 5_000) / 10_000
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn totals_are_exact(lines in lines_strategy(), bps in 0u32..=10_000) {
        let cart = build_cart(&lines);
        let rate = TaxRate::from_bps(bps);
        let totals = cart.totals(rate);

        let line_sum: Money = cart.lines().iter().map(|l| l.line_total()).sum();
        prop_assert_eq!(totals.subtotal, line_sum);
        prop_assert_eq!(totals.subtotal + totals.tax, totals.total);
        prop_assert_eq!(totals.tax.cents(), expected_tax(totals.subtotal.cents(), bps));
        prop_assert_eq!(cart.total(rate), totals.total);
    }

    #[test]
    fn line_totals_are_price_times_quantity(lines in lines_strategy()) {
        let cart = build_cart(&lines);

        for (line, (price, qty)) in cart.lines().iter().zip(lines.iter()) {
            prop_assert_eq!(line.line_total().cents(), price * qty);
        }
        prop_assert_eq!(cart.total_quantity(), lines.iter().map(|(_, q)| q).sum::<i64>());
    }

    #[test]
    fn tax_never_exceeds_subtotal(lines in lines_strategy(), bps in 0u32..=10_000) {
        let cart = build_cart(&lines);
        let totals = cart.totals(TaxRate::from_bps(bps));

        prop_assert!(totals.tax >= Money::zero());
        prop_assert!(totals.tax <= totals.subtotal);
    }
}

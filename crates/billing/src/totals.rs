use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::line_item::InvoiceLineItem;
use crate::words::amount_in_words;

/// Process-wide tax rate (8.25%) used when a company configures none.
pub const DEFAULT_TAX_RATE_PERCENT: Decimal = Decimal::from_parts(825, 0, 0, false, 2);

/// How the retained amount was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RetainageMode {
    /// `subtotal × package percent`.
    Package,
    /// Sum of `line amount × line percent`, lines without their own percent
    /// falling back to the package percent.
    PerLine,
}

/// Totals snapshot of an invoice.
///
/// Only ever produced by [`compute_totals`]. Values are exact; rounding is a
/// display concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub subtotal: Decimal,
    pub retainage_amount: Decimal,
    pub taxable_base: Decimal,
    pub tax_amount: Decimal,
    pub grand_total: Decimal,
    pub amount_in_words: String,
    pub retainage_mode: RetainageMode,
}

impl Totals {
    pub fn empty() -> Self {
        compute_totals(&[], Decimal::ZERO, Decimal::ZERO)
    }
}

/// Fold line items into invoice totals.
///
/// Pure and total: the same inputs always give the same snapshot, and
/// percentages are only ever divided by a literal hundred. A negative grand
/// total is returned as-is.
pub fn compute_totals(
    items: &[InvoiceLineItem],
    retainage_percent: Decimal,
    tax_rate_percent: Decimal,
) -> Totals {
    let subtotal: Decimal = items.iter().map(InvoiceLineItem::amount).sum();

    let per_line = items
        .iter()
        .any(|item| item.detail().own_retainage_percent().is_some());

    let (retainage_amount, retainage_mode) = if per_line {
        let retained: Decimal = items
            .iter()
            .map(|item| {
                let percent = item
                    .detail()
                    .own_retainage_percent()
                    .unwrap_or(retainage_percent);
                item.amount() * percent / Decimal::ONE_HUNDRED
            })
            .sum();
        (retained, RetainageMode::PerLine)
    } else {
        (
            subtotal * retainage_percent / Decimal::ONE_HUNDRED,
            RetainageMode::Package,
        )
    };

    let taxable_base = subtotal - retainage_amount;
    let tax_amount = taxable_base * tax_rate_percent / Decimal::ONE_HUNDRED;
    let grand_total = taxable_base + tax_amount;

    Totals {
        subtotal,
        retainage_amount,
        taxable_base,
        tax_amount,
        grand_total,
        amount_in_words: amount_in_words(grand_total),
        retainage_mode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_item::{ProgressLine, SimpleLine};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn flat(amount: Decimal) -> InvoiceLineItem {
        InvoiceLineItem::simple(SimpleLine {
            particulars: "Lump sum".to_string(),
            hsn_code: None,
            unit: "LS".to_string(),
            quantity: Decimal::ONE,
            rate: amount,
        })
    }

    fn progress(original: Decimal, percent: Decimal, retainage: Option<Decimal>) -> InvoiceLineItem {
        InvoiceLineItem::progress(ProgressLine {
            description: "Concrete".to_string(),
            original_value: original,
            work_completed_prev_percent: Decimal::ZERO,
            this_period_percent: percent,
            stored_materials_amount: Decimal::ZERO,
            retainage_percent: retainage,
            is_change_order: false,
        })
    }

    #[test]
    fn package_retainage_then_tax() {
        let items = vec![flat(dec!(1000)), flat(dec!(2000))];
        let totals = compute_totals(&items, dec!(10), DEFAULT_TAX_RATE_PERCENT);

        assert_eq!(totals.subtotal, dec!(3000));
        assert_eq!(totals.retainage_amount, dec!(300));
        assert_eq!(totals.taxable_base, dec!(2700));
        assert_eq!(totals.tax_amount, dec!(222.75));
        assert_eq!(totals.grand_total, dec!(2922.75));
        assert_eq!(totals.retainage_mode, RetainageMode::Package);
        assert_eq!(
            totals.amount_in_words,
            "Two Thousand Nine Hundred Twenty Two Rupees Only"
        );
    }

    #[test]
    fn empty_invoice_is_all_zero() {
        let totals = compute_totals(&[], dec!(10), DEFAULT_TAX_RATE_PERCENT);
        assert_eq!(totals.grand_total, Decimal::ZERO);
        assert_eq!(totals.amount_in_words, "Zero Rupees Only");
    }

    #[test]
    fn any_own_percent_switches_to_per_line() {
        // 10000 at its own 5%, 2000 at the package 10%.
        let items = vec![
            progress(dec!(40000), dec!(25), Some(dec!(5))),
            flat(dec!(2000)),
        ];
        let totals = compute_totals(&items, dec!(10), Decimal::ZERO);

        assert_eq!(totals.retainage_mode, RetainageMode::PerLine);
        assert_eq!(totals.subtotal, dec!(12000));
        assert_eq!(totals.retainage_amount, dec!(700));
        assert_eq!(totals.grand_total, dec!(11300));
    }

    #[test]
    fn negative_grand_total_is_not_clamped() {
        let items = vec![flat(dec!(100))];
        let totals = compute_totals(&items, dec!(150), Decimal::ZERO);
        assert_eq!(totals.grand_total, dec!(-50));
        assert_eq!(totals.amount_in_words, "Minus Fifty Rupees Only");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            .. ProptestConfig::default()
        })]

        #[test]
        fn recomputation_is_idempotent(
            amounts in proptest::collection::vec(0i64..10_000_000, 0..12),
            retainage in 0u32..=20,
            tax_bp in 0u32..=3000,
        ) {
            let items: Vec<_> = amounts.iter().map(|a| flat(Decimal::new(*a, 2))).collect();
            let retainage = Decimal::from(retainage);
            let tax = Decimal::new(tax_bp as i64, 2);

            let first = compute_totals(&items, retainage, tax);
            let second = compute_totals(&items, retainage, tax);
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.taxable_base + first.tax_amount, first.grand_total);
            prop_assert_eq!(first.subtotal - first.retainage_amount, first.taxable_base);
        }
    }
}

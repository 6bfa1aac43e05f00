//! Amount-in-words rendering using the Indian grouping convention
//! (crore, lakh, thousand, then hundreds).

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

const ONES: [&str; 10] = [
    "", "One", "Two", "Three", "Four", "Five", "Six", "Seven", "Eight", "Nine",
];

const TEENS: [&str; 10] = [
    "Ten",
    "Eleven",
    "Twelve",
    "Thirteen",
    "Fourteen",
    "Fifteen",
    "Sixteen",
    "Seventeen",
    "Eighteen",
    "Nineteen",
];

const TENS: [&str; 10] = [
    "", "", "Twenty", "Thirty", "Forty", "Fifty", "Sixty", "Seventy", "Eighty", "Ninety",
];

const CRORE: u128 = 10_000_000;
const LAKH: u128 = 100_000;
const THOUSAND: u128 = 1_000;

/// Major currency unit used by [`amount_in_words`].
pub const DEFAULT_UNIT: &str = "Rupees";

/// `"<words> Rupees Only"` for the integer part of `amount`.
///
/// Fractional subunits are dropped, so `0.75` renders as `"Zero Rupees Only"`.
/// Negative amounts render their magnitude prefixed with `Minus`.
pub fn amount_in_words(amount: Decimal) -> String {
    amount_in_words_with(amount, DEFAULT_UNIT)
}

/// Same as [`amount_in_words`] with a caller-chosen unit name.
pub fn amount_in_words_with(amount: Decimal, unit: &str) -> String {
    let whole = amount.trunc();
    let magnitude = whole.abs().to_u128().unwrap_or_default();

    if magnitude == 0 {
        return format!("Zero {unit} Only");
    }

    let mut words: Vec<&'static str> = Vec::new();
    if whole.is_sign_negative() {
        words.push("Minus");
    }
    push_indian(magnitude, &mut words);

    format!("{} {unit} Only", words.join(" "))
}

fn push_indian(n: u128, out: &mut Vec<&'static str>) {
    let crore = n / CRORE;
    let rest = n % CRORE;

    if crore > 0 {
        // Anything above 99 crore is itself written in crore/lakh/thousand groups.
        push_indian(crore, out);
        out.push("Crore");
    }

    let lakh = rest / LAKH;
    let thousand = (rest % LAKH) / THOUSAND;
    let hundreds = rest % THOUSAND;

    if lakh > 0 {
        push_below_thousand(lakh, out);
        out.push("Lakh");
    }
    if thousand > 0 {
        push_below_thousand(thousand, out);
        out.push("Thousand");
    }
    push_below_thousand(hundreds, out);
}

fn push_below_thousand(n: u128, out: &mut Vec<&'static str>) {
    let n = n as usize;
    if n >= 100 {
        out.push(ONES[n / 100]);
        out.push("Hundred");
    }
    push_below_hundred(n % 100, out);
}

fn push_below_hundred(n: usize, out: &mut Vec<&'static str>) {
    match n {
        0 => {}
        1..=9 => out.push(ONES[n]),
        10..=19 => out.push(TEENS[n - 10]),
        _ => {
            out.push(TENS[n / 10]);
            if n % 10 != 0 {
                out.push(ONES[n % 10]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn zero_is_special_cased() {
        assert_eq!(amount_in_words(Decimal::ZERO), "Zero Rupees Only");
        assert_eq!(amount_in_words(dec!(0.99)), "Zero Rupees Only");
    }

    #[test]
    fn lakh_grouping() {
        assert_eq!(
            amount_in_words(dec!(123456)),
            "One Lakh Twenty Three Thousand Four Hundred Fifty Six Rupees Only"
        );
    }

    #[test]
    fn fraction_is_dropped() {
        assert_eq!(
            amount_in_words(dec!(2922.75)),
            "Two Thousand Nine Hundred Twenty Two Rupees Only"
        );
    }

    #[test]
    fn teens_and_round_tens() {
        assert_eq!(amount_in_words(dec!(13)), "Thirteen Rupees Only");
        assert_eq!(amount_in_words(dec!(40)), "Forty Rupees Only");
        assert_eq!(amount_in_words(dec!(1010)), "One Thousand Ten Rupees Only");
    }

    #[test]
    fn crore_and_beyond() {
        assert_eq!(
            amount_in_words(dec!(12500000)),
            "One Crore Twenty Five Lakh Rupees Only"
        );
        assert_eq!(
            amount_in_words(dec!(999999999)),
            "Ninety Nine Crore Ninety Nine Lakh Ninety Nine Thousand Nine Hundred Ninety Nine Rupees Only"
        );
        assert_eq!(
            amount_in_words(dec!(1500000000)),
            "One Hundred Fifty Crore Rupees Only"
        );
    }

    #[test]
    fn negative_amounts_are_prefixed() {
        assert_eq!(amount_in_words(dec!(-250)), "Minus Two Hundred Fifty Rupees Only");
        assert_eq!(amount_in_words(dec!(-0.4)), "Zero Rupees Only");
    }

    #[test]
    fn unit_name_is_configurable() {
        assert_eq!(amount_in_words_with(dec!(21), "Dollars"), "Twenty One Dollars Only");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 512,
            .. ProptestConfig::default()
        })]

        #[test]
        fn well_formed_for_every_positive_amount(n in 1u64..1_000_000_000u64) {
            let words = amount_in_words(Decimal::from(n));

            prop_assert!(words.ends_with(" Rupees Only"));
            prop_assert!(!words.starts_with(' '));
            prop_assert!(!words.contains("  "));
            prop_assert!(!words.contains("Zero"));
            prop_assert_eq!(words.contains("Crore"), n >= 10_000_000);
        }
    }
}

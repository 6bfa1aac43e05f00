//! Monetary display strings. Display only; totals are never rounded for storage.

use rust_decimal::{Decimal, RoundingStrategy};

/// `₹1,23,456.00`: last three digits, then groups of two.
pub fn format_inr(amount: Decimal) -> String {
    format_grouped(amount, "₹", indian_groups)
}

/// `<symbol>123,456.00`: groups of three.
pub fn format_international(amount: Decimal, symbol: &str) -> String {
    format_grouped(amount, symbol, thousands_groups)
}

fn format_grouped(amount: Decimal, symbol: &str, group: fn(&str) -> String) -> String {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);

    let text = rounded.abs().to_string();
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };

    format!("{sign}{symbol}{}.{fraction}", group(whole))
}

fn indian_groups(digits: &str) -> String {
    if digits.len() <= 3 {
        return digits.to_string();
    }
    let (head, last_three) = digits.split_at(digits.len() - 3);

    let mut groups: Vec<&str> = Vec::new();
    let mut end = head.len();
    while end > 0 {
        let start = end.saturating_sub(2);
        groups.push(&head[start..end]);
        end = start;
    }
    groups.reverse();
    groups.push(last_three);
    groups.join(",")
}

fn thousands_groups(digits: &str) -> String {
    let mut groups: Vec<&str> = Vec::new();
    let mut end = digits.len();
    while end > 0 {
        let start = end.saturating_sub(3);
        groups.push(&digits[start..end]);
        end = start;
    }
    groups.reverse();
    groups.join(",")
}

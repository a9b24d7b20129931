mod expense;
mod procurement;

pub use expense::{ExpenseFields, extract_expense_fields, validate_amount};
pub use procurement::{ProcurementItem, extract_procurement_item};

use regex::Regex;

/// Ordered invoice-number patterns, most specific first. The first pattern
/// that matches wins; ordering is load-bearing because later patterns can
/// capture different substrings of the same text.
const INVOICE_NUMBER_PATTERNS: &[&str] = &[
    r"发票号码[：:](\d{8,})",
    r"发票代码[：:]?(\d{10,12})",
    r"No[.:]?\s*(\d{8,})",
    r"(\d{20,})",
];

/// First invoice number found in `text`, per the ordered pattern list.
pub fn extract_invoice_number(text: &str) -> Option<String> {
    for pattern in INVOICE_NUMBER_PATTERNS {
        let re = Regex::new(pattern).ok()?;
        if let Some(cap) = re.captures(text) {
            return Some(cap[1].to_string());
        }
    }
    None
}

/// Every candidate invoice number in `text`: all patterns are run, digit
/// runs shorter than 8 are dropped, and first-seen order is kept with
/// duplicates removed. Used by the dedup tools, where any one hit against
/// the cache is enough to flag a document.
pub fn extract_all_invoice_numbers(text: &str) -> Vec<String> {
    let mut numbers = Vec::new();
    for pattern in INVOICE_NUMBER_PATTERNS {
        let Ok(re) = Regex::new(pattern) else {
            continue;
        };
        for cap in re.captures_iter(text) {
            let num = cap[1].to_string();
            if num.len() >= 8 && !numbers.contains(&num) {
                numbers.push(num);
            }
        }
    }
    numbers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labeled_number_beats_long_digit_run() {
        let text = "发票号码：12345678901234567890\n￥1234.56";
        assert_eq!(
            extract_invoice_number(text).as_deref(),
            Some("12345678901234567890")
        );
    }

    #[test]
    fn pattern_order_decides_between_competing_matches() {
        // The labeled 8-digit number wins even though a 20-digit run exists.
        let text = "99999999999999999999\n发票号码：87654321";
        assert_eq!(extract_invoice_number(text).as_deref(), Some("87654321"));
    }

    #[test]
    fn falls_through_to_bare_long_run() {
        let text = "some noise 12345678901234567890 more noise";
        assert_eq!(
            extract_invoice_number(text).as_deref(),
            Some("12345678901234567890")
        );
    }

    #[test]
    fn no_digits_yields_none() {
        assert_eq!(extract_invoice_number("电子发票"), None);
        assert!(extract_all_invoice_numbers("电子发票").is_empty());
    }

    #[test]
    fn all_numbers_dedupes_and_keeps_order() {
        let text = "发票号码:11112222 No. 33334444 发票号码:11112222";
        assert_eq!(
            extract_all_invoice_numbers(text),
            vec!["11112222".to_string(), "33334444".to_string()]
        );
    }
}

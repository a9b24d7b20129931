use super::extract_invoice_number;
use regex::Regex;

/// Fields pulled out of one invoice for the expense sheet. Both stay empty
/// strings when nothing matched; the caller records that in the remarks
/// column instead of failing.
#[derive(Debug, Clone, Default)]
pub struct ExpenseFields {
    pub invoice_number: String,
    pub amount: String,
}

/// Amount patterns in priority order: the explicit 小写 (numeral) figure is
/// most trustworthy, bare ￥ figures least.
const AMOUNT_PATTERNS: &[&str] = &[
    r"(?im)小写[）)]?[：:：\s]*[￥¥]?([\d,]+\.\d{2})",
    r"(?im)\(小写\)[：:：\s]*[￥¥]?([\d,]+\.\d{2})",
    r"(?im)价税合计[（(]大写[）)]?[：:：\s]*[^\d]*?[￥¥]?([\d,]+\.\d{2})",
    r"(?im)[￥¥]([\d,]+\.\d{2})\s*(?:元|$)",
    r"(?im)合计[：:：\s]*[￥¥]?([\d,]+\.\d{2})",
    r"(?im)应付[：:：\s]*[￥¥]?([\d,]+\.\d{2})",
];

pub fn extract_expense_fields(text: &str) -> ExpenseFields {
    ExpenseFields {
        invoice_number: extract_invoice_number(text).unwrap_or_default(),
        amount: extract_amount(text).unwrap_or_default(),
    }
}

fn extract_amount(text: &str) -> Option<String> {
    for pattern in AMOUNT_PATTERNS {
        let Ok(re) = Regex::new(pattern) else {
            continue;
        };
        if let Some(cap) = re.captures(text) {
            let raw = cap[1].replace(',', "");
            // A figure that does not parse or falls outside the sane range
            // is noise from this pattern; the next pattern still gets a go.
            if let Ok(amount) = raw.parse::<f64>() {
                if amount > 0.0 && amount < 1_000_000.0 {
                    return Some(format!("{amount:.2}"));
                }
            }
        }
    }
    None
}

/// Sanity-check an extracted amount. Returns `(ok, message)`; the message
/// lands in the remarks column either way.
pub fn validate_amount(amount: &str) -> (bool, String) {
    if amount.is_empty() {
        return (false, "未识别到金额".to_string());
    }
    match amount.parse::<f64>() {
        Ok(v) if v <= 0.0 => (false, "金额不能为零或负数".to_string()),
        Ok(v) if v > 100_000.0 => (false, format!("金额过大({v:.2}元)，请确认")),
        Ok(_) => (true, "金额正常".to_string()),
        Err(_) => (false, "金额格式错误".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_number_and_currency_amount() {
        let fields = extract_expense_fields("发票号码：12345678901234567890\n￥1234.56");
        assert_eq!(fields.invoice_number, "12345678901234567890");
        assert_eq!(fields.amount, "1234.56");
    }

    #[test]
    fn numeral_figure_beats_bare_currency_sign() {
        let text = "￥999.99\n价税合计（大写）壹仟元整 （小写）：¥1,000.00";
        let fields = extract_expense_fields(text);
        assert_eq!(fields.amount, "1000.00");
    }

    #[test]
    fn implausible_amount_falls_through_to_next_pattern() {
        let text = "小写：9999999.00\n合计：88.50";
        let fields = extract_expense_fields(text);
        assert_eq!(fields.amount, "88.50");
    }

    #[test]
    fn comma_separators_are_stripped() {
        let fields = extract_expense_fields("合计：￥12,345.67");
        assert_eq!(fields.amount, "12345.67");
    }

    #[test]
    fn nothing_matched_leaves_fields_empty() {
        let fields = extract_expense_fields("收据 无金额信息");
        assert_eq!(fields.invoice_number, "");
        assert_eq!(fields.amount, "");
    }

    #[test]
    fn validation_messages() {
        assert_eq!(validate_amount("").1, "未识别到金额");
        assert!(!validate_amount("0.00").0);
        assert!(!validate_amount("150000.00").0);
        assert!(validate_amount("88.50").0);
        assert!(!validate_amount("abc").0);
    }
}

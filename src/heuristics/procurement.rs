use regex::Regex;

/// One line of the procurement request sheet, parsed from OCR text of a
/// product screenshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcurementItem {
    pub name: String,
    pub specification: String,
    pub unit_price: f64,
    pub quantity: u32,
    pub unit: String,
    pub total_amount: f64,
}

impl Default for ProcurementItem {
    fn default() -> Self {
        Self {
            name: String::new(),
            specification: String::new(),
            unit_price: 0.0,
            quantity: 1,
            unit: "个".to_string(),
            total_amount: 0.0,
        }
    }
}

/// Parse a product listing out of OCR text. Each field has its own ordered
/// pattern list with first-match-wins; unmatched fields keep their defaults
/// so a ruined screenshot still yields a row the user can hand-edit.
pub fn extract_procurement_item(text: &str) -> ProcurementItem {
    let mut item = ProcurementItem {
        name: extract_name(text).unwrap_or_default(),
        specification: String::new(),
        unit_price: extract_price(text).unwrap_or(0.0),
        quantity: extract_quantity(text).unwrap_or(1),
        ..ProcurementItem::default()
    };
    item.specification = extract_specification(text).unwrap_or_else(|| item.name.clone());
    item.total_amount = (item.unit_price * item.quantity as f64 * 100.0).round() / 100.0;
    item
}

fn extract_name(text: &str) -> Option<String> {
    // Bracketed brand then product name, cut before any price.
    let bracketed = [
        r"\[([^\]]+)\]\s*([^¥\n]+?)(?:\s*¥|\n|$)",
        r"【([^】]+)】\s*([^¥\n]+?)(?:\s*¥|\n|$)",
    ];
    for pattern in bracketed {
        let re = Regex::new(pattern).ok()?;
        if let Some(cap) = re.captures(text) {
            let name = strip_trailing_price(cap[2].trim());
            return Some(format!("[{}] {}", &cap[1], name).trim().to_string());
        }
    }
    let keyword = Regex::new(r"(\w+)\s*([^¥\n]*按键[^¥\n]*?)(?:\s*¥|\n|$)").ok()?;
    keyword.captures(text).map(|cap| {
        let name = strip_trailing_price(cap[2].trim());
        format!("[{}] {}", &cap[1], name).trim().to_string()
    })
}

fn strip_trailing_price(name: &str) -> String {
    match Regex::new(r"\s*¥.*$") {
        Ok(re) => re.replace(name, "").to_string(),
        Err(_) => name.to_string(),
    }
}

fn extract_specification(text: &str) -> Option<String> {
    // Colour words match literally; 型号/规格 capture the value after them.
    let literals = ["红色", "蓝色", "绿色", "黄色", "黑色", "白色"];
    for color in literals {
        if text.contains(color) {
            return Some(color.to_string());
        }
    }
    for pattern in [r"型号[：:](\S+)", r"规格[：:](\S+)"] {
        let re = Regex::new(pattern).ok()?;
        if let Some(cap) = re.captures(text) {
            return Some(cap[1].to_string());
        }
    }
    None
}

fn extract_price(text: &str) -> Option<f64> {
    for pattern in [
        r"¥(\d+\.?\d*)",
        r"(\d+\.?\d*)元",
        r"价格[：:]?\s*(\d+\.?\d*)",
    ] {
        let re = Regex::new(pattern).ok()?;
        if let Some(cap) = re.captures(text) {
            if let Ok(price) = cap[1].parse::<f64>() {
                return Some(price);
            }
        }
    }
    None
}

fn extract_quantity(text: &str) -> Option<u32> {
    for pattern in [
        r"x(\d+)",
        r"×(\d+)",
        r"数量[：:]?\s*(\d+)",
        r"(\d+)个",
    ] {
        let re = Regex::new(pattern).ok()?;
        if let Some(cap) = re.captures(text) {
            if let Ok(qty) = cap[1].parse::<u32>() {
                return Some(qty);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_product_screenshot_text() {
        let item = extract_procurement_item("[Qhebot] 数字大按键模块按键 ¥3.8 红色 x6");
        assert_eq!(item.name, "[Qhebot] 数字大按键模块按键");
        assert_eq!(item.specification, "红色");
        assert_eq!(item.unit_price, 3.8);
        assert_eq!(item.quantity, 6);
        assert_eq!(item.total_amount, 22.8);
    }

    #[test]
    fn cjk_brackets_also_match() {
        let item = extract_procurement_item("【树莓派】开发板 4B ¥299 x2 型号:RPi4");
        assert_eq!(item.name, "[树莓派] 开发板 4B");
        assert_eq!(item.specification, "RPi4");
        assert_eq!(item.unit_price, 299.0);
        assert_eq!(item.quantity, 2);
        assert_eq!(item.total_amount, 598.0);
    }

    #[test]
    fn specification_falls_back_to_name() {
        let item = extract_procurement_item("[ACME] 杜邦线 ¥5.5 x10");
        assert_eq!(item.specification, item.name);
    }

    #[test]
    fn empty_text_keeps_defaults() {
        let item = extract_procurement_item("");
        assert_eq!(item.name, "");
        assert_eq!(item.unit_price, 0.0);
        assert_eq!(item.quantity, 1);
        assert_eq!(item.total_amount, 0.0);
        assert_eq!(item.unit, "个");
    }
}

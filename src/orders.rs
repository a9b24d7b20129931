use crate::excel;
use crate::scan;
use anyhow::{Context, Result};
use calamine::{Data, DataType, Reader, open_workbook_auto};
use chrono::Local;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

const SUCCESS_STATUS: &str = "交易成功";

// Shop exports disagree on header names; each field is resolved against a
// candidate list, first hit wins.
const SHOP_COLUMNS: &[&str] = &["店铺名称", "商家", "店铺", "卖家"];
const PRODUCT_COLUMNS: &[&str] = &["商品名称", "商品", "产品名称", "标题"];
const SPEC_COLUMNS: &[&str] = &["型号规格", "规格", "型号", "规格型号", "型号款式"];
const QUANTITY_COLUMNS: &[&str] = &["商品数量", "数量", "购买数量"];
const AMOUNT_COLUMNS: &[&str] = &["金额", "商品金额", "价格", "总价", "实付金额"];

/// One successful order row, with the spreadsheet it came from.
#[derive(Debug, Clone, Default)]
pub struct OrderRecord {
    pub source_file: String,
    pub shop: String,
    pub product: String,
    pub specification: String,
    pub quantity: String,
    pub amount: String,
}

fn cell_text(cell: Option<&Data>) -> String {
    cell.and_then(|c| c.as_string())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn resolve_column(headers: &[String], candidates: &[&str]) -> Option<usize> {
    candidates
        .iter()
        .find_map(|c| headers.iter().position(|h| h == c))
}

fn field(row: &[Data], col: Option<usize>) -> String {
    col.map(|c| cell_text(row.get(c))).unwrap_or_default()
}

/// Amounts arrive as "￥1,234.50" or plain numbers; strip the decoration
/// before parsing.
pub(crate) fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '￥' | '¥' | ',' | ' '))
        .collect();
    cleaned.parse().ok()
}

/// Pull every successful-order row out of one exported spreadsheet. Sheets
/// without a recognizable status column yield nothing.
pub fn extract_orders(path: &Path) -> Result<Vec<OrderRecord>> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let range = workbook
        .worksheet_range_at(0)
        .context("workbook has no sheets")?
        .with_context(|| format!("failed to read first sheet of {}", path.display()))?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(row) => row.iter().map(|c| cell_text(Some(c))).collect(),
        None => return Ok(Vec::new()),
    };
    let Some(status_col) = headers
        .iter()
        .position(|h| h.contains("状态") || h.to_lowercase().contains("status"))
    else {
        warn!(file = %path.display(), "No order status column, skipping");
        return Ok(Vec::new());
    };

    let shop_col = resolve_column(&headers, SHOP_COLUMNS);
    let product_col = resolve_column(&headers, PRODUCT_COLUMNS);
    let spec_col = resolve_column(&headers, SPEC_COLUMNS);
    let quantity_col = resolve_column(&headers, QUANTITY_COLUMNS);
    let amount_col = resolve_column(&headers, AMOUNT_COLUMNS);

    let source_file = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut records = Vec::new();
    for row in rows {
        if cell_text(row.get(status_col)) != SUCCESS_STATUS {
            continue;
        }
        records.push(OrderRecord {
            source_file: source_file.clone(),
            shop: field(row, shop_col),
            product: field(row, product_col),
            specification: field(row, spec_col),
            quantity: field(row, quantity_col),
            amount: field(row, amount_col),
        });
    }
    Ok(records)
}

fn print_statistics(records: &[OrderRecord]) {
    println!("\n=== 批量处理统计 ===");
    println!("总订单数: {}", records.len());

    let mut per_file: BTreeMap<&str, usize> = BTreeMap::new();
    let mut per_shop: BTreeMap<&str, usize> = BTreeMap::new();
    for record in records {
        *per_file.entry(record.source_file.as_str()).or_default() += 1;
        if !record.shop.is_empty() {
            *per_shop.entry(record.shop.as_str()).or_default() += 1;
        }
    }

    println!("\n按文件统计:");
    for (file, count) in &per_file {
        println!("  {file}: {count} 条");
    }

    if !per_shop.is_empty() {
        let mut shops: Vec<(&str, usize)> = per_shop.into_iter().collect();
        shops.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        println!("\n店铺统计 (前10名):");
        for (shop, count) in shops.iter().take(10) {
            println!("  {shop}: {count} 条");
        }
    }

    let amounts: Vec<f64> = records
        .iter()
        .filter_map(|r| parse_amount(&r.amount))
        .collect();
    if !amounts.is_empty() {
        let total: f64 = amounts.iter().sum();
        let max = amounts.iter().cloned().fold(f64::MIN, f64::max);
        let min = amounts.iter().cloned().fold(f64::MAX, f64::min);
        println!("\n金额统计:");
        println!("  总金额: {total:.2} 元");
        println!("  平均金额: {:.2} 元", total / amounts.len() as f64);
        println!("  最高金额: {max:.2} 元");
        println!("  最低金额: {min:.2} 元");
    }
}

/// Scan `folder` for order spreadsheets, keep the successful rows and write
/// one merged workbook plus one workbook per source file into `output_dir`.
pub fn run(folder: &Path, output_dir: &Path) -> Result<()> {
    let files = scan::find_xlsx(folder);
    if files.is_empty() {
        warn!(path = %folder.display(), "No xlsx files found");
        return Ok(());
    }
    info!(count = files.len(), "Order spreadsheets found");

    let mut all: Vec<OrderRecord> = Vec::new();
    for file in &files {
        match extract_orders(file) {
            Ok(orders) => {
                info!(file = %file.display(), orders = orders.len(), "Extracted successful orders");
                all.extend(orders);
            }
            // One unreadable workbook should not sink the batch.
            Err(e) => error!(file = %file.display(), error = %e, "Failed to read workbook"),
        }
    }
    if all.is_empty() {
        info!("No successful orders found");
        return Ok(());
    }

    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();

    let merged = output_dir.join(format!("批量提取_交易成功订单_{timestamp}.xlsx"));
    excel::write_orders_workbook(&merged, &all)?;

    let mut by_source: BTreeMap<String, Vec<OrderRecord>> = BTreeMap::new();
    for record in &all {
        by_source
            .entry(record.source_file.clone())
            .or_default()
            .push(record.clone());
    }
    for (source, records) in &by_source {
        let stem = Path::new(source)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| source.clone());
        let path = output_dir.join(format!("{stem}_交易成功_{timestamp}.xlsx"));
        excel::write_orders_workbook(&path, records)?;
    }

    print_statistics(&all);
    println!("\n汇总文件: {}", merged.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{Xlsx, open_workbook};
    use rust_xlsxwriter::Workbook;
    use std::path::PathBuf;

    fn write_orders_input(path: &Path, headers: &[&str], rows: &[&[&str]]) {
        let mut wb = Workbook::new();
        let ws = wb.add_worksheet();
        for (col, header) in headers.iter().enumerate() {
            ws.write_string(0, col as u16, *header).unwrap();
        }
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                ws.write_string((r + 1) as u32, c as u16, *value).unwrap();
            }
        }
        wb.save(path).unwrap();
    }

    #[test]
    fn successful_rows_are_extracted_with_mapped_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("淘宝订单.xlsx");
        write_orders_input(
            &path,
            &["订单状态", "卖家", "标题", "规格", "数量", "实付金额"],
            &[
                &["交易成功", "旗舰店", "杜邦线 40根", "10cm", "2", "￥12.50"],
                &["交易关闭", "别家", "电阻包", "", "1", "￥3.00"],
            ],
        );

        let records = extract_orders(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source_file, "淘宝订单.xlsx");
        assert_eq!(records[0].shop, "旗舰店");
        assert_eq!(records[0].product, "杜邦线 40根");
        assert_eq!(records[0].specification, "10cm");
        assert_eq!(records[0].quantity, "2");
        assert_eq!(records[0].amount, "￥12.50");
    }

    #[test]
    fn sheet_without_status_column_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("价格表.xlsx");
        write_orders_input(&path, &["商品名称", "金额"], &[&["电机", "35.00"]]);

        assert!(extract_orders(&path).unwrap().is_empty());
    }

    #[test]
    fn amount_parsing_strips_currency_marks() {
        assert_eq!(parse_amount("￥1,234.50"), Some(1234.5));
        assert_eq!(parse_amount("89"), Some(89.0));
        assert_eq!(parse_amount("面议"), None);
    }

    #[test]
    fn run_writes_merged_and_per_file_workbooks() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("orders");
        let output = dir.path().join("out");
        fs::create_dir_all(&input).unwrap();
        write_orders_input(
            &input.join("taobao.xlsx"),
            &["订单状态", "店铺名称", "商品名称", "商品数量", "金额"],
            &[
                &["交易成功", "旗舰店", "杜邦线", "2", "￥12.50"],
                &["交易成功", "旗舰店", "面包板", "1", "￥8.00"],
            ],
        );

        run(&input, &output).unwrap();

        let written: Vec<PathBuf> = fs::read_dir(&output)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        assert_eq!(written.len(), 2);
        let merged = written
            .iter()
            .find(|p| {
                p.file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with("批量提取_交易成功订单_"))
            })
            .unwrap();
        assert!(written.iter().any(|p| {
            p.file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with("taobao_交易成功_"))
        }));

        let mut wb: Xlsx<_> = open_workbook(merged).unwrap();
        let range = wb.worksheet_range("交易成功订单").unwrap();
        assert_eq!(range.get_value((0, 0)).unwrap().to_string(), "文件来源");
        assert_eq!(range.get_value((1, 1)).unwrap().to_string(), "旗舰店");
        // Amounts land as numbers with the currency mark stripped.
        assert_eq!(range.get_value((1, 5)).unwrap().as_f64(), Some(12.5));
    }

    #[test]
    fn empty_folder_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("orders");
        let output = dir.path().join("out");
        fs::create_dir_all(&input).unwrap();

        run(&input, &output).unwrap();
        assert!(!output.exists());
    }
}

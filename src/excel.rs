use crate::config::{ExpenseSection, ProcureSection};
use crate::expense::ExpenseRecord;
use crate::heuristics::ProcurementItem;
use crate::orders::{self, OrderRecord};
use anyhow::{Context, Result};
use chrono::Local;
use rust_xlsxwriter::{
    DataValidation, Format, FormatAlign, FormatBorder, Workbook, Worksheet,
};
use std::path::Path;
use tracing::info;

fn bordered(format: Format) -> Format {
    format.set_border(FormatBorder::Thin)
}

fn list_validation(options: &[String], error_title: &str, error_message: &str) -> Result<DataValidation> {
    let dv = DataValidation::new()
        .allow_list_strings(options)
        .context("invalid dropdown option list")?
        .set_error_title(error_title)
        .context("invalid dropdown error title")?
        .set_error_message(error_message)
        .context("invalid dropdown error message")?;
    Ok(dv)
}

/// Write a cell that should be numeric but arrives as a string. Values that
/// do not parse are written as text so nothing extracted is lost.
fn write_amount_cell(
    ws: &mut Worksheet,
    row: u32,
    col: u16,
    value: &str,
    number_format: &Format,
    text_format: &Format,
) -> Result<()> {
    match value.parse::<f64>() {
        Ok(v) => ws.write_number_with_format(row, col, v, number_format)?,
        Err(_) => ws.write_string_with_format(row, col, value, text_format)?,
    };
    Ok(())
}

const EXPENSE_HEADERS: [&str; 7] = [
    "付款明细原因",
    "项目负责人",
    "发票类型",
    "发票号码",
    "付款类型",
    "科目明细",
    "金额",
];

const EXPENSE_COLUMN_WIDTHS: [f64; 7] = [30.0, 15.0, 20.0, 20.0, 15.0, 15.0, 12.0];

/// Write the expense report: merged title row, bold header row, one row per
/// invoice, dropdowns on the type/category columns.
pub fn write_expense_workbook(
    path: &Path,
    records: &[ExpenseRecord],
    cfg: &ExpenseSection,
) -> Result<()> {
    let mut workbook = Workbook::new();
    let ws = workbook.add_worksheet();
    ws.set_name("报销明细")?;

    let title_format = Format::new()
        .set_bold()
        .set_font_size(14)
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter);
    let header_format = bordered(
        Format::new()
            .set_bold()
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter),
    );
    let cell_format = bordered(Format::new());
    let amount_format = bordered(
        Format::new()
            .set_num_format("0.00")
            .set_align(FormatAlign::Right),
    );

    for (col, width) in EXPENSE_COLUMN_WIDTHS.iter().enumerate() {
        ws.set_column_width(col as u16, *width)?;
    }

    ws.merge_range(0, 0, 0, 6, "明细表1", &title_format)?;
    for (col, header) in EXPENSE_HEADERS.iter().enumerate() {
        ws.write_string_with_format(1, col as u16, *header, &header_format)?;
    }

    for (idx, record) in records.iter().enumerate() {
        let row = (idx + 2) as u32;
        ws.write_string_with_format(row, 0, &record.payment_reason, &cell_format)?;
        ws.write_string_with_format(row, 1, &record.project_manager, &cell_format)?;
        ws.write_string_with_format(row, 2, &record.invoice_type, &cell_format)?;
        ws.write_string_with_format(row, 3, &record.invoice_number, &cell_format)?;
        ws.write_string_with_format(row, 4, &record.payment_type, &cell_format)?;
        ws.write_string_with_format(row, 5, &record.subject_detail, &cell_format)?;
        write_amount_cell(ws, row, 6, &record.amount, &amount_format, &cell_format)?;
    }

    let last_row = (records.len() + 1) as u32;
    ws.add_data_validation(
        2,
        2,
        last_row,
        2,
        &list_validation(&cfg.invoice_type_options, "输入错误", "请选择有效的发票类型")?,
    )?;
    ws.add_data_validation(
        2,
        4,
        last_row,
        4,
        &list_validation(&cfg.payment_type_options, "输入错误", "请选择有效的付款类型")?,
    )?;
    ws.add_data_validation(
        2,
        5,
        last_row,
        5,
        &list_validation(&cfg.subject_detail_options, "输入错误", "请选择有效的科目明细")?,
    )?;

    workbook
        .save(path)
        .with_context(|| format!("failed to save {}", path.display()))?;
    info!(path = %path.display(), rows = records.len(), "Expense workbook written");
    Ok(())
}

const PROCUREMENT_HEADERS: [&str; 10] = [
    "序号",
    "采购类型",
    "物品名称",
    "规格型号",
    "单位",
    "数量",
    "单价(元)",
    "金额(元)",
    "二级分类",
    "备注",
];

const PROCUREMENT_COLUMN_WIDTHS: [f64; 10] =
    [15.0, 20.0, 25.0, 15.0, 10.0, 12.0, 12.0, 15.0, 15.0, 20.0];

/// Write the procurement request sheet: title, request metadata, a single
/// item row with dropdowns, a totals row and signature rows.
pub fn write_procurement_workbook(
    path: &Path,
    item: &ProcurementItem,
    applicant: &str,
    cfg: &ProcureSection,
) -> Result<()> {
    let mut workbook = Workbook::new();
    let ws = workbook.add_worksheet();
    ws.set_name("采购申请表")?;

    let title_format = Format::new()
        .set_bold()
        .set_font_size(16)
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter);
    let header_format = bordered(
        Format::new()
            .set_bold()
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter),
    );
    let cell_format = bordered(Format::new().set_align(FormatAlign::Center));

    for (col, width) in PROCUREMENT_COLUMN_WIDTHS.iter().enumerate() {
        ws.set_column_width(col as u16, *width)?;
    }

    ws.merge_range(0, 0, 0, 9, "采购申请表", &title_format)?;

    // Request metadata.
    let today = Local::now().format("%Y-%m-%d").to_string();
    ws.write_string(2, 0, "申请日期:")?;
    ws.write_string(2, 1, &today)?;
    ws.write_string(2, 3, "申请人:")?;
    ws.write_string(2, 4, applicant)?;
    ws.write_string(2, 6, "部门:")?;
    ws.write_string(2, 7, &cfg.department)?;

    for (col, header) in PROCUREMENT_HEADERS.iter().enumerate() {
        ws.write_string_with_format(4, col as u16, *header, &header_format)?;
    }

    // Item row.
    ws.write_number_with_format(5, 0, 1.0, &cell_format)?;
    ws.write_string_with_format(5, 1, &cfg.procurement_type, &cell_format)?;
    ws.write_string_with_format(5, 2, &item.name, &cell_format)?;
    ws.write_string_with_format(5, 3, &item.specification, &cell_format)?;
    ws.write_string_with_format(5, 4, &item.unit, &cell_format)?;
    ws.write_number_with_format(5, 5, item.quantity as f64, &cell_format)?;
    ws.write_number_with_format(5, 6, item.unit_price, &cell_format)?;
    ws.write_number_with_format(5, 7, item.total_amount, &cell_format)?;
    ws.write_string_with_format(5, 8, &cfg.secondary_category, &cell_format)?;
    ws.write_string_with_format(5, 9, "根据图片信息自动生成", &cell_format)?;

    ws.add_data_validation(
        5,
        1,
        5,
        1,
        &list_validation(&cfg.procurement_type_options, "输入错误", "请选择有效的采购类型")?,
    )?;
    ws.add_data_validation(
        5,
        8,
        5,
        8,
        &list_validation(&cfg.secondary_category_options, "输入错误", "请选择有效的二级分类")?,
    )?;

    // Totals.
    ws.merge_range(7, 0, 7, 6, "合计金额", &header_format)?;
    ws.write_number_with_format(7, 7, item.total_amount, &header_format)?;

    // Signatures.
    ws.write_string(10, 0, "申请人签字:")?;
    ws.write_string(10, 3, "部门负责人:")?;
    ws.write_string(10, 6, "财务审核:")?;
    ws.write_string(12, 0, "日期:")?;
    ws.write_string(12, 3, "日期:")?;
    ws.write_string(12, 6, "日期:")?;

    workbook
        .save(path)
        .with_context(|| format!("failed to save {}", path.display()))?;
    info!(path = %path.display(), "Procurement workbook written");
    Ok(())
}

const ORDER_HEADERS: [&str; 6] = [
    "文件来源",
    "店铺名称",
    "商品名称",
    "型号规格",
    "商品数量",
    "金额",
];

const ORDER_COLUMN_WIDTHS: [f64; 6] = [30.0, 25.0, 40.0, 20.0, 12.0, 12.0];

/// Write extracted orders as a flat table, one row per order. Quantities and
/// amounts become numbers when they parse, text otherwise.
pub fn write_orders_workbook(path: &Path, records: &[OrderRecord]) -> Result<()> {
    let mut workbook = Workbook::new();
    let ws = workbook.add_worksheet();
    ws.set_name("交易成功订单")?;

    let header_format = bordered(
        Format::new()
            .set_bold()
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter),
    );
    let cell_format = bordered(Format::new());
    let amount_format = bordered(
        Format::new()
            .set_num_format("0.00")
            .set_align(FormatAlign::Right),
    );

    for (col, width) in ORDER_COLUMN_WIDTHS.iter().enumerate() {
        ws.set_column_width(col as u16, *width)?;
    }
    for (col, header) in ORDER_HEADERS.iter().enumerate() {
        ws.write_string_with_format(0, col as u16, *header, &header_format)?;
    }

    for (idx, record) in records.iter().enumerate() {
        let row = (idx + 1) as u32;
        ws.write_string_with_format(row, 0, &record.source_file, &cell_format)?;
        ws.write_string_with_format(row, 1, &record.shop, &cell_format)?;
        ws.write_string_with_format(row, 2, &record.product, &cell_format)?;
        ws.write_string_with_format(row, 3, &record.specification, &cell_format)?;
        write_amount_cell(ws, row, 4, &record.quantity, &cell_format, &cell_format)?;
        match orders::parse_amount(&record.amount) {
            Some(v) => ws.write_number_with_format(row, 5, v, &amount_format)?,
            None => ws.write_string_with_format(row, 5, &record.amount, &cell_format)?,
        };
    }

    workbook
        .save(path)
        .with_context(|| format!("failed to save {}", path.display()))?;
    info!(path = %path.display(), rows = records.len(), "Orders workbook written");
    Ok(())
}

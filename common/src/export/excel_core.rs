//! Excel生成（共通ライブラリ）
//!
//! ヘッダー行 + データ行の単純な表を xlsx バッファに書き出す。
//! 表示行の出力とメモのシート保存の両方で使う。

use crate::columns::Column;
use crate::derive::format_for_display;
use crate::types::DisplayRecord;
use rust_xlsxwriter::*;

/// 列幅の上限（文字数換算）
const MAX_COL_WIDTH: f64 = 60.0;
const MIN_COL_WIDTH: f64 = 8.0;

/// 表をバッファに生成
///
/// # Arguments
/// * `sheet_name` - シート名
/// * `headers` - ヘッダー行
/// * `rows` - データ行（列数はヘッダーに合わせる必要はない）
pub fn generate_table_buffer(
    sheet_name: &str,
    headers: &[&str],
    rows: &[Vec<String>],
) -> Result<Vec<u8>, String> {
    let mut workbook = Workbook::new();

    let header_format = Format::new()
        .set_bold()
        .set_font_color(Color::RGB(0x333333))
        .set_background_color(Color::RGB(0xF5F5F5))
        .set_border(FormatBorder::Thin)
        .set_border_color(Color::RGB(0xAAAAAA));

    let value_format = Format::new()
        .set_align(FormatAlign::Top)
        .set_text_wrap();

    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name(sheet_name)
        .map_err(|e| format!("シート名設定エラー: {}", e))?;

    let mut widths: Vec<f64> = headers.iter().map(|h| h.chars().count() as f64).collect();

    for (col, header) in headers.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, *header, &header_format)
            .map_err(|e| format!("ヘッダー書き込みエラー: {}", e))?;
    }

    for (i, row) in rows.iter().enumerate() {
        let row_idx = (i + 1) as u32;
        for (col, value) in row.iter().enumerate() {
            worksheet
                .write_string_with_format(row_idx, col as u16, value, &value_format)
                .map_err(|e| format!("値書き込みエラー: {}", e))?;

            let longest_line = value.lines().map(|l| l.chars().count()).max().unwrap_or(0) as f64;
            if let Some(w) = widths.get_mut(col) {
                *w = w.max(longest_line);
            }
        }
    }

    for (col, width) in widths.iter().enumerate() {
        worksheet
            .set_column_width(col as u16, (width + 2.0).clamp(MIN_COL_WIDTH, MAX_COL_WIDTH))
            .map_err(|e| format!("列幅設定エラー: {}", e))?;
    }

    if !headers.is_empty() {
        worksheet
            .set_freeze_panes(1, 0)
            .map_err(|e| format!("ウィンドウ枠固定エラー: {}", e))?;
        worksheet
            .autofilter(0, 0, rows.len() as u32, (headers.len() - 1) as u16)
            .map_err(|e| format!("オートフィルタ設定エラー: {}", e))?;
    }

    workbook
        .save_to_buffer()
        .map_err(|e| format!("Excel保存エラー: {}", e))
}

/// 表示行をExcelバッファに生成（値は表示用に整形）
pub fn generate_excel_buffer(
    rows: &[DisplayRecord],
    columns: &[Column],
    sheet_name: &str,
) -> Result<Vec<u8>, String> {
    let headers: Vec<&str> = columns.iter().map(|c| c.header()).collect();
    let values: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| format_for_display(&c.value(row)))
                .collect()
        })
        .collect();

    generate_table_buffer(sheet_name, &headers, &values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MergedRecord;

    #[test]
    fn test_generate_table_buffer_is_zip() {
        let buffer = generate_table_buffer(
            "Notes",
            &["Barcode#", "Meeting Note"],
            &[vec!["RV1".to_string(), "line1\nline2".to_string()]],
        )
        .unwrap();
        // xlsx は ZIP コンテナ
        assert!(buffer.starts_with(b"PK"));
    }

    #[test]
    fn test_generate_excel_buffer_empty_rows() {
        let buffer = generate_excel_buffer(&[], Column::DEFAULT_SET, "Repairs").unwrap();
        assert!(!buffer.is_empty());
    }

    #[test]
    fn test_generate_excel_buffer_rows() {
        let row = DisplayRecord {
            record: MergedRecord {
                barcode: "RV1".into(),
                repair_cost: "1,200.00".into(),
                ..Default::default()
            },
            last_updated: None,
        };
        let buffer = generate_excel_buffer(&[row], &[Column::Barcode, Column::RepairCost], "Repairs").unwrap();
        assert!(buffer.starts_with(b"PK"));
    }

    #[test]
    fn test_invalid_sheet_name() {
        assert!(generate_table_buffer("bad/name", &["A"], &[]).is_err());
    }
}

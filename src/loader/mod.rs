//! 表データ読み込みモジュール
//!
//! チケット一覧・修理レポートのエクスポート（CSV / Excel / ODS）を
//! ヘッダー名 → セル値 の行に変換する。

mod cell;

pub use cell::{cell_to_string, excel_serial_to_iso};

use crate::error::{DashError, Result};
use calamine::{open_workbook_auto, Reader};
use repair_dash_common::csv::{parse_csv, rows_to_records};
use repair_dash_common::{RawRow, ReportRecord, TicketRecord};
use std::path::Path;

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// ファイル形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceFormat {
    Csv,
    Spreadsheet,
}

fn detect_format(path: &Path) -> Result<SourceFormat> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if ext == "csv" || ext == "txt" {
        Ok(SourceFormat::Csv)
    } else if SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) {
        Ok(SourceFormat::Spreadsheet)
    } else {
        Err(DashError::UnsupportedFormat(path.display().to_string()))
    }
}

/// 先頭シートを行×セル文字列で読み込み
pub fn read_table(path: &Path) -> Result<Vec<Vec<String>>> {
    if !path.exists() {
        return Err(DashError::FileNotFound(path.display().to_string()));
    }

    match detect_format(path)? {
        SourceFormat::Csv => {
            let bytes = std::fs::read(path)?;
            Ok(parse_csv(&String::from_utf8_lossy(&bytes)))
        }
        SourceFormat::Spreadsheet => {
            let mut workbook = open_workbook_auto(path)?;
            let range = workbook
                .worksheet_range_at(0)
                .ok_or_else(|| DashError::Spreadsheet(format!("シートがありません: {}", path.display())))??;

            Ok(range
                .rows()
                .map(|row| row.iter().map(cell_to_string).collect())
                .collect())
        }
    }
}

/// ヘッダー行付きの表を読み込み
pub fn load_rows(path: &Path) -> Result<Vec<RawRow>> {
    let rows = rows_to_records(read_table(path)?);
    tracing::info!(path = %path.display(), rows = rows.len(), "表データを読み込みました");
    Ok(rows)
}

/// チケット一覧を読み込み
pub fn load_tickets(path: &Path) -> Result<Vec<TicketRecord>> {
    let tickets: Vec<TicketRecord> = load_rows(path)?
        .into_iter()
        .map(TicketRecord::from_row)
        .collect();

    let missing = tickets.iter().filter(|t| t.barcode.trim().is_empty()).count();
    if missing > 0 {
        tracing::warn!(missing, "バーコードのないチケット行は突合されません");
    }

    Ok(tickets)
}

/// 修理レポートを読み込み
pub fn load_reports(path: &Path) -> Result<Vec<ReportRecord>> {
    Ok(load_rows(path)?
        .into_iter()
        .map(ReportRecord::from_row)
        .collect())
}

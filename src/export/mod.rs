//! 表示行の出力
//!
//! 列の選択と表示用の整形は共通ライブラリ側で行い、
//! ここでは形式の選択とファイル・標準出力への書き出しを受け持つ。

pub mod table;

use crate::error::{DashError, Result};
use repair_dash_common::columns::Column;
use repair_dash_common::csv::export_csv;
use repair_dash_common::export::excel_core::generate_excel_buffer;
use repair_dash_common::DisplayRecord;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    /// 端末向けの整形表
    #[default]
    Table,
    Csv,
    Xlsx,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Table => "txt",
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Json => "json",
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::Table => write!(f, "table"),
            other => write!(f, "{}", other.extension()),
        }
    }
}

fn output_path_for_format(output: &Path, title: &str, extension: &str) -> PathBuf {
    if output.is_dir() || output.extension().is_none() {
        output.join(format!("{}.{}", title, extension))
    } else {
        output.to_path_buf()
    }
}

/// 指定形式のバイト列に変換
pub fn render(rows: &[DisplayRecord], columns: &[Column], format: ExportFormat, title: &str) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Table => Ok(table::render_table(rows, columns).into_bytes()),
        ExportFormat::Csv => Ok(export_csv(rows, columns).into_bytes()),
        ExportFormat::Xlsx => {
            generate_excel_buffer(rows, columns, title).map_err(DashError::ExcelGeneration)
        }
        ExportFormat::Json => Ok(serde_json::to_vec_pretty(rows)?),
    }
}

/// 出力先があればファイルに、なければ標準出力に書き出す
///
/// 書き出したファイルのパスを返す。
pub fn export_rows(
    rows: &[DisplayRecord],
    columns: &[Column],
    format: ExportFormat,
    output: Option<&Path>,
    title: &str,
) -> Result<Option<PathBuf>> {
    let Some(output) = output else {
        if format == ExportFormat::Xlsx {
            return Err(DashError::ExcelGeneration(
                "xlsx は標準出力に書き出せません。--output を指定してください".into(),
            ));
        }
        let bytes = render(rows, columns, format, title)?;
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&bytes)?;
        if !bytes.ends_with(b"\n") {
            writeln!(stdout)?;
        }
        return Ok(None);
    };

    let path = output_path_for_format(output, title, format.extension());
    let bytes = render(rows, columns, format, title)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, bytes)?;
    tracing::info!(path = %path.display(), rows = rows.len(), %format, "出力しました");
    Ok(Some(path))
}

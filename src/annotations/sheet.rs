//! シート保存先
//!
//! 共有ドライブ上の xlsx をメモの保存先として使う。
//! 列は `Barcode#`, `Meeting Note`, `Requires Follow Up`, `Last Updated`。

use super::backend::{keyed, merge_patches, AnnotationBackend, AnnotationPatch};
use crate::error::{DashError, Result};
use crate::loader::read_table;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use repair_dash_common::csv::rows_to_records;
use repair_dash_common::derive::parse_date;
use repair_dash_common::export::excel_core::generate_table_buffer;
use repair_dash_common::{AnnotationRecord, RawRow};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

const SHEET_NAME: &str = "Annotations";
const COL_BARCODE: &str = "Barcode#";
const COL_DISCUSSION: &str = "Meeting Note";
const COL_FOLLOW_UP: &str = "Requires Follow Up";
const COL_LAST_UPDATED: &str = "Last Updated";
const HEADERS: [&str; 4] = [COL_BARCODE, COL_DISCUSSION, COL_FOLLOW_UP, COL_LAST_UPDATED];

pub struct SheetBackend {
    path: Arc<PathBuf>,
    write_lock: Mutex<()>,
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| parse_date(raw).map(|naive| naive.and_utc()))
}

fn row_to_record(mut row: RawRow) -> AnnotationRecord {
    let mut take = |key: &str| row.remove(key).unwrap_or_default();
    AnnotationRecord {
        barcode: take(COL_BARCODE),
        discussion_note: take(COL_DISCUSSION),
        follow_up_note: take(COL_FOLLOW_UP),
        last_updated: parse_timestamp(&take(COL_LAST_UPDATED)),
    }
}

fn record_to_row(record: &AnnotationRecord) -> Vec<String> {
    vec![
        record.barcode.clone(),
        record.discussion_note.clone(),
        record.follow_up_note.clone(),
        record
            .last_updated
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_default(),
    ]
}

fn read_sheet(path: &Path) -> Result<HashMap<String, AnnotationRecord>> {
    let table = match read_table(path) {
        Err(DashError::FileNotFound(p)) => return Err(DashError::NotFound(p)),
        other => other?,
    };

    let has_barcode = table
        .first()
        .is_some_and(|header| header.iter().any(|h| h.trim() == COL_BARCODE));
    if !has_barcode && !table.is_empty() {
        return Err(DashError::Backend(format!(
            "{} 列がありません: {}",
            COL_BARCODE,
            path.display()
        )));
    }

    Ok(keyed(rows_to_records(table).into_iter().map(row_to_record)))
}

fn write_sheet(path: &Path, records: &HashMap<String, AnnotationRecord>) -> Result<()> {
    let mut sorted: Vec<&AnnotationRecord> = records.values().collect();
    sorted.sort_by(|a, b| a.barcode.cmp(&b.barcode));
    let rows: Vec<Vec<String>> = sorted.into_iter().map(record_to_row).collect();

    let buffer =
        generate_table_buffer(SHEET_NAME, &HEADERS, &rows).map_err(DashError::ExcelGeneration)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("xlsx.tmp");
    std::fs::write(&tmp, buffer)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

impl SheetBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// calamine / rust_xlsxwriter は同期なのでブロッキングスレッドで動かす
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> Result<T> + Send + 'static,
    {
        let path = Arc::clone(&self.path);
        tokio::task::spawn_blocking(move || f(&path))
            .await
            .map_err(|e| DashError::Backend(e.to_string()))?
    }

    /// 読み込み→変更→書き込み
    async fn modify<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut HashMap<String, AnnotationRecord>) -> bool + Send + 'static,
    {
        let _guard = self.write_lock.lock().await;
        self.blocking(move |path| {
            let mut records = match read_sheet(path) {
                Err(e) if e.is_not_found() => HashMap::new(),
                other => other?,
            };
            if f(&mut records) {
                write_sheet(path, &records)?;
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl AnnotationBackend for SheetBackend {
    async fn load_all(&self) -> Result<HashMap<String, AnnotationRecord>> {
        self.blocking(read_sheet).await
    }

    async fn upsert(&self, patches: &[AnnotationPatch]) -> Result<()> {
        let patches = patches.to_vec();
        self.modify(move |records| {
            merge_patches(records, &patches);
            true
        })
        .await
    }

    async fn delete(&self, barcodes: &[String]) -> Result<()> {
        let barcodes = barcodes.to_vec();
        self.modify(move |records| {
            let before = records.len();
            for barcode in &barcodes {
                records.remove(barcode);
            }
            records.len() != before
        })
        .await
    }

    fn describe(&self) -> String {
        format!("sheet:{}", self.path.display())
    }
}

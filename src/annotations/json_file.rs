//! JSONファイル保存先
//!
//! `{ "version": 1, "records": { "<BARCODE>": {...} } }` 形式。
//! 書き込みは一時ファイル経由で置き換える。

use super::backend::{keyed, merge_patches, AnnotationBackend, AnnotationPatch};
use crate::error::{DashError, Result};
use async_trait::async_trait;
use repair_dash_common::AnnotationRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// メモファイルの構造
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AnnotationFile {
    /// バージョン（互換性チェック用）
    version: u32,
    /// 正規化済みバーコード → メモ
    records: BTreeMap<String, AnnotationRecord>,
}

impl AnnotationFile {
    const CURRENT_VERSION: u32 = 1;
}

pub struct JsonFileBackend {
    path: PathBuf,
    /// 読み込み→書き込みの間に別の書き込みを挟ませない
    write_lock: Mutex<()>,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<HashMap<String, AnnotationRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DashError::NotFound(self.path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let file: AnnotationFile = serde_json::from_str(&content)?;
        // ユーザーの書いたメモなので作り直さずにエラーにする
        if file.version != AnnotationFile::CURRENT_VERSION {
            return Err(DashError::Backend(format!(
                "メモファイルのバージョンが違います: {} (対応: {})",
                file.version,
                AnnotationFile::CURRENT_VERSION
            )));
        }

        Ok(keyed(file.records.into_values()))
    }

    async fn read_or_empty(&self) -> Result<HashMap<String, AnnotationRecord>> {
        match self.read().await {
            Err(e) if e.is_not_found() => Ok(HashMap::new()),
            other => other,
        }
    }

    async fn write(&self, records: HashMap<String, AnnotationRecord>) -> Result<()> {
        let file = AnnotationFile {
            version: AnnotationFile::CURRENT_VERSION,
            records: records.into_iter().collect(),
        };
        let content = serde_json::to_string_pretty(&file)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl AnnotationBackend for JsonFileBackend {
    async fn load_all(&self) -> Result<HashMap<String, AnnotationRecord>> {
        self.read().await
    }

    async fn upsert(&self, patches: &[AnnotationPatch]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_or_empty().await?;
        merge_patches(&mut records, patches);
        self.write(records).await
    }

    async fn delete(&self, barcodes: &[String]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_or_empty().await?;
        let before = records.len();
        for barcode in barcodes {
            records.remove(barcode);
        }
        if records.len() == before {
            return Ok(());
        }
        self.write(records).await
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}

//! メモの保存先
//!
//! 保存先はキー単位・フィールド単位でマージする。
//! 他クライアントが別フィールドを編集していても上書きしない。

use crate::error::{DashError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use repair_dash_common::{normalize_str, AnnotationRecord};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// 保存時に送る差分
///
/// `None` のフィールドは変更しない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationPatch {
    pub barcode: String,
    pub discussion_note: Option<String>,
    pub follow_up_note: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl AnnotationPatch {
    /// 既存レコードにフィールド単位で適用
    pub fn apply_to(&self, record: &mut AnnotationRecord) {
        if let Some(note) = &self.discussion_note {
            record.discussion_note = note.clone();
        }
        if let Some(note) = &self.follow_up_note {
            record.follow_up_note = note.clone();
        }
        record.last_updated = Some(self.last_updated);
    }
}

/// 保存先で起きた変更（他クライアント由来）
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteChange {
    Upserted(Vec<AnnotationRecord>),
    Deleted(Vec<String>),
}

/// メモの保存先
#[async_trait]
pub trait AnnotationBackend: Send + Sync + 'static {
    /// 全件読み込み。保存先が未作成なら `DashError::NotFound`
    async fn load_all(&self) -> Result<HashMap<String, AnnotationRecord>>;

    /// 差分をフィールド単位でマージ保存
    async fn upsert(&self, patches: &[AnnotationPatch]) -> Result<()>;

    /// キーを削除（存在しないキーは無視）
    async fn delete(&self, barcodes: &[String]) -> Result<()>;

    /// 変更通知を受け取れる保存先なら購読口を返す
    fn watch(&self) -> Option<broadcast::Receiver<RemoteChange>> {
        None
    }

    /// ログ用の名前
    fn describe(&self) -> String;
}

/// 読み込んだレコードのキーを正規化して詰め直す
pub(crate) fn keyed(records: impl IntoIterator<Item = AnnotationRecord>) -> HashMap<String, AnnotationRecord> {
    records
        .into_iter()
        .filter_map(|mut record| {
            let key = normalize_str(&record.barcode);
            if key.is_empty() {
                return None;
            }
            record.barcode = key.clone();
            Some((key, record))
        })
        .collect()
}

/// パッチ群をマップに適用
pub(crate) fn merge_patches(
    records: &mut HashMap<String, AnnotationRecord>,
    patches: &[AnnotationPatch],
) -> Vec<AnnotationRecord> {
    patches
        .iter()
        .map(|patch| {
            let record = records
                .entry(patch.barcode.clone())
                .or_insert_with(|| AnnotationRecord::empty(patch.barcode.clone()));
            patch.apply_to(record);
            record.clone()
        })
        .collect()
}

struct MemoryShared {
    records: Mutex<HashMap<String, AnnotationRecord>>,
    created: AtomicBool,
    fail_writes: AtomicUsize,
    changes: broadcast::Sender<RemoteChange>,
}

/// プロセス内の共有保存先
///
/// clone したものは同じデータを共有する。複数クライアントの同時編集や
/// 保存失敗の再現に使う。
#[derive(Clone)]
pub struct MemoryBackend {
    shared: Arc<MemoryShared>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            shared: Arc::new(MemoryShared {
                records: Mutex::new(HashMap::new()),
                created: AtomicBool::new(false),
                fail_writes: AtomicUsize::new(0),
                changes,
            }),
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 既存データ入りで作成
    pub fn with_records(records: impl IntoIterator<Item = AnnotationRecord>) -> Self {
        let backend = Self::default();
        *backend.lock() = keyed(records);
        backend.shared.created.store(true, Ordering::SeqCst);
        backend
    }

    /// 次の `count` 回の書き込みを失敗させる
    pub fn fail_next_writes(&self, count: usize) {
        self.shared.fail_writes.store(count, Ordering::SeqCst);
    }

    /// 保存済みの内容
    pub fn stored(&self) -> HashMap<String, AnnotationRecord> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, AnnotationRecord>> {
        self.shared.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_write(&self) -> Result<()> {
        let injected = self
            .shared
            .fail_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(DashError::Backend("書き込みに失敗しました".into()));
        }
        Ok(())
    }

    fn publish(&self, change: RemoteChange) {
        // 受信者がいなければ捨てる
        let _ = self.shared.changes.send(change);
    }
}

#[async_trait]
impl AnnotationBackend for MemoryBackend {
    async fn load_all(&self) -> Result<HashMap<String, AnnotationRecord>> {
        if !self.shared.created.load(Ordering::SeqCst) {
            return Err(DashError::NotFound(self.describe()));
        }
        Ok(self.stored())
    }

    async fn upsert(&self, patches: &[AnnotationPatch]) -> Result<()> {
        self.check_write()?;
        let merged = {
            let mut records = self.lock();
            merge_patches(&mut records, patches)
        };
        self.shared.created.store(true, Ordering::SeqCst);
        self.publish(RemoteChange::Upserted(merged));
        Ok(())
    }

    async fn delete(&self, barcodes: &[String]) -> Result<()> {
        self.check_write()?;
        {
            let mut records = self.lock();
            for barcode in barcodes {
                records.remove(barcode);
            }
        }
        self.publish(RemoteChange::Deleted(barcodes.to_vec()));
        Ok(())
    }

    fn watch(&self) -> Option<broadcast::Receiver<RemoteChange>> {
        Some(self.shared.changes.subscribe())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn patch(barcode: &str, discussion: Option<&str>, follow_up: Option<&str>) -> AnnotationPatch {
        AnnotationPatch {
            barcode: barcode.to_string(),
            discussion_note: discussion.map(str::to_string),
            follow_up_note: follow_up.map(str::to_string),
            last_updated: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_patch_keeps_untouched_field() {
        let mut record = AnnotationRecord {
            barcode: "RV1".into(),
            discussion_note: "call vendor".into(),
            follow_up_note: "yes".into(),
            last_updated: None,
        };
        patch("RV1", None, Some("no")).apply_to(&mut record);
        assert_eq!(record.discussion_note, "call vendor");
        assert_eq!(record.follow_up_note, "no");
        assert!(record.last_updated.is_some());
    }

    #[test]
    fn test_keyed_normalizes_and_drops_empty() {
        let map = keyed(vec![AnnotationRecord::empty(" rv1 "), AnnotationRecord::empty("  ")]);
        assert_eq!(map.len(), 1);
        assert_eq!(map["RV1"].barcode, "RV1");
    }

    #[tokio::test]
    async fn test_memory_backend_not_found_until_written() {
        let backend = MemoryBackend::new();
        assert!(backend.load_all().await.unwrap_err().is_not_found());

        backend.upsert(&[patch("RV1", Some("a"), None)]).await.unwrap();
        let loaded = backend.load_all().await.unwrap();
        assert_eq!(loaded["RV1"].discussion_note, "a");
    }

    #[tokio::test]
    async fn test_memory_backend_field_merge() {
        let backend = MemoryBackend::new();
        backend.upsert(&[patch("RV1", Some("a"), None)]).await.unwrap();
        backend.upsert(&[patch("RV1", None, Some("b"))]).await.unwrap();

        let stored = backend.stored();
        assert_eq!(stored["RV1"].discussion_note, "a");
        assert_eq!(stored["RV1"].follow_up_note, "b");
    }

    #[tokio::test]
    async fn test_memory_backend_injected_failure() {
        let backend = MemoryBackend::new();
        backend.fail_next_writes(1);
        assert!(backend.upsert(&[patch("RV1", Some("a"), None)]).await.is_err());
        assert!(backend.upsert(&[patch("RV1", Some("a"), None)]).await.is_ok());
    }

    #[tokio::test]
    async fn test_memory_backend_broadcasts() {
        let backend = MemoryBackend::new();
        let mut rx = backend.watch().unwrap();
        backend.delete(&["RV9".to_string()]).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), RemoteChange::Deleted(vec!["RV9".into()]));
    }
}

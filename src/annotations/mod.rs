//! メモ（共同編集の注記）モジュール
//!
//! 突合結果の上に重ねるバーコード単位のメモを管理する。
//! 保存先は JSON ファイルか共有 xlsx シートから選ぶ。

mod autosave;
mod backend;
mod json_file;
mod sheet;
mod store;
mod subscription;

pub use autosave::AutoSaver;
pub use backend::{AnnotationBackend, AnnotationPatch, MemoryBackend, RemoteChange};
pub use json_file::JsonFileBackend;
pub use sheet::SheetBackend;
pub use store::{AnnotationStore, FlushOutcome, NoteEdit};
pub use subscription::{AnnotationEvent, EventOrigin, KeyFilter, Subscription};

use crate::config::{BackendKind, Config};
use crate::error::Result;
use async_trait::async_trait;
use repair_dash_common::AnnotationRecord;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

#[async_trait]
impl AnnotationBackend for Box<dyn AnnotationBackend> {
    async fn load_all(&self) -> Result<HashMap<String, AnnotationRecord>> {
        (**self).load_all().await
    }

    async fn upsert(&self, patches: &[AnnotationPatch]) -> Result<()> {
        (**self).upsert(patches).await
    }

    async fn delete(&self, barcodes: &[String]) -> Result<()> {
        (**self).delete(barcodes).await
    }

    fn watch(&self) -> Option<tokio::sync::broadcast::Receiver<RemoteChange>> {
        (**self).watch()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// 設定に応じた保存先を作成
pub fn open_backend(config: &Config) -> Box<dyn AnnotationBackend> {
    let path = config.annotations_path();
    match config.annotation_backend {
        BackendKind::Json => Box::new(JsonFileBackend::new(path)),
        BackendKind::Sheet => Box::new(SheetBackend::new(path)),
    }
}

/// 保存先の変更通知をストアに流し込むタスクを起動
///
/// 通知を持たない保存先なら `None`。
pub fn spawn_remote_listener<B: AnnotationBackend>(
    store: Arc<AnnotationStore<B>>,
) -> Option<JoinHandle<()>> {
    let mut changes = store.backend().watch()?;

    Some(tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => store.apply_remote(change),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "変更通知を取りこぼしたため再読み込みします");
                    if let Err(e) = store.load_all().await {
                        tracing::warn!(error = %e, "再読み込みに失敗しました");
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    }))
}

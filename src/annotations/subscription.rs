//! 変更通知
//!
//! コールバックを登録し、解除用のハンドルを返す。
//! ハンドルの `unsubscribe` は何度呼んでもよく、drop 時にも解除される。

use repair_dash_common::AnnotationRecord;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

/// 変更の発生元
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    /// このクライアントでの編集
    Local,
    /// 他クライアントの保存を取り込んだもの
    Remote,
}

/// メモの変更イベント
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationEvent {
    Updated {
        record: AnnotationRecord,
        origin: EventOrigin,
    },
    Deleted {
        barcode: String,
        origin: EventOrigin,
    },
    /// 全件再読み込み
    Reloaded,
}

impl AnnotationEvent {
    fn concerns(&self, key: &str) -> bool {
        match self {
            AnnotationEvent::Updated { record, .. } => record.barcode == key,
            AnnotationEvent::Deleted { barcode, .. } => barcode == key,
            AnnotationEvent::Reloaded => true,
        }
    }
}

/// 購読対象
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyFilter {
    All,
    /// 正規化済みバーコード
    Key(String),
}

type Callback = Arc<dyn Fn(&AnnotationEvent) + Send + Sync>;

#[derive(Default)]
struct ListenerTable {
    next_id: u64,
    entries: HashMap<u64, (KeyFilter, Callback)>,
}

/// 購読者の一覧
#[derive(Clone, Default)]
pub struct Listeners {
    table: Arc<Mutex<ListenerTable>>,
}

impl Listeners {
    pub fn subscribe(
        &self,
        filter: KeyFilter,
        callback: impl Fn(&AnnotationEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        let id = table.next_id;
        table.next_id += 1;
        table.entries.insert(id, (filter, Arc::new(callback)));

        Subscription {
            id,
            table: Arc::downgrade(&self.table),
        }
    }

    /// 該当する購読者に通知（ロックを外してから呼ぶ）
    pub fn notify(&self, event: &AnnotationEvent) {
        let callbacks: Vec<Callback> = {
            let table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            table
                .entries
                .values()
                .filter(|(filter, _)| match filter {
                    KeyFilter::All => true,
                    KeyFilter::Key(key) => event.concerns(key),
                })
                .map(|(_, cb)| Arc::clone(cb))
                .collect()
        };

        for callback in callbacks {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 購読ハンドル
#[must_use = "drop すると購読が解除されます"]
pub struct Subscription {
    id: u64,
    table: Weak<Mutex<ListenerTable>>,
}

impl Subscription {
    /// 購読解除（二度目以降は何もしない）
    pub fn unsubscribe(&self) {
        if let Some(table) = self.table.upgrade() {
            table
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .entries
                .remove(&self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

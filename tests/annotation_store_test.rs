//! メモストアの統合テスト
//!
//! 保存の失敗と再送、保存中の重複 flush、複数クライアントの同時編集を確認する。

use async_trait::async_trait;
use repair_dash::annotations::{
    spawn_remote_listener, AnnotationBackend, AnnotationEvent, AnnotationPatch, AnnotationStore,
    EventOrigin, FlushOutcome, JsonFileBackend, KeyFilter, MemoryBackend, NoteEdit, RemoteChange,
};
use repair_dash::error::Result;
use repair_dash_common::AnnotationRecord;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::{broadcast, Notify};

/// upsert の途中で止められる保存先
struct GatedBackend {
    inner: MemoryBackend,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl AnnotationBackend for GatedBackend {
    async fn load_all(&self) -> Result<HashMap<String, AnnotationRecord>> {
        self.inner.load_all().await
    }

    async fn upsert(&self, patches: &[AnnotationPatch]) -> Result<()> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.upsert(patches).await
    }

    async fn delete(&self, barcodes: &[String]) -> Result<()> {
        self.inner.delete(barcodes).await
    }

    fn watch(&self) -> Option<broadcast::Receiver<RemoteChange>> {
        self.inner.watch()
    }

    fn describe(&self) -> String {
        "gated".to_string()
    }
}

/// 保存した内容が別のストアから読める
#[tokio::test]
async fn test_flush_is_durable() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("notes.json");

    let store = AnnotationStore::new(JsonFileBackend::new(&path));
    assert!(store.load_all().await.unwrap().is_empty());
    store.update("rv1", NoteEdit::discussion("call vendor").with_follow_up("yes"));
    let outcome = store.flush().await.unwrap();
    assert_eq!(outcome, FlushOutcome::Persisted { upserted: 1, deleted: 0 });
    assert!(!store.has_unsaved_changes());

    let reopened = AnnotationStore::new(JsonFileBackend::new(&path));
    let loaded = reopened.load_all().await.unwrap();
    assert_eq!(loaded["RV1"].discussion_note, "call vendor");
    assert_eq!(loaded["RV1"].follow_up_note, "yes");
    assert!(loaded["RV1"].last_updated.is_some());
}

/// 変更がなければ何もしない
#[tokio::test]
async fn test_flush_without_changes_is_clean() {
    let store = AnnotationStore::new(MemoryBackend::new());
    assert_eq!(store.flush().await.unwrap(), FlushOutcome::Clean);
}

/// 保存に失敗した変更は残り、次回の flush で送られる
#[tokio::test]
async fn test_failed_flush_requeues() {
    let backend = MemoryBackend::new();
    let store = AnnotationStore::new(backend.clone());

    store.update("RV1", NoteEdit::discussion("a"));
    store.delete("RV2");
    backend.fail_next_writes(1);

    assert!(store.flush().await.is_err());
    assert_eq!(store.pending_count(), 2);
    assert!(backend.stored().is_empty());
    // ローカルの値は失われない
    assert_eq!(store.get("RV1").discussion_note, "a");

    let outcome = store.flush().await.unwrap();
    assert_eq!(outcome, FlushOutcome::Persisted { upserted: 1, deleted: 1 });
    assert_eq!(store.pending_count(), 0);
    assert_eq!(backend.stored()["RV1"].discussion_note, "a");
}

/// 保存中の flush はスキップされ、保存中に入った編集は次回に残る
#[tokio::test]
async fn test_concurrent_flush_is_skipped() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let inner = MemoryBackend::new();
    let store = Arc::new(AnnotationStore::new(GatedBackend {
        inner: inner.clone(),
        entered: Arc::clone(&entered),
        release: Arc::clone(&release),
    }));

    store.update("RV1", NoteEdit::discussion("first"));
    let first = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.flush().await })
    };
    entered.notified().await;

    assert_eq!(store.flush().await.unwrap(), FlushOutcome::Skipped);
    store.update("RV1", NoteEdit::discussion("second"));

    release.notify_one();
    let outcome = first.await.unwrap().unwrap();
    assert_eq!(outcome, FlushOutcome::Persisted { upserted: 1, deleted: 0 });
    assert_eq!(inner.stored()["RV1"].discussion_note, "first");
    assert_eq!(store.pending_count(), 1);

    let second = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.flush().await })
    };
    entered.notified().await;
    release.notify_one();
    second.await.unwrap().unwrap();
    assert_eq!(inner.stored()["RV1"].discussion_note, "second");
    assert!(!store.has_unsaved_changes());
}

/// 別クライアントの保存は未保存のフィールドを上書きしない
#[tokio::test]
async fn test_remote_update_keeps_pending_fields() {
    let shared = MemoryBackend::new();
    let alice = AnnotationStore::new(shared.clone());
    let bob = AnnotationStore::new(shared.clone());

    bob.update("RV1", NoteEdit::follow_up("bob: yes"));

    alice.update("RV1", NoteEdit::discussion("alice: vendor called").with_follow_up("alice: no"));
    alice.flush().await.unwrap();

    bob.apply_remote(RemoteChange::Upserted(vec![shared.stored()["RV1"].clone()]));
    let merged = bob.get("RV1");
    assert_eq!(merged.discussion_note, "alice: vendor called");
    assert_eq!(merged.follow_up_note, "bob: yes");

    bob.flush().await.unwrap();
    let stored = &shared.stored()["RV1"];
    assert_eq!(stored.discussion_note, "alice: vendor called");
    assert_eq!(stored.follow_up_note, "bob: yes");
}

/// 再読み込みしても未保存の編集と削除は残る
#[tokio::test]
async fn test_load_all_reapplies_pending() {
    let shared = MemoryBackend::with_records(vec![
        AnnotationRecord {
            barcode: "RV1".into(),
            discussion_note: "remote".into(),
            follow_up_note: "remote".into(),
            last_updated: None,
        },
        AnnotationRecord {
            barcode: "RV2".into(),
            discussion_note: "to delete".into(),
            ..Default::default()
        },
    ]);
    let store = AnnotationStore::new(shared.clone());

    store.update("RV1", NoteEdit::discussion("local"));
    store.delete("RV2");
    let loaded = store.load_all().await.unwrap();

    assert_eq!(loaded["RV1"].discussion_note, "local");
    assert_eq!(loaded["RV1"].follow_up_note, "remote");
    assert!(!loaded.contains_key("RV2"));
    assert_eq!(store.pending_count(), 2);
}

/// 別クライアントの削除は未保存の編集があるキーを消さない
#[tokio::test]
async fn test_remote_delete_respects_pending_edit() {
    let store = AnnotationStore::new(MemoryBackend::new());
    store.apply_remote(RemoteChange::Upserted(vec![AnnotationRecord {
        barcode: "rv1".into(),
        discussion_note: "x".into(),
        ..Default::default()
    }]));
    store.apply_remote(RemoteChange::Upserted(vec![AnnotationRecord::empty("RV2")]));
    store.update("RV1", NoteEdit::follow_up("keep"));

    store.apply_remote(RemoteChange::Deleted(vec!["RV1".into(), "RV2".into()]));
    let snapshot = store.snapshot();
    assert_eq!(snapshot["RV1"].follow_up_note, "keep");
    assert!(!snapshot.contains_key("RV2"));
}

/// 購読と解除
#[tokio::test]
async fn test_subscriptions() {
    let store = AnnotationStore::new(MemoryBackend::new());
    let events = Arc::new(Mutex::new(Vec::new()));
    let all_count = Arc::new(AtomicUsize::new(0));

    let sink = Arc::clone(&events);
    let sub = store.subscribe(KeyFilter::Key("rv1".into()), move |event| {
        sink.lock().unwrap().push(event.clone());
    });
    let counter = Arc::clone(&all_count);
    let _all = store.subscribe(KeyFilter::All, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    store.update("RV1", NoteEdit::discussion("a"));
    store.update("RV2", NoteEdit::discussion("b"));
    store.delete("RV1");
    sub.unsubscribe();
    sub.unsubscribe();
    store.update("RV1", NoteEdit::discussion("c"));

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[0],
        AnnotationEvent::Updated { record, origin: EventOrigin::Local } if record.discussion_note == "a"
    ));
    assert!(matches!(
        &events[1],
        AnnotationEvent::Deleted { barcode, origin: EventOrigin::Local } if barcode == "RV1"
    ));
    assert_eq!(all_count.load(Ordering::SeqCst), 4);
}

/// 保存先の変更通知が別クライアントに届く
#[tokio::test]
async fn test_remote_listener_propagates() {
    let shared = MemoryBackend::new();
    let alice = AnnotationStore::new(shared.clone());
    let bob = Arc::new(AnnotationStore::new(shared.clone()));
    let listener = spawn_remote_listener(Arc::clone(&bob)).expect("memory backend has a change feed");

    let remote_events = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&remote_events);
    let _sub = bob.subscribe(KeyFilter::Key("RV7".into()), move |event| {
        if matches!(event, AnnotationEvent::Updated { origin: EventOrigin::Remote, .. }) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    alice.update("RV7", NoteEdit::discussion("from alice"));
    alice.flush().await.unwrap();

    let mut seen = false;
    for _ in 0..100 {
        if bob.get("RV7").discussion_note == "from alice" {
            seen = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(seen, "変更通知が届かなかった");
    assert_eq!(remote_events.load(Ordering::SeqCst), 1);
    assert!(!bob.has_unsaved_changes());

    listener.abort();
}

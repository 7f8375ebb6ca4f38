//! メモストア
//!
//! 編集はすぐにローカルのキャッシュへ反映し、保存先への書き込みは
//! `flush` でまとめて行う。保存に失敗した変更は保留のまま残り、次回の
//! `flush` で再送される。
//!
//! 保留中の編集はフィールド単位で記録する。リモートから届いた変更や
//! 再読み込みの結果は、未保存のフィールドを上書きしない。

use super::backend::{keyed, AnnotationBackend, AnnotationPatch, RemoteChange};
use super::subscription::{AnnotationEvent, EventOrigin, KeyFilter, Listeners, Subscription};
use crate::error::Result;
use chrono::Utc;
use repair_dash_common::{normalize_str, AnnotationRecord};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// メモの編集内容（`None` のフィールドは変更しない）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteEdit {
    pub discussion_note: Option<String>,
    pub follow_up_note: Option<String>,
}

impl NoteEdit {
    pub fn discussion(note: impl Into<String>) -> Self {
        Self {
            discussion_note: Some(note.into()),
            follow_up_note: None,
        }
    }

    pub fn follow_up(note: impl Into<String>) -> Self {
        Self {
            discussion_note: None,
            follow_up_note: Some(note.into()),
        }
    }

    pub fn with_follow_up(mut self, note: impl Into<String>) -> Self {
        self.follow_up_note = Some(note.into());
        self
    }
}

/// `flush` の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// 保存すべき変更がなかった
    Clean,
    /// 別の保存が進行中だった（変更は次回に持ち越し）
    Skipped,
    Persisted { upserted: usize, deleted: usize },
}

/// 未保存の編集
#[derive(Debug, Clone, Copy, Default)]
struct PendingEdit {
    discussion: bool,
    follow_up: bool,
    revision: u64,
}

impl PendingEdit {
    /// 未保存フィールドをローカル値で上書き
    fn overlay(&self, target: &mut AnnotationRecord, local: &AnnotationRecord) {
        if self.discussion {
            target.discussion_note = local.discussion_note.clone();
        }
        if self.follow_up {
            target.follow_up_note = local.follow_up_note.clone();
        }
        target.last_updated = local.last_updated;
    }
}

#[derive(Default)]
struct StoreState {
    cache: HashMap<String, AnnotationRecord>,
    edits: HashMap<String, PendingEdit>,
    deletions: HashMap<String, u64>,
    revision: u64,
}

/// 保存に送る内容のスナップショット
struct FlushPlan {
    patches: Vec<AnnotationPatch>,
    patch_revisions: Vec<(String, u64)>,
    deletions: Vec<(String, u64)>,
}

impl StoreState {
    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    fn plan(&self) -> FlushPlan {
        let now = Utc::now();
        let mut patches = Vec::with_capacity(self.edits.len());
        let mut patch_revisions = Vec::with_capacity(self.edits.len());

        for (key, edit) in &self.edits {
            let record = self
                .cache
                .get(key)
                .cloned()
                .unwrap_or_else(|| AnnotationRecord::empty(key.clone()));
            patches.push(AnnotationPatch {
                barcode: key.clone(),
                discussion_note: edit.discussion.then(|| record.discussion_note.clone()),
                follow_up_note: edit.follow_up.then(|| record.follow_up_note.clone()),
                last_updated: record.last_updated.unwrap_or(now),
            });
            patch_revisions.push((key.clone(), edit.revision));
        }

        let deletions = self
            .deletions
            .iter()
            .map(|(key, rev)| (key.clone(), *rev))
            .collect();

        FlushPlan {
            patches,
            patch_revisions,
            deletions,
        }
    }

    /// 保存済みの編集を外す（送信後に再編集されたものは残す）
    fn settle_edits(&mut self, revisions: &[(String, u64)]) {
        for (key, rev) in revisions {
            if self.edits.get(key).is_some_and(|e| e.revision == *rev) {
                self.edits.remove(key);
            }
        }
    }

    fn settle_deletions(&mut self, revisions: &[(String, u64)]) {
        for (key, rev) in revisions {
            if self.deletions.get(key) == Some(rev) {
                self.deletions.remove(key);
            }
        }
    }

    /// 読み込み結果でキャッシュを置き換え、未保存の変更を載せ直す
    fn replace_cache(&mut self, mut fresh: HashMap<String, AnnotationRecord>) {
        for (key, edit) in &self.edits {
            let target = fresh
                .entry(key.clone())
                .or_insert_with(|| AnnotationRecord::empty(key.clone()));
            if let Some(local) = self.cache.get(key) {
                edit.overlay(target, local);
            }
        }
        for key in self.deletions.keys() {
            fresh.remove(key);
        }
        self.cache = fresh;
    }
}

/// フラグを戻し忘れないためのガード
struct FlushGuard<'a>(&'a AtomicBool);

impl<'a> FlushGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// バーコード単位のメモを保持するストア
pub struct AnnotationStore<B: AnnotationBackend> {
    backend: B,
    state: Mutex<StoreState>,
    flushing: AtomicBool,
    listeners: Listeners,
}

impl<B: AnnotationBackend> AnnotationStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: Mutex::new(StoreState::default()),
            flushing: AtomicBool::new(false),
            listeners: Listeners::default(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 保存先から全件読み込み
    ///
    /// 保存先が未作成なら空で始める。未保存の編集は読み込み結果より優先する。
    pub async fn load_all(&self) -> Result<HashMap<String, AnnotationRecord>> {
        let loaded = match self.backend.load_all().await {
            Ok(records) => records,
            Err(e) if e.is_not_found() => {
                info!(backend = %self.backend.describe(), "メモの保存先が未作成のため空で開始します");
                HashMap::new()
            }
            Err(e) => {
                warn!(backend = %self.backend.describe(), error = %e, "メモの読み込みに失敗しました");
                return Err(e);
            }
        };

        let snapshot = {
            let mut state = self.lock();
            state.replace_cache(keyed(loaded.into_values()));
            state.cache.clone()
        };
        info!(count = snapshot.len(), "メモを読み込みました");
        self.listeners.notify(&AnnotationEvent::Reloaded);
        Ok(snapshot)
    }

    /// メモを取得（未登録なら空のレコード）
    pub fn get(&self, barcode: &str) -> AnnotationRecord {
        let key = normalize_str(barcode);
        self.lock()
            .cache
            .get(&key)
            .cloned()
            .unwrap_or_else(|| AnnotationRecord::empty(key))
    }

    /// 現在の全メモ
    pub fn snapshot(&self) -> HashMap<String, AnnotationRecord> {
        self.lock().cache.clone()
    }

    /// メモを編集（ローカルに即時反映、保存は `flush` で）
    pub fn update(&self, barcode: &str, edit: NoteEdit) -> AnnotationRecord {
        let key = normalize_str(barcode);
        if key.is_empty() {
            warn!(barcode, "空のバーコードにはメモを付けられません");
            return AnnotationRecord::empty(key);
        }

        let record = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let revision = state.next_revision();

            // 削除待ちのキーは空から作り直し、両フィールドを送る
            let recreated = state.deletions.remove(&key).is_some();
            if recreated {
                state.cache.remove(&key);
            }

            let record = state
                .cache
                .entry(key.clone())
                .or_insert_with(|| AnnotationRecord::empty(key.clone()));
            if let Some(note) = &edit.discussion_note {
                record.discussion_note = note.clone();
            }
            if let Some(note) = &edit.follow_up_note {
                record.follow_up_note = note.clone();
            }
            record.last_updated = Some(Utc::now());
            let record = record.clone();

            let pending = state.edits.entry(key.clone()).or_default();
            pending.discussion |= recreated || edit.discussion_note.is_some();
            pending.follow_up |= recreated || edit.follow_up_note.is_some();
            pending.revision = revision;
            record
        };

        debug!(barcode = %record.barcode, "メモを更新しました");
        self.listeners.notify(&AnnotationEvent::Updated {
            record: record.clone(),
            origin: EventOrigin::Local,
        });
        record
    }

    /// メモを削除（保存は `flush` で）
    pub fn delete(&self, barcode: &str) {
        let key = normalize_str(barcode);
        if key.is_empty() {
            return;
        }

        {
            let mut state = self.lock();
            let revision = state.next_revision();
            state.cache.remove(&key);
            state.edits.remove(&key);
            state.deletions.insert(key.clone(), revision);
        }

        debug!(barcode = %key, "メモを削除しました");
        self.listeners.notify(&AnnotationEvent::Deleted {
            barcode: key,
            origin: EventOrigin::Local,
        });
    }

    /// 未保存の変更数
    pub fn pending_count(&self) -> usize {
        let state = self.lock();
        state.edits.len() + state.deletions.len()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.pending_count() > 0
    }

    /// 未保存の変更を保存先に書き込む
    ///
    /// 別の `flush` が進行中なら何もせず `Skipped` を返す。
    /// 失敗した場合、変更はすべて保留のまま残る。
    pub async fn flush(&self) -> Result<FlushOutcome> {
        let Some(_guard) = FlushGuard::acquire(&self.flushing) else {
            debug!("保存中のため今回の保存はスキップします");
            return Ok(FlushOutcome::Skipped);
        };

        let plan = self.lock().plan();
        if plan.patches.is_empty() && plan.deletions.is_empty() {
            return Ok(FlushOutcome::Clean);
        }

        if !plan.patches.is_empty() {
            if let Err(e) = self.backend.upsert(&plan.patches).await {
                warn!(
                    backend = %self.backend.describe(),
                    pending = plan.patches.len(),
                    error = %e,
                    "メモの保存に失敗しました。変更は保留のままです"
                );
                return Err(e);
            }
            self.lock().settle_edits(&plan.patch_revisions);
        }

        if !plan.deletions.is_empty() {
            let keys: Vec<String> = plan.deletions.iter().map(|(key, _)| key.clone()).collect();
            if let Err(e) = self.backend.delete(&keys).await {
                warn!(
                    backend = %self.backend.describe(),
                    pending = keys.len(),
                    error = %e,
                    "メモの削除に失敗しました。削除は保留のままです"
                );
                return Err(e);
            }
            self.lock().settle_deletions(&plan.deletions);
        }

        info!(
            upserted = plan.patches.len(),
            deleted = plan.deletions.len(),
            "メモを保存しました"
        );
        Ok(FlushOutcome::Persisted {
            upserted: plan.patches.len(),
            deleted: plan.deletions.len(),
        })
    }

    /// 他クライアントの変更を取り込む
    ///
    /// 未保存のフィールドと削除待ちのキーはローカルを優先する。
    pub fn apply_remote(&self, change: RemoteChange) {
        let events = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let mut events = Vec::new();

            match change {
                RemoteChange::Upserted(records) => {
                    for mut remote in records {
                        let key = normalize_str(&remote.barcode);
                        if key.is_empty() || state.deletions.contains_key(&key) {
                            continue;
                        }
                        remote.barcode = key.clone();
                        if let (Some(edit), Some(local)) = (state.edits.get(&key), state.cache.get(&key)) {
                            edit.overlay(&mut remote, local);
                        }
                        if state.cache.get(&key) == Some(&remote) {
                            continue;
                        }
                        state.cache.insert(key, remote.clone());
                        events.push(AnnotationEvent::Updated {
                            record: remote,
                            origin: EventOrigin::Remote,
                        });
                    }
                }
                RemoteChange::Deleted(keys) => {
                    for key in keys.iter().map(|k| normalize_str(k)) {
                        if state.edits.contains_key(&key) {
                            continue;
                        }
                        if state.cache.remove(&key).is_some() {
                            events.push(AnnotationEvent::Deleted {
                                barcode: key,
                                origin: EventOrigin::Remote,
                            });
                        }
                    }
                }
            }
            events
        };

        for event in &events {
            self.listeners.notify(event);
        }
    }

    /// 変更を購読（`KeyFilter::Key` のバーコードは正規化される）
    pub fn subscribe(
        &self,
        filter: KeyFilter,
        callback: impl Fn(&AnnotationEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let filter = match filter {
            KeyFilter::Key(key) => KeyFilter::Key(normalize_str(&key)),
            KeyFilter::All => KeyFilter::All,
        };
        self.listeners.subscribe(filter, callback)
    }
}

//! ダッシュボードのセッション
//!
//! 入力（チケット・レポート・対応表）が変わったら突合からやり直し、
//! メモだけが変わったときは重ね合わせだけをやり直す。

use crate::annotations::{AnnotationBackend, AnnotationStore, KeyFilter, NoteEdit, Subscription};
use chrono::NaiveDateTime;
use repair_dash_common::{
    apply_view, normalize_str, project, reconcile, reconcile_at, AnnotationRecord, CategoryMapping,
    CategoryMappingEntry, DisplayRecord, ReportRecord, Reconciliation, TicketRecord, UpsertOutcome,
    ViewQuery,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// 件数の集計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    pub records: usize,
    pub matched: usize,
    pub unmatched_categories: usize,
    pub duplicate_ticket_keys: usize,
    /// メモの付いた行
    pub annotated: usize,
    /// 突合結果に対応する行のないメモ
    pub stale_annotations: usize,
    pub pending_saves: usize,
}

pub struct Dashboard<B: AnnotationBackend> {
    tickets: Arc<[TicketRecord]>,
    reports: Arc<[ReportRecord]>,
    mapping: CategoryMapping,
    store: Arc<AnnotationStore<B>>,
    /// 経過日数の基準時刻（None なら現在時刻）
    now: Option<NaiveDateTime>,

    base: Option<Arc<Reconciliation>>,
    projection: Option<Arc<[DisplayRecord]>>,
    notes_changed: Arc<AtomicBool>,
    _notes_subscription: Subscription,
}

impl<B: AnnotationBackend> Dashboard<B> {
    pub fn new(store: Arc<AnnotationStore<B>>) -> Self {
        let notes_changed = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&notes_changed);
        let subscription = store.subscribe(KeyFilter::All, move |_| {
            flag.store(true, Ordering::Release);
        });

        Self {
            tickets: Arc::from(Vec::new()),
            reports: Arc::from(Vec::new()),
            mapping: CategoryMapping::default(),
            store,
            now: None,
            base: None,
            projection: None,
            notes_changed,
            _notes_subscription: subscription,
        }
    }

    /// 基準時刻を固定
    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = Some(now);
        self.invalidate_base();
        self
    }

    pub fn store(&self) -> &Arc<AnnotationStore<B>> {
        &self.store
    }

    pub fn mapping(&self) -> &CategoryMapping {
        &self.mapping
    }

    pub fn set_tickets(&mut self, tickets: impl Into<Arc<[TicketRecord]>>) {
        self.tickets = tickets.into();
        self.invalidate_base();
    }

    pub fn set_reports(&mut self, reports: impl Into<Arc<[ReportRecord]>>) {
        self.reports = reports.into();
        self.invalidate_base();
    }

    pub fn set_mapping(&mut self, mapping: CategoryMapping) {
        self.mapping = mapping;
        self.invalidate_base();
    }

    pub fn upsert_mapping(&mut self, entry: CategoryMappingEntry) -> UpsertOutcome {
        let outcome = self.mapping.upsert(entry);
        self.invalidate_base();
        outcome
    }

    pub fn remove_mapping(&mut self, category: &str) -> bool {
        let removed = self.mapping.remove(category);
        if removed {
            self.invalidate_base();
        }
        removed
    }

    /// メモを編集（重ね合わせは購読経由で再計算される）
    pub fn edit_note(&self, barcode: &str, edit: NoteEdit) -> AnnotationRecord {
        self.store.update(barcode, edit)
    }

    fn invalidate_base(&mut self) {
        self.base = None;
        self.projection = None;
    }

    /// 突合結果（メモなし）
    pub fn base(&mut self) -> Arc<Reconciliation> {
        if let Some(base) = &self.base {
            return Arc::clone(base);
        }

        let result = match self.now {
            Some(now) => reconcile_at(&self.tickets, &self.reports, &self.mapping, now),
            None => reconcile(&self.tickets, &self.reports, &self.mapping),
        };
        debug!(
            records = result.records.len(),
            matched = result.matched_count(),
            "突合をやり直しました"
        );

        let base = Arc::new(result);
        self.base = Some(Arc::clone(&base));
        base
    }

    /// メモを重ねた表示行
    pub fn rows(&mut self) -> Arc<[DisplayRecord]> {
        let base = self.base();
        let notes_changed = self.notes_changed.swap(false, Ordering::AcqRel);

        match &self.projection {
            Some(rows) if !notes_changed => Arc::clone(rows),
            _ => {
                let rows: Arc<[DisplayRecord]> = project(&base.records, &self.store.snapshot()).into();
                self.projection = Some(Arc::clone(&rows));
                rows
            }
        }
    }

    /// 検索・絞り込み・並べ替えを適用した表示行
    pub fn view(&mut self, query: &ViewQuery) -> Vec<DisplayRecord> {
        apply_view(&self.rows(), query)
    }

    /// 担当者が割り当てられていないカテゴリ
    pub fn unmatched_categories(&mut self) -> Vec<String> {
        self.base().unmatched_categories.clone()
    }

    /// 現在の突合結果に行のないメモ（削除はしない）
    pub fn stale_annotations(&mut self) -> Vec<AnnotationRecord> {
        let base = self.base();
        let keys: HashSet<String> = base
            .records
            .iter()
            .map(|r| normalize_str(&r.barcode))
            .collect();

        let mut stale: Vec<AnnotationRecord> = self
            .store
            .snapshot()
            .into_values()
            .filter(|note| !keys.contains(&note.barcode))
            .collect();
        stale.sort_by(|a, b| a.barcode.cmp(&b.barcode));
        stale
    }

    pub fn summary(&mut self) -> DashboardSummary {
        let base = self.base();
        let rows = self.rows();
        DashboardSummary {
            records: base.records.len(),
            matched: base.matched_count(),
            unmatched_categories: base.unmatched_categories.len(),
            duplicate_ticket_keys: base.duplicate_ticket_keys,
            annotated: rows
                .iter()
                .filter(|r| !r.discussion_note.is_empty() || !r.follow_up_note.is_empty())
                .count(),
            stale_annotations: self.stale_annotations().len(),
            pending_saves: self.store.pending_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{MemoryBackend, RemoteChange};
    use chrono::NaiveDate;
    use repair_dash_common::MatchFilter;

    fn clock() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 11)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn dashboard() -> Dashboard<MemoryBackend> {
        let store = Arc::new(AnnotationStore::new(MemoryBackend::new()));
        let mut dash = Dashboard::new(store).with_now(clock());
        dash.set_tickets(vec![TicketRecord {
            barcode: "rv1".into(),
            location: "Atlanta".into(),
            ..Default::default()
        }]);
        dash.set_reports(vec![
            ReportRecord {
                barcode: "RV1".into(),
                category: "ELEC".into(),
                ..Default::default()
            },
            ReportRecord {
                barcode: "RV2".into(),
                category: "MECH".into(),
                ..Default::default()
            },
        ]);
        dash
    }

    fn entry(category: &str, owner: &str) -> CategoryMappingEntry {
        CategoryMappingEntry {
            category: category.into(),
            owner: owner.into(),
            department: String::new(),
            category_text: String::new(),
        }
    }

    #[test]
    fn test_base_is_cached_until_inputs_change() {
        let mut dash = dashboard();
        let first = dash.base();
        assert!(Arc::ptr_eq(&first, &dash.base()));

        dash.upsert_mapping(entry("ELEC", "Jane"));
        let second = dash.base();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.records[0].assigned_owner, "Jane");
        assert_eq!(dash.unmatched_categories(), vec!["MECH".to_string()]);
    }

    #[test]
    fn test_note_edit_reprojects_without_reconciling() {
        let mut dash = dashboard();
        let base = dash.base();
        let rows = dash.rows();
        assert!(Arc::ptr_eq(&rows, &dash.rows()));

        dash.edit_note("rv2", NoteEdit::discussion("waiting on part"));
        let rows = dash.rows();
        assert!(Arc::ptr_eq(&base, &dash.base()));
        assert_eq!(rows[1].discussion_note, "waiting on part");
        assert_eq!(rows[0].discussion_note, "");
    }

    #[test]
    fn test_remote_change_reprojects() {
        let mut dash = dashboard();
        dash.rows();
        dash.store().apply_remote(RemoteChange::Upserted(vec![AnnotationRecord {
            barcode: "RV1".into(),
            follow_up_note: "yes".into(),
            ..Default::default()
        }]));
        assert_eq!(dash.rows()[0].follow_up_note, "yes");
    }

    #[test]
    fn test_stale_annotations_and_summary() {
        let mut dash = dashboard();
        dash.edit_note("RV1", NoteEdit::discussion("ok"));
        dash.edit_note("GONE", NoteEdit::discussion("old"));

        let stale = dash.stale_annotations();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].barcode, "GONE");

        let summary = dash.summary();
        assert_eq!(summary.records, 2);
        assert_eq!(summary.matched, 1);
        assert_eq!(summary.unmatched_categories, 2);
        assert_eq!(summary.annotated, 1);
        assert_eq!(summary.stale_annotations, 1);
        assert_eq!(summary.pending_saves, 2);
    }

    #[test]
    fn test_view_uses_projection() {
        let mut dash = dashboard();
        dash.edit_note("RV2", NoteEdit::discussion("vendor quote"));
        let rows = dash.view(&ViewQuery::default().search("QUOTE"));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].barcode, "RV2");

        let rows = dash.view(&ViewQuery::default().matched(MatchFilter::Matched));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].barcode, "RV1");
    }
}

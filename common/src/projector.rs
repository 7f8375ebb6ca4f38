//! メモの重ね合わせ
//!
//! 突合結果（ベース）にメモのスナップショットを重ねて表示用レコードを作る。
//! どちらかの入力が変わったら丸ごと再計算する。

use crate::normalize::normalize_str;
use crate::types::{AnnotationRecord, DisplayRecord, MergedRecord};
use std::collections::HashMap;

/// ベースにメモを重ねる（入力は変更しない）
pub fn project(
    base: &[MergedRecord],
    overlay: &HashMap<String, AnnotationRecord>,
) -> Vec<DisplayRecord> {
    base.iter()
        .map(|record| {
            let note = overlay.get(&normalize_str(&record.barcode));
            let mut record = record.clone();
            record.discussion_note = note.map(|n| n.discussion_note.clone()).unwrap_or_default();
            record.follow_up_note = note.map(|n| n.follow_up_note.clone()).unwrap_or_default();

            DisplayRecord {
                record,
                last_updated: note.and_then(|n| n.last_updated),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn base(barcode: &str) -> MergedRecord {
        MergedRecord {
            barcode: barcode.to_string(),
            ..Default::default()
        }
    }

    fn note(barcode: &str, discussion: &str, follow_up: &str) -> (String, AnnotationRecord) {
        (
            barcode.to_string(),
            AnnotationRecord {
                barcode: barcode.to_string(),
                discussion_note: discussion.to_string(),
                follow_up_note: follow_up.to_string(),
                last_updated: Some(Utc::now()),
            },
        )
    }

    #[test]
    fn test_project_applies_notes_by_normalized_key() {
        let records = vec![base(" rv1"), base("RV2")];
        let overlay: HashMap<_, _> = [note("RV1", "話し合い", "要確認")].into_iter().collect();

        let rows = project(&records, &overlay);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].discussion_note, "話し合い");
        assert_eq!(rows[0].follow_up_note, "要確認");
        assert!(rows[0].last_updated.is_some());
        assert_eq!(rows[1].discussion_note, "");
        assert!(rows[1].last_updated.is_none());
    }

    #[test]
    fn test_project_blanks_stale_base_notes() {
        let mut record = base("RV1");
        record.discussion_note = "古い値".into();
        let rows = project(&[record], &HashMap::new());
        assert_eq!(rows[0].discussion_note, "");
    }

    #[test]
    fn test_project_is_pure() {
        let records = vec![base("RV1"), base("RV3")];
        let overlay: HashMap<_, _> = [note("RV1", "a", "b"), note("RV9", "stale", "")]
            .into_iter()
            .collect();
        let records_before = records.clone();
        let overlay_before = overlay.clone();

        let first = project(&records, &overlay);
        let second = project(&records, &overlay);

        assert_eq!(first, second);
        assert_eq!(records, records_before);
        assert_eq!(overlay, overlay_before);
    }
}

//! Repair Dash Common Library
//!
//! チケット一覧と修理レポートの突合・担当者付与・メモ重ね合わせの中核。
//! CLIと各フロントエンドで共有される純粋な型と関数。

pub mod types;
pub mod error;
pub mod normalize;
pub mod derive;
pub mod mapping;
pub mod reconcile;
pub mod projector;
pub mod columns;
pub mod csv;
pub mod view;
pub mod export;

pub use types::{
    AnnotationRecord, CategoryMappingEntry, DisplayRecord, MergedRecord, RawRow, ReportRecord,
    TicketRecord,
};
pub use error::{Error, Result};
pub use normalize::{normalize, normalize_str};
pub use derive::{age_in_days, age_in_days_at, canonical_ticket_number, format_for_display};
pub use mapping::{CategoryMapping, UpsertOutcome};
pub use reconcile::{reconcile, reconcile_at, reconcile_entries, Reconciliation};
pub use projector::project;
pub use columns::Column;
pub use view::{apply_view, MatchFilter, SortDirection, ViewQuery};

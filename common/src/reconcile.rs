//! 突合ロジック
//!
//! 修理レポート（左側）をチケット一覧と正規化バーコードで左結合し、
//! カテゴリ対応表で担当者を付与する。入力順 = 出力順。

use crate::derive::{age_in_days_at, canonical_ticket_number};
use crate::mapping::CategoryMapping;
use crate::normalize::normalize_str;
use crate::types::{CategoryMappingEntry, MergedRecord, ReportRecord, TicketRecord};
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// 突合結果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    /// レポート1行につき1件（入力順）
    pub records: Vec<MergedRecord>,
    /// 担当者未割当のカテゴリ（昇順・重複なし）
    pub unmatched_categories: Vec<String>,
    /// チケット側で重複し上書きされたキーの数
    pub duplicate_ticket_keys: usize,
}

impl Reconciliation {
    pub fn matched_count(&self) -> usize {
        self.records.iter().filter(|r| r.ticket_matched).count()
    }
}

/// 現在時刻で突合
pub fn reconcile(
    tickets: &[TicketRecord],
    reports: &[ReportRecord],
    mapping: &CategoryMapping,
) -> Reconciliation {
    reconcile_at(tickets, reports, mapping, Local::now().naive_local())
}

/// エントリ配列から対応表を組み立てて突合
pub fn reconcile_entries(
    tickets: &[TicketRecord],
    reports: &[ReportRecord],
    entries: &[CategoryMappingEntry],
) -> Reconciliation {
    reconcile(tickets, reports, &CategoryMapping::new(entries.to_vec()))
}

/// 指定時刻で突合（経過日数の基準時刻を固定できる）
pub fn reconcile_at(
    tickets: &[TicketRecord],
    reports: &[ReportRecord],
    mapping: &CategoryMapping,
    now: NaiveDateTime,
) -> Reconciliation {
    let (ticket_index, duplicate_ticket_keys) = build_ticket_index(tickets);
    if duplicate_ticket_keys > 0 {
        tracing::debug!(duplicates = duplicate_ticket_keys, "チケットのバーコード重複（後勝ち）");
    }

    let mut unmatched = BTreeSet::new();

    let records = reports
        .iter()
        .map(|report| {
            let key = normalize_str(&report.barcode);
            let ticket = ticket_index.get(key.as_str()).copied();

            let category = report.category.trim();
            let entry = mapping.lookup(category);
            let assigned_owner = entry.map_or("", |e| e.owner.as_str());

            if !category.is_empty() && assigned_owner.is_empty() {
                unmatched.insert(category.to_string());
            }

            merge_record(report, ticket, category, entry, now)
        })
        .collect();

    Reconciliation {
        records,
        unmatched_categories: unmatched.into_iter().collect(),
        duplicate_ticket_keys,
    }
}

/// 正規化バーコード → チケット（空キーは除外、後勝ち）
fn build_ticket_index(tickets: &[TicketRecord]) -> (HashMap<String, &TicketRecord>, usize) {
    let mut index = HashMap::with_capacity(tickets.len());
    let mut duplicates = 0;

    for ticket in tickets {
        let key = normalize_str(&ticket.barcode);
        if key.is_empty() {
            continue;
        }
        if index.insert(key, ticket).is_some() {
            duplicates += 1;
        }
    }

    (index, duplicates)
}

/// 最初の空でない値
fn first_non_empty<'a>(values: &[&'a str]) -> &'a str {
    values.iter().copied().find(|v| !v.is_empty()).unwrap_or("")
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() {
        default
    } else {
        value
    }
}

fn merge_record(
    report: &ReportRecord,
    ticket: Option<&TicketRecord>,
    category: &str,
    entry: Option<&CategoryMappingEntry>,
    now: NaiveDateTime,
) -> MergedRecord {
    let from_ticket = |f: fn(&TicketRecord) -> &str| ticket.map_or("", f);

    MergedRecord {
        barcode: report.barcode.clone(),
        repair_ticket: canonical_ticket_number(&report.ticket),
        equipment: format!("({}) - {}", report.equipment, report.description),
        location: first_non_empty(&[&report.repair_location, from_ticket(|t| t.location.as_str())]).to_string(),
        customer: first_non_empty(&[&report.customer, from_ticket(|t| t.customer.as_str())]).to_string(),
        customer_title: report.customer_title.clone(),
        category: category.to_string(),
        assigned_owner: entry.map(|e| e.owner.clone()).unwrap_or_default(),
        owner_department: entry.map(|e| e.department.clone()).unwrap_or_default(),
        category_text: entry.map(|e| e.category_text.clone()).unwrap_or_default(),
        damage_description: report.notes.clone(),
        ticket_description: from_ticket(|t| t.notes.as_str()).to_string(),
        repair_reason: report.repair_reason.clone(),
        repair_vendor: report.repair_vendor.clone(),
        last_order: first_non_empty(&[&report.last_order, from_ticket(|t| t.order_to_bill.as_str())]).to_string(),
        reference: report.reference.clone(),
        department: report.department.clone(),
        repair_cost: or_default(&report.repair_cost, "0").to_string(),
        repair_price: or_default(&report.repair_price, "0").to_string(),
        date_in: first_non_empty(&[&report.date_in, from_ticket(|t| t.creation_date.as_str())]).to_string(),
        asset_repair_age: age_in_days_at(&report.date_in, now),
        // Billable だけはチケット側を優先
        billable: first_non_empty(&[from_ticket(|t| t.billable.as_str()), &report.billable]).to_string(),
        created_by: first_non_empty(&[from_ticket(|t| t.created_by.as_str()), &report.user_in]).to_string(),
        discussion_note: String::new(),
        follow_up_note: String::new(),
        ticket_matched: ticket.is_some(),
    }
}

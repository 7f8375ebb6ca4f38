//! データ型定義
//!
//! CLIと各フロントエンドで共有される型:
//! - TicketRecord: チケット一覧の1行
//! - ReportRecord: 修理レポートの1行
//! - CategoryMappingEntry: カテゴリ→担当者の対応表エントリ
//! - MergedRecord: 突合結果（ReportRecord 1行につき1件）
//! - AnnotationRecord: バーコード単位のメモ
//! - DisplayRecord: MergedRecord + メモ（表示・出力用）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Deref;

/// スプレッドシートの1行（ヘッダー名 → セル値）
pub type RawRow = BTreeMap<String, String>;

fn take(row: &mut RawRow, key: &str) -> String {
    row.remove(key).unwrap_or_default()
}

/// チケット一覧の1行
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TicketRecord {
    pub barcode: String,
    pub location: String,
    pub customer: String,
    pub notes: String,
    pub creation_date: String,
    pub order_to_bill: String,
    pub billable: String,
    pub created_by: String,

    /// 未知の列（そのまま保持）
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl TicketRecord {
    /// 生の行から変換（既知の列以外は extra に残る）
    pub fn from_row(mut row: RawRow) -> Self {
        Self {
            barcode: take(&mut row, "Barcode"),
            location: take(&mut row, "Location"),
            customer: take(&mut row, "Customer"),
            notes: take(&mut row, "Notes"),
            creation_date: take(&mut row, "CreationDate"),
            order_to_bill: take(&mut row, "OrderToBill"),
            billable: take(&mut row, "Billable"),
            created_by: take(&mut row, "CreatedBy"),
            extra: row,
        }
    }
}

/// 修理レポートの1行
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ReportRecord {
    #[serde(rename = "Barcode#")]
    pub barcode: String,
    pub ticket: String,
    pub equipment: String,
    pub description: String,
    pub notes: String,
    pub repair_reason: String,
    pub date_in: String,
    pub category: String,
    pub customer: String,
    pub repair_cost: String,
    pub repair_price: String,
    pub repair_vendor: String,
    #[serde(rename = "LastOrder#")]
    pub last_order: String,
    #[serde(rename = "Reference#")]
    pub reference: String,
    pub department: String,
    pub billable: String,
    pub user_in: String,
    pub customer_title: String,
    pub repair_location: String,

    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl ReportRecord {
    pub fn from_row(mut row: RawRow) -> Self {
        Self {
            barcode: take(&mut row, "Barcode#"),
            ticket: take(&mut row, "Ticket"),
            equipment: take(&mut row, "Equipment"),
            description: take(&mut row, "Description"),
            notes: take(&mut row, "Notes"),
            repair_reason: take(&mut row, "RepairReason"),
            date_in: take(&mut row, "DateIn"),
            category: take(&mut row, "Category"),
            customer: take(&mut row, "Customer"),
            repair_cost: take(&mut row, "RepairCost"),
            repair_price: take(&mut row, "RepairPrice"),
            repair_vendor: take(&mut row, "RepairVendor"),
            last_order: take(&mut row, "LastOrder#"),
            reference: take(&mut row, "Reference#"),
            department: take(&mut row, "Department"),
            billable: take(&mut row, "Billable"),
            user_in: take(&mut row, "UserIn"),
            customer_title: take(&mut row, "CustomerTitle"),
            repair_location: take(&mut row, "RepairLocation"),
            extra: row,
        }
    }
}

/// カテゴリ対応表のエントリ
///
/// 外部JSONのフィールド名は `category`, `pm`, `department`, `category_text`。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryMappingEntry {
    pub category: String,
    #[serde(rename = "pm", alias = "owner")]
    pub owner: String,
    pub department: String,
    #[serde(rename = "category_text", alias = "categoryText")]
    pub category_text: String,
}

/// 突合結果（派生データ。保存はしない）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergedRecord {
    #[serde(rename = "Barcode#")]
    pub barcode: String,
    #[serde(rename = "RepairTicket")]
    pub repair_ticket: String,
    #[serde(rename = "Equipment")]
    pub equipment: String,
    #[serde(rename = "Location")]
    pub location: String,
    #[serde(rename = "Customer")]
    pub customer: String,
    #[serde(rename = "CustomerTitle")]
    pub customer_title: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "AssignedOwner")]
    pub assigned_owner: String,
    #[serde(rename = "OwnerDepartment")]
    pub owner_department: String,
    #[serde(rename = "CategoryText")]
    pub category_text: String,
    #[serde(rename = "DamageDescription")]
    pub damage_description: String,
    #[serde(rename = "TicketDescription")]
    pub ticket_description: String,
    #[serde(rename = "RepairReason")]
    pub repair_reason: String,
    #[serde(rename = "RepairVendor")]
    pub repair_vendor: String,
    #[serde(rename = "LastOrder#")]
    pub last_order: String,
    #[serde(rename = "Reference#")]
    pub reference: String,
    #[serde(rename = "Department")]
    pub department: String,
    #[serde(rename = "RepairCost")]
    pub repair_cost: String,
    #[serde(rename = "RepairPrice")]
    pub repair_price: String,
    #[serde(rename = "DateIn")]
    pub date_in: String,
    /// 入庫からの経過日数（日付が読めない場合は None → ""）
    #[serde(rename = "AssetRepairAge", with = "age_field")]
    pub asset_repair_age: Option<u64>,
    #[serde(rename = "Billable")]
    pub billable: String,
    #[serde(rename = "CreatedBy")]
    pub created_by: String,
    #[serde(rename = "discussionNote")]
    pub discussion_note: String,
    #[serde(rename = "followUpNote")]
    pub follow_up_note: String,
    #[serde(rename = "_ticketMatched")]
    pub ticket_matched: bool,
}

/// バーコード単位のメモ（ユーザーが書いた唯一の永続データ）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnnotationRecord {
    /// 正規化済みバーコード
    pub barcode: String,
    pub discussion_note: String,
    pub follow_up_note: String,
    /// 空のシェルでは None
    pub last_updated: Option<DateTime<Utc>>,
}

impl AnnotationRecord {
    /// 未登録キー用の空レコード
    pub fn empty(barcode: impl Into<String>) -> Self {
        Self {
            barcode: barcode.into(),
            ..Default::default()
        }
    }

    pub fn is_blank(&self) -> bool {
        self.discussion_note.is_empty() && self.follow_up_note.is_empty()
    }
}

/// 表示用レコード（MergedRecord + メモ）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayRecord {
    #[serde(flatten)]
    pub record: MergedRecord,
    #[serde(rename = "lastUpdated", default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Deref for DisplayRecord {
    type Target = MergedRecord;

    fn deref(&self) -> &MergedRecord {
        &self.record
    }
}

/// AssetRepairAge のシリアライズ: 数値または空文字
mod age_field {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(days) => serializer.serialize_u64(*days),
            None => serializer.serialize_str(""),
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(days) => Some(days),
            Raw::Text(text) => text.trim().parse().ok(),
        })
    }
}

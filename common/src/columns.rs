//! 表示列の定義
//!
//! CSV/Excel出力と検索・並べ替えで共通に使う列の一覧。

use crate::types::DisplayRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Column {
    Barcode,
    RepairTicket,
    Equipment,
    Location,
    Customer,
    CustomerTitle,
    Category,
    AssignedOwner,
    OwnerDepartment,
    CategoryText,
    DamageDescription,
    TicketDescription,
    RepairReason,
    RepairVendor,
    LastOrder,
    Reference,
    Department,
    RepairCost,
    RepairPrice,
    DateIn,
    AssetRepairAge,
    Billable,
    CreatedBy,
    DiscussionNote,
    FollowUpNote,
    LastUpdated,
    TicketMatched,
}

impl Column {
    pub const ALL: &'static [Column] = &[
        Column::Barcode,
        Column::RepairTicket,
        Column::Equipment,
        Column::Location,
        Column::Customer,
        Column::CustomerTitle,
        Column::Category,
        Column::AssignedOwner,
        Column::OwnerDepartment,
        Column::CategoryText,
        Column::DamageDescription,
        Column::TicketDescription,
        Column::RepairReason,
        Column::RepairVendor,
        Column::LastOrder,
        Column::Reference,
        Column::Department,
        Column::RepairCost,
        Column::RepairPrice,
        Column::DateIn,
        Column::AssetRepairAge,
        Column::Billable,
        Column::CreatedBy,
        Column::DiscussionNote,
        Column::FollowUpNote,
        Column::LastUpdated,
        Column::TicketMatched,
    ];

    /// 画面の初期表示列
    pub const DEFAULT_SET: &'static [Column] = &[
        Column::Barcode,
        Column::RepairTicket,
        Column::Equipment,
        Column::Location,
        Column::Customer,
        Column::Category,
        Column::AssignedOwner,
        Column::DamageDescription,
        Column::RepairCost,
        Column::RepairPrice,
        Column::DateIn,
        Column::AssetRepairAge,
        Column::Billable,
        Column::DiscussionNote,
        Column::FollowUpNote,
    ];

    /// ヘッダー名（JSONのキーと同じ）
    pub fn header(self) -> &'static str {
        match self {
            Column::Barcode => "Barcode#",
            Column::RepairTicket => "RepairTicket",
            Column::Equipment => "Equipment",
            Column::Location => "Location",
            Column::Customer => "Customer",
            Column::CustomerTitle => "CustomerTitle",
            Column::Category => "Category",
            Column::AssignedOwner => "AssignedOwner",
            Column::OwnerDepartment => "OwnerDepartment",
            Column::CategoryText => "CategoryText",
            Column::DamageDescription => "DamageDescription",
            Column::TicketDescription => "TicketDescription",
            Column::RepairReason => "RepairReason",
            Column::RepairVendor => "RepairVendor",
            Column::LastOrder => "LastOrder#",
            Column::Reference => "Reference#",
            Column::Department => "Department",
            Column::RepairCost => "RepairCost",
            Column::RepairPrice => "RepairPrice",
            Column::DateIn => "DateIn",
            Column::AssetRepairAge => "AssetRepairAge",
            Column::Billable => "Billable",
            Column::CreatedBy => "CreatedBy",
            Column::DiscussionNote => "discussionNote",
            Column::FollowUpNote => "followUpNote",
            Column::LastUpdated => "lastUpdated",
            Column::TicketMatched => "_ticketMatched",
        }
    }

    /// ヘッダー名から列を取得（大文字小文字・前後空白を無視）
    pub fn from_header(name: &str) -> Option<Column> {
        let name = name.trim();
        Column::ALL
            .iter()
            .copied()
            .find(|c| c.header().eq_ignore_ascii_case(name))
    }

    /// 数値として比較する列
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Column::RepairTicket | Column::RepairCost | Column::RepairPrice | Column::AssetRepairAge
        )
    }

    /// 行から値を取り出す
    pub fn value(self, row: &DisplayRecord) -> String {
        let r = &row.record;
        match self {
            Column::Barcode => r.barcode.clone(),
            Column::RepairTicket => r.repair_ticket.clone(),
            Column::Equipment => r.equipment.clone(),
            Column::Location => r.location.clone(),
            Column::Customer => r.customer.clone(),
            Column::CustomerTitle => r.customer_title.clone(),
            Column::Category => r.category.clone(),
            Column::AssignedOwner => r.assigned_owner.clone(),
            Column::OwnerDepartment => r.owner_department.clone(),
            Column::CategoryText => r.category_text.clone(),
            Column::DamageDescription => r.damage_description.clone(),
            Column::TicketDescription => r.ticket_description.clone(),
            Column::RepairReason => r.repair_reason.clone(),
            Column::RepairVendor => r.repair_vendor.clone(),
            Column::LastOrder => r.last_order.clone(),
            Column::Reference => r.reference.clone(),
            Column::Department => r.department.clone(),
            Column::RepairCost => r.repair_cost.clone(),
            Column::RepairPrice => r.repair_price.clone(),
            Column::DateIn => r.date_in.clone(),
            Column::AssetRepairAge => r.asset_repair_age.map(|d| d.to_string()).unwrap_or_default(),
            Column::Billable => r.billable.clone(),
            Column::CreatedBy => r.created_by.clone(),
            Column::DiscussionNote => r.discussion_note.clone(),
            Column::FollowUpNote => r.follow_up_note.clone(),
            Column::LastUpdated => row
                .last_updated
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            Column::TicketMatched => r.ticket_matched.to_string(),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

impl std::str::FromStr for Column {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Column::from_header(s).ok_or_else(|| format!("Unknown column: {}", s))
    }
}

/// カンマ区切りの列指定をパース
pub fn parse_column_list(spec: &str) -> Result<Vec<Column>, String> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

//! カテゴリ対応表モジュール
//!
//! カテゴリコード → {担当者, 部署, 説明} の対応表を管理する。
//! 正本はエントリ配列で、索引（正規化カテゴリ → 配列位置）は変更のたびに再構築する。

use crate::error::{Error, Result};
use crate::normalize::normalize_str;
use crate::types::{CategoryMappingEntry, ReportRecord};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// upsert の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// カテゴリ対応表（エントリ配列 + 索引）
#[derive(Debug, Clone, Default)]
pub struct CategoryMapping {
    entries: Vec<CategoryMappingEntry>,
    index: HashMap<String, usize>,
}

impl CategoryMapping {
    /// エントリ配列から構築（同じカテゴリは後勝ち）
    pub fn new(entries: Vec<CategoryMappingEntry>) -> Self {
        let mut mapping = Self {
            entries,
            index: HashMap::new(),
        };
        mapping.rebuild_index();
        mapping
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (normalize_str(&entry.category), i))
            .collect();
    }

    /// JSON文字列から読み込み
    ///
    /// JSONとして壊れていれば `Error::Json`、配列でない・エントリの型が違う場合は `Error::Parse`。
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let items = value
            .as_array()
            .ok_or_else(|| Error::Parse("カテゴリ対応表が配列ではありません".to_string()))?;

        let entries = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                CategoryMappingEntry::deserialize(item)
                    .map_err(|e| Error::Parse(format!("{}件目のエントリが不正です: {}", i + 1, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(entries))
    }

    /// JSONファイルから読み込み（ファイルがなければ空の対応表）
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_json(&content).map_err(|e| match e {
                Error::Parse(msg) => Error::Parse(format!("{}: {}", path.display(), msg)),
                other => other,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// 外部フィールド名（`pm`, `category_text`）でJSON化
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.entries)?)
    }

    /// JSONファイルへ保存（一時ファイル経由で置き換え）
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, self.to_json()?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// カテゴリで検索
    pub fn lookup(&self, category: &str) -> Option<&CategoryMappingEntry> {
        self.index
            .get(&normalize_str(category))
            .and_then(|&i| self.entries.get(i))
    }

    /// 担当者（未登録なら ""）
    pub fn owner_of(&self, category: &str) -> &str {
        self.lookup(category).map_or("", |e| e.owner.as_str())
    }

    /// エントリを追加または更新
    ///
    /// 正規化カテゴリが一致する既存エントリを置き換え、重複していた残りは取り除く。
    pub fn upsert(&mut self, entry: CategoryMappingEntry) -> UpsertOutcome {
        let key = normalize_str(&entry.category);
        let positions: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| normalize_str(&e.category) == key)
            .map(|(i, _)| i)
            .collect();

        let outcome = match positions.split_first() {
            Some((&first, rest)) => {
                self.entries[first] = entry;
                for &i in rest.iter().rev() {
                    self.entries.remove(i);
                }
                UpsertOutcome::Updated
            }
            None => {
                self.entries.push(entry);
                UpsertOutcome::Inserted
            }
        };

        self.rebuild_index();
        outcome
    }

    /// カテゴリを削除（削除したら true）
    pub fn remove(&mut self, category: &str) -> bool {
        let key = normalize_str(category);
        let before = self.entries.len();
        self.entries.retain(|e| normalize_str(&e.category) != key);
        let removed = self.entries.len() != before;
        if removed {
            self.rebuild_index();
        }
        removed
    }

    pub fn entries(&self) -> &[CategoryMappingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 担当者が割り当てられていないカテゴリ（元の表記、昇順・重複なし）
    pub fn unmatched_categories(&self, reports: &[ReportRecord]) -> Vec<String> {
        reports
            .iter()
            .map(|r| r.category.trim())
            .filter(|c| !c.is_empty() && self.owner_of(c).is_empty())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

//! 検索・絞り込み・並べ替え
//!
//! 表示行に対する純粋な変換。入力は変更せず、新しい Vec を返す。

use crate::columns::Column;
use crate::types::DisplayRecord;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// チケット一致状態での絞り込み
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchFilter {
    #[default]
    All,
    Matched,
    Unmatched,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// 表示条件
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewQuery {
    /// 全列の部分一致検索（大文字小文字無視）
    pub search: String,
    /// 列ごとの完全一致（大文字小文字・前後空白無視）
    pub filters: Vec<(Column, String)>,
    pub matched: MatchFilter,
    pub sort: Option<(Column, SortDirection)>,
}

impl ViewQuery {
    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = text.into();
        self
    }

    pub fn filter(mut self, column: Column, value: impl Into<String>) -> Self {
        self.filters.push((column, value.into()));
        self
    }

    pub fn matched(mut self, matched: MatchFilter) -> Self {
        self.matched = matched;
        self
    }

    pub fn sort_by(mut self, column: Column, direction: SortDirection) -> Self {
        self.sort = Some((column, direction));
        self
    }

    fn accepts(&self, row: &DisplayRecord) -> bool {
        let matched_ok = match self.matched {
            MatchFilter::All => true,
            MatchFilter::Matched => row.ticket_matched,
            MatchFilter::Unmatched => !row.ticket_matched,
        };
        if !matched_ok {
            return false;
        }

        let filters_ok = self.filters.iter().all(|(column, expected)| {
            column
                .value(row)
                .trim()
                .eq_ignore_ascii_case(expected.trim())
        });
        if !filters_ok {
            return false;
        }

        let needle = self.search.trim().to_lowercase();
        needle.is_empty()
            || Column::ALL
                .iter()
                .any(|c| c.value(row).to_lowercase().contains(&needle))
    }
}

/// 表示条件を適用
pub fn apply_view(rows: &[DisplayRecord], query: &ViewQuery) -> Vec<DisplayRecord> {
    let mut out: Vec<DisplayRecord> = rows.iter().filter(|r| query.accepts(r)).cloned().collect();

    if let Some((column, direction)) = query.sort {
        // 安定ソート（同値は元の順序を保つ）
        out.sort_by(|a, b| {
            let ord = compare_values(column, &column.value(a), &column.value(b));
            match direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            }
        });
    }

    out
}

/// 列の種類に応じた比較（数値にならない値は数値より小さい扱い）
///
/// `NaN` や `inf` も数値にならない値として扱う。
fn compare_values(column: Column, a: &str, b: &str) -> Ordering {
    if column.is_numeric() {
        let parse = |s: &str| {
            s.replace(',', "")
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
        };
        match (parse(a), parse(b)) {
            (Some(x), Some(y)) => return x.total_cmp(&y),
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (None, None) => {}
        }
    }
    natural_cmp(a, b)
}

/// 数字列を数値として扱う文字列比較（"RV2" < "RV10"）
fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ai = a.chars().peekable();
    let mut bi = b.chars().peekable();

    loop {
        match (ai.peek().copied(), bi.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let xs = take_digits(&mut ai);
                let ys = take_digits(&mut bi);
                let xt = xs.trim_start_matches('0');
                let yt = ys.trim_start_matches('0');
                let ord = xt.len().cmp(&yt.len()).then_with(|| xt.cmp(yt));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                let ord = x.to_lowercase().cmp(y.to_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
                ai.next();
                bi.next();
            }
        }
    }
}

fn take_digits(iter: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = iter.peek().copied().filter(char::is_ascii_digit) {
        digits.push(c);
        iter.next();
    }
    digits
}

//! CSV読み書き
//!
//! 読み込みはダブルクォート・"" エスケープ・セル内改行・CRLFに対応。
//! 書き出しは全フィールドをダブルクォートで囲み、内部の " を二重化する。

use crate::columns::Column;
use crate::types::{DisplayRecord, RawRow};

/// CSVテキストを行×フィールドにパース
pub fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }

    // 最終行（末尾改行なし）
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    rows
}

/// 先頭行をヘッダーとしてレコード化（空行は除外、ヘッダーは前後空白を除去）
pub fn rows_to_records(rows: Vec<Vec<String>>) -> Vec<RawRow> {
    let mut iter = rows.into_iter();
    let headers: Vec<String> = match iter.next() {
        Some(h) => h.into_iter().map(|s| s.trim().to_string()).collect(),
        None => return Vec::new(),
    };

    iter.filter(|cells| cells.iter().any(|c| !c.trim().is_empty()))
        .map(|cells| {
            headers
                .iter()
                .zip(cells.into_iter().chain(std::iter::repeat(String::new())))
                .filter(|(h, _)| !h.is_empty())
                .map(|(h, v)| (h.clone(), v))
                .collect()
        })
        .collect()
}

/// フィールドをクォート
pub fn quote_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// 表示行をCSVに変換（ヘッダー行付き、行区切りは \n）
pub fn export_csv(rows: &[DisplayRecord], columns: &[Column]) -> String {
    let header = columns
        .iter()
        .map(|c| quote_field(c.header()))
        .collect::<Vec<_>>()
        .join(",");

    std::iter::once(header)
        .chain(rows.iter().map(|row| {
            columns
                .iter()
                .map(|c| quote_field(&c.value(row)))
                .collect::<Vec<_>>()
                .join(",")
        }))
        .collect::<Vec<_>>()
        .join("\n")
}

//! 派生フィールド計算
//!
//! スプレッドシート由来の値は壊れていることが多いので、
//! ここの関数はすべて失敗時に空値へ落とし、パニックしない。

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use regex::Regex;

const DAY_MILLIS: u64 = 86_400_000;

/// 日時として受け付ける書式
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
];

/// 日付として受け付ける書式
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%m-%d-%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
];

/// 日付文字列をパース（読めなければ None）
///
/// 戻り値はローカル時刻。
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    // オフセット付きはローカル時刻に直す（経過日数の基準時刻と揃える）
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Local).naive_local());
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// 現在時刻基準の経過日数
pub fn age_in_days(raw: &str) -> Option<u64> {
    age_in_days_at(raw, Local::now().naive_local())
}

/// 指定時刻基準の経過日数: ceil(|now - date| / 1日)（`now` はローカル時刻）
pub fn age_in_days_at(raw: &str, now: NaiveDateTime) -> Option<u64> {
    let date = parse_date(raw)?;
    let millis = (now - date).num_milliseconds().unsigned_abs();
    Some(millis.div_ceil(DAY_MILLIS))
}

/// チケット番号の正規化
///
/// 数字と `.` 以外を取り除き、先頭の数値リテラルの整数部（切り捨て）を返す。
/// `"1,234.00"` と `"1234"` はどちらも `"1234"` になる。
pub fn canonical_ticket_number(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    let (int_part, rest) = split_leading_digits(&cleaned);
    let frac_part = rest
        .strip_prefix('.')
        .map(|r| split_leading_digits(r).0)
        .unwrap_or("");

    if int_part.is_empty() && frac_part.is_empty() {
        return String::new();
    }

    let trimmed = int_part.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

fn split_leading_digits(s: &str) -> (&str, &str) {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s.split_at(end)
}

/// 表示用の整形
///
/// - ISO-8601 タイムスタンプ → `M/D/YYYY`
/// - 数値（桁区切りカンマ可）→ 小数部がなければ整数、あれば小数
/// - それ以外はそのまま
pub fn format_for_display(value: &str) -> String {
    lazy_static::lazy_static! {
        static ref ISO_RE: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}").unwrap();
        static ref NUMBER_RE: Regex =
            Regex::new(r"^(-?)(\d{1,3}(?:,\d{3})+|\d+)(?:\.(\d+))?$").unwrap();
    }

    let trimmed = value.trim();

    if ISO_RE.is_match(trimmed) {
        if let Some(dt) = parse_timestamp(trimmed) {
            return dt.format("%-m/%-d/%Y").to_string();
        }
        return value.to_string();
    }

    if let Some(caps) = NUMBER_RE.captures(trimmed) {
        let sign = caps.get(1).map_or("", |m| m.as_str());
        let int_digits = caps[2].replace(',', "");
        let int_digits = match int_digits.trim_start_matches('0') {
            "" => "0",
            rest => rest,
        };
        let frac = caps
            .get(3)
            .map_or("", |m| m.as_str())
            .trim_end_matches('0');

        let is_zero = int_digits == "0" && frac.is_empty();
        let sign = if is_zero { "" } else { sign };

        return if frac.is_empty() {
            format!("{sign}{int_digits}")
        } else {
            format!("{sign}{int_digits}.{frac}")
        };
    }

    value.to_string()
}

/// タイムスタンプはそのオフセットでの日付で表示する
fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(date: &str) -> NaiveDateTime {
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_age_in_days_fixed_clock() {
        assert_eq!(age_in_days_at("2024-01-01", clock("2024-01-11")), Some(10));
    }

    #[test]
    fn test_age_in_days_partial_day_rounds_up() {
        let now = clock("2024-01-11").date().and_hms_opt(6, 0, 0).unwrap();
        assert_eq!(age_in_days_at("2024-01-01", now), Some(11));
    }

    #[test]
    fn test_age_in_days_future_date_is_absolute() {
        assert_eq!(age_in_days_at("2024-01-21", clock("2024-01-11")), Some(10));
    }

    #[test]
    fn test_age_in_days_same_day() {
        assert_eq!(age_in_days_at("2024-01-11", clock("2024-01-11")), Some(0));
    }

    #[test]
    fn test_age_in_days_other_formats() {
        let now = clock("2024-01-11");
        assert_eq!(age_in_days_at("1/1/2024", now), Some(10));
        assert_eq!(age_in_days_at("2024/01/01", now), Some(10));
        assert_eq!(age_in_days_at("2024-01-01 00:00:00", now), Some(10));
        assert_eq!(age_in_days_at("Jan 01, 2024", now), Some(10));
    }

    #[test]
    fn test_age_in_days_offset_timestamp_uses_clock_basis() {
        // 基準時刻と同じローカル時刻に直して比べる
        let now = DateTime::parse_from_rfc3339("2024-01-11T00:00:00Z")
            .unwrap()
            .with_timezone(&Local)
            .naive_local();
        assert_eq!(age_in_days_at("2024-01-01T00:00:00Z", now), Some(10));
        assert_eq!(age_in_days_at("2024-01-01T09:00:00+09:00", now), Some(10));
        assert_eq!(age_in_days_at("2024-01-10T19:00:00-05:00", now), Some(0));
    }

    #[test]
    fn test_age_in_days_malformed() {
        let now = clock("2024-01-11");
        assert_eq!(age_in_days_at("not a date", now), None);
        assert_eq!(age_in_days_at("", now), None);
        assert_eq!(age_in_days_at("2024-13-45", now), None);
    }

    #[test]
    fn test_canonical_ticket_number() {
        assert_eq!(canonical_ticket_number("1,234.00"), "1234");
        assert_eq!(canonical_ticket_number("1234"), "1234");
        assert_eq!(canonical_ticket_number("42"), "42");
        assert_eq!(canonical_ticket_number("abc"), "");
        assert_eq!(canonical_ticket_number(""), "");
        assert_eq!(canonical_ticket_number("."), "");
    }

    #[test]
    fn test_canonical_ticket_number_noise() {
        assert_eq!(canonical_ticket_number("#1,002.00"), "1002");
        assert_eq!(canonical_ticket_number("T-0042"), "42");
        assert_eq!(canonical_ticket_number("99.99"), "99");
        assert_eq!(canonical_ticket_number(".5"), "0");
        assert_eq!(canonical_ticket_number("1.2.3"), "1");
        assert_eq!(canonical_ticket_number("000"), "0");
    }

    #[test]
    fn test_format_for_display_numbers() {
        assert_eq!(format_for_display("1,234.00"), "1234");
        assert_eq!(format_for_display("1234.50"), "1234.5");
        assert_eq!(format_for_display("42"), "42");
        assert_eq!(format_for_display("-7.0"), "-7");
        assert_eq!(format_for_display("0.25"), "0.25");
    }

    #[test]
    fn test_format_for_display_timestamp() {
        assert_eq!(format_for_display("2024-03-05T14:30:00Z"), "3/5/2024");
        assert_eq!(format_for_display("2024-12-31T23:59:59.000"), "12/31/2024");
    }

    #[test]
    fn test_format_for_display_passthrough() {
        assert_eq!(format_for_display("Atlanta"), "Atlanta");
        assert_eq!(format_for_display("2024-01-01"), "2024-01-01");
        assert_eq!(format_for_display("12,34"), "12,34");
        assert_eq!(format_for_display(""), "");
    }
}

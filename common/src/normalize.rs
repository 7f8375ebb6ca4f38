//! 識別子の正規化
//!
//! 突合キー（バーコード・カテゴリ）とメモのキーはすべてここを通す。
//! 片側だけ正規化すると一致が黙って失われる。

/// 識別子を正規化（前後空白を除去して大文字化）。None/空は ""。
pub fn normalize(raw: Option<&str>) -> String {
    raw.map(normalize_str).unwrap_or_default()
}

/// `normalize` の &str 版
pub fn normalize_str(raw: &str) -> String {
    raw.trim().to_uppercase()
}

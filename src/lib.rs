//! repair-dash
//!
//! チケット一覧と修理レポートをバーコードで突合し、カテゴリ対応表から担当者を付け、
//! 共同編集のメモを重ねて一覧にするダッシュボード。

pub mod annotations;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod export;
pub mod loader;
pub mod logging;

pub use error::{DashError, Result};

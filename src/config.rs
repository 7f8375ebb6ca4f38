use crate::error::{DashError, Result};
use repair_dash_common::columns::{parse_column_list, Column};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// メモの保存形式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// JSONドキュメント
    #[default]
    Json,
    /// xlsx シート（Barcode#, Meeting Note, Requires Follow Up, Last Updated）
    Sheet,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(BackendKind::Json),
            "sheet" | "xlsx" => Ok(BackendKind::Sheet),
            _ => Err(format!("Unknown backend: {}. Use json or sheet", s)),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Json => write!(f, "json"),
            BackendKind::Sheet => write!(f, "sheet"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// カテゴリ対応表JSON
    pub mapping_path: Option<PathBuf>,
    /// メモの保存先
    pub annotations_path: Option<PathBuf>,
    pub annotation_backend: BackendKind,
    /// 最後の編集から自動保存までの待ち時間
    pub autosave_delay_ms: u64,
    /// 出力列（ヘッダー名）。空なら既定の列
    pub default_columns: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            serde_json::from_str(&content)?
        } else {
            Self::default_config()
        };

        Ok(config.with_env_overrides())
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| DashError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("repair-dash").join("config.json"))
    }

    fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("repair-dash")
    }

    fn default_config() -> Self {
        Self {
            mapping_path: None,
            annotations_path: None,
            annotation_backend: BackendKind::Json,
            autosave_delay_ms: 2000,
            default_columns: Vec::new(),
        }
    }

    /// 環境変数を優先
    fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var("REPAIR_DASH_MAPPING") {
            self.mapping_path = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("REPAIR_DASH_ANNOTATIONS") {
            self.annotations_path = Some(PathBuf::from(path));
        }
        self
    }

    /// カテゴリ対応表のパス（未設定ならデータディレクトリ）
    pub fn mapping_path(&self) -> PathBuf {
        self.mapping_path
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("category-mapping.json"))
    }

    /// メモ保存先のパス（未設定なら保存形式に応じた既定名）
    pub fn annotations_path(&self) -> PathBuf {
        self.annotations_path.clone().unwrap_or_else(|| {
            let name = match self.annotation_backend {
                BackendKind::Json => "annotations.json",
                BackendKind::Sheet => "annotations.xlsx",
            };
            Self::data_dir().join(name)
        })
    }

    pub fn autosave_delay(&self) -> Duration {
        Duration::from_millis(self.autosave_delay_ms)
    }

    /// 出力列
    pub fn columns(&self) -> Result<Vec<Column>> {
        if self.default_columns.is_empty() {
            return Ok(Column::DEFAULT_SET.to_vec());
        }
        parse_column_list(&self.default_columns.join(",")).map_err(DashError::Config)
    }
}

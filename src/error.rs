use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("未対応のファイル形式です: {0}（csv/xlsx/xlsm/xls/ods）")]
    UnsupportedFormat(String),

    #[error("スプレッドシート読み込みエラー: {0}")]
    Spreadsheet(String),

    #[error("Excel生成エラー: {0}")]
    ExcelGeneration(String),

    /// 保存先がまだ存在しない（初回起動など）。エラーではなく空として扱う。
    #[error("保存先が存在しません: {0}")]
    NotFound(String),

    #[error("メモ保存先エラー: {0}")]
    Backend(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] repair_dash_common::Error),
}

impl DashError {
    /// 「まだ作られていない」系のエラーか
    pub fn is_not_found(&self) -> bool {
        match self {
            DashError::NotFound(_) | DashError::FileNotFound(_) => true,
            DashError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            DashError::Common(repair_dash_common::Error::Io(e)) => {
                e.kind() == std::io::ErrorKind::NotFound
            }
            _ => false,
        }
    }
}

impl From<calamine::Error> for DashError {
    fn from(e: calamine::Error) -> Self {
        DashError::Spreadsheet(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DashError>;

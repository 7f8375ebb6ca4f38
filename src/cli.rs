use clap::{Args, Parser, Subcommand};
use crate::config::BackendKind;
use crate::export::ExportFormat;
use repair_dash_common::columns::Column;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "repair-dash")]
#[command(about = "修理レポート×チケット突合ダッシュボード", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// 入力ファイル
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// チケット一覧（csv/xlsx/xls/ods）
    #[arg(short, long)]
    pub tickets: Option<PathBuf>,

    /// 修理レポート（csv/xlsx/xls/ods）
    #[arg(short, long, required = true)]
    pub reports: PathBuf,

    /// カテゴリ対応表JSON（省略時は設定値）
    #[arg(short, long)]
    pub mapping: Option<PathBuf>,
}

/// メモの保存先
#[derive(Args, Debug, Clone, Default)]
pub struct AnnotationArgs {
    /// メモの保存先（省略時は設定値）
    #[arg(long)]
    pub annotations: Option<PathBuf>,

    /// 保存形式 (json/sheet)
    #[arg(long)]
    pub backend: Option<BackendKind>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 突合してメモを重ねた一覧を出力
    Reconcile {
        #[command(flatten)]
        sources: SourceArgs,

        #[command(flatten)]
        notes: AnnotationArgs,

        /// 出力形式 (table/csv/xlsx/json)
        #[arg(short, long, value_enum, default_value = "table")]
        format: ExportFormat,

        /// 出力ファイル/ディレクトリ（省略時は標準出力）
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// 出力列（カンマ区切りのヘッダー名）
        #[arg(long)]
        columns: Option<String>,

        /// 全列の部分一致検索
        #[arg(short, long)]
        search: Option<String>,

        /// 列の値で絞り込み（例: AssignedOwner=Jane）
        #[arg(long = "where", value_name = "COLUMN=VALUE")]
        filters: Vec<String>,

        /// チケットと一致した行のみ
        #[arg(long, conflicts_with = "unmatched")]
        matched: bool,

        /// チケットと一致しなかった行のみ
        #[arg(long)]
        unmatched: bool,

        /// 並べ替える列
        #[arg(long)]
        sort: Option<Column>,

        /// 降順
        #[arg(long, requires = "sort")]
        desc: bool,

        /// シート名・出力ファイル名
        #[arg(long, default_value = "Repair Dashboard")]
        title: String,
    },

    /// 担当者が割り当てられていないカテゴリを表示
    Unmatched {
        /// 修理レポート
        #[arg(short, long, required = true)]
        reports: PathBuf,

        /// カテゴリ対応表JSON
        #[arg(short, long)]
        mapping: Option<PathBuf>,
    },

    /// 件数の集計と孤立したメモを表示
    Summary {
        #[command(flatten)]
        sources: SourceArgs,

        #[command(flatten)]
        notes: AnnotationArgs,
    },

    /// カテゴリ対応表の管理
    Mapping {
        /// カテゴリ対応表JSON
        #[arg(short, long, global = true)]
        mapping: Option<PathBuf>,

        #[command(subcommand)]
        action: MappingAction,
    },

    /// メモの管理
    Note {
        #[command(flatten)]
        notes: AnnotationArgs,

        #[command(subcommand)]
        action: NoteAction,
    },

    /// 設定を表示/編集
    Config {
        /// 設定を表示
        #[arg(long)]
        show: bool,

        /// カテゴリ対応表のパスを設定
        #[arg(long)]
        set_mapping: Option<PathBuf>,

        /// メモの保存先を設定
        #[arg(long)]
        set_annotations: Option<PathBuf>,

        /// メモの保存形式を設定 (json/sheet)
        #[arg(long)]
        set_backend: Option<BackendKind>,

        /// 自動保存までの待ち時間（ミリ秒）
        #[arg(long)]
        set_autosave_delay: Option<u64>,

        /// 既定の出力列（カンマ区切り）
        #[arg(long)]
        set_columns: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum MappingAction {
    /// 一覧表示
    List,
    /// 追加または更新
    Set {
        category: String,
        /// 担当者
        owner: String,
        #[arg(short, long, default_value = "")]
        department: String,
        #[arg(long, default_value = "")]
        category_text: String,
    },
    /// 削除
    Remove { category: String },
}

#[derive(Subcommand)]
pub enum NoteAction {
    /// メモを書く（指定したフィールドのみ更新）
    Set {
        barcode: String,
        #[arg(short, long)]
        discussion: Option<String>,
        #[arg(short, long)]
        follow_up: Option<String>,
    },
    /// メモを表示
    Get { barcode: String },
    /// メモを削除
    Delete { barcode: String },
    /// 全メモを表示
    List,
}

/// `COLUMN=VALUE` を分解
pub fn parse_filter(spec: &str) -> Result<(Column, String), String> {
    let (column, value) = spec
        .split_once('=')
        .ok_or_else(|| format!("COLUMN=VALUE の形式で指定してください: {}", spec))?;
    Ok((column.parse()?, value.to_string()))
}

use anyhow::{bail, Context, Result};
use clap::Parser;
use repair_dash::annotations::{self, AnnotationBackend, AnnotationStore, AutoSaver, NoteEdit};
use repair_dash::cli::{self, AnnotationArgs, Cli, Commands, MappingAction, NoteAction, SourceArgs};
use repair_dash::config::Config;
use repair_dash::dashboard::Dashboard;
use repair_dash::{export, loader, logging};
use repair_dash_common::columns::parse_column_list;
use repair_dash_common::{
    CategoryMapping, CategoryMappingEntry, MatchFilter, SortDirection, UpsertOutcome, ViewQuery,
};
use std::path::Path;
use std::sync::Arc;

type Store = AnnotationStore<Box<dyn AnnotationBackend>>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let config = Config::load().context("設定の読み込みに失敗しました")?;

    match cli.command {
        Commands::Reconcile {
            sources,
            notes,
            format,
            output,
            columns,
            search,
            filters,
            matched,
            unmatched,
            sort,
            desc,
            title,
        } => {
            let mut dashboard = open_dashboard(&config, &sources, &notes).await?;

            let columns = match columns {
                Some(spec) => parse_column_list(&spec).map_err(anyhow::Error::msg)?,
                None => config.columns()?,
            };

            let mut query = ViewQuery::default().search(search.unwrap_or_default());
            if matched {
                query = query.matched(MatchFilter::Matched);
            } else if unmatched {
                query = query.matched(MatchFilter::Unmatched);
            }
            for spec in &filters {
                let (column, value) = cli::parse_filter(spec).map_err(anyhow::Error::msg)?;
                query = query.filter(column, value);
            }
            if let Some(column) = sort {
                let direction = if desc { SortDirection::Descending } else { SortDirection::Ascending };
                query = query.sort_by(column, direction);
            }

            let rows = dashboard.view(&query);
            if let Some(path) = export::export_rows(&rows, &columns, format, output.as_deref(), &title)? {
                println!("✔ 出力: {} ({}行)", path.display(), rows.len());
            }

            let missing = dashboard.unmatched_categories();
            if !missing.is_empty() {
                tracing::warn!(
                    count = missing.len(),
                    categories = %missing.join(", "),
                    "担当者が未設定のカテゴリがあります"
                );
            }
        }

        Commands::Unmatched { reports, mapping } => {
            let mapping = load_mapping(&config, mapping.as_deref())?;
            let reports = loader::load_reports(&reports)
                .with_context(|| format!("修理レポートを読み込めません: {}", reports.display()))?;

            let categories = mapping.unmatched_categories(&reports);
            if categories.is_empty() {
                println!("✔ すべてのカテゴリに担当者が設定されています");
            }
            for category in categories {
                println!("{}", category);
            }
        }

        Commands::Summary { sources, notes } => {
            let mut dashboard = open_dashboard(&config, &sources, &notes).await?;
            let summary = dashboard.summary();

            println!("集計:");
            println!("  行数: {}", summary.records);
            println!("  チケット一致: {}", summary.matched);
            println!("  担当者未設定カテゴリ: {}", summary.unmatched_categories);
            println!("  重複チケット: {}", summary.duplicate_ticket_keys);
            println!("  メモ付き: {}", summary.annotated);
            println!("  孤立メモ: {}", summary.stale_annotations);

            for note in dashboard.stale_annotations() {
                println!("  - {}: {}", note.barcode, note.discussion_note);
            }
        }

        Commands::Mapping { mapping, action } => {
            let path = mapping.unwrap_or_else(|| config.mapping_path());
            let mut table = CategoryMapping::load(&path)
                .with_context(|| format!("カテゴリ対応表を読み込めません: {}", path.display()))?;

            match action {
                MappingAction::List => {
                    if table.is_empty() {
                        println!("カテゴリ対応表は空です: {}", path.display());
                    }
                    for entry in table.entries() {
                        println!("{}\t{}\t{}\t{}", entry.category, entry.owner, entry.department, entry.category_text);
                    }
                }
                MappingAction::Set { category, owner, department, category_text } => {
                    let outcome = table.upsert(CategoryMappingEntry {
                        category: category.clone(),
                        owner,
                        department,
                        category_text,
                    });
                    table.save(&path)?;
                    match outcome {
                        UpsertOutcome::Inserted => println!("✔ 追加しました: {}", category),
                        UpsertOutcome::Updated => println!("✔ 更新しました: {}", category),
                    }
                }
                MappingAction::Remove { category } => {
                    if table.remove(&category) {
                        table.save(&path)?;
                        println!("✔ 削除しました: {}", category);
                    } else {
                        println!("カテゴリが見つかりません: {}", category);
                    }
                }
            }
        }

        Commands::Note { notes, action } => {
            let store = open_store(&config, &notes).await?;

            match action {
                NoteAction::Set { barcode, discussion, follow_up } => {
                    if discussion.is_none() && follow_up.is_none() {
                        bail!("--discussion か --follow-up を指定してください");
                    }
                    let saver = AutoSaver::spawn(Arc::clone(&store), config.autosave_delay());
                    let record = store.update(
                        &barcode,
                        NoteEdit { discussion_note: discussion, follow_up_note: follow_up },
                    );
                    saver.touch();
                    saver.shutdown().await.context("メモを保存できませんでした")?;
                    println!("✔ 保存しました: {}", record.barcode);
                }
                NoteAction::Get { barcode } => {
                    println!("{}", serde_json::to_string_pretty(&store.get(&barcode))?);
                }
                NoteAction::Delete { barcode } => {
                    store.delete(&barcode);
                    store.flush().await.context("削除を保存できませんでした")?;
                    println!("✔ 削除しました: {}", barcode);
                }
                NoteAction::List => {
                    let mut notes: Vec<_> = store.snapshot().into_values().collect();
                    notes.sort_by(|a, b| a.barcode.cmp(&b.barcode));
                    for note in notes {
                        println!("{}\t{}\t{}", note.barcode, note.discussion_note, note.follow_up_note);
                    }
                }
            }
        }

        Commands::Config {
            show,
            set_mapping,
            set_annotations,
            set_backend,
            set_autosave_delay,
            set_columns,
        } => {
            let mut config = config;
            let mut changed = false;

            if let Some(path) = set_mapping {
                config.mapping_path = Some(path);
                changed = true;
            }
            if let Some(path) = set_annotations {
                config.annotations_path = Some(path);
                changed = true;
            }
            if let Some(kind) = set_backend {
                config.annotation_backend = kind;
                changed = true;
            }
            if let Some(ms) = set_autosave_delay {
                config.autosave_delay_ms = ms;
                changed = true;
            }
            if let Some(spec) = set_columns {
                let columns = parse_column_list(&spec).map_err(anyhow::Error::msg)?;
                config.default_columns = columns.iter().map(|c| c.header().to_string()).collect();
                changed = true;
            }

            if changed {
                config.save()?;
                println!("✔ 設定を保存しました: {}", Config::config_path()?.display());
            }

            if show || !changed {
                println!("設定:");
                println!("  カテゴリ対応表: {}", config.mapping_path().display());
                println!("  メモ保存先: {} ({})", config.annotations_path().display(), config.annotation_backend);
                println!("  自動保存: {}ms", config.autosave_delay_ms);
                let columns: Vec<String> = config.columns()?.iter().map(|c| c.header().to_string()).collect();
                println!("  出力列: {}", columns.join(", "));
            }
        }
    }

    Ok(())
}

fn load_mapping(config: &Config, path: Option<&Path>) -> Result<CategoryMapping> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(|| config.mapping_path());
    let mapping = CategoryMapping::load(&path)
        .with_context(|| format!("カテゴリ対応表を読み込めません: {}", path.display()))?;
    tracing::info!(path = %path.display(), entries = mapping.len(), "カテゴリ対応表を読み込みました");
    Ok(mapping)
}

async fn open_store(config: &Config, notes: &AnnotationArgs) -> Result<Arc<Store>> {
    let mut config = config.clone();
    if let Some(kind) = notes.backend {
        config.annotation_backend = kind;
    }
    if let Some(path) = &notes.annotations {
        config.annotations_path = Some(path.clone());
    }

    let store = Arc::new(AnnotationStore::new(annotations::open_backend(&config)));
    store
        .load_all()
        .await
        .with_context(|| format!("メモを読み込めません: {}", store.backend().describe()))?;
    Ok(store)
}

async fn open_dashboard(
    config: &Config,
    sources: &SourceArgs,
    notes: &AnnotationArgs,
) -> Result<Dashboard<Box<dyn AnnotationBackend>>> {
    let mut dashboard = Dashboard::new(open_store(config, notes).await?);
    dashboard.set_mapping(load_mapping(config, sources.mapping.as_deref())?);

    if let Some(path) = &sources.tickets {
        let tickets = loader::load_tickets(path)
            .with_context(|| format!("チケット一覧を読み込めません: {}", path.display()))?;
        dashboard.set_tickets(tickets);
    }
    let reports = loader::load_reports(&sources.reports)
        .with_context(|| format!("修理レポートを読み込めません: {}", sources.reports.display()))?;
    dashboard.set_reports(reports);

    Ok(dashboard)
}

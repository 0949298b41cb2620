//! Libris — incremental document indexer for per-topic knowledge bases.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use libris_core::{DataPaths, LibrisConfig};
use libris_ingest::{
    accept_suggestions, collect_suggestions, AuditLog, Dictionary, ExtractorRegistry, IndexStats,
    Indexer, IndexerOptions, NormalizationTable, OcrHeuristic,
};
use libris_store::MetadataStore;

pub mod validate;

fn resolve_data_dir() -> PathBuf {
    std::env::var("LIBRIS_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|p| p.to_path_buf()));
            if let Some(dir) = exe_dir {
                let parent_data = dir.join("../data");
                if parent_data.exists() {
                    return parent_data;
                }
            }
            PathBuf::from("data")
        })
}

fn print_usage() {
    println!("Libris — incremental document indexer");
    println!();
    println!("Usage: libris <command>");
    println!();
    println!("Commands:");
    println!("  index <dir> [--rebuild]  Index new files under <dir>");
    println!("  stats                    Show totals for the current topic");
    println!("  validate [data-dir]      Check the metadata database");
    println!("  accept-suggestions       Add reviewed OCR fixes to the normalization map");
    println!("  help                     Show this help message");
    println!();
    println!("Environment: LIBRIS_DATA_DIR, LIBRIS_TOPIC, LIBRIS_DICTIONARY, RUST_LOG");
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    match args[1].as_str() {
        "index" => {
            let mut source = None;
            let mut rebuild = false;
            for arg in &args[2..] {
                match arg.as_str() {
                    "--rebuild" => rebuild = true,
                    other if source.is_none() => source = Some(PathBuf::from(other)),
                    other => {
                        eprintln!("Unexpected argument: {}", other);
                        std::process::exit(1);
                    }
                }
            }
            let Some(source) = source else {
                eprintln!("Usage: libris index <dir> [--rebuild]");
                std::process::exit(1);
            };
            let config = LibrisConfig::from_env(resolve_data_dir())?;
            run_index(&config, &source, rebuild)
        }
        "stats" => {
            let config = LibrisConfig::from_env(resolve_data_dir())?;
            run_stats(&config)
        }
        "--validate" | "validate" => {
            let data_dir = if args.len() > 2 {
                PathBuf::from(&args[2])
            } else {
                resolve_data_dir()
            };
            let report = validate::validate(&DataPaths::from_env(&data_dir));
            validate::print_report(&report);
            std::process::exit(if report.db_valid { 0 } else { 1 });
        }
        "accept-suggestions" => {
            let config = LibrisConfig::from_env(resolve_data_dir())?;
            run_accept_suggestions(&config)
        }
        "--help" | "-h" | "help" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}. Use 'libris help' for usage.", other);
            std::process::exit(1);
        }
    }
}

fn run_index(config: &LibrisConfig, source: &Path, rebuild: bool) -> anyhow::Result<()> {
    let paths = &config.data_paths;
    info!("Topic '{}', data directory {}", config.topic, paths.root.display());

    let store = if rebuild {
        MetadataStore::open_with_rebuild(&paths.metadata_db)
    } else {
        MetadataStore::open(&paths.metadata_db)
    }
    .with_context(|| format!("failed to open {}", paths.metadata_db.display()))?;

    let registry = ExtractorRegistry::with_defaults(&config.blog_tags);
    let options = IndexerOptions::from_config(config);
    let mut indexer = Indexer::new(&store, &registry, options);

    if let Some(table) = NormalizationTable::load(&paths.normalization_map, rebuild)? {
        indexer = indexer.with_rules(Arc::new(table));
    }

    if config.ocr_scan {
        let dictionary = Dictionary::load_or_builtin(config.dictionary.as_deref())
            .context("failed to load the OCR dictionary")?;
        indexer = indexer.with_ocr(
            OcrHeuristic::new(Arc::new(dictionary)),
            AuditLog::new(&paths.logs),
        );
    }

    let report = indexer.run(source)?;
    IndexStats::collect(&store, &config.topic, &config.embedding_model)?
        .write(&paths.stats_file)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_stats(config: &LibrisConfig) -> anyhow::Result<()> {
    let paths = &config.data_paths;
    if !paths.metadata_db.exists() {
        anyhow::bail!(
            "no database for topic '{}' at {}",
            config.topic,
            paths.metadata_db.display()
        );
    }
    let store = MetadataStore::open(&paths.metadata_db)?;
    println!("{}", serde_json::to_string_pretty(&store.stats()?)?);

    match IndexStats::read(&paths.stats_file) {
        Ok(stats) => println!("{}", serde_json::to_string_pretty(&stats)?),
        Err(e) => warn!("No stats summary at {}: {e}", paths.stats_file.display()),
    }
    Ok(())
}

fn run_accept_suggestions(config: &LibrisConfig) -> anyhow::Result<()> {
    let paths = &config.data_paths;
    let records = collect_suggestions(&paths.logs)?;
    if records.is_empty() {
        println!("No OCR suggestions in {}", paths.logs.display());
        return Ok(());
    }

    let mut table = NormalizationTable::load(&paths.normalization_map, true)?
        .context("normalization map could not be created")?;
    let changed = accept_suggestions(&mut table, &records)?;
    if changed > 0 {
        table.save(&paths.normalization_map)?;
    }
    println!(
        "Accepted {} of {} suggestions into {}",
        changed,
        records.len(),
        paths.normalization_map.display()
    );
    Ok(())
}

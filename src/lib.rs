pub mod cli;
pub mod coerce;
pub mod config;
pub mod delimited;
pub mod error;
pub mod io_utils;
pub mod mapper;
pub mod pipeline;
pub mod schema;
pub mod sink;
pub mod source;
pub mod store;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, info};
use serde_json::Value;

use crate::{
    cli::{Cli, Commands},
    config::{Settings, pick},
    schema::TableSchema,
    sink::{DryRunSink, RelationalSink, RestSink},
    source::{DirSource, SheetExportSource, SheetSource},
    store::CsvDirStore,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sheet_bridge", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let settings = Settings::load_optional(cli.config.as_deref())?;
    match cli.command {
        Commands::Snapshot(args) => handle_snapshot(&args, &settings),
        Commands::Replace(args) => handle_replace(&args, &settings),
        Commands::Migrate(args) => handle_migrate(&args, &settings),
        Commands::Schema(args) => handle_schema(&args, &settings),
    }
}

fn open_store(
    cli: Option<&std::path::Path>,
    settings: &Settings,
    schemas: &[TableSchema],
) -> Result<CsvDirStore> {
    let path = settings
        .store_path(cli)
        .ok_or_else(|| anyhow!("No store directory given (use --store or SHEET_BRIDGE_STORE)"))?;
    let store = CsvDirStore::open(&path).with_context(|| format!("Opening store {path:?}"))?;
    Ok(store.with_reserved_tables(schemas.iter().map(|schema| schema.table.clone())))
}

fn print_json(value: &Value, pretty: bool) -> Result<()> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{rendered}");
    Ok(())
}

fn handle_snapshot(args: &cli::SnapshotArgs, settings: &Settings) -> Result<()> {
    let schemas = settings.schemas()?;
    let response = match open_store(args.store.as_deref(), settings, &schemas) {
        Ok(mut store) => pipeline::handle_get(&mut store, &schemas),
        Err(err) => serde_json::json!({ "error": format!("{err:#}") }),
    };
    print_json(&response, args.pretty)
}

fn handle_replace(args: &cli::ReplaceArgs, settings: &Settings) -> Result<()> {
    let schemas = settings.schemas()?;
    let body = io_utils::read_text(&args.payload)?;
    let response = match open_store(args.store.as_deref(), settings, &schemas) {
        Ok(mut store) => pipeline::handle_post(&mut store, &schemas, &body),
        Err(err) => serde_json::json!({ "error": format!("{err:#}") }),
    };
    print_json(&response, args.pretty)
}

fn handle_migrate(args: &cli::MigrateArgs, settings: &Settings) -> Result<()> {
    let schemas = settings.schemas()?;
    let batch_size = settings.batch_size(args.batch_size)?;

    let source: Box<dyn SheetSource> = match (&args.source_dir, &args.sheet_id) {
        (Some(dir), _) => Box::new(DirSource::new(dir)),
        (None, cli_sheet) => {
            let sheet_id = pick(cli_sheet.clone(), settings.sheet_id.clone())
                .ok_or_else(|| anyhow!("No sheet id given (use --sheet-id or --source-dir)"))?;
            match &settings.export_base_url {
                Some(base) => Box::new(SheetExportSource::with_base_url(base, &sheet_id)),
                None => Box::new(SheetExportSource::new(&sheet_id)),
            }
        }
    };

    let mut sink: Box<dyn RelationalSink> = if args.dry_run {
        Box::new(DryRunSink::default())
    } else {
        let url = pick(args.sink_url.clone(), settings.sink_url.clone())
            .ok_or_else(|| anyhow!("No sink URL given (use --sink-url)"))?;
        let key = pick(args.sink_key.clone(), settings.sink_key.clone())
            .ok_or_else(|| anyhow!("No sink key given (use --sink-key)"))?;
        Box::new(RestSink::new(&url, &key))
    };

    info!("Migrating {} table(s) in batches of {batch_size}", schemas.len());
    let report = pipeline::migrate(source.as_ref(), sink.as_mut(), &schemas, batch_size)
        .context("Migration failed")?;

    let headers = ["table", "fetched", "kept", "upserted", "batches", "degraded"]
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    let rows = report
        .tables
        .iter()
        .map(|t| {
            vec![
                t.table.clone(),
                t.fetched.to_string(),
                t.kept.to_string(),
                t.upserted.to_string(),
                t.batches.to_string(),
                t.degraded.total().to_string(),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
    info!("Done: {} row(s) upserted", report.total_upserted());
    Ok(())
}

fn handle_schema(args: &cli::SchemaArgs, settings: &Settings) -> Result<()> {
    let schemas = settings.schemas()?;
    let selected = match &args.table {
        Some(name) => vec![
            TableSchema::find(&schemas, name)
                .cloned()
                .ok_or_else(|| anyhow!("Unknown table '{name}'"))?,
        ],
        None => schemas,
    };

    if args.yaml {
        for schema in &selected {
            print!("---\n{}", schema.to_yaml()?);
        }
        return Ok(());
    }

    let headers = ["table", "field", "relational", "kind", "column"]
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    let rows = selected
        .iter()
        .flat_map(|schema| describe_fields(schema))
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
    Ok(())
}

fn describe_fields(schema: &TableSchema) -> Vec<Vec<String>> {
    let headers = schema.headers();
    schema
        .fields
        .iter()
        .map(|field| {
            let column = headers
                .iter()
                .position(|h| *h == field.name)
                .map(|idx| (idx + 1).to_string())
                .unwrap_or_default();
            vec![
                schema.table.clone(),
                field.name.clone(),
                field.relational_name().into_owned(),
                field.kind.to_string(),
                column,
            ]
        })
        .collect()
}

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Keep spreadsheet-backed stock and cross records in sync with a relational backend",
    long_about = None
)]
pub struct Cli {
    /// Optional YAML settings file
    #[arg(long, global = true, env = "SHEET_BRIDGE_CONFIG")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print every table of a store as one JSON snapshot
    Snapshot(SnapshotArgs),
    /// Replace whole tables of a store from a JSON payload
    Replace(ReplaceArgs),
    /// Upsert every table into the relational backend in batches
    Migrate(MigrateArgs),
    /// List the fields of the built-in table schemas
    Schema(SchemaArgs),
}

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    /// Directory holding one <Table>.csv file per table
    #[arg(short, long, env = "SHEET_BRIDGE_STORE")]
    pub store: Option<PathBuf>,
    /// Pretty-print the JSON response
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Debug, Args)]
pub struct ReplaceArgs {
    /// Directory holding one <Table>.csv file per table
    #[arg(short, long, env = "SHEET_BRIDGE_STORE")]
    pub store: Option<PathBuf>,
    /// JSON payload file ('-' reads stdin)
    #[arg(short, long, default_value = "-")]
    pub payload: PathBuf,
    /// Pretty-print the JSON response
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Spreadsheet identifier to export tables from
    #[arg(long, env = "SHEET_BRIDGE_SHEET_ID", conflicts_with = "source_dir")]
    pub sheet_id: Option<String>,
    /// Read <Table>.csv exports from this directory instead of the spreadsheet
    #[arg(long)]
    pub source_dir: Option<PathBuf>,
    /// Base URL of the relational backend
    #[arg(long, env = "SHEET_BRIDGE_SINK_URL")]
    pub sink_url: Option<String>,
    /// API key for the relational backend
    #[arg(long, env = "SHEET_BRIDGE_SINK_KEY", hide_env_values = true)]
    pub sink_key: Option<String>,
    /// Rows per upsert request
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Map and batch every table without sending anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct SchemaArgs {
    /// Table to describe (all tables when omitted)
    pub table: Option<String>,
    /// Emit the schema as YAML instead of a table
    #[arg(long)]
    pub yaml: bool,
}

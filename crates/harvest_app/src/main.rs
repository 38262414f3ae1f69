//! `harvest`: downloads archive search indexes into one CSV file each.
//!
//! ```bash
//! # Harvest every index in the catalog
//! harvest run --catalog indexes.csv
//!
//! # Continue after the last completed index
//! harvest run --catalog indexes.csv --resume
//!
//! # Harvest a single index
//! harvest index --title "Assisted Immigrants" --url "https://archive.example/search?id=9&Surname=%25"
//!
//! # Drop cached responses
//! harvest clear-cache
//! ```

mod checkpoint;
mod commands;
mod config;
mod logging;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use harvest_engine::SourceKind;

use crate::config::{HarvestConfig, Overrides};

#[derive(Parser)]
#[command(name = "harvest")]
#[command(about = "Harvest archive index tables into CSV files")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (RON). Defaults to ./harvest.ron when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log debug messages.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Also write the log to this file.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Harvest every index listed in a catalog.
    Run(RunArgs),
    /// Harvest one index.
    Index(IndexArgs),
    /// Remove cached responses.
    ClearCache(ClearCacheArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceArg {
    Html,
    #[value(alias = "api")]
    Graphql,
}

impl From<SourceArg> for SourceKind {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Html => SourceKind::Html,
            SourceArg::Graphql => SourceKind::GraphQl,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Which upstream binding to use.
    #[arg(long, value_enum)]
    pub source: Option<SourceArg>,

    /// Directory for the CSV files.
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Give up on a page after this many soft failures (default: never).
    #[arg(long)]
    pub max_soft_retries: Option<u32>,

    /// Do not read or write the response cache.
    #[arg(long)]
    pub no_cache: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Catalog CSV with `title` and `url` columns.
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Zero-based catalog position to start at.
    #[arg(long, conflicts_with = "resume")]
    pub start: Option<usize>,

    /// Start after the last index completed by a previous run.
    #[arg(long)]
    pub resume: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug, Clone)]
pub struct IndexArgs {
    #[arg(long)]
    pub title: String,

    /// Search URL (HTML) or index URL ending in its slug (GraphQL).
    #[arg(long)]
    pub url: String,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ClearCacheArgs {
    /// Only clear this index's namespace.
    #[arg(long)]
    pub namespace: Option<String>,
}

impl CommonArgs {
    fn overrides(&self, catalog: Option<PathBuf>) -> Overrides {
        Overrides {
            source: self.source.map(SourceKind::from),
            catalog,
            output_dir: self.output.clone(),
            max_soft_retries: self.max_soft_retries,
            no_cache: self.no_cache,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::initialize(cli.verbose, cli.log_file.as_deref());

    let mut config = HarvestConfig::discover(cli.config.as_deref())?;
    match cli.command {
        Commands::Run(args) => {
            config.apply(args.common.overrides(args.catalog.clone()));
            commands::run(&config, args.start, args.resume).await
        }
        Commands::Index(args) => {
            config.apply(args.common.overrides(None));
            commands::index(&config, &args.title, &args.url).await
        }
        Commands::ClearCache(args) => commands::clear_cache(&config, args.namespace.as_deref()),
    }
}

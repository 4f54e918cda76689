//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no side effects or I/O happen here.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// logroute -- rule-based log routing and transformation.
///
/// Use `logroute <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "logroute", version, about, long_about = None)]
pub struct Cli {
    /// Path to the logroute.toml configuration file.
    ///
    /// Without it, built-in defaults plus `LOGROUTE_*` environment overrides are used.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Route an NDJSON log file through the rule engine.
    Route(RouteArgs),

    /// Inspect and validate routing rules.
    Rules(RulesArgs),

    /// Inspect and validate configuration.
    Config(ConfigArgs),
}

// ---- route ----

/// Route records from a newline-delimited JSON file.
///
/// Every destination named by the rules gets a spool file
/// `<out-dir>/<destination>.ndjson`; the `stdout` destination prints instead.
#[derive(Args, Debug)]
pub struct RouteArgs {
    /// NDJSON input file (one JSON object per line).
    pub input: PathBuf,

    /// Rule file or directory. Defaults to `router.rules_path`.
    #[arg(short, long)]
    pub rules: Option<PathBuf>,

    /// Directory receiving the per-destination spool files.
    #[arg(short = 'o', long, default_value = "spool")]
    pub out_dir: PathBuf,

    /// JSON GeoIP table (`{"ip": {"country": ...}}`) for `geoip_enrich`.
    #[arg(long)]
    pub geoip: Option<PathBuf>,

    /// Records per engine batch.
    #[arg(long, default_value_t = 1000)]
    pub batch_size: usize,
}

// ---- rules ----

/// Manage routing rules.
#[derive(Args, Debug)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub action: RulesAction,
}

#[derive(Subcommand, Debug)]
pub enum RulesAction {
    /// List loaded rules in evaluation order.
    List {
        /// Rule file or directory. Defaults to `router.rules_path`.
        path: Option<PathBuf>,
    },
    /// Validate rule files and report every rejected rule.
    Validate {
        /// Rule file or directory. Defaults to `router.rules_path`.
        path: Option<PathBuf>,
    },
}

// ---- config ----

/// Manage logroute configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, router, dispatch, metrics, enrichment).
        #[arg(long)]
        section: Option<String>,
    },
}

//! Muzzle command-line tool.
//!
//! Provides the `muzzle` binary with two subcommands:
//! - `collect` decodes advice units from a classpath and writes the
//!   resulting collection (reference graph plus helper order) as JSON.
//! - `check` loads such a collection and matches it against a target
//!   classpath, printing every mismatch as JSON.
//!
//! Logs go to stderr; stdout carries only JSON.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::Level;

use muzzle_check::{Environment, MatcherConfig, Mismatch, ReferenceMatcher};
use muzzle_collect::{CollectError, Collection, Collector, CollectorConfig};
use muzzle_core::CompositeProvider;

/// Directories a provider resource can live under, relative to the
/// classpath root.
const RESOURCE_ROOTS: [&str; 3] = [
    "META-INF/services/",
    "software/amazon/awssdk/",
    "com/amazonaws/",
];

/// Reference collection and compatibility checking for injected code.
#[derive(Parser)]
#[command(name = "muzzle", about = "Reference collection and compatibility checking")]
struct Cli {
    /// JSON config file with optional `collector` and `matcher` sections.
    #[arg(long, global = true, env = "MUZZLE_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Collect references from advice units and export them as JSON.
    Collect {
        /// Class directory or jar holding the advice and helper units.
        #[arg(long, required = true)]
        classpath: Vec<PathBuf>,

        /// Internal namespace prefix. Overrides the config file.
        #[arg(long)]
        internal: Vec<String>,

        /// Advice unit to collect from.
        #[arg(long)]
        advice: Vec<String>,

        /// Provider resource file, e.g. `.../META-INF/services/<name>`.
        #[arg(long)]
        resource: Vec<PathBuf>,

        /// Keep only references that must be checked against a library.
        #[arg(long)]
        prune: bool,

        /// Output file (default: stdout).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Check an exported collection against a target classpath.
    Check {
        /// Collection JSON written by `collect`.
        #[arg(long)]
        graph: PathBuf,

        /// Class directory or jar of the target environment.
        #[arg(long, required = true)]
        classpath: Vec<PathBuf>,

        /// Class directory or jar searched before the classpath.
        #[arg(long)]
        bootstrap: Vec<PathBuf>,

        /// Environment name used in reports.
        #[arg(long, default_value = "target")]
        name: String,
    },
}

/// Contents of a `--config` file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    collector: CollectorConfig,
    matcher: MatcherConfig,
}

/// Output of `check`.
#[derive(Serialize)]
struct CheckReport<'a> {
    environment: &'a str,
    matches: bool,
    mismatches: &'a [Mismatch],
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(code) => process::exit(code),
    };

    let exit_code = match cli.command {
        Commands::Collect {
            classpath,
            internal,
            advice,
            resource,
            prune,
            out,
        } => {
            let mut collector_config = config.collector;
            if !internal.is_empty() {
                collector_config.internal_prefixes = internal;
            }
            run_collect(
                collector_config,
                &classpath,
                &advice,
                &resource,
                prune,
                out.as_deref(),
            )
        }
        Commands::Check {
            graph,
            classpath,
            bootstrap,
            name,
        } => run_check(config.matcher, &graph, &classpath, &bootstrap, name),
    };
    process::exit(exit_code);
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

/// Reads the config file, if any. Errors map to exit codes: 3 when the
/// file cannot be read, 1 when it cannot be parsed.
fn load_config(path: Option<&Path>) -> Result<FileConfig, i32> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    let text = fs::read_to_string(path).map_err(|e| {
        eprintln!("Error: failed to read config '{}': {}", path.display(), e);
        3
    })?;
    parse_config(&text).map_err(|e| {
        eprintln!("Error: invalid config '{}': {}", path.display(), e);
        1
    })
}

fn parse_config(text: &str) -> Result<FileConfig, serde_json::Error> {
    serde_json::from_str(text)
}

/// Execute the collect subcommand.
///
/// Returns exit code: 0 = success, 1 = collection or usage error,
/// 3 = I/O error.
fn run_collect(
    config: CollectorConfig,
    classpath: &[PathBuf],
    advice: &[String],
    resources: &[PathBuf],
    prune: bool,
    out: Option<&Path>,
) -> i32 {
    if advice.is_empty() && resources.is_empty() {
        eprintln!("Error: nothing to collect, pass --advice or --resource");
        return 1;
    }
    if config.internal_prefixes.is_empty() {
        tracing::warn!("no internal prefixes configured, only advice units will be decoded");
    }

    let provider = match CompositeProvider::from_classpath(classpath) {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 3;
        }
    };
    let mut collector = Collector::new(provider, config);

    for root in advice {
        if let Err(e) = collector.collect_from_advice(root) {
            return report_collect_error(&e);
        }
    }
    for path in resources {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                eprintln!("Error: failed to read resource '{}': {}", path.display(), e);
                return 3;
            }
        };
        if let Err(e) = collector.collect_from_resource(&resource_name(path), &contents) {
            return report_collect_error(&e);
        }
    }
    if prune {
        collector.prune();
    }

    let collection = match collector.finish() {
        Ok(collection) => collection,
        Err(e) => return report_collect_error(&e),
    };
    let json = match collection.to_json() {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Error: failed to serialize collection: {}", e);
            return 1;
        }
    };

    match out {
        Some(path) => {
            if let Err(e) = fs::write(path, json) {
                eprintln!("Error: failed to write '{}': {}", path.display(), e);
                return 3;
            }
            tracing::info!(
                path = %path.display(),
                references = collection.references.len(),
                helpers = collection.helper_classes.len(),
                "wrote collection"
            );
        }
        None => println!("{}", json),
    }
    0
}

fn report_collect_error(err: &CollectError) -> i32 {
    eprintln!("Collection failed: {}", err);
    match err {
        CollectError::Provider(_) => 3,
        _ => 1,
    }
}

/// Execute the check subcommand.
///
/// Returns exit code: 0 = environment matches, 1 = invalid collection,
/// 2 = mismatches found, 3 = I/O error.
fn run_check(
    config: MatcherConfig,
    graph: &Path,
    classpath: &[PathBuf],
    bootstrap: &[PathBuf],
    name: String,
) -> i32 {
    let json = match fs::read_to_string(graph) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Error: failed to read '{}': {}", graph.display(), e);
            return 3;
        }
    };
    let collection = match Collection::from_json(&json) {
        Ok(collection) => collection,
        Err(e) => {
            eprintln!("Error: invalid collection '{}': {}", graph.display(), e);
            return 1;
        }
    };

    let env = match open_environment(name, classpath, bootstrap) {
        Ok(env) => env,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return 3;
        }
    };

    let matcher =
        ReferenceMatcher::with_config(collection.references, collection.helper_classes, config);
    let mismatches = matcher.mismatches(&env);
    for mismatch in &mismatches {
        tracing::info!("{}", mismatch);
    }

    let report = CheckReport {
        environment: env.name(),
        matches: mismatches.is_empty(),
        mismatches: &mismatches,
    };
    let json = serde_json::to_string_pretty(&report)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize report: {}\"}}", e));
    println!("{}", json);

    if mismatches.is_empty() {
        0
    } else {
        2
    }
}

fn open_environment(
    name: String,
    classpath: &[PathBuf],
    bootstrap: &[PathBuf],
) -> Result<std::sync::Arc<Environment>, String> {
    let provider = CompositeProvider::from_classpath(classpath).map_err(|e| e.to_string())?;
    if bootstrap.is_empty() {
        return Ok(Environment::new(name, provider));
    }
    let bootstrap = CompositeProvider::from_classpath(bootstrap).map_err(|e| e.to_string())?;
    Ok(Environment::with_bootstrap(name, provider, bootstrap))
}

/// The resource name of a provider file on disk: everything from the
/// first resource root on. Other paths are passed through unchanged.
fn resource_name(path: &Path) -> String {
    let path = path.to_string_lossy().replace('\\', "/");
    let start = RESOURCE_ROOTS
        .iter()
        .filter_map(|root| path.find(root))
        .min();
    match start {
        Some(start) => path[start..].to_string(),
        None => path,
    }
}

use anyhow::{Context, Result};
use clap::Parser;
use ders::{
    cache::Cache,
    checker::{OsvClient, VulnerabilityDatabase, VulnerabilityScanner, VulnerabilitySource},
    config::Config,
    manifest::Manifest,
    output::{format_result_to_string, print_result, OutputFormat},
    pipeline::{build_report, resolve_installed, InstalledSet},
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Exit codes for CI integration
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const FINDINGS: u8 = 2;
}

#[derive(Parser)]
#[command(name = "ders")]
#[command(
    author,
    version,
    about = "Dependency Exposure & Risk Scanner: resolve a manifest's dependencies and check them for known vulnerabilities"
)]
struct Cli {
    /// Path to requirements.txt (or similar) listing the project's dependencies
    manifest: PathBuf,

    /// Query OSV.dev instead of a local vulnerability database
    #[arg(long)]
    online: bool,

    /// Local vulnerability database (JSON)
    #[arg(long, value_name = "PATH")]
    vuln_db: Option<PathBuf>,

    /// Scan only the manifest's exact pins, without installing anything
    #[arg(long)]
    no_resolve: bool,

    /// Python interpreter used to create the resolution sandbox
    #[arg(long, value_name = "BIN")]
    python: Option<String>,

    /// Output format (text, table, json)
    #[arg(short, long)]
    format: Option<String>,

    /// Write output to file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Maximum simultaneous queries to the remote feed
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Per-query timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Do not read or write cached feed responses
    #[arg(long)]
    no_cache: bool,

    /// Clear cached feed responses before scanning
    #[arg(long)]
    clear_cache: bool,

    /// Exit with code 2 if any vulnerability is found
    #[arg(long)]
    fail_on_findings: bool,

    /// Verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "ders=debug",
        _ => "ders=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<u8> {
    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: ignoring config file: {:#}", e);
        Config::default()
    });
    if let Some(n) = cli.concurrency {
        config.max_concurrent_queries = n;
    }
    if let Some(secs) = cli.timeout {
        config.request_timeout_secs = secs;
    }

    let format_str = cli.format.clone().unwrap_or(config.default_format.clone());
    let format = OutputFormat::from_str(&format_str).map_err(|e| anyhow::anyhow!(e))?;
    let interactive = format.is_interactive() && cli.output.is_none();

    // Manifest problems are fatal before any other work starts
    let manifest = match Manifest::load(&cli.manifest) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(exit_codes::ERROR);
        }
    };

    let cache = Cache::with_ttl_hours(config.cache_ttl_hours);
    if cli.clear_cache {
        cache.clear()?;
    }

    let source = match select_source(&cli, &config, cache)? {
        Some(source) => source,
        None => {
            eprintln!("Error: no scanning mode available. Use --online or provide --vuln-db.");
            return Ok(exit_codes::ERROR);
        }
    };

    let installed = if cli.no_resolve {
        InstalledSet::from_pins(&manifest)
    } else {
        let pb = spinner(interactive, "Resolving full dependency graph...");
        let python = cli.python.clone().unwrap_or(config.python.clone());
        let set = resolve_installed(&manifest, &python, config.request_timeout()).await;
        if let Some(pb) = pb {
            pb.finish_with_message(format!("Resolved {} dependencies", set.dependencies.len()));
        }
        set
    };
    debug!("Scanning {} dependencies", installed.dependencies.len());

    let pb = spinner(interactive, "Checking for vulnerabilities...");
    let scanner = VulnerabilityScanner::new(config.max_concurrent_queries, config.request_timeout());
    let report = build_report(installed, &source, &scanner, &config.ignore).await;
    if let Some(pb) = pb {
        pb.finish_with_message(format!("Found {} vulnerabilities", report.findings.len()));
    }

    if let Some(path) = &cli.output {
        let content = format_result_to_string(&report, format)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        if interactive {
            println!("Results written to: {}", path.display());
        }
    } else {
        print_result(&report, format)?;
    }

    if cli.fail_on_findings && !report.findings.is_empty() {
        Ok(exit_codes::FINDINGS)
    } else {
        Ok(exit_codes::SUCCESS)
    }
}

/// Remote when `--online` is set, else the database from the flag or config.
fn select_source(cli: &Cli, config: &Config, cache: Cache) -> Result<Option<VulnerabilitySource>> {
    if cli.online {
        let mut client = OsvClient::new(config.request_timeout())?;
        if !cli.no_cache {
            client = client.with_cache(cache);
        }
        return Ok(Some(VulnerabilitySource::Remote(Arc::new(client))));
    }

    match cli.vuln_db.as_ref().or(config.vuln_db.as_ref()) {
        Some(path) => {
            let db = VulnerabilityDatabase::load(path)?;
            debug!("Loaded {} packages from {}", db.len(), path.display());
            Ok(Some(VulnerabilitySource::Local(db)))
        }
        None => Ok(None),
    }
}

fn spinner(enabled: bool, message: &'static str) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }

    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(message);
    Some(pb)
}

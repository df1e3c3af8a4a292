//! CLI for the metadex definition index.
//!
//! Loads a JSON-lines definition file into a cache and answers lookups
//! against it, or replays data points through the ingest path.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};
use metadex::{
    CacheConfig, DefCache, JsonLinesStore, MetricData, MetricDefinition, OrgId, SHARED_ORG,
};
use tracing_subscriber::EnvFilter;

/// metadex: in-memory metric definition index CLI.
#[derive(Parser)]
#[command(name = "metadex", version, about)]
struct Cli {
    /// Definitions read per bootstrap page.
    #[arg(long, global = true, default_value = "1000")]
    page_size: usize,

    /// Freshness window (e.g., "6h", "30m").
    #[arg(long, global = true, default_value = "6h")]
    freshness: String,

    /// Interval between background prune passes (e.g., "3m").
    #[arg(long, global = true, default_value = "3m")]
    prune_interval: String,

    /// Fraction of live series above which a trigram is pruned.
    #[arg(long, global = true, default_value = "0.2")]
    prune_threshold: f64,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Summarize a definition file: series, tenants and index settings.
    Info {
        /// Path to the JSON-lines definition file.
        store_path: PathBuf,
    },

    /// Look up one definition by external id.
    Get {
        /// Path to the JSON-lines definition file.
        store_path: PathBuf,

        /// External series id.
        id: String,
    },

    /// Resolve a pattern such as `servers.*.cpu.idle`.
    Find {
        /// Path to the JSON-lines definition file.
        store_path: PathBuf,

        /// Glob pattern to resolve.
        pattern: String,

        /// Tenant to query as (-1 sees every tenant).
        #[arg(long, default_value_t = SHARED_ORG, allow_negative_numbers = true)]
        org: OrgId,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,
    },

    /// List every definition visible to a tenant.
    List {
        /// Path to the JSON-lines definition file.
        store_path: PathBuf,

        /// Tenant to query as (-1 sees every tenant).
        #[arg(long, default_value_t = SHARED_ORG, allow_negative_numbers = true)]
        org: OrgId,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,
    },

    /// Print cache counters and timers as JSON after loading and one
    /// prune pass.
    Stats {
        /// Path to the JSON-lines definition file.
        store_path: PathBuf,

        /// Patterns to resolve before reading the timers. Repeatable.
        #[arg(long)]
        pattern: Vec<String>,

        /// Tenant to resolve patterns as.
        #[arg(long, default_value_t = SHARED_ORG, allow_negative_numbers = true)]
        org: OrgId,
    },

    /// Replay JSON-lines data points through the ingest path.
    Ingest {
        /// Path to the JSON-lines definition file. New and refreshed
        /// definitions are appended to it.
        store_path: PathBuf,

        /// Path to a JSON-lines file of data points.
        points: PathBuf,
    },
}

/// Output format for lookup results.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values.
    Csv,
    /// JSON array of objects.
    Json,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = Loader::from_cli(&cli).and_then(|loader| match cli.command {
        Commands::Info { store_path } => cmd_info(&loader, &store_path),
        Commands::Get { store_path, id } => cmd_get(&loader, &store_path, &id),
        Commands::Find {
            store_path,
            pattern,
            org,
            format,
        } => cmd_find(&loader, &store_path, org, &pattern, &format),
        Commands::List {
            store_path,
            org,
            format,
        } => cmd_list(&loader, &store_path, org, &format),
        Commands::Stats {
            store_path,
            pattern,
            org,
        } => cmd_stats(&loader, &store_path, org, &pattern),
        Commands::Ingest { store_path, points } => cmd_ingest(&loader, &store_path, &points),
    });

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Settings shared by every command that opens a definition file.
struct Loader {
    page_size: usize,
    config: CacheConfig,
}

impl Loader {
    fn from_cli(cli: &Cli) -> CliResult<Self> {
        if cli.page_size == 0 {
            return Err("--page-size must be at least 1".into());
        }
        let config = CacheConfig {
            freshness_window: parse_duration(&cli.freshness)?,
            prune_interval: parse_duration(&cli.prune_interval)?,
            prune_threshold: cli.prune_threshold,
        };
        config.validate()?;
        Ok(Self {
            page_size: cli.page_size,
            config,
        })
    }

    /// Opens a definition file and bootstraps a cache from it.
    fn open(&self, store_path: &Path) -> CliResult<DefCache> {
        let start = Instant::now();
        let store = Arc::new(JsonLinesStore::new(store_path, self.page_size));
        let cache = DefCache::new(store, self.config.clone())?;
        tracing::info!(
            path = %store_path.display(),
            series = cache.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "loaded definitions"
        );
        Ok(cache)
    }
}

/// Implements `metadex info <store_path>`.
fn cmd_info(loader: &Loader, store_path: &Path) -> CliResult {
    let cache = loader.open(store_path)?;
    let defs = cache.list(SHARED_ORG);

    let mut orgs: Vec<OrgId> = defs.iter().map(|d| d.org_id).collect();
    orgs.sort_unstable();
    orgs.dedup();

    println!("Store: {}", store_path.display());
    println!();
    println!("Series:        {}", cache.len());
    println!("External ids:  {}", cache.known_ids());
    println!("Tenants:       {}", orgs.len());
    for org in &orgs {
        let count = defs.iter().filter(|d| d.org_id == *org).count();
        let label = if *org == SHARED_ORG {
            "shared".to_string()
        } else {
            org.to_string()
        };
        println!("  {label:>8}: {count}");
    }

    let config = cache.config();
    println!();
    println!(
        "Freshness:     {}",
        format_duration_secs(config.freshness_window.as_secs())
    );
    println!(
        "Prune:         every {}, threshold {}",
        format_duration_secs(config.prune_interval.as_secs()),
        config.prune_threshold
    );
    Ok(())
}

/// Implements `metadex get <store_path> <id>`.
fn cmd_get(loader: &Loader, store_path: &Path, id: &str) -> CliResult {
    let cache = loader.open(store_path)?;
    let def = cache
        .get(id)
        .ok_or_else(|| format!("No definition with id '{id}'"))?;
    println!("{}", serde_json::to_string_pretty(&*def)?);
    Ok(())
}

/// Implements `metadex find <store_path> <pattern>`.
fn cmd_find(
    loader: &Loader,
    store_path: &Path,
    org: OrgId,
    pattern: &str,
    format: &OutputFormat,
) -> CliResult {
    let cache = loader.open(store_path)?;
    let start = Instant::now();
    let (kind, found) = cache.find(org, pattern);
    tracing::debug!(
        %kind,
        matches = found.len(),
        elapsed_us = start.elapsed().as_micros(),
        "resolved pattern"
    );

    let defs: Vec<&MetricDefinition> = found.iter().map(|m| m.definition.as_ref()).collect();
    print_definitions(&defs, format)?;
    eprintln!("{} matches ({kind} lookup)", found.len());
    Ok(())
}

/// Implements `metadex list <store_path>`.
fn cmd_list(loader: &Loader, store_path: &Path, org: OrgId, format: &OutputFormat) -> CliResult {
    let cache = loader.open(store_path)?;
    let defs = cache.list(org);
    let defs: Vec<&MetricDefinition> = defs.iter().map(AsRef::as_ref).collect();
    print_definitions(&defs, format)
}

/// Implements `metadex stats <store_path>`.
fn cmd_stats(loader: &Loader, store_path: &Path, org: OrgId, patterns: &[String]) -> CliResult {
    let cache = loader.open(store_path)?;
    for pattern in patterns {
        let (kind, found) = cache.find(org, pattern);
        tracing::info!(%pattern, %kind, matches = found.len(), "resolved pattern");
    }
    let pruned = cache.prune_now();
    cache.shutdown();

    let report = serde_json::json!({
        "series": cache.len(),
        "external_ids": cache.known_ids(),
        "pruned_now": pruned,
        "stats": cache.stats(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Implements `metadex ingest <store_path> <points>`.
fn cmd_ingest(loader: &Loader, store_path: &Path, points: &Path) -> CliResult {
    let cache = loader.open(store_path)?;
    let before = cache.len();

    let file = std::fs::File::open(points)
        .map_err(|e| format!("Cannot open '{}': {e}", points.display()))?;
    let start = Instant::now();
    let mut count: u64 = 0;
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let data: MetricData = serde_json::from_str(&line)
            .map_err(|e| format!("{}:{}: {e}", points.display(), lineno + 1))?;
        cache.add(&data);
        count += 1;
    }
    let elapsed = start.elapsed();
    cache.shutdown();

    let stats = cache.stats();
    println!("Ingested {count} points in {elapsed:.2?}");
    println!("  New series:     {}", cache.len() - before);
    println!(
        "  Writes:         {} ok, {} failed",
        stats.write_through_ok, stats.write_through_fail
    );
    println!(
        "  Write latency:  {:.2?} mean, {:.2?} max",
        stats.write_through.mean(),
        Duration::from_nanos(stats.write_through.max_ns)
    );
    Ok(())
}

fn print_definitions(defs: &[&MetricDefinition], format: &OutputFormat) -> CliResult {
    match format {
        OutputFormat::Csv => {
            println!("id,org_id,name,interval,last_update");
            for def in defs {
                println!(
                    "{},{},{},{},{}",
                    def.id, def.org_id, def.name, def.interval, def.last_update
                );
            }
        }
        OutputFormat::Json => {
            let rows: Vec<serde_json::Value> = defs
                .iter()
                .map(|def| {
                    serde_json::json!({
                        "id": def.id,
                        "org_id": def.org_id,
                        "name": def.name,
                        "interval": def.interval,
                        "unit": def.unit,
                        "tags": def.tags,
                        "last_update": def.last_update,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }
    Ok(())
}

/// Parses a human-readable duration string (e.g., "6h", "30m", "1d").
fn parse_duration(s: &str) -> CliResult<Duration> {
    let s = s.trim();
    let Some((split, unit)) = s.char_indices().last() else {
        return Err("Empty duration string".into());
    };
    let num: u64 = s[..split]
        .parse()
        .map_err(|e| format!("Invalid duration '{s}': {e}"))?;

    let scale = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        'd' => 86400,
        _ => return Err(format!("Unknown duration unit: '{unit}'. Use s, m, h, or d.").into()),
    };

    let secs = num
        .checked_mul(scale)
        .ok_or_else(|| format!("Duration '{s}' is too large"))?;
    Ok(Duration::from_secs(secs))
}

/// Formats seconds as a human-readable duration.
fn format_duration_secs(secs: u64) -> String {
    if secs >= 86400 && secs.is_multiple_of(86400) {
        format!("{}d", secs / 86400)
    } else if secs >= 3600 && secs.is_multiple_of(3600) {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs.is_multiple_of(60) {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

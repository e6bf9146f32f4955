//! FeedMerge CLI: fetch, inspect and export multi-provider market data.
//!
//! Commands:
//! - `fetch`: fetch bars for tickers from one or more providers and export CSV or JSON
//! - `tickers`: list or search the built-in ticker registry
//! - `tiers`: show the output tiers and their columns
//! - `config init`: print a default engine config

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use feedmerge_core::export::{self, ExportFormat};
use feedmerge_core::orchestrator::StderrProgress;
use feedmerge_core::{
    merge, CancelToken, DateRange, EngineConfig, Engine, FetchRequest, FetchSummary, Frequency,
    MergeMode, ProviderName, Tier, TickerRegistry,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "feedmerge",
    about = "FeedMerge CLI: multi-provider market-data aggregation"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch bars for tickers across providers and export the result.
    Fetch {
        /// Canonical tickers (e.g., SPX QQQ ES).
        #[arg(required = true)]
        tickers: Vec<String>,

        /// Start date (YYYY-MM-DD). Defaults to 30 days before --end.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<String>,

        /// Bar frequency: minute, hour or day.
        #[arg(long, default_value = "day")]
        frequency: String,

        /// Output tier: lite, standard or full.
        #[arg(long, default_value = "lite")]
        tier: String,

        /// Comma-separated providers, in request order.
        #[arg(long, value_delimiter = ',', default_value = "eodhd,polygon")]
        providers: Vec<String>,

        /// Combine providers into one row per timestamp.
        #[arg(long, default_value_t = false)]
        merge: bool,

        /// Comma-separated merge precedence. Defaults to --providers order.
        #[arg(long, value_delimiter = ',')]
        precedence: Vec<String>,

        /// Export format: csv or json.
        #[arg(long, default_value = "csv")]
        format: String,

        /// Output file. Defaults to stdout.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Engine config TOML. Defaults to built-in settings.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List registry tickers, optionally filtered by prefix.
    Tickers {
        /// Id prefix or label fragment.
        prefix: Option<String>,
    },
    /// Show tier column counts, or the columns of one tier.
    Tiers {
        /// Tier name (lite, standard, full).
        name: Option<String>,
    },
    /// Engine config helpers.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the default config as TOML.
    Init,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch {
            tickers,
            start,
            end,
            frequency,
            tier,
            providers,
            merge,
            precedence,
            format,
            output,
            config,
        } => run_fetch(FetchArgs {
            tickers,
            start,
            end,
            frequency,
            tier,
            providers,
            merge,
            precedence,
            format,
            output,
            config,
        }),
        Commands::Tickers { prefix } => run_tickers(prefix.as_deref()),
        Commands::Tiers { name } => run_tiers(name.as_deref()),
        Commands::Config { action } => match action {
            ConfigAction::Init => {
                print!("{}", EngineConfig::default().to_toml()?);
                Ok(())
            }
        },
    }
}

struct FetchArgs {
    tickers: Vec<String>,
    start: Option<String>,
    end: Option<String>,
    frequency: String,
    tier: String,
    providers: Vec<String>,
    merge: bool,
    precedence: Vec<String>,
    format: String,
    output: Option<PathBuf>,
    config: Option<PathBuf>,
}

fn parse_date(s: &str, flag: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("{flag} must be YYYY-MM-DD, got '{s}'"))
}

fn parse_providers(names: &[String]) -> Result<Vec<ProviderName>> {
    names
        .iter()
        .filter(|n| !n.trim().is_empty())
        .map(|n| n.parse::<ProviderName>().map_err(anyhow::Error::from))
        .collect()
}

fn run_fetch(args: FetchArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };

    let end = args
        .end
        .as_deref()
        .map(|s| parse_date(s, "--end"))
        .transpose()?
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let start = args
        .start
        .as_deref()
        .map(|s| parse_date(s, "--start"))
        .transpose()?
        .unwrap_or_else(|| end - chrono::Duration::days(30));
    let range = DateRange::new(start, end)?;

    let frequency: Frequency = args.frequency.parse().map_err(anyhow::Error::msg)?;
    let tier: Tier = args.tier.parse().map_err(anyhow::Error::msg)?;
    let format: ExportFormat = args.format.parse().map_err(anyhow::Error::msg)?;
    let providers = parse_providers(&args.providers)?;
    if providers.is_empty() {
        bail!("--providers must name at least one provider");
    }
    let precedence = parse_providers(&args.precedence)?;

    let mode = if args.merge {
        MergeMode::Merged
    } else {
        MergeMode::Separate
    };
    let mut request = FetchRequest::new(&args.tickers, range, frequency, tier, &providers)
        .with_credentials(config.credentials_from_env())
        .with_merge_mode(mode);
    if !precedence.is_empty() {
        request = request.with_precedence(&precedence);
    }

    for provider in &request.providers {
        if !request.credentials.has(*provider) {
            eprintln!(
                "warning: {} not set, {} pairs will report credential_missing",
                config.providers.get(*provider).api_key_env,
                provider.display_name()
            );
        }
    }

    let engine = Engine::from_config(&config)?;
    let outcomes = engine.execute_with(&request, &CancelToken::new(), &StderrProgress)?;
    let summary = FetchSummary::from_outcomes(&outcomes);

    let table = merge(&outcomes, tier, mode, &request.merge_precedence());
    let rendered = export::render(&table, format)?;
    let fingerprint = export::fingerprint(&table)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("Wrote {} rows to {}", table.len(), path.display());
        }
        None => print!("{rendered}"),
    }
    info!(rows = table.len(), %fingerprint, "export complete");

    if summary.succeeded == 0 {
        bail!("no (ticker, provider) pair succeeded");
    }
    Ok(())
}

fn run_tickers(prefix: Option<&str>) -> Result<()> {
    let registry = TickerRegistry::builtin();
    let hits = registry.search(prefix.unwrap_or(""));
    if hits.is_empty() {
        bail!("no tickers match '{}'", prefix.unwrap_or(""));
    }

    println!("{:<8} {:<36} providers", "id", "label");
    for ticker in hits {
        let providers: Vec<&str> = ticker.providers().map(|p| p.as_str()).collect();
        println!("{:<8} {:<36} {}", ticker.id, ticker.label, providers.join(","));
    }
    Ok(())
}

fn run_tiers(name: Option<&str>) -> Result<()> {
    match name {
        Some(name) => {
            let tier: Tier = name.parse().map_err(anyhow::Error::msg)?;
            for (i, column) in tier.columns().iter().enumerate() {
                println!("{:>3}  {}", i + 1, column.name);
            }
        }
        None => {
            for tier in Tier::ALL {
                println!("{:<10} {:>3} columns", tier.as_str(), tier.column_count());
            }
        }
    }
    Ok(())
}

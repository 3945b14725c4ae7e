//! iopsdash CLI - Static IOPS and latency dashboards for storage benchmarks

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{error, info, warn};
use url::Url;

use iopsdash::{
    aggregate::{self, AggregateOptions},
    config::{ChartSpec, DashboardConfig},
    dashboard::Dashboard,
    data::{ChartKey, TimeRange},
    format::format_generated_time,
    html,
    loader::{self, AutoSource, DataLoader},
    visibility::FilterSelection,
};

/// iopsdash: IOPS and latency dashboards for storage benchmarks
#[derive(Parser, Debug)]
#[command(name = "iopsdash")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render the dashboard page from a results document
    Render(RenderArgs),

    /// Print the summary of a results document
    Summary(SummaryArgs),

    /// Build a results document from per-commit raw result files
    Aggregate(AggregateArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Path or URL of the results document
    #[arg(short, long, env = "IOPSDASH_DATA", default_value = "data.json")]
    data: String,

    /// Output directory for the dashboard
    #[arg(short, long, env = "IOPSDASH_OUTPUT_DIR", default_value = "dist")]
    output_dir: PathBuf,

    /// Dashboard title
    #[arg(long, default_value = "Storage Performance Dashboard")]
    title: String,

    /// Public URL of the page; its `days` parameter selects the time range
    #[arg(long, env = "IOPSDASH_PAGE_URL")]
    page_url: Option<Url>,

    /// Time range in days, or "all" (overrides the page URL)
    #[arg(long)]
    days: Option<String>,

    /// Charts to show (comma-separated, e.g. "iops_by_config,latency_by_branch")
    #[arg(long)]
    charts: Option<String>,
}

#[derive(Parser, Debug)]
struct SummaryArgs {
    /// Path or URL of the results document
    #[arg(short, long, env = "IOPSDASH_DATA", default_value = "data.json")]
    data: String,
}

#[derive(Parser, Debug)]
struct AggregateArgs {
    /// Directory holding `{config}/{commit}.json` raw results
    #[arg(short, long, value_name = "DIR")]
    input_dir: PathBuf,

    /// Path of the results document to write
    #[arg(short, long, default_value = "data.json")]
    output: PathBuf,

    /// Time window in days, or "all"
    #[arg(long, default_value = "30")]
    days: String,

    /// Report link template with {config} and {commit} placeholders
    #[arg(long, env = "IOPSDASH_REPORT_URL")]
    report_url_template: Option<String>,

    /// Only include these configurations (comma-separated)
    #[arg(long, value_delimiter = ',')]
    configs: Vec<String>,

    /// Only include these branches (comma-separated)
    #[arg(long, value_delimiter = ',')]
    branches: Vec<String>,

    /// Only include these metric tags, e.g. "iops_read" (comma-separated)
    #[arg(long, value_delimiter = ',')]
    metrics: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    match cli.command {
        Commands::Render(args) => render_command(args),
        Commands::Summary(args) => summary_command(args),
        Commands::Aggregate(args) => aggregate_command(args),
    }
}

/// Load the document, build every chart and write the page
fn render_command(args: RenderArgs) -> Result<()> {
    let mut config = DashboardConfig {
        title: args.title,
        data_location: args.data,
        output_dir: args.output_dir,
        ..Default::default()
    };

    if let Some(page_url) = args.page_url {
        config = config.with_page_url(page_url);
    }
    if let Some(days) = args.days {
        config.time_range = days
            .parse::<TimeRange>()
            .with_context(|| format!("Invalid time range: {}", days))?;
    }
    if let Some(charts) = args.charts {
        config.charts = ChartSpec::parse_list(&charts).with_context(|| "Invalid chart list")?;
        if config.charts.is_empty() {
            anyhow::bail!("No charts selected");
        }
    }

    info!("Generating dashboard for {}", config.time_range);

    let mut dashboard = Dashboard::new(config, AutoSource::new());
    let loaded = dashboard.init();

    // The page is written either way; a failed load renders the error view
    let index = html::write_dashboard(
        &dashboard.view(),
        dashboard.document(),
        &dashboard.config().output_dir,
    )
    .with_context(|| "Failed to write dashboard")?;

    match loaded {
        Ok(()) => {
            info!("Dashboard generated at {}", index.display());
            Ok(())
        }
        Err(e) => {
            error!("Wrote error page to {}", index.display());
            Err(e).with_context(|| "Failed to load benchmark data")
        }
    }
}

/// Show the summary and facets of a results document
fn summary_command(args: SummaryArgs) -> Result<()> {
    let mut loader = DataLoader::new(AutoSource::new());
    loader
        .load(&args.data)
        .with_context(|| "Failed to load benchmark data")?;

    let summary = loader.summary();
    let filter = loader.filter();

    println!("## {}\n", args.data);
    match loader.generated_time() {
        Some(time) => println!("Generated: {}", format_generated_time(&time)),
        None => println!("Generated: unknown"),
    }
    match filter.days {
        Some(days) if filter.applied => println!("Window: last {} days", days),
        _ => println!("Window: all time"),
    }
    println!("Total tests: {}", summary.total_tests);
    println!("Configurations: {}", loader.unique_configs().join(", "));
    println!("Branches: {}", loader.unique_branches().join(", "));
    println!();

    for key in ChartKey::all() {
        println!("  - {}: {} records", key, loader.series_for(&key).len());
    }

    Ok(())
}

/// Aggregate raw result files into a results document
fn aggregate_command(args: AggregateArgs) -> Result<()> {
    let range = args
        .days
        .parse::<TimeRange>()
        .with_context(|| format!("Invalid time range: {}", args.days))?;

    let entries = loader::load_raw_results(&args.input_dir)
        .with_context(|| format!("Failed to read raw results from {:?}", args.input_dir))?;
    if entries.is_empty() {
        warn!("No raw results found in {:?}", args.input_dir);
    }

    let filter = if args.configs.is_empty() && args.branches.is_empty() && args.metrics.is_empty()
    {
        None
    } else {
        let mut filter = FilterSelection::all_of(&entries);
        let narrow = |set: &mut BTreeSet<String>, values: Vec<String>| {
            if !values.is_empty() {
                *set = values.into_iter().map(|v| v.trim().to_string()).collect();
            }
        };
        narrow(&mut filter.configs, args.configs);
        narrow(&mut filter.branches, args.branches);
        narrow(&mut filter.metrics, args.metrics);
        Some(filter)
    };

    let options = AggregateOptions {
        range,
        now: Utc::now(),
        report_url_template: args.report_url_template,
        filter,
    };

    let document = aggregate::aggregate(&entries, &options);

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    let content = serde_json::to_string_pretty(&document)?;
    std::fs::write(&args.output, content)
        .with_context(|| format!("Failed to write {:?}", args.output))?;

    info!(
        "Wrote {} results ({} configurations, {} branches) to {:?}",
        document.summary.total_tests,
        document.summary.configurations.len(),
        document.summary.branches.len(),
        args.output
    );

    Ok(())
}

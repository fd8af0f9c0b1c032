use std::{
    fs::{self, File},
    io::{self, BufWriter},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use cannibal_scan::{
    audit, filter_query, normalize,
    report::{self, HtmlReportData},
    Audit, Dataset, Record, Snapshot, CANNIBALIZATION_MIN_PAGES,
};

/// Rows of the normalized dataset echoed to the console.
const DATASET_PREVIEW_ROWS: usize = 5;

/// Check a search-analytics snapshot for keyword cannibalization.
///
/// Examples:
///   cannibal_scan search_snapshot.json --out ./reports
///   cannibal_scan search_snapshot.json --query "rust csv"
#[derive(Parser, Debug)]
#[command(name = "cannibal_scan", version)]
struct Config {
    /// Snapshot JSON written by search_fetch
    #[arg(value_name = "SNAPSHOT")]
    input_path: PathBuf,

    /// Specific query to analyze
    #[arg(short, long)]
    query: Option<String>,

    /// Output directory for CSV and HTML files
    #[arg(long = "out", value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Rows shown in the console query tables
    #[arg(long, default_value_t = 10)]
    top: usize,

    /// Minimum distinct pages for a query to be reported as cannibalized
    #[arg(long, default_value_t = CANNIBALIZATION_MIN_PAGES, value_parser = parse_min_pages)]
    min_pages: usize,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "CANNIBAL_SCAN_LOG", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn parse_min_pages(value: &str) -> Result<usize, String> {
    let pages: usize = value.parse().map_err(|e| format!("{e}"))?;
    if pages < CANNIBALIZATION_MIN_PAGES {
        return Err(format!("must be at least {CANNIBALIZATION_MIN_PAGES}"));
    }
    Ok(pages)
}

fn init_logging(config: &Config) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json_logs {
        registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(io::stderr).with_target(false))
            .try_init()
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialize logger: {e}"))
}

fn create_output(dir: &Path, name: &str) -> Result<(PathBuf, BufWriter<File>)> {
    let path = dir.join(name);
    let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok((path, BufWriter::new(file)))
}

fn write_outputs(
    out_dir: &Path,
    config: &Config,
    snapshot: &Snapshot,
    dataset: &Dataset,
    audit: &Audit,
) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {}", out_dir.display()))?;

    let (path, file) = create_output(out_dir, "all.csv")?;
    report::write_dataset_csv(file, dataset)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "dataset written");

    let (path, file) = create_output(out_dir, "summary.csv")?;
    report::write_summary_csv(file, &audit.summary)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "summary written");

    let (path, file) = create_output(out_dir, "query_stats.csv")?;
    report::write_query_csv(file, &audit.by_clicks)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "query stats written");

    let (path, file) = create_output(out_dir, "cannibalized.csv")?;
    report::write_query_csv(file, &audit.cannibalized)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "cannibalization report written");

    let html_path = out_dir.join("report.html");
    let data = HtmlReportData {
        source: config.input_path.display().to_string(),
        site_url: snapshot.site_url.clone(),
        start_date: snapshot.request.start_date.clone(),
        end_date: snapshot.request.end_date.clone(),
        total_rows: dataset.len(),
        min_pages: config.min_pages,
        summary: &audit.summary,
        top_queries: &audit.by_clicks,
        cannibalized: &audit.cannibalized,
    };
    report::write_html_report(&html_path, &data)
        .with_context(|| format!("Failed to write {}", html_path.display()))?;
    info!(path = %html_path.display(), "HTML report written");

    Ok(())
}

fn main() -> Result<()> {
    let config = Config::parse();
    init_logging(&config)?;

    let mut snapshot = Snapshot::load(&config.input_path)
        .with_context(|| format!("Failed to load snapshot: {}", config.input_path.display()))?;
    info!(
        site = %snapshot.site_url,
        start = %snapshot.request.start_date,
        end = %snapshot.request.end_date,
        rows = snapshot.response.rows.len(),
        "loaded snapshot"
    );

    let dimensions = snapshot.dimensions().context("Snapshot request has unusable dimensions")?;
    let rows = std::mem::take(&mut snapshot.response.rows);
    let dataset = normalize(&dimensions, rows)
        .context("Failed to normalize search analytics rows")?;
    if dataset.is_empty() {
        warn!("snapshot contains no rows; all views will be empty");
    }

    let audit = audit(&dataset, config.min_pages)?;
    info!(
        queries = audit.by_clicks.len(),
        cannibalized = audit.cannibalized.len(),
        "audit complete"
    );

    let records: Vec<&Record> = dataset.records().iter().collect();
    println!("{}", report::render_records(&dataset, &records, DATASET_PREVIEW_ROWS));
    println!("{}", report::render_summary(&audit.summary));
    println!("{}", report::render_query_table(&audit.by_clicks, config.top));
    println!(
        "{}",
        report::render_query_table(&audit.cannibalized, audit.cannibalized.len())
    );

    if let Some(out_dir) = &config.out_dir {
        write_outputs(out_dir, &config, &snapshot, &dataset, &audit)?;
    }

    if let Some(query) = &config.query {
        let rows = filter_query(&dataset, query)?;
        if rows.is_empty() {
            warn!(query = %query, "query not present in snapshot");
        }
        println!();
        println!("{}", report::render_records(&dataset, &rows, rows.len()));
    }

    Ok(())
}

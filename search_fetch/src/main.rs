use std::{
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{bail, Context, Result};
use cannibal_scan::{
    Dimension, SearchAnalyticsRequest, SearchAnalyticsResponse, SitesListResponse, Snapshot,
};
use chrono::{Local, Months, NaiveDate};
use clap::Parser;
use reqwest::{Client, RequestBuilder};
use tracing::info;
use url::Url;

/// Largest page the searchAnalytics.query endpoint serves.
const MAX_ROW_LIMIT: u32 = 25_000;

/// How far back the audited period starts by default.
const DEFAULT_LOOKBACK_MONTHS: u32 = 3;

/// Fetch one page of query/page performance rows and save it as a snapshot
/// for cannibal_scan.
///
/// Point SEARCH_CONSOLE_ENDPOINT at fake_search_console for local runs.
#[derive(Parser, Debug)]
#[command(name = "search_fetch", version)]
struct Config {
    /// URL address of website to audit (default: first property on the account)
    #[arg(short = 'u', long, env = "SITE_URL")]
    site_url: Option<String>,

    /// Start date of the audited period, YYYY-MM-DD (default: three months ago)
    #[arg(short = 's', long)]
    start_date: Option<NaiveDate>,

    /// End date of the audited period, YYYY-MM-DD (default: today)
    #[arg(short = 'e', long)]
    end_date: Option<NaiveDate>,

    /// Base URL of the webmasters v3 API
    #[arg(
        long,
        env = "SEARCH_CONSOLE_ENDPOINT",
        default_value = "https://www.googleapis.com/webmasters/v3"
    )]
    endpoint: Url,

    /// OAuth access token sent as a bearer token
    #[arg(long, env = "SEARCH_CONSOLE_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Maximum rows requested
    #[arg(long, default_value_t = 10_000)]
    row_limit: u32,

    /// Where the snapshot JSON is written
    #[arg(short = 'o', long, env = "SNAPSHOT_FILE", default_value = "search_snapshot.json")]
    output: PathBuf,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(log_level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {e}"))
}

/// Resolve the period and build the query body. Dimensions are fixed to
/// query + page.
fn build_request(
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    row_limit: u32,
    today: NaiveDate,
) -> Result<SearchAnalyticsRequest> {
    if row_limit == 0 || row_limit > MAX_ROW_LIMIT {
        bail!("--row-limit must be between 1 and {MAX_ROW_LIMIT}, got {row_limit}");
    }

    let end = end_date.unwrap_or(today);
    let start = match start_date {
        Some(date) => date,
        None => today
            .checked_sub_months(Months::new(DEFAULT_LOOKBACK_MONTHS))
            .context("default start date is out of range")?,
    };
    if start > end {
        bail!("start date {start} is after end date {end}");
    }

    Ok(SearchAnalyticsRequest {
        start_date: start.format("%Y-%m-%d").to_string(),
        end_date: end.format("%Y-%m-%d").to_string(),
        dimensions: vec![Dimension::Query, Dimension::Page],
        row_limit,
        start_row: 0,
    })
}

/// Append path segments to the API base, percent-encoding each one.
fn api_url(endpoint: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = endpoint.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("endpoint cannot be a base URL: {endpoint}"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn query_url(endpoint: &Url, site_url: &str) -> Result<Url> {
    api_url(endpoint, &["sites", site_url, "searchAnalytics", "query"])
}

fn with_auth(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

/// First property listed for the account.
async fn first_site(client: &Client, endpoint: &Url, token: Option<&str>) -> Result<String> {
    let url = api_url(endpoint, &["sites"])?;
    let sites: SitesListResponse = with_auth(client.get(url.clone()), token)
        .send()
        .await
        .with_context(|| format!("Failed to list sites at {url}"))?
        .error_for_status()
        .with_context(|| format!("Site listing rejected by {url}"))?
        .json()
        .await
        .context("Failed to decode site listing")?;

    match sites.site_entry.into_iter().next() {
        Some(entry) => Ok(entry.site_url),
        None => bail!("account has no Search Console properties; pass --site-url"),
    }
}

async fn fetch_rows(
    client: &Client,
    endpoint: &Url,
    token: Option<&str>,
    site_url: &str,
    payload: &SearchAnalyticsRequest,
) -> Result<SearchAnalyticsResponse> {
    let url = query_url(endpoint, site_url)?;
    let response = with_auth(client.post(url.clone()), token)
        .json(payload)
        .send()
        .await
        .with_context(|| format!("Failed to query {url}"))?
        .error_for_status()
        .with_context(|| format!("Query rejected by {url}"))?
        .json()
        .await
        .context("Failed to decode search analytics response")?;
    Ok(response)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    init_logging(&config.log_level)?;

    let payload = build_request(
        config.start_date,
        config.end_date,
        config.row_limit,
        Local::now().date_naive(),
    )?;

    let client = Client::new();
    let token = config.access_token.as_deref();

    let site_url = match config.site_url.clone() {
        Some(url) => url,
        None => {
            let url = first_site(&client, &config.endpoint, token).await?;
            info!(site = %url, "no --site-url given, using first property");
            url
        }
    };

    info!(
        site = %site_url,
        start = %payload.start_date,
        end = %payload.end_date,
        row_limit = payload.row_limit,
        "querying search analytics"
    );
    let response = fetch_rows(&client, &config.endpoint, token, &site_url, &payload).await?;
    info!(rows = response.rows.len(), "received rows");

    let snapshot = Snapshot {
        fetched_at_ms: SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis() as u64,
        site_url,
        request: payload,
        response,
    };

    let body = serde_json::to_vec_pretty(&snapshot).context("Failed to serialize snapshot")?;
    tokio::fs::write(&config.output, body)
        .await
        .with_context(|| format!("Failed to write snapshot: {}", config.output.display()))?;
    info!(path = %config.output.display(), "snapshot written");

    Ok(())
}

use std::{collections::BTreeMap, net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use cannibal_scan::{
    Dimension, RawRow, SearchAnalyticsRequest, SearchAnalyticsResponse, SiteEntry,
    SitesListResponse,
};
use clap::Parser;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::info;

/// Minimal stand-in for the two webmasters v3 endpoints search_fetch calls.
#[derive(Parser, Debug)]
#[command(name = "fake_search_console")]
struct Config {
    /// Address to listen on
    #[arg(long, env = "FAKE_SEARCH_CONSOLE_ADDR", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    /// The only property this account can see
    #[arg(long, default_value = "https://example.com/")]
    site_url: String,
}

struct AppState {
    site_url: String,
}

/// One synthetic query/page pair: (query, path, clicks, impressions, position).
/// Several queries are deliberately served by more than one page.
const CATALOGUE: &[(&str, &str, u64, u64, f64)] = &[
    ("running shoes", "products/running-shoes", 420, 9800, 3.2),
    ("running shoes", "blog/best-running-shoes", 133, 7400, 6.8),
    ("running shoes", "sale", 12, 2100, 14.5),
    ("trail running shoes", "products/trail", 96, 2300, 4.1),
    ("trail running shoes", "products/running-shoes", 21, 1900, 9.7),
    ("marathon training plan", "blog/marathon-plan", 310, 5200, 2.4),
    ("how to lace running shoes", "blog/lacing-guide", 88, 1500, 1.9),
    ("waterproof jacket", "products/jackets", 57, 3100, 7.3),
    ("waterproof jacket", "blog/rain-gear", 57, 2800, 8.0),
    ("shoe size chart", "help/sizing", 205, 3900, 1.3),
    ("free returns", "help/returns", 44, 800, 2.2),
];

fn dimension_value(
    dim: Dimension,
    query: &str,
    page: &str,
    request: &SearchAnalyticsRequest,
) -> String {
    match dim {
        Dimension::Query => query.to_string(),
        Dimension::Page => page.to_string(),
        Dimension::Country => "usa".to_string(),
        Dimension::Device => "DESKTOP".to_string(),
        Dimension::Date => request.start_date.clone(),
        Dimension::SearchAppearance => "WEBLITE".to_string(),
    }
}

#[derive(Default)]
struct RowTotals {
    clicks: u64,
    impressions: u64,
    weighted_position: f64,
}

/// Project the catalogue onto the requested dimensions, merging pairs that
/// collapse onto the same keys, then page through the result ordered by
/// clicks like the real endpoint does.
fn generate_rows(site_url: &str, request: &SearchAnalyticsRequest) -> Vec<RawRow> {
    let base = site_url.trim_end_matches('/');
    let mut grouped: BTreeMap<Vec<String>, RowTotals> = BTreeMap::new();

    for &(query, path, clicks, impressions, position) in CATALOGUE {
        let page = format!("{base}/{path}");
        let keys: Vec<String> = request
            .dimensions
            .iter()
            .map(|&dim| dimension_value(dim, query, &page, request))
            .collect();

        let entry = grouped.entry(keys).or_default();
        entry.clicks += clicks;
        entry.impressions += impressions;
        entry.weighted_position += position * impressions as f64;
    }

    let mut rows: Vec<RawRow> = grouped
        .into_iter()
        .map(|(keys, totals)| RawRow {
            keys,
            clicks: totals.clicks,
            impressions: totals.impressions,
            ctr: if totals.impressions == 0 {
                0.0
            } else {
                totals.clicks as f64 / totals.impressions as f64
            },
            position: if totals.impressions == 0 {
                0.0
            } else {
                totals.weighted_position / totals.impressions as f64
            },
        })
        .collect();

    rows.sort_by(|a, b| b.clicks.cmp(&a.clicks).then_with(|| a.keys.cmp(&b.keys)));
    rows.into_iter()
        .skip(request.start_row as usize)
        .take(request.row_limit as usize)
        .collect()
}

fn permission_denied(site_url: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::FORBIDDEN,
        Json(json!({
            "error": {
                "code": 403,
                "message": format!("User does not have sufficient permission for site '{site_url}'."),
                "status": "PERMISSION_DENIED"
            }
        })),
    )
}

async fn handle_sites(State(state): State<Arc<AppState>>) -> Json<SitesListResponse> {
    info!("listing sites");
    Json(SitesListResponse {
        site_entry: vec![SiteEntry {
            site_url: state.site_url.clone(),
            permission_level: "siteOwner".to_string(),
        }],
    })
}

async fn handle_query(
    State(state): State<Arc<AppState>>,
    Path(site_url): Path<String>,
    Json(req): Json<SearchAnalyticsRequest>,
) -> Result<Json<SearchAnalyticsResponse>, (StatusCode, Json<Value>)> {
    if site_url != state.site_url {
        return Err(permission_denied(&site_url));
    }

    let rows = generate_rows(&state.site_url, &req);
    info!(
        site = %site_url,
        dimensions = ?req.dimensions,
        rows = rows.len(),
        "search analytics query"
    );

    Ok(Json(SearchAnalyticsResponse {
        rows,
        response_aggregation_type: Some("byPage".to_string()),
    }))
}

fn app(site_url: String) -> Router {
    let state = Arc::new(AppState { site_url });
    Router::new()
        .route("/webmasters/v3/sites", get(handle_sites))
        .route(
            "/webmasters/v3/sites/:site_url/searchAnalytics/query",
            post(handle_query),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    let app = app(config.site_url.clone());

    info!(
        "fake_search_console listening on http://{}/webmasters/v3 for {}",
        config.bind, config.site_url
    );

    // Axum 0.7 style: use TcpListener + axum::serve
    let listener = TcpListener::bind(config.bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

//! cannibal_scan - keyword cannibalization audit over search-analytics data
//!
//! Pipeline: [`Snapshot`] rows → [`normalize`] → [`Dataset`] → [`audit`]
//! → summary stats, clicks ranking and the cannibalization report.

pub mod aggregate;
pub mod error;
pub mod model;
pub mod normalize;
pub mod report;

pub use aggregate::{
    aggregate_by_query, audit, cannibalized, filter_query, rank_by_clicks, summarize, Audit,
    QueryAggregate, SummaryStats, CANNIBALIZATION_MIN_PAGES,
};
pub use error::{AuditError, Result};
pub use model::{
    Dataset, Dimension, Dimensions, RawRow, Record, SearchAnalyticsRequest,
    SearchAnalyticsResponse, SiteEntry, SitesListResponse, Snapshot,
};
pub use normalize::{normalize, round2};

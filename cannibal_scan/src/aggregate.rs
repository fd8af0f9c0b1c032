//! Whole-dataset statistics and per-query views.
//!
//! Grouping is a single pass over the dataset into accumulators keyed by
//! query text. Groups keep first-seen order and every sort below is stable,
//! so ties resolve to the query that appeared first in the response.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::{
    error::Result,
    model::{Dataset, Dimension, Record},
    normalize::round2,
};

/// Minimum distinct pages for a query to count as cannibalized.
pub const CANNIBALIZATION_MIN_PAGES: usize = 2;

/// Whole-dataset totals. Means and the queries-per-page ratio are `None`
/// when they have no denominator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub total_pages: usize,
    pub total_queries: usize,
    pub total_clicks: u64,
    pub total_impressions: u64,
    pub average_ctr: Option<f64>,
    pub average_position: Option<f64>,
    pub average_queries_per_page: Option<f64>,
}

/// Per-query performance across all pages serving it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryAggregate {
    pub query: String,
    pub unique_pages: usize,
    pub total_clicks: u64,
    pub total_impressions: u64,
    pub avg_ctr: f64,
    pub avg_position: f64,
}

/// The three views produced for one dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Audit {
    pub summary: SummaryStats,
    /// All queries, `total_clicks` descending.
    pub by_clicks: Vec<QueryAggregate>,
    /// Queries served by several pages, `unique_pages` descending.
    pub cannibalized: Vec<QueryAggregate>,
}

#[derive(Debug, Default)]
struct QueryAccumulator<'a> {
    pages: HashSet<&'a str>,
    rows: u64,
    clicks: u64,
    impressions: u64,
    sum_ctr: f64,
    sum_position: f64,
}

impl<'a> QueryAccumulator<'a> {
    fn add(&mut self, page: &'a str, record: &Record) {
        self.pages.insert(page);
        self.rows += 1;
        self.clicks += record.clicks;
        self.impressions += record.impressions;
        self.sum_ctr += record.ctr;
        self.sum_position += record.position;
    }

    // A group only exists once a record was added, so rows >= 1.
    fn finish(self, query: &str) -> QueryAggregate {
        let rows = self.rows as f64;
        QueryAggregate {
            query: query.to_string(),
            unique_pages: self.pages.len(),
            total_clicks: self.clicks,
            total_impressions: self.impressions,
            avg_ctr: self.sum_ctr / rows,
            avg_position: self.sum_position / rows,
        }
    }
}

fn mean(sum: f64, count: usize) -> Option<f64> {
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Distinct counts, sums and rounded means over the whole dataset.
pub fn summarize(dataset: &Dataset) -> Result<SummaryStats> {
    let query_col = dataset.column(Dimension::Query)?;
    let page_col = dataset.column(Dimension::Page)?;

    let mut queries = HashSet::new();
    let mut pages = HashSet::new();
    let mut total_clicks = 0u64;
    let mut total_impressions = 0u64;
    let mut sum_ctr = 0.0;
    let mut sum_position = 0.0;

    for record in dataset.records() {
        queries.insert(record.values[query_col].as_str());
        pages.insert(record.values[page_col].as_str());
        total_clicks += record.clicks;
        total_impressions += record.impressions;
        sum_ctr += record.ctr;
        sum_position += record.position;
    }

    let average_queries_per_page = if pages.is_empty() {
        None
    } else {
        Some(round2(queries.len() as f64 / pages.len() as f64))
    };

    Ok(SummaryStats {
        total_pages: pages.len(),
        total_queries: queries.len(),
        total_clicks,
        total_impressions,
        average_ctr: mean(sum_ctr, dataset.len()).map(round2),
        average_position: mean(sum_position, dataset.len()).map(round2),
        average_queries_per_page,
    })
}

/// One aggregate per distinct query, in order of first appearance.
pub fn aggregate_by_query(dataset: &Dataset) -> Result<Vec<QueryAggregate>> {
    let query_col = dataset.column(Dimension::Query)?;
    let page_col = dataset.column(Dimension::Page)?;

    let mut groups: IndexMap<&str, QueryAccumulator> = IndexMap::new();
    for record in dataset.records() {
        groups
            .entry(record.values[query_col].as_str())
            .or_default()
            .add(record.values[page_col].as_str(), record);
    }

    debug!(queries = groups.len(), "grouped records by query");
    Ok(groups
        .into_iter()
        .map(|(query, acc)| acc.finish(query))
        .collect())
}

/// All groups ordered by `total_clicks` descending.
pub fn rank_by_clicks(groups: &[QueryAggregate]) -> Vec<QueryAggregate> {
    let mut ranked = groups.to_vec();
    ranked.sort_by(|a, b| b.total_clicks.cmp(&a.total_clicks));
    ranked
}

/// Groups with at least `min_pages` distinct pages (never fewer than two),
/// ordered by `unique_pages` descending.
pub fn cannibalized(groups: &[QueryAggregate], min_pages: usize) -> Vec<QueryAggregate> {
    let threshold = min_pages.max(CANNIBALIZATION_MIN_PAGES);
    let mut rows: Vec<QueryAggregate> = groups
        .iter()
        .filter(|g| g.unique_pages >= threshold)
        .cloned()
        .collect();
    rows.sort_by(|a, b| b.unique_pages.cmp(&a.unique_pages));
    rows
}

/// Run every view over `dataset`.
pub fn audit(dataset: &Dataset, min_pages: usize) -> Result<Audit> {
    let summary = summarize(dataset)?;
    let groups = aggregate_by_query(dataset)?;

    Ok(Audit {
        summary,
        by_clicks: rank_by_clicks(&groups),
        cannibalized: cannibalized(&groups, min_pages),
    })
}

/// Records for exactly `query`, highest impressions first.
pub fn filter_query<'a>(dataset: &'a Dataset, query: &str) -> Result<Vec<&'a Record>> {
    let query_col = dataset.column(Dimension::Query)?;
    let mut rows: Vec<&Record> = dataset
        .records()
        .iter()
        .filter(|r| r.values[query_col] == query)
        .collect();
    rows.sort_by(|a, b| b.impressions.cmp(&a.impressions));
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::AuditError,
        model::{Dimensions, RawRow},
        normalize::normalize,
    };

    fn record(
        query: &str,
        page: &str,
        clicks: u64,
        impressions: u64,
        ctr: f64,
        position: f64,
    ) -> Record {
        Record {
            values: vec![query.to_string(), page.to_string()],
            clicks,
            impressions,
            ctr,
            position,
        }
    }

    fn dataset(records: Vec<Record>) -> Dataset {
        let dims = Dimensions::new(vec![Dimension::Query, Dimension::Page]).unwrap();
        Dataset::new(dims, records)
    }

    fn sample() -> Dataset {
        dataset(vec![
            record("a", "p1", 5, 100, 5.0, 3.0),
            record("a", "p2", 3, 50, 6.0, 4.0),
            record("b", "p1", 1, 10, 10.0, 1.0),
        ])
    }

    #[test]
    fn test_cannibalization_scenario() {
        let audit = audit(&sample(), CANNIBALIZATION_MIN_PAGES).unwrap();

        assert_eq!(
            audit.cannibalized,
            vec![QueryAggregate {
                query: "a".to_string(),
                unique_pages: 2,
                total_clicks: 8,
                total_impressions: 150,
                avg_ctr: 5.5,
                avg_position: 3.5,
            }]
        );
        assert_eq!(audit.by_clicks.len(), 2);
        assert_eq!(audit.by_clicks[0].query, "a");
        assert_eq!(audit.by_clicks[1].query, "b");
    }

    #[test]
    fn test_unique_pages_is_cardinality() {
        let ds = dataset(vec![
            record("a", "p1", 1, 10, 1.0, 1.0),
            record("a", "p1", 1, 10, 1.0, 1.0),
            record("a", "p1", 1, 10, 1.0, 1.0),
            record("b", "p1", 1, 10, 1.0, 1.0),
            record("b", "p2", 1, 10, 1.0, 1.0),
            record("b", "p2", 1, 10, 1.0, 1.0),
        ]);
        let groups = aggregate_by_query(&ds).unwrap();

        assert_eq!(groups[0].query, "a");
        assert_eq!(groups[0].unique_pages, 1);
        assert_eq!(groups[1].unique_pages, 2);

        let report = cannibalized(&groups, CANNIBALIZATION_MIN_PAGES);
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].query, "b");
    }

    #[test]
    fn test_sums_match_dataset() {
        let ds = dataset(vec![
            record("x", "p1", 7, 70, 1.0, 1.0),
            record("y", "p2", 2, 30, 1.0, 1.0),
            record("x", "p3", 4, 11, 1.0, 1.0),
            record("z", "p1", 0, 9, 0.0, 8.0),
        ]);
        let groups = aggregate_by_query(&ds).unwrap();

        let clicks: u64 = groups.iter().map(|g| g.total_clicks).sum();
        let impressions: u64 = groups.iter().map(|g| g.total_impressions).sum();
        assert_eq!(clicks, ds.records().iter().map(|r| r.clicks).sum::<u64>());
        assert_eq!(impressions, ds.records().iter().map(|r| r.impressions).sum::<u64>());
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let ds = dataset(vec![
            record("late", "p9", 3, 1, 1.0, 1.0),
            record("early", "p1", 3, 1, 1.0, 1.0),
            record("late", "p8", 0, 1, 1.0, 1.0),
            record("early", "p2", 0, 1, 1.0, 1.0),
            record("top", "p1", 1, 1, 1.0, 1.0),
            record("top", "p2", 1, 1, 1.0, 1.0),
            record("top", "p3", 1, 1, 1.0, 1.0),
        ]);
        let groups = aggregate_by_query(&ds).unwrap();

        let by_clicks: Vec<_> = rank_by_clicks(&groups).into_iter().map(|g| g.query).collect();
        assert_eq!(by_clicks, vec!["late", "early", "top"]);

        let report: Vec<_> = cannibalized(&groups, CANNIBALIZATION_MIN_PAGES)
            .into_iter()
            .map(|g| g.query)
            .collect();
        assert_eq!(report, vec!["top", "late", "early"]);
    }

    #[test]
    fn test_min_pages_threshold() {
        let ds = dataset(vec![
            record("two", "p1", 1, 1, 1.0, 1.0),
            record("two", "p2", 1, 1, 1.0, 1.0),
            record("three", "p1", 1, 1, 1.0, 1.0),
            record("three", "p2", 1, 1, 1.0, 1.0),
            record("three", "p3", 1, 1, 1.0, 1.0),
            record("one", "p1", 1, 1, 1.0, 1.0),
        ]);
        let groups = aggregate_by_query(&ds).unwrap();

        assert_eq!(cannibalized(&groups, 3).len(), 1);
        // A threshold below two never lets single-page queries in.
        let loose = cannibalized(&groups, 0);
        assert_eq!(loose.len(), 2);
        assert!(loose.iter().all(|g| g.unique_pages > 1));
    }

    #[test]
    fn test_summary_stats() {
        let summary = summarize(&sample()).unwrap();

        assert_eq!(summary.total_pages, 2);
        assert_eq!(summary.total_queries, 2);
        assert_eq!(summary.total_clicks, 9);
        assert_eq!(summary.total_impressions, 160);
        assert_eq!(summary.average_ctr, Some(7.0));
        assert_eq!(summary.average_position, Some(2.67));
        assert_eq!(summary.average_queries_per_page, Some(1.0));
    }

    #[test]
    fn test_empty_dataset() {
        let audit = audit(&dataset(Vec::new()), CANNIBALIZATION_MIN_PAGES).unwrap();

        assert_eq!(
            audit.summary,
            SummaryStats {
                total_pages: 0,
                total_queries: 0,
                total_clicks: 0,
                total_impressions: 0,
                average_ctr: None,
                average_position: None,
                average_queries_per_page: None,
            }
        );
        assert!(audit.by_clicks.is_empty());
        assert!(audit.cannibalized.is_empty());
    }

    #[test]
    fn test_filter_query_by_impressions() {
        let ds = sample();
        let rows = filter_query(&ds, "a").unwrap();

        let pages: Vec<_> = rows
            .iter()
            .map(|r| ds.value(r, Dimension::Page).unwrap())
            .collect();
        assert_eq!(pages, vec!["p1", "p2"]);
        assert!(filter_query(&ds, "missing").unwrap().is_empty());
    }

    #[test]
    fn test_requires_query_and_page() {
        let dims = Dimensions::new(vec![Dimension::Query, Dimension::Country]).unwrap();
        let ds = normalize(
            &dims,
            vec![RawRow {
                keys: vec!["a".into(), "usa".into()],
                clicks: 1,
                impressions: 2,
                ctr: 0.5,
                position: 1.0,
            }],
        )
        .unwrap();

        assert!(matches!(
            summarize(&ds),
            Err(AuditError::MissingDimension(Dimension::Page))
        ));
        assert!(matches!(
            aggregate_by_query(&ds),
            Err(AuditError::MissingDimension(Dimension::Page))
        ));
        assert_eq!(filter_query(&ds, "a").unwrap().len(), 1);
    }
}

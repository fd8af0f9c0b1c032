//! Wire types for the search-analytics API and the normalized dataset built
//! from them.

use std::{fmt, fs::File, io::BufReader, io::Read, path::Path};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AuditError, Result};

/// A categorical axis of a search-analytics result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Dimension {
    Query,
    Page,
    Country,
    Device,
    Date,
    SearchAppearance,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Query => "query",
            Dimension::Page => "page",
            Dimension::Country => "country",
            Dimension::Device => "device",
            Dimension::Date => "date",
            Dimension::SearchAppearance => "searchAppearance",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, non-empty list of distinct dimensions. Every record of a
/// [`Dataset`] carries exactly one value per entry, in this order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimensions(Vec<Dimension>);

impl Dimensions {
    pub fn new(dimensions: Vec<Dimension>) -> Result<Self> {
        if dimensions.is_empty() {
            return Err(AuditError::InvalidDimensions(
                "at least one dimension is required".to_string(),
            ));
        }
        for (i, dim) in dimensions.iter().enumerate() {
            if dimensions[..i].contains(dim) {
                return Err(AuditError::InvalidDimensions(format!(
                    "'{dim}' is listed more than once"
                )));
            }
        }
        Ok(Self(dimensions))
    }

    pub fn as_slice(&self) -> &[Dimension] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Column index of `dim`, if it was requested.
    pub fn position(&self, dim: Dimension) -> Option<usize> {
        self.0.iter().position(|d| *d == dim)
    }
}

/// One search-analytics result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(deserialize_with = "deserialize_count")]
    pub clicks: u64,
    #[serde(deserialize_with = "deserialize_count")]
    pub impressions: u64,
    pub ctr: f64,
    pub position: f64,
}

/// The API documents counts as doubles; accept `12` and `12.0` alike.
fn deserialize_count<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value > u64::MAX as f64 {
        return Err(serde::de::Error::custom(format!(
            "expected a non-negative whole number, found {value}"
        )));
    }
    Ok(value as u64)
}

/// Body of a `searchAnalytics.query` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchAnalyticsRequest {
    pub start_date: String,
    pub end_date: String,
    pub dimensions: Vec<Dimension>,
    pub row_limit: u32,
    #[serde(default)]
    pub start_row: u32,
}

/// Response of a `searchAnalytics.query` call. The API leaves `rows` out
/// entirely when the period has no data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchAnalyticsResponse {
    #[serde(default)]
    pub rows: Vec<RawRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_aggregation_type: Option<String>,
}

/// One property from `sites.list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteEntry {
    pub site_url: String,
    #[serde(default)]
    pub permission_level: String,
}

/// Response of `sites.list`; `siteEntry` is absent for accounts with no
/// verified properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SitesListResponse {
    #[serde(default)]
    pub site_entry: Vec<SiteEntry>,
}

/// One fetch persisted to disk: the request that was sent alongside what
/// came back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub fetched_at_ms: u64,
    pub site_url: String,
    pub request: SearchAnalyticsRequest,
    pub response: SearchAnalyticsResponse,
}

impl Snapshot {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn dimensions(&self) -> Result<Dimensions> {
        Dimensions::new(self.request.dimensions.clone())
    }
}

/// A normalized row: one value per dataset dimension plus derived metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub values: Vec<String>,
    pub clicks: u64,
    pub impressions: u64,
    /// Click-through rate as a percentage, two decimals.
    pub ctr: f64,
    pub position: f64,
}

/// Ordered records sharing one dimension list.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    dimensions: Dimensions,
    records: Vec<Record>,
}

impl Dataset {
    pub(crate) fn new(dimensions: Dimensions, records: Vec<Record>) -> Self {
        Self {
            dimensions,
            records,
        }
    }

    pub fn dimensions(&self) -> &Dimensions {
        &self.dimensions
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Column index of `dim`, failing when the dataset was fetched without it.
    pub fn column(&self, dim: Dimension) -> Result<usize> {
        self.dimensions
            .position(dim)
            .ok_or(AuditError::MissingDimension(dim))
    }

    pub fn value<'a>(&self, record: &'a Record, dim: Dimension) -> Option<&'a str> {
        self.dimensions
            .position(dim)
            .and_then(|i| record.values.get(i))
            .map(String::as_str)
    }

    /// `(dimension, value)` pairs of a record in dimension order.
    pub fn pairs<'a>(&'a self, record: &'a Record) -> impl Iterator<Item = (Dimension, &'a str)> {
        self.dimensions
            .as_slice()
            .iter()
            .copied()
            .zip(record.values.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensions_reject_empty_and_duplicates() {
        assert!(matches!(
            Dimensions::new(vec![]),
            Err(AuditError::InvalidDimensions(_))
        ));
        assert!(matches!(
            Dimensions::new(vec![Dimension::Query, Dimension::Page, Dimension::Query]),
            Err(AuditError::InvalidDimensions(_))
        ));

        let dims = Dimensions::new(vec![Dimension::Query, Dimension::Page]).unwrap();
        assert_eq!(dims.position(Dimension::Page), Some(1));
        assert_eq!(dims.position(Dimension::Country), None);
    }

    #[test]
    fn test_snapshot_parses_api_shapes() {
        let json = serde_json::json!({
            "fetched_at_ms": 1700000000000u64,
            "site_url": "https://example.com/",
            "request": {
                "startDate": "2024-01-01",
                "endDate": "2024-03-31",
                "dimensions": ["query", "page"],
                "rowLimit": 10000,
                "startRow": 0
            },
            "response": {
                "rows": [
                    {"keys": ["rust csv", "https://example.com/a"], "clicks": 12.0, "impressions": 340, "ctr": 0.0353, "position": 4.2}
                ],
                "responseAggregationType": "byPage"
            }
        });

        let snapshot: Snapshot = serde_json::from_value(json).unwrap();
        assert_eq!(snapshot.response.rows.len(), 1);
        assert_eq!(snapshot.response.rows[0].clicks, 12);
        assert_eq!(snapshot.response.rows[0].impressions, 340);
        assert_eq!(
            snapshot.dimensions().unwrap().as_slice(),
            &[Dimension::Query, Dimension::Page]
        );
    }

    #[test]
    fn test_missing_rows_is_empty_response() {
        let response: SearchAnalyticsResponse =
            serde_json::from_str(r#"{"responseAggregationType": "auto"}"#).unwrap();
        assert!(response.rows.is_empty());
    }

    #[test]
    fn test_fractional_count_rejected() {
        let result: std::result::Result<RawRow, _> = serde_json::from_str(
            r#"{"keys": ["a"], "clicks": 1.5, "impressions": 3, "ctr": 0.5, "position": 1.0}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_dimension_rejected() {
        let result: std::result::Result<Dimension, _> = serde_json::from_str(r#""browser""#);
        assert!(result.is_err());
        let dim: Dimension = serde_json::from_str(r#""searchAppearance""#).unwrap();
        assert_eq!(dim, Dimension::SearchAppearance);
        assert_eq!(dim.to_string(), "searchAppearance");
    }
}

//! Raw API rows to [`Dataset`].

use tracing::debug;

use crate::{
    error::{AuditError, Result},
    model::{Dataset, Dimensions, RawRow, Record},
};

/// Round to two decimals, halves away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Convert one raw row. `index` is only used for error reporting.
pub fn normalize_row(dimensions: &Dimensions, index: usize, row: RawRow) -> Result<Record> {
    if row.keys.len() != dimensions.len() {
        return Err(AuditError::ShapeMismatch {
            row: index,
            expected: dimensions.len(),
            actual: row.keys.len(),
        });
    }

    Ok(Record {
        values: row.keys,
        clicks: row.clicks,
        impressions: row.impressions,
        ctr: round2(row.ctr * 100.0),
        position: round2(row.position),
    })
}

/// Normalize every row in order. The first row whose key count differs from
/// the dimension list aborts the whole conversion.
pub fn normalize(dimensions: &Dimensions, rows: Vec<RawRow>) -> Result<Dataset> {
    let records = rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| normalize_row(dimensions, i, row))
        .collect::<Result<Vec<_>>>()?;

    debug!(rows = records.len(), "normalized search analytics rows");
    Ok(Dataset::new(dimensions.clone(), records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Dimension;

    fn query_page() -> Dimensions {
        Dimensions::new(vec![Dimension::Query, Dimension::Page]).unwrap()
    }

    fn raw(keys: &[&str], clicks: u64, impressions: u64, ctr: f64, position: f64) -> RawRow {
        RawRow {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            clicks,
            impressions,
            ctr,
            position,
        }
    }

    #[test]
    fn test_ctr_scaled_to_percent() {
        let dataset = normalize(
            &query_page(),
            vec![
                raw(&["a", "p1"], 1, 10, 0.1234, 2.0),
                raw(&["b", "p2"], 1, 10, 0.05555, 2.0),
            ],
        )
        .unwrap();

        assert_eq!(dataset.records()[0].ctr, 12.34);
        assert_eq!(dataset.records()[1].ctr, 5.56);
    }

    #[test]
    fn test_position_rounded_not_scaled() {
        let dataset = normalize(&query_page(), vec![raw(&["a", "p1"], 0, 3, 0.0, 7.456)]).unwrap();
        assert_eq!(dataset.records()[0].position, 7.46);
        assert_eq!(dataset.records()[0].ctr, 0.0);
    }

    #[test]
    fn test_keys_map_to_dimensions_in_order() {
        let dims =
            Dimensions::new(vec![Dimension::Page, Dimension::Device, Dimension::Query]).unwrap();
        let rows = vec![
            raw(&["https://x/1", "MOBILE", "rust"], 4, 40, 0.1, 1.5),
            raw(&["https://x/2", "DESKTOP", "go"], 2, 20, 0.1, 3.0),
        ];
        let dataset = normalize(&dims, rows.clone()).unwrap();

        assert_eq!(dataset.len(), 2);
        for (record, row) in dataset.records().iter().zip(&rows) {
            for (i, (dim, value)) in dataset.pairs(record).enumerate() {
                assert_eq!(dim, dims.as_slice()[i]);
                assert_eq!(value, row.keys[i]);
            }
            assert_eq!(record.clicks, row.clicks);
            assert_eq!(record.impressions, row.impressions);
        }
        assert_eq!(dataset.value(&dataset.records()[1], Dimension::Query), Some("go"));
    }

    #[test]
    fn test_shape_mismatch_reports_row_index() {
        let err = normalize(
            &query_page(),
            vec![
                raw(&["a", "p1"], 1, 1, 0.1, 1.0),
                raw(&["b", "p1"], 1, 1, 0.1, 1.0),
                raw(&["c"], 1, 1, 0.1, 1.0),
            ],
        )
        .unwrap_err();

        match err {
            AuditError::ShapeMismatch {
                row,
                expected,
                actual,
            } => {
                assert_eq!(row, 2);
                assert_eq!(expected, 2);
                assert_eq!(actual, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_extra_keys_not_truncated() {
        let err = normalize(&query_page(), vec![raw(&["a", "p1", "US"], 1, 1, 0.1, 1.0)]);
        assert!(matches!(err, Err(AuditError::ShapeMismatch { actual: 3, .. })));
    }

    #[test]
    fn test_duplicates_kept() {
        let dataset = normalize(
            &query_page(),
            vec![
                raw(&["a", "p1"], 1, 1, 0.1, 1.0),
                raw(&["a", "p1"], 1, 1, 0.1, 1.0),
            ],
        )
        .unwrap();
        assert_eq!(dataset.len(), 2);
    }

    #[test]
    fn test_empty_input() {
        let dataset = normalize(&query_page(), Vec::new()).unwrap();
        assert!(dataset.is_empty());
    }
}

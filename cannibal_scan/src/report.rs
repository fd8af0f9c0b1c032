//! CSV export, console tables and the HTML report.

use std::{
    borrow::Cow,
    fmt::Write as _,
    fs,
    io::{self, Write},
    path::Path,
};

use serde::Serialize;

use crate::{
    aggregate::{QueryAggregate, SummaryStats},
    error::Result,
    model::{Dataset, Record},
};

/// Console cells longer than this are cut with an ellipsis.
pub const MAX_CELL_WIDTH: usize = 100;

const QUERY_HEADER: [&str; 6] = [
    "query",
    "unique_pages",
    "total_clicks",
    "total_impressions",
    "avg_ctr",
    "avg_position",
];

/// Quote a CSV field when it contains a delimiter, quote or line break.
pub fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

fn write_csv_line<W, I, S>(w: &mut W, fields: I) -> io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let line = fields
        .into_iter()
        .map(|f| csv_field(f.as_ref()).into_owned())
        .collect::<Vec<_>>()
        .join(",");
    writeln!(w, "{line}")
}

fn optional(value: Option<f64>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "NaN".to_string(),
    }
}

fn record_fields(record: &Record) -> Vec<String> {
    let mut fields = record.values.clone();
    fields.push(record.clicks.to_string());
    fields.push(record.impressions.to_string());
    fields.push(record.ctr.to_string());
    fields.push(record.position.to_string());
    fields
}

fn record_header(dataset: &Dataset) -> Vec<String> {
    dataset
        .dimensions()
        .as_slice()
        .iter()
        .map(|d| d.as_str().to_string())
        .chain(["clicks", "impressions", "ctr", "position"].map(String::from))
        .collect()
}

fn query_fields(row: &QueryAggregate) -> [String; 6] {
    [
        row.query.clone(),
        row.unique_pages.to_string(),
        row.total_clicks.to_string(),
        row.total_impressions.to_string(),
        row.avg_ctr.to_string(),
        row.avg_position.to_string(),
    ]
}

/// Labelled summary values in display order.
pub fn summary_rows(summary: &SummaryStats) -> Vec<(&'static str, String)> {
    vec![
        ("Total pages", summary.total_pages.to_string()),
        ("Total queries", summary.total_queries.to_string()),
        ("Total clicks", summary.total_clicks.to_string()),
        ("Total impressions", summary.total_impressions.to_string()),
        ("Average CTR", optional(summary.average_ctr)),
        ("Average position", optional(summary.average_position)),
        (
            "Average queries per page",
            optional(summary.average_queries_per_page),
        ),
    ]
}

/// Every record: dimension columns in request order, then metrics.
pub fn write_dataset_csv<W: Write>(mut w: W, dataset: &Dataset) -> io::Result<()> {
    write_csv_line(&mut w, record_header(dataset))?;
    for record in dataset.records() {
        write_csv_line(&mut w, record_fields(record))?;
    }
    w.flush()
}

pub fn write_query_csv<W: Write>(mut w: W, rows: &[QueryAggregate]) -> io::Result<()> {
    write_csv_line(&mut w, QUERY_HEADER)?;
    for row in rows {
        write_csv_line(&mut w, query_fields(row))?;
    }
    w.flush()
}

pub fn write_summary_csv<W: Write>(mut w: W, summary: &SummaryStats) -> io::Result<()> {
    write_csv_line(&mut w, ["metric", "value"])?;
    for (label, value) in summary_rows(summary) {
        write_csv_line(&mut w, [label, value.as_str()])?;
    }
    w.flush()
}

fn truncate(cell: &str) -> Cow<'_, str> {
    if cell.chars().count() <= MAX_CELL_WIDTH {
        Cow::Borrowed(cell)
    } else {
        let cut: String = cell.chars().take(MAX_CELL_WIDTH - 3).collect();
        Cow::Owned(format!("{cut}..."))
    }
}

/// Left-aligned text columns padded to the widest cell.
fn render_table(header: &[String], rows: &[Vec<String>]) -> String {
    let header: Vec<Cow<str>> = header.iter().map(|h| truncate(h)).collect();
    let rows: Vec<Vec<Cow<str>>> = rows
        .iter()
        .map(|r| r.iter().map(|c| truncate(c)).collect())
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let mut out = String::new();
    for line in std::iter::once(&header).chain(rows.iter()) {
        let cells: Vec<String> = line
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        let _ = writeln!(out, "{}", cells.join("  ").trim_end());
    }
    out
}

/// The first `limit` of `records` as a table.
pub fn render_records(dataset: &Dataset, records: &[&Record], limit: usize) -> String {
    let rows: Vec<Vec<String>> = records
        .iter()
        .take(limit)
        .map(|r| record_fields(r))
        .collect();
    render_table(&record_header(dataset), &rows)
}

pub fn render_query_table(rows: &[QueryAggregate], limit: usize) -> String {
    let header: Vec<String> = QUERY_HEADER.iter().map(|h| h.to_string()).collect();
    let rows: Vec<Vec<String>> = rows
        .iter()
        .take(limit)
        .map(|r| {
            let mut fields = query_fields(r).to_vec();
            fields[4] = format!("{:.2}", r.avg_ctr);
            fields[5] = format!("{:.2}", r.avg_position);
            fields
        })
        .collect();
    render_table(&header, &rows)
}

pub fn render_summary(summary: &SummaryStats) -> String {
    let rows: Vec<Vec<String>> = summary_rows(summary)
        .into_iter()
        .map(|(label, value)| vec![label.to_string(), value])
        .collect();
    render_table(&["metric".to_string(), "value".to_string()], &rows)
}

/// Complete report data for HTML generation
#[derive(Serialize)]
pub struct HtmlReportData<'a> {
    pub source: String,
    pub site_url: String,
    pub start_date: String,
    pub end_date: String,
    pub total_rows: usize,
    pub min_pages: usize,
    pub summary: &'a SummaryStats,
    pub top_queries: &'a [QueryAggregate],
    pub cannibalized: &'a [QueryAggregate],
}

/// Single self-contained page: the report data is embedded as JSON and
/// rendered client-side.
pub fn write_html_report(path: &Path, report: &HtmlReportData) -> Result<()> {
    // Keep "</script>" inside query text from closing the data block.
    let json_data = serde_json::to_string(report)?.replace('<', "\\u003c");

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Keyword Cannibalization Report</title>
    <style>
        * {{ box-sizing: border-box; }}
        body {{ font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif; margin: 0; padding: 20px; background: #f5f5f5; }}
        .container {{ max-width: 1400px; margin: 0 auto; }}
        h1 {{ color: #333; margin-bottom: 10px; }}
        h2 {{ color: #333; margin-top: 30px; }}
        .meta {{ color: #666; margin-bottom: 20px; font-size: 14px; }}
        .summary-dashboard {{ display: grid; grid-template-columns: repeat(auto-fit, minmax(200px, 1fr)); gap: 15px; margin-bottom: 25px; }}
        .metric-card {{ background: white; padding: 20px; border-radius: 8px; box-shadow: 0 1px 3px rgba(0,0,0,0.1); text-align: center; }}
        .metric-card.alert {{ border-left: 4px solid #dc3545; }}
        .metric-value {{ font-size: 2rem; font-weight: 700; color: #333; }}
        .metric-label {{ font-size: 0.85rem; color: #666; margin-top: 5px; text-transform: uppercase; letter-spacing: 0.5px; }}
        table {{ width: 100%; border-collapse: collapse; background: white; border-radius: 8px; overflow: hidden; box-shadow: 0 1px 3px rgba(0,0,0,0.1); }}
        th, td {{ padding: 12px 15px; text-align: left; border-bottom: 1px solid #eee; }}
        th {{ background: #4a90a4; color: white; }}
        td.num {{ text-align: right; font-variant-numeric: tabular-nums; }}
        .empty {{ color: #999; font-style: italic; }}
    </style>
</head>
<body>
<div class="container">
    <h1>Keyword Cannibalization Report</h1>
    <div class="meta" id="meta"></div>
    <div class="summary-dashboard" id="summary"></div>
    <h2>Cannibalized queries</h2>
    <div id="cannibalized"></div>
    <h2>Top queries by clicks</h2>
    <div id="top-queries"></div>
</div>
<script>
const REPORT = {json_data};

function el(tag, attrs, text) {{
    const node = document.createElement(tag);
    Object.entries(attrs || {{}}).forEach(([k, v]) => node.setAttribute(k, v));
    if (text !== undefined) node.textContent = text;
    return node;
}}

function fmt(value) {{
    if (value === null || value === undefined) return "NaN";
    return Number.isInteger(value) ? value.toLocaleString() : value.toFixed(2);
}}

function card(label, value, alert) {{
    const c = el("div", {{ class: alert ? "metric-card alert" : "metric-card" }});
    c.appendChild(el("div", {{ class: "metric-value" }}, fmt(value)));
    c.appendChild(el("div", {{ class: "metric-label" }}, label));
    return c;
}}

function queryTable(target, rows) {{
    const host = document.getElementById(target);
    if (!rows.length) {{
        host.appendChild(el("p", {{ class: "empty" }}, "No queries."));
        return;
    }}
    const table = el("table");
    const head = el("tr");
    ["Query", "Unique pages", "Clicks", "Impressions", "Avg CTR %", "Avg position"]
        .forEach(h => head.appendChild(el("th", {{}}, h)));
    table.appendChild(head);
    rows.forEach(r => {{
        const tr = el("tr");
        tr.appendChild(el("td", {{}}, r.query));
        [r.unique_pages, r.total_clicks, r.total_impressions, r.avg_ctr, r.avg_position]
            .forEach(v => tr.appendChild(el("td", {{ class: "num" }}, fmt(v))));
        table.appendChild(tr);
    }});
    host.appendChild(table);
}}

document.getElementById("meta").textContent =
    `${{REPORT.site_url}} · ${{REPORT.start_date}} to ${{REPORT.end_date}} · ${{REPORT.total_rows}} rows from ${{REPORT.source}} · pages >= ${{REPORT.min_pages}}`;

const s = REPORT.summary;
const summary = document.getElementById("summary");
summary.appendChild(card("Cannibalized queries", REPORT.cannibalized.length, REPORT.cannibalized.length > 0));
summary.appendChild(card("Total pages", s.total_pages));
summary.appendChild(card("Total queries", s.total_queries));
summary.appendChild(card("Total clicks", s.total_clicks));
summary.appendChild(card("Total impressions", s.total_impressions));
summary.appendChild(card("Average CTR %", s.average_ctr));
summary.appendChild(card("Average position", s.average_position));
summary.appendChild(card("Queries per page", s.average_queries_per_page));

queryTable("cannibalized", REPORT.cannibalized);
queryTable("top-queries", REPORT.top_queries);
</script>
</body>
</html>
"#
    );

    fs::write(path, html)?;
    Ok(())
}

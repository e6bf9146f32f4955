//! Export of a merged table to CSV or JSON.
//!
//! - **CSV**: header plus one record per row, absent cells as `N/A`.
//! - **JSON**: `{tier, mode, columns, data: {ticker: [row objects]}, errors}`,
//!   absent cells as `null`. Tickers keep their row order.

use crate::domain::Cell;
use crate::merge::ExportTable;
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to flush CSV writer: {0}")]
    Flush(String),

    #[error("CSV output is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(format!("unknown export format '{other}' (expected csv or json)")),
        }
    }
}

/// Render a table in the given format.
pub fn render(table: &ExportTable, format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::Csv => to_csv(table),
        ExportFormat::Json => to_json(table),
    }
}

pub fn to_csv(table: &ExportTable) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(&table.columns)?;
    for row in &table.rows {
        wtr.write_record(row.iter().map(Cell::render))?;
    }
    let data = wtr.into_inner().map_err(|e| ExportError::Flush(e.to_string()))?;
    Ok(String::from_utf8(data)?)
}

pub fn to_json(table: &ExportTable) -> Result<String, ExportError> {
    let mut data: Map<String, Value> = Map::new();
    for row in &table.rows {
        let ticker = match row.first() {
            Some(Cell::Text(t)) => t.clone(),
            _ => continue,
        };
        let mut object = Map::new();
        for (name, cell) in table.columns.iter().zip(row).skip(1) {
            object.insert(name.clone(), serde_json::to_value(cell)?);
        }
        if let Value::Array(rows) = data.entry(ticker).or_insert_with(|| Value::Array(Vec::new())) {
            rows.push(Value::Object(object));
        }
    }

    let doc = json!({
        "tier": table.tier,
        "mode": table.mode,
        "columns": table.columns,
        "data": data,
        "errors": table.errors,
    });
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// BLAKE3 hex digest of the CSV rendering. Identical tables hash identically.
pub fn fingerprint(table: &ExportTable) -> Result<String, ExportError> {
    let csv = to_csv(table)?;
    Ok(blake3::hash(csv.as_bytes()).to_hex().to_string())
}

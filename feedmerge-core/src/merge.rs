//! Merge stage: outcomes → one export table.
//!
//! `Separate` keeps every normalized row. `Merged` folds rows that share
//! `(ticker, timestamp)` into one, filling each column from the first provider
//! in precedence order that has a non-absent value for it.
//!
//! Provenance is per column, not per row: a merged row may carry `close` from
//! one provider and `dollar_volume` from another, each having been derived
//! from that provider's own bar at projection time. Nothing is recomputed
//! after merging.
//!
//! Cells are placed by column name against the table's tier, so a row
//! projected for another tier contributes only the columns the two share.

use crate::domain::{Cell, MergeMode, NormalizedRow, ProviderName, TickerId};
use crate::orchestrator::FetchOutcome;
use crate::tier::Tier;
use serde::Serialize;
use std::collections::BTreeMap;

/// Column names that precede the tier columns.
pub const SEPARATE_KEYS: [&str; 3] = ["ticker", "provider", "timestamp"];
pub const MERGED_KEYS: [&str; 3] = ["ticker", "providers", "timestamp"];

/// A failed pair, as reported alongside the exported rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairError {
    pub ticker: TickerId,
    pub provider: ProviderName,
    pub kind: &'static str,
    pub message: String,
}

/// Ordered column names plus rows aligned to them.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportTable {
    pub tier: Tier,
    pub mode: MergeMode,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
    pub errors: Vec<PairError>,
}

impl ExportTable {
    fn empty(tier: Tier, mode: MergeMode) -> Self {
        let keys = match mode {
            MergeMode::Separate => SEPARATE_KEYS,
            MergeMode::Merged => MERGED_KEYS,
        };
        let columns = keys
            .iter()
            .copied()
            .chain(tier.column_names())
            .map(str::to_string)
            .collect();
        Self {
            tier,
            mode,
            columns,
            rows: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct tickers in row order.
    pub fn tickers(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for row in &self.rows {
            if let Some(Cell::Text(t)) = row.first() {
                if !seen.contains(&t.as_str()) {
                    seen.push(t);
                }
            }
        }
        seen
    }
}

/// Build the export table from outcomes in canonical order.
///
/// `precedence` orders providers for `Merged`; providers it omits rank after
/// those it names, in outcome order.
pub fn merge(
    outcomes: &[FetchOutcome],
    tier: Tier,
    mode: MergeMode,
    precedence: &[ProviderName],
) -> ExportTable {
    let mut table = ExportTable::empty(tier, mode);
    table.errors = outcomes
        .iter()
        .filter_map(|o| {
            o.error.as_ref().map(|e| PairError {
                ticker: o.ticker.clone(),
                provider: o.provider,
                kind: e.kind(),
                message: e.to_string(),
            })
        })
        .collect();

    match mode {
        MergeMode::Separate => merge_separate(&mut table, outcomes),
        MergeMode::Merged => merge_combined(&mut table, outcomes, precedence),
    }
    table
}

fn merge_separate(table: &mut ExportTable, outcomes: &[FetchOutcome]) {
    for outcome in outcomes.iter().filter(|o| o.is_success()) {
        for row in &outcome.rows {
            let mut cells = Vec::with_capacity(table.columns.len());
            cells.push(Cell::Text(row.ticker.clone()));
            cells.push(Cell::Text(row.provider.to_string()));
            cells.push(Cell::Text(row.timestamp.clone()));
            cells.extend(aligned_cells(table.tier, row));
            table.rows.push(cells);
        }
    }
}

/// A row's tier cells in the order of `tier`'s columns.
fn aligned_cells(tier: Tier, row: &NormalizedRow) -> Vec<Cell> {
    let columns = tier.columns();
    let same_shape = row.tier_fields.len() == columns.len()
        && row.tier_fields.iter().zip(columns).all(|((name, _), c)| *name == c.name);
    if same_shape {
        return row.tier_fields.iter().map(|(_, cell)| cell.clone()).collect();
    }

    let mut cells = vec![Cell::Absent; columns.len()];
    for (name, cell) in &row.tier_fields {
        if let Some(i) = tier.index_of(name) {
            cells[i] = cell.clone();
        }
    }
    cells
}

struct MergedRow {
    providers: Vec<ProviderName>,
    fields: Vec<Cell>,
}

fn merge_combined(table: &mut ExportTable, outcomes: &[FetchOutcome], precedence: &[ProviderName]) {
    let width = table.tier.column_count();

    let mut order: Vec<ProviderName> = precedence.to_vec();
    for o in outcomes {
        if !order.contains(&o.provider) {
            order.push(o.provider);
        }
    }
    let rank = |p: ProviderName| order.iter().position(|q| *q == p).unwrap_or(order.len());

    let mut tickers: Vec<&str> = Vec::new();
    for o in outcomes {
        if !tickers.contains(&o.ticker.as_str()) {
            tickers.push(&o.ticker);
        }
    }

    for ticker in tickers {
        let mut sources: Vec<&FetchOutcome> = outcomes
            .iter()
            .filter(|o| o.ticker == ticker && o.is_success())
            .collect();
        sources.sort_by_key(|o| rank(o.provider));

        // Timestamps are ISO-8601 of one shape per request, so string order is time order.
        let mut by_time: BTreeMap<&str, MergedRow> = BTreeMap::new();
        for outcome in sources {
            for row in &outcome.rows {
                let merged = by_time.entry(row.timestamp.as_str()).or_insert_with(|| MergedRow {
                    providers: Vec::new(),
                    fields: vec![Cell::Absent; width],
                });
                if !merged.providers.contains(&outcome.provider) {
                    merged.providers.push(outcome.provider);
                }
                for (slot, cell) in merged.fields.iter_mut().zip(aligned_cells(table.tier, row)) {
                    if slot.is_absent() && !cell.is_absent() {
                        *slot = cell;
                    }
                }
            }
        }

        for (timestamp, merged) in by_time {
            let providers = merged
                .providers
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join("+");
            let mut cells = Vec::with_capacity(table.columns.len());
            cells.push(Cell::Text(ticker.to_string()));
            cells.push(Cell::Text(providers));
            cells.push(Cell::Text(timestamp.to_string()));
            cells.extend(merged.fields);
            table.rows.push(cells);
        }
    }
}

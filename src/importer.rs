// 📥 Spreadsheet Importer
// Scans a workbook for region headers and metric labels and upserts the
// values of a fixed column window into monthly aggregates.

use crate::models::{Event, MonthlyPatch, Period, Region, RegionSeed, YearMonth};
use crate::rules::RuleEngine;
use crate::store::MonthlyStore;
use crate::workbook::{fingerprint, parse_cell_number, CellValue, Sheet, WorkbookSource};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Spreadsheet label that opens a region block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionLabel {
    pub label: String,
    pub code: String,
}

/// Spreadsheet column holding one month's values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodColumn {
    pub column: usize,
    pub year: i32,
    pub month: u32,
}

impl PeriodColumn {
    pub fn year_month(&self) -> YearMonth {
        YearMonth::new(self.year, self.month)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Regions upserted before either pass, in canonical order
    pub regions: Vec<RegionSeed>,

    /// Exact (case-sensitive) first-cell labels, checked in order
    pub region_labels: Vec<RegionLabel>,

    pub period_columns: Vec<PeriodColumn>,

    pub sales_sheet: String,

    /// Candidate expense sheets, the first present one is used
    pub expense_sheets: Vec<String>,

    pub sales_rules: RuleEngine,

    pub expense_rules: RuleEngine,

    /// Region every expense is booked against (defaults to the first region)
    pub expense_region: Option<String>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        let label = |label: &str, code: &str| RegionLabel {
            label: label.to_string(),
            code: code.to_string(),
        };
        let column = |column: usize, year: i32, month: u32| PeriodColumn {
            column,
            year,
            month,
        };

        ImportConfig {
            regions: canonical_regions(),
            region_labels: vec![
                label("Uzbekistan", "uz"),
                label("Kazakhstan", "kz"),
                label("Kyrgyzstan", "kg"),
                label("Georgia", "ge"),
                label("UAE", "ae"),
                label("KSA", "sa"),
                label("Saudi Arabia", "sa"),
            ],
            period_columns: vec![
                column(1, 2025, 11),
                column(2, 2025, 12),
                column(3, 2026, 1),
                column(4, 2026, 2),
                column(5, 2026, 3),
            ],
            sales_sheet: "Sales plan regions".to_string(),
            expense_sheets: vec!["P&L".to_string(), "Budget".to_string()],
            sales_rules: RuleEngine::sales_defaults(),
            expense_rules: RuleEngine::expense_defaults(),
            expense_region: None,
        }
    }
}

/// The six operating regions
pub fn canonical_regions() -> Vec<RegionSeed> {
    vec![
        RegionSeed::new("uz", "Uzbekistan", "UZS", "#3B82F6"),
        RegionSeed::new("kz", "Kazakhstan", "KZT", "#10B981"),
        RegionSeed::new("kg", "Kyrgyzstan", "KGS", "#F59E0B"),
        RegionSeed::new("ge", "Georgia", "GEL", "#EF4444"),
        RegionSeed::new("ae", "UAE", "AED", "#8B5CF6"),
        RegionSeed::new("sa", "Saudi Arabia", "SAR", "#EC4899"),
    ]
}

impl ImportConfig {
    pub fn region_code_for(&self, label: &str) -> Option<&str> {
        self.region_labels
            .iter()
            .find(|entry| entry.label == label)
            .map(|entry| entry.code.as_str())
    }

    pub fn expense_region_code(&self) -> Option<&str> {
        self.expense_region
            .as_deref()
            .or_else(|| self.regions.first().map(|r| r.code.as_str()))
    }

    pub fn expense_sheet<'a>(&self, source: &'a dyn WorkbookSource) -> Option<&'a Sheet> {
        self.expense_sheets
            .iter()
            .find_map(|name| source.sheet(name))
    }
}

// ============================================================================
// RESULTS
// ============================================================================

pub const RESULT_REGIONS: &str = "regions";
pub const RESULT_PERIODS: &str = "periods";
pub const RESULT_SALES: &str = "salesData";
pub const RESULT_EXPENSES: &str = "expenses";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub success: bool,
    pub message: String,
    pub results: BTreeMap<String, usize>,
    pub sheets: Vec<String>,
}

impl ImportSummary {
    pub fn count(&self, category: &str) -> Option<usize> {
        self.results.get(category).copied()
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Import failed: {0:#}")]
    Failed(anyhow::Error),
}

impl ImportError {
    /// `{"error": "Import failed: ..."}`
    pub fn to_response(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }
}

// ============================================================================
// IMPORT
// ============================================================================

/// Import sales and expense figures from `source` into `store`.
///
/// Upserts are applied one by one; if the store fails midway the import
/// aborts and earlier upserts stay in place.
pub fn import_workbook(
    source: &dyn WorkbookSource,
    store: &mut dyn MonthlyStore,
    config: &ImportConfig,
) -> Result<ImportSummary, ImportError> {
    run_import(source, store, config).map_err(|e| {
        warn!(error = %format!("{:#}", e), "import aborted");
        ImportError::Failed(e)
    })
}

fn run_import(
    source: &dyn WorkbookSource,
    store: &mut dyn MonthlyStore,
    config: &ImportConfig,
) -> Result<ImportSummary> {
    let sheets = source.sheet_names();
    info!(sheets = ?sheets, "starting workbook import");

    let mut results = BTreeMap::new();

    // 1. Regions and target periods
    for seed in &config.regions {
        store
            .upsert_region(seed)
            .with_context(|| format!("Failed to upsert region {}", seed.code))?;
    }
    results.insert(RESULT_REGIONS.to_string(), config.regions.len());

    for column in &config.period_columns {
        store.upsert_period(column.year_month()).with_context(|| {
            format!("Failed to upsert period {}-{:02}", column.year, column.month)
        })?;
    }
    results.insert(RESULT_PERIODS.to_string(), config.period_columns.len());

    let columns = resolve_columns(store, config)?;

    // 2. Sales figures per region
    if let Some(sheet) = source.sheet(&config.sales_sheet) {
        let count = import_sales(sheet, store, config, &columns)?;
        info!(sheet = %sheet.name, upserts = count, "sales sheet imported");
        results.insert(RESULT_SALES.to_string(), count);
    }

    // 3. Expenses, all booked against one region
    if let Some(sheet) = config.expense_sheet(source) {
        let count = import_expenses(sheet, store, config, &columns)?;
        info!(sheet = %sheet.name, upserts = count, "expense sheet imported");
        results.insert(RESULT_EXPENSES.to_string(), count);
    }

    let event = Event::new(
        "import_completed",
        "workbook",
        &fingerprint(source),
        serde_json::json!({
            "results": &results,
            "sheets": &sheets,
        }),
        "importer",
    );
    store.record_event(&event)?;

    Ok(ImportSummary {
        success: true,
        message: "Data imported successfully".to_string(),
        results,
        sheets,
    })
}

/// Column index paired with its stored period (None when the period is missing)
fn resolve_columns(
    store: &dyn MonthlyStore,
    config: &ImportConfig,
) -> Result<Vec<(usize, Option<Period>)>> {
    config
        .period_columns
        .iter()
        .map(|column| {
            let period = store.find_period_by_year_month(column.year_month())?;
            Ok((column.column, period))
        })
        .collect()
}

static EMPTY_CELL: CellValue = CellValue::Empty;

fn cell_at(row: &[CellValue], column: usize) -> &CellValue {
    row.get(column).unwrap_or(&EMPTY_CELL)
}

/// Non-zero values of a row, keyed by period id
fn row_values<'a>(
    row: &'a [CellValue],
    columns: &'a [(usize, Option<Period>)],
) -> impl Iterator<Item = (i64, f64)> + 'a {
    columns.iter().filter_map(move |(column, period)| {
        let value = parse_cell_number(cell_at(row, *column));
        // Zero means "no data"
        if value == 0.0 {
            return None;
        }
        period.as_ref().map(|p| (p.id, value))
    })
}

fn import_sales(
    sheet: &Sheet,
    store: &mut dyn MonthlyStore,
    config: &ImportConfig,
    columns: &[(usize, Option<Period>)],
) -> Result<usize> {
    let mut current_region: Option<Region> = None;
    let mut upserts = 0;

    for row in &sheet.rows {
        if row.is_empty() {
            continue;
        }

        let first_cell = Sheet::first_cell(row);

        if let Some(code) = config.region_code_for(&first_cell) {
            current_region = store.find_region_by_code(code)?;
            if current_region.is_none() {
                debug!(label = %first_cell, code, "region header without stored region");
            }
            continue;
        }

        let region = match &current_region {
            Some(region) => region,
            None => continue,
        };

        let field = match config.sales_rules.classify(&first_cell.to_lowercase()) {
            Some(field) => field,
            None => continue,
        };

        for (period_id, value) in row_values(row, columns) {
            store.upsert_monthly_aggregate(
                region.id,
                period_id,
                &MonthlyPatch::single(field, value),
            )?;
            debug!(region = %region.code, period_id, ?field, value, "sales value upserted");
            upserts += 1;
        }
    }

    Ok(upserts)
}

fn import_expenses(
    sheet: &Sheet,
    store: &mut dyn MonthlyStore,
    config: &ImportConfig,
    columns: &[(usize, Option<Period>)],
) -> Result<usize> {
    let region = match config.expense_region_code() {
        Some(code) => store.find_region_by_code(code)?,
        None => None,
    };
    let region = match region {
        Some(region) => region,
        None => {
            warn!("no expense region available, expense sheet skipped");
            return Ok(0);
        }
    };

    let mut upserts = 0;

    for row in &sheet.rows {
        if row.is_empty() {
            continue;
        }

        let label = Sheet::first_cell(row).to_lowercase();
        let field = match config.expense_rules.classify(&label) {
            Some(field) => field,
            None => continue,
        };

        for (period_id, value) in row_values(row, columns) {
            store.upsert_monthly_aggregate(
                region.id,
                period_id,
                &MonthlyPatch::single(field, value),
            )?;
            debug!(region = %region.code, period_id, ?field, value, "expense value upserted");
            upserts += 1;
        }
    }

    Ok(upserts)
}

// ============================================================================
// TESTS
// ============================================================================

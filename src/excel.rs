// 📗 Excel workbooks
// xlsx / xlsm / xlsb / xls / ods read through calamine into in-memory sheets

use crate::workbook::{CellValue, Sheet, Workbook};
use anyhow::{Context, Result};
use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Range, Reader, Sheets};
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use tracing::debug;

/// File extensions handled by calamine
pub const EXCEL_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

pub fn is_excel_extension(extension: &str) -> bool {
    EXCEL_EXTENSIONS
        .iter()
        .any(|ext| ext.eq_ignore_ascii_case(extension))
}

pub fn read_excel_path(path: &Path) -> Result<Workbook> {
    let sheets = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook: {}", path.display()))?;
    collect_sheets(sheets)
}

/// Read an uploaded workbook; the format is detected from the content
pub fn read_excel_bytes(bytes: Vec<u8>) -> Result<Workbook> {
    let sheets = open_workbook_auto_from_rs(Cursor::new(bytes))
        .context("Failed to read workbook upload")?;
    collect_sheets(sheets)
}

fn collect_sheets<RS: Read + Seek>(mut sheets: Sheets<RS>) -> Result<Workbook> {
    let mut workbook = Workbook::default();

    for name in sheets.sheet_names() {
        let range = sheets
            .worksheet_range(&name)
            .with_context(|| format!("Failed to read sheet: {}", name))?;
        let sheet = sheet_from_range(&name, &range);
        debug!(sheet = %sheet.name, rows = sheet.rows.len(), "loaded Excel sheet");
        workbook.add_sheet(sheet);
    }

    Ok(workbook)
}

/// Cells keep their A1 position: a range starting at B2 gets an empty
/// first row and an empty first column.
fn sheet_from_range(name: &str, range: &Range<Data>) -> Sheet {
    let (row_offset, col_offset) = range
        .start()
        .map(|(row, col)| (row as usize, col as usize))
        .unwrap_or((0, 0));

    let mut rows: Vec<Vec<CellValue>> = vec![Vec::new(); row_offset];
    for row in range.rows() {
        let mut cells = vec![CellValue::Empty; col_offset];
        cells.extend(row.iter().map(cell_value));
        rows.push(cells);
    }

    Sheet::new(name, rows)
}

fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::Int(n) => CellValue::Number(*n as f64),
        Data::Float(n) => CellValue::Number(*n),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::String(s) => CellValue::text(s),
        // Serial day number, as the spreadsheet stores it
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::text(s),
        Data::Error(e) => {
            debug!(error = ?e, "formula error cell treated as empty");
            CellValue::Empty
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::{import_workbook, ImportConfig, RESULT_SALES};
    use crate::models::YearMonth;
    use crate::store::{MemoryStore, MonthlyStore};
    use crate::workbook::WorkbookSource;
    use std::path::PathBuf;

    fn fixture() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/fixtures/sales_plan.xlsx")
    }

    #[test]
    fn test_extension_check() {
        assert!(is_excel_extension("xlsx"));
        assert!(is_excel_extension("ODS"));
        assert!(!is_excel_extension("csv"));
    }

    #[test]
    fn test_read_xlsx_fixture() {
        let workbook = read_excel_path(&fixture()).unwrap();

        assert_eq!(workbook.sheet_names(), vec!["Sales plan regions", "Notes"]);

        let sales = workbook.sheet("Sales plan regions").unwrap();
        assert_eq!(Sheet::first_cell(&sales.rows[1]), "Uzbekistan");
        assert_eq!(sales.rows[2][1], CellValue::Number(28_098.0));
        assert_eq!(sales.rows[2][2], CellValue::Text("29,358".to_string()));

        // Notes starts at B2
        let notes = workbook.sheet("Notes").unwrap();
        assert!(notes.rows[0].is_empty());
        assert_eq!(notes.rows[1][0], CellValue::Empty);
        assert_eq!(notes.rows[1][1], CellValue::Text("hello".to_string()));
    }

    #[test]
    fn test_bytes_match_path_reader() {
        let bytes = std::fs::read(fixture()).unwrap();
        let from_bytes = read_excel_bytes(bytes).unwrap();
        assert_eq!(from_bytes, read_excel_path(&fixture()).unwrap());
    }

    #[test]
    fn test_garbage_bytes_are_an_error() {
        assert!(read_excel_bytes(b"not a spreadsheet".to_vec()).is_err());
    }

    #[test]
    fn test_import_from_xlsx() {
        let workbook = read_excel_path(&fixture()).unwrap();
        let mut store = MemoryStore::new();

        let summary = import_workbook(&workbook, &mut store, &ImportConfig::default()).unwrap();
        assert_eq!(summary.count(RESULT_SALES), Some(2));

        let uz = store.find_region_by_code("uz").unwrap().unwrap();
        let dec = store
            .find_period_by_year_month(YearMonth::new(2025, 12))
            .unwrap()
            .unwrap();
        assert_eq!(store.monthly(uz.id, dec.id).unwrap().revenue, 29_358.0);
    }
}

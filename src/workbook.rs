// 📒 Workbook Sources
// Named sheets of raw cells, loaded from CSV exports or a JSON document

use crate::excel::{is_excel_extension, read_excel_bytes, read_excel_path};
use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use tracing::debug;

// ============================================================================
// CORE TYPES
// ============================================================================

/// Raw spreadsheet cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn text(value: &str) -> Self {
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value.to_string())
        }
    }

    /// Cell rendered the way a spreadsheet would show it
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            CellValue::Number(n) => n.to_string(),
            CellValue::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    #[serde(default)]
    pub rows: Vec<Vec<CellValue>>,
}

impl Sheet {
    pub fn new(name: &str, rows: Vec<Vec<CellValue>>) -> Self {
        Sheet {
            name: name.to_string(),
            rows,
        }
    }

    /// Build a sheet from string cells (blank strings become empty cells)
    pub fn from_strings(name: &str, rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|row| row.iter().map(|cell| CellValue::text(cell)).collect())
            .collect();
        Sheet::new(name, rows)
    }

    /// Trimmed text of the row's first cell
    pub fn first_cell(row: &[CellValue]) -> String {
        row.first()
            .map(|cell| cell.as_text().trim().to_string())
            .unwrap_or_default()
    }
}

// ============================================================================
// SOURCE TRAIT
// ============================================================================

/// Anything the importer can read sheets from
pub trait WorkbookSource {
    /// Sheet names in workbook order
    fn sheet_names(&self) -> Vec<String>;

    /// Sheet by exact (case-sensitive) name
    fn sheet(&self, name: &str) -> Option<&Sheet>;
}

/// In-memory workbook
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workbook {
    #[serde(default)]
    pub sheets: Vec<Sheet>,
}

impl WorkbookSource for Workbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }
}

impl Workbook {
    pub fn new(sheets: Vec<Sheet>) -> Self {
        Workbook { sheets }
    }

    pub fn add_sheet(&mut self, sheet: Sheet) {
        self.sheets.push(sheet);
    }

    /// Parse `{"sheets": [{"name": "...", "rows": [[...], ...]}]}`
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse workbook JSON")
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read workbook: {}", path.display()))?;
        Self::from_json_str(&content)
    }

    /// Load one headerless CSV file as a sheet named after the file stem
    pub fn sheet_from_csv(path: &Path) -> Result<Sheet> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open file: {}", path.display()))?;

        Self::sheet_from_csv_reader(&sheet_name_for(path), file)
            .with_context(|| format!("Failed to parse CSV file: {}", path.display()))
    }

    /// Headerless CSV with ragged rows as one sheet
    pub fn sheet_from_csv_reader<R: Read>(name: &str, reader: R) -> Result<Sheet> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut rows = Vec::new();
        for (line_num, result) in reader.records().enumerate() {
            let record =
                result.with_context(|| format!("Failed to parse CSV line {}", line_num + 1))?;
            rows.push(record.iter().map(CellValue::text).collect());
        }

        Ok(Sheet::new(name, rows))
    }

    /// Load every `*.csv` in a directory, one sheet per file, sorted by file name
    pub fn from_csv_dir(dir: &Path) -> Result<Self> {
        let mut paths: Vec<_> = fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory: {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut workbook = Workbook::default();
        for path in paths {
            let sheet = Self::sheet_from_csv(&path)?;
            debug!(sheet = %sheet.name, rows = sheet.rows.len(), "loaded CSV sheet");
            workbook.add_sheet(sheet);
        }

        Ok(workbook)
    }

    /// Load a workbook from a CSV directory, an Excel file, a `.json`
    /// workbook or a single `.csv`
    pub fn load(path: &Path) -> Result<Self> {
        if path.is_dir() {
            return Self::from_csv_dir(path);
        }

        match extension_of(&path.to_string_lossy()).as_str() {
            "json" => Self::from_json_file(path),
            "csv" => Ok(Workbook::new(vec![Self::sheet_from_csv(path)?])),
            ext if is_excel_extension(ext) => read_excel_path(path),
            _ => Err(anyhow!(
                "Unsupported workbook format: {} (expected a CSV directory, Excel, .csv or .json)",
                path.display()
            )),
        }
    }

    /// Decode an uploaded file. The extension of `file_name` picks the
    /// format; a name without one is read as an Excel workbook.
    pub fn from_bytes(file_name: &str, bytes: Vec<u8>) -> Result<Self> {
        match extension_of(file_name).as_str() {
            "json" => {
                let text = String::from_utf8(bytes).context("Workbook JSON is not valid UTF-8")?;
                Self::from_json_str(&text)
            }
            "csv" => {
                let sheet =
                    Self::sheet_from_csv_reader(&sheet_name_for(Path::new(file_name)), &bytes[..])?;
                Ok(Workbook::new(vec![sheet]))
            }
            "" => read_excel_bytes(bytes),
            ext if is_excel_extension(ext) => read_excel_bytes(bytes),
            _ => Err(anyhow!("Unsupported workbook format: {}", file_name)),
        }
    }
}

fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default()
}

fn sheet_name_for(path: &Path) -> String {
    path.file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or("Sheet1")
        .to_string()
}

// ============================================================================
// CELL PARSING
// ============================================================================

const CURRENCY_SYMBOLS: [char; 7] = ['$', '€', '£', '¥', '₽', '₸', '₾'];

/// Numeric value of a cell. Thousands separators, currency symbols and
/// whitespace are stripped, then the longest leading number is read
/// (`"12%"` is 12). Anything without a leading number, or non-finite, is 0.
pub fn parse_cell_number(cell: &CellValue) -> f64 {
    match cell {
        CellValue::Number(n) if n.is_finite() => *n,
        CellValue::Text(text) => parse_numeric_text(text),
        _ => 0.0,
    }
}

pub fn parse_numeric_text(text: &str) -> f64 {
    let cleaned: String = text
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace() && !CURRENCY_SYMBOLS.contains(c))
        .collect();

    if cleaned.is_empty() {
        return 0.0;
    }

    let prefix = numeric_prefix(&cleaned);
    match prefix.parse::<f64>() {
        Ok(value) if value.is_finite() => {
            if prefix.len() < cleaned.len() {
                debug!(cell = %text, value, "trailing text after number ignored");
            }
            value
        }
        _ => {
            debug!(cell = %text, "non-numeric cell treated as 0");
            0.0
        }
    }
}

/// Longest prefix of `text` shaped like `[+-]digits[.digits][e[+-]digits]`
fn numeric_prefix(text: &str) -> &str {
    let bytes = text.as_bytes();
    let len = bytes.len();
    let mut i = 0;

    if i < len && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }

    let int_start = i;
    while i < len && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut has_digits = i > int_start;

    if i < len && bytes[i] == b'.' {
        let mut j = i + 1;
        while j < len && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if has_digits || j > i + 1 {
            has_digits = true;
            i = j;
        }
    }

    if !has_digits {
        return "";
    }

    let mut end = i;
    if i < len && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < len && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < len && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            end = j;
        }
    }

    &text[..end]
}

/// SHA-256 over sheet names and cell text, for audit records
pub fn fingerprint(source: &dyn WorkbookSource) -> String {
    let mut hasher = Sha256::new();
    for name in source.sheet_names() {
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        if let Some(sheet) = source.sheet(&name) {
            for row in &sheet.rows {
                for cell in row {
                    hasher.update(cell.as_text().as_bytes());
                    hasher.update([0x1f]);
                }
                hasher.update([0x1e]);
            }
        }
    }
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numeric_text() {
        assert_eq!(parse_numeric_text("28,098"), 28_098.0);
        assert_eq!(parse_numeric_text("$ 1,234.50"), 1_234.5);
        assert_eq!(parse_numeric_text(" -450 "), -450.0);
        assert_eq!(parse_numeric_text("€12"), 12.0);
        assert_eq!(parse_numeric_text(""), 0.0);
        assert_eq!(parse_numeric_text("abc"), 0.0);
        assert_eq!(parse_numeric_text("NaN"), 0.0);
        assert_eq!(parse_numeric_text("inf"), 0.0);
        assert_eq!(parse_numeric_text("1e999"), 0.0);
    }

    #[test]
    fn test_parse_numeric_prefix() {
        assert_eq!(parse_numeric_text("12%"), 12.0);
        assert_eq!(parse_numeric_text("100abc"), 100.0);
        assert_eq!(parse_numeric_text("1 500 USD"), 1_500.0);
        assert_eq!(parse_numeric_text("3.5x"), 3.5);
        assert_eq!(parse_numeric_text(".5"), 0.5);
        assert_eq!(parse_numeric_text("2e3k"), 2_000.0);
        assert_eq!(parse_numeric_text("7e"), 7.0);
        assert_eq!(parse_numeric_text("-"), 0.0);
        assert_eq!(parse_numeric_text("."), 0.0);
        assert_eq!(parse_numeric_text("USD 100"), 0.0);
    }

    #[test]
    fn test_parse_cell_number() {
        assert_eq!(parse_cell_number(&CellValue::Number(42.5)), 42.5);
        assert_eq!(parse_cell_number(&CellValue::Number(f64::NAN)), 0.0);
        assert_eq!(parse_cell_number(&CellValue::Empty), 0.0);
        assert_eq!(parse_cell_number(&CellValue::Bool(true)), 0.0);
        assert_eq!(parse_cell_number(&CellValue::text("1 000")), 1_000.0);
    }

    #[test]
    fn test_cell_as_text() {
        assert_eq!(CellValue::Number(28098.0).as_text(), "28098");
        assert_eq!(CellValue::Number(0.5).as_text(), "0.5");
        assert_eq!(CellValue::Empty.as_text(), "");
        assert_eq!(CellValue::text(""), CellValue::Empty);
    }

    #[test]
    fn test_first_cell_is_trimmed() {
        let row = vec![CellValue::text("  Uzbekistan "), CellValue::Number(1.0)];
        assert_eq!(Sheet::first_cell(&row), "Uzbekistan");
        assert_eq!(Sheet::first_cell(&[]), "");
    }

    #[test]
    fn test_workbook_from_json() {
        let json = r#"{
            "sheets": [
                {"name": "Sales plan regions", "rows": [["Uzbekistan"], ["MRR", "28,098", 29358, null]]},
                {"name": "Notes"}
            ]
        }"#;
        let workbook = Workbook::from_json_str(json).unwrap();

        assert_eq!(workbook.sheet_names(), vec!["Sales plan regions", "Notes"]);
        let sheet = workbook.sheet("Sales plan regions").unwrap();
        assert_eq!(sheet.rows[1][1], CellValue::Text("28,098".to_string()));
        assert_eq!(sheet.rows[1][2], CellValue::Number(29_358.0));
        assert_eq!(sheet.rows[1][3], CellValue::Empty);
        assert!(workbook.sheet("notes").is_none());
        assert!(workbook.sheet("Notes").unwrap().rows.is_empty());
    }

    #[test]
    fn test_workbook_from_csv_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("Sales plan regions.csv"),
            "Uzbekistan\nMRR,\"28,098\",29358\n",
        )
        .unwrap();
        fs::write(dir.path().join("P&L.csv"), "Salary,8000\n").unwrap();
        fs::write(dir.path().join("readme.txt"), "ignored").unwrap();

        let workbook = Workbook::load(dir.path()).unwrap();

        assert_eq!(workbook.sheet_names(), vec!["P&L", "Sales plan regions"]);
        let sales = workbook.sheet("Sales plan regions").unwrap();
        assert_eq!(sales.rows.len(), 2);
        assert_eq!(sales.rows[0].len(), 1);
        assert_eq!(parse_cell_number(&sales.rows[1][1]), 28_098.0);
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.txt");
        fs::write(&path, b"Region,Nov").unwrap();
        assert!(Workbook::load(&path).is_err());

        let broken = dir.path().join("book.xlsx");
        fs::write(&broken, b"PK").unwrap();
        assert!(Workbook::load(&broken).is_err());
    }

    #[test]
    fn test_from_bytes_by_extension() {
        let csv = Workbook::from_bytes("P&L.csv", b"Salary,8000\nMarketing,\"1,200\"".to_vec()).unwrap();
        assert_eq!(csv.sheet_names(), vec!["P&L"]);
        let sheet = csv.sheet("P&L").unwrap();
        assert_eq!(parse_cell_number(&sheet.rows[1][1]), 1200.0);

        let json = r#"{"sheets": [{"name": "Budget", "rows": [["Office", 300]]}]}"#;
        let book = Workbook::from_bytes("book.JSON", json.as_bytes().to_vec()).unwrap();
        assert_eq!(book.sheet_names(), vec!["Budget"]);

        assert!(Workbook::from_bytes("notes.txt", b"hello".to_vec()).is_err());
        assert!(Workbook::from_bytes("upload", b"hello".to_vec()).is_err());
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let a = Workbook::new(vec![Sheet::from_strings("P&L", &[&["Salary", "8000"]])]);
        let b = Workbook::new(vec![Sheet::from_strings("P&L", &[&["Salary", "8001"]])]);

        assert_eq!(fingerprint(&a), fingerprint(&a.clone()));
        assert_ne!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a).len(), 64);
    }
}

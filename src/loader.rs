// 📂 Loader - Spreadsheet and CSV tables → raw rows
// One trait, one reader per file format, picked from the file extension

use crate::config::{MasterSpec, SheetSpec};
use crate::error::{ReconcileError, Result};
use crate::model::{CellValue, RawRow, RawTable};
use calamine::{open_workbook_auto, Data, Range, Reader};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

// ============================================================================
// CORE TYPES
// ============================================================================

/// InputFormat - how a table file is read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// xlsx / xlsm / xlsb / xls / ods through calamine
    Spreadsheet,
    /// Plain CSV with a header row; sheet names are ignored
    Csv,
}

/// Header names of the columns to extract
#[derive(Debug, Clone, PartialEq)]
pub struct Columns {
    pub id: String,
    pub price: String,
    pub secondary_price: Option<String>,
}

impl Columns {
    pub fn new(id: &str, price: &str) -> Self {
        Columns {
            id: id.to_string(),
            price: price.to_string(),
            secondary_price: None,
        }
    }
}

/// One table to pull out of a file
#[derive(Debug, Clone, PartialEq)]
pub struct TableRequest {
    /// `None` = first sheet
    pub sheet: Option<String>,
    pub columns: Columns,
}

impl From<&SheetSpec> for TableRequest {
    fn from(spec: &SheetSpec) -> Self {
        TableRequest {
            sheet: Some(spec.sheet.clone()),
            columns: Columns::new(&spec.id_column, &spec.price_column),
        }
    }
}

impl From<&MasterSpec> for TableRequest {
    fn from(spec: &MasterSpec) -> Self {
        TableRequest {
            sheet: spec.sheet.clone(),
            columns: Columns {
                id: spec.id_column.clone(),
                price: spec.price_column.clone(),
                secondary_price: spec.secondary_price_column.clone(),
            },
        }
    }
}

// ============================================================================
// READER TRAIT
// ============================================================================

/// TableReader - reads requested tables out of one file.
///
/// Errors are always fatal: missing file, missing sheet, missing column.
/// Cell contents are never judged here; that is the cleaner's job.
pub trait TableReader {
    fn read_tables(&self, path: &Path, requests: &[TableRequest]) -> Result<Vec<RawTable>>;

    fn format(&self) -> InputFormat;

    fn read_table(&self, path: &Path, request: &TableRequest) -> Result<RawTable> {
        let mut tables = self.read_tables(path, std::slice::from_ref(request))?;
        tables
            .pop()
            .ok_or_else(|| ReconcileError::Schema(format!("no table read from {}", path.display())))
    }
}

/// Pick the format from the file extension
pub fn detect_format(path: &Path) -> Result<InputFormat> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(InputFormat::Spreadsheet),
        "csv" => Ok(InputFormat::Csv),
        _ => Err(ReconcileError::UnsupportedFormat(path.to_path_buf())),
    }
}

pub fn get_reader(format: InputFormat) -> Box<dyn TableReader> {
    match format {
        InputFormat::Spreadsheet => Box::new(SpreadsheetReader),
        InputFormat::Csv => Box::new(CsvTableReader),
    }
}

fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(ReconcileError::file_access(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        ))
    }
}

// ============================================================================
// ENTRY POINTS
// ============================================================================

/// Load both purchase price sheets from one workbook
pub fn load_sources(
    path: &Path,
    source_a: &SheetSpec,
    source_b: &SheetSpec,
) -> Result<(RawTable, RawTable)> {
    info!("Loading data from {}", path.display());
    let reader = get_reader(detect_format(path)?);
    let requests = [TableRequest::from(source_a), TableRequest::from(source_b)];

    let mut tables = reader.read_tables(path, &requests)?.into_iter();
    match (tables.next(), tables.next()) {
        (Some(a), Some(b)) => {
            info!("Loaded {}: {} rows", a.name, a.len());
            info!("Loaded {}: {} rows", b.name, b.len());
            Ok((a, b))
        }
        _ => Err(ReconcileError::Schema(format!(
            "expected two sheets in {}",
            path.display()
        ))),
    }
}

/// Load the master price list (workbook or CSV export)
pub fn load_master(path: &Path, spec: &MasterSpec) -> Result<RawTable> {
    info!("Loading master data from {}", path.display());
    let reader = get_reader(detect_format(path)?);
    let table = reader.read_table(path, &TableRequest::from(spec))?;
    info!("Loaded master data: {} rows", table.len());
    Ok(table)
}

/// SHA-256 of the file contents, recorded in the report for provenance
pub fn fingerprint_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| ReconcileError::file_access(path, e))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// HEADER LOOKUP
// ============================================================================

/// Column positions resolved against a header row
struct ColumnIndex {
    id: usize,
    price: usize,
    secondary_price: Option<usize>,
}

impl ColumnIndex {
    fn resolve(headers: &[String], columns: &Columns, table: &str) -> Result<Self> {
        let find = |name: &str| -> Result<usize> {
            headers
                .iter()
                .position(|h| h.trim() == name.trim())
                .ok_or_else(|| {
                    ReconcileError::Schema(format!(
                        "column '{}' not found in '{}' (available: {})",
                        name,
                        table,
                        headers.join(", ")
                    ))
                })
        };

        Ok(ColumnIndex {
            id: find(&columns.id)?,
            price: find(&columns.price)?,
            secondary_price: match &columns.secondary_price {
                Some(name) => Some(find(name)?),
                None => None,
            },
        })
    }

    fn build_row(&self, row_number: usize, cell: impl Fn(usize) -> CellValue) -> Option<RawRow> {
        let article = cell(self.id);
        let price = cell(self.price);
        let secondary = self.secondary_price.map(&cell);

        let secondary_empty = secondary.as_ref().map_or(true, |c| c.is_empty());
        if article.is_empty() && price.is_empty() && secondary_empty {
            return None;
        }

        let row = RawRow::new(row_number, article, price);
        Some(match secondary {
            Some(s) => row.with_secondary_price(s),
            None => row,
        })
    }
}

// ============================================================================
// SPREADSHEET READER
// ============================================================================

pub struct SpreadsheetReader;

impl TableReader for SpreadsheetReader {
    fn read_tables(&self, path: &Path, requests: &[TableRequest]) -> Result<Vec<RawTable>> {
        ensure_exists(path)?;
        let mut workbook = open_workbook_auto(path)?;
        let sheet_names = workbook.sheet_names();

        let mut tables = Vec::with_capacity(requests.len());
        for request in requests {
            let sheet = resolve_sheet(&sheet_names, &request.sheet, path)?;

            debug!("Reading sheet '{}'", sheet);
            let range = workbook.worksheet_range(&sheet)?;
            tables.push(table_from_range(&sheet, &range, &request.columns)?);
        }

        Ok(tables)
    }

    fn format(&self) -> InputFormat {
        InputFormat::Spreadsheet
    }
}

/// Pick the requested sheet, or the first one when none is named
pub fn resolve_sheet(sheet_names: &[String], requested: &Option<String>, path: &Path) -> Result<String> {
    match requested {
        Some(name) if sheet_names.iter().any(|s| s == name) => Ok(name.clone()),
        Some(name) => Err(ReconcileError::Schema(format!(
            "sheet '{}' not found in {} (available: {})",
            name,
            path.display(),
            sheet_names.join(", ")
        ))),
        None => sheet_names
            .first()
            .cloned()
            .ok_or_else(|| ReconcileError::Schema(format!("{} contains no sheets", path.display()))),
    }
}

fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) => CellValue::from(s.as_str()),
        other => CellValue::Text(other.to_string()),
    }
}

/// Convert a sheet's used range into raw rows.
///
/// The first row of the used range is the header.
pub fn table_from_range(name: &str, range: &Range<Data>, columns: &Columns) -> Result<RawTable> {
    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row.iter().map(|d| cell_from_data(d).as_text()).collect(),
        None => {
            return Err(ReconcileError::Schema(format!(
                "sheet '{}' is empty, expected a header row",
                name
            )))
        }
    };

    let index = ColumnIndex::resolve(&headers, columns, name)?;
    // 1-based sheet row of the header
    let header_row = range.start().map(|(r, _)| r as usize + 1).unwrap_or(1);

    let raw_rows = rows
        .enumerate()
        .filter_map(|(i, cells)| {
            index.build_row(header_row + i + 1, |col| {
                cells.get(col).map(cell_from_data).unwrap_or(CellValue::Empty)
            })
        })
        .collect();

    Ok(RawTable::new(name, raw_rows))
}

// ============================================================================
// CSV READER
// ============================================================================

pub struct CsvTableReader;

impl TableReader for CsvTableReader {
    fn read_tables(&self, path: &Path, requests: &[TableRequest]) -> Result<Vec<RawTable>> {
        ensure_exists(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("table.csv")
            .to_string();

        requests
            .iter()
            .map(|request| {
                let file = File::open(path).map_err(|e| ReconcileError::file_access(path, e))?;
                table_from_csv(&name, file, &request.columns)
            })
            .collect()
    }

    fn format(&self) -> InputFormat {
        InputFormat::Csv
    }
}

/// Read a CSV stream with a header row into raw rows
pub fn table_from_csv<R: std::io::Read>(name: &str, input: R, columns: &Columns) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let index = ColumnIndex::resolve(&headers, columns, name)?;

    let mut rows = Vec::new();
    for (line_num, result) in reader.records().enumerate() {
        let record = result?;
        // +2 because: 1-indexed + header row
        if let Some(row) = index.build_row(line_num + 2, |col| {
            record.get(col).map(CellValue::from).unwrap_or(CellValue::Empty)
        }) {
            rows.push(row);
        }
    }

    Ok(RawTable::new(name, rows))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sheet(cells: &[&[Data]]) -> Range<Data> {
        let height = cells.len() as u32;
        let width = cells.iter().map(|r| r.len()).max().unwrap_or(1) as u32;
        let mut range = Range::new((0, 0), (height - 1, width - 1));
        for (r, row) in cells.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                range.set_value((r as u32, c as u32), value.clone());
            }
        }
        range
    }

    fn text(s: &str) -> Data {
        Data::String(s.to_string())
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(Path::new("purchase_price.xlsx")).unwrap(), InputFormat::Spreadsheet);
        assert_eq!(detect_format(Path::new("PRICES.XLS")).unwrap(), InputFormat::Spreadsheet);
        assert_eq!(detect_format(Path::new("final_purchase_price.csv")).unwrap(), InputFormat::Csv);
        assert!(matches!(
            detect_format(Path::new("notes.txt")),
            Err(ReconcileError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_resolve_sheet() {
        let names = vec!["Tabelle1".to_string(), "Bestand Odoo".to_string()];
        let path = Path::new("purchase_price.xlsx");

        assert_eq!(resolve_sheet(&names, &Some("Bestand Odoo".to_string()), path).unwrap(), "Bestand Odoo");
        assert_eq!(resolve_sheet(&names, &None, path).unwrap(), "Tabelle1");

        let err = resolve_sheet(&names, &Some("Preise".to_string()), path).unwrap_err();
        assert!(matches!(err, ReconcileError::Schema(_)));
        assert!(err.to_string().contains("Preise"));
        assert!(err.to_string().contains("Tabelle1, Bestand Odoo"));

        let err = resolve_sheet(&[], &None, path).unwrap_err();
        assert!(matches!(err, ReconcileError::Schema(_)));
        assert!(err.to_string().contains("no sheets"));
    }

    #[test]
    fn test_get_reader_format() {
        assert_eq!(get_reader(InputFormat::Csv).format(), InputFormat::Csv);
        assert_eq!(get_reader(InputFormat::Spreadsheet).format(), InputFormat::Spreadsheet);
    }

    #[test]
    fn test_table_from_range_reads_selected_columns() {
        let range = sheet(&[
            &[text("Artnr"), text("Other"), text("Fielmann EK")],
            &[text("ART001"), text("x"), Data::Float(15.5)],
            &[Data::Float(12345.0), text("y"), text("25,75")],
            &[Data::Empty, Data::Empty, Data::Empty],
            &[text("ART003"), text("z"), Data::Empty],
        ]);

        let table = table_from_range("Tabelle1", &range, &Columns::new("Artnr", "Fielmann EK")).unwrap();

        assert_eq!(table.name, "Tabelle1");
        assert_eq!(table.len(), 3, "blank row is skipped");
        assert_eq!(table.rows[0].row_number, 2);
        assert_eq!(table.rows[0].article, CellValue::Text("ART001".to_string()));
        assert_eq!(table.rows[0].price, CellValue::Number(15.5));
        assert_eq!(table.rows[1].article, CellValue::Number(12345.0));
        assert_eq!(table.rows[1].price, CellValue::Text("25,75".to_string()));
        assert_eq!(table.rows[2].row_number, 5);
        assert_eq!(table.rows[2].price, CellValue::Empty);
    }

    #[test]
    fn test_table_from_range_missing_column() {
        let range = sheet(&[&[text("Artnr"), text("Preis")], &[text("ART001"), Data::Float(1.0)]]);
        let result = table_from_range("Tabelle1", &range, &Columns::new("Artnr", "Fielmann EK"));

        match result {
            Err(ReconcileError::Schema(msg)) => assert!(msg.contains("Fielmann EK")),
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_table_from_range_secondary_price() {
        let range = sheet(&[
            &[text("sku"), text("p1"), text("p2")],
            &[text("Frames_100"), Data::Empty, Data::Float(9.5)],
        ]);
        let columns = Columns {
            id: "sku".to_string(),
            price: "p1".to_string(),
            secondary_price: Some("p2".to_string()),
        };

        let table = table_from_range("master", &range, &columns).unwrap();
        assert_eq!(table.rows[0].secondary_price, Some(CellValue::Number(9.5)));
    }

    #[test]
    fn test_table_from_csv() {
        let data = "article_number,price,source\nART001,15.5,SourceA\n,,\nART002,,SourceB\n";
        let table = table_from_csv("merged.csv", data.as_bytes(), &Columns::new("article_number", "price")).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0].row_number, 2);
        assert_eq!(table.rows[1].row_number, 4);
        assert_eq!(table.rows[1].price, CellValue::Empty);
    }

    #[test]
    fn test_csv_reader_missing_file() {
        let reader = CsvTableReader;
        let request = TableRequest {
            sheet: None,
            columns: Columns::new("a", "b"),
        };
        let result = reader.read_table(Path::new("nonexistent_file.csv"), &request);
        assert!(matches!(result, Err(ReconcileError::FileAccess { .. })));
    }

    #[test]
    fn test_spreadsheet_reader_missing_file() {
        let result = load_sources(
            Path::new("nonexistent_file.xlsx"),
            &SheetSpec::new("Tabelle1", "Artnr", "Fielmann EK"),
            &SheetSpec::new("Bestand Odoo", "Interne Referenz", "Kosten"),
        );
        assert!(matches!(result, Err(ReconcileError::FileAccess { .. })));
    }

    #[test]
    fn test_load_master_from_csv() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "Product ID [sku],Store Purchase Price [attribute6]").unwrap();
        writeln!(file, "Frames_1001,\"12,50\"").unwrap();
        writeln!(file, "Lenses_1002,8.00").unwrap();

        let table = load_master(file.path(), &MasterSpec::default()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0].article, CellValue::Text("Frames_1001".to_string()));
        assert_eq!(table.rows[0].price, CellValue::Text("12,50".to_string()));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "abc").unwrap();

        let fp = fingerprint_file(file.path()).unwrap();
        assert_eq!(fp, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }
}

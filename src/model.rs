// 📦 Core types shared by every pipeline stage

use serde::{Deserialize, Serialize};

// ============================================================================
// SOURCE
// ============================================================================

/// Where a merged record's price came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    /// Recent purchase prices - wins every conflict
    SourceA,
    /// Complete article database
    SourceB,
    /// Present in both; price taken from SourceA
    Both,
}

impl Source {
    /// Human-readable name for reports
    pub fn name(&self) -> &str {
        match self {
            Source::SourceA => "Recent prices only",
            Source::SourceB => "Article database only",
            Source::Both => "Both (recent price priority)",
        }
    }

    /// Label used in CSV output
    pub fn code(&self) -> &str {
        match self {
            Source::SourceA => "SourceA",
            Source::SourceB => "SourceB",
            Source::Both => "Both",
        }
    }
}

// ============================================================================
// ARTICLE RECORD
// ============================================================================

/// One cleaned article.
///
/// `price` is `None` when the source cell was empty or could not be parsed.
/// Such records still count for overlap and coverage but never enter numeric
/// statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub article_number: String,
    pub price: Option<f64>,
    pub source: Source,
}

impl ArticleRecord {
    pub fn new(article_number: impl Into<String>, price: Option<f64>, source: Source) -> Self {
        ArticleRecord {
            article_number: article_number.into(),
            price,
            source,
        }
    }

    pub fn has_price(&self) -> bool {
        self.price.is_some()
    }
}

// ============================================================================
// RAW INPUT
// ============================================================================

/// A single cell as read from a sheet, before any normalization
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(_) => false,
        }
    }

    /// Text rendering used for issue reports and identifier cleaning.
    /// Whole numbers render without a fraction ("12345", not "12345.0").
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            CellValue::Number(n) => n.to_string(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        if value.trim().is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value.to_string())
        }
    }
}

/// Identifier and price cell of one data row
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// 1-based row in the source sheet; the header is row 1
    pub row_number: usize,
    pub article: CellValue,
    pub price: CellValue,
    /// Fallback price cell, only read for the master list
    pub secondary_price: Option<CellValue>,
}

impl RawRow {
    pub fn new(row_number: usize, article: CellValue, price: CellValue) -> Self {
        RawRow {
            row_number,
            article,
            price,
            secondary_price: None,
        }
    }

    pub fn with_secondary_price(mut self, price: CellValue) -> Self {
        self.secondary_price = Some(price);
        self
    }
}

/// Rows of one sheet together with where they came from
#[derive(Debug, Clone)]
pub struct RawTable {
    /// Display name (sheet name or file name)
    pub name: String,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    pub fn new(name: impl Into<String>, rows: Vec<RawRow>) -> Self {
        RawTable {
            name: name.into(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_codes() {
        assert_eq!(Source::SourceA.code(), "SourceA");
        assert_eq!(Source::SourceB.code(), "SourceB");
        assert_eq!(Source::Both.code(), "Both");
    }

    #[test]
    fn test_cell_value_text_rendering() {
        assert_eq!(CellValue::Number(12345.0).as_text(), "12345");
        assert_eq!(CellValue::Number(12.5).as_text(), "12.5");
        assert_eq!(CellValue::Text(" ART001 ".to_string()).as_text(), " ART001 ");
        assert_eq!(CellValue::Empty.as_text(), "");
    }

    #[test]
    fn test_cell_value_from_blank_str_is_empty() {
        assert_eq!(CellValue::from("   "), CellValue::Empty);
        assert!(CellValue::Text("  ".to_string()).is_empty());
        assert!(!CellValue::Number(0.0).is_empty());
    }
}

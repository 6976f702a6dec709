// ⚙️ Configuration - sheet/column names, locale and thresholds as data
// Every field has a default matching the purchase-price workbook layout.

use crate::error::{ReconcileError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// ============================================================================
// SHEET SPECS
// ============================================================================

/// Which sheet to read and which two columns hold the identifier and price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetSpec {
    pub sheet: String,
    pub id_column: String,
    pub price_column: String,
}

impl SheetSpec {
    pub fn new(sheet: &str, id_column: &str, price_column: &str) -> Self {
        SheetSpec {
            sheet: sheet.to_string(),
            id_column: id_column.to_string(),
            price_column: price_column.to_string(),
        }
    }
}

/// Layout of the master price list.
///
/// `sheet = None` reads the first sheet of the workbook.
/// Master exports write prices as "1,234.56", so the master list carries its
/// own decimal mark; `None` falls back to the global one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterSpec {
    #[serde(default)]
    pub sheet: Option<String>,
    pub id_column: String,
    pub price_column: String,
    #[serde(default)]
    pub secondary_price_column: Option<String>,
    #[serde(default = "default_master_decimal_mark")]
    pub decimal_mark: Option<DecimalMark>,
}

fn default_master_decimal_mark() -> Option<DecimalMark> {
    Some(DecimalMark::Point)
}

impl Default for MasterSpec {
    fn default() -> Self {
        MasterSpec {
            sheet: None,
            id_column: "Product ID [sku]".to_string(),
            price_column: "Store Purchase Price [attribute6]".to_string(),
            secondary_price_column: None,
            decimal_mark: default_master_decimal_mark(),
        }
    }
}

// ============================================================================
// LOCALE
// ============================================================================

/// Decimal mark used by the price columns.
///
/// The other separator is treated as the thousands separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecimalMark {
    /// "1.234,56" (German workbooks)
    Comma,
    /// "1,234.56"
    Point,
}

impl DecimalMark {
    pub fn decimal_char(&self) -> char {
        match self {
            DecimalMark::Comma => ',',
            DecimalMark::Point => '.',
        }
    }

    pub fn grouping_char(&self) -> char {
        match self {
            DecimalMark::Comma => '.',
            DecimalMark::Point => ',',
        }
    }
}

impl std::str::FromStr for DecimalMark {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "comma" | "," => Ok(DecimalMark::Comma),
            "point" | "dot" | "." => Ok(DecimalMark::Point),
            other => Err(ReconcileError::Config(format!(
                "unknown decimal mark '{}', expected 'comma' or 'point'",
                other
            ))),
        }
    }
}

// ============================================================================
// OUTPUT FILE NAMES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputNames {
    pub merged_csv: String,
    pub analysis_report: String,
    pub comparison_csv: String,
    pub discrepancies_csv: String,
    pub missing_csv: String,
    pub comparison_report: String,
}

impl Default for OutputNames {
    fn default() -> Self {
        OutputNames {
            merged_csv: "final_purchase_price.csv".to_string(),
            analysis_report: "price_analysis_report.md".to_string(),
            comparison_csv: "price_comparison_results.csv".to_string(),
            discrepancies_csv: "price_discrepancies_only.csv".to_string(),
            missing_csv: "missing_articles_in_master.csv".to_string(),
            comparison_report: "master_comparison_report.md".to_string(),
        }
    }
}

// ============================================================================
// APP CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Recent purchase prices (merge priority)
    pub source_a: SheetSpec,
    /// Complete article database
    pub source_b: SheetSpec,
    pub master: MasterSpec,
    pub decimal_mark: DecimalMark,
    /// "000123" and "123" are the same article when set
    pub strip_leading_zeros: bool,
    /// Absolute difference above which two prices disagree
    pub epsilon: f64,
    /// Length of the top increase/decrease lists in the analysis report
    pub top_n: usize,
    /// Length of the top lists in the master comparison report
    pub comparison_top_n: usize,
    pub outputs: OutputNames,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            source_a: SheetSpec::new("Tabelle1", "Artnr", "Fielmann EK"),
            source_b: SheetSpec::new("Bestand Odoo", "Interne Referenz", "Kosten"),
            master: MasterSpec::default(),
            decimal_mark: DecimalMark::Comma,
            strip_leading_zeros: true,
            epsilon: 0.001,
            top_n: 5,
            comparison_top_n: 10,
            outputs: OutputNames::default(),
        }
    }
}

impl AppConfig {
    /// Decimal mark used for master prices
    pub fn master_decimal_mark(&self) -> DecimalMark {
        self.master.decimal_mark.unwrap_or(self.decimal_mark)
    }

    /// Load configuration from a JSON file; missing fields take defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).map_err(|e| ReconcileError::file_access(path, e))?;

        let config: AppConfig = serde_json::from_str(&content).map_err(|e| {
            ReconcileError::Config(format!("{}: {}", path.display(), e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the run meaningless
    pub fn validate(&self) -> Result<()> {
        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err(ReconcileError::Config(format!(
                "epsilon must be a non-negative number, got {}",
                self.epsilon
            )));
        }

        let columns = [
            ("source_a.sheet", &self.source_a.sheet),
            ("source_a.id_column", &self.source_a.id_column),
            ("source_a.price_column", &self.source_a.price_column),
            ("source_b.sheet", &self.source_b.sheet),
            ("source_b.id_column", &self.source_b.id_column),
            ("source_b.price_column", &self.source_b.price_column),
            ("master.id_column", &self.master.id_column),
            ("master.price_column", &self.master.price_column),
        ];

        for (field, value) in columns {
            if value.trim().is_empty() {
                return Err(ReconcileError::Config(format!("{} must not be empty", field)));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_workbook_layout() {
        let config = AppConfig::default();
        assert_eq!(config.source_a.sheet, "Tabelle1");
        assert_eq!(config.source_a.id_column, "Artnr");
        assert_eq!(config.source_b.price_column, "Kosten");
        assert_eq!(config.master.id_column, "Product ID [sku]");
        assert_eq!(config.decimal_mark, DecimalMark::Comma);
        assert_eq!(config.epsilon, 0.001);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "decimal_mark": "point", "epsilon": 0.01,
                 "source_a": {{ "sheet": "Prices", "id_column": "SKU", "price_column": "EK" }} }}"#
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.decimal_mark, DecimalMark::Point);
        assert_eq!(config.epsilon, 0.01);
        assert_eq!(config.source_a.sheet, "Prices");
        assert_eq!(config.source_b.sheet, "Bestand Odoo");
        assert_eq!(config.top_n, 5);
    }

    #[test]
    fn test_missing_config_file() {
        let result = AppConfig::from_file("does/not/exist.json");
        assert!(matches!(result, Err(ReconcileError::FileAccess { .. })));
    }

    #[test]
    fn test_negative_epsilon_rejected() {
        let config = AppConfig {
            epsilon: -1.0,
            ..AppConfig::default()
        };
        assert!(matches!(config.validate(), Err(ReconcileError::Config(_))));
    }

    #[test]
    fn test_empty_column_rejected() {
        let mut config = AppConfig::default();
        config.source_b.id_column = " ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("source_b.id_column"));
    }

    #[test]
    fn test_decimal_mark_from_str() {
        assert_eq!("comma".parse::<DecimalMark>().unwrap(), DecimalMark::Comma);
        assert_eq!("Point".parse::<DecimalMark>().unwrap(), DecimalMark::Point);
        assert!("semicolon".parse::<DecimalMark>().is_err());
    }

    #[test]
    fn test_master_decimal_mark_falls_back_to_global() {
        let mut config = AppConfig::default();
        assert_eq!(config.master_decimal_mark(), DecimalMark::Point);

        config.master.decimal_mark = None;
        assert_eq!(config.master_decimal_mark(), DecimalMark::Comma);

        let json = r#"{ "id_column": "SKU", "price_column": "EK", "decimal_mark": "comma" }"#;
        let master: MasterSpec = serde_json::from_str(json).unwrap();
        assert_eq!(master.decimal_mark, Some(DecimalMark::Comma));

        let json = r#"{ "id_column": "SKU", "price_column": "EK" }"#;
        let master: MasterSpec = serde_json::from_str(json).unwrap();
        assert_eq!(master.decimal_mark, Some(DecimalMark::Point));
    }
}

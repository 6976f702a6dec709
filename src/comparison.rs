// ⚖️ Comparison Engine - consolidated prices vs. the master price list
//
// Every consolidated article ends up in exactly one bucket:
//   Matched           - found in master, |difference| <= epsilon
//   Discrepant        - found in master, |difference| >  epsilon (or no consolidated price)
//   MissingFromMaster - no master row for the article number

use crate::analysis::{top_decreases, top_increases, DifferenceStats, PriceDifference, DEFAULT_EPSILON};
use crate::cleaning::{normalize_article_text, Cleaner, CleaningReport, IssueKind, RowIssue};
use crate::deduplication::{DedupPolicy, DeduplicationEngine, DuplicateReport};
use crate::merge::MergedTable;
use crate::model::{ArticleRecord, RawTable, Source};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// "<category>_<articleNumber>": everything after the last underscore
static SKU_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"_([^_]*)$").expect("valid SKU pattern"));

// ============================================================================
// COMPARISON ROW
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonStatus {
    Matched,
    Discrepant,
    MissingFromMaster,
}

impl ComparisonStatus {
    pub fn name(&self) -> &str {
        match self {
            ComparisonStatus::Matched => "Matched",
            ComparisonStatus::Discrepant => "Discrepant",
            ComparisonStatus::MissingFromMaster => "MissingFromMaster",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub article_number: String,
    pub price_consolidated: Option<f64>,
    pub price_master: Option<f64>,
    pub difference: Option<f64>,
    pub pct_difference: Option<f64>,
    pub status: ComparisonStatus,
}

impl ComparisonRow {
    fn missing(record: &ArticleRecord) -> Self {
        ComparisonRow {
            article_number: record.article_number.clone(),
            price_consolidated: record.price,
            price_master: None,
            difference: None,
            pct_difference: None,
            status: ComparisonStatus::MissingFromMaster,
        }
    }
}

// ============================================================================
// MASTER TABLE
// ============================================================================

/// Cleaned, deduplicated master prices
#[derive(Debug, Clone)]
pub struct MasterTable {
    pub records: Vec<ArticleRecord>,
    pub cleaning: CleaningReport,
    pub duplicates: DuplicateReport,
    /// Rows whose composite identifier had no usable suffix
    pub extraction_failures: usize,
}

impl MasterTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Article number from a composite "<category>_<articleNumber>" identifier
pub fn extract_article_number(sku: &str, strip_leading_zeros: bool) -> Option<String> {
    let caps = SKU_SUFFIX.captures(sku.trim())?;
    let suffix = caps.get(1)?.as_str();
    normalize_article_text(suffix, strip_leading_zeros)
}

/// Clean the raw master rows: extract article numbers, parse prices
/// (primary column, then the secondary one), drop rows without a price,
/// keep the first priced entry per article.
pub fn prepare_master(table: &RawTable, cleaner: &Cleaner, id_column: &str, price_column: &str) -> MasterTable {
    let mut report = CleaningReport::new(&table.name);
    report.rows_read = table.len();

    let mut extraction_failures = 0;
    let mut records = Vec::with_capacity(table.len());
    let mut samples = 0;

    for row in &table.rows {
        let sku = row.article.as_text();
        let article_number = match extract_article_number(&sku, cleaner.strip_leading_zeros) {
            Some(a) => a,
            None => {
                extraction_failures += 1;
                let kind = if row.article.is_empty() {
                    IssueKind::MissingArticle
                } else {
                    IssueKind::UnextractableSku
                };
                report.record(RowIssue {
                    table: table.name.clone(),
                    row_number: row.row_number,
                    column: id_column.to_string(),
                    value: sku,
                    kind,
                });
                continue;
            }
        };

        if samples < 10 {
            debug!("  {} → {}", sku, article_number);
            samples += 1;
        }

        let price = match cleaner.parse_price_cell(&row.price) {
            Ok(p) => Ok(p),
            Err(kind) => match &row.secondary_price {
                Some(secondary) => cleaner.parse_price_cell(secondary).map_err(|_| kind),
                None => Err(kind),
            },
        };

        match price {
            Ok(p) => records.push(ArticleRecord::new(article_number, Some(p), Source::SourceB)),
            Err(kind) => {
                // A reference row without a price is not a usable reference
                report.record(RowIssue {
                    table: table.name.clone(),
                    row_number: row.row_number,
                    column: price_column.to_string(),
                    value: row.price.as_text(),
                    kind,
                });
                report.dropped_rows += 1;
            }
        }
    }

    report.rows_kept = records.len();
    info!("Master data after cleaning: {}", report.summary());
    if extraction_failures > 0 {
        warn!("{} master identifiers without an extractable article number", extraction_failures);
    }

    let dedup = DeduplicationEngine::new(DedupPolicy::KeepFirst).deduplicate(&table.name, records);

    MasterTable {
        records: dedup.records,
        cleaning: report,
        duplicates: dedup.report,
        extraction_failures,
    }
}

// ============================================================================
// COMPARISON REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    /// Matched and Discrepant rows, ordered by article number
    pub rows: Vec<ComparisonRow>,
    /// MissingFromMaster rows, ordered by article number
    pub missing: Vec<ComparisonRow>,
    pub consolidated_total: usize,
    pub master_total: usize,
    pub common: usize,
    /// common / consolidated * 100
    pub coverage: f64,
    /// Master articles absent from the consolidated table
    pub extra_in_master: usize,
    pub stats: DifferenceStats,
    pub top_increases: Vec<PriceDifference>,
    pub top_decreases: Vec<PriceDifference>,
    pub epsilon: f64,
}

impl ComparisonReport {
    pub fn discrepancies(&self) -> impl Iterator<Item = &ComparisonRow> {
        self.rows.iter().filter(|r| r.status == ComparisonStatus::Discrepant)
    }

    pub fn matched_count(&self) -> usize {
        self.rows.iter().filter(|r| r.status == ComparisonStatus::Matched).count()
    }

    pub fn missing_pct(&self) -> f64 {
        if self.consolidated_total == 0 {
            0.0
        } else {
            self.missing.len() as f64 / self.consolidated_total as f64 * 100.0
        }
    }

    /// All rows in one list: compared rows then missing rows, each by article number
    pub fn all_rows(&self) -> Vec<ComparisonRow> {
        let mut all = self.rows.clone();
        all.extend(self.missing.iter().cloned());
        all.sort_by(|a, b| a.article_number.cmp(&b.article_number));
        all
    }

    pub fn summary(&self) -> String {
        format!(
            "Compared {} articles against {} master articles: {} matched, {} discrepant, {} missing (coverage {:.1}%)",
            self.consolidated_total,
            self.master_total,
            self.matched_count(),
            self.discrepancies().count(),
            self.missing.len(),
            self.coverage
        )
    }
}

// ============================================================================
// COMPARISON ENGINE
// ============================================================================

pub struct ComparisonEngine {
    /// |difference| above this is a discrepancy (default 0.001)
    pub epsilon: f64,
    pub top_n: usize,
}

impl ComparisonEngine {
    pub fn new() -> Self {
        ComparisonEngine {
            epsilon: DEFAULT_EPSILON,
            top_n: 10,
        }
    }

    pub fn with_thresholds(epsilon: f64, top_n: usize) -> Self {
        ComparisonEngine { epsilon, top_n }
    }

    pub fn compare(&self, consolidated: &MergedTable, master: &[ArticleRecord]) -> ComparisonReport {
        let master_prices: HashMap<&str, Option<f64>> = master
            .iter()
            .map(|r| (r.article_number.as_str(), r.price))
            .collect();

        let mut ordered: Vec<&ArticleRecord> = consolidated.records.iter().collect();
        ordered.sort_by(|a, b| a.article_number.cmp(&b.article_number));
        ordered.dedup_by(|a, b| a.article_number == b.article_number);

        let mut rows = Vec::new();
        let mut missing = Vec::new();
        let mut differences = Vec::new();

        for record in &ordered {
            let Some(master_price) = master_prices.get(record.article_number.as_str()) else {
                missing.push(ComparisonRow::missing(record));
                continue;
            };

            let row = match (record.price, *master_price) {
                (Some(c), Some(m)) => {
                    let diff = PriceDifference::new(record.article_number.clone(), c, m);
                    let status = if diff.is_discrepant(self.epsilon) {
                        ComparisonStatus::Discrepant
                    } else {
                        ComparisonStatus::Matched
                    };
                    let row = ComparisonRow {
                        article_number: record.article_number.clone(),
                        price_consolidated: Some(c),
                        price_master: Some(m),
                        difference: Some(diff.difference),
                        pct_difference: diff.pct_difference,
                        status,
                    };
                    differences.push(diff);
                    row
                }
                (price_consolidated, price_master) => ComparisonRow {
                    article_number: record.article_number.clone(),
                    price_consolidated,
                    price_master,
                    difference: None,
                    pct_difference: None,
                    status: ComparisonStatus::Discrepant,
                },
            };
            rows.push(row);
        }

        let consolidated_keys: BTreeSet<&str> = ordered.iter().map(|r| r.article_number.as_str()).collect();
        let extra_in_master = master_prices
            .keys()
            .filter(|k| !consolidated_keys.contains(*k))
            .count();

        let consolidated_total = ordered.len();
        let common = rows.len();
        let coverage = if consolidated_total == 0 {
            0.0
        } else {
            common as f64 / consolidated_total as f64 * 100.0
        };

        let stats = DifferenceStats::from_differences(&differences, self.epsilon);

        let report = ComparisonReport {
            top_increases: top_increases(&differences, self.top_n, self.epsilon),
            top_decreases: top_decreases(&differences, self.top_n, self.epsilon),
            rows,
            missing,
            consolidated_total,
            master_total: master_prices.len(),
            common,
            coverage,
            extra_in_master,
            stats,
            epsilon: self.epsilon,
        };

        info!("Articles in consolidated data: {}", report.consolidated_total);
        info!("Articles in master data: {}", report.master_total);
        info!("Missing in master data: {}", report.missing.len());
        info!("Extra in master data: {}", report.extra_in_master);
        info!("{}", report.summary());

        report
    }
}

impl Default for ComparisonEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CellValue, RawRow};

    fn merged(records: &[(&str, Option<f64>)]) -> MergedTable {
        MergedTable::new(
            records
                .iter()
                .map(|(a, p)| ArticleRecord::new(*a, *p, Source::SourceA))
                .collect(),
        )
    }

    fn master(records: &[(&str, f64)]) -> Vec<ArticleRecord> {
        records
            .iter()
            .map(|(a, p)| ArticleRecord::new(*a, Some(*p), Source::SourceB))
            .collect()
    }

    #[test]
    fn test_missing_from_empty_master() {
        let engine = ComparisonEngine::new();
        let report = engine.compare(&merged(&[("A1", Some(10.0))]), &[]);

        assert_eq!(report.missing.len(), 1);
        assert_eq!(report.missing[0].status, ComparisonStatus::MissingFromMaster);
        assert_eq!(report.coverage, 0.0);
        assert!(report.rows.is_empty());
        assert_eq!(report.missing_pct(), 100.0);
    }

    #[test]
    fn test_classification() {
        let engine = ComparisonEngine::new();
        let report = engine.compare(
            &merged(&[("A3", Some(12.0)), ("A1", Some(10.0)), ("A2", Some(20.0)), ("A4", None), ("A5", Some(1.0))]),
            &master(&[("A1", 10.0), ("A2", 25.0), ("A3", 12.0005), ("A4", 3.0), ("B9", 99.0)]),
        );

        let statuses: Vec<(&str, ComparisonStatus)> = report
            .rows
            .iter()
            .map(|r| (r.article_number.as_str(), r.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("A1", ComparisonStatus::Matched),
                ("A2", ComparisonStatus::Discrepant),
                ("A3", ComparisonStatus::Matched),
                ("A4", ComparisonStatus::Discrepant),
            ]
        );
        assert_eq!(report.rows[3].difference, None);
        assert_eq!(report.missing.len(), 1);
        assert_eq!(report.missing[0].article_number, "A5");
        assert_eq!(report.common, 4);
        assert_eq!(report.coverage, 80.0);
        assert_eq!(report.extra_in_master, 1);
        assert_eq!(report.stats.count, 3);
        assert_eq!(report.discrepancies().count(), 2);
        assert_eq!(report.top_decreases[0].article_number, "A2");
        assert_eq!(report.all_rows().len(), 5);
    }

    #[test]
    fn test_extract_article_number() {
        assert_eq!(extract_article_number("Frames_100234", true), Some("100234".to_string()));
        assert_eq!(extract_article_number("Sun_Glasses_000777", true), Some("777".to_string()));
        assert_eq!(extract_article_number("Lenses_ART001", true), Some("ART001".to_string()));
        assert_eq!(extract_article_number("NoUnderscore", true), None);
        assert_eq!(extract_article_number("Frames_", true), None);
        assert_eq!(extract_article_number("", true), None);
    }

    #[test]
    fn test_prepare_master() {
        let table = RawTable::new(
            "master.xlsx",
            vec![
                RawRow::new(2, "Frames_1001".into(), "12,50".into()),
                RawRow::new(3, "Frames_1002".into(), CellValue::Empty),
                RawRow::new(4, "garbage".into(), "1,00".into()),
                RawRow::new(5, "Lenses_1001".into(), "99,00".into()),
                RawRow::new(6, "Lenses_1003".into(), "n/a".into()).with_secondary_price(CellValue::Number(7.0)),
            ],
        );

        let m = prepare_master(&table, &Cleaner::default(), "Product ID [sku]", "Store Purchase Price [attribute6]");

        assert_eq!(m.extraction_failures, 1);
        assert_eq!(m.cleaning.rows_read, 5);
        assert_eq!(m.cleaning.missing_prices, 1);
        assert_eq!(m.len(), 2, "1001 keeps its first entry, 1002 has no price");
        assert_eq!(m.records[0].article_number, "1001");
        assert_eq!(m.records[0].price, Some(12.5));
        assert_eq!(m.records[1].article_number, "1003");
        assert_eq!(m.records[1].price, Some(7.0));
        assert_eq!(m.duplicates.articles_with_duplicates, 1);
    }
}

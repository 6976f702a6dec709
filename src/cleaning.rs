// 🧹 Cleaner - article numbers and prices into canonical form
//
// Rows with no usable article number are dropped.
// Rows with a bad price are kept with `price = None`.
// Every problem becomes a RowIssue so the report can show it.

use crate::config::DecimalMark;
use crate::model::{ArticleRecord, CellValue, RawTable, Source};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Per-kind warnings logged before dropping to debug level
const WARN_LIMIT: usize = 10;

const CURRENCY_SYMBOLS: [char; 4] = ['€', '$', '£', '¥'];

// ============================================================================
// ROW ISSUES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IssueKind {
    /// Identifier cell empty - row dropped
    MissingArticle,
    /// Identifier empty after normalization - row dropped
    InvalidArticle,
    /// Price cell empty - row kept, price missing
    MissingPrice,
    /// Price could not be parsed - row kept, price missing
    InvalidPrice,
    /// Composite master identifier had no article suffix - row dropped
    UnextractableSku,
}

impl IssueKind {
    pub fn name(&self) -> &str {
        match self {
            IssueKind::MissingArticle => "Missing article number",
            IssueKind::InvalidArticle => "Invalid article number",
            IssueKind::MissingPrice => "Missing price",
            IssueKind::InvalidPrice => "Unparseable price",
            IssueKind::UnextractableSku => "Article number not extractable from SKU",
        }
    }

    pub fn drops_row(&self) -> bool {
        !matches!(self, IssueKind::MissingPrice | IssueKind::InvalidPrice)
    }
}

/// A recovered row-level problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowIssue {
    pub table: String,
    pub row_number: usize,
    pub column: String,
    pub value: String,
    pub kind: IssueKind,
}

// ============================================================================
// CLEANING REPORT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub table: String,
    pub rows_read: usize,
    pub rows_kept: usize,
    pub dropped_rows: usize,
    pub missing_prices: usize,
    pub invalid_prices: usize,
    pub issues: Vec<RowIssue>,
    /// Running count per kind, kept alongside `issues`
    pub issue_counts: BTreeMap<IssueKind, usize>,
}

impl CleaningReport {
    pub fn new(table: &str) -> Self {
        CleaningReport {
            table: table.to_string(),
            ..Default::default()
        }
    }

    pub fn count_of(&self, kind: IssueKind) -> usize {
        self.issue_counts.get(&kind).copied().unwrap_or(0)
    }

    /// Rows kept without a usable price
    pub fn unpriced(&self) -> usize {
        self.missing_prices + self.invalid_prices
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} rows read, {} kept, {} dropped, {} without price",
            self.table,
            self.rows_read,
            self.rows_kept,
            self.dropped_rows,
            self.unpriced()
        )
    }

    pub(crate) fn record(&mut self, issue: RowIssue) {
        match issue.kind {
            IssueKind::MissingPrice => self.missing_prices += 1,
            IssueKind::InvalidPrice => self.invalid_prices += 1,
            _ => self.dropped_rows += 1,
        }

        let seen = self.issue_counts.entry(issue.kind).or_insert(0);
        *seen += 1;
        if *seen <= WARN_LIMIT {
            warn!(
                "{} row {}: {} ({} = '{}')",
                issue.table,
                issue.row_number,
                issue.kind.name(),
                issue.column,
                issue.value
            );
        } else {
            debug!(
                "{} row {}: {} ({} = '{}')",
                issue.table,
                issue.row_number,
                issue.kind.name(),
                issue.column,
                issue.value
            );
        }

        self.issues.push(issue);
    }
}

/// Cleaned records of one table, duplicates still present
#[derive(Debug, Clone)]
pub struct CleanedTable {
    pub records: Vec<ArticleRecord>,
    pub report: CleaningReport,
}

// ============================================================================
// CLEANER
// ============================================================================

pub struct Cleaner {
    pub decimal_mark: DecimalMark,
    pub strip_leading_zeros: bool,
}

impl Cleaner {
    pub fn new(decimal_mark: DecimalMark, strip_leading_zeros: bool) -> Self {
        Cleaner {
            decimal_mark,
            strip_leading_zeros,
        }
    }

    /// Clean every row of a raw table, tagging records with `source`
    pub fn clean_table(
        &self,
        table: &RawTable,
        source: Source,
        id_column: &str,
        price_column: &str,
    ) -> CleanedTable {
        let mut report = CleaningReport::new(&table.name);
        report.rows_read = table.len();
        let mut records = Vec::with_capacity(table.len());

        for row in &table.rows {
            let article_number = match self.normalize_article_number(&row.article) {
                Some(a) => a,
                None => {
                    let kind = if row.article.is_empty() {
                        IssueKind::MissingArticle
                    } else {
                        IssueKind::InvalidArticle
                    };
                    report.record(RowIssue {
                        table: table.name.clone(),
                        row_number: row.row_number,
                        column: id_column.to_string(),
                        value: row.article.as_text(),
                        kind,
                    });
                    continue;
                }
            };

            let price = match self.parse_price_cell(&row.price) {
                Ok(p) => Some(p),
                Err(kind) => {
                    report.record(RowIssue {
                        table: table.name.clone(),
                        row_number: row.row_number,
                        column: price_column.to_string(),
                        value: row.price.as_text(),
                        kind,
                    });
                    None
                }
            };

            records.push(ArticleRecord::new(article_number, price, source));
        }

        report.rows_kept = records.len();
        info!("{} after cleaning: {}", table.name, report.summary());

        CleanedTable { records, report }
    }

    /// Canonical article number, or None when nothing usable is left.
    ///
    /// Fractional numeric cells are rejected: stripping the '.' would turn
    /// 12.5 into article "125".
    pub fn normalize_article_number(&self, cell: &CellValue) -> Option<String> {
        match cell {
            CellValue::Number(n) if n.fract() != 0.0 || !n.is_finite() => None,
            _ => normalize_article_text(&cell.as_text(), self.strip_leading_zeros),
        }
    }

    /// Parse a price cell; numeric cells skip string parsing
    pub fn parse_price_cell(&self, cell: &CellValue) -> Result<f64, IssueKind> {
        match cell {
            CellValue::Empty => Err(IssueKind::MissingPrice),
            CellValue::Number(n) => validate_price(*n).ok_or(IssueKind::InvalidPrice),
            CellValue::Text(s) if s.trim().is_empty() => Err(IssueKind::MissingPrice),
            CellValue::Text(s) => parse_price(s, self.decimal_mark).ok_or(IssueKind::InvalidPrice),
        }
    }
}

impl Default for Cleaner {
    fn default() -> Self {
        Cleaner::new(DecimalMark::Comma, true)
    }
}

// ============================================================================
// ARTICLE NUMBERS
// ============================================================================

/// Trim, keep only alphanumerics, '-' and '_', optionally drop leading zeros.
///
/// "000" becomes "0", never the empty string.
pub fn normalize_article_text(raw: &str, strip_leading_zeros: bool) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    if strip_leading_zeros {
        let stripped = cleaned.trim_start_matches('0');
        if stripped.is_empty() {
            return Some("0".to_string());
        }
        return Some(stripped.to_string());
    }

    Some(cleaned)
}

// ============================================================================
// PRICES
// ============================================================================

fn validate_price(value: f64) -> Option<f64> {
    if value.is_finite() && value >= 0.0 {
        Some(value)
    } else {
        None
    }
}

/// True when `s` is digits split into thousands groups by `sep`: "1.234.567"
fn is_grouped_integer(s: &str, sep: char) -> bool {
    let mut groups = s.split(sep);
    let first = match groups.next() {
        Some(g) => g,
        None => return false,
    };

    if first.is_empty() || first.len() > 3 || !first.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    let mut count = 0;
    for group in groups {
        if group.len() != 3 || !group.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
        count += 1;
    }

    count > 0
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// Integer part: plain digits or correctly grouped digits
fn parse_integer_part(s: &str, grouping: char) -> Option<String> {
    if s.is_empty() {
        return Some("0".to_string());
    }
    if is_digits(s) {
        return Some(s.to_string());
    }
    if is_grouped_integer(s, grouping) {
        return Some(s.replace(grouping, ""));
    }
    None
}

/// Parse a price string under an explicit decimal mark.
///
/// With `d` the decimal mark and `g` the other separator:
/// - more than one `d` is invalid
/// - with `d`: digits after it, digits or three-digit `g` groups before it
/// - without `d`: valid `g` grouping is an integer, a single `g` otherwise
///   acts as the decimal mark ("19.00" under `Comma` is 19.00)
///
/// Currency symbols and whitespace are ignored. Negative values are invalid.
pub fn parse_price(raw: &str, mark: DecimalMark) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !CURRENCY_SYMBOLS.contains(c))
        .collect();

    if cleaned.is_empty() || cleaned.starts_with('-') {
        return None;
    }
    let body = cleaned.strip_prefix('+').unwrap_or(&cleaned);

    let d = mark.decimal_char();
    let g = mark.grouping_char();

    let canonical = match body.matches(d).count() {
        0 => {
            let separators = body.matches(g).count();
            if separators == 0 {
                if !is_digits(body) {
                    return None;
                }
                body.to_string()
            } else if is_grouped_integer(body, g) {
                body.replace(g, "")
            } else if separators == 1 {
                let (int_part, frac_part) = body.split_once(g)?;
                if !is_digits(frac_part) {
                    return None;
                }
                let int_part = if int_part.is_empty() { "0" } else { int_part };
                if !is_digits(int_part) {
                    return None;
                }
                format!("{}.{}", int_part, frac_part)
            } else {
                return None;
            }
        }
        1 => {
            let (int_part, frac_part) = body.split_once(d)?;
            if !is_digits(frac_part) {
                return None;
            }
            let int_part = parse_integer_part(int_part, g)?;
            format!("{}.{}", int_part, frac_part)
        }
        _ => return None,
    };

    canonical.parse::<f64>().ok().and_then(validate_price)
}

// ============================================================================
// TESTS
// ============================================================================

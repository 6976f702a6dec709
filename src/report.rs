// 📝 Reporter - CSV outputs and Markdown summaries
//
// Every output is attempted. Failures are collected and returned together so
// one unwritable file never hides the others.

use crate::analysis::PriceDifference;
use crate::cleaning::{CleaningReport, IssueKind};
use crate::comparison::{ComparisonRow, ComparisonStatus};
use crate::config::AppConfig;
use crate::deduplication::DuplicateReport;
use crate::error::{ReconcileError, Result};
use crate::merge::MergedTable;
use crate::model::{ArticleRecord, Source};
use crate::pipeline::{AnalysisOutcome, ComparisonOutcome, InputInfo};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Missing article numbers listed in the comparison report
const MISSING_LISTED: usize = 20;
/// Duplicate groups listed per source in the analysis report
const DUPLICATES_LISTED: usize = 5;

// ============================================================================
// CSV SCHEMAS
// ============================================================================

const MERGED_COLUMNS: [&str; 3] = ["article_number", "price", "source"];

const COMPARISON_COLUMNS: [&str; 6] = [
    "article_number",
    "price_consolidated",
    "price_master",
    "difference",
    "pct_difference",
    "status",
];

/// Header is written up front so an empty table still yields the column row
fn headed_writer<W: Write>(out: W, columns: &[&str]) -> Result<csv::Writer<W>> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(out);
    writer.write_record(columns)?;
    Ok(writer)
}

/// article_number,price,source
#[derive(Debug, Serialize, Deserialize)]
struct MergedCsvRow {
    article_number: String,
    price: Option<f64>,
    source: Source,
}

/// article_number,price_consolidated,price_master,difference,pct_difference,status
#[derive(Debug, Serialize)]
struct ComparisonCsvRow<'a> {
    article_number: &'a str,
    price_consolidated: Option<f64>,
    price_master: Option<f64>,
    difference: Option<f64>,
    pct_difference: Option<f64>,
    status: ComparisonStatus,
}

pub fn write_merged_csv<W: Write>(out: W, merged: &MergedTable) -> Result<()> {
    let mut writer = headed_writer(out, &MERGED_COLUMNS)?;
    for record in &merged.records {
        writer.serialize(MergedCsvRow {
            article_number: record.article_number.clone(),
            price: record.price,
            source: record.source,
        })?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Reload a merged CSV written by `write_merged_csv`
pub fn read_merged_csv(path: &Path) -> Result<MergedTable> {
    let file = File::open(path).map_err(|e| ReconcileError::file_access(path, e))?;
    let mut reader = csv::Reader::from_reader(file);

    let mut records = Vec::new();
    for result in reader.deserialize() {
        let row: MergedCsvRow = result?;
        records.push(ArticleRecord::new(row.article_number, row.price, row.source));
    }

    Ok(MergedTable::new(records))
}

pub fn write_comparison_csv<'a, W: Write>(
    out: W,
    rows: impl Iterator<Item = &'a ComparisonRow>,
) -> Result<()> {
    let mut writer = headed_writer(out, &COMPARISON_COLUMNS)?;
    for row in rows {
        writer.serialize(ComparisonCsvRow {
            article_number: &row.article_number,
            price_consolidated: row.price_consolidated,
            price_master: row.price_master,
            difference: row.difference,
            pct_difference: row.pct_difference,
            status: row.status,
        })?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

// ============================================================================
// REPORT WRITER
// ============================================================================

#[derive(Debug, Default)]
pub struct WriteOutcome {
    pub written: Vec<PathBuf>,
    pub failures: Vec<ReconcileError>,
}

impl WriteOutcome {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn merge(&mut self, other: WriteOutcome) {
        self.written.extend(other.written);
        self.failures.extend(other.failures);
    }
}

/// Writes outputs into one directory, collecting failures instead of stopping
pub struct ReportWriter {
    output_dir: PathBuf,
    outcome: WriteOutcome,
}

impl ReportWriter {
    pub fn new(output_dir: &Path) -> Self {
        ReportWriter {
            output_dir: output_dir.to_path_buf(),
            outcome: WriteOutcome::default(),
        }
    }

    fn attempt(&mut self, name: &str, write: impl FnOnce(File) -> Result<()>) {
        let path = self.output_dir.join(name);

        let result = path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| File::create(&path))
            .map_err(|e| ReconcileError::output_write(&path, e))
            .and_then(|file| {
                write(file).map_err(|e| match e {
                    ReconcileError::OutputWrite { .. } => e,
                    other => ReconcileError::output_write(&path, other),
                })
            });

        match result {
            Ok(()) => {
                info!("Results saved to {}", path.display());
                self.outcome.written.push(path);
            }
            Err(e) => {
                error!("{}", e);
                self.outcome.failures.push(e);
            }
        }
    }

    pub fn write_merged(&mut self, name: &str, merged: &MergedTable) {
        self.attempt(name, |file| write_merged_csv(file, merged));
    }

    pub fn write_comparison<'a>(&mut self, name: &str, rows: impl Iterator<Item = &'a ComparisonRow>) {
        self.attempt(name, |file| write_comparison_csv(file, rows));
    }

    pub fn write_text(&mut self, name: &str, text: &str) {
        let path = self.output_dir.join(name);
        self.attempt(name, |mut file| {
            file.write_all(text.as_bytes())
                .map_err(|e| ReconcileError::output_write(&path, e))
        });
    }

    pub fn finish(self) -> WriteOutcome {
        self.outcome
    }
}

// ============================================================================
// MARKDOWN
// ============================================================================

struct Markdown {
    buf: String,
}

impl Markdown {
    fn new() -> Self {
        Markdown { buf: String::new() }
    }

    fn line(&mut self, text: impl AsRef<str>) {
        self.buf.push_str(text.as_ref());
        self.buf.push('\n');
    }

    fn blank(&mut self) {
        self.buf.push('\n');
    }

    fn heading(&mut self, level: usize, text: &str) {
        self.blank();
        self.line(format!("{} {}", "#".repeat(level), text));
        self.blank();
    }

    fn finish(self) -> String {
        self.buf
    }
}

fn euro(value: f64) -> String {
    format!("€{:.2}", value)
}

fn euro_opt(value: Option<f64>) -> String {
    value.map(euro).unwrap_or_else(|| "n/a".to_string())
}

fn signed_euro(value: f64) -> String {
    if value >= 0.0 {
        format!("+€{:.2}", value)
    } else {
        format!("-€{:.2}", value.abs())
    }
}

fn pct_opt(value: Option<f64>) -> String {
    value
        .map(|p| format!("{:+.1}%", p))
        .unwrap_or_else(|| "n/a".to_string())
}

fn provenance(md: &mut Markdown, label: &str, input: &Option<InputInfo>) {
    match input {
        Some(info) => md.line(format!(
            "- {}: `{}` (sha256 `{}`)",
            label,
            info.path.display(),
            info.sha256.as_deref().unwrap_or("unavailable")
        )),
        None => md.line(format!("- {}: in-memory", label)),
    }
}

fn change_list(md: &mut Markdown, title: &str, changes: &[PriceDifference], before: &str, after: &str) {
    md.heading(3, title);
    if changes.is_empty() {
        md.line("- none");
        return;
    }
    md.line(format!("| Article | {} | {} | Difference | Change |", before, after));
    md.line("|---|---:|---:|---:|---:|");
    for d in changes {
        md.line(format!(
            "| {} | {} | {} | {} | {} |",
            d.article_number,
            euro(d.price_b),
            euro(d.price_a),
            signed_euro(d.difference),
            pct_opt(d.pct_difference)
        ));
    }
}

fn duplicate_section(md: &mut Markdown, report: &DuplicateReport) {
    md.heading(3, &format!("{} duplicates", report.table));
    md.line(format!("- Articles with duplicates: {}", report.articles_with_duplicates));
    md.line(format!("- Duplicate rows removed: {}", report.rows_removed));
    md.line(format!(
        "- Duplicates with price differences: {}",
        report.articles_with_price_differences
    ));

    let conflicts: Vec<_> = report.price_conflicts().take(DUPLICATES_LISTED).collect();
    if !conflicts.is_empty() {
        md.line("- Articles with price differences (lowest price kept):");
        for group in conflicts {
            let prices: Vec<String> = group.prices.iter().map(|p| euro(*p)).collect();
            md.line(format!(
                "  - {}: prices [{}] → kept {} (mean {}, std {})",
                group.article_number,
                prices.join(", "),
                euro_opt(group.kept_price),
                euro_opt(group.mean),
                euro_opt(group.std_dev)
            ));
        }
    }
}

fn issue_section(md: &mut Markdown, reports: &[&CleaningReport]) {
    md.heading(2, "Data quality");
    md.line("| Table | Rows read | Kept | Dropped | Missing price | Unparseable price |");
    md.line("|---|---:|---:|---:|---:|---:|");
    for r in reports {
        md.line(format!(
            "| {} | {} | {} | {} | {} | {} |",
            r.table, r.rows_read, r.rows_kept, r.dropped_rows, r.missing_prices, r.invalid_prices
        ));
    }

    let mut by_kind: BTreeMap<IssueKind, usize> = BTreeMap::new();
    for r in reports {
        for (kind, count) in &r.issue_counts {
            *by_kind.entry(*kind).or_default() += count;
        }
    }

    if by_kind.is_empty() {
        md.blank();
        md.line("No row-level issues.");
        return;
    }

    md.heading(3, "Recovered row issues");
    for (kind, count) in &by_kind {
        let effect = if kind.drops_row() { "row dropped" } else { "row kept without price" };
        md.line(format!("- {}: {} ({})", kind.name(), count, effect));
    }

    md.blank();
    md.line("| Table | Row | Column | Value | Issue |");
    md.line("|---|---:|---|---|---|");
    for r in reports {
        for issue in &r.issues {
            md.line(format!(
                "| {} | {} | {} | `{}` | {} |",
                issue.table,
                issue.row_number,
                issue.column,
                issue.value.replace('|', "\\|"),
                issue.kind.name()
            ));
        }
    }
}

/// Markdown summary of the analyze phase
pub fn render_analysis(outcome: &AnalysisOutcome, config: &AppConfig) -> String {
    let mut md = Markdown::new();
    let a = &outcome.source_a;
    let b = &outcome.source_b;

    md.line("# Purchase price analysis report");
    md.blank();
    md.line(format!("Generated at {}", outcome.generated_at.to_rfc3339()));
    md.blank();
    provenance(&mut md, "Workbook", &outcome.input);
    md.line(format!("- Decimal mark: {:?}, epsilon: {}", config.decimal_mark, config.epsilon));

    md.heading(2, "Data overview");
    md.line(format!("- {} articles: {}", a.label, a.records.len()));
    md.line(format!("- {} articles: {}", b.label, b.records.len()));
    md.line(format!("- Common articles: {}", outcome.analysis.overlap.common));
    md.line(format!(
        "- Overlap relative to {}: {:.2}%",
        a.label, outcome.analysis.overlap.pct_of_left
    ));
    md.line(format!(
        "- Overlap relative to {}: {:.2}%",
        b.label, outcome.analysis.overlap.pct_of_right
    ));
    md.line(format!("- Final merged articles: {}", outcome.merged.len()));
    md.line(format!("  - {}: {}", Source::SourceA.name(), outcome.merge_summary.from_a_only));
    md.line(format!("  - {}: {}", Source::SourceB.name(), outcome.merge_summary.from_b_only));
    md.line(format!("  - {}: {}", Source::Both.name(), outcome.merge_summary.in_both));
    if outcome.merge_summary.a_price_missing_b_present > 0 {
        md.line(format!(
            "- Common articles kept without price although {} has one: {}",
            b.label, outcome.merge_summary.a_price_missing_b_present
        ));
    }

    let analysis = &outcome.analysis;
    let stats = &analysis.stats;
    md.heading(2, "Price analysis");
    if stats.count == 0 {
        md.line("No common priced articles to compare.");
    } else {
        md.line(format!("- Articles compared: {}", stats.count));
        md.line(format!(
            "- Articles with price differences: {} ({:.1}%)",
            stats.discrepant,
            stats.discrepant_pct()
        ));
        md.line(format!("- Average price difference: {}", euro(stats.mean)));
        md.line(format!("- Median price difference: {}", euro(stats.median)));
        md.line(format!("- Standard deviation: {}", euro(stats.std_dev)));
        md.line(format!("- Average price change: {}", pct_opt(stats.mean_pct)));
        md.line(format!("- Max price increase: {}", euro(stats.max)));
        md.line(format!("- Max price decrease: {}", euro(stats.min)));
        if stats.pct_excluded > 0 {
            md.line(format!(
                "- Excluded from percentage statistics (zero reference price): {}",
                stats.pct_excluded
            ));
        }
    }
    if analysis.unpriced > 0 {
        md.line(format!("- Common articles without a price on one side: {}", analysis.unpriced));
    }

    change_list(
        &mut md,
        &format!("Top {} price increases", config.top_n),
        &analysis.top_increases,
        &b.label,
        &a.label,
    );
    change_list(
        &mut md,
        &format!("Top {} price decreases", config.top_n),
        &analysis.top_decreases,
        &b.label,
        &a.label,
    );

    md.heading(2, "Duplicate analysis");
    duplicate_section(&mut md, &a.duplicates);
    duplicate_section(&mut md, &b.duplicates);

    issue_section(&mut md, &[&a.cleaning, &b.cleaning]);
    md.line(format!("- Missing prices in {} after deduplication: {}", a.label, a.unpriced()));
    md.line(format!("- Missing prices in {} after deduplication: {}", b.label, b.unpriced()));

    md.finish()
}

/// Markdown summary of the compare phase
pub fn render_comparison(outcome: &ComparisonOutcome, config: &AppConfig) -> String {
    let mut md = Markdown::new();
    let report = &outcome.report;

    md.line("# Master data comparison report");
    md.blank();
    md.line(format!("Generated at {}", outcome.generated_at.to_rfc3339()));
    md.blank();
    provenance(&mut md, "Consolidated prices", &outcome.consolidated);
    provenance(&mut md, "Master data", &outcome.master_input);
    md.line(format!("- Epsilon: {}", report.epsilon));

    md.heading(2, "Data overview");
    md.line(format!("- Consolidated articles: {}", report.consolidated_total));
    md.line(format!("- Master data articles: {}", report.master_total));
    md.line(format!("- Common articles: {}", report.common));
    md.line(format!("- Coverage: {:.1}%", report.coverage));
    md.line(format!("- Extra articles only in master data: {}", report.extra_in_master));
    md.line(format!(
        "- Master identifiers without extractable article number: {}",
        outcome.master.extraction_failures
    ));

    md.heading(2, "Missing articles in master data");
    md.line(format!("- Count: {}", report.missing.len()));
    md.line(format!("- Percentage: {:.1}%", report.missing_pct()));
    if !report.missing.is_empty() {
        let shown = report.missing.len().min(MISSING_LISTED);
        md.line(format!("- First {} missing article numbers:", shown));
        for row in report.missing.iter().take(MISSING_LISTED) {
            md.line(format!("  - {}", row.article_number));
        }
        if report.missing.len() > MISSING_LISTED {
            md.line(format!("  - ... and {} more", report.missing.len() - MISSING_LISTED));
        }
    }

    let stats = &report.stats;
    md.heading(2, "Price analysis");
    md.line(format!("- Matched: {}", report.matched_count()));
    md.line(format!("- Discrepant: {}", report.discrepancies().count()));
    if stats.count > 0 {
        md.line(format!("- Articles compared: {}", stats.count));
        md.line(format!(
            "- Articles with discrepancies: {} ({:.1}%)",
            stats.discrepant,
            stats.discrepant_pct()
        ));
        md.line(format!("- Average price difference: {}", euro(stats.mean)));
        md.line(format!("- Median price difference: {}", euro(stats.median)));
        md.line(format!("- Standard deviation: {}", euro(stats.std_dev)));
        md.line(format!("- Max price increase: {}", euro(stats.max)));
        md.line(format!("- Max price decrease: {}", euro(stats.min)));
    }
    let unpriced = report.rows.iter().filter(|r| r.difference.is_none()).count();
    if unpriced > 0 {
        md.line(format!("- Discrepant because the consolidated price is missing: {}", unpriced));
    }

    change_list(
        &mut md,
        &format!("Top {} price increases", config.comparison_top_n),
        &report.top_increases,
        "Master",
        "Consolidated",
    );
    change_list(
        &mut md,
        &format!("Top {} price decreases", config.comparison_top_n),
        &report.top_decreases,
        "Master",
        "Consolidated",
    );

    md.heading(2, "Master data cleaning");
    duplicate_section(&mut md, &outcome.master.duplicates);
    issue_section(&mut md, &[&outcome.master.cleaning]);

    md.finish()
}

// ============================================================================
// TESTS
// ============================================================================

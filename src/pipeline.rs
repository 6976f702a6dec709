// 🚚 Pipeline - load → clean → deduplicate → merge → analyze → compare → report
//
// Two phases:
//   analyze: workbook (two sheets) → merged table + analysis
//   compare: merged table + master list → comparison

use crate::analysis::{Analyzer, PriceAnalysis};
use crate::cleaning::{Cleaner, CleaningReport};
use crate::comparison::{prepare_master, ComparisonEngine, ComparisonReport, MasterTable};
use crate::config::AppConfig;
use crate::deduplication::{DedupPolicy, DeduplicationEngine, DuplicateReport};
use crate::error::Result;
use crate::loader::{fingerprint_file, load_master, load_sources};
use crate::merge::{merge_sources, MergeSummary, MergedTable};
use crate::model::{ArticleRecord, RawTable, Source};
use crate::report::{self, ReportWriter, WriteOutcome};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{info, info_span, warn};

// ============================================================================
// OUTCOMES
// ============================================================================

/// Where an input came from, for the report's provenance section
#[derive(Debug, Clone, PartialEq)]
pub struct InputInfo {
    pub path: PathBuf,
    pub sha256: Option<String>,
}

impl InputInfo {
    fn from_path(path: &Path) -> Self {
        let sha256 = match fingerprint_file(path) {
            Ok(fp) => Some(fp),
            Err(e) => {
                warn!("Could not fingerprint {}: {}", path.display(), e);
                None
            }
        };
        InputInfo {
            path: path.to_path_buf(),
            sha256,
        }
    }
}

/// One source after cleaning and deduplication
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub label: String,
    pub records: Vec<ArticleRecord>,
    pub cleaning: CleaningReport,
    pub duplicates: DuplicateReport,
}

impl SourceOutcome {
    pub fn unpriced(&self) -> usize {
        self.records.iter().filter(|r| !r.has_price()).count()
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub input: Option<InputInfo>,
    pub source_a: SourceOutcome,
    pub source_b: SourceOutcome,
    pub merged: MergedTable,
    pub merge_summary: MergeSummary,
    pub analysis: PriceAnalysis,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ComparisonOutcome {
    pub consolidated: Option<InputInfo>,
    pub master_input: Option<InputInfo>,
    pub master: MasterTable,
    pub report: ComparisonReport,
    pub generated_at: DateTime<Utc>,
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct Pipeline {
    pub config: AppConfig,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Pipeline { config }
    }

    fn cleaner(&self) -> Cleaner {
        Cleaner::new(self.config.decimal_mark, self.config.strip_leading_zeros)
    }

    fn prepare_source(&self, table: &RawTable, source: Source, id_column: &str, price_column: &str) -> SourceOutcome {
        let cleaned = self.cleaner().clean_table(table, source, id_column, price_column);
        let dedup = DeduplicationEngine::new(DedupPolicy::KeepLowest).deduplicate(&table.name, cleaned.records);

        SourceOutcome {
            label: table.name.clone(),
            records: dedup.records,
            cleaning: cleaned.report,
            duplicates: dedup.report,
        }
    }

    /// Phase 1 over already-loaded sheets
    pub fn analyze_tables(&self, source_a: &RawTable, source_b: &RawTable) -> AnalysisOutcome {
        let a_spec = &self.config.source_a;
        let b_spec = &self.config.source_b;

        info!("Cleaning and standardizing data...");
        let a = self.prepare_source(source_a, Source::SourceA, &a_spec.id_column, &a_spec.price_column);
        let b = self.prepare_source(source_b, Source::SourceB, &b_spec.id_column, &b_spec.price_column);

        info!("Analyzing common articles...");
        let analysis = Analyzer::new(self.config.epsilon, self.config.top_n).analyze(&a.records, &b.records);

        info!("Merging data...");
        let (merged, merge_summary) = merge_sources(&a.records, &b.records);
        if merge_summary.a_price_missing_b_present > 0 {
            warn!(
                "{} common articles have no recent price although the article database has one",
                merge_summary.a_price_missing_b_present
            );
        }

        AnalysisOutcome {
            input: None,
            source_a: a,
            source_b: b,
            merged,
            merge_summary,
            analysis,
            generated_at: Utc::now(),
        }
    }

    /// Phase 1 from a workbook on disk
    pub fn analyze_workbook(&self, path: &Path) -> Result<AnalysisOutcome> {
        let span = info_span!("analyze", input = %path.display());
        let _enter = span.enter();

        let (a, b) = load_sources(path, &self.config.source_a, &self.config.source_b)?;
        let mut outcome = self.analyze_tables(&a, &b);
        outcome.input = Some(InputInfo::from_path(path));
        Ok(outcome)
    }

    /// Phase 2 over an in-memory merged table and raw master rows
    pub fn compare_tables(&self, consolidated: &MergedTable, master_raw: &RawTable) -> ComparisonOutcome {
        let spec = &self.config.master;

        info!("Cleaning master data...");
        let cleaner = Cleaner::new(self.config.master_decimal_mark(), self.config.strip_leading_zeros);
        let master = prepare_master(master_raw, &cleaner, &spec.id_column, &spec.price_column);

        info!("Comparing articles between datasets...");
        let engine = ComparisonEngine::with_thresholds(self.config.epsilon, self.config.comparison_top_n);
        let report = engine.compare(consolidated, &master.records);

        ComparisonOutcome {
            consolidated: None,
            master_input: None,
            master,
            report,
            generated_at: Utc::now(),
        }
    }

    /// Phase 2 with the merged table already in memory (the `run` command)
    pub fn compare_with_master(&self, consolidated: &MergedTable, master_path: &Path) -> Result<ComparisonOutcome> {
        let span = info_span!("compare", master = %master_path.display());
        let _enter = span.enter();

        let raw = load_master(master_path, &self.config.master)?;
        let mut outcome = self.compare_tables(consolidated, &raw);
        outcome.master_input = Some(InputInfo::from_path(master_path));
        Ok(outcome)
    }

    /// Phase 2 from a consolidated CSV written by an earlier `analyze` run
    pub fn compare_files(&self, consolidated_csv: &Path, master_path: &Path) -> Result<ComparisonOutcome> {
        info!("Loading consolidated purchase price data...");
        let consolidated = report::read_merged_csv(consolidated_csv)?;
        info!("Loaded consolidated data: {} articles", consolidated.len());

        let mut outcome = self.compare_with_master(&consolidated, master_path)?;
        outcome.consolidated = Some(InputInfo::from_path(consolidated_csv));
        Ok(outcome)
    }

    /// Merged CSV and analysis report. Never stops at the first failed output.
    pub fn write_analysis(&self, outcome: &AnalysisOutcome, output_dir: &Path) -> WriteOutcome {
        let names = &self.config.outputs;
        let mut writer = ReportWriter::new(output_dir);

        writer.write_merged(&names.merged_csv, &outcome.merged);
        writer.write_text(&names.analysis_report, &report::render_analysis(outcome, &self.config));

        writer.finish()
    }

    /// Comparison CSVs and comparison report
    pub fn write_comparison(&self, outcome: &ComparisonOutcome, output_dir: &Path) -> WriteOutcome {
        let names = &self.config.outputs;
        let mut writer = ReportWriter::new(output_dir);

        writer.write_comparison(&names.comparison_csv, outcome.report.all_rows().iter());
        writer.write_comparison(&names.discrepancies_csv, outcome.report.discrepancies());
        writer.write_comparison(&names.missing_csv, outcome.report.missing.iter());
        writer.write_text(&names.comparison_report, &report::render_comparison(outcome, &self.config));

        writer.finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparison::ComparisonStatus;
    use crate::model::{CellValue, RawRow};

    fn table(name: &str, rows: &[(&str, &str)]) -> RawTable {
        RawTable::new(
            name,
            rows.iter()
                .enumerate()
                .map(|(i, (a, p))| RawRow::new(i + 2, CellValue::from(*a), CellValue::from(*p)))
                .collect(),
        )
    }

    fn sample_sources() -> (RawTable, RawTable) {
        let a = table(
            "Tabelle1",
            &[
                ("ART001", "15.50€"),
                ("ART002", "25,75"),
                ("ART003", "35.00"),
                ("ART004", "45.25"),
                ("ART005", "invalid"),
                ("ART001", "15,00"),
            ],
        );
        let b = table(
            "Bestand Odoo",
            &[
                ("ART001", "14.50"),
                ("ART002", "24,75€"),
                ("ART006", "65.75"),
                ("ART007", "75.00"),
                ("ART008", ""),
            ],
        );
        (a, b)
    }

    #[test]
    fn test_analyze_tables_end_to_end() {
        let pipeline = Pipeline::new(AppConfig::default());
        let (a, b) = sample_sources();

        let outcome = pipeline.analyze_tables(&a, &b);

        assert_eq!(outcome.source_a.records.len(), 5);
        assert_eq!(outcome.source_a.duplicates.articles_with_duplicates, 1);
        assert_eq!(outcome.source_a.records[0].price, Some(15.0), "lowest duplicate price kept");
        assert_eq!(outcome.source_a.cleaning.invalid_prices, 1);
        assert_eq!(outcome.source_b.cleaning.missing_prices, 1);

        assert_eq!(outcome.merged.len(), 8);
        assert_eq!(outcome.merge_summary.in_both, 2);
        assert_eq!(outcome.merged.get("ART002").unwrap().price, Some(25.75));
        assert_eq!(outcome.merged.get("ART002").unwrap().source, Source::Both);
        assert_eq!(outcome.merged.get("ART008").unwrap().price, None);

        assert_eq!(outcome.analysis.overlap.common, 2);
        assert_eq!(outcome.analysis.stats.count, 2);
        assert!((outcome.analysis.stats.mean - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_compare_tables() {
        let pipeline = Pipeline::new(AppConfig::default());
        let (a, b) = sample_sources();
        let outcome = pipeline.analyze_tables(&a, &b);

        let master = table(
            "master",
            &[
                ("Frames_ART001", "15,00"),
                ("Frames_ART002", "20,00"),
                ("Frames_ART999", "1,00"),
                ("broken", "1,00"),
            ],
        );

        let comparison = pipeline.compare_tables(&outcome.merged, &master);

        assert_eq!(comparison.master.extraction_failures, 1);
        assert_eq!(comparison.report.common, 2);
        assert_eq!(comparison.report.missing.len(), 6);
        assert_eq!(comparison.report.extra_in_master, 1);
        let statuses: Vec<ComparisonStatus> = comparison.report.rows.iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![ComparisonStatus::Matched, ComparisonStatus::Discrepant]);
    }

    #[test]
    fn test_write_outputs_and_compare_from_csv() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(AppConfig::default());
        let (a, b) = sample_sources();
        let outcome = pipeline.analyze_tables(&a, &b);

        let written = pipeline.write_analysis(&outcome, dir.path());
        assert!(written.is_success(), "{:?}", written.failures);
        assert_eq!(written.written.len(), 2);

        let merged_csv = dir.path().join(&pipeline.config.outputs.merged_csv);
        let reloaded = report::read_merged_csv(&merged_csv).unwrap();
        assert_eq!(reloaded, outcome.merged);

        let master_csv = dir.path().join("master.csv");
        std::fs::write(
            &master_csv,
            "Product ID [sku],Store Purchase Price [attribute6]\nFrames_ART001,\"15,00\"\n",
        )
        .unwrap();

        let comparison = pipeline.compare_files(&merged_csv, &master_csv).unwrap();
        assert_eq!(comparison.report.common, 1);
        assert!(comparison.consolidated.unwrap().sha256.is_some());

        let written = pipeline.write_comparison(&pipeline.compare_tables(&outcome.merged, &RawTable::new("m", vec![])), dir.path());
        assert!(written.is_success());
        assert_eq!(written.written.len(), 4);
    }

    #[test]
    fn test_master_prices_use_their_own_decimal_mark() {
        let pipeline = Pipeline::new(AppConfig::default());
        let merged = MergedTable::new(vec![
            ArticleRecord::new("A1", Some(1234.56), Source::SourceA),
            ArticleRecord::new("A2", Some(12.5), Source::SourceA),
        ]);
        let master = table("master", &[("Frames_A1", "1,234.56"), ("Frames_A2", "12.500")]);

        let comparison = pipeline.compare_tables(&merged, &master);

        assert_eq!(comparison.master.cleaning.invalid_prices, 0);
        assert_eq!(comparison.master.records[0].price, Some(1234.56));
        assert_eq!(comparison.master.records[1].price, Some(12.5));
        assert_eq!(comparison.report.matched_count(), 2);

        let mut config = AppConfig::default();
        config.master.decimal_mark = None;
        let comparison = Pipeline::new(config).compare_tables(&merged, &master);
        assert_eq!(comparison.master.records.len(), 1);
        assert_eq!(comparison.master.records[0].price, Some(12500.0));
    }

    #[test]
    fn test_missing_workbook_is_fatal() {
        let pipeline = Pipeline::new(AppConfig::default());
        let result = pipeline.analyze_workbook(Path::new("nonexistent_file.xlsx"));
        assert!(matches!(result, Err(crate::error::ReconcileError::FileAccess { .. })));
    }
}

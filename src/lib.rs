// Price Reconciliation - Core Library
// Exposes the pipeline stages for the CLI and tests

pub mod error;
pub mod config;
pub mod logging;
pub mod model;
pub mod loader;         // Workbook / CSV ingestion
pub mod cleaning;       // Article number + price normalization
pub mod deduplication;  // One record per article
pub mod merge;          // SourceA priority, SourceB completeness
pub mod analysis;       // Overlap + price difference statistics
pub mod comparison;     // Consolidated prices vs master data
pub mod report;         // CSV + Markdown outputs
pub mod pipeline;       // Stage orchestration

// Re-export commonly used types
pub use error::{ReconcileError, Result};
pub use config::{AppConfig, DecimalMark, MasterSpec, OutputNames, SheetSpec};
pub use model::{ArticleRecord, CellValue, RawRow, RawTable, Source};
pub use loader::{
    TableReader, InputFormat, Columns, TableRequest,
    SpreadsheetReader, CsvTableReader,
    detect_format, get_reader, load_sources, load_master, fingerprint_file, resolve_sheet,
};
pub use cleaning::{
    Cleaner, CleanedTable, CleaningReport, IssueKind, RowIssue,
    normalize_article_text, parse_price,
};
pub use deduplication::{
    DeduplicationEngine, DedupPolicy, DedupResult, DuplicateGroup, DuplicateReport,
};
pub use merge::{merge_sources, MergeSummary, MergedTable};
pub use analysis::{
    Analyzer, DifferenceStats, Overlap, PriceAnalysis, PriceDifference,
    overlap, top_increases, top_decreases,
};
pub use comparison::{
    ComparisonEngine, ComparisonReport, ComparisonRow, ComparisonStatus, MasterTable,
    extract_article_number, prepare_master,
};
pub use report::{ReportWriter, WriteOutcome, read_merged_csv, render_analysis, render_comparison};
pub use pipeline::{AnalysisOutcome, ComparisonOutcome, InputInfo, Pipeline, SourceOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

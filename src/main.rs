use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use price_reconciliation::logging::{init_logging, DEFAULT_LOG_FILE};
use price_reconciliation::{AnalysisOutcome, AppConfig, ComparisonOutcome, DecimalMark, Pipeline, WriteOutcome};

#[derive(Parser)]
#[command(name = "price-reconciliation")]
#[command(about = "Cleans, merges and compares purchase price lists")]
#[command(version)]
struct Cli {
    /// JSON configuration file (sheet names, columns, thresholds)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Decimal mark of price text: comma or point
    #[arg(long, global = true, value_parser = parse_decimal_mark)]
    decimal_mark: Option<DecimalMark>,

    /// Decimal mark of master price text (defaults to point)
    #[arg(long, global = true, value_parser = parse_decimal_mark)]
    master_decimal_mark: Option<DecimalMark>,

    /// Price differences at or below this are treated as equal
    #[arg(long, global = true)]
    epsilon: Option<f64>,

    /// Length of the top increase/decrease lists in the analysis report
    #[arg(long, global = true)]
    top_n: Option<usize>,

    /// Length of the top lists in the master comparison report
    #[arg(long, global = true)]
    comparison_top_n: Option<usize>,

    /// Process log file
    #[arg(long, global = true, default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,

    /// Log to the console only
    #[arg(long, global = true)]
    no_log_file: bool,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean and merge both price sheets of a workbook
    Analyze {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Compare a consolidated price CSV against master data
    Compare {
        #[arg(long)]
        consolidated: PathBuf,
        #[arg(long)]
        master: PathBuf,
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Analyze, then compare the merged result against master data
    Run {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        master: PathBuf,
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = (!cli.no_log_file).then_some(cli.log_file.as_path());
    let _guard = init_logging(cli.verbose, log_file).context("Failed to initialise logging")?;

    let config = load_config(&cli)?;
    let pipeline = Pipeline::new(config);

    let writes = match &cli.command {
        Commands::Analyze { input, output_dir } => run_analyze(&pipeline, input, output_dir)?.1,
        Commands::Compare { consolidated, master, output_dir } => {
            run_compare(&pipeline, consolidated, master, output_dir)?
        }
        Commands::Run { input, master, output_dir } => {
            let (outcome, mut writes) = run_analyze(&pipeline, input, output_dir)?;

            println!("\n🔍 Comparing with master data...");
            let comparison = pipeline
                .compare_with_master(&outcome.merged, master)
                .with_context(|| format!("Failed to compare with {}", master.display()))?;
            print_comparison(&comparison);
            writes.merge(pipeline.write_comparison(&comparison, output_dir));
            writes
        }
    };

    finish(writes)
}

fn parse_decimal_mark(value: &str) -> std::result::Result<DecimalMark, String> {
    value.parse().map_err(|e: price_reconciliation::ReconcileError| e.to_string())
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => AppConfig::default(),
    };

    if let Some(mark) = cli.decimal_mark {
        config.decimal_mark = mark;
    }
    if let Some(mark) = cli.master_decimal_mark {
        config.master.decimal_mark = Some(mark);
    }
    if let Some(epsilon) = cli.epsilon {
        config.epsilon = epsilon;
    }
    if let Some(top_n) = cli.top_n {
        config.top_n = top_n;
    }
    if let Some(top_n) = cli.comparison_top_n {
        config.comparison_top_n = top_n;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn run_analyze(pipeline: &Pipeline, input: &Path, output_dir: &Path) -> Result<(AnalysisOutcome, WriteOutcome)> {
    println!("📊 Purchase price analysis");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("\n📂 Loading {}...", input.display());
    let outcome = pipeline
        .analyze_workbook(input)
        .with_context(|| format!("Failed to analyze {}", input.display()))?;

    print_analysis(&outcome);

    println!("\n💾 Writing outputs to {}...", output_dir.display());
    let writes = pipeline.write_analysis(&outcome, output_dir);
    Ok((outcome, writes))
}

fn run_compare(pipeline: &Pipeline, consolidated: &Path, master: &Path, output_dir: &Path) -> Result<WriteOutcome> {
    println!("🔍 Master data comparison");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let outcome = pipeline
        .compare_files(consolidated, master)
        .with_context(|| format!("Failed to compare {} with {}", consolidated.display(), master.display()))?;

    print_comparison(&outcome);

    println!("\n💾 Writing outputs to {}...", output_dir.display());
    Ok(pipeline.write_comparison(&outcome, output_dir))
}

fn print_analysis(outcome: &AnalysisOutcome) {
    println!("✓ {}", outcome.source_a.cleaning.summary());
    println!("✓ {}", outcome.source_b.cleaning.summary());
    println!("✓ {}", outcome.source_a.duplicates.summary());
    println!("✓ {}", outcome.source_b.duplicates.summary());

    let summary = &outcome.merge_summary;
    println!("\n🔗 Merged {} articles", summary.total);
    println!("   {} only in {}", summary.from_a_only, outcome.source_a.label);
    println!("   {} only in {}", summary.from_b_only, outcome.source_b.label);
    println!("   {} in both ({} price wins)", summary.in_both, outcome.source_a.label);

    let stats = &outcome.analysis.stats;
    if stats.count > 0 {
        println!(
            "\n💶 {} common priced articles, {} differ (mean difference €{:.2})",
            stats.count, stats.discrepant, stats.mean
        );
    }
}

fn print_comparison(outcome: &ComparisonOutcome) {
    println!("✓ {}", outcome.master.cleaning.summary());
    println!("✓ {}", outcome.report.summary());
}

fn finish(writes: WriteOutcome) -> Result<()> {
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for path in &writes.written {
        println!("✓ {}", path.display());
    }

    if !writes.is_success() {
        for failure in &writes.failures {
            error!("{}", failure);
            eprintln!("❌ {}", failure);
        }
        bail!("{} output(s) could not be written", writes.failures.len());
    }

    info!("Analysis complete");
    println!("✅ Done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "price-reconciliation",
            "--top-n",
            "3",
            "--comparison-top-n",
            "7",
            "--master-decimal-mark",
            "comma",
            "compare",
            "--consolidated",
            "final_purchase_price.csv",
            "--master",
            "master.xlsx",
        ]);

        let config = load_config(&cli).unwrap();
        assert_eq!(config.top_n, 3);
        assert_eq!(config.comparison_top_n, 7);
        assert_eq!(config.master_decimal_mark(), DecimalMark::Comma);
    }

    #[test]
    fn test_comparison_top_n_defaults_from_config() {
        let cli = Cli::parse_from(["price-reconciliation", "analyze", "--input", "prices.xlsx"]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.comparison_top_n, 10);
        assert_eq!(config.master_decimal_mark(), DecimalMark::Point);
    }
}

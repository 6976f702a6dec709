// 📊 Analyzer - overlap and price-difference statistics between two record sets
//
// difference     = price_a - price_b
// pct_difference = difference / price_b * 100   (undefined when price_b == 0)

use crate::model::ArticleRecord;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use tracing::{info, warn};

pub const DEFAULT_EPSILON: f64 = 0.001;

// ============================================================================
// OVERLAP
// ============================================================================

/// Key overlap of two record sets. The two percentages use different
/// denominators: `pct_of_left` is relative to the left side, `pct_of_right`
/// to the right side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overlap {
    pub left_total: usize,
    pub right_total: usize,
    pub common: usize,
    pub pct_of_left: f64,
    pub pct_of_right: f64,
    /// Sorted
    pub common_articles: Vec<String>,
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

pub fn overlap(left: &[ArticleRecord], right: &[ArticleRecord]) -> Overlap {
    let left_keys: BTreeSet<&str> = left.iter().map(|r| r.article_number.as_str()).collect();
    let right_keys: BTreeSet<&str> = right.iter().map(|r| r.article_number.as_str()).collect();

    let common_articles: Vec<String> = left_keys
        .intersection(&right_keys)
        .map(|k| k.to_string())
        .collect();

    let common = common_articles.len();
    Overlap {
        left_total: left_keys.len(),
        right_total: right_keys.len(),
        common,
        pct_of_left: percentage(common, left_keys.len()),
        pct_of_right: percentage(common, right_keys.len()),
        common_articles,
    }
}

// ============================================================================
// PRICE DIFFERENCES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceDifference {
    pub article_number: String,
    pub price_a: f64,
    pub price_b: f64,
    pub difference: f64,
    /// None when price_b is zero
    pub pct_difference: Option<f64>,
}

impl PriceDifference {
    pub fn new(article_number: impl Into<String>, price_a: f64, price_b: f64) -> Self {
        let difference = price_a - price_b;
        let pct_difference = if price_b == 0.0 {
            None
        } else {
            Some(difference / price_b * 100.0)
        };

        PriceDifference {
            article_number: article_number.into(),
            price_a,
            price_b,
            difference,
            pct_difference,
        }
    }

    pub fn is_discrepant(&self, epsilon: f64) -> bool {
        self.difference.abs() > epsilon
    }
}

// ============================================================================
// AGGREGATES
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DifferenceStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation (n - 1); 0 for fewer than two values
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Mean over defined percentages only
    pub mean_pct: Option<f64>,
    /// Differences left out of percentage statistics (price_b == 0)
    pub pct_excluded: usize,
    pub discrepant: usize,
}

impl DifferenceStats {
    pub fn from_differences(diffs: &[PriceDifference], epsilon: f64) -> Self {
        if diffs.is_empty() {
            return DifferenceStats::default();
        }

        let values: Vec<f64> = diffs.iter().map(|d| d.difference).collect();
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;

        let std_dev = if values.len() < 2 {
            0.0
        } else {
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        };

        let mut sorted = values.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        let pcts: Vec<f64> = diffs.iter().filter_map(|d| d.pct_difference).collect();
        let mean_pct = if pcts.is_empty() {
            None
        } else {
            Some(pcts.iter().sum::<f64>() / pcts.len() as f64)
        };

        DifferenceStats {
            count: diffs.len(),
            mean,
            median,
            std_dev,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean_pct,
            pct_excluded: diffs.len() - pcts.len(),
            discrepant: diffs.iter().filter(|d| d.is_discrepant(epsilon)).count(),
        }
    }

    pub fn discrepant_pct(&self) -> f64 {
        percentage(self.discrepant, self.count)
    }
}

/// Largest magnitude first, then article number ascending
fn by_magnitude(a: &PriceDifference, b: &PriceDifference) -> Ordering {
    b.difference
        .abs()
        .total_cmp(&a.difference.abs())
        .then_with(|| a.article_number.cmp(&b.article_number))
}

/// Top `n` price increases (difference > epsilon)
pub fn top_increases(diffs: &[PriceDifference], n: usize, epsilon: f64) -> Vec<PriceDifference> {
    let mut increases: Vec<PriceDifference> = diffs
        .iter()
        .filter(|d| d.difference > epsilon)
        .cloned()
        .collect();
    increases.sort_by(by_magnitude);
    increases.truncate(n);
    increases
}

/// Top `n` price decreases (difference < -epsilon), largest drop first
pub fn top_decreases(diffs: &[PriceDifference], n: usize, epsilon: f64) -> Vec<PriceDifference> {
    let mut decreases: Vec<PriceDifference> = diffs
        .iter()
        .filter(|d| d.difference < -epsilon)
        .cloned()
        .collect();
    decreases.sort_by(by_magnitude);
    decreases.truncate(n);
    decreases
}

// ============================================================================
// PRICE ANALYSIS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceAnalysis {
    pub overlap: Overlap,
    /// Ordered by article number
    pub differences: Vec<PriceDifference>,
    /// Common articles left out because one side has no price
    pub unpriced: usize,
    pub stats: DifferenceStats,
    pub top_increases: Vec<PriceDifference>,
    pub top_decreases: Vec<PriceDifference>,
}

pub struct Analyzer {
    /// |difference| above this is a discrepancy
    pub epsilon: f64,
    pub top_n: usize,
}

impl Analyzer {
    pub fn new(epsilon: f64, top_n: usize) -> Self {
        Analyzer { epsilon, top_n }
    }

    /// Compare the deduplicated left set (price_a) against the right set (price_b)
    pub fn analyze(&self, left: &[ArticleRecord], right: &[ArticleRecord]) -> PriceAnalysis {
        let overlap = overlap(left, right);
        info!("Common articles found: {}", overlap.common);
        info!("Overlap relative to left: {:.2}%", overlap.pct_of_left);
        info!("Overlap relative to right: {:.2}%", overlap.pct_of_right);

        let left_prices = first_prices(left);
        let right_prices = first_prices(right);

        let mut differences = Vec::with_capacity(overlap.common);
        let mut unpriced = 0;
        for article in &overlap.common_articles {
            let a = left_prices.get(article.as_str()).copied().flatten();
            let b = right_prices.get(article.as_str()).copied().flatten();
            match (a, b) {
                (Some(a), Some(b)) => differences.push(PriceDifference::new(article.clone(), a, b)),
                _ => unpriced += 1,
            }
        }

        if differences.is_empty() {
            warn!("No common priced articles found for price comparison");
        }
        if unpriced > 0 {
            warn!("{} common articles without a price on one side", unpriced);
        }

        let stats = DifferenceStats::from_differences(&differences, self.epsilon);
        if stats.count > 0 {
            info!("Price comparison completed for {} articles", stats.count);
            info!("Average price difference: {:.2}", stats.mean);
            info!("Median price difference: {:.2}", stats.median);
        }

        PriceAnalysis {
            top_increases: top_increases(&differences, self.top_n, self.epsilon),
            top_decreases: top_decreases(&differences, self.top_n, self.epsilon),
            overlap,
            differences,
            unpriced,
            stats,
        }
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Analyzer::new(DEFAULT_EPSILON, 5)
    }
}

/// Price per article, first record winning
fn first_prices(records: &[ArticleRecord]) -> HashMap<&str, Option<f64>> {
    let mut prices = HashMap::with_capacity(records.len());
    for r in records {
        prices.entry(r.article_number.as_str()).or_insert(r.price);
    }
    prices
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Source;

    fn rec(article: &str, price: Option<f64>) -> ArticleRecord {
        ArticleRecord::new(article, price, Source::SourceA)
    }

    #[test]
    fn test_overlap_uses_two_denominators() {
        let left = vec![rec("A1", Some(1.0)), rec("A2", Some(1.0))];
        let right = vec![rec("A2", Some(1.0)), rec("A3", Some(1.0)), rec("A4", Some(1.0)), rec("A5", Some(1.0))];

        let o = overlap(&left, &right);
        assert_eq!(o.common, 1);
        assert_eq!(o.pct_of_left, 50.0);
        assert_eq!(o.pct_of_right, 25.0);
        assert_eq!(o.common_articles, vec!["A2".to_string()]);
    }

    #[test]
    fn test_overlap_empty_side() {
        let o = overlap(&[], &[rec("A1", Some(1.0))]);
        assert_eq!(o.pct_of_left, 0.0);
        assert_eq!(o.pct_of_right, 0.0);
    }

    #[test]
    fn test_price_difference_zero_denominator() {
        let d = PriceDifference::new("A1", 5.0, 0.0);
        assert_eq!(d.difference, 5.0);
        assert_eq!(d.pct_difference, None);

        let d = PriceDifference::new("A2", 15.5, 14.5);
        assert!((d.pct_difference.unwrap() - 6.896551724137931).abs() < 1e-9);
    }

    #[test]
    fn test_stats() {
        let diffs = vec![
            PriceDifference::new("A", 11.0, 10.0),
            PriceDifference::new("B", 10.0, 12.0),
            PriceDifference::new("C", 4.0, 0.0),
            PriceDifference::new("D", 7.0, 7.0),
        ];

        let stats = DifferenceStats::from_differences(&diffs, DEFAULT_EPSILON);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean, 0.75);
        assert_eq!(stats.median, 0.5);
        assert_eq!(stats.min, -2.0);
        assert_eq!(stats.max, 4.0);
        assert_eq!(stats.pct_excluded, 1);
        assert_eq!(stats.discrepant, 3);
        // (10 - 16.6667 + 0) / 3
        assert!((stats.mean_pct.unwrap() - (-2.2222222222222223)).abs() < 1e-9);
        // deviations 0.25, -2.75, 3.25, -0.75 → 18.75 / 3
        assert!((stats.std_dev - 6.25f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_stats_empty() {
        let stats = DifferenceStats::from_differences(&[], DEFAULT_EPSILON);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.discrepant_pct(), 0.0);
    }

    #[test]
    fn test_top_lists_are_deterministic() {
        let diffs = vec![
            PriceDifference::new("B", 15.0, 10.0),
            PriceDifference::new("A", 15.0, 10.0),
            PriceDifference::new("C", 20.0, 10.0),
            PriceDifference::new("D", 5.0, 10.0),
            PriceDifference::new("E", 1.0, 10.0),
            PriceDifference::new("F", 10.0, 10.0),
        ];

        let inc: Vec<String> = top_increases(&diffs, 2, DEFAULT_EPSILON)
            .into_iter()
            .map(|d| d.article_number)
            .collect();
        assert_eq!(inc, vec!["C", "A"]);

        let dec: Vec<String> = top_decreases(&diffs, 5, DEFAULT_EPSILON)
            .into_iter()
            .map(|d| d.article_number)
            .collect();
        assert_eq!(dec, vec!["E", "D"]);

        let mut reversed = diffs.clone();
        reversed.reverse();
        assert_eq!(
            top_increases(&reversed, 3, DEFAULT_EPSILON),
            top_increases(&diffs, 3, DEFAULT_EPSILON)
        );
    }

    #[test]
    fn test_epsilon_threshold() {
        let d = PriceDifference::new("A", 10.0005, 10.0);
        assert!(!d.is_discrepant(DEFAULT_EPSILON));
        assert!(d.is_discrepant(0.0001));
    }

    #[test]
    fn test_analyze_skips_unpriced_pairs() {
        let left = vec![rec("A1", Some(15.5)), rec("A2", None), rec("A3", Some(3.0))];
        let right = vec![rec("A1", Some(14.5)), rec("A2", Some(24.75)), rec("A9", Some(1.0))];

        let analysis = Analyzer::default().analyze(&left, &right);

        assert_eq!(analysis.overlap.common, 2);
        assert_eq!(analysis.unpriced, 1);
        assert_eq!(analysis.differences.len(), 1);
        assert_eq!(analysis.differences[0].difference, 1.0);
        assert_eq!(analysis.top_increases.len(), 1);
        assert!(analysis.top_decreases.is_empty());
    }
}

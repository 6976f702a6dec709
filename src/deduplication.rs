// 🔍 Deduplication Engine - One record per article number
// Two policies: keep the lowest price (purchase sources), keep the first row (master list)

use crate::model::ArticleRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

// ============================================================================
// POLICY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DedupPolicy {
    /// Favor the lower cost: keep the minimum valid price
    KeepLowest,
    /// Keep the first occurrence that carries a price
    KeepFirst,
}

// ============================================================================
// DUPLICATE REPORT
// ============================================================================

/// All rows sharing one article number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub article_number: String,
    pub occurrences: usize,
    /// Distinct valid prices, ascending
    pub prices: Vec<f64>,
    pub kept_price: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    /// Sample standard deviation over all valid prices (0 with a single price)
    pub std_dev: Option<f64>,
}

impl DuplicateGroup {
    pub fn has_price_difference(&self) -> bool {
        self.prices.len() > 1
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DuplicateReport {
    pub table: String,
    pub articles_with_duplicates: usize,
    pub rows_removed: usize,
    pub articles_with_price_differences: usize,
    /// Ordered by article number
    pub groups: Vec<DuplicateGroup>,
}

impl DuplicateReport {
    /// Groups whose duplicates disagree on price
    pub fn price_conflicts(&self) -> impl Iterator<Item = &DuplicateGroup> {
        self.groups.iter().filter(|g| g.has_price_difference())
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} articles with duplicates ({} rows removed), {} with differing prices",
            self.table,
            self.articles_with_duplicates,
            self.rows_removed,
            self.articles_with_price_differences
        )
    }
}

#[derive(Debug, Clone)]
pub struct DedupResult {
    pub records: Vec<ArticleRecord>,
    pub report: DuplicateReport,
}

// ============================================================================
// DEDUPLICATION ENGINE
// ============================================================================

pub struct DeduplicationEngine {
    pub policy: DedupPolicy,
}

impl DeduplicationEngine {
    pub fn new(policy: DedupPolicy) -> Self {
        DeduplicationEngine { policy }
    }

    /// Collapse duplicates. Output keeps first-seen order of article numbers.
    pub fn deduplicate(&self, table: &str, records: Vec<ArticleRecord>) -> DedupResult {
        let mut order: Vec<String> = Vec::new();
        let mut buckets: HashMap<String, Vec<ArticleRecord>> = HashMap::new();

        for record in records {
            let bucket = buckets.entry(record.article_number.clone()).or_default();
            if bucket.is_empty() {
                order.push(record.article_number.clone());
            }
            bucket.push(record);
        }

        let mut kept = Vec::with_capacity(order.len());
        let mut groups = BTreeMap::new();
        let mut rows_removed = 0;

        for article in &order {
            let Some(bucket) = buckets.remove(article) else {
                continue;
            };

            let winner = self.pick(&bucket);
            if bucket.len() > 1 {
                rows_removed += bucket.len() - 1;
                groups.insert(article.clone(), describe_group(article, &bucket, winner.price));
            }
            kept.push(winner);
        }

        let groups: Vec<DuplicateGroup> = groups.into_values().collect();
        let articles_with_price_differences =
            groups.iter().filter(|g| g.has_price_difference()).count();

        let report = DuplicateReport {
            table: table.to_string(),
            articles_with_duplicates: groups.len(),
            rows_removed,
            articles_with_price_differences,
            groups,
        };

        if report.articles_with_duplicates == 0 {
            info!("No duplicates found in {}", table);
        } else {
            let resolution = match self.policy {
                DedupPolicy::KeepLowest => "keeping lowest prices",
                DedupPolicy::KeepFirst => "keeping first priced entry",
            };
            warn!("Removed {} duplicate entries from {}, {}", rows_removed, table, resolution);
            info!("{}", report.summary());
        }

        DedupResult { records: kept, report }
    }

    fn pick(&self, bucket: &[ArticleRecord]) -> ArticleRecord {
        let mut priced = bucket.iter().filter(|r| r.price.is_some());

        let chosen = match self.policy {
            DedupPolicy::KeepLowest => priced.min_by(|a, b| {
                a.price
                    .unwrap_or(f64::INFINITY)
                    .total_cmp(&b.price.unwrap_or(f64::INFINITY))
            }),
            DedupPolicy::KeepFirst => priced.next(),
        };

        // All duplicates unpriced: the first one stands in
        chosen.unwrap_or(&bucket[0]).clone()
    }
}

fn describe_group(article: &str, bucket: &[ArticleRecord], kept_price: Option<f64>) -> DuplicateGroup {
    let valid: Vec<f64> = bucket.iter().filter_map(|r| r.price).collect();

    let mut distinct = valid.clone();
    distinct.sort_by(|a, b| a.total_cmp(b));
    distinct.dedup_by(|a, b| (*a - *b).abs() < f64::EPSILON);

    let (mean, std_dev) = if valid.is_empty() {
        (None, None)
    } else {
        let n = valid.len() as f64;
        let mean = valid.iter().sum::<f64>() / n;
        let std_dev = if valid.len() < 2 {
            0.0
        } else {
            (valid.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        };
        (Some(mean), Some(std_dev))
    };

    DuplicateGroup {
        article_number: article.to_string(),
        occurrences: bucket.len(),
        min: distinct.first().copied(),
        max: distinct.last().copied(),
        prices: distinct,
        kept_price,
        mean,
        std_dev,
    }
}

// ============================================================================
// TESTS
// ============================================================================

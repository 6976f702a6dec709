// 🔗 Merger - SourceA (priority) ∪ SourceB (complete)

use crate::model::{ArticleRecord, Source};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeSummary {
    pub total: usize,
    pub from_a_only: usize,
    pub from_b_only: usize,
    pub in_both: usize,
    /// Common articles where SourceA has no price but SourceB does.
    /// SourceA still wins; this only surfaces the data-quality gap.
    pub a_price_missing_b_present: usize,
}

/// One record per distinct article number, in deterministic order:
/// SourceA records first (their input order), then SourceB-only records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedTable {
    pub records: Vec<ArticleRecord>,
}

impl MergedTable {
    pub fn new(records: Vec<ArticleRecord>) -> Self {
        MergedTable { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, article_number: &str) -> Option<&ArticleRecord> {
        self.records.iter().find(|r| r.article_number == article_number)
    }

    pub fn count_by_source(&self, source: Source) -> usize {
        self.records.iter().filter(|r| r.source == source).count()
    }
}

/// Merge two deduplicated collections.
///
/// - in both → SourceA's price, `Source::Both`
/// - only in A → SourceA's price, `Source::SourceA`
/// - only in B → SourceB's price, `Source::SourceB`
pub fn merge_sources(source_a: &[ArticleRecord], source_b: &[ArticleRecord]) -> (MergedTable, MergeSummary) {
    let b_prices: HashMap<&str, Option<f64>> = source_b
        .iter()
        .map(|r| (r.article_number.as_str(), r.price))
        .collect();

    let mut summary = MergeSummary::default();
    let mut seen: HashSet<&str> = HashSet::with_capacity(source_a.len() + source_b.len());
    let mut records = Vec::with_capacity(source_a.len() + source_b.len());

    for a in source_a {
        if !seen.insert(a.article_number.as_str()) {
            continue;
        }

        let source = match b_prices.get(a.article_number.as_str()) {
            Some(b_price) => {
                summary.in_both += 1;
                if a.price.is_none() && b_price.is_some() {
                    summary.a_price_missing_b_present += 1;
                }
                Source::Both
            }
            None => {
                summary.from_a_only += 1;
                Source::SourceA
            }
        };

        records.push(ArticleRecord::new(a.article_number.clone(), a.price, source));
    }

    for b in source_b {
        if !seen.insert(b.article_number.as_str()) {
            continue;
        }
        summary.from_b_only += 1;
        records.push(ArticleRecord::new(b.article_number.clone(), b.price, Source::SourceB));
    }

    summary.total = records.len();

    info!("Merged data: {} total articles", summary.total);
    info!("From recent prices only: {} articles", summary.from_a_only);
    info!("From article database only: {} articles", summary.from_b_only);
    info!("Common articles (recent price priority): {} articles", summary.in_both);

    (MergedTable::new(records), summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(article: &str, price: f64, source: Source) -> ArticleRecord {
        ArticleRecord::new(article, Some(price), source)
    }

    #[test]
    fn test_merge_priority_scenario() {
        let a = vec![rec("A1", 10.0, Source::SourceA), rec("A2", 20.0, Source::SourceA)];
        let b = vec![rec("A2", 25.0, Source::SourceB), rec("A3", 30.0, Source::SourceB)];

        let (merged, summary) = merge_sources(&a, &b);

        assert_eq!(
            merged.records,
            vec![
                rec("A1", 10.0, Source::SourceA),
                rec("A2", 20.0, Source::Both),
                rec("A3", 30.0, Source::SourceB),
            ]
        );
        assert_eq!(summary.total, 3);
        assert_eq!(summary.from_a_only, 1);
        assert_eq!(summary.from_b_only, 1);
        assert_eq!(summary.in_both, 1);
    }

    #[test]
    fn test_merge_size_equals_key_union() {
        let a: Vec<_> = (0..50).map(|i| rec(&format!("K{}", i), i as f64, Source::SourceA)).collect();
        let b: Vec<_> = (25..120).map(|i| rec(&format!("K{}", i), 1.0, Source::SourceB)).collect();

        let (merged, _) = merge_sources(&a, &b);

        let union: HashSet<&str> = a.iter().chain(b.iter()).map(|r| r.article_number.as_str()).collect();
        assert_eq!(merged.len(), union.len());

        for record in &a {
            let m = merged.get(&record.article_number).unwrap();
            assert_eq!(m.price, record.price, "SourceA price must win");
        }
        assert_eq!(merged.count_by_source(Source::Both), 25);
    }

    #[test]
    fn test_missing_a_price_still_wins() {
        let a = vec![ArticleRecord::new("A1", None, Source::SourceA)];
        let b = vec![rec("A1", 5.0, Source::SourceB)];

        let (merged, summary) = merge_sources(&a, &b);

        assert_eq!(merged.records[0].price, None);
        assert_eq!(merged.records[0].source, Source::Both);
        assert_eq!(summary.a_price_missing_b_present, 1);
    }

    #[test]
    fn test_merge_empty_sources() {
        let (merged, summary) = merge_sources(&[], &[]);
        assert!(merged.is_empty());
        assert_eq!(summary, MergeSummary::default());
    }
}

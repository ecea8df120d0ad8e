//! Retrieval quality metrics.
//!
//! Everything here works on plain id lists and sets, so it can score the output of
//! any retriever. Divisions by zero (nothing retrieved, nothing relevant, zero ideal
//! gain) are defined to yield `0.0`.

use crate::error::{Error, Result};
use crate::DocId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Ground truth for one query, before it has been run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestQuery {
    pub query: String,
    pub relevant: HashSet<DocId>,
}

/// One query's ranked output together with its ground truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub query: String,
    pub retrieved: Vec<DocId>,
    pub relevant: HashSet<DocId>,
}

/// `|retrieved ∩ relevant| / |retrieved|`
pub fn precision(retrieved: &HashSet<DocId>, relevant: &HashSet<DocId>) -> f64 {
    if retrieved.is_empty() {
        return 0.0;
    }
    retrieved.intersection(relevant).count() as f64 / retrieved.len() as f64
}

/// `|retrieved ∩ relevant| / |relevant|`
pub fn recall(retrieved: &HashSet<DocId>, relevant: &HashSet<DocId>) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }
    retrieved.intersection(relevant).count() as f64 / relevant.len() as f64
}

pub fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        return 0.0;
    }
    2.0 * precision * recall / (precision + recall)
}

/// Mean of the precision values at each hit, divided by the size of the relevant
/// set rather than the number of hits: relevant documents that were never
/// retrieved still pull the score down. Repeated ids only count at their first rank.
pub fn average_precision(ranked: &[DocId], relevant: &HashSet<DocId>) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }
    let mut seen = HashSet::with_capacity(relevant.len());
    let mut hits = 0usize;
    let mut sum = 0.0;
    for (i, doc_id) in ranked.iter().enumerate() {
        if relevant.contains(doc_id) && seen.insert(*doc_id) {
            hits += 1;
            sum += hits as f64 / (i + 1) as f64;
        }
    }
    if hits == 0 {
        return 0.0;
    }
    sum / relevant.len() as f64
}

pub fn mean_average_precision(records: &[EvaluationRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let total: f64 = records
        .iter()
        .map(|r| average_precision(&r.retrieved, &r.relevant))
        .sum();
    total / records.len() as f64
}

fn top_k_set(ranked: &[DocId], k: usize) -> HashSet<DocId> {
    ranked.iter().take(k).copied().collect()
}

pub fn precision_at_k(ranked: &[DocId], relevant: &HashSet<DocId>, k: usize) -> f64 {
    precision(&top_k_set(ranked, k), relevant)
}

pub fn recall_at_k(ranked: &[DocId], relevant: &HashSet<DocId>, k: usize) -> f64 {
    recall(&top_k_set(ranked, k), relevant)
}

/// Rank discount used by nDCG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Discount {
    /// `log2(i + 1)` for 1-based position `i`.
    #[default]
    Log2,
    /// `i * 0.693147` for `i > 1` (1 at the top). This is not `log2(i + 1)`; the error
    /// grows with rank. Only useful to reproduce scores computed that way.
    LinearApprox,
}

impl Discount {
    fn at(self, position: usize) -> f64 {
        if position <= 1 {
            return 1.0;
        }
        match self {
            Discount::Log2 => ((position + 1) as f64).log2(),
            Discount::LinearApprox => position as f64 * 0.693147,
        }
    }
}

/// nDCG@k with graded relevance and the standard `log2(i + 1)` discount.
pub fn ndcg_at_k(ranked: &[DocId], relevance: &HashMap<DocId, f64>, k: usize) -> f64 {
    ndcg_at_k_with(ranked, relevance, k, Discount::Log2)
}

pub fn ndcg_at_k_with(
    ranked: &[DocId],
    relevance: &HashMap<DocId, f64>,
    k: usize,
    discount: Discount,
) -> f64 {
    let dcg: f64 = ranked
        .iter()
        .take(k)
        .enumerate()
        .map(|(i, doc_id)| relevance.get(doc_id).copied().unwrap_or(0.0) / discount.at(i + 1))
        .sum();

    let mut ideal: Vec<f64> = relevance.values().copied().collect();
    ideal.sort_unstable_by(|a, b| b.total_cmp(a));
    let idcg: f64 = ideal
        .iter()
        .take(k)
        .enumerate()
        .map(|(i, rel)| rel / discount.at(i + 1))
        .sum();

    if idcg == 0.0 {
        0.0
    } else {
        dcg / idcg
    }
}

/// Metrics for a single query.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub average_precision: f64,
    pub precision_at_k: f64,
    pub recall_at_k: f64,
}

pub fn evaluate_query(ranked: &[DocId], relevant: &HashSet<DocId>, k: usize) -> QueryMetrics {
    let retrieved: HashSet<DocId> = ranked.iter().copied().collect();
    let p = precision(&retrieved, relevant);
    let r = recall(&retrieved, relevant);
    QueryMetrics {
        precision: p,
        recall: r,
        f1: f1(p, r),
        average_precision: average_precision(ranked, relevant),
        precision_at_k: precision_at_k(ranked, relevant, k),
        recall_at_k: recall_at_k(ranked, relevant, k),
    }
}

/// Per-metric arithmetic means over a batch of queries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub k: usize,
    pub avg_precision: f64,
    pub avg_recall: f64,
    pub avg_f1_score: f64,
    pub map: f64,
    pub avg_precision_at_k: f64,
    pub avg_recall_at_k: f64,
}

impl SystemMetrics {
    /// Flat metric map; the cutoff is spelled into the @k keys (`avg_precision_at_10`).
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        let mut map = BTreeMap::new();
        map.insert("avg_precision".to_string(), self.avg_precision);
        map.insert("avg_recall".to_string(), self.avg_recall);
        map.insert("avg_f1_score".to_string(), self.avg_f1_score);
        map.insert("map".to_string(), self.map);
        map.insert(format!("avg_precision_at_{}", self.k), self.avg_precision_at_k);
        map.insert(format!("avg_recall_at_{}", self.k), self.avg_recall_at_k);
        map
    }
}

pub fn evaluate_system(records: &[EvaluationRecord], k: usize) -> Result<SystemMetrics> {
    if records.is_empty() {
        return Err(Error::EmptyEvaluation);
    }
    let per_query: Vec<QueryMetrics> = records
        .iter()
        .map(|r| evaluate_query(&r.retrieved, &r.relevant, k))
        .collect();
    let n = per_query.len() as f64;
    let mean = |f: fn(&QueryMetrics) -> f64| per_query.iter().map(f).sum::<f64>() / n;

    Ok(SystemMetrics {
        k,
        avg_precision: mean(|m| m.precision),
        avg_recall: mean(|m| m.recall),
        avg_f1_score: mean(|m| m.f1),
        map: mean(|m| m.average_precision),
        avg_precision_at_k: mean(|m| m.precision_at_k),
        avg_recall_at_k: mean(|m| m.recall_at_k),
    })
}

//! TF-IDF weighting over an [`InvertedIndex`].
//!
//! `tf` comes in three flavours ([`TfMode`]), `idf = log10(N / df)` (0 when `df = 0`).
//! IDF values are memoised per index generation: the cache is dropped as soon as the
//! index it was filled from has been mutated (documents added, terms pruned) or
//! replaced by a freshly loaded snapshot.

use crate::error::Error;
use crate::index::InvertedIndex;
use crate::DocId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Term-frequency normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TfMode {
    /// `f / max(len, 1)`
    #[default]
    Normalized,
    /// `1 + log10(f)` for `f > 0`, else 0
    Log,
    /// `f`
    Raw,
}

impl TfMode {
    pub fn tf(self, term_freq: u32, doc_length: u32) -> f64 {
        match self {
            TfMode::Normalized => term_freq as f64 / doc_length.max(1) as f64,
            TfMode::Log => {
                if term_freq > 0 {
                    1.0 + (term_freq as f64).log10()
                } else {
                    0.0
                }
            }
            TfMode::Raw => term_freq as f64,
        }
    }
}

impl FromStr for TfMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normalized" => Ok(TfMode::Normalized),
            "log" => Ok(TfMode::Log),
            "raw" => Ok(TfMode::Raw),
            other => Err(Error::UnknownTfMode(other.to_string())),
        }
    }
}

impl fmt::Display for TfMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TfMode::Normalized => "normalized",
            TfMode::Log => "log",
            TfMode::Raw => "raw",
        })
    }
}

/// `log10(total_docs / df)`, or 0 for an unseen term.
pub fn idf(total_docs: u32, document_frequency: u32) -> f64 {
    if document_frequency == 0 {
        return 0.0;
    }
    (total_docs as f64 / document_frequency as f64).log10()
}

/// Sparse term -> weight map. Only strictly positive weights are stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeightVector(HashMap<String, f64>);

impl WeightVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `weight` under `term` when it is positive; anything else is dropped.
    pub fn insert(&mut self, term: impl Into<String>, weight: f64) {
        if weight > 0.0 {
            self.0.insert(term.into(), weight);
        }
    }

    pub fn get(&self, term: &str) -> Option<f64> {
        self.0.get(term).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.0.iter().map(|(t, &w)| (t.as_str(), w))
    }

    /// Euclidean norm over all of this vector's weights.
    pub fn norm(&self) -> f64 {
        self.0.values().map(|w| w * w).sum::<f64>().sqrt()
    }

    /// Entries by weight descending, ties by term ascending.
    pub fn into_ranked(self) -> Vec<(String, f64)> {
        let mut entries: Vec<(String, f64)> = self.0.into_iter().collect();
        entries.sort_unstable_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries
    }
}

/// Cosine of the angle between two sparse vectors; 0 when they share no term or
/// either has zero magnitude.
pub fn cosine_similarity(a: &WeightVector, b: &WeightVector) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let mut dot = 0.0;
    let mut common = 0usize;
    for (term, w) in small.iter() {
        if let Some(other) = large.get(term) {
            dot += w * other;
            common += 1;
        }
    }
    if common == 0 {
        return 0.0;
    }
    let norms = a.norm() * b.norm();
    if norms == 0.0 {
        return 0.0;
    }
    dot / norms
}

#[derive(Debug, Default)]
struct IdfCacheState {
    generation: u64,
    values: HashMap<String, f64>,
}

/// Computes TF-IDF weights against an index; owns the IDF cache.
#[derive(Debug, Default)]
pub struct WeightCalculator {
    tf_mode: TfMode,
    idf_cache: RwLock<IdfCacheState>,
}

impl WeightCalculator {
    pub fn new(tf_mode: TfMode) -> Self {
        Self { tf_mode, idf_cache: RwLock::new(IdfCacheState::default()) }
    }

    pub fn tf_mode(&self) -> TfMode {
        self.tf_mode
    }

    /// Cached IDF of `term` in `index`.
    pub fn idf(&self, index: &InvertedIndex, term: &str) -> f64 {
        let generation = index.generation();
        {
            let state = self.idf_cache.read();
            if state.generation == generation {
                if let Some(&v) = state.values.get(term) {
                    return v;
                }
            }
        }

        let value = idf(index.total_docs(), index.document_frequency(term));
        let mut state = self.idf_cache.write();
        if state.generation != generation {
            if !state.values.is_empty() {
                tracing::debug!(stale = state.values.len(), "index changed, dropping idf cache");
            }
            state.values.clear();
            state.generation = generation;
        }
        state.values.insert(term.to_string(), value);
        value
    }

    pub fn cached_terms(&self) -> usize {
        self.idf_cache.read().values.len()
    }

    /// TF-IDF of `term` in `doc_id`, 0 if the document lacks the term.
    pub fn tfidf(&self, index: &InvertedIndex, term: &str, doc_id: DocId) -> f64 {
        let freq = index.term_frequency(term, doc_id);
        if freq == 0 {
            return 0.0;
        }
        let doc_length = index.doc_length(doc_id).unwrap_or(1);
        self.tf_mode.tf(freq, doc_length) * self.idf(index, term)
    }

    /// Weight vector over every term of `doc_id`.
    pub fn document_vector(&self, index: &InvertedIndex, doc_id: DocId) -> WeightVector {
        let terms = index.document_terms(doc_id);
        self.document_vector_for(index, doc_id, &terms)
    }

    /// Weight vector of `doc_id` restricted to `terms`.
    pub fn document_vector_for<S: AsRef<str>>(
        &self,
        index: &InvertedIndex,
        doc_id: DocId,
        terms: &[S],
    ) -> WeightVector {
        let mut vector = WeightVector::new();
        for term in terms {
            let term = term.as_ref();
            if vector.get(term).is_some() {
                continue;
            }
            vector.insert(term, self.tfidf(index, term, doc_id));
        }
        vector
    }

    /// Weight vector of a query: normalized TF over the query's own length, times IDF.
    pub fn query_vector<S: AsRef<str>>(&self, index: &InvertedIndex, query_terms: &[S]) -> WeightVector {
        let mut counts: HashMap<&str, u32> = HashMap::new();
        for term in query_terms {
            *counts.entry(term.as_ref()).or_insert(0) += 1;
        }
        let query_length = query_terms.len() as u32;

        let mut vector = WeightVector::new();
        for (term, freq) in counts {
            let tf = TfMode::Normalized.tf(freq, query_length);
            vector.insert(term, tf * self.idf(index, term));
        }
        vector
    }

    /// The `k` highest weighted terms of `doc_id`.
    pub fn top_terms(&self, index: &InvertedIndex, doc_id: DocId, k: usize) -> Vec<(String, f64)> {
        let mut ranked = self.document_vector(index, doc_id).into_ranked();
        ranked.truncate(k);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> InvertedIndex {
        let mut idx = InvertedIndex::new();
        idx.add_document(1, &["global", "warming", "global"]).unwrap();
        idx.add_document(2, &["global", "energy"]).unwrap();
        idx.add_document(3, &["energy", "renewable"]).unwrap();
        idx
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn tf_modes() {
        assert!(approx(TfMode::Normalized.tf(2, 4), 0.5));
        assert!(approx(TfMode::Normalized.tf(3, 0), 3.0));
        assert!(approx(TfMode::Log.tf(10, 99), 2.0));
        assert!(approx(TfMode::Log.tf(1, 99), 1.0));
        assert_eq!(TfMode::Log.tf(0, 99), 0.0);
        assert_eq!(TfMode::Raw.tf(7, 99), 7.0);
        assert_eq!(TfMode::default(), TfMode::Normalized);
    }

    #[test]
    fn tf_mode_parses_and_rejects_unknown() {
        assert_eq!("log".parse::<TfMode>().unwrap(), TfMode::Log);
        assert_eq!("raw".parse::<TfMode>().unwrap(), TfMode::Raw);
        assert_eq!(
            "bm25".parse::<TfMode>().unwrap_err(),
            Error::UnknownTfMode("bm25".to_string())
        );
    }

    #[test]
    fn idf_values() {
        let idx = corpus();
        let calc = WeightCalculator::default();
        assert!(approx(calc.idf(&idx, "global"), (3.0f64 / 2.0).log10()));
        assert!(approx(calc.idf(&idx, "warming"), 3.0f64.log10()));
        assert_eq!(calc.idf(&idx, "missing"), 0.0);
    }

    #[test]
    fn idf_is_zero_for_term_in_every_document() {
        let mut idx = InvertedIndex::new();
        idx.add_document(1, &["a", "b"]).unwrap();
        idx.add_document(2, &["a"]).unwrap();
        let calc = WeightCalculator::default();
        assert_eq!(calc.idf(&idx, "a"), 0.0);
        assert!(calc.document_vector(&idx, 2).is_empty());
    }

    #[test]
    fn idf_cache_is_dropped_when_index_changes() {
        let mut idx = corpus();
        let calc = WeightCalculator::default();
        let before = calc.idf(&idx, "renewable");
        assert!(approx(before, 3.0f64.log10()));
        assert_eq!(calc.cached_terms(), 1);

        idx.add_document(4, &["renewable"]).unwrap();
        let after = calc.idf(&idx, "renewable");
        assert!(approx(after, 2.0f64.log10()));
        assert_eq!(calc.cached_terms(), 1);

        idx.prune(2, 1.0);
        assert_eq!(calc.idf(&idx, "warming"), 0.0);
    }

    #[test]
    fn document_vector_weights() {
        let idx = corpus();
        let calc = WeightCalculator::default();
        let v = calc.document_vector(&idx, 1);
        assert_eq!(v.len(), 2);
        let global = v.get("global").unwrap();
        assert!(approx(global, 2.0 / 3.0 * 1.5f64.log10()));
        let warming = v.get("warming").unwrap();
        assert!(approx(warming, 1.0 / 3.0 * 3.0f64.log10()));

        let restricted = calc.document_vector_for(&idx, 1, &["global", "energy", "global"]);
        assert_eq!(restricted.len(), 1);
        assert!(restricted.get("energy").is_none());
    }

    #[test]
    fn document_vector_respects_tf_mode() {
        let idx = corpus();
        let calc = WeightCalculator::new(TfMode::Raw);
        let v = calc.document_vector_for(&idx, 1, &["global"]);
        assert!(approx(v.get("global").unwrap(), 2.0 * 1.5f64.log10()));
    }

    #[test]
    fn query_vector_uses_query_length() {
        let idx = corpus();
        let calc = WeightCalculator::new(TfMode::Raw);
        let v = calc.query_vector(&idx, &["global", "global", "warming", "unknown"]);
        assert_eq!(v.len(), 2);
        assert!(approx(v.get("global").unwrap(), 0.5 * 1.5f64.log10()));
        assert!(approx(v.get("warming").unwrap(), 0.25 * 3.0f64.log10()));
        assert!(calc.query_vector(&idx, &Vec::<String>::new()).is_empty());
    }

    #[test]
    fn cosine_is_symmetric_and_bounded() {
        let mut a = WeightVector::new();
        a.insert("x", 1.0);
        a.insert("y", 2.0);
        let mut b = WeightVector::new();
        b.insert("y", 3.0);
        b.insert("z", 4.0);

        let ab = cosine_similarity(&a, &b);
        let ba = cosine_similarity(&b, &a);
        assert!(approx(ab, ba));
        assert!(approx(ab, 6.0 / (5.0f64.sqrt() * 5.0)));
        assert!((0.0..=1.0).contains(&ab));
        assert!(approx(cosine_similarity(&a, &a), 1.0));
        assert_eq!(cosine_similarity(&a, &WeightVector::new()), 0.0);
    }

    #[test]
    fn cosine_without_common_terms_is_zero() {
        let mut a = WeightVector::new();
        a.insert("x", 1.0);
        let mut b = WeightVector::new();
        b.insert("y", 1.0);
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn non_positive_weights_are_not_stored() {
        let mut v = WeightVector::new();
        v.insert("zero", 0.0);
        v.insert("neg", -1.0);
        assert!(v.is_empty());
    }

    #[test]
    fn top_terms_ranked_by_weight() {
        let idx = corpus();
        let calc = WeightCalculator::default();
        let top = calc.top_terms(&idx, 1, 1);
        assert_eq!(top.len(), 1);
        // 1/3*log10(3) = 0.159 beats 2/3*log10(1.5) = 0.117
        assert_eq!(top[0].0, "warming");
    }
}

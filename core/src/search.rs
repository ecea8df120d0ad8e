use crate::error::Error;
use crate::evaluate::{EvaluationRecord, TestQuery};
use crate::index::{DocumentRecord, InvertedIndex};
use crate::tokenizer::Normalizer;
use crate::weights::{cosine_similarity, TfMode, WeightCalculator, WeightVector};
use crate::DocId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// How a query string is matched against the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// TF-IDF cosine ranking.
    #[default]
    Vector,
    /// Documents containing every query term.
    BooleanAnd,
    /// Documents containing any query term.
    BooleanOr,
}

impl FromStr for SearchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vector" => Ok(SearchMode::Vector),
            "boolean_and" => Ok(SearchMode::BooleanAnd),
            "boolean_or" => Ok(SearchMode::BooleanOr),
            other => Err(Error::UnknownSearchMode(other.to_string())),
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SearchMode::Vector => "vector",
            SearchMode::BooleanAnd => "boolean_and",
            SearchMode::BooleanOr => "boolean_or",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOperator {
    And,
    Or,
}

/// A retrieved document with its score and display metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: f64,
    pub title: String,
    pub content: String,
    pub author: String,
    pub date: String,
    pub category: String,
}

/// Read-only query facade over a built index.
#[derive(Debug)]
pub struct SearchEngine {
    index: InvertedIndex,
    weights: WeightCalculator,
}

impl SearchEngine {
    pub fn new(index: InvertedIndex, tf_mode: TfMode) -> Self {
        Self { index, weights: WeightCalculator::new(tf_mode) }
    }

    pub fn index(&self) -> &InvertedIndex {
        &self.index
    }

    pub fn weights(&self) -> &WeightCalculator {
        &self.weights
    }

    pub fn document(&self, doc_id: DocId) -> Option<&DocumentRecord> {
        self.index.document(doc_id)
    }

    /// Set algebra over postings. Unknown terms contribute an empty set, so `And` with
    /// any unknown term is empty. Ids come back ascending.
    pub fn boolean_search<S: AsRef<str>>(&self, query_terms: &[S], op: BooleanOperator) -> Vec<DocId> {
        let mut sets = query_terms.iter().map(|term| {
            self.index
                .postings(term.as_ref())
                .iter()
                .map(|p| p.doc_id)
                .collect::<HashSet<DocId>>()
        });

        let Some(first) = sets.next() else {
            return Vec::new();
        };
        let combined = sets.fold(first, |acc, next| match op {
            BooleanOperator::And => &acc & &next,
            BooleanOperator::Or => &acc | &next,
        });

        let mut ids: Vec<DocId> = combined.into_iter().collect();
        ids.sort_unstable();
        ids
    }

    /// Cosine ranking of every document sharing at least one term with the query.
    ///
    /// Document vectors are restricted to the query terms; only those terms can
    /// contribute to the dot product. Results are score descending, then id ascending.
    pub fn vector_search<S: AsRef<str>>(&self, query_terms: &[S], top_k: usize) -> Vec<(DocId, f64)> {
        let query_vector = self.weights.query_vector(&self.index, query_terms);
        if query_vector.is_empty() {
            return Vec::new();
        }

        let candidates: HashSet<DocId> = query_terms
            .iter()
            .flat_map(|term| self.index.postings(term.as_ref()).iter().map(|p| p.doc_id))
            .collect();

        let scored = candidates.into_iter().map(|doc_id| {
            let doc_vector = self.weights.document_vector_for(&self.index, doc_id, query_terms);
            (doc_id, cosine_similarity(&query_vector, &doc_vector))
        });
        rank(scored, top_k)
    }

    /// Normalize `query`, retrieve with `mode`, and re-hydrate the top `top_k` hits.
    /// Boolean hits all score 1.0.
    pub fn search<N: Normalizer + ?Sized>(
        &self,
        query: &str,
        normalizer: &N,
        mode: SearchMode,
        top_k: usize,
    ) -> Vec<SearchHit> {
        let query_terms = normalizer.normalize(query);
        if query_terms.is_empty() {
            return Vec::new();
        }
        tracing::debug!(?query_terms, %mode, top_k, "search");

        let scored: Vec<(DocId, f64)> = match mode {
            SearchMode::Vector => self.vector_search(&query_terms, top_k),
            SearchMode::BooleanAnd | SearchMode::BooleanOr => {
                let op = if mode == SearchMode::BooleanAnd { BooleanOperator::And } else { BooleanOperator::Or };
                self.boolean_search(&query_terms, op)
                    .into_iter()
                    .take(top_k)
                    .map(|doc_id| (doc_id, 1.0))
                    .collect()
            }
        };
        scored.into_iter().map(|(doc_id, score)| self.hit(doc_id, score)).collect()
    }

    /// Documents most similar to `doc_id`, itself excluded.
    ///
    /// Scans every document in the corpus, which is fine for small collections.
    pub fn related_documents(&self, doc_id: DocId, top_k: usize) -> Vec<SearchHit> {
        let reference: WeightVector = self.weights.document_vector(&self.index, doc_id);
        if reference.is_empty() {
            return Vec::new();
        }
        let terms: Vec<&str> = reference.terms().collect();

        let scored = self
            .index
            .document_ids()
            .into_iter()
            .filter(|&other| other != doc_id)
            .map(|other| {
                let other_vector = self.weights.document_vector_for(&self.index, other, &terms);
                (other, cosine_similarity(&reference, &other_vector))
            });
        rank(scored, top_k)
            .into_iter()
            .map(|(id, score)| self.hit(id, score))
            .collect()
    }

    /// Highest TF-IDF terms of a document.
    pub fn keywords(&self, doc_id: DocId, k: usize) -> Vec<(String, f64)> {
        self.weights.top_terms(&self.index, doc_id, k)
    }

    /// Run each test query and pair the ranked ids with its ground truth.
    pub fn evaluation_records<N: Normalizer + ?Sized>(
        &self,
        normalizer: &N,
        queries: &[TestQuery],
        mode: SearchMode,
        k: usize,
    ) -> Vec<EvaluationRecord> {
        queries
            .iter()
            .map(|q| EvaluationRecord {
                query: q.query.clone(),
                retrieved: self.search(&q.query, normalizer, mode, k).into_iter().map(|h| h.doc_id).collect(),
                relevant: q.relevant.clone(),
            })
            .collect()
    }

    fn hit(&self, doc_id: DocId, score: f64) -> SearchHit {
        let doc = self.index.document(doc_id).cloned().unwrap_or_default();
        SearchHit {
            doc_id,
            score,
            title: doc.title,
            content: doc.content,
            author: doc.author,
            date: doc.date,
            category: doc.category,
        }
    }
}

/// Drop non-positive scores, sort score desc then id asc, keep `top_k`.
fn rank(scored: impl Iterator<Item = (DocId, f64)>, top_k: usize) -> Vec<(DocId, f64)> {
    let mut scored: Vec<(DocId, f64)> = scored.filter(|(_, s)| *s > 0.0).collect();
    scored.sort_unstable_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scored.truncate(top_k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ws(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    fn record(id: DocId, title: &str, content: &str) -> DocumentRecord {
        DocumentRecord {
            id,
            title: title.to_string(),
            content: content.to_string(),
            category: "climate".to_string(),
            ..Default::default()
        }
    }

    fn engine() -> SearchEngine {
        let mut idx = InvertedIndex::new();
        for (id, text) in [(1, "global warming global"), (2, "global energy"), (3, "energy renewable")] {
            idx.add_record(record(id, "", text), &ws(text)).unwrap();
        }
        SearchEngine::new(idx, TfMode::Normalized)
    }

    #[test]
    fn search_mode_round_trips_and_rejects_unknown() {
        for mode in [SearchMode::Vector, SearchMode::BooleanAnd, SearchMode::BooleanOr] {
            assert_eq!(mode.to_string().parse::<SearchMode>().unwrap(), mode);
        }
        assert_eq!(
            "fuzzy".parse::<SearchMode>().unwrap_err(),
            Error::UnknownSearchMode("fuzzy".to_string())
        );
    }

    #[test]
    fn boolean_or_and_and() {
        let e = engine();
        assert_eq!(e.boolean_search(&["global"], BooleanOperator::Or), vec![1, 2]);
        assert_eq!(e.boolean_search(&["global", "energy"], BooleanOperator::Or), vec![1, 2, 3]);
        assert_eq!(e.boolean_search(&["global", "energy"], BooleanOperator::And), vec![2]);
        assert!(e.boolean_search(&["global", "absent"], BooleanOperator::And).is_empty());
        assert!(e.boolean_search(&Vec::<String>::new(), BooleanOperator::Or).is_empty());
    }

    #[test]
    fn and_is_subset_of_or() {
        let e = engine();
        for query in [vec!["global"], vec!["energy", "renewable"], vec!["global", "energy", "absent"]] {
            let and: HashSet<DocId> = e.boolean_search(&query, BooleanOperator::And).into_iter().collect();
            let or: HashSet<DocId> = e.boolean_search(&query, BooleanOperator::Or).into_iter().collect();
            assert!(and.is_subset(&or));
        }
    }

    #[test]
    fn vector_search_ranks_by_cosine() {
        let e = engine();
        let results = e.vector_search(&["global", "warming"], 10);
        let ids: Vec<DocId> = results.iter().map(|r| r.0).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(results[0].1 > results[1].1);
        assert!(results.iter().all(|r| r.1 > 0.0 && r.1 <= 1.0 + 1e-12));
    }

    #[test]
    fn vector_search_breaks_ties_by_id() {
        let e = engine();
        // single-term query: both candidate vectors are parallel to the query
        let results = e.vector_search(&["global"], 10);
        assert_eq!(results.iter().map(|r| r.0).collect::<Vec<_>>(), vec![1, 2]);
        assert!((results[0].1 - results[1].1).abs() < 1e-12);
    }

    #[test]
    fn vector_search_truncates_and_handles_empty() {
        let e = engine();
        assert_eq!(e.vector_search(&["energy", "global"], 1).len(), 1);
        assert!(e.vector_search(&Vec::<String>::new(), 10).is_empty());
        assert!(e.vector_search(&["absent"], 10).is_empty());
    }

    #[test]
    fn search_rehydrates_records() {
        let e = engine();
        let hits = e.search("global", &ws, SearchMode::BooleanOr, 1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_id, 1);
        assert_eq!(hits[0].score, 1.0);
        assert_eq!(hits[0].content, "global warming global");
        assert_eq!(hits[0].category, "climate");

        let hits = e.search("global", &ws, SearchMode::Vector, 10);
        assert_eq!(hits.iter().map(|h| h.doc_id).collect::<Vec<_>>(), vec![1, 2]);
        assert!(e.search("   ", &ws, SearchMode::Vector, 10).is_empty());
    }

    #[test]
    fn hits_without_records_have_empty_metadata() {
        let mut idx = InvertedIndex::new();
        idx.add_document(5, &["solo", "term"]).unwrap();
        idx.add_document(6, &["other"]).unwrap();
        let e = SearchEngine::new(idx, TfMode::Normalized);
        let hits = e.search("solo", &ws, SearchMode::Vector, 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "");
    }

    #[test]
    fn related_documents_exclude_reference() {
        let e = engine();
        let related = e.related_documents(2, 5);
        let ids: Vec<DocId> = related.iter().map(|h| h.doc_id).collect();
        assert!(!ids.contains(&2));
        assert_eq!(ids.len(), 2);
        assert!(related.iter().all(|h| h.score > 0.0));
        assert!(e.related_documents(42, 5).is_empty());
    }

    #[test]
    fn keywords_come_from_document_vector() {
        let e = engine();
        let kw = e.keywords(1, 5);
        assert_eq!(kw[0].0, "warming");
        assert_eq!(kw.len(), 2);
    }

    #[test]
    fn evaluation_records_collect_ranked_ids() {
        let e = engine();
        let queries = vec![TestQuery { query: "energy".into(), relevant: [3].into_iter().collect() }];
        let records = e.evaluation_records(&ws, &queries, SearchMode::BooleanOr, 10);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].retrieved, vec![2, 3]);
        assert!(records[0].relevant.contains(&3));
    }
}

use crate::error::{Error, Result};
use crate::DocId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique stamp; two indexes never share one, so a cache keyed on it
/// cannot mistake one index (or one state of an index) for another.
pub(crate) fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// One (document, raw term frequency) entry of a postings list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub freq: u32,
}

/// Document as supplied by the caller; only returned back in results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocId,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_documents: u32,
    pub total_terms: usize,
    pub avg_doc_length: f64,
}

/// Term -> postings store plus the per-document and corpus counters TF-IDF needs.
///
/// Built once per corpus, optionally pruned, then read. Every mutation moves the
/// index to a new generation so cached IDF values computed earlier are discarded.
#[derive(Debug)]
pub struct InvertedIndex {
    pub(crate) postings: HashMap<String, Vec<Posting>>,
    pub(crate) documents: HashMap<DocId, DocumentRecord>,
    /// Token count per document, replicated title tokens included.
    pub(crate) doc_lengths: HashMap<DocId, u32>,
    pub(crate) total_docs: u32,
    generation: u64,
}

impl Default for InvertedIndex {
    fn default() -> Self {
        Self {
            postings: HashMap::new(),
            documents: HashMap::new(),
            doc_lengths: HashMap::new(),
            total_docs: 0,
            generation: next_generation(),
        }
    }
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(
        postings: HashMap<String, Vec<Posting>>,
        documents: HashMap<DocId, DocumentRecord>,
        doc_lengths: HashMap<DocId, u32>,
        total_docs: u32,
    ) -> Self {
        Self { postings, documents, doc_lengths, total_docs, generation: next_generation() }
    }

    /// Index `tokens` for `doc_id`: one posting per distinct term carrying its count.
    ///
    /// Ids are unique per index; a second call for the same id is rejected and leaves
    /// the index untouched.
    pub fn add_document<S: AsRef<str>>(&mut self, doc_id: DocId, tokens: &[S]) -> Result<()> {
        if self.doc_lengths.contains_key(&doc_id) {
            return Err(Error::DuplicateDocument(doc_id));
        }

        let mut term_freq: HashMap<&str, u32> = HashMap::new();
        for token in tokens {
            *term_freq.entry(token.as_ref()).or_insert(0) += 1;
        }
        for (term, freq) in term_freq {
            self.postings
                .entry(term.to_string())
                .or_default()
                .push(Posting { doc_id, freq });
        }

        self.doc_lengths.insert(doc_id, tokens.len() as u32);
        self.total_docs += 1;
        self.generation = next_generation();
        Ok(())
    }

    /// Same as [`add_document`](Self::add_document), keeping `record` for re-hydration.
    pub fn add_record<S: AsRef<str>>(&mut self, record: DocumentRecord, tokens: &[S]) -> Result<()> {
        self.add_document(record.id, tokens)?;
        self.documents.insert(record.id, record);
        Ok(())
    }

    pub fn postings(&self, term: &str) -> &[Posting] {
        self.postings.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn document_frequency(&self, term: &str) -> u32 {
        self.postings(term).len() as u32
    }

    /// Raw count of `term` in `doc_id`, 0 when absent.
    pub fn term_frequency(&self, term: &str, doc_id: DocId) -> u32 {
        self.postings(term)
            .iter()
            .find(|p| p.doc_id == doc_id)
            .map_or(0, |p| p.freq)
    }

    /// Every term with a posting for `doc_id`. Scans the whole vocabulary.
    pub fn document_terms(&self, doc_id: DocId) -> Vec<&str> {
        self.postings
            .iter()
            .filter(|(_, plist)| plist.iter().any(|p| p.doc_id == doc_id))
            .map(|(term, _)| term.as_str())
            .collect()
    }

    pub fn doc_length(&self, doc_id: DocId) -> Option<u32> {
        self.doc_lengths.get(&doc_id).copied()
    }

    pub fn document(&self, doc_id: DocId) -> Option<&DocumentRecord> {
        self.documents.get(&doc_id)
    }

    /// Ids of every indexed document, ascending.
    pub fn document_ids(&self) -> Vec<DocId> {
        let mut ids: Vec<DocId> = self.doc_lengths.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn total_docs(&self) -> u32 {
        self.total_docs
    }

    pub fn num_terms(&self) -> usize {
        self.postings.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Feature selection: drop terms with `df < min_df` or `df / total_docs > max_df_ratio`.
    ///
    /// Document lengths and the document count are left as they were.
    pub fn prune(&mut self, min_df: usize, max_df_ratio: f64) -> usize {
        let total_docs = self.total_docs;
        let before = self.postings.len();
        self.postings.retain(|_, plist| {
            let df = plist.len();
            if df < min_df {
                return false;
            }
            !(total_docs > 0 && df as f64 / total_docs as f64 > max_df_ratio)
        });
        let removed = before - self.postings.len();
        self.generation = next_generation();
        tracing::debug!(min_df, max_df_ratio, removed, remaining = self.postings.len(), "pruned terms");
        removed
    }

    pub fn stats(&self) -> IndexStats {
        let total_len: u64 = self.doc_lengths.values().map(|&l| l as u64).sum();
        IndexStats {
            total_documents: self.total_docs,
            total_terms: self.postings.len(),
            avg_doc_length: total_len as f64 / self.total_docs.max(1) as f64,
        }
    }

    /// The `n` most widespread terms with their document frequency.
    pub fn top_terms_by_df(&self, n: usize) -> Vec<(&str, u32)> {
        let mut terms: Vec<(&str, u32)> = self
            .postings
            .iter()
            .map(|(term, plist)| (term.as_str(), plist.len() as u32))
            .collect();
        terms.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        terms.truncate(n);
        terms
    }
}

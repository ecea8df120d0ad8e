use crate::error::{Error, Result};
use crate::index::{DocumentRecord, InvertedIndex};
use crate::tokenizer::Normalizer;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Feature-selection thresholds applied once after all documents are indexed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Terms found in fewer documents are dropped.
    pub min_df: usize,
    /// Terms found in a larger share of the corpus are dropped.
    pub max_df_ratio: f64,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self { min_df: 2, max_df_ratio: 1.0 }
    }
}

impl BuildOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.max_df_ratio > 0.0 && self.max_df_ratio <= 1.0) {
            return Err(Error::InvalidOption("max_df_ratio must be in (0, 1]"));
        }
        Ok(())
    }
}

/// Index tokens for one document: title tokens twice, then content tokens.
pub fn document_tokens<N: Normalizer + ?Sized>(normalizer: &N, title: &str, content: &str) -> Vec<String> {
    let title_tokens = normalizer.normalize(title);
    let content_tokens = normalizer.normalize(content);
    let mut tokens = Vec::with_capacity(title_tokens.len() * 2 + content_tokens.len());
    tokens.extend_from_slice(&title_tokens);
    tokens.extend(title_tokens);
    tokens.extend(content_tokens);
    tokens
}

/// Batch-build an index from a whole corpus, then prune it.
pub fn build_index<N: Normalizer + ?Sized>(
    documents: Vec<DocumentRecord>,
    normalizer: &N,
    options: &BuildOptions,
) -> Result<InvertedIndex> {
    options.validate()?;

    let total = documents.len();
    let mut index = InvertedIndex::new();
    let start = Instant::now();
    tracing::info!(total, "indexing documents");

    for (i, doc) in documents.into_iter().enumerate() {
        let processed = i + 1;
        if processed == 1 || processed % 10 == 0 {
            let elapsed = start.elapsed().as_secs_f64();
            let remaining_s = elapsed / processed as f64 * (total - processed) as f64;
            tracing::info!(
                processed,
                total,
                percent = processed * 100 / total,
                remaining_s = format_args!("{remaining_s:.1}"),
                "progress"
            );
        }
        let tokens = document_tokens(normalizer, &doc.title, &doc.content);
        index.add_record(doc, &tokens)?;
    }

    let took = start.elapsed().as_secs_f64();
    tracing::info!(documents = total, took_s = format_args!("{took:.2}"), "documents indexed");

    let initial_terms = index.num_terms();
    let removed = index.prune(options.min_df, options.max_df_ratio);
    let reduction = if initial_terms == 0 { 0.0 } else { removed as f64 * 100.0 / initial_terms as f64 };
    tracing::info!(
        initial_terms,
        removed,
        final_terms = index.num_terms(),
        min_df = options.min_df,
        reduction_pct = format_args!("{reduction:.2}"),
        "feature selection"
    );

    let stats = index.stats();
    tracing::info!(
        total_documents = stats.total_documents,
        total_terms = stats.total_terms,
        avg_doc_length = format_args!("{:.2}", stats.avg_doc_length),
        "index ready"
    );
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ws(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    fn doc(id: u32, title: &str, content: &str) -> DocumentRecord {
        DocumentRecord { id, title: title.into(), content: content.into(), ..Default::default() }
    }

    #[test]
    fn title_tokens_are_counted_twice() {
        let tokens = document_tokens(&ws, "solar power", "power grid");
        assert_eq!(tokens, vec!["solar", "power", "solar", "power", "power", "grid"]);
    }

    #[test]
    fn title_weighting_changes_lengths_and_frequencies() {
        let idx = build_index(vec![doc(1, "ice melt", "ice sheet")], &ws, &BuildOptions { min_df: 1, max_df_ratio: 1.0 })
            .unwrap();
        assert_eq!(idx.doc_length(1), Some(6));
        assert_eq!(idx.term_frequency("ice", 1), 3);
        assert_eq!(idx.term_frequency("melt", 1), 2);
        assert_eq!(idx.term_frequency("sheet", 1), 1);
        assert_eq!(idx.document(1).unwrap().title, "ice melt");
    }

    #[test]
    fn build_prunes_with_min_df() {
        let docs = vec![doc(1, "", "global warming"), doc(2, "", "global energy"), doc(3, "", "energy")];
        let idx = build_index(docs, &ws, &BuildOptions::default()).unwrap();
        assert_eq!(idx.num_terms(), 2);
        assert_eq!(idx.document_frequency("warming"), 0);
        assert_eq!(idx.total_docs(), 3);
    }

    #[test]
    fn duplicate_ids_fail_the_build() {
        let docs = vec![doc(1, "", "a"), doc(1, "", "b")];
        let err = build_index(docs, &ws, &BuildOptions::default()).unwrap_err();
        assert_eq!(err, Error::DuplicateDocument(1));
    }

    #[test]
    fn invalid_ratio_is_rejected() {
        let opts = BuildOptions { min_df: 1, max_df_ratio: 0.0 };
        assert!(matches!(opts.validate(), Err(Error::InvalidOption(_))));
        assert!(build_index(Vec::new(), &ws, &BuildOptions::default()).unwrap().stats().total_documents == 0);
    }
}

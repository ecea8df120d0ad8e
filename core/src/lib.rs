//! Indexing, ranking and evaluation core for a small document retrieval system.
//!
//! The pieces, leaf first:
//! - [`index::InvertedIndex`]: term -> postings, document lengths and corpus counters
//! - [`weights::WeightCalculator`]: TF, cached IDF and sparse TF-IDF vectors
//! - [`search::SearchEngine`]: boolean and vector-space retrieval over a built index
//! - [`evaluate`]: precision/recall style metrics over ranked results
//!
//! Text normalization is supplied by the caller through [`tokenizer::Normalizer`];
//! [`tokenizer::TextNormalizer`] is the stock implementation.

pub mod builder;
pub mod error;
pub mod evaluate;
pub mod index;
pub mod persist;
pub mod search;
pub mod tokenizer;
pub mod weights;

pub use builder::{build_index, document_tokens, BuildOptions};
pub use error::{Error, Result};
pub use evaluate::{EvaluationRecord, QueryMetrics, SystemMetrics, TestQuery};
pub use index::{DocumentRecord, IndexStats, InvertedIndex, Posting};
pub use search::{BooleanOperator, SearchEngine, SearchHit, SearchMode};
pub use tokenizer::{Normalizer, NormalizerSettings, TextNormalizer};
pub use weights::{cosine_similarity, TfMode, WeightCalculator, WeightVector};

pub type DocId = u32;

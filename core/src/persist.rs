//! Snapshot directory layout:
//!
//! ```text
//! <root>/postings.bin     term -> [Posting]            (bincode)
//! <root>/docs.bin         doc_id -> DocumentRecord     (bincode)
//! <root>/doc_lengths.bin  doc_id -> token count        (bincode)
//! <root>/meta.json        MetaFile                     (json)
//! ```

use crate::builder::BuildOptions;
use crate::index::{DocumentRecord, InvertedIndex, Posting};
use crate::tokenizer::NormalizerSettings;
use crate::DocId;
use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub total_docs: u32,
    pub total_terms: usize,
    pub min_df: usize,
    pub max_df_ratio: f64,
    pub created_at: String,
    pub version: u32,
    /// Snapshots written before this field existed were built with the defaults.
    #[serde(default)]
    pub normalizer: NormalizerSettings,
}

impl MetaFile {
    pub fn new(index: &InvertedIndex, options: &BuildOptions, created_at: String) -> Self {
        Self {
            total_docs: index.total_docs(),
            total_terms: index.num_terms(),
            min_df: options.min_df,
            max_df_ratio: options.max_df_ratio,
            created_at,
            version: SNAPSHOT_VERSION,
            normalizer: NormalizerSettings::default(),
        }
    }

    pub fn with_normalizer(mut self, normalizer: NormalizerSettings) -> Self {
        self.normalizer = normalizer;
        self
    }
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn postings(&self) -> PathBuf { self.root.join("postings.bin") }
    fn docs(&self) -> PathBuf { self.root.join("docs.bin") }
    fn doc_lengths(&self) -> PathBuf { self.root.join("doc_lengths.bin") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }

    pub fn exists(&self) -> bool {
        self.meta().is_file()
    }
}

fn write_bincode<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let f = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut w = BufWriter::new(f);
    bincode::serialize_into(&mut w, value).with_context(|| format!("encoding {}", path.display()))?;
    w.flush()?;
    Ok(())
}

fn read_bincode<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    bincode::deserialize_from(BufReader::new(f)).with_context(|| format!("decoding {}", path.display()))
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let f = File::open(paths.meta()).with_context(|| format!("opening {}", paths.meta().display()))?;
    let meta: MetaFile = serde_json::from_reader(BufReader::new(f))?;
    Ok(meta)
}

/// Write every part of `index` under `paths.root`; `meta.json` goes last so a
/// directory with metadata always holds a complete snapshot.
pub fn save_index(paths: &IndexPaths, index: &InvertedIndex, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root).with_context(|| format!("creating {}", paths.root.display()))?;
    write_bincode(&paths.postings(), &index.postings)?;
    write_bincode(&paths.docs(), &index.documents)?;
    write_bincode(&paths.doc_lengths(), &index.doc_lengths)?;
    save_meta(paths, meta)?;
    tracing::info!(root = %paths.root.display(), total_docs = index.total_docs(), terms = index.num_terms(), "index saved");
    Ok(())
}

pub fn load_index(paths: &IndexPaths) -> Result<InvertedIndex> {
    load_snapshot(paths).map(|(index, _)| index)
}

/// Load the index together with the metadata it was saved with.
pub fn load_snapshot(paths: &IndexPaths) -> Result<(InvertedIndex, MetaFile)> {
    let meta = load_meta(paths)?;
    if meta.version != SNAPSHOT_VERSION {
        bail!("unsupported snapshot version {} in {}", meta.version, paths.root.display());
    }
    let postings: HashMap<String, Vec<Posting>> = read_bincode(&paths.postings())?;
    let documents: HashMap<DocId, DocumentRecord> = read_bincode(&paths.docs())?;
    let doc_lengths: HashMap<DocId, u32> = read_bincode(&paths.doc_lengths())?;

    if (doc_lengths.len() as u64) > meta.total_docs as u64 {
        bail!(
            "corrupt snapshot {}: {} document lengths but total_docs is {}",
            paths.root.display(),
            doc_lengths.len(),
            meta.total_docs
        );
    }
    if let Some((term, p)) = postings
        .iter()
        .find_map(|(term, plist)| plist.iter().find(|p| !doc_lengths.contains_key(&p.doc_id)).map(|p| (term, p)))
    {
        bail!(
            "corrupt snapshot {}: posting for {:?} references document {} with no length entry",
            paths.root.display(),
            term,
            p.doc_id
        );
    }

    tracing::info!(root = %paths.root.display(), total_docs = meta.total_docs, terms = postings.len(), "index loaded");
    let index = InvertedIndex::from_parts(postings, documents, doc_lengths, meta.total_docs);
    Ok((index, meta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_snapshot_fails() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path().join("nope"));
        assert!(!paths.exists());
        assert!(load_index(&paths).is_err());
    }

    #[test]
    fn normalizer_settings_survive_the_snapshot() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let mut idx = InvertedIndex::new();
        idx.add_document(1, &["warming"]).unwrap();
        let settings = NormalizerSettings { stem: false, stopwords: true };
        let meta = MetaFile::new(&idx, &BuildOptions::default(), String::new()).with_normalizer(settings);
        save_index(&paths, &idx, &meta).unwrap();

        let (loaded, loaded_meta) = load_snapshot(&paths).unwrap();
        assert_eq!(loaded.total_docs(), 1);
        assert_eq!(loaded_meta.normalizer, settings);
    }

    #[test]
    fn meta_without_normalizer_defaults_to_english() {
        let json = r#"{"total_docs":1,"total_terms":1,"min_df":2,"max_df_ratio":1.0,"created_at":"","version":1}"#;
        let meta: MetaFile = serde_json::from_str(json).unwrap();
        assert_eq!(meta.normalizer, NormalizerSettings::default());
    }

    #[test]
    fn corrupt_postings_file_fails() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let mut idx = InvertedIndex::new();
        idx.add_document(1, &["a", "b"]).unwrap();
        save_index(&paths, &idx, &MetaFile::new(&idx, &BuildOptions::default(), String::new())).unwrap();

        std::fs::write(dir.path().join("postings.bin"), b"\xff\xff").unwrap();
        let err = load_index(&paths).unwrap_err();
        assert!(format!("{err:#}").contains("postings.bin"));
    }

    #[test]
    fn dangling_posting_is_reported() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let mut idx = InvertedIndex::new();
        idx.add_document(1, &["a"]).unwrap();
        idx.postings.get_mut("a").unwrap().push(Posting { doc_id: 99, freq: 1 });
        save_index(&paths, &idx, &MetaFile::new(&idx, &BuildOptions::default(), String::new())).unwrap();

        let err = load_index(&paths).unwrap_err();
        assert!(err.to_string().contains("document 99"));
    }
}

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use docsearch_core::evaluate::{evaluate_query, evaluate_system};
use docsearch_core::persist::{load_index, load_snapshot, save_index, IndexPaths, MetaFile};
use docsearch_core::{build_index, BuildOptions, DocumentRecord, NormalizerSettings, SearchEngine, SearchMode, TestQuery, TextNormalizer, TfMode};
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct InputDoc {
    id: u32,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    category: String,
}

impl From<InputDoc> for DocumentRecord {
    fn from(d: InputDoc) -> Self {
        DocumentRecord { id: d.id, title: d.title, content: d.content, author: d.author, date: d.date, category: d.category }
    }
}

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build, query and evaluate a TF-IDF document index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Recorded in meta.json; query commands reuse what the snapshot was built with.
#[derive(Args, Debug, Clone, Copy)]
struct NormalizerArgs {
    /// Skip Snowball stemming
    #[arg(long, default_value_t = false)]
    no_stem: bool,
    /// Keep English stopwords
    #[arg(long, default_value_t = false)]
    keep_stopwords: bool,
}

impl From<NormalizerArgs> for NormalizerSettings {
    fn from(args: NormalizerArgs) -> Self {
        NormalizerSettings { stem: !args.no_stem, stopwords: !args.keep_stopwords }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from a JSON/JSONL file or a directory of them
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long)]
        output: String,
        /// Drop terms found in fewer documents
        #[arg(long, default_value_t = 2)]
        min_df: usize,
        /// Drop terms found in a larger share of documents
        #[arg(long, default_value_t = 1.0)]
        max_df_ratio: f64,
        #[command(flatten)]
        norm: NormalizerArgs,
    },
    /// Print index statistics
    Stats {
        #[arg(long, default_value = "./index")]
        index: String,
    },
    /// List the most widespread terms
    Inspect {
        #[arg(long, default_value = "./index")]
        index: String,
        #[arg(long, default_value_t = 20)]
        top: usize,
    },
    /// Run one query
    Search {
        #[arg(long, default_value = "./index")]
        index: String,
        #[arg(long)]
        query: String,
        /// vector, boolean_and or boolean_or
        #[arg(long, default_value = "vector")]
        mode: SearchMode,
        #[arg(long, default_value_t = 10)]
        k: usize,
        /// normalized, log or raw
        #[arg(long, default_value = "normalized")]
        tf_mode: TfMode,
    },
    /// Documents similar to a given document
    Related {
        #[arg(long, default_value = "./index")]
        index: String,
        #[arg(long)]
        doc_id: u32,
        #[arg(long, default_value_t = 5)]
        k: usize,
    },
    /// Highest TF-IDF terms of a document
    Keywords {
        #[arg(long, default_value = "./index")]
        index: String,
        #[arg(long)]
        doc_id: u32,
        #[arg(long, default_value_t = 10)]
        k: usize,
    },
    /// Score the engine against judged test queries ([{query, relevant: [ids]}])
    Evaluate {
        #[arg(long, default_value = "./index")]
        index: String,
        #[arg(long)]
        queries: String,
        #[arg(long, default_value = "vector")]
        mode: SearchMode,
        #[arg(long, default_value_t = 10)]
        k: usize,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, min_df, max_df_ratio, norm } => {
            build(&input, &output, BuildOptions { min_df, max_df_ratio }, norm)
        }
        Commands::Stats { index } => {
            let (idx, meta) = load_snapshot(&IndexPaths::new(&index))?;
            let stats = idx.stats();
            println!("{}", serde_json::to_string_pretty(&stats)?);
            println!(
                "built {} (min_df={}, max_df_ratio={}, stem={}, stopwords={})",
                meta.created_at, meta.min_df, meta.max_df_ratio, meta.normalizer.stem, meta.normalizer.stopwords
            );
            Ok(())
        }
        Commands::Inspect { index, top } => {
            let idx = load_index(&IndexPaths::new(&index))?;
            println!("{} unique terms", idx.num_terms());
            for (term, df) in idx.top_terms_by_df(top) {
                let sample: Vec<String> = idx
                    .postings(term)
                    .iter()
                    .take(5)
                    .map(|p| format!("({}, {})", p.doc_id, p.freq))
                    .collect();
                println!("{term:<20} : {df} docs -> [{}]", sample.join(", "));
            }
            Ok(())
        }
        Commands::Search { index, query, mode, k, tf_mode } => {
            let (engine, normalizer) = open_engine(&index, tf_mode)?;
            let hits = engine.search(&query, &normalizer, mode, k);
            println!("{} result(s) for {query:?} ({mode})", hits.len());
            for (rank, hit) in hits.iter().enumerate() {
                println!("{}. [{}] {}  score={:.4}  category={}", rank + 1, hit.doc_id, hit.title, hit.score, hit.category);
            }
            Ok(())
        }
        Commands::Related { index, doc_id, k } => {
            let (engine, _) = open_engine(&index, TfMode::default())?;
            let Some(reference) = engine.document(doc_id) else {
                bail!("document {doc_id} is not in the index");
            };
            println!("reference [{doc_id}] {}", reference.title);
            for (rank, hit) in engine.related_documents(doc_id, k).iter().enumerate() {
                println!("{}. [{}] {}  similarity={:.4}", rank + 1, hit.doc_id, hit.title, hit.score);
            }
            Ok(())
        }
        Commands::Keywords { index, doc_id, k } => {
            let (engine, _) = open_engine(&index, TfMode::default())?;
            for (term, weight) in engine.keywords(doc_id, k) {
                println!("{term:<20} {weight:.4}");
            }
            Ok(())
        }
        Commands::Evaluate { index, queries, mode, k } => evaluate(&index, &queries, mode, k),
    }
}

/// Engine over the snapshot plus the normalizer recorded in its meta.json.
fn open_engine(index: &str, tf_mode: TfMode) -> Result<(SearchEngine, TextNormalizer)> {
    let (idx, meta) = load_snapshot(&IndexPaths::new(index)).with_context(|| format!("loading index from {index}"))?;
    Ok((SearchEngine::new(idx, tf_mode), meta.normalizer.normalizer()))
}

fn build(input: &str, output: &str, options: BuildOptions, norm: NormalizerArgs) -> Result<()> {
    let input_path = Path::new(input);
    let mut files: Vec<PathBuf> = Vec::new();
    if input_path.is_dir() {
        for entry in WalkDir::new(input_path).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
        files.sort();
    } else if input_path.is_file() {
        files.push(input_path.to_path_buf());
    } else {
        bail!("{input} is neither a file nor a directory");
    }

    let mut docs: Vec<DocumentRecord> = Vec::new();
    for file in files {
        let before = docs.len();
        let result = if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            read_jsonl(&file, &mut docs)
        } else {
            read_json(&file, &mut docs)
        };
        match result {
            Ok(()) => tracing::info!(file = %file.display(), documents = docs.len() - before, "loaded documents"),
            Err(err) if input_path.is_dir() => {
                docs.truncate(before);
                tracing::warn!(file = %file.display(), error = %err, "skipping unreadable input");
            }
            Err(err) => return Err(err),
        }
    }
    if let Some(bad) = docs.iter().find(|d| d.id == 0) {
        bail!("document ids must be positive (got 0 for {:?})", bad.title);
    }

    let settings = NormalizerSettings::from(norm);
    let index = build_index(docs, &settings.normalizer(), &options)?;

    let created_at = time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "".into());
    let paths = IndexPaths::new(output);
    save_index(&paths, &index, &MetaFile::new(&index, &options, created_at).with_normalizer(settings))?;

    tracing::info!(output, "index build complete");
    Ok(())
}

fn read_jsonl(file: &Path, docs: &mut Vec<DocumentRecord>) -> Result<()> {
    let f = File::open(file)?;
    let reader = BufReader::new(f);
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: InputDoc = serde_json::from_str(&line).with_context(|| format!("{}:{}", file.display(), n + 1))?;
        docs.push(doc.into());
    }
    Ok(())
}

fn read_json(file: &Path, docs: &mut Vec<DocumentRecord>) -> Result<()> {
    let f = File::open(file)?;
    let reader = BufReader::new(f);
    let json: serde_json::Value = serde_json::from_reader(reader).with_context(|| format!("parsing {}", file.display()))?;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                let doc: InputDoc = serde_json::from_value(v)?;
                docs.push(doc.into());
            }
        }
        serde_json::Value::Object(_) => {
            let doc: InputDoc = serde_json::from_value(json)?;
            docs.push(doc.into());
        }
        _ => bail!("{}: expected a document object or an array of them", file.display()),
    }
    Ok(())
}

fn evaluate(index: &str, queries: &str, mode: SearchMode, k: usize) -> Result<()> {
    let (engine, normalizer) = open_engine(index, TfMode::default())?;
    let f = File::open(queries).with_context(|| format!("opening {queries}"))?;
    let test_queries: Vec<TestQuery> = serde_json::from_reader(BufReader::new(f))?;

    let records = engine.evaluation_records(&normalizer, &test_queries, mode, k);
    let system = evaluate_system(&records, k)?;
    println!("{}", serde_json::to_string_pretty(&system.to_map())?);

    for (i, record) in records.iter().enumerate() {
        let m = evaluate_query(&record.retrieved, &record.relevant, k);
        println!(
            "query {}: {:?}\n  retrieved: {:?}\n  precision: {:.4}  recall: {:.4}  f1: {:.4}",
            i + 1,
            record.query,
            record.retrieved,
            m.precision,
            m.recall,
            m.f1
        );
    }
    Ok(())
}

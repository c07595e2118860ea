use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use searchcore::persist::SledIndex;
use searchcore::{
    AcquisitionError, BatchReport, DocumentStore, IngestError, Pipeline, PostingStore, Ranker, RawDocument,
};
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Accepts crawler output as well as `{title, body, url}` records.
#[derive(Debug, Deserialize)]
struct InputDoc {
    title: String,
    #[serde(alias = "body")]
    content: String,
    #[serde(alias = "url")]
    link: String,
}

impl From<InputDoc> for RawDocument {
    fn from(doc: InputDoc) -> Self {
        RawDocument { title: doc.title, link: doc.link, content: doc.content }
    }
}

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Ingest plain-text documents into the search index and query it", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest documents from JSON/JSONL files or a directory of them
    Ingest {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Index database directory
        #[arg(long, default_value = "./data")]
        db: String,
    },
    /// Rank indexed documents against a keyword query
    Search {
        #[arg(long, default_value = "./data")]
        db: String,
        #[arg(long)]
        query: String,
        /// Show at most this many results
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest { input, db } => {
            let report = ingest_path(Path::new(&input), &db)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.ingested.is_empty() && !report.failures.is_empty() {
                bail!("no documents ingested");
            }
            Ok(())
        }
        Commands::Search { db, query, limit } => search(&db, &query, limit),
    }
}

fn open(db: &str) -> Result<(SledIndex, Arc<dyn DocumentStore>, Arc<dyn PostingStore>)> {
    let index = SledIndex::open(db)?;
    let docs: Arc<dyn DocumentStore> = Arc::new(index.documents()?);
    let postings: Arc<dyn PostingStore> = Arc::new(index.postings()?);
    Ok((index, docs, postings))
}

fn ingest_path(input: &Path, db: &str) -> Result<BatchReport> {
    let (index, docs, postings) = open(db)?;
    let pipeline = Pipeline::new(docs.clone(), postings.clone());

    let files = input_files(input);
    if files.is_empty() {
        bail!("no .json or .jsonl files under {}", input.display());
    }

    let mut report = BatchReport::default();
    for file in files {
        let records = if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            read_jsonl(&file)
        } else {
            read_json(&file)
        };
        for record in records {
            let attempt = report.requested;
            report.requested += 1;
            let result = record
                .map_err(|msg| IngestError::Acquisition(AcquisitionError::Extract(format!("{}: {msg}", file.display()))))
                .and_then(|doc| pipeline.ingest(doc.into()));
            if let Err(err) = &result {
                tracing::warn!(attempt, error = %err, "record skipped");
            }
            report.record(attempt, result);
        }
    }
    index.flush()?;

    tracing::info!(
        ingested = report.ingested.len(),
        failed = report.failures.len(),
        num_docs = docs.len()?,
        num_terms = postings.token_count()?,
        "ingest complete"
    );
    Ok(report)
}

fn input_files(input: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    }
    files
}

/// One entry per record; a file that cannot be read yields a single error entry.
type Records = Vec<Result<InputDoc, String>>;

fn read_jsonl(file: &Path) -> Records {
    let f = match File::open(file) {
        Ok(f) => f,
        Err(e) => return vec![Err(e.to_string())],
    };
    let mut docs = Vec::new();
    for (n, line) in BufReader::new(f).lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                docs.push(Err(format!("line {}: {e}", n + 1)));
                break;
            }
        };
        if line.trim().is_empty() { continue; }
        docs.push(serde_json::from_str(&line).map_err(|e| format!("line {}: {e}", n + 1)));
    }
    docs
}

fn read_json(file: &Path) -> Records {
    let json: serde_json::Value = match File::open(file)
        .map_err(|e| e.to_string())
        .and_then(|f| serde_json::from_reader(BufReader::new(f)).map_err(|e| e.to_string()))
    {
        Ok(json) => json,
        Err(e) => return vec![Err(e)],
    };
    match json {
        serde_json::Value::Array(arr) => arr
            .into_iter()
            .enumerate()
            .map(|(i, v)| serde_json::from_value(v).map_err(|e| format!("element {i}: {e}")))
            .collect(),
        serde_json::Value::Object(_) => vec![serde_json::from_value(json).map_err(|e| e.to_string())],
        other => vec![Err(format!("expected an object or an array of objects, found {other}"))],
    }
}

fn search(db: &str, query: &str, limit: Option<usize>) -> Result<()> {
    let (_index, docs, postings) = open(db)?;
    let ranker = Ranker::new(docs, postings);
    let mut results = ranker.rank(query)?;
    if let Some(k) = limit {
        results.truncate(k);
    }
    for entry in &results {
        println!("{:>4}  #{:<6} {}  <{}>", entry.score, entry.document.id, entry.document.title, entry.document.link);
    }
    tracing::info!(hits = results.len(), "search complete");
    Ok(())
}

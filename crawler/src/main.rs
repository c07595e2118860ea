use anyhow::{bail, Result};
use clap::Parser;
use crawler::{SourceConfig, WikiSource, DEFAULT_SOURCE_URL, DEFAULT_USER_AGENT};
use searchcore::Acquire;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "crawler")]
#[command(about = "Fetch random articles as plain-text JSONL")]
struct Cli {
    /// Number of documents to write
    #[arg(long, default_value_t = 200)]
    count: usize,
    /// Output JSONL file path
    #[arg(long, default_value = "./sample_data/articles.jsonl")]
    output: String,
    /// URL serving a different article on every request
    #[arg(long, default_value = DEFAULT_SOURCE_URL)]
    source_url: String,
    /// User-Agent string sent with every request
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    user_agent: String,
    /// Request timeout seconds
    #[arg(long, default_value_t = 12)]
    timeout_secs: u64,
    /// Give up after this many consecutive failed or duplicate fetches
    #[arg(long, default_value_t = 20)]
    max_misses: usize,
}

#[derive(Serialize)]
struct OutDoc<'a> {
    title: &'a str,
    link: &'a str,
    content: &'a str,
    fetched_at: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Cli::parse();
    if let Some(dir) = std::path::Path::new(&args.output).parent() {
        fs::create_dir_all(dir)?;
    }

    let source = WikiSource::new(SourceConfig {
        url: args.source_url.clone(),
        user_agent: args.user_agent.clone(),
        timeout: Duration::from_secs(args.timeout_secs),
    })?;
    tracing::info!(count = args.count, source = %args.source_url, output = %args.output, "crawler starting");

    let mut out = BufWriter::new(File::create(&args.output)?);
    let mut seen: HashSet<String> = HashSet::new();
    let mut emitted = 0usize;
    let mut misses = 0usize;

    while emitted < args.count {
        if misses >= args.max_misses {
            bail!("giving up after {misses} consecutive misses ({emitted} documents written)");
        }
        let doc = match source.acquire().await {
            Ok(doc) => doc,
            Err(err) => {
                tracing::warn!(error = %err, "fetch failed");
                misses += 1;
                continue;
            }
        };
        if !seen.insert(doc.link.clone()) {
            misses += 1;
            continue;
        }
        misses = 0;

        let rec = OutDoc {
            title: &doc.title,
            link: &doc.link,
            content: &doc.content,
            fetched_at: time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        };
        serde_json::to_writer(&mut out, &rec)?;
        out.write_all(b"\n")?;
        emitted += 1;
        if emitted % 100 == 0 {
            tracing::info!(emitted, "progress");
        }
    }
    out.flush()?;

    tracing::info!(emitted, output = %args.output, "done");
    Ok(())
}

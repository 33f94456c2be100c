//! zipsa: index the pet-care knowledge base and query it from the shell.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use zipsa_core::config::Config;
use zipsa_core::loader::DocumentLoader;
use zipsa_core::types::{RankedResult, SearchMode, SearchRequest};
use zipsa_core::NumericConstraint;
use zipsa_hybrid::{load_tokenizer, open_store};

#[derive(Parser)]
#[command(name = "zipsa")]
#[command(about = "Hybrid keyword and vector retrieval over the pet-care knowledge base")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index a .jsonl file or a directory of them into both stores
    Index {
        path: PathBuf,

        /// Stop after this many documents
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Run a query
    Search {
        query: String,

        /// Restrict to one specialist ("General" means no restriction)
        #[arg(short, long)]
        specialist: Option<String>,

        #[arg(long)]
        category: Option<String>,

        /// Numeric trait filter, e.g. `hypoallergenic=eq:1` or `energy_level=2..4`
        #[arg(short = 't', long = "trait", value_parser = parse_trait)]
        traits: Vec<(String, NumericConstraint)>,

        /// Number of results (defaults to retrieval.default_limit)
        #[arg(short, long)]
        limit: Option<usize>,

        #[arg(short, long, value_enum, default_value_t = Mode::Hybrid)]
        mode: Mode,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show how a text is segmented and which keywords it yields
    Tokenize { text: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Hybrid,
    Vector,
    Keyword,
}

impl From<Mode> for SearchMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Hybrid => SearchMode::Hybrid,
            Mode::Vector => SearchMode::VectorOnly,
            Mode::Keyword => SearchMode::KeywordOnly,
        }
    }
}

fn parse_trait(s: &str) -> std::result::Result<(String, NumericConstraint), String> {
    let (name, constraint) = s.split_once('=').ok_or_else(|| format!("expected name=constraint, got '{s}'"))?;
    let constraint = constraint.parse::<NumericConstraint>().map_err(|e| e.to_string())?;
    Ok((name.trim().to_string(), constraint))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load_from(&cli.config).with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Command::Index { path, limit } => index(&config, &path, limit).await,
        Command::Search { query, specialist, category, traits, limit, mode, json } => {
            let default_limit = config.app()?.retrieval.default_limit;
            let mut request = SearchRequest::new(query, limit.unwrap_or(default_limit)).mode(mode.into());
            if let Some(s) = specialist { request = request.specialist(s); }
            if let Some(c) = category { request = request.category(c); }
            for (name, constraint) in traits { request = request.numeric(name, constraint); }
            search(&config, &request, json).await
        }
        Command::Tokenize { text } => {
            let tokenizer = load_tokenizer(&config)?;
            for m in tokenizer.segment(&text) {
                println!("{}\t{:?}", m.form, m.tag);
            }
            println!("=> {}", tokenizer.tokenize(&text));
            Ok(())
        }
    }
}

async fn index(config: &Config, path: &std::path::Path, limit: Option<usize>) -> Result<()> {
    let loader = limit.map_or_else(DocumentLoader::new, DocumentLoader::with_limit);
    let report = loader.load(path)?;
    if report.documents.is_empty() {
        println!("No documents found under {}", path.display());
        return Ok(());
    }
    let store = open_store(config).await?;

    let pb = ProgressBar::new(report.documents.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("=>-"),
    );
    let written = store.index_documents(report.documents, |n| pb.inc(n as u64)).await?;
    pb.finish_and_clear();

    info!(written, files = report.files, skipped = report.skipped, "index finished");
    println!("Indexed {written} documents from {} files ({} skipped)", report.files, report.skipped);
    Ok(())
}

async fn search(config: &Config, request: &SearchRequest, json: bool) -> Result<()> {
    let store = open_store(config).await?;
    let retriever = store.retriever()?;
    let results = retriever.search(request).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_results(&request.text, &results);
    }
    Ok(())
}

fn print_results(query: &str, results: &[RankedResult]) {
    println!("{} results for \"{query}\"", results.len());
    for (i, r) in results.iter().enumerate() {
        let doc = &r.document;
        let specialists: Vec<&str> = doc.specialists.iter().map(String::as_str).collect();
        println!("\n  {}. [{}] score={:.5}  id={}  specialists={}", i + 1, r.score_type.as_str(), r.fusion_score, doc.id, specialists.join(","));
        if let Some(title) = &doc.title {
            println!("     {title}");
        }
        let snippet: String = doc.raw_text.chars().take(160).collect();
        println!("     {snippet}");
    }
}

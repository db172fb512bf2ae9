//! docent CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use docent::{
    agent::Agent,
    config::Config,
    embed::{Embedder, OllamaEmbedder},
    error::Result,
    generate::OllamaGenerator,
    index::{print_index_stats, HashRecord, IndexManager},
    memory::{CorrectionStore, FeedbackLog, FeedbackRating},
    ollama::OllamaClient,
    parse::parse_document,
    progress::LogWriterFactory,
    retrieve::Retriever,
    store::{QdrantStore, VectorStore},
};
use std::collections::BTreeSet;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docent")]
#[command(version, about = "Local question answering over a curated document corpus", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize docent configuration and data directories
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Index the raw corpus into the vector database
    Index {
        /// Rebuild from scratch instead of updating incrementally
        #[arg(long)]
        full: bool,
    },

    /// Ask a single question
    Ask {
        /// The question
        question: String,

        /// Restrict retrieval to one category
        #[arg(long)]
        category: Option<String>,
    },

    /// Interactive chat session
    Chat {
        /// Restrict retrieval to one category
        #[arg(long)]
        category: Option<String>,
    },

    /// Show corpus and memory status
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory::default()))
        .with(filter)
        .init();

    // Init works without an existing config
    if let Commands::Init { force } = cli.command {
        return handle_init(cli.config.as_deref(), force);
    }

    // Completions need neither config nor services
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "docent", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Index { full } => {
            let client = Arc::new(OllamaClient::new(&config)?);
            let embedder: Arc<dyn Embedder> = Arc::new(OllamaEmbedder::new(client, &config));
            let store: Arc<dyn VectorStore> = Arc::new(QdrantStore::connect(&config)?);
            let manager = IndexManager::new(embedder, store, &config);

            let stats = if full {
                manager.build_full().await?
            } else {
                manager.update_incremental().await?
            };

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_index_stats(&stats);
            }
        }

        Commands::Ask { question, category } => {
            let mut agent = build_agent(&config).await?;
            agent.set_category_filter(category);

            let response = agent.ask(&question).await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("\n{}\n", response.answer);
                println!("Confidence: {:.0}%", response.confidence * 100.0);
                if response.corrected {
                    println!("(answer informed by validated feedback)");
                }
            }
        }

        Commands::Chat { category } => {
            let mut agent = build_agent(&config).await?;
            agent.set_category_filter(category);
            run_chat(&mut agent).await?;
        }

        Commands::Status => {
            handle_status(&config, cli.json).await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Config::load_from(None),
    }
}

fn handle_init(path: Option<&Path>, force: bool) -> Result<()> {
    let mut config = Config::load_from(None)?;
    if let Some(path) = path {
        config.paths.config_file = path.to_path_buf();
    }

    if config.paths.config_file.exists() && !force {
        println!(
            "Config already exists: {} (use --force to overwrite)",
            config.paths.config_file.display()
        );
        return Ok(());
    }

    config.ensure_dirs()?;
    config.save()?;

    println!("Initialized docent at {}", config.paths.base_dir.display());
    println!("  Config:      {}", config.paths.config_file.display());
    println!("  Raw corpus:  {}", config.paths.raw_dir.display());
    println!("\nDrop crawled documents into the raw corpus directory, then run: docent index");
    Ok(())
}

async fn build_agent(config: &Config) -> Result<Agent> {
    let client = Arc::new(OllamaClient::new(config)?);
    let embedder: Arc<dyn Embedder> = Arc::new(OllamaEmbedder::new(client.clone(), config));
    let store: Arc<dyn VectorStore> = Arc::new(QdrantStore::connect(config)?);
    let generator = OllamaGenerator::new(client, config);

    // The generator is the one dependency docent cannot answer without.
    generator.verify().await?;

    let retriever = Retriever::new(embedder.clone(), store);
    let corrections = CorrectionStore::load(&config.paths.corrections_file);
    let feedback = FeedbackLog::new(&config.paths.feedback_file);

    Ok(Agent::new(
        Box::new(retriever),
        Box::new(generator),
        embedder,
        corrections,
        feedback,
        config.query.top_k,
    ))
}

async fn handle_status(config: &Config, json: bool) -> Result<()> {
    let store = QdrantStore::connect(config)?;
    let total_chunks = store.count().await?;

    let record = HashRecord::load(&config.paths.hashes_file);
    let corrections = CorrectionStore::load(&config.paths.corrections_file);
    let feedback_entries = FeedbackLog::new(&config.paths.feedback_file).read_all().len();

    let last_indexed = std::fs::metadata(&config.paths.hashes_file)
        .and_then(|m| m.modified())
        .ok()
        .map(|t| chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339());

    let mut by_category = Vec::new();
    for category in corpus_categories(&config.paths.raw_dir) {
        let count = store.count_by_category(&category).await?;
        by_category.push((category, count));
    }

    if json {
        let value = serde_json::json!({
            "documents_indexed": record.len(),
            "chunks": total_chunks,
            "chunks_by_category": by_category
                .iter()
                .map(|(c, n)| (c.clone(), n))
                .collect::<std::collections::BTreeMap<_, _>>(),
            "corrections": corrections.count(),
            "feedback_entries": feedback_entries,
            "last_indexed": last_indexed,
            "collection": config.collection_name,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("\n📚 docent status\n");
    println!("Collection: {} ({})", config.collection_name, config.qdrant_url);
    println!("Documents indexed: {}", record.len());
    println!("Chunks stored: {total_chunks}");
    for (category, count) in &by_category {
        println!("  {category}: {count}");
    }
    println!("Corrections stored: {}", corrections.count());
    println!("Feedback entries: {}", feedback_entries);
    match last_indexed {
        Some(when) => println!("Last index run: {when}"),
        None => println!("Last index run: never"),
    }
    Ok(())
}

/// Distinct categories declared in the raw corpus headers.
fn corpus_categories(raw_dir: &Path) -> BTreeSet<String> {
    let mut categories = BTreeSet::new();
    for entry in walkdir::WalkDir::new(raw_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        if let Ok(content) = std::fs::read_to_string(entry.path()) {
            let (meta, _) = parse_document(&content);
            if !meta.category.is_empty() {
                categories.insert(meta.category);
            }
        }
    }
    categories
}

const CHAT_HELP: &str = "\
Commands:
  /feedback +              validate the last answer
  /feedback - [correction] reject the last answer, optionally with better text
  /filter [category]       set or clear the category filter
  /clear                   forget the conversation so far
  /help                    show this help
  /quit                    leave the chat";

async fn run_chat(agent: &mut Agent) -> Result<()> {
    println!("docent chat - ask a question, or /help for commands\n");

    let stdin = std::io::stdin();
    let mut last_turn: Option<(String, String)> = None;

    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix('/') {
            let (command, arg) = match rest.split_once(char::is_whitespace) {
                Some((c, a)) => (c, a.trim()),
                None => (rest, ""),
            };

            match command {
                "quit" | "exit" => break,
                "help" => println!("{CHAT_HELP}"),
                "clear" => {
                    agent.clear_history();
                    println!("History cleared.");
                }
                "filter" => {
                    if arg.is_empty() {
                        agent.set_category_filter(None);
                        println!("Category filter cleared.");
                    } else {
                        agent.set_category_filter(Some(arg.to_string()));
                        println!("Retrieval restricted to category: {arg}");
                    }
                }
                "feedback" => {
                    let Some((question, answer)) = &last_turn else {
                        println!("Nothing to rate yet.");
                        continue;
                    };
                    let (rating, correction) = if arg == "+" {
                        (FeedbackRating::Positive, None)
                    } else if let Some(text) = arg.strip_prefix('-') {
                        (FeedbackRating::Negative, Some(text.trim()))
                    } else {
                        println!("Usage: /feedback + or /feedback - [correction]");
                        continue;
                    };
                    agent
                        .record_feedback(question, answer, rating, correction)
                        .await?;
                    println!("Feedback recorded. Thank you.");
                }
                _ => println!("Unknown command: /{command} (try /help)"),
            }
            continue;
        }

        let response = agent.ask(line).await;
        println!("\n{}\n", response.answer);
        print!("[confidence {:.0}%", response.confidence * 100.0);
        if response.corrected {
            print!(", informed by validated feedback");
        }
        println!("]\n");

        last_turn = Some((response.question, response.answer));
    }

    println!("Goodbye.");
    Ok(())
}

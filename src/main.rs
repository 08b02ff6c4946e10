use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use shopbot::assistant::ollama::OllamaChatModel;
use shopbot::assistant::{AssistantReply, ChatHistory, SalesAssistant, GREETING};
use shopbot::catalog::{Catalog, CatalogItem};
use shopbot::config::Config;
use shopbot::encoding::dense::FastEmbedEncoder;
use shopbot::encoding::sparse::SparseEncoder;
use shopbot::errors::ShopbotError;
use shopbot::index::postgres::PgVectorIndex;
use shopbot::logging;
use shopbot::search::{Query, RankedHit, Retriever, RetrieverOptions};

#[derive(Parser)]
#[command(name = "shopbot", version, about = "Hybrid catalog search and shopping assistant")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short, default_value = "shopbot.toml")]
    config: PathBuf,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a hybrid search and print the ranked catalog items
    Search {
        /// Free-text query
        text: String,
        /// Maximum number of results (default: search.limit)
        #[arg(long)]
        limit: Option<usize>,
        /// Weight of the lexical (BM25) scores (default: search.sparse_weight)
        #[arg(long)]
        sparse_weight: Option<f32>,
        /// Weight of the semantic (embedding) scores (default: search.dense_weight)
        #[arg(long)]
        dense_weight: Option<f32>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Answer a single question with retrieval plus the chat model
    Ask {
        question: String,
    },
    /// Interactive conversation on stdin/stdout
    Chat,
    /// Verify that the catalog loads and the vector index is ready
    Check,
}

/// Long-lived resources, built once at startup and shared by every request.
struct AppContext {
    config: Config,
    retriever: Retriever,
}

impl AppContext {
    async fn build(config: Config) -> Result<Self> {
        let catalog = Arc::new(
            Catalog::from_csv(&config.catalog.path, &config.catalog)
                .context("Failed to load catalog")?,
        );

        let sparse = Arc::new(
            SparseEncoder::fit(&catalog.descriptions(), &config.sparse)
                .context("Failed to fit sparse encoder")?,
        );

        let dense = Arc::new(
            FastEmbedEncoder::new(&config.dense)
                .await
                .context("Failed to load dense encoder")?,
        );

        let index = Arc::new(
            PgVectorIndex::connect(&config.index)
                .await
                .context("Failed to connect to vector index")?,
        );

        let retriever = Retriever::new(
            catalog,
            sparse,
            dense,
            index,
            RetrieverOptions {
                metric: config.index.metric,
                normalization: config.search.score_normalization,
            },
        );

        Ok(AppContext { config, retriever })
    }

    /// Search with the configured timeout applied around the whole retrieval.
    async fn search(&self, query: &Query) -> Result<Vec<(CatalogItem, RankedHit)>, ShopbotError> {
        let secs = self.config.search.timeout_secs;
        tokio::time::timeout(Duration::from_secs(secs), self.retriever.search_ranked(query))
            .await
            .map_err(|_| ShopbotError::Timeout(format!("search did not finish within {}s", secs)))?
    }

    /// One retrieve-then-respond turn. Retrieval failures degrade to the fallback reply.
    async fn turn(
        &self,
        assistant: &SalesAssistant,
        question: &str,
        history: &ChatHistory,
    ) -> AssistantReply {
        let query = Query::from_config(question, &self.config.search);
        match self.search(&query).await {
            Ok(hits) => {
                let items: Vec<CatalogItem> = hits.into_iter().map(|(item, _)| item).collect();
                assistant.respond(question, &items, history).await
            }
            Err(e) => {
                tracing::warn!(error = %e, "Retrieval failed, using fallback reply");
                AssistantReply::fallback()
            }
        }
    }
}

#[derive(Serialize)]
struct SearchOutput<'a> {
    rank: usize,
    #[serde(flatten)]
    item: &'a CatalogItem,
    fused_score: f32,
    sparse_score: Option<f32>,
    dense_score: Option<f32>,
}

fn print_results(hits: &[(CatalogItem, RankedHit)], json: bool) -> Result<()> {
    if json {
        let output: Vec<SearchOutput<'_>> = hits
            .iter()
            .enumerate()
            .map(|(i, (item, hit))| SearchOutput {
                rank: i + 1,
                item,
                fused_score: hit.fused_score,
                sparse_score: hit.sparse_score,
                dense_score: hit.dense_score,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No matching products.");
        return Ok(());
    }
    for (i, (item, hit)) in hits.iter().enumerate() {
        println!("{:>2}. {:<16} {:>8.4}  {}", i + 1, item.sku, hit.fused_score, item.description);
    }
    Ok(())
}

async fn run_chat(ctx: &AppContext, assistant: &SalesAssistant) -> Result<()> {
    let mut history = ChatHistory::new();
    println!("{}", GREETING);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        let reply = ctx.turn(assistant, question, &history).await;
        history.push_user(question);
        history.push_assistant(serde_json::to_string(&reply)?);

        println!("{}", reply.message);
        for sku in &reply.sku {
            match ctx.retriever.catalog().get(sku) {
                Some(item) => println!("  - {}: {}", item.sku, item.description),
                None => println!("  - {}", sku),
            }
        }
    }

    tracing::info!(turns = history.turns().len(), "Chat session ended");
    Ok(())
}

async fn run_check(config: &Config) -> Result<()> {
    let catalog = Catalog::from_csv(&config.catalog.path, &config.catalog)
        .context("Catalog check failed")?;
    println!("catalog: ok ({} items)", catalog.len());

    let index = PgVectorIndex::connect(&config.index)
        .await
        .context("Vector index check failed")?;
    println!("index: ok (collection '{}')", index.collection());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args
    let cli = Cli::parse();

    // 2. Load configuration
    let config = Config::load_from(&cli.config).unwrap_or_else(|e| {
        eprintln!("Config error (using defaults): {}", e);
        Config::default()
    });

    // 3. Initialize logging before anything else can log
    logging::init_logging(&config, cli.verbose);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "shopbot starting");

    match cli.command {
        Commands::Check => run_check(&config).await?,

        Commands::Search {
            text,
            limit,
            sparse_weight,
            dense_weight,
            json,
        } => {
            let ctx = AppContext::build(config).await?;
            let defaults = Query::from_config(text, &ctx.config.search);
            let query = defaults
                .clone()
                .with_weights(
                    sparse_weight.unwrap_or(defaults.sparse_weight),
                    dense_weight.unwrap_or(defaults.dense_weight),
                )
                .with_limit(limit.unwrap_or(defaults.limit));
            let hits = ctx.search(&query).await?;
            print_results(&hits, json)?;
        }

        Commands::Ask { question } => {
            let ctx = AppContext::build(config).await?;
            let assistant = SalesAssistant::new(Arc::new(OllamaChatModel::new(&ctx.config.assistant)?));
            let reply = ctx.turn(&assistant, &question, &ChatHistory::new()).await;
            println!("{}", serde_json::to_string_pretty(&reply)?);
        }

        Commands::Chat => {
            let ctx = AppContext::build(config).await?;
            let assistant = SalesAssistant::new(Arc::new(OllamaChatModel::new(&ctx.config.assistant)?));
            run_chat(&ctx, &assistant).await?;
        }
    }

    Ok(())
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use docrag::core::config::{AppPaths, ConfigService};
use docrag::core::logging;
use docrag::rag::context_builder::sources;
use docrag::rag::{load_documents, render_context, snapshot, QueryStatus, RetrievalService};

#[derive(Debug, Parser)]
#[command(name = "docrag", version, about = "Index documents and retrieve relevant chunks")]
struct Cli {
    /// Snapshot directory (defaults to <data dir>/index)
    #[arg(long, global = true, env = "DOCRAG_INDEX_DIR")]
    index_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Chunk, embed and index a directory of documents, then save a snapshot
    Build {
        #[arg(long)]
        docs: Option<PathBuf>,
        #[arg(long)]
        max_tokens: Option<usize>,
    },
    /// Retrieve the chunks most relevant to TEXT
    Query {
        text: String,
        #[arg(long)]
        top_k: Option<usize>,
        /// Print retrieved records as JSON instead of rendered context
        #[arg(long)]
        json: bool,
    },
    /// Show what the saved snapshot holds
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = Arc::new(AppPaths::new());
    logging::init(&paths);

    let config_service = ConfigService::new(paths.clone());
    let config = config_service.load().with_context(|| {
        format!(
            "Failed to load config from {}",
            config_service.config_path().display()
        )
    })?;
    let index_dir = cli.index_dir.unwrap_or_else(|| paths.index_dir.clone());
    let service = RetrievalService::from_config(&config)
        .context("Failed to set up the retrieval service")?;

    match cli.command {
        Command::Build { docs, max_tokens } => {
            let docs_dir = docs.unwrap_or_else(|| paths.docs_dir.clone());
            let max_tokens = max_tokens.unwrap_or(config.ingest.max_tokens);

            let documents = load_documents(&docs_dir, &config.ingest.extensions)
                .with_context(|| format!("Failed to load documents from {}", docs_dir.display()))?;
            let report = service
                .build(&documents, max_tokens)
                .await
                .context("Index build failed")?;
            let manifest = service
                .save_snapshot(&index_dir)
                .await
                .with_context(|| format!("Failed to save index to {}", index_dir.display()))?;

            println!(
                "Indexed {} documents ({} skipped): {} chunks, dimension {}",
                report.documents_indexed,
                report.documents_skipped,
                report.chunks_added,
                manifest
                    .dimension
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
            println!("Snapshot written to {}", index_dir.display());
        }
        Command::Query { text, top_k, json } => {
            if !snapshot::exists(&index_dir) {
                bail!(
                    "No index found in {}; run `docrag build` first",
                    index_dir.display()
                );
            }
            service
                .load_snapshot(&index_dir)
                .await
                .with_context(|| {
                    format!(
                        "Failed to load index from {}; run `docrag build` first",
                        index_dir.display()
                    )
                })?;

            let top_k = top_k.unwrap_or(config.retrieval.top_k);
            let response = service.query(&text, top_k).await.context("Query failed")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else if response.status == QueryStatus::NoIndex {
                println!("Nothing has been indexed yet.");
            } else {
                let context =
                    render_context(&response.chunks, config.retrieval.max_context_chars);
                println!("{}", context);
                let cited = sources(&context);
                if !cited.is_empty() {
                    println!("\nSources: {}", cited.join(", "));
                }
            }
        }
        Command::Stats => {
            if !snapshot::exists(&index_dir) {
                bail!("No index found in {}", index_dir.display());
            }
            let manifest = service
                .load_snapshot(&index_dir)
                .await
                .with_context(|| format!("Failed to load index from {}", index_dir.display()))?;
            let stats = service.stats().await;

            println!("{}", serde_json::to_string_pretty(&stats)?);
            println!("built_at: {}", manifest.built_at.to_rfc3339());
        }
    }

    Ok(())
}

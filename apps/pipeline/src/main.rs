mod cli;
mod config;
mod engine;
mod errors;
mod llm_client;
mod models;
mod pipeline;
mod search;
mod stages;
mod state;
mod store;
mod vector_store;

#[cfg(test)]
mod testing;

use std::fs;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::Cli;
use crate::config::Config;
use crate::errors::PipelineError;
use crate::llm_client::{OpenAiClient, Retrying, TextGenerationService};
use crate::pipeline::{PipelineOrchestrator, RunMode};
use crate::search::SerpApiProvider;
use crate::state::{PipelineSettings, StageContext};
use crate::store::StageStore;
use crate::vector_store::{EmbeddingVectorStore, KeywordVectorStore, VectorStore};

const REPORT_FILE: &str = "final_report.md";
const VECTOR_INDEX_FILE: &str = "vector_store.json";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load configuration first; missing credentials never reach the pipeline
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting job market pipeline v{}", env!("CARGO_PKG_VERSION"));

    match run(&config, cli.command.run_mode()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Pipeline run failed: {e:#}");
            match e.downcast_ref::<PipelineError>().and_then(PipelineError::stage) {
                Some(stage) => eprintln!("Pipeline failed at stage '{stage}': {e:#}"),
                None => eprintln!("Pipeline failed: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &Config, mode: RunMode) -> Result<()> {
    // Text generation: one client per model, both behind the retry decorator
    let analysis = OpenAiClient::new(
        config.openai_api_key.clone(),
        &config.openai_base_url,
        llm_client::ANALYSIS_MODEL,
    );
    let summarizer = analysis.with_model(llm_client::SUMMARY_MODEL);
    let llm: Arc<dyn TextGenerationService> =
        Arc::new(Retrying::new(analysis.clone(), config.llm_max_retries));
    let summarizer: Arc<dyn TextGenerationService> =
        Arc::new(Retrying::new(summarizer, config.llm_max_retries));
    info!(
        "LLM clients initialized (analysis: {}, summaries: {})",
        llm_client::ANALYSIS_MODEL,
        llm_client::SUMMARY_MODEL
    );

    let search = Arc::new(SerpApiProvider::new(
        config.serpapi_api_key.clone(),
        &config.serpapi_base_url,
    ));

    // Retrieval backend (KeywordVectorStore by default; swap via ENABLE_EMBEDDINGS)
    let vectors: Arc<dyn VectorStore> = if config.enable_embeddings {
        let embedder = Arc::new(analysis.with_model(llm_client::EMBEDDING_MODEL));
        Arc::new(EmbeddingVectorStore::open(
            embedder,
            config.cache_dir.join(VECTOR_INDEX_FILE),
        )?)
    } else {
        Arc::new(KeywordVectorStore::new())
    };

    let ctx = StageContext {
        llm,
        summarizer,
        search,
        vectors: Some(vectors),
        settings: PipelineSettings::from(config),
        cache_root: config.cache_dir.clone(),
    };

    let store = StageStore::open(&ctx.cache_root)?;
    info!("Stage cache at {}", store.root().display());

    let orchestrator = PipelineOrchestrator::new(stages::build_pipeline()?, store, ctx);
    let report = orchestrator.run(mode).await?;

    let markdown = report
        .output
        .get("markdown")
        .and_then(|m| m.as_str())
        .context("final report has no markdown")?;

    fs::create_dir_all(&config.report_dir)
        .with_context(|| format!("creating {}", config.report_dir.display()))?;
    let report_path = config.report_dir.join(REPORT_FILE);
    fs::write(&report_path, markdown)
        .with_context(|| format!("writing {}", report_path.display()))?;
    info!("Report written to {}", report_path.display());

    let stats = &report.output["statistics"];
    println!("Report: {}", report_path.display());
    println!("Total jobs analyzed: {}", stats["total_jobs"]);
    println!("AI-specific roles: {}", stats["ai_specific_roles"]);
    println!("Remote positions: {}%", stats["remote_percentage"]);
    println!(
        "Stages computed: {:?}, loaded from cache: {:?}",
        report.computed, report.cached
    );

    Ok(())
}

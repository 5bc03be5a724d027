use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;

mod cli;
mod config;
mod errors;
mod listings;
mod llm;
mod recommend;
mod semantic;
#[cfg(test)]
mod tests;
mod web;

use config::{Config, EmbeddingProvider};
use listings::Listing;
use llm::{ChatClient, ChatModel};
use recommend::{ListingSearch, PromptRewriter, RecommendationService};
use semantic::{
    Embedder, EmbeddingModel, IndexBuilder, ListingIndex, OpenAiEmbeddings, QueryConstructor,
    SearchOptions, SelfQueryRetriever, VectorStorage,
};

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn base_path() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var("HOMEMATCH_BASE_PATH") {
        return Ok(PathBuf::from(path));
    }

    let home = homedir::my_home()
        .context("could not determine home directory")?
        .context("home directory path is empty")?;
    Ok(home.join(".local/share/homematch"))
}

fn api_key() -> Option<String> {
    std::env::var("OPENAI_API_KEY")
        .ok()
        .filter(|key| !key.trim().is_empty())
}

fn build_embedder(config: &Config) -> anyhow::Result<Arc<dyn Embedder>> {
    let embeddings = &config.embeddings;
    let embedder: Arc<dyn Embedder> = match embeddings.provider {
        EmbeddingProvider::Local => Arc::new(EmbeddingModel::new(
            &embeddings.local_model,
            config.base_path().to_path_buf(),
            Some(Duration::from_secs(embeddings.download_timeout_secs)),
        )?),
        EmbeddingProvider::OpenAI => Arc::new(OpenAiEmbeddings::new(
            &embeddings.api_base,
            api_key(),
            &embeddings.openai_model,
            embeddings.request_timeout_secs.map(Duration::from_secs),
        )?),
    };
    Ok(embedder)
}

fn build_index(config: &Config, listings: &[Listing]) -> anyhow::Result<ListingIndex> {
    let mut builder = IndexBuilder::new(build_embedder(config)?).with_options(SearchOptions {
        top_k: config.retrieval.top_k,
        min_score: config.retrieval.min_score,
    });

    if config.index.persist {
        builder = builder.with_storage(VectorStorage::new(config.base_path().join("vectors.bin")));
    }

    Ok(builder.build(listings)?)
}

fn build_service(config: &Config, index: ListingIndex) -> anyhow::Result<RecommendationService> {
    let generation = &config.generation;
    let chat: Arc<dyn ChatModel> = Arc::new(ChatClient::new(
        &generation.api_base,
        api_key(),
        &generation.model,
        generation.request_timeout_secs.map(Duration::from_secs),
    )?);

    let index = Arc::new(index);
    let search: Arc<dyn ListingSearch> = if config.retrieval.self_query {
        log::info!("self-query retrieval enabled");
        Arc::new(SelfQueryRetriever::new(
            index,
            QueryConstructor::new(chat.clone(), config.retrieval.self_query_temperature),
        ))
    } else {
        index
    };

    Ok(RecommendationService::new(
        search,
        Arc::new(PromptRewriter::new(chat, generation.temperature)),
    ))
}

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();

    #[cfg(feature = "markdown-docs")]
    if let cli::Command::MarkdownDocs {} = args.command {
        clap_markdown::print_help_markdown::<cli::Args>();
        return Ok(());
    }

    init_logging();

    let config = Config::load_with(base_path()?)?;
    let listings_path = args
        .listings
        .clone()
        .unwrap_or_else(|| config.listings_path.clone());

    let listings = listings::load_listings(&listings_path)?;
    log::info!(
        "loaded {} listings from {}",
        listings.len(),
        listings_path.display()
    );

    let index = build_index(&config, &listings)?;

    match args.command {
        #[cfg(feature = "markdown-docs")]
        cli::Command::MarkdownDocs {} => Ok(()),

        cli::Command::Index {} => {
            println!("{} listings indexed", index.len());
            Ok(())
        }

        cli::Command::Recommend { preference } => {
            let service = build_service(&config, index)?;
            let result = service.recommend(&preference)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }

        cli::Command::Daemon { addr } => {
            let listing_count = index.len();
            let service = Arc::new(build_service(&config, index)?);
            let addr = addr.unwrap_or_else(|| config.server.addr.clone());

            web::start_daemon(service.clone(), listing_count, &addr)
        }
    }
}

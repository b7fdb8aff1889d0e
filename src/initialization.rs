use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::application::outreach_service::OutreachService;
use crate::application::portfolio_service::{PortfolioStore, StoreSettings};
use crate::config::{AppConfig, EmbeddingConfig, EmbeddingProvider, StoreBackend};
use crate::domain::embedder::Embedder;
use crate::domain::outreach::OutreachGenerator;
use crate::domain::portfolio::PortfolioError;
use crate::domain::vector_repository::VectorRepository;
use crate::infrastructure::vector_db::qdrant_client::Qdrant;
use crate::infrastructure::{
    EmbeddingGenerator, EmbeddingModel, HashingEmbedder, LlmClient, LocalVectorStore, VectorDb,
};

/// Everything the tools need once bootstrap has finished.
pub struct AppServices {
    pub portfolio: Arc<PortfolioStore>,
    /// `None` when no language-model client could be configured.
    pub outreach: Option<Arc<OutreachService>>,
    pub table_path: PathBuf,
}

/// Filled in by the background bootstrap; `None` while it is still running.
pub type ServicesState = Arc<Mutex<Option<Arc<AppServices>>>>;

/// Builds the configured embedder. Model files may be downloaded on first use.
pub async fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider {
        EmbeddingProvider::Hashing => {
            log::info!(
                "Using hashing embedder with dimension {}.",
                config.hashing_dimension
            );
            Ok(Arc::new(HashingEmbedder::new(config.hashing_dimension)))
        }
        EmbeddingProvider::FastEmbed => {
            let cache_dir = config.cache_dir.clone();
            log::info!("Loading fastembed model (cache: {:?})...", cache_dir);
            let generator = tokio::task::spawn_blocking(move || {
                EmbeddingGenerator::new(EmbeddingModel::AllMiniLML6V2, cache_dir)
            })
            .await
            .context("Embedding model loader task panicked")?
            .context("Failed to create EmbeddingGenerator")?;
            Ok(Arc::new(generator))
        }
    }
}

/// Opens the configured collection backend, reporting failures as [`PortfolioError::StorageInit`].
pub async fn open_repository(
    config: &AppConfig,
    dimension: usize,
) -> Result<Arc<dyn VectorRepository>, PortfolioError> {
    let portfolio = &config.portfolio;
    match portfolio.backend {
        StoreBackend::Local => {
            let store = LocalVectorStore::open(&portfolio.store_dir, &portfolio.collection_name, dimension)
                .map_err(|e| PortfolioError::StorageInit {
                    path: portfolio.store_dir.clone(),
                    message: format!("{:#}", e),
                })?;
            Ok(Arc::new(store))
        }
        StoreBackend::Qdrant => {
            let url = config.qdrant.url.clone();
            let storage_init = |e: anyhow::Error| PortfolioError::StorageInit {
                path: PathBuf::from(&url),
                message: format!("{:#}", e),
            };
            let client = Qdrant::from_url(&url)
                .build()
                .map_err(|e| storage_init(anyhow!("Failed to build Qdrant client: {}", e)))?;
            let db = VectorDb::new(
                Box::new(client),
                portfolio.collection_name.clone(),
                dimension as u64,
            )
            .map_err(storage_init)?;
            db.initialize_collection().await.map_err(storage_init)?;
            Ok(Arc::new(db))
        }
    }
}

/// Wires embedder, repository and store without touching the table or the collection.
pub async fn open_portfolio_store(config: &AppConfig) -> Result<PortfolioStore> {
    let embedder = build_embedder(&config.embedding).await?;
    let repository = open_repository(config, embedder.dimension()).await?;
    Ok(PortfolioStore::new(
        embedder,
        repository,
        StoreSettings::from(&config.portfolio),
    ))
}

/// Opens the store, then bootstraps the collection from the table.
pub async fn build_portfolio_store(config: &AppConfig) -> Result<PortfolioStore> {
    let store = open_portfolio_store(config).await?;
    let count = store.initialize(&config.portfolio.table_path).await?;
    log::info!("Portfolio store ready with {} documents.", count);
    Ok(store)
}

pub async fn initialize_services(config: &AppConfig) -> Result<AppServices> {
    let portfolio = Arc::new(build_portfolio_store(config).await?);

    let outreach = match LlmClient::from_config(&config.llm) {
        Ok(client) => {
            let generator: Arc<dyn OutreachGenerator> = Arc::new(client);
            Some(Arc::new(OutreachService::new(
                portfolio.clone(),
                generator,
                &config.outreach,
            )?))
        }
        Err(e) => {
            log::warn!("Email drafting disabled: {}", e);
            None
        }
    };

    Ok(AppServices {
        portfolio,
        outreach,
        table_path: config.portfolio.table_path.clone(),
    })
}

/// Performs all the heavy initialization in the background and publishes the result.
pub async fn initialize_background_services(
    config: Arc<AppConfig>,
    services_state: ServicesState,
) -> Result<()> {
    let services = initialize_services(&config).await?;
    let mut state = services_state
        .lock()
        .map_err(|_| anyhow!("Services state lock poisoned"))?;
    *state = Some(Arc::new(services));
    log::info!("Portfolio services are now initialized and available.");
    Ok(())
}

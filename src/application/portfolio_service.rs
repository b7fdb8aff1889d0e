use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::{PortfolioConfig, DEFAULT_RESULT_LIMIT};
use crate::domain::embedder::Embedder;
use crate::domain::portfolio::{
    DocumentPayload, DocumentToUpsert, PortfolioError, PortfolioMatch, PortfolioTable, Skills,
};
use crate::domain::vector_repository::VectorRepository;
use crate::infrastructure::table::ensure_table;

// Hits requested per wanted match, so duplicates dropped after the search do not shrink the result.
const SEARCH_OVERFETCH: usize = 2;

/// Tunables for [`PortfolioStore`].
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Maximum number of matches returned per query.
    pub result_limit: usize,
    /// Additional embedding attempts after the first failure.
    pub embed_retries: u32,
    pub retry_backoff: Duration,
    pub query_timeout: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            result_limit: DEFAULT_RESULT_LIMIT,
            embed_retries: 3,
            retry_backoff: Duration::from_millis(200),
            query_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&PortfolioConfig> for StoreSettings {
    fn from(config: &PortfolioConfig) -> Self {
        Self {
            result_limit: config.result_limit,
            embed_retries: config.embed_retries,
            retry_backoff: config.retry_backoff(),
            query_timeout: config.query_timeout(),
        }
    }
}

/// The portfolio collection and the similarity queries against it.
///
/// Replacing the collection takes the write side of an internal lock and queries
/// take the read side, so a query never observes a replace in progress.
pub struct PortfolioStore {
    embedder: Arc<dyn Embedder>,
    repository: Arc<dyn VectorRepository>,
    settings: StoreSettings,
    swap_lock: RwLock<()>,
}

impl PortfolioStore {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        repository: Arc<dyn VectorRepository>,
        settings: StoreSettings,
    ) -> Self {
        Self {
            embedder,
            repository,
            settings,
            swap_lock: RwLock::new(()),
        }
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Bootstraps the collection from the table at `table_path`.
    ///
    /// A missing table is synthesized first. A collection that already holds
    /// documents is left alone even if the table has changed since; an empty one
    /// is populated. Returns the document count afterwards.
    pub async fn initialize(&self, table_path: &Path) -> Result<usize, PortfolioError> {
        let table = ensure_table(table_path)?;
        let _guard = self.swap_lock.write().await;

        let existing = self
            .repository
            .count()
            .await
            .map_err(|e| PortfolioError::StorageInit {
                path: table_path.to_path_buf(),
                message: format!("{:#}", e),
            })?;
        if existing > 0 {
            log::info!(
                "Portfolio collection already holds {} documents; skipping bootstrap from {:?}.",
                existing,
                table_path
            );
            return Ok(existing);
        }

        log::info!("Populating empty portfolio collection from {:?}...", table_path);
        self.replace_locked(&table).await
    }

    /// Replaces the whole collection with the rows of `table`.
    ///
    /// The column contract is checked before anything is touched. Returns the number
    /// of documents in the new collection.
    pub async fn load_custom_portfolio(&self, table: &PortfolioTable) -> Result<usize, PortfolioError> {
        table.check_schema()?;
        let _guard = self.swap_lock.write().await;
        self.replace_locked(table).await
    }

    async fn replace_locked(&self, table: &PortfolioTable) -> Result<usize, PortfolioError> {
        table.check_schema()?;

        let rendered: Vec<String> = table.rows.iter().map(|row| row.render()).collect();
        let vectors = if rendered.is_empty() {
            Vec::new()
        } else {
            let texts: Vec<&str> = rendered.iter().map(String::as_str).collect();
            self.embed_with_retry(&texts).await?
        };
        if vectors.len() != table.rows.len() {
            return Err(PortfolioError::Embedding(format!(
                "expected {} vectors, got {}",
                table.rows.len(),
                vectors.len()
            )));
        }

        let documents: Vec<DocumentToUpsert> = table
            .rows
            .iter()
            .zip(vectors)
            .map(|(row, vector)| DocumentToUpsert {
                id: Uuid::new_v4().to_string(),
                vector,
                payload: DocumentPayload::from_entry(row),
            })
            .collect();

        self.repository
            .replace_all(&documents)
            .await
            .map_err(|e| PortfolioError::Replace(format!("{:#}", e)))?;
        log::info!("Portfolio loaded with {} documents.", documents.len());
        Ok(documents.len())
    }

    /// Finds the portfolio items closest to `skills`.
    ///
    /// Never fails: retrieval errors are logged and reported as no matches. Use
    /// [`PortfolioStore::try_query_links`] to tell the two apart.
    pub async fn query_links(&self, skills: impl Into<Skills>) -> Vec<PortfolioMatch> {
        let skills = skills.into();
        match self.try_query_links(&skills).await {
            Ok(matches) => matches,
            Err(e) => {
                log::error!("Error in query_links for {:?}: {}", skills.terms(), e);
                Vec::new()
            }
        }
    }

    /// Like [`PortfolioStore::query_links`], but surfaces retrieval failures.
    ///
    /// Empty skills return no matches without touching the store. Otherwise the
    /// terms are joined into one disjunctive phrase, embedded, and the nearest
    /// documents are returned best first, at most `result_limit` of them, with
    /// duplicate `(techstack, link)` pairs and link-less documents dropped.
    pub async fn try_query_links(&self, skills: &Skills) -> Result<Vec<PortfolioMatch>, PortfolioError> {
        let Some(query) = skills.to_query() else {
            log::debug!("No usable skills; skipping portfolio query.");
            return Ok(Vec::new());
        };

        let query_vector = self
            .embed_with_retry(&[query.as_str()])
            .await
            .map_err(|e| PortfolioError::Retrieval(e.to_string()))?
            .pop()
            .ok_or_else(|| PortfolioError::Retrieval(format!("no embedding for query '{}'", query)))?;

        let _guard = self.swap_lock.read().await;
        let results = tokio::time::timeout(
            self.settings.query_timeout,
            self.repository.search(
                query_vector,
                self.settings.result_limit.saturating_mul(SEARCH_OVERFETCH),
            ),
        )
        .await
        .map_err(|_| {
            PortfolioError::Retrieval(format!(
                "search timed out after {:?}",
                self.settings.query_timeout
            ))
        })?
        .map_err(|e| PortfolioError::Retrieval(format!("{:#}", e)))?;

        let mut matches: Vec<PortfolioMatch> = Vec::with_capacity(results.len());
        for result in results {
            match result.payload.to_match() {
                Some(m) if !matches.contains(&m) => matches.push(m),
                Some(_) => log::debug!("Dropping duplicate match from document {}.", result.id),
                None => log::warn!("Document {} has no recoverable link; skipping.", result.id),
            }
        }
        matches.truncate(self.settings.result_limit);
        log::info!("Query '{}' matched {} portfolio items.", query, matches.len());
        Ok(matches)
    }

    /// Number of documents in the active collection.
    pub async fn document_count(&self) -> Result<usize, PortfolioError> {
        let _guard = self.swap_lock.read().await;
        self.repository
            .count()
            .await
            .map_err(|e| PortfolioError::Retrieval(format!("{:#}", e)))
    }

    async fn embed_with_retry(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, PortfolioError> {
        let mut attempt = 0;
        loop {
            match self.embedder.embed(texts) {
                Ok(vectors) => return Ok(vectors),
                Err(e) if attempt < self.settings.embed_retries => {
                    attempt += 1;
                    log::warn!(
                        "Embedding attempt {} failed: {}. Retrying ({}/{})...",
                        attempt,
                        e,
                        attempt,
                        self.settings.embed_retries
                    );
                    tokio::time::sleep(self.settings.retry_backoff * attempt).await;
                }
                Err(e) => return Err(PortfolioError::Embedding(format!("{:#}", e))),
            }
        }
    }
}

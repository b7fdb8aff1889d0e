use anyhow::Result;
use async_trait::async_trait;

use crate::domain::portfolio::{DocumentToUpsert, SearchResult};

#[async_trait]
pub trait VectorRepository: Send + Sync {
    /// Number of documents in the active collection.
    async fn count(&self) -> Result<usize>;

    /// Replaces the whole collection with `documents`.
    ///
    /// The new set is staged in full before it becomes visible; if staging fails the
    /// previous collection stays active and untouched.
    async fn replace_all(&self, documents: &[DocumentToUpsert]) -> Result<()>;

    /// Returns at most `limit` documents ordered by descending similarity.
    /// Equal scores keep store order.
    async fn search(&self, query_vector: Vec<f32>, limit: usize) -> Result<Vec<SearchResult>>;
}

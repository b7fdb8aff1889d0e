use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

pub use qdrant_client;
use self::qdrant_client::qdrant::point_id::PointIdOptions;
use self::qdrant_client::qdrant::value::Kind as QdrantValueKind;
use self::qdrant_client::qdrant::{
    CountPointsBuilder, CreateAliasBuilder, CreateCollectionBuilder, Distance, PointId,
    PointStruct, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use self::qdrant_client::{Payload, Qdrant};

use crate::domain::portfolio::{DocumentPayload, DocumentToUpsert, SearchResult};
use crate::domain::vector_repository::VectorRepository;

/// Qdrant-backed collection.
///
/// The logical collection name is a Qdrant alias. Every replace builds a fresh
/// physical collection (`<alias>_<uuid>`), fills it, repoints the alias, and then
/// drops the collection the alias used to point at.
pub struct VectorDb {
    client: Box<Qdrant>,
    alias: String,
    vector_size: u64,
}

impl VectorDb {
    /// Creates a new VectorDb instance.
    ///
    /// # Arguments
    ///
    /// * `client` - An initialized Qdrant client.
    /// * `alias` - The logical collection name queries are addressed to.
    /// * `vector_size` - The dimension of the vectors.
    pub fn new(client: Box<Qdrant>, alias: String, vector_size: u64) -> Result<Self> {
        if alias.is_empty() {
            return Err(anyhow!("Collection name cannot be empty"));
        }
        if vector_size == 0 {
            return Err(anyhow!("Vector size must be greater than zero"));
        }
        Ok(Self {
            client,
            alias,
            vector_size,
        })
    }

    /// Verifies the server is reachable and logs which collection backs the alias.
    pub async fn initialize_collection(&self) -> Result<()> {
        log::info!("Checking alias '{}'...", self.alias);
        match self.active_collection().await? {
            Some(collection) => log::info!(
                "Alias '{}' points at collection '{}'.",
                self.alias,
                collection
            ),
            None => log::info!(
                "Alias '{}' does not exist yet; it is created on the first load.",
                self.alias
            ),
        }
        Ok(())
    }

    /// The physical collection the alias currently resolves to.
    async fn active_collection(&self) -> Result<Option<String>> {
        let response = self
            .client
            .list_aliases()
            .await
            .context("Failed to list Qdrant aliases")?;
        Ok(response
            .aliases
            .into_iter()
            .find(|a| a.alias_name == self.alias)
            .map(|a| a.collection_name))
    }

    async fn create_collection_internal(&self, collection: &str) -> Result<()> {
        log::info!(
            "Creating collection '{}' with size {} and distance Cosine...",
            collection,
            self.vector_size
        );
        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(self.vector_size, Distance::Cosine)),
            )
            .await
            .map_err(|e| anyhow!("Failed to create collection '{}': {}", collection, e))?;
        Ok(())
    }

    fn to_point(doc: &DocumentToUpsert) -> Result<PointStruct> {
        let payload_value = serde_json::to_value(&doc.payload)?;
        let payload = Payload::try_from(payload_value)
            .map_err(|e| anyhow!("Failed to convert payload for {}: {}", doc.id, e))?;
        Ok(PointStruct::new(
            PointId::from(doc.id.clone()),
            doc.vector.clone(),
            payload,
        ))
    }

    async fn fill_collection(&self, collection: &str, documents: &[DocumentToUpsert]) -> Result<()> {
        self.create_collection_internal(collection).await?;
        if documents.is_empty() {
            return Ok(());
        }
        let points = documents
            .iter()
            .map(Self::to_point)
            .collect::<Result<Vec<_>>>()?;
        log::info!("Upserting {} points into collection '{}'...", points.len(), collection);
        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(|e| anyhow!("Qdrant upsert failed: {}", e))?;
        Ok(())
    }

    /// Repoints the alias at `collection` and returns the collection it used to resolve to.
    ///
    /// Qdrant applies the detach and the attach as separate alias operations. On failure
    /// `collection` is dropped, and if the alias was already detached it is pointed back
    /// at the previous collection.
    pub async fn point_alias_at(&self, collection: &str) -> Result<Option<String>> {
        let previous = self.active_collection().await?;
        if previous.is_some() {
            if let Err(e) = self.client.delete_alias(self.alias.as_str()).await {
                self.drop_staged(collection).await;
                return Err(anyhow!("Failed to detach alias '{}': {}", self.alias, e));
            }
        }
        if let Err(e) = self
            .client
            .create_alias(CreateAliasBuilder::new(collection, self.alias.as_str()))
            .await
        {
            log::error!("Pointing alias '{}' at '{}' failed: {}", self.alias, collection, e);
            if let Some(old) = previous.as_deref() {
                self.restore_alias(old).await;
            }
            self.drop_staged(collection).await;
            return Err(anyhow!(
                "Failed to point alias '{}' at '{}': {}",
                self.alias,
                collection,
                e
            ));
        }
        Ok(previous)
    }

    async fn drop_staged(&self, collection: &str) {
        if let Err(e) = self.client.delete_collection(collection).await {
            log::warn!("Failed to drop staged collection '{}': {}", collection, e);
        }
    }

    async fn restore_alias(&self, collection: &str) {
        match self
            .client
            .create_alias(CreateAliasBuilder::new(collection, self.alias.as_str()))
            .await
        {
            Ok(_) => log::warn!("Alias '{}' restored to '{}'.", self.alias, collection),
            Err(e) => log::error!(
                "Alias '{}' could not be restored to '{}': {}",
                self.alias,
                collection,
                e
            ),
        }
    }

    // Converts a Qdrant payload map back to serde_json::Value; None on unrepresentable values.
    fn qdrant_payload_to_serde_value(
        payload_map: HashMap<String, qdrant_client::qdrant::Value>,
    ) -> Option<serde_json::Value> {
        let mut json_map = serde_json::Map::new();
        for (key, qdrant_value) in payload_map {
            json_map.insert(key, Self::qdrant_value_to_serde(qdrant_value)?);
        }
        Some(serde_json::Value::Object(json_map))
    }

    fn qdrant_value_to_serde(value: qdrant_client::qdrant::Value) -> Option<serde_json::Value> {
        Some(match value.kind {
            Some(QdrantValueKind::NullValue(_)) | None => serde_json::Value::Null,
            Some(QdrantValueKind::BoolValue(b)) => serde_json::Value::Bool(b),
            Some(QdrantValueKind::DoubleValue(d)) => serde_json::Number::from_f64(d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Some(QdrantValueKind::IntegerValue(i)) => serde_json::Value::Number(i.into()),
            Some(QdrantValueKind::StringValue(s)) => serde_json::Value::String(s),
            Some(QdrantValueKind::ListValue(list)) => serde_json::Value::Array(
                list.values
                    .into_iter()
                    .map(Self::qdrant_value_to_serde)
                    .collect::<Option<Vec<_>>>()?,
            ),
            Some(QdrantValueKind::StructValue(s)) => Self::qdrant_payload_to_serde_value(s.fields)?,
        })
    }
}

fn point_id_to_string(id: PointId) -> String {
    match id.point_id_options {
        Some(PointIdOptions::Uuid(uuid)) => uuid,
        Some(PointIdOptions::Num(num)) => num.to_string(),
        None => String::new(),
    }
}

#[async_trait]
impl VectorRepository for VectorDb {
    async fn count(&self) -> Result<usize> {
        let Some(collection) = self.active_collection().await? else {
            return Ok(0);
        };
        let response = self
            .client
            .count(CountPointsBuilder::new(collection.as_str()).exact(true))
            .await
            .map_err(|e| anyhow!("Qdrant count failed on '{}': {}", collection, e))?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    async fn replace_all(&self, documents: &[DocumentToUpsert]) -> Result<()> {
        if let Some(doc) = documents
            .iter()
            .find(|d| d.vector.len() as u64 != self.vector_size)
        {
            return Err(anyhow!(
                "Document {} has dimension {} but the collection expects {}",
                doc.id,
                doc.vector.len(),
                self.vector_size
            ));
        }

        let staged = format!("{}_{}", self.alias, Uuid::new_v4().as_simple());

        if let Err(e) = self.fill_collection(&staged, documents).await {
            log::error!("Staging collection '{}' failed: {}", staged, e);
            self.drop_staged(&staged).await;
            return Err(e);
        }

        let previous = self.point_alias_at(&staged).await?;
        log::info!("Alias '{}' now points at '{}'.", self.alias, staged);

        if let Some(old) = previous {
            if let Err(e) = self.client.delete_collection(old.as_str()).await {
                log::warn!("Failed to drop retired collection '{}': {}", old, e);
            }
        }
        Ok(())
    }

    async fn search(&self, query_vector: Vec<f32>, limit: usize) -> Result<Vec<SearchResult>> {
        if query_vector.len() as u64 != self.vector_size {
            return Err(anyhow!(
                "Query vector dimension ({}) does not match collection dimension ({})",
                query_vector.len(),
                self.vector_size
            ));
        }
        if self.active_collection().await?.is_none() {
            return Ok(Vec::new());
        }

        log::info!("Searching alias '{}' with limit {}...", self.alias, limit);
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(self.alias.as_str(), query_vector, limit as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| anyhow!("Qdrant search failed: {}", e))?;

        let results: Vec<SearchResult> = response
            .result
            .into_iter()
            .filter_map(|scored_point| {
                let id = scored_point.id.map(point_id_to_string).unwrap_or_default();
                let json_value = Self::qdrant_payload_to_serde_value(scored_point.payload)?;
                match serde_json::from_value::<DocumentPayload>(json_value) {
                    Ok(payload) => Some(SearchResult {
                        id,
                        score: scored_point.score,
                        payload,
                    }),
                    Err(e) => {
                        log::error!("Failed to deserialize payload of point {}: {}", id, e);
                        None
                    }
                }
            })
            .collect();

        log::info!("Mapped {} Qdrant results.", results.len());
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use self::qdrant_client::qdrant::{ListValue, Struct};

    #[test]
    fn new_rejects_invalid_params() {
        let client1 = Qdrant::from_url("http://dummy-url1").build().unwrap();
        assert!(VectorDb::new(Box::new(client1), "".to_string(), 3).is_err());
        let client2 = Qdrant::from_url("http://dummy-url2").build().unwrap();
        assert!(VectorDb::new(Box::new(client2), "portfolio".to_string(), 0).is_err());
    }

    #[test]
    fn payload_conversion_round_trips_nested_values() {
        let mut inner = HashMap::new();
        inner.insert(
            "tags".to_string(),
            qdrant_client::qdrant::Value {
                kind: Some(QdrantValueKind::ListValue(ListValue {
                    values: vec![qdrant_client::qdrant::Value {
                        kind: Some(QdrantValueKind::StringValue("rust".into())),
                    }],
                })),
            },
        );
        let mut payload = HashMap::new();
        payload.insert(
            "techstack".to_string(),
            qdrant_client::qdrant::Value {
                kind: Some(QdrantValueKind::StringValue("Rust | Tokio".into())),
            },
        );
        payload.insert(
            "meta".to_string(),
            qdrant_client::qdrant::Value {
                kind: Some(QdrantValueKind::StructValue(Struct { fields: inner })),
            },
        );

        let value = VectorDb::qdrant_payload_to_serde_value(payload).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"techstack": "Rust | Tokio", "meta": {"tags": ["rust"]}})
        );
    }
}

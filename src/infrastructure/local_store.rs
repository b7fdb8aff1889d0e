//! File-backed vector collection.
//!
//! Layout under `<store_dir>/<collection_name>/`:
//!
//! * `manifest.json` names the active generation and the vector dimension.
//! * `<generation>.jsonl` holds one [`DocumentToUpsert`] per line.
//!
//! A replace writes a complete new generation file, then swaps the manifest with an
//! atomic rename, and only then deletes the previous generation. Readers never see
//! a half-written collection, and a failed replace leaves the old one active.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::domain::portfolio::{DocumentToUpsert, SearchResult};
use crate::domain::vector_repository::VectorRepository;

const MANIFEST_FILE: &str = "manifest.json";
const GENERATION_EXT: &str = "jsonl";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct Manifest {
    active_generation: Option<String>,
    dimension: usize,
}

struct ActiveGeneration {
    id: Option<String>,
    documents: Vec<DocumentToUpsert>,
}

pub struct LocalVectorStore {
    dir: PathBuf,
    dimension: usize,
    active: RwLock<ActiveGeneration>,
}

impl LocalVectorStore {
    /// Opens the collection directory, creating it when missing.
    ///
    /// Fails when the directory cannot be created or written, when the manifest is
    /// unreadable, or when the stored dimension differs from `dimension`.
    pub fn open(store_dir: &Path, collection_name: &str, dimension: usize) -> Result<Self> {
        if collection_name.trim().is_empty() {
            return Err(anyhow!("Collection name cannot be empty"));
        }
        if dimension == 0 {
            return Err(anyhow!("Vector size must be greater than zero"));
        }

        let dir = store_dir.join(collection_name);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create collection directory {:?}", dir))?;
        // Probe writability now rather than on the first replace.
        NamedTempFile::new_in(&dir)
            .with_context(|| format!("Collection directory {:?} is not writable", dir))?;

        let manifest_path = dir.join(MANIFEST_FILE);
        let active = if manifest_path.exists() {
            let manifest: Manifest = serde_json::from_reader(BufReader::new(
                File::open(&manifest_path)
                    .with_context(|| format!("Failed to open {:?}", manifest_path))?,
            ))
            .with_context(|| format!("Failed to parse {:?}", manifest_path))?;

            if manifest.dimension != dimension {
                return Err(anyhow!(
                    "Collection '{}' stores {}-dimensional vectors but the embedder produces {}",
                    collection_name,
                    manifest.dimension,
                    dimension
                ));
            }
            let documents = match &manifest.active_generation {
                Some(generation) => read_generation(&generation_path(&dir, generation))?,
                None => Vec::new(),
            };
            ActiveGeneration {
                id: manifest.active_generation,
                documents,
            }
        } else {
            ActiveGeneration {
                id: None,
                documents: Vec::new(),
            }
        };

        log::info!(
            "Opened local collection {:?} with {} documents (generation {:?}).",
            dir,
            active.documents.len(),
            active.id
        );
        Ok(Self {
            dir,
            dimension,
            active: RwLock::new(active),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut tmp, manifest)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.dir.join(MANIFEST_FILE))
            .map_err(|e| anyhow!("Failed to activate manifest: {}", e))?;
        Ok(())
    }

    fn stage_generation(&self, generation: &str, documents: &[DocumentToUpsert]) -> Result<()> {
        let tmp = NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            for doc in documents {
                serde_json::to_writer(&mut writer, doc)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(generation_path(&self.dir, generation))
            .map_err(|e| anyhow!("Failed to persist generation {}: {}", generation, e))?;
        Ok(())
    }
}

fn generation_path(dir: &Path, generation: &str) -> PathBuf {
    dir.join(format!("{}.{}", generation, GENERATION_EXT))
}

fn read_generation(path: &Path) -> Result<Vec<DocumentToUpsert>> {
    let file = File::open(path).with_context(|| format!("Failed to open generation {:?}", path))?;
    let mut documents = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: DocumentToUpsert = serde_json::from_str(&line)
            .with_context(|| format!("Malformed document on line {} of {:?}", index + 1, path))?;
        documents.push(doc);
    }
    Ok(documents)
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorRepository for LocalVectorStore {
    async fn count(&self) -> Result<usize> {
        let active = self
            .active
            .read()
            .map_err(|_| anyhow!("Collection lock poisoned"))?;
        Ok(active.documents.len())
    }

    async fn replace_all(&self, documents: &[DocumentToUpsert]) -> Result<()> {
        if let Some(doc) = documents.iter().find(|d| d.vector.len() != self.dimension) {
            return Err(anyhow!(
                "Document {} has dimension {} but the collection expects {}",
                doc.id,
                doc.vector.len(),
                self.dimension
            ));
        }

        let generation = Uuid::new_v4().to_string();
        log::info!(
            "Staging generation {} with {} documents in {:?}...",
            generation,
            documents.len(),
            self.dir
        );
        self.stage_generation(&generation, documents)?;

        let mut active = self
            .active
            .write()
            .map_err(|_| anyhow!("Collection lock poisoned"))?;
        let manifest = Manifest {
            active_generation: Some(generation.clone()),
            dimension: self.dimension,
        };
        if let Err(e) = self.write_manifest(&manifest) {
            log::error!("Activating generation {} failed: {}", generation, e);
            if let Err(cleanup) = fs::remove_file(generation_path(&self.dir, &generation)) {
                log::warn!("Failed to remove staged generation {}: {}", generation, cleanup);
            }
            return Err(e);
        }

        let retired = active.id.replace(generation.clone());
        active.documents = documents.to_vec();
        drop(active);
        log::info!("Activated generation {}.", generation);

        if let Some(old) = retired {
            if let Err(e) = fs::remove_file(generation_path(&self.dir, &old)) {
                log::warn!("Failed to remove retired generation {}: {}", old, e);
            }
        }
        Ok(())
    }

    async fn search(&self, query_vector: Vec<f32>, limit: usize) -> Result<Vec<SearchResult>> {
        if query_vector.len() != self.dimension {
            return Err(anyhow!(
                "Query vector dimension ({}) does not match collection dimension ({})",
                query_vector.len(),
                self.dimension
            ));
        }

        let active = self
            .active
            .read()
            .map_err(|_| anyhow!("Collection lock poisoned"))?;
        let mut scored: Vec<SearchResult> = active
            .documents
            .iter()
            .map(|doc| SearchResult {
                id: doc.id.clone(),
                score: cosine_similarity(&query_vector, &doc.vector),
                payload: doc.payload.clone(),
            })
            .collect();
        // stable: equal scores keep store order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        log::debug!("Local search returned {} results.", scored.len());
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::portfolio::{DocumentPayload, PortfolioEntry};
    use tempfile::tempdir;

    fn doc(techstack: &str, link: &str, vector: Vec<f32>) -> DocumentToUpsert {
        DocumentToUpsert {
            id: Uuid::new_v4().to_string(),
            vector,
            payload: DocumentPayload::from_entry(&PortfolioEntry::new(techstack, link)),
        }
    }

    fn generation_files(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |ext| ext == GENERATION_EXT))
            .count()
    }

    #[tokio::test]
    async fn replace_then_search_orders_by_similarity() -> Result<()> {
        let dir = tempdir()?;
        let store = LocalVectorStore::open(dir.path(), "portfolio", 3)?;
        assert_eq!(store.count().await?, 0);

        store
            .replace_all(&[
                doc("A", "https://a.example", vec![0.1, 0.2, 0.7]),
                doc("B", "https://b.example", vec![0.8, 0.1, 0.1]),
                doc("C", "https://c.example", vec![0.2, 0.3, 0.5]),
            ])
            .await?;
        assert_eq!(store.count().await?, 3);

        let results = store.search(vec![0.15, 0.25, 0.6], 2).await?;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].payload.techstack, "A");
        assert_eq!(results[1].payload.techstack, "C");
        assert!(results[0].score >= results[1].score);
        Ok(())
    }

    #[tokio::test]
    async fn replace_discards_previous_generation() -> Result<()> {
        let dir = tempdir()?;
        let store = LocalVectorStore::open(dir.path(), "portfolio", 2)?;
        store
            .replace_all(&[doc("Old", "https://old.example", vec![1.0, 0.0])])
            .await?;
        store
            .replace_all(&[
                doc("New1", "https://n1.example", vec![0.0, 1.0]),
                doc("New2", "https://n2.example", vec![1.0, 1.0]),
            ])
            .await?;

        assert_eq!(store.count().await?, 2);
        let results = store.search(vec![1.0, 0.0], 10).await?;
        assert!(results.iter().all(|r| r.payload.techstack != "Old"));
        assert_eq!(generation_files(store.dir()), 1);
        Ok(())
    }

    #[tokio::test]
    async fn reopen_sees_persisted_collection() -> Result<()> {
        let dir = tempdir()?;
        {
            let store = LocalVectorStore::open(dir.path(), "portfolio", 2)?;
            store
                .replace_all(&[doc("Rust", "https://r.example", vec![0.6, 0.8])])
                .await?;
        }
        let reopened = LocalVectorStore::open(dir.path(), "portfolio", 2)?;
        assert_eq!(reopened.count().await?, 1);
        let results = reopened.search(vec![0.6, 0.8], 3).await?;
        assert_eq!(results[0].payload.link.as_deref(), Some("https://r.example"));
        Ok(())
    }

    #[tokio::test]
    async fn mismatched_dimension_leaves_collection_intact() -> Result<()> {
        let dir = tempdir()?;
        let store = LocalVectorStore::open(dir.path(), "portfolio", 2)?;
        store
            .replace_all(&[doc("Keep", "https://keep.example", vec![1.0, 0.0])])
            .await?;

        let err = store
            .replace_all(&[doc("Bad", "https://bad.example", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("dimension"));
        assert_eq!(store.count().await?, 1);

        let err = store.search(vec![0.1], 3).await.unwrap_err();
        assert!(err.to_string().contains("Query vector dimension (1)"));
        Ok(())
    }

    #[tokio::test]
    async fn reopening_with_another_dimension_fails() -> Result<()> {
        let dir = tempdir()?;
        LocalVectorStore::open(dir.path(), "portfolio", 2)?
            .replace_all(&[doc("X", "https://x.example", vec![1.0, 0.0])])
            .await?;
        assert!(LocalVectorStore::open(dir.path(), "portfolio", 4).is_err());
        Ok(())
    }

    #[test]
    fn open_rejects_invalid_params() {
        let dir = tempdir().unwrap();
        assert!(LocalVectorStore::open(dir.path(), "", 3).is_err());
        assert!(LocalVectorStore::open(dir.path(), "portfolio", 0).is_err());
    }

    #[tokio::test]
    async fn equal_scores_keep_store_order() -> Result<()> {
        let dir = tempdir()?;
        let store = LocalVectorStore::open(dir.path(), "portfolio", 2)?;
        store
            .replace_all(&[
                doc("first", "https://1.example", vec![1.0, 0.0]),
                doc("second", "https://2.example", vec![1.0, 0.0]),
                doc("third", "https://3.example", vec![1.0, 0.0]),
            ])
            .await?;
        for _ in 0..3 {
            let results = store.search(vec![1.0, 0.0], 3).await?;
            let order: Vec<_> = results.iter().map(|r| r.payload.techstack.as_str()).collect();
            assert_eq!(order, vec!["first", "second", "third"]);
        }
        Ok(())
    }
}

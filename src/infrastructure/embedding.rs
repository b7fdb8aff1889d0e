use anyhow::{anyhow, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use siphasher::sip::SipHasher13;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use crate::domain::embedder::Embedder;

/// A struct responsible for generating text embeddings using a pre-initialized model.
pub struct EmbeddingGenerator {
    model: TextEmbedding,
    dimension: usize,
}

impl EmbeddingGenerator {
    /// Creates a new EmbeddingGenerator, initializing the specified embedding model.
    ///
    /// This might block while the model files are downloaded for the first time.
    ///
    /// # Arguments
    ///
    /// * `model_name` - The embedding model to use (e.g., EmbeddingModel::AllMiniLML6V2).
    /// * `cache_dir` - The cache directory for the embedding model (None for default).
    pub fn new(model_name: EmbeddingModel, cache_dir: Option<PathBuf>) -> Result<Self> {
        let dimension = TextEmbedding::list_supported_models()
            .iter()
            .find(|m| m.model == model_name)
            .map(|m| m.dim)
            .ok_or_else(|| anyhow!("No model info for {:?}", model_name))?;

        let mut opts = InitOptions::new(model_name);
        if let Some(dir) = cache_dir {
            opts = opts.with_cache_dir(dir);
        }
        let model = TextEmbedding::try_new(opts)?;
        Ok(Self { model, dimension })
    }
}

impl Embedder for EmbeddingGenerator {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.model.embed(texts.to_vec(), None)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// Changing the seed changes every stored vector; reload the portfolio afterwards.
const HASH_SEED_K0: u64 = 0x0123_4567_89ab_cdef;
const HASH_SEED_K1: u64 = 0xfedc_ba98_7654_3210;

/// Feature-hashing embedder.
///
/// Lower-cased alphanumeric tokens (keeping `+` and `#`, so `C++` and `C#` survive)
/// are hashed into a signed bag-of-words vector and L2-normalized. It needs no
/// model files and is fully deterministic, which makes it the offline fallback.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn hash(&self, token: &str, salt: u8) -> u64 {
        let mut hasher = SipHasher13::new_with_keys(HASH_SEED_K0, HASH_SEED_K1);
        salt.hash(&mut hasher);
        token.hash(&mut hasher);
        hasher.finish()
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let idx = (self.hash(&token, 0) % self.dimension as u64) as usize;
            let sign = if self.hash(&token, 1) % 2 == 0 { 1.0 } else { -1.0 };
            vector[idx] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '+' || c == '#'))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn hashing_embedder_is_normalized_and_deterministic() {
        let embedder = HashingEmbedder::new(384);
        let first = embedder.embed(&["Rust | Tokio | Axum"]).unwrap();
        let second = embedder.embed(&["Rust | Tokio | Axum"]).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].len(), 384);

        let norm: f32 = first[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "L2 norm should be 1.0, got {}", norm);
    }

    #[test]
    fn hashing_embedder_ranks_shared_terms_higher() {
        let embedder = HashingEmbedder::new(512);
        let vectors = embedder
            .embed(&[
                "Python",
                "Techstack: Python | Django, Links: https://a.example/x",
                "Techstack: Go | Kubernetes, Links: https://b.example/y",
            ])
            .unwrap();
        assert!(dot(&vectors[0], &vectors[1]) > dot(&vectors[0], &vectors[2]));
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        let vectors = embedder.embed(&["  | "]).unwrap();
        assert!(vectors[0].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn tokenize_keeps_language_markers() {
        assert_eq!(tokenize("C++ | C# | Node.js"), vec!["c++", "c#", "node", "js"]);
    }

    // Downloads model data on first run.
    #[test]
    #[ignore = "downloads the fastembed model"]
    fn test_embedding_generator_init_and_embed() -> Result<()> {
        let generator = EmbeddingGenerator::new(EmbeddingModel::AllMiniLML6V2, None)?;
        let embeddings = generator.embed(&["This is a test document.", "Another document."])?;
        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0].len(), generator.dimension());
        assert_eq!(generator.dimension(), 384);
        Ok(())
    }
}

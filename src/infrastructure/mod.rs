pub mod embedding;
pub mod llm_client;
pub mod local_store;
pub mod prompts;
pub mod table;
pub mod vector_db;
pub mod web;

pub use embedding::{EmbeddingGenerator, HashingEmbedder};
pub use llm_client::LlmClient;
pub use local_store::LocalVectorStore;
pub use vector_db::VectorDb;

// Re-export EmbeddingModel directly from the dependency
pub use fastembed::EmbeddingModel;

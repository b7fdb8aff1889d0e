pub mod application;
pub mod config;
/// Declare modules and make them public
pub mod domain;
pub mod infrastructure;
pub mod initialization;
pub mod server;

/// Re-export necessary items for the binaries and tests
pub use application::outreach_service::{OutreachError, OutreachService};
pub use application::portfolio_service::{PortfolioStore, StoreSettings};
pub use config::{load_config, AppConfig};
pub use domain::embedder::Embedder;
pub use domain::outreach::{DraftedEmail, GenerationError, JobPosting, OutreachGenerator};
pub use domain::portfolio::{
    PortfolioEntry, PortfolioError, PortfolioMatch, PortfolioTable, Skills,
};
pub use domain::vector_repository::VectorRepository;
pub use fastembed::EmbeddingModel;
pub use infrastructure::embedding::{EmbeddingGenerator, HashingEmbedder};
pub use infrastructure::local_store::LocalVectorStore;
pub use infrastructure::vector_db::{qdrant_client, VectorDb};

pub mod embedder;
pub mod outreach;
pub mod portfolio;
pub mod vector_repository;

use anyhow::Result;

/// Turns text into fixed-length vectors.
///
/// Implementations must return one vector per input, in input order, each of
/// length [`Embedder::dimension`].
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize;
}

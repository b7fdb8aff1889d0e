use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::portfolio::PortfolioMatch;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("model returned empty content")]
    EmptyContent,

    #[error("sender context is required to draft an email")]
    MissingContext,

    #[error("API key environment variable {0} is not set")]
    MissingApiKey(String),
}

/// A job posting as extracted by the language model.
///
/// Every field is optional because the model output is not guaranteed to follow
/// the requested shape; unknown keys are preserved in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub experience: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub skills: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A drafted outreach email together with the evidence it was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftedEmail {
    pub job: JobPosting,
    pub matches: Vec<PortfolioMatch>,
    pub email: String,
}

/// The external text-generation service, seen through its two document-level calls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutreachGenerator: Send + Sync {
    /// Extracts job postings from cleaned page text.
    async fn extract_jobs(&self, page_text: &str) -> Result<Vec<JobPosting>, GenerationError>;

    /// Drafts an outreach email for `job`, showcasing `links`, written from `context`.
    async fn write_mail(
        &self,
        job: &JobPosting,
        links: &[String],
        context: &str,
    ) -> Result<String, GenerationError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_posting_tolerates_loose_shapes() {
        let job: JobPosting = serde_json::from_value(json!({
            "role": "Backend Engineer",
            "experience": 3,
            "skills": "Rust",
            "location": "Remote"
        }))
        .unwrap();
        assert_eq!(job.role.as_deref(), Some("Backend Engineer"));
        assert_eq!(job.experience, json!(3));
        assert_eq!(job.skills, json!("Rust"));
        assert_eq!(job.extra.get("location"), Some(&json!("Remote")));

        let empty: JobPosting = serde_json::from_value(json!({})).unwrap();
        assert!(empty.skills.is_null());
        assert_eq!(serde_json::to_value(&empty).unwrap(), json!({}));
    }
}

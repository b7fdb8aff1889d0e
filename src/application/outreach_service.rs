use anyhow::Result;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::application::portfolio_service::PortfolioStore;
use crate::config::OutreachConfig;
use crate::domain::outreach::{DraftedEmail, GenerationError, OutreachGenerator};
use crate::domain::portfolio::Skills;
use crate::infrastructure::web::{fetch_page, TextCleaner};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum OutreachError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("no job postings could be extracted from the page")]
    NoJobs,
}

/// Runs the whole flow: page text, job postings, matching portfolio links, emails.
pub struct OutreachService {
    portfolio: Arc<PortfolioStore>,
    generator: Arc<dyn OutreachGenerator>,
    http: Client,
    cleaner: TextCleaner,
    default_context: Option<String>,
}

impl OutreachService {
    pub fn new(
        portfolio: Arc<PortfolioStore>,
        generator: Arc<dyn OutreachGenerator>,
        config: &OutreachConfig,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(FETCH_TIMEOUT)
            .build()?;
        Ok(Self {
            portfolio,
            generator,
            http,
            cleaner: TextCleaner::new()?,
            default_context: config
                .context
                .clone()
                .filter(|c| !c.trim().is_empty()),
        })
    }

    pub fn portfolio(&self) -> &Arc<PortfolioStore> {
        &self.portfolio
    }

    /// Fetches `url`, cleans the page and drafts one email per extracted job.
    pub async fn draft_from_url(
        &self,
        url: &str,
        context: Option<&str>,
    ) -> Result<Vec<DraftedEmail>, OutreachError> {
        let context = self.resolve_context(context)?;
        let html = fetch_page(&self.http, url)
            .await
            .map_err(|source| OutreachError::Fetch {
                url: url.to_string(),
                source,
            })?;
        let page_text = self.cleaner.clean(&html);
        self.draft(&page_text, &context).await
    }

    /// Drafts one email per job extracted from already cleaned `page_text`.
    pub async fn draft_from_text(
        &self,
        page_text: &str,
        context: Option<&str>,
    ) -> Result<Vec<DraftedEmail>, OutreachError> {
        let context = self.resolve_context(context)?;
        self.draft(page_text, &context).await
    }

    // A request context wins over the configured default; one of them must be set.
    fn resolve_context(&self, context: Option<&str>) -> Result<String, OutreachError> {
        context
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .or_else(|| self.default_context.clone())
            .ok_or(OutreachError::Generation(GenerationError::MissingContext))
    }

    async fn draft(&self, page_text: &str, context: &str) -> Result<Vec<DraftedEmail>, OutreachError> {
        match self.portfolio.document_count().await {
            Ok(0) => log::warn!("Portfolio collection is empty; emails will carry no portfolio links."),
            Ok(_) => {}
            Err(e) => log::warn!("Portfolio store unavailable ({}); emails will carry no portfolio links.", e),
        }

        let jobs = self.generator.extract_jobs(page_text).await?;
        if jobs.is_empty() {
            return Err(OutreachError::NoJobs);
        }

        let mut drafts = Vec::with_capacity(jobs.len());
        for job in jobs {
            let matches = self.portfolio.query_links(Skills::from_json(&job.skills)).await;
            let links: Vec<String> = matches.iter().map(|m| m.link.clone()).collect();
            log::info!(
                "Drafting email for role {:?} with {} portfolio links.",
                job.role,
                links.len()
            );
            let email = self.generator.write_mail(&job, &links, context).await?;
            drafts.push(DraftedEmail {
                job,
                matches,
                email,
            });
        }
        Ok(drafts)
    }
}

use anyhow::{Context, Result};
use regex::Regex;
use reqwest::Client;

/// Fetches `url` and returns the response body as text.
pub async fn fetch_page(client: &Client, url: &str) -> Result<String, reqwest::Error> {
    log::info!("Fetching page {}...", url);
    let body = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    log::debug!("Fetched {} bytes from {}.", body.len(), url);
    Ok(body)
}

/// Turns a scraped HTML page into plain words suitable for job extraction.
pub struct TextCleaner {
    script_or_style: Regex,
    url: Regex,
    disallowed: Regex,
}

impl TextCleaner {
    pub fn new() -> Result<Self> {
        Ok(Self {
            script_or_style: Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>")
                .context("failed to compile script/style regex")?,
            url: Regex::new(r"https?://\S+").context("failed to compile URL regex")?,
            disallowed: Regex::new(r"[^a-zA-Z0-9 ]").context("failed to compile character regex")?,
        })
    }

    /// Drops script and style blocks, tags, URLs and anything other than ASCII
    /// letters, digits and spaces, then collapses runs of whitespace.
    pub fn clean(&self, html: &str) -> String {
        let without_blocks = self.script_or_style.replace_all(html, " ");
        let text = html_to_text(&without_blocks);
        let text = self.url.replace_all(&text, " ");
        let text: String = text
            .chars()
            .map(|c| if c.is_whitespace() { ' ' } else { c })
            .collect();
        let text = self.disallowed.replace_all(&text, "");
        text.split_whitespace().collect::<Vec<&str>>().join(" ")
    }
}

// Strips tags; each tag counts as a word break.
fn html_to_text(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                result.push(' ');
            }
            _ if !in_tag => result.push(c),
            _ => {}
        }
    }
    result
}

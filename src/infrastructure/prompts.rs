// Prompt templates for the text-generation client.

/// System prompt for the extraction call.
pub const EXTRACT_SYSTEM: &str = "You extract structured data from scraped web pages. \
    Respond with valid JSON only. Do not add explanations or apologies.";

/// System prompt for the drafting call.
pub const EMAIL_SYSTEM: &str = "You write concise, professional cold emails. \
    Do not provide a preamble.";

pub fn extract_jobs_prompt(page_data: &str) -> String {
    format!(
        "### SCRAPED TEXT FROM WEBSITE:\n\
         {page_data}\n\
         ### INSTRUCTION:\n\
         Extract the job postings in a concise JSON format with keys: `role`, `experience`, `skills`, and `description`.\n\
         Limit to the most relevant job details if multiple exist.\n\
         Only return valid JSON.\n\
         ### VALID JSON (NO PREAMBLE):"
    )
}

pub fn write_mail_prompt(job_description: &str, context: &str, links: &[String]) -> String {
    let link_list = if links.is_empty() {
        "(none available)".to_string()
    } else {
        links
            .iter()
            .map(|l| format!("- {}", l))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "### JOB DESCRIPTION:\n\
         {job_description}\n\n\
         ### INSTRUCTION:\n\
         {context}\n\
         Also add the most relevant ones from the following links to showcase the portfolio:\n\
         {link_list}\n\
         Do not provide a preamble.\n\
         ### EMAIL (NO PREAMBLE):"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mail_prompt_lists_links_flat() {
        let prompt = write_mail_prompt(
            "{\"role\":\"SRE\"}",
            "I am Ana from Acme.",
            &["https://a.example".to_string(), "https://b.example".to_string()],
        );
        assert!(prompt.contains("I am Ana from Acme."));
        assert!(prompt.contains("- https://a.example\n- https://b.example"));
        assert!(prompt.ends_with("### EMAIL (NO PREAMBLE):"));
    }

    #[test]
    fn mail_prompt_without_links() {
        let prompt = write_mail_prompt("{}", "ctx", &[]);
        assert!(prompt.contains("(none available)"));
    }
}

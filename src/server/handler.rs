use rmcp::serde_json::json;
use rmcp::{
    model::{
        CallToolResult, Content, GetPromptRequestParam, GetPromptResult, Implementation,
        ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult, PaginatedRequestParam,
        ProtocolVersion, ReadResourceRequestParam, ReadResourceResult, ServerCapabilities,
        ServerInfo,
    },
    schemars::{self, JsonSchema},
    service::RequestContext,
    tool, Error as McpError, RoleServer, ServerHandler,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::config::AppConfig;
use crate::domain::portfolio::{PortfolioTable, Skills};
use crate::infrastructure::table::{parse_table, read_table, validate_rows, TEMPLATE_CSV};
use crate::initialization::{AppServices, ServicesState};

const INITIALIZING_MESSAGE: &str =
    "The portfolio service is still initializing. Please try again shortly.";

/// Handler for the MCP server logic.
#[derive(Clone)]
pub struct ColdMailHandler {
    // Filled in by the background bootstrap
    pub services_state: ServicesState,
    pub config: Arc<AppConfig>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct LoadPortfolioArgs {
    #[schemars(description = "Path to a CSV file with the header 'Techstack,Links'")]
    csv_path: Option<String>,
    #[schemars(description = "Inline CSV content with the header 'Techstack,Links' (alternative to csv_path)")]
    csv: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct QueryPortfolioArgs {
    #[schemars(description = "A skill or a list of skills, e.g. [\"Python\", \"Django\"]")]
    skills: Value,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct DraftEmailsArgs {
    #[schemars(description = "URL of a careers page to fetch")]
    url: Option<String>,
    #[schemars(description = "Job posting text to use instead of fetching a URL")]
    text: Option<String>,
    #[schemars(description = "Who the sender is and what they offer; falls back to the configured context")]
    context: Option<String>,
}

#[derive(Debug, Serialize)]
struct PortfolioStatus {
    documents: usize,
    table_path: String,
    result_limit: usize,
    drafting_enabled: bool,
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    match serde_json::to_string(value) {
        Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
        Err(e) => {
            log::error!("Failed to serialize tool result: {}", e);
            Ok(CallToolResult::error(vec![Content::text(format!(
                "Failed to serialize result: {}",
                e
            ))]))
        }
    }
}

fn error_result(message: impl Into<String>) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(message.into())]))
}

#[tool(tool_box)]
impl ColdMailHandler {
    /// Creates a new handler instance with uninitialized service state.
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self {
            services_state: Arc::new(Mutex::new(None)),
            config,
        }
    }

    fn services(&self) -> Option<Arc<AppServices>> {
        match self.services_state.lock() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replaces the whole portfolio collection with a user-supplied table.
    ///
    /// The column contract is enforced by the store; row content (delimiter,
    /// URL shape) is checked here and any issue blocks the load.
    #[tool(description = "Replace the portfolio with a Techstack,Links CSV table (file path or inline content).")]
    async fn portfolio_load(
        &self,
        #[tool(aggr)] args: LoadPortfolioArgs,
    ) -> Result<CallToolResult, McpError> {
        let Some(services) = self.services() else {
            log::warn!("portfolio_load called but services are not yet initialized.");
            return error_result(INITIALIZING_MESSAGE);
        };

        let parsed = match (args.csv_path.as_deref(), args.csv.as_deref()) {
            (Some(path), None) => read_table(Path::new(path)),
            (None, Some(csv)) => parse_table(csv.as_bytes(), Path::new("<inline>")),
            _ => return error_result("Provide exactly one of 'csv_path' or 'csv'."),
        };
        let table: PortfolioTable = match parsed {
            Ok(table) => table,
            Err(e) => return error_result(e.to_string()),
        };
        if let Err(e) = table.check_schema() {
            return error_result(e.to_string());
        }

        let issues = validate_rows(&table);
        if !issues.is_empty() {
            let listing: Vec<String> = issues.iter().map(ToString::to_string).collect();
            log::warn!("Rejected portfolio table with {} issues.", issues.len());
            return error_result(format!(
                "The portfolio table has issues:\n{}",
                listing.join("\n")
            ));
        }

        match services.portfolio.load_custom_portfolio(&table).await {
            Ok(count) => Ok(CallToolResult::success(vec![Content::text(format!(
                "Loaded {} portfolio entries.",
                count
            ))])),
            Err(e) => {
                log::error!("Portfolio load failed: {}", e);
                error_result(format!("Portfolio load failed: {}", e))
            }
        }
    }

    /// Returns the matches as a JSON array of `{techstack, link}` objects.
    #[tool(description = "Find the portfolio items that best match a skill or list of skills.")]
    async fn portfolio_query(
        &self,
        #[tool(aggr)] args: QueryPortfolioArgs,
    ) -> Result<CallToolResult, McpError> {
        let Some(services) = self.services() else {
            log::warn!("portfolio_query called but services are not yet initialized.");
            return error_result(INITIALIZING_MESSAGE);
        };

        let skills = Skills::from_json(&args.skills);
        log::info!("Executing portfolio_query with skills {:?}", skills.terms());
        match services.portfolio.try_query_links(&skills).await {
            Ok(matches) => json_result(&matches),
            Err(e) => {
                log::error!("Portfolio query failed: {}", e);
                error_result(format!("Portfolio query failed: {}", e))
            }
        }
    }

    #[tool(description = "Report the number of stored portfolio documents and related settings.")]
    async fn portfolio_status(&self) -> Result<CallToolResult, McpError> {
        let Some(services) = self.services() else {
            return error_result(INITIALIZING_MESSAGE);
        };
        match services.portfolio.document_count().await {
            Ok(documents) => json_result(&PortfolioStatus {
                documents,
                table_path: services.table_path.display().to_string(),
                result_limit: services.portfolio.settings().result_limit,
                drafting_enabled: services.outreach.is_some(),
            }),
            Err(e) => error_result(format!("Failed to read portfolio status: {}", e)),
        }
    }

    #[tool(description = "Return an example portfolio CSV with the required 'Techstack,Links' header.")]
    async fn portfolio_template(&self) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult::success(vec![Content::text(TEMPLATE_CSV)]))
    }

    /// Drafts one email per job found at `url` (or in `text`), showcasing matched links.
    #[tool(description = "Extract job postings from a careers page or text and draft one cold email per job.")]
    async fn draft_cold_emails(
        &self,
        #[tool(aggr)] args: DraftEmailsArgs,
    ) -> Result<CallToolResult, McpError> {
        let Some(services) = self.services() else {
            return error_result(INITIALIZING_MESSAGE);
        };
        let Some(outreach) = services.outreach.clone() else {
            return error_result(format!(
                "Email drafting is not configured: set the {} environment variable and restart.",
                self.config.llm.api_key_env
            ));
        };

        let context = args.context.as_deref();
        let drafted = match (args.url.as_deref(), args.text.as_deref()) {
            (Some(url), None) => outreach.draft_from_url(url, context).await,
            (None, Some(text)) => outreach.draft_from_text(text, context).await,
            _ => return error_result("Provide exactly one of 'url' or 'text'."),
        };
        match drafted {
            Ok(drafts) => json_result(&drafts),
            Err(e) => {
                log::error!("Drafting failed: {}", e);
                error_result(format!("Drafting failed: {}", e))
            }
        }
    }
}

#[tool(tool_box)]
impl ServerHandler for ColdMailHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "This server matches job skills against a portfolio of prior work and drafts cold emails showcasing the matches."
                    .into(),
            ),
        }
    }

    async fn list_resources(
        &self,
        _request: PaginatedRequestParam,
        _: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        Ok(ListResourcesResult {
            resources: vec![],
            next_cursor: None,
        })
    }

    async fn read_resource(
        &self,
        ReadResourceRequestParam { uri }: ReadResourceRequestParam,
        _: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        Err(McpError::resource_not_found(
            "Resource feature not implemented",
            Some(json!({ "uri": uri })),
        ))
    }

    async fn list_prompts(
        &self,
        _request: PaginatedRequestParam,
        _: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, McpError> {
        Ok(ListPromptsResult {
            next_cursor: None,
            prompts: vec![],
        })
    }

    async fn get_prompt(
        &self,
        GetPromptRequestParam { name, arguments: _ }: GetPromptRequestParam,
        _: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        Err(McpError::invalid_params(
            format!("Prompt feature not implemented: {}", name),
            None,
        ))
    }

    async fn list_resource_templates(
        &self,
        _request: PaginatedRequestParam,
        _: RequestContext<RoleServer>,
    ) -> Result<ListResourceTemplatesResult, McpError> {
        Ok(ListResourceTemplatesResult {
            next_cursor: None,
            resource_templates: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::portfolio_service::{PortfolioStore, StoreSettings};
    use crate::domain::portfolio::PortfolioMatch;
    use crate::infrastructure::embedding::HashingEmbedder;
    use crate::infrastructure::local_store::LocalVectorStore;
    use std::path::PathBuf;
    use tempfile::{tempdir, TempDir};

    fn text_of(result: &CallToolResult) -> String {
        result.content[0]
            .raw
            .as_text()
            .expect("Expected text")
            .text
            .clone()
    }

    fn setup_handler_for_unit_test() -> (ColdMailHandler, TempDir) {
        let dir = tempdir().unwrap();
        let repository = LocalVectorStore::open(dir.path(), "portfolio", 1024).unwrap();
        let portfolio = PortfolioStore::new(
            Arc::new(HashingEmbedder::new(1024)),
            Arc::new(repository),
            StoreSettings::default(),
        );
        let services = AppServices {
            portfolio: Arc::new(portfolio),
            outreach: None,
            table_path: PathBuf::from("resource/my_portfolio.csv"),
        };
        let handler = ColdMailHandler {
            services_state: Arc::new(Mutex::new(Some(Arc::new(services)))),
            config: Arc::new(AppConfig::default()),
        };
        (handler, dir)
    }

    fn load_args(csv: &str) -> LoadPortfolioArgs {
        LoadPortfolioArgs {
            csv_path: None,
            csv: Some(csv.to_string()),
        }
    }

    #[tokio::test]
    async fn load_then_query_returns_best_match_first() {
        let (handler, _dir) = setup_handler_for_unit_test();
        let csv = "Techstack,Links\n\
                   Python | Django,https://a.example/x\n\
                   Go | Kubernetes,https://b.example/y\n";
        let loaded = handler.portfolio_load(load_args(csv)).await.unwrap();
        assert_eq!(loaded.is_error, Some(false));
        assert_eq!(text_of(&loaded), "Loaded 2 portfolio entries.");

        let result = handler
            .portfolio_query(QueryPortfolioArgs {
                skills: json!(["Python"]),
            })
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(false));
        let matches: Vec<PortfolioMatch> = serde_json::from_str(&text_of(&result)).unwrap();
        assert_eq!(
            matches[0],
            PortfolioMatch {
                techstack: "Python | Django".to_string(),
                link: "https://a.example/x".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn load_rejects_wrong_header_and_bad_rows() {
        let (handler, _dir) = setup_handler_for_unit_test();

        let wrong_header = handler
            .portfolio_load(load_args("Links,Techstack\nhttps://a.example,Rust | Tokio\n"))
            .await
            .unwrap();
        assert_eq!(wrong_header.is_error, Some(true));
        assert!(text_of(&wrong_header).contains("'Techstack' and 'Links'"));

        let bad_rows = handler
            .portfolio_load(load_args("Techstack,Links\nRust,not a url\n"))
            .await
            .unwrap();
        assert_eq!(bad_rows.is_error, Some(true));
        assert!(text_of(&bad_rows).contains("Row 1: Invalid URL format"));

        let status = handler.portfolio_status().await.unwrap();
        assert!(text_of(&status).contains("\"documents\":0"));
    }

    #[tokio::test]
    async fn load_needs_exactly_one_source() {
        let (handler, _dir) = setup_handler_for_unit_test();
        let result = handler
            .portfolio_load(LoadPortfolioArgs {
                csv_path: None,
                csv: None,
            })
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
    }

    #[tokio::test]
    async fn empty_skills_yield_empty_list() {
        let (handler, _dir) = setup_handler_for_unit_test();
        let result = handler
            .portfolio_query(QueryPortfolioArgs {
                skills: json!(["", "  ", null]),
            })
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(false));
        assert_eq!(text_of(&result), "[]");
    }

    #[tokio::test]
    async fn drafting_without_llm_client_is_reported() {
        let (handler, _dir) = setup_handler_for_unit_test();
        let result = handler
            .draft_cold_emails(DraftEmailsArgs {
                url: None,
                text: Some("Rust engineer".to_string()),
                context: Some("ctx".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert!(text_of(&result).contains("GROQ_API_KEY"));
    }

    #[tokio::test]
    async fn tools_report_initializing_state() {
        let handler = ColdMailHandler::new(Arc::new(AppConfig::default()));
        let result = handler
            .portfolio_query(QueryPortfolioArgs {
                skills: json!("Rust"),
            })
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert!(text_of(&result).contains("service is still initializing"));

        // the template needs no services
        let template = handler.portfolio_template().await.unwrap();
        assert!(text_of(&template).starts_with("Techstack,Links\n"));
    }
}

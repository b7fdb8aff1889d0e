use rmcp::ServiceExt;
use std::sync::Arc;
use tokio::io::{stdin, stdout};

use cold_mail::config;
use cold_mail::initialization::initialize_background_services;
use cold_mail::server::handler::ColdMailHandler;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the MCP transport, so logs go to stderr
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();
    log::info!("cold-mail server (MCP over stdio) started.");

    let config = config::load_config()?;
    log::info!("Configuration loaded: {:?}", config.portfolio);
    let config_arc = Arc::new(config);

    let handler = ColdMailHandler::new(config_arc.clone());
    let services_state = handler.services_state.clone();

    // Start serving immediately; tools answer "still initializing" until bootstrap is done.
    let transport = (stdin(), stdout());
    log::info!("Starting MCP server listener...");
    let serve_future = handler.serve(transport);

    let init_config = config_arc.clone();
    tokio::spawn(async move {
        log::info!("Background initialization task started.");
        match initialize_background_services(init_config, services_state).await {
            Ok(()) => log::info!("Background initialization completed successfully."),
            Err(e) => log::error!("Background initialization failed: {:#}", e),
        }
    });

    let server_handle = serve_future.await.inspect_err(|e| {
        log::error!("serving error: {:?}", e);
    })?;

    log::info!("cold-mail server running, waiting for completion...");
    let shutdown_reason = server_handle.waiting().await?;
    log::info!("cold-mail server finished. Reason: {:?}", shutdown_reason);

    Ok(())
}

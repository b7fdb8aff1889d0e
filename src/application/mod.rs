pub mod outreach_service;
pub mod portfolio_service;

use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cold_mail::config::{self, AppConfig};
use cold_mail::domain::outreach::OutreachGenerator;
use cold_mail::infrastructure::table::{read_table, validate_rows, TEMPLATE_CSV, TEMPLATE_FILE_NAME};
use cold_mail::infrastructure::LlmClient;
use cold_mail::initialization::{build_portfolio_store, open_portfolio_store};
use cold_mail::{OutreachService, Skills};

const USAGE: &str = "Usage:
  portfolio load <csv>              replace the portfolio with a Techstack,Links table
  portfolio query <skill>...        show the best matching portfolio items
  portfolio count                   number of stored documents
  portfolio template [<out.csv>]    print (or write) an example table
  portfolio draft <url> [<context>] draft cold emails for the jobs on a careers page";

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    };

    match command.as_str() {
        "template" => template(rest.first().map(PathBuf::from)),
        "load" => {
            let [path] = rest else {
                bail!("load takes exactly one CSV path\n{}", USAGE);
            };
            load(&config::load_config()?, Path::new(path)).await
        }
        "query" => query(&config::load_config()?, rest).await,
        "count" => {
            let store = build_portfolio_store(&config::load_config()?).await?;
            println!("{}", store.document_count().await?);
            Ok(())
        }
        "draft" => {
            let Some(url) = rest.first() else {
                bail!("draft needs a URL\n{}", USAGE);
            };
            draft(&config::load_config()?, url, rest.get(1).map(String::as_str)).await
        }
        "-h" | "--help" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => Err(anyhow!("Unknown command '{}'\n{}", other, USAGE)),
    }
}

fn template(out: Option<PathBuf>) -> Result<()> {
    match out {
        Some(path) => {
            let path = if path.is_dir() { path.join(TEMPLATE_FILE_NAME) } else { path };
            std::fs::write(&path, TEMPLATE_CSV)
                .with_context(|| format!("Failed to write template to {:?}", path))?;
            println!("Wrote template to {:?}", path);
        }
        None => print!("{}", TEMPLATE_CSV),
    }
    Ok(())
}

async fn load(config: &AppConfig, path: &Path) -> Result<()> {
    let table = read_table(path)?;
    table.check_schema()?;
    let issues = validate_rows(&table);
    if !issues.is_empty() {
        for issue in &issues {
            eprintln!("{}", issue);
        }
        bail!("{:?} has {} issues; nothing was loaded", path, issues.len());
    }

    let store = open_portfolio_store(config).await?;
    let count = store.load_custom_portfolio(&table).await?;
    println!("Loaded {} portfolio entries from {:?}", count, path);
    Ok(())
}

async fn query(config: &AppConfig, terms: &[String]) -> Result<()> {
    let skills = Skills::new(terms);
    if skills.is_empty() {
        bail!("query needs at least one non-empty skill\n{}", USAGE);
    }
    let store = build_portfolio_store(config).await?;
    let matches = store.try_query_links(&skills).await?;
    if matches.is_empty() {
        println!("No matching portfolio items.");
    }
    for m in matches {
        println!("{}\t{}", m.techstack, m.link);
    }
    Ok(())
}

async fn draft(config: &AppConfig, url: &str, context: Option<&str>) -> Result<()> {
    let generator: Arc<dyn OutreachGenerator> = Arc::new(LlmClient::from_config(&config.llm)?);
    let store = Arc::new(build_portfolio_store(config).await?);
    let service = OutreachService::new(store, generator, &config.outreach)?;

    let drafts = service.draft_from_url(url, context).await?;
    for (index, drafted) in drafts.iter().enumerate() {
        println!(
            "=== Email {} ({}) ===",
            index + 1,
            drafted.job.role.as_deref().unwrap_or("unknown role")
        );
        println!("{}\n", drafted.email);
    }
    Ok(())
}

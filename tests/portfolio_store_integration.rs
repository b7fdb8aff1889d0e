use assert_matches::assert_matches;
use cold_mail::infrastructure::table::{default_table, write_table};
use cold_mail::{
    HashingEmbedder, LocalVectorStore, PortfolioEntry, PortfolioError, PortfolioStore,
    PortfolioTable, Skills, StoreSettings,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

const DIMENSION: usize = 1024;

fn open_store(store_dir: &Path) -> PortfolioStore {
    let repository = LocalVectorStore::open(store_dir, "portfolio", DIMENSION).unwrap();
    PortfolioStore::new(
        Arc::new(HashingEmbedder::new(DIMENSION)),
        Arc::new(repository),
        StoreSettings::default(),
    )
}

fn python_go_table() -> PortfolioTable {
    PortfolioTable::with_rows(vec![
        PortfolioEntry::new("Python | Django", "https://a.example/x"),
        PortfolioEntry::new("Go | Kubernetes", "https://b.example/y"),
    ])
}

#[tokio::test]
async fn python_query_ranks_python_entry_first() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    store.load_custom_portfolio(&python_go_table()).await.unwrap();

    let matches = store.query_links(vec!["Python"]).await;
    assert_eq!(matches[0].techstack, "Python | Django");
    assert_eq!(matches[0].link, "https://a.example/x");
}

#[tokio::test]
async fn empty_or_invalid_skills_return_nothing() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    store.load_custom_portfolio(&python_go_table()).await.unwrap();

    assert!(store.query_links(Vec::<String>::new()).await.is_empty());
    assert!(store.query_links(&json!(["", "  ", null])).await.is_empty());
    assert_eq!(
        store.try_query_links(&Skills::default()).await.unwrap(),
        Vec::new()
    );
}

#[tokio::test]
async fn load_count_matches_table_length_without_leftovers() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    for size in [5usize, 2, 0, 7] {
        let table = PortfolioTable::with_rows(
            (0..size)
                .map(|i| PortfolioEntry::new(format!("Tech{} | Extra", i), format!("https://t.example/{}", i)))
                .collect(),
        );
        assert_eq!(store.load_custom_portfolio(&table).await.unwrap(), size);
        assert_eq!(store.document_count().await.unwrap(), size);
    }
}

#[tokio::test]
async fn wrong_columns_are_rejected_and_prior_state_kept() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    store.load_custom_portfolio(&python_go_table()).await.unwrap();

    for columns in [["Links", "Techstack"], ["Tech", "Link"]] {
        let mut table = python_go_table();
        table.rows.push(PortfolioEntry::new("Rust | Tokio", "https://r.example"));
        table.columns = columns.iter().map(|c| c.to_string()).collect();
        assert_matches!(
            store.load_custom_portfolio(&table).await,
            Err(PortfolioError::Schema { .. })
        );
        assert_eq!(store.document_count().await.unwrap(), 2);
    }
    assert_eq!(store.query_links("Python").await[0].link, "https://a.example/x");
}

#[tokio::test]
async fn initialize_twice_keeps_document_count() {
    let dir = tempdir().unwrap();
    let table_path = dir.path().join("my_portfolio.csv");
    write_table(&table_path, &python_go_table()).unwrap();
    let store = open_store(&dir.path().join("vectorstore"));

    assert_eq!(store.initialize(&table_path).await.unwrap(), 2);
    // editing the table on disk does not affect an already populated collection
    write_table(&table_path, &default_table()).unwrap();
    assert_eq!(store.initialize(&table_path).await.unwrap(), 2);
    assert_eq!(store.document_count().await.unwrap(), 2);
    assert_eq!(store.query_links("Go").await[0].link, "https://b.example/y");
}

#[tokio::test]
async fn initialize_synthesizes_missing_table() {
    let dir = tempdir().unwrap();
    let table_path = dir.path().join("resource").join("my_portfolio.csv");
    let store = open_store(&dir.path().join("vectorstore"));

    assert_eq!(store.initialize(&table_path).await.unwrap(), default_table().len());
    assert!(table_path.exists());
}

#[tokio::test]
async fn results_are_capped_at_three() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let table = PortfolioTable::with_rows(
        (0..10)
            .map(|i| PortfolioEntry::new(format!("Rust | Tokio | Axum {}", i), format!("https://rust.example/{}", i)))
            .collect(),
    );
    store.load_custom_portfolio(&table).await.unwrap();

    let matches = store.query_links(vec!["Rust", "Tokio", "Axum"]).await;
    assert_eq!(matches.len(), 3);
}

#[tokio::test]
async fn collection_survives_reopen() {
    let dir = tempdir().unwrap();
    {
        let store = open_store(dir.path());
        store.load_custom_portfolio(&python_go_table()).await.unwrap();
    }
    let store = open_store(dir.path());
    assert_eq!(store.document_count().await.unwrap(), 2);
    assert_eq!(store.query_links("Kubernetes").await[0].techstack, "Go | Kubernetes");
}

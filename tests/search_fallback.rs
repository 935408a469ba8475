//! Search keeps answering when the vector path is down

mod common;

use std::sync::Arc;

use common::{FlakyStore, GatedStore, SkillFixture};
use skillrun_registry::{InstallOptions, InstallSource, RegistryConfig, SkillManager};
use skillrun_retrieval::{
    HashingEmbedder, RetrievalConfig, RetrievalEngine, SearchOptions, SearchPath,
};
use tempfile::TempDir;

async fn setup(dir: &TempDir) -> (Arc<FlakyStore>, Arc<RetrievalEngine>, SkillManager) {
    let store = FlakyStore::new();
    let retrieval = Arc::new(RetrievalEngine::new(
        Arc::new(HashingEmbedder::default()),
        store.clone(),
        RetrievalConfig::default(),
    ));
    let manager = SkillManager::open(
        RegistryConfig::with_root(dir.path().join("registry")),
        Arc::clone(&retrieval),
    )
    .await
    .unwrap();

    for (name, description) in [
        ("file-reader", "reads files from disk"),
        ("http-fetch", "downloads web pages over http"),
    ] {
        let source = SkillFixture::new(name, description).write_dir(dir.path());
        manager
            .install(InstallSource::Directory(source), InstallOptions::default())
            .await
            .unwrap();
    }
    (store, retrieval, manager)
}

#[tokio::test]
async fn keyword_fallback_finds_skill_when_store_fails() {
    let dir = TempDir::new().unwrap();
    let (store, retrieval, _manager) = setup(&dir).await;
    store.break_search();

    let outcome = retrieval
        .search_detailed("read file", &SearchOptions::default().skip_cache())
        .await;
    assert_eq!(outcome.path, SearchPath::Keyword);
    assert!(outcome.degraded_reason.is_some());
    let top = outcome.results.first().expect("fallback returned nothing");
    assert_eq!(top.name, "file-reader");
    assert!(top.score > 0.0);
    assert!(outcome.results.iter().all(|hit| hit.name != "http-fetch"));
}

#[tokio::test]
async fn vector_path_is_used_while_store_is_healthy() {
    let dir = TempDir::new().unwrap();
    let (_store, retrieval, _manager) = setup(&dir).await;
    const QUERY: &str = "http-fetch: downloads web pages over http";

    let outcome = retrieval
        .search_detailed(QUERY, &SearchOptions::default())
        .await;
    assert_eq!(outcome.path, SearchPath::Vector);
    assert_eq!(outcome.results[0].name, "http-fetch");

    // same query again is answered by the cache
    let again = retrieval
        .search_detailed(QUERY, &SearchOptions::default())
        .await;
    assert_eq!(again.path, SearchPath::Cache);
    assert_eq!(again.results, outcome.results);
}

#[tokio::test]
async fn uninstalled_skill_disappears_from_fallback() {
    let dir = TempDir::new().unwrap();
    let (store, retrieval, manager) = setup(&dir).await;
    manager.uninstall("file-reader").await.unwrap();
    store.break_search();

    let results = retrieval
        .search("read file", &SearchOptions::default().skip_cache())
        .await;
    assert!(results.iter().all(|hit| hit.name != "file-reader"));
}

#[tokio::test]
async fn search_racing_an_uninstall_does_not_repopulate_the_cache() {
    const QUERY: &str = "file-reader: reads files from disk";
    let dir = TempDir::new().unwrap();
    let store = GatedStore::new();
    let retrieval = Arc::new(RetrievalEngine::new(
        Arc::new(HashingEmbedder::default()),
        store.clone(),
        RetrievalConfig::default(),
    ));
    let manager = SkillManager::open(
        RegistryConfig::with_root(dir.path().join("registry")),
        Arc::clone(&retrieval),
    )
    .await
    .unwrap();
    let source = SkillFixture::new("file-reader", "reads files from disk").write_dir(dir.path());
    manager
        .install(InstallSource::Directory(source), InstallOptions::default())
        .await
        .unwrap();

    store.close_gate();
    let in_flight = tokio::spawn({
        let retrieval = Arc::clone(&retrieval);
        async move { retrieval.search_detailed(QUERY, &SearchOptions::default()).await }
    });
    store.reached.notified().await;

    manager.uninstall("file-reader").await.unwrap();
    store.open_gate();
    let stale = in_flight.await.unwrap();
    assert_eq!(stale.path, SearchPath::Vector);
    assert_eq!(stale.results[0].name, "file-reader");

    let fresh = retrieval
        .search_detailed(QUERY, &SearchOptions::default())
        .await;
    assert_eq!(fresh.path, SearchPath::Vector);
    assert!(fresh.results.iter().all(|hit| hit.name != "file-reader"));
}

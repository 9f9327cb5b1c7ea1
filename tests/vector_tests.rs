// Copyright (c) 2025 Ragstream Contributors
// SPDX-License-Identifier: BUSL-1.1
//! Integration tests for the two vector store variants.

mod common;

use common::{doc_chunk, preloaded_provider};
use ragstream::vector::shared::{SharedIndexConfig, TENANT_KEY};
use ragstream::vector::{IsolatedDirStore, SharedIndexStore, VectorStore};
use std::time::Duration;

fn isolated_store(dir: &tempfile::TempDir) -> IsolatedDirStore {
    IsolatedDirStore::new(
        dir.path().to_path_buf(),
        preloaded_provider(),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn shared_store() -> SharedIndexStore {
    SharedIndexStore::new(
        SharedIndexConfig::default(),
        preloaded_provider(),
        Duration::from_secs(5),
        None,
    )
    .unwrap()
}

#[tokio::test]
async fn test_isolated_store_partitions_tenants() {
    let dir = tempfile::tempdir().unwrap();
    let store = isolated_store(&dir);

    store
        .add_documents("alice", &[doc_chunk("a", 0, "quarterly revenue figures")])
        .await
        .unwrap();
    store
        .add_documents("bob", &[doc_chunk("b", 0, "quarterly revenue figures")])
        .await
        .unwrap();

    // Identical content, but each tenant only ever sees their own copy.
    let alice = store.search("alice", "revenue", 10).await.unwrap();
    assert_eq!(alice.len(), 1);
    assert_eq!(store.count("alice").await.unwrap(), 1);
    assert_eq!(store.count("bob").await.unwrap(), 1);

    store.delete_documents("alice", "a").await.unwrap();
    assert_eq!(store.count("alice").await.unwrap(), 0);
    assert_eq!(store.count("bob").await.unwrap(), 1);
}

#[tokio::test]
async fn test_isolated_store_results_ordered_best_first() {
    let dir = tempfile::tempdir().unwrap();
    let store = isolated_store(&dir);

    store
        .add_documents(
            "alice",
            &[
                doc_chunk("d", 0, "completely unrelated gardening advice"),
                doc_chunk("d", 1, "rust borrow checker rules"),
                doc_chunk("d", 2, "rust borrow checker rules explained"),
            ],
        )
        .await
        .unwrap();

    let results = store
        .search_with_score("alice", "rust borrow checker rules", 3)
        .await
        .unwrap();
    assert_eq!(results.len(), 3);
    for pair in results.windows(2) {
        assert!(pair[0].1 <= pair[1].1, "distances must ascend");
    }
    assert_eq!(results[0].0.content, "rust borrow checker rules");
}

#[tokio::test]
async fn test_shared_store_filters_tenants() {
    let store = shared_store();

    store
        .add_documents("alice", &[doc_chunk("a", 0, "internal roadmap notes")])
        .await
        .unwrap();
    store
        .add_documents("bob", &[doc_chunk("b", 0, "internal roadmap notes")])
        .await
        .unwrap();

    let results = store.search("bob", "roadmap", 10).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].metadata.get(TENANT_KEY).unwrap(), "bob");
}

#[tokio::test]
async fn test_shared_store_query_for_unknown_tenant_is_empty() {
    let store = shared_store();
    store
        .add_documents("alice", &[doc_chunk("a", 0, "something")])
        .await
        .unwrap();

    assert!(store.search("nobody", "something", 10).await.unwrap().is_empty());
    assert_eq!(store.count("nobody").await.unwrap(), 0);
}

#[tokio::test]
async fn test_variants_agree_on_similarity_range() {
    let dir = tempfile::tempdir().unwrap();
    let isolated = isolated_store(&dir);
    let shared = shared_store();

    for store in [&isolated as &dyn VectorStore, &shared as &dyn VectorStore] {
        store
            .add_documents("t", &[doc_chunk("d", 0, "the quick brown fox")])
            .await
            .unwrap();
        let results = store.search("t", "the quick brown fox", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        // An exact text match embeds identically; similarity rounds to 1.
        assert!((results[0].similarity - 1.0).abs() < 0.01);
    }
}

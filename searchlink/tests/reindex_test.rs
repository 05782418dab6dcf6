//! Reindexing between indices and clusters

mod common;

use common::{page, status_response, MockClient};
use searchlink::actions::OpType;
use searchlink::reindex::{reindex, reindex_to, ReindexOptions};
use searchlink::transport::{SearchHits, SearchResponse, ShardStats};
use searchlink::Error;
use serde_json::json;
use std::sync::Arc;

fn source_pages() -> MockClient {
    let first = SearchResponse {
        scroll_id: Some("scroll1".into()),
        shards: Some(ShardStats {
            total: 1,
            successful: 1,
            skipped: 0,
            failed: 0,
        }),
        hits: SearchHits {
            hits: vec![
                json!({
                    "_index": "test_index",
                    "_id": "42",
                    "_routing": "es",
                    "_source": {"answer": 42, "correct": true}
                }),
                json!({
                    "_index": "test_index",
                    "_id": "47",
                    "fields": {"_routing": ["py"]},
                    "_source": {"answer": 47, "correct": false}
                }),
            ],
        },
    };
    MockClient::new().with_pages(first, vec![])
}

#[tokio::test]
async fn test_reindex_copies_documents_with_routing() {
    let client = Arc::new(source_pages());

    let summary = reindex(
        client.clone(),
        "test_index",
        "prod_index",
        Some(json!({"query": {"match_all": {}}})),
        ReindexOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(summary.success, 2);
    assert_eq!(summary.failed, 0);

    let sent = client.sent_actions();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|a| a.index.as_deref() == Some("prod_index")));
    assert!(sent.iter().all(|a| a.op_type == OpType::Index));
    assert_eq!(sent[0].id.as_deref(), Some("42"));
    assert_eq!(sent[0].routing.as_deref(), Some("es"));
    assert_eq!(sent[0].source, Some(json!({"answer": 42, "correct": true})));
    assert_eq!(sent[1].routing.as_deref(), Some("py"));

    let searches = client.searches.lock();
    assert_eq!(searches[0].0, "test_index");
    assert_eq!(client.clear_calls(), 1);
}

#[tokio::test]
async fn test_reindex_to_another_cluster() {
    let source = Arc::new(source_pages());
    let target = Arc::new(MockClient::new());

    let summary = reindex_to(
        source.clone(),
        target.clone(),
        "test_index",
        "prod_index",
        None,
        ReindexOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(summary.success, 2);
    assert_eq!(source.bulk_calls(), 0);
    assert_eq!(target.bulk_calls(), 1);
}

#[tokio::test]
async fn test_reindex_with_op_type_create() {
    let client = Arc::new(source_pages());
    let options = ReindexOptions {
        op_type: Some(OpType::Create),
        ..Default::default()
    };

    reindex(client.clone(), "test_index", "prod_index", None, options)
        .await
        .unwrap();

    assert!(client
        .sent_actions()
        .iter()
        .all(|a| a.op_type == OpType::Create));
}

#[tokio::test]
async fn test_reindex_respects_chunk_size() {
    let client = Arc::new(source_pages());
    let mut options = ReindexOptions::default();
    options.bulk.chunk_size = 1;

    reindex(client.clone(), "test_index", "prod_index", None, options)
        .await
        .unwrap();

    assert_eq!(client.bulk_calls(), 2);
}

#[tokio::test]
async fn test_reindex_fails_on_item_errors() {
    let source = Arc::new(source_pages());
    let target = Arc::new(MockClient::with_bulk(|_, actions| {
        Ok(status_response(actions, &[201, 409]))
    }));

    let err = reindex_to(source, target, "test_index", "prod_index", None, ReindexOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.bulk_errors().map(|e| e.len()), Some(1));
}

#[tokio::test]
async fn test_reindex_aborts_on_inconsistent_scroll() {
    let client = Arc::new(MockClient::new().with_pages(
        page(Some("scroll1"), vec!["a"], Some((2, 2, 0))),
        vec![Ok(page(Some("scroll2"), vec!["b"], Some((2, 1, 0))))],
    ));

    let err = reindex(client.clone(), "test_index", "prod_index", None, ReindexOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Scan { .. }));
    assert_eq!(client.bulk_calls(), 0);
}

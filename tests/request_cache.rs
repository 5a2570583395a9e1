//! Cache behaviour as seen through the API client: hits, expiry, write
//! invalidation, coalescing and base fallback.

mod common;

use std::sync::Arc;
use std::time::Duration;

use adflow_client::api::types::{CreateExperimentRequest, ExperimentVariantInput, ListTasksParams};
use adflow_client::api::{ApiError, Method, RawResponse};
use adflow_client::{ErrorKind, ManualClock};
use common::*;
use serde_json::json;

fn one_task() -> serde_json::Value {
    tasks_page(json!([{ "id": "1", "title": "Watch", "status": "completed", "product_name": "Watch" }]))
}

fn page(n: u32) -> ListTasksParams {
    ListTasksParams { page: Some(n), page_size: Some(20), status: None }
}

#[tokio::test]
async fn repeated_reads_are_served_from_cache() {
    let transport = ScriptedTransport::new();
    transport.ok(Method::Get, "/creative/tasks", one_task());
    let client = client_with(transport.clone(), Arc::new(ManualClock::new(0)));

    let first = client.list_tasks(&page(1)).await.unwrap();
    let second = client.list_tasks(&page(1)).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(transport.count(Method::Get, "/creative/tasks"), 1);

    client.list_tasks(&page(2)).await.unwrap();
    assert_eq!(transport.count(Method::Get, "/creative/tasks"), 2, "different params, different slot");
}

#[tokio::test]
async fn entries_expire_after_sixty_seconds() {
    let transport = ScriptedTransport::new();
    transport.ok(Method::Get, "/creative/tasks", one_task());
    let clock = Arc::new(ManualClock::new(0));
    let client = client_with(transport.clone(), clock.clone());

    client.list_tasks(&page(1)).await.unwrap();
    clock.advance(Duration::from_millis(59_999));
    client.list_tasks(&page(1)).await.unwrap();
    assert_eq!(transport.count(Method::Get, "/creative/tasks"), 1);

    clock.advance(Duration::from_millis(1));
    client.list_tasks(&page(1)).await.unwrap();
    assert_eq!(transport.count(Method::Get, "/creative/tasks"), 2);
}

#[tokio::test]
async fn writes_invalidate_every_entry() {
    let transport = ScriptedTransport::new();
    transport.ok(Method::Get, "/creative/tasks", one_task());
    transport.ok(Method::Get, "/experiments/e-1/metrics", json!({"experiment_id": "e-1", "variants": []}));
    transport.ok(Method::Post, "/experiments", json!({"experiment_id": "e-2", "status": "draft"}));
    let client = client_with(transport.clone(), Arc::new(ManualClock::new(0)));

    client.list_tasks(&page(1)).await.unwrap();
    client.experiment_metrics("e-1").await.unwrap();
    assert_eq!(client.cache().len(), 2);

    let req = CreateExperimentRequest {
        name: "Spring".into(),
        product_name: None,
        variants: vec![ExperimentVariantInput {
            creative_id: "11".into(),
            weight: 1.0,
            bucket_start: None,
            bucket_end: None,
            title: None,
            product_name: None,
            image_url: None,
            cta_text: None,
            selling_points: None,
        }],
    };
    let created = client.create_experiment(&req).await.unwrap();
    assert_eq!(created.experiment_id, "e-2");
    assert!(client.cache().is_empty());

    client.list_tasks(&page(1)).await.unwrap();
    client.experiment_metrics("e-1").await.unwrap();
    assert_eq!(transport.count(Method::Get, "/creative/tasks"), 2);
    assert_eq!(transport.count(Method::Get, "/experiments/e-1/metrics"), 2);
}

#[tokio::test]
async fn failed_write_still_invalidates() {
    let transport = ScriptedTransport::new();
    transport.ok(Method::Get, "/creative/tasks", one_task());
    transport.on(
        Method::Post,
        "/experiments/e-1/click",
        RawResponse::json(500, &json!({"code": 500, "message": "db down"})),
    );
    let client = client_with(transport.clone(), Arc::new(ManualClock::new(0)));

    client.list_tasks(&page(1)).await.unwrap();
    let err = client.record_click("e-1", 11).await.unwrap_err();
    assert_eq!(err, ApiError::Status { status: 500, message: "db down".into() });
    assert!(client.cache().is_empty());
}

#[tokio::test]
async fn concurrent_reads_share_one_request() {
    let transport = ScriptedTransport::new();
    transport.ok(Method::Get, "/creative/task/t-1", json!({"task_id": "t-1", "status": "processing"}));
    transport.set_delay(Duration::from_millis(20));
    let client = client_with(transport.clone(), Arc::new(ManualClock::new(0)));

    let (a, b, c) = tokio::join!(client.get_task("t-1"), client.get_task("t-1"), client.get_task("t-1"));
    assert_eq!(a.unwrap().task_id, "t-1");
    assert_eq!(b.unwrap(), c.unwrap());
    assert_eq!(transport.count(Method::Get, "/creative/task/t-1"), 1);
    assert_eq!(client.cache().stats().coalesced, 2);
    assert_eq!(client.cache().in_flight(), 0);
}

#[tokio::test]
async fn domain_errors_are_not_cached() {
    let transport = ScriptedTransport::new();
    transport.on(
        Method::Get,
        "/experiments/e-1/metrics",
        RawResponse::json(200, &json!({"code": 1001, "message": "experiment not found"})),
    );
    transport.ok(Method::Get, "/experiments/e-1/metrics", json!({"experiment_id": "e-1", "variants": []}));
    let client = client_with(transport.clone(), Arc::new(ManualClock::new(0)));

    let err = client.experiment_metrics("e-1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Domain);
    assert!(client.cache().is_empty());

    let ok = client.experiment_metrics("e-1").await.unwrap();
    assert_eq!(ok.experiment_id, "e-1");
    assert_eq!(transport.count(Method::Get, "/experiments/e-1/metrics"), 2);
}

#[tokio::test]
async fn read_in_flight_across_invalidation_is_not_stored() {
    let transport = ScriptedTransport::new();
    transport.ok(Method::Get, "/creative/tasks", one_task());
    transport.set_delay(Duration::from_millis(40));
    let client = client_with(transport.clone(), Arc::new(ManualClock::new(0)));

    let first_page = page(1);
    let (read, _) = tokio::join!(client.list_tasks(&first_page), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        client.cache().invalidate_all();
    });
    assert!(read.is_ok(), "the caller still gets its answer");
    assert!(client.cache().is_empty());
    assert_eq!(client.cache().stats().stale_fills_dropped, 1);
}

#[tokio::test]
async fn html_from_primary_falls_back_once() {
    let transport = ScriptedTransport::new();
    transport.on(Method::Get, "/warmup/status", html_page());
    transport.on_base(
        FALLBACK,
        Method::Get,
        "/warmup/status",
        RawResponse::json(200, &json!({"runs": 5, "successes": 4, "failures": 1, "recent": []})),
    );
    let client = client_with(transport.clone(), Arc::new(ManualClock::new(0)));

    let stats = client.warmup_status().await.unwrap();
    assert_eq!(stats.runs, 5);
    let bases: Vec<String> = transport.calls().into_iter().map(|c| c.base).collect();
    assert_eq!(bases, vec![PRIMARY.to_string(), FALLBACK.to_string()]);
}

#[tokio::test]
async fn query_follows_canonical_params() {
    let transport = ScriptedTransport::new();
    transport.ok(Method::Get, "/experiments/e-1/assign", json!({"creative_id": 11}));
    let client = client_with(transport.clone(), Arc::new(ManualClock::new(0)));

    client.assign_variant("e-1", Some("user-9")).await.unwrap();
    client.assign_variant("e-1", None).await.unwrap();
    let queries: Vec<_> = transport.calls().into_iter().map(|c| c.query).collect();
    assert_eq!(queries[0], vec![("user_key".to_string(), "user-9".to_string())]);
    assert!(queries[1].is_empty());
}

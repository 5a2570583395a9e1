//! Experiment creation from the catalog, status changes and metrics.

mod common;

use std::sync::Arc;

use adflow_client::api::types::{ExperimentStatus, ListExperimentsParams};
use adflow_client::api::Method;
use adflow_client::catalog::Catalog;
use adflow_client::experiment::ExperimentDraft;
use adflow_client::metrics::{annotate, DeviationSign};
use adflow_client::{ErrorKind, ManualClock};
use common::*;
use serde_json::json;

fn script_catalog(transport: &ScriptedTransport) {
    transport.ok(
        Method::Get,
        "/creative/tasks",
        tasks_page(json!([
            {"id": "7", "status": "completed", "product_name": "Smart Watch Pro"},
            {"id": "8", "status": "completed", "product_name": "Desk Lamp"},
            {"id": "9", "status": "failed", "product_name": "Smart Watch Pro"}
        ])),
    );
    transport.ok(
        Method::Get,
        "/creative/assets",
        json!({
            "assets": [
                {"id": "101", "task_id": 7, "format": "1:1", "public_url": "https://cdn/101.png",
                 "cta_text": "Buy Now", "selling_points": ["7-day battery"]},
                {"id": "102", "task_id": 7, "format": "1:1", "public_url": "https://cdn/102.png",
                 "title": "Night mode"},
                {"id": "201", "task_id": 8, "format": "9:16", "public_url": "https://cdn/201.png"}
            ],
            "total": 3, "page": 1, "page_size": 100, "total_pages": 1
        }),
    );
}

#[tokio::test]
async fn catalog_draft_and_create() {
    let transport = ScriptedTransport::new();
    script_catalog(&transport);
    transport.ok(Method::Post, "/experiments", json!({"experiment_id": "exp-1", "status": "draft"}));
    let client = client_with(transport.clone(), Arc::new(ManualClock::new(0)));

    let catalog = Catalog::load(&client, 100).await.unwrap();
    assert_eq!(catalog.products, vec!["Smart Watch Pro", "Desk Lamp"]);
    assert_eq!(catalog.default_product(), Some("Smart Watch Pro"));
    let watch: Vec<_> = catalog.for_product("Smart Watch Pro").iter().map(|o| o.label.clone()).collect();
    assert_eq!(watch, vec!["Smart Watch Pro (101)", "Night mode (102)"]);

    let tasks_call = transport.calls().into_iter().find(|c| c.path == "/creative/tasks").unwrap();
    assert!(tasks_call.query.contains(&("page_size".to_string(), "100".to_string())));

    let mut draft = ExperimentDraft::new("Battery vs night mode", "Smart Watch Pro");
    draft.variants[0].creative_id = "101".into();
    draft.variants[0].cta_override = Some("".into());
    draft.variants[1].creative_id = "102".into();
    draft.variants[1].cta_override = Some("See it glow".into());

    let created = draft.submit(&client, &catalog).await.unwrap();
    assert_eq!(created.experiment_id, "exp-1");

    let body = transport.last_body("/experiments").unwrap();
    assert_eq!(body["name"], json!("Battery vs night mode"));
    assert_eq!(body["product_name"], json!("Smart Watch Pro"));
    assert_eq!(body["variants"][0], json!({"creative_id": "101", "weight": 0.5}));
    assert_eq!(body["variants"][1]["cta_text"], json!("See it glow"));

    // The create invalidated the listings, so a reload refetches.
    Catalog::load(&client, 100).await.unwrap();
    assert_eq!(transport.count(Method::Get, "/creative/assets"), 2);
}

#[tokio::test]
async fn invalid_draft_is_rejected_locally() {
    let transport = ScriptedTransport::new();
    let client = client_with(transport.clone(), Arc::new(ManualClock::new(0)));

    let mut draft = ExperimentDraft::new("No creatives", "");
    draft.variants[0].creative_id = "101".into();
    let err = draft.submit(&client, &Catalog::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn status_change_and_metrics_report() {
    let transport = ScriptedTransport::new();
    transport.ok(Method::Post, "/experiments/exp-1/status", json!(null));
    transport.ok(
        Method::Get,
        "/experiments/exp-1/metrics",
        json!({
            "experiment_id": "exp-1",
            "variants": [
                {"creative_id": 101, "impressions": 100, "clicks": 10, "ctr": 0.1},
                {"creative_id": 102, "impressions": 50, "clicks": 10}
            ]
        }),
    );
    let client = client_with(transport.clone(), Arc::new(ManualClock::new(0)));

    client.update_experiment_status("exp-1", ExperimentStatus::Active).await.unwrap();
    assert_eq!(transport.last_body("/experiments/exp-1/status"), Some(json!({"status": "active"})));

    let report = annotate(&client.experiment_metrics("exp-1").await.unwrap());
    let summary = report.summary.clone().unwrap();
    assert_eq!(summary.impressions, 150);
    assert_eq!(summary.clicks, 20);
    assert_eq!(summary.best.creative_id, 102);
    assert!(report.rows[1].is_best);
    assert_eq!(report.rows[0].deviation.sign, DeviationSign::Below);
    assert_eq!(report.rows[1].ctr_label, "20.00%");
}

#[tokio::test]
async fn impressions_and_clicks_are_posted() {
    let transport = ScriptedTransport::new();
    transport.ok(Method::Post, "/experiments/exp-1/hit", json!(null));
    transport.ok(Method::Post, "/experiments/exp-1/click", json!(null));
    let client = client_with(transport.clone(), Arc::new(ManualClock::new(0)));

    client.record_impression("exp-1", 101).await.unwrap();
    client.record_click("exp-1", 101).await.unwrap();
    assert_eq!(transport.last_body("/experiments/exp-1/hit"), Some(json!({"creative_id": 101})));
    assert_eq!(client.cache().stats().invalidations, 2);
}

#[tokio::test]
async fn experiments_list_decodes_numeric_creative_ids() {
    let transport = ScriptedTransport::new();
    transport.ok(
        Method::Get,
        "/experiments",
        json!({
            "experiments": [{
                "experiment_id": "exp-1",
                "name": "Battery vs night mode",
                "product_name": "Smart Watch Pro",
                "status": "active",
                "created_at": "2026-03-01T10:00:00Z",
                "variants": [
                    {"creative_id": 101, "weight": 0.5, "bucket_start": 0, "bucket_end": 49,
                     "cta_text": "Buy Now"},
                    {"creative_id": 102, "weight": 0.5, "bucket_start": 50, "bucket_end": 99}
                ]
            }],
            "total": 1, "page": 1, "page_size": 20
        }),
    );
    let client = client_with(transport.clone(), Arc::new(ManualClock::new(0)));

    let params = ListExperimentsParams { status: Some(ExperimentStatus::Active), ..Default::default() };
    let listed = client.list_experiments(&params).await.unwrap();
    let exp = &listed.experiments[0];
    assert_eq!(exp.status, ExperimentStatus::Active);
    let ids: Vec<&str> = exp.variants.iter().map(|v| v.creative_id.as_str()).collect();
    assert_eq!(ids, vec!["101", "102"]);
    assert_eq!(exp.variants[1].bucket_start, Some(50));
    assert_eq!(exp.variants[0].cta_text.as_deref(), Some("Buy Now"));

    let call = transport.calls().into_iter().find(|c| c.path == "/experiments").unwrap();
    assert_eq!(call.query, vec![("status".to_string(), "active".to_string())]);
}

// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use riverinfos::domain::models::{JobId, SchemaTag};
use riverinfos::orchestrator::Orchestrator;
use riverinfos::presentation::routes;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;
use uuid::Uuid;

use super::helpers::{
    memory_store, orchestrator, quiet_anti_detection, registry, test_orchestrator_config,
    ScriptedCrawler, TestSource,
};

fn app() -> (Router, Arc<Orchestrator>) {
    let google = ScriptedCrawler::always(
        "google",
        Ok(json!({"articles": [{"title": "HSBC results", "date": "2024-02-20"}]})),
    );
    let orch = orchestrator(
        registry(vec![TestSource::new(
            "news/google",
            google,
            "news.google.com",
            SchemaTag::Articles,
        )]),
        memory_store(),
        quiet_anti_detection(),
        test_orchestrator_config(),
    );
    (routes::routes(orch.clone()), orch)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// 健康检查测试
#[tokio::test]
async fn health_check_works() {
    let (app, _) = app();
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("OK"));
}

/// 提交任务、查询状态并读取快照
#[tokio::test]
async fn job_lifecycle_over_http() {
    let (app, orch) = app();

    let (status, body) = send(
        &app,
        post_json(
            "/v1/jobs",
            json!({"company": "HSBC", "sources": ["news/google", "news/unknown"]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let id: Uuid = serde_json::from_value(body["id"].clone()).unwrap();

    orch.wait(&JobId(id)).await.unwrap();

    let (status, body) = send(&app, get(&format!("/v1/jobs/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "partial");
    assert_eq!(body["terminal_count"], 2);
    assert_eq!(body["sources"]["news/google"]["status"]["status"], "succeeded");
    assert_eq!(body["sources"]["news/unknown"]["status"]["kind"], "unknown_source");

    let (status, body) = send(&app, get("/v1/companies")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["hsbc"]));

    let (status, body) = send(
        &app,
        get("/v1/companies/HSBC/sources/news/google/latest"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"]["source"], "google");
    assert_eq!(body["content"]["articles"][0]["title"], "HSBC results");
    assert_eq!(body["schema_mismatch"], false);

    let (status, body) = send(
        &app,
        get("/v1/companies/hsbc/sources/news/google/history"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = send(
        &app,
        get("/v1/companies/hsbc/sources/social/twitter/latest"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// `/v1/companies` 返回的键可以直接用于快照查询
#[tokio::test]
async fn listed_company_keys_resolve_to_snapshots() {
    let (app, orch) = app();

    let (status, body) = send(
        &app,
        post_json(
            "/v1/jobs",
            json!({"company": "ABC Company Limited", "sources": ["news/google"]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let id: Uuid = serde_json::from_value(body["id"].clone()).unwrap();
    orch.wait(&JobId(id)).await.unwrap();

    let (_, body) = send(&app, get("/v1/companies")).await;
    assert_eq!(body, json!(["abc company"]));
    let key = body[0].as_str().unwrap().replace(' ', "%20");

    let (status, body) = send(
        &app,
        get(&format!("/v1/companies/{}/sources/news/google/latest", key)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"]["articles"][0]["title"], "HSBC results");

    let (status, body) = send(&app, get(&format!("/v1/companies/{}/sources", key))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["news/google"]));

    // The display name still resolves through normalization.
    let (status, _) = send(
        &app,
        get("/v1/companies/ABC%20Company%20Limited/sources/news/google/history"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let (app, _) = app();

    let (status, body) = send(
        &app,
        post_json("/v1/jobs", json!({"company": "HSBC", "sources": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = send(
        &app,
        post_json("/v1/jobs", json!({"company": "!!!", "sources": ["news/google"]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, get(&format!("/v1/jobs/{}", Uuid::new_v4()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("Job not found"));

    let (status, _) = send(&app, get("/v1/sources?category=video")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sources_are_listed_by_category() {
    let (app, _) = app();

    let (status, body) = send(&app, get("/v1/sources")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["news"][0]["id"], "news/google");
    assert_eq!(body["news"][0]["domain"], "news.google.com");

    let (status, body) = send(&app, get("/v1/sources?category=social")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_object().unwrap().is_empty());
}

/// 取消已结束的任务返回其最终状态，重新提交全成功的任务返回 400
#[tokio::test]
async fn cancel_and_resubmit_finished_job() {
    let (app, orch) = app();
    let handle = orch
        .submit(
            riverinfos::domain::models::Company::new("HSBC"),
            vec!["news/google".to_string()],
            Default::default(),
        )
        .unwrap();
    handle.wait().await;

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/v1/jobs/{}", handle.id()))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "fully_successful");
    assert_eq!(body["cancelled"], false);

    let (status, _) = send(
        &app,
        post_json(&format!("/v1/jobs/{}/resubmit", handle.id()), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

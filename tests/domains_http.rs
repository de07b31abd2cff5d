mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::app::{spawn_app_with, spawn_test_server};
use common::fixtures::card_body;
use common::http::{assert_json_error, assert_status_ok_json, call};
use scimemo_backend::store::BackendKind;

#[tokio::test]
async fn it_lists_initial_domains_in_creation_order() {
    let app = spawn_test_server().await;
    let (status, body) = call(&app.app, Method::GET, "/api/domains", None).await;
    assert_status_ok_json(status, &body);
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["通用", "心理学", "DSM", "GIS", "LLM"]);
}

#[tokio::test]
async fn it_create_and_conflict() {
    let app = spawn_app_with(BackendKind::Sql, false).await;

    let (status, body) = call(&app.app, Method::POST, "/api/domains", Some(json!({ "name": " 生态学 " }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["name"], "生态学");

    let (status, body) = call(&app.app, Method::POST, "/api/domains", Some(json!({ "name": "生态学" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_json_error(&body, "CONFLICT");

    let (status, body) = call(&app.app, Method::POST, "/api/domains", Some(json!({ "name": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_json_error(&body, "VALIDATION_ERROR");
}

#[tokio::test]
async fn it_rename_domain() {
    let app = spawn_app_with(BackendKind::File, false).await;
    let (_, created) = call(&app.app, Method::POST, "/api/domains", Some(json!({ "name": "NLP" }))).await;
    let id = created["data"]["id"].as_u64().unwrap();

    let (status, body) = call(
        &app.app,
        Method::PUT,
        &format!("/api/domains/{id}"),
        Some(json!({ "name": "自然语言处理" })),
    )
    .await;
    assert_status_ok_json(status, &body);
    assert_eq!(body["data"]["name"], "自然语言处理");
    assert_eq!(body["data"]["id"], id);

    let (status, _) = call(&app.app, Method::PUT, &format!("/api/domains/{id}"), Some(json!({ "name": "GIS" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(&app.app, Method::PUT, "/api/domains/9999", Some(json!({ "name": "X" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&app.app, Method::PUT, "/api/domains/x1", Some(json!({ "name": "X" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_json_error(&body, "INVALID_ID");
}

#[tokio::test]
async fn it_delete_domain_moves_cards_to_default() {
    let app = spawn_test_server().await;
    let (_, created) = call(&app.app, Method::POST, "/api/domains", Some(json!({ "name": "统计学" }))).await;
    let id = created["data"]["id"].as_u64().unwrap();

    for word in ["mean", "median", "mode"] {
        let (status, _) = call(&app.app, Method::POST, "/api/cards", Some(card_body(word, Some("统计学")))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = call(&app.app, Method::DELETE, &format!("/api/domains/{id}"), None).await;
    assert_status_ok_json(status, &body);
    assert_eq!(body["data"]["id"], id);

    let (_, cards) = call(&app.app, Method::GET, "/api/cards", None).await;
    let cards = cards["data"].as_array().unwrap();
    assert_eq!(cards.len(), 3);
    assert!(cards.iter().all(|c| c["domain"] == "通用"));

    let (status, body) = call(&app.app, Method::DELETE, &format!("/api/domains/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_json_error(&body, "NOT_FOUND");
}

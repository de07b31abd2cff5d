mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::app::spawn_test_server;
use common::http::{assert_json_error, assert_status_ok_json, call};

#[tokio::test]
async fn it_split_sentence_into_candidate_words() {
    let app = spawn_test_server().await;
    let (status, body) = call(
        &app.app,
        Method::POST,
        "/api/words/split",
        Some(json!({ "sentence": "The state-of-the-art model doesn't overfit the data." })),
    )
    .await;
    assert_status_ok_json(status, &body);
    let words: Vec<&str> = body["data"]["words"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w.as_str().unwrap())
        .collect();
    assert!(words.contains(&"state-of-the-art"), "words: {words:?}");
    assert!(words.contains(&"overfit"));
    assert!(!words.contains(&"The"));
    assert!(!words.contains(&"the"));
}

#[tokio::test]
async fn it_split_honours_options() {
    let app = spawn_test_server().await;
    let (_, body) = call(
        &app.app,
        Method::POST,
        "/api/words/split",
        Some(json!({
            "sentence": "The cat sat on the mat",
            "options": { "filterStopwords": false, "minLength": 3 }
        })),
    )
    .await;
    let words = body["data"]["words"].as_array().unwrap();
    assert!(words.iter().any(|w| w == "The"));
    assert!(words.iter().all(|w| w != "on"));

    let (status, body) = call(
        &app.app,
        Method::POST,
        "/api/words/split",
        Some(json!({ "sentence": "x", "options": { "minLength": 9, "maxLength": 3 } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_json_error(&body, "VALIDATION_ERROR");
}

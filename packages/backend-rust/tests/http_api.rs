use axum::http::StatusCode;
use chrono::Duration;
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

mod common;

use common::{body_json, get_request, json_request, setup, t0};

#[tokio::test]
async fn health_reports_store_status() {
    let env = setup().await;

    let response = env.app().oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["backend"], "sqlite");

    env.store.close().await;
    let response = env.app().oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["status"], "degraded");
}

#[tokio::test]
async fn create_review_and_read_back_a_card() {
    let env = setup().await;
    let app = env.app();

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/entries", json!({ "text": "quixotic" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let entry_id = body_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/cards", json!({ "entryId": entry_id })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "NEW");
    let card_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/cards/{card_id}/review"),
            json!({ "grade": "GOOD", "durationMs": 900 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["card"]["status"], "REVIEW");
    assert_eq!(body["data"]["card"]["intervalDays"], 1);
    assert_eq!(body["data"]["statusChanged"], true);
    assert_eq!(body["data"]["reviewLog"]["grade"], "GOOD");

    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/cards/{card_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["reviewCount"], 1);

    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/cards/{card_id}/history?limit=5")))
        .await
        .unwrap();
    let history = body_json(response).await;
    assert_eq!(history["data"].as_array().unwrap().len(), 1);
    assert_eq!(history["data"][0]["stateBefore"]["version"], 2);

    let response = app
        .oneshot(get_request(&format!("/api/cards/{card_id}/audit")))
        .await
        .unwrap();
    let audit = body_json(response).await;
    let records = audit["data"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1]["action"], "UPDATE");
}

#[tokio::test]
async fn review_errors_map_to_status_codes() {
    let env = setup().await;
    let card = env.new_card("rhetoric").await;
    let app = env.app();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/cards/{}/review", card.id),
            json!({ "grade": 4 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "INVALID_INPUT");

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/cards/{}/review", Uuid::new_v4()),
            json!({ "grade": "EASY" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/cards/not-a-uuid/review", json!({ "grade": "EASY" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/api/cards/{}/review", card.id),
            json!({ "grade": "PERFECT" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn patch_edits_a_card_schedule() {
    let env = setup().await;
    let card = env.new_card("jocular").await;
    let app = env.app();
    let uri = format!("/api/cards/{}", card.id);

    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &uri,
            json!({ "status": "REVIEW", "intervalDays": 5, "dueAt": "2026-05-09T09:00:00Z" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "REVIEW");
    assert_eq!(body["data"]["intervalDays"], 5);
    assert_eq!(body["data"]["easeFactor"], 2.5);

    let response = app
        .clone()
        .oneshot(json_request("PATCH", &uri, json!({ "easeFactor": 9.0 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "INVALID_INPUT");

    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/api/cards/{}", Uuid::new_v4()),
            json!({ "intervalDays": 2 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(get_request(&format!("{uri}/audit")))
        .await
        .unwrap();
    let audit = body_json(response).await;
    assert_eq!(audit["data"].as_array().unwrap().len(), 2);
    assert_eq!(audit["data"][1]["changes"]["interval_days"]["new"], 5);
}

#[tokio::test]
async fn duplicate_card_is_a_conflict() {
    let env = setup().await;
    let card = env.new_card("sanguine").await;

    let response = env
        .app()
        .oneshot(json_request("POST", "/api/cards", json!({ "entryId": card.entry_id })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "ALREADY_EXISTS");
}

#[tokio::test]
async fn study_queue_supports_filters_and_entries() {
    let env = setup().await;
    let learning = env
        .scheduled_card("taciturn", vocab_srs::CardStatus::Learning, t0() - Duration::hours(3), 0)
        .await;
    let fresh = env.new_card("umbrage").await;
    let app = env.app();

    let response = app
        .clone()
        .oneshot(get_request("/api/study/queue"))
        .await
        .unwrap();
    let body = body_json(response).await;
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|card| card["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![fresh.id.to_string(), learning.id.to_string()]);

    let response = app
        .clone()
        .oneshot(get_request("/api/study/queue?status=LEARNING&withEntries=true&limit=5"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let items = body["data"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["card"]["id"], learning.id.to_string());
    assert_eq!(items[0]["entry"]["text"], "taciturn");

    let response = app
        .clone()
        .oneshot(get_request("/api/study/queue?limit=0"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(get_request("/api/study/queue?status=SOMEDAY"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.oneshot(get_request("/api/study/stats")).await.unwrap();
    let stats = body_json(response).await;
    assert_eq!(stats["data"]["totalCards"], 2);
    assert_eq!(stats["data"]["dueNow"], 2);
}

#[tokio::test]
async fn unknown_routes_and_bad_bodies() {
    let env = setup().await;
    let app = env.app();

    let response = app
        .clone()
        .oneshot(get_request("/api/nowhere"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");

    let response = app
        .oneshot(json_request("POST", "/api/cards", json!({ "entryId": 7 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "INVALID_INPUT");
}

mod common;

use chrono::NaiveDate;
use reqwest::StatusCode;
use serde_json::Value as Json;

use common::{storage, TestApi};
use plc_historian::model::TagKind;

#[tokio::test]
async fn undecodable_query_string_gets_an_error_body() {
    let (_dir, storage) = storage();
    let api = TestApi::start(&storage, &["A"]).await;

    let response = api
        .get(
            "/api/history",
            &[
                ("start", "2024-03-14 11:00"),
                ("start", "2024-03-14 12:00"),
                ("end", "2024-03-14 13:00"),
            ],
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Json = response.json().await.unwrap();
    assert_eq!(body["error"], true);
    assert!(body["message"].as_str().unwrap().contains("start"));

    api.stop().await;
}

#[tokio::test]
async fn missing_bound_gets_an_error_body() {
    let (_dir, storage) = storage();
    let api = TestApi::start(&storage, &["A"]).await;

    let response = api.get("/api/history", &[("start", "2024-03-14 11:00")]).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Json = response.json().await.unwrap();
    assert_eq!(
        body,
        serde_json::json!({ "error": true, "message": "Start and end dates are required" })
    );

    api.stop().await;
}

#[tokio::test]
async fn history_is_served_as_json() {
    let (_dir, storage) = storage();
    let t0 = NaiveDate::from_ymd_opt(2024, 3, 14)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    storage.save_reading("A", 5.2, TagKind::Analog, t0).unwrap();
    let api = TestApi::start(&storage, &["A"]).await;

    let response = api
        .get(
            "/api/history",
            &[("start", "2024-03-14 11:00"), ("end", "2024-03-14 13:00")],
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Json = response.json().await.unwrap();
    assert_eq!(body["data"][0]["tag_name"], "A");
    assert_eq!(body["data"][0]["value"], 5.2);
    assert_eq!(body["actual_range"]["start"], "2024-03-14T12:00:00");

    api.stop().await;
}

#[tokio::test]
async fn storage_failure_is_a_server_error_with_body() {
    let (_dir, storage) = storage();
    let api = TestApi::start(&storage, &["A"]).await;

    let conn = rusqlite::Connection::open(storage.path()).unwrap();
    conn.execute("DROP TABLE plc_readings", []).unwrap();
    drop(conn);

    let response = api
        .get(
            "/api/history",
            &[("start", "2024-03-14 11:00"), ("end", "2024-03-14 13:00")],
        )
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Json = response.json().await.unwrap();
    assert_eq!(
        body,
        serde_json::json!({ "error": true, "message": "Couldn't fetch historical data" })
    );

    api.stop().await;
}

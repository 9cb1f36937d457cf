//! City Catalog Tests

mod common;

use axum::http::StatusCode;
use common::app;

#[tokio::test]
async fn list_cities_in_id_order() {
    let app = app().await;

    let resp = app.get("/api/cities", None).await;

    assert_eq!(resp.status, StatusCode::OK);
    let cities = resp.json()["cities"].as_array().cloned().unwrap_or_default();
    assert_eq!(cities.len(), 4);
    let ids: Vec<i64> = cities
        .iter()
        .filter_map(|city| city["id"].as_i64())
        .collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);
    assert_eq!(cities[0]["enTitle"], "Moscow");
}

#[tokio::test]
async fn get_city_by_english_name() {
    let app = app().await;

    let resp = app.get("/api/cities/Kazan", None).await;

    assert_eq!(resp.status, StatusCode::OK);
    let city = resp.json()["city"].clone();
    assert_eq!(city["enTitle"], "Kazan");
    assert_eq!(city["title"], "Казань");

    let resp = app.get("/api/cities/Saint-Petersburg", None).await;
    assert_eq!(resp.status, StatusCode::OK);
}

#[tokio::test]
async fn get_unknown_city() {
    let app = app().await;

    let resp = app.get("/api/cities/Atlantis", None).await;

    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.error_message(), "city not found");
}

#[tokio::test]
async fn get_city_rejects_bad_names() {
    let app = app().await;

    let resp = app.get("/api/cities/Kazan%3B%20DROP", None).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "URL contains invalid characters");

    let resp = app
        .get(&format!("/api/cities/{}", "k".repeat(256)), None)
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "URL exceeds character limit");
}

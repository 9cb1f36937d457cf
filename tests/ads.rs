//! Ads Tests
//!
//! Covers listing, publishing, editing, deleting, images, favorites and
//! priority boosts through the gateway and the ads service.

mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use common::{ad_metadata, app, jpeg_bytes, png_bytes, MultipartForm, TestApp};
use domik::domain::context::RequestContext;
use domik::domain::error::ServiceError;
use domik::jobs::priority_reset;
use domik::rpc::ads::AdsClient;
use serde_json::{json, Value};
use time::OffsetDateTime;
use uuid::Uuid;

fn ad_id(place: &Value) -> String {
    place["uuid"].as_str().unwrap_or_default().to_string()
}

fn ad_path(place: &Value) -> String {
    format!("/api/ads/{}", ad_id(place))
}

fn image_paths(place: &Value) -> Vec<String> {
    place["images"]
        .as_array()
        .map(|images| {
            images
                .iter()
                .filter_map(|image| image["path"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn ids(places: &Value) -> Vec<String> {
    places
        .as_array()
        .map(|places| places.iter().map(ad_id).collect())
        .unwrap_or_default()
}

async fn list(app: &TestApp, query: &str) -> Vec<String> {
    let resp = app.get(&format!("/api/ads{}", query), None).await;
    assert_eq!(resp.status, StatusCode::OK, "list failed: {:?}", resp.json());
    ids(&resp.json()["places"])
}

// ===========================================================================
// Listing
// ===========================================================================

#[tokio::test]
async fn list_without_ads_is_empty() {
    let app = app().await;

    let resp = app.get("/api/ads", None).await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json(), json!({ "places": [] }));
}

#[tokio::test]
async fn list_applies_limit_and_offset() {
    let app = app().await;
    let host = app.host("paging_host").await;
    for _ in 0..4 {
        app.create_ad(&host, 1).await;
    }

    let all = list(&app, "").await;
    assert_eq!(all.len(), 4);

    let page = list(&app, "?limit=2&offset=1").await;
    assert_eq!(page, all[1..3].to_vec());

    let tail = list(&app, "?limit=10&offset=3").await;
    assert_eq!(tail, all[3..].to_vec());
}

#[tokio::test]
async fn list_rejects_bad_paging() {
    let app = app().await;

    let resp = app.get("/api/ads?limit=abc", None).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "query limit not int");

    let resp = app.get("/api/ads?offset=-1", None).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "query offset not int");
}

#[tokio::test]
async fn list_rejects_bad_filters() {
    let app = app().await;

    let cases = [
        ("?rating=abc", "query rating not number"),
        ("?new=maybe", "query new not bool"),
        ("?gender=other", "query gender not male or female"),
        ("?guests=many", "query guests not int"),
        ("?dateFrom=yesterday", "query dateFrom not date"),
        ("?dateTo=2026-13-45", "query dateTo not date"),
        ("?dateFrom=2026-11-10&dateTo=2026-11-01", "Invalid date range"),
    ];
    for (query, message) in cases {
        let resp = app.get(&format!("/api/ads{}", query), None).await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST, "{}", query);
        assert_eq!(resp.error_message(), message, "{}", query);
    }
}

#[tokio::test]
async fn list_filters_by_location_and_guests() {
    let app = app().await;
    let host = app.host("filter_host").await;
    let small = app.create_ad_with(&host, ad_metadata("Moscow", 1), 1).await;
    let large = app.create_ad_with(&host, ad_metadata("Moscow", 4), 1).await;
    let kazan = app.create_ad_with(&host, ad_metadata("Kazan", 3), 1).await;

    assert_eq!(list(&app, "?location=Kazan").await, vec![ad_id(&kazan)]);

    let roomy = list(&app, "?guests=3").await;
    assert_eq!(roomy.len(), 2);
    assert!(roomy.contains(&ad_id(&large)));
    assert!(roomy.contains(&ad_id(&kazan)));
    assert!(!roomy.contains(&ad_id(&small)));

    assert_eq!(
        list(&app, "?location=Moscow&guests=2").await,
        vec![ad_id(&large)]
    );
}

#[tokio::test]
async fn list_filters_by_author_rating_and_gender() {
    let app = app().await;
    let rated = app.host("rated_host").await;
    let plain = app.host("plain_host").await;
    let rated_ad = app.create_ad(&rated, 1).await;
    let plain_ad = app.create_ad(&plain, 1).await;

    app.store.set_user_score(rated.id, 4.5).await;
    assert_eq!(list(&app, "?rating=4").await, vec![ad_id(&rated_ad)]);

    let resp = app
        .put_json("/api/user", json!({ "sex": "female" }), Some(&plain))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(list(&app, "?gender=female").await, vec![ad_id(&plain_ad)]);
    assert!(list(&app, "?gender=male").await.is_empty());
}

#[tokio::test]
async fn list_filters_by_freshness_and_dates() {
    let app = app().await;
    let host = app.host("dates_host").await;
    let fresh = app.create_ad(&host, 1).await;
    let stale = app.create_ad(&host, 1).await;

    let stale_id = Uuid::parse_str(&ad_id(&stale)).expect("invalid ad uuid");
    app.store
        .set_publication_date(stale_id, OffsetDateTime::now_utc() - time::Duration::days(30))
        .await;
    assert_eq!(list(&app, "?new=true").await, vec![ad_id(&fresh)]);
    assert_eq!(list(&app, "?new=false").await.len(), 2);

    // Both ads are available 2026-11-01 through 2026-11-10.
    assert_eq!(
        list(&app, "?dateFrom=2026-11-02&dateTo=2026-11-05").await.len(),
        2
    );
    assert!(list(&app, "?dateFrom=2026-10-01").await.is_empty());
    assert!(list(&app, "?dateTo=2026-12-01T00:00:00Z").await.is_empty());
}

#[tokio::test]
async fn list_by_city_and_by_user() {
    let app = app().await;
    let host = app.host("city_host").await;
    let other = app.host("city_other").await;
    let moscow = app.create_ad(&host, 1).await;
    let sochi = app.create_ad_with(&other, ad_metadata("Sochi", 2), 1).await;

    let resp = app.get("/api/ads/cities/Sochi", None).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(ids(&resp.json()["places"]), vec![ad_id(&sochi)]);

    let resp = app
        .get(&format!("/api/users/{}/places", host.id), None)
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(ids(&resp.json()["places"]), vec![ad_id(&moscow)]);

    let resp = app.get("/api/ads/cities/Mos%21cow", None).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "URL contains invalid characters");

    let resp = app
        .get(&format!("/api/ads/cities/{}", "a".repeat(300)), None)
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "URL exceeds character limit");
}

// ===========================================================================
// Create & Read
// ===========================================================================

#[tokio::test]
async fn create_then_get_round_trips() {
    let app = app().await;
    let host = app.host("roundtrip_host").await;

    let form = MultipartForm::new()
        .metadata(&ad_metadata("Moscow", 2))
        .jpeg(jpeg_bytes(320, 240))
        .jpeg(jpeg_bytes(240, 320));
    let resp = app.post_multipart("/api/ads", form, Some(&host)).await;
    assert_eq!(resp.status, StatusCode::OK, "{:?}", resp.json());

    let created = resp.json()["place"].clone();
    let paths = image_paths(&created);
    assert_eq!(paths.len(), 2);
    assert_eq!(created["authorUUID"], host.id.to_string());
    assert_eq!(created["cityName"], "Moscow");

    let resp = app.get(&ad_path(&created), None).await;
    assert_eq!(resp.status, StatusCode::OK);
    let fetched = resp.json()["place"].clone();

    assert_eq!(image_paths(&fetched), paths);
    for field in [
        "uuid",
        "authorUUID",
        "cityId",
        "cityName",
        "address",
        "description",
        "roomsNumber",
        "dateFrom",
        "dateTo",
    ] {
        assert_eq!(fetched[field], created[field], "field {}", field);
    }
    assert_eq!(fetched["dateFrom"], "2026-11-01T00:00:00Z");
    assert_eq!(app.blobs.len().await, 2);
    for path in &paths {
        assert!(app.blobs.get(path).await.is_some(), "missing blob {}", path);
    }
}

#[tokio::test]
async fn create_accepts_png() {
    let app = app().await;
    let host = app.host("png_host").await;

    let form = MultipartForm::new()
        .metadata(&ad_metadata("Kazan", 1))
        .png(png_bytes(150, 150));
    let resp = app.post_multipart("/api/ads", form, Some(&host)).await;

    assert_eq!(resp.status, StatusCode::OK);
    let paths = image_paths(&resp.json()["place"]);
    assert_eq!(paths.len(), 1);
    assert!(paths[0].ends_with(".png"));
}

#[tokio::test]
async fn create_sanitizes_markup() {
    let app = app().await;
    let host = app.host("markup_host").await;

    let mut metadata = ad_metadata("Moscow", 2);
    metadata["description"] = json!("<b>Bright</b> flat <script>x</script>");
    let place = app.create_ad_with(&host, metadata, 1).await;

    assert_eq!(place["description"], "Bright flat x");
}

#[tokio::test]
async fn get_counts_views_for_signed_in_callers() {
    let app = app().await;
    let host = app.host("views_host").await;
    let visitor = app.register("views_visitor").await;
    let place = app.create_ad(&host, 1).await;

    let anonymous = app.get(&ad_path(&place), None).await;
    assert_eq!(anonymous.json()["place"]["viewsCount"], 0);

    let signed_in = app.get(&ad_path(&place), Some(&visitor)).await;
    assert_eq!(signed_in.status, StatusCode::OK);
    assert_eq!(signed_in.json()["place"]["viewsCount"], 1);
}

#[tokio::test]
async fn get_unknown_ad() {
    let app = app().await;

    let resp = app
        .get(&format!("/api/ads/{}", Uuid::new_v4()), None)
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.error_message(), "ad not found");

    let resp = app.get("/api/ads/not-a-uuid", None).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.error_message(), "ad not found");
}

// ===========================================================================
// Create Validation
// ===========================================================================

#[tokio::test]
async fn create_requires_session() {
    let app = app().await;

    let form = MultipartForm::new()
        .metadata(&ad_metadata("Moscow", 2))
        .jpeg(jpeg_bytes(200, 200));
    let resp = app.post_multipart("/api/ads", form, None).await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error_message(), "no active session");
}

#[tokio::test]
async fn create_requires_csrf_token() {
    let app = app().await;
    let host = app.host("csrf_create_host").await;

    let form = MultipartForm::new()
        .metadata(&ad_metadata("Moscow", 2))
        .jpeg(jpeg_bytes(200, 200));
    let resp = app
        .post_multipart("/api/ads", form, Some(&host.without_csrf()))
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error_message(), "Missing X-CSRF-Token header");

    let form = MultipartForm::new()
        .metadata(&ad_metadata("Moscow", 2))
        .jpeg(jpeg_bytes(200, 200));
    let resp = app
        .post_multipart("/api/ads", form, Some(&host.with_csrf("garbage")))
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error_message(), "Invalid JWT token");

    assert!(list(&app, "").await.is_empty());
    assert!(app.blobs.is_empty().await);
}

#[tokio::test]
async fn create_requires_host() {
    let app = app().await;
    let guest = app.register("not_a_host").await;

    let form = MultipartForm::new()
        .metadata(&ad_metadata("Moscow", 2))
        .jpeg(jpeg_bytes(200, 200));
    let resp = app.post_multipart("/api/ads", form, Some(&guest)).await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error_message(), "User is not host");
}

#[tokio::test]
async fn create_rejects_bad_forms() {
    let app = app().await;
    let host = app.host("bad_form_host").await;

    let mut long_address = ad_metadata("Moscow", 2);
    long_address["address"] = json!("a".repeat(256));
    let mut bad_chars = ad_metadata("Moscow", 2);
    bad_chars["address"] = json!("Main st. 5!");

    let cases: Vec<(MultipartForm, StatusCode, &str)> = vec![
        (
            MultipartForm::new().metadata(&ad_metadata("Moscow", 2)),
            StatusCode::BAD_REQUEST,
            "No images",
        ),
        (
            MultipartForm::new()
                .text("metadata", "{not json")
                .jpeg(jpeg_bytes(200, 200)),
            StatusCode::BAD_REQUEST,
            "Invalid metadata JSON",
        ),
        (
            MultipartForm::new().jpeg(jpeg_bytes(200, 200)),
            StatusCode::BAD_REQUEST,
            "Invalid metadata JSON",
        ),
        (
            MultipartForm::new()
                .metadata(&ad_metadata("Moscow", 2))
                .jpeg(jpeg_bytes(50, 50)),
            StatusCode::BAD_REQUEST,
            "Invalid size, type or resolution of image",
        ),
        (
            MultipartForm::new()
                .metadata(&ad_metadata("Moscow", 2))
                .file("images", "image/jpeg", b"definitely not an image"),
            StatusCode::BAD_REQUEST,
            "Invalid size, type or resolution of image",
        ),
        (
            MultipartForm::new()
                .metadata(&long_address)
                .jpeg(jpeg_bytes(200, 200)),
            StatusCode::BAD_REQUEST,
            "Input exceeds character limit",
        ),
        (
            MultipartForm::new()
                .metadata(&bad_chars)
                .jpeg(jpeg_bytes(200, 200)),
            StatusCode::BAD_REQUEST,
            "Input contains invalid characters",
        ),
        (
            MultipartForm::new()
                .metadata(&ad_metadata("Moscow", 1001))
                .jpeg(jpeg_bytes(200, 200)),
            StatusCode::BAD_REQUEST,
            "RoomsNumber out of range",
        ),
        (
            MultipartForm::new()
                .metadata(&ad_metadata("Atlantis", 2))
                .jpeg(jpeg_bytes(200, 200)),
            StatusCode::NOT_FOUND,
            "city not found",
        ),
    ];

    for (form, status, message) in cases {
        let resp = app.post_multipart("/api/ads", form, Some(&host)).await;
        assert_eq!(resp.status, status, "{}", message);
        assert_eq!(resp.error_message(), message);
    }

    assert!(list(&app, "").await.is_empty());
    assert!(app.blobs.is_empty().await);
}

#[tokio::test]
async fn create_rejects_too_many_images() {
    let app = app().await;
    let host = app.host("many_images_host").await;

    let mut form = MultipartForm::new().metadata(&ad_metadata("Moscow", 2));
    for _ in 0..11 {
        form = form.jpeg(jpeg_bytes(120, 120));
    }
    let resp = app.post_multipart("/api/ads", form, Some(&host)).await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "Too many images");
}

#[tokio::test]
async fn create_rejects_non_multipart_body() {
    let app = app().await;
    let host = app.host("json_body_host").await;

    let resp = app
        .post_json("/api/ads", ad_metadata("Moscow", 2), Some(&host))
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "Invalid multipart form");
}

#[tokio::test]
async fn oversized_upload_is_refused() {
    let app = app().await;
    let host = app.host("big_upload_host").await;

    let body = vec![0u8; common::UPLOAD_MAX_BYTES + 1];
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/ads")
        .header(header::CONTENT_TYPE, "multipart/form-data; boundary=x")
        .header(header::CONTENT_LENGTH, body.len())
        .header(header::COOKIE, format!("session_id={}", host.session_id))
        .header("x-csrf-token", host.csrf.clone().unwrap_or_default())
        .body(Body::from(body))
        .expect("invalid request");
    let resp = app.send(request).await;

    assert_eq!(resp.status, StatusCode::PAYLOAD_TOO_LARGE);
}

// ===========================================================================
// Update & Delete
// ===========================================================================

#[tokio::test]
async fn update_replaces_fields_and_images() {
    let app = app().await;
    let host = app.host("update_host").await;
    let place = app.create_ad(&host, 2).await;
    let old_paths = image_paths(&place);

    let mut metadata = ad_metadata("Kazan", 5);
    metadata["description"] = json!("Renovated loft");
    let form = MultipartForm::new()
        .metadata(&metadata)
        .jpeg(jpeg_bytes(300, 300));
    let resp = app
        .put_multipart(&ad_path(&place), form, Some(&host))
        .await;
    assert_eq!(resp.status, StatusCode::OK, "{:?}", resp.json());
    assert_eq!(resp.json()["response"], "Successfully updated ad");

    let fetched = app.get(&ad_path(&place), None).await.json()["place"].clone();
    assert_eq!(fetched["description"], "Renovated loft");
    assert_eq!(fetched["cityName"], "Kazan");
    assert_eq!(fetched["roomsNumber"], 5);
    let new_paths = image_paths(&fetched);
    assert_eq!(new_paths.len(), 1);
    assert!(!old_paths.contains(&new_paths[0]));

    assert_eq!(app.blobs.len().await, 1);
    for path in &old_paths {
        assert!(app.blobs.get(path).await.is_none());
    }
}

#[tokio::test]
async fn update_without_images_keeps_them() {
    let app = app().await;
    let host = app.host("keep_images_host").await;
    let place = app.create_ad(&host, 2).await;

    let mut metadata = ad_metadata("Moscow", 3);
    metadata["address"] = json!("Arbat 10");
    let form = MultipartForm::new().metadata(&metadata);
    let resp = app
        .put_multipart(&ad_path(&place), form, Some(&host))
        .await;
    assert_eq!(resp.status, StatusCode::OK);

    let fetched = app.get(&ad_path(&place), None).await.json()["place"].clone();
    assert_eq!(fetched["address"], "Arbat 10");
    assert_eq!(image_paths(&fetched), image_paths(&place));
}

#[tokio::test]
async fn non_owner_cannot_update_or_delete() {
    let app = app().await;
    let owner = app.host("owner_host").await;
    let intruder = app.host("intruder_host").await;
    let place = app.create_ad(&owner, 1).await;

    let mut metadata = ad_metadata("Moscow", 2);
    metadata["description"] = json!("Hijacked");
    let form = MultipartForm::new().metadata(&metadata);
    let resp = app
        .put_multipart(&ad_path(&place), form, Some(&intruder))
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error_message(), "not owner of ad");

    let resp = app.delete(&ad_path(&place), Some(&intruder)).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error_message(), "not owner of ad");

    let fetched = app.get(&ad_path(&place), None).await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.json()["place"]["description"], place["description"]);
    assert_eq!(app.blobs.len().await, 1);
}

#[tokio::test]
async fn mutations_without_csrf_do_not_apply() {
    let app = app().await;
    let host = app.host("csrf_mutation_host").await;
    let place = app.create_ad(&host, 1).await;
    let bare = host.without_csrf();

    let form = MultipartForm::new().metadata(&ad_metadata("Sochi", 9));
    let resp = app.put_multipart(&ad_path(&place), form, Some(&bare)).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error_message(), "Missing X-CSRF-Token header");

    let resp = app.delete(&ad_path(&place), Some(&bare)).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);

    let image_id = place["images"][0]["id"].as_i64().unwrap_or_default();
    let resp = app
        .delete(
            &format!("{}/images/{}", ad_path(&place), image_id),
            Some(&bare),
        )
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);

    let resp = app
        .post_json(&format!("{}/like", ad_path(&place)), json!({}), Some(&bare))
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);

    let fetched = app.get(&ad_path(&place), None).await.json()["place"].clone();
    assert_eq!(fetched["cityName"], "Moscow");
    assert_eq!(fetched["favoritesCount"], 0);
    assert_eq!(image_paths(&fetched), image_paths(&place));
}

#[tokio::test]
async fn delete_twice() {
    let app = app().await;
    let host = app.host("delete_host").await;
    let place = app.create_ad(&host, 2).await;

    let first = app.delete(&ad_path(&place), Some(&host)).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.json()["response"], "Successfully deleted ad");

    let second = app.delete(&ad_path(&place), Some(&host)).await;
    assert_eq!(second.status, StatusCode::NOT_FOUND);
    assert_eq!(second.error_message(), "ad not found");

    assert!(app.blobs.is_empty().await);
    assert_eq!(app.store.image_count().await, 0);
}

#[tokio::test]
async fn delete_single_image() {
    let app = app().await;
    let host = app.host("image_delete_host").await;
    let place = app.create_ad(&host, 2).await;
    let image_id = place["images"][0]["id"].as_i64().expect("image id");
    let kept = place["images"][1]["path"].as_str().unwrap_or_default().to_string();
    let path = format!("{}/images/{}", ad_path(&place), image_id);

    let resp = app.delete(&path, Some(&host)).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["response"], "Successfully deleted image");

    let fetched = app.get(&ad_path(&place), None).await.json()["place"].clone();
    assert_eq!(image_paths(&fetched), vec![kept]);
    assert_eq!(app.blobs.len().await, 1);

    let again = app.delete(&path, Some(&host)).await;
    assert_eq!(again.status, StatusCode::NOT_FOUND);
    assert_eq!(again.error_message(), "image not found");

    let last_id = fetched["images"][0]["id"].as_i64().expect("image id");
    let last = app
        .delete(&format!("{}/images/{}", ad_path(&place), last_id), Some(&host))
        .await;
    assert_eq!(last.status, StatusCode::BAD_REQUEST);
    assert_eq!(last.error_message(), "Cannot delete the last image");
}

#[tokio::test]
async fn only_image_is_kept() {
    let app = app().await;
    let host = app.host("only_image_host").await;
    let place = app.create_ad(&host, 1).await;
    let image_id = place["images"][0]["id"].as_i64().expect("image id");

    let resp = app
        .delete(&format!("{}/images/{}", ad_path(&place), image_id), Some(&host))
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "Cannot delete the last image");
    let fetched = app.get(&ad_path(&place), None).await.json()["place"].clone();
    assert_eq!(image_paths(&fetched), image_paths(&place));
    assert_eq!(app.blobs.len().await, 1);
    assert_eq!(app.store.image_count().await, 1);
}

// ===========================================================================
// Favorites
// ===========================================================================

#[tokio::test]
async fn favorites_track_likes() {
    let app = app().await;
    let host = app.host("liked_host").await;
    let fan = app.register("first_fan").await;
    let second_fan = app.register("second_fan").await;
    let place = app.create_ad(&host, 1).await;
    let like = format!("{}/like", ad_path(&place));

    let resp = app.post_json(&like, json!({}), Some(&fan)).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["favoritesCount"], 1);

    let resp = app.post_json(&like, json!({}), Some(&second_fan)).await;
    assert_eq!(resp.json()["favoritesCount"], 2);

    let resp = app.post_json(&like, json!({}), Some(&fan)).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["favoritesCount"], 2);

    let favorites = app.get("/api/favorites", Some(&fan)).await;
    assert_eq!(favorites.status, StatusCode::OK);
    assert_eq!(ids(&favorites.json()["places"]), vec![ad_id(&place)]);

    let resp = app.delete(&like, Some(&fan)).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["favoritesCount"], 1);

    let favorites = app.get("/api/favorites", Some(&fan)).await;
    assert!(ids(&favorites.json()["places"]).is_empty());

    let fetched = app.get(&ad_path(&place), None).await;
    assert_eq!(fetched.json()["place"]["favoritesCount"], 1);
}

#[tokio::test]
async fn favorites_count_is_recomputed_from_likes() {
    let app = app().await;
    let host = app.host("recount_host").await;
    let fan = app.register("recount_fan").await;
    let place = app.create_ad(&host, 1).await;
    let ad = Uuid::parse_str(&ad_id(&place)).expect("ad id");

    app.post_json(&format!("{}/like", ad_path(&place)), json!({}), Some(&fan))
        .await;

    let ctx = RequestContext::generated(Duration::from_secs(5));
    assert_eq!(app.state.ads.refresh_favorites_count(ad, &ctx).await, Ok(1));
    assert_eq!(
        app.state
            .ads
            .refresh_favorites_count(Uuid::new_v4(), &ctx)
            .await,
        Err(ServiceError::AdNotFound)
    );
}

#[tokio::test]
async fn like_unknown_ad() {
    let app = app().await;
    let fan = app.register("lonely_fan").await;

    let resp = app
        .post_json(
            &format!("/api/ads/{}/like", Uuid::new_v4()),
            json!({}),
            Some(&fan),
        )
        .await;

    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.error_message(), "ad not found");
}

#[tokio::test]
async fn favorites_require_session() {
    let app = app().await;

    let resp = app.get("/api/favorites", None).await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

// ===========================================================================
// Priority
// ===========================================================================

#[tokio::test]
async fn priority_boost_moves_ad_to_the_top() {
    let app = app().await;
    let host = app.host("boost_host").await;
    let boosted = app.create_ad(&host, 1).await;
    app.create_ad(&host, 1).await;
    app.create_ad(&host, 1).await;

    let resp = app
        .post_json(
            &format!("{}/priority", ad_path(&boosted)),
            json!({ "amount": 5 }),
            Some(&host),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK, "{:?}", resp.json());
    let place = resp.json()["place"].clone();
    assert_eq!(place["priority"], 5);
    assert!(place["priorityExpiresAt"].is_string());

    assert_eq!(list(&app, "").await[0], ad_id(&boosted));
}

#[tokio::test]
async fn priority_rejects_bad_requests() {
    let app = app().await;
    let host = app.host("bad_boost_host").await;
    let other = app.host("other_boost_host").await;
    let place = app.create_ad(&host, 1).await;
    let path = format!("{}/priority", ad_path(&place));

    let resp = app.post_json(&path, json!({ "amount": 0 }), Some(&host)).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "Invalid priority amount");

    let resp = app.post_json(&path, json!({ "amount": 3 }), Some(&other)).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error_message(), "not owner of ad");

    let resp = app.post_json(&path, json!({ "amount": "lots" }), Some(&host)).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "Invalid JSON");
}

#[tokio::test]
async fn priority_cannot_overflow() {
    let app = app().await;
    let host = app.host("greedy_boost_host").await;
    let place = app.create_ad(&host, 1).await;
    let path = format!("{}/priority", ad_path(&place));

    let resp = app
        .post_json(&path, json!({ "amount": i32::MAX }), Some(&host))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["place"]["priority"], i32::MAX);

    let resp = app.post_json(&path, json!({ "amount": 1 }), Some(&host)).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "Invalid priority amount");

    let fetched = app.get(&ad_path(&place), None).await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.json()["place"]["priority"], i32::MAX);
}

#[tokio::test]
async fn expired_priorities_are_reset() {
    let app = app().await;
    let host = app.host("expiry_host").await;
    let expired = app.create_ad(&host, 1).await;
    let active = app.create_ad(&host, 1).await;

    for place in [&expired, &active] {
        let resp = app
            .post_json(
                &format!("{}/priority", ad_path(place)),
                json!({ "amount": 7 }),
                Some(&host),
            )
            .await;
        assert_eq!(resp.status, StatusCode::OK);
    }

    let expired_id = Uuid::parse_str(&ad_id(&expired)).expect("invalid ad uuid");
    app.store
        .set_priority_expiry(
            expired_id,
            Some(OffsetDateTime::now_utc() - time::Duration::hours(1)),
        )
        .await;

    let client = AdsClient::new(app.ads_addr.clone());
    let affected = priority_reset::sweep(&client, Duration::from_secs(5)).await;
    assert_eq!(affected, Some(1));

    let now = OffsetDateTime::now_utc();
    let resp = app.get("/api/ads", None).await;
    for place in resp.json()["places"].as_array().cloned().unwrap_or_default() {
        let boosted = place["priority"].as_i64().unwrap_or_default() > 0;
        let lapsed = place["priorityExpiresAt"]
            .as_str()
            .and_then(|at| {
                OffsetDateTime::parse(at, &time::format_description::well_known::Rfc3339).ok()
            })
            .is_some_and(|at| at < now);
        assert!(!(boosted && lapsed), "stale boost on {}", place["uuid"]);
    }

    let reset = app.get(&ad_path(&expired), None).await.json()["place"].clone();
    assert_eq!(reset["priority"], 0);
    assert!(reset["priorityExpiresAt"].is_null());
    let kept = app.get(&ad_path(&active), None).await.json()["place"].clone();
    assert_eq!(kept["priority"], 7);

    let again = priority_reset::sweep(&client, Duration::from_secs(5)).await;
    assert_eq!(again, Some(0));
}

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceExt;
use uuid::Uuid;

use domik::app::ads::AdService;
use domik::app::auth::AuthService;
use domik::app::cities::CityService;
use domik::app::csrf::CsrfService;
use domik::app::session::{MemorySessionStore, SessionService};
use domik::app::users::UserService;
use domik::infra::db::Db;
use domik::infra::storage::MemoryBlobStore;
use domik::repo::{MemoryStore, Repositories};
use domik::rpc::ads::{AdsClient, AdsRpc};
use domik::rpc::auth::{AuthClient, AuthRpc};
use domik::rpc::city::{CityClient, CityRpc};
use domik::rpc::{self, RpcService};
use domik::{http, AppState};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const TEST_CSRF_SECRET: &str = "test-csrf-secret-0123456789abcdef0123";
pub const DEFAULT_PASSWORD: &str = "password";
pub const UPLOAD_MAX_BYTES: usize = 10 * 1024 * 1024;
const BOUNDARY: &str = "domik-test-boundary";

// ---------------------------------------------------------------------------
// TestApp: one in-process deployment per test
// ---------------------------------------------------------------------------

/// Gateway router wired to real RPC servers on ephemeral ports, all backed
/// by in-memory stores the tests can inspect directly.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub store: MemoryStore,
    pub blobs: MemoryBlobStore,
    pub repos: Repositories,
    pub sessions: SessionService,
    pub session_store: MemorySessionStore,
    pub ads_addr: String,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    body_bytes: bytes::Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn error_message(&self) -> String {
        self.json()["error"].as_str().unwrap_or("").to_string()
    }

    pub fn set_cookie(&self) -> Option<String> {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }
}

/// A logged-in caller. `csrf` is sent as `X-CSRF-Token` when present.
#[derive(Clone)]
pub struct TestUser {
    pub id: Uuid,
    pub username: String,
    pub session_id: String,
    pub csrf: Option<String>,
}

impl TestUser {
    pub fn without_csrf(&self) -> TestUser {
        TestUser {
            csrf: None,
            ..self.clone()
        }
    }

    pub fn with_csrf(&self, token: &str) -> TestUser {
        TestUser {
            csrf: Some(token.to_string()),
            ..self.clone()
        }
    }
}

async fn spawn_rpc(service: Arc<dyn RpcService>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind rpc listener");
    let addr = listener
        .local_addr()
        .expect("listener has no local address")
        .to_string();
    tokio::spawn(rpc::serve(listener, service));
    addr
}

pub async fn app() -> TestApp {
    TestApp::spawn().await
}

impl TestApp {
    pub async fn spawn() -> Self {
        let store = MemoryStore::seeded().await;
        let repos = Repositories::memory(store.clone());
        let blobs = MemoryBlobStore::new();
        let session_store = MemorySessionStore::new();
        let sessions = SessionService::new(
            Arc::new(session_store.clone()),
            time::Duration::hours(24),
        );

        let ads = AdService::new(
            repos.clone(),
            Arc::new(blobs.clone()),
            time::Duration::hours(24),
        );
        let ads_addr = spawn_rpc(Arc::new(AdsRpc::new(ads))).await;
        let city_addr = spawn_rpc(Arc::new(CityRpc::new(CityService::new(repos.clone())))).await;
        let auth_addr = spawn_rpc(Arc::new(AuthRpc::new(
            AuthService::new(repos.clone(), sessions.clone()),
            UserService::new(repos.clone()),
        )))
        .await;

        let state = AppState {
            ads: AdsClient::new(ads_addr.clone()),
            cities: CityClient::new(city_addr),
            auth: AuthClient::new(auth_addr),
            sessions: sessions.clone(),
            csrf: CsrfService::new(TEST_CSRF_SECRET.as_bytes(), time::Duration::minutes(60)),
            request_timeout: Duration::from_secs(10),
            upload_max_bytes: UPLOAD_MAX_BYTES,
            cookie_secure: false,
            cors_allowed_origin: None,
        };

        TestApp {
            router: http::router(state.clone()),
            state,
            store,
            blobs,
            repos,
            sessions,
            session_store,
            ads_addr,
        }
    }

    // ------------------------------------------------------------------
    // Raw requests
    // ------------------------------------------------------------------

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router failed");

        let status = response.status();
        let headers = response.headers().clone();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to read body")
            .to_bytes();

        TestResponse {
            status,
            headers,
            body_bytes,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        content_type: Option<&str>,
        body: Body,
        user: Option<&TestUser>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        if let Some(user) = user {
            builder = builder.header(header::COOKIE, format!("session_id={}", user.session_id));
            if let Some(csrf) = &user.csrf {
                builder = builder.header("x-csrf-token", csrf);
            }
        }
        self.send(builder.body(body).expect("invalid request")).await
    }

    pub async fn get(&self, path: &str, user: Option<&TestUser>) -> TestResponse {
        self.request(Method::GET, path, None, Body::empty(), user)
            .await
    }

    pub async fn delete(&self, path: &str, user: Option<&TestUser>) -> TestResponse {
        self.request(Method::DELETE, path, None, Body::empty(), user)
            .await
    }

    pub async fn post_json(&self, path: &str, body: Value, user: Option<&TestUser>) -> TestResponse {
        self.request(
            Method::POST,
            path,
            Some("application/json"),
            Body::from(body.to_string()),
            user,
        )
        .await
    }

    pub async fn put_json(&self, path: &str, body: Value, user: Option<&TestUser>) -> TestResponse {
        self.request(
            Method::PUT,
            path,
            Some("application/json"),
            Body::from(body.to_string()),
            user,
        )
        .await
    }

    pub async fn post_multipart(
        &self,
        path: &str,
        form: MultipartForm,
        user: Option<&TestUser>,
    ) -> TestResponse {
        let (content_type, body) = form.finish();
        self.request(Method::POST, path, Some(&content_type), Body::from(body), user)
            .await
    }

    pub async fn put_multipart(
        &self,
        path: &str,
        form: MultipartForm,
        user: Option<&TestUser>,
    ) -> TestResponse {
        let (content_type, body) = form.finish();
        self.request(Method::PUT, path, Some(&content_type), Body::from(body), user)
            .await
    }

    // ------------------------------------------------------------------
    // Users and sessions
    // ------------------------------------------------------------------

    pub async fn register_as(&self, username: &str, is_host: bool) -> TestUser {
        let resp = self
            .post_json(
                "/api/auth/register",
                json!({
                    "username": username,
                    "email": format!("{}@example.com", username),
                    "password": DEFAULT_PASSWORD,
                    "isHost": is_host,
                }),
                None,
            )
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "register failed: {:?}", resp.json());

        let body = resp.json();
        let id = body["user"]["uuid"]
            .as_str()
            .and_then(|id| Uuid::parse_str(id).ok())
            .expect("register response has no user uuid");

        let mut user = TestUser {
            id,
            username: username.to_string(),
            session_id: body["session_id"].as_str().unwrap_or_default().to_string(),
            csrf: None,
        };
        user.csrf = Some(self.csrf_token(&user).await);
        user
    }

    /// Regular account with a CSRF token attached.
    pub async fn register(&self, username: &str) -> TestUser {
        self.register_as(username, false).await
    }

    /// Host account (allowed to publish ads) with a CSRF token attached.
    pub async fn host(&self, username: &str) -> TestUser {
        self.register_as(username, true).await
    }

    pub async fn csrf_token(&self, user: &TestUser) -> String {
        let resp = self.get("/api/csrf", Some(&user.without_csrf())).await;
        assert_eq!(resp.status, StatusCode::OK, "csrf failed: {:?}", resp.json());
        resp.json()["csrf_token"]
            .as_str()
            .expect("csrf response has no token")
            .to_string()
    }

    // ------------------------------------------------------------------
    // Ads
    // ------------------------------------------------------------------

    /// Publishes an ad in Moscow with `images` JPEG uploads and returns the
    /// `place` object.
    pub async fn create_ad(&self, user: &TestUser, images: usize) -> Value {
        self.create_ad_with(user, ad_metadata("Moscow", 2), images).await
    }

    pub async fn create_ad_with(&self, user: &TestUser, metadata: Value, images: usize) -> Value {
        let mut form = MultipartForm::new().metadata(&metadata);
        for _ in 0..images {
            form = form.jpeg(jpeg_bytes(200, 150));
        }
        let resp = self.post_multipart("/api/ads", form, Some(user)).await;
        assert_eq!(resp.status, StatusCode::OK, "create ad failed: {:?}", resp.json());
        resp.json()["place"].clone()
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn ad_metadata(city: &str, rooms: i32) -> Value {
    json!({
        "cityName": city,
        "address": "Tverskaya street 1",
        "description": "Cozy flat near the center",
        "roomsNumber": rooms,
        "dateFrom": "2026-11-01T00:00:00Z",
        "dateTo": "2026-11-10T00:00:00Z",
    })
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode_image(width, height, image::ImageFormat::Jpeg)
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode_image(width, height, image::ImageFormat::Png)
}

fn encode_image(width: u32, height: u32, format: image::ImageFormat) -> Vec<u8> {
    let pixels = image::RgbImage::from_pixel(width, height, image::Rgb([180, 120, 60]));
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(pixels)
        .write_to(&mut buf, format)
        .expect("failed to encode test image");
    buf.into_inner()
}

/// True when `value` is standard base64 of at least 32 bytes.
pub fn is_session_id(value: &str) -> bool {
    STANDARD
        .decode(value)
        .map(|bytes| bytes.len() >= 32)
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

const MIGRATION_LOCK: i64 = 7_411_001;

/// Connects to `DATABASE_URL` and applies the schema. `None` when the
/// variable is unset, so database tests pass trivially without a server.
pub async fn postgres() -> Option<Db> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(4)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&url)
        .await
        .expect("failed to connect to DATABASE_URL");
    let db = Db::from_pool(pool);

    // Test binaries migrate concurrently.
    let mut lock = db.pool().acquire().await.expect("acquire lock connection");
    sqlx::query("SELECT pg_advisory_lock($1)")
        .bind(MIGRATION_LOCK)
        .execute(&mut *lock)
        .await
        .expect("take migration lock");
    let migrated = db.migrate().await;
    sqlx::query("SELECT pg_advisory_unlock($1)")
        .bind(MIGRATION_LOCK)
        .execute(&mut *lock)
        .await
        .expect("release migration lock");
    migrated.expect("failed to apply schema");

    Some(db)
}

// ---------------------------------------------------------------------------
// Multipart builder
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MultipartForm {
    body: Vec<u8>,
    files: usize,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata(self, metadata: &Value) -> Self {
        self.text("metadata", &metadata.to_string())
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, content_type: &str, data: &[u8]) -> Self {
        self.files += 1;
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"upload{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, name, self.files, content_type
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn jpeg(self, data: Vec<u8>) -> Self {
        self.file("images", "image/jpeg", &data)
    }

    pub fn png(self, data: Vec<u8>) -> Self {
        self.file("images", "image/png", &data)
    }

    pub fn finish(mut self) -> (String, Vec<u8>) {
        self.body
            .extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        (
            format!("multipart/form-data; boundary={}", BOUNDARY),
            self.body,
        )
    }
}

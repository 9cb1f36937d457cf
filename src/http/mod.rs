use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue, Method, Request};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::domain::session::CSRF_HEADER;
use crate::AppState;

mod auth;
mod error;
mod handlers;
mod multipart;
mod routes;

pub mod middleware;

pub use auth::{CsrfUser, SessionCookie, SessionUser};
pub use error::AppError;

use middleware::request_context::{request_context_middleware, REQUEST_ID_HEADER};

/// The gateway router: every endpoint under `/api` plus the shared middleware
/// stack.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(routes::health())
        .merge(routes::ads())
        .merge(routes::auth())
        .merge(routes::users())
        .merge(routes::cities());

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    // Outermost first.
    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
        .layer(PropagateRequestIdLayer::new(request_id))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(cors_layer(state.cors_allowed_origin.as_deref()))
        .layer(CompressionLayer::new())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            request_context_middleware,
        ))
        .layer(RequestBodyLimitLayer::new(state.upload_max_bytes))
        .layer(DefaultBodyLimit::max(state.upload_max_bytes));

    Router::new()
        .nest("/api", api)
        .layer(middleware)
        .with_state(state)
}

fn cors_layer(allowed_origin: Option<&str>) -> CorsLayer {
    let origin = match allowed_origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => AllowOrigin::exact(origin),
        Some(Err(err)) => {
            tracing::warn!(error = %err, "invalid CORS_ALLOWED_ORIGIN, mirroring request origin");
            AllowOrigin::mirror_request()
        }
        None => AllowOrigin::mirror_request(),
    };

    let csrf = HeaderName::from_static(CSRF_HEADER);
    CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::SET_COOKIE,
            csrf.clone(),
        ])
        .expose_headers([csrf, HeaderName::from_static(REQUEST_ID_HEADER)])
}

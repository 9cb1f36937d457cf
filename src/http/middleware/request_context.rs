use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;

use crate::domain::context::RequestContext;
use crate::http::AppError;
use crate::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Stamps every request with a [`RequestContext`] built from the propagated
/// request id and the configured deadline.
pub async fn request_context_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    let ctx = match request_id {
        Some(id) => RequestContext::new(id, state.request_timeout),
        None => RequestContext::generated(state.request_timeout),
    };
    tracing::debug!(request_id = %ctx.request_id, path = %request.uri().path(), "request received");

    request.extensions_mut().insert(ctx);
    next.run(request).await
}

#[axum::async_trait]
impl FromRequestParts<AppState> for RequestContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_else(|| RequestContext::generated(state.request_timeout)))
    }
}

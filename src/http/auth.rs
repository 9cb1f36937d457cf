use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use cookie::{Cookie, SameSite};
use time::Duration;
use uuid::Uuid;

use crate::domain::session::{CSRF_HEADER, SESSION_COOKIE};
use crate::http::AppError;
use crate::AppState;

/// The caller's resolved session.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub user_id: Uuid,
    pub session_id: String,
}

/// A session whose request also carried a valid `X-CSRF-Token`.
#[derive(Debug, Clone)]
pub struct CsrfUser {
    pub user_id: Uuid,
    pub session_id: String,
}

/// Raw `session_id` cookie value, if any. Never rejects.
#[derive(Debug, Clone)]
pub struct SessionCookie(pub Option<String>);

pub fn read_session_cookie(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get_all(header::COOKIE)
        .into_iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

pub fn session_cookie(session_id: &str, ttl: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(secure)
        .max_age(ttl)
        .build()
}

pub fn expired_session_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(secure)
        .max_age(Duration::ZERO)
        .build()
}

#[axum::async_trait]
impl FromRequestParts<AppState> for SessionCookie {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(SessionCookie(read_session_cookie(parts)))
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for SessionUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session_id = read_session_cookie(parts);
        let record = state.sessions.lookup(session_id.as_deref()).await?;

        Ok(SessionUser {
            user_id: record.user_id,
            session_id: session_id.unwrap_or_default(),
        })
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for CsrfUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = SessionUser::from_request_parts(parts, state).await?;

        let token = parts
            .headers
            .get(CSRF_HEADER)
            .and_then(|value| value.to_str().ok());
        state.csrf.validate(token, &session.session_id)?;

        Ok(CsrfUser {
            user_id: session.user_id,
            session_id: session.session_id,
        })
    }
}

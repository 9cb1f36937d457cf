use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderName, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::ad::{Ad, AdFilter};
use crate::domain::city::City;
use crate::domain::context::RequestContext;
use crate::domain::error::ServiceError;
use crate::domain::session::CSRF_HEADER;
use crate::domain::user::{Credentials, NewUser, PublicUser, SessionData, Sex, User, UserUpdate};
use crate::http::auth::{expired_session_cookie, session_cookie, CsrfUser, SessionCookie, SessionUser};
use crate::http::multipart::read_ad_form;
use crate::http::AppError;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct PlacesResponse {
    pub places: Vec<Ad>,
}

#[derive(Serialize)]
pub struct PlaceResponse {
    pub place: Ad,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub response: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoritesCountResponse {
    pub favorites_count: i32,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub user: User,
}

#[derive(Serialize)]
pub struct CsrfResponse {
    pub csrf_token: String,
}

#[derive(Serialize)]
pub struct UsersResponse {
    pub users: Vec<PublicUser>,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Serialize)]
pub struct CitiesResponse {
    pub cities: Vec<City>,
}

#[derive(Serialize)]
pub struct CityResponse {
    pub city: City,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub name: Option<String>,
    pub sex: Option<Sex>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub birthdate: Option<OffsetDateTime>,
    #[serde(default)]
    pub is_host: bool,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub sex: Option<Sex>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub birthdate: Option<OffsetDateTime>,
    pub is_host: Option<bool>,
}

#[derive(Deserialize)]
pub struct PriorityRequest {
    pub amount: i32,
}

fn parse_ad_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| ServiceError::AdNotFound.into())
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload.map(|Json(value)| value).map_err(|err| {
        tracing::debug!(error = %err, "rejected json body");
        ServiceError::InvalidJson.into()
    })
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// ---- ads ----

pub async fn list_places(
    ctx: RequestContext,
    State(state): State<AppState>,
    Query(filter): Query<AdFilter>,
) -> Result<Json<PlacesResponse>, AppError> {
    let places = state.ads.list(filter, &ctx).await?;
    Ok(Json(PlacesResponse { places }))
}

pub async fn get_place(
    Path(ad_id): Path<String>,
    session: Option<SessionUser>,
    ctx: RequestContext,
    State(state): State<AppState>,
) -> Result<Json<PlaceResponse>, AppError> {
    let ad_id = parse_ad_id(&ad_id)?;
    let place = state.ads.get(ad_id, session.is_some(), &ctx).await?;
    Ok(Json(PlaceResponse { place }))
}

pub async fn create_place(
    user: CsrfUser,
    ctx: RequestContext,
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PlaceResponse>, AppError> {
    let form = read_ad_form(multipart).await?;
    let place = state
        .ads
        .create(form.draft, form.images, user.user_id, &ctx)
        .await?;
    Ok(Json(PlaceResponse { place }))
}

pub async fn update_place(
    Path(ad_id): Path<String>,
    user: CsrfUser,
    ctx: RequestContext,
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let ad_id = parse_ad_id(&ad_id)?;
    let form = read_ad_form(multipart).await?;
    state
        .ads
        .update(ad_id, user.user_id, form.draft, form.images, &ctx)
        .await?;
    Ok(Json(MessageResponse {
        response: "Successfully updated ad",
    }))
}

pub async fn delete_place(
    Path(ad_id): Path<String>,
    user: CsrfUser,
    ctx: RequestContext,
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>, AppError> {
    let ad_id = parse_ad_id(&ad_id)?;
    state.ads.delete(ad_id, user.user_id, &ctx).await?;
    Ok(Json(MessageResponse {
        response: "Successfully deleted ad",
    }))
}

pub async fn list_places_per_city(
    Path(city): Path<String>,
    ctx: RequestContext,
    State(state): State<AppState>,
) -> Result<Json<PlacesResponse>, AppError> {
    let places = state.ads.list_by_city(&city, &ctx).await?;
    Ok(Json(PlacesResponse { places }))
}

pub async fn list_user_places(
    Path(user_id): Path<String>,
    ctx: RequestContext,
    State(state): State<AppState>,
) -> Result<Json<PlacesResponse>, AppError> {
    let user_id = Uuid::parse_str(&user_id).map_err(|_| AppError::from(ServiceError::UserNotFound))?;
    let places = state.ads.list_by_user(user_id, &ctx).await?;
    Ok(Json(PlacesResponse { places }))
}

pub async fn delete_place_image(
    Path((ad_id, image_id)): Path<(String, String)>,
    user: CsrfUser,
    ctx: RequestContext,
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>, AppError> {
    let ad_id = parse_ad_id(&ad_id)?;
    let image_id: i64 = image_id
        .parse()
        .map_err(|_| AppError::from(ServiceError::ImageNotFound))?;
    state
        .ads
        .delete_image(ad_id, image_id, user.user_id, &ctx)
        .await?;
    Ok(Json(MessageResponse {
        response: "Successfully deleted image",
    }))
}

pub async fn like_place(
    Path(ad_id): Path<String>,
    user: CsrfUser,
    ctx: RequestContext,
    State(state): State<AppState>,
) -> Result<Json<FavoritesCountResponse>, AppError> {
    let ad_id = parse_ad_id(&ad_id)?;
    let favorites_count = state.ads.add_favorite(ad_id, user.user_id, &ctx).await?;
    Ok(Json(FavoritesCountResponse { favorites_count }))
}

pub async fn unlike_place(
    Path(ad_id): Path<String>,
    user: CsrfUser,
    ctx: RequestContext,
    State(state): State<AppState>,
) -> Result<Json<FavoritesCountResponse>, AppError> {
    let ad_id = parse_ad_id(&ad_id)?;
    let favorites_count = state.ads.remove_favorite(ad_id, user.user_id, &ctx).await?;
    Ok(Json(FavoritesCountResponse { favorites_count }))
}

pub async fn list_favorites(
    user: SessionUser,
    ctx: RequestContext,
    State(state): State<AppState>,
) -> Result<Json<PlacesResponse>, AppError> {
    let places = state.ads.favorites(user.user_id, &ctx).await?;
    Ok(Json(PlacesResponse { places }))
}

pub async fn update_priority(
    Path(ad_id): Path<String>,
    user: CsrfUser,
    ctx: RequestContext,
    State(state): State<AppState>,
    payload: Result<Json<PriorityRequest>, JsonRejection>,
) -> Result<Json<PlaceResponse>, AppError> {
    let ad_id = parse_ad_id(&ad_id)?;
    let payload = json_body(payload)?;
    let place = state
        .ads
        .add_priority(ad_id, user.user_id, payload.amount, &ctx)
        .await?;
    Ok(Json(PlaceResponse { place }))
}

// ---- auth ----

pub async fn register(
    ctx: RequestContext,
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let payload = json_body(payload)?;
    let new_user = NewUser {
        username: payload.username,
        email: payload.email,
        password: payload.password,
        name: payload.name,
        sex: payload.sex,
        birthdate: payload.birthdate,
        is_host: payload.is_host,
    };

    let session = state.auth.register(new_user, &ctx).await?;
    let cookie = session_cookie(&session.session_id, state.sessions.ttl(), state.cookie_secure);

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie.to_string())],
        Json(SessionResponse {
            session_id: session.session_id,
            user: session.user,
        }),
    ))
}

pub async fn login(
    ctx: RequestContext,
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let payload = json_body(payload)?;
    let credentials = Credentials {
        username: payload.username,
        password: payload.password,
    };

    let session = state.auth.login(credentials, &ctx).await?;
    let cookie = session_cookie(&session.session_id, state.sessions.ttl(), state.cookie_secure);

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie.to_string())],
        Json(SessionResponse {
            session_id: session.session_id,
            user: session.user,
        }),
    ))
}

pub async fn logout(
    SessionCookie(session_id): SessionCookie,
    ctx: RequestContext,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.logout(session_id, &ctx).await?;
    let cookie = expired_session_cookie(state.cookie_secure);

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie.to_string())],
        Json(MessageResponse {
            response: "Successfully logged out",
        }),
    ))
}

pub async fn issue_csrf_token(
    user: SessionUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let token = state.csrf.issue(&user.session_id)?;

    Ok((
        [(HeaderName::from_static(CSRF_HEADER), token.clone())],
        Json(CsrfResponse { csrf_token: token }),
    ))
}

pub async fn get_session_data(
    user: SessionUser,
    ctx: RequestContext,
    State(state): State<AppState>,
) -> Result<Json<SessionData>, AppError> {
    let data = state.auth.session_data(user.user_id, &ctx).await?;
    Ok(Json(data))
}

// ---- users ----

pub async fn list_users(
    ctx: RequestContext,
    State(state): State<AppState>,
) -> Result<Json<UsersResponse>, AppError> {
    let users = state.auth.list_users(&ctx).await?;
    Ok(Json(UsersResponse { users }))
}

pub async fn get_current_user(
    user: SessionUser,
    ctx: RequestContext,
    State(state): State<AppState>,
) -> Result<Json<User>, AppError> {
    let user = state.auth.get_user(user.user_id, &ctx).await?;
    Ok(Json(user))
}

pub async fn update_current_user(
    user: SessionUser,
    ctx: RequestContext,
    State(state): State<AppState>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, AppError> {
    let payload = json_body(payload)?;
    let changes = UserUpdate {
        username: payload.username,
        email: payload.email,
        name: payload.name,
        avatar: payload.avatar,
        sex: payload.sex,
        birthdate: payload.birthdate,
        is_host: payload.is_host,
    };

    let user = state.auth.update_user(user.user_id, changes, &ctx).await?;
    Ok(Json(UserResponse { user }))
}

// ---- cities ----

pub async fn list_cities(
    ctx: RequestContext,
    State(state): State<AppState>,
) -> Result<Json<CitiesResponse>, AppError> {
    let cities = state.cities.list(&ctx).await?;
    Ok(Json(CitiesResponse { cities }))
}

pub async fn get_city(
    Path(en_name): Path<String>,
    ctx: RequestContext,
    State(state): State<AppState>,
) -> Result<Json<CityResponse>, AppError> {
    let city = state.cities.get(&en_name, &ctx).await?;
    Ok(Json(CityResponse { city }))
}

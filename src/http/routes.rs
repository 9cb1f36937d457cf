use axum::{routing::delete, routing::get, routing::post, Router};

use crate::http::handlers;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn ads() -> Router<AppState> {
    Router::new()
        .route("/ads", get(handlers::list_places).post(handlers::create_place))
        .route(
            "/ads/:ad_id",
            get(handlers::get_place)
                .put(handlers::update_place)
                .delete(handlers::delete_place),
        )
        .route("/ads/cities/:city", get(handlers::list_places_per_city))
        .route(
            "/ads/:ad_id/images/:image_id",
            delete(handlers::delete_place_image),
        )
        .route(
            "/ads/:ad_id/like",
            post(handlers::like_place).delete(handlers::unlike_place),
        )
        .route("/ads/:ad_id/priority", post(handlers::update_priority))
        .route("/favorites", get(handlers::list_favorites))
        .route("/users/:user_id/places", get(handlers::list_user_places))
}

pub fn auth() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/logout", delete(handlers::logout))
        .route("/csrf", get(handlers::issue_csrf_token))
        .route("/getSessionData", get(handlers::get_session_data))
}

pub fn users() -> Router<AppState> {
    Router::new()
        .route("/users", get(handlers::list_users))
        .route(
            "/user",
            get(handlers::get_current_user).put(handlers::update_current_user),
        )
}

pub fn cities() -> Router<AppState> {
    Router::new()
        .route("/cities", get(handlers::list_cities))
        .route("/cities/:en_name", get(handlers::get_city))
}

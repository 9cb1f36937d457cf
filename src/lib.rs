pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;
pub mod jobs;
pub mod repo;
pub mod rpc;

use std::time::Duration;

use crate::app::csrf::CsrfService;
use crate::app::session::SessionService;
use crate::rpc::ads::AdsClient;
use crate::rpc::auth::AuthClient;
use crate::rpc::city::CityClient;

/// Everything the HTTP gateway needs per request. Business logic lives behind
/// the RPC clients; sessions and CSRF are checked at the edge.
#[derive(Clone)]
pub struct AppState {
    pub ads: AdsClient,
    pub cities: CityClient,
    pub auth: AuthClient,
    pub sessions: SessionService,
    pub csrf: CsrfService,
    pub request_timeout: Duration,
    pub upload_max_bytes: usize,
    pub cookie_secure: bool,
    pub cors_allowed_origin: Option<String>,
}

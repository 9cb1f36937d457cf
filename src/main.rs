use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use domik::app::ads::AdService;
use domik::app::auth::AuthService;
use domik::app::cities::CityService;
use domik::app::csrf::CsrfService;
use domik::app::session::{MemorySessionStore, RedisSessionStore, SessionService, SessionStore};
use domik::app::users::UserService;
use domik::config::{AppConfig, AppMode, BlobBackend, SessionBackend, StorageBackend};
use domik::infra::{
    cache::RedisCache,
    db::Db,
    storage::{BlobStore, MemoryBlobStore, ObjectStorage},
};
use domik::repo::{memory::MemoryStore, Repositories};
use domik::rpc::{self, ads::AdsClient, ads::AdsRpc, auth::AuthClient, auth::AuthRpc};
use domik::rpc::{city::CityClient, city::CityRpc};
use domik::{http, jobs, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    let config = AppConfig::from_env()?;
    tracing::info!(mode = ?config.app_mode, "starting");

    match config.app_mode {
        AppMode::Gateway => {
            let sessions = build_sessions(&config).await?;
            run_gateway(&config, sessions).await?;
        }
        AppMode::Ads => {
            let ads = build_ad_service(&config, build_repositories(&config).await?).await?;
            let listener = bind(&config.ads_rpc_addr).await?;
            until_shutdown(rpc::serve(listener, Arc::new(AdsRpc::new(ads)))).await?;
        }
        AppMode::City => {
            let cities = CityService::new(build_repositories(&config).await?);
            let listener = bind(&config.city_rpc_addr).await?;
            until_shutdown(rpc::serve(listener, Arc::new(CityRpc::new(cities)))).await?;
        }
        AppMode::Auth => {
            let repos = build_repositories(&config).await?;
            let sessions = build_sessions(&config).await?;
            let service = AuthRpc::new(
                AuthService::new(repos.clone(), sessions),
                UserService::new(repos),
            );
            let listener = bind(&config.auth_rpc_addr).await?;
            until_shutdown(rpc::serve(listener, Arc::new(service))).await?;
        }
        AppMode::Worker => {
            let ads = AdsClient::new(config.ads_rpc_addr.clone());
            until_shutdown(jobs::priority_reset::run(
                ads,
                Duration::from_secs(config.priority_sweep_seconds),
                Duration::from_millis(config.request_timeout_ms),
            ))
            .await?;
        }
        AppMode::All => run_all(&config).await?,
    }

    Ok(())
}

/// Every service, the worker and the gateway in one process, sharing one
/// repository set and one session store.
async fn run_all(config: &AppConfig) -> Result<()> {
    let repos = build_repositories(config).await?;
    let sessions = build_sessions(config).await?;
    let ads = build_ad_service(config, repos.clone()).await?;

    let ads_listener = bind(&config.ads_rpc_addr).await?;
    let city_listener = bind(&config.city_rpc_addr).await?;
    let auth_listener = bind(&config.auth_rpc_addr).await?;

    let mut tasks = JoinSet::new();
    tasks.spawn(rpc::serve(ads_listener, Arc::new(AdsRpc::new(ads))));
    tasks.spawn(rpc::serve(
        city_listener,
        Arc::new(CityRpc::new(CityService::new(repos.clone()))),
    ));
    tasks.spawn(rpc::serve(
        auth_listener,
        Arc::new(AuthRpc::new(
            AuthService::new(repos.clone(), sessions.clone()),
            UserService::new(repos),
        )),
    ));
    tasks.spawn(jobs::priority_reset::run(
        AdsClient::new(config.ads_rpc_addr.clone()),
        Duration::from_secs(config.priority_sweep_seconds),
        Duration::from_millis(config.request_timeout_ms),
    ));

    let result = tokio::select! {
        result = run_gateway(config, sessions) => result,
        Some(joined) = tasks.join_next() => match joined {
            Ok(Ok(())) => Err(anyhow!("background task exited")),
            Ok(Err(err)) => Err(err),
            Err(err) => Err(err.into()),
        },
    };

    tasks.shutdown().await;
    result
}

async fn run_gateway(config: &AppConfig, sessions: SessionService) -> Result<()> {
    let csrf = CsrfService::new(
        config.csrf_secret.as_bytes(),
        time::Duration::minutes(config.csrf_ttl_minutes as i64),
    );

    let state = AppState {
        ads: AdsClient::new(config.ads_rpc_addr.clone()),
        cities: CityClient::new(config.city_rpc_addr.clone()),
        auth: AuthClient::new(config.auth_rpc_addr.clone()),
        sessions,
        csrf,
        request_timeout: Duration::from_millis(config.request_timeout_ms),
        upload_max_bytes: config.upload_max_bytes,
        cookie_secure: config.cookie_secure,
        cors_allowed_origin: config.cors_allowed_origin.clone(),
    };

    let listener = bind(&config.http_addr).await?;
    tracing::info!("listening on {}", config.http_addr);

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .into_future()
        .await?;
    Ok(())
}

async fn build_repositories(config: &AppConfig) -> Result<Repositories> {
    match config.storage_backend {
        StorageBackend::Postgres => {
            let db = Db::connect(config).await?;
            db.migrate().await.context("failed to apply schema")?;
            Ok(Repositories::postgres(db))
        }
        StorageBackend::Memory => {
            tracing::warn!("using in-memory storage, data is lost on restart");
            Ok(Repositories::memory(MemoryStore::seeded().await))
        }
    }
}

async fn build_sessions(config: &AppConfig) -> Result<SessionService> {
    let store: Arc<dyn SessionStore> = match config.session_backend {
        SessionBackend::Redis => {
            Arc::new(RedisSessionStore::new(RedisCache::connect(&config.redis_url).await?))
        }
        SessionBackend::Memory => Arc::new(MemorySessionStore::new()),
    };
    Ok(SessionService::new(
        store,
        time::Duration::hours(config.session_ttl_hours as i64),
    ))
}

async fn build_ad_service(config: &AppConfig, repos: Repositories) -> Result<AdService> {
    let blobs: Arc<dyn BlobStore> = match config.blob_backend {
        BlobBackend::S3 => Arc::new(ObjectStorage::new(config).await?),
        BlobBackend::Memory => Arc::new(MemoryBlobStore::new()),
    };
    Ok(AdService::new(
        repos,
        blobs,
        time::Duration::hours(config.priority_window_hours as i64),
    ))
}

async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))
}

/// Drives a long-running task until it fails or a shutdown signal arrives.
async fn until_shutdown<F>(task: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    tokio::select! {
        result = task => result,
        _ = shutdown_signal() => Ok(()),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

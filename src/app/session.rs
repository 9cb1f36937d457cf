use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::error::{ServiceError, ServiceResult};
use crate::domain::session::SessionRecord;
use crate::infra::cache::RedisCache;

const SESSION_KEY_PREFIX: &str = "session:";

/// Key-value storage for session records with expiry.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn put(&self, session_id: &str, record: &SessionRecord, ttl: Duration) -> Result<()>;

    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>>;

    /// Removes the record. Returns `true` only for the caller that actually
    /// deleted it.
    async fn remove(&self, session_id: &str) -> Result<bool>;
}

#[derive(Clone)]
pub struct RedisSessionStore {
    cache: RedisCache,
}

impl RedisSessionStore {
    pub fn new(cache: RedisCache) -> Self {
        Self { cache }
    }
}

fn session_key(session_id: &str) -> String {
    format!("{}{}", SESSION_KEY_PREFIX, session_id)
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn put(&self, session_id: &str, record: &SessionRecord, ttl: Duration) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        let mut conn = self.cache.connection().await?;
        redis::cmd("SET")
            .arg(session_key(session_id))
            .arg(payload)
            .arg("EX")
            .arg(ttl.whole_seconds().max(1))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let mut conn = self.cache.connection().await?;
        let payload = redis::cmd("GET")
            .arg(session_key(session_id))
            .query_async::<_, Option<String>>(&mut conn)
            .await?;
        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, session_id: &str) -> Result<bool> {
        let mut conn = self.cache.connection().await?;
        let removed = redis::cmd("DEL")
            .arg(session_key(session_id))
            .query_async::<_, i64>(&mut conn)
            .await?;
        Ok(removed > 0)
    }
}

#[derive(Clone, Default)]
pub struct MemorySessionStore {
    records: Arc<RwLock<HashMap<String, SessionRecord>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, session_id: &str, record: &SessionRecord, _ttl: Duration) -> Result<()> {
        self.records
            .write()
            .await
            .insert(session_id.to_string(), record.clone());
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        Ok(self.records.read().await.get(session_id).cloned())
    }

    async fn remove(&self, session_id: &str) -> Result<bool> {
        Ok(self.records.write().await.remove(session_id).is_some())
    }
}

/// Creates, resolves and destroys cookie sessions.
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
}

impl SessionService {
    pub fn new(store: Arc<dyn SessionStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn create(&self, user_id: Uuid) -> ServiceResult<String> {
        let session_id = generate_session_id();
        let now = OffsetDateTime::now_utc();
        let record = SessionRecord {
            user_id,
            created_at: now,
            expires_at: now + self.ttl,
            attributes: HashMap::new(),
        };

        self.store
            .put(&session_id, &record, self.ttl)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, user_id = %user_id, "failed to store session");
                ServiceError::internal("failed to create session")
            })?;

        Ok(session_id)
    }

    /// Resolves the record behind a cookie value.
    pub async fn lookup(&self, session_id: Option<&str>) -> ServiceResult<SessionRecord> {
        let session_id = match session_id {
            Some(id) if !id.is_empty() => id,
            _ => return Err(ServiceError::NoActiveSession),
        };

        let record = self.store.get(session_id).await.map_err(|err| {
            tracing::error!(error = ?err, "failed to load session");
            ServiceError::internal("failed to load session")
        })?;
        let record = record.ok_or(ServiceError::NoActiveSession)?;

        if record.is_expired(OffsetDateTime::now_utc()) {
            if let Err(err) = self.store.remove(session_id).await {
                tracing::warn!(error = ?err, "failed to drop expired session");
            }
            return Err(ServiceError::SessionExpired);
        }

        Ok(record)
    }

    pub async fn user_id(&self, session_id: Option<&str>) -> ServiceResult<Uuid> {
        Ok(self.lookup(session_id).await?.user_id)
    }

    pub async fn invalidate(&self, session_id: Option<&str>) -> ServiceResult<()> {
        let session_id = match session_id {
            Some(id) if !id.is_empty() => id,
            _ => return Err(ServiceError::NoSuchSession),
        };

        let removed = self.store.remove(session_id).await.map_err(|err| {
            tracing::error!(error = ?err, "failed to delete session");
            ServiceError::internal("failed to delete session")
        })?;

        if removed {
            Ok(())
        } else {
            Err(ServiceError::NoSuchSession)
        }
    }

    pub async fn data(&self, session_id: Option<&str>) -> ServiceResult<HashMap<String, String>> {
        Ok(self.lookup(session_id).await?.attributes)
    }
}

/// 32 bytes from the OS RNG, standard base64.
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

//! Persistence contracts. Use-cases only see these traits; the concrete
//! backend is picked at wiring time.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::ad::{Ad, AdChanges, AdQuery, NewAd};
use crate::domain::city::City;
use crate::domain::user::{User, UserUpdate};
use crate::infra::db::Db;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Inserts a user. Returns `false` when the username is already taken.
    async fn create(&self, user: &User) -> Result<bool>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn list(&self) -> Result<Vec<User>>;

    async fn update(&self, id: Uuid, changes: &UserUpdate) -> Result<Option<User>>;
}

#[async_trait]
pub trait AdRepository: Send + Sync {
    async fn list(&self, query: &AdQuery) -> Result<Vec<Ad>>;

    async fn list_by_author(&self, author_id: Uuid) -> Result<Vec<Ad>>;

    async fn find(&self, id: Uuid) -> Result<Option<Ad>>;

    /// Bumps the view counter, returning the new value.
    async fn increment_views(&self, id: Uuid) -> Result<Option<i32>>;

    /// Writes the ad and its image rows atomically. Returns `false` when an ad
    /// with the same id already exists.
    async fn create(&self, ad: &NewAd, image_paths: &[String]) -> Result<bool>;

    /// Applies `changes`; when `image_paths` is given the image set is replaced
    /// and the old paths are returned. `None` when the ad does not exist.
    async fn update(
        &self,
        id: Uuid,
        changes: &AdChanges,
        image_paths: Option<&[String]>,
    ) -> Result<Option<Vec<String>>>;

    /// Deletes the ad with its images and favorites, returning the image paths.
    async fn delete(&self, id: Uuid) -> Result<Option<Vec<String>>>;

    /// Removes one image row of the ad. An ad always keeps at least one image.
    async fn delete_image(&self, ad_id: Uuid, image_id: i64) -> Result<ImageRemoval>;

    async fn add_favorite(&self, user_id: Uuid, ad_id: Uuid) -> Result<bool>;

    async fn remove_favorite(&self, user_id: Uuid, ad_id: Uuid) -> Result<bool>;

    async fn list_favorites(&self, user_id: Uuid) -> Result<Vec<Ad>>;

    /// Recomputes the denormalized favorites counter from the relation.
    async fn refresh_favorites_count(&self, ad_id: Uuid) -> Result<Option<i32>>;

    async fn add_priority(
        &self,
        ad_id: Uuid,
        amount: i32,
        expires_at: OffsetDateTime,
    ) -> Result<PriorityBoost>;

    async fn reset_expired_priorities(&self, now: OffsetDateTime) -> Result<u64>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRemoval {
    /// The row is gone; carries the blob path to delete.
    Removed(String),
    NotFound,
    /// The image is the ad's only one and was kept.
    LastImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityBoost {
    Applied,
    NotFound,
    /// `priority + amount` does not fit the column; nothing was written.
    Overflow,
}

#[async_trait]
pub trait CityRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<City>>;

    async fn find_by_en_title(&self, en_title: &str) -> Result<Option<City>>;
}

/// Raised by in-process stores when a write hits a uniqueness constraint.
#[derive(Debug, thiserror::Error)]
#[error("unique constraint violated: {0}")]
pub struct UniqueViolation(pub String);

/// True when `err` stems from a uniqueness constraint, either a Postgres
/// `23505` or a [`UniqueViolation`].
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    if err.downcast_ref::<UniqueViolation>().is_some() {
        return true;
    }
    err.downcast_ref::<sqlx::Error>()
        .and_then(|sqlx_err| sqlx_err.as_database_error())
        .and_then(|db_err| db_err.code())
        .is_some_and(|code| code == "23505")
}

#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub ads: Arc<dyn AdRepository>,
    pub cities: Arc<dyn CityRepository>,
}

impl Repositories {
    pub fn postgres(db: Db) -> Self {
        Self {
            users: Arc::new(postgres::PgUserRepository::new(db.clone())),
            ads: Arc::new(postgres::PgAdRepository::new(db.clone())),
            cities: Arc::new(postgres::PgCityRepository::new(db)),
        }
    }

    pub fn memory(store: MemoryStore) -> Self {
        Self {
            users: Arc::new(store.clone()),
            ads: Arc::new(store.clone()),
            cities: Arc::new(store),
        }
    }
}

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use time::format_description::{self, well_known::Rfc3339};
use time::{Date, Duration, OffsetDateTime};
use uuid::Uuid;

use crate::app::images::{check_image, CheckedImage};
use crate::app::validation::{sanitize_text, sanitize_url_param};
use crate::domain::ad::{
    Ad, AdChanges, AdDraft, AdFilter, AdQuery, NewAd, MAX_IMAGES_PER_AD, MAX_ROOMS, MIN_ROOMS,
};
use crate::domain::city::City;
use crate::domain::error::{ServiceError, ServiceResult};
use crate::domain::user::Sex;
use crate::infra::storage::BlobStore;
use crate::repo::{ImageRemoval, PriorityBoost, Repositories};

const NEW_AD_WINDOW_DAYS: i64 = 7;

/// Text fields of a draft after sanitizing, with the city resolved.
struct CheckedDraft {
    city: City,
    address: String,
    description: String,
    rooms_number: i32,
    date_from: OffsetDateTime,
    date_to: OffsetDateTime,
}

#[derive(Clone)]
pub struct AdService {
    repos: Repositories,
    blobs: Arc<dyn BlobStore>,
    priority_window: Duration,
}

impl AdService {
    pub fn new(repos: Repositories, blobs: Arc<dyn BlobStore>, priority_window: Duration) -> Self {
        Self {
            repos,
            blobs,
            priority_window,
        }
    }

    pub async fn list(&self, filter: &AdFilter) -> ServiceResult<Vec<Ad>> {
        let query = parse_filter(filter, OffsetDateTime::now_utc())?;
        self.repos.ads.list(&query).await.map_err(|err| {
            tracing::error!(error = ?err, "failed to list ads");
            ServiceError::internal("failed to list ads")
        })
    }

    /// Fetches one ad. Authorized callers count as a view.
    pub async fn get(&self, ad_id: Uuid, is_authorized: bool) -> ServiceResult<Ad> {
        if is_authorized {
            let views = self.repos.ads.increment_views(ad_id).await.map_err(|err| {
                tracing::error!(error = ?err, ad_id = %ad_id, "failed to count ad view");
                ServiceError::internal("failed to load ad")
            })?;
            if views.is_none() {
                return Err(ServiceError::AdNotFound);
            }
        }

        self.find(ad_id).await
    }

    pub async fn create(
        &self,
        draft: AdDraft,
        images: Vec<Bytes>,
        author_id: Uuid,
    ) -> ServiceResult<Ad> {
        let author = self
            .repos
            .users
            .find_by_id(author_id)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, user_id = %author_id, "failed to load ad author");
                ServiceError::internal("failed to create ad")
            })?
            .ok_or(ServiceError::UserNotFound)?;
        if !author.is_host {
            return Err(ServiceError::NotHost);
        }

        let checked = self.check_draft(&draft).await?;
        if images.is_empty() {
            return Err(ServiceError::NoImages);
        }
        let images = check_images(images)?;

        let ad = NewAd {
            uuid: Uuid::new_v4(),
            author_uuid: author_id,
            city_id: checked.city.id,
            address: checked.address,
            description: checked.description,
            rooms_number: checked.rooms_number,
            date_from: checked.date_from,
            date_to: checked.date_to,
            publication_date: OffsetDateTime::now_utc(),
        };

        let ad_id = ad.uuid;
        let service = self.clone();
        let stored = detached(async move { service.store_new_ad(ad, images).await }).await?;

        tracing::info!(ad_id = %ad_id, author_id = %author_id, images = stored, "ad created");
        self.find(ad_id).await
    }

    /// Rewrites the ad's fields. A non-empty `images` list replaces the stored
    /// image set.
    pub async fn update(
        &self,
        ad_id: Uuid,
        user_id: Uuid,
        draft: AdDraft,
        images: Vec<Bytes>,
    ) -> ServiceResult<()> {
        self.owned_ad(ad_id, user_id).await?;

        let checked = self.check_draft(&draft).await?;
        let images = if images.is_empty() {
            None
        } else {
            Some(check_images(images)?)
        };

        let changes = AdChanges {
            city_id: checked.city.id,
            address: checked.address,
            description: checked.description,
            rooms_number: checked.rooms_number,
            date_from: checked.date_from,
            date_to: checked.date_to,
        };

        let service = self.clone();
        let replaced =
            detached(async move { service.store_ad_changes(ad_id, changes, images).await }).await?;

        tracing::info!(ad_id = %ad_id, replaced_images = replaced, "ad updated");
        Ok(())
    }

    pub async fn delete(&self, ad_id: Uuid, user_id: Uuid) -> ServiceResult<()> {
        self.owned_ad(ad_id, user_id).await?;

        let paths = self
            .repos
            .ads
            .delete(ad_id)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, ad_id = %ad_id, "failed to delete ad");
                ServiceError::internal("failed to delete ad")
            })?
            .ok_or(ServiceError::AdNotFound)?;

        self.discard_blobs(&paths).await;
        tracing::info!(ad_id = %ad_id, "ad deleted");
        Ok(())
    }

    pub async fn list_by_city(&self, city: &str) -> ServiceResult<Vec<Ad>> {
        let city = sanitize_url_param(city)?;
        let query = AdQuery {
            location: Some(city),
            ..AdQuery::default()
        };
        self.repos.ads.list(&query).await.map_err(|err| {
            tracing::error!(error = ?err, "failed to list ads by city");
            ServiceError::internal("failed to list ads")
        })
    }

    pub async fn list_by_user(&self, user_id: Uuid) -> ServiceResult<Vec<Ad>> {
        self.repos
            .ads
            .list_by_author(user_id)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, user_id = %user_id, "failed to list user ads");
                ServiceError::internal("failed to list ads")
            })
    }

    pub async fn delete_image(&self, ad_id: Uuid, image_id: i64, user_id: Uuid) -> ServiceResult<()> {
        let started = Instant::now();
        self.owned_ad(ad_id, user_id).await?;

        let removal = self
            .repos
            .ads
            .delete_image(ad_id, image_id)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, ad_id = %ad_id, image_id, "failed to delete ad image");
                ServiceError::internal("failed to delete image")
            })?;
        let path = match removal {
            ImageRemoval::Removed(path) => path,
            ImageRemoval::NotFound => return Err(ServiceError::ImageNotFound),
            ImageRemoval::LastImage => return Err(ServiceError::LastImage),
        };

        self.discard_blobs(std::slice::from_ref(&path)).await;
        tracing::info!(
            ad_id = %ad_id,
            image_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ad image deleted"
        );
        Ok(())
    }

    /// Adds the ad to the user's favorites and returns the refreshed counter.
    pub async fn add_favorite(&self, ad_id: Uuid, user_id: Uuid) -> ServiceResult<i32> {
        self.find(ad_id).await?;
        self.repos
            .ads
            .add_favorite(user_id, ad_id)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, ad_id = %ad_id, user_id = %user_id, "failed to add favorite");
                ServiceError::internal("failed to add favorite")
            })?;
        self.refresh_favorites_count(ad_id).await
    }

    pub async fn remove_favorite(&self, ad_id: Uuid, user_id: Uuid) -> ServiceResult<i32> {
        self.find(ad_id).await?;
        self.repos
            .ads
            .remove_favorite(user_id, ad_id)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, ad_id = %ad_id, user_id = %user_id, "failed to remove favorite");
                ServiceError::internal("failed to remove favorite")
            })?;
        self.refresh_favorites_count(ad_id).await
    }

    pub async fn favorites(&self, user_id: Uuid) -> ServiceResult<Vec<Ad>> {
        self.repos
            .ads
            .list_favorites(user_id)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, user_id = %user_id, "failed to list favorites");
                ServiceError::internal("failed to list favorites")
            })
    }

    /// Recomputes `favoritesCount` from the favorites relation.
    pub async fn refresh_favorites_count(&self, ad_id: Uuid) -> ServiceResult<i32> {
        self.repos
            .ads
            .refresh_favorites_count(ad_id)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, ad_id = %ad_id, "failed to update favorites count");
                ServiceError::internal("failed to update favorites count")
            })?
            .ok_or(ServiceError::AdNotFound)
    }

    pub async fn add_priority(&self, ad_id: Uuid, user_id: Uuid, amount: i32) -> ServiceResult<Ad> {
        if amount <= 0 {
            return Err(ServiceError::InvalidPriority);
        }
        self.owned_ad(ad_id, user_id).await?;

        let expires_at = OffsetDateTime::now_utc() + self.priority_window;
        let boost = self
            .repos
            .ads
            .add_priority(ad_id, amount, expires_at)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, ad_id = %ad_id, "failed to update priority");
                ServiceError::internal("failed to update priority")
            })?;
        match boost {
            PriorityBoost::Applied => {}
            PriorityBoost::NotFound => return Err(ServiceError::AdNotFound),
            PriorityBoost::Overflow => return Err(ServiceError::InvalidPriority),
        }

        self.find(ad_id).await
    }

    /// Drops every boost whose window has closed. Returns how many ads changed.
    pub async fn reset_expired_priorities(&self) -> ServiceResult<u64> {
        self.repos
            .ads
            .reset_expired_priorities(OffsetDateTime::now_utc())
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, "failed to reset expired priorities");
                ServiceError::internal("failed to reset priorities")
            })
    }

    /// Uploads the images and records the new ad. Every uploaded object is
    /// removed again when the write fails.
    async fn store_new_ad(&self, ad: NewAd, images: Vec<CheckedImage>) -> ServiceResult<usize> {
        let paths = self.upload_images(ad.uuid, &images).await?;

        let created = match self.repos.ads.create(&ad, &paths).await {
            Ok(created) => created,
            Err(err) => {
                tracing::error!(error = ?err, ad_id = %ad.uuid, "failed to persist ad");
                self.discard_blobs(&paths).await;
                return Err(ServiceError::internal("failed to create ad"));
            }
        };
        if !created {
            self.discard_blobs(&paths).await;
            return Err(ServiceError::AdAlreadyExists);
        }

        Ok(paths.len())
    }

    /// Uploads replacement images if any, applies the changes, then removes
    /// whichever object set lost: the new one on failure, the old one after
    /// the commit.
    async fn store_ad_changes(
        &self,
        ad_id: Uuid,
        changes: AdChanges,
        images: Option<Vec<CheckedImage>>,
    ) -> ServiceResult<usize> {
        let new_paths = match &images {
            Some(images) => Some(self.upload_images(ad_id, images).await?),
            None => None,
        };

        let replaced = match self
            .repos
            .ads
            .update(ad_id, &changes, new_paths.as_deref())
            .await
        {
            Ok(replaced) => replaced,
            Err(err) => {
                tracing::error!(error = ?err, ad_id = %ad_id, "failed to update ad");
                if let Some(paths) = &new_paths {
                    self.discard_blobs(paths).await;
                }
                return Err(ServiceError::internal("failed to update ad"));
            }
        };

        let Some(replaced) = replaced else {
            if let Some(paths) = &new_paths {
                self.discard_blobs(paths).await;
            }
            return Err(ServiceError::AdNotFound);
        };

        self.discard_blobs(&replaced).await;
        Ok(replaced.len())
    }

    async fn find(&self, ad_id: Uuid) -> ServiceResult<Ad> {
        self.repos
            .ads
            .find(ad_id)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, ad_id = %ad_id, "failed to load ad");
                ServiceError::internal("failed to load ad")
            })?
            .ok_or(ServiceError::AdNotFound)
    }

    async fn owned_ad(&self, ad_id: Uuid, user_id: Uuid) -> ServiceResult<Ad> {
        let ad = self.find(ad_id).await?;
        if ad.author_uuid != user_id {
            return Err(ServiceError::NotOwner);
        }
        Ok(ad)
    }

    async fn check_draft(&self, draft: &AdDraft) -> ServiceResult<CheckedDraft> {
        let city_name = sanitize_text(&draft.city_name)?;
        let address = sanitize_text(&draft.address)?;
        let description = sanitize_text(&draft.description)?;

        if !(MIN_ROOMS..=MAX_ROOMS).contains(&draft.rooms_number) {
            return Err(ServiceError::RoomsOutOfRange);
        }
        if draft.date_from > draft.date_to {
            return Err(ServiceError::InvalidDateRange);
        }

        let city = self
            .repos
            .cities
            .find_by_en_title(&city_name)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, city = %city_name, "failed to load city");
                ServiceError::internal("failed to load city")
            })?
            .ok_or(ServiceError::CityNotFound)?;

        Ok(CheckedDraft {
            city,
            address,
            description,
            rooms_number: draft.rooms_number,
            date_from: draft.date_from,
            date_to: draft.date_to,
        })
    }

    /// Uploads under `images/{ad}/{revision}_{index}.{ext}`. On failure every
    /// object written so far is removed again.
    async fn upload_images(&self, ad_id: Uuid, images: &[CheckedImage]) -> ServiceResult<Vec<String>> {
        let revision = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
        let mut paths = Vec::with_capacity(images.len());

        for (index, image) in images.iter().enumerate() {
            let key = format!(
                "images/{}/{}_{}.{}",
                ad_id,
                revision,
                index,
                image.extension()
            );
            match self
                .blobs
                .put(&key, image.content_type(), image.data.clone())
                .await
            {
                Ok(path) => paths.push(path),
                Err(err) => {
                    tracing::error!(error = ?err, ad_id = %ad_id, key = %key, "failed to upload image");
                    self.discard_blobs(&paths).await;
                    return Err(ServiceError::internal("failed to upload image"));
                }
            }
        }

        Ok(paths)
    }

    async fn discard_blobs(&self, paths: &[String]) {
        for path in paths {
            if let Err(err) = self.blobs.delete(path).await {
                tracing::warn!(error = ?err, path = %path, "failed to delete image object");
            }
        }
    }
}

/// Runs `work` on its own task so it finishes, cleanup included, even when the
/// caller stops waiting for it.
async fn detached<T, F>(work: F) -> ServiceResult<T>
where
    F: Future<Output = ServiceResult<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(work).await.map_err(|err| {
        tracing::error!(error = ?err, "ad write task failed");
        ServiceError::internal("ad write task failed")
    })?
}

fn check_images(images: Vec<Bytes>) -> ServiceResult<Vec<CheckedImage>> {
    if images.len() > MAX_IMAGES_PER_AD {
        return Err(ServiceError::TooManyImages);
    }
    images.into_iter().map(check_image).collect()
}

fn present(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn parse_date(value: &str) -> Option<OffsetDateTime> {
    if let Ok(at) = OffsetDateTime::parse(value, &Rfc3339) {
        return Some(at);
    }
    let format = format_description::parse("[year]-[month]-[day]").ok()?;
    Date::parse(value, &format)
        .ok()
        .map(|date| date.midnight().assume_utc())
}

/// Turns the raw query string filter into a repository query.
pub fn parse_filter(filter: &AdFilter, now: OffsetDateTime) -> ServiceResult<AdQuery> {
    let mut query = AdQuery::default();

    if let Some(location) = present(&filter.location) {
        let location = sanitize_url_param(location)
            .map_err(|_| ServiceError::BadFilter("query location has invalid characters".into()))?;
        query.location = Some(location);
    }

    if let Some(rating) = present(&filter.rating) {
        let rating: f64 = rating
            .parse()
            .map_err(|_| ServiceError::BadFilter("query rating not number".into()))?;
        if !rating.is_finite() {
            return Err(ServiceError::BadFilter("query rating not number".into()));
        }
        query.min_rating = Some(rating);
    }

    if let Some(new) = present(&filter.new) {
        match new {
            "true" => query.published_after = Some(now - Duration::days(NEW_AD_WINDOW_DAYS)),
            "false" => {}
            _ => return Err(ServiceError::BadFilter("query new not bool".into())),
        }
    }

    if let Some(gender) = present(&filter.gender) {
        query.author_sex = Some(
            Sex::from_db(gender)
                .ok_or_else(|| ServiceError::BadFilter("query gender not male or female".into()))?,
        );
    }

    if let Some(guests) = present(&filter.guests) {
        let guests: i32 = guests
            .parse()
            .ok()
            .filter(|guests| *guests >= 0)
            .ok_or_else(|| ServiceError::BadFilter("query guests not int".into()))?;
        query.min_rooms = Some(guests);
    }

    if let Some(limit) = present(&filter.limit) {
        let limit: i64 = limit
            .parse()
            .ok()
            .filter(|limit| *limit >= 0)
            .ok_or(ServiceError::LimitNotInt)?;
        query.limit = Some(limit);
    }

    if let Some(offset) = present(&filter.offset) {
        let offset: i64 = offset
            .parse()
            .ok()
            .filter(|offset| *offset >= 0)
            .ok_or(ServiceError::OffsetNotInt)?;
        query.offset = Some(offset);
    }

    if let Some(from) = present(&filter.date_from) {
        query.available_from = Some(
            parse_date(from).ok_or_else(|| ServiceError::BadFilter("query dateFrom not date".into()))?,
        );
    }

    if let Some(to) = present(&filter.date_to) {
        query.available_to = Some(
            parse_date(to).ok_or_else(|| ServiceError::BadFilter("query dateTo not date".into()))?,
        );
    }

    if let (Some(from), Some(to)) = (query.available_from, query.available_to) {
        if from > to {
            return Err(ServiceError::InvalidDateRange);
        }
    }

    Ok(query)
}

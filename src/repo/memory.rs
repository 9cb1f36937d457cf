use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::ad::{Ad, AdChanges, AdImage, AdQuery, NewAd};
use crate::domain::city::City;
use crate::domain::user::{User, UserUpdate};
use crate::repo::{
    AdRepository, CityRepository, ImageRemoval, PriorityBoost, UniqueViolation, UserRepository,
};

#[derive(Debug, Clone)]
struct AdRow {
    ad: NewAd,
    views_count: i32,
    favorites_count: i32,
    priority: i32,
    priority_expires_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
struct ImageRow {
    id: i64,
    ad_id: Uuid,
    path: String,
    position: i32,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    cities: Vec<City>,
    ads: HashMap<Uuid, AdRow>,
    images: Vec<ImageRow>,
    favorites: BTreeSet<(Uuid, Uuid)>,
    favorite_order: Vec<(Uuid, Uuid)>,
    next_image_id: i64,
    next_city_id: i32,
}

impl Tables {
    fn city_title(&self, city_id: i32) -> Option<&str> {
        self.cities
            .iter()
            .find(|city| city.id == city_id)
            .map(|city| city.en_title.as_str())
    }

    fn materialize(&self, id: Uuid) -> Option<Ad> {
        let row = self.ads.get(&id)?;
        let mut images: Vec<&ImageRow> = self.images.iter().filter(|img| img.ad_id == id).collect();
        images.sort_by_key(|img| (img.position, img.id));

        Some(Ad {
            uuid: row.ad.uuid,
            author_uuid: row.ad.author_uuid,
            city_id: row.ad.city_id,
            city_name: self.city_title(row.ad.city_id).unwrap_or_default().to_string(),
            address: row.ad.address.clone(),
            description: row.ad.description.clone(),
            rooms_number: row.ad.rooms_number,
            date_from: row.ad.date_from,
            date_to: row.ad.date_to,
            views_count: row.views_count,
            favorites_count: row.favorites_count,
            priority: row.priority,
            priority_expires_at: row.priority_expires_at,
            publication_date: row.ad.publication_date,
            images: images
                .into_iter()
                .map(|img| AdImage {
                    id: img.id,
                    path: img.path.clone(),
                })
                .collect(),
        })
    }

    fn matches(&self, row: &AdRow, query: &AdQuery) -> bool {
        let author = self.users.get(&row.ad.author_uuid);

        if let Some(location) = &query.location {
            if self.city_title(row.ad.city_id) != Some(location.as_str()) {
                return false;
            }
        }
        if let Some(min_rating) = query.min_rating {
            if author.map(|user| user.score).unwrap_or_default() < min_rating {
                return false;
            }
        }
        if let Some(published_after) = query.published_after {
            if row.ad.publication_date < published_after {
                return false;
            }
        }
        if let Some(sex) = query.author_sex {
            if author.and_then(|user| user.sex) != Some(sex) {
                return false;
            }
        }
        if let Some(min_rooms) = query.min_rooms {
            if row.ad.rooms_number < min_rooms {
                return false;
            }
        }
        if let Some(from) = query.available_from {
            if row.ad.date_from > from {
                return false;
            }
        }
        if let Some(to) = query.available_to {
            if row.ad.date_to < to {
                return false;
            }
        }
        true
    }

    /// Ads matching `keep`, in listing order.
    fn ordered(&self, keep: impl Fn(&AdRow) -> bool) -> Vec<Ad> {
        let mut rows: Vec<&AdRow> = self.ads.values().filter(|row| keep(row)).collect();
        rows.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.ad.publication_date.cmp(&a.ad.publication_date))
                .then(a.ad.uuid.cmp(&b.ad.uuid))
        });
        rows.into_iter()
            .filter_map(|row| self.materialize(row.ad.uuid))
            .collect()
    }

    fn insert_images(&mut self, ad_id: Uuid, paths: &[String]) {
        for (position, path) in paths.iter().enumerate() {
            self.next_image_id += 1;
            self.images.push(ImageRow {
                id: self.next_image_id,
                ad_id,
                path: path.clone(),
                position: position as i32,
            });
        }
    }

    fn take_images(&mut self, ad_id: Uuid) -> Vec<String> {
        let mut removed: Vec<ImageRow> = Vec::new();
        self.images.retain(|img| {
            if img.ad_id == ad_id {
                removed.push(img.clone());
                false
            } else {
                true
            }
        });
        removed.sort_by_key(|img| (img.position, img.id));
        removed.into_iter().map(|img| img.path).collect()
    }
}

/// In-process implementation of every repository trait behind one lock.
/// Used by single-process development runs and the test suite.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with the same city catalog the migration seeds.
    pub async fn seeded() -> Self {
        let store = Self::new();
        store.seed_cities().await;
        store
    }

    pub async fn insert_city(
        &self,
        title: &str,
        en_title: &str,
        description: &str,
        image: &str,
    ) -> City {
        let mut tables = self.inner.write().await;
        tables.next_city_id += 1;
        let city = City {
            id: tables.next_city_id,
            title: title.to_string(),
            en_title: en_title.to_string(),
            description: description.to_string(),
            image: image.to_string(),
        };
        tables.cities.push(city.clone());
        city
    }

    pub async fn seed_cities(&self) {
        self.insert_city("Москва", "Moscow", "Столица России", "images/cities/moscow.jpg")
            .await;
        self.insert_city(
            "Санкт-Петербург",
            "Saint-Petersburg",
            "Северная столица",
            "images/cities/spb.jpg",
        )
        .await;
        self.insert_city("Казань", "Kazan", "Столица Татарстана", "images/cities/kazan.jpg")
            .await;
        self.insert_city("Сочи", "Sochi", "Курорт на Черном море", "images/cities/sochi.jpg")
            .await;
    }

    /// Sets the author rating used by the `rating` filter.
    pub async fn set_user_score(&self, id: Uuid, score: f64) -> bool {
        let mut tables = self.inner.write().await;
        match tables.users.get_mut(&id) {
            Some(user) => {
                user.score = score;
                true
            }
            None => false,
        }
    }

    /// Overrides the publication timestamp of an ad.
    pub async fn set_publication_date(&self, id: Uuid, at: OffsetDateTime) -> bool {
        let mut tables = self.inner.write().await;
        match tables.ads.get_mut(&id) {
            Some(row) => {
                row.ad.publication_date = at;
                true
            }
            None => false,
        }
    }

    pub async fn set_priority_expiry(&self, id: Uuid, at: Option<OffsetDateTime>) -> bool {
        let mut tables = self.inner.write().await;
        match tables.ads.get_mut(&id) {
            Some(row) => {
                row.priority_expires_at = at;
                true
            }
            None => false,
        }
    }

    pub async fn image_count(&self) -> usize {
        self.inner.read().await.images.len()
    }

    pub async fn favorite_count(&self) -> usize {
        self.inner.read().await.favorites.len()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create(&self, user: &User) -> Result<bool> {
        let mut tables = self.inner.write().await;
        let taken = tables
            .users
            .values()
            .any(|existing| existing.username == user.username);
        if taken || tables.users.contains_key(&user.uuid) {
            return Ok(false);
        }
        tables.users.insert(user.uuid, user.clone());
        Ok(true)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .inner
            .read()
            .await
            .users
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = self.inner.read().await.users.values().cloned().collect();
        users.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.username.cmp(&b.username))
        });
        Ok(users)
    }

    async fn update(&self, id: Uuid, changes: &UserUpdate) -> Result<Option<User>> {
        let mut tables = self.inner.write().await;
        if let Some(username) = &changes.username {
            let taken = tables
                .users
                .values()
                .any(|user| user.uuid != id && &user.username == username);
            if taken {
                return Err(UniqueViolation(format!("users.username = {}", username)).into());
            }
        }

        let Some(user) = tables.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(username) = &changes.username {
            user.username = username.clone();
        }
        if let Some(email) = &changes.email {
            user.email = email.clone();
        }
        if let Some(name) = &changes.name {
            user.name = Some(name.clone());
        }
        if let Some(avatar) = &changes.avatar {
            user.avatar = Some(avatar.clone());
        }
        if let Some(sex) = changes.sex {
            user.sex = Some(sex);
        }
        if let Some(birthdate) = changes.birthdate {
            user.birthdate = Some(birthdate);
        }
        if let Some(is_host) = changes.is_host {
            user.is_host = is_host;
        }
        Ok(Some(user.clone()))
    }
}

#[async_trait]
impl AdRepository for MemoryStore {
    async fn list(&self, query: &AdQuery) -> Result<Vec<Ad>> {
        let tables = self.inner.read().await;
        let ads = tables.ordered(|row| tables.matches(row, query));

        let offset = query.offset.unwrap_or(0).max(0) as usize;
        let ads = ads.into_iter().skip(offset);
        Ok(match query.limit {
            Some(limit) => ads.take(limit.max(0) as usize).collect(),
            None => ads.collect(),
        })
    }

    async fn list_by_author(&self, author_id: Uuid) -> Result<Vec<Ad>> {
        let tables = self.inner.read().await;
        Ok(tables.ordered(|row| row.ad.author_uuid == author_id))
    }

    async fn find(&self, id: Uuid) -> Result<Option<Ad>> {
        Ok(self.inner.read().await.materialize(id))
    }

    async fn increment_views(&self, id: Uuid) -> Result<Option<i32>> {
        let mut tables = self.inner.write().await;
        Ok(tables.ads.get_mut(&id).map(|row| {
            row.views_count += 1;
            row.views_count
        }))
    }

    async fn create(&self, ad: &NewAd, image_paths: &[String]) -> Result<bool> {
        let mut tables = self.inner.write().await;
        if tables.ads.contains_key(&ad.uuid) {
            return Ok(false);
        }
        if !tables.users.contains_key(&ad.author_uuid) {
            return Err(anyhow::anyhow!("author {} does not exist", ad.author_uuid));
        }
        if tables.city_title(ad.city_id).is_none() {
            return Err(anyhow::anyhow!("city {} does not exist", ad.city_id));
        }

        tables.ads.insert(
            ad.uuid,
            AdRow {
                ad: ad.clone(),
                views_count: 0,
                favorites_count: 0,
                priority: 0,
                priority_expires_at: None,
            },
        );
        tables.insert_images(ad.uuid, image_paths);
        Ok(true)
    }

    async fn update(
        &self,
        id: Uuid,
        changes: &AdChanges,
        image_paths: Option<&[String]>,
    ) -> Result<Option<Vec<String>>> {
        let mut tables = self.inner.write().await;
        if tables.city_title(changes.city_id).is_none() {
            return Err(anyhow::anyhow!("city {} does not exist", changes.city_id));
        }
        let Some(row) = tables.ads.get_mut(&id) else {
            return Ok(None);
        };
        row.ad.city_id = changes.city_id;
        row.ad.address = changes.address.clone();
        row.ad.description = changes.description.clone();
        row.ad.rooms_number = changes.rooms_number;
        row.ad.date_from = changes.date_from;
        row.ad.date_to = changes.date_to;

        let replaced = match image_paths {
            Some(paths) => {
                let old = tables.take_images(id);
                tables.insert_images(id, paths);
                old
            }
            None => Vec::new(),
        };
        Ok(Some(replaced))
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Vec<String>>> {
        let mut tables = self.inner.write().await;
        if tables.ads.remove(&id).is_none() {
            return Ok(None);
        }
        tables.favorites.retain(|(_, ad_id)| *ad_id != id);
        tables.favorite_order.retain(|(_, ad_id)| *ad_id != id);
        Ok(Some(tables.take_images(id)))
    }

    async fn delete_image(&self, ad_id: Uuid, image_id: i64) -> Result<ImageRemoval> {
        let mut tables = self.inner.write().await;
        let Some(position) = tables
            .images
            .iter()
            .position(|img| img.id == image_id && img.ad_id == ad_id)
        else {
            return Ok(ImageRemoval::NotFound);
        };
        if tables.images.iter().filter(|img| img.ad_id == ad_id).count() <= 1 {
            return Ok(ImageRemoval::LastImage);
        }
        Ok(ImageRemoval::Removed(tables.images.remove(position).path))
    }

    async fn add_favorite(&self, user_id: Uuid, ad_id: Uuid) -> Result<bool> {
        let mut tables = self.inner.write().await;
        if !tables.ads.contains_key(&ad_id) {
            return Err(anyhow::anyhow!("ad {} does not exist", ad_id));
        }
        if !tables.favorites.insert((user_id, ad_id)) {
            return Ok(false);
        }
        tables.favorite_order.push((user_id, ad_id));
        Ok(true)
    }

    async fn remove_favorite(&self, user_id: Uuid, ad_id: Uuid) -> Result<bool> {
        let mut tables = self.inner.write().await;
        if !tables.favorites.remove(&(user_id, ad_id)) {
            return Ok(false);
        }
        tables
            .favorite_order
            .retain(|entry| *entry != (user_id, ad_id));
        Ok(true)
    }

    async fn list_favorites(&self, user_id: Uuid) -> Result<Vec<Ad>> {
        let tables = self.inner.read().await;
        Ok(tables
            .favorite_order
            .iter()
            .rev()
            .filter(|(user, _)| *user == user_id)
            .filter_map(|(_, ad_id)| tables.materialize(*ad_id))
            .collect())
    }

    async fn refresh_favorites_count(&self, ad_id: Uuid) -> Result<Option<i32>> {
        let mut tables = self.inner.write().await;
        let count = tables
            .favorites
            .iter()
            .filter(|(_, favorite)| *favorite == ad_id)
            .count() as i32;
        Ok(tables.ads.get_mut(&ad_id).map(|row| {
            row.favorites_count = count;
            count
        }))
    }

    async fn add_priority(
        &self,
        ad_id: Uuid,
        amount: i32,
        expires_at: OffsetDateTime,
    ) -> Result<PriorityBoost> {
        let mut tables = self.inner.write().await;
        let Some(row) = tables.ads.get_mut(&ad_id) else {
            return Ok(PriorityBoost::NotFound);
        };
        let Some(priority) = row.priority.checked_add(amount) else {
            return Ok(PriorityBoost::Overflow);
        };
        row.priority = priority;
        row.priority_expires_at = Some(expires_at);
        Ok(PriorityBoost::Applied)
    }

    async fn reset_expired_priorities(&self, now: OffsetDateTime) -> Result<u64> {
        let mut tables = self.inner.write().await;
        let mut affected = 0;
        for row in tables.ads.values_mut() {
            if row.priority_expires_at.is_some_and(|at| at < now) {
                row.priority = 0;
                row.priority_expires_at = None;
                affected += 1;
            }
        }
        Ok(affected)
    }
}

#[async_trait]
impl CityRepository for MemoryStore {
    async fn list(&self) -> Result<Vec<City>> {
        let mut cities = self.inner.read().await.cities.clone();
        cities.sort_by_key(|city| city.id);
        Ok(cities)
    }

    async fn find_by_en_title(&self, en_title: &str) -> Result<Option<City>> {
        Ok(self
            .inner
            .read()
            .await
            .cities
            .iter()
            .find(|city| city.en_title == en_title)
            .cloned())
    }
}

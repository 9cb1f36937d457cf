use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, QueryBuilder, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::ad::{Ad, AdChanges, AdImage, AdQuery, NewAd};
use crate::domain::city::City;
use crate::domain::user::{Sex, User, UserUpdate};
use crate::infra::db::Db;
use crate::repo::{AdRepository, CityRepository, ImageRemoval, PriorityBoost, UserRepository};

const USER_COLUMNS: &str = "id, username, email, password_hash, name, avatar, sex, birthdate, \
                            is_host, score, created_at";

const AD_SELECT: &str = "SELECT a.id, a.author_id, a.city_id, c.en_title AS city_name, a.address, \
                                a.description, a.rooms_number, a.date_from, a.date_to, \
                                a.views_count, a.favorites_count, a.priority, \
                                a.priority_expires_at, a.created_at \
                         FROM ads a \
                         JOIN cities c ON c.id = a.city_id \
                         JOIN users u ON u.id = a.author_id";

#[derive(Clone)]
pub struct PgUserRepository {
    db: Db,
}

impl PgUserRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn user_from_row(row: &PgRow) -> User {
    let sex: Option<String> = row.get("sex");
    User {
        uuid: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        name: row.get("name"),
        avatar: row.get("avatar"),
        sex: sex.as_deref().and_then(Sex::from_db),
        birthdate: row.get("birthdate"),
        is_host: row.get("is_host"),
        score: row.get("score"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: &User) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, name, avatar, sex, birthdate, \
                                is_host, score, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (username) DO NOTHING",
        )
        .bind(user.uuid)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(&user.avatar)
        .bind(user.sex.map(|sex| sex.as_db()))
        .bind(user.birthdate)
        .bind(user.is_host)
        .bind(user.score)
        .bind(user.created_at)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM users WHERE username = $1",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn list(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM users ORDER BY created_at, username",
            USER_COLUMNS
        ))
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(user_from_row).collect())
    }

    async fn update(&self, id: Uuid, changes: &UserUpdate) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            "UPDATE users \
             SET username = COALESCE($2, username), \
                 email = COALESCE($3, email), \
                 name = COALESCE($4, name), \
                 avatar = COALESCE($5, avatar), \
                 sex = COALESCE($6, sex), \
                 birthdate = COALESCE($7, birthdate), \
                 is_host = COALESCE($8, is_host) \
             WHERE id = $1 \
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .bind(&changes.username)
        .bind(&changes.email)
        .bind(&changes.name)
        .bind(&changes.avatar)
        .bind(changes.sex.map(|sex| sex.as_db()))
        .bind(changes.birthdate)
        .bind(changes.is_host)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }
}

#[derive(Clone)]
pub struct PgAdRepository {
    db: Db,
}

impl PgAdRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Loads image rows for `rows` and assembles the ads in row order.
    async fn assemble(&self, rows: Vec<PgRow>) -> Result<Vec<Ad>> {
        let ids: Vec<Uuid> = rows.iter().map(|row| row.get("id")).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let image_rows = sqlx::query(
            "SELECT id, ad_id, path FROM ad_images \
             WHERE ad_id = ANY($1) \
             ORDER BY ad_id, position, id",
        )
        .bind(&ids)
        .fetch_all(self.db.pool())
        .await?;

        let mut images: HashMap<Uuid, Vec<AdImage>> = HashMap::new();
        for row in image_rows {
            images.entry(row.get("ad_id")).or_default().push(AdImage {
                id: row.get("id"),
                path: row.get("path"),
            });
        }

        let ads = rows
            .iter()
            .map(|row| {
                let id: Uuid = row.get("id");
                Ad {
                    uuid: id,
                    author_uuid: row.get("author_id"),
                    city_id: row.get("city_id"),
                    city_name: row.get("city_name"),
                    address: row.get("address"),
                    description: row.get("description"),
                    rooms_number: row.get("rooms_number"),
                    date_from: row.get("date_from"),
                    date_to: row.get("date_to"),
                    views_count: row.get("views_count"),
                    favorites_count: row.get("favorites_count"),
                    priority: row.get("priority"),
                    priority_expires_at: row.get("priority_expires_at"),
                    publication_date: row.get("created_at"),
                    images: images.remove(&id).unwrap_or_default(),
                }
            })
            .collect();

        Ok(ads)
    }
}

#[async_trait]
impl AdRepository for PgAdRepository {
    async fn list(&self, query: &AdQuery) -> Result<Vec<Ad>> {
        let mut builder = QueryBuilder::<Postgres>::new(AD_SELECT);
        builder.push(" WHERE TRUE");

        if let Some(location) = &query.location {
            builder.push(" AND c.en_title = ").push_bind(location.clone());
        }
        if let Some(min_rating) = query.min_rating {
            builder.push(" AND u.score >= ").push_bind(min_rating);
        }
        if let Some(published_after) = query.published_after {
            builder.push(" AND a.created_at >= ").push_bind(published_after);
        }
        if let Some(sex) = query.author_sex {
            builder.push(" AND u.sex = ").push_bind(sex.as_db());
        }
        if let Some(min_rooms) = query.min_rooms {
            builder.push(" AND a.rooms_number >= ").push_bind(min_rooms);
        }
        if let Some(from) = query.available_from {
            builder.push(" AND a.date_from <= ").push_bind(from);
        }
        if let Some(to) = query.available_to {
            builder.push(" AND a.date_to >= ").push_bind(to);
        }

        builder.push(" ORDER BY a.priority DESC, a.created_at DESC, a.id");
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(limit);
        }
        if let Some(offset) = query.offset {
            builder.push(" OFFSET ").push_bind(offset);
        }

        let rows = builder.build().fetch_all(self.db.pool()).await?;
        self.assemble(rows).await
    }

    async fn list_by_author(&self, author_id: Uuid) -> Result<Vec<Ad>> {
        let rows = sqlx::query(&format!(
            "{} WHERE a.author_id = $1 ORDER BY a.priority DESC, a.created_at DESC, a.id",
            AD_SELECT
        ))
        .bind(author_id)
        .fetch_all(self.db.pool())
        .await?;

        self.assemble(rows).await
    }

    async fn find(&self, id: Uuid) -> Result<Option<Ad>> {
        let row = sqlx::query(&format!("{} WHERE a.id = $1", AD_SELECT))
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(self.assemble(vec![row]).await?.pop())
    }

    async fn increment_views(&self, id: Uuid) -> Result<Option<i32>> {
        let views = sqlx::query_scalar(
            "UPDATE ads SET views_count = views_count + 1 WHERE id = $1 RETURNING views_count",
        )
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(views)
    }

    async fn create(&self, ad: &NewAd, image_paths: &[String]) -> Result<bool> {
        let mut tx = self.db.pool().begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO ads (id, author_id, city_id, address, description, rooms_number, \
                              date_from, date_to, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(ad.uuid)
        .bind(ad.author_uuid)
        .bind(ad.city_id)
        .bind(&ad.address)
        .bind(&ad.description)
        .bind(ad.rooms_number)
        .bind(ad.date_from)
        .bind(ad.date_to)
        .bind(ad.publication_date)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        insert_images(&mut tx, ad.uuid, image_paths).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn update(
        &self,
        id: Uuid,
        changes: &AdChanges,
        image_paths: Option<&[String]>,
    ) -> Result<Option<Vec<String>>> {
        let mut tx = self.db.pool().begin().await?;

        let updated = sqlx::query(
            "UPDATE ads \
             SET city_id = $2, address = $3, description = $4, rooms_number = $5, \
                 date_from = $6, date_to = $7 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(changes.city_id)
        .bind(&changes.address)
        .bind(&changes.description)
        .bind(changes.rooms_number)
        .bind(changes.date_from)
        .bind(changes.date_to)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let replaced = match image_paths {
            Some(paths) => {
                let old: Vec<String> =
                    sqlx::query_scalar("DELETE FROM ad_images WHERE ad_id = $1 RETURNING path")
                        .bind(id)
                        .fetch_all(&mut *tx)
                        .await?;
                insert_images(&mut tx, id, paths).await?;
                old
            }
            None => Vec::new(),
        };

        tx.commit().await?;
        Ok(Some(replaced))
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Vec<String>>> {
        let mut tx = self.db.pool().begin().await?;

        let paths: Vec<String> = sqlx::query_scalar(
            "SELECT path FROM ad_images WHERE ad_id = $1 ORDER BY position, id",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        let deleted = sqlx::query("DELETE FROM ads WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        tx.commit().await?;
        Ok(Some(paths))
    }

    async fn delete_image(&self, ad_id: Uuid, image_id: i64) -> Result<ImageRemoval> {
        let mut tx = self.db.pool().begin().await?;

        // Row lock on the ad serializes concurrent image deletes.
        let locked: Option<Uuid> = sqlx::query_scalar("SELECT id FROM ads WHERE id = $1 FOR UPDATE")
            .bind(ad_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            tx.rollback().await?;
            return Ok(ImageRemoval::NotFound);
        }

        let path: Option<String> = sqlx::query_scalar(
            "DELETE FROM ad_images WHERE id = $1 AND ad_id = $2 RETURNING path",
        )
        .bind(image_id)
        .bind(ad_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(path) = path else {
            tx.rollback().await?;
            return Ok(ImageRemoval::NotFound);
        };

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ad_images WHERE ad_id = $1")
            .bind(ad_id)
            .fetch_one(&mut *tx)
            .await?;
        if remaining == 0 {
            tx.rollback().await?;
            return Ok(ImageRemoval::LastImage);
        }

        tx.commit().await?;
        Ok(ImageRemoval::Removed(path))
    }

    async fn add_favorite(&self, user_id: Uuid, ad_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO favorites (user_id, ad_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(ad_id)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_favorite(&self, user_id: Uuid, ad_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND ad_id = $2")
            .bind(user_id)
            .bind(ad_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_favorites(&self, user_id: Uuid) -> Result<Vec<Ad>> {
        let rows = sqlx::query(&format!(
            "{} JOIN favorites f ON f.ad_id = a.id \
             WHERE f.user_id = $1 \
             ORDER BY f.created_at DESC, a.id",
            AD_SELECT
        ))
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await?;

        self.assemble(rows).await
    }

    async fn refresh_favorites_count(&self, ad_id: Uuid) -> Result<Option<i32>> {
        let count = sqlx::query_scalar(
            "UPDATE ads \
             SET favorites_count = (SELECT COUNT(*) FROM favorites WHERE ad_id = $1) \
             WHERE id = $1 \
             RETURNING favorites_count",
        )
        .bind(ad_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(count)
    }

    async fn add_priority(
        &self,
        ad_id: Uuid,
        amount: i32,
        expires_at: OffsetDateTime,
    ) -> Result<PriorityBoost> {
        // Widened to bigint so the guard itself cannot overflow.
        let result = sqlx::query(
            "UPDATE ads SET priority = priority + $2, priority_expires_at = $3 \
             WHERE id = $1 AND priority::bigint + $2::bigint <= 2147483647",
        )
        .bind(ad_id)
        .bind(amount)
        .bind(expires_at)
        .execute(self.db.pool())
        .await?;
        if result.rows_affected() > 0 {
            return Ok(PriorityBoost::Applied);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM ads WHERE id = $1)")
            .bind(ad_id)
            .fetch_one(self.db.pool())
            .await?;
        Ok(if exists {
            PriorityBoost::Overflow
        } else {
            PriorityBoost::NotFound
        })
    }

    async fn reset_expired_priorities(&self, now: OffsetDateTime) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE ads SET priority = 0, priority_expires_at = NULL \
             WHERE priority_expires_at < $1",
        )
        .bind(now)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected())
    }
}

async fn insert_images(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    ad_id: Uuid,
    paths: &[String],
) -> Result<()> {
    for (position, path) in paths.iter().enumerate() {
        sqlx::query("INSERT INTO ad_images (ad_id, path, position) VALUES ($1, $2, $3)")
            .bind(ad_id)
            .bind(path)
            .bind(position as i32)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

#[derive(Clone)]
pub struct PgCityRepository {
    db: Db,
}

impl PgCityRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn city_from_row(row: &PgRow) -> City {
    City {
        id: row.get("id"),
        title: row.get("title"),
        en_title: row.get("en_title"),
        description: row.get("description"),
        image: row.get("image"),
    }
}

#[async_trait]
impl CityRepository for PgCityRepository {
    async fn list(&self) -> Result<Vec<City>> {
        let rows = sqlx::query("SELECT id, title, en_title, description, image FROM cities ORDER BY id")
            .fetch_all(self.db.pool())
            .await?;

        Ok(rows.iter().map(city_from_row).collect())
    }

    async fn find_by_en_title(&self, en_title: &str) -> Result<Option<City>> {
        let row = sqlx::query(
            "SELECT id, title, en_title, description, image FROM cities WHERE en_title = $1",
        )
        .bind(en_title)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(city_from_row))
    }
}

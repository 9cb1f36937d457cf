use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub const MIN_ROOMS: i32 = 0;
pub const MAX_ROOMS: i32 = 1000;
pub const MAX_IMAGES_PER_AD: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdImage {
    pub id: i64,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ad {
    pub uuid: Uuid,
    #[serde(rename = "authorUUID")]
    pub author_uuid: Uuid,
    pub city_id: i32,
    pub city_name: String,
    pub address: String,
    pub description: String,
    pub rooms_number: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub date_from: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub date_to: OffsetDateTime,
    pub views_count: i32,
    pub favorites_count: i32,
    pub priority: i32,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub priority_expires_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub publication_date: OffsetDateTime,
    pub images: Vec<AdImage>,
}

/// Text fields of a listing as submitted in the `metadata` form field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdDraft {
    /// English title of the city the place is in.
    pub city_name: String,
    pub address: String,
    pub description: String,
    pub rooms_number: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub date_from: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub date_to: OffsetDateTime,
}

/// A validated listing ready to be written.
#[derive(Debug, Clone)]
pub struct NewAd {
    pub uuid: Uuid,
    pub author_uuid: Uuid,
    pub city_id: i32,
    pub address: String,
    pub description: String,
    pub rooms_number: i32,
    pub date_from: OffsetDateTime,
    pub date_to: OffsetDateTime,
    pub publication_date: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct AdChanges {
    pub city_id: i32,
    pub address: String,
    pub description: String,
    pub rooms_number: i32,
    pub date_from: OffsetDateTime,
    pub date_to: OffsetDateTime,
}

/// Raw listing filter as it arrives from the query string. Numeric fields stay
/// textual so parsing failures surface from the use-case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdFilter {
    pub location: Option<String>,
    pub rating: Option<String>,
    pub new: Option<String>,
    pub gender: Option<String>,
    pub guests: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

/// Parsed form of [`AdFilter`] handed to repositories.
#[derive(Debug, Clone, Default)]
pub struct AdQuery {
    pub location: Option<String>,
    pub min_rating: Option<f64>,
    pub published_after: Option<OffsetDateTime>,
    pub author_sex: Option<super::user::Sex>,
    pub min_rooms: Option<i32>,
    pub available_from: Option<OffsetDateTime>,
    pub available_to: Option<OffsetDateTime>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

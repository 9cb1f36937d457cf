//! Wire messages exchanged between the gateway and the backend services.
//!
//! Timestamps travel as unix milliseconds, ids as their canonical string form.

use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::ad::{Ad, AdDraft, AdFilter, AdImage};
use crate::domain::city::City;
use crate::domain::error::{ServiceError, ServiceResult};
use crate::domain::user::{NewUser, PublicUser, SessionData, Sex, User, UserUpdate};

#[derive(Clone, PartialEq, prost::Message)]
pub struct RpcRequest {
    #[prost(string, tag = "1")]
    pub method: String,
    #[prost(string, tag = "2")]
    pub request_id: String,
    #[prost(uint64, tag = "3")]
    pub timeout_ms: u64,
    #[prost(bytes = "vec", tag = "4")]
    pub payload: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RpcReply {
    #[prost(bytes = "vec", tag = "1")]
    pub payload: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub error: Option<RpcError>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RpcError {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(string, repeated, tag = "3")]
    pub fields: Vec<String>,
}

impl From<&ServiceError> for RpcError {
    fn from(err: &ServiceError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            fields: err.fields().to_vec(),
        }
    }
}

impl From<RpcError> for ServiceError {
    fn from(err: RpcError) -> Self {
        ServiceError::from_wire(err.code, err.message, err.fields)
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Empty {}

// ---- ads ----

#[derive(Clone, PartialEq, prost::Message)]
pub struct ImageMsg {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(string, tag = "2")]
    pub path: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AdMsg {
    #[prost(string, tag = "1")]
    pub uuid: String,
    #[prost(string, tag = "2")]
    pub author_uuid: String,
    #[prost(int32, tag = "3")]
    pub city_id: i32,
    #[prost(string, tag = "4")]
    pub city_name: String,
    #[prost(string, tag = "5")]
    pub address: String,
    #[prost(string, tag = "6")]
    pub description: String,
    #[prost(int32, tag = "7")]
    pub rooms_number: i32,
    #[prost(int64, tag = "8")]
    pub date_from: i64,
    #[prost(int64, tag = "9")]
    pub date_to: i64,
    #[prost(int32, tag = "10")]
    pub views_count: i32,
    #[prost(int32, tag = "11")]
    pub favorites_count: i32,
    #[prost(int32, tag = "12")]
    pub priority: i32,
    #[prost(int64, optional, tag = "13")]
    pub priority_expires_at: Option<i64>,
    #[prost(int64, tag = "14")]
    pub publication_date: i64,
    #[prost(message, repeated, tag = "15")]
    pub images: Vec<ImageMsg>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AdDraftMsg {
    #[prost(string, tag = "1")]
    pub city_name: String,
    #[prost(string, tag = "2")]
    pub address: String,
    #[prost(string, tag = "3")]
    pub description: String,
    #[prost(int32, tag = "4")]
    pub rooms_number: i32,
    #[prost(int64, tag = "5")]
    pub date_from: i64,
    #[prost(int64, tag = "6")]
    pub date_to: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListAdsRequest {
    #[prost(string, optional, tag = "1")]
    pub location: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub rating: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub new: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub gender: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub guests: Option<String>,
    #[prost(string, optional, tag = "6")]
    pub limit: Option<String>,
    #[prost(string, optional, tag = "7")]
    pub offset: Option<String>,
    #[prost(string, optional, tag = "8")]
    pub date_from: Option<String>,
    #[prost(string, optional, tag = "9")]
    pub date_to: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AdListReply {
    #[prost(message, repeated, tag = "1")]
    pub ads: Vec<AdMsg>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AdReply {
    #[prost(message, optional, tag = "1")]
    pub ad: Option<AdMsg>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetAdRequest {
    #[prost(string, tag = "1")]
    pub ad_id: String,
    #[prost(bool, tag = "2")]
    pub is_authorized: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CreateAdRequest {
    #[prost(message, optional, tag = "1")]
    pub draft: Option<AdDraftMsg>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub images: Vec<Vec<u8>>,
    #[prost(string, tag = "3")]
    pub author_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpdateAdRequest {
    #[prost(string, tag = "1")]
    pub ad_id: String,
    #[prost(string, tag = "2")]
    pub user_id: String,
    #[prost(message, optional, tag = "3")]
    pub draft: Option<AdDraftMsg>,
    #[prost(bytes = "vec", repeated, tag = "4")]
    pub images: Vec<Vec<u8>>,
}

/// An ad addressed on behalf of a user: delete and favorite toggles.
#[derive(Clone, PartialEq, prost::Message)]
pub struct AdUserRequest {
    #[prost(string, tag = "1")]
    pub ad_id: String,
    #[prost(string, tag = "2")]
    pub user_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CityAdsRequest {
    #[prost(string, tag = "1")]
    pub city: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UserRequest {
    #[prost(string, tag = "1")]
    pub user_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DeleteImageRequest {
    #[prost(string, tag = "1")]
    pub ad_id: String,
    #[prost(int64, tag = "2")]
    pub image_id: i64,
    #[prost(string, tag = "3")]
    pub user_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PriorityRequest {
    #[prost(string, tag = "1")]
    pub ad_id: String,
    #[prost(string, tag = "2")]
    pub user_id: String,
    #[prost(int32, tag = "3")]
    pub amount: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FavoritesCountReply {
    #[prost(int32, tag = "1")]
    pub count: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ResetPrioritiesReply {
    #[prost(uint64, tag = "1")]
    pub affected: u64,
}

// ---- cities ----

#[derive(Clone, PartialEq, prost::Message)]
pub struct CityMsg {
    #[prost(int32, tag = "1")]
    pub id: i32,
    #[prost(string, tag = "2")]
    pub title: String,
    #[prost(string, tag = "3")]
    pub en_title: String,
    #[prost(string, tag = "4")]
    pub description: String,
    #[prost(string, tag = "5")]
    pub image: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CityListReply {
    #[prost(message, repeated, tag = "1")]
    pub cities: Vec<CityMsg>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CityRequest {
    #[prost(string, tag = "1")]
    pub en_name: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CityReply {
    #[prost(message, optional, tag = "1")]
    pub city: Option<CityMsg>,
}

// ---- auth and users ----

#[derive(Clone, PartialEq, prost::Message)]
pub struct UserMsg {
    #[prost(string, tag = "1")]
    pub uuid: String,
    #[prost(string, tag = "2")]
    pub username: String,
    #[prost(string, tag = "3")]
    pub email: String,
    #[prost(string, optional, tag = "4")]
    pub name: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub avatar: Option<String>,
    #[prost(string, optional, tag = "6")]
    pub sex: Option<String>,
    #[prost(int64, optional, tag = "7")]
    pub birthdate: Option<i64>,
    #[prost(bool, tag = "8")]
    pub is_host: bool,
    #[prost(double, tag = "9")]
    pub score: f64,
    #[prost(int64, tag = "10")]
    pub created_at: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PublicUserMsg {
    #[prost(string, tag = "1")]
    pub uuid: String,
    #[prost(string, tag = "2")]
    pub username: String,
    #[prost(string, optional, tag = "3")]
    pub name: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub avatar: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub sex: Option<String>,
    #[prost(int64, optional, tag = "6")]
    pub birthdate: Option<i64>,
    #[prost(bool, tag = "7")]
    pub is_host: bool,
    #[prost(double, tag = "8")]
    pub score: f64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UserListReply {
    #[prost(message, repeated, tag = "1")]
    pub users: Vec<PublicUserMsg>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UserReply {
    #[prost(message, optional, tag = "1")]
    pub user: Option<UserMsg>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RegisterRequest {
    #[prost(string, tag = "1")]
    pub username: String,
    #[prost(string, tag = "2")]
    pub email: String,
    #[prost(string, tag = "3")]
    pub password: String,
    #[prost(string, optional, tag = "4")]
    pub name: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub sex: Option<String>,
    #[prost(int64, optional, tag = "6")]
    pub birthdate: Option<i64>,
    #[prost(bool, tag = "7")]
    pub is_host: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct LoginRequest {
    #[prost(string, tag = "1")]
    pub username: String,
    #[prost(string, tag = "2")]
    pub password: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SessionReply {
    #[prost(string, tag = "1")]
    pub session_id: String,
    #[prost(message, optional, tag = "2")]
    pub user: Option<UserMsg>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct LogoutRequest {
    #[prost(string, optional, tag = "1")]
    pub session_id: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpdateUserRequest {
    #[prost(string, tag = "1")]
    pub user_id: String,
    #[prost(string, optional, tag = "2")]
    pub username: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub email: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub name: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub avatar: Option<String>,
    #[prost(string, optional, tag = "6")]
    pub sex: Option<String>,
    #[prost(int64, optional, tag = "7")]
    pub birthdate: Option<i64>,
    #[prost(bool, optional, tag = "8")]
    pub is_host: Option<bool>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SessionDataReply {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, optional, tag = "2")]
    pub avatar: Option<String>,
}

// ---- conversions ----

pub fn to_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn from_millis(millis: i64) -> ServiceResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000)
        .map_err(|_| ServiceError::internal("timestamp out of range"))
}

fn uuid_field(value: &str) -> ServiceResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| ServiceError::internal("malformed id on the wire"))
}

fn sex_field(value: Option<String>) -> ServiceResult<Option<Sex>> {
    match value {
        Some(value) => Sex::from_db(&value)
            .map(Some)
            .ok_or_else(|| ServiceError::internal("malformed sex on the wire")),
        None => Ok(None),
    }
}

fn optional_millis(value: Option<i64>) -> ServiceResult<Option<OffsetDateTime>> {
    value.map(from_millis).transpose()
}

impl From<Ad> for AdMsg {
    fn from(ad: Ad) -> Self {
        Self {
            uuid: ad.uuid.to_string(),
            author_uuid: ad.author_uuid.to_string(),
            city_id: ad.city_id,
            city_name: ad.city_name,
            address: ad.address,
            description: ad.description,
            rooms_number: ad.rooms_number,
            date_from: to_millis(ad.date_from),
            date_to: to_millis(ad.date_to),
            views_count: ad.views_count,
            favorites_count: ad.favorites_count,
            priority: ad.priority,
            priority_expires_at: ad.priority_expires_at.map(to_millis),
            publication_date: to_millis(ad.publication_date),
            images: ad
                .images
                .into_iter()
                .map(|image| ImageMsg {
                    id: image.id,
                    path: image.path,
                })
                .collect(),
        }
    }
}

impl TryFrom<AdMsg> for Ad {
    type Error = ServiceError;

    fn try_from(msg: AdMsg) -> ServiceResult<Self> {
        Ok(Self {
            uuid: uuid_field(&msg.uuid)?,
            author_uuid: uuid_field(&msg.author_uuid)?,
            city_id: msg.city_id,
            city_name: msg.city_name,
            address: msg.address,
            description: msg.description,
            rooms_number: msg.rooms_number,
            date_from: from_millis(msg.date_from)?,
            date_to: from_millis(msg.date_to)?,
            views_count: msg.views_count,
            favorites_count: msg.favorites_count,
            priority: msg.priority,
            priority_expires_at: optional_millis(msg.priority_expires_at)?,
            publication_date: from_millis(msg.publication_date)?,
            images: msg
                .images
                .into_iter()
                .map(|image| AdImage {
                    id: image.id,
                    path: image.path,
                })
                .collect(),
        })
    }
}

pub fn ads_from_wire(ads: Vec<AdMsg>) -> ServiceResult<Vec<Ad>> {
    ads.into_iter().map(Ad::try_from).collect()
}

impl From<AdDraft> for AdDraftMsg {
    fn from(draft: AdDraft) -> Self {
        Self {
            city_name: draft.city_name,
            address: draft.address,
            description: draft.description,
            rooms_number: draft.rooms_number,
            date_from: to_millis(draft.date_from),
            date_to: to_millis(draft.date_to),
        }
    }
}

impl TryFrom<AdDraftMsg> for AdDraft {
    type Error = ServiceError;

    fn try_from(msg: AdDraftMsg) -> ServiceResult<Self> {
        Ok(Self {
            city_name: msg.city_name,
            address: msg.address,
            description: msg.description,
            rooms_number: msg.rooms_number,
            date_from: from_millis(msg.date_from)?,
            date_to: from_millis(msg.date_to)?,
        })
    }
}

impl From<AdFilter> for ListAdsRequest {
    fn from(filter: AdFilter) -> Self {
        Self {
            location: filter.location,
            rating: filter.rating,
            new: filter.new,
            gender: filter.gender,
            guests: filter.guests,
            limit: filter.limit,
            offset: filter.offset,
            date_from: filter.date_from,
            date_to: filter.date_to,
        }
    }
}

impl From<ListAdsRequest> for AdFilter {
    fn from(req: ListAdsRequest) -> Self {
        Self {
            location: req.location,
            rating: req.rating,
            new: req.new,
            gender: req.gender,
            guests: req.guests,
            limit: req.limit,
            offset: req.offset,
            date_from: req.date_from,
            date_to: req.date_to,
        }
    }
}

impl From<City> for CityMsg {
    fn from(city: City) -> Self {
        Self {
            id: city.id,
            title: city.title,
            en_title: city.en_title,
            description: city.description,
            image: city.image,
        }
    }
}

impl From<CityMsg> for City {
    fn from(msg: CityMsg) -> Self {
        Self {
            id: msg.id,
            title: msg.title,
            en_title: msg.en_title,
            description: msg.description,
            image: msg.image,
        }
    }
}

impl From<User> for UserMsg {
    fn from(user: User) -> Self {
        Self {
            uuid: user.uuid.to_string(),
            username: user.username,
            email: user.email,
            name: user.name,
            avatar: user.avatar,
            sex: user.sex.map(|sex| sex.as_db().to_string()),
            birthdate: user.birthdate.map(to_millis),
            is_host: user.is_host,
            score: user.score,
            created_at: to_millis(user.created_at),
        }
    }
}

/// The password hash never crosses the wire, so the rebuilt user carries an
/// empty one.
impl TryFrom<UserMsg> for User {
    type Error = ServiceError;

    fn try_from(msg: UserMsg) -> ServiceResult<Self> {
        Ok(Self {
            uuid: uuid_field(&msg.uuid)?,
            username: msg.username,
            email: msg.email,
            password_hash: String::new(),
            name: msg.name,
            avatar: msg.avatar,
            sex: sex_field(msg.sex)?,
            birthdate: optional_millis(msg.birthdate)?,
            is_host: msg.is_host,
            score: msg.score,
            created_at: from_millis(msg.created_at)?,
        })
    }
}

impl From<PublicUser> for PublicUserMsg {
    fn from(user: PublicUser) -> Self {
        Self {
            uuid: user.uuid.to_string(),
            username: user.username,
            name: user.name,
            avatar: user.avatar,
            sex: user.sex.map(|sex| sex.as_db().to_string()),
            birthdate: user.birthdate.map(to_millis),
            is_host: user.is_host,
            score: user.score,
        }
    }
}

impl TryFrom<PublicUserMsg> for PublicUser {
    type Error = ServiceError;

    fn try_from(msg: PublicUserMsg) -> ServiceResult<Self> {
        Ok(Self {
            uuid: uuid_field(&msg.uuid)?,
            username: msg.username,
            name: msg.name,
            avatar: msg.avatar,
            sex: sex_field(msg.sex)?,
            birthdate: optional_millis(msg.birthdate)?,
            is_host: msg.is_host,
            score: msg.score,
        })
    }
}

impl From<NewUser> for RegisterRequest {
    fn from(user: NewUser) -> Self {
        Self {
            username: user.username,
            email: user.email,
            password: user.password,
            name: user.name,
            sex: user.sex.map(|sex| sex.as_db().to_string()),
            birthdate: user.birthdate.map(to_millis),
            is_host: user.is_host,
        }
    }
}

impl TryFrom<RegisterRequest> for NewUser {
    type Error = ServiceError;

    fn try_from(req: RegisterRequest) -> ServiceResult<Self> {
        Ok(Self {
            username: req.username,
            email: req.email,
            password: req.password,
            name: req.name,
            sex: sex_field(req.sex)?,
            birthdate: optional_millis(req.birthdate)?,
            is_host: req.is_host,
        })
    }
}

impl UpdateUserRequest {
    pub fn new(user_id: Uuid, changes: UserUpdate) -> Self {
        Self {
            user_id: user_id.to_string(),
            username: changes.username,
            email: changes.email,
            name: changes.name,
            avatar: changes.avatar,
            sex: changes.sex.map(|sex| sex.as_db().to_string()),
            birthdate: changes.birthdate.map(to_millis),
            is_host: changes.is_host,
        }
    }

    pub fn into_parts(self) -> ServiceResult<(Uuid, UserUpdate)> {
        let user_id = uuid_field(&self.user_id)?;
        let changes = UserUpdate {
            username: self.username,
            email: self.email,
            name: self.name,
            avatar: self.avatar,
            sex: sex_field(self.sex)?,
            birthdate: optional_millis(self.birthdate)?,
            is_host: self.is_host,
        };
        Ok((user_id, changes))
    }
}

impl From<SessionData> for SessionDataReply {
    fn from(data: SessionData) -> Self {
        Self {
            id: data.id.to_string(),
            avatar: data.avatar,
        }
    }
}

impl TryFrom<SessionDataReply> for SessionData {
    type Error = ServiceError;

    fn try_from(reply: SessionDataReply) -> ServiceResult<Self> {
        Ok(Self {
            id: uuid_field(&reply.id)?,
            avatar: reply.avatar,
        })
    }
}

/// Parses an id sent by a caller, reporting `missing` when it is malformed.
pub fn request_uuid(value: &str, missing: ServiceError) -> ServiceResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| missing)
}

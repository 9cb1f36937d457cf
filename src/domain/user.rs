use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uuid: Uuid,
    pub username: String,
    pub email: String,
    /// Argon2 PHC string, never serialized.
    #[serde(skip)]
    pub password_hash: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub sex: Option<Sex>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub birthdate: Option<OffsetDateTime>,
    pub is_host: bool,
    pub score: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Profile fields visible to anyone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub uuid: Uuid,
    pub username: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub sex: Option<Sex>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub birthdate: Option<OffsetDateTime>,
    pub is_host: bool,
    pub score: f64,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            uuid: user.uuid,
            username: user.username,
            name: user.name,
            avatar: user.avatar,
            sex: user.sex,
            birthdate: user.birthdate,
            is_host: user.is_host,
            score: user.score,
        }
    }
}

/// Input for a new account, before validation.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub sex: Option<Sex>,
    pub birthdate: Option<OffsetDateTime>,
    pub is_host: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Partial profile update. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub sex: Option<Sex>,
    pub birthdate: Option<OffsetDateTime>,
    pub is_host: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub id: Uuid,
    pub avatar: Option<String>,
}

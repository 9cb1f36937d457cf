use thiserror::Error;

/// Every failure a use-case can report. The `Display` text is the tag clients
/// see; [`ServiceError::code`] is its stable wire number on the RPC transport.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error("ad not found")]
    AdNotFound,
    #[error("city not found")]
    CityNotFound,
    #[error("user not found")]
    UserNotFound,
    #[error("image not found")]
    ImageNotFound,
    #[error("ad already exists")]
    AdAlreadyExists,
    #[error("User already exists")]
    UserAlreadyExists,

    #[error("not owner of ad")]
    NotOwner,
    #[error("no active session")]
    NoActiveSession,
    #[error("session expired")]
    SessionExpired,
    #[error("Missing X-CSRF-Token header")]
    MissingCsrfToken,
    #[error("Invalid JWT token")]
    InvalidCsrfToken,
    #[error("User is not host")]
    NotHost,
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid metadata JSON")]
    InvalidMetadata,
    #[error("Invalid multipart form")]
    InvalidMultipart,
    #[error("Invalid size, type or resolution of image")]
    InvalidImage,
    #[error("Input contains invalid characters")]
    InvalidCharacters,
    #[error("Input exceeds character limit")]
    InputTooLong,
    #[error("RoomsNumber out of range")]
    RoomsOutOfRange,
    #[error("query limit not int")]
    LimitNotInt,
    #[error("query offset not int")]
    OffsetNotInt,
    #[error("{0}")]
    BadFilter(String),
    #[error("No images")]
    NoImages,
    #[error("Too many images")]
    TooManyImages,
    #[error("Cannot delete the last image")]
    LastImage,
    #[error("Invalid date range")]
    InvalidDateRange,
    #[error("Invalid priority amount")]
    InvalidPriority,
    #[error("URL contains invalid characters")]
    UrlInvalidCharacters,
    #[error("URL exceeds character limit")]
    UrlTooLong,
    #[error("Incorrect data forms")]
    IncorrectDataForms(Vec<String>),
    #[error("Invalid JSON")]
    InvalidJson,
    #[error("No such session")]
    NoSuchSession,

    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::AdNotFound => 1,
            Self::CityNotFound => 2,
            Self::UserNotFound => 3,
            Self::ImageNotFound => 4,
            Self::AdAlreadyExists => 5,
            Self::UserAlreadyExists => 6,
            Self::NotOwner => 10,
            Self::NoActiveSession => 11,
            Self::SessionExpired => 12,
            Self::MissingCsrfToken => 13,
            Self::InvalidCsrfToken => 14,
            Self::NotHost => 15,
            Self::InvalidCredentials => 16,
            Self::InvalidMetadata => 20,
            Self::InvalidMultipart => 21,
            Self::InvalidImage => 22,
            Self::InvalidCharacters => 23,
            Self::InputTooLong => 24,
            Self::RoomsOutOfRange => 25,
            Self::LimitNotInt => 26,
            Self::OffsetNotInt => 27,
            Self::BadFilter(_) => 28,
            Self::NoImages => 29,
            Self::TooManyImages => 30,
            Self::InvalidDateRange => 31,
            Self::InvalidPriority => 32,
            Self::UrlInvalidCharacters => 33,
            Self::UrlTooLong => 34,
            Self::IncorrectDataForms(_) => 35,
            Self::InvalidJson => 36,
            Self::NoSuchSession => 37,
            Self::LastImage => 38,
            Self::DeadlineExceeded => 40,
            Self::Unavailable(_) => 42,
            Self::Internal(_) => 50,
        }
    }

    /// Rebuilds an error received over RPC. Unknown codes degrade to
    /// `Internal` carrying the remote message.
    pub fn from_wire(code: i32, message: String, fields: Vec<String>) -> Self {
        match code {
            1 => Self::AdNotFound,
            2 => Self::CityNotFound,
            3 => Self::UserNotFound,
            4 => Self::ImageNotFound,
            5 => Self::AdAlreadyExists,
            6 => Self::UserAlreadyExists,
            10 => Self::NotOwner,
            11 => Self::NoActiveSession,
            12 => Self::SessionExpired,
            13 => Self::MissingCsrfToken,
            14 => Self::InvalidCsrfToken,
            15 => Self::NotHost,
            16 => Self::InvalidCredentials,
            20 => Self::InvalidMetadata,
            21 => Self::InvalidMultipart,
            22 => Self::InvalidImage,
            23 => Self::InvalidCharacters,
            24 => Self::InputTooLong,
            25 => Self::RoomsOutOfRange,
            26 => Self::LimitNotInt,
            27 => Self::OffsetNotInt,
            28 => Self::BadFilter(message),
            29 => Self::NoImages,
            30 => Self::TooManyImages,
            31 => Self::InvalidDateRange,
            32 => Self::InvalidPriority,
            33 => Self::UrlInvalidCharacters,
            34 => Self::UrlTooLong,
            35 => Self::IncorrectDataForms(fields),
            36 => Self::InvalidJson,
            37 => Self::NoSuchSession,
            38 => Self::LastImage,
            40 => Self::DeadlineExceeded,
            42 => Self::Unavailable(message),
            _ => Self::Internal(message),
        }
    }

    pub fn fields(&self) -> &[String] {
        match self {
            Self::IncorrectDataForms(fields) => fields,
            _ => &[],
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use time::{Duration, OffsetDateTime};

use crate::domain::error::{ServiceError, ServiceResult};

#[derive(Debug, Serialize, Deserialize)]
struct CsrfClaims {
    session_id: String,
    exp: i64,
}

/// Issues and checks HS256 tokens bound to a session id.
#[derive(Clone)]
pub struct CsrfService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl CsrfService {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn issue(&self, session_id: &str) -> ServiceResult<String> {
        let claims = CsrfClaims {
            session_id: session_id.to_string(),
            exp: (OffsetDateTime::now_utc() + self.ttl).unix_timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|err| {
            tracing::error!(error = ?err, "failed to sign csrf token");
            ServiceError::internal("failed to create csrf token")
        })
    }

    pub fn validate(&self, token: Option<&str>, session_id: &str) -> ServiceResult<()> {
        let token = match token {
            Some(token) if !token.is_empty() => token,
            _ => return Err(ServiceError::MissingCsrfToken),
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let data = decode::<CsrfClaims>(token, &self.decoding, &validation).map_err(|err| {
            tracing::debug!(error = ?err, "rejected csrf token");
            ServiceError::InvalidCsrfToken
        })?;

        let matches: bool = data
            .claims
            .session_id
            .as_bytes()
            .ct_eq(session_id.as_bytes())
            .into();
        if !matches {
            return Err(ServiceError::InvalidCsrfToken);
        }

        Ok(())
    }
}

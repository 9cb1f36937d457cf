use anyhow::{anyhow, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::session::SessionService;
use crate::app::validation::{validate_credentials, validate_registration};
use crate::domain::error::{ServiceError, ServiceResult};
use crate::domain::user::{Credentials, NewUser, User};
use crate::repo::Repositories;

/// A freshly opened session together with the user it belongs to.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub session_id: String,
    pub user: User,
}

#[derive(Clone)]
pub struct AuthService {
    repos: Repositories,
    sessions: SessionService,
}

impl AuthService {
    pub fn new(repos: Repositories, sessions: SessionService) -> Self {
        Self { repos, sessions }
    }

    pub async fn register(&self, new_user: NewUser) -> ServiceResult<AuthSession> {
        validate_registration(&new_user)?;

        let existing = self
            .repos
            .users
            .find_by_username(&new_user.username)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, "failed to look up username");
                ServiceError::internal("failed to register user")
            })?;
        if existing.is_some() {
            return Err(ServiceError::UserAlreadyExists);
        }

        let password_hash = hash_password(&new_user.password).map_err(|err| {
            tracing::error!(error = ?err, "failed to hash password");
            ServiceError::internal("failed to register user")
        })?;

        let user = User {
            uuid: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            password_hash,
            name: new_user.name,
            avatar: None,
            sex: new_user.sex,
            birthdate: new_user.birthdate,
            is_host: new_user.is_host,
            score: 0.0,
            created_at: OffsetDateTime::now_utc(),
        };

        let created = self.repos.users.create(&user).await.map_err(|err| {
            tracing::error!(error = ?err, "failed to create user");
            ServiceError::internal("failed to register user")
        })?;
        if !created {
            return Err(ServiceError::UserAlreadyExists);
        }

        let session_id = self.sessions.create(user.uuid).await?;
        tracing::info!(user_id = %user.uuid, "user registered");

        Ok(AuthSession { session_id, user })
    }

    pub async fn login(&self, credentials: Credentials) -> ServiceResult<AuthSession> {
        validate_credentials(&credentials)?;

        let user = self
            .repos
            .users
            .find_by_username(&credentials.username)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, "failed to load user for login");
                ServiceError::internal("failed to log in")
            })?
            .ok_or(ServiceError::InvalidCredentials)?;

        let verified = verify_password(&credentials.password, &user.password_hash).map_err(|err| {
            tracing::error!(error = ?err, user_id = %user.uuid, "failed to verify password");
            ServiceError::internal("failed to log in")
        })?;
        if !verified {
            return Err(ServiceError::InvalidCredentials);
        }

        let session_id = self.sessions.create(user.uuid).await?;
        Ok(AuthSession { session_id, user })
    }

    pub async fn logout(&self, session_id: Option<&str>) -> ServiceResult<()> {
        self.sessions.invalidate(session_id).await
    }
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {}", err))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|err| anyhow!("failed to parse password hash: {}", err))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

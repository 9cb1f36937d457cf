use uuid::Uuid;

use crate::app::validation::validate_user_update;
use crate::domain::error::{ServiceError, ServiceResult};
use crate::domain::user::{PublicUser, SessionData, User, UserUpdate};
use crate::repo::{is_unique_violation, Repositories};

#[derive(Clone)]
pub struct UserService {
    repos: Repositories,
}

impl UserService {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    pub async fn list(&self) -> ServiceResult<Vec<PublicUser>> {
        let users = self.repos.users.list().await.map_err(|err| {
            tracing::error!(error = ?err, "failed to list users");
            ServiceError::internal("failed to list users")
        })?;
        Ok(users.into_iter().map(PublicUser::from).collect())
    }

    pub async fn get(&self, user_id: Uuid) -> ServiceResult<User> {
        self.repos
            .users
            .find_by_id(user_id)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, user_id = %user_id, "failed to load user");
                ServiceError::internal("failed to load user")
            })?
            .ok_or(ServiceError::UserNotFound)
    }

    pub async fn update(&self, user_id: Uuid, changes: UserUpdate) -> ServiceResult<User> {
        validate_user_update(&changes)?;

        self.repos
            .users
            .update(user_id, &changes)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    return ServiceError::UserAlreadyExists;
                }
                tracing::error!(error = ?err, user_id = %user_id, "failed to update user");
                ServiceError::internal("failed to update user")
            })?
            .ok_or(ServiceError::UserNotFound)
    }

    pub async fn session_data(&self, user_id: Uuid) -> ServiceResult<SessionData> {
        let user = self.get(user_id).await?;
        Ok(SessionData {
            id: user.uuid,
            avatar: user.avatar,
        })
    }
}

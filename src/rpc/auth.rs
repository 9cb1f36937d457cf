use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use crate::app::auth::{AuthService, AuthSession};
use crate::app::users::UserService;
use crate::domain::context::RequestContext;
use crate::domain::error::{ServiceError, ServiceResult};
use crate::domain::user::{Credentials, NewUser, PublicUser, SessionData, User, UserUpdate};
use crate::rpc::client::RpcClient;
use crate::rpc::proto::{
    request_uuid, Empty, LoginRequest, LogoutRequest, PublicUserMsg, RegisterRequest,
    SessionDataReply, SessionReply, UpdateUserRequest, UserListReply, UserMsg, UserReply,
    UserRequest,
};
use crate::rpc::server::{decode, encode, unknown_method, RpcService};

pub const SERVICE: &str = "auth";

const REGISTER: &str = "Register";
const LOGIN: &str = "Login";
const LOGOUT: &str = "Logout";
const LIST_USERS: &str = "GetUsers";
const GET_USER: &str = "GetUser";
const UPDATE_USER: &str = "UpdateUser";
const SESSION_DATA: &str = "GetSessionData";

pub struct AuthRpc {
    auth: AuthService,
    users: UserService,
}

impl AuthRpc {
    pub fn new(auth: AuthService, users: UserService) -> Self {
        Self { auth, users }
    }
}

fn session_reply(session: AuthSession) -> ServiceResult<Vec<u8>> {
    encode(SessionReply {
        session_id: session.session_id,
        user: Some(session.user.into()),
    })
}

fn user_id(value: &str) -> ServiceResult<Uuid> {
    request_uuid(value, ServiceError::UserNotFound)
}

#[async_trait]
impl RpcService for AuthRpc {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn dispatch(&self, method: &str, payload: Bytes) -> ServiceResult<Vec<u8>> {
        match method {
            REGISTER => {
                let req: RegisterRequest = decode(payload)?;
                session_reply(self.auth.register(NewUser::try_from(req)?).await?)
            }
            LOGIN => {
                let req: LoginRequest = decode(payload)?;
                let credentials = Credentials {
                    username: req.username,
                    password: req.password,
                };
                session_reply(self.auth.login(credentials).await?)
            }
            LOGOUT => {
                let req: LogoutRequest = decode(payload)?;
                self.auth.logout(req.session_id.as_deref()).await?;
                encode(Empty {})
            }
            LIST_USERS => {
                let _: Empty = decode(payload)?;
                let users = self.users.list().await?;
                encode(UserListReply {
                    users: users.into_iter().map(PublicUserMsg::from).collect(),
                })
            }
            GET_USER => {
                let req: UserRequest = decode(payload)?;
                let user = self.users.get(user_id(&req.user_id)?).await?;
                encode(UserReply {
                    user: Some(user.into()),
                })
            }
            UPDATE_USER => {
                let req: UpdateUserRequest = decode(payload)?;
                let (id, changes) = req.into_parts()?;
                let user = self.users.update(id, changes).await?;
                encode(UserReply {
                    user: Some(user.into()),
                })
            }
            SESSION_DATA => {
                let req: UserRequest = decode(payload)?;
                let data = self.users.session_data(user_id(&req.user_id)?).await?;
                encode(SessionDataReply::from(data))
            }
            other => Err(unknown_method(SERVICE, other)),
        }
    }
}

#[derive(Clone)]
pub struct AuthClient {
    rpc: RpcClient,
}

fn session_from_wire(reply: SessionReply) -> ServiceResult<AuthSession> {
    let user: UserMsg = reply
        .user
        .ok_or_else(|| ServiceError::internal("empty session reply"))?;
    Ok(AuthSession {
        session_id: reply.session_id,
        user: user.try_into()?,
    })
}

fn user_from_wire(reply: UserReply) -> ServiceResult<User> {
    reply
        .user
        .ok_or_else(|| ServiceError::internal("empty user reply"))?
        .try_into()
}

impl AuthClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            rpc: RpcClient::new(SERVICE, addr),
        }
    }

    pub async fn register(&self, user: NewUser, ctx: &RequestContext) -> ServiceResult<AuthSession> {
        let reply: SessionReply = self
            .rpc
            .call(REGISTER, RegisterRequest::from(user), ctx)
            .await?;
        session_from_wire(reply)
    }

    pub async fn login(&self, credentials: Credentials, ctx: &RequestContext) -> ServiceResult<AuthSession> {
        let req = LoginRequest {
            username: credentials.username,
            password: credentials.password,
        };
        session_from_wire(self.rpc.call(LOGIN, req, ctx).await?)
    }

    pub async fn logout(&self, session_id: Option<String>, ctx: &RequestContext) -> ServiceResult<()> {
        let _: Empty = self
            .rpc
            .call(LOGOUT, LogoutRequest { session_id }, ctx)
            .await?;
        Ok(())
    }

    pub async fn list_users(&self, ctx: &RequestContext) -> ServiceResult<Vec<PublicUser>> {
        let reply: UserListReply = self.rpc.call(LIST_USERS, Empty {}, ctx).await?;
        reply.users.into_iter().map(PublicUser::try_from).collect()
    }

    pub async fn get_user(&self, user_id: Uuid, ctx: &RequestContext) -> ServiceResult<User> {
        let req = UserRequest {
            user_id: user_id.to_string(),
        };
        user_from_wire(self.rpc.call(GET_USER, req, ctx).await?)
    }

    pub async fn update_user(
        &self,
        user_id: Uuid,
        changes: UserUpdate,
        ctx: &RequestContext,
    ) -> ServiceResult<User> {
        let req = UpdateUserRequest::new(user_id, changes);
        user_from_wire(self.rpc.call(UPDATE_USER, req, ctx).await?)
    }

    pub async fn session_data(&self, user_id: Uuid, ctx: &RequestContext) -> ServiceResult<SessionData> {
        let req = UserRequest {
            user_id: user_id.to_string(),
        };
        let reply: SessionDataReply = self.rpc.call(SESSION_DATA, req, ctx).await?;
        reply.try_into()
    }
}

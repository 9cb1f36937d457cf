use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use crate::app::ads::AdService;
use crate::domain::ad::{Ad, AdDraft, AdFilter};
use crate::domain::context::RequestContext;
use crate::domain::error::{ServiceError, ServiceResult};
use crate::rpc::client::RpcClient;
use crate::rpc::proto::{
    ads_from_wire, request_uuid, AdDraftMsg, AdListReply, AdMsg, AdReply, AdUserRequest,
    CityAdsRequest, CreateAdRequest, DeleteImageRequest, Empty, FavoritesCountReply, GetAdRequest,
    ListAdsRequest, PriorityRequest, ResetPrioritiesReply, UpdateAdRequest, UserRequest,
};
use crate::rpc::server::{decode, encode, unknown_method, RpcService};

pub const SERVICE: &str = "ads";

const LIST: &str = "ListAds";
const GET: &str = "GetAd";
const CREATE: &str = "CreateAd";
const UPDATE: &str = "UpdateAd";
const DELETE: &str = "DeleteAd";
const LIST_BY_CITY: &str = "ListAdsByCity";
const LIST_BY_USER: &str = "ListAdsByUser";
const DELETE_IMAGE: &str = "DeleteAdImage";
const ADD_FAVORITE: &str = "AddFavorite";
const REMOVE_FAVORITE: &str = "RemoveFavorite";
const FAVORITES: &str = "ListFavorites";
const FAVORITES_COUNT: &str = "UpdateFavoritesCount";
const ADD_PRIORITY: &str = "UpdatePriority";
const RESET_PRIORITIES: &str = "ResetExpiredPriorities";

pub struct AdsRpc {
    ads: AdService,
}

impl AdsRpc {
    pub fn new(ads: AdService) -> Self {
        Self { ads }
    }
}

fn ad_id(value: &str) -> ServiceResult<Uuid> {
    request_uuid(value, ServiceError::AdNotFound)
}

fn user_id(value: &str) -> ServiceResult<Uuid> {
    request_uuid(value, ServiceError::UserNotFound)
}

fn draft(msg: Option<AdDraftMsg>) -> ServiceResult<AdDraft> {
    msg.ok_or(ServiceError::InvalidMetadata)?.try_into()
}

fn images(raw: Vec<Vec<u8>>) -> Vec<Bytes> {
    raw.into_iter().map(Bytes::from).collect()
}

fn ad_list(ads: Vec<Ad>) -> ServiceResult<Vec<u8>> {
    encode(AdListReply {
        ads: ads.into_iter().map(AdMsg::from).collect(),
    })
}

fn ad_reply(ad: Ad) -> ServiceResult<Vec<u8>> {
    encode(AdReply {
        ad: Some(AdMsg::from(ad)),
    })
}

#[async_trait]
impl RpcService for AdsRpc {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn dispatch(&self, method: &str, payload: Bytes) -> ServiceResult<Vec<u8>> {
        match method {
            LIST => {
                let req: ListAdsRequest = decode(payload)?;
                ad_list(self.ads.list(&AdFilter::from(req)).await?)
            }
            GET => {
                let req: GetAdRequest = decode(payload)?;
                ad_reply(self.ads.get(ad_id(&req.ad_id)?, req.is_authorized).await?)
            }
            CREATE => {
                let req: CreateAdRequest = decode(payload)?;
                let author = user_id(&req.author_id)?;
                let ad = self
                    .ads
                    .create(draft(req.draft)?, images(req.images), author)
                    .await?;
                ad_reply(ad)
            }
            UPDATE => {
                let req: UpdateAdRequest = decode(payload)?;
                self.ads
                    .update(
                        ad_id(&req.ad_id)?,
                        user_id(&req.user_id)?,
                        draft(req.draft)?,
                        images(req.images),
                    )
                    .await?;
                encode(Empty {})
            }
            DELETE => {
                let req: AdUserRequest = decode(payload)?;
                self.ads
                    .delete(ad_id(&req.ad_id)?, user_id(&req.user_id)?)
                    .await?;
                encode(Empty {})
            }
            LIST_BY_CITY => {
                let req: CityAdsRequest = decode(payload)?;
                ad_list(self.ads.list_by_city(&req.city).await?)
            }
            LIST_BY_USER => {
                let req: UserRequest = decode(payload)?;
                ad_list(self.ads.list_by_user(user_id(&req.user_id)?).await?)
            }
            DELETE_IMAGE => {
                let req: DeleteImageRequest = decode(payload)?;
                self.ads
                    .delete_image(ad_id(&req.ad_id)?, req.image_id, user_id(&req.user_id)?)
                    .await?;
                encode(Empty {})
            }
            ADD_FAVORITE => {
                let req: AdUserRequest = decode(payload)?;
                let count = self
                    .ads
                    .add_favorite(ad_id(&req.ad_id)?, user_id(&req.user_id)?)
                    .await?;
                encode(FavoritesCountReply { count })
            }
            REMOVE_FAVORITE => {
                let req: AdUserRequest = decode(payload)?;
                let count = self
                    .ads
                    .remove_favorite(ad_id(&req.ad_id)?, user_id(&req.user_id)?)
                    .await?;
                encode(FavoritesCountReply { count })
            }
            FAVORITES => {
                let req: UserRequest = decode(payload)?;
                ad_list(self.ads.favorites(user_id(&req.user_id)?).await?)
            }
            FAVORITES_COUNT => {
                let req: AdUserRequest = decode(payload)?;
                let count = self.ads.refresh_favorites_count(ad_id(&req.ad_id)?).await?;
                encode(FavoritesCountReply { count })
            }
            ADD_PRIORITY => {
                let req: PriorityRequest = decode(payload)?;
                let ad = self
                    .ads
                    .add_priority(ad_id(&req.ad_id)?, user_id(&req.user_id)?, req.amount)
                    .await?;
                ad_reply(ad)
            }
            RESET_PRIORITIES => {
                let _: Empty = decode(payload)?;
                let affected = self.ads.reset_expired_priorities().await?;
                encode(ResetPrioritiesReply { affected })
            }
            other => Err(unknown_method(SERVICE, other)),
        }
    }
}

/// Typed stub for the ads service.
#[derive(Clone)]
pub struct AdsClient {
    rpc: RpcClient,
}

fn one_ad(reply: AdReply) -> ServiceResult<Ad> {
    reply
        .ad
        .ok_or_else(|| ServiceError::internal("empty ad reply"))?
        .try_into()
}

impl AdsClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            rpc: RpcClient::new(SERVICE, addr),
        }
    }

    pub async fn list(&self, filter: AdFilter, ctx: &RequestContext) -> ServiceResult<Vec<Ad>> {
        let reply: AdListReply = self
            .rpc
            .call(LIST, ListAdsRequest::from(filter), ctx)
            .await?;
        ads_from_wire(reply.ads)
    }

    pub async fn get(&self, ad_id: Uuid, is_authorized: bool, ctx: &RequestContext) -> ServiceResult<Ad> {
        let req = GetAdRequest {
            ad_id: ad_id.to_string(),
            is_authorized,
        };
        one_ad(self.rpc.call(GET, req, ctx).await?)
    }

    pub async fn create(
        &self,
        draft: AdDraft,
        images: Vec<Bytes>,
        author_id: Uuid,
        ctx: &RequestContext,
    ) -> ServiceResult<Ad> {
        let req = CreateAdRequest {
            draft: Some(draft.into()),
            images: images.into_iter().map(|image| image.to_vec()).collect(),
            author_id: author_id.to_string(),
        };
        one_ad(self.rpc.call(CREATE, req, ctx).await?)
    }

    pub async fn update(
        &self,
        ad_id: Uuid,
        user_id: Uuid,
        draft: AdDraft,
        images: Vec<Bytes>,
        ctx: &RequestContext,
    ) -> ServiceResult<()> {
        let req = UpdateAdRequest {
            ad_id: ad_id.to_string(),
            user_id: user_id.to_string(),
            draft: Some(draft.into()),
            images: images.into_iter().map(|image| image.to_vec()).collect(),
        };
        let _: Empty = self.rpc.call(UPDATE, req, ctx).await?;
        Ok(())
    }

    pub async fn delete(&self, ad_id: Uuid, user_id: Uuid, ctx: &RequestContext) -> ServiceResult<()> {
        let _: Empty = self
            .rpc
            .call(DELETE, ad_user(ad_id, user_id), ctx)
            .await?;
        Ok(())
    }

    pub async fn list_by_city(&self, city: &str, ctx: &RequestContext) -> ServiceResult<Vec<Ad>> {
        let req = CityAdsRequest {
            city: city.to_string(),
        };
        let reply: AdListReply = self.rpc.call(LIST_BY_CITY, req, ctx).await?;
        ads_from_wire(reply.ads)
    }

    pub async fn list_by_user(&self, user_id: Uuid, ctx: &RequestContext) -> ServiceResult<Vec<Ad>> {
        let req = UserRequest {
            user_id: user_id.to_string(),
        };
        let reply: AdListReply = self.rpc.call(LIST_BY_USER, req, ctx).await?;
        ads_from_wire(reply.ads)
    }

    pub async fn delete_image(
        &self,
        ad_id: Uuid,
        image_id: i64,
        user_id: Uuid,
        ctx: &RequestContext,
    ) -> ServiceResult<()> {
        let req = DeleteImageRequest {
            ad_id: ad_id.to_string(),
            image_id,
            user_id: user_id.to_string(),
        };
        let _: Empty = self.rpc.call(DELETE_IMAGE, req, ctx).await?;
        Ok(())
    }

    pub async fn add_favorite(&self, ad_id: Uuid, user_id: Uuid, ctx: &RequestContext) -> ServiceResult<i32> {
        let reply: FavoritesCountReply = self
            .rpc
            .call(ADD_FAVORITE, ad_user(ad_id, user_id), ctx)
            .await?;
        Ok(reply.count)
    }

    pub async fn remove_favorite(
        &self,
        ad_id: Uuid,
        user_id: Uuid,
        ctx: &RequestContext,
    ) -> ServiceResult<i32> {
        let reply: FavoritesCountReply = self
            .rpc
            .call(REMOVE_FAVORITE, ad_user(ad_id, user_id), ctx)
            .await?;
        Ok(reply.count)
    }

    pub async fn favorites(&self, user_id: Uuid, ctx: &RequestContext) -> ServiceResult<Vec<Ad>> {
        let req = UserRequest {
            user_id: user_id.to_string(),
        };
        let reply: AdListReply = self.rpc.call(FAVORITES, req, ctx).await?;
        ads_from_wire(reply.ads)
    }

    pub async fn refresh_favorites_count(&self, ad_id: Uuid, ctx: &RequestContext) -> ServiceResult<i32> {
        let req = AdUserRequest {
            ad_id: ad_id.to_string(),
            user_id: String::new(),
        };
        let reply: FavoritesCountReply = self.rpc.call(FAVORITES_COUNT, req, ctx).await?;
        Ok(reply.count)
    }

    pub async fn add_priority(
        &self,
        ad_id: Uuid,
        user_id: Uuid,
        amount: i32,
        ctx: &RequestContext,
    ) -> ServiceResult<Ad> {
        let req = PriorityRequest {
            ad_id: ad_id.to_string(),
            user_id: user_id.to_string(),
            amount,
        };
        one_ad(self.rpc.call(ADD_PRIORITY, req, ctx).await?)
    }

    pub async fn reset_expired_priorities(&self, ctx: &RequestContext) -> ServiceResult<u64> {
        let reply: ResetPrioritiesReply = self.rpc.call(RESET_PRIORITIES, Empty {}, ctx).await?;
        Ok(reply.affected)
    }
}

fn ad_user(ad_id: Uuid, user_id: Uuid) -> AdUserRequest {
    AdUserRequest {
        ad_id: ad_id.to_string(),
        user_id: user_id.to_string(),
    }
}

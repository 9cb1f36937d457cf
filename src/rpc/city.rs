use async_trait::async_trait;
use bytes::Bytes;

use crate::app::cities::CityService;
use crate::domain::city::City;
use crate::domain::context::RequestContext;
use crate::domain::error::{ServiceError, ServiceResult};
use crate::rpc::client::RpcClient;
use crate::rpc::proto::{CityListReply, CityMsg, CityReply, CityRequest, Empty};
use crate::rpc::server::{decode, encode, unknown_method, RpcService};

pub const SERVICE: &str = "city";

const LIST: &str = "GetCities";
const GET: &str = "GetOneCity";

pub struct CityRpc {
    cities: CityService,
}

impl CityRpc {
    pub fn new(cities: CityService) -> Self {
        Self { cities }
    }
}

#[async_trait]
impl RpcService for CityRpc {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn dispatch(&self, method: &str, payload: Bytes) -> ServiceResult<Vec<u8>> {
        match method {
            LIST => {
                let _: Empty = decode(payload)?;
                let cities = self.cities.list().await?;
                encode(CityListReply {
                    cities: cities.into_iter().map(CityMsg::from).collect(),
                })
            }
            GET => {
                let req: CityRequest = decode(payload)?;
                let city = self.cities.get(&req.en_name).await?;
                encode(CityReply {
                    city: Some(city.into()),
                })
            }
            other => Err(unknown_method(SERVICE, other)),
        }
    }
}

#[derive(Clone)]
pub struct CityClient {
    rpc: RpcClient,
}

impl CityClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            rpc: RpcClient::new(SERVICE, addr),
        }
    }

    pub async fn list(&self, ctx: &RequestContext) -> ServiceResult<Vec<City>> {
        let reply: CityListReply = self.rpc.call(LIST, Empty {}, ctx).await?;
        Ok(reply.cities.into_iter().map(City::from).collect())
    }

    pub async fn get(&self, en_name: &str, ctx: &RequestContext) -> ServiceResult<City> {
        let req = CityRequest {
            en_name: en_name.to_string(),
        };
        let reply: CityReply = self.rpc.call(GET, req, ctx).await?;
        reply
            .city
            .map(City::from)
            .ok_or_else(|| ServiceError::internal("empty city reply"))
    }
}

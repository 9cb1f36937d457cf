use crate::app::validation::sanitize_url_param;
use crate::domain::city::City;
use crate::domain::error::{ServiceError, ServiceResult};
use crate::repo::Repositories;

#[derive(Clone)]
pub struct CityService {
    repos: Repositories,
}

impl CityService {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    pub async fn list(&self) -> ServiceResult<Vec<City>> {
        self.repos.cities.list().await.map_err(|err| {
            tracing::error!(error = ?err, "failed to list cities");
            ServiceError::internal("failed to list cities")
        })
    }

    pub async fn get(&self, en_name: &str) -> ServiceResult<City> {
        let en_name = sanitize_url_param(en_name)?;
        self.repos
            .cities
            .find_by_en_title(&en_name)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, city = %en_name, "failed to load city");
                ServiceError::internal("failed to load city")
            })?
            .ok_or(ServiceError::CityNotFound)
    }
}

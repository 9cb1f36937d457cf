use axum::extract::multipart::{Multipart, MultipartRejection};
use bytes::Bytes;

use crate::domain::ad::AdDraft;
use crate::domain::error::ServiceError;
use crate::http::AppError;

pub const METADATA_FIELD: &str = "metadata";
pub const IMAGES_FIELD: &str = "images";

/// A listing form: the JSON `metadata` part plus every `images` file part,
/// buffered in upload order.
#[derive(Debug)]
pub struct AdForm {
    pub draft: AdDraft,
    pub images: Vec<Bytes>,
}

pub async fn read_ad_form(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<AdForm, AppError> {
    let mut multipart = multipart.map_err(|err| {
        tracing::debug!(error = %err, "rejected multipart request");
        AppError::from(ServiceError::InvalidMultipart)
    })?;

    let mut metadata: Option<Bytes> = None;
    let mut images = Vec::new();

    loop {
        let field = multipart.next_field().await.map_err(|err| {
            tracing::debug!(error = %err, "failed to read multipart field");
            AppError::from(ServiceError::InvalidMultipart)
        })?;
        let Some(field) = field else {
            break;
        };

        let name = field.name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(|err| {
            tracing::debug!(error = %err, field = %name, "failed to read multipart body");
            AppError::from(ServiceError::InvalidMultipart)
        })?;

        match name.as_str() {
            METADATA_FIELD => metadata = Some(data),
            IMAGES_FIELD => images.push(data),
            _ => {}
        }
    }

    let metadata = metadata.ok_or(ServiceError::InvalidMetadata)?;
    let draft: AdDraft =
        serde_json::from_slice(&metadata).map_err(|_| ServiceError::InvalidMetadata)?;

    Ok(AdForm { draft, images })
}

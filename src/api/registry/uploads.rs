// SPDX-License-Identifier: Apache-2.0
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web::http::header;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use crate::api::registry::{authorize_request, header_value, RepositoryRequest, DOCKER_CONTENT_DIGEST, DOCKER_UPLOAD_UUID};
use crate::api::state::AppState;
use crate::auth::scope::push_requirement;
use crate::error::error_kind::ErrorKind;
use crate::error::registry::RegistryError;
use crate::metrics;
use crate::registry::digest::Digest;
use crate::registry::repository::RepoName;

#[derive(Deserialize, Debug)]
pub struct UploadRequest {
    pub name: String,

    #[serde(default)]
    pub uuid: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct UploadQuery {
    pub digest: Option<String>,

    /// Cross repository mount: blobs are shared, so a known digest is mounted at once
    pub mount: Option<String>,
}

/// Start an upload, or take the whole blob at once when the digest is given
pub async fn start_upload(upload_request: web::Path<RepositoryRequest>,
                          query: web::Query<UploadQuery>,
                          req: HttpRequest,
                          payload: web::Payload,
                          state: web::Data<AppState>) -> Result<HttpResponse, RegistryError> {

    metrics::INCOMING_REQUESTS.inc();

    let name = upload_request.repository()?;
    authorize_request(&req, &state, &push_requirement(&name))?;

    if let Some(ref digest) = query.digest {
        let digest = Digest::parse(digest)?;
        let digest = state.blobs.put_verified(&digest, payload).await?;
        tracing::info!("Monolithic upload of {} into {}", digest, name);
        return blob_created(&name, &digest);
    }

    if let Some(ref mount) = query.mount {
        let digest = Digest::parse(mount)?;
        if state.blobs.exists(&digest).await? {
            tracing::info!("Mounted {} into {}", digest, name);
            return blob_created(&name, &digest);
        }
    }

    let id = state.blobs.start_upload().await?;
    tracing::debug!("Upload {} started for {}", id, name);

    Ok(HttpResponse::Accepted()
        .insert_header((header::LOCATION, header_value(&format!("/v2/{}/blobs/uploads/{}", name, id))?))
        .insert_header((DOCKER_UPLOAD_UUID, header_value(&id.to_string())?))
        .insert_header((header::RANGE, "0-0"))
        .finish())
}

/// Close an upload session with the last (or only) chunk of the blob
pub async fn complete_upload(upload_request: web::Path<UploadRequest>,
                             query: web::Query<UploadQuery>,
                             req: HttpRequest,
                             payload: web::Payload,
                             state: web::Data<AppState>) -> Result<HttpResponse, RegistryError> {

    metrics::INCOMING_REQUESTS.inc();

    let name = RepoName::parse(&upload_request.name)?;
    let id = Uuid::parse_str(&upload_request.uuid).map_err(|e| RegistryError::new(ErrorKind::RegistryBlobUploadUnknown)
        .with_context("blob upload unknown to registry")
        .with_error(e.to_string())
        .with_detail(json!({"uuid": upload_request.uuid})))?;

    let digest = match query.digest {
        Some(ref digest) => Digest::parse(digest)?,
        None => return Err(RegistryError::new(ErrorKind::RegistryDigestInvalid)
            .with_context("the digest query parameter is required")),
    };

    authorize_request(&req, &state, &push_requirement(&name))?;

    let digest = state.blobs.complete_upload(&id, &digest, payload).await?;
    tracing::info!("Upload {} of {} into {} completed", id, digest, name);

    blob_created(&name, &digest)
}

fn blob_created(name: &RepoName, digest: &Digest) -> Result<HttpResponse, RegistryError> {
    metrics::RESPONSE_CODE_COLLECTOR.with_label_values(&["201", "blob"]).inc();

    Ok(HttpResponse::Created()
        .insert_header((header::LOCATION, header_value(&format!("/v2/{}/blobs/{}", name, digest))?))
        .insert_header((DOCKER_CONTENT_DIGEST, header_value(&digest.to_string())?))
        .finish())
}

// SPDX-License-Identifier: Apache-2.0
pub mod base;
pub mod blobs;
pub mod forward;
pub mod manifests;
pub mod uploads;

use actix_web::{HttpRequest, HttpResponse};
use actix_web::body::SizedStream;
use actix_web::http::header;
use actix_web::http::header::HeaderValue;
use serde::Deserialize;
use crate::api::state::AppState;
use crate::auth;
use crate::auth::scope::ScopeRequirement;
use crate::error::error_kind::ErrorKind;
use crate::error::registry::RegistryError;
use crate::metrics;
use crate::proxy::upstream::UpstreamResponse;
use crate::registry::repository::RepoName;

/// The `Docker-Content-Digest` response header
pub const DOCKER_CONTENT_DIGEST: &str = "docker-content-digest";

/// The `Docker-Upload-UUID` response header
pub const DOCKER_UPLOAD_UUID: &str = "docker-upload-uuid";

/// The `Docker-Distribution-API-Version` response header
pub const DOCKER_API_VERSION: &str = "docker-distribution-api-version";

/// Path segments of the repository routes
#[derive(Deserialize, Debug)]
pub struct RepositoryRequest {
    pub name: String,

    #[serde(default)]
    pub reference: String,
}

impl RepositoryRequest {
    pub fn repository(&self) -> Result<RepoName, RegistryError> {
        RepoName::parse(&self.name)
    }
}

/// Establish the caller from the `Authorization` header and check it holds the required scope
fn authorize_request(req: &HttpRequest, state: &AppState, requirement: &ScopeRequirement) -> Result<(), RegistryError> {
    let authorization = req.headers().get(header::AUTHORIZATION).and_then(|value| value.to_str().ok());
    let principal = state.policy.authenticate(authorization)?;
    auth::authorize(state.policy.as_ref(), &principal, requirement)
}

/// Every media type listed in the `Accept` headers, parameters included
fn accept_values(req: &HttpRequest) -> Vec<String> {
    req.headers()
        .get_all(header::ACCEPT)
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

fn header_value(value: &str) -> Result<HeaderValue, RegistryError> {
    HeaderValue::from_str(value).map_err(|e| RegistryError::new(ErrorKind::InternalError)
        .with_context("invalid response header")
        .with_error(e.to_string()))
}

/// Relay an upstream answer to the client, the body keeps streaming
fn from_upstream(response: UpstreamResponse) -> HttpResponse {
    let mut builder = HttpResponse::build(response.status);

    // The framing is decided by this server
    for (name, value) in response.headers.iter().filter(|(name, _)| {
        *name != header::CONNECTION && *name != header::TRANSFER_ENCODING && *name != header::CONTENT_LENGTH
    }) {
        builder.append_header((name.clone(), value.clone()));
    }

    metrics::RESPONSE_CODE_COLLECTOR.with_label_values(&[response.status.as_str(), "upstream"]).inc();

    let length = response.header(header::CONTENT_LENGTH.as_str()).and_then(|length| length.parse::<u64>().ok());
    match length {
        Some(length) => builder.body(SizedStream::new(length, response.body)),
        None => builder.streaming(response.body),
    }
}

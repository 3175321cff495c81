// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use url::Url;
use crate::error::error_kind::ErrorKind;
use crate::error::registry::RegistryError;
use crate::metrics;
use crate::proxy::upstream::{Upstream, UpstreamRequest, UpstreamResponse};
use crate::registry::digest::Digest;
use crate::registry::manifest::{Manifest, SUPPORTED_MEDIA_TYPES};
use crate::registry::reference::ManifestRef;
use crate::registry::repository::RepoName;

/// The registry this one caches, spoken to through an authenticating transport
pub struct UpstreamRegistry {
    client: Arc<dyn Upstream>,
    base: Url,
}

impl UpstreamRegistry {

    pub fn new(client: Arc<dyn Upstream>, base: Url) -> UpstreamRegistry {
        UpstreamRegistry {
            client,
            base
        }
    }

    /// Rewrite a local path and query onto the upstream
    pub fn url(&self, path: &str, query: Option<&str>) -> Url {
        let mut url = self.base.clone();
        url.set_path(path);
        url.set_query(query);
        url
    }

    /// Fetch a manifest, None when the upstream does not have it (or does not let us see it)
    pub async fn manifest(&self, name: &RepoName, reference: &ManifestRef, accept: &[String]) -> Result<Option<Manifest>, RegistryError> {
        let mut request = UpstreamRequest::get(self.url(&format!("/v2/{}/manifests/{}", name, reference), None));

        let accept = if accept.is_empty() { SUPPORTED_MEDIA_TYPES.join(", ") } else { accept.join(", ") };
        if let Ok(value) = HeaderValue::from_str(&accept) {
            request.headers.insert(ACCEPT, value);
        }

        let response = match self.fetch(request).await? {
            Some(response) => response,
            None => return Ok(None),
        };

        let content_type = response.header(CONTENT_TYPE.as_str()).map(String::from);
        let content = response.bytes().await?;
        let digest = Digest::compute(&content);

        if let ManifestRef::Digest(expected) = reference {
            if *expected != digest {
                return Err(RegistryError::new(ErrorKind::UpstreamUnavailable)
                    .with_context("upstream served a manifest not matching its digest")
                    .with_error(format!("expected {} got {}", expected, digest)));
            }
        }

        let manifest = Manifest::parse(digest, content, content_type.as_deref())?;
        Ok(Some(manifest))
    }

    /// Open the content of a blob, None when the upstream does not have it
    pub async fn blob(&self, name: &RepoName, digest: &Digest) -> Result<Option<UpstreamResponse>, RegistryError> {
        let request = UpstreamRequest::get(self.url(&format!("/v2/{}/blobs/{}", name, digest), None));
        self.fetch(request).await
    }

    /// Send any request as it is
    pub async fn forward(&self, request: UpstreamRequest) -> Result<UpstreamResponse, RegistryError> {
        let timer = metrics::RESPONSE_TIME_COLLECTOR.with_label_values(&["upstream"]).start_timer();
        let response = self.client.send(request).await?;
        timer.observe_duration();
        metrics::UPSTREAM_RESPONSES.inc();
        Ok(response)
    }

    // =============================================================================================
    // Private functions

    async fn fetch(&self, request: UpstreamRequest) -> Result<Option<UpstreamResponse>, RegistryError> {
        let url = request.url.clone();
        let response = self.forward(request).await?;

        match response.status {
            StatusCode::OK => Ok(Some(response)),
            // registries answer 401 for repositories that do not exist as well
            StatusCode::NOT_FOUND | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                tracing::debug!("Upstream has no {}: {}", url, response.status);
                Ok(None)
            }
            status => Err(RegistryError::new(ErrorKind::UpstreamUnavailable)
                .with_context(format!("upstream answered {}", status))
                .with_error(url.to_string())),
        }
    }
}

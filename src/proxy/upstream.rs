// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use url::Url;
use crate::error::registry::RegistryError;
use crate::storage::blobs::ByteStream;

/// A request against the upstream registry
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamRequest {
    pub fn new(method: Method, url: Url) -> UpstreamRequest {
        UpstreamRequest {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(url: Url) -> UpstreamRequest {
        UpstreamRequest::new(Method::GET, url)
    }
}

/// The answer of the upstream registry, the body is streamed
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> UpstreamResponse {
        UpstreamResponse {
            status,
            headers,
            body: futures::stream::once(async move { Ok(body) }).boxed(),
        }
    }

    /// Collect the whole body
    pub async fn bytes(self) -> Result<Bytes, RegistryError> {
        let chunks: Vec<Bytes> = self.body.try_collect().await?;
        Ok(Bytes::from(chunks.concat()))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// Transport to the upstream registry
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, RegistryError>;
}

/// Upstream transport over a shared reqwest client
pub struct ReqwestUpstream {
    client: reqwest::Client,
}

impl ReqwestUpstream {
    pub fn new(client: reqwest::Client) -> ReqwestUpstream {
        ReqwestUpstream {
            client
        }
    }
}

#[async_trait]
impl Upstream for ReqwestUpstream {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, RegistryError> {
        // Logging
        tracing::debug!("Upstream: {} {}", request.method, request.url);

        let mut upstream_request = self.client
            .request(request.method, request.url)
            .headers(request.headers);

        if !request.body.is_empty() {
            upstream_request = upstream_request.body(request.body);
        }

        // Execute the request against the upstream
        let response = upstream_request.send().await?;

        Ok(UpstreamResponse {
            status: response.status(),
            headers: response.headers().clone(),
            body: response.bytes_stream().map_err(RegistryError::from).boxed(),
        })
    }
}

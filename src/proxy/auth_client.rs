// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use reqwest::header::{HeaderValue, AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use url::Url;
use crate::auth::policy::basic_authorization;
use crate::error::error_kind::ErrorKind;
use crate::error::registry::RegistryError;
use crate::proxy::challenge::Challenge;
use crate::proxy::upstream::{Upstream, UpstreamRequest, UpstreamResponse};

/// Lifetime of a token whose response does not say
const DEFAULT_TOKEN_TTL_SECS: i64 = 60;

/// Credentials used to answer the upstream challenges
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: Secret<String>,
}

impl Credentials {
    fn basic(&self) -> String {
        basic_authorization(&self.username, self.password.expose_secret())
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
    expires_in: Option<i64>,
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Upstream transport that answers `WWW-Authenticate` challenges and retries the request once
pub struct AuthClient<U: Upstream> {
    upstream: U,
    credentials: Option<Credentials>,
    tokens: Mutex<HashMap<(String, Option<String>, Option<String>), CachedToken>>,
}

impl<U: Upstream> AuthClient<U> {

    pub fn new(upstream: U, credentials: Option<Credentials>) -> AuthClient<U> {
        AuthClient {
            upstream,
            credentials,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// The `Authorization` value answering the challenge
    async fn authorization(&self, challenge: &Challenge) -> Result<String, RegistryError> {
        match challenge {
            Challenge::Basic { .. } => {
                let credentials = self.credentials.as_ref().ok_or_else(|| {
                    RegistryError::new(ErrorKind::UpstreamAuthFailed)
                        .with_context("upstream asked for basic credentials but none are configured")
                })?;
                Ok(credentials.basic())
            }
            Challenge::Bearer { realm, service, scope } => {
                let token = self.token(realm, service, scope).await?;
                Ok(format!("Bearer {}", token))
            }
        }
    }

    /// A bearer token for the challenge, from the cache when it is still valid
    async fn token(&self, realm: &str, service: &Option<String>, scope: &Option<String>) -> Result<String, RegistryError> {
        let key = (realm.to_string(), service.clone(), scope.clone());

        if let Some(cached) = self.tokens.lock().get(&key) {
            if cached.expires_at > Utc::now() {
                return Ok(cached.token.clone());
            }
        }

        let auth_failed = |context: String| RegistryError::new(ErrorKind::UpstreamAuthFailed).with_context(context);

        let mut url = Url::parse(realm).map_err(|e| auth_failed(format!("invalid token realm {}", realm)).with_error(e.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(service) = service {
                query.append_pair("service", service);
            }
            if let Some(scope) = scope {
                query.append_pair("scope", scope);
            }
        }

        let mut request = UpstreamRequest::get(url);
        if let Some(credentials) = &self.credentials {
            let value = HeaderValue::from_str(&credentials.basic())
                .map_err(|e| auth_failed(String::from("invalid upstream credentials")).with_error(e.to_string()))?;
            request.headers.insert(AUTHORIZATION, value);
        }

        let response = self.upstream.send(request).await
            .map_err(|e| auth_failed(format!("token request to {} failed", realm)).with_error(e.to_string()))?;

        if response.status != StatusCode::OK {
            return Err(auth_failed(format!("token request to {} answered {}", realm, response.status)));
        }

        let body = response.bytes().await?;
        let parsed: TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| auth_failed(format!("invalid token response from {}", realm)).with_error(e.to_string()))?;

        let token = parsed.token
            .or(parsed.access_token)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| auth_failed(format!("token response from {} carries no token", realm)))?;

        let ttl = parsed.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS);
        self.tokens.lock().insert(key, CachedToken {
            token: token.clone(),
            expires_at: Utc::now() + Duration::seconds(ttl),
        });

        Ok(token)
    }
}

#[async_trait]
impl<U: Upstream> Upstream for AuthClient<U> {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, RegistryError> {
        let response = self.upstream.send(request.clone()).await?;

        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let challenge = match response.headers.get(WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
            .and_then(Challenge::parse) {
            Some(challenge) => challenge,
            None => return Ok(response),
        };

        let authorization = match self.authorization(&challenge).await {
            Ok(authorization) => authorization,
            Err(e) => {
                e.log();
                return Ok(response);
            }
        };

        let value = match HeaderValue::from_str(&authorization) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Unusable upstream authorization: {}", e);
                return Ok(response);
            }
        };

        let mut retry = request;
        retry.headers.insert(AUTHORIZATION, value);
        self.upstream.send(retry).await
    }
}

// SPDX-License-Identifier: Apache-2.0
use std::fmt;
use actix_web::{error, HttpResponse};
use actix_web::http::{header, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::log;
use crate::error::error_kind::ErrorKind;

#[derive(Serialize, Deserialize, Clone)]
struct RegistryErrorResponse {
    code: String,
    message: String,
    detail: serde_json::Value,
}

#[derive(Serialize, Deserialize)]
struct ErrorResponse {
    errors: Vec<RegistryErrorResponse>
}

/// An error of the adapter, rendered to the client in the distribution API format
#[derive(Serialize, Deserialize, Clone, PartialEq)]
pub struct RegistryError {
    /// The kind of error
    pub kind: ErrorKind,

    /// General description of the error
    pub message: String,

    /// The original error we might want to log
    pub error: String,

    /// Structured detail returned to the client
    pub detail: serde_json::Value,

    /// Challenge sent back in the WWW-Authenticate header
    realm: String
}

impl fmt::Debug for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "RegistryError {{ kind: ErrorKind::{:#?}, message: {:?}, error: {:?} }}",
            self.kind, self.message, self.error
        )
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?} {}: {}", self.kind, self.message, self.error)
    }
}

impl std::error::Error for RegistryError {}

impl From<ErrorKind> for RegistryError {
    fn from(kind: ErrorKind) -> RegistryError {
        RegistryError::new(kind)
    }
}

/// Converts from serde_json::Error to module error
impl From<serde_json::Error> for RegistryError {
    fn from(e: serde_json::Error) -> RegistryError {
        RegistryError::new(ErrorKind::JSONError)
            .with_context("failed to serialize/deserialize object")
            .with_error(e.to_string())
    }
}

impl From<sqlx::Error> for RegistryError {
    fn from(e: sqlx::Error) -> RegistryError {
        RegistryError::new(ErrorKind::SQLError)
            .with_context("manifest index query failed")
            .with_error(e.to_string())
    }
}

impl From<std::io::Error> for RegistryError {
    fn from(e: std::io::Error) -> RegistryError {
        RegistryError::new(ErrorKind::StorageUnavailable)
            .with_context("storage driver failure")
            .with_error(e.to_string())
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(e: reqwest::Error) -> RegistryError {
        RegistryError::new(ErrorKind::UpstreamUnavailable)
            .with_context("upstream request failed")
            .with_error(e.to_string())
    }
}

impl RegistryError {

    pub fn log(&self) {
        log::error!("{}", self)
    }

    pub fn new(kind: ErrorKind) -> RegistryError {
        RegistryError {
            kind,
            message: Default::default(),
            error: Default::default(),
            detail: serde_json::Value::Null,
            realm: Default::default()
        }
    }

    /// The message sent to the client
    pub fn with_context<S>(mut self, context: S) -> RegistryError
        where
            S: AsRef<str>
    {
        self.message = context.as_ref().to_string();
        self
    }

    /// Add the original error as string to the RegistryError
    pub fn with_error<S>(mut self, error: S) -> RegistryError where S: AsRef<str> {
        self.error = error.as_ref().to_string();
        self
    }

    /// Structured detail for the client, e.g. the manifest reference that was not found
    pub fn with_detail(mut self, detail: serde_json::Value) -> RegistryError {
        self.detail = detail;
        self
    }

    /// The WWW-Authenticate challenge returned along a 401
    pub fn with_realm<S>(mut self, realm: S) -> RegistryError where S: AsRef<str> {
        self.realm = realm.as_ref().to_string();
        self
    }

    /// The HTTP status the error maps to
    pub fn status(&self) -> StatusCode {
        use ErrorKind::*;

        match self.kind {
            RegistryDigestInvalid
            | RegistryManifestInvalid
            | RegistryBlobUploadInvalid
            | RegistryTagInvalid
            | RegistryNameInvalid => StatusCode::BAD_REQUEST,

            RegistryNameUnknown
            | RegistryManifestUnknown
            | RegistryBlobUnknown
            | RegistryBlobUploadUnknown
            | RegistryManifestBlobUnknown
            | NotFound => StatusCode::NOT_FOUND,

            RegistryUnauthorized => StatusCode::UNAUTHORIZED,
            RegistryDenied => StatusCode::FORBIDDEN,
            RegistryUnsupported => StatusCode::METHOD_NOT_ALLOWED,

            UpstreamUnavailable | UpstreamAuthFailed => StatusCode::BAD_GATEWAY,

            StorageUnavailable | JSONError | SQLError | ConfigError | InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The structured detail when set, otherwise the original error
    fn client_detail(&self) -> serde_json::Value {
        match (&self.detail, self.error.is_empty()) {
            (serde_json::Value::Null, true) => serde_json::Value::Null,
            (serde_json::Value::Null, false) => serde_json::Value::String(self.error.clone()),
            (detail, _) => detail.clone(),
        }
    }
}

impl error::ResponseError for RegistryError {

    fn status_code(&self) -> StatusCode {
        self.status()
    }

    /// The distribution API error body, a list holding this single error
    fn error_response(&self) -> HttpResponse {
        let body = ErrorResponse {
            errors: vec![RegistryErrorResponse {
                code: self.kind.code().to_string(),
                message: self.message.clone(),
                detail: self.client_detail(),
            }],
        };

        let mut builder = HttpResponse::build(self.status());
        if self.kind == ErrorKind::RegistryUnauthorized && !self.realm.is_empty() {
            builder.insert_header((header::WWW_AUTHENTICATE, self.realm.clone()));
        }

        builder.json(body)
    }
}

#[cfg(test)]
mod test {
    use actix_web::body::MessageBody;
    use actix_web::http::{header, StatusCode};
    use actix_web::ResponseError;
    use serde_json::json;
    use crate::error::error_kind::ErrorKind;
    use crate::error::registry::RegistryError;

    #[test]
    fn manifest_unknown_body_test() {
        let err = RegistryError::new(ErrorKind::RegistryManifestUnknown)
            .with_context("manifest unknown")
            .with_detail(json!({"reference": "1"}));

        let response = err.error_response();
        assert_eq!(StatusCode::NOT_FOUND, response.status());

        let body = response.into_body().try_into_bytes().expect("body should be in memory");
        let parsed: serde_json::Value = serde_json::from_slice(&body).expect("error body must be json");
        assert_eq!("MANIFEST_UNKNOWN", parsed["errors"][0]["code"]);
        assert_eq!("1", parsed["errors"][0]["detail"]["reference"]);
    }

    #[test]
    fn unauthorized_carries_challenge_test() {
        let err = RegistryError::new(ErrorKind::RegistryUnauthorized)
            .with_realm("Basic realm=\"registry\"");
        let response = err.error_response();
        assert_eq!(StatusCode::UNAUTHORIZED, response.status());
        assert_eq!(
            "Basic realm=\"registry\"",
            response.headers().get(header::WWW_AUTHENTICATE).expect("challenge header").to_str().unwrap()
        );
    }

    #[test]
    fn status_mapping_test() {
        assert_eq!(StatusCode::BAD_REQUEST, RegistryError::new(ErrorKind::RegistryDigestInvalid).status());
        assert_eq!(StatusCode::FORBIDDEN, RegistryError::new(ErrorKind::RegistryDenied).status());
        assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, RegistryError::new(ErrorKind::StorageUnavailable).status());
        assert_eq!(StatusCode::NOT_FOUND, RegistryError::new(ErrorKind::RegistryBlobUnknown).status());
    }
}

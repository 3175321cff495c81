// SPDX-License-Identifier: Apache-2.0
use std::fmt;
use serde::{Deserialize, Serialize};

/// What went wrong, as reported to the client
#[derive(Serialize, Deserialize, Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ErrorKind {

    // Errors of the distribution API
    /// The blob is unknown to the registry
    RegistryBlobUnknown,

    /// The blob upload encountered an error and can no longer proceed.
    RegistryBlobUploadInvalid,

    /// The upload session was closed, or never started
    RegistryBlobUploadUnknown,

    /// Invalid digest, or the content does not hash to the claimed digest
    RegistryDigestInvalid,

    /// A manifest references a blob the registry does not have
    RegistryManifestBlobUnknown,

    /// Invalid Manifest
    RegistryManifestInvalid,

    /// Unknown manifest
    RegistryManifestUnknown,

    /// Invalid container image name
    RegistryNameInvalid,

    /// Unknown container image
    RegistryNameUnknown,

    /// Invalid Tag
    RegistryTagInvalid,

    /// The caller did not authenticate and the scope requires it
    RegistryUnauthorized,

    /// The caller authenticated but lacks the required scope
    RegistryDenied,

    /// The operation is not supported by this registry
    RegistryUnsupported,

    // Errors of the adapter itself
    /// Anything the client cannot act upon
    InternalError,

    /// The byte storage substrate failed
    StorageUnavailable,

    /// The upstream registry could not be reached
    UpstreamUnavailable,

    /// The credential exchange with the upstream registry failed
    UpstreamAuthFailed,

    /// No such route, or nothing to forward it to
    NotFound,

    /// The manifest index failed
    SQLError,

    JSONError,

    /// Invalid or unreadable configuration
    ConfigError,
}

impl ErrorKind {

    /// The error code sent on the wire
    pub fn code(&self) -> &'static str {
        use ErrorKind::*;

        match self {
            RegistryBlobUnknown => "BLOB_UNKNOWN",
            RegistryBlobUploadInvalid => "BLOB_UPLOAD_INVALID",
            RegistryBlobUploadUnknown => "BLOB_UPLOAD_UNKNOWN",
            RegistryDigestInvalid => "DIGEST_INVALID",
            RegistryManifestBlobUnknown => "MANIFEST_BLOB_UNKNOWN",
            RegistryManifestInvalid => "MANIFEST_INVALID",
            RegistryManifestUnknown => "MANIFEST_UNKNOWN",
            RegistryNameInvalid => "NAME_INVALID",
            RegistryNameUnknown => "NAME_UNKNOWN",
            RegistryTagInvalid => "TAG_INVALID",
            RegistryUnauthorized => "UNAUTHORIZED",
            RegistryDenied => "DENIED",
            RegistryUnsupported => "UNSUPPORTED",
            InternalError => "INTERNAL_SERVER_ERROR",
            StorageUnavailable => "STORAGE_UNAVAILABLE",
            UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            UpstreamAuthFailed => "UPSTREAM_AUTH_FAILED",
            NotFound => "NOT_FOUND",
            SQLError => "SQL_ERROR",
            JSONError => "JSON_ERROR",
            ConfigError => "CONFIG_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.code())
    }
}

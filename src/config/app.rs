// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;
use config::{Config, File};
use secrecy::Secret;
use serde::Deserialize;
use url::Url;
use crate::config::db::DBConfig;
use crate::error::error_kind::ErrorKind;
use crate::error::registry::RegistryError;

const CONFIG_FILE_NAME:&str = "config.yaml";

const DEFAULT_PORT:&str = "8080";

const DEFAULT_UPSTREAM_TIMEOUT_SECS:u64 = 15;

/// Configuration for the registry adapter
#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub storage: StorageConfig,

    /// Tag index database, defaults to a sqlite file next to the blobs
    #[serde(default)]
    pub db: Option<DBConfig>,

    /// When present the registry works as a pull-through cache of this upstream
    #[serde(default)]
    pub upstream: Option<UpstreamConfig>,

    /// When present pull/push/overwrite are gated by the configured permissions
    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

impl AppConfig {

    /// Load a specific Application Config
    pub fn load_file(source: &str) -> Result<AppConfig, RegistryError> {
        let config = Config::builder()
            .add_source(File::with_name(source))
            .build()
            .map_err(|e| RegistryError::new(ErrorKind::ConfigError)
                .with_context(format!("Failed to read config file {}", source))
                .with_error(e.to_string()))?;

        config.try_deserialize().map_err(|e| RegistryError::new(ErrorKind::ConfigError)
            .with_context(format!("Failed to parse config file {}", source))
            .with_error(e.to_string()))
    }

    /// Load the default config file: config.yaml
    pub fn load() -> Result<AppConfig, RegistryError> {
        AppConfig::load_file(CONFIG_FILE_NAME)
    }

    /// Whether the AppConfig is valid
    pub fn is_valid(&self) -> bool {

        if self.api.hostname.is_empty() {
            tracing::error!("config.yaml has an empty api->hostname");
            return false;
        }

        if self.storage.folder.is_empty() {
            tracing::error!("config.yaml has an empty storage->folder");
            return false;
        }

        if let Some(upstream) = &self.upstream {
            if upstream.url().is_err() {
                tracing::error!("config.yaml has an invalid upstream: {}://{}", upstream.schema, upstream.registry);
                return false;
            }
        }

        true
    }

    /// The address the server binds to
    pub fn host_port(&self) -> String {
        format!("{}:{}", self.api.hostname, self.api.port.clone().unwrap_or_else(|| String::from(DEFAULT_PORT)))
    }

    /// The database config, a sqlite file inside the storage folder when not configured
    pub fn db(&self) -> DBConfig {
        self.db.clone().unwrap_or_else(|| DBConfig {
            uri: format!("sqlite://{}/index.db?mode=rwc", self.storage.folder.trim_end_matches('/')),
            ..DBConfig::default()
        })
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct StorageConfig {
    pub folder: String,

    /// Upload sessions left open longer than this are closed, one day by default
    #[serde(default = "default_upload_expiry")]
    pub upload_expiry_secs: u64,
}

fn default_upload_expiry() -> u64 {
    24 * 60 * 60
}

impl StorageConfig {
    pub fn upload_expiry(&self) -> Duration {
        Duration::from_secs(self.upload_expiry_secs)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct UpstreamConfig {
    /// Registry host, e.g. registry-1.docker.io
    pub registry: String,

    /// http or https
    pub schema: String,

    /// Optional port, the schema default otherwise
    pub port: Option<u16>,

    /// Credentials used to answer the upstream authentication challenges
    pub username: Option<String>,
    pub password: Option<Secret<String>>,

    /// Timeout of a single upstream request
    pub timeout_secs: Option<u64>,
}

impl UpstreamConfig {
    /// The base URL of the upstream registry
    pub fn url(&self) -> Result<Url, RegistryError> {
        let url = match self.port {
            Some(port) => format!("{}://{}:{}", self.schema, self.registry, port),
            None => format!("{}://{}", self.schema, self.registry),
        };
        Url::parse(&url).map_err(|e| RegistryError::new(ErrorKind::ConfigError)
            .with_context(format!("invalid upstream url {}", url))
            .with_error(e.to_string()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS))
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct AuthConfig {
    /// Realm announced in the Basic challenge
    #[serde(default = "default_realm")]
    pub realm: String,

    /// Permissions granted to callers without credentials, e.g. `repository:*:pull`
    #[serde(default)]
    pub anonymous: Vec<String>,

    #[serde(default)]
    pub users: Vec<UserConfig>,
}

fn default_realm() -> String {
    String::from("registry-adapter")
}

#[derive(Deserialize, Debug, Clone)]
pub struct UserConfig {
    pub name: String,
    pub password: Secret<String>,

    /// Scope patterns: `repository:<name or *>:<pull|push|overwrite|*>`
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ApiConfig {

    /// Hostname this is the exposed hostname of the registry
    pub hostname: String,

    /// The port to listen to
    pub port: Option<String>,

    /// The location of the TLS key file
    pub tls_key: Option<String>,

    /// The location of the TLS cert file
    pub tls_cert: Option<String>
}

// SPDX-License-Identifier: Apache-2.0
use std::str::FromStr;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::{ExposeSecret, Secret};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use crate::auth::basic_challenge;
use crate::auth::scope::{Action, Scope};
use crate::config::app::AuthConfig;
use crate::error::error_kind::ErrorKind;
use crate::error::registry::RegistryError;

/// The caller of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    User(String),
}

/// Decides who the caller is and what it may do
pub trait Policy: Send + Sync {
    /// Establish the principal from the `Authorization` header value
    fn authenticate(&self, authorization: Option<&str>) -> Result<Principal, RegistryError>;

    /// Whether the principal holds the scope
    fn allowed(&self, principal: &Principal, scope: &Scope) -> bool;

    /// Realm announced to anonymous callers
    fn realm(&self) -> &str;
}

/// Policy of a registry without an auth section: everything is allowed
pub struct AllowAll;

impl Policy for AllowAll {
    fn authenticate(&self, _authorization: Option<&str>) -> Result<Principal, RegistryError> {
        Ok(Principal::Anonymous)
    }

    fn allowed(&self, _principal: &Principal, _scope: &Scope) -> bool {
        true
    }

    fn realm(&self) -> &str {
        "registry-adapter"
    }
}

/// A granted scope pattern, None matches anything
#[derive(Debug, Clone, PartialEq)]
struct Permission {
    repo: Option<String>,
    action: Option<Action>,
}

impl Permission {
    fn parse(pattern: &str) -> Result<Permission, RegistryError> {
        let invalid = || RegistryError::new(ErrorKind::ConfigError)
            .with_context("invalid permission pattern")
            .with_error(pattern);

        let rest = pattern.strip_prefix("repository:").ok_or_else(invalid)?;
        let (repo, action) = rest.rsplit_once(':').ok_or_else(invalid)?;

        let repo = match repo {
            "*" => None,
            repo => Some(repo.to_string()),
        };
        let action = match action {
            "*" => None,
            action => Some(Action::from_str(action).map_err(|_| invalid())?),
        };

        Ok(Permission {
            repo,
            action,
        })
    }

    fn grants(&self, scope: &Scope) -> bool {
        let repo = self.repo.as_deref().map_or(true, |repo| repo == scope.repo);
        let action = self.action.map_or(true, |action| action == scope.action);
        repo && action
    }
}

struct User {
    name: String,
    password: Secret<String>,
    permissions: Vec<Permission>,
}

/// Users and permissions from the `auth` section of the config
pub struct ConfigPolicy {
    realm: String,
    anonymous: Vec<Permission>,
    users: Vec<User>,
}

impl ConfigPolicy {
    pub fn new(config: &AuthConfig) -> Result<ConfigPolicy, RegistryError> {
        let anonymous = config.anonymous.iter()
            .map(|pattern| Permission::parse(pattern))
            .collect::<Result<Vec<Permission>, RegistryError>>()?;

        let mut users = Vec::with_capacity(config.users.len());
        for user in &config.users {
            users.push(User {
                name: user.name.clone(),
                password: user.password.clone(),
                permissions: user.permissions.iter()
                    .map(|pattern| Permission::parse(pattern))
                    .collect::<Result<Vec<Permission>, RegistryError>>()?,
            });
        }

        Ok(ConfigPolicy {
            realm: config.realm.clone(),
            anonymous,
            users,
        })
    }

    fn unauthorized(&self, reason: &str) -> RegistryError {
        RegistryError::new(ErrorKind::RegistryUnauthorized)
            .with_context("authentication required")
            .with_error(reason)
            .with_realm(basic_challenge(&self.realm))
    }
}

impl Policy for ConfigPolicy {
    fn authenticate(&self, authorization: Option<&str>) -> Result<Principal, RegistryError> {
        let authorization = match authorization {
            Some(authorization) => authorization,
            None => return Ok(Principal::Anonymous),
        };

        let (name, password) = basic_credentials(authorization)
            .ok_or_else(|| self.unauthorized("unsupported authorization header"))?;

        let user = self.users.iter()
            .find(|user| user.name == name && same_secret(user.password.expose_secret(), &password))
            .ok_or_else(|| {
                tracing::warn!("Rejected credentials for user {}", name);
                self.unauthorized("invalid credentials")
            })?;

        Ok(Principal::User(user.name.clone()))
    }

    fn allowed(&self, principal: &Principal, scope: &Scope) -> bool {
        let permissions = match principal {
            Principal::Anonymous => &self.anonymous,
            Principal::User(name) => match self.users.iter().find(|user| &user.name == name) {
                Some(user) => &user.permissions,
                None => return false,
            },
        };
        permissions.iter().any(|permission| permission.grants(scope))
    }

    fn realm(&self) -> &str {
        &self.realm
    }
}

/// Constant time comparison. Both sides are hashed first so their lengths do not leak either.
fn same_secret(expected: &str, provided: &str) -> bool {
    let expected = Sha256::digest(expected.as_bytes());
    let provided = Sha256::digest(provided.as_bytes());
    expected.as_slice().ct_eq(provided.as_slice()).into()
}

/// Decode `Basic base64(name:password)`
pub fn basic_credentials(authorization: &str) -> Option<(String, String)> {
    let (scheme, encoded) = authorization.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (name, password) = decoded.split_once(':')?;
    Some((name.to_string(), password.to_string()))
}

/// Encode `Basic base64(name:password)`
pub fn basic_authorization(name: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", name, password)))
}

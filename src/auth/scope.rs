// SPDX-License-Identifier: Apache-2.0
use std::fmt;
use std::str::FromStr;
use strum_macros::{Display, EnumString};
use crate::error::error_kind::ErrorKind;
use crate::error::registry::RegistryError;
use crate::registry::repository::RepoName;

/// What a caller wants to do with a repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Action {
    Pull,
    Push,
    /// Rebinding a tag that already points at a manifest
    Overwrite,
}

/// An access requirement on one repository, `repository:<name>:<action>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    pub repo: String,
    pub action: Action,
}

impl Scope {
    pub fn new(repo: &RepoName, action: Action) -> Scope {
        Scope {
            repo: repo.as_str().to_string(),
            action,
        }
    }

    pub fn pull(repo: &RepoName) -> Scope {
        Scope::new(repo, Action::Pull)
    }

    pub fn push(repo: &RepoName) -> Scope {
        Scope::new(repo, Action::Push)
    }

    pub fn overwrite(repo: &RepoName) -> Scope {
        Scope::new(repo, Action::Overwrite)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "repository:{}:{}", self.repo, self.action)
    }
}

impl FromStr for Scope {
    type Err = RegistryError;

    fn from_str(scope: &str) -> Result<Self, Self::Err> {
        let invalid = || RegistryError::new(ErrorKind::ConfigError)
            .with_context("invalid scope")
            .with_error(scope);

        let rest = scope.strip_prefix("repository:").ok_or_else(invalid)?;
        let (repo, action) = rest.rsplit_once(':').ok_or_else(invalid)?;
        let action = Action::from_str(action).map_err(|_| invalid())?;

        Ok(Scope {
            repo: repo.to_string(),
            action,
        })
    }
}

/// The scopes an operation needs, any one of them is enough
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeRequirement {
    Single(Scope),
    AnyOf(Scope, Scope),
}

impl ScopeRequirement {
    pub fn scopes(&self) -> Vec<&Scope> {
        match self {
            ScopeRequirement::Single(scope) => vec![scope],
            ScopeRequirement::AnyOf(first, second) => vec![first, second],
        }
    }
}

impl fmt::Display for ScopeRequirement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScopeRequirement::Single(scope) => write!(f, "{}", scope),
            ScopeRequirement::AnyOf(first, second) => write!(f, "{} or {}", first, second),
        }
    }
}

/// Scope for reading manifests and blobs
pub fn pull_requirement(repo: &RepoName) -> ScopeRequirement {
    ScopeRequirement::Single(Scope::pull(repo))
}

/// Scope for writing content that cannot replace anything: blobs and manifests by digest
pub fn push_requirement(repo: &RepoName) -> ScopeRequirement {
    ScopeRequirement::Single(Scope::push(repo))
}

/// Scope for putting a manifest by tag, given whether the tag is currently bound.
/// A fresh tag (or a repository never seen before) accepts push or overwrite,
/// rebinding an existing tag needs overwrite.
pub fn manifest_put_requirement(repo: &RepoName, tag_exists: bool) -> ScopeRequirement {
    if tag_exists {
        ScopeRequirement::Single(Scope::overwrite(repo))
    } else {
        ScopeRequirement::AnyOf(Scope::push(repo), Scope::overwrite(repo))
    }
}

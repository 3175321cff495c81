// SPDX-License-Identifier: Apache-2.0
use serde_json::json;
use crate::auth::policy::{Policy, Principal};
use crate::auth::scope::ScopeRequirement;
use crate::error::error_kind::ErrorKind;
use crate::error::registry::RegistryError;
use crate::metrics;

pub mod policy;
pub mod scope;

/// The `WWW-Authenticate` value asking for Basic credentials
pub fn basic_challenge(realm: &str) -> String {
    format!("Basic realm=\"{}\"", realm)
}

/// Check that the principal holds at least one of the required scopes.
/// Anonymous callers are asked to authenticate, known ones are denied.
pub fn authorize(policy: &dyn Policy, principal: &Principal, requirement: &ScopeRequirement) -> Result<(), RegistryError> {
    if requirement.scopes().into_iter().any(|scope| policy.allowed(principal, scope)) {
        return Ok(());
    }

    metrics::DENIED_REQUESTS.with_label_values(&[&requirement.to_string()]).inc();
    tracing::info!("{:?} denied {}", principal, requirement);

    let scopes: Vec<String> = requirement.scopes().iter().map(|scope| scope.to_string()).collect();
    match principal {
        Principal::Anonymous => Err(RegistryError::new(ErrorKind::RegistryUnauthorized)
            .with_context("authentication required")
            .with_detail(json!({"scopes": scopes}))
            .with_realm(basic_challenge(policy.realm()))),
        Principal::User(_) => Err(RegistryError::new(ErrorKind::RegistryDenied)
            .with_context("requested access to the resource is denied")
            .with_detail(json!({"scopes": scopes}))),
    }
}

#[cfg(test)]
mod test {
    use secrecy::Secret;
    use crate::auth::authorize;
    use crate::auth::policy::{AllowAll, ConfigPolicy, Principal};
    use crate::auth::scope::manifest_put_requirement;
    use crate::config::app::{AuthConfig, UserConfig};
    use crate::error::error_kind::ErrorKind;
    use crate::registry::repository::RepoName;

    fn policy() -> ConfigPolicy {
        ConfigPolicy::new(&AuthConfig {
            realm: String::from("registry"),
            anonymous: vec![],
            users: vec![UserConfig {
                name: String::from("pusher"),
                password: Secret::new(String::from("secret")),
                permissions: vec![String::from("repository:*:push")],
            }],
        }).expect("policy")
    }

    #[test]
    fn push_only_user_can_create_but_not_rebind_test() {
        let policy = policy();
        let repo = RepoName::parse("my-alpine").expect("name");
        let pusher = Principal::User(String::from("pusher"));

        assert!(authorize(&policy, &pusher, &manifest_put_requirement(&repo, false)).is_ok());

        let err = authorize(&policy, &pusher, &manifest_put_requirement(&repo, true)).expect_err("overwrite needed");
        assert_eq!(ErrorKind::RegistryDenied, err.kind);
    }

    #[test]
    fn anonymous_is_challenged_test() {
        let policy = policy();
        let repo = RepoName::parse("my-alpine").expect("name");

        let err = authorize(&policy, &Principal::Anonymous, &manifest_put_requirement(&repo, false)).expect_err("anonymous");
        assert_eq!(ErrorKind::RegistryUnauthorized, err.kind);
    }

    #[test]
    fn allow_all_test() {
        let repo = RepoName::parse("my-alpine").expect("name");
        assert!(authorize(&AllowAll, &Principal::Anonymous, &manifest_put_requirement(&repo, true)).is_ok());
    }
}

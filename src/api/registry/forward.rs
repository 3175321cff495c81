// SPDX-License-Identifier: Apache-2.0
use actix_web::{
   http::Method, web, HttpRequest, HttpResponse
};
use lazy_static::lazy_static;
use regex::Regex;
use crate::api::registry::{authorize_request, from_upstream};
use crate::api::state::AppState;
use crate::auth::scope::{pull_requirement, Action, Scope, ScopeRequirement};
use crate::error::error_kind::ErrorKind;
use crate::error::registry::RegistryError;
use crate::metrics;
use crate::proxy::upstream::UpstreamRequest;
use crate::registry::repository::RepoName;

lazy_static! {
    static ref REGEX_TAGS_LIST: Regex = Regex::new(r"^/v2/(.+)/tags/list$").unwrap();
}

/// Headers that belong to the hop between the client and this registry
const HOP_HEADERS: [&str; 3] = ["host", "authorization", "connection"];

/// Forward the read only requests this registry does not answer itself to upstream
pub async fn forward(req: HttpRequest,
                     method: Method,
                     state: web::Data<AppState>) -> Result<HttpResponse, RegistryError> {

    // Increase the requests counter
    metrics::INCOMING_REQUESTS.inc();

    // Nothing is ever written upstream
    if method != Method::GET && method != Method::HEAD {
        return Err(RegistryError::new(ErrorKind::RegistryUnsupported)
            .with_context("the operation is unsupported")
            .with_error(format!("{} {}", method, req.path())));
    }

    authorize_request(&req, &state, &forward_requirement(req.path())?)?;

    let upstream = match state.upstream {
        Some(ref upstream) => upstream,
        None => return Err(RegistryError::new(ErrorKind::NotFound)
            .with_context("no such route")
            .with_error(req.path())),
    };

    let query = req.query_string();
    let url = upstream.url(req.path(), if query.is_empty() { None } else { Some(query) });
    let mut upstream_request = UpstreamRequest::new(method, url);

    // Append the client request headers to the upstream request
    for (header_name, header_value) in req.headers().iter().filter(|(h, _)| !HOP_HEADERS.contains(&h.as_str())) {
        upstream_request.headers.append(header_name.clone(), header_value.clone());
    }

    // Logging
    log::info!("Upstream: {} {}", upstream_request.method, upstream_request.url);

    let response = upstream.forward(upstream_request).await?;
    Ok(from_upstream(response))
}

/// Tag lists belong to a repository, anything else (the catalog) needs pull on every repository
fn forward_requirement(path: &str) -> Result<ScopeRequirement, RegistryError> {
    match REGEX_TAGS_LIST.captures(path).and_then(|captures| captures.get(1)) {
        Some(name) => Ok(pull_requirement(&RepoName::parse(name.as_str())?)),
        None => Ok(ScopeRequirement::Single(Scope {
            repo: String::from("*"),
            action: Action::Pull,
        })),
    }
}

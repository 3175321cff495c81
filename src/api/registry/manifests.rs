// SPDX-License-Identifier: Apache-2.0
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web::http::header::{self, Accept, Header as _};
use serde_json::json;
use crate::api::registry::{accept_values, authorize_request, header_value, RepositoryRequest, DOCKER_CONTENT_DIGEST};
use crate::api::state::AppState;
use crate::auth::scope::{manifest_put_requirement, pull_requirement, push_requirement};
use crate::error::error_kind::ErrorKind;
use crate::error::registry::RegistryError;
use crate::metrics;
use crate::models::commands::RegistryCommand;
use crate::proxy::registry::UpstreamRegistry;
use crate::registry::manifest::Manifest;
use crate::registry::reference::ManifestRef;
use crate::registry::repository::RepoName;

/// Handle the manifest HEAD and GET requests
pub async fn get_manifests(manifest_request: web::Path<RepositoryRequest>,
                           req: HttpRequest,
                           state: web::Data<AppState>) -> Result<HttpResponse, RegistryError> {

    // Increase the requests counter
    metrics::INCOMING_REQUESTS.inc();

    // Validate before anything is read
    let name = manifest_request.repository()?;
    let reference = ManifestRef::parse(&manifest_request.reference)?;

    authorize_request(&req, &state, &pull_requirement(&name))?;

    let accept = accept_values(&req);
    let manifest = match state.upstream {
        Some(ref upstream) => pull_through(upstream, &name, &reference, &accept, &state).await?,
        None => state.manifests.get(&name, &reference).await?,
    };

    let manifest = manifest.ok_or_else(|| RegistryError::new(ErrorKind::RegistryManifestUnknown)
        .with_context("manifest unknown")
        .with_detail(json!({"reference": reference.to_string()})))?;

    let ranges = Accept::parse(&req).unwrap_or_else(|_| Accept(Vec::new()));
    let content_type = manifest.negotiate(&ranges);
    let digest = manifest.digest().to_string();

    tracing::debug!("Serving {}:{} as {}", name, reference, content_type);
    metrics::RESPONSE_CODE_COLLECTOR.with_label_values(&["200", "manifest"]).inc();

    // actix drops the body of HEAD responses and keeps its Content-Length
    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, header_value(content_type)?))
        .insert_header((DOCKER_CONTENT_DIGEST, header_value(&digest)?))
        .insert_header((header::ETAG, header_value(&format!("\"{}\"", digest))?))
        .body(manifest.content().clone()))
}

/// Store a manifest under a tag or its digest
pub async fn put_manifest(manifest_request: web::Path<RepositoryRequest>,
                          req: HttpRequest,
                          payload: web::Payload,
                          state: web::Data<AppState>) -> Result<HttpResponse, RegistryError> {

    metrics::INCOMING_REQUESTS.inc();

    let name = manifest_request.repository()?;
    let reference = ManifestRef::parse(&manifest_request.reference)?;

    // The scope depends on what the tag points to right now, not on the new content
    let requirement = match reference {
        ManifestRef::Tag(_) => manifest_put_requirement(&name, state.manifests.exists(&name, &reference).await?),
        ManifestRef::Digest(_) => push_requirement(&name),
    };
    authorize_request(&req, &state, &requirement)?;

    let content_type = req.headers().get(header::CONTENT_TYPE).and_then(|value| value.to_str().ok());
    let manifest = state.manifests.put(&name, &reference, payload, content_type).await?;

    tracing::info!("Stored manifest {}:{} -> {}", name, reference, manifest.digest());
    metrics::RESPONSE_CODE_COLLECTOR.with_label_values(&["201", "manifest"]).inc();

    Ok(HttpResponse::Created()
        .insert_header((header::LOCATION, header_value(&format!("/v2/{}/manifests/{}", name, reference))?))
        .insert_header((DOCKER_CONTENT_DIGEST, header_value(&manifest.digest().to_string())?))
        .finish())
}

/// Resolve a manifest when the registry caches an upstream.
/// Tags move, so they are asked upstream first and the cached copy is the fallback.
/// Digests never change, the cache answers them whenever it can.
async fn pull_through(upstream: &UpstreamRegistry,
                      name: &RepoName,
                      reference: &ManifestRef,
                      accept: &[String],
                      state: &AppState) -> Result<Option<Manifest>, RegistryError> {

    if let ManifestRef::Digest(_) = reference {
        if let Some(manifest) = state.manifests.get(name, reference).await? {
            metrics::CACHED_RESPONSES.inc();
            return Ok(Some(manifest));
        }
    }

    match upstream.manifest(name, reference, accept).await {
        Ok(Some(manifest)) => {
            state.command_bus.publish(RegistryCommand::CacheManifest(name.clone(), reference.clone(), manifest.clone())).await;
            Ok(Some(manifest))
        }
        Ok(None) => {
            // pushed content is served even when upstream does not know it
            state.manifests.get(name, reference).await
        }
        Err(e) if e.kind == ErrorKind::UpstreamUnavailable => {
            tracing::warn!("Upstream unavailable, serving {}:{} from cache: {}", name, reference, e);
            let cached = state.manifests.get(name, reference).await?;
            if cached.is_some() {
                metrics::CACHED_RESPONSES.inc();
            }
            Ok(cached)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::time::Duration;
    use actix_web::{App, test, web};
    use actix_web::http::{header, StatusCode};
    use bytes::Bytes;
    use reqwest::StatusCode as UpstreamStatus;
    use serde_json::json;
    use url::Url;
    use crate::api::registry::test::{login, open_state, response_header, restricted_policy, state};
    use crate::api::routes;
    use crate::proxy::auth_client::test::FakeUpstream;
    use crate::proxy::registry::UpstreamRegistry;
    use crate::registry::digest::Digest;
    use crate::registry::manifest::{DOCKER_MANIFEST_V2, OCI_MANIFEST};
    use crate::registry::manifest::test::image;
    use crate::registry::reference::ManifestRef;
    use crate::registry::repository::RepoName;
    use crate::services::manifests::test::image_manifest;

    fn error_code(body: &serde_json::Value) -> &str {
        body["errors"][0]["code"].as_str().expect("code")
    }

    #[actix_web::test]
    async fn head_unknown_manifest_test() {
        let folder = tempfile::tempdir().expect("temp dir");
        let app = test::init_service(App::new()
            .app_data(web::Data::new(open_state(&folder).await))
            .configure(routes::app_config)).await;

        let response = test::call_service(&app, test::TestRequest::default()
            .method(actix_web::http::Method::HEAD)
            .uri("/v2/my-alpine/manifests/1")
            .to_request()).await;
        assert_eq!(StatusCode::NOT_FOUND, response.status());

        let body: serde_json::Value = test::read_body_json(response).await;
        assert_eq!("MANIFEST_UNKNOWN", error_code(&body));
        assert_eq!(json!({"reference": "1"}), body["errors"][0]["detail"]);
    }

    #[actix_web::test]
    async fn put_then_get_test() {
        let folder = tempfile::tempdir().expect("temp dir");
        let state = open_state(&folder).await;
        let content = image_manifest(&state.blobs, "alpine").await;
        let digest = Digest::compute(&content);
        let app = test::init_service(App::new()
            .app_data(web::Data::new(state))
            .configure(routes::app_config)).await;

        let response = test::call_service(&app, test::TestRequest::put()
            .uri("/v2/my-alpine/manifests/1")
            .insert_header((header::CONTENT_TYPE, DOCKER_MANIFEST_V2))
            .set_payload(content.clone())
            .to_request()).await;
        assert_eq!(StatusCode::CREATED, response.status());
        assert_eq!("/v2/my-alpine/manifests/1", response_header(&response, "location"));
        assert_eq!(digest.to_string(), response_header(&response, "docker-content-digest"));

        // by tag
        let response = test::call_service(&app, test::TestRequest::get().uri("/v2/my-alpine/manifests/1").to_request()).await;
        assert_eq!(StatusCode::OK, response.status());
        assert_eq!(digest.to_string(), response_header(&response, "docker-content-digest"));
        assert_eq!(DOCKER_MANIFEST_V2, response_header(&response, "content-type"));
        assert_eq!(content, test::read_body(response).await);

        // by digest
        let uri = format!("/v2/my-alpine/manifests/{}", digest);
        let response = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
        assert_eq!(StatusCode::OK, response.status());
        assert_eq!(content, test::read_body(response).await);

        // head
        let response = test::call_service(&app, test::TestRequest::default()
            .method(actix_web::http::Method::HEAD)
            .uri("/v2/my-alpine/manifests/1")
            .to_request()).await;
        assert_eq!(StatusCode::OK, response.status());
        assert_eq!(digest.to_string(), response_header(&response, "docker-content-digest"));
    }

    #[actix_web::test]
    async fn nested_name_test() {
        let folder = tempfile::tempdir().expect("temp dir");
        let state = open_state(&folder).await;
        let content = image_manifest(&state.blobs, "nested").await;
        let app = test::init_service(App::new()
            .app_data(web::Data::new(state))
            .configure(routes::app_config)).await;

        let response = test::call_service(&app, test::TestRequest::put()
            .uri("/v2/team/tools/alpine/manifests/3.19")
            .set_payload(content.clone())
            .to_request()).await;
        assert_eq!(StatusCode::CREATED, response.status());

        let response = test::call_service(&app, test::TestRequest::get().uri("/v2/team/tools/alpine/manifests/3.19").to_request()).await;
        assert_eq!(StatusCode::OK, response.status());
        assert_eq!(content, test::read_body(response).await);
    }

    #[actix_web::test]
    async fn put_digest_mismatch_test() {
        let folder = tempfile::tempdir().expect("temp dir");
        let state = open_state(&folder).await;
        let content = image_manifest(&state.blobs, "alpine").await;
        let app = test::init_service(App::new()
            .app_data(web::Data::new(state))
            .configure(routes::app_config)).await;

        let uri = format!("/v2/my-alpine/manifests/{}", Digest::compute(b"something else"));
        let response = test::call_service(&app, test::TestRequest::put().uri(&uri).set_payload(content).to_request()).await;
        assert_eq!(StatusCode::BAD_REQUEST, response.status());

        let body: serde_json::Value = test::read_body_json(response).await;
        assert_eq!("DIGEST_INVALID", error_code(&body));
    }

    #[actix_web::test]
    async fn put_empty_object_test() {
        let folder = tempfile::tempdir().expect("temp dir");
        let app = test::init_service(App::new()
            .app_data(web::Data::new(open_state(&folder).await))
            .configure(routes::app_config)).await;

        let response = test::call_service(&app, test::TestRequest::put()
            .uri("/v2/my-alpine/manifests/latest")
            .insert_header((header::CONTENT_TYPE, DOCKER_MANIFEST_V2))
            .set_payload(Bytes::from_static(b"{}"))
            .to_request()).await;
        assert_eq!(StatusCode::BAD_REQUEST, response.status());

        let body: serde_json::Value = test::read_body_json(response).await;
        assert_eq!("MANIFEST_INVALID", error_code(&body));

        let response = test::call_service(&app, test::TestRequest::get().uri("/v2/my-alpine/manifests/latest").to_request()).await;
        assert_eq!(StatusCode::NOT_FOUND, response.status());
    }

    #[actix_web::test]
    async fn invalid_name_test() {
        let folder = tempfile::tempdir().expect("temp dir");
        let app = test::init_service(App::new()
            .app_data(web::Data::new(open_state(&folder).await))
            .configure(routes::app_config)).await;

        let response = test::call_service(&app, test::TestRequest::get().uri("/v2/My-Alpine/manifests/latest").to_request()).await;
        assert_eq!(StatusCode::BAD_REQUEST, response.status());

        let body: serde_json::Value = test::read_body_json(response).await;
        assert_eq!("NAME_INVALID", error_code(&body));
    }

    #[actix_web::test]
    async fn negotiate_test() {
        let folder = tempfile::tempdir().expect("temp dir");
        let state = open_state(&folder).await;
        let config = state.blobs.put_bytes(Bytes::from_static(b"oci config")).await.expect("config");
        let content = image(OCI_MANIFEST, &config, &[]);
        let app = test::init_service(App::new()
            .app_data(web::Data::new(state))
            .configure(routes::app_config)).await;

        let response = test::call_service(&app, test::TestRequest::put()
            .uri("/v2/my-alpine/manifests/oci")
            .set_payload(content)
            .to_request()).await;
        assert_eq!(StatusCode::CREATED, response.status());

        let response = test::call_service(&app, test::TestRequest::get()
            .uri("/v2/my-alpine/manifests/oci")
            .insert_header((header::ACCEPT, format!("{};q=0.5, {}", DOCKER_MANIFEST_V2, OCI_MANIFEST)))
            .to_request()).await;
        assert_eq!(OCI_MANIFEST, response_header(&response, "content-type"));
    }

    #[actix_web::test]
    async fn scopes_test() {
        let folder = tempfile::tempdir().expect("temp dir");
        let state = state(&folder, restricted_policy(), None).await;
        let first = image_manifest(&state.blobs, "first").await;
        let second = image_manifest(&state.blobs, "second").await;
        let app = test::init_service(App::new()
            .app_data(web::Data::new(state))
            .configure(routes::app_config)).await;

        // anonymous callers must authenticate to push
        let response = test::call_service(&app, test::TestRequest::put()
            .uri("/v2/team/app/manifests/v1")
            .set_payload(first.clone())
            .to_request()).await;
        assert_eq!(StatusCode::UNAUTHORIZED, response.status());
        assert_eq!("Basic realm=\"registry\"", response_header(&response, "www-authenticate"));

        // a new tag only needs push
        let response = test::call_service(&app, test::TestRequest::put()
            .uri("/v2/team/app/manifests/v1")
            .insert_header(login("pusher"))
            .set_payload(first.clone())
            .to_request()).await;
        assert_eq!(StatusCode::CREATED, response.status());

        // moving it needs overwrite
        let response = test::call_service(&app, test::TestRequest::put()
            .uri("/v2/team/app/manifests/v1")
            .insert_header(login("pusher"))
            .set_payload(second.clone())
            .to_request()).await;
        assert_eq!(StatusCode::FORBIDDEN, response.status());
        let body: serde_json::Value = test::read_body_json(response).await;
        assert_eq!("DENIED", error_code(&body));

        let response = test::call_service(&app, test::TestRequest::put()
            .uri("/v2/team/app/manifests/v1")
            .insert_header(login("admin"))
            .set_payload(second.clone())
            .to_request()).await;
        assert_eq!(StatusCode::CREATED, response.status());

        // anonymous pulls only what they were granted
        let response = test::call_service(&app, test::TestRequest::get().uri("/v2/team/app/manifests/v1").to_request()).await;
        assert_eq!(StatusCode::UNAUTHORIZED, response.status());

        let response = test::call_service(&app, test::TestRequest::get()
            .uri("/v2/team/app/manifests/v1")
            .insert_header(login("pusher"))
            .to_request()).await;
        assert_eq!(StatusCode::OK, response.status());
        assert_eq!(second, test::read_body(response).await);
    }

    #[actix_web::test]
    async fn pull_through_test() {
        let content = image(DOCKER_MANIFEST_V2, &Digest::compute(b"remote config"), &[]);
        let served = content.clone();
        let upstream = FakeUpstream::new(move |request| {
            if request.url.path() == "/v2/library/alpine/manifests/latest" {
                (UpstreamStatus::OK, vec![("content-type", String::from(DOCKER_MANIFEST_V2))], served.clone())
            } else {
                (UpstreamStatus::NOT_FOUND, vec![], Bytes::new())
            }
        });
        let registry = UpstreamRegistry::new(Arc::new(upstream), Url::parse("https://registry.example").expect("url"));

        let folder = tempfile::tempdir().expect("temp dir");
        let state = state(&folder, Arc::new(crate::auth::policy::AllowAll), Some(Arc::new(registry))).await;
        let manifests = state.manifests.clone();
        let app = test::init_service(App::new()
            .app_data(web::Data::new(state))
            .configure(routes::app_config)).await;

        let response = test::call_service(&app, test::TestRequest::get().uri("/v2/library/alpine/manifests/latest").to_request()).await;
        assert_eq!(StatusCode::OK, response.status());
        assert_eq!(Digest::compute(&content).to_string(), response_header(&response, "docker-content-digest"));
        assert_eq!(content, test::read_body(response).await);

        let response = test::call_service(&app, test::TestRequest::get().uri("/v2/library/alpine/manifests/missing").to_request()).await;
        assert_eq!(StatusCode::NOT_FOUND, response.status());

        // the copy lands in the cache in the background
        let name = RepoName::parse("library/alpine").expect("name");
        let tag = ManifestRef::parse("latest").expect("tag");
        let mut cached = None;
        for _ in 0..100 {
            cached = manifests.get(&name, &tag).await.expect("get");
            if cached.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(content, cached.expect("cached").content().clone());
    }

    #[actix_web::test]
    async fn upstream_down_serves_cache_test() {
        let upstream = FakeUpstream::new(|_| (UpstreamStatus::SERVICE_UNAVAILABLE, vec![], Bytes::new()));
        let registry = UpstreamRegistry::new(Arc::new(upstream), Url::parse("https://registry.example").expect("url"));

        let folder = tempfile::tempdir().expect("temp dir");
        let state = state(&folder, Arc::new(crate::auth::policy::AllowAll), Some(Arc::new(registry))).await;
        let content = image_manifest(&state.blobs, "cached").await;
        state.manifests.put(
            &RepoName::parse("library/alpine").expect("name"),
            &ManifestRef::parse("latest").expect("tag"),
            futures::stream::once(async { Ok::<Bytes, std::convert::Infallible>(content.clone()) }),
            None,
        ).await.expect("stored");
        let app = test::init_service(App::new()
            .app_data(web::Data::new(state))
            .configure(routes::app_config)).await;

        let response = test::call_service(&app, test::TestRequest::get().uri("/v2/library/alpine/manifests/latest").to_request()).await;
        assert_eq!(StatusCode::OK, response.status());
        assert_eq!(content, test::read_body(response).await);

        // nothing cached, nothing to fall back to
        let response = test::call_service(&app, test::TestRequest::get().uri("/v2/library/alpine/manifests/edge").to_request()).await;
        assert_eq!(StatusCode::NOT_FOUND, response.status());
    }
}

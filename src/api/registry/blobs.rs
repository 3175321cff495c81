// SPDX-License-Identifier: Apache-2.0
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web::body::SizedStream;
use actix_web::http::header;
use futures_util::StreamExt as _;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use crate::api::registry::{authorize_request, from_upstream, header_value, RepositoryRequest, DOCKER_CONTENT_DIGEST};
use crate::api::state::AppState;
use crate::auth::scope::pull_requirement;
use crate::error::error_kind::ErrorKind;
use crate::error::registry::RegistryError;
use crate::metrics;
use crate::models::commands::RegistryCommand;
use crate::proxy::upstream::UpstreamResponse;
use crate::registry::digest::Digest;

/// Serve a blob from storage, or from the upstream registry while caching it
pub async fn get_blob(blob_request: web::Path<RepositoryRequest>,
                      req: HttpRequest,
                      state: web::Data<AppState>) -> Result<HttpResponse, RegistryError> {

    // Increase the requests counter
    metrics::INCOMING_REQUESTS.inc();

    let name = blob_request.repository()?;
    let digest = Digest::parse(&blob_request.reference)?;

    authorize_request(&req, &state, &pull_requirement(&name))?;

    // Local copy first: blobs never change
    if let Some(size) = state.blobs.size(&digest).await? {
        let stream = state.blobs.get(&digest).await?;

        metrics::CACHED_RESPONSES.inc();
        metrics::RESPONSE_CODE_COLLECTOR.with_label_values(&["200", "blob"]).inc();
        log::info!("*** Cached: {} {}", req.method(), req.uri());

        return Ok(HttpResponse::Ok()
            .insert_header((header::CONTENT_TYPE, "application/octet-stream"))
            .insert_header((DOCKER_CONTENT_DIGEST, header_value(&digest.to_string())?))
            .insert_header((header::ETAG, header_value(&format!("\"{}\"", digest))?))
            .body(SizedStream::new(size, stream)));
    }

    let upstream = match state.upstream {
        Some(ref upstream) => upstream,
        None => return Err(blob_unknown(&digest)),
    };

    match upstream.blob(&name, &digest).await? {
        Some(response) => {
            log::info!("Upstream: {} {}", req.method(), req.uri());
            Ok(from_upstream(tee(response, digest, &state).await))
        }
        None => Err(blob_unknown(&digest)),
    }
}

fn blob_unknown(digest: &Digest) -> RegistryError {
    RegistryError::new(ErrorKind::RegistryBlobUnknown)
        .with_context("blob unknown to registry")
        .with_detail(json!({"digest": digest.to_string()}))
}

/// Split the upstream body in two: the client response and the cache.
/// The copy keeps going when the client goes away, so the cache is filled anyway.
async fn tee(response: UpstreamResponse, digest: Digest, state: &AppState) -> UpstreamResponse {
    let UpstreamResponse { status, headers, body } = response;

    // Create the client response channel
    let (response_tx, response_rx) = mpsc::channel(16);

    // Create the persistence channel and ask the bus to store the data
    let (persist_tx, persist_rx) = mpsc::unbounded_channel();
    state.command_bus.publish(RegistryCommand::CacheBlob(digest.clone(), persist_rx)).await;

    tokio::spawn(async move {
        let mut body = body;
        let mut client = Some(response_tx);

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(chunk) => {
                    if let Err(e) = persist_tx.send(chunk.clone()) {
                        tracing::error!("Failed to send blob chunk for persistence: {}", e);
                    }
                    if let Some(ref sender) = client {
                        if sender.send(Ok(chunk)).await.is_err() {
                            tracing::debug!("Client left, still caching {}", digest);
                            client = None;
                        }
                    }
                }
                Err(e) => {
                    // dropping the persist sender early makes the cached copy fail verification
                    tracing::error!("Upstream transfer of {} failed: {}", digest, e);
                    if let Some(sender) = client {
                        let _ = sender.send(Err(e)).await;
                    }
                    return;
                }
            }
        }
    });

    UpstreamResponse {
        status,
        headers,
        body: ReceiverStream::new(response_rx).boxed(),
    }
}

// SPDX-License-Identifier: Apache-2.0
use std::{fs::File, io::BufReader};
use std::sync::Arc;
use std::time::Duration;
use actix_web::{App, HttpServer, middleware, web};
use actix_web::http::KeepAlive;
use actix_web::middleware::{Logger, TrailingSlash};
use reqwest::ClientBuilder;
use rustls::{Certificate, PrivateKey, ServerConfig};
use rustls_pemfile::{certs, pkcs8_private_keys};
use tracing::log;
use crate::api::routes;
use crate::api::metrics::metrics_handler;
use crate::api::state::AppState;
use crate::auth::policy::{AllowAll, ConfigPolicy, Policy};
use crate::config::app::AppConfig;
use crate::error::error_kind::ErrorKind;
use crate::error::registry::RegistryError;
use crate::metrics::register_metrics;
use crate::proxy::auth_client::{AuthClient, Credentials};
use crate::proxy::registry::UpstreamRegistry;
use crate::proxy::upstream::ReqwestUpstream;
use crate::pubsub::command_bus::CommandBus;
use crate::services::manifests::ManifestService;
use crate::storage::blobs::BlobStore;

pub async fn start(config: AppConfig,
                   command_bus: Arc<CommandBus>,
                   blobs: BlobStore,
                   manifests: Arc<ManifestService>) -> Result<(), RegistryError> {

    // Tls config
    let tls_config = load_tls(&config)?;

    // Who may do what
    let policy = access_policy(&config)?;

    // Pull-through cache
    let upstream = upstream_registry(&config)?;

    // Host and port
    let host_port = config.host_port();

    // Application state
    let state = web::Data::new(AppState::new(blobs, manifests, policy, upstream, command_bus.clone()));

    log::info!("starting HTTP server at {}://{}", if tls_config.is_some() { "https" } else { "http" }, host_port);

    // Prometheus
    if let Err(e) = register_metrics() {
        log::warn!("Failed to register the metrics: {}", e);
    }

    // Create the actix web server
    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::NormalizePath::new(TrailingSlash::MergeOnly))
            .wrap(middleware::Compress::default())
            .wrap(Logger::default())
            .service(metrics_handler)
            // Container Registry Scope
            .configure(routes::app_config)
    }).keep_alive(KeepAlive::Timeout(Duration::from_secs(75)));

    let bind_error = |e: std::io::Error| RegistryError::new(ErrorKind::ConfigError)
        .with_context(format!("failed to bind {}", host_port))
        .with_error(e.to_string());

    let server = if let Some(tls) = tls_config {
        server.bind_rustls_021(host_port.clone(), tls).map_err(bind_error)?
            .run()
    } else {
        server.bind(host_port.clone()).map_err(bind_error)?
            .run()
    };

    // Listen for the HTTP requests
    if let Err(e) = server.await {
        log::error!("HTTP server stopped with error: {}", e);
    }

    // What was fetched so far is still persisted
    tracing::info!("Shutting down persistence bus...");
    command_bus.shutdown().await;

    Ok(())
}

fn access_policy(config: &AppConfig) -> Result<Arc<dyn Policy>, RegistryError> {
    match config.auth {
        Some(ref auth) => {
            log::info!("access control enabled for {} users", auth.users.len());
            Ok(Arc::new(ConfigPolicy::new(auth)?))
        }
        None => {
            log::warn!("no auth section: every caller may pull, push and overwrite");
            Ok(Arc::new(AllowAll))
        }
    }
}

fn upstream_registry(config: &AppConfig) -> Result<Option<Arc<UpstreamRegistry>>, RegistryError> {
    let upstream = match config.upstream {
        Some(ref upstream) => upstream,
        None => return Ok(None),
    };

    // TODO: allow to pass a proxy configuration to the upstream client
    // Http client for the upstream requests
    let client = ClientBuilder::new()
        .timeout(upstream.timeout())
        .connect_timeout(Duration::from_secs(5))
        .tcp_nodelay(true)
        .build()
        .map_err(|e| RegistryError::new(ErrorKind::ConfigError)
            .with_context("failed to create the upstream http client")
            .with_error(e.to_string()))?;

    let credentials = match (&upstream.username, &upstream.password) {
        (Some(username), Some(password)) => Some(Credentials {
            username: username.clone(),
            password: password.clone(),
        }),
        _ => None,
    };

    let base = upstream.url()?;
    log::info!("pull-through cache of {}", base);

    let client = AuthClient::new(ReqwestUpstream::new(client), credentials);
    Ok(Some(Arc::new(UpstreamRegistry::new(Arc::new(client), base))))
}

fn load_tls(config: &AppConfig) -> Result<Option<ServerConfig>, RegistryError> {

    let (cert_file_path, key_file_path) = match (&config.api.tls_cert, &config.api.tls_key) {
        (Some(cert), Some(key)) => (cert, key),
        _ => return Ok(None),
    };

    let tls_error = |context: String, e: String| RegistryError::new(ErrorKind::ConfigError)
        .with_context(context)
        .with_error(e);

    // load TLS key/cert files
    let cert_file = &mut BufReader::new(File::open(cert_file_path)
        .map_err(|e| tls_error(format!("failed to open certificate file {}", cert_file_path), e.to_string()))?);
    let key_file = &mut BufReader::new(File::open(key_file_path)
        .map_err(|e| tls_error(format!("failed to open certificate private key file {}", key_file_path), e.to_string()))?);

    // convert files to key/cert objects
    let cert_chain = certs(cert_file)
        .map_err(|e| tls_error(format!("invalid certificate file {}", cert_file_path), e.to_string()))?
        .into_iter()
        .map(Certificate)
        .collect();
    let mut keys: Vec<PrivateKey> = pkcs8_private_keys(key_file)
        .map_err(|e| tls_error(format!("invalid private key file {}", key_file_path), e.to_string()))?
        .into_iter()
        .map(PrivateKey)
        .collect();

    if keys.is_empty() {
        return Err(tls_error(format!("no PKCS 8 private key in {}", key_file_path), String::new()));
    }

    // init server config builder with safe defaults
    let server_config = ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(cert_chain, keys.remove(0))
        .map_err(|e| tls_error(String::from("invalid TLS certificate or key"), e.to_string()))?;

    Ok(Some(server_config))
}

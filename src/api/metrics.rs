// SPDX-License-Identifier: Apache-2.0
use actix_web::{get, HttpResponse};
use actix_web::http::header;
use prometheus::{Encoder, TextEncoder};
use crate::error::error_kind::ErrorKind;
use crate::error::registry::RegistryError;

/// Prometheus scrape endpoint
#[get("/metrics")]
pub(crate) async fn metrics_handler() -> Result<HttpResponse, RegistryError> {

    let encoder = TextEncoder::new();

    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer).map_err(|e| RegistryError::new(ErrorKind::InternalError)
        .with_context("could not encode prometheus metrics")
        .with_error(e.to_string()))?;

    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, encoder.format_type().to_string()))
        .body(buffer))
}

#[cfg(test)]
mod test {
    use actix_web::{App, test};
    use actix_web::http::StatusCode;
    use super::metrics_handler;

    #[actix_web::test]
    async fn metrics_test() {
        crate::metrics::INCOMING_REQUESTS.inc();
        let _ = crate::metrics::register_metrics();

        let app = test::init_service(App::new().service(metrics_handler)).await;
        let response = test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
        assert_eq!(StatusCode::OK, response.status());

        let body = test::read_body(response).await;
        assert!(String::from_utf8_lossy(&body).contains("incoming_requests"));
    }
}

// SPDX-License-Identifier: Apache-2.0
use actix_web::{HttpRequest, HttpResponse, web};
use actix_web::http::header;
use serde_json::json;
use crate::api::registry::DOCKER_API_VERSION;
use crate::api::state::AppState;
use crate::error::registry::RegistryError;

/// Version check: the registry speaks the v2 API.
/// Credentials, when sent, must be valid.
pub async fn api_version(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, RegistryError> {
    let authorization = req.headers().get(header::AUTHORIZATION).and_then(|value| value.to_str().ok());
    state.policy.authenticate(authorization)?;

    Ok(HttpResponse::Ok()
        .insert_header((DOCKER_API_VERSION, "registry/2.0"))
        .json(json!({})))
}

#[cfg(test)]
mod test {
    use actix_web::{App, test, web};
    use actix_web::http::StatusCode;
    use serde_json::json;
    use crate::api::registry::test::{login, open_state, response_header, restricted_policy, state};
    use crate::api::routes;

    #[actix_web::test]
    async fn api_version_test() {
        let folder = tempfile::tempdir().expect("temp dir");
        let app = test::init_service(App::new()
            .app_data(web::Data::new(open_state(&folder).await))
            .configure(routes::app_config)).await;

        let response = test::call_service(&app, test::TestRequest::get().uri("/v2/").to_request()).await;
        assert_eq!(StatusCode::OK, response.status());
        assert_eq!("registry/2.0", response_header(&response, "docker-distribution-api-version"));

        let body: serde_json::Value = test::read_body_json(response).await;
        assert_eq!(json!({}), body);
    }

    #[actix_web::test]
    async fn api_version_rejects_bad_credentials_test() {
        let folder = tempfile::tempdir().expect("temp dir");
        let app = test::init_service(App::new()
            .app_data(web::Data::new(state(&folder, restricted_policy(), None).await))
            .configure(routes::app_config)).await;

        let response = test::call_service(&app, test::TestRequest::get()
            .uri("/v2/")
            .insert_header((actix_web::http::header::AUTHORIZATION, crate::auth::policy::basic_authorization("admin", "wrong")))
            .to_request()).await;
        assert_eq!(StatusCode::UNAUTHORIZED, response.status());
        assert_eq!("Basic realm=\"registry\"", response_header(&response, "www-authenticate"));

        let response = test::call_service(&app, test::TestRequest::get().uri("/v2/").insert_header(login("admin")).to_request()).await;
        assert_eq!(StatusCode::OK, response.status());
    }
}

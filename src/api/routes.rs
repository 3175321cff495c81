// SPDX-License-Identifier: Apache-2.0
use actix_web::web;
use crate::api::registry::base::api_version;
use crate::api::registry::blobs::get_blob;
use crate::api::registry::forward::forward;
use crate::api::registry::manifests::{get_manifests, put_manifest};
use crate::api::registry::uploads::{complete_upload, start_upload};

/// The registry API rooted at /v2
pub fn app_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/v2").configure(registry_api_config));
}

pub fn registry_api_config(cfg: &mut web::ServiceConfig) {
    // ---------------------------------------------------------------------------------------------
    // Version check
    cfg.service(
        web::resource(["", "/"])
            .route(web::get().to(api_version))
    );
    // ---------------------------------------------------------------------------------------------
    // Manifests
    cfg.service(
        web::resource("/{name:((?:[^/]*/)*)(.*)}/manifests/{reference}")
            // check the existence of a manifest
            .route(web::head().to(get_manifests))

            // get a manifest
            .route(web::get().to(get_manifests))

            // push a manifest
            .route(web::put().to(put_manifest))
    );
    // ---------------------------------------------------------------------------------------------
    // Uploads
    cfg.service(
        web::resource("/{name:((?:[^/]*/)*)(.*)}/blobs/uploads/")
            .route(web::post().to(start_upload))
    );
    cfg.service(
        web::resource("/{name:((?:[^/]*/)*)(.*)}/blobs/uploads/{uuid}")
            .route(web::put().to(complete_upload))
    );
    // ---------------------------------------------------------------------------------------------
    // BLOBS
    cfg.service(
        web::resource("/{name:((?:[^/]*/)*)(.*)}/blobs/{reference}")
            // retrieve a blob
            .route(web::get().to(get_blob))

            // check the existence of a blob
            .route(web::head().to(get_blob))

        // Forward everything else
    ).default_service(web::to(forward));
}

// SPDX-License-Identifier: Apache-2.0
use lazy_static::lazy_static;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts,
};

lazy_static! {

    pub static ref INCOMING_REQUESTS: IntCounter =
        IntCounter::new("incoming_requests", "Incoming Requests").expect("incoming_requests metric cannot be created");

    pub static ref CACHED_RESPONSES: IntCounter =
        IntCounter::new("cached_responses", "Responses served from local storage").expect("cached_responses metric cannot be created");

    pub static ref UPSTREAM_RESPONSES: IntCounter =
        IntCounter::new("upstream_responses", "Responses served from the upstream registry").expect("upstream_responses metric cannot be created");

    pub static ref STORED_BLOBS: IntCounter =
        IntCounter::new("stored_blobs", "Blobs published to storage").expect("stored_blobs metric cannot be created");

    pub static ref STORED_MANIFESTS: IntCounter =
        IntCounter::new("stored_manifests", "Manifests accepted").expect("stored_manifests metric cannot be created");

    pub static ref DENIED_REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("denied_requests", "Requests refused by the access policy"),
        &["scope"]
    )
    .expect("denied_requests metric cannot be created");

    pub static ref RESPONSE_CODE_COLLECTOR: IntCounterVec = IntCounterVec::new(
        Opts::new("response_code", "Response Code"),
        &["statuscode", "type"]
    )
    .expect("response_code metric cannot be created");

    pub static ref RESPONSE_TIME_COLLECTOR: HistogramVec = HistogramVec::new(
        HistogramOpts::new("response_time", "Response Times"),
        &["type"]
    )
    .expect("response_time metric cannot be created");
}

/// Register every collector with the default prometheus registry
pub fn register_metrics() -> Result<(), prometheus::Error> {

    let registry = prometheus::default_registry();

    registry.register(Box::new(INCOMING_REQUESTS.clone()))?;
    registry.register(Box::new(CACHED_RESPONSES.clone()))?;
    registry.register(Box::new(UPSTREAM_RESPONSES.clone()))?;
    registry.register(Box::new(STORED_BLOBS.clone()))?;
    registry.register(Box::new(STORED_MANIFESTS.clone()))?;
    registry.register(Box::new(DENIED_REQUESTS.clone()))?;
    registry.register(Box::new(RESPONSE_CODE_COLLECTOR.clone()))?;
    registry.register(Box::new(RESPONSE_TIME_COLLECTOR.clone()))?;

    Ok(())
}

//! Advertisement encoding

use registrar_api::advertisement::LOAD_BALANCING_OPTION;
use registrar_api::{AdvertisementMessage, PrivateInstanceId, RouteDescriptor};
use std::collections::BTreeMap;

/// Build the advertisement for `route`.
///
/// Pure and deterministic: identical inputs always serialize to identical bytes, which is
/// what keeps the register and unregister payloads of a session the same.
pub fn encode(
    route: &RouteDescriptor,
    instance_id: &PrivateInstanceId,
    availability_zone: &str,
) -> AdvertisementMessage {
    AdvertisementMessage {
        uris: route.uris.clone(),
        host: route.host.clone(),
        protocol: non_empty(&route.protocol),
        port: route.port,
        tls_port: route.tls_port,
        tags: route.tags.clone(),
        route_service_url: non_empty(&route.route_service_url),
        private_instance_id: instance_id.as_str().to_string(),
        server_cert_domain_san: non_empty(&route.server_cert_domain_san),
        availability_zone: (!availability_zone.is_empty()).then(|| availability_zone.to_string()),
        options: route_options(route),
    }
}

fn route_options(route: &RouteDescriptor) -> Option<BTreeMap<String, String>> {
    let algorithm = non_empty(&route.load_balancing_algorithm)?;
    Some(BTreeMap::from([(LOAD_BALANCING_OPTION.to_string(), algorithm)]))
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

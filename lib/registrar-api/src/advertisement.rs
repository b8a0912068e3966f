//! Wire format of the router register/unregister messages

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Options key carrying the load balancing algorithm
pub const LOAD_BALANCING_OPTION: &str = "loadbalancing";

/// AdvertisementMessage is the JSON document the router consumes.
///
/// Field order is the serialized order. Optional fields are omitted when `None`,
/// except `tags` which is always emitted (as `null` when absent).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisementMessage {
    pub uris: Vec<String>,

    pub host: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_port: Option<u16>,

    #[serde(default)]
    pub tags: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_service_url: Option<String>,

    pub private_instance_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_cert_domain_san: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<BTreeMap<String, String>>,
}

impl AdvertisementMessage {
    /// Serialize to the JSON bytes published on the bus
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

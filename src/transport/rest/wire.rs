//! Eureka JSON wire format.
//!
//! Eureka's JSON is a mechanical translation of its XML: attributes become
//! `@name` keys, element text becomes `$`, booleans are often strings, and a
//! list with one element may be serialized as a bare object.

use std::collections::HashMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::model::{Application, Instance, InstanceStatus, LeaseInfo, PortInfo};

const DEFAULT_DATA_CENTER_CLASS: &str = "com.netflix.appinfo.InstanceInfo$DefaultDataCenterInfo";
const DEFAULT_DATA_CENTER_NAME: &str = "MyOwn";

/// Body of `POST /apps/{app}`.
#[derive(Debug, Serialize)]
pub struct InstanceEnvelope {
    pub instance: WireInstance,
}

/// Body of `GET /apps/{app}`.
#[derive(Debug, Deserialize)]
pub struct ApplicationEnvelope {
    pub application: WireApplication,
}

/// Body of `GET /apps`.
#[derive(Debug, Deserialize)]
pub struct ApplicationsEnvelope {
    pub applications: WireApplications,
}

#[derive(Debug, Default, Deserialize)]
pub struct WireApplications {
    #[serde(default)]
    pub application: OneOrMany<WireApplication>,
}

#[derive(Debug, Deserialize)]
pub struct WireApplication {
    pub name: String,
    #[serde(default)]
    pub instance: OneOrMany<WireInstance>,
}

/// A list that may arrive as a bare object when it has one element.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireInstance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub host_name: String,
    #[serde(default)]
    pub app: String,
    #[serde(default)]
    pub ip_addr: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub port: WirePort,
    #[serde(default)]
    pub secure_port: WirePort,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure_vip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_page_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_page_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_url: Option<String>,
    #[serde(default)]
    pub data_center_info: DataCenterInfo,
    #[serde(default)]
    pub lease_info: WireLease,
    #[serde(default, deserialize_with = "string_map")]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct WirePort {
    #[serde(rename = "$", default, deserialize_with = "port_number")]
    pub port: u16,
    #[serde(
        rename = "@enabled",
        default,
        serialize_with = "enabled_string",
        deserialize_with = "enabled_flag"
    )]
    pub enabled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DataCenterInfo {
    #[serde(rename = "@class")]
    pub class: String,
    pub name: String,
}

impl Default for DataCenterInfo {
    fn default() -> Self {
        Self {
            class: DEFAULT_DATA_CENTER_CLASS.to_string(),
            name: DEFAULT_DATA_CENTER_NAME.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WireLease {
    pub renewal_interval_in_secs: u32,
    pub duration_in_secs: u32,
}

impl Default for WireLease {
    fn default() -> Self {
        let lease = LeaseInfo::default();
        Self {
            renewal_interval_in_secs: lease.renewal_interval_secs,
            duration_in_secs: lease.duration_secs,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose<T> {
    Value(T),
    Text(String),
}

fn port_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    match Loose::<u16>::deserialize(deserializer)? {
        Loose::Value(port) => Ok(port),
        Loose::Text(text) => text.trim().parse().map_err(D::Error::custom),
    }
}

fn enabled_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Loose::<bool>::deserialize(deserializer)? {
        Loose::Value(flag) => Ok(flag),
        Loose::Text(text) => Ok(text.trim().eq_ignore_ascii_case("true")),
    }
}

fn enabled_string<S: Serializer>(enabled: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(if *enabled { "true" } else { "false" })
}

// Registry metadata maps carry a `@class` marker and occasionally non-string
// values; keep only plain string entries.
fn string_map<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<HashMap<String, String>, D::Error> {
    let raw = Option::<HashMap<String, serde_json::Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, value)| match value {
            serde_json::Value::String(s) if !key.starts_with('@') => Some((key, s)),
            _ => None,
        })
        .collect())
}

impl From<&Instance> for WireInstance {
    fn from(instance: &Instance) -> Self {
        Self {
            instance_id: Some(instance.instance_id.clone()),
            host_name: instance.host_name.clone(),
            app: instance.app.clone(),
            ip_addr: instance.ip_addr.clone(),
            status: instance.status.to_string(),
            port: WirePort {
                port: instance.port.port,
                enabled: instance.port.enabled,
            },
            secure_port: WirePort {
                port: instance.secure_port.port,
                enabled: instance.secure_port.enabled,
            },
            vip_address: Some(instance.vip_address.clone()),
            secure_vip_address: Some(instance.secure_vip_address.clone()),
            home_page_url: instance.home_page_url.clone(),
            status_page_url: instance.status_page_url.clone(),
            health_check_url: instance.health_check_url.clone(),
            data_center_info: DataCenterInfo::default(),
            lease_info: WireLease {
                renewal_interval_in_secs: instance.lease.renewal_interval_secs,
                duration_in_secs: instance.lease.duration_secs,
            },
            metadata: instance.metadata.clone(),
        }
    }
}

impl From<WireInstance> for Instance {
    fn from(wire: WireInstance) -> Self {
        let instance_id = wire
            .instance_id
            .unwrap_or_else(|| format!("{}:{}:{}", wire.host_name, wire.app, wire.port.port));
        Self {
            instance_id,
            app: wire.app,
            ip_addr: wire.ip_addr,
            host_name: wire.host_name,
            port: PortInfo {
                port: wire.port.port,
                enabled: wire.port.enabled,
            },
            secure_port: PortInfo {
                port: wire.secure_port.port,
                enabled: wire.secure_port.enabled,
            },
            status: wire.status.parse().unwrap_or(InstanceStatus::Unknown),
            lease: LeaseInfo {
                renewal_interval_secs: wire.lease_info.renewal_interval_in_secs,
                duration_secs: wire.lease_info.duration_in_secs,
            },
            vip_address: wire.vip_address.unwrap_or_default(),
            secure_vip_address: wire.secure_vip_address.unwrap_or_default(),
            home_page_url: wire.home_page_url,
            status_page_url: wire.status_page_url,
            health_check_url: wire.health_check_url,
            metadata: wire.metadata,
        }
    }
}

impl From<WireApplication> for Application {
    fn from(wire: WireApplication) -> Self {
        Application {
            name: wire.name,
            instances: wire.instance.into_vec().into_iter().map(Instance::from).collect(),
        }
    }
}

//! Registry domain types.
//!
//! These are the shapes the client caches and hands to callers. They are
//! independent of the wire format used by any particular transport; see
//! [`crate::transport::rest`] for the Eureka JSON mapping.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lease status of an instance as reported by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    Up,
    Down,
    Starting,
    OutOfService,
    #[default]
    Unknown,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Up => "UP",
            InstanceStatus::Down => "DOWN",
            InstanceStatus::Starting => "STARTING",
            InstanceStatus::OutOfService => "OUT_OF_SERVICE",
            InstanceStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = std::convert::Infallible;

    /// Unrecognized values map to `Unknown` rather than failing, matching how
    /// registries treat statuses they do not understand.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "UP" => InstanceStatus::Up,
            "DOWN" => InstanceStatus::Down,
            "STARTING" => InstanceStatus::Starting,
            "OUT_OF_SERVICE" => InstanceStatus::OutOfService,
            _ => InstanceStatus::Unknown,
        })
    }
}

/// A listening port and whether it is advertised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PortInfo {
    pub port: u16,
    pub enabled: bool,
}

impl PortInfo {
    pub fn enabled(port: u16) -> Self {
        Self {
            port,
            enabled: true,
        }
    }

    pub fn disabled(port: u16) -> Self {
        Self {
            port,
            enabled: false,
        }
    }
}

/// Lease timing negotiated with the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseInfo {
    /// Seconds between heartbeats.
    pub renewal_interval_secs: u32,
    /// Seconds without a heartbeat before the registry evicts the instance.
    pub duration_secs: u32,
}

impl Default for LeaseInfo {
    fn default() -> Self {
        Self {
            renewal_interval_secs: 30,
            duration_secs: 90,
        }
    }
}

/// One running replica of an application.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: String,
    pub app: String,
    pub ip_addr: String,
    pub host_name: String,
    pub port: PortInfo,
    pub secure_port: PortInfo,
    pub status: InstanceStatus,
    pub lease: LeaseInfo,
    pub vip_address: String,
    pub secure_vip_address: String,
    pub home_page_url: Option<String>,
    pub status_page_url: Option<String>,
    pub health_check_url: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl Instance {
    /// `ip:port` for the plain port.
    pub fn plain_endpoint(&self) -> String {
        format!("{}:{}", self.ip_addr, self.port.port)
    }

    /// `ip:port` for the secure port.
    pub fn secure_endpoint(&self) -> String {
        format!("{}:{}", self.ip_addr, self.secure_port.port)
    }

    pub fn is_up(&self) -> bool {
        self.status == InstanceStatus::Up
    }
}

/// A logical service and its known instances, in registry order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Application {
    pub name: String,
    pub instances: Vec<Instance>,
}

impl Application {
    pub fn new(name: impl Into<String>, instances: Vec<Instance>) -> Self {
        Self {
            name: name.into(),
            instances,
        }
    }
}

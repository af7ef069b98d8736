//! Instance identity configuration.

use std::collections::HashMap;

use serde::Deserialize;

/// This process's registrable identity, as configured.
///
/// Only `app_name` and `ip_address` are required; everything else has a
/// default derived from them. See [`crate::instance::InstanceDescriptor`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Explicit instance id. Defaults to `{host_name}:{app_name}:{port}`.
    pub instance_id: Option<String>,
    /// Logical application name. Registered uppercased.
    pub app_name: String,
    /// Host name advertised to the registry. Defaults to `ip_address`.
    pub host_name: Option<String>,
    /// Address other clients should connect to.
    pub ip_address: String,
    pub port: u16,
    pub port_enabled: bool,
    pub secure_port: u16,
    pub secure_port_enabled: bool,
    /// Promote to UP without waiting for the local port to accept connections.
    pub instance_enabled_on_init: bool,
    pub lease_renewal_interval_secs: u32,
    pub lease_expiration_duration_secs: u32,
    /// Defaults to the lowercase app name.
    pub vip_address: Option<String>,
    /// Defaults to the lowercase app name.
    pub secure_vip_address: Option<String>,
    pub home_page_url: Option<String>,
    pub status_page_url: Option<String>,
    pub health_check_url: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            instance_id: None,
            app_name: String::new(),
            host_name: None,
            ip_address: String::new(),
            port: 8080,
            port_enabled: true,
            secure_port: 443,
            secure_port_enabled: false,
            instance_enabled_on_init: false,
            lease_renewal_interval_secs: 30,
            lease_expiration_duration_secs: 90,
            vip_address: None,
            secure_vip_address: None,
            home_page_url: None,
            status_page_url: None,
            health_check_url: None,
            metadata: HashMap::new(),
        }
    }
}

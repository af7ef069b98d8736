//! This process's own registrable identity.

use crate::config::{ConfigError, InstanceConfig};
use crate::model::{Instance, InstanceStatus, LeaseInfo, PortInfo};

/// The instance this client registers.
///
/// Built once from configuration. Only `status` changes afterwards
/// (STARTING → UP), and only under the client state lock.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceDescriptor {
    instance: Instance,
    enabled_on_init: bool,
}

impl InstanceDescriptor {
    /// Build the descriptor, failing if the identity is incomplete.
    pub fn from_config(config: &InstanceConfig) -> Result<Self, ConfigError> {
        let app_name = config.app_name.trim();
        if app_name.is_empty() {
            return Err(ConfigError::Missing("instance.app_name"));
        }
        let ip_addr = config.ip_address.trim();
        if ip_addr.is_empty() {
            return Err(ConfigError::Missing("instance.ip_address"));
        }

        let host_name = config
            .host_name
            .clone()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| ip_addr.to_string());
        let instance_id = config
            .instance_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("{}:{}:{}", host_name, app_name, config.port));
        let vip = app_name.to_lowercase();

        let instance = Instance {
            instance_id,
            app: app_name.to_uppercase(),
            ip_addr: ip_addr.to_string(),
            host_name,
            port: PortInfo {
                port: config.port,
                enabled: config.port_enabled,
            },
            secure_port: PortInfo {
                port: config.secure_port,
                enabled: config.secure_port_enabled,
            },
            status: InstanceStatus::Starting,
            lease: LeaseInfo {
                renewal_interval_secs: config.lease_renewal_interval_secs,
                duration_secs: config.lease_expiration_duration_secs,
            },
            vip_address: config.vip_address.clone().unwrap_or_else(|| vip.clone()),
            secure_vip_address: config.secure_vip_address.clone().unwrap_or(vip),
            home_page_url: config.home_page_url.clone(),
            status_page_url: config.status_page_url.clone(),
            health_check_url: config.health_check_url.clone(),
            metadata: config.metadata.clone(),
        };

        Ok(Self {
            instance,
            enabled_on_init: config.instance_enabled_on_init,
        })
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn app(&self) -> &str {
        &self.instance.app
    }

    pub fn instance_id(&self) -> &str {
        &self.instance.instance_id
    }

    pub fn status(&self) -> InstanceStatus {
        self.instance.status
    }

    pub fn enabled_on_init(&self) -> bool {
        self.enabled_on_init
    }

    /// Seconds between heartbeats, never less than one.
    pub fn renewal_interval_secs(&self) -> u64 {
        u64::from(self.instance.lease.renewal_interval_secs.max(1))
    }

    /// Port whose liveness gates promotion to UP: the secure port when it is
    /// enabled, the plain port otherwise.
    pub fn service_port(&self) -> u16 {
        if self.instance.secure_port.enabled {
            self.instance.secure_port.port
        } else {
            self.instance.port.port
        }
    }

    pub(crate) fn set_status(&mut self, status: InstanceStatus) {
        self.instance.status = status;
    }
}

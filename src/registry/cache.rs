//! Last-known registry snapshot and the routing tables derived from it.

use std::collections::{BTreeMap, HashMap};

use crate::model::{Application, Instance};

use super::Protocol;

/// Routable instances of one application, keyed by their ordinal in the
/// application's instance list.
pub type InstanceMap = BTreeMap<usize, Instance>;

/// `host:port` strings of one application for one protocol, keyed by the
/// ordinal of the instance they belong to.
pub type EndpointMap = BTreeMap<usize, String>;

/// Endpoints of one application, per protocol.
pub type ProtocolEndpoints = HashMap<Protocol, EndpointMap>;

/// Tables derived from one application snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedTables {
    pub instances: InstanceMap,
    pub endpoints: ProtocolEndpoints,
}

impl DerivedTables {
    /// Derive routing tables from an application's instance list.
    ///
    /// With `only_up`, instances not reporting UP are skipped. An endpoint is
    /// listed for a protocol only when that port is enabled on the instance.
    pub fn derive(application: &Application, only_up: bool) -> Self {
        let mut instances = InstanceMap::new();
        let mut plain = EndpointMap::new();
        let mut secure = EndpointMap::new();

        for (ordinal, instance) in application.instances.iter().enumerate() {
            if only_up && !instance.is_up() {
                continue;
            }
            if instance.port.enabled {
                plain.insert(ordinal, instance.plain_endpoint());
            }
            if instance.secure_port.enabled {
                secure.insert(ordinal, instance.secure_endpoint());
            }
            instances.insert(ordinal, instance.clone());
        }

        let endpoints = HashMap::from([(Protocol::Plain, plain), (Protocol::Secure, secure)]);
        Self {
            instances,
            endpoints,
        }
    }
}

/// Normalized cache key for an application id.
pub fn cache_key(app_id: &str) -> String {
    app_id.trim().to_uppercase()
}

/// Three parallel views of the registry, keyed by uppercase application id.
///
/// The raw snapshot keeps every instance; the instance and endpoint tables
/// hold only routable ones. All three are written together for an
/// application, so they always describe the same snapshot.
#[derive(Debug, Clone, Default)]
pub struct RegistryCache {
    applications: HashMap<String, Application>,
    instances: HashMap<String, InstanceMap>,
    endpoints: HashMap<String, ProtocolEndpoints>,
}

impl RegistryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cache holding exactly the given applications.
    pub fn from_applications(applications: Vec<Application>, only_up: bool) -> Self {
        let mut cache = Self::new();
        for application in applications {
            cache.insert_application(application, only_up);
        }
        cache
    }

    /// Insert or replace one application's snapshot and derived tables.
    pub fn insert_application(&mut self, application: Application, only_up: bool) {
        let key = cache_key(&application.name);
        self.insert_keyed(key, application, only_up);
    }

    /// Insert or replace an application under the id it was requested by,
    /// which may differ in case from the name the registry reports.
    pub fn insert_as(&mut self, app_id: &str, application: Application, only_up: bool) {
        self.insert_keyed(cache_key(app_id), application, only_up);
    }

    fn insert_keyed(&mut self, key: String, application: Application, only_up: bool) {
        let DerivedTables {
            instances,
            endpoints,
        } = DerivedTables::derive(&application, only_up);

        self.applications.insert(key.clone(), application);
        self.instances.insert(key.clone(), instances);
        self.endpoints.insert(key, endpoints);
    }

    /// Routable instances for an application, if it has been cached.
    pub fn instances_for(&self, app_id: &str) -> Option<&InstanceMap> {
        self.instances.get(&cache_key(app_id))
    }

    /// Endpoints for an application, if it has been cached.
    pub fn endpoints_for(&self, app_id: &str) -> Option<&ProtocolEndpoints> {
        self.endpoints.get(&cache_key(app_id))
    }

    /// Raw snapshot for an application, if it has been cached.
    pub fn application(&self, app_id: &str) -> Option<&Application> {
        self.applications.get(&cache_key(app_id))
    }

    pub fn applications(&self) -> &HashMap<String, Application> {
        &self.applications
    }

    pub fn instances(&self) -> &HashMap<String, InstanceMap> {
        &self.instances
    }

    pub fn contains(&self, app_id: &str) -> bool {
        self.applications.contains_key(&cache_key(app_id))
    }

    pub fn len(&self) -> usize {
        self.applications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InstanceStatus, PortInfo};

    fn instance(ordinal: u8, status: InstanceStatus, secure: bool) -> Instance {
        Instance {
            instance_id: format!("orders-{}", ordinal),
            app: "ORDERS".to_string(),
            ip_addr: format!("10.0.0.{}", ordinal),
            port: PortInfo::enabled(8080),
            secure_port: PortInfo {
                port: 8443,
                enabled: secure,
            },
            status,
            ..Default::default()
        }
    }

    fn orders() -> Application {
        Application::new(
            "orders",
            vec![
                instance(1, InstanceStatus::Up, false),
                instance(2, InstanceStatus::Down, true),
                instance(3, InstanceStatus::Up, true),
                instance(4, InstanceStatus::Starting, false),
            ],
        )
    }

    #[test]
    fn test_up_filter_keeps_only_up_instances() {
        let tables = DerivedTables::derive(&orders(), true);

        assert_eq!(tables.instances.len(), 2);
        assert_eq!(tables.instances.keys().copied().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(tables.endpoints[&Protocol::Plain].len(), 2);
        assert_eq!(tables.endpoints[&Protocol::Secure].len(), 1);
        assert_eq!(tables.endpoints[&Protocol::Secure][&2], "10.0.0.3:8443");
    }

    #[test]
    fn test_without_filter_all_instances_routable() {
        let tables = DerivedTables::derive(&orders(), false);
        assert_eq!(tables.instances.len(), 4);
        assert_eq!(tables.endpoints[&Protocol::Plain].len(), 4);
        assert_eq!(tables.endpoints[&Protocol::Secure].len(), 2);
    }

    #[test]
    fn test_secure_endpoint_requires_enabled_secure_port() {
        let app = Application::new("orders", vec![instance(1, InstanceStatus::Up, false)]);
        let tables = DerivedTables::derive(&app, true);
        assert!(tables.endpoints[&Protocol::Secure].is_empty());
        assert_eq!(tables.endpoints[&Protocol::Plain][&0], "10.0.0.1:8080");
    }

    #[test]
    fn test_disabled_plain_port_has_no_plain_endpoint() {
        let mut only_secure = instance(1, InstanceStatus::Up, true);
        only_secure.port.enabled = false;
        let app = Application::new("orders", vec![only_secure]);

        let tables = DerivedTables::derive(&app, true);
        assert_eq!(tables.instances.len(), 1);
        assert!(tables.endpoints[&Protocol::Plain].is_empty());
        assert_eq!(tables.endpoints[&Protocol::Secure].len(), 1);
    }

    #[test]
    fn test_tables_consistent_with_snapshot() {
        let cache = RegistryCache::from_applications(vec![orders()], true);

        let snapshot = cache.application("ORDERS").unwrap();
        let instances = cache.instances_for("ORDERS").unwrap();
        let endpoints = cache.endpoints_for("ORDERS").unwrap();

        assert_eq!(snapshot.instances.len(), 4);
        for (ordinal, instance) in instances {
            assert_eq!(&snapshot.instances[*ordinal], instance);
        }
        for table in endpoints.values() {
            for ordinal in table.keys() {
                assert!(instances.contains_key(ordinal));
            }
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let cache = RegistryCache::from_applications(vec![orders()], true);
        assert!(cache.contains("orders"));
        assert!(cache.contains(" Orders "));
        assert!(cache.instances_for("oRdErS").is_some());
        assert!(cache.applications().contains_key("ORDERS"));
    }

    #[test]
    fn test_insert_replaces_application() {
        let mut cache = RegistryCache::from_applications(vec![orders()], true);
        cache.insert_application(
            Application::new("ORDERS", vec![instance(9, InstanceStatus::Up, false)]),
            true,
        );

        assert_eq!(cache.len(), 1);
        let instances = cache.instances_for("orders").unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[&0].instance_id, "orders-9");
        assert_eq!(cache.endpoints_for("orders").unwrap()[&Protocol::Secure].len(), 0);
    }

    #[test]
    fn test_empty_cache() {
        let cache = RegistryCache::new();
        assert!(cache.is_empty());
        assert!(cache.instances_for("ORDERS").is_none());
        assert!(cache.endpoints_for("ORDERS").is_none());
    }
}

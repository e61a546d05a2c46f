//! Lookup clients handed to the templating engine.

use std::sync::Arc;

use helmlet_core::{LookupError, LookupResult, ResourceLocator};
use helmlet_discovery::DiscoveryIndex;
use kube::core::DynamicObject;
use tracing::debug;

use crate::bridge::AsyncCallBridge;
use crate::ResourceList;

/// Pluggable backend for in-template lookups: resolves a kind to a client.
pub trait LookupBackend: Send + Sync {
    /// Client for `apiVersion`/`kind` and whether the kind is namespaced.
    fn client_for(&self, api_version: &str, kind: &str) -> LookupResult<(ResourceClient, bool)>;
}

/// Resolver bound to one discovery index and one bridge.
#[derive(Clone)]
pub struct ClientProvider {
    index: Arc<DiscoveryIndex>,
    bridge: AsyncCallBridge,
}

impl ClientProvider {
    pub fn new(index: Arc<DiscoveryIndex>, bridge: AsyncCallBridge) -> Self { Self { index, bridge } }

    pub fn index(&self) -> &DiscoveryIndex { &self.index }

    pub fn bridge(&self) -> &AsyncCallBridge { &self.bridge }
}

impl LookupBackend for ClientProvider {
    fn client_for(&self, api_version: &str, kind: &str) -> LookupResult<(ResourceClient, bool)> {
        let (locator, namespaced) = self.index.resolve(api_version, kind)?;
        Ok((ResourceClient::new(self.bridge.clone(), locator), namespaced))
    }
}

/// Read-only client for one resource type, optionally scoped to a namespace.
///
/// A plain value: [`ResourceClient::namespace`] returns a new client and never
/// mutates a shared one.
#[derive(Clone)]
pub struct ResourceClient {
    bridge: AsyncCallBridge,
    locator: ResourceLocator,
    namespace: String,
}

impl ResourceClient {
    pub fn new(bridge: AsyncCallBridge, locator: ResourceLocator) -> Self {
        Self { bridge, locator, namespace: String::new() }
    }

    pub fn namespace(&self, namespace: &str) -> Self {
        Self { namespace: namespace.to_string(), ..self.clone() }
    }

    pub fn locator(&self) -> &ResourceLocator { &self.locator }

    pub fn current_namespace(&self) -> &str { &self.namespace }

    pub fn get(&self, name: &str) -> LookupResult<DynamicObject> {
        self.bridge.get(&self.locator, &self.namespace, name)
    }

    pub fn get_subresource(&self, _name: &str, subresource: &str) -> LookupResult<DynamicObject> {
        Err(unsupported(&format!("GET {}", subresource)))
    }

    pub fn list(&self) -> LookupResult<ResourceList> {
        self.bridge.list(&self.locator, &self.namespace)
    }

    pub async fn get_async(&self, name: &str) -> LookupResult<DynamicObject> {
        self.bridge.get_async(&self.locator, &self.namespace, name).await
    }

    pub async fn list_async(&self) -> LookupResult<ResourceList> {
        self.bridge.list_async(&self.locator, &self.namespace).await
    }

    // Lookups are read-only; every mutating verb fails without reaching the host.

    pub fn create(&self, _obj: &DynamicObject) -> LookupResult<DynamicObject> { Err(unsupported("CREATE")) }

    pub fn update(&self, _obj: &DynamicObject) -> LookupResult<DynamicObject> { Err(unsupported("UPDATE")) }

    pub fn delete(&self, _name: &str) -> LookupResult<()> { Err(unsupported("DELETE")) }

    pub fn patch(&self, _name: &str, _patch: &serde_json::Value) -> LookupResult<DynamicObject> { Err(unsupported("PATCH")) }

    pub fn apply(&self, _name: &str, _obj: &DynamicObject) -> LookupResult<DynamicObject> { Err(unsupported("APPLY")) }

    pub fn watch(&self) -> LookupResult<()> { Err(unsupported("WATCH")) }
}

fn unsupported(verb: &str) -> LookupError {
    LookupError::UnsupportedOperation { verb: verb.to_string() }
}

/// Template `lookup`: Get when `name` is set, List otherwise.
///
/// `namespace` only applies to namespaced kinds. A not-found result is an
/// empty object rather than an error.
pub fn lookup(backend: &dyn LookupBackend, api_version: &str, kind: &str, namespace: &str, name: &str) -> LookupResult<serde_json::Value> {
    let (client, namespaced) = backend.client_for(api_version, kind)?;
    let client = if namespaced && !namespace.is_empty() { client.namespace(namespace) } else { client };
    debug!(api_version = %api_version, kind = %kind, ns = %client.current_namespace(), name = %name, "lookup");
    let found = if name.is_empty() {
        client.list().and_then(|l| serde_json::to_value(l).map_err(LookupError::decode))
    } else {
        client.get(name).and_then(|o| serde_json::to_value(o).map_err(LookupError::decode))
    };
    match found {
        Err(e) if e.is_not_found() => Ok(serde_json::Value::Object(Default::default())),
        other => other,
    }
}

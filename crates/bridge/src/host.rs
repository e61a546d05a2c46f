//! The host side of the bridge: operations, requests and raw responses.
//!
//! A host only ever resolves or rejects the futures it hands out; it never
//! blocks. Responses are read in two stages: the call yields a raw response
//! object, then its body is read with a second asynchronous call.

use std::fmt;

use bytes::Bytes;
use helmlet_core::ResourceLocator;
use serde::{Deserialize, Serialize};

/// The four host operations, named after the generated client's raw methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostOperation {
    GetNamespaced,
    GetCluster,
    ListNamespaced,
    ListCluster,
}

impl HostOperation {
    /// An empty namespace selects the cluster-scoped variant.
    pub fn for_get(namespace: &str) -> Self {
        if namespace.is_empty() { Self::GetCluster } else { Self::GetNamespaced }
    }

    pub fn for_list(namespace: &str) -> Self {
        if namespace.is_empty() { Self::ListCluster } else { Self::ListNamespaced }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::GetNamespaced => "getNamespacedCustomObjectRaw",
            Self::GetCluster => "getClusterCustomObjectRaw",
            Self::ListNamespaced => "listNamespacedCustomObjectRaw",
            Self::ListCluster => "listClusterCustomObjectRaw",
        }
    }

    /// HTTP verb reported in synthesized server errors; lists are GETs too.
    pub fn verb(self) -> &'static str { "GET" }

    pub fn is_list(self) -> bool { matches!(self, Self::ListNamespaced | Self::ListCluster) }
}

impl fmt::Display for HostOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

/// Payload handed to a host operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostRequest {
    /// Absent for the core group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub version: String,
    pub plural: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl HostRequest {
    pub fn get(locator: &ResourceLocator, namespace: &str, name: &str) -> Self {
        Self { name: Some(name.to_string()), ..Self::list(locator, namespace) }
    }

    pub fn list(locator: &ResourceLocator, namespace: &str) -> Self {
        Self {
            group: locator.group.clone(),
            version: locator.version.clone(),
            plural: locator.plural.clone(),
            namespace: namespace.to_string(),
            name: None,
        }
    }

    /// REST path of the collection, e.g. `/apis/apps/v1/namespaces/ns/deployments`.
    pub fn collection_path(&self) -> String {
        let base = match self.group.as_deref() {
            Some(g) if !g.is_empty() => format!("/apis/{}/{}", g, self.version),
            _ => format!("/api/{}", self.version),
        };
        if self.namespace.is_empty() {
            format!("{}/{}", base, self.plural)
        } else {
            format!("{}/namespaces/{}/{}", base, self.namespace, self.plural)
        }
    }

    /// Object path for Get, collection path for List.
    pub fn path(&self) -> String {
        match &self.name {
            Some(n) => format!("{}/{}", self.collection_path(), n),
            None => self.collection_path(),
        }
    }
}

/// Response body as exposed by the host: binary or text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Binary(Bytes),
    Text(String),
}

impl Body {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Body::Binary(b) => b.as_ref(),
            Body::Text(s) => s.as_bytes(),
        }
    }

    pub fn len(&self) -> usize { self.as_bytes().len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl From<serde_json::Value> for Body {
    fn from(v: serde_json::Value) -> Self { Body::Text(v.to_string()) }
}

/// First-stage result of a host call; the body is read asynchronously.
#[async_trait::async_trait]
pub trait RawResponse: Send + Sync {
    fn status(&self) -> u16;
    async fn body(&self) -> Result<Body, HostFailure>;
}

/// Rejection value of a host call.
pub enum HostFailure {
    /// The generated client's response error: it carries the HTTP response.
    Response(Box<dyn RawResponse>),
    /// Anything else the host threw (network failures, serialization, type errors).
    Thrown(String),
}

impl HostFailure {
    pub fn thrown(msg: impl fmt::Display) -> Self { Self::Thrown(msg.to_string()) }
}

impl fmt::Display for HostFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Response(r) => write!(f, "ResponseError: response returned status {}", r.status()),
            Self::Thrown(msg) => f.write_str(msg),
        }
    }
}

impl fmt::Debug for HostFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Response(r) => f.debug_tuple("Response").field(&r.status()).finish(),
            Self::Thrown(msg) => f.debug_tuple("Thrown").field(msg).finish(),
        }
    }
}

/// The host's cluster connectivity.
#[async_trait::async_trait]
pub trait HostClient: Send + Sync {
    async fn call(&self, op: HostOperation, request: HostRequest) -> Result<Box<dyn RawResponse>, HostFailure>;
}

/// A response whose body is already in memory.
#[derive(Debug, Clone)]
pub struct BufferedResponse {
    pub status: u16,
    pub body: Body,
}

impl BufferedResponse {
    pub fn new(status: u16, body: Body) -> Self { Self { status, body } }

    pub fn ok(body: Body) -> Self { Self::new(200, body) }
}

#[async_trait::async_trait]
impl RawResponse for BufferedResponse {
    fn status(&self) -> u16 { self.status }

    async fn body(&self) -> Result<Body, HostFailure> { Ok(self.body.clone()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_follows_namespace() {
        assert_eq!(HostOperation::for_get("").name(), "getClusterCustomObjectRaw");
        assert_eq!(HostOperation::for_get("ns").name(), "getNamespacedCustomObjectRaw");
        assert_eq!(HostOperation::for_list("").name(), "listClusterCustomObjectRaw");
        assert_eq!(HostOperation::for_list("ns").name(), "listNamespacedCustomObjectRaw");
    }

    #[test]
    fn request_paths() {
        let cm = ResourceLocator::new("", "v1", "configmaps");
        assert_eq!(HostRequest::get(&cm, "default", "cfg").path(), "/api/v1/namespaces/default/configmaps/cfg");
        assert_eq!(HostRequest::list(&cm, "").path(), "/api/v1/configmaps");
        let w = ResourceLocator::new("example.com", "v1", "widgets");
        assert_eq!(HostRequest::get(&w, "", "foo").path(), "/apis/example.com/v1/widgets/foo");
    }

    #[test]
    fn request_payload_omits_core_group_and_name() {
        let req = HostRequest::list(&ResourceLocator::new("", "v1", "pods"), "kube-system");
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v, serde_json::json!({ "version": "v1", "plural": "pods", "namespace": "kube-system" }));
    }
}

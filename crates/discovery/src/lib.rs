//! Helmlet discovery: a read-only view of a served API-discovery document and
//! the apiVersion/kind → resource locator resolution used by template lookups.

#![forbid(unsafe_code)]

use helmlet_core::{LookupError, ResourceLocator};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Whether a resource lives inside a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    Namespaced,
    Cluster,
}

impl Scope {
    /// Anything other than `Namespaced` (any case) is treated as cluster scope.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("namespaced") { Scope::Namespaced } else { Scope::Cluster }
    }

    pub fn is_namespaced(self) -> bool { matches!(self, Scope::Namespaced) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawResource")]
pub struct ResourceEntry {
    /// Plural resource name, e.g. `deployments`.
    pub resource: String,
    pub kind: String,
    pub scope: Scope,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawVersion")]
pub struct VersionEntry {
    pub version: String,
    pub resources: Vec<ResourceEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawGroup")]
pub struct GroupEntry {
    /// Empty for the core group.
    pub name: String,
    pub versions: Vec<VersionEntry>,
}

/// Decoded discovery payload: groups → versions → resources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    #[serde(default, alias = "Groups", deserialize_with = "null_as_empty")]
    pub groups: Vec<GroupEntry>,
}

// Accepts both the flat shape (`name`, `kind`) and aggregated discovery
// (`metadata.name`, `responseKind.kind`).
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGroup {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    metadata: Option<RawMeta>,
    #[serde(default, deserialize_with = "null_as_empty")]
    versions: Vec<VersionEntry>,
}

#[derive(Deserialize)]
struct RawMeta {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct RawVersion {
    #[serde(default)]
    version: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    resources: Vec<ResourceEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResource {
    #[serde(default)]
    resource: String,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    response_kind: Option<RawKind>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Deserialize)]
struct RawKind {
    #[serde(default)]
    kind: String,
}

impl From<RawGroup> for GroupEntry {
    fn from(r: RawGroup) -> Self {
        let name = r.name.or_else(|| r.metadata.and_then(|m| m.name)).unwrap_or_default();
        Self { name, versions: r.versions }
    }
}

impl From<RawVersion> for VersionEntry {
    fn from(r: RawVersion) -> Self { Self { version: r.version, resources: r.resources } }
}

impl From<RawResource> for ResourceEntry {
    fn from(r: RawResource) -> Self {
        let kind = r.kind.or_else(|| r.response_kind.map(|k| k.kind)).unwrap_or_default();
        let scope = Scope::parse(r.scope.as_deref().unwrap_or(""));
        Self { resource: r.resource, kind, scope }
    }
}

fn null_as_empty<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(d)?.unwrap_or_default())
}

/// Immutable lookup view over a [`DiscoveryDocument`], built once per render.
///
/// Resolution scans linearly and keeps the *last* matching entry, so documents
/// that list the same group/version/kind twice resolve to the later entry.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryIndex {
    groups: Vec<GroupEntry>,
}

impl DiscoveryIndex {
    pub fn new(doc: DiscoveryDocument) -> Self { Self { groups: doc.groups } }

    pub fn from_json(json: &str) -> Result<Self, LookupError> {
        let doc: DiscoveryDocument = serde_json::from_str(json)
            .map_err(|e| LookupError::InvalidInput(format!("discovery document: {}", e)))?;
        Ok(Self::new(doc))
    }

    pub fn groups(&self) -> &[GroupEntry] { &self.groups }

    /// Total number of resource entries across all groups and versions.
    pub fn len(&self) -> usize {
        self.groups.iter().flat_map(|g| g.versions.iter()).map(|v| v.resources.len()).sum()
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Resolve `apiVersion` + `kind` into a locator and whether the resource is namespaced.
    ///
    /// When several entries match, the last one wins, even if its plural is
    /// empty: that yields `UnsupportedResource` although an earlier entry
    /// named a plural.
    pub fn resolve(&self, api_version: &str, kind: &str) -> Result<(ResourceLocator, bool), LookupError> {
        let (group, version) = split_api_version(api_version)?;

        let mut found: Option<(&str, bool)> = None;
        let mut matches = 0usize;
        for g in self.groups.iter().filter(|g| g.name == group) {
            for v in g.versions.iter().filter(|v| v.version == version) {
                for r in v.resources.iter().filter(|r| r.kind == kind) {
                    found = Some((r.resource.as_str(), r.scope.is_namespaced()));
                    matches += 1;
                }
            }
        }
        if matches > 1 {
            warn!(api_version = %api_version, kind = %kind, matches, "discovery lists kind more than once; last entry wins");
        }

        match found {
            Some((plural, namespaced)) if !plural.is_empty() => {
                debug!(api_version = %api_version, kind = %kind, plural = %plural, namespaced, "resolved");
                Ok((ResourceLocator::new(group, version, plural), namespaced))
            }
            _ => Err(LookupError::UnsupportedResource { api_version: api_version.to_string(), kind: kind.to_string() }),
        }
    }
}

impl From<DiscoveryDocument> for DiscoveryIndex {
    fn from(doc: DiscoveryDocument) -> Self { Self::new(doc) }
}

/// `v1` → (`""`, `v1`); `apps/v1` → (`apps`, `v1`); more than one `/` is invalid.
pub fn split_api_version(api_version: &str) -> Result<(&str, &str), LookupError> {
    let parts: Vec<&str> = api_version.split('/').collect();
    match parts.as_slice() {
        [version] => Ok(("", *version)),
        [group, version] => Ok((*group, *version)),
        _ => Err(LookupError::InvalidInput(format!("invalid apiVersion: {}", api_version))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_api_version_shapes() {
        assert_eq!(split_api_version("v1").unwrap(), ("", "v1"));
        assert_eq!(split_api_version("apps/v1").unwrap(), ("apps", "v1"));
        assert!(matches!(split_api_version("a/b/c"), Err(LookupError::InvalidInput(_))));
    }

    #[test]
    fn parses_flat_shape() {
        let doc: DiscoveryDocument = serde_json::from_value(serde_json::json!({
            "groups": [{
                "name": "apps",
                "versions": [{ "version": "v1", "resources": [
                    { "resource": "deployments", "kind": "Deployment", "scope": "Namespaced" }
                ]}]
            }]
        }))
        .unwrap();
        let r = &doc.groups[0].versions[0].resources[0];
        assert_eq!(doc.groups[0].name, "apps");
        assert_eq!(r.kind, "Deployment");
        assert_eq!(r.scope, Scope::Namespaced);
    }

    #[test]
    fn parses_aggregated_shape() {
        let doc: DiscoveryDocument = serde_json::from_value(serde_json::json!({
            "Groups": [{
                "metadata": { "name": "rbac.authorization.k8s.io" },
                "versions": [{ "version": "v1", "freshness": "Current", "resources": [
                    { "resource": "clusterroles", "responseKind": { "group": "", "version": "", "kind": "ClusterRole" }, "scope": "Cluster", "verbs": ["get"] }
                ]}]
            }, {
                "metadata": {},
                "versions": null
            }]
        }))
        .unwrap();
        assert_eq!(doc.groups[0].name, "rbac.authorization.k8s.io");
        let r = &doc.groups[0].versions[0].resources[0];
        assert_eq!((r.resource.as_str(), r.kind.as_str(), r.scope), ("clusterroles", "ClusterRole", Scope::Cluster));
        assert_eq!(doc.groups[1].name, "");
        assert!(doc.groups[1].versions.is_empty());
    }

    #[test]
    fn unknown_scope_is_cluster() {
        assert_eq!(Scope::parse("namespaced"), Scope::Namespaced);
        assert_eq!(Scope::parse(""), Scope::Cluster);
        assert_eq!(Scope::parse("Weird"), Scope::Cluster);
    }

    #[test]
    fn malformed_json_is_invalid_input() {
        assert!(matches!(DiscoveryIndex::from_json("{not json"), Err(LookupError::InvalidInput(_))));
    }
}

//! Helmlet kubehub: native host over `kube::Client`, live discovery bundles
//! and the Helm releases stored in a namespace.

#![forbid(unsafe_code)]

mod releases;

pub use releases::{decode_release, list_releases, ReleaseSummary, RELEASE_SELECTOR};

use std::time::Instant;

use anyhow::{Context, Result};
use helmlet_bridge::{Body, BufferedResponse, HostClient, HostFailure, HostOperation, HostRequest, RawResponse};
use helmlet_chart::{Capabilities, HelmVersion, KubeVersion};
use helmlet_discovery::{DiscoveryDocument, GroupEntry, ResourceEntry, Scope, VersionEntry};
use helmlet_render::DiscoveryBundle;
use kube::{
    api::{GetParams, ListParams},
    core::{ErrorResponse, Request},
    discovery::{self, Discovery},
    Client,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// How to reach the cluster. Applied on top of the inferred kubeconfig.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// API server URL overriding the kubeconfig's.
    pub base_path: Option<String>,
    pub as_user: Option<String>,
    pub as_groups: Vec<String>,
}

impl ConnectionConfig {
    /// Read `HELMLET_BASE_PATH`, `HELMLET_AS_USER` and `HELMLET_AS_GROUPS` (comma separated).
    pub fn from_env() -> Self { Self::from_vars(|k| std::env::var(k).ok()) }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |k: &str| var(k).map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Self {
            base_path: non_empty("HELMLET_BASE_PATH"),
            as_user: non_empty("HELMLET_AS_USER"),
            as_groups: non_empty("HELMLET_AS_GROUPS")
                .map(|s| s.split(',').map(str::trim).filter(|g| !g.is_empty()).map(String::from).collect())
                .unwrap_or_default(),
        }
    }

    pub fn apply(&self, cfg: &mut kube::Config) -> Result<()> {
        if let Some(base) = &self.base_path {
            cfg.cluster_url = base.parse().with_context(|| format!("parsing base path {}", base))?;
        }
        if let Some(user) = &self.as_user {
            cfg.auth_info.impersonate = Some(user.clone());
        }
        if !self.as_groups.is_empty() {
            cfg.auth_info.impersonate_groups = Some(self.as_groups.clone());
        }
        Ok(())
    }

    pub async fn client(&self) -> Result<Client> {
        let mut cfg = kube::Config::infer().await.context("inferring kube config")?;
        self.apply(&mut cfg)?;
        Client::try_from(cfg).context("building kube client")
    }
}

/// Host backed by a live API server.
#[derive(Clone)]
pub struct KubeHost {
    client: Client,
}

impl KubeHost {
    pub fn new(client: Client) -> Self { Self { client } }

    pub async fn connect(conn: &ConnectionConfig) -> Result<Self> { Ok(Self::new(conn.client().await?)) }

    pub fn client(&self) -> &Client { &self.client }
}

#[async_trait::async_trait]
impl HostClient for KubeHost {
    async fn call(&self, op: HostOperation, request: HostRequest) -> Result<Box<dyn RawResponse>, HostFailure> {
        let t0 = Instant::now();
        let req = Request::new(request.collection_path());
        let http = match &request.name {
            Some(name) if !op.is_list() => req.get(name, &GetParams::default()),
            _ => req.list(&ListParams::default()),
        }
        .map_err(HostFailure::thrown)?;
        let res = self.client.request_text(http).await;
        debug!(op = %op, path = %request.path(), ok = res.is_ok(), took_ms = %t0.elapsed().as_millis(), "kube request");
        match res {
            Ok(text) => Ok(Box::new(BufferedResponse::ok(Body::Text(text)))),
            Err(e) => Err(failure_from(e)),
        }
    }
}

/// API errors keep their status as a response-carrying failure; anything else was thrown.
pub fn failure_from(err: kube::Error) -> HostFailure {
    match err {
        kube::Error::Api(ae) => HostFailure::Response(Box::new(BufferedResponse::new(ae.code, status_body(&ae)))),
        other => HostFailure::thrown(other),
    }
}

fn status_body(ae: &ErrorResponse) -> Body {
    Body::from(serde_json::json!({
        "apiVersion": "v1",
        "kind": "Status",
        "status": ae.status,
        "code": ae.code,
        "reason": ae.reason,
        "message": ae.message,
    }))
}

/// Capabilities and discovery groups of the connected cluster.
pub async fn discover_bundle(client: &Client) -> Result<DiscoveryBundle> {
    let t0 = Instant::now();
    let info = client.apiserver_version().await.context("reading server version")?;
    let discovery = Discovery::new(client.clone()).run().await.context("running discovery")?;

    let mut api_versions = Vec::new();
    let mut groups = Vec::new();
    for group in discovery.groups() {
        let mut versions = Vec::new();
        for ver in group.versions() {
            let api_version = if group.name().is_empty() { ver.to_string() } else { format!("{}/{}", group.name(), ver) };
            api_versions.push(api_version.clone());
            let mut resources = Vec::new();
            for (ar, caps) in group.versioned_resources(ver) {
                api_versions.push(format!("{}/{}", api_version, ar.kind));
                let scope = match caps.scope {
                    discovery::Scope::Namespaced => Scope::Namespaced,
                    discovery::Scope::Cluster => Scope::Cluster,
                };
                resources.push(ResourceEntry { resource: ar.plural, kind: ar.kind, scope });
            }
            versions.push(VersionEntry { version: ver.to_string(), resources });
        }
        groups.push(GroupEntry { name: group.name().to_string(), versions });
    }
    api_versions.sort();
    api_versions.dedup();

    let capabilities = Capabilities {
        kube_version: KubeVersion { version: info.git_version, major: info.major, minor: info.minor },
        api_versions,
        helm_version: HelmVersion::current(),
    };
    info!(groups = groups.len(), took_ms = %t0.elapsed().as_millis(), "discovery bundle built");
    Ok(DiscoveryBundle { capabilities, discovery: DiscoveryDocument { groups } })
}

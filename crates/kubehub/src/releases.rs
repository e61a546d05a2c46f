//! Helm releases kept by the `secrets` storage driver.

use std::io::Read;
use std::time::Instant;

use anyhow::{Context, Result};
use base64::Engine as _;
use flate2::read::GzDecoder;
use k8s_openapi::api::core::v1::Secret;
use kube::{api::ListParams, Api, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// Label selector of release secrets.
pub const RELEASE_SELECTOR: &str = "owner=helm";
const RELEASE_KEY: &str = "release";
const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

/// Every release stored in `namespace`, in listing order. Secrets whose
/// payload cannot be decoded are skipped with a warning.
pub async fn list_releases(client: &Client, namespace: &str) -> Result<Vec<Value>> {
    let t0 = Instant::now();
    let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let secrets = api
        .list(&ListParams::default().labels(RELEASE_SELECTOR))
        .await
        .with_context(|| format!("listing release secrets in {}", namespace))?;

    let mut releases = Vec::new();
    for secret in secrets {
        let name = secret.metadata.name.clone().unwrap_or_default();
        let Some(payload) = secret.data.as_ref().and_then(|d| d.get(RELEASE_KEY)) else {
            warn!(secret = %name, "release secret has no payload");
            continue;
        };
        match decode_release(&payload.0) {
            Ok(r) => releases.push(r),
            Err(e) => warn!(secret = %name, error = %e, "skipping undecodable release"),
        }
    }
    info!(ns = %namespace, count = releases.len(), took_ms = %t0.elapsed().as_millis(), "releases listed");
    Ok(releases)
}

/// Secret payload → release JSON: base64, then gzip when the magic header is present.
pub fn decode_release(payload: &[u8]) -> Result<Value> {
    let raw = base64::engine::general_purpose::STANDARD.decode(payload).context("decoding base64")?;
    let json = if raw.starts_with(&GZIP_MAGIC) {
        let mut out = Vec::new();
        GzDecoder::new(raw.as_slice()).read_to_end(&mut out).context("inflating gzip")?;
        out
    } else {
        raw
    };
    serde_json::from_slice(&json).context("parsing release JSON")
}

/// One row of a release listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSummary {
    pub name: String,
    pub namespace: String,
    pub revision: i64,
    pub status: String,
    /// `<chart name>-<chart version>`.
    pub chart: String,
    pub app_version: String,
}

impl From<&Value> for ReleaseSummary {
    fn from(r: &Value) -> Self {
        let s = |v: &Value| v.as_str().unwrap_or("").to_string();
        let meta = &r["chart"]["metadata"];
        Self {
            name: s(&r["name"]),
            namespace: s(&r["namespace"]),
            revision: r["version"].as_i64().unwrap_or(0),
            status: s(&r["info"]["status"]),
            chart: format!("{}-{}", s(&meta["name"]), s(&meta["version"])),
            app_version: s(&meta["appVersion"]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    fn release() -> Value {
        serde_json::json!({
            "name": "web",
            "namespace": "prod",
            "version": 4,
            "info": { "status": "deployed" },
            "chart": { "metadata": { "name": "nginx", "version": "15.1.0", "appVersion": "1.25.3" } },
            "manifest": "kind: Service\n"
        })
    }

    fn encode(json: &[u8], gzip: bool) -> Vec<u8> {
        let body = if gzip {
            let mut enc = GzEncoder::new(Vec::new(), Compression::default());
            enc.write_all(json).unwrap();
            enc.finish().unwrap()
        } else {
            json.to_vec()
        };
        base64::engine::general_purpose::STANDARD.encode(body).into_bytes()
    }

    #[test]
    fn decodes_gzipped_and_plain_payloads() {
        let json = release().to_string();
        assert_eq!(decode_release(&encode(json.as_bytes(), true)).unwrap(), release());
        assert_eq!(decode_release(&encode(json.as_bytes(), false)).unwrap(), release());
    }

    #[test]
    fn rejects_corrupt_payloads() {
        assert!(decode_release(b"***").is_err());
        assert!(decode_release(&encode(b"not json", true)).is_err());
        let mut truncated = encode(release().to_string().as_bytes(), true);
        truncated.truncate(12);
        assert!(decode_release(&truncated).is_err());
    }

    #[test]
    fn summary_reads_release_fields() {
        let s = ReleaseSummary::from(&release());
        assert_eq!(s.name, "web");
        assert_eq!(s.namespace, "prod");
        assert_eq!(s.revision, 4);
        assert_eq!(s.status, "deployed");
        assert_eq!(s.chart, "nginx-15.1.0");
        assert_eq!(s.app_version, "1.25.3");
    }
}

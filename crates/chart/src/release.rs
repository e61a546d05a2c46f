//! Release options, capabilities and the top-level values handed to templates.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{Chart, Dependency, Metadata};
use crate::schema::validate_against_schema;
use crate::values::coalesce_values;
use crate::ChartError;

/// Helm release version this renderer is compatible with.
pub const HELM_COMPAT_VERSION: &str = "v3.14.4";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReleaseOptions {
    #[serde(default, alias = "name")]
    pub name: String,
    #[serde(default, alias = "namespace")]
    pub namespace: String,
    #[serde(default, alias = "revision")]
    pub revision: i64,
    #[serde(default, alias = "isUpgrade")]
    pub is_upgrade: bool,
    #[serde(default, alias = "isInstall")]
    pub is_install: bool,
}

impl ReleaseOptions {
    pub fn from_json(json: &str) -> Result<Self, ChartError> {
        crate::from_object(json).map_err(ChartError::InvalidOptions)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KubeVersion {
    #[serde(default, alias = "version")]
    pub version: String,
    #[serde(default, alias = "major")]
    pub major: String,
    #[serde(default, alias = "minor")]
    pub minor: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelmVersion {
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub git_commit: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub git_tree_state: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub go_version: String,
}

impl HelmVersion {
    /// The version reported to templates regardless of what the caller sent.
    pub fn current() -> Self {
        Self { version: HELM_COMPAT_VERSION.to_string(), git_tree_state: "clean".to_string(), ..Default::default() }
    }
}

/// What the target cluster offers, as seen by templates under `.Capabilities`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default, rename = "KubeVersion", alias = "kubeVersion")]
    pub kube_version: KubeVersion,
    #[serde(default, rename = "APIVersions", alias = "apiVersions")]
    pub api_versions: Vec<String>,
    #[serde(default, rename = "HelmVersion", alias = "helmVersion")]
    pub helm_version: HelmVersion,
}

/// `.Chart` as templates address it: the whole of `Chart.yaml` under Go field names.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChartInfo {
    pub name: String,
    pub version: String,
    #[serde(rename = "APIVersion")]
    pub api_version: String,
    pub app_version: String,
    pub description: String,
    pub kube_version: String,
    #[serde(rename = "Type")]
    pub chart_type: String,
    pub deprecated: bool,
    pub annotations: Map<String, Value>,
    pub dependencies: Vec<DependencyInfo>,
    /// `home`, `sources`, `keywords`, `maintainers`, `icon` and anything else, keys capitalized.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DependencyInfo {
    pub name: String,
    pub version: String,
    pub repository: String,
    pub condition: String,
    pub tags: Vec<String>,
    pub enabled: bool,
    pub import_values: Vec<Value>,
    pub alias: String,
}

impl From<&Dependency> for DependencyInfo {
    fn from(d: &Dependency) -> Self {
        Self {
            name: d.name.clone(),
            version: d.version.clone(),
            repository: d.repository.clone(),
            condition: d.condition.clone(),
            tags: d.tags.clone(),
            enabled: d.enabled,
            import_values: d.import_values.clone(),
            alias: d.alias.clone(),
        }
    }
}

impl From<&Metadata> for ChartInfo {
    fn from(m: &Metadata) -> Self {
        let extra = m
            .extra
            .iter()
            .map(|(k, v)| {
                let v = match (k.as_str(), v) {
                    ("maintainers", Value::Array(items)) => Value::Array(items.iter().map(go_keys).collect()),
                    _ => v.clone(),
                };
                (go_field_name(k), v)
            })
            .collect();
        Self {
            name: m.name.clone(),
            version: m.version.clone(),
            api_version: m.api_version.clone(),
            app_version: m.app_version.clone(),
            description: m.description.clone(),
            kube_version: m.kube_version.clone(),
            chart_type: m.chart_type.clone(),
            deprecated: m.deprecated,
            annotations: m.annotations.clone(),
            dependencies: m.dependencies.iter().map(DependencyInfo::from).collect(),
            extra,
        }
    }
}

/// `home` → `Home`, `url` → `URL`.
fn go_field_name(key: &str) -> String {
    if key == "url" {
        return "URL".to_string();
    }
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn go_keys(v: &Value) -> Value {
    match v {
        Value::Object(m) => Value::Object(m.iter().map(|(k, v)| (go_field_name(k), v.clone())).collect()),
        other => other.clone(),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ReleaseInfo<'a> {
    name: &'a str,
    namespace: &'a str,
    revision: i64,
    is_upgrade: bool,
    is_install: bool,
    service: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct RenderValues<'a> {
    values: Map<String, Value>,
    release: ReleaseInfo<'a>,
    capabilities: &'a Capabilities,
    chart: ChartInfo,
}

/// Top-level template values: `{Values, Release, Capabilities, Chart}`.
///
/// Fails when the coalesced values violate a chart's `values.schema.json`.
pub fn to_render_values(chart: &Chart, values: &Map<String, Value>, options: &ReleaseOptions, caps: &Capabilities) -> Result<Value, ChartError> {
    let values = coalesce_values(chart, values);
    validate_against_schema(chart, &values)?;
    let top = RenderValues {
        values,
        release: ReleaseInfo {
            name: &options.name,
            namespace: &options.namespace,
            revision: options.revision,
            is_upgrade: options.is_upgrade,
            is_install: options.is_install,
            service: "Helm",
        },
        capabilities: caps,
        chart: chart.metadata.as_ref().map(ChartInfo::from).unwrap_or_default(),
    };
    serde_json::to_value(top).map_err(|e| ChartError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn release_options_accept_go_and_camel_case() {
        let a = ReleaseOptions::from_json(r#"{"Name":"r","Namespace":"ns","Revision":2,"IsUpgrade":true}"#).unwrap();
        let b = ReleaseOptions::from_json(r#"{"name":"r","namespace":"ns","revision":2,"isUpgrade":true}"#).unwrap();
        assert_eq!(a, b);
        assert!(a.is_upgrade && !a.is_install);
        assert!(matches!(ReleaseOptions::from_json("[]"), Err(ChartError::InvalidOptions(_))));
    }

    #[test]
    fn render_values_shape() {
        let chart = Chart::from_json(&json!({ "metadata": { "name": "web", "version": "1.2.3", "apiVersion": "v2" }, "values": { "a": 1 } }).to_string()).unwrap();
        let caps = Capabilities {
            kube_version: KubeVersion { version: "v1.29.0".into(), major: "1".into(), minor: "29".into() },
            api_versions: vec!["v1".into(), "apps/v1".into()],
            helm_version: HelmVersion::current(),
        };
        let opts = ReleaseOptions { name: "rel".into(), namespace: "prod".into(), revision: 1, is_install: true, ..Default::default() };
        let v = to_render_values(&chart, json!({ "b": 2 }).as_object().unwrap(), &opts, &caps).unwrap();

        assert_eq!(v["Values"], json!({ "a": 1, "b": 2 }));
        assert_eq!(v["Release"]["Service"], "Helm");
        assert_eq!(v["Release"]["Namespace"], "prod");
        assert_eq!(v["Release"]["IsInstall"], true);
        assert_eq!(v["Chart"]["Name"], "web");
        assert_eq!(v["Chart"]["APIVersion"], "v2");
        assert_eq!(v["Capabilities"]["KubeVersion"]["Minor"], "29");
        assert_eq!(v["Capabilities"]["APIVersions"][1], "apps/v1");
        assert_eq!(v["Capabilities"]["HelmVersion"]["version"], HELM_COMPAT_VERSION);
    }

    #[test]
    fn chart_info_carries_all_metadata() {
        let chart = Chart::from_json(
            &json!({ "metadata": {
                "name": "web",
                "home": "https://example.com",
                "sources": ["https://git.example.com/web"],
                "keywords": ["http", "proxy"],
                "icon": "https://example.com/icon.png",
                "maintainers": [{ "name": "ops", "email": "ops@example.com", "url": "https://example.com/ops" }],
                "dependencies": [{ "name": "db", "condition": "db.enabled", "alias": "database" }]
            }})
            .to_string(),
        )
        .unwrap();
        let v = to_render_values(&chart, &Map::new(), &ReleaseOptions::default(), &Capabilities::default()).unwrap();
        let c = &v["Chart"];
        assert_eq!(c["Home"], "https://example.com");
        assert_eq!(c["Sources"][0], "https://git.example.com/web");
        assert_eq!(c["Keywords"], json!(["http", "proxy"]));
        assert_eq!(c["Icon"], "https://example.com/icon.png");
        assert_eq!(c["Maintainers"][0], json!({ "Name": "ops", "Email": "ops@example.com", "URL": "https://example.com/ops" }));
        assert_eq!(c["Dependencies"][0]["Condition"], "db.enabled");
        assert_eq!(c["Dependencies"][0]["Alias"], "database");
        assert!(c.get("home").is_none());
    }

    #[test]
    fn schema_violations_abort_render_values() {
        let mut chart = Chart::from_json(&json!({ "metadata": { "name": "web" }, "values": { "replicas": 1 } }).to_string()).unwrap();
        chart.schema = json!({ "properties": { "replicas": { "type": "integer" } } }).to_string().into_bytes();
        let opts = ReleaseOptions::default();
        let caps = Capabilities::default();

        to_render_values(&chart, &Map::new(), &opts, &caps).unwrap();
        let err = to_render_values(&chart, json!({ "replicas": "many" }).as_object().unwrap(), &opts, &caps).unwrap_err();
        assert!(matches!(err, ChartError::Schema(_)));
    }
}

//! Serialized chart model.

use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::ChartError;

/// A packaged chart as exchanged in JSON form.
///
/// Attached subcharts live in `dependencies` and are never serialized: echoing a
/// chart returns only its own content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chart {
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub lock: Option<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub templates: Vec<File>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub values: Map<String, Value>,
    #[serde(default, with = "b64")]
    pub schema: Vec<u8>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub files: Vec<File>,
    #[serde(skip)]
    dependencies: Vec<Chart>,
}

/// Named file with a base64-encoded payload on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub name: String,
    #[serde(default, with = "b64")]
    pub data: Vec<u8>,
}

impl File {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self { Self { name: name.into(), data: data.into() } }
}

/// `Chart.yaml` contents. Fields this crate does not interpret are kept in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kube_version: String,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub chart_type: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
    #[serde(default, skip_serializing_if = "Map::is_empty", deserialize_with = "null_as_default")]
    pub annotations: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "null_as_default")]
    pub dependencies: Vec<Dependency>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One `dependencies:` entry of `Chart.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repository: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub condition: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub enabled: bool,
    #[serde(default, rename = "import-values", skip_serializing_if = "Vec::is_empty", deserialize_with = "null_as_default")]
    pub import_values: Vec<Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alias: String,
}

/// A custom resource definition file shipped under `crds/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CrdObject {
    pub name: String,
    /// Path of the file prefixed with the full path of the owning chart.
    pub filename: String,
    pub file: File,
}

impl Chart {
    pub fn from_json(json: &str) -> Result<Self, ChartError> {
        crate::from_object(json).map_err(ChartError::Parse)
    }

    pub fn to_json(&self) -> Result<String, ChartError> {
        serde_json::to_string(self).map_err(|e| ChartError::Encode(e.to_string()))
    }

    pub fn name(&self) -> &str { self.metadata.as_ref().map(|m| m.name.as_str()).unwrap_or("") }

    pub fn dependencies(&self) -> &[Chart] { &self.dependencies }

    pub fn dependencies_mut(&mut self) -> &mut Vec<Chart> { &mut self.dependencies }

    pub fn add_dependency(&mut self, chart: Chart) { self.dependencies.push(chart); }

    pub fn set_dependencies(&mut self, charts: Vec<Chart>) { self.dependencies = charts; }

    /// Every CRD file of this chart and its attached subcharts, parents first.
    pub fn crd_objects(&self) -> Vec<CrdObject> {
        let mut out = Vec::new();
        self.collect_crds(self.name(), &mut out);
        out
    }

    fn collect_crds(&self, full_path: &str, out: &mut Vec<CrdObject>) {
        for f in self.files.iter().filter(|f| is_crd_file(&f.name)) {
            out.push(CrdObject { name: f.name.clone(), filename: format!("{}/{}", full_path, f.name), file: f.clone() });
        }
        for dep in &self.dependencies {
            dep.collect_crds(&chart_full_path(full_path, dep.name()), out);
        }
    }
}

/// Full path of a subchart below its parent's full path: `root/charts/sub`.
pub fn chart_full_path(parent: &str, name: &str) -> String {
    if parent.is_empty() { name.to_string() } else { format!("{}/charts/{}", parent, name) }
}

fn is_crd_file(name: &str) -> bool {
    name.starts_with("crds/") && [".yaml", ".yml", ".json"].iter().any(|ext| name.ends_with(ext))
}

fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

mod b64 {
    use super::*;

    pub fn serialize<S: Serializer>(data: &[u8], s: S) -> Result<S::Ok, S::Error> {
        if data.is_empty() {
            return s.serialize_none();
        }
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(s) => base64::engine::general_purpose::STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}

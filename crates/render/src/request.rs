//! Render inputs in parsed and serialized form.

use std::collections::BTreeMap;

use helmlet_chart::{parse_values, Capabilities, Chart, ReleaseOptions};
use helmlet_discovery::DiscoveryDocument;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::RenderError;

/// Capabilities and discovery groups as one payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryBundle {
    #[serde(flatten)]
    pub capabilities: Capabilities,
    #[serde(flatten)]
    pub discovery: DiscoveryDocument,
}

impl DiscoveryBundle {
    pub fn from_json(json: &str) -> Result<Self, RenderError> {
        serde_json::from_str(json).map_err(|e| RenderError::Discovery(e.to_string()))
    }
}

/// The four serialized arguments of a render call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SerializedRender {
    /// Index 0 is the root chart; the rest are attached as its subcharts.
    pub charts: Vec<String>,
    pub values: String,
    pub options: String,
    pub bundle: String,
}

#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Root chart with its subcharts attached.
    pub chart: Chart,
    pub values: Map<String, Value>,
    pub options: ReleaseOptions,
    pub bundle: DiscoveryBundle,
}

impl RenderRequest {
    pub fn from_serialized(input: &SerializedRender) -> Result<Self, RenderError> {
        let (root, subcharts) = input.charts.split_first().ok_or(RenderError::NoChart)?;
        let mut chart = Chart::from_json(root)?;
        for sub in subcharts {
            chart.add_dependency(Chart::from_json(sub)?);
        }
        Ok(Self {
            chart,
            values: parse_values(&input.values)?,
            options: ReleaseOptions::from_json(&input.options)?,
            bundle: DiscoveryBundle::from_json(&input.bundle)?,
        })
    }
}

/// Rendered files plus the chart and CRD echoes, both as JSON text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderResult {
    pub files: BTreeMap<String, String>,
    pub chart: String,
    pub crds: String,
}

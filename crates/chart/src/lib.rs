//! Helmlet chart model: JSON charts, subchart attachment, dependency enablement,
//! values coalescing and the render values handed to the templating engine.

#![forbid(unsafe_code)]

mod dependencies;
mod model;
mod release;
mod schema;
mod values;

pub use dependencies::process_dependencies;
pub use model::{chart_full_path, Chart, CrdObject, Dependency, File, Metadata};
pub use release::{to_render_values, Capabilities, ChartInfo, DependencyInfo, HelmVersion, KubeVersion, ReleaseOptions, HELM_COMPAT_VERSION};
pub use schema::validate_against_schema;
pub use values::{coalesce_values, path_value, GLOBAL_KEY};

use serde::de::DeserializeOwned;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    #[error("invalid chart: {0}")]
    Parse(String),
    #[error("invalid values: {0}")]
    InvalidValues(String),
    #[error("invalid release options: {0}")]
    InvalidOptions(String),
    #[error("values don't meet the specifications of the schema(s) in the following chart(s):\n{0}")]
    Schema(String),
    #[error("encode: {0}")]
    Encode(String),
}

/// Deserialize a JSON object into `T`. Arrays and scalars are rejected even
/// when every field of `T` has a default.
pub(crate) fn from_object<T: DeserializeOwned>(json: &str) -> Result<T, String> {
    match serde_json::from_str::<Value>(json).map_err(|e| e.to_string())? {
        v @ Value::Object(_) => serde_json::from_value(v).map_err(|e| e.to_string()),
        other => Err(format!("expected an object, got {}", json_type(&other))),
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Parse a caller-supplied values document. `null` and an empty string are empty values.
pub fn parse_values(json: &str) -> Result<serde_json::Map<String, Value>, ChartError> {
    if json.trim().is_empty() {
        return Ok(Default::default());
    }
    match serde_json::from_str::<Value>(json).map_err(|e| ChartError::InvalidValues(e.to_string()))? {
        Value::Object(m) => Ok(m),
        Value::Null => Ok(Default::default()),
        other => Err(ChartError::InvalidValues(format!("expected an object, got {}", json_type(&other)))),
    }
}

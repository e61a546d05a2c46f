//! `values.schema.json` validation of coalesced values.

use jsonschema::{Draft, JSONSchema};
use serde_json::{Map, Value};
use tracing::debug;

use crate::model::Chart;
use crate::ChartError;

/// Check `values` against the schema of `chart` and, under each subchart's
/// section, against the schemas of its attached subcharts.
///
/// Charts without a schema are skipped. All violations are collected before
/// failing, grouped per chart.
pub fn validate_against_schema(chart: &Chart, values: &Map<String, Value>) -> Result<(), ChartError> {
    let mut report = String::new();
    collect_violations(chart, values, &mut report);
    if report.is_empty() { Ok(()) } else { Err(ChartError::Schema(report)) }
}

fn collect_violations(chart: &Chart, values: &Map<String, Value>, report: &mut String) {
    if !chart.schema.is_empty() {
        if let Err(issues) = validate_single(&chart.schema, values) {
            debug!(chart = %chart.name(), "values rejected by schema");
            report.push_str(&format!("{}:\n{}", chart.name(), issues));
        }
    }
    let empty = Map::new();
    for sub in chart.dependencies() {
        let section = values.get(sub.name()).and_then(Value::as_object).unwrap_or(&empty);
        collect_violations(sub, section, report);
    }
}

/// One `- <path>: <error>` line per violation.
fn validate_single(schema: &[u8], values: &Map<String, Value>) -> Result<(), String> {
    let schema: Value = serde_json::from_slice(schema).map_err(|e| format!("- (root): invalid schema: {}\n", e))?;
    let compiled = JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(&schema)
        .map_err(|e| format!("- (root): invalid schema: {}\n", e))?;
    let instance = Value::Object(values.clone());
    let result = compiled.validate(&instance);
    if let Err(errors) = result {
        let mut out = String::new();
        for err in errors {
            let path = err.instance_path.to_string();
            let path = if path.is_empty() { "(root)".to_string() } else { path.trim_start_matches('/').replace('/', ".") };
            out.push_str(&format!("- {}: {}\n", path, err));
        }
        return Err(out);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chart(name: &str, schema: Option<Value>) -> Chart {
        let mut c = Chart::from_json(&json!({ "metadata": { "name": name } }).to_string()).unwrap();
        c.schema = schema.map(|s| s.to_string().into_bytes()).unwrap_or_default();
        c
    }

    fn map(v: Value) -> Map<String, Value> { v.as_object().cloned().unwrap() }

    fn replicas_schema() -> Value {
        json!({
            "type": "object",
            "required": ["replicas"],
            "properties": { "replicas": { "type": "integer", "minimum": 1 } }
        })
    }

    #[test]
    fn conforming_values_pass() {
        let c = chart("web", Some(replicas_schema()));
        validate_against_schema(&c, &map(json!({ "replicas": 2, "extra": true }))).unwrap();
        validate_against_schema(&chart("plain", None), &map(json!({ "anything": [1] }))).unwrap();
    }

    #[test]
    fn violations_name_the_chart_and_path() {
        let c = chart("web", Some(replicas_schema()));
        let err = validate_against_schema(&c, &map(json!({ "replicas": "two" }))).unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("values don't meet the specifications of the schema(s) in the following chart(s):\nweb:\n- replicas: "), "{}", msg);

        let err = validate_against_schema(&c, &Map::new()).unwrap_err();
        assert!(err.to_string().contains("- (root): "), "{}", err);
    }

    #[test]
    fn subchart_schema_sees_its_own_section() {
        let mut root = chart("web", None);
        root.add_dependency(chart("db", Some(replicas_schema())));

        validate_against_schema(&root, &map(json!({ "db": { "replicas": 3 } }))).unwrap();
        let err = validate_against_schema(&root, &map(json!({ "db": { "replicas": 0 } }))).unwrap_err();
        assert!(err.to_string().contains("db:\n- replicas: "), "{}", err);
    }

    #[test]
    fn unparseable_schema_is_reported() {
        let mut c = chart("web", None);
        c.schema = b"{ nope".to_vec();
        assert!(matches!(validate_against_schema(&c, &Map::new()), Err(ChartError::Schema(_))));
    }
}

//! One render: chart state in, filtered files out.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use helmlet_bridge::LookupBackend;
use helmlet_chart::{process_dependencies, to_render_values, Chart, HelmVersion};
use metrics::{counter, histogram};
use tracing::{debug, info};

use crate::request::{RenderRequest, RenderResult};
use crate::RenderError;

pub type EngineError = Box<dyn std::error::Error + Send + Sync>;

/// The templating engine. Substitution semantics are entirely its own; in-template
/// lookups go through `lookup`, which blocks until the host answers.
pub trait TemplateEngine: Send + Sync {
    fn render(&self, chart: &Chart, values: &serde_json::Value, lookup: &dyn LookupBackend) -> Result<BTreeMap<String, String>, EngineError>;
}

#[derive(Clone)]
pub struct RenderOrchestrator {
    engine: Arc<dyn TemplateEngine>,
}

impl RenderOrchestrator {
    pub fn new(engine: Arc<dyn TemplateEngine>) -> Self { Self { engine } }

    /// Run one render. Must be called off the async runtime's worker threads,
    /// since engine lookups block.
    pub fn render(&self, request: RenderRequest, lookup: &dyn LookupBackend) -> Result<RenderResult, RenderError> {
        let t0 = Instant::now();
        let RenderRequest { mut chart, values, options, bundle } = request;
        info!(chart = %chart.name(), release = %options.name, ns = %options.namespace, subcharts = chart.dependencies().len(), "render start");

        process_dependencies(&mut chart, &values);
        let mut caps = bundle.capabilities;
        caps.helm_version = HelmVersion::current();
        let render_values = to_render_values(&chart, &values, &options, &caps)?;

        let crds = serde_json::to_string(&chart.crd_objects()).map_err(|e| RenderError::Encode(e.to_string()))?;
        let chart_json = chart.to_json()?;

        let rendered = self.engine.render(&chart, &render_values, lookup).map_err(RenderError::Engine)?;
        let total = rendered.len();
        let files = trim_outputs(rendered);
        let dropped = total - files.len();
        if dropped > 0 {
            counter!("helmlet_render_files_dropped_total", dropped as u64);
            debug!(dropped, "blank outputs dropped");
        }
        histogram!("helmlet_render_ms", t0.elapsed().as_secs_f64() * 1000.0);
        info!(chart = %chart.name(), files = files.len(), dropped, took_ms = %t0.elapsed().as_millis(), "render done");
        Ok(RenderResult { files, chart: chart_json, crds })
    }
}

/// Trim every output and keep only those with content left.
pub fn trim_outputs(rendered: BTreeMap<String, String>) -> BTreeMap<String, String> {
    rendered
        .into_iter()
        .filter_map(|(path, text)| {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| (path, trimmed.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_outputs_are_dropped() {
        let mut m = BTreeMap::new();
        m.insert("web/templates/cm.yaml".to_string(), "\n---\nkind: ConfigMap\n\n".to_string());
        m.insert("web/templates/NOTES.txt".to_string(), " \n\t\n".to_string());
        m.insert("web/templates/empty.yaml".to_string(), String::new());
        let out = trim_outputs(m);
        assert_eq!(out.len(), 1);
        assert_eq!(out["web/templates/cm.yaml"], "---\nkind: ConfigMap");
    }
}

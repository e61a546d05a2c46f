//! Dependency enablement: aliases, `condition` and `tags`.

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::model::{Chart, Dependency};
use crate::values::{coalesce_values, path_value};

/// Resolve aliases and drop subcharts disabled by `condition` or `tags`, recursively.
///
/// Subcharts not declared in `Chart.yaml` are kept as-is. At each level the
/// aliased subcharts are attached first and the values coalesced afterwards, so
/// conditions see an aliased subchart's defaults under its alias. Conditions
/// are dotted paths relative to the chart being processed; the first boolean
/// found decides. `import-values` is ignored.
pub fn process_dependencies(chart: &mut Chart, values: &Map<String, Value>) {
    process_enabled(chart, values, "");
}

fn process_enabled(chart: &mut Chart, values: &Map<String, Value>, path: &str) {
    if chart.metadata.as_ref().map_or(true, |m| m.dependencies.is_empty()) {
        return;
    }
    let attached = std::mem::take(chart.dependencies_mut());
    let Some(meta) = chart.metadata.as_mut() else { return };
    let declared: HashSet<String> = meta.dependencies.iter().map(|d| d.name.clone()).collect();

    let mut aliased: Vec<Chart> = attached.iter().filter(|c| !declared.contains(c.name())).cloned().collect();
    for req in meta.dependencies.iter_mut() {
        if let Some(c) = alias_dependency(&attached, req) {
            aliased.push(c);
        }
        if !req.alias.is_empty() {
            req.name = req.alias.clone();
        }
        req.enabled = true;
    }
    if meta.dependencies.iter().any(|d| !d.import_values.is_empty()) {
        warn!(chart = %meta.name, "import-values is not supported; ignoring");
    }
    chart.set_dependencies(aliased);

    let cvals = coalesce_values(chart, values);
    let Some(meta) = chart.metadata.as_mut() else { return };
    apply_tags(&mut meta.dependencies, &cvals);
    apply_conditions(&mut meta.dependencies, &cvals, path);

    let disabled: HashSet<String> = meta.dependencies.iter().filter(|d| !d.enabled).map(|d| d.name.clone()).collect();
    if !disabled.is_empty() {
        debug!(chart = %meta.name, disabled = ?disabled, "subcharts disabled");
    }
    meta.dependencies.retain(|d| !disabled.contains(&d.name));

    let mut kept = std::mem::take(chart.dependencies_mut());
    kept.retain(|c| !disabled.contains(c.name()));
    for sub in kept.iter_mut() {
        let subpath = format!("{}{}.", path, sub.name());
        process_enabled(sub, &cvals, &subpath);
    }
    chart.set_dependencies(kept);
}

/// The attached chart a declaration refers to, renamed to its alias when one is set.
fn alias_dependency(attached: &[Chart], req: &Dependency) -> Option<Chart> {
    let found = attached.iter().find(|c| c.name() == req.name)?;
    let mut c = found.clone();
    if !req.alias.is_empty() {
        if let Some(meta) = c.metadata.as_mut() {
            meta.name = req.alias.clone();
        }
    }
    Some(c)
}

fn apply_tags(deps: &mut [Dependency], cvals: &Map<String, Value>) {
    let Some(Value::Object(tags)) = cvals.get("tags") else { return };
    for dep in deps.iter_mut() {
        let (mut has_true, mut has_false) = (false, false);
        for tag in &dep.tags {
            match tags.get(tag) {
                Some(Value::Bool(true)) => has_true = true,
                Some(Value::Bool(false)) => has_false = true,
                Some(other) => warn!(tag = %tag, dependency = %dep.name, value = %other, "tag is not a boolean"),
                None => {}
            }
        }
        dep.enabled = has_true || !has_false;
    }
}

fn apply_conditions(deps: &mut [Dependency], cvals: &Map<String, Value>, path: &str) {
    for dep in deps.iter_mut() {
        for cond in dep.condition.trim().split(',').map(str::trim).filter(|c| !c.is_empty()) {
            match path_value(cvals, &format!("{}{}", path, cond)) {
                Some(Value::Bool(b)) => {
                    dep.enabled = *b;
                    break;
                }
                Some(other) => warn!(condition = %cond, dependency = %dep.name, value = %other, "condition path returned a non-boolean value"),
                None => {}
            }
        }
    }
}

//! Values coalescing: caller values layered over chart defaults, recursively into subcharts.

use serde_json::{Map, Value};
use tracing::warn;

use crate::model::Chart;

pub const GLOBAL_KEY: &str = "global";

/// Merge `values` over the defaults of `chart` and of every attached subchart.
///
/// Caller values win. An explicit `null` removes the default it overrides.
/// Each subchart's section is found under its name and receives the parent's
/// `global` table.
pub fn coalesce_values(chart: &Chart, values: &Map<String, Value>) -> Map<String, Value> {
    let mut dest = values.clone();
    coalesce(chart, &mut dest, chart.name());
    dest
}

fn coalesce(chart: &Chart, dest: &mut Map<String, Value>, prefix: &str) {
    coalesce_defaults(&chart.values, dest, prefix);
    for sub in chart.dependencies() {
        let name = sub.name().to_string();
        let entry = dest.entry(name.clone()).or_insert_with(|| Value::Object(Map::new()));
        if entry.is_null() {
            *entry = Value::Object(Map::new());
        }
        let globals = dest.get(GLOBAL_KEY).cloned();
        let Some(Value::Object(section)) = dest.get_mut(&name) else {
            warn!(chart = %prefix, subchart = %name, "skipping subchart values: not a table");
            continue;
        };
        coalesce_globals(section, globals.as_ref(), prefix);
        coalesce(sub, section, &format!("{}.{}", prefix, name));
    }
}

/// Fill `dest` from `defaults`. `dest` wins; `null` in `dest` deletes the key.
fn coalesce_defaults(defaults: &Map<String, Value>, dest: &mut Map<String, Value>, prefix: &str) {
    for (key, default) in defaults {
        match dest.get_mut(key) {
            None => {
                dest.insert(key.clone(), default.clone());
            }
            Some(Value::Null) => {
                dest.remove(key);
            }
            Some(Value::Object(over)) => match default {
                Value::Object(inner) => coalesce_defaults(inner, over, &format!("{}.{}", prefix, key)),
                Value::Null => {}
                _ => warn!(key = %format!("{}.{}", prefix, key), "cannot overwrite a non-table default with a table"),
            },
            Some(_) => {
                if default.is_object() {
                    warn!(key = %format!("{}.{}", prefix, key), "cannot overwrite a table default with a non-table value");
                }
            }
        }
    }
}

/// Copy the parent's `global` table into a subchart section. Parent globals win.
fn coalesce_globals(section: &mut Map<String, Value>, parent: Option<&Value>, prefix: &str) {
    let parent = match parent {
        None => return,
        Some(Value::Object(g)) => g,
        Some(_) => {
            warn!(chart = %prefix, "skipping globals: parent global is not a table");
            return;
        }
    };
    let dest = section.entry(GLOBAL_KEY.to_string()).or_insert_with(|| Value::Object(Map::new()));
    let Value::Object(dest) = dest else {
        warn!(chart = %prefix, "skipping globals: subchart global is not a table");
        return;
    };
    for (key, val) in parent {
        let conflict = match (val, dest.get_mut(key)) {
            (Value::Object(pv), Some(Value::Object(dv))) => {
                let mut merged = pv.clone();
                coalesce_defaults(dv, &mut merged, prefix);
                *dv = merged;
                continue;
            }
            (Value::Object(_), Some(_)) | (_, Some(Value::Object(_))) => true,
            _ => false,
        };
        if conflict {
            warn!(chart = %prefix, key = %key, "global conflict between table and non-table; keeping subchart value");
        } else {
            dest.insert(key.clone(), val.clone());
        }
    }
}

/// Value at a dotted path such as `db.enabled`.
pub fn path_value<'a>(values: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut cur = values.get(parts.next()?)?;
    for p in parts {
        cur = cur.as_object()?.get(p)?;
    }
    Some(cur)
}

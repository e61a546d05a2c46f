use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine as _;
use helmlet_bridge::{lookup, LookupBackend, MockHost, MockReply};
use helmlet_chart::{Chart, HELM_COMPAT_VERSION};
use helmlet_core::BridgeConfig;
use helmlet_render::{EngineError, Renderer, SerializedRender, TemplateEngine};
use serde_json::{json, Value};

/// Emits each template verbatim under `<chart>/<template>`, and for every
/// `lookups` entry in the values performs a lookup and writes its JSON out.
#[derive(Default)]
struct StubEngine {
    seen: Mutex<Option<Value>>,
}

impl TemplateEngine for StubEngine {
    fn render(&self, chart: &Chart, values: &Value, backend: &dyn LookupBackend) -> Result<BTreeMap<String, String>, EngineError> {
        *self.seen.lock().unwrap() = Some(values.clone());
        let mut out = BTreeMap::new();
        for t in &chart.templates {
            out.insert(format!("{}/{}", chart.name(), t.name), String::from_utf8(t.data.clone())?);
        }
        for sub in chart.dependencies() {
            for t in &sub.templates {
                out.insert(format!("{}/charts/{}/{}", chart.name(), sub.name(), t.name), String::from_utf8(t.data.clone())?);
            }
        }
        if let Some(lookups) = values["Values"]["lookups"].as_array() {
            for (i, l) in lookups.iter().enumerate() {
                let s = |k: &str| l[k].as_str().unwrap_or("").to_string();
                let found = lookup(backend, &s("apiVersion"), &s("kind"), &s("namespace"), &s("name"))?;
                out.insert(format!("lookup-{}", i), found.to_string());
            }
        }
        if values["Values"]["explode"] == json!(true) {
            panic!("engine exploded");
        }
        Ok(out)
    }
}

fn b64(s: &str) -> String { base64::engine::general_purpose::STANDARD.encode(s) }

fn chart(name: &str, templates: &[(&str, &str)], files: &[(&str, &str)], deps: Value) -> String {
    json!({
        "metadata": { "name": name, "version": "0.1.0", "apiVersion": "v2", "dependencies": deps },
        "templates": templates.iter().map(|(n, d)| json!({ "name": n, "data": b64(d) })).collect::<Vec<_>>(),
        "files": files.iter().map(|(n, d)| json!({ "name": n, "data": b64(d) })).collect::<Vec<_>>(),
        "values": { "replicas": 1 }
    })
    .to_string()
}

fn bundle() -> String {
    json!({
        "KubeVersion": { "Version": "v1.29.2", "Major": "1", "Minor": "29" },
        "APIVersions": ["v1", "apps/v1"],
        "HelmVersion": { "version": "v9.9.9" },
        "groups": [
            { "name": "", "versions": [{ "version": "v1", "resources": [
                { "resource": "configmaps", "kind": "ConfigMap", "scope": "Namespaced" },
                { "resource": "namespaces", "kind": "Namespace", "scope": "Cluster" }
            ]}]}
        ]
    })
    .to_string()
}

fn input(values: Value) -> SerializedRender {
    SerializedRender {
        charts: vec![
            chart("web", &[("templates/cm.yaml", "\n\nkind: ConfigMap\n"), ("templates/NOTES.txt", "  \n \n")], &[("crds/widget.yaml", "kind: CustomResourceDefinition")], json!([{ "name": "db", "condition": "db.enabled" }])),
            chart("db", &[("templates/svc.yaml", "kind: Service")], &[("crds/db.yml", "kind: CustomResourceDefinition")], json!(null)),
        ],
        values: values.to_string(),
        options: json!({ "Name": "rel", "Namespace": "prod", "Revision": 3, "IsInstall": true }).to_string(),
        bundle: bundle(),
    }
}

fn renderer(engine: Arc<StubEngine>, host: Arc<MockHost>) -> Renderer {
    Renderer::new(engine, host, BridgeConfig::default().with_lookup_timeout(Some(Duration::from_secs(5))))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn renders_drops_blank_outputs_and_echoes_chart_and_crds() {
    let engine = Arc::new(StubEngine::default());
    let r = renderer(engine.clone(), Arc::new(MockHost::new()));
    let out = r.render_template(input(json!({}))).await.unwrap();

    assert_eq!(out.files.keys().collect::<Vec<_>>(), vec!["web/charts/db/templates/svc.yaml", "web/templates/cm.yaml"]);
    assert_eq!(out.files["web/templates/cm.yaml"], "kind: ConfigMap");

    let chart: Value = serde_json::from_str(&out.chart).unwrap();
    assert_eq!(chart["metadata"]["name"], "web");
    assert!(chart.get("dependencies").is_none());

    let crds: Value = serde_json::from_str(&out.crds).unwrap();
    let names: Vec<_> = crds.as_array().unwrap().iter().map(|c| c["Filename"].as_str().unwrap().to_string()).collect();
    assert_eq!(names, vec!["web/crds/widget.yaml", "web/charts/db/crds/db.yml"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn helm_version_is_forced_and_release_is_passed_through() {
    let engine = Arc::new(StubEngine::default());
    let r = renderer(engine.clone(), Arc::new(MockHost::new()));
    r.render_template(input(json!({ "replicas": 4 }))).await.unwrap();

    let seen = engine.seen.lock().unwrap().clone().unwrap();
    assert_eq!(seen["Capabilities"]["HelmVersion"]["version"], HELM_COMPAT_VERSION);
    assert_eq!(seen["Capabilities"]["KubeVersion"]["Version"], "v1.29.2");
    assert_eq!(seen["Release"]["Name"], "rel");
    assert_eq!(seen["Release"]["Revision"], 3);
    assert_eq!(seen["Release"]["Service"], "Helm");
    assert_eq!(seen["Values"]["replicas"], 4);
    assert_eq!(seen["Values"]["db"]["replicas"], 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disabled_subchart_is_not_rendered() {
    let r = renderer(Arc::new(StubEngine::default()), Arc::new(MockHost::new()));
    let out = r.render_template(input(json!({ "db": { "enabled": false } }))).await.unwrap();
    assert_eq!(out.files.keys().collect::<Vec<_>>(), vec!["web/templates/cm.yaml"]);
    let crds: Value = serde_json::from_str(&out.crds).unwrap();
    assert_eq!(crds.as_array().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn template_lookups_go_through_the_host() {
    let host = Arc::new(MockHost::new());
    host.route(
        "/api/v1/namespaces/prod/configmaps/settings",
        MockReply::After(Duration::from_millis(10), Box::new(MockReply::json(json!({ "apiVersion": "v1", "kind": "ConfigMap", "metadata": { "name": "settings" }, "data": { "color": "blue" } })))),
    );
    let r = renderer(Arc::new(StubEngine::default()), host.clone());
    let values = json!({ "lookups": [
        { "apiVersion": "v1", "kind": "ConfigMap", "namespace": "prod", "name": "settings" },
        { "apiVersion": "v1", "kind": "ConfigMap", "namespace": "prod", "name": "absent" }
    ]});
    let out = r.render_template(input(values)).await.unwrap();

    let found: Value = serde_json::from_str(&out.files["lookup-0"]).unwrap();
    assert_eq!(found["data"]["color"], "blue");
    assert_eq!(out.files["lookup-1"], "{}");
    assert_eq!(host.calls().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lookup_failures_abort_the_render() {
    let host = Arc::new(MockHost::new());
    host.route("/api/v1/namespaces/prod/configmaps/locked", MockReply::status(403, "Forbidden", "configmaps \"locked\" is forbidden"));
    let r = renderer(Arc::new(StubEngine::default()), host);

    let err = r
        .render_template(input(json!({ "lookups": [{ "apiVersion": "v1", "kind": "ConfigMap", "namespace": "prod", "name": "locked" }] })))
        .await
        .unwrap_err();
    assert!(err.message.starts_with("cannot render template"));
    assert!(err.trace.contains("is forbidden"), "{}", err.trace);
    assert_eq!(err.trace.matches("is forbidden").count(), 1, "{}", err.trace);

    let err = r
        .render_template(input(json!({ "lookups": [{ "apiVersion": "example.com/v1", "kind": "Widget", "name": "w" }] })))
        .await
        .unwrap_err();
    assert!(err.trace.contains("kind unsupported by cluster"), "{}", err.trace);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hanging_lookup_is_cancelled() {
    let host = Arc::new(MockHost::new());
    host.route("/api/v1/namespaces/prod/configmaps/slow", MockReply::Hang);
    let r = Renderer::new(Arc::new(StubEngine::default()), host, BridgeConfig::default().with_lookup_timeout(None));
    let token = tokio_util::sync::CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        canceller.cancel();
    });
    let err = r
        .render_template_with_cancel(input(json!({ "lookups": [{ "apiVersion": "v1", "kind": "ConfigMap", "namespace": "prod", "name": "slow" }] })), token)
        .await
        .unwrap_err();
    assert!(err.trace.contains("cancelled"), "{}", err.trace);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn values_failing_the_schema_reject_before_the_engine_runs() {
    let engine = Arc::new(StubEngine::default());
    let r = renderer(engine.clone(), Arc::new(MockHost::new()));
    let mut req = input(json!({ "replicas": "three" }));
    let mut root: Value = serde_json::from_str(&req.charts[0]).unwrap();
    root["schema"] = json!(b64(&json!({ "properties": { "replicas": { "type": "integer" } } }).to_string()));
    req.charts[0] = root.to_string();

    let err = r.render_template(req).await.unwrap_err();
    assert!(err.message.contains("values don't meet the specifications of the schema(s)"), "{}", err.message);
    assert!(err.message.contains("web:\n- replicas: "), "{}", err.message);
    assert!(engine.seen.lock().unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_inputs_and_panics_reject() {
    let r = renderer(Arc::new(StubEngine::default()), Arc::new(MockHost::new()));

    let mut bad = input(json!({}));
    bad.charts[0] = "{not json".into();
    assert!(r.render_template(bad).await.unwrap_err().message.contains("invalid chart"));

    let mut bad = input(json!({}));
    bad.charts[0] = "[]".into();
    let err = r.render_template(bad).await.unwrap_err();
    assert!(err.message.contains("invalid chart: expected an object, got an array"), "{}", err.message);

    let mut bad = input(json!({}));
    bad.options = "[]".into();
    assert!(r.render_template(bad).await.unwrap_err().message.contains("invalid release options"));

    let mut bad = input(json!({}));
    bad.bundle = r#"{"groups": 7}"#.into();
    assert!(r.render_template(bad).await.unwrap_err().message.contains("invalid discovery data"));

    let err = r.render_template(input(json!({ "explode": true }))).await.unwrap_err();
    assert!(err.message.contains("engine exploded"));
}

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use helmlet_bridge::{lookup, AsyncCallBridge, ClientProvider};
use helmlet_core::BridgeConfig;
use helmlet_discovery::DiscoveryIndex;
use helmlet_kubehub::{discover_bundle, list_releases, ConnectionConfig, KubeHost, ReleaseSummary};
use helmlet_render::DiscoveryBundle;
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "helmletctl", version, about = "Helmlet CLI: discovery, resolution and template lookups")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Namespace for lookups of namespaced kinds and for `releases`
    #[arg(long = "ns", global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json, Yaml }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the capabilities and discovery bundle of the current cluster
    Discover,
    /// Resolve apiVersion/kind to its REST resource
    Resolve {
        /// e.g. "v1" or "apps/v1"
        api_version: String,
        kind: String,
        /// Resolve against a bundle file instead of the live cluster
        #[arg(long = "discovery")]
        discovery: Option<std::path::PathBuf>,
    },
    /// Fetch one object the way a template `lookup` does
    Get {
        api_version: String,
        kind: String,
        name: String,
    },
    /// List objects the way a template `lookup` with an empty name does
    List {
        api_version: String,
        kind: String,
    },
    /// List the Helm releases stored in a namespace (default: `default`)
    Releases,
}

#[derive(Serialize)]
struct Resolved {
    api_version: String,
    kind: String,
    group: String,
    version: String,
    plural: String,
    namespaced: bool,
}

fn init_tracing() {
    let env = std::env::var("HELMLET_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("HELMLET_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid HELMLET_METRICS_ADDR; expected host:port");
        }
    }
}

fn emit<T: Serialize>(output: Output, value: &T) -> Result<()> {
    match output {
        Output::Yaml => print!("{}", serde_yaml::to_string(value)?),
        _ => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

fn load_bundle(path: &std::path::Path) -> Result<DiscoveryBundle> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    DiscoveryBundle::from_json(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Human listing of a lookup result: one row per object.
fn print_objects(found: &serde_json::Value) {
    let rows: Vec<&serde_json::Value> = match found.get("items").and_then(|i| i.as_array()) {
        Some(items) => items.iter().collect(),
        None if found.as_object().map_or(false, |o| !o.is_empty()) => vec![found],
        None => Vec::new(),
    };
    if rows.is_empty() {
        println!("No resources found.");
        return;
    }
    println!("{:<20} {:<40} {}", "NAMESPACE", "NAME", "KIND");
    for o in rows {
        let meta = &o["metadata"];
        println!("{:<20} {:<40} {}", meta["namespace"].as_str().unwrap_or("-"), meta["name"].as_str().unwrap_or(""), o["kind"].as_str().unwrap_or(""));
    }
}

fn print_releases(releases: &[ReleaseSummary]) {
    if releases.is_empty() {
        println!("No releases found.");
        return;
    }
    println!("{:<30} {:<20} {:<9} {:<12} {:<30} {}", "NAME", "NAMESPACE", "REVISION", "STATUS", "CHART", "APP VERSION");
    for r in releases {
        println!("{:<30} {:<20} {:<9} {:<12} {:<30} {}", r.name, r.namespace, r.revision, r.status, r.chart, r.app_version);
    }
}

async fn run_lookup(cli_ns: Option<String>, api_version: String, kind: String, name: String) -> Result<serde_json::Value> {
    let host = KubeHost::connect(&ConnectionConfig::from_env()).await?;
    let bundle = discover_bundle(host.client()).await?;
    let index = Arc::new(DiscoveryIndex::new(bundle.discovery));
    let bridge = AsyncCallBridge::new(Arc::new(host), Handle::current(), BridgeConfig::from_env());
    let provider = ClientProvider::new(index, bridge);
    let ns = cli_ns.unwrap_or_default();
    let found = tokio::task::spawn_blocking(move || lookup(&provider, &api_version, &kind, &ns, &name))
        .await
        .context("lookup task")??;
    Ok(found)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Discover => {
            info!("discover invoked");
            let client = ConnectionConfig::from_env().client().await?;
            let bundle = discover_bundle(&client).await?;
            match cli.output {
                Output::Human => {
                    println!("kubernetes {}", bundle.capabilities.kube_version.version);
                    for g in &bundle.discovery.groups {
                        for v in &g.versions {
                            let gv = if g.name.is_empty() { v.version.clone() } else { format!("{}/{}", g.name, v.version) };
                            for r in &v.resources {
                                let scope = if r.scope.is_namespaced() { "namespaced" } else { "cluster" };
                                println!("{} • {} • {} • {}", gv, r.kind, r.resource, scope);
                            }
                        }
                    }
                }
                out => emit(out, &bundle)?,
            }
        }
        Commands::Resolve { api_version, kind, discovery } => {
            info!(api_version = %api_version, kind = %kind, file = ?discovery, "resolve invoked");
            let bundle = match discovery {
                Some(path) => load_bundle(&path)?,
                None => discover_bundle(&ConnectionConfig::from_env().client().await?).await?,
            };
            let index = DiscoveryIndex::new(bundle.discovery);
            let (loc, namespaced) = index.resolve(&api_version, &kind)?;
            let resolved = Resolved {
                group: loc.group_str().to_string(),
                version: loc.version.clone(),
                plural: loc.plural.clone(),
                api_version,
                kind,
                namespaced,
            };
            match cli.output {
                Output::Human => {
                    let scope = if namespaced { "namespaced" } else { "cluster" };
                    println!("{} {} → {} ({})", resolved.api_version, resolved.kind, loc, scope);
                }
                out => emit(out, &resolved)?,
            }
        }
        Commands::Get { api_version, kind, name } => {
            info!(api_version = %api_version, kind = %kind, name = %name, ns = ?cli.namespace, "get invoked");
            let found = run_lookup(cli.namespace, api_version, kind, name).await?;
            match cli.output {
                Output::Human => print_objects(&found),
                out => emit(out, &found)?,
            }
        }
        Commands::List { api_version, kind } => {
            info!(api_version = %api_version, kind = %kind, ns = ?cli.namespace, "list invoked");
            let found = run_lookup(cli.namespace, api_version, kind, String::new()).await?;
            match cli.output {
                Output::Human => print_objects(&found),
                out => emit(out, &found)?,
            }
        }
        Commands::Releases => {
            let ns = cli.namespace.unwrap_or_else(|| "default".to_string());
            info!(ns = %ns, "releases invoked");
            let client = ConnectionConfig::from_env().client().await?;
            let releases = list_releases(&client, &ns).await?;
            match cli.output {
                Output::Human => print_releases(&releases.iter().map(ReleaseSummary::from).collect::<Vec<_>>()),
                out => emit(out, &releases)?,
            }
        }
    }
    Ok(())
}

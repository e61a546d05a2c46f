//! Helmlet render: orchestrates one chart render around an external templating
//! engine, with in-template lookups served by the bridge.

#![forbid(unsafe_code)]

mod boundary;
mod orchestrator;
mod request;

use helmlet_chart::ChartError;

pub use boundary::{BoundaryError, Renderer};
pub use orchestrator::{trim_outputs, EngineError, RenderOrchestrator, TemplateEngine};
pub use request::{DiscoveryBundle, RenderRequest, RenderResult, SerializedRender};

/// Any failure that aborts a render. No partial result survives one.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("no chart given")]
    NoChart,
    #[error(transparent)]
    Chart(#[from] ChartError),
    #[error("invalid discovery data: {0}")]
    Discovery(String),
    #[error("template engine: {0}")]
    Engine(EngineError),
    #[error("encode: {0}")]
    Encode(String),
}

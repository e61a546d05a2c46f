//! Entry point for hosts: serialized inputs and a host client in, one settled outcome out.

use std::error::Error as _;
use std::sync::Arc;

use helmlet_bridge::{AsyncCallBridge, ClientProvider, HostClient};
use helmlet_core::BridgeConfig;
use helmlet_discovery::DiscoveryIndex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::orchestrator::{RenderOrchestrator, TemplateEngine};
use crate::request::{RenderRequest, RenderResult, SerializedRender};
use crate::RenderError;

/// Rejection delivered to the host: a message plus a diagnostic trace.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct BoundaryError {
    pub message: String,
    pub trace: String,
}

impl BoundaryError {
    fn from_render(err: &RenderError) -> Self {
        let mut trace = err.to_string();
        let mut source = err.source();
        while let Some(s) = source {
            trace.push_str("\n  caused by: ");
            trace.push_str(&s.to_string());
            source = s.source();
        }
        Self { message: format!("cannot render template: {}", err), trace }
    }

    fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let what = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self { message: format!("cannot render template: {}", what), trace: format!("panicked while rendering: {}", what) }
    }
}

/// Binds an engine to a host. One instance serves any number of renders.
#[derive(Clone)]
pub struct Renderer {
    orchestrator: RenderOrchestrator,
    host: Arc<dyn HostClient>,
    config: BridgeConfig,
}

impl Renderer {
    pub fn new(engine: Arc<dyn TemplateEngine>, host: Arc<dyn HostClient>, config: BridgeConfig) -> Self {
        Self { orchestrator: RenderOrchestrator::new(engine), host, config }
    }

    pub async fn render_template(&self, input: SerializedRender) -> Result<RenderResult, BoundaryError> {
        self.render_template_with_cancel(input, CancellationToken::new()).await
    }

    /// Parse the inputs, build the lookup backend for this render and run the
    /// engine on the blocking pool. `cancel` aborts pending lookups.
    pub async fn render_template_with_cancel(&self, input: SerializedRender, cancel: CancellationToken) -> Result<RenderResult, BoundaryError> {
        let orchestrator = self.orchestrator.clone();
        let bridge = AsyncCallBridge::with_cancellation(Arc::clone(&self.host), Handle::current(), self.config.clone(), cancel);
        let job = tokio::task::spawn_blocking(move || -> Result<RenderResult, RenderError> {
            let request = RenderRequest::from_serialized(&input)?;
            let index = Arc::new(DiscoveryIndex::new(request.bundle.discovery.clone()));
            let provider = ClientProvider::new(index, bridge);
            orchestrator.render(request, &provider)
        });
        let outcome = match job.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(BoundaryError::from_render(&e)),
            Err(join) if join.is_panic() => Err(BoundaryError::from_panic(join.into_panic())),
            Err(join) => Err(BoundaryError { message: "cannot render template: render task aborted".to_string(), trace: join.to_string() }),
        };
        if let Err(e) = &outcome {
            warn!(error = %e.message, "render rejected");
        }
        outcome
    }
}

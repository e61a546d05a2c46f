//! Blocking Get/List over the asynchronous host.

use std::sync::Arc;
use std::time::Instant;

use helmlet_core::{BridgeConfig, LookupError, LookupResult, ResourceLocator};
use kube::core::DynamicObject;
use metrics::{counter, histogram};
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::classify::classify;
use crate::host::{Body, HostClient, HostOperation, HostRequest};
use crate::pending::PendingCall;
use crate::ResourceList;

/// Executes one Get or List per call against the host.
///
/// Each call spawns the host interaction onto `runtime` and parks the calling
/// thread on the call's [`PendingCall`] until the host settles it, the
/// configured deadline passes, or the bridge's cancellation token fires.
/// Cloning is cheap; clones share host, runtime, config and token.
#[derive(Clone)]
pub struct AsyncCallBridge {
    inner: Arc<Inner>,
}

struct Inner {
    host: Arc<dyn HostClient>,
    runtime: Handle,
    config: BridgeConfig,
    cancel: CancellationToken,
}

impl AsyncCallBridge {
    pub fn new(host: Arc<dyn HostClient>, runtime: Handle, config: BridgeConfig) -> Self {
        Self::with_cancellation(host, runtime, config, CancellationToken::new())
    }

    pub fn with_cancellation(host: Arc<dyn HostClient>, runtime: Handle, config: BridgeConfig, cancel: CancellationToken) -> Self {
        Self { inner: Arc::new(Inner { host, runtime, config, cancel }) }
    }

    pub fn config(&self) -> &BridgeConfig { &self.inner.config }

    pub fn cancellation(&self) -> &CancellationToken { &self.inner.cancel }

    /// Blocking Get. An empty `namespace` addresses a cluster-scoped object.
    pub fn get(&self, locator: &ResourceLocator, namespace: &str, name: &str) -> LookupResult<DynamicObject> {
        let call = self.issue(HostOperation::for_get(namespace), HostRequest::get(locator, namespace, name));
        call.wait(self.inner.config.lookup_timeout, &self.inner.cancel)
    }

    /// Blocking List. An empty `namespace` lists across the cluster.
    pub fn list(&self, locator: &ResourceLocator, namespace: &str) -> LookupResult<ResourceList> {
        let call = self.issue(HostOperation::for_list(namespace), HostRequest::list(locator, namespace));
        call.wait(self.inner.config.lookup_timeout, &self.inner.cancel)
    }

    pub async fn get_async(&self, locator: &ResourceLocator, namespace: &str, name: &str) -> LookupResult<DynamicObject> {
        let call = self.issue(HostOperation::for_get(namespace), HostRequest::get(locator, namespace, name));
        call.wait_async(self.inner.config.lookup_timeout, &self.inner.cancel).await
    }

    pub async fn list_async(&self, locator: &ResourceLocator, namespace: &str) -> LookupResult<ResourceList> {
        let call = self.issue(HostOperation::for_list(namespace), HostRequest::list(locator, namespace));
        call.wait_async(self.inner.config.lookup_timeout, &self.inner.cancel).await
    }

    /// Start a host call and return its waiter. The success path retains the
    /// completion through the body read; either path settles it exactly once.
    pub fn issue<T>(&self, op: HostOperation, request: HostRequest) -> PendingCall<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let path = request.path();
        let (completion, mut pending) = PendingCall::channel(format!("{} {}", op.name(), path), self.inner.runtime.clone());
        let host = Arc::clone(&self.inner.host);
        let max_body = self.inner.config.max_body_bytes;
        let task = self.inner.runtime.spawn(async move {
            let t0 = Instant::now();
            debug!(op = %op, path = %path, "host call issued");
            let outcome = match host.call(op, request).await {
                Ok(raw) => match raw.body().await {
                    Ok(body) => decode_body::<T>(&body, max_body),
                    Err(failure) => Err(classify(failure, op.verb()).await),
                },
                Err(failure) => Err(classify(failure, op.verb()).await),
            };
            let took_ms = t0.elapsed().as_secs_f64() * 1000.0;
            histogram!("helmlet_host_call_ms", took_ms);
            match &outcome {
                Ok(_) => {
                    counter!("helmlet_host_calls_total", 1u64, "op" => op.name(), "outcome" => "ok");
                    debug!(op = %op, path = %path, took_ms, "host call resolved");
                }
                Err(e) => {
                    counter!("helmlet_host_calls_total", 1u64, "op" => op.name(), "outcome" => "error");
                    debug!(op = %op, path = %path, took_ms, error = %e, "host call rejected");
                }
            }
            completion.settle(outcome);
        });
        pending.attach(task);
        pending
    }
}

/// Schema-less decode of a success body.
pub(crate) fn decode_body<T: DeserializeOwned>(body: &Body, max_body: Option<usize>) -> LookupResult<T> {
    if let Some(max) = max_body {
        if body.len() > max {
            return Err(LookupError::Decode { message: format!("response body of {} bytes exceeds limit of {}", body.len(), max) });
        }
    }
    serde_json::from_slice(body.as_bytes()).map_err(LookupError::decode)
}

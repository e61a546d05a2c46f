//! In-memory host for tests: replies scripted per REST path.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::host::{Body, BufferedResponse, HostClient, HostFailure, HostOperation, HostRequest, RawResponse};

/// Scripted outcome of a host call.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Resolve with a 200 response carrying this body.
    Ok(Body),
    /// Reject with a response-carrying error.
    Reject { status: u16, body: Body },
    /// Resolve, but fail the second-stage body read.
    BodyFails(String),
    /// Reject with a plain thrown value.
    Throw(String),
    /// Never settle.
    Hang,
    /// Settle as the inner reply after a delay.
    After(Duration, Box<MockReply>),
}

impl MockReply {
    pub fn json(v: serde_json::Value) -> Self { MockReply::Ok(Body::from(v)) }

    /// Rejection with an API `Status` body.
    pub fn status(code: u16, reason: &str, message: &str) -> Self {
        MockReply::Reject {
            status: code,
            body: Body::from(serde_json::json!({
                "apiVersion": "v1",
                "kind": "Status",
                "status": "Failure",
                "code": code,
                "reason": reason,
                "message": message,
            })),
        }
    }
}

/// Simple in-memory host. Unrouted paths reject with a 404 `Status`, like an API server.
#[derive(Default)]
pub struct MockHost {
    routes: Mutex<HashMap<String, MockReply>>,
    calls: Mutex<Vec<(HostOperation, HostRequest)>>,
}

impl MockHost {
    pub fn new() -> Self { Self::default() }

    /// Script the reply for a REST path such as `/api/v1/namespaces/default/configmaps/cfg`.
    pub fn route(&self, path: &str, reply: MockReply) -> &Self {
        self.routes.lock().unwrap_or_else(|p| p.into_inner()).insert(path.to_string(), reply);
        self
    }

    pub fn calls(&self) -> Vec<(HostOperation, HostRequest)> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn reply_for(&self, path: &str) -> MockReply {
        self.routes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(path)
            .cloned()
            .unwrap_or_else(|| MockReply::status(404, "NotFound", &format!("{} not found", path)))
    }
}

struct FailingBody(String);

#[async_trait::async_trait]
impl RawResponse for FailingBody {
    fn status(&self) -> u16 { 200 }
    async fn body(&self) -> Result<Body, HostFailure> { Err(HostFailure::Thrown(self.0.clone())) }
}

#[async_trait::async_trait]
impl HostClient for MockHost {
    async fn call(&self, op: HostOperation, request: HostRequest) -> Result<Box<dyn RawResponse>, HostFailure> {
        let mut reply = self.reply_for(&request.path());
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).push((op, request));
        loop {
            match reply {
                MockReply::After(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
                MockReply::Ok(body) => return Ok(Box::new(BufferedResponse::ok(body))),
                MockReply::Reject { status, body } => return Err(HostFailure::Response(Box::new(BufferedResponse::new(status, body)))),
                MockReply::BodyFails(msg) => return Ok(Box::new(FailingBody(msg))),
                MockReply::Throw(msg) => return Err(HostFailure::Thrown(msg)),
                MockReply::Hang => return std::future::pending().await,
            }
        }
    }
}

//! Helmlet bridge: synchronous Get/List for the templating engine on top of a
//! host that only offers asynchronous, promise-style calls.
//!
//! Flow of one lookup: [`ClientProvider`] resolves apiVersion/kind through the
//! discovery index, [`AsyncCallBridge`] issues the host operation and blocks on
//! a [`PendingCall`], and rejections are typed by [`classify`].

#![forbid(unsafe_code)]

mod bridge;
mod classify;
mod client;
mod host;
mod mock;
mod pending;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ListMeta;
use kube::core::{DynamicObject, TypeMeta};
use serde::{Deserialize, Serialize};

pub use bridge::AsyncCallBridge;
pub use classify::{classify, classify_body, generic_server_error};
pub use client::{lookup, ClientProvider, LookupBackend, ResourceClient};
pub use host::{Body, BufferedResponse, HostClient, HostFailure, HostOperation, HostRequest, RawResponse};
pub use mock::{MockHost, MockReply};
pub use pending::{Completion, PendingCall};

/// Schema-less list of objects as returned by a List call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceList {
    #[serde(flatten, default)]
    pub types: Option<TypeMeta>,
    #[serde(default)]
    pub metadata: ListMeta,
    #[serde(default)]
    pub items: Vec<DynamicObject>,
}

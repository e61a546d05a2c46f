//! Helmlet core types: resource locators, the lookup error taxonomy and bridge configuration.

#![forbid(unsafe_code)]

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The (group, version, plural) triple identifying a fetchable resource type.
///
/// Namespace is deliberately not part of the locator: the same locator is reused
/// across namespaces and the namespace is attached per call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceLocator {
    /// `None` for the core (legacy) group.
    pub group: Option<String>,
    pub version: String,
    pub plural: String,
}

impl ResourceLocator {
    pub fn new(group: &str, version: &str, plural: &str) -> Self {
        Self {
            group: if group.is_empty() { None } else { Some(group.to_string()) },
            version: version.to_string(),
            plural: plural.to_string(),
        }
    }

    pub fn group_str(&self) -> &str { self.group.as_deref().unwrap_or("") }

    /// `v1` for the core group, `group/version` otherwise.
    pub fn api_version(&self) -> String {
        match &self.group {
            Some(g) => format!("{}/{}", g, self.version),
            None => self.version.clone(),
        }
    }
}

impl fmt::Display for ResourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.group {
            Some(g) => write!(f, "{}.{}/{}", self.plural, g, self.version),
            None => write!(f, "{}/{}", self.plural, self.version),
        }
    }
}

/// Typed failures of a lookup, from resolution down to the host call.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum LookupError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("kind unsupported by cluster: {api_version} {kind}")]
    UnsupportedResource { api_version: String, kind: String },
    #[error("operation not supported by the lookup client: {verb}")]
    UnsupportedOperation { verb: String },
    /// Structured `Status` returned by the API server.
    #[error("{message}")]
    ApiStatus { code: i32, reason: String, message: String, group_resource: String },
    /// Server failure whose body was not a `Status` object.
    #[error("{message} ({verb}, status {status_code})")]
    GenericServer { status_code: u16, verb: String, reason: String, message: String },
    #[error("transport: {message}")]
    Transport { message: String },
    #[error("decode: {message}")]
    Decode { message: String },
    #[error("{verb} timed out after {after_ms}ms")]
    DeadlineExceeded { verb: String, after_ms: u64 },
    #[error("{verb} cancelled")]
    Cancelled { verb: String },
    #[error("{verb} abandoned: host dropped the call without settling it")]
    Abandoned { verb: String },
}

impl LookupError {
    pub fn decode(e: impl fmt::Display) -> Self { Self::Decode { message: e.to_string() } }

    pub fn transport(e: impl fmt::Display) -> Self { Self::Transport { message: e.to_string() } }

    /// HTTP-level code carried by the error, if any.
    pub fn status_code(&self) -> Option<i32> {
        match self {
            Self::ApiStatus { code, .. } => Some(*code),
            Self::GenericServer { status_code, .. } => Some(i32::from(*status_code)),
            _ => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::ApiStatus { reason, .. } | Self::GenericServer { reason, .. } => Some(reason.as_str()),
            _ => None,
        }
    }

    /// True for a `NotFound` reason, or a 404 when the server gave no reason.
    pub fn is_not_found(&self) -> bool {
        match self.reason() {
            Some(r) if !r.is_empty() => r == "NotFound",
            _ => self.status_code() == Some(404),
        }
    }
}

pub type LookupResult<T> = Result<T, LookupError>;

pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Immutable configuration handed to every bridge; there is no process-wide state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Upper bound for a single Get/List; `None` waits for the host indefinitely.
    pub lookup_timeout: Option<Duration>,
    /// Response bodies larger than this are rejected as decode errors.
    pub max_body_bytes: Option<usize>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self { lookup_timeout: Some(DEFAULT_LOOKUP_TIMEOUT), max_body_bytes: None }
    }
}

impl BridgeConfig {
    /// Read `HELMLET_LOOKUP_TIMEOUT_SECS` (`0` disables the deadline) and `HELMLET_MAX_BODY_BYTES`.
    pub fn from_env() -> Self {
        Self::from_vars(|k| std::env::var(k).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(secs) = var("HELMLET_LOOKUP_TIMEOUT_SECS").and_then(|s| s.trim().parse::<u64>().ok()) {
            cfg.lookup_timeout = if secs == 0 { None } else { Some(Duration::from_secs(secs)) };
        }
        cfg.max_body_bytes = var("HELMLET_MAX_BODY_BYTES").and_then(|s| s.trim().parse::<usize>().ok());
        cfg
    }

    pub fn with_lookup_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lookup_timeout = timeout;
        self
    }
}

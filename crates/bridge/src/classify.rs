//! Classification of host rejections into [`LookupError`].
//!
//! Only response-carrying failures can be told apart further: their body is
//! read and decoded as a `Status`. Everything else is a transport error.

use helmlet_core::LookupError;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use tracing::debug;

use crate::host::HostFailure;

/// Turn a host rejection into a typed error; `verb` is reported for non-Status bodies.
pub async fn classify(failure: HostFailure, verb: &str) -> LookupError {
    match failure {
        HostFailure::Response(response) => {
            let status = response.status();
            match response.body().await {
                Ok(body) => classify_body(status, body.as_bytes(), verb),
                // failed to read the error body itself
                Err(inner) => LookupError::transport(inner),
            }
        }
        HostFailure::Thrown(message) => {
            debug!(error = %message, "host call threw");
            LookupError::Transport { message }
        }
    }
}

/// Decode a failure body as `{apiVersion: v1, kind: Status}`; anything else is a generic server error.
pub fn classify_body(status: u16, body: &[u8], verb: &str) -> LookupError {
    match decode_status(body) {
        Some(s) => {
            let err = from_status(s, status);
            debug!(status, error = %err, "classified api status");
            err
        }
        None => {
            debug!(status, verb, "non-status failure body");
            generic_server_error(status, verb)
        }
    }
}

fn decode_status(body: &[u8]) -> Option<Status> {
    let v: serde_json::Value = serde_json::from_slice(body).ok()?;
    let api_version = v.get("apiVersion").and_then(|s| s.as_str());
    let kind = v.get("kind").and_then(|s| s.as_str());
    if api_version != Some("v1") || kind != Some("Status") { return None; }
    serde_json::from_value(v).ok()
}

fn from_status(s: Status, http_status: u16) -> LookupError {
    let group_resource = s
        .details
        .as_ref()
        .map(|d| {
            let kind = d.kind.as_deref().unwrap_or("");
            match d.group.as_deref() {
                Some(g) if !g.is_empty() && !kind.is_empty() => format!("{}.{}", kind, g),
                _ => kind.to_string(),
            }
        })
        .unwrap_or_default();
    LookupError::ApiStatus {
        code: s.code.unwrap_or(i32::from(http_status)),
        reason: s.reason.unwrap_or_default(),
        message: s.message.unwrap_or_default(),
        group_resource,
    }
}

/// Error for a failure response without a usable `Status`, reason derived from the HTTP code.
pub fn generic_server_error(status_code: u16, verb: &str) -> LookupError {
    let (reason, message) = match status_code {
        409 if verb.eq_ignore_ascii_case("POST") => ("AlreadyExists", "the server reported a conflict".to_string()),
        409 => ("Conflict", "the server reported a conflict".to_string()),
        404 => ("NotFound", "the server could not find the requested resource".to_string()),
        400 => ("BadRequest", "the server rejected our request for an unknown reason".to_string()),
        401 => ("Unauthorized", "the server has asked for the client to provide credentials".to_string()),
        403 => ("Forbidden", "the server does not allow access to the requested resource".to_string()),
        405 => ("MethodNotAllowed", "the server does not allow this method on the requested resource".to_string()),
        406 => ("NotAcceptable", "the server was unable to respond with a content type that the client supports".to_string()),
        415 => ("UnsupportedMediaType", "the server was unable to respond with a content type that the client supports".to_string()),
        422 => ("Invalid", "the server rejected our request due to an error in our request".to_string()),
        429 => ("TooManyRequests", "the server has received too many requests and has asked us to try again later".to_string()),
        503 => ("ServiceUnavailable", "the server is currently unable to handle the request".to_string()),
        504 => ("Timeout", "the server was unable to return a response in the time allotted, but may still be processing the request".to_string()),
        c if c >= 500 => ("InternalError", "an error on the server has prevented the request from succeeding".to_string()),
        c => ("", format!("the server responded with the status code {} but did not return more information", c)),
    };
    LookupError::GenericServer { status_code, verb: verb.to_string(), reason: reason.to_string(), message }
}

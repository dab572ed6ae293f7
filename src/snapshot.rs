//! On-disk response snapshots.

use crate::exchange::{Body, Response, ResponseHeaders};
use serde::{Deserialize, Serialize};

/// A complete, persisted substitute for one real response.
///
/// Serialized as a YAML document with exactly four keys: `method`, `body`,
/// `headers` and `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Snapshot {
    /// Lower-cased method of the recorded call
    pub method: String,
    /// Raw response body
    pub body: Body,
    /// Response headers, in received order
    pub headers: ResponseHeaders,
    /// HTTP status code
    pub status: u16,
}

impl Snapshot {
    /// Capture a response returned for a call made with `method`.
    pub fn capture(method: &str, response: &Response) -> Self {
        Self {
            method: method.to_ascii_lowercase(),
            body: response.body.clone(),
            headers: response.headers.clone(),
            status: response.status,
        }
    }

    /// Rebuild the response this snapshot stands in for.
    pub fn into_response(self) -> Response {
        Response {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}

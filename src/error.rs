//! Error types for the fixture recorder.

use std::path::PathBuf;
use thiserror::Error;

/// Boxed error produced by a [`Transport`](crate::exchange::Transport).
pub type TransportError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Everything that can go wrong while matching, caching or replaying a call.
///
/// None of these are retried. Configuration and fixture problems are defects
/// to be fixed, and the `Simulated*` variants are raised on purpose.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Rule file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Invalid rule set: {message}")]
    Validation { message: String },

    #[error("Failed to render rule file {}: {message}", path.display())]
    Template { path: PathBuf, message: String },

    #[error("Failed to parse rule file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Request matched more than one endpoint: {}", candidates.join(", "))]
    AmbiguousEndpoint { candidates: Vec<String> },

    #[error("'{location}' is not a supported uid location, use 'body', 'header', 'query' or 'url'")]
    UnsupportedLocation { location: String },

    #[error("Cache directory does not exist: {}", path.display())]
    CacheDirMissing { path: PathBuf },

    #[error("No default fixture at {}", path.display())]
    MissingDefault { path: PathBuf },

    #[error("Corrupt fixture {}: {source}", path.display())]
    CorruptFixture {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to encode fixture {}: {source}", path.display())]
    FixtureEncode {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid request URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Simulated client error {status}: {body}")]
    SimulatedClient { status: u16, body: String },

    #[error("Simulated resource not found: {body}")]
    SimulatedNotFound { body: String },

    #[error("407 \"Proxy Authentication Required\"")]
    SimulatedProxyAuth,

    #[error("Transport error: {0}")]
    Transport(#[source] TransportError),
}

impl FixtureError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn unsupported_location(location: impl Into<String>) -> Self {
        Self::UnsupportedLocation {
            location: location.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Map a configured error status to the matching simulated error kind.
    pub fn simulated(status: u16, body: impl Into<String>) -> Self {
        match status {
            404 => Self::SimulatedNotFound { body: body.into() },
            407 => Self::SimulatedProxyAuth,
            _ => Self::SimulatedClient {
                status,
                body: body.into(),
            },
        }
    }

    /// Whether this error was injected by an endpoint's `error` setting.
    pub fn is_simulated(&self) -> bool {
        matches!(
            self,
            Self::SimulatedClient { .. } | Self::SimulatedNotFound { .. } | Self::SimulatedProxyAuth
        )
    }
}

pub type Result<T, E = FixtureError> = std::result::Result<T, E>;

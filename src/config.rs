//! Configuration for the fixture recorder.
//!
//! Defines services, their endpoint rules, and the cache directory that
//! fixtures are written to.

use crate::error::{FixtureError, Result};
use crate::registry::Authority;
use crate::template::TemplateEngine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Main configuration for the fixture recorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecorderConfig {
    /// Root directory holding recorded fixtures
    pub cache_dir: PathBuf,

    /// Services whose calls are recorded or replayed
    #[serde(default)]
    pub services: Vec<ServiceDefinition>,
}

impl RecorderConfig {
    /// Load configuration from a YAML file.
    ///
    /// The file is rendered as a Handlebars template first, so it may embed
    /// values such as `{{env.FIXTURE_HOST}}`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| FixtureError::io(path, e))?;
        let rendered = TemplateEngine::new()
            .render_config(&raw)
            .map_err(|e| FixtureError::Template {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        let config: Self =
            serde_yaml::from_str(&rendered).map_err(|source| FixtureError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from an already rendered YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|source| FixtureError::ConfigParse {
                path: PathBuf::from("<inline>"),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err(FixtureError::validation("cache_dir cannot be empty"));
        }

        let mut claimed: Vec<(Authority, usize, &str)> = Vec::new();
        for (i, service) in self.services.iter().enumerate() {
            service
                .validate()
                .map_err(|e| FixtureError::validation(format!("Service {}: {}", i, e)))?;

            let name = service.display_name();
            for base_url in &service.base_urls {
                let authority = Authority::parse(base_url)?;
                if let Some((_, _, owner)) = claimed
                    .iter()
                    .find(|(other, index, _)| *index != i && other.overlaps(&authority))
                {
                    return Err(FixtureError::validation(format!(
                        "base url '{}' of service '{}' overlaps with service '{}'",
                        base_url, name, owner
                    )));
                }
                claimed.push((authority, i, name));
            }
        }
        Ok(())
    }
}

/// A named group of base urls sharing a set of endpoint rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceDefinition {
    /// Optional name used in logs and error messages
    #[serde(default)]
    pub name: Option<String>,

    /// Hosts (`host` or `host:port`) served by this service
    pub base_urls: Vec<String>,

    /// Endpoint rules, in priority order
    #[serde(default)]
    pub endpoints: Vec<EndpointDefinition>,
}

impl ServiceDefinition {
    /// Name to report for this service, falling back to its first base url.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or_else(|| self.base_urls.first().map(String::as_str))
            .unwrap_or("<unnamed>")
    }

    /// Validate the service definition.
    pub fn validate(&self) -> Result<()> {
        if self.base_urls.is_empty() {
            return Err(FixtureError::validation("base_urls cannot be empty"));
        }
        for base_url in &self.base_urls {
            Authority::parse(base_url)?;
        }
        for (i, endpoint) in self.endpoints.iter().enumerate() {
            endpoint
                .validate()
                .map_err(|e| FixtureError::validation(format!("Endpoint {}: {}", i, e)))?;
        }
        Ok(())
    }
}

/// A single endpoint rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointDefinition {
    /// HTTP method to match
    pub method: String,

    /// Path pattern, `*` matches one path segment
    pub path: String,

    /// Storage path of the fixtures, relative to `cache_dir`
    pub file_path: String,

    /// Cache one fixture per resource served by this endpoint
    #[serde(default)]
    pub cache_multiple_responses: Option<MultiResponseConfig>,

    /// Raise this error instead of calling through
    #[serde(default)]
    pub error: Option<ErrorConfig>,

    /// Seconds to wait before replaying a response
    #[serde(default)]
    pub response_delay: Option<f64>,

    /// Body patterns whose first capture is masked when checksumming requests
    #[serde(default)]
    pub timestamp_regex: Vec<String>,
}

impl EndpointDefinition {
    /// Validate the endpoint definition.
    pub fn validate(&self) -> Result<()> {
        if self.method.trim().is_empty() {
            return Err(FixtureError::validation("method cannot be empty"));
        }
        if !self.path.starts_with('/') {
            return Err(FixtureError::validation(format!(
                "path '{}' must start with '/'",
                self.path
            )));
        }
        if self.file_path.split('/').all(str::is_empty) {
            return Err(FixtureError::validation("file_path cannot be empty"));
        }
        if let Some(error) = &self.error {
            error.validate()?;
        }
        if let Some(delay) = self.response_delay {
            delay_duration(delay)?;
        }
        if let Some(multi) = &self.cache_multiple_responses {
            multi.validate(&self.path)?;
        }
        for pattern in &self.timestamp_regex {
            compile_pattern(pattern)?;
        }
        Ok(())
    }
}

/// Convert a `response_delay` in seconds, rejecting values no `Duration` can hold.
pub(crate) fn delay_duration(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| FixtureError::validation(format!("invalid response_delay {}: {}", secs, e)))
}

/// Disambiguates one route into many cached resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MultiResponseConfig {
    /// Where the identifier is read from
    pub uid_location: IdentifierLocation,

    /// Pattern (body, url) or name (header, query) locating the identifier
    pub uid_locator: String,

    /// Extra body pattern used to tell endpoints apart and group fixtures
    #[serde(default)]
    pub optional_code_locator: Option<String>,
}

impl MultiResponseConfig {
    /// Validate the descriptor.
    pub fn validate(&self, path: &str) -> Result<()> {
        if self.uid_locator.is_empty() {
            return Err(FixtureError::validation("uid_locator cannot be empty"));
        }
        match &self.uid_location {
            IdentifierLocation::Body | IdentifierLocation::Url => {
                compile_pattern(&self.uid_locator)?;
            }
            IdentifierLocation::Header | IdentifierLocation::Query => {}
            IdentifierLocation::Other(location) => {
                // Rejected when a request actually needs it.
                warn!(path = %path, location = %location, "Unsupported uid_location");
            }
        }
        if let Some(pattern) = &self.optional_code_locator {
            compile_pattern(pattern)?;
        }
        Ok(())
    }
}

/// Where a multi-response endpoint reads its identifier from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IdentifierLocation {
    Body,
    Header,
    Query,
    Url,
    /// Unrecognised value, kept verbatim for error reporting
    Other(String),
}

impl From<String> for IdentifierLocation {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "body" => Self::Body,
            "header" | "headers" => Self::Header,
            "query" => Self::Query,
            "url" => Self::Url,
            _ => Self::Other(value),
        }
    }
}

impl From<IdentifierLocation> for String {
    fn from(value: IdentifierLocation) -> Self {
        value.to_string()
    }
}

impl fmt::Display for IdentifierLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Body => f.write_str("body"),
            Self::Header => f.write_str("header"),
            Self::Query => f.write_str("query"),
            Self::Url => f.write_str("url"),
            Self::Other(value) => f.write_str(value),
        }
    }
}

/// Error raised in place of calling the endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorConfig {
    /// HTTP status code
    pub status: u16,

    /// Error body
    #[serde(default)]
    pub body: String,
}

impl ErrorConfig {
    /// Validate the error definition.
    pub fn validate(&self) -> Result<()> {
        if self.status < 100 || self.status > 599 {
            return Err(FixtureError::validation(format!(
                "Invalid status code: {}",
                self.status
            )));
        }
        Ok(())
    }
}

pub(crate) fn compile_pattern(pattern: &str) -> Result<regex::Regex> {
    regex::Regex::new(pattern).map_err(|source| FixtureError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

//! Endpoint matching logic.
//!
//! Resolves an outbound request to the single endpoint rule governing it.

use crate::config::{
    compile_pattern, delay_duration, EndpointDefinition, ErrorConfig, IdentifierLocation,
};
use crate::error::{FixtureError, Result};
use crate::exchange::OutboundRequest;
use crate::extract::MultiResponseRule;
use crate::registry::{CompiledService, RuleSet};
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A path pattern compiled to an anchored regex.
///
/// `*` stands for one or more non-slash characters. Everything else is
/// literal, so `/get_animals(class='x')` matches only itself.
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    regex: Regex,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join("[^/]+");
        let regex = compile_pattern(&format!("^{}$", body))?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// An endpoint rule with its patterns compiled.
#[derive(Debug)]
pub struct EndpointRule {
    service: String,
    method: String,
    path: PathPattern,
    file_path: String,
    multi: Option<MultiResponseRule>,
    error: Option<ErrorConfig>,
    delay: Option<Duration>,
    timestamp_patterns: Vec<Regex>,
}

impl EndpointRule {
    /// Compile an endpoint definition belonging to `service`.
    pub fn compile(service: &str, def: &EndpointDefinition) -> Result<Self> {
        let multi = def
            .cache_multiple_responses
            .as_ref()
            .map(MultiResponseRule::compile)
            .transpose()?;
        let timestamp_patterns = def
            .timestamp_regex
            .iter()
            .map(|p| compile_pattern(p))
            .collect::<Result<Vec<_>>>()?;
        let delay = def.response_delay.map(delay_duration).transpose()?;

        Ok(Self {
            service: service.to_string(),
            method: def.method.trim().to_uppercase(),
            path: PathPattern::parse(&def.path)?,
            file_path: def.file_path.clone(),
            multi,
            error: def.error.clone(),
            delay,
            timestamp_patterns,
        })
    }

    /// Whether this rule governs `method` + `path`, ignoring request content.
    pub fn matches_route(&self, method: &str, path: &str) -> bool {
        self.method.eq_ignore_ascii_case(method) && self.path.matches(path)
    }

    /// Human readable description for logs and errors.
    pub fn label(&self) -> String {
        format!(
            "{}: {} {} -> {}",
            self.service,
            self.method,
            self.path.as_str(),
            self.file_path
        )
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        self.path.as_str()
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn multi_response(&self) -> Option<&MultiResponseRule> {
        self.multi.as_ref()
    }

    pub fn error(&self) -> Option<&ErrorConfig> {
        self.error.as_ref()
    }

    pub fn delay(&self) -> Option<Duration> {
        self.delay
    }

    pub fn timestamp_patterns(&self) -> &[Regex] {
        &self.timestamp_patterns
    }
}

/// Request matcher engine over a loaded rule set.
pub struct EndpointMatcher {
    rules: Arc<RuleSet>,
}

impl EndpointMatcher {
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self { rules }
    }

    /// First service registered for `host` / `port`.
    pub fn find_service(&self, host: &str, port: Option<u16>) -> Option<&CompiledService> {
        self.rules.services().iter().find(|s| s.serves(host, port))
    }

    /// Find the endpoint rule governing a request.
    ///
    /// Returns `Ok(None)` when the request is not covered by any rule, and
    /// [`FixtureError::AmbiguousEndpoint`] when the rule set cannot tell
    /// several candidates apart.
    pub fn find_endpoint(&self, request: &OutboundRequest) -> Result<Option<Arc<EndpointRule>>> {
        let host = request.host();
        let Some(service) = self.find_service(&host, request.port()) else {
            debug!(host = %host, "No service registered for host");
            return Ok(None);
        };

        let candidates: Vec<&Arc<EndpointRule>> = service
            .endpoints()
            .iter()
            .filter(|e| e.matches_route(request.method(), request.path()))
            .collect();

        match candidates.as_slice() {
            [] => {
                debug!(
                    service = %service.name(),
                    method = %request.method(),
                    path = %request.path(),
                    "No endpoint rule for path"
                );
                Ok(None)
            }
            [only] => Ok(Some(Arc::clone(only))),
            _ => self.disambiguate(&candidates, request),
        }
    }

    /// Whether any endpoint rule covers `method` + `path` on this host.
    pub fn is_mocked(&self, host: &str, port: Option<u16>, method: &str, path: &str) -> bool {
        self.find_service(&host.to_ascii_lowercase(), port)
            .map(|s| s.endpoints().iter().any(|e| e.matches_route(method, path)))
            .unwrap_or(false)
    }

    fn disambiguate(
        &self,
        candidates: &[&Arc<EndpointRule>],
        request: &OutboundRequest,
    ) -> Result<Option<Arc<EndpointRule>>> {
        let mut survivors = Vec::new();
        for candidate in candidates {
            let Some(multi) = candidate.multi_response() else {
                continue;
            };
            if Self::content_matches(multi, request)? {
                survivors.push(*candidate);
            }
        }

        match survivors.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(Arc::clone(only))),
            _ => Err(FixtureError::AmbiguousEndpoint {
                candidates: survivors.iter().map(|e| e.label()).collect(),
            }),
        }
    }

    fn content_matches(multi: &MultiResponseRule, request: &OutboundRequest) -> Result<bool> {
        match multi.location() {
            IdentifierLocation::Body => {
                let body = request.body();
                let uid_found = multi.uid_pattern().is_some_and(|p| p.is_match(body));
                let code_found = multi.code_pattern().map_or(true, |p| p.is_match(body));
                Ok(uid_found && code_found)
            }
            other => Err(FixtureError::unsupported_location(other.to_string())),
        }
    }
}

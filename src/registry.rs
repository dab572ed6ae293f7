//! Rule registry.
//!
//! Loads the rule file once and exposes it as an immutable, compiled
//! [`RuleSet`]. Matching lives in [`crate::matcher`].

use crate::config::RecorderConfig;
use crate::error::{FixtureError, Result};
use crate::matcher::EndpointRule;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// A base url of a service: a host, optionally pinned to one port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authority {
    host: String,
    port: Option<u16>,
}

impl Authority {
    /// Parse `host` or `host:port`.
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = |reason: &str| {
            FixtureError::validation(format!("invalid base url '{}': {}", value, reason))
        };

        if value.is_empty() {
            return Err(invalid("empty"));
        }
        if value.contains('/') {
            return Err(invalid("expected host or host:port"));
        }

        match value.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| invalid("bad port"))?;
                if host.is_empty() {
                    return Err(invalid("empty host"));
                }
                Ok(Self {
                    host: host.to_ascii_lowercase(),
                    port: Some(port),
                })
            }
            None => Ok(Self {
                host: value.to_ascii_lowercase(),
                port: None,
            }),
        }
    }

    /// Whether a request to `host` / `port` is served here.
    ///
    /// A portless authority accepts any port.
    pub fn matches(&self, host: &str, port: Option<u16>) -> bool {
        self.host == host && (self.port.is_none() || self.port == port)
    }

    /// Whether some request could match both authorities.
    pub fn overlaps(&self, other: &Authority) -> bool {
        self.host == other.host
            && (self.port.is_none() || other.port.is_none() || self.port == other.port)
    }
}

/// A service with its endpoint rules compiled.
#[derive(Debug)]
pub struct CompiledService {
    name: String,
    authorities: Vec<Authority>,
    endpoints: Vec<Arc<EndpointRule>>,
}

impl CompiledService {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn serves(&self, host: &str, port: Option<u16>) -> bool {
        self.authorities.iter().any(|a| a.matches(host, port))
    }

    pub fn endpoints(&self) -> &[Arc<EndpointRule>] {
        &self.endpoints
    }
}

/// Immutable, compiled rule set.
#[derive(Debug)]
pub struct RuleSet {
    cache_dir: PathBuf,
    services: Vec<CompiledService>,
}

impl RuleSet {
    /// Validate a configuration and compile all of its patterns.
    pub fn compile(config: &RecorderConfig) -> Result<Self> {
        config.validate()?;

        let mut services = Vec::with_capacity(config.services.len());
        for service in &config.services {
            let name = service.display_name().to_string();
            let authorities = service
                .base_urls
                .iter()
                .map(|u| Authority::parse(u))
                .collect::<Result<Vec<_>>>()?;
            let endpoints = service
                .endpoints
                .iter()
                .map(|e| EndpointRule::compile(&name, e).map(Arc::new))
                .collect::<Result<Vec<_>>>()?;
            services.push(CompiledService {
                name,
                authorities,
                endpoints,
            });
        }

        Ok(Self {
            cache_dir: config.cache_dir.clone(),
            services,
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn services(&self) -> &[CompiledService] {
        &self.services
    }

    pub fn endpoint_count(&self) -> usize {
        self.services.iter().map(|s| s.endpoints.len()).sum()
    }
}

/// Loads the rule set on first use and hands out the same copy afterwards.
#[derive(Debug, Default)]
pub struct RuleRegistry {
    source: Option<PathBuf>,
    rules: OnceCell<Arc<RuleSet>>,
}

impl RuleRegistry {
    /// Registry reading from `source`; nothing is read until [`load`](Self::load).
    pub fn new(source: Option<PathBuf>) -> Self {
        Self {
            source,
            rules: OnceCell::new(),
        }
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self::new(Some(path.into()))
    }

    /// Registry over an in-memory configuration.
    pub fn from_config(config: &RecorderConfig) -> Result<Self> {
        let registry = Self::new(None);
        // A fresh cell is always empty
        let _ = registry.rules.set(Arc::new(RuleSet::compile(config)?));
        Ok(registry)
    }

    /// The rule set, loading it on first call.
    pub fn load(&self) -> Result<Arc<RuleSet>> {
        self.rules
            .get_or_try_init(|| self.load_source().map(Arc::new))
            .cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.rules.get().is_some()
    }

    fn load_source(&self) -> Result<RuleSet> {
        let Some(path) = &self.source else {
            return Err(FixtureError::configuration("rule file path not set"));
        };
        if !path.exists() {
            return Err(FixtureError::NotFound { path: path.clone() });
        }

        let config = RecorderConfig::from_file(path)?;
        let rules = RuleSet::compile(&config)?;
        info!(
            path = %path.display(),
            services = rules.services.len(),
            endpoints = rules.endpoint_count(),
            "Loaded fixture rules"
        );
        Ok(rules)
    }
}

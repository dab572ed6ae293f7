//! Record and playback of outbound calls.

use crate::cache_key::CacheKey;
use crate::error::{FixtureError, Result};
use crate::exchange::{OutboundRequest, Response, Transport};
use crate::matcher::{EndpointMatcher, EndpointRule};
use crate::registry::{RuleRegistry, RuleSet};
use crate::snapshot::Snapshot;
use crate::store::ResponseStore;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Environment name that always disables interception.
pub const TEST_ENVIRONMENT: &str = "test";

/// Whether real calls are made and captured, or only fixtures are replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Recording,
    Playback,
}

/// Process-level switches, read fresh on every call.
#[derive(Debug)]
pub struct RecorderSettings {
    enabled: AtomicBool,
    recording: AtomicBool,
    environment: Option<String>,
}

impl RecorderSettings {
    pub fn new(enabled: bool, mode: Mode) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            recording: AtomicBool::new(mode == Mode::Recording),
            environment: None,
        }
    }

    /// Name the environment the embedding application runs in.
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn set_mode(&self, mode: Mode) {
        self.recording.store(mode == Mode::Recording, Ordering::SeqCst);
    }

    pub fn mode(&self) -> Mode {
        if self.recording.load(Ordering::SeqCst) {
            Mode::Recording
        } else {
            Mode::Playback
        }
    }

    /// Enabled, and not running under the test environment.
    pub fn is_active(&self) -> bool {
        let forced_off = self
            .environment
            .as_deref()
            .is_some_and(|env| env.eq_ignore_ascii_case(TEST_ENVIRONMENT));
        !forced_off && self.enabled.load(Ordering::SeqCst)
    }
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self::new(false, Mode::Playback)
    }
}

/// Everything derived for one intercepted call.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub endpoint: Arc<EndpointRule>,
    pub identifier: Option<String>,
    pub grouping: String,
    pub key: CacheKey,
}

/// Intercepts outbound calls and answers matched ones from fixtures.
pub struct FixtureRecorder {
    registry: RuleRegistry,
    settings: RecorderSettings,
}

impl FixtureRecorder {
    pub fn new(registry: RuleRegistry, settings: RecorderSettings) -> Self {
        Self { registry, settings }
    }

    pub fn settings(&self) -> &RecorderSettings {
        &self.settings
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Match a request and derive its cache key, without touching fixtures.
    pub fn resolve(&self, request: &OutboundRequest) -> Result<Option<Resolution>> {
        let rules = self.registry.load()?;
        Self::resolve_with(&rules, request)
    }

    fn resolve_with(rules: &Arc<RuleSet>, request: &OutboundRequest) -> Result<Option<Resolution>> {
        let matcher = EndpointMatcher::new(Arc::clone(rules));
        match matcher.find_endpoint(request)? {
            Some(endpoint) => Self::resolve_endpoint(rules, endpoint, request).map(Some),
            None => Ok(None),
        }
    }

    fn resolve_endpoint(
        rules: &RuleSet,
        endpoint: Arc<EndpointRule>,
        request: &OutboundRequest,
    ) -> Result<Resolution> {
        let (identifier, grouping) = match endpoint.multi_response() {
            Some(multi) => (multi.identifier(request)?, multi.grouping(request)),
            None => (None, String::new()),
        };
        let key = CacheKey::build(
            rules.cache_dir(),
            &endpoint,
            identifier.as_deref(),
            &grouping,
            request,
        );

        Ok(Resolution {
            endpoint,
            identifier,
            grouping,
            key,
        })
    }

    /// Perform `request`, recording or replaying it when a rule matches.
    ///
    /// In playback mode a matched request never reaches `transport`.
    pub fn call<T>(&self, request: &OutboundRequest, transport: &T) -> Result<Response>
    where
        T: Transport + ?Sized,
    {
        if !self.settings.is_active() {
            return pass_through(request, transport);
        }

        let rules = self.registry.load()?;
        let matcher = EndpointMatcher::new(Arc::clone(&rules));
        let Some(endpoint) = matcher.find_endpoint(request)? else {
            return pass_through(request, transport);
        };

        if let Some(error) = endpoint.error() {
            info!(
                status = error.status,
                url = %request.uri(),
                "Raising simulated error"
            );
            return Err(FixtureError::simulated(error.status, error.body.clone()));
        }

        let mode = self.settings.mode();
        if let Some(delay) = endpoint.delay() {
            match mode {
                Mode::Playback => {
                    info!(delay_secs = delay.as_secs_f64(), "Simulating response delay");
                    std::thread::sleep(delay);
                }
                Mode::Recording => debug!("Skipping response delay while recording"),
            }
        }

        let resolution = Self::resolve_endpoint(&rules, endpoint, request)?;
        let store = ResponseStore::new(rules.cache_dir());

        match mode {
            Mode::Playback => {
                if let Some(snapshot) = store.load(&resolution.key)? {
                    return Ok(snapshot.into_response());
                }
                store
                    .load_default(&resolution.endpoint)
                    .map(Snapshot::into_response)
            }
            Mode::Recording => {
                store.ensure_cache_dir()?;
                let response = transport.send(request).map_err(FixtureError::Transport)?;
                store.save(
                    &resolution.key,
                    &Snapshot::capture(request.method(), &response),
                )?;
                Ok(response)
            }
        }
    }
}

fn pass_through<T>(request: &OutboundRequest, transport: &T) -> Result<Response>
where
    T: Transport + ?Sized,
{
    debug!(method = %request.method(), url = %request.uri(), "Passing call through");
    transport.send(request).map_err(FixtureError::Transport)
}

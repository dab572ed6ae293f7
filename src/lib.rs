//! Fixture Recorder
//!
//! Records outbound HTTP calls to YAML fixtures and replays them, so test
//! suites run without reaching real services.
//!
//! # Features
//!
//! - **Endpoint Rules**: Match by host, port, method and path pattern
//! - **Multiple Responses**: One route, many fixtures keyed by an id found in the body, a header, the query or the url
//! - **Record / Playback**: Capture real responses, or replay them without calling out
//! - **Default Fixtures**: Replay `default.yml` when a request was never recorded
//! - **Latency Simulation**: Delay replayed responses
//! - **Failure Injection**: Raise configured errors instead of calling out
//!
//! # Example Configuration
//!
//! ```yaml
//! cache_dir: spec/support/fixtures
//! services:
//!   - name: mvi
//!     base_urls: ['{{env.MVI_HOST}}']
//!     endpoints:
//!       - method: post
//!         path: /psim_webservice/IdMWebService
//!         file_path: mvi/profile
//!         cache_multiple_responses:
//!           uid_location: body
//!           uid_locator: '<ssn>(\d{9})</ssn>'
//!       - method: get
//!         path: /letters/*
//!         file_path: evss/letters/list
//!         response_delay: 0.5
//! ```

pub mod cache_key;
pub mod checksum;
pub mod config;
pub mod error;
pub mod exchange;
pub mod extract;
pub mod matcher;
pub mod recorder;
pub mod registry;
pub mod snapshot;
pub mod store;
pub mod template;

pub use config::RecorderConfig;
pub use error::FixtureError;
pub use exchange::{Body, OutboundRequest, Response, Transport};
pub use recorder::{FixtureRecorder, Mode, RecorderSettings};
pub use registry::RuleRegistry;

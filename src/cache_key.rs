//! Cache key derivation.
//!
//! Maps a matched endpoint and the values extracted from a request to the
//! fixture file that stores its response:
//!
//! ```text
//! <cache_dir>/<file_path parent>/<file_path stem>.yml          single response
//! <cache_dir>/<file_path>/[<grouping>/]<identifier>.yml        multiple responses
//! <cache_dir>/<file_path>/default.yml                          playback fallback
//! ```

use crate::checksum::request_checksum;
use crate::exchange::OutboundRequest;
use crate::matcher::EndpointRule;
use std::path::{Path, PathBuf};

/// Name of the fallback fixture replayed when no specific one exists.
pub const DEFAULT_FIXTURE: &str = "default.yml";

const EXTENSION: &str = ".yml";

/// Location of a response snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    primary: PathBuf,
    /// Ungrouped location checked when the grouped one is missing
    fallback: Option<PathBuf>,
}

impl CacheKey {
    /// Key of a single-response endpoint.
    pub fn single(cache_dir: &Path, file_path: &str) -> Self {
        let segments = segments(file_path);
        let (stem, parents) = match segments.split_last() {
            Some((&last, parents)) => (last.strip_suffix(EXTENSION).unwrap_or(last), parents),
            None => ("response", &[][..]),
        };

        let mut primary = join(cache_dir, parents);
        primary.push(format!("{}{}", stem, EXTENSION));
        Self {
            primary,
            fallback: None,
        }
    }

    /// Key of one resource of a multi-response endpoint.
    pub fn multi(cache_dir: &Path, file_path: &str, grouping: &str, name: &str) -> Self {
        let dir = join(cache_dir, &segments(file_path));
        let file_name = format!("{}{}", sanitize(name), EXTENSION);

        if grouping.is_empty() {
            Self {
                primary: dir.join(file_name),
                fallback: None,
            }
        } else {
            Self {
                primary: dir.join(grouping).join(&file_name),
                fallback: Some(dir.join(file_name)),
            }
        }
    }

    /// Build the key for a request matched to `endpoint`.
    ///
    /// A multi-response request without an identifier is keyed by a request
    /// checksum instead, so it never lands on another resource's fixture.
    pub fn build(
        cache_dir: &Path,
        endpoint: &EndpointRule,
        identifier: Option<&str>,
        grouping: &str,
        request: &OutboundRequest,
    ) -> Self {
        if endpoint.multi_response().is_none() {
            return Self::single(cache_dir, endpoint.file_path());
        }

        let name = match identifier {
            Some(id) => id.to_string(),
            None => format!(
                "{}_{}",
                path_tail(request.path()),
                request_checksum(request, endpoint.timestamp_patterns())
            ),
        };
        Self::multi(cache_dir, endpoint.file_path(), grouping, &name)
    }

    /// Where new recordings are written.
    pub fn path(&self) -> &Path {
        &self.primary
    }

    pub fn fallback(&self) -> Option<&Path> {
        self.fallback.as_deref()
    }

    /// Paths to try on load, in order.
    pub fn candidates(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.primary.as_path()).chain(self.fallback.as_deref())
    }
}

/// Path of an endpoint's fallback fixture.
pub fn default_path(cache_dir: &Path, file_path: &str) -> PathBuf {
    join(cache_dir, &segments(file_path)).join(DEFAULT_FIXTURE)
}

fn segments(file_path: &str) -> Vec<&str> {
    file_path.split('/').filter(|s| !s.is_empty()).collect()
}

fn join(base: &Path, segments: &[&str]) -> PathBuf {
    segments.iter().fold(base.to_path_buf(), |dir, s| dir.join(s))
}

fn path_tail(path: &str) -> &str {
    path.rsplit('/').find(|s| !s.is_empty()).unwrap_or("root")
}

/// Keep an identifier inside its directory and off the reserved fallback name.
fn sanitize(name: &str) -> String {
    let reserved = DEFAULT_FIXTURE.trim_end_matches(EXTENSION);
    match name {
        "." | ".." => "_".to_string(),
        _ if name.eq_ignore_ascii_case(reserved) => format!("_{}", name),
        _ => name.replace(['/', '\\'], "_"),
    }
}

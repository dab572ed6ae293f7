//! Identifier extraction for multi-response endpoints.
//!
//! One route can serve many resources. The identifier picks the fixture a
//! request maps to, and the optional grouping value picks a sub-directory.

use crate::config::{compile_pattern, IdentifierLocation, MultiResponseConfig};
use crate::error::{FixtureError, Result};
use crate::exchange::OutboundRequest;
use regex::Regex;

/// A multi-response descriptor with its patterns compiled.
#[derive(Debug, Clone)]
pub struct MultiResponseRule {
    location: IdentifierLocation,
    locator: String,
    uid_pattern: Option<Regex>,
    code_pattern: Option<Regex>,
}

impl MultiResponseRule {
    pub fn compile(config: &MultiResponseConfig) -> Result<Self> {
        let uid_pattern = match config.uid_location {
            IdentifierLocation::Body | IdentifierLocation::Url => {
                Some(compile_pattern(&config.uid_locator)?)
            }
            _ => None,
        };
        let code_pattern = config
            .optional_code_locator
            .as_deref()
            .map(compile_pattern)
            .transpose()?;

        Ok(Self {
            location: config.uid_location.clone(),
            locator: config.uid_locator.clone(),
            uid_pattern,
            code_pattern,
        })
    }

    pub fn location(&self) -> &IdentifierLocation {
        &self.location
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn uid_pattern(&self) -> Option<&Regex> {
        self.uid_pattern.as_ref()
    }

    pub fn code_pattern(&self) -> Option<&Regex> {
        self.code_pattern.as_ref()
    }

    /// Extract the identifier of the resource a request refers to.
    ///
    /// Returns `Ok(None)` when the locator finds nothing. Only an
    /// unsupported location is an error.
    pub fn identifier(&self, request: &OutboundRequest) -> Result<Option<String>> {
        let found = match &self.location {
            IdentifierLocation::Body => self.capture(request.body()),
            IdentifierLocation::Header => request.header(&self.locator).map(str::to_string),
            IdentifierLocation::Query => request.query_params().remove(&self.locator),
            IdentifierLocation::Url => self.capture(request.path()),
            IdentifierLocation::Other(location) => {
                return Err(FixtureError::unsupported_location(location.clone()))
            }
        };
        Ok(found.filter(|id| !id.is_empty()))
    }

    /// Grouping directory for a request, empty when none applies.
    ///
    /// Only body locators group fixtures. Everything but ASCII letters and
    /// digits is stripped so the value is safe as a directory name.
    pub fn grouping(&self, request: &OutboundRequest) -> String {
        if self.location != IdentifierLocation::Body {
            return String::new();
        }
        self.code_pattern
            .as_ref()
            .and_then(|p| first_capture(p, request.body()))
            .map(|code| code.chars().filter(char::is_ascii_alphanumeric).collect())
            .unwrap_or_default()
    }

    fn capture(&self, haystack: &str) -> Option<String> {
        self.uid_pattern
            .as_ref()
            .and_then(|p| first_capture(p, haystack))
    }
}

fn first_capture(pattern: &Regex, haystack: &str) -> Option<String> {
    pattern
        .captures(haystack)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

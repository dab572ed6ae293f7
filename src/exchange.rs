//! Outbound requests, responses and the transport that connects them.
//!
//! The recorder never performs HTTP itself. It reads the request before the
//! call, and either hands it to a [`Transport`] or answers from a fixture.

use crate::error::{FixtureError, Result, TransportError};
use base64::Engine;
use http::Uri;
use indexmap::IndexMap;
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

/// A response header value, either single or repeated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Single(String),
    Multiple(Vec<String>),
}

impl HeaderValue {
    /// All values of the header, in order.
    pub fn values(&self) -> Vec<&str> {
        match self {
            HeaderValue::Single(v) => vec![v.as_str()],
            HeaderValue::Multiple(vs) => vs.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Single(value.to_string())
    }
}

/// Response headers, in the order the transport returned them.
pub type ResponseHeaders = IndexMap<String, HeaderValue>;

/// Raw response body.
///
/// Serialized as a plain string when it is valid UTF-8, and as
/// `{base64: ...}` otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Body(Vec<u8>);

impl Body {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// The body as text, if it is valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn to_text_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body(bytes)
    }
}

impl From<&[u8]> for Body {
    fn from(bytes: &[u8]) -> Self {
        Body(bytes.to_vec())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body(text.into_bytes())
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body(text.as_bytes().to_vec())
    }
}

impl PartialEq<str> for Body {
    fn eq(&self, other: &str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl PartialEq<&str> for Body {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl Serialize for Body {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.as_text() {
            Some(text) => serializer.serialize_str(text),
            None => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(&self.0);
                let mut map = IndexMap::new();
                map.insert("base64", encoded);
                map.serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for Body {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(BodyVisitor)
    }
}

struct BodyVisitor;

impl<'de> Visitor<'de> for BodyVisitor {
    type Value = Body;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a string or a {base64: ...} mapping")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Body, E> {
        Ok(Body::from(v))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Body, E> {
        Ok(Body::from(v))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<Body, E> {
        Ok(Body::from(v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Body, E> {
        Ok(Body::from(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Body, E> {
        Ok(Body::from(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Body, E> {
        Ok(Body::from(v.to_string()))
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Body, E> {
        Ok(Body::default())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Body, A::Error> {
        let mut encoded: Option<String> = None;
        while let Some(key) = map.next_key::<String>()? {
            if key != "base64" {
                return Err(de::Error::unknown_field(&key, &["base64"]));
            }
            if encoded.is_some() {
                return Err(de::Error::duplicate_field("base64"));
            }
            encoded = Some(map.next_value()?);
        }
        let encoded = encoded.ok_or_else(|| de::Error::missing_field("base64"))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map(Body)
            .map_err(|e| de::Error::custom(format!("invalid base64 body: {}", e)))
    }
}

/// An outbound call as seen before it executes.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    method: String,
    uri: Uri,
    headers: Vec<(String, String)>,
    body: String,
}

impl OutboundRequest {
    /// Create a request for an absolute URL.
    pub fn new(method: &str, url: &str) -> Result<Self> {
        let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| {
            FixtureError::InvalidUrl {
                url: url.to_string(),
                message: e.to_string(),
            }
        })?;
        if uri.host().is_none() {
            return Err(FixtureError::InvalidUrl {
                url: url.to_string(),
                message: "missing host".to_string(),
            });
        }

        Ok(Self {
            method: method.to_uppercase(),
            uri,
            headers: Vec::new(),
            body: String::new(),
        })
    }

    /// Add a request header. Repeated names keep every value.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Set the request body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Upper-cased HTTP method.
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Lower-cased host name.
    pub fn host(&self) -> String {
        self.uri
            .host()
            .map(|h| h.to_ascii_lowercase())
            .unwrap_or_default()
    }

    /// Explicit port, or the scheme's default port.
    pub fn port(&self) -> Option<u16> {
        self.uri.port_u16().or_else(|| match self.uri.scheme_str() {
            Some("https") => Some(443),
            Some("http") => Some(80),
            _ => None,
        })
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Headers in the order they were added.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First value of a header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name).next()
    }

    /// Every value of a header, case-insensitive.
    pub fn header_values<'a, 'b>(&'a self, name: &'b str) -> impl Iterator<Item = &'a str> + use<'a, 'b> {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Decoded query string parameters.
    pub fn query_params(&self) -> HashMap<String, String> {
        parse_query_string(self.query().unwrap_or(""))
    }
}

/// A response produced by the transport or replayed from a fixture.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Response {
    pub status: u16,
    pub headers: ResponseHeaders,
    pub body: Body,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Body>) -> Self {
        Self {
            status,
            headers: ResponseHeaders::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<HeaderValue>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }
}

/// Performs real calls for requests that are not answered from fixtures.
pub trait Transport {
    fn send(&self, request: &OutboundRequest) -> std::result::Result<Response, TransportError>;
}

impl<F> Transport for F
where
    F: Fn(&OutboundRequest) -> std::result::Result<Response, TransportError>,
{
    fn send(&self, request: &OutboundRequest) -> std::result::Result<Response, TransportError> {
        self(request)
    }
}

/// Parse a query string into key-value pairs.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    for part in query.split('&') {
        if part.is_empty() {
            continue;
        }
        let (key, value) = part.split_once('=').unwrap_or((part, ""));
        params.insert(decode_component(key), decode_component(value));
    }

    params
}

fn decode_component(s: &str) -> String {
    let s = s.replace('+', " ");
    urlencoding::decode(&s)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(s)
}

//! Network response model and charset detection

use std::time::Duration;

use super::headers::Headers;

/// A finished HTTP exchange, one per attempt
///
/// Shared between every member of a dedup group through `Arc`, so all of them
/// observe byte-identical data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkResponse {
    /// HTTP status code
    pub status: u16,
    /// Fully drained and decoded body
    pub data: Vec<u8>,
    /// Response headers
    pub headers: Headers,
    /// Charset from `Content-Type`, or the configured default
    pub charset: String,
    /// True when a conditional refresh came back `304` and `data` is the cached body
    pub not_modified: bool,
    /// Time spent in the exchange
    pub network_time: Duration,
}

impl NetworkResponse {
    pub fn new(status: u16, data: Vec<u8>, headers: Headers, charset: &str) -> Self {
        Self {
            status,
            data,
            headers,
            charset: charset.to_string(),
            not_modified: false,
            network_time: Duration::ZERO,
        }
    }

    /// A `200` response with no headers, used by local short-circuit hooks
    pub fn ok(data: Vec<u8>, charset: &str) -> Self {
        Self::new(200, data, Headers::new(), charset)
    }

    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }
}

/// Return the `charset` parameter of the `Content-Type` header, or `default`
pub fn parse_charset(headers: &Headers, default: &str) -> String {
    headers
        .get("content-type")
        .and_then(charset_param)
        .unwrap_or_else(|| default.to_string())
}

fn charset_param(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.trim().split_once('=')?;
        if name.trim().eq_ignore_ascii_case("charset") {
            let value = value.trim().trim_matches('"');
            (!value.is_empty()).then(|| value.to_string())
        } else {
            None
        }
    })
}

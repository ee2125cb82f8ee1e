//! Response parsers
//!
//! A parser turns the raw [`NetworkResponse`] into the request's typed value.
//! Parsers run on dispatcher threads, never on the delivery executor, and a
//! failure is reported as [`RequestError::Parse`].

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::app::network::NetworkResponse;
use crate::errors::RequestError;

/// Converts a network response into a typed value
pub trait ResponseParser<T>: Send + Sync {
    fn parse(&self, response: &NetworkResponse) -> Result<T, RequestError>;
}

impl<T, F> ResponseParser<T> for F
where
    F: Fn(&NetworkResponse) -> Result<T, RequestError> + Send + Sync,
{
    fn parse(&self, response: &NetworkResponse) -> Result<T, RequestError> {
        self(response)
    }
}

/// Hands back the body bytes untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesParser;

impl ResponseParser<Vec<u8>> for BytesParser {
    fn parse(&self, response: &NetworkResponse) -> Result<Vec<u8>, RequestError> {
        Ok(response.data.clone())
    }
}

/// Decodes the body as text using the response charset
#[derive(Debug, Clone, Copy, Default)]
pub struct TextParser;

impl ResponseParser<String> for TextParser {
    fn parse(&self, response: &NetworkResponse) -> Result<String, RequestError> {
        decode_text(&response.data, &response.charset)
    }
}

/// Deserializes a JSON body into `T`
pub struct JsonParser<T> {
    _target: PhantomData<fn() -> T>,
}

impl<T> JsonParser<T> {
    pub fn new() -> Self {
        Self {
            _target: PhantomData,
        }
    }
}

impl<T> Default for JsonParser<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for JsonParser<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsonParser")
    }
}

impl<T: DeserializeOwned> ResponseParser<T> for JsonParser<T> {
    fn parse(&self, response: &NetworkResponse) -> Result<T, RequestError> {
        let text = decode_text(&response.data, &response.charset)?;
        serde_json::from_str(&text).map_err(|e| RequestError::parse(e.to_string()))
    }
}

/// Decode `data` with the named charset
///
/// UTF-8 and the single-byte Latin-1/ASCII family are decoded exactly; other
/// charsets fall back to lossy UTF-8.
pub fn decode_text(data: &[u8], charset: &str) -> Result<String, RequestError> {
    match charset.trim().to_ascii_lowercase().as_str() {
        "utf-8" | "utf8" => String::from_utf8(data.to_vec())
            .map_err(|e| RequestError::parse(format!("invalid UTF-8 body: {}", e))),
        "iso-8859-1" | "latin1" | "latin-1" | "us-ascii" | "ascii" => {
            Ok(data.iter().map(|&b| char::from(b)).collect())
        }
        other => {
            debug!("Unsupported charset '{}', decoding lossily as UTF-8", other);
            Ok(String::from_utf8_lossy(data).into_owned())
        }
    }
}

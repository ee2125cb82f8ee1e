//! HTTP transport seam
//!
//! The engine never speaks HTTP itself. A [`Transport`] performs one exchange
//! and hands back the status, headers and an unread body stream; draining,
//! decoding and classification happen in the network executor.

pub mod http;

use std::fmt::{self, Debug};
use std::io::{Cursor, Read};
use std::time::Duration;

use crate::app::network::Headers;
use crate::app::request::{Body, Method};
use crate::errors::TransportResult;

pub use http::{ReqwestTransport, TransportConfig};

/// One outgoing attempt
#[derive(Debug, Clone, Copy)]
pub struct TransportRequest<'a> {
    pub method: Method,
    pub url: &'a str,
    pub headers: &'a Headers,
    pub body: &'a Body,
    /// Connect and read timeout for this attempt
    pub timeout: Duration,
}

/// Response head plus an undrained body
pub struct RawResponse {
    pub status: u16,
    /// Header pairs as received; names may repeat
    pub headers: Vec<(String, String)>,
    pub body: Box<dyn Read + Send>,
    /// Declared entity length, if any
    pub content_length: Option<u64>,
}

impl RawResponse {
    /// Response backed by an in-memory body
    pub fn from_bytes(status: u16, headers: Vec<(String, String)>, data: Vec<u8>) -> Self {
        let content_length = Some(data.len() as u64);
        Self {
            status,
            headers,
            body: Box::new(Cursor::new(data)),
            content_length,
        }
    }
}

impl Debug for RawResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("content_length", &self.content_length)
            .finish()
    }
}

/// Performs a single HTTP exchange
pub trait Transport: Send + Sync + Debug {
    fn execute(&self, request: &TransportRequest<'_>) -> TransportResult<RawResponse>;
}

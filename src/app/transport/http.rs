//! Blocking reqwest transport

use std::time::Duration;

use reqwest::blocking::{multipart, Client};
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::app::request::{Body, Method};
use crate::constants::http as http_defaults;
use crate::errors::{TransportError, TransportResult};

use super::{RawResponse, Transport, TransportRequest};

/// Configuration for [`ReqwestTransport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    pub user_agent: String,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    pub cookie_store: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: http_defaults::USER_AGENT.to_string(),
            connect_timeout: http_defaults::CONNECT_TIMEOUT,
            cookie_store: false,
        }
    }
}

/// [`Transport`] backed by a blocking reqwest client
///
/// Redirects are not followed and bodies are not decompressed here; both are
/// the network executor's job.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &TransportConfig) -> TransportResult<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.connect_timeout)
            .redirect(Policy::none())
            .cookie_store(config.cookie_store)
            .build()
            .map_err(|e| TransportError::Io(format!("failed to build HTTP client: {}", e)))?;

        debug!("Created reqwest transport (user agent {})", config.user_agent);
        Ok(Self { client })
    }

    fn method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            Method::Head => reqwest::Method::HEAD,
            Method::Options => reqwest::Method::OPTIONS,
            Method::Trace => reqwest::Method::TRACE,
            Method::Patch => reqwest::Method::PATCH,
        }
    }

    fn multipart_form(
        fields: &[(String, String)],
        files: &[(String, std::path::PathBuf)],
    ) -> TransportResult<multipart::Form> {
        let mut form = multipart::Form::new();
        for (name, value) in fields {
            form = form.text(name.clone(), value.clone());
        }
        for (name, path) in files {
            form = form.file(name.clone(), path).map_err(|e| {
                TransportError::Body(format!("cannot attach {}: {}", path.display(), e))
            })?;
        }
        Ok(form)
    }
}

impl Transport for ReqwestTransport {
    fn execute(&self, request: &TransportRequest<'_>) -> TransportResult<RawResponse> {
        let url = Url::parse(request.url).map_err(|e| TransportError::MalformedUrl {
            url: request.url.to_string(),
            reason: e.to_string(),
        })?;

        let mut builder = self
            .client
            .request(Self::method(request.method), url)
            .timeout(request.timeout);
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }

        builder = match request.body {
            Body::Empty => builder,
            Body::Bytes { content_type, data } => builder
                .header(CONTENT_TYPE, content_type.as_str())
                .body(data.clone()),
            Body::Form(params) => builder.form(params),
            Body::Multipart { fields, files } => {
                builder.multipart(Self::multipart_form(fields, files)?)
            }
        };

        let response = builder.send()?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let content_length = response.content_length();

        Ok(RawResponse {
            status,
            headers,
            body: Box::new(response),
            content_length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::network::Headers;

    #[test]
    fn test_malformed_url_is_rejected_before_connecting() {
        let transport = ReqwestTransport::new(&TransportConfig::default()).unwrap();
        let headers = Headers::new();
        let request = TransportRequest {
            method: Method::Get,
            url: "not a url",
            headers: &headers,
            body: &Body::Empty,
            timeout: Duration::from_millis(100),
        };

        match transport.execute(&request) {
            Err(TransportError::MalformedUrl { url, .. }) => assert_eq!(url, "not a url"),
            other => panic!("expected malformed URL, got {:?}", other.map(|r| r.status)),
        }
    }

    #[test]
    fn test_missing_multipart_file() {
        let err = ReqwestTransport::multipart_form(
            &[("a".to_string(), "b".to_string())],
            &[("f".to_string(), "/definitely/not/here.bin".into())],
        )
        .unwrap_err();
        assert!(matches!(err, TransportError::Body(_)));
    }
}

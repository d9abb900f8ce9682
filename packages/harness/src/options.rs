use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use simharness_mock_http::find_header;

use crate::RequestError;

/// Default per-request timeout when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Caller-facing request configuration, normalized by
/// [`FunctionalTest::request`](crate::FunctionalTest::request).
///
/// Normalization guarantees a `Host` header (default `localhost`),
/// substitutes `parameters` into `{key}` URI template placeholders,
/// appends `query` as a URL-encoded query string, and coerces `body`
/// into bytes, defaulting `Content-Type: application/json` when a body
/// is present without one.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: BTreeMap<String, String>,
    pub body: Option<RequestBody>,
    pub parameters: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// A URI template substitution: every literal `{key}` in the URL is
    /// replaced with the value.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn normalize(
        self,
        method: &str,
        uri: &str,
    ) -> Result<NormalizedRequest, RequestError> {
        let Self {
            mut headers,
            body,
            parameters,
            query,
            timeout,
        } = self;

        if find_header(&headers, "Host").is_none() {
            headers.insert("Host".to_string(), "localhost".to_string());
        }

        // Parameter substitution runs before query expansion so templated
        // values land in the path, not the query string.
        let mut url = uri.to_string();
        for (key, value) in &parameters {
            url = url.replace(&format!("{{{key}}}"), value);
        }
        if !query.is_empty() {
            if !url.contains('?') {
                url.push('?');
            }
            url.push_str(&encode_query(&query));
        }

        let body = body.map(|body| body.to_bytes()).transpose()?;
        if body.is_some() && find_header(&headers, "Content-Type").is_none() {
            headers.insert("Content-Type".to_string(), "application/json".to_string());
        }

        Ok(NormalizedRequest {
            method: method.to_string(),
            url,
            headers,
            body,
            timeout: timeout.filter(|t| !t.is_zero()).unwrap_or(DEFAULT_TIMEOUT),
        })
    }
}

fn encode_query(query: &BTreeMap<String, String>) -> String {
    query
        .iter()
        .map(|(key, value)| {
            format!(
                "{key}={value}",
                key = urlencoding::encode(key),
                value = urlencoding::encode(value)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// A request body before coercion to bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Bytes(Bytes),
    Text(String),
    Json(serde_json::Value),
    Form(BTreeMap<String, String>),
}

impl RequestBody {
    /// Create a JSON body from any serializable value.
    ///
    /// # Errors
    ///
    /// * If the value fails to serialize to JSON
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    #[must_use]
    pub fn form<K: Into<String>, V: Into<String>>(data: impl IntoIterator<Item = (K, V)>) -> Self {
        Self::Form(
            data.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    pub(crate) fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        Ok(match self {
            Self::Bytes(bytes) => bytes.clone(),
            Self::Text(text) => Bytes::from(text.clone().into_bytes()),
            Self::Json(value) => Bytes::from(serde_json::to_vec(value)?),
            Self::Form(form) => Bytes::from(encode_query(form).into_bytes()),
        })
    }
}

impl From<&str> for RequestBody {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RequestBody {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value.into())
    }
}

impl From<Bytes> for RequestBody {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

/// The fully normalized form of one request, handed to the mock request
/// builder and kept on the result for diagnostics.
#[derive(Debug, Clone)]
pub(crate) struct NormalizedRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Bytes>,
    pub timeout: Duration,
}

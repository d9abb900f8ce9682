#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! In-memory mock request/response primitives for exercising HTTP
//! handlers without a network stack.
//!
//! [`MockRequest`] carries the simulated input and defers body emission
//! until the handler signals resumption; [`MockResponse`] captures what
//! the handler writes and signals completion when the response ends.
//! Response construction is shaped per [`ServerKind`] so that a handler
//! written against a particular framework's conventions sees the surface
//! it expects.

pub mod request;
pub mod response;

pub use request::MockRequest;
pub use response::{MockResponse, ResponseLineage};

/// The framework a captured handler was written against. Used only to
/// select mock-shaping quirks; it never changes request semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerKind {
    Generic,
    Express,
    Restify,
    Restiq,
}

impl ServerKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Express => "express",
            Self::Restify => "restify",
            Self::Restiq => "restiq",
        }
    }

    /// The response-shaping configuration for this kind.
    ///
    /// `Restify` and `Restiq` handlers manage headers themselves, so the
    /// `send` convenience helper is absent for them and their own
    /// header-handling path is exercised instead of a mock shortcut.
    #[must_use]
    pub const fn shaping(self) -> MockShaping {
        match self {
            Self::Generic => MockShaping {
                lineage: ResponseLineage::EventEmitter,
                send_helper: true,
            },
            Self::Express => MockShaping {
                lineage: ResponseLineage::ServerResponse,
                send_helper: true,
            },
            Self::Restify => MockShaping {
                lineage: ResponseLineage::ServerResponse,
                send_helper: false,
            },
            Self::Restiq => MockShaping {
                lineage: ResponseLineage::EventEmitter,
                send_helper: false,
            },
        }
    }
}

impl std::fmt::Display for ServerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-[`ServerKind`] response construction record: which event-emitter
/// lineage the response reports, and whether the one-call `send` helper
/// exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockShaping {
    pub lineage: ResponseLineage,
    pub send_helper: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum MockHttpError {
    #[error("the send helper is not available for {kind} responses")]
    SendUnsupported { kind: ServerKind },
}

/// Reason phrase for an HTTP status code.
#[must_use]
pub const fn status_text(code: u16) -> &'static str {
    match code {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

/// Case-insensitive header lookup over a case-preserving header map.
///
/// When multiple keys differ only by case, the last match in map
/// iteration order wins.
#[must_use]
pub fn find_header<'a>(
    headers: &'a std::collections::BTreeMap<String, String>,
    name: &str,
) -> Option<&'a str> {
    let mut found = None;
    for (key, value) in headers {
        if key.eq_ignore_ascii_case(name) {
            found = Some(value.as_str());
        }
    }
    found
}

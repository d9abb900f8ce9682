#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Functional testing for HTTP request handlers without a socket.
//!
//! A [`FunctionalTest`] owns a captured request handler and replays
//! synthetic requests against it: caller-supplied [`RequestOptions`] are
//! normalized (default `Host` header, URI templating, query expansion,
//! body coercion), a mock request/response pair is built and driven
//! through the handler, and the finalized [`RequestResult`] is returned
//! for assertions, link navigation, and diagnostic rendering.
//!
//! Handlers are plain functions over the mock pair:
//!
//! ```rust,ignore
//! let test = FunctionalTest::with_handler(
//!     |_req, res, _done| {
//!         res.write_head(200, [("Content-Type", "text/plain")]);
//!         res.end("this works");
//!     },
//!     ServerKind::Generic,
//! );
//! let result = test.request("GET", "/", RequestOptions::new()).await?;
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub mod assertions;
pub mod options;
pub mod render;
pub mod result;

pub use simharness_link_header::{LinkDefinition, LinkHeaderParseError, LinkSet};
pub use simharness_mock_http::{
    MockHttpError, MockRequest, MockResponse, MockShaping, ResponseLineage, ServerKind,
};

pub use assertions::RequestResultExt;
pub use options::{DEFAULT_TIMEOUT, RequestBody, RequestOptions};
pub use render::SectionRenderer;
pub use result::{RequestResult, ResultState};

/// The optional middleware-style completion callback handed to handlers.
/// Handlers normally signal completion by ending the response instead.
pub type DoneCallback = Box<dyn FnOnce() + Send>;

/// A captured request handler: writes a response onto the mock response
/// and signals completion by ending it.
pub type RequestHandler = Arc<dyn Fn(MockRequest, MockResponse, DoneCallback) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("request timed out after {timeout:?}")]
    Timeout { timeout: Duration },
    #[error("failed to serialize request body as JSON: {0}")]
    BodySerialization(#[from] serde_json::Error),
}

/// The relation (and optional title) a link lookup was asked for, echoed
/// back in lookup failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkCriteria {
    pub rel: String,
    pub title: Option<String>,
}

impl fmt::Display for LinkCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "relation {}", self.rel)?;
        if let Some(title) = &self.title {
            write!(f, ", title {title}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("no links were in the response")]
    NoLinks,
    #[error("no links found for {criteria}")]
    NotFound { criteria: LinkCriteria },
    #[error("multiple links found for {criteria}")]
    Ambiguous { criteria: LinkCriteria },
}

#[derive(Debug, thiserror::Error)]
pub enum FollowError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Request(#[from] RequestError),
}

static NEXT_TEST_ID: AtomicU64 = AtomicU64::new(0);

/// Owns a captured request handler and produces one [`RequestResult`]
/// per simulated call.
///
/// Cheaply cloneable; results hold a clone back to their owning test so
/// [`RequestResult::follow`] can issue the next request through it.
#[derive(Clone)]
pub struct FunctionalTest {
    inner: Arc<FunctionalTestInner>,
}

struct FunctionalTestInner {
    id: u64,
    handler: RequestHandler,
    kind: ServerKind,
}

impl FunctionalTest {
    #[must_use]
    pub fn new(handler: RequestHandler, kind: ServerKind) -> Self {
        let id = NEXT_TEST_ID.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!("FunctionalTest #{id}: created {kind} functional test");
        Self {
            inner: Arc::new(FunctionalTestInner { id, handler, kind }),
        }
    }

    /// Convenience constructor wrapping a plain closure.
    #[must_use]
    pub fn with_handler(
        handler: impl Fn(MockRequest, MockResponse, DoneCallback) + Send + Sync + 'static,
        kind: ServerKind,
    ) -> Self {
        Self::new(Arc::new(handler), kind)
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[must_use]
    pub fn kind(&self) -> ServerKind {
        self.inner.kind
    }

    pub(crate) fn handler(&self) -> &RequestHandler {
        &self.inner.handler
    }

    /// Simulate one request against the captured handler.
    ///
    /// The options are consumed: normalization applies the default `Host`
    /// header, URI templating, query expansion, and body coercion before
    /// the exchange starts (see [`RequestOptions`]).
    ///
    /// # Errors
    ///
    /// * [`RequestError::Timeout`] if the handler does not end the
    ///   response within the configured timeout
    /// * [`RequestError::BodySerialization`] if a JSON body fails to
    ///   serialize
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        options: RequestOptions,
    ) -> Result<RequestResult, RequestError> {
        let normalized = options.normalize(method, uri)?;
        log::debug!(
            "FunctionalTest #{id}: updated request options: {normalized:?}",
            id = self.inner.id
        );
        RequestResult::start(self.clone(), normalized).await
    }
}

impl fmt::Debug for FunctionalTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionalTest")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .finish_non_exhaustive()
    }
}

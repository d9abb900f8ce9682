use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use simharness_link_header::{LinkDefinition, LinkSet};
use simharness_mock_http::{MockRequest, MockResponse, find_header};

use crate::options::NormalizedRequest;
use crate::render::{SectionRenderer, default_renderers};
use crate::{
    DoneCallback, FollowError, FunctionalTest, LinkCriteria, LinkError, RequestError,
    RequestOptions,
};

static NEXT_RESULT_ID: AtomicU64 = AtomicU64::new(0);

/// Lifecycle of one simulated exchange. `Completed` and `TimedOut` are
/// terminal and mutually exclusive: whichever transition happens first
/// wins and the loser becomes a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultState {
    Created,
    Pending,
    Completed,
    TimedOut,
}

/// One simulated HTTP exchange: the mock pair, the completion/timeout
/// race, and (once completed) the finalized body, status, headers, and
/// parsed links.
pub struct RequestResult {
    id: u64,
    functional_test: FunctionalTest,
    request: NormalizedRequest,
    req: MockRequest,
    res: MockResponse,
    state: ResultState,
    body: Option<Bytes>,
    status_code: Option<u16>,
    status_message: Option<String>,
    headers: BTreeMap<String, String>,
    links: Option<LinkSet>,
    renderers: Vec<SectionRenderer>,
}

impl RequestResult {
    fn new(functional_test: FunctionalTest, request: NormalizedRequest) -> Self {
        let id = NEXT_RESULT_ID.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!("RequestResult #{id}: created");
        let req = MockRequest::new(
            request.method.clone(),
            request.url.clone(),
            request.headers.clone(),
            request.body.clone(),
        );
        let res = MockResponse::new(functional_test.kind());
        Self {
            id,
            functional_test,
            request,
            req,
            res,
            state: ResultState::Created,
            body: None,
            status_code: None,
            status_message: None,
            headers: BTreeMap::new(),
            links: None,
            renderers: default_renderers(),
        }
    }

    /// Run the exchange to its terminal state. Called by
    /// [`FunctionalTest::request`].
    pub(crate) async fn start(
        functional_test: FunctionalTest,
        request: NormalizedRequest,
    ) -> Result<Self, RequestError> {
        let mut result = Self::new(functional_test, request);
        result.run().await?;
        Ok(result)
    }

    async fn run(&mut self) -> Result<(), RequestError> {
        let completion = self.res.on_complete();
        self.state = ResultState::Pending;

        let id = self.id;
        let done: DoneCallback = Box::new(move || {
            // Normally the done callback is not called; handlers end the
            // response instead.
            log::debug!("RequestResult #{id}: a 'done' callback was called");
        });

        log::debug!("RequestResult #{id}: calling request handler");
        let handler = self.functional_test.handler().clone();
        handler(self.req.clone(), self.res.clone(), done);

        let timeout = self.request.timeout;
        match tokio::time::timeout(timeout, completion).await {
            Ok(Ok(())) => {
                log::debug!("RequestResult #{id}: end event emitted");
                self.complete();
                Ok(())
            }
            // A closed channel means the response can no longer complete,
            // so it collapses into the timeout outcome.
            Ok(Err(_)) | Err(_) => {
                self.time_out();
                Err(RequestError::Timeout { timeout })
            }
        }
    }

    fn complete(&mut self) {
        if self.state != ResultState::Pending {
            log::debug!(
                "RequestResult #{id}: completion after {state:?} ignored",
                id = self.id,
                state = self.state
            );
            return;
        }
        self.state = ResultState::Completed;
        self.finalize();
    }

    fn time_out(&mut self) {
        if self.state != ResultState::Pending {
            return;
        }
        log::debug!("RequestResult #{id}: timed out", id = self.id);
        self.state = ResultState::TimedOut;
    }

    /// Snapshot body, status, and headers from the mock response, and
    /// parse the `Link` header when present. Runs once, only for the
    /// winning `Pending → Completed` transition.
    fn finalize(&mut self) {
        self.body = Some(self.res.body());
        self.status_code = Some(self.res.status_code());
        self.status_message = Some(self.res.status_message());
        self.headers = self.res.headers();

        if let Some(raw) = find_header(&self.headers, "Link") {
            match LinkSet::parse(raw) {
                Ok(links) if !links.is_empty() => self.links = Some(links),
                Ok(_) => {}
                Err(e) => {
                    log::warn!(
                        "RequestResult #{id}: failed to parse Link header: {e}",
                        id = self.id
                    );
                }
            }
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn functional_test(&self) -> &FunctionalTest {
        &self.functional_test
    }

    #[must_use]
    pub fn state(&self) -> ResultState {
        self.state
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.request.method
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.request.url
    }

    /// The normalized request headers, as sent to the handler.
    #[must_use]
    pub fn request_headers(&self) -> &BTreeMap<String, String> {
        &self.request.headers
    }

    #[must_use]
    pub fn request_body(&self) -> Option<&Bytes> {
        self.request.body.as_ref()
    }

    #[must_use]
    pub fn mock_request(&self) -> &MockRequest {
        &self.req
    }

    #[must_use]
    pub fn mock_response(&self) -> &MockResponse {
        &self.res
    }

    /// The captured response body. Absent until the exchange completed.
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// The captured response body as UTF-8 text.
    #[must_use]
    pub fn body_str(&self) -> Option<&str> {
        self.body
            .as_ref()
            .and_then(|body| std::str::from_utf8(body).ok())
    }

    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    #[must_use]
    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    /// The finalized response headers.
    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Case-insensitive lookup over the finalized response headers.
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// The parsed `Link` header, when the response carried one.
    #[must_use]
    pub fn links(&self) -> Option<&LinkSet> {
        self.links.as_ref()
    }

    /// Find exactly one link by relation.
    ///
    /// # Errors
    ///
    /// * [`LinkError::NoLinks`] when the response carried no links at all
    /// * [`LinkError::NotFound`] when no link matches the relation
    /// * [`LinkError::Ambiguous`] when more than one matches; ambiguous
    ///   lookups are rejected, never resolved by taking the first
    pub fn find_link(&self, rel: &str) -> Result<&LinkDefinition, LinkError> {
        self.lookup_link(rel, None)
    }

    /// Find exactly one link by relation and exact title.
    ///
    /// # Errors
    ///
    /// * Same as [`RequestResult::find_link`], with the title included in
    ///   the reported criteria
    pub fn find_link_titled(&self, rel: &str, title: &str) -> Result<&LinkDefinition, LinkError> {
        self.lookup_link(rel, Some(title))
    }

    fn lookup_link(&self, rel: &str, title: Option<&str>) -> Result<&LinkDefinition, LinkError> {
        let Some(links) = &self.links else {
            return Err(LinkError::NoLinks);
        };

        let mut matches = links.relations(rel);
        if matches.is_empty() {
            return Err(LinkError::NotFound {
                criteria: LinkCriteria {
                    rel: rel.to_string(),
                    title: None,
                },
            });
        }

        if let Some(title) = title {
            matches.retain(|link| link.title.as_deref() == Some(title));
        }
        let criteria = LinkCriteria {
            rel: rel.to_string(),
            title: title.map(ToString::to_string),
        };

        match matches.as_slice() {
            [] => Err(LinkError::NotFound { criteria }),
            [link] => Ok(*link),
            _ => Err(LinkError::Ambiguous { criteria }),
        }
    }

    /// Resolve a link by relation (and optional exact title), then issue
    /// a new request through the owning [`FunctionalTest`] at the
    /// resolved target.
    ///
    /// # Errors
    ///
    /// * [`FollowError::Link`] when the lookup fails
    /// * [`FollowError::Request`] when the follow-up request fails
    pub async fn follow(
        &self,
        method: &str,
        rel: &str,
        title: Option<&str>,
        options: RequestOptions,
    ) -> Result<Self, FollowError> {
        let link = self.lookup_link(rel, title)?;
        let uri = link.uri.clone();
        log::debug!("RequestResult #{id}: following {rel} to {uri}", id = self.id);
        Ok(self.functional_test.request(method, &uri, options).await?)
    }

    pub(crate) fn renderers(&self) -> &[SectionRenderer] {
        &self.renderers
    }

    /// Append a custom diagnostic section renderer. Sections render in
    /// registration order; a renderer returning `None` is omitted.
    pub fn add_renderer(&mut self, renderer: SectionRenderer) {
        self.renderers.push(renderer);
    }
}

impl fmt::Debug for RequestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestResult")
            .field("id", &self.id)
            .field("method", &self.request.method)
            .field("url", &self.request.url)
            .field("state", &self.state)
            .field("status_code", &self.status_code)
            .finish_non_exhaustive()
    }
}

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use tokio::sync::oneshot;

use crate::{MockHttpError, MockShaping, ServerKind, find_header, status_text};

/// The event-emitter lineage a mock response reports. Handlers written
/// against a specific framework sniff this to decide which code path
/// handles the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseLineage {
    EventEmitter,
    ServerResponse,
}

/// A simulated outgoing HTTP response.
///
/// Clones share state. Handlers write status, headers, and body through
/// the mutating methods; the harness reads the captured output back after
/// [`MockResponse::end`] has fired the completion signal. `end` is
/// idempotent: the first call wins and later calls are ignored.
#[derive(Clone)]
pub struct MockResponse {
    kind: ServerKind,
    shaping: MockShaping,
    state: Arc<Mutex<ResponseState>>,
}

struct ResponseState {
    status_code: u16,
    status_message: Option<String>,
    headers: BTreeMap<String, String>,
    body: BytesMut,
    ended: bool,
    completion: Vec<oneshot::Sender<()>>,
}

impl MockResponse {
    #[must_use]
    pub fn new(kind: ServerKind) -> Self {
        Self {
            kind,
            shaping: kind.shaping(),
            state: Arc::new(Mutex::new(ResponseState {
                status_code: 200,
                status_message: None,
                headers: BTreeMap::new(),
                body: BytesMut::new(),
                ended: false,
                completion: vec![],
            })),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ServerKind {
        self.kind
    }

    #[must_use]
    pub const fn lineage(&self) -> ResponseLineage {
        self.shaping.lineage
    }

    /// A receiver resolved when the response ends. Subscribing after the
    /// end resolves immediately.
    #[must_use]
    pub fn on_complete(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.lock();
        if state.ended {
            drop(state);
            let _ = tx.send(());
        } else {
            state.completion.push(tx);
        }
        rx
    }

    pub fn set_status(&self, status_code: u16) {
        let mut state = self.lock();
        if state.ended {
            log::debug!("set_status({status_code}) after end, ignoring");
            return;
        }
        state.status_code = status_code;
    }

    pub fn set_status_message(&self, message: impl Into<String>) {
        let mut state = self.lock();
        if state.ended {
            log::debug!("set_status_message after end, ignoring");
            return;
        }
        state.status_message = Some(message.into());
    }

    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) {
        let mut state = self.lock();
        if state.ended {
            log::debug!("set_header after end, ignoring");
            return;
        }
        state.headers.insert(name.into(), value.into());
    }

    /// Set the status code and a batch of headers in one call.
    pub fn write_head<K: Into<String>, V: Into<String>>(
        &self,
        status_code: u16,
        headers: impl IntoIterator<Item = (K, V)>,
    ) {
        let mut state = self.lock();
        if state.ended {
            log::debug!("write_head({status_code}) after end, ignoring");
            return;
        }
        state.status_code = status_code;
        for (name, value) in headers {
            state.headers.insert(name.into(), value.into());
        }
    }

    /// Append a chunk to the response body.
    pub fn write(&self, chunk: impl Into<Bytes>) {
        let chunk = chunk.into();
        let mut state = self.lock();
        if state.ended {
            log::debug!("write after end, ignoring {len} bytes", len = chunk.len());
            return;
        }
        state.body.extend_from_slice(&chunk);
    }

    /// End the response, optionally appending a final chunk, and fire the
    /// completion signal. Only the first call has any effect.
    pub fn end<T: Into<Bytes>, B: Into<Option<T>>>(&self, chunk: B) {
        let senders = {
            let mut state = self.lock();
            if state.ended {
                log::debug!("end() called again, ignoring");
                return;
            }
            if let Some(chunk) = chunk.into().map(Into::into) {
                state.body.extend_from_slice(&chunk);
            }
            state.ended = true;
            std::mem::take(&mut state.completion)
        };
        log::debug!("response ended");
        for sender in senders {
            // The receiver is gone when the exchange already timed out.
            let _ = sender.send(());
        }
    }

    /// One-call convenience: status, headers, body, then end, defaulting
    /// `Content-Type: text/plain` when none was set.
    ///
    /// # Errors
    ///
    /// * [`MockHttpError::SendUnsupported`] when this response's
    ///   [`ServerKind`] shaping deliberately omits the helper
    pub fn send<K: Into<String>, V: Into<String>, T: Into<Bytes>, B: Into<Option<T>>>(
        &self,
        status_code: u16,
        headers: impl IntoIterator<Item = (K, V)>,
        body: B,
    ) -> Result<(), MockHttpError> {
        if !self.shaping.send_helper {
            return Err(MockHttpError::SendUnsupported { kind: self.kind });
        }
        self.write_head(status_code, headers);
        {
            let mut state = self.lock();
            if !state.ended && find_header(&state.headers, "Content-Type").is_none() {
                state
                    .headers
                    .insert("Content-Type".to_string(), "text/plain".to_string());
            }
        }
        self.end(body);
        Ok(())
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.lock().ended
    }

    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.lock().status_code
    }

    /// The status message, derived from the status code unless one was set
    /// explicitly.
    #[must_use]
    pub fn status_message(&self) -> String {
        let state = self.lock();
        state
            .status_message
            .clone()
            .unwrap_or_else(|| status_text(state.status_code).to_string())
    }

    #[must_use]
    pub fn headers(&self) -> BTreeMap<String, String> {
        self.lock().headers.clone()
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<String> {
        let state = self.lock();
        find_header(&state.headers, name).map(ToString::to_string)
    }

    /// Snapshot of the body captured so far.
    #[must_use]
    pub fn body(&self) -> Bytes {
        self.lock().body.clone().freeze()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ResponseState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for MockResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MockResponse")
            .field("kind", &self.kind)
            .field("status_code", &state.status_code)
            .field("headers", &state.headers)
            .field("ended", &state.ended)
            .finish_non_exhaustive()
    }
}

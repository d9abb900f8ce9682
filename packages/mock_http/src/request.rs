use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::find_header;

type DataListener = Box<dyn FnMut(&Bytes) + Send>;
type EndListener = Box<dyn FnMut() + Send>;

/// A simulated incoming HTTP request.
///
/// Clones share state, so a handler may hold one clone inside a callback
/// while the harness keeps another.
///
/// The body is offered two ways: synchronously via [`MockRequest::body`],
/// and as a simulated read stream via [`MockRequest::on_data`] /
/// [`MockRequest::on_end`]. Stream emission is deferred until the first
/// [`MockRequest::resume`] call and happens exactly once, no matter how
/// many times resumption is signaled. Listeners must be registered before
/// resuming; late subscribers are never called.
#[derive(Clone)]
pub struct MockRequest {
    shared: Arc<RequestShared>,
}

struct RequestShared {
    method: String,
    url: String,
    headers: BTreeMap<String, String>,
    body: Option<Bytes>,
    events: Mutex<RequestEvents>,
}

#[derive(Default)]
struct RequestEvents {
    data: Vec<DataListener>,
    end: Vec<EndListener>,
    emitted: bool,
}

impl MockRequest {
    #[must_use]
    pub fn new(
        method: impl Into<String>,
        url: impl Into<String>,
        headers: BTreeMap<String, String>,
        body: Option<Bytes>,
    ) -> Self {
        Self {
            shared: Arc::new(RequestShared {
                method: method.into(),
                url: url.into(),
                headers,
                body,
                events: Mutex::new(RequestEvents::default()),
            }),
        }
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.shared.method
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.shared.url
    }

    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.shared.headers
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.shared.headers, name)
    }

    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.shared.body.as_ref()
    }

    /// Register a listener for the simulated `data` event.
    pub fn on_data(&self, listener: impl FnMut(&Bytes) + Send + 'static) {
        self.with_events(|events| events.data.push(Box::new(listener)));
    }

    /// Register a listener for the simulated `end` event.
    pub fn on_end(&self, listener: impl FnMut() + Send + 'static) {
        self.with_events(|events| events.end.push(Box::new(listener)));
    }

    /// Signal that the handler has started reading the body.
    ///
    /// The first call emits `data` (when a body exists) followed by `end`;
    /// every later call is a no-op.
    pub fn resume(&self) {
        let (mut data, mut end) = {
            let mut events = self.shared.events.lock().unwrap_or_else(|e| e.into_inner());
            if events.emitted {
                log::debug!("resume() called again, body already emitted");
                return;
            }
            events.emitted = true;
            (std::mem::take(&mut events.data), std::mem::take(&mut events.end))
        };

        // Listeners run outside the lock so they may touch the request.
        if let Some(body) = &self.shared.body {
            log::debug!("sending body ({len} bytes)", len = body.len());
            for listener in &mut data {
                listener(body);
            }
        } else {
            log::debug!("no body to send");
        }
        for listener in &mut end {
            listener();
        }
    }

    /// Whether the body stream has already been emitted.
    #[must_use]
    pub fn is_emitted(&self) -> bool {
        self.shared
            .events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .emitted
    }

    fn with_events(&self, f: impl FnOnce(&mut RequestEvents)) {
        let mut events = self.shared.events.lock().unwrap_or_else(|e| e.into_inner());
        if events.emitted {
            log::warn!("listener registered after the body was emitted, it will never fire");
        }
        f(&mut events);
    }
}

impl std::fmt::Debug for MockRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRequest")
            .field("method", &self.shared.method)
            .field("url", &self.shared.url)
            .field("headers", &self.shared.headers)
            .field("body", &self.shared.body)
            .finish_non_exhaustive()
    }
}

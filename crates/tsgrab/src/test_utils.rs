//! Test doubles shared by the engine's unit tests.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use url::Url;

use crate::transport::{Transport, TransportError};

/// In-memory transport answering from per-URL scripts.
///
/// Each URL owns a queue of responses; the last queued response repeats once
/// the queue is down to one entry. Unknown URLs answer 404.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Result<Bytes, TransportError>>>>,
    calls: Mutex<Vec<(String, HeaderMap)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(self, url: &str, body: impl Into<Bytes>) -> Self {
        self.push(url, Ok(body.into()))
    }

    pub fn status(self, url: &str, status: StatusCode) -> Self {
        let err = TransportError::Status {
            url: url.to_string(),
            status,
        };
        self.push(url, Err(err))
    }

    pub fn push(self, url: &str, response: Result<Bytes, TransportError>) -> Self {
        self.scripts
            .lock()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|(u, _)| u == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    /// Headers sent with the most recent request to `url`.
    pub fn last_headers_for(&self, url: &str) -> Option<HeaderMap> {
        self.calls
            .lock()
            .iter()
            .rev()
            .find(|(u, _)| u == url)
            .map(|(_, h)| h.clone())
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(&self, url: &Url, headers: &HeaderMap) -> Result<Bytes, TransportError> {
        self.calls.lock().push((url.to_string(), headers.clone()));
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(url.as_str()) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(|| not_found(url)),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| not_found(url)),
            None => not_found(url),
        }
    }
}

fn not_found(url: &Url) -> Result<Bytes, TransportError> {
    Err(TransportError::Status {
        url: url.to_string(),
        status: StatusCode::NOT_FOUND,
    })
}

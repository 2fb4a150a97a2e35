//! Firebase Realtime Database over its REST API.
//!
//! Live children come from the streaming endpoint (`Accept:
//! text/event-stream`), which sends one `put` with the whole collection and
//! then `put`/`patch` frames for every change below it.

use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, header};
use serde::Deserialize;
use serde_json::Value;

use super::{ChildEvent, ChildStream, RealtimeStore, StoreError, path_segments};

pub struct FirebaseStore {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    name: String,
}

impl FirebaseStore {
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token,
        }
    }

    fn url(&self, path: &str) -> Result<String, StoreError> {
        let path = path_segments(path)?.join("/");
        Ok(format!("{}/{}.json", self.base_url, path))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.query(&[("auth", token)]),
            None => request,
        }
    }
}

#[async_trait]
impl RealtimeStore for FirebaseStore {
    async fn push(&self, path: &str, value: Value) -> Result<String, StoreError> {
        let url = self.url(path)?;
        let response: PushResponse = self
            .authorize(self.client.post(url).json(&value))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.name)
    }

    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let url = self.url(path)?;
        let value: Value = self
            .authorize(self.client.get(url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(Some(value).filter(|value| !value.is_null()))
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let url = self.url(path)?;
        self.authorize(self.client.put(url).json(&value))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        let url = self.url(path)?;
        self.authorize(self.client.delete(url))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn child_added(&self, path: &str) -> Result<ChildStream, StoreError> {
        let url = self.url(path)?;
        let response = self
            .authorize(self.client.get(url))
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await?
            .error_for_status()?;

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();

        let state = StreamState {
            body,
            decoder: SseDecoder::default(),
            tracker: ChildTracker::default(),
            pending: VecDeque::new(),
            finished: false,
        };

        let stream = futures::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(item) = state.pending.pop_front() {
                    return Some((item, state));
                }
                if state.finished {
                    return None;
                }
                match state.body.next().await {
                    Some(Ok(chunk)) => {
                        for frame in state.decoder.feed(&chunk) {
                            match state.tracker.apply(&frame) {
                                Ok(events) => state.pending.extend(events.into_iter().map(Ok)),
                                Err(err) => {
                                    state.pending.push_back(Err(err));
                                    state.finished = true;
                                }
                            }
                        }
                    }
                    Some(Err(err)) => {
                        state.finished = true;
                        return Some((Err(StoreError::from(err)), state));
                    }
                    None => return None,
                }
            }
        });

        Ok(stream.boxed())
    }
}

struct StreamState {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    tracker: ChildTracker,
    pending: VecDeque<Result<ChildEvent, StoreError>>,
    finished: bool,
}

/// One server-sent event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

/// Incremental `text/event-stream` parser; chunks may split lines anywhere.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    current: SseFrame,
}

impl SseDecoder {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.current.event.is_empty() || !self.current.data.is_empty() {
                    frames.push(std::mem::take(&mut self.current));
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.current.event = value.to_string(),
                "data" => {
                    if !self.current.data.is_empty() {
                        self.current.data.push('\n');
                    }
                    self.current.data.push_str(value);
                }
                _ => {}
            }
        }

        frames
    }
}

#[derive(Debug, Deserialize)]
struct Change {
    path: String,
    #[serde(default)]
    data: Value,
}

/// Turns `put`/`patch` frames into child-added events, each key once.
///
/// Keys are remembered for the life of the stream, so memory grows with the
/// number of children the collection has had while it is open.
#[derive(Debug, Default)]
pub struct ChildTracker {
    seen: HashSet<String>,
}

impl ChildTracker {
    pub fn apply(&mut self, frame: &SseFrame) -> Result<Vec<ChildEvent>, StoreError> {
        match frame.event.as_str() {
            "put" | "patch" => {
                let change: Change = serde_json::from_str(&frame.data)?;
                Ok(self.added_children(&change))
            }
            "keep-alive" => Ok(Vec::new()),
            "cancel" => Err(StoreError::Cancelled(frame.data.clone())),
            "auth_revoked" => Err(StoreError::Cancelled("auth revoked".to_string())),
            other => {
                log::debug!("Ignoring stream event `{other}`");
                Ok(Vec::new())
            }
        }
    }

    fn added_children(&mut self, change: &Change) -> Vec<ChildEvent> {
        let segments: Vec<&str> = change
            .path
            .trim_matches('/')
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();

        match segments.as_slice() {
            [] => match &change.data {
                Value::Object(children) => children
                    .iter()
                    .filter(|(_, value)| !value.is_null())
                    .filter_map(|(key, value)| self.first_sighting(key, value))
                    .collect(),
                _ => Vec::new(),
            },
            [key] if !change.data.is_null() => {
                self.first_sighting(key, &change.data).into_iter().collect()
            }
            // Deeper paths edit an existing child.
            _ => Vec::new(),
        }
    }

    fn first_sighting(&mut self, key: &str, value: &Value) -> Option<ChildEvent> {
        self.seen.insert(key.to_string()).then(|| ChildEvent {
            key: key.to_string(),
            value: value.clone(),
        })
    }
}

use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("relay returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("no producer secret configured")]
    MissingSecret,
    #[error("invalid event frame: {0}")]
    Frame(String),
}

/// Acknowledgement returned by a publish.
#[derive(Debug, Serialize, Deserialize)]
pub struct PublishAck {
    pub id: String,
    /// Subscribers the event was handed to at publish time.
    pub receivers: usize,
}

/// The JSON carried in each frame's `data:` line.
#[derive(Debug, Serialize, Deserialize)]
pub struct EventData {
    pub topic: String,
    pub payload: serde_json::Value,
    pub created_at: i64,
}

/// One parsed SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEvent {
    /// Event id; feed the last seen value back as `Last-Event-ID` to
    /// resume after a disconnect.
    pub id: Option<String>,
    /// The SSE `event:` field; the relay puts the category here.
    pub category: Option<String>,
    pub data: String,
}

impl RelayEvent {
    /// Parse the data line as JSON.
    pub fn parse_data<T: DeserializeOwned>(&self) -> Result<T, SdkError> {
        serde_json::from_str(&self.data).map_err(|e| SdkError::Frame(e.to_string()))
    }
}

pub struct RelayClient {
    client: reqwest::Client,
    base_url: String,
    secret: Option<String>,
}

impl RelayClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            secret: None,
        }
    }

    /// Attach the producer secret, enabling `publish`.
    pub fn with_secret(mut self, secret: &str) -> Self {
        self.secret = Some(secret.to_string());
        self
    }

    /// Publish an event.
    pub async fn publish(
        &self,
        topic: &str,
        category: &str,
        payload: serde_json::Value,
    ) -> Result<PublishAck, SdkError> {
        let secret = self.secret.as_deref().ok_or(SdkError::MissingSecret)?;
        let response = self
            .client
            .post(format!("{}/api/events", self.base_url))
            .bearer_auth(secret)
            .json(&serde_json::json!({
                "topic": topic,
                "category": category,
                "payload": payload,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SdkError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    /// Open an event stream with a subscriber token.
    ///
    /// `topics` narrows the token's grant; `None` subscribes to the full
    /// grant. `last_event_id` resumes after the given event.
    pub async fn subscribe(
        &self,
        token: &str,
        topics: Option<&[&str]>,
        last_event_id: Option<&str>,
    ) -> Result<EventStream, SdkError> {
        let mut request = self
            .client
            .get(format!("{}/events", self.base_url))
            .query(&[("token", token)]);
        if let Some(topics) = topics {
            request = request.query(&[("topics", topics.join(","))]);
        }
        if let Some(id) = last_event_id {
            request = request.header("Last-Event-ID", id);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SdkError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(EventStream {
            bytes: Box::pin(response.bytes_stream()),
            buffer: Vec::new(),
        })
    }

    /// Fetch the relay's health document.
    pub async fn health(&self) -> Result<serde_json::Value, SdkError> {
        let response = self
            .client
            .get(format!("{}/healthz", self.base_url))
            .send()
            .await?;
        Ok(response.json().await?)
    }
}

/// A live SSE connection, yielding one parsed frame at a time.
pub struct EventStream {
    bytes: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    buffer: Vec<u8>,
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("buffer", &self.buffer)
            .finish_non_exhaustive()
    }
}

impl EventStream {
    /// Next event frame. `Ok(None)` means the relay closed the stream.
    /// Keep-alive comments are consumed silently.
    pub async fn next_event(&mut self) -> Result<Option<RelayEvent>, SdkError> {
        loop {
            if let Some(end) = find_frame_end(&self.buffer) {
                let frame: Vec<u8> = self.buffer.drain(..end).collect();
                if let Some(event) = parse_frame(&frame)? {
                    return Ok(Some(event));
                }
                continue;
            }
            match self.bytes.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(SdkError::Transport(e)),
                None => return Ok(None),
            }
        }
    }
}

/// Index just past the first blank line separating frames.
fn find_frame_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n").map(|p| p + 2)
}

/// Parse one frame block. `None` for comment-only frames (keep-alives).
fn parse_frame(frame: &[u8]) -> Result<Option<RelayEvent>, SdkError> {
    let text = std::str::from_utf8(frame)
        .map_err(|_| SdkError::Frame("frame is not valid UTF-8".to_string()))?;

    let mut id = None;
    let mut category = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "id" => id = Some(value.to_string()),
            "event" => category = Some(value.to_string()),
            "data" => data_lines.push(value),
            // `retry` and unknown fields are ignored, matching
            // EventSource behavior.
            _ => {}
        }
    }

    if id.is_none() && category.is_none() && data_lines.is_empty() {
        return Ok(None);
    }
    Ok(Some(RelayEvent {
        id,
        category,
        data: data_lines.join("\n"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_frame() {
        let frame = b"id: abc-123\nevent: waitlist_update\ndata: {\"topic\":\"waitlist\",\"payload\":{\"open\":true},\"created_at\":1}\n\n";
        let event = parse_frame(&frame[..frame.len() - 1]).unwrap().unwrap();
        assert_eq!(event.id.as_deref(), Some("abc-123"));
        assert_eq!(event.category.as_deref(), Some("waitlist_update"));

        let data: EventData = event.parse_data().unwrap();
        assert_eq!(data.topic, "waitlist");
        assert_eq!(data.payload["open"], true);
    }

    #[test]
    fn keep_alive_frames_are_silent() {
        assert!(parse_frame(b": keep-alive\n").unwrap().is_none());
    }

    #[test]
    fn multi_line_data_joins_with_newline() {
        let event = parse_frame(b"data: first\ndata: second\n")
            .unwrap()
            .unwrap();
        assert_eq!(event.data, "first\nsecond");
    }

    #[test]
    fn crlf_lines_are_handled() {
        let event = parse_frame(b"id: 1\r\ndata: x\r\n").unwrap().unwrap();
        assert_eq!(event.id.as_deref(), Some("1"));
        assert_eq!(event.data, "x");
    }

    #[test]
    fn frame_end_detection() {
        assert_eq!(find_frame_end(b"data: x\n\nrest"), Some(9));
        assert_eq!(find_frame_end(b"data: x\n"), None);
    }
}

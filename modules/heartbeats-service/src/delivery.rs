//! Delivery capability: hands one built envelope to the sink.
//!
//! The loop only sees the [`Delivery`] trait so tests can swap in a recorder.

use async_trait::async_trait;
use heartbeats_types::EventRecord;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::fmt;

#[async_trait]
pub trait Delivery: Send + Sync {
    /// Send one event. Returns once the sink has answered or the attempt failed.
    async fn send(&self, event: &EventRecord) -> Result<(), DeliveryError>;
}

/// Failed delivery attempt
#[derive(Debug, Clone)]
pub struct DeliveryError {
    pub message: String,
    /// HTTP status code if the sink answered
    pub status_code: Option<u16>,
}

impl DeliveryError {
    pub fn new(message: impl Into<String>) -> Self {
        DeliveryError {
            message: message.into(),
            status_code: None,
        }
    }

    pub fn with_status(message: impl Into<String>, status_code: u16) -> Self {
        DeliveryError {
            message: message.into(),
            status_code: Some(status_code),
        }
    }
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.status_code {
            write!(f, "[HTTP {}] {}", code, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for DeliveryError {}

/// Client construction failure; fatal at startup.
#[derive(Debug, Clone)]
pub struct ClientError(pub String);

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to create client: {}", self.0)
    }
}

impl std::error::Error for ClientError {}

// =====================================================
// HTTP (CloudEvents binary mode)
// =====================================================

/// Posts events to the sink as CloudEvents binary-mode HTTP requests.
///
/// An empty sink still builds a client; every send then fails until the
/// process is restarted with a destination.
pub struct HttpDelivery {
    target: Option<url::Url>,
    client: reqwest::Client,
}

impl HttpDelivery {
    pub fn new(sink: &str) -> Result<Self, ClientError> {
        let target = if sink.is_empty() {
            None
        } else {
            let target = url::Url::parse(sink)
                .map_err(|e| ClientError(format!("invalid sink '{}': {}", sink, e)))?;
            if target.scheme() != "http" && target.scheme() != "https" {
                return Err(ClientError(format!(
                    "unsupported sink scheme '{}'",
                    target.scheme()
                )));
            }
            Some(target)
        };

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ClientError(e.to_string()))?;

        Ok(Self { target, client })
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_ref().map(|t| t.as_str())
    }
}

#[async_trait]
impl Delivery for HttpDelivery {
    async fn send(&self, event: &EventRecord) -> Result<(), DeliveryError> {
        let target = self
            .target
            .clone()
            .ok_or_else(|| DeliveryError::new("no sink configured"))?;

        let id = uuid::Uuid::new_v4().to_string();
        let time = chrono::Utc::now().to_rfc3339();
        let headers = binary_headers(event, &id, &time)?;

        let resp = self
            .client
            .post(target)
            .headers(headers)
            .json(event.data())
            .send()
            .await
            .map_err(|e| DeliveryError::new(format!("request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DeliveryError::with_status(
                format!("sink rejected event: {}", body),
                status.as_u16(),
            ));
        }

        Ok(())
    }
}

/// Context attributes as `ce-*` headers; the body carries only the data.
fn binary_headers(event: &EventRecord, id: &str, time: &str) -> Result<HeaderMap, DeliveryError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    insert(&mut headers, "ce-specversion", event.spec_version())?;
    insert(&mut headers, "ce-type", event.event_type())?;
    insert(&mut headers, "ce-source", event.source().as_str())?;
    insert(&mut headers, "ce-id", id)?;
    insert(&mut headers, "ce-time", time)?;

    for (key, value) in event.extensions() {
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        insert(&mut headers, &format!("ce-{}", key), &value)?;
    }

    Ok(headers)
}

fn insert(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), DeliveryError> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| DeliveryError::new(format!("bad header name {}: {}", name, e)))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| DeliveryError::new(format!("bad header value for {}: {}", name, e)))?;
    headers.insert(name, value);
    Ok(())
}

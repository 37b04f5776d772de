//! Shared types for the heartbeats emitter: the event envelope and its builder.
//!
//! Everything here is pure. The service crate owns timing and delivery.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// CloudEvents spec version stamped on every record.
pub const SPEC_VERSION: &str = "0.2";

/// Event type used when none is configured.
pub const DEFAULT_EVENT_TYPE: &str = "dev.knative.eventing.samples.heartbeat";

/// Prefix of the source derived from pod identity.
pub const DEFAULT_SOURCE_PREFIX: &str = "https://knative.dev/eventing-contrib/cmd/heartbeats/";

// Relative URI references are resolved against this only to check their syntax.
const PLACEHOLDER_BASE: &str = "https://placeholder.invalid/";

// =====================================================
// Event Source
// =====================================================

/// A syntactically valid URI reference identifying the emitting process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EventSource(String);

impl EventSource {
    /// Validate `raw` as a URI reference. Absolute and relative forms are accepted.
    ///
    /// The source travels verbatim in a `ce-source` header, so it must be
    /// printable ASCII; non-ASCII characters have to arrive percent-encoded.
    pub fn parse(raw: &str) -> Result<Self, SourceError> {
        if raw.trim().is_empty() {
            return Err(SourceError::new(raw, "source is empty"));
        }
        if let Some(c) = raw.chars().find(|c| !c.is_ascii_graphic()) {
            return Err(SourceError::new(
                raw,
                format!("character {:?} is not printable ASCII", c),
            ));
        }

        match Url::parse(raw) {
            Ok(_) => Ok(EventSource(raw.to_string())),
            Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(PLACEHOLDER_BASE)
                .and_then(|base| base.join(raw))
                .map(|_| EventSource(raw.to_string()))
                .map_err(|e| SourceError::new(raw, e.to_string())),
            Err(e) => Err(SourceError::new(raw, e.to_string())),
        }
    }

    /// Default source built from the pod's namespace and name.
    pub fn derived(namespace: &str, name: &str) -> Result<Self, SourceError> {
        Self::parse(&format!("{}#{}/{}", DEFAULT_SOURCE_PREFIX, namespace, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rejected source identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    pub value: String,
    pub reason: String,
}

impl SourceError {
    fn new(value: &str, reason: impl Into<String>) -> Self {
        SourceError {
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid event source '{}': {}", self.value, self.reason)
    }
}

impl std::error::Error for SourceError {}

// =====================================================
// Event Record
// =====================================================

/// Body payload of every heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heartbeat {
    pub sequence: u64,
    pub label: String,
}

/// A fully built, versioned event envelope. Fields are read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    specversion: &'static str,
    #[serde(rename = "type")]
    event_type: String,
    source: EventSource,
    #[serde(flatten)]
    extensions: BTreeMap<String, Value>,
    data: Heartbeat,
}

impl EventRecord {
    pub fn spec_version(&self) -> &str {
        self.specversion
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn source(&self) -> &EventSource {
        &self.source
    }

    pub fn extensions(&self) -> &BTreeMap<String, Value> {
        &self.extensions
    }

    pub fn data(&self) -> &Heartbeat {
        &self.data
    }

    pub fn sequence(&self) -> u64 {
        self.data.sequence
    }
}

/// The constant extension attributes attached to every record.
pub fn fixed_extensions() -> BTreeMap<String, Value> {
    let mut extensions = BTreeMap::new();
    extensions.insert("the".to_string(), Value::from(42));
    extensions.insert("heart".to_string(), Value::from("yes"));
    extensions.insert("beats".to_string(), Value::from(true));
    extensions
}

/// Build the envelope for one tick.
pub fn build(sequence: u64, label: &str, source: &EventSource, event_type: &str) -> EventRecord {
    EventRecord {
        specversion: SPEC_VERSION,
        event_type: event_type.to_string(),
        source: source.clone(),
        extensions: fixed_extensions(),
        data: Heartbeat {
            sequence,
            label: unquote_label(label),
        },
    }
}

// =====================================================
// Label unquoting
// =====================================================

/// Strip literal double quotes from a label, interpreting escapes inside.
///
/// Labels that are not wrapped in `"` come back unchanged, and so do labels
/// whose quoted body is malformed.
pub fn unquote_label(raw: &str) -> String {
    if raw.len() < 2 || !raw.starts_with('"') || !raw.ends_with('"') {
        return raw.to_string();
    }

    unescape(&raw[1..raw.len() - 1]).unwrap_or_else(|| raw.to_string())
}

fn unescape(body: &str) -> Option<String> {
    let mut out: Vec<u8> = Vec::with_capacity(body.len());
    let mut chars = body.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' | '\n' => return None,
            '\\' => match chars.next()? {
                'a' => out.push(0x07),
                'b' => out.push(0x08),
                'f' => out.push(0x0C),
                'n' => out.push(b'\n'),
                'r' => out.push(b'\r'),
                't' => out.push(b'\t'),
                'v' => out.push(0x0B),
                '\\' => out.push(b'\\'),
                '"' => out.push(b'"'),
                'x' => out.push(read_digits(&mut chars, 2, 16)? as u8),
                d @ '0'..='7' => {
                    let rest = read_digits(&mut chars, 2, 8)?;
                    let value = d.to_digit(8)? * 64 + rest;
                    out.push(u8::try_from(value).ok()?);
                }
                'u' => push_char(&mut out, read_digits(&mut chars, 4, 16)?)?,
                'U' => push_char(&mut out, read_digits(&mut chars, 8, 16)?)?,
                _ => return None,
            },
            other => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
        }
    }

    // \x and octal escapes emit raw bytes, which must still form valid UTF-8.
    String::from_utf8(out).ok()
}

fn read_digits(chars: &mut std::str::Chars<'_>, count: usize, radix: u32) -> Option<u32> {
    let mut value: u32 = 0;
    for _ in 0..count {
        value = value * radix + chars.next()?.to_digit(radix)?;
    }
    Some(value)
}

fn push_char(out: &mut Vec<u8>, code: u32) -> Option<()> {
    let c = char::from_u32(code)?;
    let mut buf = [0u8; 4];
    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    Some(())
}

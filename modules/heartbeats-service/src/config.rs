//! Startup configuration: command-line flags merged with environment variables.
//!
//! Resolved once into an immutable [`Config`]; nothing reads flags or env after that.

use clap::Parser;
use heartbeats_types::{DEFAULT_EVENT_TYPE, EventSource, SourceError};
use std::fmt;
use std::time::Duration;

/// Cadence used when `--period` is missing or unparseable.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(5);

#[derive(Parser, Debug, Clone)]
#[command(name = "heartbeats", about = "Periodically sends heartbeat CloudEvents to a sink")]
pub struct Args {
    /// The event-source (CloudEvents). Derived from pod identity when empty
    #[arg(long = "eventSource", default_value = "")]
    pub event_source: String,

    /// The event-type (CloudEvents)
    #[arg(long = "eventType", default_value = DEFAULT_EVENT_TYPE)]
    pub event_type: String,

    /// The host url to heartbeat to (overridden by SINK)
    #[arg(long, default_value = "")]
    pub sink: String,

    /// A special label attached to every heartbeat
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    pub label: String,

    /// The number of seconds between heartbeats
    #[arg(long, default_value = "5")]
    pub period: String,
}

/// Environment inputs, captured once so resolution stays testable.
#[derive(Debug, Clone, Default)]
pub struct EnvVars {
    pub sink: Option<String>,
    pub pod_name: Option<String>,
    pub pod_namespace: Option<String>,
}

impl EnvVars {
    pub fn from_env() -> Self {
        Self {
            sink: std::env::var("SINK").ok(),
            pod_name: std::env::var("POD_NAME").ok(),
            pod_namespace: std::env::var("POD_NAMESPACE").ok(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub sink: String,
    pub source: EventSource,
    pub event_type: String,
    pub label: String,
    pub period: Duration,
}

impl Config {
    pub fn resolve(args: &Args, env: &EnvVars) -> Result<Self, ConfigError> {
        let pod_name = required(&env.pod_name, "POD_NAME")?;
        let pod_namespace = required(&env.pod_namespace, "POD_NAMESPACE")?;

        let sink = match env.sink.as_deref() {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => args.sink.clone(),
        };

        let source = if args.event_source.is_empty() {
            let derived = EventSource::derived(pod_namespace, pod_name)?;
            log::info!("[HEARTBEATS] Heartbeats Source: {}", derived);
            derived
        } else {
            EventSource::parse(&args.event_source)?
        };

        if args.event_type.is_empty() {
            return Err(ConfigError::EmptyEventType);
        }

        Ok(Self {
            sink,
            source,
            event_type: args.event_type.clone(),
            label: args.label.clone(),
            period: parse_period(&args.period),
        })
    }
}

fn required<'a>(value: &'a Option<String>, key: &'static str) -> Result<&'a str, ConfigError> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::MissingEnv(key)),
    }
}

/// Whole seconds; zero, negative or garbage falls back to [`DEFAULT_PERIOD`].
pub fn parse_period(raw: &str) -> Duration {
    raw.parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_PERIOD)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required environment variable is unset or empty
    MissingEnv(&'static str),
    InvalidSource(SourceError),
    EmptyEventType,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingEnv(key) => {
                write!(f, "Failed to process env var: required key {} missing value", key)
            }
            ConfigError::InvalidSource(e) => write!(f, "{}", e),
            ConfigError::EmptyEventType => write!(f, "event type must not be empty"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<SourceError> for ConfigError {
    fn from(e: SourceError) -> Self {
        ConfigError::InvalidSource(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["heartbeats"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    fn env() -> EnvVars {
        EnvVars {
            sink: None,
            pod_name: Some("pod-7".to_string()),
            pod_namespace: Some("ns-a".to_string()),
        }
    }

    #[test]
    fn test_period_parsing() {
        assert_eq!(parse_period("5"), Duration::from_secs(5));
        assert_eq!(parse_period("1"), Duration::from_secs(1));
        assert_eq!(parse_period("abc"), DEFAULT_PERIOD);
        assert_eq!(parse_period(""), DEFAULT_PERIOD);
        assert_eq!(parse_period("0"), DEFAULT_PERIOD);
        assert_eq!(parse_period("-3"), DEFAULT_PERIOD);
    }

    #[test]
    fn test_defaults() {
        let config = Config::resolve(&args(&[]), &env()).unwrap();
        assert_eq!(config.event_type, DEFAULT_EVENT_TYPE);
        assert_eq!(config.period, DEFAULT_PERIOD);
        assert_eq!(config.label, "");
        assert_eq!(config.sink, "");
        assert!(config.source.as_str().contains("ns-a/pod-7"));
    }

    #[test]
    fn test_flags_applied() {
        let config = Config::resolve(
            &args(&[
                "--eventSource",
                "https://example/1",
                "--eventType",
                "demo.type",
                "--label",
                "\"test\"",
                "--period",
                "1",
                "--sink",
                "http://localhost:8080",
            ]),
            &env(),
        )
        .unwrap();
        assert_eq!(config.source.as_str(), "https://example/1");
        assert_eq!(config.event_type, "demo.type");
        assert_eq!(config.label, "\"test\"");
        assert_eq!(config.period, Duration::from_secs(1));
        assert_eq!(config.sink, "http://localhost:8080");
    }

    #[test]
    fn test_env_sink_overrides_flag() {
        let mut env = env();
        env.sink = Some("http://from-env".to_string());
        let config = Config::resolve(&args(&["--sink", "http://from-flag"]), &env).unwrap();
        assert_eq!(config.sink, "http://from-env");

        env.sink = Some(String::new());
        let config = Config::resolve(&args(&["--sink", "http://from-flag"]), &env).unwrap();
        assert_eq!(config.sink, "http://from-flag");
    }

    #[test]
    fn test_missing_identity_is_fatal() {
        let mut env = env();
        env.pod_namespace = None;
        assert_eq!(
            Config::resolve(&args(&[]), &env).unwrap_err(),
            ConfigError::MissingEnv("POD_NAMESPACE")
        );

        let mut env = self::env();
        env.pod_name = Some(String::new());
        assert_eq!(
            Config::resolve(&args(&[]), &env).unwrap_err(),
            ConfigError::MissingEnv("POD_NAME")
        );
    }

    #[test]
    fn test_invalid_source_rejected() {
        let err = Config::resolve(&args(&["--eventSource", "http://[::1"]), &env()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSource(_)));
    }

    #[test]
    fn test_empty_event_type_rejected() {
        let err = Config::resolve(&args(&["--eventType", ""]), &env()).unwrap_err();
        assert_eq!(err, ConfigError::EmptyEventType);
    }
}

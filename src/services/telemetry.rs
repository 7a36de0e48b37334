//! Anonymous usage events, sent fire-and-forget.
//!
//! Events are posted as a Measurement Protocol JSON envelope. Nothing waits on
//! the response, and transport failures are swallowed by [`BestEffort`].

use crate::models::Platform;
use crate::services::best_effort::BestEffort;
use indexmap::IndexMap;
use serde::Serialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;

/// Collection endpoint, including the measurement id.
pub const ANALYTICS_ENDPOINT: &str =
    "https://www.google-analytics.com/mp/collect?measurement_id=G-4TC9Z8LPDR";

/// Upper bound on a single analytics request.
pub const ANALYTICS_TIMEOUT: Duration = Duration::from_secs(5);

/// A named event with flat string parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryEvent {
    pub name: String,
    pub params: IndexMap<String, String>,
}

impl TelemetryEvent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            params: IndexMap::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Emitted once per process start.
    pub fn app_started(platform: Platform, version: &str) -> Self {
        Self::new("app_started")
            .param("platform", platform.as_str())
            .param("version", version)
    }

    /// Emitted when a compile job gets past validation and compiler lookup.
    pub fn compile_clicked(platform: Platform, file_extension: &str) -> Self {
        Self::new("compile_clicked")
            .param("platform", platform.as_str())
            .param("file_extension", file_extension)
    }
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    client_id: &'a str,
    events: Vec<EnvelopeEvent<'a>>,
}

#[derive(Debug, Serialize)]
struct EnvelopeEvent<'a> {
    name: &'a str,
    params: IndexMap<&'a str, String>,
}

/// Sends [`TelemetryEvent`]s for one process.
#[derive(Debug, Clone)]
pub struct TelemetryClient {
    endpoint: String,
    client_id: String,
    session_id: String,
    enabled: bool,
}

impl TelemetryClient {
    pub fn new(enabled: bool) -> Self {
        let started = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        Self {
            endpoint: ANALYTICS_ENDPOINT.to_string(),
            client_id: format!("{}.{}", std::process::id(), started),
            session_id: started.to_string(),
            enabled,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// JSON body for `event`. Common params come first; event params may
    /// override them.
    pub fn envelope(&self, event: &TelemetryEvent) -> serde_json::Value {
        let mut params: IndexMap<&str, String> = IndexMap::new();
        params.insert("engagement_time_msec", "100".to_string());
        params.insert("session_id", self.session_id.clone());
        for (key, value) in &event.params {
            params.insert(key.as_str(), value.clone());
        }

        let envelope = Envelope {
            client_id: &self.client_id,
            events: vec![EnvelopeEvent {
                name: &event.name,
                params,
            }],
        };
        // Plain strings and maps always serialize
        serde_json::to_value(envelope).unwrap_or_default()
    }

    /// Post `event` in the background. `None` when telemetry is disabled.
    pub fn send(&self, event: TelemetryEvent) -> Option<JoinHandle<()>> {
        if !self.enabled {
            tracing::debug!("Telemetry disabled, not sending {}", event.name);
            return None;
        }

        let body = self.envelope(&event);
        let endpoint = self.endpoint.clone();
        tracing::debug!("Sending telemetry event {}", event.name);

        Some(BestEffort::spawn_blocking("Sending telemetry", move || {
            post_json(&endpoint, &body)
        }))
    }
}

fn post_json(endpoint: &str, body: &serde_json::Value) -> Result<(), ureq::Error> {
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(ANALYTICS_TIMEOUT))
        .build()
        .into();
    agent.post(endpoint).send_json(body)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let client = TelemetryClient::new(true);
        let event = TelemetryEvent::compile_clicked(Platform::Linux, ".pas");

        let json = client.envelope(&event);
        let sent = &json["events"][0];

        assert!(json["client_id"].is_string());
        assert_eq!(sent["name"], "compile_clicked");
        assert_eq!(sent["params"]["engagement_time_msec"], "100");
        assert_eq!(sent["params"]["platform"], "linux");
        assert_eq!(sent["params"]["file_extension"], ".pas");
        assert!(sent["params"]["session_id"].is_string());
    }

    #[test]
    fn test_app_started_params() {
        let client = TelemetryClient::new(true);
        let event = TelemetryEvent::app_started(Platform::Windows, "1.0.0");

        let json = client.envelope(&event);
        let keys: Vec<&String> = json["events"][0]["params"]
            .as_object()
            .unwrap()
            .keys()
            .collect();

        for expected in ["engagement_time_msec", "session_id", "platform", "version"] {
            assert!(keys.iter().any(|k| k.as_str() == expected));
        }
    }

    #[tokio::test]
    async fn test_disabled_client_sends_nothing() {
        let client = TelemetryClient::new(false);
        assert!(client.send(TelemetryEvent::new("anything")).is_none());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_swallowed() {
        let client = TelemetryClient::new(true).with_endpoint("http://127.0.0.1:9/collect");
        let handle = client.send(TelemetryEvent::new("test")).unwrap();
        assert!(handle.await.is_ok());
    }
}

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

/// Event type every payload of a measurement run is submitted under
pub const TELEMETRY_TYPE: &str = "dnssec-interference-report";

/// Flat string-to-string telemetry payload
pub type Payload = BTreeMap<String, String>;

/// Submission options forwarded to the sink
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SubmitOptions {
	pub add_client_id: bool,
	pub add_environment: bool,
}

impl Default for SubmitOptions {
	fn default() -> Self {
		SubmitOptions {
			add_client_id: true,
			add_environment: true,
		}
	}
}

#[derive(Debug, Error)]
pub enum TelemetryError {
	#[error("HTTP submission failed: {0}")]
	Http(#[from] reqwest::Error),

	#[error("submission rejected: {0}")]
	Rejected(String),
}

#[async_trait]
pub trait TelemetrySink: Send + Sync {
	async fn submit(
		&self,
		event_type: &str,
		payload: &Payload,
		options: &SubmitOptions,
	) -> Result<(), TelemetryError>;
}

/// Writes each event as a structured log line.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl TelemetrySink for LogSink {
	async fn submit(
		&self,
		event_type: &str,
		payload: &Payload,
		_options: &SubmitOptions,
	) -> Result<(), TelemetryError> {
		let body = serde_json::to_string(payload)
			.map_err(|e| TelemetryError::Rejected(e.to_string()))?;
		info!(target: "telemetry", event_type, payload = %body, "telemetry event");
		Ok(())
	}
}

#[derive(Serialize)]
struct Envelope<'a> {
	#[serde(rename = "type")]
	event_type: &'a str,
	options: &'a SubmitOptions,
	payload: &'a Payload,
}

/// POSTs each event as JSON to a collection endpoint.
pub struct HttpSink {
	client: reqwest::Client,
	url: String,
}

impl HttpSink {
	pub fn new(url: &str) -> Result<Self, TelemetryError> {
		let client = reqwest::Client::builder()
			.timeout(Duration::from_secs(10))
			.build()?;
		Ok(HttpSink { client, url: url.to_string() })
	}
}

#[async_trait]
impl TelemetrySink for HttpSink {
	async fn submit(
		&self,
		event_type: &str,
		payload: &Payload,
		options: &SubmitOptions,
	) -> Result<(), TelemetryError> {
		let envelope = Envelope { event_type, options, payload };
		self.client
			.post(&self.url)
			.json(&envelope)
			.send()
			.await?
			.error_for_status()?;
		Ok(())
	}
}

/// Best-effort submission stamped with the run's measurement id.
pub struct Telemetry {
	sink: Box<dyn TelemetrySink>,
	measurement_id: String,
	options: SubmitOptions,
}

impl Telemetry {
	pub fn new(sink: Box<dyn TelemetrySink>, measurement_id: &str) -> Self {
		Telemetry {
			sink,
			measurement_id: measurement_id.to_string(),
			options: SubmitOptions::default(),
		}
	}

	/// Submit `payload`, logging and discarding any failure.
	pub async fn send(&self, mut payload: Payload) {
		payload.insert("measurement_id".to_string(), self.measurement_id.clone());
		if let Err(e) = self.sink.submit(TELEMETRY_TYPE, &payload, &self.options).await {
			let event = payload.get("event").map(String::as_str).unwrap_or("");
			warn!(event_name = event, error = %e, "failed to submit telemetry");
		}
	}

	/// Submit a payload consisting of just an `event` field.
	pub async fn event(&self, name: &str) {
		self.send(event_payload(name)).await;
	}
}

pub fn event_payload(name: &str) -> Payload {
	let mut payload = Payload::new();
	payload.insert("event".to_string(), name.to_string());
	payload
}

use std::net::Ipv4Addr;
use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::domains::query_name;
use crate::error::ProbeError;
use crate::registry::ResponseRegistry;
use crate::report::Report;
use crate::resolver::{resolve_ipv4, NameserverSource};
use crate::tcp::TcpDriver;
use crate::telemetry::{event_payload, Telemetry, TelemetrySink};
use crate::transport::{DatagramSocket, ProbeConfig, RecordKind, StreamConnector};
use crate::udp::{response_listener, UdpDriver};

/// One measurement run over every probed record type.
pub struct Probe {
	config: ProbeConfig,
	source: Box<dyn NameserverSource>,
	udp: Arc<dyn DatagramSocket>,
	connector: Arc<dyn StreamConnector>,
	telemetry: Telemetry,
	measurement_id: String,
}

impl Probe {
	pub fn new(
		config: ProbeConfig,
		source: Box<dyn NameserverSource>,
		udp: Arc<dyn DatagramSocket>,
		connector: Arc<dyn StreamConnector>,
		sink: Box<dyn TelemetrySink>,
	) -> Self {
		let measurement_id = Uuid::new_v4().to_string();
		let telemetry = Telemetry::new(sink, &measurement_id);
		Probe {
			config,
			source,
			udp,
			connector,
			telemetry,
			measurement_id,
		}
	}

	pub fn measurement_id(&self) -> &str {
		&self.measurement_id
	}

	/// Run the measurement and return the report that was submitted.
	///
	/// On failure a single diagnostic event naming the cause is submitted
	/// and partial results are discarded.
	pub async fn run(&self) -> Result<Report, ProbeError> {
		info!(measurement_id = %self.measurement_id, "starting measurement");
		self.telemetry.event("startMeasurement").await;

		match self.measure().await {
			Ok(report) => {
				self.telemetry.send(report.to_payload()).await;
				self.telemetry.event("endMeasurement").await;
				info!(measurement_id = %self.measurement_id, "measurement complete");
				Ok(report)
			}
			Err(e) => {
				error!(error = %e, "measurement aborted");
				let mut payload = event_payload(e.event_name());
				if let Some(record) = e.record() {
					payload.insert("rrtype".to_string(), record.name().to_string());
				}
				self.telemetry.send(payload).await;
				Err(e)
			}
		}
	}

	async fn measure(&self) -> Result<Report, ProbeError> {
		let nameservers = resolve_ipv4(self.source.as_ref())?;
		let registry = Arc::new(ResponseRegistry::new());

		self.udp.open().await.map_err(ProbeError::SocketSetup)?;
		self.udp.add_listener(response_listener(registry.clone()));

		let result = self.query_all(&registry, &nameservers).await;

		self.udp.remove_listener();
		self.udp.close();

		result?;
		Ok(Report::from_registry(&registry, &self.measurement_id))
	}

	/// Probe each record type over UDP, then TCP, strictly in sequence.
	async fn query_all(
		&self,
		registry: &ResponseRegistry,
		nameservers: &[Ipv4Addr],
	) -> Result<(), ProbeError> {
		let udp = UdpDriver::new(self.udp.as_ref(), registry, &self.config);
		let tcp = TcpDriver::new(self.connector.as_ref(), registry, &self.config);

		for record in RecordKind::ALL {
			let domain = query_name(record);
			let udp_outcome = udp.query(domain, record, nameservers).await?;
			let tcp_outcome = tcp.query(domain, record, nameservers).await?;
			info!(
				%record,
				udp_attempts = udp_outcome.attempts(),
				udp_answered = udp_outcome.answered(),
				tcp_attempts = tcp_outcome.attempts(),
				tcp_answered = tcp_outcome.answered(),
				"record type probed"
			);
		}
		Ok(())
	}
}

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::demux::{DemuxError, SocketSession};

/// Resource-record types probed by a measurement run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
	A,
	Rrsig,
	Dnskey,
	Smimea,
	Https,
	NewOne,
	NewTwo,
}

impl RecordKind {
	/// Probe order. Each record type is fully probed over UDP, then TCP,
	/// before the next one starts.
	pub const ALL: [RecordKind; 7] = [
		RecordKind::A,
		RecordKind::Rrsig,
		RecordKind::Dnskey,
		RecordKind::Smimea,
		RecordKind::Https,
		RecordKind::NewOne,
		RecordKind::NewTwo,
	];

	/// Name used in report keys and telemetry payloads.
	pub fn name(self) -> &'static str {
		match self {
			RecordKind::A => "A",
			RecordKind::Rrsig => "RRSIG",
			RecordKind::Dnskey => "DNSKEY",
			RecordKind::Smimea => "SMIMEA",
			RecordKind::Https => "HTTPS",
			RecordKind::NewOne => "NEWONE",
			RecordKind::NewTwo => "NEWTWO",
		}
	}

	/// Numeric TYPE value written into the question section.
	///
	/// The two experimental slots live in the private-use range (RFC 6895).
	pub fn code(self) -> u16 {
		match self {
			RecordKind::A => 1,
			RecordKind::Rrsig => 46,
			RecordKind::Dnskey => 48,
			RecordKind::Smimea => 53,
			RecordKind::Https => 65,
			RecordKind::NewOne => 65281,
			RecordKind::NewTwo => 65282,
		}
	}
}

impl fmt::Display for RecordKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// Transport a query travels over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
	Udp,
	Tcp,
}

impl Protocol {
	pub fn as_str(self) -> &'static str {
		match self {
			Protocol::Udp => "udp",
			Protocol::Tcp => "tcp",
		}
	}
}

impl fmt::Display for Protocol {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A single DNS question ready to be encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
	pub domain: String,
	pub record: RecordKind,
	pub txid: u16,
	pub protocol: Protocol,
}

impl Query {
	/// Build a query with a transaction id drawn uniformly from [0, 65535].
	pub fn new(domain: &str, record: RecordKind, protocol: Protocol) -> Self {
		Query {
			domain: domain.to_string(),
			record,
			txid: rand::random(),
			protocol,
		}
	}
}

/// Retry and timeout policy for a measurement run
#[derive(Debug, Clone)]
pub struct ProbeConfig {
	pub port: u16,
	/// How long to wait after each UDP send before checking for a response
	pub udp_timeout: Duration,
	pub udp_attempts: u32,
	/// Upper bound on one TCP connection attempt; `None` leaves it to the
	/// connection's own open/error/close events
	pub tcp_timeout: Option<Duration>,
}

impl Default for ProbeConfig {
	fn default() -> Self {
		ProbeConfig {
			port: 53,
			udp_timeout: Duration::from_millis(5000),
			udp_attempts: 2,
			tcp_timeout: Some(Duration::from_millis(10_000)),
		}
	}
}

/// Failures of a single send or connection attempt.
///
/// These are recovered by the drivers as unsuccessful attempts.
#[derive(Debug, Error)]
pub enum TransportError {
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("socket is not open")]
	NotConnected,

	#[error("connection did not open, first event was {0}")]
	NotOpened(String),

	#[error("attempt timed out after {limit:?} with {} bytes received", .partial.len())]
	Timeout { limit: Duration, partial: Bytes },

	#[error(transparent)]
	Demux(#[from] DemuxError),
}

/// Callback invoked for every datagram received on the probe socket.
pub type ResponseListener = Arc<dyn Fn(&[u8], RecordKind) + Send + Sync>;

/// The shared UDP socket used for every datagram query in a run.
#[async_trait]
pub trait DatagramSocket: Send + Sync {
	async fn open(&self) -> Result<(), TransportError>;

	/// Send `bytes` to `addr` and associate subsequently received datagrams
	/// with `record`. Returns the number of bytes written.
	async fn send_query(
		&self,
		addr: SocketAddr,
		bytes: &[u8],
		record: RecordKind,
	) -> Result<usize, TransportError>;

	fn add_listener(&self, listener: ResponseListener);

	fn remove_listener(&self);

	fn close(&self);
}

/// Handle to one event-driven stream connection.
pub trait StreamSocket: Send {
	/// Queue `bytes` for transmission, returning how many were accepted.
	fn send(&mut self, bytes: &[u8]) -> Result<usize, TransportError>;

	fn close(&mut self);
}

/// Opens stream connections whose events are delivered into a
/// [`SocketSession`].
pub trait StreamConnector: Send + Sync {
	fn connect(
		&self,
		addr: SocketAddr,
		session: Arc<SocketSession>,
	) -> Result<Box<dyn StreamSocket>, TransportError>;
}

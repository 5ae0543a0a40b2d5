use thiserror::Error;

use crate::demux::DemuxError;
use crate::transport::{RecordKind, TransportError};

/// Failures that abort a measurement run
#[derive(Debug, Error)]
pub enum ProbeError {
	#[error("reading nameservers is not supported on this platform ({0})")]
	#[cfg_attr(any(unix, windows), allow(dead_code))]
	PlatformUnsupported(String),

	#[error("nameserver source unavailable: {0}")]
	SourceUnavailable(String),

	#[error("no nameservers found")]
	NoNameservers,

	#[error("no IPv4 nameservers found")]
	NoIpv4Nameservers,

	#[error("failed to open UDP socket: {0}")]
	SocketSetup(#[source] TransportError),

	#[error("failed to encode {record} query for {domain}: {reason}")]
	Encode {
		record: RecordKind,
		domain: String,
		reason: String,
	},

	#[error("{record} query aborted: {source}")]
	Demux {
		record: RecordKind,
		#[source]
		source: DemuxError,
	},
}

impl ProbeError {
	/// Name of the diagnostic telemetry event reporting this failure.
	pub fn event_name(&self) -> &'static str {
		match self {
			ProbeError::PlatformUnsupported(_) | ProbeError::SourceUnavailable(_) => {
				"readNameserversError"
			}
			ProbeError::NoNameservers => "noNameserversError",
			ProbeError::NoIpv4Nameservers => "noIPv4NameserversError",
			ProbeError::SocketSetup(_) => "openUDPSocketsError",
			ProbeError::Encode { .. } | ProbeError::Demux { .. } => "sendQueryError",
		}
	}

	/// Record type being probed when the run aborted, if any.
	pub fn record(&self) -> Option<RecordKind> {
		match self {
			ProbeError::Encode { record, .. } | ProbeError::Demux { record, .. } => Some(*record),
			_ => None,
		}
	}
}

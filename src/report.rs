use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::registry::ResponseRegistry;
use crate::telemetry::{event_payload, Payload};
use crate::transport::{Protocol, RecordKind};

/// Aggregate result of one measurement run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
	pub measurement_id: String,
	/// `<RECORD>_<proto>_data` (base64) and `<RECORD>_<proto>_transmission`
	pub fields: BTreeMap<String, String>,
}

pub fn data_key(record: RecordKind, protocol: Protocol) -> String {
	format!("{}_{}_data", record.name(), protocol.as_str())
}

pub fn transmission_key(record: RecordKind, protocol: Protocol) -> String {
	format!("{}_{}_transmission", record.name(), protocol.as_str())
}

impl Report {
	/// Snapshot every slot of `registry`.
	pub fn from_registry(registry: &ResponseRegistry, measurement_id: &str) -> Self {
		let mut fields = BTreeMap::new();
		for record in RecordKind::ALL {
			for protocol in [Protocol::Udp, Protocol::Tcp] {
				let slot = registry.slot(record, protocol);
				fields.insert(data_key(record, protocol), STANDARD.encode(&slot.data));
				fields.insert(transmission_key(record, protocol), slot.transmissions.to_string());
			}
		}
		Report {
			measurement_id: measurement_id.to_string(),
			fields,
		}
	}

	pub fn get(&self, key: &str) -> Option<&str> {
		self.fields.get(key).map(String::as_str)
	}

	/// Telemetry payload carrying every report field.
	pub fn to_payload(&self) -> Payload {
		let mut payload = event_payload("dnsResponses");
		payload.extend(self.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
		payload
	}
}

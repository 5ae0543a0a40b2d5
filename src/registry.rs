use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::transport::{Protocol, RecordKind};

/// Latest response and attempt count for one (record type, protocol) pair
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseSlot {
	/// Raw response bytes; empty until a response arrives
	pub data: Bytes,
	/// Attempts made, whether or not they were answered
	pub transmissions: u32,
}

/// Per-run store of responses, shared by the transport drivers and the
/// UDP receive listener.
///
/// Slot writes replace the whole value, so the listener and a driver can
/// touch the same slot without tearing.
#[derive(Debug)]
pub struct ResponseRegistry {
	slots: RwLock<HashMap<(RecordKind, Protocol), ResponseSlot>>,
}

impl ResponseRegistry {
	/// Create a registry with an empty slot for every probed record type.
	pub fn new() -> Self {
		let mut slots = HashMap::new();
		for record in RecordKind::ALL {
			for protocol in [Protocol::Udp, Protocol::Tcp] {
				slots.insert((record, protocol), ResponseSlot::default());
			}
		}
		ResponseRegistry { slots: RwLock::new(slots) }
	}

	/// Count one attempt and return the new total.
	pub fn record_attempt(&self, record: RecordKind, protocol: Protocol) -> u32 {
		let mut slots = self.slots.write();
		let slot = slots.entry((record, protocol)).or_default();
		slot.transmissions += 1;
		slot.transmissions
	}

	/// Overwrite the stored response.
	pub fn store(&self, record: RecordKind, protocol: Protocol, data: Bytes) {
		let mut slots = self.slots.write();
		slots.entry((record, protocol)).or_default().data = data;
	}

	pub fn has_response(&self, record: RecordKind, protocol: Protocol) -> bool {
		self.slots.read()
			.get(&(record, protocol))
			.is_some_and(|slot| !slot.data.is_empty())
	}

	pub fn slot(&self, record: RecordKind, protocol: Protocol) -> ResponseSlot {
		self.slots.read()
			.get(&(record, protocol))
			.cloned()
			.unwrap_or_default()
	}
}

impl Default for ResponseRegistry {
	fn default() -> Self {
		Self::new()
	}
}

use anyhow::{anyhow, Result};
use hickory_proto::op::{Edns, Message, MessageType, Query as Question, ResponseCode};
use hickory_proto::rr::{Name, RecordType};

use crate::transport::{Protocol, Query};

/// UDP payload size advertised in the OPT pseudo-record of datagram queries
pub const UDP_PAYLOAD_SIZE: u16 = 4096;

/// Summary of a decoded response, used for diagnostics
#[derive(Debug)]
pub struct DnsResponse {
	pub txid: u16,
	pub rcode: ResponseCode,
	pub answer_count: usize,
	/// Record types present in the answer section, in order
	pub answer_types: Vec<RecordType>,
}

/// Encode a query for the wire.
///
/// Datagram queries carry an OPT record advertising a 4096-byte payload.
/// Stream queries carry no OPT record and are prefixed with the 2-byte
/// big-endian message length.
pub fn encode_query(query: &Query) -> Result<Vec<u8>> {
	let name = Name::from_ascii(&query.domain)
		.map_err(|e| anyhow!("invalid domain name '{}': {}", query.domain, e))?;

	let mut message = Message::new();
	message.set_id(query.txid);
	message.set_recursion_desired(true);
	message.add_query(Question::query(name, RecordType::from(query.record.code())));

	if query.protocol == Protocol::Udp {
		let edns = message.extensions_mut().get_or_insert_with(Edns::new);
		edns.set_max_payload(UDP_PAYLOAD_SIZE);
	}

	let bytes = message.to_vec()
		.map_err(|e| anyhow!("failed to serialize DNS query: {}", e))?;

	match query.protocol {
		Protocol::Udp => Ok(bytes),
		Protocol::Tcp => {
			let len = u16::try_from(bytes.len())
				.map_err(|_| anyhow!("DNS query too large for TCP framing: {} bytes", bytes.len()))?;
			let mut framed = Vec::with_capacity(bytes.len() + 2);
			framed.extend_from_slice(&len.to_be_bytes());
			framed.extend_from_slice(&bytes);
			Ok(framed)
		}
	}
}

/// Decode a response received over `protocol`.
///
/// Stream responses must start with the length prefix; trailing bytes past
/// the announced length are ignored.
pub fn decode_response(bytes: &[u8], protocol: Protocol) -> Result<DnsResponse> {
	let body = match protocol {
		Protocol::Udp => bytes,
		Protocol::Tcp => {
			if bytes.len() < 2 {
				return Err(anyhow!("TCP response shorter than its length prefix"));
			}
			let len = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
			let available = bytes.len() - 2;
			if available < len {
				return Err(anyhow!(
					"truncated TCP response: prefix announces {} bytes, got {}",
					len, available
				));
			}
			&bytes[2..2 + len]
		}
	};

	let message = Message::from_vec(body)
		.map_err(|e| anyhow!("failed to parse DNS response: {}", e))?;

	if message.message_type() != MessageType::Response {
		return Err(anyhow!("received a query instead of a response"));
	}

	Ok(DnsResponse {
		txid: message.id(),
		rcode: message.response_code(),
		answer_count: message.answer_count() as usize,
		answer_types: message.answers().iter().map(|r| r.record_type()).collect(),
	})
}

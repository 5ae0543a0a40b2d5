//! Scripted stand-ins for the socket and telemetry collaborators.

use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::demux::{Pending, SocketEvent, SocketSession};
use crate::telemetry::{Payload, SubmitOptions, TelemetryError, TelemetrySink};
use crate::transport::{
	DatagramSocket, RecordKind, ResponseListener, StreamConnector, StreamSocket, TransportError,
};

#[derive(Debug, Clone)]
pub struct SentDatagram {
	pub addr: SocketAddr,
	pub record: RecordKind,
	pub bytes: Vec<u8>,
}

#[derive(Default)]
struct DatagramState {
	fail_open: bool,
	fail_sends: bool,
	responders: HashMap<Ipv4Addr, Vec<u8>>,
	listener: Option<ResponseListener>,
	sends: Vec<SentDatagram>,
	closed: bool,
}

/// Datagram socket that answers synchronously from a per-nameserver table.
#[derive(Default)]
pub struct FakeDatagramSocket {
	state: Mutex<DatagramState>,
}

impl FakeDatagramSocket {
	pub fn new() -> Self {
		Self::default()
	}

	/// Answer every query sent to `ip` with `response`.
	pub fn respond_from(&self, ip: Ipv4Addr, response: Vec<u8>) {
		self.state.lock().responders.insert(ip, response);
	}

	pub fn fail_open(&self) {
		self.state.lock().fail_open = true;
	}

	pub fn fail_sends(&self) {
		self.state.lock().fail_sends = true;
	}

	pub fn sends(&self) -> Vec<SentDatagram> {
		self.state.lock().sends.clone()
	}

	pub fn has_listener(&self) -> bool {
		self.state.lock().listener.is_some()
	}

	pub fn is_closed(&self) -> bool {
		self.state.lock().closed
	}
}

#[async_trait]
impl DatagramSocket for FakeDatagramSocket {
	async fn open(&self) -> Result<(), TransportError> {
		let mut state = self.state.lock();
		if state.fail_open {
			return Err(TransportError::Io(io::Error::new(
				io::ErrorKind::AddrInUse,
				"simulated bind failure",
			)));
		}
		state.closed = false;
		Ok(())
	}

	async fn send_query(
		&self,
		addr: SocketAddr,
		bytes: &[u8],
		record: RecordKind,
	) -> Result<usize, TransportError> {
		let (reply, listener) = {
			let mut state = self.state.lock();
			state.sends.push(SentDatagram { addr, record, bytes: bytes.to_vec() });
			if state.fail_sends {
				return Err(TransportError::Io(io::Error::new(
					io::ErrorKind::Other,
					"simulated send failure",
				)));
			}
			let reply = match addr.ip() {
				std::net::IpAddr::V4(ip) => state.responders.get(&ip).cloned(),
				_ => None,
			};
			(reply, state.listener.clone())
		};

		if let (Some(reply), Some(listener)) = (reply, listener) {
			listener(&reply, record);
		}
		Ok(bytes.len())
	}

	fn add_listener(&self, listener: ResponseListener) {
		self.state.lock().listener = Some(listener);
	}

	fn remove_listener(&self) {
		self.state.lock().listener = None;
	}

	fn close(&self) {
		self.state.lock().closed = true;
	}
}

/// Behaviour of a scripted stream connection
#[derive(Debug, Clone)]
pub enum Script {
	/// Error then close instead of open
	RefuseOpen,
	/// Open, then answer the first send with these bytes and close
	Respond(Vec<u8>),
	/// Open, then close without data after the first send
	CloseSilently,
	/// Open, then never deliver anything else
	Hang,
	/// Open, then answer the first send with these bytes and stay open
	RespondThenHang(Vec<u8>),
	/// Open, then start a second wait on the session during the first send
	StealWait,
}

#[derive(Default)]
struct ConnectorState {
	scripts: HashMap<Ipv4Addr, Script>,
	connects: Vec<SocketAddr>,
}

/// Stream connector delivering scripted events synchronously.
///
/// Nameservers without a script refuse to open.
#[derive(Default)]
pub struct ScriptedConnector {
	state: Mutex<ConnectorState>,
	closes: Arc<Mutex<usize>>,
}

impl ScriptedConnector {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn script(&self, ip: Ipv4Addr, script: Script) {
		self.state.lock().scripts.insert(ip, script);
	}

	pub fn connects(&self) -> Vec<SocketAddr> {
		self.state.lock().connects.clone()
	}

	pub fn closes(&self) -> usize {
		*self.closes.lock()
	}
}

impl StreamConnector for ScriptedConnector {
	fn connect(
		&self,
		addr: SocketAddr,
		session: Arc<SocketSession>,
	) -> Result<Box<dyn StreamSocket>, TransportError> {
		let script = {
			let mut state = self.state.lock();
			state.connects.push(addr);
			match addr.ip() {
				std::net::IpAddr::V4(ip) => state.scripts.get(&ip).cloned(),
				_ => None,
			}
			.unwrap_or(Script::RefuseOpen)
		};

		match script {
			Script::RefuseOpen => {
				session.handle_event(SocketEvent::Error("connection refused".to_string()));
				session.handle_event(SocketEvent::Close);
			}
			_ => session.handle_event(SocketEvent::Open),
		}

		Ok(Box::new(ScriptedSocket {
			session,
			script,
			closes: self.closes.clone(),
			held: None,
		}))
	}
}

struct ScriptedSocket {
	session: Arc<SocketSession>,
	script: Script,
	closes: Arc<Mutex<usize>>,
	held: Option<Pending<SocketEvent>>,
}

impl StreamSocket for ScriptedSocket {
	fn send(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
		match &self.script {
			Script::RefuseOpen => return Err(TransportError::NotConnected),
			Script::Respond(reply) => {
				self.session.handle_event(SocketEvent::Data(Bytes::copy_from_slice(reply)));
				self.session.handle_event(SocketEvent::Close);
			}
			Script::CloseSilently => self.session.handle_event(SocketEvent::Close),
			Script::Hang => {}
			Script::RespondThenHang(reply) => {
				self.session.handle_event(SocketEvent::Data(Bytes::copy_from_slice(reply)));
			}
			Script::StealWait => {
				self.held = self.session.wait_for_next_event().ok();
			}
		}
		Ok(bytes.len())
	}

	fn close(&mut self) {
		*self.closes.lock() += 1;
	}
}

/// Telemetry sink that keeps every submitted event.
#[derive(Default, Clone)]
pub struct RecordingSink {
	events: Arc<Mutex<Vec<(String, Payload)>>>,
	fail: bool,
}

impl RecordingSink {
	pub fn new() -> Self {
		Self::default()
	}

	/// A sink that records, then reports every submission as failed.
	pub fn failing() -> Self {
		RecordingSink { fail: true, ..Self::default() }
	}

	pub fn events(&self) -> Vec<(String, Payload)> {
		self.events.lock().clone()
	}

	/// The `event` field of every submitted payload, in order.
	pub fn event_names(&self) -> Vec<String> {
		self.events.lock()
			.iter()
			.map(|(_, p)| p.get("event").cloned().unwrap_or_default())
			.collect()
	}
}

#[async_trait]
impl TelemetrySink for RecordingSink {
	async fn submit(
		&self,
		event_type: &str,
		payload: &Payload,
		_options: &SubmitOptions,
	) -> Result<(), TelemetryError> {
		self.events.lock().push((event_type.to_string(), payload.clone()));
		if self.fail {
			return Err(TelemetryError::Rejected("simulated outage".to_string()));
		}
		Ok(())
	}
}

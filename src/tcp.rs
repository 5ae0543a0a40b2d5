use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::demux::{DemuxError, SocketEvent, SocketSession};
use crate::dns::{decode_response, encode_query};
use crate::error::ProbeError;
use crate::registry::ResponseRegistry;
use crate::transport::{
	ProbeConfig, Protocol, Query, RecordKind, StreamConnector, StreamSocket, TransportError,
};
use crate::udp::Outcome;

/// One connection per nameserver, no retransmission of its own.
///
/// Every attempt counts as a transmission, answered or not.
pub struct TcpDriver<'a> {
	connector: &'a dyn StreamConnector,
	registry: &'a ResponseRegistry,
	config: &'a ProbeConfig,
}

impl<'a> TcpDriver<'a> {
	pub fn new(
		connector: &'a dyn StreamConnector,
		registry: &'a ResponseRegistry,
		config: &'a ProbeConfig,
	) -> Self {
		TcpDriver { connector, registry, config }
	}

	pub async fn query(
		&self,
		domain: &str,
		record: RecordKind,
		nameservers: &[Ipv4Addr],
	) -> Result<Outcome, ProbeError> {
		let mut attempts = 0;

		for &nameserver in nameservers {
			let addr = SocketAddr::new(nameserver.into(), self.config.port);
			let query = Query::new(domain, record, Protocol::Tcp);
			let frame = encode_query(&query).map_err(|e| ProbeError::Encode {
				record,
				domain: domain.to_string(),
				reason: e.to_string(),
			})?;

			attempts = self.registry.record_attempt(record, Protocol::Tcp);
			let response = match self.attempt(addr, &frame).await {
				Ok(bytes) => bytes,
				Err(TransportError::Demux(DemuxError::ConcurrentWait)) => {
					return Err(ProbeError::Demux { record, source: DemuxError::ConcurrentWait });
				}
				Err(TransportError::Demux(DemuxError::ClosedEarly { partial })) => {
					if !partial.is_empty() {
						warn!(%record, %addr, len = partial.len(), "TCP connection closed mid-response");
					}
					partial
				}
				Err(TransportError::Timeout { limit, partial }) if !partial.is_empty() => {
					warn!(%record, %addr, ?limit, len = partial.len(), "TCP response incomplete at timeout");
					partial
				}
				Err(e) => {
					warn!(%record, %addr, error = %e, "TCP attempt failed");
					continue;
				}
			};

			if response.is_empty() {
				debug!(%record, %addr, "empty TCP response, trying next nameserver");
				continue;
			}

			match decode_response(&response, Protocol::Tcp) {
				Ok(decoded) => debug!(
					%record,
					txid = decoded.txid,
					rcode = %decoded.rcode,
					answers = decoded.answer_count,
					types = ?decoded.answer_types,
					"TCP response decoded"
				),
				Err(e) => debug!(%record, len = response.len(), error = %e, "undecodable TCP response"),
			}
			self.registry.store(record, Protocol::Tcp, response);
			return Ok(Outcome::Answered { attempts });
		}

		info!(%record, attempts, "TCP attempts exhausted without a response");
		Ok(Outcome::Exhausted { attempts })
	}

	/// Open, send, wait for at least as many bytes as were sent, close.
	///
	/// The socket is closed on every path out of this function.
	async fn attempt(&self, addr: SocketAddr, frame: &[u8]) -> Result<Bytes, TransportError> {
		let session = Arc::new(SocketSession::new(addr.to_string()));
		let mut socket = self.connector.connect(addr, session.clone())?;

		let exchange = async {
			let first = session.wait_for_next_event()?.await?;
			if first != SocketEvent::Open {
				return Err(TransportError::NotOpened(first.to_string()));
			}

			let written = socket.send(frame)?;
			debug!(%addr, written, "TCP query sent");

			// The reply length is unknown until decoded; the query size is a
			// lower bound for any real answer to it
			Ok::<Bytes, TransportError>(session.wait_for_at_least_bytes(frame.len())?.await?)
		};

		let result = match self.config.tcp_timeout {
			Some(limit) => match tokio::time::timeout(limit, exchange).await {
				Ok(result) => result,
				Err(_) => Err(TransportError::Timeout {
					limit,
					partial: session.take_buffered(),
				}),
			},
			None => exchange.await,
		};
		socket.close();
		result
	}
}

/// Stream connector backed by tokio.
///
/// Each connection runs in its own task, translating connect, read and
/// write results into [`SocketEvent`]s.
#[derive(Debug, Default)]
pub struct TokioStreamConnector;

impl StreamConnector for TokioStreamConnector {
	fn connect(
		&self,
		addr: SocketAddr,
		session: Arc<SocketSession>,
	) -> Result<Box<dyn StreamSocket>, TransportError> {
		let (tx, rx) = mpsc::unbounded_channel();
		let task = tokio::spawn(drive_connection(addr, session, rx));
		Ok(Box::new(TokioStreamSocket { outbound: Some(tx), task }))
	}
}

async fn drive_connection(
	addr: SocketAddr,
	session: Arc<SocketSession>,
	mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
) {
	let stream = match TcpStream::connect(addr).await {
		Ok(stream) => stream,
		Err(e) => {
			session.handle_event(SocketEvent::Error(e.to_string()));
			session.handle_event(SocketEvent::Close);
			return;
		}
	};
	if let Err(e) = stream.set_nodelay(true) {
		debug!(%addr, error = %e, "failed to set TCP_NODELAY");
	}
	session.handle_event(SocketEvent::Open);

	let (mut reader, mut writer) = stream.into_split();
	let mut buf = BytesMut::with_capacity(4096);
	loop {
		tokio::select! {
			command = rx.recv() => match command {
				Some(bytes) => {
					if let Err(e) = writer.write_all(&bytes).await {
						session.handle_event(SocketEvent::Error(e.to_string()));
						session.handle_event(SocketEvent::Close);
						return;
					}
					session.handle_event(SocketEvent::Drain);
				}
				None => {
					let _ = writer.shutdown().await;
					session.handle_event(SocketEvent::Close);
					return;
				}
			},
			read = reader.read_buf(&mut buf) => match read {
				Ok(0) => {
					session.handle_event(SocketEvent::Close);
					return;
				}
				Ok(_) => session.handle_event(SocketEvent::Data(buf.split().freeze())),
				Err(e) => {
					session.handle_event(SocketEvent::Error(e.to_string()));
					session.handle_event(SocketEvent::Close);
					return;
				}
			},
		}
	}
}

struct TokioStreamSocket {
	outbound: Option<mpsc::UnboundedSender<Vec<u8>>>,
	task: JoinHandle<()>,
}

impl StreamSocket for TokioStreamSocket {
	fn send(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
		let outbound = self.outbound.as_ref().ok_or(TransportError::NotConnected)?;
		outbound
			.send(bytes.to_vec())
			.map_err(|_| TransportError::NotConnected)?;
		Ok(bytes.len())
	}

	fn close(&mut self) {
		self.outbound.take();
		self.task.abort();
	}
}

impl Drop for TokioStreamSocket {
	fn drop(&mut self) {
		self.task.abort();
	}
}

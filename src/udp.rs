use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dns::{decode_response, encode_query};
use crate::error::ProbeError;
use crate::registry::ResponseRegistry;
use crate::transport::{
	DatagramSocket, ProbeConfig, Protocol, Query, RecordKind, ResponseListener, TransportError,
};

/// Result of driving one record type to completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
	Answered { attempts: u32 },
	Exhausted { attempts: u32 },
}

impl Outcome {
	pub fn attempts(self) -> u32 {
		match self {
			Outcome::Answered { attempts } | Outcome::Exhausted { attempts } => attempts,
		}
	}

	pub fn answered(self) -> bool {
		matches!(self, Outcome::Answered { .. })
	}
}

/// Resolv.conf-style UDP retransmission.
///
/// Each attempt sends a fresh query and then sleeps for the full retry
/// timeout before checking the registry. The response itself is written
/// by the listener installed with [`response_listener`].
pub struct UdpDriver<'a> {
	socket: &'a dyn DatagramSocket,
	registry: &'a ResponseRegistry,
	config: &'a ProbeConfig,
}

impl<'a> UdpDriver<'a> {
	pub fn new(
		socket: &'a dyn DatagramSocket,
		registry: &'a ResponseRegistry,
		config: &'a ProbeConfig,
	) -> Self {
		UdpDriver { socket, registry, config }
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

			for attempt in 1..=self.config.udp_attempts {
				let query = Query::new(domain, record, Protocol::Udp);
				let bytes = encode_query(&query).map_err(|e| ProbeError::Encode {
					record,
					domain: domain.to_string(),
					reason: e.to_string(),
				})?;

				attempts = self.registry.record_attempt(record, Protocol::Udp);
				match self.socket.send_query(addr, &bytes, record).await {
					Ok(0) => warn!(%record, %addr, attempt, "no bytes written for UDP query"),
					Ok(written) => debug!(%record, %addr, attempt, txid = query.txid, written, "UDP query sent"),
					Err(e) => warn!(%record, %addr, attempt, error = %e, "UDP send failed"),
				}

				tokio::time::sleep(self.config.udp_timeout).await;

				if self.registry.has_response(record, Protocol::Udp) {
					return Ok(Outcome::Answered { attempts });
				}
				debug!(%record, %addr, attempt, "no UDP response yet, retransmitting");
			}
		}

		info!(%record, attempts, "UDP attempts exhausted without a response");
		Ok(Outcome::Exhausted { attempts })
	}
}

/// Build the receive callback that files UDP responses by record type.
///
/// Neither the transaction id nor the source address is checked, so a late
/// answer to an earlier attempt overwrites the slot like any other.
pub fn response_listener(registry: Arc<ResponseRegistry>) -> ResponseListener {
	Arc::new(move |bytes: &[u8], record: RecordKind| {
		registry.store(record, Protocol::Udp, Bytes::copy_from_slice(bytes));

		match decode_response(bytes, Protocol::Udp) {
			Ok(response) => debug!(
				%record,
				txid = response.txid,
				rcode = %response.rcode,
				answers = response.answer_count,
				types = ?response.answer_types,
				"UDP response decoded"
			),
			Err(e) => debug!(%record, len = bytes.len(), error = %e, "undecodable UDP response"),
		}
	})
}

/// Receive errors that leave the socket usable.
///
/// Some platforms surface an ICMP port-unreachable from one nameserver as
/// a reset on the next receive.
fn is_transient(e: &io::Error) -> bool {
	matches!(
		e.kind(),
		io::ErrorKind::ConnectionReset
			| io::ErrorKind::ConnectionRefused
			| io::ErrorKind::Interrupted
			| io::ErrorKind::WouldBlock
	)
}

/// Shared listening socket backed by tokio.
///
/// Received datagrams are attributed to the record type of the most recent
/// query sent through [`DatagramSocket::send_query`].
#[derive(Default)]
pub struct UdpProbeSocket {
	socket: Mutex<Option<Arc<UdpSocket>>>,
	receiver: Mutex<Option<JoinHandle<()>>>,
	listener: Arc<Mutex<Option<ResponseListener>>>,
	current: Arc<Mutex<Option<RecordKind>>>,
}

impl UdpProbeSocket {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl DatagramSocket for UdpProbeSocket {
	async fn open(&self) -> Result<(), TransportError> {
		let socket = Arc::new(UdpSocket::bind("0.0.0.0:0").await?);
		debug!(local = ?socket.local_addr().ok(), "UDP probe socket bound");

		let recv_socket = socket.clone();
		let listener = self.listener.clone();
		let current = self.current.clone();
		let handle = tokio::spawn(async move {
			// Sized for the advertised EDNS payload
			let mut buf = vec![0u8; 4096];
			loop {
				match recv_socket.recv_from(&mut buf).await {
					Ok((len, src)) => {
						let record = *current.lock();
						let callback = listener.lock().clone();
						match (record, callback) {
							(Some(record), Some(callback)) => callback(&buf[..len], record),
							_ => debug!(%src, len, "dropping unsolicited datagram"),
						}
					}
					Err(e) if is_transient(&e) => {
						warn!(error = %e, "UDP receive error, still listening");
					}
					Err(e) => {
						warn!(error = %e, "UDP receive failed, no further responses will be recorded");
						break;
					}
				}
			}
		});

		*self.socket.lock() = Some(socket);
		if let Some(old) = self.receiver.lock().replace(handle) {
			old.abort();
		}
		Ok(())
	}

	async fn send_query(
		&self,
		addr: SocketAddr,
		bytes: &[u8],
		record: RecordKind,
	) -> Result<usize, TransportError> {
		let socket = self.socket.lock().clone().ok_or(TransportError::NotConnected)?;
		*self.current.lock() = Some(record);
		Ok(socket.send_to(bytes, addr).await?)
	}

	fn add_listener(&self, listener: ResponseListener) {
		*self.listener.lock() = Some(listener);
	}

	fn remove_listener(&self) {
		self.listener.lock().take();
	}

	fn close(&self) {
		if let Some(handle) = self.receiver.lock().take() {
			handle.abort();
		}
		self.socket.lock().take();
		self.current.lock().take();
	}
}

impl Drop for UdpProbeSocket {
	fn drop(&mut self) {
		if let Some(handle) = self.receiver.get_mut().take() {
			handle.abort();
		}
	}
}

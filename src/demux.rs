use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::trace;

/// Events produced by an event-driven stream connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
	Open,
	Data(Bytes),
	Drain,
	Error(String),
	Close,
}

impl SocketEvent {
	pub fn kind(&self) -> &'static str {
		match self {
			SocketEvent::Open => "open",
			SocketEvent::Data(_) => "data",
			SocketEvent::Drain => "drain",
			SocketEvent::Error(_) => "error",
			SocketEvent::Close => "close",
		}
	}
}

impl fmt::Display for SocketEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SocketEvent::Error(msg) => write!(f, "error ({})", msg),
			other => f.write_str(other.kind()),
		}
	}
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DemuxError {
	#[error("only one wait allowed at a time")]
	ConcurrentWait,

	#[error("connection closed after {} bytes, before the expected minimum", .partial.len())]
	ClosedEarly { partial: Bytes },

	#[error("transport error: {0}")]
	Transport(String),

	#[error("socket session dropped while waiting")]
	Abandoned,
}

enum Waiter {
	NextEvent(oneshot::Sender<Result<SocketEvent, DemuxError>>),
	AtLeast {
		min: usize,
		tx: oneshot::Sender<Result<Bytes, DemuxError>>,
	},
	DataThenClose(oneshot::Sender<Result<Bytes, DemuxError>>),
}

impl Waiter {
	fn is_abandoned(&self) -> bool {
		match self {
			Waiter::NextEvent(tx) => tx.is_closed(),
			Waiter::AtLeast { tx, .. } => tx.is_closed(),
			Waiter::DataThenClose(tx) => tx.is_closed(),
		}
	}
}

#[derive(Default)]
struct State {
	buffer: BytesMut,
	events: VecDeque<SocketEvent>,
	closed: bool,
	waiter: Option<Waiter>,
}

impl State {
	fn ensure_idle(&mut self) -> Result<(), DemuxError> {
		if self.waiter.as_ref().is_some_and(|w| !w.is_abandoned()) {
			return Err(DemuxError::ConcurrentWait);
		}
		self.waiter = None;
		Ok(())
	}
}

/// Future returned by the `wait_for_*` operations of [`SocketSession`].
///
/// The waiter is registered when the operation is issued, not when the
/// future is first polled.
pub struct Pending<T> {
	rx: oneshot::Receiver<Result<T, DemuxError>>,
}

impl<T> Pending<T> {
	fn ready(value: Result<T, DemuxError>) -> Self {
		let (tx, rx) = oneshot::channel();
		let _ = tx.send(value);
		Pending { rx }
	}
}

impl<T> Future for Pending<T> {
	type Output = Result<T, DemuxError>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match Pin::new(&mut self.rx).poll(cx) {
			Poll::Ready(Ok(result)) => Poll::Ready(result),
			Poll::Ready(Err(_)) => Poll::Ready(Err(DemuxError::Abandoned)),
			Poll::Pending => Poll::Pending,
		}
	}
}

/// Per-connection demultiplexer turning socket callbacks into sequential
/// awaitable stages.
///
/// Data events are concatenated into one receive buffer; every other event
/// is handed to a pending [`wait_for_next_event`](Self::wait_for_next_event)
/// or queued. At most one wait may be outstanding at a time.
pub struct SocketSession {
	label: String,
	state: Mutex<State>,
}

impl SocketSession {
	pub fn new(label: impl Into<String>) -> Self {
		SocketSession {
			label: label.into(),
			state: Mutex::new(State::default()),
		}
	}

	/// Number of received bytes not yet handed to a waiter.
	#[allow(dead_code)]
	pub fn buffered(&self) -> usize {
		self.state.lock().buffer.len()
	}

	/// Take whatever received bytes no waiter has claimed.
	pub fn take_buffered(&self) -> Bytes {
		self.state.lock().buffer.split().freeze()
	}

	/// Entry point for the connection's event source.
	pub fn handle_event(&self, event: SocketEvent) {
		trace!(session = %self.label, event = event.kind(), "socket event");
		let mut state = self.state.lock();

		match event {
			SocketEvent::Data(chunk) => {
				state.buffer.extend_from_slice(&chunk);
				let satisfied = matches!(
					&state.waiter,
					Some(Waiter::AtLeast { min, .. }) if state.buffer.len() >= *min
				);
				if satisfied {
					if let Some(Waiter::AtLeast { tx, .. }) = state.waiter.take() {
						let data = state.buffer.split().freeze();
						let _ = tx.send(Ok(data));
					}
				}
			}
			SocketEvent::Close => {
				state.closed = true;
				match state.waiter.take() {
					Some(Waiter::NextEvent(tx)) => {
						let _ = tx.send(Ok(SocketEvent::Close));
					}
					Some(Waiter::AtLeast { tx, .. }) => {
						let partial = state.buffer.split().freeze();
						let _ = tx.send(Err(DemuxError::ClosedEarly { partial }));
						state.events.push_back(SocketEvent::Close);
					}
					Some(Waiter::DataThenClose(tx)) => {
						let data = state.buffer.split().freeze();
						let _ = tx.send(Ok(data));
					}
					None => state.events.push_back(SocketEvent::Close),
				}
			}
			SocketEvent::Error(msg) => match state.waiter.take() {
				Some(Waiter::NextEvent(tx)) => {
					let _ = tx.send(Ok(SocketEvent::Error(msg)));
				}
				Some(Waiter::AtLeast { tx, .. }) | Some(Waiter::DataThenClose(tx)) => {
					let _ = tx.send(Err(DemuxError::Transport(msg.clone())));
					state.events.push_back(SocketEvent::Error(msg));
				}
				None => state.events.push_back(SocketEvent::Error(msg)),
			},
			other => match state.waiter.take() {
				Some(Waiter::NextEvent(tx)) => {
					let _ = tx.send(Ok(other));
				}
				waiter => {
					state.waiter = waiter;
					state.events.push_back(other);
				}
			},
		}
	}

	/// Wait for the next non-data event, in arrival order.
	pub fn wait_for_next_event(&self) -> Result<Pending<SocketEvent>, DemuxError> {
		let mut state = self.state.lock();
		state.ensure_idle()?;

		if let Some(event) = state.events.pop_front() {
			return Ok(Pending::ready(Ok(event)));
		}

		trace!(session = %self.label, "waiting for event");
		let (tx, rx) = oneshot::channel();
		state.waiter = Some(Waiter::NextEvent(tx));
		Ok(Pending { rx })
	}

	/// Wait until at least `min` bytes have accumulated, then take them all.
	pub fn wait_for_at_least_bytes(&self, min: usize) -> Result<Pending<Bytes>, DemuxError> {
		let mut state = self.state.lock();
		state.ensure_idle()?;

		if state.buffer.len() >= min {
			let data = state.buffer.split().freeze();
			return Ok(Pending::ready(Ok(data)));
		}
		if state.closed {
			let partial = state.buffer.split().freeze();
			return Ok(Pending::ready(Err(DemuxError::ClosedEarly { partial })));
		}

		trace!(session = %self.label, min, "waiting for bytes");
		let (tx, rx) = oneshot::channel();
		state.waiter = Some(Waiter::AtLeast { min, tx });
		Ok(Pending { rx })
	}

	/// Wait for the connection to close and take whatever data arrived,
	/// which may be nothing.
	#[allow(dead_code)]
	pub fn wait_for_any_data_then_close(&self) -> Result<Pending<Bytes>, DemuxError> {
		let mut state = self.state.lock();
		state.ensure_idle()?;

		if state.closed {
			state.events.retain(|e| *e != SocketEvent::Close);
			let data = state.buffer.split().freeze();
			return Ok(Pending::ready(Ok(data)));
		}

		let (tx, rx) = oneshot::channel();
		state.waiter = Some(Waiter::DataThenClose(tx));
		Ok(Pending { rx })
	}
}

impl fmt::Debug for SocketSession {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.state.lock();
		f.debug_struct("SocketSession")
			.field("label", &self.label)
			.field("buffered", &state.buffer.len())
			.field("queued_events", &state.events.len())
			.field("closed", &state.closed)
			.field("waiting", &state.waiter.is_some())
			.finish()
	}
}

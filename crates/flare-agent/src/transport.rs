// Copyright (c) 2025 Flare Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Outbound transport: the persistent collector connection.
//!
//! The transport is a single tokio task owning the WebSocket, driven
//! by a command channel from the agent and by socket/timer events. It
//! implements the connection state machine
//! (disconnected → connecting → authenticating → ready), a bounded
//! FIFO of not-yet-sent frames, and exponential-backoff reconnection.
//! No transport failure ever propagates to the caller; everything
//! degrades into the state machine and diagnostics.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Sleep;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use flare_core::wire::{self, ErrorNotice};
use flare_core::{Envelope, ExceptionPayload, ExceptionReport, Inbound, Outbound, RegisterPayload, RuntimeInfo};

use crate::config::{AgentConfig, AGENT_VERSION, RUNTIME, RUNTIME_VERSION};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Maximum number of frames held while the connection is down.
pub const MAX_QUEUE: usize = 1000;

/// Reconnect attempts before giving up until the next explicit
/// `connect`.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

const BASE_DELAY_MS: u64 = 1000;
const MAX_DELAY_MS: u64 = 30_000;

/// Backoff delay for the given attempt number.
pub(crate) fn reconnect_delay(attempts: u32) -> Duration {
	let delay = BASE_DELAY_MS.saturating_mul(1u64 << attempts.min(15));
	Duration::from_millis(delay.min(MAX_DELAY_MS))
}

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	Disconnected,
	Connecting,
	Authenticating,
	Ready,
}

/// Snapshot of the transport's internal state, for observability.
#[derive(Debug, Clone)]
pub struct TransportStatus {
	pub state: ConnectionState,
	pub queued: usize,
	pub reconnect_attempts: u32,
}

/// Commands from the agent to the transport task.
enum TransportCmd {
	Connect,
	Send(String),
	Disconnect,
	Shutdown,
	Status(oneshot::Sender<TransportStatus>),
}

/// Bounded FIFO of serialized frames awaiting a ready connection.
///
/// At capacity the newest message is rejected: earlier diagnostic data
/// is considered more valuable during an incident storm.
struct SendQueue {
	messages: VecDeque<String>,
	capacity: usize,
}

impl SendQueue {
	fn new(capacity: usize) -> Self {
		Self {
			messages: VecDeque::new(),
			capacity,
		}
	}

	/// Enqueues a message, returning false when it was rejected.
	fn push(&mut self, message: String) -> bool {
		if self.messages.len() >= self.capacity {
			return false;
		}
		self.messages.push_back(message);
		true
	}

	fn pop(&mut self) -> Option<String> {
		self.messages.pop_front()
	}

	fn len(&self) -> usize {
		self.messages.len()
	}
}

/// Handle to the transport task.
#[derive(Clone)]
pub struct Transport {
	config: Arc<AgentConfig>,
	commands: mpsc::UnboundedSender<TransportCmd>,
}

impl Transport {
	/// Spawns the transport task. Must be called within a tokio
	/// runtime.
	pub fn spawn(config: Arc<AgentConfig>) -> Self {
		let (commands, rx) = mpsc::unbounded_channel();
		let task = TransportTask::new(Arc::clone(&config), rx);
		tokio::spawn(task.run());
		Self { config, commands }
	}

	/// Opens the collector connection; no-op when already open.
	pub fn connect(&self) {
		let _ = self.commands.send(TransportCmd::Connect);
	}

	/// Transmits a serialized frame, or queues it while not ready.
	pub fn send(&self, message: String) {
		let _ = self.commands.send(TransportCmd::Send(message));
	}

	/// Serializes a report into its wire envelope and sends it.
	pub fn send_report(&self, report: ExceptionReport) {
		let payload = ExceptionPayload {
			report,
			agent_id: self.config.agent_id.clone(),
			environment: self.config.environment.clone(),
			runtime: RUNTIME.to_string(),
			runtime_info: RuntimeInfo {
				name: RUNTIME.to_string(),
				version: RUNTIME_VERSION.to_string(),
			},
		};
		match Envelope::new(Outbound::Exception(payload)).encode() {
			Ok(text) => self.send(text),
			Err(e) => error!(error = %e, "failed to encode exception report"),
		}
	}

	/// Closes the connection and cancels any pending reconnect.
	pub fn disconnect(&self) {
		let _ = self.commands.send(TransportCmd::Disconnect);
	}

	/// Stops the transport task entirely.
	pub fn shutdown(&self) {
		let _ = self.commands.send(TransportCmd::Shutdown);
	}

	/// Queries the task for a state snapshot. Returns `None` after
	/// shutdown.
	pub async fn status(&self) -> Option<TransportStatus> {
		let (tx, rx) = oneshot::channel();
		self.commands.send(TransportCmd::Status(tx)).ok()?;
		rx.await.ok()
	}
}

/// One event the task loop reacts to.
enum Event {
	Cmd(Option<TransportCmd>),
	Frame(Option<Result<Message, WsError>>),
	BackoffFired,
}

struct TransportTask {
	config: Arc<AgentConfig>,
	commands: mpsc::UnboundedReceiver<TransportCmd>,
	queue: SendQueue,
	state: ConnectionState,
	attempts: u32,
	socket: Option<WsStream>,
	backoff: Option<Pin<Box<Sleep>>>,
}

impl TransportTask {
	fn new(config: Arc<AgentConfig>, commands: mpsc::UnboundedReceiver<TransportCmd>) -> Self {
		Self {
			config,
			commands,
			queue: SendQueue::new(MAX_QUEUE),
			state: ConnectionState::Disconnected,
			attempts: 0,
			socket: None,
			backoff: None,
		}
	}

	async fn run(mut self) {
		loop {
			let event = {
				let Self {
					commands,
					socket,
					backoff,
					..
				} = &mut self;
				tokio::select! {
					cmd = commands.recv() => Event::Cmd(cmd),
					frame = next_frame(socket) => Event::Frame(frame),
					() = backoff_fired(backoff) => Event::BackoffFired,
				}
			};

			match event {
				Event::Cmd(Some(TransportCmd::Connect)) => self.cmd_connect().await,
				Event::Cmd(Some(TransportCmd::Send(message))) => self.cmd_send(message).await,
				Event::Cmd(Some(TransportCmd::Disconnect)) => self.cmd_disconnect().await,
				Event::Cmd(Some(TransportCmd::Status(reply))) => {
					let _ = reply.send(TransportStatus {
						state: self.state,
						queued: self.queue.len(),
						reconnect_attempts: self.attempts,
					});
				}
				Event::Cmd(Some(TransportCmd::Shutdown)) | Event::Cmd(None) => {
					self.cmd_disconnect().await;
					debug!("transport task stopped");
					break;
				}
				Event::Frame(frame) => self.handle_frame(frame).await,
				Event::BackoffFired => {
					self.backoff = None;
					self.try_open().await;
				}
			}
		}
	}

	/// Explicit connect: resets the attempt budget and opens the
	/// socket unless one is already open.
	async fn cmd_connect(&mut self) {
		if self.state != ConnectionState::Disconnected {
			return;
		}
		self.backoff = None;
		self.attempts = 0;
		self.try_open().await;
	}

	async fn cmd_send(&mut self, message: String) {
		if self.state == ConnectionState::Ready {
			self.transmit(message).await;
		} else if !self.queue.push(message) {
			warn!(capacity = MAX_QUEUE, "send queue full, dropping newest message");
		}
	}

	/// Graceful close: sends a normal-closure frame and cancels any
	/// pending reconnect so no timer fires after teardown. Idempotent.
	async fn cmd_disconnect(&mut self) {
		self.backoff = None;
		if let Some(mut ws) = self.socket.take() {
			let _ = ws
				.close(Some(CloseFrame {
					code: CloseCode::Normal,
					reason: "".into(),
				}))
				.await;
		}
		self.state = ConnectionState::Disconnected;
	}

	async fn try_open(&mut self) {
		self.state = ConnectionState::Connecting;
		debug!(endpoint = %self.config.endpoint, "connecting to collector");
		match connect_async(self.config.endpoint.as_str()).await {
			Ok((ws, _response)) => {
				self.socket = Some(ws);
				self.attempts = 0;
				self.register().await;
			}
			Err(e) => {
				debug!(error = %e, "connection attempt failed");
				self.state = ConnectionState::Disconnected;
				self.schedule_reconnect();
			}
		}
	}

	/// Sends the registration handshake over a freshly opened socket.
	async fn register(&mut self) {
		let payload = RegisterPayload {
			api_key: self.config.api_key.clone(),
			agent_id: self.config.agent_id.clone(),
			hostname: self.config.hostname.clone(),
			runtime: RUNTIME.to_string(),
			runtime_version: RUNTIME_VERSION.to_string(),
			agent_version: AGENT_VERSION.to_string(),
			environment: self.config.environment.clone(),
		};
		match Envelope::new(Outbound::Register(payload)).encode() {
			Ok(text) => {
				self.state = ConnectionState::Authenticating;
				if self.transmit(text).await {
					debug!("registration sent, awaiting acknowledgement");
				}
			}
			Err(e) => {
				error!(error = %e, "failed to encode registration");
				self.on_closed("registration encoding failed").await;
			}
		}
	}

	async fn handle_frame(&mut self, frame: Option<Result<Message, WsError>>) {
		match frame {
			Some(Ok(Message::Text(text))) => self.handle_text(&text).await,
			Some(Ok(Message::Ping(data))) => {
				if let Some(ws) = self.socket.as_mut() {
					let _ = ws.send(Message::Pong(data)).await;
				}
			}
			Some(Ok(Message::Close(_))) => self.on_closed("server closed connection").await,
			Some(Ok(_)) => {}
			Some(Err(e)) => {
				debug!(error = %e, "socket error");
				self.on_closed("socket error").await;
			}
			None => self.on_closed("socket stream ended").await,
		}
	}

	async fn handle_text(&mut self, text: &str) {
		match wire::decode_inbound(text) {
			Ok(envelope) => match envelope.message {
				Inbound::Registered(_) => {
					info!("registered with collector");
					self.state = ConnectionState::Ready;
					self.flush().await;
				}
				Inbound::Error(ErrorNotice { message }) => {
					warn!(message = %message, "collector reported an error");
				}
			},
			Err(e) => debug!(error = %e, "ignoring malformed inbound frame"),
		}
	}

	/// Drains the queue in FIFO order while the connection stays
	/// ready.
	async fn flush(&mut self) {
		while self.state == ConnectionState::Ready {
			let Some(message) = self.queue.pop() else {
				break;
			};
			if !self.transmit(message).await {
				break;
			}
		}
	}

	/// Sends one frame over the open socket. Returns false and moves
	/// the machine to disconnected on failure; the in-flight frame is
	/// lost, consistent with the lossy delivery policy.
	async fn transmit(&mut self, text: String) -> bool {
		let result = match self.socket.as_mut() {
			Some(ws) => ws.send(Message::Text(text)).await,
			None => {
				self.state = ConnectionState::Disconnected;
				return false;
			}
		};
		match result {
			Ok(()) => true,
			Err(e) => {
				debug!(error = %e, "socket send failed");
				self.on_closed("send failed").await;
				false
			}
		}
	}

	/// Socket loss: drop the connection, clear authenticated state,
	/// and schedule a reconnect within the attempt budget.
	async fn on_closed(&mut self, reason: &str) {
		debug!(reason, "connection lost");
		if let Some(mut ws) = self.socket.take() {
			let _ = ws.close(None).await;
		}
		self.state = ConnectionState::Disconnected;
		self.schedule_reconnect();
	}

	fn schedule_reconnect(&mut self) {
		if self.attempts >= MAX_RECONNECT_ATTEMPTS {
			warn!(
				attempts = self.attempts,
				"giving up on reconnection until the next explicit connect"
			);
			return;
		}
		let delay = reconnect_delay(self.attempts);
		self.attempts += 1;
		debug!(
			attempt = self.attempts,
			delay_ms = delay.as_millis() as u64,
			"scheduling reconnect"
		);
		self.backoff = Some(Box::pin(tokio::time::sleep(delay)));
	}
}

async fn next_frame(socket: &mut Option<WsStream>) -> Option<Result<Message, WsError>> {
	match socket.as_mut() {
		Some(ws) => ws.next().await,
		None => std::future::pending().await,
	}
}

async fn backoff_fired(timer: &mut Option<Pin<Box<Sleep>>>) {
	match timer.as_mut() {
		Some(sleep) => sleep.await,
		None => std::future::pending().await,
	}
}

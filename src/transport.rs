//! Seam between the routing core and the wire-level MQTT connection.
//!
//! The client actor only ever talks to a [`Transport`] and consumes
//! [`TransportEvent`]s; [`RumqttTransport`] is the implementation backed by
//! `rumqttc`.

pub mod rumqtt;

use arcstr::ArcStr;
use bytes::Bytes;
use rumqttc::QoS;
use thiserror::Error;
use tokio::sync::oneshot;

pub use rumqtt::{RumqttTransport, mqtt_options};

use crate::message::Message;

/// Errors reported by the wire-level connection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
	/// The request could not be handed to the connection
	#[error("Client request failed: {0}")]
	Client(String),
	/// The connection went away before acknowledging
	#[error("Acknowledgment lost")]
	AckLost,
	/// The connection has been shut down
	#[error("Transport closed")]
	Closed,
}

impl TransportError {
	/// Creates a new Client error
	pub fn client(err: impl ToString) -> Self {
		Self::Client(err.to_string())
	}
}

/// Outcome of a publish, resolved when the broker acknowledges it.
pub type AckResult = Result<(), TransportError>;
/// Receiving half of a publish acknowledgment.
pub type AckReceiver = oneshot::Receiver<AckResult>;

/// A PUBLISH handed to the transport
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
	pub topic: ArcStr,
	pub payload: Bytes,
	pub qos: QoS,
	pub retain: bool,
}

impl PublishRequest {
	pub fn new(
		topic: impl Into<ArcStr>,
		payload: impl Into<Bytes>,
		qos: QoS,
		retain: bool,
	) -> Self {
		Self {
			topic: topic.into(),
			payload: payload.into(),
			qos,
			retain,
		}
	}
}

/// Connection events consumed by the client actor
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
	/// Broker accepted the connection
	Connected {
		/// Whether the broker resumed an existing session
		session_present: bool,
	},
	/// Connection lost; the transport keeps reconnecting
	Disconnected,
	/// Non-fatal connection error
	Error(String),
	/// Incoming PUBLISH
	Message(Message),
}

/// Wire-level MQTT operations.
///
/// Every call only queues the request and never waits on the network;
/// publish completion is reported through the returned [`AckReceiver`].
pub trait Transport: Send + 'static {
	/// Queues a PUBLISH.
	fn publish(
		&mut self,
		request: PublishRequest,
	) -> Result<AckReceiver, TransportError>;

	/// Queues a SUBSCRIBE.
	fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), TransportError>;

	/// Queues an UNSUBSCRIBE.
	fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError>;

	/// Queues a DISCONNECT; the event stream ends once it has been sent.
	fn disconnect(&mut self) -> Result<(), TransportError>;
}

//! Message type shared by the routing core and the transport seam.

use arcstr::ArcStr;
use bytes::Bytes;
use rumqttc::QoS;

use crate::message_serializer::MessageSerializer;

/// A message received from, or destined for, a concrete MQTT topic.
///
/// Cloning is cheap (`ArcStr` and `Bytes` are reference counted) and every
/// clone is an independent, immutable value, so each subscriber can be handed
/// its own copy.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
	/// Concrete topic the message was published to
	pub topic: ArcStr,
	/// Raw payload
	pub payload: Bytes,
	/// QoS the message was delivered with
	pub qos: QoS,
	/// Whether the broker flagged the message as retained
	pub retain: bool,
}

impl Message {
	/// Creates a QoS 0, non-retained message.
	pub fn new(topic: impl Into<ArcStr>, payload: impl Into<Bytes>) -> Self {
		Self {
			topic: topic.into(),
			payload: payload.into(),
			qos: QoS::AtMostOnce,
			retain: false,
		}
	}

	/// Sets the QoS level.
	pub fn with_qos(mut self, qos: QoS) -> Self {
		self.qos = qos;
		self
	}

	/// Sets the retain flag.
	pub fn with_retain(mut self, retain: bool) -> Self {
		self.retain = retain;
		self
	}

	/// Decodes the payload with the given serializer.
	pub fn decode<T, F>(&self, serializer: &F) -> Result<T, F::DeserializeError>
	where F: MessageSerializer<T> {
		serializer.deserialize(&self.payload)
	}
}

impl From<rumqttc::Publish> for Message {
	fn from(publish: rumqttc::Publish) -> Self {
		Self {
			topic: ArcStr::from(publish.topic),
			payload: publish.payload,
			qos: publish.qos,
			retain: publish.retain,
		}
	}
}

/// Returns the numeric MQTT level of a QoS value.
pub(crate) fn qos_level(qos: QoS) -> u8 {
	qos as u8
}

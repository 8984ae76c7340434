//! Online/offline presence published for this client

use arcstr::ArcStr;
use bytes::Bytes;
use rumqttc::{LastWill, QoS};

use crate::topic::{TopicError, validation};
use crate::transport::PublishRequest;

/// Payload published when the client comes online
pub const ONLINE_PAYLOAD: &str = "1";
/// Payload of the last will, published by the broker when the client
/// disappears
pub const OFFLINE_PAYLOAD: &str = "0";
/// QoS of both presence messages
pub const PRESENCE_QOS: QoS = QoS::ExactlyOnce;

/// Retained presence topic `{prefix}/{client_id}`.
///
/// The broker holds `"1"` while the client is connected and publishes the
/// retained `"0"` will when it disconnects uncleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presence {
	topic: ArcStr,
}

impl Presence {
	pub fn new(prefix: &str, client_id: &str) -> Result<Self, TopicError> {
		let topic = format!("{prefix}/{client_id}");
		validation::validate_topic_name(&topic)?;
		Ok(Self {
			topic: ArcStr::from(topic),
		})
	}

	pub fn topic(&self) -> &ArcStr {
		&self.topic
	}

	/// Retained online notification.
	pub fn online_request(&self) -> PublishRequest {
		PublishRequest::new(
			self.topic.clone(),
			Bytes::from_static(ONLINE_PAYLOAD.as_bytes()),
			PRESENCE_QOS,
			true,
		)
	}

	/// Retained offline will for the CONNECT packet.
	pub fn last_will(&self) -> LastWill {
		LastWill::new(
			self.topic.as_str(),
			OFFLINE_PAYLOAD.as_bytes(),
			PRESENCE_QOS,
			true,
		)
	}
}

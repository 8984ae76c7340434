use std::marker::PhantomData;

use arcstr::ArcStr;
use rumqttc::QoS;

use super::client_actor::ClientHandler;
use super::error::MqttClientError;
use crate::message_serializer::MessageSerializer;
use crate::transport::PublishRequest;

/// Publisher bound to one concrete topic, serializing values with `F`.
#[derive(Debug, Clone)]
pub struct MqttPublisher<T, F> {
	handler: ClientHandler,
	topic: ArcStr,
	qos: QoS,
	retain: bool,
	serializer: F,
	_phantom: PhantomData<T>,
}

impl<T, F> MqttPublisher<T, F>
where F: MessageSerializer<T>
{
	pub(crate) fn new(
		handler: ClientHandler,
		serializer: F,
		topic: impl Into<ArcStr>,
	) -> Self {
		Self {
			handler,
			topic: topic.into(),
			qos: QoS::AtLeastOnce,
			retain: false,
			serializer,
			_phantom: PhantomData,
		}
	}

	pub fn with_qos(mut self, qos: QoS) -> Self {
		self.qos = qos;
		self
	}

	pub fn with_retain(mut self, retain: bool) -> Self {
		self.retain = retain;
		self
	}

	pub fn topic(&self) -> &ArcStr {
		&self.topic
	}

	/// Serializes `data` and publishes it, resolving on acknowledgment.
	pub async fn publish(&self, data: &T) -> Result<(), MqttClientError> {
		let payload = self
			.serializer
			.serialize(data)
			.map_err(MqttClientError::serialization)?;
		let request = PublishRequest::new(
			self.topic.clone(),
			payload,
			self.qos,
			self.retain,
		);
		Ok(self.handler.publish(request).await?)
	}
}

use std::marker::PhantomData;

use arcstr::ArcStr;
use tracing::debug;

use super::error::MqttClientError;
use crate::message_serializer::MessageSerializer;
use crate::routing::Subscriber;

/// Topic of the message and the decoded payload.
pub type IncomingMessage<T, F> =
	(ArcStr, Result<T, <F as MessageSerializer<T>>::DeserializeError>);

/// Subscriber decoding payloads with `F`.
pub struct MqttSubscriber<T, F> {
	subscriber: Subscriber,
	serializer: F,
	_phantom: PhantomData<T>,
}

impl<T, F> MqttSubscriber<T, F>
where
	T: Send + Sync + 'static,
	F: MessageSerializer<T>,
{
	pub fn new(subscriber: Subscriber, serializer: F) -> Self {
		Self {
			subscriber,
			serializer,
			_phantom: PhantomData,
		}
	}

	/// Subscription topic, possibly with wildcards.
	pub fn topic(&self) -> &ArcStr {
		self.subscriber.topic()
	}

	/// Receives and decodes the next message. Empty payloads are skipped.
	pub async fn receive(&mut self) -> Option<IncomingMessage<T, F>> {
		loop {
			let message = self.subscriber.recv().await?;
			if message.payload.is_empty() {
				debug!(topic = %message.topic, "Skipping empty payload");
				continue;
			}
			let decoded = message.decode(&self.serializer);
			return Some((message.topic, decoded));
		}
	}

	/// Unsubscribes and waits until the request is queued.
	pub async fn cancel(self) -> Result<(), MqttClientError> {
		self.subscriber
			.unsubscribe()
			.await
			.map_err(MqttClientError::from)
	}
}

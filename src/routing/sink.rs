use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use super::error::DeliveryError;
use super::subscriber_registry::SubscriptionId;
use crate::message::Message;

/// Destination of dispatched messages for one subscription.
///
/// Delivery must not block: the client actor calls it inline while
/// routing an incoming message.
pub trait MessageSink: Clone + Send + 'static {
	/// Hands one message to the subscriber.
	fn deliver(&self, message: Message) -> Result<(), DeliveryError>;

	/// Returns true once the subscriber can no longer receive anything.
	fn is_closed(&self) -> bool {
		false
	}
}

impl MessageSink for mpsc::Sender<Message> {
	fn deliver(&self, message: Message) -> Result<(), DeliveryError> {
		self.try_send(message).map_err(|err| match err {
			| TrySendError::Full(_) => DeliveryError::Full,
			| TrySendError::Closed(_) => DeliveryError::Closed,
		})
	}

	fn is_closed(&self) -> bool {
		mpsc::Sender::is_closed(self)
	}
}

/// Result of one isolated delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
	/// Message accepted
	Delivered,
	/// Message lost for this subscriber only
	Dropped,
	/// Subscriber is gone and should be unsubscribed
	Closed,
}

/// Delivers `message` to a single sink, logging instead of propagating any
/// failure. Used for both live dispatch and cache replay.
pub fn deliver_isolated<S: MessageSink>(
	sink: &S,
	id: SubscriptionId,
	message: Message,
) -> Delivery {
	let topic = message.topic.clone();
	match sink.deliver(message) {
		| Ok(()) => {
			debug!(subscription_id = ?id, topic = %topic, "Message delivered");
			Delivery::Delivered
		}
		| Err(DeliveryError::Closed) => {
			debug!(
				subscription_id = ?id,
				topic = %topic,
				"Subscriber closed, message discarded"
			);
			Delivery::Closed
		}
		| Err(err) => {
			warn!(
				subscription_id = ?id,
				topic = %topic,
				error = %err,
				"Message dropped for subscriber"
			);
			Delivery::Dropped
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_channel_sink_reports_full_and_closed() {
		let (tx, mut rx) = mpsc::channel::<Message>(1);
		let id = SubscriptionId::from_raw(1);

		assert_eq!(
			deliver_isolated(&tx, id, Message::new("a", "1")),
			Delivery::Delivered
		);
		assert_eq!(
			deliver_isolated(&tx, id, Message::new("a", "2")),
			Delivery::Dropped
		);
		assert_eq!(rx.recv().await.map(|m| m.payload), Some("1".into()));

		drop(rx);
		assert!(MessageSink::is_closed(&tx));
		assert_eq!(
			deliver_isolated(&tx, id, Message::new("a", "3")),
			Delivery::Closed
		);
	}
}

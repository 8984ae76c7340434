use std::pin::Pin;
use std::task::{Context, Poll};

use arcstr::ArcStr;
use futures::Stream;
use tokio::sync::mpsc::{Receiver, UnboundedSender, error::SendError};
use tracing::{debug, warn};

use super::subscriber_registry::SubscriptionId;
use crate::message::Message;

/// Stream of messages for one subscription with manual unsubscription.
///
/// Dropping the subscriber unsubscribes it. Unsubscribe requests go
/// through an unbounded queue, so none is lost however many subscribers
/// are dropped at once. The stream ends when the client shuts down.
#[derive(Debug)]
pub struct Subscriber {
	receiver: Receiver<Message>,
	unsubscribe_tx: Option<UnboundedSender<SubscriptionId>>,
	id: SubscriptionId,
	topic: ArcStr,
}

impl Subscriber {
	pub(crate) fn new(
		receiver: Receiver<Message>,
		unsubscribe_tx: UnboundedSender<SubscriptionId>,
		id: SubscriptionId,
		topic: ArcStr,
	) -> Self {
		Self {
			receiver,
			unsubscribe_tx: Some(unsubscribe_tx),
			id,
			topic,
		}
	}

	pub fn id(&self) -> SubscriptionId {
		self.id
	}

	/// Subscription topic, possibly with wildcards.
	pub fn topic(&self) -> &ArcStr {
		&self.topic
	}

	/// Receives the next message from subscription.
	pub async fn recv(&mut self) -> Option<Message> {
		self.receiver.recv().await
	}

	/// Unsubscribes from the topic. Fails only if the client has shut down.
	pub async fn unsubscribe(mut self) -> Result<(), SendError<SubscriptionId>> {
		self.unsubscribe_immediate()
	}

	/// Queues the unsubscribe request without consuming the handle.
	pub fn unsubscribe_immediate(
		&mut self,
	) -> Result<(), SendError<SubscriptionId>> {
		let Some(unsubscribe_tx) = self.unsubscribe_tx.take() else {
			warn!(subscription_id = ?self.id, "Subscription already canceled");
			return Ok(());
		};
		unsubscribe_tx.send(self.id).inspect_err(|_| {
			debug!(
				subscription_id = ?self.id,
				"Client gone, nothing to unsubscribe"
			);
		})
	}
}

impl Stream for Subscriber {
	type Item = Message;

	fn poll_next(
		mut self: Pin<&mut Self>,
		cx: &mut Context<'_>,
	) -> Poll<Option<Self::Item>> {
		self.receiver.poll_recv(cx)
	}
}

impl Drop for Subscriber {
	fn drop(&mut self) {
		if let Some(unsubscribe_tx) = self.unsubscribe_tx.take() {
			// A send error means the client actor is already gone.
			if unsubscribe_tx.send(self.id).is_ok() {
				debug!(
					subscription_id = ?self.id,
					topic = %self.topic,
					"Subscription unsubscribed in Drop"
				);
			}
		}
	}
}

//! Topic bindings recorded up front and attached to a client in one step.
//!
//! Components list the `(topic, qos, handler)` tuples they need while being
//! constructed; [`TopicBindings::attach`] subscribes each one and runs its
//! handler on a dedicated task.

use std::fmt::Display;
use std::future::Future;

use arcstr::ArcStr;
use futures::FutureExt;
use futures::future::BoxFuture;
use rumqttc::QoS;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::{MqttClient, MqttClientError};
use crate::message::Message;

type Handler =
	Box<dyn FnMut(Message) -> BoxFuture<'static, Result<(), String>> + Send>;

struct Binding {
	topic: ArcStr,
	qos: QoS,
	handler: Handler,
}

/// Ordered list of topic handlers awaiting a client.
#[derive(Default)]
pub struct TopicBindings {
	bindings: Vec<Binding>,
}

impl TopicBindings {
	pub fn new() -> Self {
		Self::default()
	}

	/// Records a handler for `topic`. Handler errors are logged and the
	/// binding keeps receiving.
	pub fn bind<H, Fut, E>(
		mut self,
		topic: impl Into<ArcStr>,
		qos: QoS,
		mut handler: H,
	) -> Self
	where
		H: FnMut(Message) -> Fut + Send + 'static,
		Fut: Future<Output = Result<(), E>> + Send + 'static,
		E: Display + 'static,
	{
		let handler: Handler = Box::new(move |message| {
			handler(message)
				.map(|result| result.map_err(|err| err.to_string()))
				.boxed()
		});
		self.bindings.push(Binding {
			topic: topic.into(),
			qos,
			handler,
		});
		self
	}

	pub fn len(&self) -> usize {
		self.bindings.len()
	}

	pub fn is_empty(&self) -> bool {
		self.bindings.is_empty()
	}

	/// Subscribes every binding in order. On the first failure the bindings
	/// attached so far are detached again and the error is returned.
	pub async fn attach<F>(
		self,
		client: &MqttClient<F>,
	) -> Result<AttachedBindings, MqttClientError>
	where
		F: Default + Clone + Send + Sync + 'static,
	{
		let mut attached = AttachedBindings::default();
		for Binding {
			topic,
			qos,
			mut handler,
		} in self.bindings
		{
			let mut subscriber = match client.subscribe(topic.clone(), qos).await {
				| Ok(subscriber) => subscriber,
				| Err(err) => {
					warn!(topic = %topic, error = %err, "Failed to attach binding");
					attached.detach();
					return Err(err);
				}
			};
			let task_topic = topic.clone();
			let task = tokio::spawn(async move {
				while let Some(message) = subscriber.recv().await {
					if let Err(err) = handler(message).await {
						warn!(
							topic = %task_topic,
							error = %err,
							"Binding handler failed"
						);
					}
				}
				debug!(topic = %task_topic, "Binding stream ended");
			});
			attached.topics.push(topic);
			attached.tasks.push(task);
		}
		info!(count = attached.tasks.len(), "Topic bindings attached");
		Ok(attached)
	}
}

/// Handler tasks started by [`TopicBindings::attach`].
#[derive(Default)]
pub struct AttachedBindings {
	topics: Vec<ArcStr>,
	tasks: Vec<JoinHandle<()>>,
}

impl AttachedBindings {
	pub fn topics(&self) -> &[ArcStr] {
		&self.topics
	}

	/// Stops every handler; their subscriptions are released.
	pub fn detach(self) {
		for task in &self.tasks {
			task.abort();
		}
	}

	/// Waits until every handler stream has ended, which happens when the
	/// client shuts down.
	pub async fn join(self) {
		for task in self.tasks {
			if let Err(err) = task.await {
				warn!(error = %err, "Binding task failed");
			}
		}
	}
}

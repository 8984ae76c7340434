#![allow(missing_docs)]
use arcstr::ArcStr;
use rumqttc::QoS;
use tokio::{
	sync::{
		mpsc::{
			self, Receiver, Sender, UnboundedReceiver, UnboundedSender, channel,
			unbounded_channel,
		},
		oneshot, watch,
	},
	task::{JoinError, JoinHandle},
	time::{Instant, sleep_until},
};
use tracing::{debug, error, info, warn};

use super::config::{ClientConfig, ConfigError};
use super::presence::Presence;
use crate::connection::{ConnectionState, ConnectionStateSubscriber};
use crate::message::Message;
use crate::routing::{
	Delivery, MessageCache, PublishError, Retention, Subscriber,
	SubscriberRegistry, SubscriptionError, SubscriptionId, deliver_isolated,
};
use crate::topic::validation;
use crate::transport::{
	AckReceiver, PublishRequest, Transport, TransportEvent,
};

type SinkType = Sender<Message>;

/// Actor settings derived from a [`ClientConfig`]
#[derive(Debug, Clone)]
pub(crate) struct ActorConfig {
	pub presence: Option<Presence>,
	pub retention: Retention,
	pub command_channel_capacity: usize,
	pub subscriber_channel_capacity: usize,
}

impl ActorConfig {
	pub fn from_client_config(config: &ClientConfig) -> Result<Self, ConfigError> {
		config.validate()?;
		Ok(Self {
			presence: config.presence()?,
			retention: config.retention()?,
			command_channel_capacity: config.settings.command_channel_capacity,
			subscriber_channel_capacity: config
				.settings
				.subscriber_channel_capacity,
		})
	}
}

#[derive(Debug)]
pub(crate) enum Command {
	Subscribe {
		topic: ArcStr,
		qos: QoS,
		response_tx: oneshot::Sender<Result<Subscriber, SubscriptionError>>,
	},
	Publish {
		request: PublishRequest,
		response_tx: oneshot::Sender<Result<AckReceiver, PublishError>>,
	},
	ActiveSubscriptions(oneshot::Sender<Vec<(ArcStr, QoS)>>),
}

/// Single task owning the subscriber registry, the message cache and the
/// connection state.
///
/// Commands from client handles, unsubscribe requests from dropped
/// subscribers, observer registrations, transport events and the cache
/// sweep deadline are all handled sequentially in one `select!` loop.
pub(crate) struct ClientActor<T> {
	transport: T,
	registry: SubscriberRegistry<SinkType>,
	cache: MessageCache,
	presence: Option<Presence>,
	state: ConnectionState,
	online_tx: watch::Sender<bool>,
	observers: Vec<UnboundedSender<bool>>,
	observer_rx: UnboundedReceiver<UnboundedSender<bool>>,
	command_rx: Receiver<Command>,
	unsubscribe_rx: UnboundedReceiver<SubscriptionId>,
	unsubscribe_tx: UnboundedSender<SubscriptionId>,
	events: Receiver<TransportEvent>,
	events_open: bool,
	shutdown_rx: oneshot::Receiver<()>,
	subscriber_channel_capacity: usize,
}

impl<T: Transport> ClientActor<T> {
	pub fn spawn(
		transport: T,
		events: Receiver<TransportEvent>,
		config: ActorConfig,
	) -> (ClientController, ClientHandler) {
		let (command_tx, command_rx) = channel(config.command_channel_capacity);
		let (unsubscribe_tx, unsubscribe_rx) = unbounded_channel();
		let (observer_tx, observer_rx) = unbounded_channel();
		let (shutdown_tx, shutdown_rx) = oneshot::channel();
		let (online_tx, online_rx) = watch::channel(false);

		let actor = Self {
			transport,
			registry: SubscriberRegistry::new(),
			cache: MessageCache::new(config.retention),
			presence: config.presence,
			state: ConnectionState::Connecting,
			online_tx,
			observers: Vec::new(),
			observer_rx,
			command_rx,
			unsubscribe_rx,
			unsubscribe_tx,
			events,
			events_open: true,
			shutdown_rx,
			subscriber_channel_capacity: config.subscriber_channel_capacity,
		};
		let join_handle = tokio::spawn(async move { actor.run().await });

		let controller = ClientController {
			shutdown_tx,
			join_handle,
		};
		let handler = ClientHandler {
			command_tx,
			observer_tx,
			online_rx,
		};
		(controller, handler)
	}

	async fn run(mut self) {
		loop {
			let sweep_at = self.cache.next_sweep();
			tokio::select! {
				_ = &mut self.shutdown_rx => {
					info!("ClientActor: Shutdown signal received");
					break;
				}
				Some(id) = self.unsubscribe_rx.recv() => {
					self.handle_unsubscribe(id);
				}
				Some(observer) = self.observer_rx.recv() => {
					self.add_observer(observer);
				}
				cmd = self.command_rx.recv() => {
					if let Some(cmd) = cmd {
						self.handle_command(cmd);
					} else {
						info!("ClientActor: Command channel closed, exiting");
						break;
					}
				}
				event = self.events.recv(), if self.events_open => {
					if let Some(event) = event {
						self.handle_event(event);
					} else {
						info!("ClientActor: Transport event stream ended");
						self.events_open = false;
						self.set_state(ConnectionState::Disconnected);
					}
				}
				_ = sleep_until(sweep_at.unwrap_or_else(Instant::now)),
					if sweep_at.is_some() => {
					self.cache.sweep(Instant::now());
				}
			}
		}
		info!("ClientActor: Exiting run loop");
		self.cleanup();
	}

	fn handle_command(&mut self, cmd: Command) {
		match cmd {
			| Command::Subscribe {
				topic,
				qos,
				response_tx,
			} => self.handle_subscribe(topic, qos, response_tx),
			| Command::Publish {
				request,
				response_tx,
			} => {
				let result = self.handle_publish(request);
				if response_tx.send(result).is_err() {
					debug!("Publish requester went away before hand-off result");
				}
			}
			| Command::ActiveSubscriptions(response_tx) => {
				self.prune_closed();
				let _ = response_tx.send(self.registry.topics_for_resubscribe());
			}
		}
	}

	fn handle_event(&mut self, event: TransportEvent) {
		match event {
			| TransportEvent::Connected { session_present } => {
				self.enter_online(session_present)
			}
			| TransportEvent::Disconnected => {
				if self.state == ConnectionState::Online {
					info!("Connection lost, waiting for reconnect");
					self.set_state(ConnectionState::Offline);
				}
			}
			| TransportEvent::Error(err) => {
				warn!(error = %err, "Transport reported an error");
			}
			| TransportEvent::Message(message) => self.handle_message(message),
		}
	}

	fn enter_online(&mut self, session_present: bool) {
		self.prune_closed();
		let topics = self.registry.topics_for_resubscribe();
		info!(
			session_present,
			topics = topics.len(),
			"Connection online, resubscribing"
		);
		for (topic, qos) in topics {
			if let Err(err) = self.transport.subscribe(&topic, qos) {
				error!(
					topic = %topic,
					error = %err,
					"Failed to resubscribe to MQTT topic"
				);
			}
		}

		if let Some(presence) = &self.presence {
			let topic = presence.topic().clone();
			match self.transport.publish(presence.online_request()) {
				| Ok(ack_rx) => {
					tokio::spawn(async move {
						match ack_rx.await {
							| Ok(Ok(())) => debug!(topic = %topic, "Presence published"),
							| Ok(Err(err)) => {
								warn!(topic = %topic, error = %err, "Presence publish failed")
							}
							| Err(_) => {
								warn!(topic = %topic, "Presence acknowledgment lost")
							}
						}
					});
				}
				| Err(err) => {
					error!(topic = %topic, error = %err, "Failed to publish presence");
				}
			}
		}

		self.set_state(ConnectionState::Online);
	}

	fn set_state(&mut self, state: ConnectionState) {
		if self.state == state {
			return;
		}
		debug!(from = ?self.state, to = ?state, "Connection state changed");
		self.state = state;
		let online = state.is_online();
		let changed = self.online_tx.send_if_modified(|current| {
			if *current == online {
				return false;
			}
			*current = online;
			true
		});
		if changed {
			self.observers.retain(|observer| observer.send(online).is_ok());
		}
	}

	fn add_observer(&mut self, observer: UnboundedSender<bool>) {
		if observer.send(self.state.is_online()).is_ok() {
			self.observers.push(observer);
		}
	}

	/// Unsubscribes subscriptions whose receiver is gone but whose drop
	/// request has not been handled yet.
	fn prune_closed(&mut self) {
		for id in self.registry.closed_subscriptions() {
			debug!(subscription_id = ?id, "Removing closed subscription");
			self.handle_unsubscribe(id);
		}
	}

	fn handle_subscribe(
		&mut self,
		topic: ArcStr,
		qos: QoS,
		response_tx: oneshot::Sender<Result<Subscriber, SubscriptionError>>,
	) {
		let (sink, receiver) = mpsc::channel(self.subscriber_channel_capacity);
		let outcome = match self.registry.subscribe(topic.clone(), qos, sink.clone())
		{
			| Ok(outcome) => outcome,
			| Err(err) => {
				warn!(topic = %topic, error = %err, "Subscription rejected");
				let _ = response_tx.send(Err(SubscriptionError::from(err)));
				return;
			}
		};
		let id = outcome.id;

		// While not online the SUBSCRIBE is issued by the resubscription
		// that follows the next CONNACK.
		if let Some(wire_qos) = outcome.wire_subscribe {
			if self.state.is_online() {
				if let Err(err) = self.transport.subscribe(&topic, wire_qos) {
					error!(
						topic = %topic,
						error = %err,
						"Failed to subscribe to MQTT topic"
					);
					if let Err(unsub_err) = self.registry.unsubscribe(id) {
						warn!(
							subscription_id = ?id,
							error = ?unsub_err,
							"Failed to cleanup subscription after subscribe error"
						);
					}
					let _ = response_tx
						.send(Err(SubscriptionError::SubscribeFailed(err)));
					return;
				}
			}
		}

		self.replay_cached(id, &topic, &sink);

		let subscriber = Subscriber::new(
			receiver,
			self.unsubscribe_tx.clone(),
			id,
			topic,
		);
		if response_tx.send(Ok(subscriber)).is_err() {
			warn!(
				subscription_id = ?id,
				"Could not send successful subscribe response (channel closed)"
			);
			self.handle_unsubscribe(id);
		}
	}

	fn replay_cached(&self, id: SubscriptionId, topic: &str, sink: &SinkType) {
		let messages = match self.cache.lookup(topic) {
			| Ok(messages) => messages,
			| Err(err) => {
				warn!(topic = %topic, error = %err, "Cache lookup failed");
				return;
			}
		};
		if !messages.is_empty() {
			debug!(
				subscription_id = ?id,
				count = messages.len(),
				"Replaying cached messages"
			);
		}
		for message in messages {
			if deliver_isolated(sink, id, message) == Delivery::Closed {
				break;
			}
		}
	}

	fn handle_unsubscribe(&mut self, id: SubscriptionId) {
		match self.registry.unsubscribe(id) {
			| Ok(Some(outcome)) if outcome.wire_unsubscribe => {
				if let Err(err) = self.transport.unsubscribe(&outcome.topic) {
					error!(
						topic = %outcome.topic,
						error = %err,
						"Failed to unsubscribe from MQTT topic"
					);
				}
				debug!(topic = %outcome.topic, "Topic now empty");
			}
			| Ok(_) => {}
			| Err(err) => {
				error!(subscription_id = ?id, error = ?err, "Failed to unsubscribe");
			}
		}
	}

	fn handle_publish(
		&mut self,
		request: PublishRequest,
	) -> Result<AckReceiver, PublishError> {
		if !self.state.has_connected() {
			return Err(PublishError::NotConnected);
		}
		debug!(
			topic = %request.topic,
			qos = ?request.qos,
			retain = request.retain,
			"Publishing"
		);
		self.transport.publish(request).map_err(PublishError::from)
	}

	fn handle_message(&mut self, message: Message) {
		let report = match self.registry.dispatch(&message) {
			| Ok(report) => report,
			| Err(err) => {
				warn!(topic = %message.topic, error = %err, "Dropping message with invalid topic");
				return;
			}
		};
		debug!(
			topic = %message.topic,
			delivered = report.delivered,
			dropped = report.dropped,
			"Message dispatched"
		);
		for closed_id in report.closed {
			self.handle_unsubscribe(closed_id);
		}
		if report.delivered > 0 {
			if let Err(err) = self.cache.record(message, Instant::now()) {
				warn!(error = %err, "Failed to cache message");
			}
		}
	}

	/// Cleanup all active subscriptions and resources during shutdown:
	/// 1. Send unsubscribe requests for all topics
	/// 2. Drop every sink, which ends subscriber streams
	/// 3. Notify observers and send DISCONNECT
	fn cleanup(&mut self) {
		for (topic, _) in self.registry.topics_for_resubscribe() {
			if let Err(err) = self.transport.unsubscribe(&topic) {
				error!(
					topic = %topic,
					error = %err,
					"Failed to unsubscribe from topic"
				);
			}
		}
		self.registry.clear();
		self.cache.clear();
		self.set_state(ConnectionState::Disconnected);
		if let Err(err) = self.transport.disconnect() {
			warn!(error = %err, "Failed to disconnect MQTT client");
		}
	}
}

pub(crate) struct ClientController {
	shutdown_tx: oneshot::Sender<()>,
	join_handle: JoinHandle<()>,
}

impl ClientController {
	pub async fn shutdown(self) -> Result<(), JoinError> {
		let _ = self.shutdown_tx.send(()).inspect_err(|_| {
			warn!("ClientController: Shutdown signal already sent");
		});
		self.join_handle.await.inspect_err(|e| {
			warn!(error = ?e, "ClientController: Actor run failed");
		})
	}
}

#[derive(Clone, Debug)]
pub(crate) struct ClientHandler {
	command_tx: Sender<Command>,
	observer_tx: UnboundedSender<UnboundedSender<bool>>,
	online_rx: watch::Receiver<bool>,
}

impl ClientHandler {
	pub async fn subscribe(
		&self,
		topic: ArcStr,
		qos: QoS,
	) -> Result<Subscriber, SubscriptionError> {
		let (response_tx, response_rx) = oneshot::channel();
		self.command_tx
			.send(Command::Subscribe {
				topic,
				qos,
				response_tx,
			})
			.await
			.map_err(|_| SubscriptionError::ChannelClosed)?;
		response_rx
			.await
			.map_err(|_| SubscriptionError::ResponseLost)?
	}

	/// Validates and publishes, resolving once the broker acknowledged.
	pub async fn publish(&self, request: PublishRequest) -> Result<(), PublishError> {
		validation::validate_topic_name(&request.topic)?;
		if request.payload.is_empty() {
			return Err(PublishError::EmptyPayload);
		}

		let (response_tx, response_rx) = oneshot::channel();
		self.command_tx
			.send(Command::Publish {
				request,
				response_tx,
			})
			.await
			.map_err(|_| PublishError::ChannelClosed)?;
		let ack_rx = response_rx
			.await
			.map_err(|_| PublishError::ResponseLost)??;
		ack_rx.await.map_err(|_| PublishError::AckLost)??;
		Ok(())
	}

	pub async fn active_subscriptions(
		&self,
	) -> Result<Vec<(ArcStr, QoS)>, SubscriptionError> {
		let (response_tx, response_rx) = oneshot::channel();
		self.command_tx
			.send(Command::ActiveSubscriptions(response_tx))
			.await
			.map_err(|_| SubscriptionError::ChannelClosed)?;
		response_rx.await.map_err(|_| SubscriptionError::ResponseLost)
	}

	pub fn connection_state(&self) -> ConnectionStateSubscriber {
		let (updates_tx, updates_rx) = unbounded_channel();
		if self.observer_tx.send(updates_tx).is_err() {
			debug!("Client actor gone, state observer closed immediately");
		}
		ConnectionStateSubscriber::new(updates_rx, self.online_rx.clone())
	}

	pub fn is_online(&self) -> bool {
		*self.online_rx.borrow()
	}
}

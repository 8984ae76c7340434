use std::time::Duration;

use arcstr::ArcStr;
use bytes::Bytes;
use rumqttc::QoS;
use tokio::sync::mpsc::Receiver;
use tokio::time;
use tracing::{debug, warn};

use super::client_actor::{ActorConfig, ClientActor, ClientHandler};
use super::config::ClientConfig;
use super::error::{ConnectionEstablishmentError, MqttClientError};
use super::publisher::MqttPublisher;
use super::subscriber::MqttSubscriber;
use crate::connection::{ConnectionStateSubscriber, MqttConnection};
use crate::message_serializer::{BincodeSerializer, MessageSerializer};
use crate::routing::Subscriber;
use crate::topic::{TopicError, validation};
use crate::transport::{
	PublishRequest, RumqttTransport, Transport, TransportEvent,
};

/// MQTT client handle with multiplexed subscriptions.
///
/// Any number of subscribers may share one wire-level subscription; the
/// client keeps the broker subscribed at the strictest QoS requested and
/// re-subscribes after every reconnect. Cloning is cheap; all clones talk
/// to the same connection. Connection lifecycle is managed separately via
/// [`MqttConnection`].
#[derive(Clone, Debug)]
pub struct MqttClient<F = BincodeSerializer> {
	handler: ClientHandler,
	serializer: F,
}

impl<F> MqttClient<F>
where F: Default + Clone + Send + Sync + 'static
{
	/// Create MQTT client with default configuration and wait until it is
	/// online.
	///
	/// Returns both client and connection handle. Keep connection alive
	/// for the session duration, call `connection.shutdown()` when done.
	pub async fn connect(
		url: &str,
		client_id: &str,
	) -> Result<(Self, MqttConnection), MqttClientError> {
		Self::connect_with_config(ClientConfig::new(url, client_id)).await
	}

	/// Create a new MQTT client with custom configuration
	pub async fn connect_with_config(
		config: ClientConfig,
	) -> Result<(Self, MqttConnection), MqttClientError> {
		let (transport, events, driver) = RumqttTransport::connect(&config)?;
		let (client, connection) =
			Self::spawn(transport, events, &config, Some(driver))?;

		let timeout_millis = config.settings.connection_timeout_millis;
		let mut state = client.connection_state();
		let online = time::timeout(
			Duration::from_millis(timeout_millis),
			state.wait_online(),
		)
		.await;
		match online {
			| Ok(true) => {
				debug!(client_id = %config.client_id, "MQTT client online");
				Ok((client, connection))
			}
			| Ok(false) => {
				let _ = connection.shutdown().await;
				Err(ConnectionEstablishmentError::Closed.into())
			}
			| Err(_) => {
				warn!(timeout_millis, "MQTT connection not established in time");
				let _ = connection.shutdown().await;
				Err(ConnectionEstablishmentError::Timeout { timeout_millis }.into())
			}
		}
	}

	/// Create a client over any [`Transport`].
	///
	/// The client starts in the connecting state and goes online on the
	/// first [`TransportEvent::Connected`]. Must be called from within a
	/// tokio runtime.
	pub fn with_transport<T: Transport>(
		transport: T,
		events: Receiver<TransportEvent>,
		config: &ClientConfig,
	) -> Result<(Self, MqttConnection), MqttClientError> {
		Self::spawn(transport, events, config, None)
	}

	fn spawn<T: Transport>(
		transport: T,
		events: Receiver<TransportEvent>,
		config: &ClientConfig,
		driver: Option<tokio::task::JoinHandle<()>>,
	) -> Result<(Self, MqttConnection), MqttClientError> {
		let actor_config = ActorConfig::from_client_config(config)?;
		let (controller, handler) =
			ClientActor::spawn(transport, events, actor_config);
		let client = Self {
			handler,
			serializer: F::default(),
		};
		Ok((client, MqttConnection::new(controller, driver)))
	}

	/// Subscribe to a topic, possibly with wildcards.
	///
	/// Messages already cached for matching topics are delivered first.
	/// Dropping the returned [`Subscriber`] unsubscribes it.
	pub async fn subscribe(
		&self,
		topic: impl Into<ArcStr>,
		qos: QoS,
	) -> Result<Subscriber, MqttClientError> {
		Ok(self.handler.subscribe(topic.into(), qos).await?)
	}

	/// Subscribe and decode payloads with the client's serializer.
	pub async fn subscribe_typed<T>(
		&self,
		topic: impl Into<ArcStr>,
		qos: QoS,
	) -> Result<MqttSubscriber<T, F>, MqttClientError>
	where
		T: 'static + Send + Sync,
		F: MessageSerializer<T>,
	{
		let subscriber = self.subscribe(topic, qos).await?;
		Ok(MqttSubscriber::new(subscriber, self.serializer.clone()))
	}

	/// Publish raw bytes, resolving once the broker acknowledged per `qos`.
	///
	/// Fails before anything is sent if the topic is empty or carries
	/// wildcards, if the payload is empty, or if the client has never been
	/// online.
	pub async fn publish(
		&self,
		topic: impl Into<ArcStr>,
		payload: impl Into<Bytes>,
		qos: QoS,
		retain: bool,
	) -> Result<(), MqttClientError> {
		let request = PublishRequest::new(topic, payload, qos, retain);
		Ok(self.handler.publish(request).await?)
	}

	/// Create typed publisher for specific topic.
	///
	/// Topic must not contain wildcard characters (`+`, `#`).
	pub fn get_publisher<T>(
		&self,
		topic: impl Into<ArcStr>,
	) -> Result<MqttPublisher<T, F>, TopicError>
	where
		F: MessageSerializer<T>,
	{
		let topic = topic.into();
		validation::validate_topic_name(&topic)?;
		Ok(MqttPublisher::new(
			self.handler.clone(),
			self.serializer.clone(),
			topic,
		))
	}

	/// Observe the online/offline state.
	pub fn connection_state(&self) -> ConnectionStateSubscriber {
		self.handler.connection_state()
	}

	pub fn is_online(&self) -> bool {
		self.handler.is_online()
	}

	/// Topics currently subscribed on the wire, with their QoS.
	pub async fn active_subscriptions(
		&self,
	) -> Result<Vec<(ArcStr, QoS)>, MqttClientError> {
		Ok(self.handler.active_subscriptions().await?)
	}
}

use tokio::sync::mpsc::error::SendError;

use super::config::ConfigError;
use crate::routing::{
	PublishError, SubscriptionError, SubscriptionId, TopicRouterError,
};
use crate::store::StoreError;
use crate::topic::TopicError;
use crate::transport::TransportError;

/// Errors raised while waiting for the first connection
#[derive(Debug, thiserror::Error)]
pub enum ConnectionEstablishmentError {
	/// No CONNACK arrived in time
	#[error("Connection establishment timed out after {timeout_millis}ms")]
	Timeout {
		/// The configured timeout
		timeout_millis: u64,
	},

	/// The client stopped before the connection came online
	#[error("Client stopped before the connection came online")]
	Closed,
}

/// Errors that can occur in MQTT client operations
#[derive(Debug, thiserror::Error)]
pub enum MqttClientError {
	/// Invalid client configuration
	#[error("Configuration error: {0}")]
	Configuration(#[from] ConfigError),

	/// Serialization errors when converting data to bytes
	#[error("Serialization error: {0}")]
	Serialization(String),

	/// Subscription management errors
	#[error("Subscription error: {0}")]
	Subscription(#[from] SubscriptionError),

	/// Publish errors
	#[error("Publish error: {0}")]
	Publish(#[from] PublishError),

	/// Topic validation errors
	#[error("Topic error: {0}")]
	Topic(#[from] TopicError),

	/// Topic routing errors
	#[error("Topic routing error: {0}")]
	TopicRouting(#[from] TopicRouterError),

	/// Wire-level connection errors
	#[error("Transport error: {0}")]
	Transport(#[from] TransportError),

	/// Inflight store errors
	#[error("Packet store error: {0}")]
	Store(#[from] StoreError),

	/// Channel communication errors
	#[error("Failed to unsubscribe: subscription {0} channel closed")]
	UnsubscribeFailed(SubscriptionId),

	/// Connection establishment failed
	#[error("Failed to establish connection: {0}")]
	ConnectionEstablishment(#[from] ConnectionEstablishmentError),
}

impl MqttClientError {
	/// Create a Serialization error from any debuggable error
	pub fn serialization(err: impl std::fmt::Debug) -> Self {
		MqttClientError::Serialization(format!("{err:?}"))
	}
}

impl From<SendError<SubscriptionId>> for MqttClientError {
	fn from(SendError(sub_id): SendError<SubscriptionId>) -> Self {
		MqttClientError::UnsubscribeFailed(sub_id)
	}
}

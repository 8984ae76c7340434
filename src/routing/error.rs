use thiserror::Error;

use crate::topic::TopicError;
use crate::transport::TransportError;

/// Errors that can occur during topic routing operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopicRouterError {
	/// Subscription topic failed validation
	#[error("Invalid subscription topic: {0}")]
	InvalidTopic(#[from] TopicError),

	/// Internal state corruption detected
	#[error("Internal routing state corrupted: {details}")]
	InternalStateCorrupted {
		/// What was found inconsistent
		details: String,
	},
}

impl TopicRouterError {
	/// Creates a new InternalStateCorrupted error
	pub fn internal_state_corrupted(details: impl Into<String>) -> Self {
		Self::InternalStateCorrupted {
			details: details.into(),
		}
	}
}

/// Errors during subscription operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
	/// Communication channel closed
	#[error("Communication channel closed")]
	ChannelClosed,
	/// Response from the client actor was lost
	#[error("Response from client actor was lost")]
	ResponseLost,
	/// The wire-level SUBSCRIBE could not be handed off
	#[error("Failed to subscribe to MQTT broker: {0}")]
	SubscribeFailed(TransportError),
	/// The subscription topic was rejected
	#[error("Subscription rejected: {0}")]
	InvalidTopic(#[from] TopicRouterError),
}

/// Errors returned by a publish request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
	/// Empty payloads are never handed to the broker
	#[error("Payload cannot be empty")]
	EmptyPayload,
	/// Topic is empty or carries wildcard or null characters
	#[error("Invalid publish topic: {0}")]
	InvalidTopic(#[from] TopicError),
	/// No connection has been established yet
	#[error("Client has not connected yet")]
	NotConnected,
	/// Communication channel closed
	#[error("Communication channel closed")]
	ChannelClosed,
	/// Response from the client actor was lost
	#[error("Response from client actor was lost")]
	ResponseLost,
	/// The acknowledgment was never reported
	#[error("Acknowledgment lost")]
	AckLost,
	/// The wire-level connection rejected the publish
	#[error("Transport error: {0}")]
	Transport(#[from] TransportError),
}

/// Failure to hand a message to one subscriber
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
	/// Subscriber queue is full, the message was dropped
	#[error("Subscriber queue is full")]
	Full,
	/// Subscriber is gone
	#[error("Subscriber closed")]
	Closed,
}

//! # MQTT Multiplex
//!
//! Client-side message routing for MQTT: many logical subscribers, possibly
//! with overlapping wildcard topics, share one wire-level connection.
//!
//! ## Features
//!
//! - **Wildcard Routing**: A level-keyed topic trie matches `+` and `#` in
//!   both directions
//! - **QoS Consolidation**: Subscribers of one topic share a single
//!   SUBSCRIBE at the strictest QoS requested
//! - **Reconnect Handling**: Every topic is re-subscribed after a reconnect
//! - **Presence**: Optional retained online flag with a matching last will
//! - **Message Cache**: Recent messages are replayed to late subscribers
//! - **Message Serialization**: Pluggable serialization (Bincode included)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mqtt_multiplex::{ClientConfig, MqttClient, QoS};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("mqtt://localhost:1883", "sensor-7")
//!         .with_presence("clients")
//!         .with_message_cache_time(60.0);
//!     let (client, connection) =
//!         MqttClient::<mqtt_multiplex::BincodeSerializer>::connect_with_config(config)
//!             .await?;
//!
//!     let mut subscriber = client.subscribe("sensors/+/temperature", QoS::AtLeastOnce).await?;
//!     client
//!         .publish("sensors/kitchen/temperature", "21.5", QoS::AtLeastOnce, false)
//!         .await?;
//!
//!     if let Some(message) = subscriber.recv().await {
//!         println!("{}: {:?}", message.topic, message.payload);
//!     }
//!
//!     connection.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Pattern Matching
//!
//! - `+` matches a single topic level (e.g., `sensors/+/temperature`)
//! - `#` matches its parent level and everything beneath (e.g., `sensors/#`
//!   matches `sensors` and `sensors/a/b`); it must be the last level

#![warn(missing_docs)]

pub mod bindings;
pub mod client;
pub mod connection;
/// Message type exchanged with subscribers and the transport
pub mod message;
pub mod message_serializer;
pub mod routing;
pub mod store;
pub mod topic;
pub mod transport;

// === Core Public API ===
pub use bindings::{AttachedBindings, TopicBindings};
pub use client::{
	ClientConfig, ClientSettings, ConfigError, ConnectionEstablishmentError,
	Credentials, MqttClient, MqttClientError, MqttPublisher, MqttSubscriber,
};
pub use connection::{ConnectionState, ConnectionStateSubscriber, MqttConnection};
pub use message::Message;
#[cfg(feature = "json")]
pub use message_serializer::JsonSerializer;
pub use message_serializer::{BincodeSerializer, MessageSerializer};
pub use routing::{PublishError, Subscriber, SubscriptionError, SubscriptionId};
// Essential external types
pub use rumqttc::QoS;
pub use topic::{TopicError, TopicTrie, TrieMode};
pub use transport::{
	PublishRequest, RumqttTransport, Transport, TransportError, TransportEvent,
};

/// Result type alias for operations that may fail with MqttClientError
pub type Result<T> = std::result::Result<T, MqttClientError>;

/// Prelude module for convenient imports
///
/// ```rust
/// use mqtt_multiplex::prelude::*;
/// ```
pub mod prelude {
	pub use crate::{
		BincodeSerializer, ClientConfig, ClientSettings, Message,
		MessageSerializer, MqttClient, MqttClientError, MqttConnection, QoS,
		Result, Subscriber, TopicBindings,
	};

	#[cfg(feature = "json")]
	pub use crate::JsonSerializer;
}

/// Building blocks for custom integrations
///
/// The routing core can be driven directly, without the client actor:
///
/// ```rust
/// use mqtt_multiplex::advanced::*;
///
/// let mut trie = TopicTrie::for_filters();
/// trie.set_value("home/+/temperature", "all rooms").unwrap();
/// trie.set_value("home/#", "everything").unwrap();
///
/// let matched: Vec<_> = trie.find_values("home/kitchen/temperature").unwrap().collect();
/// assert_eq!(matched, [&"all rooms", &"everything"]);
/// ```
pub mod advanced {
	pub use crate::routing::{
		CachedMessage, DispatchReport, MessageCache, MessageSink, Retention,
		SubscribeOutcome, SubscriberRegistry, TopicRouterError,
		UnsubscribeOutcome,
	};
	pub use crate::store::{InflightPacket, InflightStore, PacketStore, StoreError};
	pub use crate::topic::{TopicTrie, TrieMode, limits, validation};
	pub use crate::transport::mqtt_options;
}

//! MQTT client module
//!
//! This module provides the client handle, its configuration, the actor that
//! owns routing state, and typed publishers and subscribers.

/// Asynchronous MQTT client implementation
pub mod async_client;
pub(crate) mod client_actor;
pub mod config;
/// Client error types
pub mod error;
pub mod presence;
/// Typed MQTT publishers
pub mod publisher;
/// Typed MQTT subscribers
pub mod subscriber;

// Re-export commonly used types for convenience
pub use async_client::MqttClient;
pub use config::{ClientConfig, ClientSettings, ConfigError, Credentials};
pub use error::{ConnectionEstablishmentError, MqttClientError};
pub use presence::Presence;
pub use publisher::MqttPublisher;
pub use subscriber::{IncomingMessage, MqttSubscriber};

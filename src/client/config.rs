//! Configuration for MQTT client initialization

use std::time::Duration;

use rumqttc::OptionError;
use thiserror::Error;

use super::presence::Presence;
use crate::routing::Retention;
use crate::topic::TopicError;

/// Errors detected while validating a [`ClientConfig`]
#[derive(Error, Debug)]
pub enum ConfigError {
	/// Broker URL is empty
	#[error("Broker url cannot be empty")]
	EmptyUrl,

	/// Client id is empty
	#[error("Client id cannot be empty")]
	EmptyClientId,

	/// Cache time is negative or not finite
	#[error("Invalid message cache time: {value} seconds")]
	InvalidCacheTime {
		/// The rejected value
		value: f64,
	},

	/// A numeric setting is out of range
	#[error("Invalid setting '{name}': {reason}")]
	InvalidSetting {
		/// Setting name
		name: &'static str,
		/// Why it was rejected
		reason: String,
	},

	/// Presence prefix does not form a valid topic
	#[error("Invalid presence topic: {0}")]
	PresenceTopic(#[from] TopicError),

	/// The broker URL could not be turned into connection options
	#[error("Invalid connection options: {0}")]
	Options(#[from] OptionError),
}

impl ConfigError {
	/// Creates a new InvalidSetting error
	pub fn invalid_setting(name: &'static str, reason: impl Into<String>) -> Self {
		Self::InvalidSetting {
			name,
			reason: reason.into(),
		}
	}
}

/// Username and password sent with CONNECT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
	pub username: String,
	pub password: String,
}

/// Client-level performance and behavior settings
#[derive(Debug, Clone)]
pub struct ClientSettings {
	/// Capacity of the rumqttc request channel
	pub event_loop_capacity: usize,
	/// Capacity of the command channel of the client actor
	pub command_channel_capacity: usize,
	/// Capacity of the transport event channel
	pub event_channel_capacity: usize,
	/// Queue length of each subscriber; a full queue drops messages
	pub subscriber_channel_capacity: usize,
	/// How long `connect` waits for the first CONNACK
	pub connection_timeout_millis: u64,
	/// MQTT keep-alive interval
	pub keep_alive_secs: u64,
}

impl Default for ClientSettings {
	fn default() -> Self {
		Self {
			event_loop_capacity: 10,
			command_channel_capacity: 100,
			event_channel_capacity: 100,
			subscriber_channel_capacity: 500,
			connection_timeout_millis: 5000,
			keep_alive_secs: 10,
		}
	}
}

impl ClientSettings {
	fn validate(&self) -> Result<(), ConfigError> {
		let capacities = [
			("event_loop_capacity", self.event_loop_capacity),
			("command_channel_capacity", self.command_channel_capacity),
			("event_channel_capacity", self.event_channel_capacity),
			("subscriber_channel_capacity", self.subscriber_channel_capacity),
		];
		for (name, capacity) in capacities {
			if capacity == 0 {
				return Err(ConfigError::invalid_setting(
					name,
					"must be greater than 0",
				));
			}
		}
		Ok(())
	}
}

/// Configuration for MQTT client creation
#[derive(Debug, Clone)]
pub struct ClientConfig {
	/// Broker URL, e.g. `mqtt://localhost:1883`
	pub url: String,
	/// Client identifier, also used for the presence topic
	pub client_id: String,
	/// Publishes presence to `{prefix}/{client_id}` when set
	pub notify_presence_prefix: Option<String>,
	/// Seconds to keep received messages for replay; `0` keeps them
	/// forever, `None` disables the cache
	pub message_cache_time_s: Option<f64>,
	pub credentials: Option<Credentials>,
	/// PEM encoded CA certificate for TLS connections
	pub ca_cert: Option<Vec<u8>>,
	pub settings: ClientSettings,
}

impl ClientConfig {
	/// Create new config with default settings
	///
	/// # Example
	/// ```rust
	/// use mqtt_multiplex::ClientConfig;
	///
	/// let config = ClientConfig::new("mqtt://localhost:1883", "sensor-7")
	/// 	.with_presence("clients")
	/// 	.with_message_cache_time(30.0);
	/// assert!(config.validate().is_ok());
	/// ```
	pub fn new(url: impl Into<String>, client_id: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			client_id: client_id.into(),
			notify_presence_prefix: None,
			message_cache_time_s: None,
			credentials: None,
			ca_cert: None,
			settings: ClientSettings::default(),
		}
	}

	pub fn with_presence(mut self, prefix: impl Into<String>) -> Self {
		self.notify_presence_prefix = Some(prefix.into());
		self
	}

	pub fn with_message_cache_time(mut self, seconds: f64) -> Self {
		self.message_cache_time_s = Some(seconds);
		self
	}

	pub fn with_credentials(
		mut self,
		username: impl Into<String>,
		password: impl Into<String>,
	) -> Self {
		self.credentials = Some(Credentials {
			username: username.into(),
			password: password.into(),
		});
		self
	}

	pub fn with_ca_cert(mut self, pem: impl Into<Vec<u8>>) -> Self {
		self.ca_cert = Some(pem.into());
		self
	}

	pub fn with_settings(mut self, settings: ClientSettings) -> Self {
		self.settings = settings;
		self
	}

	/// Checks every option that can be checked without connecting.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.url.trim().is_empty() {
			return Err(ConfigError::EmptyUrl);
		}
		if self.client_id.is_empty() {
			return Err(ConfigError::EmptyClientId);
		}
		self.retention()?;
		self.presence()?;
		self.settings.validate()
	}

	/// Cache retention derived from `message_cache_time_s`.
	pub fn retention(&self) -> Result<Retention, ConfigError> {
		match self.message_cache_time_s {
			| None => Ok(Retention::Disabled),
			| Some(seconds) if seconds == 0.0 => Ok(Retention::Forever),
			| Some(seconds) => Duration::try_from_secs_f64(seconds)
				.map(Retention::Window)
				.map_err(|_| ConfigError::InvalidCacheTime { value: seconds }),
		}
	}

	/// Presence topic, when presence notification is configured.
	pub fn presence(&self) -> Result<Option<Presence>, ConfigError> {
		self.notify_presence_prefix
			.as_deref()
			.map(|prefix| Presence::new(prefix, &self.client_id))
			.transpose()
			.map_err(ConfigError::from)
	}
}

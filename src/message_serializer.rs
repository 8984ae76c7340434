//! Payload codecs for the typed client facades.
//!
//! Routing never looks inside a payload; only [`MqttPublisher`] and
//! [`MqttSubscriber`] turn values into `Bytes` and back, through the codec
//! picked as the client's type parameter.
//!
//! [`MqttPublisher`]: crate::MqttPublisher
//! [`MqttSubscriber`]: crate::MqttSubscriber

use std::fmt::Debug;

use bincode::config::{Configuration, standard};
use bincode::{Decode, Encode};

/// Payload codec for values of type `T`.
///
/// Codecs are cloned into every typed publisher and subscriber, so they
/// should be cheap to clone and carry no per-message state.
pub trait MessageSerializer<T>:
	Default + Clone + Send + Sync + 'static
{
	/// Raised when a value cannot be encoded
	type SerializeError: Debug + Send + Sync + 'static;
	/// Raised when a payload is not a valid `T`
	type DeserializeError: Debug + Send + Sync + 'static;

	/// Encodes `data` into payload bytes.
	fn serialize(&self, data: &T) -> Result<Vec<u8>, Self::SerializeError>;
	/// Decodes a payload.
	fn deserialize(&self, bytes: &[u8]) -> Result<T, Self::DeserializeError>;
}

/// Compact binary codec; the client default.
///
/// Uses bincode's standard configuration (varint integers, little endian),
/// so payloads are only readable by peers using the same settings.
#[derive(Clone, Copy, Debug, Default)]
pub struct BincodeSerializer;

impl BincodeSerializer {
	/// Same as `BincodeSerializer::default()`.
	pub fn new() -> Self {
		Self
	}

	fn config() -> Configuration {
		standard()
	}
}

impl<T> MessageSerializer<T> for BincodeSerializer
where T: Encode + Decode<()> + 'static
{
	type SerializeError = bincode::error::EncodeError;
	type DeserializeError = bincode::error::DecodeError;

	fn serialize(&self, data: &T) -> Result<Vec<u8>, Self::SerializeError> {
		bincode::encode_to_vec(data, Self::config())
	}

	/// Trailing bytes after a complete value are ignored.
	fn deserialize(&self, bytes: &[u8]) -> Result<T, Self::DeserializeError> {
		let (value, _read) = bincode::decode_from_slice(bytes, Self::config())?;
		Ok(value)
	}
}

/// Human-readable codec for serde types, enabled with the `json` feature.
#[cfg(feature = "json")]
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerializer;

#[cfg(feature = "json")]
impl<T> MessageSerializer<T> for JsonSerializer
where T: serde::Serialize + serde::de::DeserializeOwned + 'static
{
	type SerializeError = serde_json::Error;
	type DeserializeError = serde_json::Error;

	fn serialize(&self, data: &T) -> Result<Vec<u8>, Self::SerializeError> {
		serde_json::to_vec(data)
	}

	fn deserialize(&self, bytes: &[u8]) -> Result<T, Self::DeserializeError> {
		serde_json::from_slice(bytes)
	}
}

//! Storage of QoS 1/2 packets awaiting acknowledgment.

pub mod inflight_store;

use arcstr::ArcStr;
use bytes::Bytes;
use rumqttc::QoS;
use thiserror::Error;

pub use inflight_store::InflightStore;

/// Outgoing packet tracked between hand-off and acknowledgment
#[derive(Debug, Clone, PartialEq)]
pub struct InflightPacket {
	/// Protocol-assigned packet identifier
	pub pkid: u16,
	/// Topic the packet is published to, when known
	pub topic: Option<ArcStr>,
	/// Payload
	pub payload: Bytes,
	/// Publish QoS
	pub qos: QoS,
	/// Publish retain flag
	pub retain: bool,
}

/// Errors returned by a [`PacketStore`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
	/// No packet stored under the identifier
	#[error("Missing packet {pkid}")]
	MissingPacket {
		/// The requested identifier
		pkid: u16,
	},
	/// The store has been closed
	#[error("Packet store is closed")]
	Closed,
}

/// Session-store contract expected by the wire-level connection.
///
/// Mirrors the put/get/del/enumerate/close shape of an MQTT session store.
/// The contract is synchronous because implementations are in-memory.
pub trait PacketStore {
	/// Stores a packet, returning a packet evicted to make room for it.
	fn put(
		&mut self,
		packet: InflightPacket,
	) -> Result<Option<InflightPacket>, StoreError>;

	/// Looks a packet up by identifier.
	fn get(&self, pkid: u16) -> Result<&InflightPacket, StoreError>;

	/// Removes a packet by identifier.
	fn del(&mut self, pkid: u16) -> Result<InflightPacket, StoreError>;

	/// Enumerates every stored packet in insertion order.
	fn iter(&self) -> impl Iterator<Item = &InflightPacket>;

	/// Closes the store. Later operations fail with [`StoreError::Closed`].
	fn close(&mut self) -> Result<(), StoreError>;
}

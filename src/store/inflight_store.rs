use std::collections::HashMap;

use arcstr::ArcStr;
use tracing::debug;

use super::{InflightPacket, PacketStore, StoreError};

/// In-memory [`PacketStore`] keeping at most one packet per topic.
///
/// Storing a packet for a topic that already has one evicts the stale entry,
/// even when the packet identifiers differ. This bounds memory for topics
/// published faster than the broker acknowledges, at the cost of only the
/// newest value per topic surviving a reconnect: right for last-value and
/// telemetry topics, wrong where every message must be delivered.
#[derive(Debug, Default)]
pub struct InflightStore {
	packets: HashMap<u16, (u64, InflightPacket)>,
	by_topic: HashMap<ArcStr, u16>,
	next_seq: u64,
	closed: bool,
}

impl InflightStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.packets.len()
	}

	pub fn is_empty(&self) -> bool {
		self.packets.is_empty()
	}

	pub fn is_closed(&self) -> bool {
		self.closed
	}

	/// Identifier of the packet currently held for `topic`.
	pub fn pkid_for_topic(&self, topic: &str) -> Option<u16> {
		self.by_topic.get(topic).copied()
	}

	fn ensure_open(&self) -> Result<(), StoreError> {
		if self.closed {
			return Err(StoreError::Closed);
		}
		Ok(())
	}

	fn remove_entry(&mut self, pkid: u16) -> Option<InflightPacket> {
		let (_, packet) = self.packets.remove(&pkid)?;
		if let Some(topic) = &packet.topic {
			if self.by_topic.get(topic) == Some(&pkid) {
				self.by_topic.remove(topic);
			}
		}
		Some(packet)
	}
}

impl PacketStore for InflightStore {
	fn put(
		&mut self,
		packet: InflightPacket,
	) -> Result<Option<InflightPacket>, StoreError> {
		self.ensure_open()?;

		let stale_pkid = packet
			.topic
			.as_ref()
			.and_then(|topic| self.by_topic.get(topic).copied())
			.filter(|stale| *stale != packet.pkid);
		let evicted = stale_pkid.and_then(|stale| self.remove_entry(stale));
		if let Some(evicted) = &evicted {
			debug!(
				evicted_pkid = evicted.pkid,
				pkid = packet.pkid,
				topic = ?packet.topic,
				"Evicted stale inflight packet for topic"
			);
		}

		// Same identifier: plain overwrite
		self.remove_entry(packet.pkid);

		if let Some(topic) = &packet.topic {
			self.by_topic.insert(topic.clone(), packet.pkid);
		}
		let seq = self.next_seq;
		self.next_seq += 1;
		self.packets.insert(packet.pkid, (seq, packet));
		Ok(evicted)
	}

	fn get(&self, pkid: u16) -> Result<&InflightPacket, StoreError> {
		self.ensure_open()?;
		self.packets
			.get(&pkid)
			.map(|(_, packet)| packet)
			.ok_or(StoreError::MissingPacket { pkid })
	}

	fn del(&mut self, pkid: u16) -> Result<InflightPacket, StoreError> {
		self.ensure_open()?;
		self.remove_entry(pkid)
			.ok_or(StoreError::MissingPacket { pkid })
	}

	fn iter(&self) -> impl Iterator<Item = &InflightPacket> {
		let mut ordered: Vec<&(u64, InflightPacket)> =
			self.packets.values().collect();
		ordered.sort_by_key(|(seq, _)| *seq);
		ordered.into_iter().map(|(_, packet)| packet)
	}

	fn close(&mut self) -> Result<(), StoreError> {
		self.closed = true;
		self.packets.clear();
		self.by_topic.clear();
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use bytes::Bytes;
	use rumqttc::QoS;

	use super::*;

	fn packet(pkid: u16, topic: Option<&str>, payload: &'static str) -> InflightPacket {
		InflightPacket {
			pkid,
			topic: topic.map(ArcStr::from),
			payload: Bytes::from_static(payload.as_bytes()),
			qos: QoS::AtLeastOnce,
			retain: false,
		}
	}

	#[test]
	fn test_same_topic_keeps_only_newest() {
		let mut store = InflightStore::new();
		assert_eq!(store.put(packet(1, Some("t/a"), "old")), Ok(None));

		let evicted = store.put(packet(2, Some("t/a"), "new")).unwrap();
		assert_eq!(evicted.map(|p| p.pkid), Some(1));

		assert_eq!(store.len(), 1);
		assert_eq!(store.get(1), Err(StoreError::MissingPacket { pkid: 1 }));
		assert_eq!(store.get(2).unwrap().payload, Bytes::from_static(b"new"));
		assert_eq!(store.pkid_for_topic("t/a"), Some(2));
	}

	#[test]
	fn test_packets_without_topic_never_evict_by_topic() {
		let mut store = InflightStore::new();
		store.put(packet(1, Some("t/a"), "a")).unwrap();
		assert_eq!(store.put(packet(2, None, "x")), Ok(None));
		assert_eq!(store.put(packet(3, None, "y")), Ok(None));

		assert_eq!(store.len(), 3);
		assert_eq!(store.pkid_for_topic("t/a"), Some(1));
	}

	#[test]
	fn test_distinct_topics_coexist() {
		let mut store = InflightStore::new();
		store.put(packet(1, Some("t/a"), "a")).unwrap();
		store.put(packet(2, Some("t/b"), "b")).unwrap();

		assert_eq!(store.len(), 2);
	}

	#[test]
	fn test_same_pkid_overwrites_and_reindexes_topic() {
		let mut store = InflightStore::new();
		store.put(packet(5, Some("t/a"), "a")).unwrap();
		assert_eq!(store.put(packet(5, Some("t/b"), "b")), Ok(None));

		assert_eq!(store.len(), 1);
		assert_eq!(store.pkid_for_topic("t/a"), None);
		assert_eq!(store.pkid_for_topic("t/b"), Some(5));
	}

	#[test]
	fn test_del_removes_topic_index() {
		let mut store = InflightStore::new();
		store.put(packet(1, Some("t/a"), "a")).unwrap();

		assert_eq!(store.del(1).unwrap().pkid, 1);
		assert_eq!(store.del(1), Err(StoreError::MissingPacket { pkid: 1 }));
		assert_eq!(store.pkid_for_topic("t/a"), None);

		// A later packet for the topic evicts nothing
		assert_eq!(store.put(packet(2, Some("t/a"), "b")), Ok(None));
	}

	#[test]
	fn test_iter_follows_insertion_order() {
		let mut store = InflightStore::new();
		for (pkid, topic) in [(9, "x"), (3, "y"), (7, "z")] {
			store.put(packet(pkid, Some(topic), "p")).unwrap();
		}
		store.put(packet(4, Some("x"), "p")).unwrap();

		let order: Vec<u16> = store.iter().map(|p| p.pkid).collect();
		assert_eq!(order, vec![3, 7, 4]);
	}

	#[test]
	fn test_closed_store_rejects_operations() {
		let mut store = InflightStore::new();
		store.put(packet(1, Some("t/a"), "a")).unwrap();
		store.close().unwrap();

		assert!(store.is_closed());
		assert_eq!(store.put(packet(2, None, "b")), Err(StoreError::Closed));
		assert_eq!(store.get(1), Err(StoreError::Closed));
		assert_eq!(store.del(1), Err(StoreError::Closed));
		assert_eq!(store.iter().count(), 0);
	}
}

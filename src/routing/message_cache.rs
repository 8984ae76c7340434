use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::message::Message;
use crate::topic::{TopicError, TopicTrie};

/// Extra delay added to each sweep deadline so the oldest entry is
/// strictly past the window when the sweep runs.
pub const SWEEP_GRACE: Duration = Duration::from_secs(1);

/// How long received messages stay available for replay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Retention {
	/// Nothing is cached
	#[default]
	Disabled,
	/// Messages are kept until overwritten
	Forever,
	/// Messages older than the window are swept
	Window(Duration),
}

impl Retention {
	pub fn is_enabled(&self) -> bool {
		!matches!(self, Retention::Disabled)
	}
}

/// Last message seen on a concrete topic
#[derive(Debug, Clone)]
pub struct CachedMessage {
	pub message: Message,
	pub created: Instant,
}

/// Most recent message per concrete topic, replayed to new subscribers.
///
/// Entries live in a [`TopicTrie`] keyed by concrete topics, so a new
/// subscription's filter finds every stored topic it covers. A single
/// sweep deadline is kept; it is armed by the first [`record`] while no
/// sweep is scheduled and re-armed by each [`sweep`] from the oldest
/// remaining entry.
///
/// [`record`]: MessageCache::record
/// [`sweep`]: MessageCache::sweep
#[derive(Debug)]
pub struct MessageCache {
	trie: TopicTrie<CachedMessage>,
	retention: Retention,
	next_sweep: Option<Instant>,
}

impl MessageCache {
	pub fn new(retention: Retention) -> Self {
		Self {
			trie: TopicTrie::for_topics(),
			retention,
			next_sweep: None,
		}
	}

	pub fn retention(&self) -> Retention {
		self.retention
	}

	pub fn len(&self) -> usize {
		self.trie.len()
	}

	pub fn is_empty(&self) -> bool {
		self.trie.is_empty()
	}

	/// Deadline of the pending sweep, if one is scheduled.
	pub fn next_sweep(&self) -> Option<Instant> {
		self.next_sweep
	}

	/// Stores `message` as the latest one for its topic.
	///
	/// Returns the sweep deadline when this call armed it.
	pub fn record(
		&mut self,
		message: Message,
		now: Instant,
	) -> Result<Option<Instant>, TopicError> {
		let window = match self.retention {
			| Retention::Disabled => return Ok(None),
			| Retention::Forever => None,
			| Retention::Window(window) => Some(window),
		};
		let topic = message.topic.clone();
		self.trie.set_value(
			&topic,
			CachedMessage {
				message,
				created: now,
			},
		)?;

		match window {
			| Some(window) if self.next_sweep.is_none() => {
				let deadline = now + window + SWEEP_GRACE;
				self.next_sweep = Some(deadline);
				debug!(topic = %topic, window = ?window, "Cache sweep armed");
				Ok(Some(deadline))
			}
			| _ => Ok(None),
		}
	}

	/// Removes entries older than the retention window and schedules the
	/// next sweep from the oldest survivor. Returns `None` once the cache
	/// is empty; the next [`record`](MessageCache::record) re-arms it.
	pub fn sweep(&mut self, now: Instant) -> Option<Instant> {
		let Retention::Window(window) = self.retention else {
			self.next_sweep = None;
			return None;
		};
		let removed = self
			.trie
			.delete_by_filter(|cached| now.duration_since(cached.created) > window);
		self.next_sweep = self
			.trie
			.all_values()
			.map(|cached| cached.created)
			.min()
			.map(|oldest| oldest + window + SWEEP_GRACE);
		debug!(
			removed,
			remaining = self.trie.len(),
			next_sweep = ?self.next_sweep,
			"Cache swept"
		);
		self.next_sweep
	}

	/// Cached messages whose topic matches `filter`.
	pub fn lookup(&self, filter: &str) -> Result<Vec<Message>, TopicError> {
		if !self.retention.is_enabled() {
			return Ok(Vec::new());
		}
		Ok(self
			.trie
			.find_values(filter)?
			.map(|cached| cached.message.clone())
			.collect())
	}

	/// Cached entry for exactly `topic`.
	pub fn get(&self, topic: &str) -> Option<&CachedMessage> {
		self.trie.get_value(topic)
	}

	pub fn clear(&mut self) {
		self.trie.clear();
		self.next_sweep = None;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn at(start: Instant, millis: u64) -> Instant {
		start + Duration::from_millis(millis)
	}

	#[test]
	fn test_window_retention_expires_after_window() {
		let t0 = Instant::now();
		let mut cache = MessageCache::new(Retention::Window(
			Duration::from_secs(5),
		));

		let deadline = cache.record(Message::new("s/t", "21"), t0).unwrap();
		assert_eq!(deadline, Some(at(t0, 6000)));

		cache.sweep(at(t0, 4900));
		assert!(cache.get("s/t").is_some());

		assert_eq!(cache.sweep(at(t0, 5100)), None);
		assert!(cache.get("s/t").is_none());
		assert!(cache.is_empty());
	}

	#[test]
	fn test_forever_retention_never_expires() {
		let t0 = Instant::now();
		let mut cache = MessageCache::new(Retention::Forever);

		assert_eq!(cache.record(Message::new("s/t", "21"), t0).unwrap(), None);
		assert_eq!(cache.sweep(at(t0, 1_000_000)), None);
		assert!(cache.get("s/t").is_some());
		assert_eq!(cache.next_sweep(), None);
	}

	#[test]
	fn test_disabled_cache_stores_nothing() {
		let t0 = Instant::now();
		let mut cache = MessageCache::new(Retention::Disabled);

		assert_eq!(cache.record(Message::new("s/t", "21"), t0).unwrap(), None);
		assert!(cache.is_empty());
		assert!(cache.lookup("#").unwrap().is_empty());
	}

	#[test]
	fn test_sweep_reschedules_from_oldest_survivor() {
		let t0 = Instant::now();
		let mut cache = MessageCache::new(Retention::Window(
			Duration::from_secs(5),
		));

		cache.record(Message::new("a", "1"), t0).unwrap();
		// Already armed, so later records do not return a deadline
		assert_eq!(
			cache.record(Message::new("b", "2"), at(t0, 3000)).unwrap(),
			None
		);

		let next = cache.sweep(at(t0, 6000));
		assert!(cache.get("a").is_none());
		assert!(cache.get("b").is_some());
		assert_eq!(next, Some(at(t0, 9000)));
		assert_eq!(cache.next_sweep(), next);

		assert_eq!(cache.sweep(at(t0, 9000)), None);
		assert!(cache.is_empty());

		// Drained: the next record re-arms
		let rearmed = cache.record(Message::new("c", "3"), at(t0, 10_000));
		assert_eq!(rearmed.unwrap(), Some(at(t0, 16_000)));
	}

	#[test]
	fn test_record_overwrites_per_topic() {
		let t0 = Instant::now();
		let mut cache = MessageCache::new(Retention::Forever);
		cache.record(Message::new("a", "old"), t0).unwrap();
		cache.record(Message::new("a", "new"), at(t0, 10)).unwrap();

		assert_eq!(cache.len(), 1);
		assert_eq!(cache.get("a").unwrap().message.payload, "new".as_bytes());
	}

	#[test]
	fn test_lookup_by_filter() {
		let t0 = Instant::now();
		let mut cache = MessageCache::new(Retention::Forever);
		for topic in ["home/kitchen/temp", "home/hall/temp", "office/temp"] {
			cache.record(Message::new(topic, "v"), t0).unwrap();
		}

		let mut topics: Vec<String> = cache
			.lookup("home/+/temp")
			.unwrap()
			.into_iter()
			.map(|m| m.topic.to_string())
			.collect();
		topics.sort();
		assert_eq!(topics, ["home/hall/temp", "home/kitchen/temp"]);

		assert_eq!(cache.lookup("#").unwrap().len(), 3);
		assert_eq!(cache.lookup("office/temp").unwrap().len(), 1);
		assert!(cache.lookup("a/#/b").is_err());
	}

	#[test]
	fn test_wildcard_topic_is_not_cached() {
		let mut cache = MessageCache::new(Retention::Forever);
		assert!(cache.record(Message::new("a/+", "v"), Instant::now()).is_err());
		assert!(cache.is_empty());
	}
}

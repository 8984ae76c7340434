use std::collections::HashMap;
use std::fmt;

use arcstr::ArcStr;
use rumqttc::QoS;
use smallvec::SmallVec;
use tracing::debug;

use super::error::TopicRouterError;
use super::sink::{Delivery, MessageSink, deliver_isolated};
use crate::message::{Message, qos_level};
use crate::topic::{TopicError, TopicTrie, validation};

/// A subscription identifier.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone, PartialOrd, Ord)]
pub struct SubscriptionId(usize);

impl SubscriptionId {
	pub(crate) fn from_raw(raw: usize) -> Self {
		Self(raw)
	}
}

impl fmt::Display for SubscriptionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

#[derive(Debug)]
struct SubscriberEntry<S> {
	id: SubscriptionId,
	qos: QoS,
	sink: S,
}

/// Every subscriber of one exact subscription topic.
#[derive(Debug)]
pub struct SubscriberList<S> {
	topic: ArcStr,
	max_qos: QoS,
	entries: Vec<SubscriberEntry<S>>,
}

impl<S> SubscriberList<S> {
	fn new(topic: ArcStr, qos: QoS) -> Self {
		Self {
			topic,
			max_qos: qos,
			entries: Vec::new(),
		}
	}

	pub fn topic(&self) -> &ArcStr {
		&self.topic
	}

	/// Highest QoS ever requested while this list has been alive.
	pub fn max_qos(&self) -> QoS {
		self.max_qos
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	// Returns the new max QoS when it rose.
	fn add(&mut self, id: SubscriptionId, qos: QoS, sink: S) -> Option<QoS> {
		self.entries.push(SubscriberEntry { id, qos, sink });
		if qos_level(qos) > qos_level(self.max_qos) {
			self.max_qos = qos;
			return Some(qos);
		}
		None
	}

	fn remove(&mut self, id: SubscriptionId) -> bool {
		let before = self.entries.len();
		self.entries.retain(|entry| entry.id != id);
		before != self.entries.len()
	}
}

/// Result of [`SubscriberRegistry::subscribe`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOutcome {
	/// Identity of the new subscription
	pub id: SubscriptionId,
	/// Subscription topic, possibly with wildcards
	pub topic: ArcStr,
	/// QoS to issue a wire-level SUBSCRIBE with, when one is needed
	pub wire_subscribe: Option<QoS>,
}

/// Result of [`SubscriberRegistry::unsubscribe`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribeOutcome {
	/// Removed subscription
	pub id: SubscriptionId,
	/// Its topic
	pub topic: ArcStr,
	/// True when the topic has no subscribers left and must be
	/// unsubscribed on the wire
	pub wire_unsubscribe: bool,
}

/// Summary of one [`SubscriberRegistry::dispatch`] call
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
	/// Number of sinks that accepted the message
	pub delivered: usize,
	/// Number of sinks that dropped the message
	pub dropped: usize,
	/// Subscriptions whose sinks are gone
	pub closed: Vec<SubscriptionId>,
}

/// Multiplexes any number of logical subscribers onto one wire-level
/// subscription per distinct topic.
///
/// Subscription topics live in a wildcard-tolerant [`TopicTrie`] so an
/// incoming concrete topic finds every matching list in one traversal.
/// Each list tracks the strictest QoS requested for its topic; the QoS is
/// raised when a stricter subscriber joins and never lowered while the list
/// lives, so the broker-side subscription never downgrades under an active
/// subscriber.
pub struct SubscriberRegistry<S> {
	trie: TopicTrie<SubscriberList<S>>,
	topics: HashMap<SubscriptionId, ArcStr>,
	next_id: usize,
}

impl<S> Default for SubscriberRegistry<S> {
	fn default() -> Self {
		Self::new()
	}
}

impl<S> SubscriberRegistry<S> {
	pub fn new() -> Self {
		Self {
			trie: TopicTrie::for_filters(),
			topics: HashMap::new(),
			next_id: 0,
		}
	}

	/// Registers `sink` for `topic` at `qos`.
	///
	/// A wire-level SUBSCRIBE is requested for the first subscriber of a
	/// topic and whenever a subscriber raises the topic's QoS.
	pub fn subscribe(
		&mut self,
		topic: impl Into<ArcStr>,
		qos: QoS,
		sink: S,
	) -> Result<SubscribeOutcome, TopicRouterError> {
		let topic = topic.into();
		validation::validate_topic_filter(&topic)?;

		let id = SubscriptionId(self.next_id);
		self.next_id = self.next_id.wrapping_add(1);

		let wire_subscribe = match self.trie.get_value_mut(&topic) {
			| Some(list) => list.add(id, qos, sink),
			| None => {
				let mut list = SubscriberList::new(topic.clone(), qos);
				list.add(id, qos, sink);
				self.trie.set_value(&topic, list)?;
				Some(qos)
			}
		};
		self.topics.insert(id, topic.clone());

		debug!(
			subscription_id = ?id,
			topic = %topic,
			qos = ?qos,
			wire_subscribe = ?wire_subscribe,
			"Subscriber registered"
		);
		Ok(SubscribeOutcome {
			id,
			topic,
			wire_subscribe,
		})
	}

	/// Removes one subscription. Unknown ids are ignored and yield `None`.
	pub fn unsubscribe(
		&mut self,
		id: SubscriptionId,
	) -> Result<Option<UnsubscribeOutcome>, TopicRouterError> {
		let Some(topic) = self.topics.remove(&id) else {
			return Ok(None);
		};
		let list = self.trie.get_value_mut(&topic).ok_or_else(|| {
			TopicRouterError::internal_state_corrupted(format!(
				"subscription {id} indexed under '{topic}' but no list exists"
			))
		})?;
		if !list.remove(id) {
			return Err(TopicRouterError::internal_state_corrupted(format!(
				"subscription {id} missing from list '{topic}'"
			)));
		}
		let wire_unsubscribe = list.is_empty();
		if wire_unsubscribe {
			self.trie.delete_value(&topic);
		}
		debug!(
			subscription_id = ?id,
			topic = %topic,
			wire_unsubscribe,
			"Subscriber removed"
		);
		Ok(Some(UnsubscribeOutcome {
			id,
			topic,
			wire_unsubscribe,
		}))
	}

	/// Topic and max QoS of every live list, for re-subscription after a
	/// reconnect.
	pub fn topics_for_resubscribe(&self) -> Vec<(ArcStr, QoS)> {
		self.trie
			.all_values()
			.map(|list| (list.topic.clone(), list.max_qos))
			.collect()
	}

	/// Subscription topic of `id`, if still registered.
	pub fn topic_of(&self, id: SubscriptionId) -> Option<&ArcStr> {
		self.topics.get(&id)
	}

	/// Subscriber list registered for exactly `topic`.
	pub fn list(&self, topic: &str) -> Option<&SubscriberList<S>> {
		self.trie.get_value(topic)
	}

	/// Number of live subscriptions.
	pub fn len(&self) -> usize {
		self.topics.len()
	}

	pub fn is_empty(&self) -> bool {
		self.topics.is_empty()
	}

	/// Number of distinct subscription topics.
	pub fn topic_count(&self) -> usize {
		self.trie.len()
	}

	/// Drops every subscription. Dropping the sinks closes subscriber
	/// channels.
	pub fn clear(&mut self) {
		self.trie.clear();
		self.topics.clear();
	}
}

impl<S: MessageSink> SubscriberRegistry<S> {
	/// Delivers an independent copy of `message` to every subscriber whose
	/// topic matches `message.topic`.
	///
	/// Matching sinks are snapshotted before any delivery. A failing sink
	/// never prevents delivery to the rest.
	pub fn dispatch(
		&self,
		message: &Message,
	) -> Result<DispatchReport, TopicError> {
		let targets: SmallVec<[(SubscriptionId, S); 8]> = self
			.trie
			.find_values(&message.topic)?
			.flat_map(|list| list.entries.iter())
			.map(|entry| (entry.id, entry.sink.clone()))
			.collect();

		let mut report = DispatchReport::default();
		for (id, sink) in targets {
			match deliver_isolated(&sink, id, message.clone()) {
				| Delivery::Delivered => report.delivered += 1,
				| Delivery::Dropped => report.dropped += 1,
				| Delivery::Closed => report.closed.push(id),
			}
		}
		Ok(report)
	}

	/// Subscriptions whose sinks report closed.
	pub fn closed_subscriptions(&self) -> Vec<SubscriptionId> {
		self.trie
			.all_values()
			.flat_map(|list| list.entries.iter())
			.filter(|entry| entry.sink.is_closed())
			.map(|entry| entry.id)
			.collect()
	}

	/// QoS requested by one subscription.
	pub fn qos_of(&self, id: SubscriptionId) -> Option<QoS> {
		let topic = self.topics.get(&id)?;
		self.trie
			.get_value(topic)?
			.entries
			.iter()
			.find(|entry| entry.id == id)
			.map(|entry| entry.qos)
	}
}

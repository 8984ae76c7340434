//! Level-keyed trie over MQTT topics.
//!
//! One container serves both directions of MQTT wildcard matching, selected
//! by [`TrieMode`] when the trie is built:
//!
//! * [`TrieMode::WildcardsOnInsert`]: stored paths are subscription filters
//!   (`sensors/+/temp`, `home/#`), searches use concrete topic names. Used by
//!   the subscriber registry.
//! * [`TrieMode::ConcreteOnInsert`]: stored paths are concrete topic names,
//!   searches may use filters. Used by the message cache to replay recent
//!   messages to a new wildcard subscriber.
//!
//! Insertion and search are never both wildcarded in one trie instance.

use std::collections::HashMap;

use arcstr::ArcStr;
use smallvec::SmallVec;

use super::error::TopicError;
use super::validation;
use super::{LEVEL_SEPARATOR, MULTI_LEVEL_WILDCARD, SINGLE_LEVEL_WILDCARD};

type Levels<'a> = SmallVec<[&'a str; 8]>;

fn split_levels(topic: &str) -> Levels<'_> {
	topic.split(LEVEL_SEPARATOR).collect()
}

/// Which side of the trie may carry wildcards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrieMode {
	/// Stored paths may be filters; searches must be concrete topic names
	WildcardsOnInsert,
	/// Stored paths must be concrete; searches may be filters
	ConcreteOnInsert,
}

#[derive(Debug)]
struct TrieNode<V> {
	value: Option<V>,
	children: HashMap<ArcStr, TrieNode<V>>,
}

impl<V> TrieNode<V> {
	fn new() -> Self {
		Self {
			value: None,
			children: HashMap::new(),
		}
	}

	fn is_empty(&self) -> bool {
		self.value.is_none() && self.children.is_empty()
	}

	fn insert(&mut self, levels: &[&str], value: V) -> Option<V> {
		let mut current = self;
		for level in levels {
			current = current
				.children
				.entry(ArcStr::from(*level))
				.or_insert_with(TrieNode::new);
		}
		current.value.replace(value)
	}

	fn node(&self, levels: &[&str]) -> Option<&TrieNode<V>> {
		let mut current = self;
		for level in levels {
			current = current.children.get(*level)?;
		}
		Some(current)
	}

	fn node_mut(&mut self, levels: &[&str]) -> Option<&mut TrieNode<V>> {
		let mut current = self;
		for level in levels {
			current = current.children.get_mut(*level)?;
		}
		Some(current)
	}

	/// Removes the value at `levels`, dropping every node left empty on the
	/// way back up.
	fn remove(&mut self, levels: &[&str]) -> Option<V> {
		match levels {
			| [] => self.value.take(),
			| [level, rest @ ..] => {
				let child = self.children.get_mut(*level)?;
				let removed = child.remove(rest);
				if child.is_empty() {
					self.children.remove(*level);
				}
				removed
			}
		}
	}

	#[cfg(test)]
	fn descendant_count(&self) -> usize {
		self.children
			.values()
			.map(|child| 1 + child.descendant_count())
			.sum()
	}

	fn remove_matching<F>(&mut self, predicate: &mut F) -> usize
	where F: FnMut(&V) -> bool {
		let mut removed = 0;
		if self.value.as_ref().is_some_and(|value| predicate(value)) {
			self.value = None;
			removed += 1;
		}
		self.children.retain(|_, child| {
			removed += child.remove_matching(predicate);
			!child.is_empty()
		});
		removed
	}
}

/// Generic map from MQTT topic paths to values.
///
/// Nodes are created lazily on insert and pruned together with their empty
/// ancestors on removal, so memory stays proportional to the live topic set.
#[derive(Debug)]
pub struct TopicTrie<V> {
	root: TrieNode<V>,
	mode: TrieMode,
	len: usize,
}

impl<V> TopicTrie<V> {
	/// Creates an empty trie in the given mode.
	pub fn new(mode: TrieMode) -> Self {
		Self {
			root: TrieNode::new(),
			mode,
			len: 0,
		}
	}

	/// Trie storing subscription filters, searched by topic name.
	pub fn for_filters() -> Self {
		Self::new(TrieMode::WildcardsOnInsert)
	}

	/// Trie storing topic names, searched by subscription filter.
	pub fn for_topics() -> Self {
		Self::new(TrieMode::ConcreteOnInsert)
	}

	pub fn mode(&self) -> TrieMode {
		self.mode
	}

	/// Number of stored values.
	pub fn len(&self) -> usize {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	/// Inserts or overwrites the value stored at `topic`.
	///
	/// An empty topic is ignored. Wildcard levels are accepted only in
	/// [`TrieMode::WildcardsOnInsert`] and `#` only as the final level.
	pub fn set_value(&mut self, topic: &str, value: V) -> Result<(), TopicError> {
		if topic.is_empty() {
			return Ok(());
		}
		match self.mode {
			| TrieMode::WildcardsOnInsert => {
				validation::validate_topic_filter(topic)?
			}
			| TrieMode::ConcreteOnInsert => {
				validation::validate_topic_name(topic)?
			}
		}
		if self.root.insert(&split_levels(topic), value).is_none() {
			self.len += 1;
		}
		Ok(())
	}

	/// Exact-path lookup. Wildcard levels are compared literally.
	pub fn get_value(&self, topic: &str) -> Option<&V> {
		if topic.is_empty() {
			return None;
		}
		self.root.node(&split_levels(topic))?.value.as_ref()
	}

	/// Exact-path mutable lookup.
	pub fn get_value_mut(&mut self, topic: &str) -> Option<&mut V> {
		if topic.is_empty() {
			return None;
		}
		self.root.node_mut(&split_levels(topic))?.value.as_mut()
	}

	/// Removes and returns the value stored at exactly `topic`.
	pub fn delete_value(&mut self, topic: &str) -> Option<V> {
		if topic.is_empty() {
			return None;
		}
		let removed = self.root.remove(&split_levels(topic));
		if removed.is_some() {
			self.len -= 1;
		}
		removed
	}

	/// Lazily yields every value whose path matches `topic` under MQTT rules.
	///
	/// In [`TrieMode::WildcardsOnInsert`] the search topic must be a concrete
	/// topic name; stored `+` levels match any single level and a stored `#`
	/// matches its parent level and everything beneath. Values are yielded
	/// for the concrete branch first, then the `+` branch, then `#`.
	///
	/// In [`TrieMode::ConcreteOnInsert`] the search topic is a filter and the
	/// stored topics are matched against it.
	pub fn find_values<'a>(
		&'a self,
		topic: &'a str,
	) -> Result<FindValues<'a, V>, TopicError> {
		match self.mode {
			| TrieMode::WildcardsOnInsert => {
				validation::validate_topic_name(topic)?
			}
			| TrieMode::ConcreteOnInsert => {
				validation::validate_topic_filter(topic)?
			}
		}
		Ok(FindValues {
			levels: split_levels(topic),
			mode: self.mode,
			stack: vec![MatchFrame::Visit {
				node: &self.root,
				depth: 0,
			}],
		})
	}

	/// Lazy pre-order traversal of every stored value. Each call starts a
	/// fresh traversal.
	pub fn all_values(&self) -> AllValues<'_, V> {
		AllValues {
			stack: vec![&self.root],
		}
	}

	/// Removes every value matching `predicate` and prunes emptied branches.
	/// Returns the number of removed values.
	pub fn delete_by_filter<F>(&mut self, mut predicate: F) -> usize
	where F: FnMut(&V) -> bool {
		let removed = self.root.remove_matching(&mut predicate);
		self.len -= removed;
		removed
	}

	/// Drops every stored value.
	pub fn clear(&mut self) {
		self.root = TrieNode::new();
		self.len = 0;
	}

	#[cfg(test)]
	// Number of allocated nodes below the root, used to check pruning.
	pub(crate) fn node_count(&self) -> usize {
		self.root.descendant_count()
	}
}

enum MatchFrame<'a, V> {
	Visit { node: &'a TrieNode<V>, depth: usize },
	Subtree(&'a TrieNode<V>),
	Emit(&'a V),
}

/// Iterator returned by [`TopicTrie::find_values`].
pub struct FindValues<'a, V> {
	levels: Levels<'a>,
	mode: TrieMode,
	stack: Vec<MatchFrame<'a, V>>,
}

impl<'a, V> FindValues<'a, V> {
	// Frames are pushed in reverse of the order they should be yielded.
	fn expand_stored_filters(&mut self, node: &'a TrieNode<V>, depth: usize) {
		let hash_value = node
			.children
			.get(MULTI_LEVEL_WILDCARD)
			.and_then(|hash| hash.value.as_ref());

		let Some(level) = self.levels.get(depth).copied() else {
			// `a/#` also matches `a`
			if let Some(value) = hash_value {
				self.stack.push(MatchFrame::Emit(value));
			}
			if let Some(value) = &node.value {
				self.stack.push(MatchFrame::Emit(value));
			}
			return;
		};

		if let Some(value) = hash_value {
			self.stack.push(MatchFrame::Emit(value));
		}
		if let Some(plus) = node.children.get(SINGLE_LEVEL_WILDCARD) {
			self.stack.push(MatchFrame::Visit {
				node: plus,
				depth: depth + 1,
			});
		}
		if let Some(exact) = node.children.get(level) {
			self.stack.push(MatchFrame::Visit {
				node: exact,
				depth: depth + 1,
			});
		}
	}

	fn expand_search_filter(&mut self, node: &'a TrieNode<V>, depth: usize) {
		match self.levels.get(depth).copied() {
			| None => {
				if let Some(value) = &node.value {
					self.stack.push(MatchFrame::Emit(value));
				}
			}
			| Some(MULTI_LEVEL_WILDCARD) => {
				self.stack.push(MatchFrame::Subtree(node));
			}
			| Some(SINGLE_LEVEL_WILDCARD) => {
				for child in node.children.values() {
					self.stack.push(MatchFrame::Visit {
						node: child,
						depth: depth + 1,
					});
				}
			}
			| Some(level) => {
				if let Some(child) = node.children.get(level) {
					self.stack.push(MatchFrame::Visit {
						node: child,
						depth: depth + 1,
					});
				}
			}
		}
	}
}

impl<'a, V> Iterator for FindValues<'a, V> {
	type Item = &'a V;

	fn next(&mut self) -> Option<Self::Item> {
		while let Some(frame) = self.stack.pop() {
			match frame {
				| MatchFrame::Emit(value) => return Some(value),
				| MatchFrame::Subtree(node) => {
					self.stack
						.extend(node.children.values().map(MatchFrame::Subtree));
					if let Some(value) = &node.value {
						return Some(value);
					}
				}
				| MatchFrame::Visit { node, depth } => match self.mode {
					| TrieMode::WildcardsOnInsert => {
						self.expand_stored_filters(node, depth)
					}
					| TrieMode::ConcreteOnInsert => {
						self.expand_search_filter(node, depth)
					}
				},
			}
		}
		None
	}
}

/// Iterator returned by [`TopicTrie::all_values`].
pub struct AllValues<'a, V> {
	stack: Vec<&'a TrieNode<V>>,
}

impl<'a, V> Iterator for AllValues<'a, V> {
	type Item = &'a V;

	fn next(&mut self) -> Option<Self::Item> {
		while let Some(node) = self.stack.pop() {
			self.stack.extend(node.children.values());
			if let Some(value) = &node.value {
				return Some(value);
			}
		}
		None
	}
}

//! Error type, limits and validation helpers for the topic module

use thiserror::Error;

/// Errors raised while validating or matching topics
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopicError {
	/// Topic is empty
	#[error("Topic cannot be empty")]
	EmptyTopic,

	/// Wildcards are not allowed in this position
	#[error("Topic '{topic}' must not contain wildcards ('+' or '#')")]
	WildcardNotAllowed {
		/// The rejected topic
		topic: String,
	},

	/// Multi-level wildcard used anywhere but the final level
	#[error(
		"Invalid topic filter '{topic}': # wildcard can only be the last \
		 level"
	)]
	HashPosition {
		/// The rejected filter
		topic: String,
	},

	/// Wildcard character mixed with other characters inside one level
	#[error("Invalid wildcard usage in level '{level}' at position {position}")]
	WildcardUsage {
		/// The offending level
		level: String,
		/// Zero-based level index
		position: usize,
	},

	/// Topic contains a NUL character
	#[error("Topic '{topic}' contains a null character")]
	NullCharacter {
		/// The rejected topic
		topic: String,
	},

	/// Topic exceeds the MQTT length limit
	#[error("Topic is too long: {len} > {max} bytes")]
	TooLong {
		/// Actual length in bytes
		len: usize,
		/// Allowed maximum
		max: usize,
	},
}

impl TopicError {
	/// Creates a new WildcardNotAllowed error
	pub fn wildcard_not_allowed(topic: impl Into<String>) -> Self {
		Self::WildcardNotAllowed {
			topic: topic.into(),
		}
	}

	/// Creates a new HashPosition error
	pub fn hash_position(topic: impl Into<String>) -> Self {
		Self::HashPosition {
			topic: topic.into(),
		}
	}

	/// Creates a new WildcardUsage error
	pub fn wildcard_usage(level: impl Into<String>, position: usize) -> Self {
		Self::WildcardUsage {
			level: level.into(),
			position,
		}
	}

	/// Creates a new NullCharacter error
	pub fn null_character(topic: impl Into<String>) -> Self {
		Self::NullCharacter {
			topic: topic.into(),
		}
	}
}

/// Convenient Result type for topic operations
pub type TopicResult<T> = Result<T, TopicError>;

/// Topic limits imposed by the MQTT protocol
pub mod limits {
	/// Maximum encoded length of a topic name or filter
	pub const MAX_TOPIC_LENGTH: usize = 65_535;
}

/// Validation utilities for topic names (publish side) and topic filters
/// (subscribe side)
pub mod validation {
	use super::TopicError;
	use super::limits::MAX_TOPIC_LENGTH;
	use crate::topic::{
		LEVEL_SEPARATOR, MULTI_LEVEL_WILDCARD, SINGLE_LEVEL_WILDCARD,
	};

	fn validate_common(topic: &str) -> Result<(), TopicError> {
		if topic.is_empty() {
			return Err(TopicError::EmptyTopic);
		}
		if topic.len() > MAX_TOPIC_LENGTH {
			return Err(TopicError::TooLong {
				len: topic.len(),
				max: MAX_TOPIC_LENGTH,
			});
		}
		if topic.contains('\0') {
			return Err(TopicError::null_character(topic));
		}
		Ok(())
	}

	/// Validates a concrete topic name as used by PUBLISH and by incoming
	/// messages. Wildcards are rejected.
	pub fn validate_topic_name(topic: &str) -> Result<(), TopicError> {
		validate_common(topic)?;
		if has_wildcards(topic) {
			return Err(TopicError::wildcard_not_allowed(topic));
		}
		Ok(())
	}

	/// Validates a subscription filter: `+` must occupy a whole level, `#`
	/// must occupy the whole final level.
	pub fn validate_topic_filter(filter: &str) -> Result<(), TopicError> {
		validate_common(filter)?;
		let level_count = filter.split(LEVEL_SEPARATOR).count();
		for (position, level) in filter.split(LEVEL_SEPARATOR).enumerate() {
			match level {
				| SINGLE_LEVEL_WILDCARD => {}
				| MULTI_LEVEL_WILDCARD if position + 1 == level_count => {}
				| MULTI_LEVEL_WILDCARD => {
					return Err(TopicError::hash_position(filter));
				}
				| _ if has_wildcards(level) => {
					return Err(TopicError::wildcard_usage(level, position));
				}
				| _ => {}
			}
		}
		Ok(())
	}

	/// Returns true if the topic carries any wildcard character.
	pub fn has_wildcards(topic: &str) -> bool {
		topic.contains(['+', '#'])
	}
}

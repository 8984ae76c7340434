//! Topic handling module
//!
//! Validation of MQTT topic names and filters, and the level-keyed
//! [`TopicTrie`] used for both subscription routing and the message cache.

pub mod error;
pub mod topic_trie;

#[cfg(test)]
mod topic_trie_tests;

pub use error::{TopicError, TopicResult, limits, validation};
pub use topic_trie::{AllValues, FindValues, TopicTrie, TrieMode};

/// Separator between topic levels.
pub const LEVEL_SEPARATOR: char = '/';
/// Single-level wildcard.
pub const SINGLE_LEVEL_WILDCARD: &str = "+";
/// Multi-level wildcard, only valid as the final level.
pub const MULTI_LEVEL_WILDCARD: &str = "#";

use std::collections::HashSet;

use super::{TopicError, TopicTrie, TrieMode};

// Builds a filter trie from (pattern, id) pairs and checks which ids every
// topic matches.
fn check_filter_matches(
	subscriptions: &[(&str, usize)],
	expected_matches: &[(&str, Vec<usize>)],
) {
	let mut trie = TopicTrie::for_filters();
	for (pattern, id) in subscriptions {
		trie.set_value(pattern, *id).unwrap();
	}

	for (topic, expected_ids) in expected_matches {
		let matched: Vec<usize> =
			trie.find_values(topic).unwrap().copied().collect();
		let unique: HashSet<usize> = matched.iter().copied().collect();
		assert_eq!(
			matched.len(),
			unique.len(),
			"Topic '{topic}' yielded duplicates: {matched:?}"
		);
		let expected: HashSet<usize> = expected_ids.iter().copied().collect();
		assert_eq!(
			unique, expected,
			"Topic '{topic}' matched {unique:?}, expected {expected:?}"
		);
	}
}

#[test]
fn test_exact_matches() {
	let subscriptions = [
		("sensors/temperature", 1),
		("sensors/humidity", 2),
		("devices/light/status", 3),
	];

	let expected_matches = [
		("sensors/temperature", vec![1]),
		("sensors/humidity", vec![2]),
		("devices/light/status", vec![3]),
		("sensors/pressure", vec![]),
		("sensors", vec![]),
		("devices/light/status/extra", vec![]),
	];

	check_filter_matches(&subscriptions, &expected_matches);
}

#[test]
fn test_plus_wildcards() {
	let subscriptions = [("A/+/C", 1), ("devices/+/+/state", 2), ("home/+", 3)];

	let expected_matches = [
		("A/B/C", vec![1]),
		("A/B/B/C", vec![]),
		("A/C", vec![]),
		("devices/light/kitchen/state", vec![2]),
		("devices/light/state", vec![]),
		("home/kitchen", vec![3]),
		("home/kitchen/temperature", vec![]),
		("home/", vec![3]),
	];

	check_filter_matches(&subscriptions, &expected_matches);
}

#[test]
fn test_hash_wildcards() {
	let subscriptions = [("A/#", 1), ("home/livingroom/#", 2)];

	let expected_matches = [
		("A", vec![1]),
		("A/B", vec![1]),
		("A/B/C", vec![1]),
		("B", vec![]),
		("home/livingroom", vec![2]),
		("home/livingroom/light/1", vec![2]),
		("home", vec![]),
	];

	check_filter_matches(&subscriptions, &expected_matches);
}

#[test]
fn test_root_hash_matches_everything() {
	let subscriptions = [("#", 7)];

	let expected_matches = [
		("a", vec![7]),
		("a/b/c", vec![7]),
		("/leading/slash", vec![7]),
		("$SYS/broker/load", vec![7]),
	];

	check_filter_matches(&subscriptions, &expected_matches);
}

#[test]
fn test_complex_subscriptions() {
	let subscriptions = [
		("home/kitchen/temperature", 1),
		("home/+/temperature", 2),
		("home/kitchen/+", 3),
		("home/#", 4),
		("+/kitchen/#", 5),
		("+/+/+", 6),
	];

	let expected_matches = [
		("home/kitchen/temperature", vec![1, 2, 3, 4, 5, 6]),
		("home/livingroom/temperature", vec![2, 4, 6]),
		("home/kitchen/humidity", vec![3, 4, 5, 6]),
		("home/kitchen/temperature/celsius", vec![4, 5]),
		("office/kitchen/temperature", vec![5, 6]),
		("office/kitchen", vec![5]),
		("home", vec![4]),
	];

	check_filter_matches(&subscriptions, &expected_matches);
}

#[test]
fn test_traversal_order_concrete_then_plus_then_hash() {
	let mut trie = TopicTrie::for_filters();
	trie.set_value("a/#", "hash").unwrap();
	trie.set_value("a/+", "plus").unwrap();
	trie.set_value("a/b", "exact").unwrap();

	let order: Vec<&str> = trie.find_values("a/b").unwrap().copied().collect();
	assert_eq!(order, vec!["exact", "plus", "hash"]);
}

#[test]
fn test_search_rejects_wildcards_in_filter_mode() {
	let mut trie = TopicTrie::for_filters();
	trie.set_value("a/+", 1).unwrap();

	assert!(matches!(
		trie.find_values("a/+"),
		Err(TopicError::WildcardNotAllowed { .. })
	));
	assert!(matches!(trie.find_values("a/#"), Err(_)));
	assert_eq!(trie.find_values("").err(), Some(TopicError::EmptyTopic));
}

#[test]
fn test_insert_validation() {
	let mut filters = TopicTrie::for_filters();
	assert!(filters.set_value("a/+/c", 1).is_ok());
	assert!(filters.set_value("a/#", 2).is_ok());
	assert_eq!(
		filters.set_value("a/#/c", 3),
		Err(TopicError::hash_position("a/#/c"))
	);
	assert_eq!(
		filters.set_value("a/b+", 4),
		Err(TopicError::wildcard_usage("b+", 1))
	);

	let mut topics = TopicTrie::for_topics();
	assert!(topics.set_value("a/b/c", 1).is_ok());
	assert_eq!(
		topics.set_value("a/+", 2),
		Err(TopicError::wildcard_not_allowed("a/+"))
	);
	assert!(topics.set_value("a/#", 3).is_err());
	assert_eq!(topics.len(), 1);
}

#[test]
fn test_empty_topic_insert_is_noop() {
	let mut trie = TopicTrie::for_filters();
	trie.set_value("", 1).unwrap();

	assert!(trie.is_empty());
	assert_eq!(trie.all_values().count(), 0);
	assert_eq!(trie.get_value(""), None);
}

#[test]
fn test_set_overwrites_and_get() {
	let mut trie = TopicTrie::for_topics();
	trie.set_value("a/b", 1).unwrap();
	trie.set_value("a/b", 2).unwrap();

	assert_eq!(trie.len(), 1);
	assert_eq!(trie.get_value("a/b"), Some(&2));
	assert_eq!(trie.get_value("a"), None);

	*trie.get_value_mut("a/b").unwrap() += 10;
	assert_eq!(trie.get_value("a/b"), Some(&12));
}

#[test]
fn test_delete_prunes_empty_ancestors() {
	let mut trie = TopicTrie::for_filters();
	trie.set_value("a/b/c/d", 1).unwrap();
	trie.set_value("a/x", 2).unwrap();

	assert_eq!(trie.node_count(), 5);

	assert_eq!(trie.delete_value("a/b/c/d"), Some(1));
	assert_eq!(trie.delete_value("a/b/c/d"), None);
	assert_eq!(trie.len(), 1);
	assert_eq!(trie.node_count(), 2);

	// The pruned branch no longer exists, so a fresh value at an old
	// intermediate node is the only thing found there.
	trie.set_value("a/b", 3).unwrap();
	assert_eq!(trie.find_values("a/b").unwrap().count(), 1);

	assert_eq!(trie.delete_value("a/x"), Some(2));
	assert_eq!(trie.delete_value("a/b"), Some(3));
	assert!(trie.is_empty());
	assert_eq!(trie.node_count(), 0);
}

#[test]
fn test_delete_keeps_shared_prefix() {
	let mut trie = TopicTrie::for_filters();
	trie.set_value("a", 1).unwrap();
	trie.set_value("a/b", 2).unwrap();

	assert_eq!(trie.delete_value("a/b"), Some(2));
	assert_eq!(trie.get_value("a"), Some(&1));
	assert_eq!(trie.find_values("a").unwrap().copied().collect::<Vec<_>>(), [1]);
}

#[test]
fn test_all_values_is_restartable() {
	let mut trie = TopicTrie::for_filters();
	for (index, pattern) in ["a", "a/b", "a/+/c", "#", "x/y/z"].iter().enumerate()
	{
		trie.set_value(pattern, index).unwrap();
	}

	let first: HashSet<usize> = trie.all_values().copied().collect();
	let second: HashSet<usize> = trie.all_values().copied().collect();
	assert_eq!(first, (0 .. 5).collect::<HashSet<usize>>());
	assert_eq!(first, second);

	trie.delete_value("a/b");
	assert!(!trie.all_values().any(|value| *value == 1));
}

#[test]
fn test_all_values_is_pre_order() {
	let mut trie = TopicTrie::for_topics();
	trie.set_value("a", "parent").unwrap();
	trie.set_value("a/b", "child").unwrap();

	let order: Vec<&str> = trie.all_values().copied().collect();
	assert_eq!(order, vec!["parent", "child"]);
}

#[test]
fn test_delete_by_filter() {
	let mut trie = TopicTrie::for_topics();
	trie.set_value("a/1", 1).unwrap();
	trie.set_value("a/2", 2).unwrap();
	trie.set_value("b/deep/3", 3).unwrap();
	trie.set_value("b/deep/4", 4).unwrap();

	let removed = trie.delete_by_filter(|value| value % 2 == 1);
	assert_eq!(removed, 2);
	assert_eq!(trie.len(), 2);
	assert_eq!(trie.get_value("a/1"), None);
	assert_eq!(trie.get_value("b/deep/4"), Some(&4));

	assert_eq!(trie.delete_by_filter(|_| true), 2);
	assert!(trie.is_empty());
	assert_eq!(trie.node_count(), 0);
}

#[test]
fn test_concrete_trie_searched_by_filter() {
	let mut trie = TopicTrie::new(TrieMode::ConcreteOnInsert);
	trie.set_value("A", "a").unwrap();
	trie.set_value("A/B", "ab").unwrap();
	trie.set_value("A/B/C", "abc").unwrap();
	trie.set_value("A/X/C", "axc").unwrap();
	trie.set_value("B", "b").unwrap();

	let find = |filter: &str| -> HashSet<&'static str> {
		trie.find_values(filter).unwrap().copied().collect()
	};

	assert_eq!(find("A/+/C"), HashSet::from(["abc", "axc"]));
	assert_eq!(find("A/#"), HashSet::from(["a", "ab", "abc", "axc"]));
	assert_eq!(find("#"), HashSet::from(["a", "ab", "abc", "axc", "b"]));
	assert_eq!(find("A/B"), HashSet::from(["ab"]));
	assert_eq!(find("+"), HashSet::from(["a", "b"]));
	assert!(find("C/#").is_empty());
}

#[test]
fn test_concrete_trie_rejects_invalid_filter_search() {
	let trie: TopicTrie<u8> = TopicTrie::for_topics();
	assert!(matches!(
		trie.find_values("a/#/b"),
		Err(TopicError::HashPosition { .. })
	));
}

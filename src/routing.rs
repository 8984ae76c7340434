//! Message routing and subscription management module
//!
//! This module provides the subscriber registry that multiplexes logical
//! subscriptions onto wire-level ones, the recent-message cache, and the
//! subscriber stream handed to applications.

/// Routing and subscription error types
pub mod error;
pub mod message_cache;
pub mod sink;
/// Low-level subscriber implementation
pub mod subscriber;
pub mod subscriber_registry;

pub use error::{
	DeliveryError, PublishError, SubscriptionError, TopicRouterError,
};
pub use message_cache::{CachedMessage, MessageCache, Retention};
pub use sink::{Delivery, MessageSink, deliver_isolated};
pub use subscriber::Subscriber;
pub use subscriber_registry::{
	DispatchReport, SubscribeOutcome, SubscriberList, SubscriberRegistry,
	SubscriptionId, UnsubscribeOutcome,
};

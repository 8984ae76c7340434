//! Shared fixtures: a recording in-memory transport and a client harness.
#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mqtt_multiplex::{
	ClientConfig, Message, MqttClient, MqttConnection, PublishRequest, QoS,
	Subscriber, Transport, TransportError, TransportEvent,
	transport::{AckReceiver, AckResult},
};
use tokio::sync::{mpsc, oneshot};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

/// Operation recorded by [`MockTransport`]
#[derive(Debug, Clone, PartialEq)]
pub enum WireCall {
	Publish(PublishRequest),
	Subscribe(String, QoS),
	Unsubscribe(String),
	Disconnect,
}

#[derive(Clone, Default)]
pub struct WireLog(Arc<Mutex<Vec<WireCall>>>);

impl WireLog {
	fn push(&self, call: WireCall) {
		self.0.lock().unwrap().push(call);
	}

	pub fn calls(&self) -> Vec<WireCall> {
		self.0.lock().unwrap().clone()
	}

	pub fn clear(&self) {
		self.0.lock().unwrap().clear();
	}

	pub fn subscribes(&self) -> Vec<(String, QoS)> {
		self.calls()
			.into_iter()
			.filter_map(|call| match call {
				| WireCall::Subscribe(topic, qos) => Some((topic, qos)),
				| _ => None,
			})
			.collect()
	}

	pub fn unsubscribes(&self) -> Vec<String> {
		self.calls()
			.into_iter()
			.filter_map(|call| match call {
				| WireCall::Unsubscribe(topic) => Some(topic),
				| _ => None,
			})
			.collect()
	}

	pub fn publishes(&self) -> Vec<PublishRequest> {
		self.calls()
			.into_iter()
			.filter_map(|call| match call {
				| WireCall::Publish(request) => Some(request),
				| _ => None,
			})
			.collect()
	}
}

/// How [`MockTransport`] answers publishes
#[derive(Debug, Clone)]
pub enum AckMode {
	Accept,
	Fail(TransportError),
	Hold,
}

#[derive(Clone)]
pub struct AckControl {
	mode: Arc<Mutex<AckMode>>,
	held: Arc<Mutex<Vec<oneshot::Sender<AckResult>>>>,
}

impl AckControl {
	pub fn set(&self, mode: AckMode) {
		*self.mode.lock().unwrap() = mode;
	}

	pub fn held(&self) -> usize {
		self.held.lock().unwrap().len()
	}

	pub fn release_all(&self, result: AckResult) {
		for ack_tx in self.held.lock().unwrap().drain(..) {
			let _ = ack_tx.send(result.clone());
		}
	}
}

pub struct MockTransport {
	wire: WireLog,
	acks: AckControl,
}

impl Transport for MockTransport {
	fn publish(
		&mut self,
		request: PublishRequest,
	) -> Result<AckReceiver, TransportError> {
		self.wire.push(WireCall::Publish(request));
		let (ack_tx, ack_rx) = oneshot::channel();
		let mode = self.acks.mode.lock().unwrap().clone();
		match mode {
			| AckMode::Accept => {
				let _ = ack_tx.send(Ok(()));
			}
			| AckMode::Fail(err) => {
				let _ = ack_tx.send(Err(err));
			}
			| AckMode::Hold => self.acks.held.lock().unwrap().push(ack_tx),
		}
		Ok(ack_rx)
	}

	fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), TransportError> {
		self.wire.push(WireCall::Subscribe(topic.to_string(), qos));
		Ok(())
	}

	fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
		self.wire.push(WireCall::Unsubscribe(topic.to_string()));
		Ok(())
	}

	fn disconnect(&mut self) -> Result<(), TransportError> {
		self.wire.push(WireCall::Disconnect);
		Ok(())
	}
}

/// Client running over a [`MockTransport`], with the event stream driven by
/// the test.
pub struct Harness {
	pub client: MqttClient,
	pub connection: MqttConnection,
	pub events: mpsc::Sender<TransportEvent>,
	pub wire: WireLog,
	pub acks: AckControl,
}

pub fn config(client_id: &str) -> ClientConfig {
	ClientConfig::new("mqtt://broker.test:1883", client_id)
}

impl Harness {
	pub fn start(config: ClientConfig) -> Self {
		init_tracing();
		let wire = WireLog::default();
		let acks = AckControl {
			mode: Arc::new(Mutex::new(AckMode::Accept)),
			held: Arc::default(),
		};
		let transport = MockTransport {
			wire: wire.clone(),
			acks: acks.clone(),
		};
		let (events, events_rx) = mpsc::channel(64);
		let (client, connection) =
			MqttClient::with_transport(transport, events_rx, &config).unwrap();
		Self {
			client,
			connection,
			events,
			wire,
			acks,
		}
	}

	/// Reports a CONNACK and waits until the client is online.
	pub async fn go_online(&self) {
		let mut state = self.client.connection_state();
		self.events
			.send(TransportEvent::Connected {
				session_present: false,
			})
			.await
			.unwrap();
		assert!(within(state.wait_online()).await);
	}

	/// Reports a lost connection and waits until the client is offline.
	pub async fn go_offline(&self) {
		let mut state = self.client.connection_state();
		self.events.send(TransportEvent::Disconnected).await.unwrap();
		loop {
			match within(state.next()).await {
				| Some(false) => return,
				| Some(true) => continue,
				| None => panic!("client shut down"),
			}
		}
	}

	/// Reports an incoming PUBLISH.
	pub async fn incoming(&self, topic: &str, payload: &'static str) {
		self.events
			.send(TransportEvent::Message(Message::new(topic, payload)))
			.await
			.unwrap();
	}

	pub async fn shutdown(self) {
		self.connection.shutdown().await.unwrap();
	}
}

/// Awaits `future`, failing the test if it takes longer than two seconds.
pub async fn within<F: Future>(future: F) -> F::Output {
	tokio::time::timeout(Duration::from_secs(2), future)
		.await
		.expect("timed out")
}

/// Next message of a subscriber, failing the test on timeout or end of
/// stream.
pub async fn next_message(subscriber: &mut Subscriber) -> Message {
	within(subscriber.recv())
		.await
		.expect("subscriber stream ended")
}

/// Polls `condition` until it holds, failing the test after two seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
	for _ in 0 .. 400 {
		if condition() {
			return;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	panic!("condition not reached in time");
}

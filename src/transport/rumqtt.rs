use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rumqttc::{
	AsyncClient, ConnAck, ConnectReturnCode, ConnectionError, Event, EventLoop,
	MqttOptions, Packet, QoS,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

use super::{
	AckReceiver, AckResult, PublishRequest, Transport, TransportError,
	TransportEvent,
};
use crate::client::config::{ClientConfig, ConfigError};
use crate::store::{InflightPacket, InflightStore, PacketStore};

const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(100);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Builds rumqttc connection options from a client configuration.
///
/// The presence will is installed here so the broker announces the client
/// offline when the connection drops without a DISCONNECT.
pub fn mqtt_options(config: &ClientConfig) -> Result<MqttOptions, ConfigError> {
	config.validate()?;

	let separator = if config.url.contains('?') { '&' } else { '?' };
	let url = format!("{}{separator}client_id={}", config.url, config.client_id);
	let mut options = MqttOptions::parse_url(url)?;
	options.set_keep_alive(Duration::from_secs(config.settings.keep_alive_secs));

	if let Some(credentials) = &config.credentials {
		options.set_credentials(
			credentials.username.clone(),
			credentials.password.clone(),
		);
	}
	if let Some(ca) = &config.ca_cert {
		options.set_transport(rumqttc::Transport::tls(ca.clone(), None, None));
	}
	if let Some(presence) = config.presence()? {
		options.set_last_will(presence.last_will());
	}
	Ok(options)
}

struct QueuedPublish {
	request: PublishRequest,
	ack_tx: oneshot::Sender<AckResult>,
}

// Correlates rumqttc's pkid-based notifications with publish requests.
// Requests leave the client in order, so the next `Outgoing::Publish`
// belongs to the oldest queued request unless its pkid is already
// awaiting an ack (a retransmission).
#[derive(Default)]
struct AckTracker {
	queued: VecDeque<QueuedPublish>,
	awaiting: HashMap<u16, (QoS, oneshot::Sender<AckResult>)>,
	inflight: InflightStore,
}

impl AckTracker {
	fn on_outgoing_publish(&mut self, pkid: u16) {
		if self.awaiting.contains_key(&pkid) {
			debug!(pkid, "Publish retransmitted");
			return;
		}
		let Some(QueuedPublish { request, ack_tx }) = self.queued.pop_front()
		else {
			debug!(pkid, "Outgoing publish without a pending request");
			return;
		};
		if request.qos == QoS::AtMostOnce {
			let _ = ack_tx.send(Ok(()));
			return;
		}

		let packet = InflightPacket {
			pkid,
			topic: Some(request.topic),
			payload: request.payload,
			qos: request.qos,
			retain: request.retain,
		};
		match self.inflight.put(packet) {
			| Ok(Some(evicted)) => {
				debug!(
					pkid,
					evicted_pkid = evicted.pkid,
					"Inflight packet superseded by newer publish"
				);
			}
			| Ok(None) => {}
			| Err(err) => {
				warn!(pkid, error = %err, "Failed to track inflight packet");
			}
		}
		self.awaiting.insert(pkid, (request.qos, ack_tx));
	}

	fn on_ack(&mut self, pkid: u16, acked: QoS) {
		match self.awaiting.remove(&pkid) {
			| Some((qos, ack_tx)) if qos == acked => {
				// Entries evicted by topic are already gone
				let _ = self.inflight.del(pkid);
				let _ = ack_tx.send(Ok(()));
			}
			| Some(pending) => {
				self.awaiting.insert(pkid, pending);
			}
			| None => {
				debug!(pkid, "Acknowledgment for unknown packet");
			}
		}
	}

	fn fail_all(&mut self, err: TransportError) {
		for QueuedPublish { ack_tx, .. } in self.queued.drain(..) {
			let _ = ack_tx.send(Err(err.clone()));
		}
		for (_, (_, ack_tx)) in self.awaiting.drain() {
			let _ = ack_tx.send(Err(err.clone()));
		}
		let _ = self.inflight.close();
	}
}

type SharedTracker = Arc<Mutex<AckTracker>>;

fn lock(tracker: &SharedTracker) -> MutexGuard<'_, AckTracker> {
	tracker.lock().unwrap_or_else(PoisonError::into_inner)
}

/// [`Transport`] backed by a rumqttc `AsyncClient` and a driver task that
/// polls its `EventLoop`.
///
/// rumqttc reconnects on the next poll after a connection error; the driver
/// keeps polling with exponential backoff and only stops after a
/// DISCONNECT or once the client actor is gone.
pub struct RumqttTransport {
	client: AsyncClient,
	acks: SharedTracker,
}

impl RumqttTransport {
	/// Creates the rumqttc client and spawns the event-loop driver.
	///
	/// Returns the transport, its event stream and the driver handle.
	pub fn connect(
		config: &ClientConfig,
	) -> Result<
		(Self, mpsc::Receiver<TransportEvent>, JoinHandle<()>),
		ConfigError,
	> {
		let options = mqtt_options(config)?;
		let (client, event_loop) =
			AsyncClient::new(options, config.settings.event_loop_capacity);
		let (events_tx, events_rx) =
			mpsc::channel(config.settings.event_channel_capacity);
		let acks = SharedTracker::default();

		let driver_acks = Arc::clone(&acks);
		let driver = tokio::spawn(async move {
			drive(event_loop, driver_acks, events_tx).await;
		});
		Ok((Self { client, acks }, events_rx, driver))
	}

	/// Snapshot of QoS 1/2 publishes awaiting acknowledgment, oldest first.
	pub fn inflight(&self) -> Vec<InflightPacket> {
		lock(&self.acks).inflight.iter().cloned().collect()
	}
}

impl Transport for RumqttTransport {
	fn publish(
		&mut self,
		request: PublishRequest,
	) -> Result<AckReceiver, TransportError> {
		let (ack_tx, ack_rx) = oneshot::channel();
		// Held across the hand-off so the driver cannot observe the
		// outgoing packet before it is queued here.
		let mut acks = lock(&self.acks);
		self.client
			.try_publish(
				request.topic.as_str(),
				request.qos,
				request.retain,
				request.payload.to_vec(),
			)
			.map_err(TransportError::client)?;
		acks.queued.push_back(QueuedPublish { request, ack_tx });
		Ok(ack_rx)
	}

	fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), TransportError> {
		self.client
			.try_subscribe(topic, qos)
			.map_err(TransportError::client)
	}

	fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
		self.client
			.try_unsubscribe(topic)
			.map_err(TransportError::client)
	}

	fn disconnect(&mut self) -> Result<(), TransportError> {
		self.client.try_disconnect().map_err(TransportError::client)
	}
}

/// Polls the event loop and translates notifications into
/// [`TransportEvent`]s until a DISCONNECT is sent or received.
async fn drive(
	mut event_loop: EventLoop,
	acks: SharedTracker,
	events: mpsc::Sender<TransportEvent>,
) {
	let mut error_count: u32 = 0;
	let mut connected = false;

	loop {
		let event = match event_loop.poll().await {
			| Ok(Event::Incoming(Packet::ConnAck(ConnAck {
				session_present,
				code: ConnectReturnCode::Success,
			}))) => {
				error_count = 0;
				connected = true;
				info!(session_present, "MQTT connection established");
				Some(TransportEvent::Connected { session_present })
			}
			| Ok(Event::Incoming(Packet::ConnAck(ConnAck { code, .. }))) => {
				error!(code = ?code, "MQTT connection rejected by broker");
				Some(TransportEvent::Error(format!(
					"connection rejected: {code:?}"
				)))
			}
			| Ok(Event::Incoming(Packet::Publish(publish))) => {
				error_count = 0;
				debug!(
					topic = %publish.topic,
					payload_size = publish.payload.len(),
					"Received MQTT message"
				);
				Some(TransportEvent::Message(publish.into()))
			}
			| Ok(Event::Incoming(Packet::PubAck(ack))) => {
				lock(&acks).on_ack(ack.pkid, QoS::AtLeastOnce);
				None
			}
			| Ok(Event::Incoming(Packet::PubComp(comp))) => {
				lock(&acks).on_ack(comp.pkid, QoS::ExactlyOnce);
				None
			}
			| Ok(Event::Outgoing(rumqttc::Outgoing::Publish(pkid))) => {
				lock(&acks).on_outgoing_publish(pkid);
				None
			}
			| Ok(Event::Incoming(Packet::Disconnect)) => {
				info!("Received MQTT Disconnect packet from server");
				break;
			}
			| Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) => {
				info!("Sent MQTT Disconnect packet to server");
				break;
			}
			| Ok(notification) => {
				debug!(notification = ?notification, "MQTT notification");
				None
			}
			| Err(ConnectionError::RequestsDone) => {
				info!("MQTT request channel closed");
				break;
			}
			| Err(err) => {
				error_count = error_count.saturating_add(1);
				error!(error_count, error = %err, "MQTT event loop error");
				if connected {
					connected = false;
					if events.send(TransportEvent::Disconnected).await.is_err() {
						break;
					}
				}
				if events
					.send(TransportEvent::Error(err.to_string()))
					.await
					.is_err()
				{
					break;
				}

				// Exponential backoff
				let delay = INITIAL_RETRY_DELAY
					* 2_u32.pow((error_count - 1).min(10));
				let delay = delay.min(MAX_RETRY_DELAY);
				warn!(delay = ?delay, error_count, "Retrying MQTT connection");
				time::sleep(delay).await;
				None
			}
		};

		if let Some(event) = event {
			if events.send(event).await.is_err() {
				info!("Transport event receiver dropped, stopping driver");
				break;
			}
		}
	}

	lock(&acks).fail_all(TransportError::AckLost);
	info!("MQTT event loop terminated");
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::client::config::ClientConfig;

	#[test]
	fn test_presence_will_is_installed() {
		let config = ClientConfig::new("mqtt://localhost:1883", "dev1")
			.with_presence("clients");
		let options = mqtt_options(&config).unwrap();

		let will = options.last_will().unwrap();
		assert_eq!(will.topic, "clients/dev1");
		assert_eq!(will.message, "0");
		assert_eq!(will.qos, QoS::ExactlyOnce);
		assert!(will.retain);
		assert_eq!(options.client_id(), "dev1");
	}

	#[test]
	fn test_no_will_without_presence() {
		let config = ClientConfig::new("mqtt://localhost:1883", "dev1");
		let options = mqtt_options(&config).unwrap();

		assert!(options.last_will().is_none());
		assert_eq!(options.client_id(), "dev1");
	}

	fn queued(topic: &str, qos: QoS) -> (QueuedPublish, AckReceiver) {
		let (ack_tx, ack_rx) = oneshot::channel();
		let request = PublishRequest::new(topic.to_string(), "p", qos, false);
		(QueuedPublish { request, ack_tx }, ack_rx)
	}

	#[test]
	fn test_acks_resolve_by_qos() {
		let mut tracker = AckTracker::default();
		let (q0, mut rx0) = queued("a", QoS::AtMostOnce);
		let (q1, mut rx1) = queued("b", QoS::AtLeastOnce);
		let (q2, mut rx2) = queued("c", QoS::ExactlyOnce);
		tracker.queued.extend([q0, q1, q2]);

		tracker.on_outgoing_publish(0);
		assert_eq!(rx0.try_recv(), Ok(Ok(())));

		tracker.on_outgoing_publish(1);
		tracker.on_outgoing_publish(2);
		assert_eq!(tracker.inflight.len(), 2);
		assert!(rx1.try_recv().is_err());

		// Retransmission does not consume a queued request
		tracker.on_outgoing_publish(1);
		assert!(tracker.queued.is_empty());

		// PubAck never completes a QoS 2 publish
		tracker.on_ack(2, QoS::AtLeastOnce);
		assert!(rx2.try_recv().is_err());

		tracker.on_ack(1, QoS::AtLeastOnce);
		tracker.on_ack(2, QoS::ExactlyOnce);
		assert_eq!(rx1.try_recv(), Ok(Ok(())));
		assert_eq!(rx2.try_recv(), Ok(Ok(())));
		assert!(tracker.inflight.is_empty());
	}

	#[test]
	fn test_evicted_publish_still_acknowledged() {
		let mut tracker = AckTracker::default();
		let (first, mut first_rx) = queued("t", QoS::AtLeastOnce);
		let (second, mut second_rx) = queued("t", QoS::AtLeastOnce);
		tracker.queued.extend([first, second]);

		tracker.on_outgoing_publish(1);
		tracker.on_outgoing_publish(2);
		assert_eq!(tracker.inflight.len(), 1);
		assert_eq!(tracker.inflight.pkid_for_topic("t"), Some(2));

		tracker.on_ack(1, QoS::AtLeastOnce);
		tracker.on_ack(2, QoS::AtLeastOnce);
		assert_eq!(first_rx.try_recv(), Ok(Ok(())));
		assert_eq!(second_rx.try_recv(), Ok(Ok(())));
	}

	#[test]
	fn test_fail_all_rejects_pending() {
		let mut tracker = AckTracker::default();
		let (queued_publish, mut queued_rx) = queued("a", QoS::AtLeastOnce);
		let (sent, mut sent_rx) = queued("b", QoS::AtLeastOnce);
		tracker.queued.push_back(sent);
		tracker.on_outgoing_publish(9);
		tracker.queued.push_back(queued_publish);

		tracker.fail_all(TransportError::AckLost);
		assert_eq!(queued_rx.try_recv(), Ok(Err(TransportError::AckLost)));
		assert_eq!(sent_rx.try_recv(), Ok(Err(TransportError::AckLost)));
		assert!(tracker.inflight.is_closed());
	}
}

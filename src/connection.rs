//! MQTT connection management module
//!
//! This module provides the connection lifecycle handle and the observable
//! connection state, separated from the main client interface.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::client::client_actor::ClientController;

const DRIVER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle state of the connection owned by the client actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	/// Shut down
	Disconnected,
	/// Waiting for the first CONNACK
	Connecting,
	/// Connected to the broker
	Online,
	/// Connection lost after having been online; reconnecting
	Offline,
}

impl ConnectionState {
	/// Observer-facing projection of the state.
	pub fn is_online(self) -> bool {
		self == ConnectionState::Online
	}

	/// True once a connection has been established at least once.
	pub fn has_connected(self) -> bool {
		matches!(self, ConnectionState::Online | ConnectionState::Offline)
	}
}

/// Observer of the online/offline state.
///
/// The client actor queues the state current at registration, then every
/// transition, so a quick offline/online flap is observed as `false`
/// followed by `true`. Also usable as a [`Stream`] of booleans. Yields
/// `None` once the client has shut down.
#[derive(Debug)]
pub struct ConnectionStateSubscriber {
	updates: mpsc::UnboundedReceiver<bool>,
	current: watch::Receiver<bool>,
}

impl ConnectionStateSubscriber {
	pub(crate) fn new(
		updates: mpsc::UnboundedReceiver<bool>,
		current: watch::Receiver<bool>,
	) -> Self {
		Self { updates, current }
	}

	/// Current state without waiting.
	pub fn is_online(&self) -> bool {
		*self.current.borrow()
	}

	/// Next notification: the state at registration first, then each
	/// change in order.
	pub async fn next(&mut self) -> Option<bool> {
		self.updates.recv().await
	}

	/// Waits until the client is online. Returns false if the client shut
	/// down first.
	pub async fn wait_online(&mut self) -> bool {
		while let Some(online) = self.updates.recv().await {
			if online {
				return true;
			}
		}
		false
	}
}

impl Stream for ConnectionStateSubscriber {
	type Item = bool;

	fn poll_next(
		mut self: Pin<&mut Self>,
		cx: &mut Context<'_>,
	) -> Poll<Option<Self::Item>> {
		self.updates.poll_recv(cx)
	}
}

/// MQTT connection handle for lifecycle management
///
/// This type manages the connection lifecycle and provides graceful shutdown.
/// It should be kept alive for the duration of the MQTT session.
pub struct MqttConnection {
	controller: Option<ClientController>,
	driver_handle: Option<JoinHandle<()>>,
}

impl MqttConnection {
	pub(crate) fn new(
		controller: ClientController,
		driver_handle: Option<JoinHandle<()>>,
	) -> Self {
		Self {
			controller: Some(controller),
			driver_handle,
		}
	}

	/// Gracefully shutdown the MQTT connection by:
	/// 1. Stopping the client actor, which unsubscribes every topic, closes
	///    subscriber streams and sends DISCONNECT
	/// 2. Waiting for the transport driver to finish
	pub async fn shutdown(mut self) -> Result<(), crate::MqttClientError> {
		if let Some(controller) = self.controller.take() {
			if let Err(e) = controller.shutdown().await {
				warn!(error = %e, "Failed to shutdown client actor");
			}
		}

		// A driver that never connected keeps retrying and would not see
		// the DISCONNECT, so it is aborted after a grace period.
		if let Some(mut handle) = self.driver_handle.take() {
			match tokio::time::timeout(DRIVER_SHUTDOWN_TIMEOUT, &mut handle)
				.await
			{
				| Ok(Ok(())) => {}
				| Ok(Err(e)) => warn!(error = %e, "Transport driver task failed"),
				| Err(_) => {
					warn!(
						timeout_ms = DRIVER_SHUTDOWN_TIMEOUT.as_millis() as u64,
						"Transport driver did not stop, aborting"
					);
					handle.abort();
				}
			}
		}

		Ok(())
	}
}

impl Drop for MqttConnection {
	fn drop(&mut self) {
		if self.controller.is_some() {
			error!(
				"MqttConnection dropped without calling shutdown(). Please \
				 call shutdown() and await its completion before dropping."
			);
		}
	}
}

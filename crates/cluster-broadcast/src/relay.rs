//! Upstream relay broadcaster: a persistent WebSocket connection to the
//! worker runtime's push endpoint, fanned out to local subscribers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::broadcaster::{Broadcaster, Envelope, SubscriberId};
use crate::error::{Error, Result};
use crate::message::{client_register_frame, upstream_signal, RawFrame, UpdateMessage};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Relays the worker runtime's network/node status updates to local
/// subscribers, maintaining its own upstream WebSocket connection.
pub struct UpstreamRelay {
    host: String,
    port: u16,
    client_id: String,
    zeroconf_enabled: AtomicBool,
    broadcaster: Arc<Broadcaster<UpdateMessage>>,
}

impl UpstreamRelay {
    /// Construct a relay targeting `host:port`'s `/ws` endpoint, identifying
    /// itself with a freshly generated client id.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: uuid::Uuid::new_v4().to_string(),
            zeroconf_enabled: AtomicBool::new(false),
            broadcaster: Arc::new(Broadcaster::new()),
        }
    }

    /// Whether zeroconf discovery is currently flagged as enabled; carried
    /// through into every published [`UpdateMessage::NetworkUpdate`].
    pub fn zeroconf_enabled(&self) -> bool {
        self.zeroconf_enabled.load(Ordering::SeqCst)
    }

    /// Flip the zeroconf-enabled flag.
    pub fn set_zeroconf_enabled(&self, enabled: bool) {
        self.zeroconf_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Register a new subscriber to network/node status updates.
    pub async fn subscribe(&self) -> (SubscriberId, mpsc::UnboundedReceiver<Envelope<UpdateMessage>>) {
        self.broadcaster.subscribe().await
    }

    /// Deregister a subscriber.
    pub async fn unsubscribe(&self, id: SubscriberId) {
        self.broadcaster.unsubscribe(id).await;
    }

    /// Publish an update directly, bypassing the upstream connection. Used
    /// by the controller to republish a synthesized `ClusterState` after a
    /// zeroconf toggle.
    pub fn publish(&self, message: UpdateMessage) {
        self.broadcaster.publish(message);
    }

    /// Enqueue the sentinel on the local fan-out.
    pub fn enqueue_sentinel(&self) {
        self.broadcaster.enqueue_sentinel();
    }

    /// Drive the local fan-out loop. Spawn as its own task alongside
    /// [`UpstreamRelay::receive_loop`].
    pub async fn run_broadcast(&self) {
        self.broadcaster.run().await;
    }

    /// Open the upstream connection and send the `CLIENT_REGISTER` frame.
    pub async fn connect(&self) -> Result<Socket> {
        let url = format!("ws://{}:{}/ws", self.host, self.port);
        let (mut socket, _response) =
            tokio_tungstenite::connect_async(&url)
                .await
                .map_err(|source| Error::Connect {
                    host: self.host.clone(),
                    port: self.port,
                    source,
                })?;

        let register = client_register_frame(&self.client_id);
        socket
            .send(WsMessage::Text(register.to_string()))
            .await
            .map_err(Error::Register)?;

        tracing::info!(host = %self.host, port = self.port, "connected to upstream relay");
        Ok(socket)
    }

    /// Read frames from `socket` until the connection closes or a shutdown
    /// signal arrives, classifying and publishing each one. Always enqueues
    /// the sentinel on exit so downstream subscribers drain and detach.
    pub async fn receive_loop(&self, mut socket: Socket) {
        loop {
            match socket.next().await {
                Some(Ok(WsMessage::Text(text))) => match self.classify(&text) {
                    Some(message) => {
                        let is_shutdown = matches!(message, UpdateMessage::Shutdown);
                        self.broadcaster.publish(message);
                        if is_shutdown {
                            break;
                        }
                    }
                    None => continue,
                },
                Some(Ok(WsMessage::Close(_))) | None => {
                    tracing::debug!("upstream relay connection closed normally");
                    break;
                }
                Some(Ok(_)) => continue,
                Some(Err(err)) => {
                    tracing::warn!(error = %err, "upstream relay connection lost");
                    self.broadcaster.publish(UpdateMessage::Error {
                        message: Error::UpstreamDisconnected(err.to_string()).to_string(),
                    });
                    break;
                }
            }
        }
        self.broadcaster.enqueue_sentinel();
    }

    fn classify(&self, raw: &str) -> Option<UpdateMessage> {
        let frame: RawFrame = serde_json::from_str(raw).ok()?;
        match frame.signal.as_str() {
            upstream_signal::NETWORK_STATUS_UPDATE | upstream_signal::NODE_STATUS_UPDATE => {
                Some(UpdateMessage::NetworkUpdate {
                    data: frame.data,
                    zeroconf_discovery: self.zeroconf_enabled(),
                })
            }
            upstream_signal::SHUTDOWN => Some(UpdateMessage::Shutdown),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay() -> UpstreamRelay {
        UpstreamRelay::new("127.0.0.1", 9000)
    }

    #[test]
    fn classifies_network_and_node_status_updates() {
        let relay = relay();
        let network = relay
            .classify(r#"{"signal":"NETWORK_STATUS_UPDATE","data":{"running":true}}"#)
            .unwrap();
        assert!(matches!(network, UpdateMessage::NetworkUpdate { .. }));

        let node = relay
            .classify(r#"{"signal":"NODE_STATUS_UPDATE","data":null}"#)
            .unwrap();
        assert!(matches!(node, UpdateMessage::NetworkUpdate { .. }));
    }

    #[test]
    fn classifies_shutdown_and_discards_unknown_signals() {
        let relay = relay();
        assert!(matches!(
            relay.classify(r#"{"signal":"SHUTDOWN"}"#),
            Some(UpdateMessage::Shutdown)
        ));
        assert!(relay.classify(r#"{"signal":"SOMETHING_ELSE"}"#).is_none());
        assert!(relay.classify("not json").is_none());
    }

    #[test]
    fn zeroconf_flag_is_carried_into_network_updates() {
        let relay = relay();
        relay.set_zeroconf_enabled(true);
        let message = relay
            .classify(r#"{"signal":"NETWORK_STATUS_UPDATE","data":{}}"#)
            .unwrap();
        match message {
            UpdateMessage::NetworkUpdate { zeroconf_discovery, .. } => {
                assert!(zeroconf_discovery)
            }
            _ => panic!("expected a network update"),
        }
    }

    #[tokio::test]
    async fn subscribing_and_enqueueing_sentinel_drains_the_fanout() {
        let relay = relay();
        let (_id, mut rx) = relay.subscribe().await;
        relay.publish(UpdateMessage::Shutdown);
        relay.enqueue_sentinel();
        relay.run_broadcast().await;

        assert!(matches!(
            rx.try_recv().unwrap(),
            Envelope::Message(UpdateMessage::Shutdown)
        ));
        assert!(matches!(rx.try_recv().unwrap(), Envelope::Sentinel));
    }
}

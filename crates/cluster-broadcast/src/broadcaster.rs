//! Generic multi-subscriber fan-out broadcaster.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Either a published message or the termination marker.
///
/// Represented as a dedicated variant rather than a magic string payload, so
/// a legitimate message can never be mistaken for the sentinel.
#[derive(Debug, Clone)]
pub enum Envelope<T> {
    /// A published message.
    Message(T),
    /// No further messages will be published; the broadcast loop exits.
    Sentinel,
}

/// Opaque handle returned by [`Broadcaster::subscribe`], used to
/// [`Broadcaster::unsubscribe`] later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

/// Fans out every published `T` to every currently-registered subscriber, in
/// publish order.
///
/// Subscriber membership is only consulted at fan-out time: a subscriber
/// that registers after a message was enqueued but before it is delivered
/// will not see that message; one that unsubscribes in the same window may
/// or may not, depending on scheduling. This matches the teacher's
/// broadcast-stream fan-out, generalized from one subscriber set to many.
pub struct Broadcaster<T> {
    inbox_tx: mpsc::UnboundedSender<Envelope<T>>,
    inbox_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Envelope<T>>>,
    subscribers: RwLock<HashMap<Uuid, mpsc::UnboundedSender<Envelope<T>>>>,
}

impl<T: Clone + Send + 'static> Default for Broadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Broadcaster<T> {
    /// An idle broadcaster with no subscribers.
    pub fn new() -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            inbox_tx,
            inbox_rx: tokio::sync::Mutex::new(inbox_rx),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new subscriber, returning its id and receive end.
    pub async fn subscribe(&self) -> (SubscriberId, mpsc::UnboundedReceiver<Envelope<T>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.subscribers.write().await.insert(id, tx);
        (SubscriberId(id), rx)
    }

    /// Deregister a subscriber. A no-op if it was already removed.
    pub async fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.write().await.remove(&id.0);
    }

    /// Send a message directly to one subscriber, bypassing the shared
    /// inbox and every other subscriber. Used to replay an initial snapshot
    /// to a newly-registered subscriber (e.g. the controller's pipeline
    /// channel priming a fresh observer with the current FSM state) without
    /// broadcasting that replay to everyone else.
    pub async fn send_to(&self, id: SubscriberId, message: T) {
        if let Some(outbox) = self.subscribers.read().await.get(&id.0) {
            let _ = outbox.send(Envelope::Message(message));
        }
    }

    /// Enqueue a message for delivery. Never blocks: the inbox is unbounded.
    pub fn publish(&self, message: T) {
        let _ = self.inbox_tx.send(Envelope::Message(message));
    }

    /// Enqueue the sentinel, signaling [`Broadcaster::run`] to stop after
    /// delivering it.
    pub fn enqueue_sentinel(&self) {
        let _ = self.inbox_tx.send(Envelope::Sentinel);
    }

    /// Drain the inbox, fanning each entry out to every current subscriber,
    /// until the sentinel is observed or the inbox is closed. Intended to be
    /// driven by a single long-lived task; concurrent callers may still
    /// `publish`/`subscribe`/`unsubscribe` while this runs.
    pub async fn run(&self) {
        let mut inbox = self.inbox_rx.lock().await;
        loop {
            let envelope = match inbox.recv().await {
                Some(envelope) => envelope,
                None => return,
            };

            let subscribers = self.subscribers.read().await;
            for outbox in subscribers.values() {
                let _ = outbox.send(envelope.clone());
            }
            drop(subscribers);

            if matches!(envelope, Envelope::Sentinel) {
                tracing::debug!("broadcaster observed sentinel, exiting run loop");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_observe_messages_in_publish_order() {
        let broadcaster: Broadcaster<u32> = Broadcaster::new();
        let (_id, mut rx) = broadcaster.subscribe().await;

        broadcaster.publish(1);
        broadcaster.publish(2);
        broadcaster.enqueue_sentinel();

        broadcaster.run().await;

        let mut received = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            received.push(envelope);
        }
        assert!(matches!(received[0], Envelope::Message(1)));
        assert!(matches!(received[1], Envelope::Message(2)));
        assert!(matches!(received[2], Envelope::Sentinel));
    }

    #[tokio::test]
    async fn multiple_subscribers_each_see_every_message() {
        let broadcaster: Broadcaster<&'static str> = Broadcaster::new();
        let (_a, mut rx_a) = broadcaster.subscribe().await;
        let (_b, mut rx_b) = broadcaster.subscribe().await;

        broadcaster.publish("hello");
        broadcaster.enqueue_sentinel();
        broadcaster.run().await;

        assert!(matches!(rx_a.try_recv().unwrap(), Envelope::Message("hello")));
        assert!(matches!(rx_b.try_recv().unwrap(), Envelope::Message("hello")));
    }

    #[tokio::test]
    async fn unsubscribe_stops_further_delivery() {
        let broadcaster: Broadcaster<u32> = Broadcaster::new();
        let (id, mut rx) = broadcaster.subscribe().await;
        broadcaster.unsubscribe(id).await;

        broadcaster.publish(42);
        broadcaster.enqueue_sentinel();
        broadcaster.run().await;

        // The channel was dropped from the registry before delivery, so the
        // receiver only ever sees it close, never a message.
        assert!(rx.try_recv().is_err());
    }
}

//! Multi-subscriber fan-out broadcasting.
//!
//! [`Broadcaster`] is the generic pattern: an unbounded inbox, a set of
//! subscriber outboxes, and a sentinel that unwinds the fan-out loop.
//! [`UpstreamRelay`] adds a persistent WebSocket connection to the worker
//! runtime's push endpoint on top of it, classifying and republishing every
//! frame it receives.

mod broadcaster;
mod error;
mod message;
mod relay;

pub use broadcaster::{Broadcaster, Envelope, SubscriberId};
pub use error::{Error, Result};
pub use message::UpdateMessage;
pub use relay::UpstreamRelay;

//! Broadcast fan-out to the output channels of one document.
//!
//! The event is serialized once by the caller and the shared payload is
//! queued on every channel with `try_send`. A failed channel never stops
//! delivery to the others:
//!
//! - a closed channel is counted and skipped; its connection detaches itself
//! - a full channel has missed an event, and every later diff would apply
//!   to the wrong base text, so it is reported back as lagging and the
//!   caller evicts it

use crate::error::DeliveryFailure;
use crate::state::ConnectionId;
use mdsync_proto::DocId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// A serialized event, shared by every recipient.
pub type Outbound = Arc<str>;

/// Sending half of a connection's outbound queue.
pub type OutputChannel = mpsc::Sender<Outbound>;

/// Per-broadcast delivery tally.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
    /// Connections whose queue overflowed on this broadcast.
    pub lagging: Vec<ConnectionId>,
}

/// Queue `payload` on every channel in `outputs`.
pub fn broadcast<'a, I>(doc_id: DocId, outputs: I, payload: &Outbound) -> Delivery
where
    I: IntoIterator<Item = (&'a ConnectionId, &'a OutputChannel)>,
{
    let mut delivery = Delivery::default();

    for (conn, sender) in outputs {
        match sender.try_send(Arc::clone(payload)) {
            Ok(()) => delivery.delivered += 1,
            Err(err) => {
                let failure = match err {
                    TrySendError::Full(_) => DeliveryFailure::QueueFull,
                    TrySendError::Closed(_) => DeliveryFailure::Closed,
                };
                match failure {
                    DeliveryFailure::QueueFull => {
                        warn!(doc_id, %conn, "Outbound queue full, client is lagging");
                        delivery.lagging.push(*conn);
                    }
                    DeliveryFailure::Closed => {
                        debug!(doc_id, %conn, "Skipping closed output channel")
                    }
                }
                crate::metrics::record_delivery_failure(failure.error_code());
                delivery.failed += 1;
            }
        }
    }

    crate::metrics::record_fanout(delivery.delivered);
    delivery
}

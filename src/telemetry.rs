//! Telemetry utilities for edit timing and log correlation.

use std::time::Instant;

/// Guard for timing one edit from dispatch to the end of fan-out.
///
/// Records edit latency when dropped.
pub struct EditTimer {
    start: Instant,
}

impl EditTimer {
    /// Start timing an edit.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Drop for EditTimer {
    fn drop(&mut self) {
        crate::metrics::record_edit_latency(self.start.elapsed().as_secs_f64());
    }
}

/// Standardized span constructors.
pub mod spans {
    use mdsync_proto::{CorrelationId, DocId};
    use std::net::SocketAddr;
    use tracing::{Span, info_span};

    /// Create a span for a client connection.
    pub fn connection(conn: &str, doc_id: DocId, addr: SocketAddr) -> Span {
        info_span!("connection", conn = %conn, doc_id = doc_id, addr = %addr)
    }

    /// Create a span for one dispatched edit.
    pub fn edit(doc_id: DocId, correlation_id: CorrelationId) -> Span {
        info_span!("edit", doc_id = doc_id, correlation_id = correlation_id)
    }
}

//! Edit dispatch and fan-out tuning.

use serde::Deserialize;

/// How accepted edits leave a connection's read loop.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Every edit runs as its own task. Edits from one connection may be
    /// applied out of arrival order; the document guard still serializes them.
    #[default]
    Concurrent,
    /// Each connection feeds a FIFO worker, so its edits apply in arrival order.
    Ordered,
}

/// Synchronization configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub dispatch: DispatchMode,
    /// Per-connection outbound buffer, in messages. A client whose buffer
    /// overflows has missed a broadcast and is disconnected so it can
    /// reconnect; other clients are unaffected.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
    /// Edits a connection may have waiting in `ordered` mode. A client that
    /// gets further ahead than this is disconnected.
    #[serde(default = "default_edit_queue")]
    pub edit_queue: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchMode::default(),
            outbound_queue: default_outbound_queue(),
            edit_queue: default_edit_queue(),
        }
    }
}

fn default_outbound_queue() -> usize {
    256
}

fn default_edit_queue() -> usize {
    256
}

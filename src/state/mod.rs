//! State management module.
//!
//! Contains the document store, document sessions and broadcast fan-out.

mod conn_id;
pub mod fanout;
mod session;
mod store;

pub use conn_id::{ConnectionId, ConnectionIdGenerator};
pub use fanout::Outbound;
pub use session::{DocumentSession, EditCommit};
pub use store::DocumentStore;

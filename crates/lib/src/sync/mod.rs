//! Replica synchronization.
//!
//! Peers exchange unseen transactions by (session, index range). Because
//! ingestion is idempotent, messages may be repeated or lost and an exchange
//! may stop at any point; the next one picks up from what each side holds.

pub mod error;
pub mod handler;
pub mod peer;
pub mod protocol;
pub mod transport;

pub use error::SyncError;
pub use peer::{PeerState, SyncReport};
pub use protocol::{CatalogEntry, Content, KnownState, SyncRequest, SyncResponse};
pub use transport::{LocalTransport, SyncTransport};

//! Fixed prefixes and defaults shared across the crate.

/// Prefix of every CoValue identifier.
pub const CO_ID_PREFIX: &str = "co_z";

/// Separator between the agent part and the device tag of a session id.
pub const SESSION_SEPARATOR: &str = "_session_";

/// Separator between the signer and sealer halves of an agent id.
pub const AGENT_SEPARATOR: char = '~';

/// Prefix of group read key identifiers.
pub const KEY_ID_PREFIX: &str = "key_z";

/// Group field holding the id of the current read key.
pub const READ_KEY_FIELD: &str = "readKey";

/// Group field prefix for sealed read key revelations and key chains.
pub const KEY_FIELD_PREFIX: &str = "key:";

/// Account field holding the owner's public profile.
pub const PROFILE_FIELD: &str = "profile";

/// Default window before buffered out-of-order transactions are reported.
pub const DEFAULT_GAP_WINDOW_MS: u64 = 30_000;

/// How far past a session's next index a transaction may arrive and still be
/// buffered. Bounds the gap buffer to this many slots per session.
pub const MAX_GAP_DISTANCE: u64 = 1_024;

//! Authorization error types.

use thiserror::Error as ThisError;

use super::Role;
use crate::Error;
use crate::crypto::KeyID;
use crate::id::CoID;
use crate::identity::AgentID;

/// Errors raised when checking write authority or resolving read keys.
///
/// While materializing, unauthorized transactions are simply excluded and
/// logged. These errors reach a caller only when it tries to write something
/// it may not write.
#[non_exhaustive]
#[derive(Debug, ThisError)]
pub enum AuthError {
    /// The agent lacks a role that may write this value.
    #[error("Agent {agent} may not write (role: {role:?})")]
    UnauthorizedWriter { agent: AgentID, role: Option<Role> },

    /// A value referenced as a group is not one.
    #[error("{id} is not a group")]
    NotAGroup { id: CoID },

    /// The owning group is not available locally.
    #[error("Group {id} is not loaded")]
    GroupUnavailable { id: CoID },

    /// The group has no current read key.
    #[error("Group {group} has no read key")]
    NoReadKey { group: CoID },

    /// The read key exists but this agent cannot obtain it.
    #[error("Read key {key_id} is not available to this agent")]
    ReadKeyUnavailable { key_id: KeyID },
}

impl AuthError {
    /// Check if this error denies an operation.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, AuthError::UnauthorizedWriter { .. })
    }

    /// Check if this error is about missing key material.
    pub fn is_key_unavailable(&self) -> bool {
        matches!(
            self,
            AuthError::NoReadKey { .. } | AuthError::ReadKeyUnavailable { .. }
        )
    }

    /// Check if this error names something that is not there.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AuthError::GroupUnavailable { .. })
    }
}

impl From<AuthError> for Error {
    fn from(err: AuthError) -> Self {
        Error::Auth(err)
    }
}

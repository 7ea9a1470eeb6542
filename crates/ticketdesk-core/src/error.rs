//! Engine error types.

use thiserror::Error;

use ticketdesk_persistence::PersistenceError;

use crate::gateway::GatewayError;

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input rejected before any mutation.
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Ticket not found: {0}")]
    NotFound(String),

    /// The ticket is not in a state that allows the operation.
    #[error("{0}")]
    InvalidState(String),

    #[error("No level-2 technicians configured")]
    NoEscalationPool,

    /// A technician thread could not be created for a new ticket.
    #[error("Could not create a routing thread: {0}")]
    RoutingUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(PersistenceError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

impl From<PersistenceError> for EngineError {
    fn from(e: PersistenceError) -> Self {
        match e {
            PersistenceError::NotFound { id, .. } => EngineError::NotFound(id),
            other => EngineError::Storage(other),
        }
    }
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    /// Returns true for stale optimistic writes.
    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::Storage(e) if e.is_conflict())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_from_persistence() {
        let err: EngineError = PersistenceError::ticket_not_found("TICK-0009").into();
        assert!(matches!(err, EngineError::NotFound(id) if id == "TICK-0009"));
    }
}

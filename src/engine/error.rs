use std::fmt;

use thiserror::Error;
use ulid::Ulid;

use crate::model::ReservationStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Equipment,
    Reservation,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Equipment => f.write_str("equipment"),
            Entity::Reservation => f.write_str("reservation"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: Ulid },
    #[error("not authorized: {0}")]
    Unauthorized(&'static str),
    #[error("equipment {equipment_id} not available for selected dates")]
    Conflict {
        equipment_id: Ulid,
        /// The blocking reservation, when the dates were the problem.
        blocking: Option<Ulid>,
    },
    #[error("reservation {id} is {actual}, expected {expected}")]
    InvalidState {
        id: Ulid,
        actual: ReservationStatus,
        expected: ReservationStatus,
    },
    #[error("cannot cancel reservation {id}: {reason}")]
    CannotCancel { id: Ulid, reason: &'static str },
    #[error("storage error: {0}")]
    Storage(String),
}

/// Fieldless failure class for exhaustive matching by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Authorization,
    Conflict,
    InvalidState,
    CannotCancel,
    Storage,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::Unauthorized(_) => ErrorKind::Authorization,
            EngineError::Conflict { .. } => ErrorKind::Conflict,
            EngineError::InvalidState { .. } => ErrorKind::InvalidState,
            EngineError::CannotCancel { .. } => ErrorKind::CannotCancel,
            EngineError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn equipment_not_found(id: Ulid) -> Self {
        EngineError::NotFound {
            entity: Entity::Equipment,
            id,
        }
    }

    pub(crate) fn reservation_not_found(id: Ulid) -> Self {
        EngineError::NotFound {
            entity: Entity::Reservation,
            id,
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Storage(e.to_string())
    }
}

//! Error taxonomy for the assignment engine.
//!
//! - [`ValidationError`]: raised locally before any backend call
//! - [`SharedPreconditionError`]: aborts a whole batch before fan-out
//! - [`AssignmentError`]: per-candidate failure, always captured in a report
//! - [`BackendError`]: raw failure as returned by a backend implementation

use std::fmt;

use cohort_id::ResourceId;
use serde::Serialize;
use thiserror::Error;

use crate::pipeline::Transition;
use crate::resource::{ManagerRole, ResourceKind};

/// Phrases a backend uses to say a resource has no room left. Matched as
/// whole words, so "fullName is required" is not a capacity rejection.
const CAPACITY_PATTERNS: &[&str] = &[
    "already assigned",
    "no remaining",
    "no available",
    "is full",
    "fully allocated",
    "fully booked",
    "capacity reached",
    "at capacity",
    "exceeds capacity",
    "exceeds remaining capacity",
];

/// Failure reported by a [`PlacementBackend`](crate::backend::PlacementBackend).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The server answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Transport failure with no structured server response.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered but the body could not be understood.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The backend does not offer this operation.
    #[error("operation not supported by backend: {0}")]
    Unsupported(&'static str),
}

/// Classified per-candidate failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssignmentError {
    /// No remaining capacity, or the candidate is already assigned.
    #[error("{message}")]
    Capacity { status: u16, message: String },

    /// The resource or candidate vanished between listing and assignment.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// Session expired; the caller must re-authenticate.
    #[error("session expired: {message}")]
    Auth { message: String },

    /// Transport failure.
    #[error("network error: {message}")]
    Network { message: String },

    /// Any other rejection by the server.
    #[error("rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// A batch endpoint answered without mentioning this candidate.
    #[error("no result reported for this candidate")]
    Unreported,
}

/// Serializable tag for a failed outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Capacity,
    NotFound,
    Auth,
    Network,
    Rejected,
    Unreported,
}

impl AssignmentError {
    /// Classify a raw backend failure.
    pub fn from_backend(err: BackendError) -> Self {
        match err {
            BackendError::Api { status: 401, message } => Self::Auth { message },
            BackendError::Api { status: 404, message } => Self::NotFound { message },
            BackendError::Api { status, message }
                if (400..500).contains(&status) && is_capacity_message(&message) =>
            {
                Self::Capacity { status, message }
            }
            BackendError::Api { status, message } => Self::Rejected { status, message },
            BackendError::Network(message) | BackendError::Decode(message) => {
                Self::Network { message }
            }
            BackendError::Unsupported(what) => Self::Network {
                message: format!("operation not supported by backend: {what}"),
            },
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Capacity { .. } => FailureKind::Capacity,
            Self::NotFound { .. } => FailureKind::NotFound,
            Self::Auth { .. } => FailureKind::Auth,
            Self::Network { .. } => FailureKind::Network,
            Self::Rejected { .. } => FailureKind::Rejected,
            Self::Unreported => FailureKind::Unreported,
        }
    }

    /// HTTP-style status, when the failure came from a server response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Capacity { status, .. } | Self::Rejected { status, .. } => Some(*status),
            Self::NotFound { .. } => Some(404),
            Self::Auth { .. } => Some(401),
            Self::Network { .. } | Self::Unreported => None,
        }
    }

    /// Returns true if the cached candidate/resource view is known to be stale.
    pub fn invalidates_view(&self) -> bool {
        matches!(self, Self::Capacity { .. } | Self::NotFound { .. })
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

impl From<BackendError> for AssignmentError {
    fn from(err: BackendError) -> Self {
        Self::from_backend(err)
    }
}

fn is_capacity_message(message: &str) -> bool {
    let words: Vec<String> = message
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    CAPACITY_PATTERNS.iter().any(|pattern| {
        let phrase: Vec<&str> = pattern.split(' ').collect();
        words
            .windows(phrase.len())
            .any(|window| window.iter().zip(&phrase).all(|(w, p)| w == p))
    })
}

/// A field of an assignment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    CandidateIds,
    Resource,
    ManagerSlot,
    WindowStart,
    WindowEnd,
    AuxFields,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CandidateIds => "candidateIds",
            Self::Resource => "resource",
            Self::ManagerSlot => "managerSlot",
            Self::WindowStart => "startDate",
            Self::WindowEnd => "endDate",
            Self::AuxFields => "auxFields",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local validation failure; never sent to the backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(Field),

    #[error("resource {resource_id} is a {actual}, but {transition} needs a {expected}")]
    WrongResourceKind {
        resource_id: ResourceId,
        transition: Transition,
        expected: ResourceKind,
        actual: ResourceKind,
    },

    #[error("{field} is not a valid date: {value:?}")]
    InvalidDate { field: Field, value: String },

    #[error("window ends ({end}) before it starts ({start})")]
    WindowEndsBeforeStart { start: String, end: String },

    #[error("auxiliary field {0:?} is reserved")]
    ReservedAuxField(String),
}

impl ValidationError {
    /// The request field this error refers to.
    pub fn field(&self) -> Field {
        match self {
            Self::MissingField(field) | Self::InvalidDate { field, .. } => *field,
            Self::WrongResourceKind { .. } => Field::Resource,
            Self::WindowEndsBeforeStart { .. } => Field::WindowEnd,
            Self::ReservedAuxField(_) => Field::AuxFields,
        }
    }
}

/// Why the admin's resource pick was refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("resource {resource_id} has no remaining capacity")]
    Exhausted { resource_id: ResourceId },

    #[error("select a resource before choosing a manager slot")]
    NoParent,

    #[error("resource {resource_id} has no {role} manager slot")]
    UnknownSlot {
        resource_id: ResourceId,
        role: ManagerRole,
    },

    #[error("{role} manager slot of {resource_id} has no remaining allocation")]
    SlotExhausted {
        resource_id: ResourceId,
        role: ManagerRole,
    },
}

/// The shared auxiliary record of a batch failed validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("shared program {program_id} is not usable: {problem}")]
pub struct SharedPreconditionError {
    pub program_id: ResourceId,
    pub problem: PreconditionProblem,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PreconditionProblem {
    #[error("missing required field {0}")]
    MissingField(&'static str),

    #[error("{field} is not a valid date: {value:?}")]
    InvalidDate { field: &'static str, value: String },

    #[error("program ends before it starts")]
    EndsBeforeStart,

    #[error("could not be fetched: {0}")]
    Unavailable(AssignmentError),
}

/// Errors surfaced by [`AssignmentWorkflow`](crate::workflow::AssignmentWorkflow).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    SharedPrecondition(#[from] SharedPreconditionError),

    #[error("failed to load {what}: {source}")]
    Load {
        what: &'static str,
        #[source]
        source: AssignmentError,
    },
}

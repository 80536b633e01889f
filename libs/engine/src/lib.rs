//! Cohort assignment engine.
//!
//! Assigns pipeline candidates to capacity-bounded resources (schemes,
//! rotational stations, induction programs, interview panels) and manager
//! slots within a date window.
//!
//! - [`capacity`]: remaining-capacity derivation and the selectable filter
//! - [`window`]: window bounds and Upcoming/Current/Completed classification
//! - [`request`]: validation of an assignment intent
//! - [`batch`]: shared precondition, concurrent fan-out and the batch report
//! - [`pipeline`]: stages, transitions and the eligibility gate
//! - [`workflow`]: one transition's round trip, including the refresh
//!
//! The engine never writes capacity or stage locally; the source of truth
//! is a [`PlacementBackend`] and every view is re-read after a round.

pub mod backend;
pub mod batch;
pub mod candidate;
pub mod capacity;
pub mod error;
pub mod memory;
pub mod pipeline;
pub mod request;
pub mod resource;
pub mod selection;
pub mod window;
pub mod wire;
pub mod workflow;

pub use backend::{
    AssignmentCall, AssignmentResult, BatchCall, BatchResponse, BatchShape, PlacementBackend,
    ProgramRecord,
};
pub use batch::{BatchAssignmentCoordinator, BatchOutcome, BatchReport};
pub use candidate::Candidate;
pub use capacity::{remaining_capacity, selectable, Capacity};
pub use error::{
    AssignmentError, BackendError, EngineError, FailureKind, Field, PreconditionProblem,
    SelectionError, SharedPreconditionError, ValidationError,
};
pub use memory::InMemoryBackend;
pub use pipeline::{eligible, PipelineStage, PipelineStatusGate, Transition};
pub use request::{AssignmentRequestBuilder, ValidRequest};
pub use resource::{
    CapacityCounts, ManagerRole, ManagerSlot, Resource, ResourceCatalog, ResourceKind,
};
pub use selection::ResourceSelection;
pub use window::{
    classify, classify_history, AssignmentWindow, ClassifiedWindow, DateBound, ValidWindow,
    WindowStatus,
};
pub use workflow::{AssignmentRound, AssignmentWorkflow};

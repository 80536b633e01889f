//! Backend interface for the source of truth.
//!
//! The engine reads candidates, resources and program records through this
//! trait and issues assignment mutations through it. Implementations:
//! - `cohortctl`'s HTTP backend
//! - [`InMemoryBackend`](crate::memory::InMemoryBackend) for tests and demos

use async_trait::async_trait;
use cohort_id::{AssignmentId, CandidateId, ResourceId};
use serde::{Deserialize, Serialize};

use crate::candidate::Candidate;
use crate::error::BackendError;
use crate::pipeline::{PipelineStage, Transition};
use crate::resource::{ManagerRole, Resource, ResourceKind};

/// How a backend accepts multi-candidate assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchShape {
    /// One single-assignment call per candidate, aggregated by the engine.
    #[default]
    FanOut,
    /// A native endpoint that takes every candidate id at once.
    Endpoint,
}

/// One assignment mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentCall {
    pub candidate_id: CandidateId,
    pub resource_id: ResourceId,
    pub resource_kind: ResourceKind,
    pub transition: Transition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager_role: Option<ManagerRole>,
    pub start_date: String,
    pub end_date: String,
    #[serde(flatten)]
    pub aux: serde_json::Map<String, serde_json::Value>,
}

/// A multi-candidate assignment mutation for [`BatchShape::Endpoint`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCall {
    pub candidate_ids: Vec<CandidateId>,
    pub resource_id: ResourceId,
    pub resource_kind: ResourceKind,
    pub transition: Transition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager_role: Option<ManagerRole>,
    pub start_date: String,
    pub end_date: String,
    #[serde(flatten)]
    pub aux: serde_json::Map<String, serde_json::Value>,
}

/// Successful assignment as acknowledged by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentResult {
    pub candidate_id: CandidateId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment_id: Option<AssignmentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<ResourceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A per-candidate rejection inside a batch endpoint response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedAssignment {
    pub candidate_id: CandidateId,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default, alias = "error", alias = "reason")]
    pub message: Option<String>,
}

/// Response of a batch endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    #[serde(default)]
    pub successful_assignments: Vec<AssignmentResult>,
    #[serde(default)]
    pub failed_assignments: Vec<FailedAssignment>,
}

/// An induction program (or similar) shared by every candidate of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramRecord {
    #[serde(alias = "_id")]
    pub id: ResourceId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

/// Source of truth for candidates, resources and assignments.
#[async_trait]
pub trait PlacementBackend: Send + Sync {
    /// List candidates, optionally filtered to one stage.
    async fn list_candidates(
        &self,
        stage: Option<PipelineStage>,
    ) -> Result<Vec<Candidate>, BackendError>;

    /// List resources of one kind with their capacity figures.
    async fn list_resources(&self, kind: ResourceKind) -> Result<Vec<Resource>, BackendError>;

    /// Fetch a shared program record.
    async fn fetch_program(&self, id: &ResourceId) -> Result<ProgramRecord, BackendError>;

    /// Assign one candidate.
    async fn assign(&self, call: &AssignmentCall) -> Result<AssignmentResult, BackendError>;

    fn batch_shape(&self) -> BatchShape {
        BatchShape::FanOut
    }

    /// Assign many candidates in one call. Only used for [`BatchShape::Endpoint`].
    async fn assign_batch(&self, _call: &BatchCall) -> Result<BatchResponse, BackendError> {
        Err(BackendError::Unsupported("batch assignment endpoint"))
    }
}

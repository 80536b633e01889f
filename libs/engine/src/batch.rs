//! Batch assignment: shared precondition, concurrent fan-out, aggregation.
//!
//! # Invariants
//!
//! - A report holds exactly one outcome per submitted candidate
//! - One candidate's failure never cancels or skips another candidate
//! - Outcomes are ordered by candidate id, never by arrival order
//! - A failed shared precondition aborts before any assignment call

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use cohort_id::CandidateId;
use futures_util::future::join_all;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use tracing::{debug, info, instrument, warn};

use crate::backend::{
    AssignmentCall, AssignmentResult, BatchCall, BatchResponse, BatchShape, PlacementBackend,
    ProgramRecord,
};
use crate::error::{
    AssignmentError, BackendError, FailureKind, PreconditionProblem, SharedPreconditionError,
};
use crate::request::ValidRequest;
use crate::window::{DateBound, ValidWindow};

/// Result of one candidate's assignment within a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub candidate_id: CandidateId,
    pub result: Result<AssignmentResult, AssignmentError>,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&AssignmentError> {
        self.result.as_ref().err()
    }
}

impl Serialize for BatchOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("BatchOutcome", 3)?;
        state.serialize_field("candidateId", &self.candidate_id)?;
        state.serialize_field("success", &self.is_success())?;
        match &self.result {
            Ok(data) => state.serialize_field("data", data)?,
            Err(err) => state.serialize_field(
                "error",
                &OutcomeError {
                    kind: err.kind(),
                    status: err.status(),
                    message: err.to_string(),
                },
            )?,
        }
        state.end()
    }
}

#[derive(Serialize)]
struct OutcomeError {
    kind: FailureKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    message: String,
}

/// Aggregated outcome of one submitted batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    success_count: usize,
    failure_count: usize,
    outcomes: Vec<BatchOutcome>,
}

impl BatchReport {
    /// Build a report; outcomes are sorted by candidate id.
    pub fn from_outcomes(mut outcomes: Vec<BatchOutcome>) -> Self {
        outcomes.sort_by(|a, b| a.candidate_id.cmp(&b.candidate_id));
        let success_count = outcomes.iter().filter(|o| o.is_success()).count();
        Self {
            failure_count: outcomes.len() - success_count,
            success_count,
            outcomes,
        }
    }

    pub fn success_count(&self) -> usize {
        self.success_count
    }

    pub fn failure_count(&self) -> usize {
        self.failure_count
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn outcomes(&self) -> &[BatchOutcome] {
        &self.outcomes
    }

    pub fn failures(&self) -> impl Iterator<Item = &BatchOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn all_succeeded(&self) -> bool {
        self.failure_count == 0
    }

    /// Combined message, e.g. `2 of 3 assigned; 1 failed`.
    pub fn summary(&self) -> String {
        if self.failure_count == 0 {
            format!("{} of {} assigned", self.success_count, self.total())
        } else {
            format!(
                "{} of {} assigned; {} failed",
                self.success_count,
                self.total(),
                self.failure_count
            )
        }
    }

    /// True when the cached candidate/resource views are now stale.
    pub fn needs_refresh(&self) -> bool {
        self.success_count > 0
            || self
                .failures()
                .filter_map(BatchOutcome::error)
                .any(AssignmentError::invalidates_view)
    }

    /// True when any call reported an expired session.
    pub fn requires_reauthentication(&self) -> bool {
        self.failures()
            .filter_map(BatchOutcome::error)
            .any(AssignmentError::is_auth)
    }
}

impl Serialize for BatchReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("BatchReport", 4)?;
        state.serialize_field("successCount", &self.success_count)?;
        state.serialize_field("failureCount", &self.failure_count)?;
        state.serialize_field("summary", &self.summary())?;
        state.serialize_field("outcomes", &self.outcomes)?;
        state.end()
    }
}

/// Executes validated requests against a backend.
pub struct BatchAssignmentCoordinator {
    backend: Arc<dyn PlacementBackend>,
}

impl BatchAssignmentCoordinator {
    pub fn new(backend: Arc<dyn PlacementBackend>) -> Self {
        Self { backend }
    }

    /// Run a request to completion.
    ///
    /// Only a failed shared precondition is returned as an error; every
    /// per-candidate failure lands in the report.
    #[instrument(
        skip(self, request),
        fields(
            transition = %request.transition,
            resource_id = %request.resource_id,
            candidates = request.candidate_ids.len(),
        )
    )]
    pub async fn execute(
        &self,
        request: &ValidRequest,
    ) -> Result<BatchReport, SharedPreconditionError> {
        let window = self.resolve_window(request).await?;

        let outcomes = if request.candidate_ids.len() == 1 {
            self.assign_single(request, &window).await
        } else {
            match self.backend.batch_shape() {
                BatchShape::FanOut => self.fan_out(request, &window).await,
                BatchShape::Endpoint => self.via_endpoint(request, &window).await,
            }
        };

        let report = BatchReport::from_outcomes(outcomes);
        debug_assert_eq!(report.total(), request.candidate_ids.len());

        for failure in report.failures() {
            if let Some(err) = failure.error() {
                warn!(
                    candidate_id = %failure.candidate_id,
                    kind = ?err.kind(),
                    error = %err,
                    "Candidate assignment failed"
                );
            }
        }

        info!(
            success_count = report.success_count(),
            failure_count = report.failure_count(),
            "{}",
            report.summary()
        );

        Ok(report)
    }

    /// Validate the shared program once and settle the window to send.
    async fn resolve_window(
        &self,
        request: &ValidRequest,
    ) -> Result<ValidWindow, SharedPreconditionError> {
        let Some(program_id) = &request.shared_program else {
            // The builder only leaves the window empty when a program is named.
            return request.window.ok_or_else(|| SharedPreconditionError {
                program_id: request.resource_id.clone(),
                problem: PreconditionProblem::MissingField("window"),
            });
        };

        debug!(program_id = %program_id, "Fetching shared program");
        let program = self
            .backend
            .fetch_program(program_id)
            .await
            .map_err(|e| SharedPreconditionError {
                program_id: program_id.clone(),
                problem: PreconditionProblem::Unavailable(AssignmentError::from_backend(e)),
            })?;

        let program_window =
            validate_program(&program).map_err(|problem| SharedPreconditionError {
                program_id: program_id.clone(),
                problem,
            })?;

        Ok(request.window.unwrap_or(program_window))
    }

    async fn assign_single(
        &self,
        request: &ValidRequest,
        window: &ValidWindow,
    ) -> Vec<BatchOutcome> {
        let mut outcomes = Vec::with_capacity(1);
        for candidate_id in &request.candidate_ids {
            outcomes.push(self.assign_one(request, window, candidate_id).await);
        }
        outcomes
    }

    /// One call per candidate, all outstanding at once, joined on every call.
    async fn fan_out(&self, request: &ValidRequest, window: &ValidWindow) -> Vec<BatchOutcome> {
        let calls = request
            .candidate_ids
            .iter()
            .map(|candidate_id| self.assign_one(request, window, candidate_id));

        join_all(calls).await
    }

    async fn assign_one(
        &self,
        request: &ValidRequest,
        window: &ValidWindow,
        candidate_id: &CandidateId,
    ) -> BatchOutcome {
        let call = AssignmentCall {
            candidate_id: candidate_id.clone(),
            resource_id: request.resource_id.clone(),
            resource_kind: request.resource_kind,
            transition: request.transition,
            manager_role: request.manager_role,
            start_date: window.start.to_string(),
            end_date: window.end.to_string(),
            aux: request.aux.clone(),
        };

        debug!(candidate_id = %candidate_id, "Issuing assignment");
        let result = self
            .backend
            .assign(&call)
            .await
            .map_err(AssignmentError::from_backend);

        BatchOutcome {
            candidate_id: candidate_id.clone(),
            result,
        }
    }

    async fn via_endpoint(
        &self,
        request: &ValidRequest,
        window: &ValidWindow,
    ) -> Vec<BatchOutcome> {
        let call = BatchCall {
            candidate_ids: request.candidate_ids.iter().cloned().collect(),
            resource_id: request.resource_id.clone(),
            resource_kind: request.resource_kind,
            transition: request.transition,
            manager_role: request.manager_role,
            start_date: window.start.to_string(),
            end_date: window.end.to_string(),
            aux: request.aux.clone(),
        };

        match self.backend.assign_batch(&call).await {
            Ok(response) => outcomes_from_response(&request.candidate_ids, response),
            Err(e) => {
                let err = AssignmentError::from_backend(e);
                request
                    .candidate_ids
                    .iter()
                    .map(|candidate_id| BatchOutcome {
                        candidate_id: candidate_id.clone(),
                        result: Err(err.clone()),
                    })
                    .collect()
            }
        }
    }
}

/// Map a batch endpoint response onto the submitted candidates.
///
/// Unmentioned candidates become [`AssignmentError::Unreported`]; a
/// candidate listed as both succeeded and failed is counted as failed.
pub fn outcomes_from_response(
    submitted: &BTreeSet<CandidateId>,
    response: BatchResponse,
) -> Vec<BatchOutcome> {
    let mut results: BTreeMap<CandidateId, Result<AssignmentResult, AssignmentError>> =
        BTreeMap::new();

    for success in response.successful_assignments {
        if !submitted.contains(&success.candidate_id) {
            warn!(
                candidate_id = %success.candidate_id,
                "Batch response names a candidate that was not submitted"
            );
            continue;
        }
        results.insert(success.candidate_id.clone(), Ok(success));
    }

    for failure in response.failed_assignments {
        if !submitted.contains(&failure.candidate_id) {
            warn!(
                candidate_id = %failure.candidate_id,
                "Batch response names a candidate that was not submitted"
            );
            continue;
        }
        let err = AssignmentError::from_backend(BackendError::Api {
            // Per-candidate rejections without a status are client errors.
            status: failure.status.unwrap_or(400),
            message: failure
                .message
                .unwrap_or_else(|| "assignment rejected".to_string()),
        });
        if let Some(Ok(_)) = results.insert(failure.candidate_id.clone(), Err(err)) {
            warn!(
                candidate_id = %failure.candidate_id,
                "Batch response lists candidate as both assigned and failed"
            );
        }
    }

    submitted
        .iter()
        .map(|candidate_id| BatchOutcome {
            candidate_id: candidate_id.clone(),
            result: results
                .remove(candidate_id)
                .unwrap_or(Err(AssignmentError::Unreported)),
        })
        .collect()
}

/// Required-field check for a shared program; yields its window.
pub fn validate_program(program: &ProgramRecord) -> Result<ValidWindow, PreconditionProblem> {
    if program
        .name
        .as_deref()
        .map_or(true, |n| n.trim().is_empty())
    {
        return Err(PreconditionProblem::MissingField("name"));
    }

    let start = required_date("startDate", program.start_date.as_deref())?;
    let end = required_date("endDate", program.end_date.as_deref())?;

    ValidWindow::new(start, end).ok_or(PreconditionProblem::EndsBeforeStart)
}

fn required_date(field: &'static str, raw: Option<&str>) -> Result<DateBound, PreconditionProblem> {
    let raw = raw
        .filter(|r| !r.trim().is_empty())
        .ok_or(PreconditionProblem::MissingField(field))?;
    DateBound::parse(raw).ok_or_else(|| PreconditionProblem::InvalidDate {
        field,
        value: raw.to_string(),
    })
}

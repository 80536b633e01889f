//! In-memory placement backend for testing and development.
//!
//! Behaves like a small source of truth: it enforces stage, capacity and
//! slot rules, moves candidates to the transition's target stage and keeps
//! capacity counters. It also records call counts and the peak number of
//! concurrently outstanding assignment calls.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use cohort_id::{AssignmentId, CandidateId, ResourceId};
use tracing::{debug, info};

use crate::backend::{
    AssignmentCall, AssignmentResult, BatchCall, BatchResponse, BatchShape, FailedAssignment,
    PlacementBackend, ProgramRecord,
};
use crate::candidate::Candidate;
use crate::capacity::Capacity;
use crate::error::BackendError;
use crate::pipeline::PipelineStage;
use crate::resource::{CapacityCounts, Resource, ResourceKind};
use crate::window::AssignmentWindow;

#[derive(Default)]
struct State {
    candidates: BTreeMap<CandidateId, Candidate>,
    resources: BTreeMap<ResourceId, Resource>,
    programs: BTreeMap<ResourceId, ProgramRecord>,
    /// Failures returned instead of applying an assignment.
    injected: BTreeMap<CandidateId, BackendError>,
    session_expired: bool,
}

/// Mock backend holding candidates, resources and programs in memory.
pub struct InMemoryBackend {
    state: Mutex<State>,
    shape: BatchShape,
    assign_calls: AtomicUsize,
    batch_calls: AtomicUsize,
    program_fetches: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    assignment_counter: AtomicU64,
}

impl InMemoryBackend {
    /// Create an empty backend using per-candidate fan-out.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            shape: BatchShape::FanOut,
            assign_calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
            program_fetches: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            assignment_counter: AtomicU64::new(0),
        }
    }

    /// Create an empty backend that exposes a native batch endpoint.
    pub fn with_batch_endpoint() -> Self {
        Self {
            shape: BatchShape::Endpoint,
            ..Self::new()
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert_candidate(&self, candidate: Candidate) {
        self.state().candidates.insert(candidate.id.clone(), candidate);
    }

    pub fn insert_resource(&self, resource: Resource) {
        self.state().resources.insert(resource.id.clone(), resource);
    }

    pub fn remove_resource(&self, id: &ResourceId) -> Option<Resource> {
        self.state().resources.remove(id)
    }

    pub fn insert_program(&self, program: ProgramRecord) {
        self.state().programs.insert(program.id.clone(), program);
    }

    /// Make every assignment of `candidate_id` fail with `err`.
    pub fn fail_candidate(&self, candidate_id: CandidateId, err: BackendError) {
        self.state().injected.insert(candidate_id, err);
    }

    /// Answer every subsequent call with 401.
    pub fn expire_session(&self) {
        self.state().session_expired = true;
    }

    pub fn candidate(&self, id: &CandidateId) -> Option<Candidate> {
        self.state().candidates.get(id).cloned()
    }

    pub fn resource(&self, id: &ResourceId) -> Option<Resource> {
        self.state().resources.get(id).cloned()
    }

    /// Number of single-assignment calls received.
    pub fn assign_calls(&self) -> usize {
        self.assign_calls.load(Ordering::SeqCst)
    }

    /// Number of batch endpoint calls received.
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn program_fetches(&self) -> usize {
        self.program_fetches.load(Ordering::SeqCst)
    }

    /// Peak number of assignment calls outstanding at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn check_session(&self) -> Result<(), BackendError> {
        if self.state().session_expired {
            return Err(api(401, "Session expired, please log in again"));
        }
        Ok(())
    }

    fn next_assignment_id(&self) -> Option<AssignmentId> {
        let n = self.assignment_counter.fetch_add(1, Ordering::SeqCst) + 1;
        AssignmentId::parse(&format!("asg-{n:06}")).ok()
    }

    /// Apply one assignment atomically under the state lock.
    fn apply(&self, call: &AssignmentCall) -> Result<AssignmentResult, BackendError> {
        let mut guard = self.state();
        let state = &mut *guard;

        if state.session_expired {
            return Err(api(401, "Session expired, please log in again"));
        }
        if let Some(err) = state.injected.get(&call.candidate_id) {
            return Err(err.clone());
        }

        let candidate = state
            .candidates
            .get_mut(&call.candidate_id)
            .ok_or_else(|| api(404, format!("Candidate {} not found", call.candidate_id)))?;
        let resource = state
            .resources
            .get_mut(&call.resource_id)
            .ok_or_else(|| api(404, format!("Resource {} not found", call.resource_id)))?;

        if resource.kind != call.resource_kind {
            return Err(api(
                400,
                format!("Resource {} is not a {}", resource.id, call.resource_kind),
            ));
        }

        let predecessor = call.transition.predecessor();
        if candidate.stage != Some(predecessor) {
            return Err(api(
                400,
                format!("Candidate must be in stage {predecessor} for {}", call.transition),
            ));
        }

        if candidate
            .assignments
            .iter()
            .any(|w| w.is_current && w.resource_id == resource.id)
        {
            return Err(api(400, "Candidate already assigned to this resource"));
        }

        if !resource.is_selectable() {
            return Err(api(400, "No available seats remaining"));
        }

        if resource.has_slots() {
            let role = call
                .manager_role
                .ok_or_else(|| api(400, "managerRole is required for this resource"))?;
            let slot = resource
                .manager_slots
                .iter_mut()
                .find(|s| s.role == role)
                .ok_or_else(|| api(400, format!("Resource has no {role} manager")))?;
            if !slot.is_selectable() {
                return Err(api(400, "Manager has no remaining allocation"));
            }
            consume(&mut slot.capacity);
        }
        consume(&mut resource.capacity);

        for window in candidate.assignments.iter_mut() {
            if window.is_current && window.resource_kind == Some(call.resource_kind) {
                window.is_current = false;
            }
        }
        candidate.assignments.push(AssignmentWindow {
            candidate_id: call.candidate_id.clone(),
            resource_id: call.resource_id.clone(),
            resource_kind: Some(call.resource_kind),
            start_date: Some(call.start_date.clone()),
            end_date: Some(call.end_date.clone()),
            is_current: true,
        });
        candidate.stage = Some(call.transition.target());

        Ok(AssignmentResult {
            candidate_id: call.candidate_id.clone(),
            assignment_id: self.next_assignment_id(),
            resource_id: Some(call.resource_id.clone()),
            message: None,
        })
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks outstanding assignment calls.
struct InFlight<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

fn api(status: u16, message: impl Into<String>) -> BackendError {
    BackendError::Api {
        status,
        message: message.into(),
    }
}

/// Record one allocation against whichever figures the resource carries.
fn consume(counts: &mut CapacityCounts) {
    match counts.allocated.as_mut() {
        Some(allocated) => *allocated += 1,
        None if counts.total.is_some() => counts.allocated = Some(1),
        None => {}
    }
    if let Some(remaining) = counts.remaining.as_mut() {
        *remaining -= 1;
    }
}

#[async_trait]
impl PlacementBackend for InMemoryBackend {
    async fn list_candidates(
        &self,
        stage: Option<PipelineStage>,
    ) -> Result<Vec<Candidate>, BackendError> {
        self.check_session()?;
        Ok(self
            .state()
            .candidates
            .values()
            .filter(|c| stage.is_none() || c.stage == stage)
            .cloned()
            .collect())
    }

    async fn list_resources(&self, kind: ResourceKind) -> Result<Vec<Resource>, BackendError> {
        self.check_session()?;
        Ok(self
            .state()
            .resources
            .values()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect())
    }

    async fn fetch_program(&self, id: &ResourceId) -> Result<ProgramRecord, BackendError> {
        self.program_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_session()?;
        self.state()
            .programs
            .get(id)
            .cloned()
            .ok_or_else(|| api(404, format!("Program {id} not found")))
    }

    async fn assign(&self, call: &AssignmentCall) -> Result<AssignmentResult, BackendError> {
        self.assign_calls.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight::enter(&self.in_flight, &self.max_in_flight);

        debug!(
            candidate_id = %call.candidate_id,
            resource_id = %call.resource_id,
            "[MOCK] Assigning candidate"
        );

        // Let sibling calls start before this one settles.
        tokio::task::yield_now().await;

        self.apply(call)
    }

    fn batch_shape(&self) -> BatchShape {
        self.shape
    }

    async fn assign_batch(&self, call: &BatchCall) -> Result<BatchResponse, BackendError> {
        if self.shape != BatchShape::Endpoint {
            return Err(BackendError::Unsupported("batch assignment endpoint"));
        }
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.check_session()?;

        info!(
            candidates = call.candidate_ids.len(),
            resource_id = %call.resource_id,
            "[MOCK] Batch assignment"
        );

        let mut response = BatchResponse::default();
        for candidate_id in &call.candidate_ids {
            let single = AssignmentCall {
                candidate_id: candidate_id.clone(),
                resource_id: call.resource_id.clone(),
                resource_kind: call.resource_kind,
                transition: call.transition,
                manager_role: call.manager_role,
                start_date: call.start_date.clone(),
                end_date: call.end_date.clone(),
                aux: call.aux.clone(),
            };
            match self.apply(&single) {
                Ok(result) => response.successful_assignments.push(result),
                Err(BackendError::Api { status, message }) => {
                    response.failed_assignments.push(FailedAssignment {
                        candidate_id: candidate_id.clone(),
                        status: Some(status),
                        message: Some(message),
                    })
                }
                Err(other) => response.failed_assignments.push(FailedAssignment {
                    candidate_id: candidate_id.clone(),
                    status: None,
                    message: Some(other.to_string()),
                }),
            }
        }

        Ok(response)
    }
}

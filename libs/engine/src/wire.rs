//! Boundary normalization of upstream payloads.
//!
//! Upstream sources disagree on envelope and field names. Everything is
//! folded into [`Resource`] and [`Candidate`] here; nothing deeper in the
//! engine looks at payload shape.
//!
//! Entries that cannot be normalized (bad id, wrong type) are dropped with
//! a warning instead of failing the whole listing.

use cohort_id::{AssignmentId, CandidateId, ResourceId};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

use crate::backend::{AssignmentResult, ProgramRecord};
use crate::candidate::Candidate;
use crate::error::BackendError;
use crate::pipeline::PipelineStage;
use crate::resource::{CapacityCounts, ManagerRole, ManagerSlot, Resource, ResourceKind};
use crate::window::AssignmentWindow;

/// A listing sent either as `{"data": [...]}` or as a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Wrapped { data: Vec<T> },
    Bare(Vec<T>),
}

impl<T> Listing<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Wrapped { data } | Self::Bare(data) => data,
        }
    }
}

/// A single record sent either as `{"data": {...}}` or bare.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Single<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Single<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Wrapped { data } | Self::Bare(data) => data,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawResource {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default, alias = "title")]
    pub name: Option<String>,
    #[serde(default, alias = "type")]
    pub kind: Option<String>,
    #[serde(default, alias = "capacity", alias = "totalSeats")]
    pub total_capacity: Option<i64>,
    #[serde(default, alias = "allocated", alias = "occupiedSeats")]
    pub allocated_count: Option<i64>,
    #[serde(default, alias = "availableSeats", alias = "remainingAllocation")]
    pub remaining_capacity: Option<i64>,
    #[serde(default, alias = "managers")]
    pub manager_slots: Vec<RawSlot>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSlot {
    #[serde(alias = "type")]
    pub role: String,
    #[serde(default, alias = "managerName")]
    pub name: Option<String>,
    #[serde(default, alias = "capacity", alias = "totalSeats")]
    pub total_capacity: Option<i64>,
    #[serde(default, alias = "allocated", alias = "occupiedSeats")]
    pub allocated_count: Option<i64>,
    #[serde(default, alias = "availableSeats", alias = "remainingAllocation")]
    pub remaining_capacity: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCandidate {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default, alias = "fullName")]
    pub name: Option<String>,
    #[serde(default, alias = "status", alias = "pipelineStage")]
    pub stage: Option<String>,
    #[serde(default, alias = "placements")]
    pub assignments: Vec<RawWindow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawWindow {
    #[serde(alias = "resource")]
    pub resource_id: String,
    #[serde(default, alias = "type")]
    pub resource_kind: Option<String>,
    #[serde(default, alias = "from")]
    pub start_date: Option<String>,
    #[serde(default, alias = "to")]
    pub end_date: Option<String>,
    #[serde(default, alias = "current")]
    pub is_current: bool,
}

/// Acknowledgement of a single assignment call.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAck {
    #[serde(default, alias = "_id", alias = "id")]
    pub assignment_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

fn counts(total: Option<i64>, allocated: Option<i64>, remaining: Option<i64>) -> CapacityCounts {
    CapacityCounts {
        total,
        allocated,
        remaining,
    }
}

/// Normalize one resource listed under `kind`.
pub fn normalize_resource(raw: RawResource, kind: ResourceKind) -> Option<Resource> {
    let id = match ResourceId::parse(&raw.id) {
        Ok(id) => id,
        Err(e) => {
            warn!(raw_id = %raw.id, error = %e, "Dropping resource with invalid id");
            return None;
        }
    };

    let listed_kind = match raw.kind.as_deref() {
        None => kind,
        Some(tag) => match ResourceKind::parse(tag) {
            Some(k) => k,
            None => {
                warn!(
                    resource_id = %id,
                    kind = tag,
                    "Unknown resource kind, assuming listed kind"
                );
                kind
            }
        },
    };

    let manager_slots = raw
        .manager_slots
        .into_iter()
        .filter_map(|slot| {
            let Some(role) = ManagerRole::parse(&slot.role) else {
                warn!(
                    resource_id = %id,
                    role = %slot.role,
                    "Dropping manager slot with unknown role"
                );
                return None;
            };
            Some(ManagerSlot {
                role,
                name: slot.name.unwrap_or_else(|| role.to_string()),
                capacity: counts(
                    slot.total_capacity,
                    slot.allocated_count,
                    slot.remaining_capacity,
                ),
            })
        })
        .collect();

    Some(Resource {
        name: raw.name.unwrap_or_else(|| id.to_string()),
        id,
        kind: listed_kind,
        capacity: counts(
            raw.total_capacity,
            raw.allocated_count,
            raw.remaining_capacity,
        ),
        manager_slots,
    })
}

/// Normalize one candidate. Unknown stages become `None`.
pub fn normalize_candidate(raw: RawCandidate) -> Option<Candidate> {
    let id = match CandidateId::parse(&raw.id) {
        Ok(id) => id,
        Err(e) => {
            warn!(raw_id = %raw.id, error = %e, "Dropping candidate with invalid id");
            return None;
        }
    };

    let stage = raw.stage.as_deref().and_then(|tag| {
        let stage = PipelineStage::parse(tag);
        if stage.is_none() {
            warn!(candidate_id = %id, stage = tag, "Unknown pipeline stage");
        }
        stage
    });

    let assignments = raw
        .assignments
        .into_iter()
        .filter_map(|w| {
            let resource_id = match ResourceId::parse(&w.resource_id) {
                Ok(r) => r,
                Err(e) => {
                    warn!(
                        candidate_id = %id,
                        error = %e,
                        "Dropping assignment with invalid resource id"
                    );
                    return None;
                }
            };
            Some(AssignmentWindow {
                candidate_id: id.clone(),
                resource_id,
                resource_kind: w.resource_kind.as_deref().and_then(ResourceKind::parse),
                start_date: w.start_date,
                end_date: w.end_date,
                is_current: w.is_current,
            })
        })
        .collect();

    Some(Candidate {
        id,
        name: raw.name,
        stage,
        assignments,
    })
}

/// Decode a listing entry by entry, dropping entries that do not deserialize.
fn decode_listing<T: DeserializeOwned>(
    body: serde_json::Value,
    what: &'static str,
) -> Result<Vec<T>, BackendError> {
    let entries = serde_json::from_value::<Listing<serde_json::Value>>(body)
        .map_err(|e| BackendError::Decode(format!("{what} listing: {e}")))?
        .into_vec();

    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<T>(entry) {
            Ok(raw) => Some(raw),
            Err(e) => {
                warn!(error = %e, "Dropping malformed {} entry", what);
                None
            }
        })
        .collect())
}

pub fn resources_from_json(
    body: serde_json::Value,
    kind: ResourceKind,
) -> Result<Vec<Resource>, BackendError> {
    Ok(decode_listing::<RawResource>(body, "resource")?
        .into_iter()
        .filter_map(|raw| normalize_resource(raw, kind))
        .collect())
}

pub fn candidates_from_json(body: serde_json::Value) -> Result<Vec<Candidate>, BackendError> {
    Ok(decode_listing::<RawCandidate>(body, "candidate")?
        .into_iter()
        .filter_map(normalize_candidate)
        .collect())
}

pub fn program_from_json(body: serde_json::Value) -> Result<ProgramRecord, BackendError> {
    serde_json::from_value::<Single<ProgramRecord>>(body)
        .map(Single::into_inner)
        .map_err(|e| BackendError::Decode(format!("program record: {e}")))
}

/// Turn a single-assignment acknowledgement into a result for `candidate_id`.
///
/// An empty or unrecognized body still counts as success; the status code
/// already said so.
pub fn assignment_ack(
    body: Option<serde_json::Value>,
    candidate_id: &CandidateId,
) -> AssignmentResult {
    let ack = body
        .and_then(|b| serde_json::from_value::<Single<RawAck>>(b).ok())
        .map(Single::into_inner)
        .unwrap_or_default();

    AssignmentResult {
        candidate_id: candidate_id.clone(),
        assignment_id: ack
            .assignment_id
            .and_then(|raw| AssignmentId::parse(&raw).ok()),
        resource_id: None,
        message: ack.message,
    }
}

//! Pipeline stages, assignment transitions and the eligibility gate.
//!
//! Each transition declares its predecessor stage statically; a candidate is
//! offered for a transition only while its current stage equals that
//! predecessor.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, instrument, warn};

use crate::backend::PlacementBackend;
use crate::candidate::Candidate;
use crate::error::AssignmentError;
use crate::resource::{normalize_tag, ResourceKind};

/// A step in a candidate's fixed-order progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStage {
    Submitted,
    Approved,
    InterviewScheduled,
    InterviewPassed,
    InductionAssigned,
    InductionPassed,
    PlacementAssigned,
}

impl PipelineStage {
    /// All stages, in pipeline order.
    pub const ORDER: [PipelineStage; 7] = [
        Self::Submitted,
        Self::Approved,
        Self::InterviewScheduled,
        Self::InterviewPassed,
        Self::InductionAssigned,
        Self::InductionPassed,
        Self::PlacementAssigned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::InterviewScheduled => "interview-scheduled",
            Self::InterviewPassed => "interview-passed",
            Self::InductionAssigned => "induction-assigned",
            Self::InductionPassed => "induction-passed",
            Self::PlacementAssigned => "placement-assigned",
        }
    }

    /// Parse any common spelling (`interview_passed`, `Interview Passed`, ...).
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = normalize_tag(s);
        Self::ORDER.into_iter().find(|st| st.as_str() == normalized)
    }

    /// The stage that follows this one, if any.
    pub fn next(&self) -> Option<Self> {
        let idx = Self::ORDER.iter().position(|s| s == self)?;
        Self::ORDER.get(idx + 1).copied()
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PipelineStage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown pipeline stage {raw:?}")))
    }
}

/// An assignment step that moves candidates onto a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transition {
    ScheduleInterview,
    AssignInduction,
    AssignScheme,
    AssignStation,
}

impl Transition {
    pub const ALL: [Transition; 4] = [
        Self::ScheduleInterview,
        Self::AssignInduction,
        Self::AssignScheme,
        Self::AssignStation,
    ];

    /// Stage a candidate must be in to be offered for this transition.
    pub const fn predecessor(&self) -> PipelineStage {
        match self {
            Self::ScheduleInterview => PipelineStage::Approved,
            Self::AssignInduction => PipelineStage::InterviewPassed,
            Self::AssignScheme => PipelineStage::InductionPassed,
            Self::AssignStation => PipelineStage::PlacementAssigned,
        }
    }

    /// Stage a candidate reaches once assigned.
    pub const fn target(&self) -> PipelineStage {
        match self {
            Self::ScheduleInterview => PipelineStage::InterviewScheduled,
            Self::AssignInduction => PipelineStage::InductionAssigned,
            Self::AssignScheme => PipelineStage::PlacementAssigned,
            // Station rotation keeps the placement stage.
            Self::AssignStation => PipelineStage::PlacementAssigned,
        }
    }

    /// Kind of resource this transition allocates.
    pub const fn resource_kind(&self) -> ResourceKind {
        match self {
            Self::ScheduleInterview => ResourceKind::InterviewPanel,
            Self::AssignInduction => ResourceKind::Induction,
            Self::AssignScheme => ResourceKind::Scheme,
            Self::AssignStation => ResourceKind::Station,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScheduleInterview => "schedule-interview",
            Self::AssignInduction => "assign-induction",
            Self::AssignScheme => "assign-scheme",
            Self::AssignStation => "assign-station",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let normalized = normalize_tag(s);
        Self::ALL.into_iter().find(|t| t.as_str() == normalized)
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candidates whose current stage equals `stage`, in input order.
pub fn eligible(candidates: &[Candidate], stage: PipelineStage) -> Vec<&Candidate> {
    candidates
        .iter()
        .filter(|c| c.stage == Some(stage))
        .collect()
}

/// The pool of candidates offered for one transition.
///
/// The gate keeps no write-through cache: after any assignment round its
/// view must be replaced with [`PipelineStatusGate::refresh`].
pub struct PipelineStatusGate {
    backend: Arc<dyn PlacementBackend>,
    transition: Transition,
    candidates: Vec<Candidate>,
}

impl PipelineStatusGate {
    pub fn new(backend: Arc<dyn PlacementBackend>, transition: Transition) -> Self {
        Self {
            backend,
            transition,
            candidates: Vec::new(),
        }
    }

    pub fn transition(&self) -> Transition {
        self.transition
    }

    /// Eligible candidates from the last refresh.
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Re-fetch the predecessor stage from the source of truth.
    #[instrument(skip(self), fields(transition = %self.transition))]
    pub async fn refresh(&mut self) -> Result<&[Candidate], AssignmentError> {
        let stage = self.transition.predecessor();
        let listed = self.backend.list_candidates(Some(stage)).await?;
        let listed_count = listed.len();

        let mut candidates: Vec<Candidate> = listed
            .into_iter()
            .filter(|c| c.stage == Some(stage))
            .collect();
        candidates.sort_by(|a, b| a.id.cmp(&b.id));

        if candidates.len() != listed_count {
            warn!(
                stage = %stage,
                listed = listed_count,
                kept = candidates.len(),
                "Candidate listing returned candidates outside the requested stage"
            );
        }
        debug!(eligible = candidates.len(), "Pipeline gate refreshed");

        self.candidates = candidates;
        Ok(&self.candidates)
    }
}

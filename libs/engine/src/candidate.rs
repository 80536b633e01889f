//! Candidates as seen by the engine.

use cohort_id::CandidateId;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::pipeline::PipelineStage;
use crate::resource::ResourceKind;
use crate::window::AssignmentWindow;

/// A candidate moving through the placement pipeline.
///
/// `stage` is `None` when the source reported a stage the engine does not
/// know; such candidates are never eligible for any transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: CandidateId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub stage: Option<PipelineStage>,
    #[serde(default)]
    pub assignments: Vec<AssignmentWindow>,
}

impl Candidate {
    /// The window flagged current for a resource kind.
    ///
    /// Upstream should flag at most one; if it flags several, the one that
    /// starts last wins.
    pub fn current_assignment(&self, kind: ResourceKind) -> Option<&AssignmentWindow> {
        let mut current = self
            .assignments
            .iter()
            .filter(|w| w.is_current && w.resource_kind == Some(kind));

        let first = current.next()?;
        let rest: Vec<&AssignmentWindow> = current.collect();
        if rest.is_empty() {
            return Some(first);
        }

        warn!(
            candidate_id = %self.id,
            kind = %kind,
            flagged = rest.len() + 1,
            "Multiple assignments flagged current"
        );

        std::iter::once(first)
            .chain(rest)
            .max_by_key(|w| w.start_bound().and_then(|b| b.first_instant()))
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }
}

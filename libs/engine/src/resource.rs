//! Capacity-bounded resources and the catalog that lists them.
//!
//! A resource is a scheme, a rotational station, an induction program or an
//! interview panel. Schemes additionally expose [`ManagerSlot`]s, each with
//! an allocation that is independent of its siblings.

use std::fmt;
use std::sync::Arc;

use cohort_id::ResourceId;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::backend::PlacementBackend;
use crate::capacity::{self, Capacity};
use crate::error::AssignmentError;

/// Kind of assignable resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Scheme,
    Station,
    Induction,
    InterviewPanel,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        Self::Scheme,
        Self::Station,
        Self::Induction,
        Self::InterviewPanel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheme => "scheme",
            Self::Station => "station",
            Self::Induction => "induction",
            Self::InterviewPanel => "interview-panel",
        }
    }

    /// Parse a wire or command-line spelling (`interview_panel`, `Interview Panel`, ...).
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = normalize_tag(s);
        Self::ALL.into_iter().find(|k| k.as_str() == normalized)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a manager slot within a scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManagerRole {
    Primary,
    Secondary,
    Mentor,
}

impl ManagerRole {
    pub const ALL: [ManagerRole; 3] = [Self::Primary, Self::Secondary, Self::Mentor];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Mentor => "mentor",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let normalized = normalize_tag(s);
        Self::ALL.into_iter().find(|r| r.as_str() == normalized)
    }
}

impl fmt::Display for ManagerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lower-case and join words with `-`.
pub(crate) fn normalize_tag(s: &str) -> String {
    s.trim()
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Capacity figures exactly as the source of truth provided them.
///
/// A source may send `total` and `allocated`, a precomputed `remaining`, or
/// all three. [`capacity::remaining_capacity`] reconciles them; nothing else
/// should subtract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityCounts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocated: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<i64>,
}

impl CapacityCounts {
    pub fn from_total(total: i64, allocated: i64) -> Self {
        Self {
            total: Some(total),
            allocated: Some(allocated),
            remaining: None,
        }
    }

    pub fn from_remaining(remaining: i64) -> Self {
        Self {
            total: None,
            allocated: None,
            remaining: Some(remaining),
        }
    }
}

/// A manager's allocation within a scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerSlot {
    pub role: ManagerRole,
    pub name: String,
    pub capacity: CapacityCounts,
}

impl Capacity for ManagerSlot {
    fn counts(&self) -> &CapacityCounts {
        &self.capacity
    }
}

/// An assignable, capacity-bounded resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub name: String,
    pub capacity: CapacityCounts,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub manager_slots: Vec<ManagerSlot>,
}

impl Resource {
    pub fn slot(&self, role: ManagerRole) -> Option<&ManagerSlot> {
        self.manager_slots.iter().find(|s| s.role == role)
    }

    pub fn has_slots(&self) -> bool {
        !self.manager_slots.is_empty()
    }
}

impl Capacity for Resource {
    fn counts(&self) -> &CapacityCounts {
        &self.capacity
    }
}

/// The resources of one kind, as last read from the backend.
///
/// The catalog never adjusts capacity locally: after an assignment the only
/// way to see new figures is [`ResourceCatalog::refresh`].
pub struct ResourceCatalog {
    backend: Arc<dyn PlacementBackend>,
    kind: ResourceKind,
    resources: Vec<Resource>,
}

impl ResourceCatalog {
    /// Create an empty catalog; call [`refresh`](Self::refresh) to load it.
    pub fn new(backend: Arc<dyn PlacementBackend>, kind: ResourceKind) -> Self {
        Self {
            backend,
            kind,
            resources: Vec::new(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Replace the cached listing with a fresh read.
    #[instrument(skip(self), fields(kind = %self.kind))]
    pub async fn refresh(&mut self) -> Result<&[Resource], AssignmentError> {
        let mut resources = self.backend.list_resources(self.kind).await?;
        resources.retain(|r| r.kind == self.kind);
        resources.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        debug!(
            total = resources.len(),
            selectable = capacity::selectable(&resources).len(),
            "Resource catalog refreshed"
        );

        self.resources = resources;
        Ok(&self.resources)
    }

    /// Every resource, including exhausted ones (read-only contexts).
    pub fn all(&self) -> &[Resource] {
        &self.resources
    }

    /// Resources that may be offered for a new assignment.
    pub fn selectable(&self) -> Vec<&Resource> {
        capacity::selectable(&self.resources)
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.iter().find(|r| &r.id == id)
    }

    /// Display name for a resource id, falling back to the id itself.
    pub fn display_name(&self, id: &ResourceId) -> String {
        self.get(id)
            .map(|r| r.name.clone())
            .unwrap_or_else(|| id.to_string())
    }
}

//! Typed ID definitions for every entity the engine references.

use crate::define_id;

// =============================================================================
// Pipeline
// =============================================================================

define_id!(CandidateId, "candidate id");

// =============================================================================
// Capacity-bounded resources (schemes, stations, inductions, panels)
// =============================================================================

define_id!(ResourceId, "resource id");

// =============================================================================
// Assignments
// =============================================================================

define_id!(AssignmentId, "assignment id");

// =============================================================================
// Tests
// =============================================================================

//! Validation and assembly of an assignment intent.
//!
//! Building is pure: it never touches the backend. The first unmet
//! requirement is reported as a field-specific [`ValidationError`].

use std::collections::BTreeSet;

use cohort_id::{CandidateId, ResourceId};

use crate::error::{Field, ValidationError};
use crate::pipeline::Transition;
use crate::resource::{ManagerRole, ResourceKind};
use crate::selection::ResourceSelection;
use crate::window::{DateBound, ValidWindow};

/// Keys the engine sets itself; auxiliary fields may not override them.
pub const RESERVED_AUX_FIELDS: &[&str] = &[
    "candidateId",
    "candidateIds",
    "resourceId",
    "resourceKind",
    "transition",
    "managerRole",
    "startDate",
    "endDate",
];

/// A validated assignment request, ready for the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidRequest {
    pub transition: Transition,
    pub candidate_ids: BTreeSet<CandidateId>,
    pub resource_id: ResourceId,
    pub resource_kind: ResourceKind,
    pub manager_role: Option<ManagerRole>,
    /// `None` only when a shared program supplies the window.
    pub window: Option<ValidWindow>,
    pub aux: serde_json::Map<String, serde_json::Value>,
    pub shared_program: Option<ResourceId>,
}

/// Builder for [`ValidRequest`].
#[derive(Debug, Clone)]
pub struct AssignmentRequestBuilder {
    transition: Transition,
    candidate_ids: Vec<CandidateId>,
    selection: ResourceSelection,
    start: Option<String>,
    end: Option<String>,
    aux: serde_json::Map<String, serde_json::Value>,
    shared_program: Option<ResourceId>,
}

impl AssignmentRequestBuilder {
    pub fn new(transition: Transition) -> Self {
        Self {
            transition,
            candidate_ids: Vec::new(),
            selection: ResourceSelection::default(),
            start: None,
            end: None,
            aux: serde_json::Map::new(),
            shared_program: None,
        }
    }

    pub fn candidate(mut self, id: CandidateId) -> Self {
        self.candidate_ids.push(id);
        self
    }

    pub fn candidates(mut self, ids: impl IntoIterator<Item = CandidateId>) -> Self {
        self.candidate_ids.extend(ids);
        self
    }

    pub fn selection(mut self, selection: ResourceSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn start(mut self, start: impl Into<String>) -> Self {
        self.start = Some(start.into());
        self
    }

    pub fn end(mut self, end: impl Into<String>) -> Self {
        self.end = Some(end.into());
        self
    }

    pub fn window(self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.start(start).end(end)
    }

    pub fn aux(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.aux.insert(key.into(), value);
        self
    }

    /// Name a program record every candidate of the batch shares.
    pub fn shared_program(mut self, id: ResourceId) -> Self {
        self.shared_program = Some(id);
        self
    }

    pub fn build(self) -> Result<ValidRequest, ValidationError> {
        let candidate_ids: BTreeSet<CandidateId> = self.candidate_ids.into_iter().collect();
        if candidate_ids.is_empty() {
            return Err(ValidationError::MissingField(Field::CandidateIds));
        }

        let resource = self
            .selection
            .resource()
            .ok_or(ValidationError::MissingField(Field::Resource))?;

        let expected = self.transition.resource_kind();
        if resource.kind != expected {
            return Err(ValidationError::WrongResourceKind {
                resource_id: resource.id.clone(),
                transition: self.transition,
                expected,
                actual: resource.kind,
            });
        }

        if resource.has_slots() && self.selection.slot_role().is_none() {
            return Err(ValidationError::MissingField(Field::ManagerSlot));
        }

        let window = match (self.start, self.end) {
            (None, None) if self.shared_program.is_some() => None,
            (start, end) => Some(validate_window(start, end)?),
        };

        if let Some(key) = self
            .aux
            .keys()
            .find(|k| RESERVED_AUX_FIELDS.contains(&k.as_str()))
        {
            return Err(ValidationError::ReservedAuxField(key.clone()));
        }

        Ok(ValidRequest {
            transition: self.transition,
            candidate_ids,
            resource_id: resource.id.clone(),
            resource_kind: resource.kind,
            manager_role: self.selection.slot_role(),
            window,
            aux: self.aux,
            shared_program: self.shared_program,
        })
    }
}

fn validate_window(
    start: Option<String>,
    end: Option<String>,
) -> Result<ValidWindow, ValidationError> {
    let start = present(start).ok_or(ValidationError::MissingField(Field::WindowStart))?;
    let end = present(end).ok_or(ValidationError::MissingField(Field::WindowEnd))?;

    let start_bound = DateBound::parse(&start).ok_or_else(|| ValidationError::InvalidDate {
        field: Field::WindowStart,
        value: start.clone(),
    })?;
    let end_bound = DateBound::parse(&end).ok_or_else(|| ValidationError::InvalidDate {
        field: Field::WindowEnd,
        value: end.clone(),
    })?;

    ValidWindow::new(start_bound, end_bound)
        .ok_or(ValidationError::WindowEndsBeforeStart { start, end })
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{CapacityCounts, ManagerSlot, Resource};
    use rstest::rstest;

    fn station(remaining: i64) -> Resource {
        Resource {
            id: ResourceId::parse("st-1").unwrap(),
            kind: ResourceKind::Station,
            name: "North".into(),
            capacity: CapacityCounts::from_remaining(remaining),
            manager_slots: vec![],
        }
    }

    fn scheme_with_slots() -> Resource {
        Resource {
            id: ResourceId::parse("scheme-1").unwrap(),
            kind: ResourceKind::Scheme,
            name: "Graduate".into(),
            capacity: CapacityCounts::from_total(10, 3),
            manager_slots: vec![
                ManagerSlot {
                    role: ManagerRole::Primary,
                    name: "Ada".into(),
                    capacity: CapacityCounts::from_remaining(2),
                },
                ManagerSlot {
                    role: ManagerRole::Secondary,
                    name: "Grace".into(),
                    capacity: CapacityCounts::from_remaining(1),
                },
            ],
        }
    }

    fn selected(resource: &Resource) -> ResourceSelection {
        let mut sel = ResourceSelection::new();
        sel.select_resource(resource).unwrap();
        sel
    }

    fn cand(id: &str) -> CandidateId {
        CandidateId::parse(id).unwrap()
    }

    #[test]
    fn test_build_valid_station_request() {
        let req = AssignmentRequestBuilder::new(Transition::AssignStation)
            .candidates([cand("c-2"), cand("c-1"), cand("c-2")])
            .selection(selected(&station(2)))
            .window("2024-01-01", "2024-01-31")
            .aux("notes", serde_json::json!("night shift"))
            .build()
            .unwrap();

        let ids: Vec<&str> = req.candidate_ids.iter().map(|c| c.as_str()).collect();
        assert_eq!(ids, vec!["c-1", "c-2"]);
        assert_eq!(req.resource_id.as_str(), "st-1");
        assert_eq!(req.manager_role, None);
        let window = req.window.unwrap();
        assert_eq!(window.start.to_string(), "2024-01-01");
        assert_eq!(window.end.to_string(), "2024-01-31");
    }

    #[test]
    fn test_end_before_start_is_rejected_not_swapped() {
        let err = AssignmentRequestBuilder::new(Transition::AssignStation)
            .candidate(cand("c-1"))
            .selection(selected(&station(2)))
            .window("2024-03-10", "2024-03-01")
            .build()
            .unwrap_err();

        assert_eq!(
            err,
            ValidationError::WindowEndsBeforeStart {
                start: "2024-03-10".into(),
                end: "2024-03-01".into(),
            }
        );
        assert_eq!(err.field(), Field::WindowEnd);
    }

    #[rstest]
    #[case(None, Some("2024-01-31"), Field::WindowStart)]
    #[case(Some("2024-01-01"), None, Field::WindowEnd)]
    #[case(Some("  "), Some("2024-01-31"), Field::WindowStart)]
    fn test_missing_window_bound(
        #[case] start: Option<&str>,
        #[case] end: Option<&str>,
        #[case] field: Field,
    ) {
        let mut builder = AssignmentRequestBuilder::new(Transition::AssignStation)
            .candidate(cand("c-1"))
            .selection(selected(&station(2)));
        if let Some(s) = start {
            builder = builder.start(s);
        }
        if let Some(e) = end {
            builder = builder.end(e);
        }

        assert_eq!(
            builder.build().unwrap_err(),
            ValidationError::MissingField(field)
        );
    }

    #[test]
    fn test_invalid_date_names_field() {
        let err = AssignmentRequestBuilder::new(Transition::AssignStation)
            .candidate(cand("c-1"))
            .selection(selected(&station(2)))
            .window("2024-01-01", "next tuesday")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidDate {
                field: Field::WindowEnd,
                ..
            }
        ));
    }

    #[test]
    fn test_first_unmet_field_wins() {
        let err = AssignmentRequestBuilder::new(Transition::AssignStation)
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingField(Field::CandidateIds));

        let err = AssignmentRequestBuilder::new(Transition::AssignStation)
            .candidate(cand("c-1"))
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingField(Field::Resource));
    }

    #[test]
    fn test_manager_slot_required_when_not_auto_selected() {
        let scheme = scheme_with_slots();
        let err = AssignmentRequestBuilder::new(Transition::AssignScheme)
            .candidate(cand("c-1"))
            .selection(selected(&scheme))
            .window("2024-01-01", "2024-12-31")
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingField(Field::ManagerSlot));

        let mut sel = selected(&scheme);
        sel.select_slot(ManagerRole::Secondary).unwrap();
        let req = AssignmentRequestBuilder::new(Transition::AssignScheme)
            .candidate(cand("c-1"))
            .selection(sel)
            .window("2024-01-01", "2024-12-31")
            .build()
            .unwrap();
        assert_eq!(req.manager_role, Some(ManagerRole::Secondary));
    }

    #[test]
    fn test_wrong_resource_kind() {
        let err = AssignmentRequestBuilder::new(Transition::AssignScheme)
            .candidate(cand("c-1"))
            .selection(selected(&station(2)))
            .window("2024-01-01", "2024-12-31")
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::WrongResourceKind { .. }));
    }

    #[test]
    fn test_shared_program_may_supply_window() {
        let induction = Resource {
            id: ResourceId::parse("ind-1").unwrap(),
            kind: ResourceKind::Induction,
            name: "Spring induction".into(),
            capacity: CapacityCounts::from_remaining(30),
            manager_slots: vec![],
        };

        let req = AssignmentRequestBuilder::new(Transition::AssignInduction)
            .candidate(cand("c-1"))
            .selection(selected(&induction))
            .shared_program(ResourceId::parse("prog-1").unwrap())
            .build()
            .unwrap();
        assert!(req.window.is_none());
        assert_eq!(req.shared_program.unwrap().as_str(), "prog-1");
    }

    #[test]
    fn test_reserved_aux_field() {
        let err = AssignmentRequestBuilder::new(Transition::AssignStation)
            .candidate(cand("c-1"))
            .selection(selected(&station(2)))
            .window("2024-01-01", "2024-01-31")
            .aux("resourceId", serde_json::json!("other"))
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::ReservedAuxField("resourceId".into()));
    }
}

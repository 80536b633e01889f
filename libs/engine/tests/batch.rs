//! Integration tests for batch assignment against the in-memory backend.

use std::sync::Arc;

use cohort_engine::backend::ProgramRecord;
use cohort_engine::error::PreconditionProblem;
use cohort_engine::{
    AssignmentRequestBuilder, AssignmentWorkflow, BackendError, BatchAssignmentCoordinator,
    Candidate, Capacity, CapacityCounts, EngineError, FailureKind, InMemoryBackend, ManagerRole,
    ManagerSlot, PipelineStage, Resource, ResourceKind, ResourceSelection, Transition,
};
use cohort_id::{CandidateId, ResourceId};
use proptest::prelude::*;

fn candidate(id: &str, stage: PipelineStage) -> Candidate {
    Candidate {
        id: CandidateId::parse(id).unwrap(),
        name: Some(format!("Candidate {id}")),
        stage: Some(stage),
        assignments: vec![],
    }
}

fn resource(id: &str, kind: ResourceKind, capacity: CapacityCounts) -> Resource {
    Resource {
        id: ResourceId::parse(id).unwrap(),
        kind,
        name: id.to_string(),
        capacity,
        manager_slots: vec![],
    }
}

fn cand(id: &str) -> CandidateId {
    CandidateId::parse(id).unwrap()
}

fn selected(resource: &Resource) -> ResourceSelection {
    let mut sel = ResourceSelection::new();
    sel.select_resource(resource).unwrap();
    sel
}

/// Backend with `n` placed candidates and one station of `seats` seats.
fn station_backend(n: usize, seats: i64) -> (Arc<InMemoryBackend>, Resource) {
    let backend = Arc::new(InMemoryBackend::new());
    for i in 1..=n {
        backend.insert_candidate(candidate(&format!("c-{i}"), PipelineStage::PlacementAssigned));
    }
    let station = resource(
        "st-north",
        ResourceKind::Station,
        CapacityCounts::from_remaining(seats),
    );
    backend.insert_resource(station.clone());
    (backend, station)
}

fn induction_program(id: &str) -> ProgramRecord {
    ProgramRecord {
        id: ResourceId::parse(id).unwrap(),
        name: Some("Spring induction".into()),
        start_date: Some("2024-04-01".into()),
        end_date: Some("2024-04-05".into()),
        location: Some("Main campus".into()),
    }
}

#[tokio::test]
async fn test_partial_batch_reports_each_candidate() {
    let (backend, station) = station_backend(3, 2);
    let coordinator = BatchAssignmentCoordinator::new(backend.clone());

    let request = AssignmentRequestBuilder::new(Transition::AssignStation)
        .candidates([cand("c-1"), cand("c-2"), cand("c-3")])
        .selection(selected(&station))
        .window("2024-01-01", "2024-01-31")
        .build()
        .unwrap();

    let report = coordinator.execute(&request).await.unwrap();

    assert_eq!(report.success_count(), 2);
    assert_eq!(report.failure_count(), 1);
    assert_eq!(report.summary(), "2 of 3 assigned; 1 failed");
    assert_eq!(report.outcomes().len(), 3);

    let failure = report.failures().next().unwrap();
    assert_eq!(failure.error().unwrap().kind(), FailureKind::Capacity);
    assert!(report.needs_refresh());
    assert_eq!(backend.assign_calls(), 3);
}

#[tokio::test]
async fn test_fan_out_is_concurrent() {
    let (backend, station) = station_backend(5, 10);
    let coordinator = BatchAssignmentCoordinator::new(backend.clone());

    let request = AssignmentRequestBuilder::new(Transition::AssignStation)
        .candidates((1..=5).map(|i| cand(&format!("c-{i}"))))
        .selection(selected(&station))
        .window("2024-01-01", "2024-01-31")
        .build()
        .unwrap();

    let report = coordinator.execute(&request).await.unwrap();
    assert!(report.all_succeeded());
    assert_eq!(backend.max_in_flight(), 5);
}

#[tokio::test]
async fn test_outcomes_sorted_by_candidate_id() {
    let (backend, station) = station_backend(4, 10);
    backend.fail_candidate(
        cand("c-2"),
        BackendError::Network("connection reset".into()),
    );
    let coordinator = BatchAssignmentCoordinator::new(backend.clone());

    let request = AssignmentRequestBuilder::new(Transition::AssignStation)
        .candidates([cand("c-4"), cand("c-2"), cand("c-3"), cand("c-1")])
        .selection(selected(&station))
        .window("2024-01-01", "2024-01-31")
        .build()
        .unwrap();

    let report = coordinator.execute(&request).await.unwrap();
    let ids: Vec<&str> = report
        .outcomes()
        .iter()
        .map(|o| o.candidate_id.as_str())
        .collect();
    assert_eq!(ids, vec!["c-1", "c-2", "c-3", "c-4"]);
    assert_eq!(
        report.outcomes()[1].error().unwrap().kind(),
        FailureKind::Network
    );
    assert_eq!(report.success_count(), 3);
}

#[tokio::test]
async fn test_shared_program_fetched_once() {
    let backend = Arc::new(InMemoryBackend::new());
    for i in 1..=4 {
        backend.insert_candidate(candidate(&format!("c-{i}"), PipelineStage::InterviewPassed));
    }
    let induction = resource(
        "ind-spring",
        ResourceKind::Induction,
        CapacityCounts::from_total(30, 0),
    );
    backend.insert_resource(induction.clone());
    backend.insert_program(induction_program("prog-spring"));

    let coordinator = BatchAssignmentCoordinator::new(backend.clone());
    let request = AssignmentRequestBuilder::new(Transition::AssignInduction)
        .candidates((1..=4).map(|i| cand(&format!("c-{i}"))))
        .selection(selected(&induction))
        .shared_program(ResourceId::parse("prog-spring").unwrap())
        .build()
        .unwrap();

    let report = coordinator.execute(&request).await.unwrap();
    assert_eq!(report.success_count(), 4);
    assert_eq!(backend.program_fetches(), 1);

    let c1 = backend.candidate(&cand("c-1")).unwrap();
    assert_eq!(c1.stage, Some(PipelineStage::InductionAssigned));
    assert_eq!(c1.assignments[0].start_date.as_deref(), Some("2024-04-01"));
    assert_eq!(c1.assignments[0].end_date.as_deref(), Some("2024-04-05"));
}

#[tokio::test]
async fn test_invalid_shared_program_aborts_before_fan_out() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.insert_candidate(candidate("c-1", PipelineStage::InterviewPassed));
    backend.insert_candidate(candidate("c-2", PipelineStage::InterviewPassed));
    let induction = resource(
        "ind-spring",
        ResourceKind::Induction,
        CapacityCounts::from_total(30, 0),
    );
    backend.insert_resource(induction.clone());
    backend.insert_program(ProgramRecord {
        end_date: None,
        ..induction_program("prog-spring")
    });

    let coordinator = BatchAssignmentCoordinator::new(backend.clone());
    let request = AssignmentRequestBuilder::new(Transition::AssignInduction)
        .candidates([cand("c-1"), cand("c-2")])
        .selection(selected(&induction))
        .shared_program(ResourceId::parse("prog-spring").unwrap())
        .build()
        .unwrap();

    let err = coordinator.execute(&request).await.unwrap_err();
    assert_eq!(err.problem, PreconditionProblem::MissingField("endDate"));
    assert_eq!(backend.program_fetches(), 1);
    assert_eq!(backend.assign_calls(), 0);
}

#[tokio::test]
async fn test_missing_shared_program_aborts() {
    let (backend, station) = station_backend(2, 5);
    let coordinator = BatchAssignmentCoordinator::new(backend.clone());

    let request = AssignmentRequestBuilder::new(Transition::AssignStation)
        .candidates([cand("c-1"), cand("c-2")])
        .selection(selected(&station))
        .window("2024-01-01", "2024-01-31")
        .shared_program(ResourceId::parse("prog-missing").unwrap())
        .build()
        .unwrap();

    let err = coordinator.execute(&request).await.unwrap_err();
    assert!(matches!(err.problem, PreconditionProblem::Unavailable(_)));
    assert_eq!(backend.assign_calls(), 0);
}

#[tokio::test]
async fn test_batch_endpoint_shape_matches_fan_out() {
    let backend = Arc::new(InMemoryBackend::with_batch_endpoint());
    for i in 1..=3 {
        backend.insert_candidate(candidate(&format!("c-{i}"), PipelineStage::PlacementAssigned));
    }
    let station = resource(
        "st-north",
        ResourceKind::Station,
        CapacityCounts::from_remaining(2),
    );
    backend.insert_resource(station.clone());

    let coordinator = BatchAssignmentCoordinator::new(backend.clone());
    let request = AssignmentRequestBuilder::new(Transition::AssignStation)
        .candidates([cand("c-1"), cand("c-2"), cand("c-3")])
        .selection(selected(&station))
        .window("2024-01-01", "2024-01-31")
        .build()
        .unwrap();

    let report = coordinator.execute(&request).await.unwrap();
    assert_eq!(report.summary(), "2 of 3 assigned; 1 failed");
    assert_eq!(backend.batch_calls(), 1);
    assert_eq!(backend.assign_calls(), 0);
}

#[tokio::test]
async fn test_single_candidate_skips_batch_endpoint() {
    let backend = Arc::new(InMemoryBackend::with_batch_endpoint());
    backend.insert_candidate(candidate("c-1", PipelineStage::PlacementAssigned));
    let station = resource(
        "st-north",
        ResourceKind::Station,
        CapacityCounts::from_remaining(1),
    );
    backend.insert_resource(station.clone());

    let coordinator = BatchAssignmentCoordinator::new(backend.clone());
    let request = AssignmentRequestBuilder::new(Transition::AssignStation)
        .candidate(cand("c-1"))
        .selection(selected(&station))
        .window("2024-01-01", "2024-01-31")
        .build()
        .unwrap();

    let report = coordinator.execute(&request).await.unwrap();
    assert_eq!(report.summary(), "1 of 1 assigned");
    assert_eq!(backend.assign_calls(), 1);
    assert_eq!(backend.batch_calls(), 0);
}

#[tokio::test]
async fn test_failed_batch_endpoint_call_fails_every_candidate() {
    let backend = Arc::new(InMemoryBackend::with_batch_endpoint());
    for i in 1..=3 {
        backend.insert_candidate(candidate(&format!("c-{i}"), PipelineStage::PlacementAssigned));
    }
    let station = resource(
        "st-north",
        ResourceKind::Station,
        CapacityCounts::from_remaining(3),
    );
    backend.insert_resource(station.clone());
    backend.expire_session();

    let coordinator = BatchAssignmentCoordinator::new(backend.clone());
    let request = AssignmentRequestBuilder::new(Transition::AssignStation)
        .candidates([cand("c-1"), cand("c-2"), cand("c-3")])
        .selection(selected(&station))
        .window("2024-01-01", "2024-01-31")
        .build()
        .unwrap();

    let report = coordinator.execute(&request).await.unwrap();
    assert_eq!(report.outcomes().len(), 3);
    assert_eq!(report.success_count(), 0);
    for outcome in report.outcomes() {
        assert_eq!(outcome.error().unwrap().kind(), FailureKind::Auth);
    }
    assert!(report.requires_reauthentication());
    assert_eq!(backend.batch_calls(), 1);
    assert_eq!(backend.assign_calls(), 0);
    assert_eq!(
        backend.resource(&station.id).unwrap().remaining_capacity(),
        3
    );
}

#[tokio::test]
async fn test_scheme_slot_allocation_is_independent() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.insert_candidate(candidate("c-1", PipelineStage::InductionPassed));
    backend.insert_candidate(candidate("c-2", PipelineStage::InductionPassed));
    let scheme = Resource {
        id: ResourceId::parse("scheme-grad").unwrap(),
        kind: ResourceKind::Scheme,
        name: "Graduate".into(),
        capacity: CapacityCounts::from_total(10, 0),
        manager_slots: vec![
            ManagerSlot {
                role: ManagerRole::Primary,
                name: "Ada".into(),
                capacity: CapacityCounts::from_remaining(1),
            },
            ManagerSlot {
                role: ManagerRole::Secondary,
                name: "Grace".into(),
                capacity: CapacityCounts::from_remaining(3),
            },
        ],
    };
    backend.insert_resource(scheme.clone());

    let mut sel = selected(&scheme);
    sel.select_slot(ManagerRole::Primary).unwrap();

    let coordinator = BatchAssignmentCoordinator::new(backend.clone());
    let request = AssignmentRequestBuilder::new(Transition::AssignScheme)
        .candidates([cand("c-1"), cand("c-2")])
        .selection(sel)
        .window("2024-06-01", "2025-05-31")
        .build()
        .unwrap();

    let report = coordinator.execute(&request).await.unwrap();
    assert_eq!(report.success_count(), 1);
    assert_eq!(
        report.failures().next().unwrap().error().unwrap().kind(),
        FailureKind::Capacity
    );

    let after = backend.resource(&scheme.id).unwrap();
    assert_eq!(after.remaining_capacity(), 9);
    assert_eq!(after.slot(ManagerRole::Primary).unwrap().remaining_capacity(), 0);
    assert_eq!(after.slot(ManagerRole::Secondary).unwrap().remaining_capacity(), 3);
}

#[tokio::test]
async fn test_workflow_refreshes_after_round() {
    let (backend, _) = station_backend(3, 2);
    backend.insert_resource(resource(
        "st-south",
        ResourceKind::Station,
        CapacityCounts::from_remaining(4),
    ));
    let mut workflow = AssignmentWorkflow::new(backend.clone(), Transition::AssignStation);
    workflow.load().await.unwrap();

    assert_eq!(workflow.eligible_candidates().len(), 3);
    assert_eq!(workflow.catalog().selectable().len(), 2);

    let north = workflow
        .catalog()
        .get(&ResourceId::parse("st-north").unwrap())
        .unwrap()
        .clone();
    let builder = workflow
        .builder()
        .candidates([cand("c-1"), cand("c-2")])
        .selection(selected(&north))
        .window("2024-02-01", "2024-02-29");

    let round = workflow.submit(builder).await.unwrap();
    assert!(round.report.all_succeeded());
    assert!(round.refreshed);
    assert!(round.refresh_error.is_none());

    // Station rotation keeps candidates eligible; north is now full.
    assert_eq!(workflow.eligible_candidates().len(), 3);
    let selectable: Vec<&str> = workflow
        .catalog()
        .selectable()
        .iter()
        .map(|r| r.id.as_str())
        .collect();
    assert_eq!(selectable, vec!["st-south"]);
    assert_eq!(workflow.catalog().all().len(), 2);
}

#[tokio::test]
async fn test_workflow_skips_refresh_on_expired_session() {
    let (backend, station) = station_backend(2, 5);
    let mut workflow = AssignmentWorkflow::new(backend.clone(), Transition::AssignStation);
    workflow.load().await.unwrap();
    backend.expire_session();

    let builder = workflow
        .builder()
        .candidates([cand("c-1"), cand("c-2")])
        .selection(selected(&station))
        .window("2024-02-01", "2024-02-29");

    let round = workflow.submit(builder).await.unwrap();
    assert!(round.report.requires_reauthentication());
    assert_eq!(round.report.failure_count(), 2);
    assert!(!round.refreshed);
    assert!(round.refresh_error.is_none());
}

#[tokio::test]
async fn test_workflow_validation_makes_no_calls() {
    let (backend, station) = station_backend(1, 5);
    let mut workflow = AssignmentWorkflow::new(backend.clone(), Transition::AssignStation);

    let builder = workflow
        .builder()
        .candidate(cand("c-1"))
        .selection(selected(&station))
        .window("2024-03-10", "2024-03-01");

    let err = workflow.submit(builder).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(backend.assign_calls(), 0);
}

#[tokio::test]
async fn test_workflow_load_failure() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.expire_session();
    let mut workflow = AssignmentWorkflow::new(backend, Transition::ScheduleInterview);

    let err = workflow.load().await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Load {
            what: "candidates",
            ..
        }
    ));
}

proptest! {
    #[test]
    fn prop_one_outcome_per_candidate(
        n in 1usize..12,
        seats in 0i64..12,
        failing in proptest::collection::vec(any::<bool>(), 12),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let (backend, station) = station_backend(n, seats.max(1));
        // Selection needs an open resource; shrink capacity afterwards.
        backend.insert_resource(resource(
            "st-north",
            ResourceKind::Station,
            CapacityCounts::from_remaining(seats),
        ));
        for i in 1..=n {
            if failing[i - 1] {
                backend.fail_candidate(
                    cand(&format!("c-{i}")),
                    BackendError::Api { status: 500, message: "boom".into() },
                );
            }
        }

        let request = AssignmentRequestBuilder::new(Transition::AssignStation)
            .candidates((1..=n).map(|i| cand(&format!("c-{i}"))))
            .selection(selected(&station))
            .window("2024-01-01", "2024-01-31")
            .build()
            .unwrap();

        let coordinator = BatchAssignmentCoordinator::new(backend.clone());
        let report = runtime.block_on(coordinator.execute(&request)).unwrap();

        prop_assert_eq!(report.outcomes().len(), n);
        prop_assert_eq!(report.success_count() + report.failure_count(), n);
        prop_assert!(report.success_count() <= seats as usize);
        prop_assert_eq!(backend.assign_calls(), n);
    }
}

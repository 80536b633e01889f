//! HTTP implementation of [`PlacementBackend`].
//!
//! Payloads are normalized with `cohort_engine::wire` as soon as they are
//! received.

use async_trait::async_trait;
use cohort_engine::wire::{self, RawCandidate, Single};
use cohort_engine::{
    AssignmentCall, AssignmentResult, BackendError, BatchCall, BatchResponse, BatchShape,
    Candidate, PipelineStage, PlacementBackend, ProgramRecord, Resource, ResourceKind,
};
use cohort_id::{CandidateId, ResourceId};

use crate::client::ApiClient;
use crate::error::CliError;

pub struct HttpBackend {
    client: ApiClient,
    shape: BatchShape,
}

impl HttpBackend {
    pub fn new(client: ApiClient, batch_endpoint: bool) -> Self {
        Self {
            client,
            shape: if batch_endpoint {
                BatchShape::Endpoint
            } else {
                BatchShape::FanOut
            },
        }
    }

    /// Fetch one candidate with its assignment history.
    pub async fn fetch_candidate(&self, id: &CandidateId) -> Result<Candidate, CliError> {
        let body: serde_json::Value = self
            .client
            .get(&["v1", "candidates", id.as_str()])
            .await
            .map_err(|e| match e {
                CliError::Api { status: 404, .. } => {
                    CliError::NotFound(format!("Candidate '{id}' not found"))
                }
                other => other,
            })?;

        let raw = serde_json::from_value::<Single<RawCandidate>>(body)
            .map(Single::into_inner)
            .map_err(|e| CliError::Other(anyhow::anyhow!("Failed to parse candidate: {e}")))?;

        wire::normalize_candidate(raw)
            .ok_or_else(|| CliError::Other(anyhow::anyhow!("Candidate '{id}' has an invalid id")))
    }
}

fn to_backend(err: CliError) -> BackendError {
    match err {
        CliError::NotAuthenticated => BackendError::Api {
            status: 401,
            message: "no stored token".to_string(),
        },
        CliError::Api {
            status, message, ..
        } => BackendError::Api { status, message },
        CliError::NotFound(message) => BackendError::Api {
            status: 404,
            message,
        },
        CliError::Network(e) => BackendError::Network(e.to_string()),
        other => BackendError::Decode(other.to_string()),
    }
}

#[async_trait]
impl PlacementBackend for HttpBackend {
    async fn list_candidates(
        &self,
        stage: Option<PipelineStage>,
    ) -> Result<Vec<Candidate>, BackendError> {
        let query: Vec<(&str, String)> = stage
            .map(|stage| ("stage", stage.to_string()))
            .into_iter()
            .collect();
        let body: serde_json::Value = self
            .client
            .get_with_query(&["v1", "candidates"], &query)
            .await
            .map_err(to_backend)?;
        wire::candidates_from_json(body)
    }

    async fn list_resources(&self, kind: ResourceKind) -> Result<Vec<Resource>, BackendError> {
        let body: serde_json::Value = self
            .client
            .get_with_query(&["v1", "resources"], &[("kind", kind.to_string())])
            .await
            .map_err(to_backend)?;
        wire::resources_from_json(body, kind)
    }

    async fn fetch_program(&self, id: &ResourceId) -> Result<ProgramRecord, BackendError> {
        let body: serde_json::Value = self
            .client
            .get(&["v1", "programs", id.as_str()])
            .await
            .map_err(to_backend)?;
        wire::program_from_json(body)
    }

    async fn assign(&self, call: &AssignmentCall) -> Result<AssignmentResult, BackendError> {
        let body = self
            .client
            .post_lenient(&["v1", "assignments"], call)
            .await
            .map_err(to_backend)?;
        Ok(wire::assignment_ack(body, &call.candidate_id))
    }

    fn batch_shape(&self) -> BatchShape {
        self.shape
    }

    async fn assign_batch(&self, call: &BatchCall) -> Result<BatchResponse, BackendError> {
        let response: Single<BatchResponse> = self
            .client
            .post(&["v1", "assignments", "batch"], call)
            .await
            .map_err(to_backend)?;
        Ok(response.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::Config;
    use cohort_engine::{
        AssignmentRequestBuilder, BatchAssignmentCoordinator, Capacity, FailureKind,
        ResourceSelection, Transition,
    };
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer, batch_endpoint: bool) -> HttpBackend {
        let config = Config {
            api_url: server.uri(),
            batch_endpoint,
        };
        HttpBackend::new(ApiClient::new(&config, None).unwrap(), batch_endpoint)
    }

    async fn mount_station(server: &MockServer, seats: i64) {
        Mock::given(method("GET"))
            .and(path("/v1/resources"))
            .and(query_param("kind", "station"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"_id": "st-north", "name": "North", "availableSeats": seats}]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_list_resources_normalizes() {
        let server = MockServer::start().await;
        mount_station(&server, 2).await;

        let resources = backend(&server, false)
            .list_resources(ResourceKind::Station)
            .await
            .unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].name, "North");
        assert_eq!(resources[0].remaining_capacity(), 2);
    }

    #[tokio::test]
    async fn test_list_candidates_passes_stage() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/candidates"))
            .and(query_param("stage", "interview-passed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"_id": "c-1", "stage": "interview_passed"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let candidates = backend(&server, false)
            .list_candidates(Some(PipelineStage::InterviewPassed))
            .await
            .unwrap();
        assert_eq!(candidates[0].stage, Some(PipelineStage::InterviewPassed));
    }

    #[tokio::test]
    async fn test_assign_errors_keep_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/assignments"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"message": "No available seats"})),
            )
            .mount(&server)
            .await;

        let call = AssignmentCall {
            candidate_id: CandidateId::parse("c-1").unwrap(),
            resource_id: ResourceId::parse("st-north").unwrap(),
            resource_kind: ResourceKind::Station,
            transition: Transition::AssignStation,
            manager_role: None,
            start_date: "2024-01-01".into(),
            end_date: "2024-01-31".into(),
            aux: serde_json::Map::new(),
        };

        let err = backend(&server, false).assign(&call).await.unwrap_err();
        assert_eq!(
            err,
            BackendError::Api {
                status: 400,
                message: "No available seats".into()
            }
        );
    }

    #[tokio::test]
    async fn test_fan_out_over_http() {
        let server = MockServer::start().await;
        mount_station(&server, 2).await;
        Mock::given(method("POST"))
            .and(path("/v1/assignments"))
            .and(body_partial_json(json!({"candidateId": "c-3"})))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "message": "Station is fully allocated"
            })))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/assignments"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"_id": "asg-1"})))
            .with_priority(2)
            .expect(2)
            .mount(&server)
            .await;

        let http = Arc::new(backend(&server, false));
        let station = http
            .list_resources(ResourceKind::Station)
            .await
            .unwrap()
            .remove(0);
        let mut selection = ResourceSelection::new();
        selection.select_resource(&station).unwrap();

        let request = AssignmentRequestBuilder::new(Transition::AssignStation)
            .candidates(["c-1", "c-2", "c-3"].map(|c| CandidateId::parse(c).unwrap()))
            .selection(selection)
            .window("2024-01-01", "2024-01-31")
            .build()
            .unwrap();

        let report = BatchAssignmentCoordinator::new(http)
            .execute(&request)
            .await
            .unwrap();
        assert_eq!(report.summary(), "2 of 3 assigned; 1 failed");
        let failed = report.failures().next().unwrap();
        assert_eq!(failed.candidate_id.as_str(), "c-3");
        assert_eq!(failed.error().unwrap().kind(), FailureKind::Capacity);
    }

    #[tokio::test]
    async fn test_batch_endpoint_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/assignments/batch"))
            .and(body_partial_json(json!({"candidateIds": ["c-1", "c-2"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "successfulAssignments": [{"candidateId": "c-1"}],
                    "failedAssignments": []
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let http = backend(&server, true);
        assert_eq!(http.batch_shape(), BatchShape::Endpoint);

        let call = BatchCall {
            candidate_ids: vec![
                CandidateId::parse("c-1").unwrap(),
                CandidateId::parse("c-2").unwrap(),
            ],
            resource_id: ResourceId::parse("st-north").unwrap(),
            resource_kind: ResourceKind::Station,
            transition: Transition::AssignStation,
            manager_role: None,
            start_date: "2024-01-01".into(),
            end_date: "2024-01-31".into(),
            aux: serde_json::Map::new(),
        };
        let response = http.assign_batch(&call).await.unwrap();
        assert_eq!(response.successful_assignments.len(), 1);
        assert!(response.failed_assignments.is_empty());
    }

    #[tokio::test]
    async fn test_expired_session_is_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/programs/prog-1"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = backend(&server, false)
            .fetch_program(&ResourceId::parse("prog-1").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Api { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_session_expiry_message_reaches_engine() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/assignments"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"message": "Session timed out"})),
            )
            .mount(&server)
            .await;

        let call = AssignmentCall {
            candidate_id: CandidateId::parse("c-1").unwrap(),
            resource_id: ResourceId::parse("st-north").unwrap(),
            resource_kind: ResourceKind::Station,
            transition: Transition::AssignStation,
            manager_role: None,
            start_date: "2024-01-01".into(),
            end_date: "2024-01-31".into(),
            aux: serde_json::Map::new(),
        };

        let err = backend(&server, false).assign(&call).await.unwrap_err();
        assert_eq!(
            err,
            BackendError::Api {
                status: 401,
                message: "Session timed out".into()
            }
        );
    }

    #[tokio::test]
    async fn test_ids_stay_inside_their_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/programs/spring%2F2024"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_id": "spring/2024",
                "name": "Spring",
                "startDate": "2024-04-01",
                "endDate": "2024-04-05"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/candidates/c%3F1"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let http = backend(&server, false);
        let program = http
            .fetch_program(&ResourceId::parse("spring/2024").unwrap())
            .await
            .unwrap();
        assert_eq!(program.id.as_str(), "spring/2024");

        let err = http
            .fetch_candidate(&CandidateId::parse("c?1").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_fetch_candidate_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/candidates/c-9"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = backend(&server, false)
            .fetch_candidate(&CandidateId::parse("c-9").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::NotFound(_)));
    }
}

//! One transition's assignment round: gate, catalog, build, execute, refresh.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::backend::PlacementBackend;
use crate::batch::{BatchAssignmentCoordinator, BatchReport};
use crate::candidate::Candidate;
use crate::error::{AssignmentError, EngineError};
use crate::pipeline::{PipelineStatusGate, Transition};
use crate::request::AssignmentRequestBuilder;
use crate::resource::ResourceCatalog;

/// Result of one submitted request.
#[derive(Debug)]
pub struct AssignmentRound {
    pub report: BatchReport,
    /// Whether the candidate and resource views were re-fetched.
    pub refreshed: bool,
    /// Set when the post-round refresh itself failed.
    pub refresh_error: Option<AssignmentError>,
}

/// Drives assignments for a single [`Transition`].
pub struct AssignmentWorkflow {
    transition: Transition,
    gate: PipelineStatusGate,
    catalog: ResourceCatalog,
    coordinator: BatchAssignmentCoordinator,
}

impl AssignmentWorkflow {
    pub fn new(backend: Arc<dyn PlacementBackend>, transition: Transition) -> Self {
        Self {
            transition,
            gate: PipelineStatusGate::new(backend.clone(), transition),
            catalog: ResourceCatalog::new(backend.clone(), transition.resource_kind()),
            coordinator: BatchAssignmentCoordinator::new(backend),
        }
    }

    pub fn transition(&self) -> Transition {
        self.transition
    }

    /// Fetch eligible candidates and resources.
    #[instrument(skip(self), fields(transition = %self.transition))]
    pub async fn load(&mut self) -> Result<(), EngineError> {
        self.gate
            .refresh()
            .await
            .map_err(|source| EngineError::Load {
                what: "candidates",
                source,
            })?;
        self.catalog
            .refresh()
            .await
            .map_err(|source| EngineError::Load {
                what: "resources",
                source,
            })?;
        Ok(())
    }

    pub fn eligible_candidates(&self) -> &[Candidate] {
        self.gate.candidates()
    }

    pub fn catalog(&self) -> &ResourceCatalog {
        &self.catalog
    }

    /// A builder for this workflow's transition.
    pub fn builder(&self) -> AssignmentRequestBuilder {
        AssignmentRequestBuilder::new(self.transition)
    }

    /// Validate, execute and, when the round changed upstream state, refresh.
    #[instrument(skip(self, builder), fields(transition = %self.transition))]
    pub async fn submit(
        &mut self,
        builder: AssignmentRequestBuilder,
    ) -> Result<AssignmentRound, EngineError> {
        let request = builder.build()?;
        let report = self.coordinator.execute(&request).await?;

        if report.requires_reauthentication() {
            warn!("Session expired during assignment round; skipping refresh");
            return Ok(AssignmentRound {
                report,
                refreshed: false,
                refresh_error: None,
            });
        }

        if !report.needs_refresh() {
            return Ok(AssignmentRound {
                report,
                refreshed: false,
                refresh_error: None,
            });
        }

        let refresh_error = self.refresh().await.err();
        if let Some(err) = &refresh_error {
            warn!(error = %err, "Failed to refresh after assignment round");
        } else {
            info!(
                eligible = self.gate.candidates().len(),
                selectable = self.catalog.selectable().len(),
                "Views refreshed after assignment round"
            );
        }

        Ok(AssignmentRound {
            report,
            refreshed: refresh_error.is_none(),
            refresh_error,
        })
    }

    async fn refresh(&mut self) -> Result<(), AssignmentError> {
        self.gate.refresh().await?;
        self.catalog.refresh().await?;
        Ok(())
    }
}

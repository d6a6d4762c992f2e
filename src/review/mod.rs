//! Editorial review of listening materials.
//!
//! A material starts `pending` and moves to `approved` or `rejected` through
//! exactly one review. `reset` is the administrative way back to `pending`.

use crate::batch::{BatchItem, BatchOutcome, BatchTask, ItemFailure};
use crate::error::{ReadLevelError, Result};
use crate::material::{ListeningMaterial, ReviewStatus};
use crate::store::ContentStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Reviews applied at once by `batch_review`.
const BATCH_REVIEW_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewVerdict {
    Approved,
    Rejected,
}

impl ReviewVerdict {
    pub fn status(self) -> ReviewStatus {
        match self {
            ReviewVerdict::Approved => ReviewStatus::Approved,
            ReviewVerdict::Rejected => ReviewStatus::Rejected,
        }
    }
}

impl std::str::FromStr for ReviewVerdict {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "approved" | "approve" => Ok(ReviewVerdict::Approved),
            "rejected" | "reject" => Ok(ReviewVerdict::Rejected),
            _ => Err(format!("Unknown verdict: {}. Use approved or rejected.", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewDecision {
    pub verdict: ReviewVerdict,
    /// 1-5
    pub rating: u8,
    pub feedback: String,
    #[serde(default)]
    pub reviewer: Option<String>,
}

impl ReviewDecision {
    pub fn validate(&self) -> Result<()> {
        if !(1..=5).contains(&self.rating) {
            return Err(ReadLevelError::Validation(format!(
                "Rating must be between 1 and 5, got {}",
                self.rating
            )));
        }
        if self.feedback.trim().is_empty() {
            return Err(ReadLevelError::Validation("Review feedback is empty".to_string()));
        }
        Ok(())
    }
}

/// One review of a material. The most recent record is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: Uuid,
    pub material_id: Uuid,
    pub status: ReviewStatus,
    pub rating: u8,
    pub feedback: String,
    pub reviewer: Option<String>,
    pub reviewed_at: DateTime<Utc>,
}

impl ReviewRecord {
    pub fn new(material_id: Uuid, decision: &ReviewDecision) -> Self {
        Self {
            id: Uuid::new_v4(),
            material_id,
            status: decision.verdict.status(),
            rating: decision.rating,
            feedback: decision.feedback.trim().to_string(),
            reviewer: decision.reviewer.clone(),
            reviewed_at: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct ReviewWorkflow {
    store: Arc<dyn ContentStore>,
}

impl ReviewWorkflow {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// Record a decision for a pending material.
    #[instrument(skip(self, decision), fields(verdict = ?decision.verdict))]
    pub async fn review(&self, material_id: Uuid, decision: &ReviewDecision) -> Result<ReviewRecord> {
        decision.validate()?;
        let record = ReviewRecord::new(material_id, decision);
        self.store.apply_review(&record).await?;
        info!("Material {} {}", material_id, record.status);
        Ok(record)
    }

    /// Return a reviewed material to `pending`.
    #[instrument(skip(self))]
    pub async fn reset(&self, material_id: Uuid) -> Result<ListeningMaterial> {
        let material = self.store.reset_review(material_id).await?;
        info!("Material {} reset to pending", material_id);
        Ok(material)
    }

    /// Apply the same decision to each material independently. The outcome
    /// lists ids in request order, with the reason for each failure.
    pub async fn batch_review(&self, material_ids: &[Uuid], decision: &ReviewDecision) -> Result<BatchOutcome> {
        decision.validate()?;

        let mut results = stream::iter(material_ids.iter().copied())
            .map(|id| async move { (id, self.review(id, decision).await) })
            .buffered(BATCH_REVIEW_CONCURRENCY);

        let mut outcome = BatchOutcome::default();
        while let Some((id, result)) = results.next().await {
            match result {
                Ok(_) => outcome.succeeded.push(id.to_string()),
                Err(e) => {
                    warn!("Review of {} failed: {}", id, e);
                    outcome.failed.push(ItemFailure {
                        target_id: id.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(outcome)
    }

    pub async fn history(&self, material_id: Uuid) -> Result<Vec<ReviewRecord>> {
        self.store.list_reviews(material_id).await
    }
}

/// Review job: each item's `target_id` is a material id and `params` a [`ReviewDecision`].
pub struct ReviewTask {
    workflow: ReviewWorkflow,
}

impl ReviewTask {
    pub fn new(workflow: ReviewWorkflow) -> Self {
        Self { workflow }
    }
}

#[async_trait]
impl BatchTask for ReviewTask {
    async fn execute(&self, item: &BatchItem) -> Result<serde_json::Value> {
        let material_id = Uuid::parse_str(&item.target_id)
            .map_err(|e| ReadLevelError::Validation(format!("Invalid material id '{}': {}", item.target_id, e)))?;
        let decision: ReviewDecision = serde_json::from_value(item.params.clone())?;
        let record = self.workflow.review(material_id, &decision).await?;
        Ok(serde_json::to_value(record)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BatchOrchestrator, JobKind};
    use crate::store::MemoryContentStore;

    fn decision(verdict: ReviewVerdict) -> ReviewDecision {
        ReviewDecision {
            verdict,
            rating: 4,
            feedback: "Clear pronunciation".into(),
            reviewer: Some("ana".into()),
        }
    }

    async fn setup(n: usize) -> (ReviewWorkflow, Arc<MemoryContentStore>, Vec<Uuid>) {
        let store = Arc::new(MemoryContentStore::new());
        let mut ids = Vec::new();
        for i in 0..n {
            let material = ListeningMaterial::new(format!("Story {}", i), "Once upon a time.");
            ids.push(material.id);
            store.insert_material(&material).await.unwrap();
        }
        (ReviewWorkflow::new(store.clone()), store, ids)
    }

    #[tokio::test]
    async fn test_review_moves_pending_material() {
        let (workflow, store, ids) = setup(1).await;

        let record = workflow.review(ids[0], &decision(ReviewVerdict::Approved)).await.unwrap();
        assert_eq!(record.status, ReviewStatus::Approved);

        let material = store.get_material(ids[0]).await.unwrap().unwrap();
        assert_eq!(material.review_status, ReviewStatus::Approved);
        assert_eq!(workflow.history(ids[0]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_second_review_conflicts_until_reset() {
        let (workflow, _store, ids) = setup(1).await;
        workflow.review(ids[0], &decision(ReviewVerdict::Rejected)).await.unwrap();

        let again = workflow.review(ids[0], &decision(ReviewVerdict::Approved)).await;
        assert!(matches!(again, Err(ReadLevelError::Conflict(_))));

        let reset = workflow.reset(ids[0]).await.unwrap();
        assert_eq!(reset.review_status, ReviewStatus::Pending);
        workflow.review(ids[0], &decision(ReviewVerdict::Approved)).await.unwrap();

        let history = workflow.history(ids[0]).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.last().unwrap().status, ReviewStatus::Approved);
    }

    #[tokio::test]
    async fn test_invalid_decision() {
        let (workflow, _store, ids) = setup(1).await;
        let mut bad = decision(ReviewVerdict::Approved);
        bad.rating = 0;
        assert!(matches!(workflow.review(ids[0], &bad).await, Err(ReadLevelError::Validation(_))));

        let mut blank = decision(ReviewVerdict::Approved);
        blank.feedback = "  ".into();
        assert!(matches!(workflow.review(ids[0], &blank).await, Err(ReadLevelError::Validation(_))));
    }

    #[tokio::test]
    async fn test_unknown_material() {
        let (workflow, _store, _ids) = setup(0).await;
        let result = workflow.review(Uuid::new_v4(), &decision(ReviewVerdict::Approved)).await;
        assert!(matches!(result, Err(ReadLevelError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_batch_review_is_per_item() {
        let (workflow, _store, ids) = setup(3).await;
        workflow.review(ids[1], &decision(ReviewVerdict::Rejected)).await.unwrap();

        let unknown = Uuid::new_v4();
        let outcome = workflow
            .batch_review(&[ids[0], ids[1], ids[2], unknown], &decision(ReviewVerdict::Approved))
            .await
            .unwrap();

        assert_eq!(outcome.succeeded, vec![ids[0].to_string(), ids[2].to_string()]);
        assert_eq!(outcome.failed_ids(), vec![ids[1].to_string(), unknown.to_string()]);
        assert!(outcome.failed[0].error.starts_with("Conflict:"));
        assert!(outcome.failed[0].error.contains("rejected"));
        assert!(outcome.failed[1].error.starts_with("Not found:"));
        assert!(outcome.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_review_job() {
        let (workflow, store, ids) = setup(4).await;
        let orchestrator = BatchOrchestrator::new();
        let params = serde_json::to_value(decision(ReviewVerdict::Approved)).unwrap();
        let items = ids
            .iter()
            .map(|id| BatchItem::new(id.to_string(), params.clone()))
            .chain(std::iter::once(BatchItem::new("not-a-uuid", params.clone())))
            .collect();

        let job_id = orchestrator
            .run(JobKind::Review, items, Arc::new(ReviewTask::new(workflow)), 2)
            .await
            .unwrap();
        let job = orchestrator.wait(job_id).await.unwrap();

        let outcome = job.outcome();
        assert_eq!(outcome.succeeded.len(), 4);
        assert_eq!(outcome.failed_ids(), vec!["not-a-uuid"]);
        assert!(outcome.failed[0].error.starts_with("Validation error:"));
        for id in ids {
            let material = store.get_material(id).await.unwrap().unwrap();
            assert_eq!(material.review_status, ReviewStatus::Approved);
        }
    }
}

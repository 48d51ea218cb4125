use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::error::AppError;

/// Read side of the pipeline: the primary record store holding
/// individual score rows.
#[rocket::async_trait]
pub trait ScoreStore: Send + Sync {
    async fn fetch_scores(&self, classroom_id: &str) -> Result<Vec<f64>, AppError>;
}

/// Write side of the pipeline: the analytics store holding one computed
/// average per classroom. `upsert_average` must be atomic per key so a
/// concurrent reader never observes a half-written row.
#[rocket::async_trait]
pub trait AverageStore: Send + Sync {
    async fn upsert_average(
        &self,
        classroom_id: &str,
        average: f64,
        calculated_at: DateTime<Utc>,
    ) -> Result<(), AppError>;
}

/// Mean of the supplied scores. An empty set averages to zero: a
/// classroom with no recorded scores is a legitimate state, not an
/// error, and must never trip a division by zero.
pub fn class_average(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

/// Fetch -> compute -> persist pipeline for one classroom. Stores are
/// injected so tests can substitute fakes without process-wide state.
///
/// The whole invocation is idempotent for a fixed record set: a failed
/// run leaves nothing to resume, and re-invoking converges to the same
/// stored average. Concurrent runs for the same classroom are resolved
/// by the store's per-key upsert (last writer wins); no extra locking
/// here.
pub struct AverageService {
    scores: Arc<dyn ScoreStore>,
    averages: Arc<dyn AverageStore>,
}

impl AverageService {
    pub fn new(scores: Arc<dyn ScoreStore>, averages: Arc<dyn AverageStore>) -> Self {
        Self { scores, averages }
    }

    /// Runs the pipeline, optionally bounded by a caller-supplied
    /// deadline. A deadline that elapses mid-flight surfaces as
    /// `Cancelled` rather than a partial or stale result.
    #[instrument(skip(self))]
    pub async fn run(
        &self,
        classroom_id: &str,
        deadline: Option<Duration>,
    ) -> Result<f64, AppError> {
        if classroom_id.trim().is_empty() {
            return Err(AppError::Validation("classroom_id is required".to_string()));
        }

        match deadline {
            Some(limit) => match tokio::time::timeout(limit, self.run_pipeline(classroom_id)).await
            {
                Ok(result) => result,
                Err(_) => Err(AppError::Cancelled(format!(
                    "aggregation for classroom {} exceeded the {}ms deadline",
                    classroom_id,
                    limit.as_millis()
                ))),
            },
            None => self.run_pipeline(classroom_id).await,
        }
    }

    async fn run_pipeline(&self, classroom_id: &str) -> Result<f64, AppError> {
        let scores = self.scores.fetch_scores(classroom_id).await?;
        let average = class_average(&scores);

        info!(
            classroom_id,
            score_count = scores.len(),
            average,
            "Computed class average"
        );

        self.averages
            .upsert_average(classroom_id, average, Utc::now())
            .await?;

        Ok(average)
    }
}

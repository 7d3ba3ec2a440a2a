use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::task::{TaskPayload, ANALYZE_IMAGE};
use crate::models::verdict::{AnalysisSource, AnalysisVerdict};
use crate::services::broker::{BrokerError, TaskBroker};
use crate::services::dataset::{DatasetEntry, DatasetSink};
use crate::services::inference::{ImageInput, InferenceClient, InferenceError, ANALYSIS_PROMPT};
use crate::services::normalizer;

/// Worker dispatch, then direct inference, then the degraded answer.
pub struct AnalysisOrchestrator {
    broker: Arc<TaskBroker>,
    inference: Arc<InferenceClient>,
    dataset: Arc<dyn DatasetSink>,
    worker_timeout: Duration,
}

impl AnalysisOrchestrator {
    pub fn new(
        broker: Arc<TaskBroker>,
        inference: Arc<InferenceClient>,
        dataset: Arc<dyn DatasetSink>,
        worker_timeout: Duration,
    ) -> Self {
        Self {
            broker,
            inference,
            dataset,
            worker_timeout,
        }
    }

    /// Analyze one photo, trying each stage in turn.
    pub async fn analyze(&self, image: &ImageInput) -> AnalysisVerdict {
        let start = Instant::now();
        let (verdict, source) = self.run_chain(image).await;

        let stage: &'static str = source.into();
        metrics::histogram!("analysis_duration_seconds", "stage" => stage)
            .record(start.elapsed().as_secs_f64());

        tracing::info!(
            stage,
            vegetable = %verdict.vegetable_name,
            safe_to_eat = verdict.safe_to_eat,
            freshness_score = verdict.freshness_score,
            duration_ms = start.elapsed().as_millis() as u64,
            "Analysis complete"
        );

        if source != AnalysisSource::Degraded && !verdict.is_invalid_image() {
            self.record(&verdict, source).await;
        }

        verdict
    }

    async fn run_chain(&self, image: &ImageInput) -> (AnalysisVerdict, AnalysisSource) {
        if self.broker.is_enabled() {
            match self.via_worker(image).await {
                Ok(verdict) => {
                    count_stage(AnalysisSource::Worker, "success");
                    return (verdict, AnalysisSource::Worker);
                }
                Err(StageError::Broker(BrokerError::NoWorkersConnected)) => {
                    tracing::debug!("No worker connected, using direct inference");
                    count_stage(AnalysisSource::Worker, "skipped");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Worker analysis failed, falling back to direct inference");
                    count_stage(AnalysisSource::Worker, "failure");
                }
            }
        }

        match self.via_inference(image).await {
            Ok(verdict) => {
                count_stage(AnalysisSource::Direct, "success");
                return (verdict, AnalysisSource::Direct);
            }
            Err(e) => {
                tracing::error!(error = %e, "Direct inference failed, returning degraded verdict");
                count_stage(AnalysisSource::Direct, "failure");
            }
        }

        count_stage(AnalysisSource::Degraded, "success");
        (AnalysisVerdict::degraded(), AnalysisSource::Degraded)
    }

    async fn via_worker(&self, image: &ImageInput) -> Result<AnalysisVerdict, StageError> {
        let payload = TaskPayload {
            image_base64: image.to_base64(),
            prompt: ANALYSIS_PROMPT.to_string(),
            model: self.inference.model().to_string(),
        };

        let handle = self.broker.submit(ANALYZE_IMAGE, payload).await?;
        let task_id = handle.task_id().clone();
        tracing::debug!(task_id = %task_id, "Waiting for worker result");

        let value = tokio::time::timeout(self.worker_timeout, handle.wait())
            .await
            .map_err(|_| StageError::WorkerTimeout(self.worker_timeout))??;

        tracing::debug!(task_id = %task_id, "Worker result received");
        Ok(normalizer::normalize_value(&value))
    }

    async fn via_inference(&self, image: &ImageInput) -> Result<AnalysisVerdict, StageError> {
        if !self.inference.is_available().await {
            return Err(StageError::InferenceUnavailable);
        }

        let raw = self.inference.complete(image, ANALYSIS_PROMPT, None).await?;
        tracing::debug!(response_len = raw.len(), "Inference response received");
        Ok(normalizer::normalize(&raw))
    }

    async fn record(&self, verdict: &AnalysisVerdict, source: AnalysisSource) {
        let entry = DatasetEntry::new(verdict.clone(), source);
        if let Err(e) = self.dataset.append(&entry).await {
            tracing::warn!(
                error = %e,
                backend = self.dataset.backend(),
                "Failed to append verdict to dataset"
            );
        }
    }
}

fn count_stage(source: AnalysisSource, outcome: &'static str) {
    let stage: &'static str = source.into();
    metrics::counter!("analysis_requests_total", "stage" => stage, "outcome" => outcome).increment(1);
}

#[derive(Debug, thiserror::Error)]
enum StageError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("Worker did not answer within {0:?}")]
    WorkerTimeout(Duration),

    #[error("Inference endpoint is not reachable")]
    InferenceUnavailable,

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;

use crate::services::{
    broker::TaskBroker, dataset::DatasetSink, inference::InferenceClient,
    orchestrator::AnalysisOrchestrator,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<TaskBroker>,
    pub inference: Arc<InferenceClient>,
    pub orchestrator: Arc<AnalysisOrchestrator>,
    pub dataset: Arc<dyn DatasetSink>,
    pub metrics: Arc<PrometheusHandle>,
    /// Interval between `ping` frames on each worker socket.
    pub ping_interval: Duration,
}

impl AppState {
    pub fn new(
        broker: Arc<TaskBroker>,
        inference: InferenceClient,
        dataset: Arc<dyn DatasetSink>,
        metrics: PrometheusHandle,
        worker_timeout: Duration,
        ping_interval: Duration,
    ) -> Self {
        let inference = Arc::new(inference);
        let orchestrator = AnalysisOrchestrator::new(
            broker.clone(),
            inference.clone(),
            dataset.clone(),
            worker_timeout,
        );

        Self {
            broker,
            inference,
            orchestrator: Arc::new(orchestrator),
            dataset,
            metrics: Arc::new(metrics),
            ping_interval,
        }
    }
}

//! Application wiring.

use bosun_config::AppConfig;
use bosun_core::{BosunError, BosunResult};
use bosun_jobs::{JobQueue, ScheduleRegistry};
use bosun_recovery::AutoRecoveryEngine;
use bosun_repository::MemoryStore;
use bosun_service::{
    FleetSchedules, InsightSnapshotProcessor, PredictiveMaintenanceSweep, RangeDeviationPredictor,
    RetrainingEvaluator, StoreInsightGenerator, INSIGHT_JOB_TYPE,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Application builder for constructing the worker process.
pub struct AppBuilder {
    config: Option<AppConfig>,
    store: Option<Arc<MemoryStore>>,
}

impl AppBuilder {
    /// Creates a new application builder.
    pub fn new() -> Self {
        Self {
            config: None,
            store: None,
        }
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the backing store.
    pub fn with_store(mut self, store: Arc<MemoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Builds the application. Nothing runs until [`App::start`].
    pub fn build(self) -> BosunResult<App> {
        let config = self.config.unwrap_or_default();
        let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));

        let queue = JobQueue::new(config.jobs.clone());
        let generator = Arc::new(StoreInsightGenerator::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
        ));
        queue.register_handler(INSIGHT_JOB_TYPE, Arc::new(InsightSnapshotProcessor::new(generator)));

        let sweep = Arc::new(PredictiveMaintenanceSweep::new(
            store.clone(),
            store.clone(),
            Arc::new(RangeDeviationPredictor),
        ));
        let evaluator = Arc::new(RetrainingEvaluator::new(store.clone(), store.clone()));
        let schedules = Arc::new(FleetSchedules::new(
            config.schedules.clone(),
            queue.clone(),
            sweep,
            evaluator,
        ));

        let recovery = Arc::new(AutoRecoveryEngine::new(
            config.recovery.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
        )?);

        Ok(App {
            config,
            store,
            queue,
            registry: ScheduleRegistry::new(),
            schedules,
            recovery,
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The assembled worker process.
pub struct App {
    config: AppConfig,
    store: Arc<MemoryStore>,
    queue: JobQueue,
    registry: ScheduleRegistry,
    schedules: Arc<FleetSchedules>,
    recovery: Arc<AutoRecoveryEngine>,
}

impl App {
    /// Starts the queue and registers the cron schedules.
    pub fn start(&self) -> BosunResult<()> {
        self.queue.start();
        self.schedules
            .register(&self.registry)
            .map_err(|e| BosunError::Configuration(format!("Failed to register schedules: {}", e)))?;
        info!(schedules = self.registry.list().len(), "Worker started");
        Ok(())
    }

    /// Stops the schedules, then the queue.
    pub fn shutdown(&self) {
        self.registry.shutdown();
        self.queue.stop();
        info!("Worker stopped");
    }

    /// Traces queue lifecycle events until the queue is dropped.
    pub fn spawn_event_logger(&self) -> JoinHandle<()> {
        let mut events = self.queue.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        debug!(event = event.name(), job_id = ?event.job_id(), "Queue event");
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Queue event logger lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Returns the backing store.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Returns the job queue.
    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Returns the schedule registry.
    pub fn registry(&self) -> &ScheduleRegistry {
        &self.registry
    }

    /// Returns the fleet schedules.
    pub fn schedules(&self) -> &Arc<FleetSchedules> {
        &self.schedules
    }

    /// Returns the auto-recovery engine.
    pub fn recovery(&self) -> &Arc<AutoRecoveryEngine> {
        &self.recovery
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bosun_service::{schedule_names, InsightScope};

    #[tokio::test]
    async fn test_app_builder_default() {
        let app = AppBuilder::default().build().unwrap();
        assert_eq!(app.config().app.name, "bosun");
        assert!(!app.queue().is_running());
        assert!(app.queue().has_processor(INSIGHT_JOB_TYPE));
    }

    #[tokio::test]
    async fn test_start_registers_schedules_once() {
        let app = AppBuilder::new().build().unwrap();
        app.start().unwrap();

        assert!(app.queue().is_running());
        assert!(app.registry().is_registered(schedule_names::INSIGHTS));
        assert!(app.registry().is_registered(schedule_names::PREDICTIVE_MAINTENANCE));
        assert!(app.registry().is_registered(schedule_names::RETRAINING));

        // A second registration is a no-op.
        assert_eq!(app.schedules().register(app.registry()).unwrap(), 0);
        assert_eq!(app.registry().list().len(), 3);

        app.shutdown();
        assert!(!app.queue().is_running());
    }

    #[tokio::test]
    async fn test_manual_snapshot_is_enqueued() {
        let app = AppBuilder::new().build().unwrap();
        let id = app.schedules().trigger_insight_snapshot("org-1", InsightScope::Equipment);
        assert!(app.queue().get_job_status(&id).is_some());
    }

    #[tokio::test]
    async fn test_recovery_engine_writes_to_shared_store() {
        let store = Arc::new(MemoryStore::new());
        let app = AppBuilder::new().with_store(store.clone()).build().unwrap();

        let outcome = app
            .recovery()
            .handle_mqtt_failure("org-1", "edge-7", "broker unreachable", 12)
            .await;

        assert!(outcome.success);
        assert_eq!(store.failovers().len(), 1);
        assert!(!store.diagnostics().is_empty());
    }
}

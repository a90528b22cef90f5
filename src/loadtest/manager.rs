use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{
    LoadGenerator, LoadStats, LoadTestConfig, LoadTestError, LoadTestResponse, LoadTestStatus,
};
use crate::{config::LoadTesterConfig, metrics::LoadTestMetrics};

/// Test id used by the single-test endpoints.
pub const DEFAULT_TEST_ID: &str = "default";

struct Instance {
    status: LoadTestStatus,
    config: LoadTestConfig,
    generator: Option<LoadGenerator>,
    /// Final statistics once the generator is gone.
    stats: LoadStats,
    started_at: Option<DateTime<Utc>>,
    stopped_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
}

impl Instance {
    fn new(config: LoadTestConfig) -> Self {
        Self {
            status: LoadTestStatus::Idle,
            config,
            generator: None,
            stats: LoadStats::default(),
            started_at: None,
            stopped_at: None,
            error_message: None,
        }
    }

    fn response(&self, test_id: &str) -> LoadTestResponse {
        let stats = match &self.generator {
            Some(generator) => generator.stats(),
            None => self.stats.clone(),
        };

        LoadTestResponse {
            test_id: test_id.to_string(),
            status: self.status,
            config: Some(self.config.clone()),
            stats,
            started_at: self.started_at,
            stopped_at: self.stopped_at,
            error_message: self.error_message.clone(),
        }
    }

    async fn stop(&mut self) {
        if !self.status.is_active() {
            return;
        }

        self.status = LoadTestStatus::Stopping;
        if let Some(generator) = self.generator.take() {
            self.stats = generator.stop().await;
        }
        self.status = LoadTestStatus::Stopped;
        self.stopped_at = Some(Utc::now());
    }
}

/// Named load tests, any number of which may run at once.
pub struct LoadTestManager {
    settings: Arc<LoadTesterConfig>,
    metrics: LoadTestMetrics,
    tests: Mutex<BTreeMap<String, Instance>>,
}

impl LoadTestManager {
    pub fn new(settings: LoadTesterConfig, metrics: LoadTestMetrics) -> Self {
        Self {
            settings: Arc::new(settings),
            metrics,
            tests: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn settings(&self) -> &LoadTesterConfig {
        &self.settings
    }

    /// Validates `config`, falling back to the default rate when absent, and
    /// fills in the catalogue pairs and amounts.
    pub fn prepare(&self, config: Option<LoadTestConfig>) -> Result<LoadTestConfig, LoadTestError> {
        let config = config
            .unwrap_or_else(|| LoadTestConfig::with_rps(self.settings.default_requests_per_second));
        config.validate(self.settings.max_requests_per_second)?;

        Ok(config.ensure_complete())
    }

    pub async fn start(
        &self,
        test_id: &str,
        config: Option<LoadTestConfig>,
    ) -> Result<LoadTestResponse, LoadTestError> {
        let config = self.prepare(config)?;
        let mut tests = self.tests.lock().await;

        if tests.get(test_id).is_some_and(|t| t.status.is_active()) {
            return Err(LoadTestError::AlreadyRunning(test_id.to_string()));
        }

        let mut instance = Instance::new(config.clone());
        instance.status = LoadTestStatus::Starting;
        instance.started_at = Some(Utc::now());

        let started = LoadGenerator::new(
            test_id,
            config,
            Arc::clone(&self.settings),
            self.metrics.clone(),
        )
        .and_then(|generator| generator.start().map(|()| generator));

        let result = match started {
            Ok(generator) => {
                instance.generator = Some(generator);
                instance.status = LoadTestStatus::Running;
                Ok(instance.response(test_id))
            }
            Err(e) => {
                log::error!("Failed to start load test {test_id}: {e}");
                instance.status = LoadTestStatus::Error;
                instance.error_message = Some(e.to_string());
                Err(e)
            }
        };

        // A finished test with the same id is replaced.
        tests.insert(test_id.to_string(), instance);
        result
    }

    /// Starts `test_id`, or ramps it to `config` if it is already running.
    pub async fn start_or_ramp(
        &self,
        test_id: &str,
        config: Option<LoadTestConfig>,
    ) -> Result<LoadTestResponse, LoadTestError> {
        match self.start(test_id, config.clone()).await {
            Err(LoadTestError::AlreadyRunning(_)) => self.ramp(test_id, config).await,
            result => result,
        }
    }

    pub async fn ramp(
        &self,
        test_id: &str,
        config: Option<LoadTestConfig>,
    ) -> Result<LoadTestResponse, LoadTestError> {
        let config = self.prepare(config)?;
        let mut tests = self.tests.lock().await;

        let instance = tests
            .get_mut(test_id)
            .filter(|t| t.status.is_active())
            .ok_or_else(|| LoadTestError::NotRunning(test_id.to_string()))?;
        let generator = instance
            .generator
            .as_ref()
            .ok_or_else(|| LoadTestError::NotRunning(test_id.to_string()))?;

        generator.ramp_to(config.clone())?;
        instance.config = config;

        Ok(instance.response(test_id))
    }

    pub async fn stop(&self, test_id: &str) -> Result<LoadTestResponse, LoadTestError> {
        let mut tests = self.tests.lock().await;
        let instance = tests
            .get_mut(test_id)
            .ok_or_else(|| LoadTestError::NotFound(test_id.to_string()))?;

        instance.stop().await;

        Ok(instance.response(test_id))
    }

    pub async fn stop_all(&self) -> BTreeMap<String, LoadTestResponse> {
        let mut tests = self.tests.lock().await;
        let mut responses = BTreeMap::new();

        for (test_id, instance) in tests.iter_mut() {
            instance.stop().await;
            responses.insert(test_id.clone(), instance.response(test_id));
        }

        responses
    }

    pub async fn status(&self, test_id: &str) -> Result<LoadTestResponse, LoadTestError> {
        self.tests
            .lock()
            .await
            .get(test_id)
            .map(|instance| instance.response(test_id))
            .ok_or_else(|| LoadTestError::NotFound(test_id.to_string()))
    }

    /// Status of `test_id`, or an idle response if it never ran.
    pub async fn status_or_idle(&self, test_id: &str) -> LoadTestResponse {
        self.status(test_id)
            .await
            .unwrap_or_else(|_| LoadTestResponse::idle(test_id))
    }

    pub async fn all_status(&self) -> BTreeMap<String, LoadTestResponse> {
        self.tests
            .lock()
            .await
            .iter()
            .map(|(id, instance)| (id.clone(), instance.response(id)))
            .collect()
    }

    pub async fn active_ids(&self) -> Vec<String> {
        self.tests
            .lock()
            .await
            .iter()
            .filter(|(_, instance)| instance.status.is_active())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Forgets stopped and failed tests; returns how many were removed.
    pub async fn cleanup(&self) -> usize {
        let mut tests = self.tests.lock().await;
        let before = tests.len();
        tests.retain(|_, instance| !instance.status.is_finished());

        let removed = before - tests.len();
        if removed > 0 {
            log::info!("Removed {removed} finished load tests");
        }
        removed
    }
}

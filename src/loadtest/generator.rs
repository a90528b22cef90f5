use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use rand::{Rng, SeedableRng, rngs::StdRng};
use reqwest::{Client, StatusCode};
use tokio::{sync::watch, task::JoinHandle};

use super::{
    CurrencyPatterns, IpGenerator, LoadStats, LoadTestConfig, LoadTestError,
    users::{DEFAULT_ACCOUNTS, TestUsers},
};
use crate::{auth::JwtKeys, config::LoadTesterConfig, metrics::LoadTestMetrics};

pub const CONVERT_PATH: &str = "/api/v1/convert";
const RAMP_STEP: Duration = Duration::from_secs(1);
/// Longest a worker ever sleeps between requests.
const MAX_DELAY: Duration = Duration::from_secs(60);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// One worker per two requests per second, within `1..=max_workers`.
pub fn worker_count(rps: f64, max_workers: usize) -> usize {
    ((rps / 2.0).ceil() as usize).clamp(1, max_workers.max(1))
}

/// Seconds each of `workers` waits between requests so that together they
/// issue `rps` requests per second.
pub fn worker_interval(rps: f64, workers: usize) -> f64 {
    workers as f64 / rps
}

/// Rates applied once per second while ramping from `from` to `to`.
pub fn ramp_steps(from: f64, to: f64, duration_secs: f64) -> Vec<f64> {
    let steps = duration_secs.ceil().max(1.0) as usize;

    (1..=steps)
        .map(|i| from + (to - from) * i as f64 / steps as f64)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Outcome {
    success: bool,
    latency_ms: f64,
}

#[derive(Debug, Default)]
struct StatsAccumulator {
    total: u64,
    successful: u64,
    failed: u64,
    latency_sum_ms: f64,
    latency_samples: u64,
    min_ms: f64,
    max_ms: f64,
}

impl StatsAccumulator {
    fn record(&mut self, outcome: Outcome) {
        self.total += 1;
        if outcome.success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }

        // Requests that never reached the target carry no latency.
        if outcome.latency_ms > 0.0 {
            if self.latency_samples == 0 || outcome.latency_ms < self.min_ms {
                self.min_ms = outcome.latency_ms;
            }
            self.max_ms = self.max_ms.max(outcome.latency_ms);
            self.latency_sum_ms += outcome.latency_ms;
            self.latency_samples += 1;
        }
    }

    fn snapshot(&self, elapsed: Duration) -> LoadStats {
        let avg = if self.latency_samples > 0 {
            self.latency_sum_ms / self.latency_samples as f64
        } else {
            0.0
        };
        let secs = elapsed.as_secs_f64();

        LoadStats {
            total_requests: self.total,
            successful_requests: self.successful,
            failed_requests: self.failed,
            avg_response_time_ms: avg,
            min_response_time_ms: self.min_ms,
            max_response_time_ms: self.max_ms,
            requests_per_second: if secs > 0.0 {
                self.total as f64 / secs
            } else {
                0.0
            },
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct RunWindow {
    started: Option<Instant>,
    stopped: Option<Instant>,
}

impl RunWindow {
    fn elapsed(&self) -> Duration {
        match self.started {
            Some(started) => self.stopped.unwrap_or_else(Instant::now) - started,
            None => Duration::ZERO,
        }
    }
}

struct Worker {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct Inner {
    test_id: String,
    settings: Arc<LoadTesterConfig>,
    client: Client,
    url: String,
    metrics: LoadTestMetrics,
    users: TestUsers,
    config: RwLock<LoadTestConfig>,
    /// Current rate as `f64` bits; differs from the configured rate mid-ramp.
    rps: AtomicU64,
    active_workers: AtomicUsize,
    running: AtomicBool,
    window: Mutex<RunWindow>,
    stats: Mutex<StatsAccumulator>,
    ips: Mutex<IpGenerator>,
    workers: Mutex<Vec<Worker>>,
    ramp: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn current_rps(&self) -> f64 {
        f64::from_bits(self.rps.load(Ordering::Relaxed))
    }

    fn apply_rps(self: &Arc<Self>, rps: f64) {
        self.rps.store(rps.to_bits(), Ordering::Relaxed);
        self.scale_workers(worker_count(rps, self.settings.max_workers));
    }

    fn scale_workers(self: &Arc<Self>, target: usize) {
        let mut workers = lock(&self.workers);
        // `stop` flips `running` under this lock, so a stopped generator
        // never gains workers.
        if !self.running.load(Ordering::SeqCst) {
            return;
        }

        while workers.len() < target {
            let (stop, rx) = watch::channel(false);
            let handle = tokio::spawn(run_worker(Arc::clone(self), rx));
            workers.push(Worker { stop, handle });
        }
        while workers.len() > target {
            if let Some(worker) = workers.pop() {
                let _ = worker.stop.send(true);
            }
        }

        self.active_workers.store(workers.len(), Ordering::Relaxed);
    }

    fn next_delay<R: Rng>(&self, request_time: Duration, rng: &mut R) -> Duration {
        let workers = self.active_workers.load(Ordering::Relaxed).max(1);
        let mut interval = worker_interval(self.current_rps(), workers);

        let jitter = self.settings.jitter;
        if jitter > 0.0 {
            interval *= 1.0 + rng.gen_range(-jitter..=jitter);
        }
        if self.settings.latency_compensation {
            interval -= request_time.as_secs_f64();
        }

        let floor = self.settings.min_sleep_ms / 1000.0;
        Duration::try_from_secs_f64(interval.max(floor).max(0.0))
            .map_or(MAX_DELAY, |delay| delay.min(MAX_DELAY))
    }

    async fn execute<R: Rng>(&self, rng: &mut R) -> Outcome {
        let (request, spoofing) = {
            let config = read(&self.config);
            let request = if config.error_injection_enabled
                && rng.gen_bool(config.error_injection_rate)
            {
                CurrencyPatterns::invalid_request(rng)
            } else {
                CurrencyPatterns::request_for(&config, rng)
            };
            (
                request,
                config.ip_spoofing_enabled || self.settings.ip_spoofing.enabled,
            )
        };

        let headers = if spoofing {
            lock(&self.ips).spoofing_headers(rng)
        } else {
            Vec::new()
        };

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(user) = self.users.pick(rng) {
            builder = builder.bearer_auth(&user.token);
        }
        for (name, value) in headers {
            builder = builder.header(name, value);
        }

        let started = Instant::now();
        match builder.send().await {
            Ok(response) => {
                let status = response.status();
                // Read the body so the timing covers the whole response.
                let body = response.bytes().await;
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                let success = status == StatusCode::OK && body.is_ok();
                if !success {
                    log::debug!("Load test {} got HTTP {status}", self.test_id);
                }

                Outcome {
                    success,
                    latency_ms,
                }
            }
            Err(e) if e.is_timeout() => Outcome {
                success: false,
                latency_ms: self.settings.request_timeout_secs * 1000.0,
            },
            Err(e) => {
                log::debug!("Load test {} request failed: {e}", self.test_id);
                Outcome {
                    success: false,
                    latency_ms: 0.0,
                }
            }
        }
    }

    fn record(&self, outcome: Outcome) {
        lock(&self.stats).record(outcome);
        self.metrics
            .record(&self.test_id, outcome.success, outcome.latency_ms / 1000.0);
    }

    fn stats(&self) -> LoadStats {
        let elapsed = lock(&self.window).elapsed();
        lock(&self.stats).snapshot(elapsed)
    }
}

async fn run_worker(inner: Arc<Inner>, mut stop: watch::Receiver<bool>) {
    let mut rng = StdRng::from_entropy();

    loop {
        let started = Instant::now();

        let outcome = tokio::select! {
            outcome = inner.execute(&mut rng) => outcome,
            _ = stop.changed() => break,
        };
        inner.record(outcome);

        let delay = inner.next_delay(started.elapsed(), &mut rng);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop.changed() => break,
        }
    }
}

/// Drives one load test: a pool of workers posting conversions at a target
/// rate that can be changed while running.
pub struct LoadGenerator {
    inner: Arc<Inner>,
}

impl LoadGenerator {
    pub fn new(
        test_id: &str,
        config: LoadTestConfig,
        settings: Arc<LoadTesterConfig>,
        metrics: LoadTestMetrics,
    ) -> Result<Self, LoadTestError> {
        let timeout = Duration::try_from_secs_f64(settings.request_timeout_secs).map_err(|e| {
            LoadTestError::InvalidConfig(format!("invalid request timeout: {e}"))
        })?;
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(settings.max_workers)
            .build()?;

        let keys = JwtKeys::new(&settings.jwt_secret);
        let users = TestUsers::generate(&keys, DEFAULT_ACCOUNTS, &mut StdRng::from_entropy())
            .map_err(|e| LoadTestError::InvalidConfig(e.to_string()))?;

        let ips = IpGenerator::new(&settings.ip_spoofing, config.burst_mode);

        Ok(Self {
            inner: Arc::new(Inner {
                test_id: test_id.to_string(),
                url: format!("{}{CONVERT_PATH}", settings.target_api_base_url),
                client,
                metrics,
                users,
                rps: AtomicU64::new(config.requests_per_second.to_bits()),
                config: RwLock::new(config),
                active_workers: AtomicUsize::new(0),
                running: AtomicBool::new(false),
                window: Mutex::new(RunWindow::default()),
                stats: Mutex::new(StatsAccumulator::default()),
                ips: Mutex::new(ips),
                workers: Mutex::new(Vec::new()),
                ramp: Mutex::new(None),
                settings,
            }),
        })
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> LoadTestConfig {
        read(&self.inner.config).clone()
    }

    pub fn current_rps(&self) -> f64 {
        self.inner.current_rps()
    }

    pub fn worker_count(&self) -> usize {
        self.inner.active_workers.load(Ordering::Relaxed)
    }

    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), LoadTestError> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(LoadTestError::AlreadyRunning(self.inner.test_id.clone()));
        }

        *lock(&self.inner.window) = RunWindow {
            started: Some(Instant::now()),
            stopped: None,
        };
        *lock(&self.inner.stats) = StatsAccumulator::default();

        let rps = read(&self.inner.config).requests_per_second;
        self.inner.apply_rps(rps);

        log::info!(
            "Load test {} started at {rps} rps with {} workers against {}",
            self.inner.test_id,
            self.worker_count(),
            self.inner.url
        );

        Ok(())
    }

    /// Applies `config` to the running test. The rate changes at once, or
    /// one step per second over `ramp_duration_seconds` when that is set.
    pub fn ramp_to(&self, config: LoadTestConfig) -> Result<(), LoadTestError> {
        if !self.is_running() {
            return Err(LoadTestError::NotRunning(self.inner.test_id.clone()));
        }

        let from = self.current_rps();
        let to = config.requests_per_second;
        let duration = config.ramp_duration_seconds.filter(|d| *d > 0.0);

        if read(&self.inner.config).burst_mode != config.burst_mode {
            *lock(&self.inner.ips) = IpGenerator::new(&self.inner.settings.ip_spoofing, config.burst_mode);
        }
        *write(&self.inner.config) = config;

        if let Some(previous) = lock(&self.inner.ramp).take() {
            previous.abort();
        }

        match duration {
            Some(duration) if from != to => {
                log::info!(
                    "Load test {} ramping from {from} to {to} rps over {duration}s",
                    self.inner.test_id
                );

                let inner = Arc::clone(&self.inner);
                let handle = tokio::spawn(async move {
                    for rps in ramp_steps(from, to, duration) {
                        tokio::time::sleep(RAMP_STEP).await;
                        if !inner.running.load(Ordering::SeqCst) {
                            return;
                        }
                        inner.apply_rps(rps);
                    }
                    log::info!("Load test {} reached {to} rps", inner.test_id);
                });
                *lock(&self.inner.ramp) = Some(handle);
            }
            _ => {
                log::info!(
                    "Load test {} switched from {from} to {to} rps",
                    self.inner.test_id
                );
                self.inner.apply_rps(to);
            }
        }

        Ok(())
    }

    /// Stops every worker and returns the final statistics. Stopping a
    /// generator that is not running only returns its statistics.
    pub async fn stop(&self) -> LoadStats {
        let workers = {
            let mut workers = lock(&self.inner.workers);
            if !self.inner.running.swap(false, Ordering::SeqCst) {
                drop(workers);
                return self.stats();
            }
            self.inner.active_workers.store(0, Ordering::Relaxed);
            std::mem::take(&mut *workers)
        };

        if let Some(ramp) = lock(&self.inner.ramp).take() {
            ramp.abort();
        }

        for worker in &workers {
            let _ = worker.stop.send(true);
        }
        for worker in workers {
            if let Err(e) = worker.handle.await
                && !e.is_cancelled()
            {
                log::warn!("Load test {} worker failed: {e}", self.inner.test_id);
            }
        }

        lock(&self.inner.window).stopped = Some(Instant::now());

        let stats = self.stats();
        log::info!(
            "Load test {} stopped after {} requests ({} failed)",
            self.inner.test_id,
            stats.total_requests,
            stats.failed_requests
        );

        stats
    }

    pub fn stats(&self) -> LoadStats {
        self.inner.stats()
    }
}

impl Drop for LoadGenerator {
    fn drop(&mut self) {
        for worker in lock(&self.inner.workers).iter() {
            let _ = worker.stop.send(true);
        }
        if let Some(ramp) = lock(&self.inner.ramp).take() {
            ramp.abort();
        }
    }
}

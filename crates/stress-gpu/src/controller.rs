//! Guarded stress loop
//!
//! A [`Stressor`] owns one device and at most one background run. The run is
//! a Tokio task; each kernel burst executes on the blocking pool so the
//! executor stays responsive while the device works. Between bursts the loop
//! checks, in order: cancellation, the duration limit, and the temperature
//! limit. Cancellation is therefore observed within one burst.
//!
//! Run state (phase, sample history, last outcome) sits behind a single lock
//! so observers always see whole samples and a consistent phase.

use crate::backend::{available_platforms, BurnTarget, ComputeDevice};
use crate::config::{KernelConfig, StressConfig};
use crate::device::{resolve_device, DeviceInfo, ResolvedDevice};
use crate::history::{RunHistory, Sample};
use crate::kernel::{clamp_active_units, KernelLaunch, StressProfile};
use crate::summary::{summarize, Summary};
use crate::telemetry::{probe_for_device, Reading, TelemetryProbe};
use crate::{Result, StressError};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Parameters of one stress run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Run length in seconds
    pub duration_seconds: f64,

    /// Stop once the device reports this temperature (°C) or more
    pub max_temperature: Option<i32>,

    /// Parallel units to load; absent or non-positive means all
    pub active_units: Option<i64>,

    /// Intensity preset
    pub profile: StressProfile,
}

impl RunRequest {
    pub fn new(duration_seconds: f64) -> Self {
        Self {
            duration_seconds,
            max_temperature: None,
            active_units: None,
            profile: StressProfile::default(),
        }
    }

    pub fn with_max_temperature(mut self, limit: i32) -> Self {
        self.max_temperature = Some(limit);
        self
    }

    pub fn with_active_units(mut self, units: i64) -> Self {
        self.active_units = Some(units);
        self
    }

    pub fn with_profile(mut self, profile: StressProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.duration_seconds.is_finite() || self.duration_seconds <= 0.0 {
            return Err(StressError::Configuration(format!(
                "run duration must be a positive number of seconds, got {}",
                self.duration_seconds
            )));
        }
        Ok(())
    }
}

/// What the device is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    Idle,
    Running,
    Benchmarking,
}

/// Why a run ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// The requested duration elapsed
    TimeLimit,
    /// The probe reported a temperature at or above the limit
    ThermalLimit { temperature: i32, limit: i32 },
    /// `stop()` was called
    Stopped,
    /// Allocation or dispatch failed; the run was abandoned
    Failed { message: String },
}

impl StopReason {
    pub fn is_failure(&self) -> bool {
        matches!(self, StopReason::Failed { .. })
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::TimeLimit => write!(f, "time limit reached"),
            StopReason::ThermalLimit { temperature, limit } => {
                write!(f, "temperature limit reached ({}°C >= {}°C)", temperature, limit)
            }
            StopReason::Stopped => write!(f, "stopped on request"),
            StopReason::Failed { message } => write!(f, "run failed: {}", message),
        }
    }
}

/// Result of a finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub reason: StopReason,
    /// Wall-clock time the run started
    pub started_at: DateTime<Utc>,
    /// Completed kernel bursts
    pub bursts: u64,
    /// Seconds from start to the stop decision
    pub elapsed_seconds: f64,
    pub profile: StressProfile,
    pub active_units: u32,
}

pub(crate) struct RunState {
    pub(crate) phase: RunPhase,
    history: RunHistory,
    last_outcome: Option<RunOutcome>,
    cancel: Option<CancellationToken>,
}

impl RunState {
    fn new() -> Self {
        Self {
            phase: RunPhase::Idle,
            history: RunHistory::new(),
            last_outcome: None,
            cancel: None,
        }
    }
}

/// Load generator bound to one device
pub struct Stressor {
    pub(crate) resolved: ResolvedDevice,
    pub(crate) probe: Arc<dyn TelemetryProbe>,
    pub(crate) kernel: KernelConfig,
    pub(crate) state: Arc<RwLock<RunState>>,
    task: Mutex<Option<JoinHandle<RunOutcome>>>,
}

impl Stressor {
    /// Resolve a device and telemetry probe from `config`.
    ///
    /// Fails without side effects if no backend or device is available.
    pub fn new(config: StressConfig) -> Result<Self> {
        info!("Creating stressor for backend {} ({})", config.backend, config.device_class);
        config.validate().map_err(StressError::Configuration)?;

        let platforms = available_platforms(&config)?;
        let resolved = resolve_device(&platforms, config.device_class)?;
        let probe = probe_for_device(&config.telemetry, &resolved);

        Ok(Self::with_parts(resolved, probe, config.kernel))
    }

    /// Build a stressor from an already resolved device and probe
    pub fn with_parts(resolved: ResolvedDevice, probe: Arc<dyn TelemetryProbe>, kernel: KernelConfig) -> Self {
        Self {
            resolved,
            probe,
            kernel,
            state: Arc::new(RwLock::new(RunState::new())),
            task: Mutex::new(None),
        }
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.resolved.info
    }

    /// Name of the platform the device was resolved from
    pub fn platform(&self) -> &str {
        &self.resolved.platform
    }

    /// Size of one burst for `profile` on the requested units
    pub fn launch_for(&self, profile: StressProfile, active_units: Option<i64>) -> (u32, KernelLaunch) {
        let units = clamp_active_units(active_units, self.resolved.info.parallel_unit_count);
        (units, KernelLaunch::new(profile, units, self.kernel.work_items_per_unit))
    }

    /// Launch a background run.
    ///
    /// Returns `false` without touching the current run if the device is busy
    /// or the request is invalid. Must be called from within a Tokio runtime.
    pub fn start(&self, request: RunRequest) -> bool {
        if let Err(e) = request.validate() {
            warn!("Rejecting run request: {}", e);
            return false;
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!("Cannot start a stress run outside a Tokio runtime: {}", e);
                return false;
            }
        };

        let (units, launch) = self.launch_for(request.profile, request.active_units);
        let cancel = CancellationToken::new();

        {
            let mut state = self.state.write();
            if state.phase != RunPhase::Idle {
                debug!("Ignoring start while {:?}", state.phase);
                return false;
            }
            state.phase = RunPhase::Running;
            state.history.clear();
            state.last_outcome = None;
            state.cancel = Some(cancel.clone());
        }

        info!(
            device = %self.resolved.info.name,
            profile = %request.profile,
            units,
            work_items = launch.work_items,
            iterations = launch.iterations,
            duration = request.duration_seconds,
            max_temperature = ?request.max_temperature,
            "Starting stress run"
        );

        let run = StressRun {
            device: Arc::clone(&self.resolved.device),
            probe: Arc::clone(&self.probe),
            state: Arc::clone(&self.state),
            request,
            launch,
            active_units: units,
            cancel,
        };
        *self.task.lock() = Some(runtime.spawn(run.execute()));
        true
    }

    /// Ask the current run to stop at its next check. No-op while idle.
    pub fn stop(&self) -> bool {
        match self.state.read().cancel.as_ref() {
            Some(cancel) => {
                info!("Stop requested");
                cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.read().phase == RunPhase::Running
    }

    pub fn phase(&self) -> RunPhase {
        self.state.read().phase
    }

    /// Snapshot of the current (or last) run's samples
    pub fn history(&self) -> RunHistory {
        self.state.read().history.clone()
    }

    /// Samples appended after the first `offset`
    pub fn samples_since(&self, offset: usize) -> Vec<Sample> {
        self.state
            .read()
            .history
            .samples()
            .get(offset..)
            .map(<[Sample]>::to_vec)
            .unwrap_or_default()
    }

    pub fn latest_sample(&self) -> Option<Sample> {
        self.state.read().history.last().copied()
    }

    pub fn last_outcome(&self) -> Option<RunOutcome> {
        self.state.read().last_outcome.clone()
    }

    /// Statistics over the current history
    pub fn summarize(&self) -> Summary {
        summarize(&self.state.read().history)
    }

    /// Wait for the current run to finish; returns the last outcome if none is active.
    pub async fn wait(&self) -> Option<RunOutcome> {
        let handle = self.task.lock().take();
        match handle {
            Some(handle) => match handle.await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    error!("Stress run task ended abnormally: {}", e);
                    self.last_outcome()
                }
            },
            None => self.last_outcome(),
        }
    }
}

impl Drop for Stressor {
    fn drop(&mut self) {
        if let Some(cancel) = self.state.read().cancel.as_ref() {
            cancel.cancel();
        }
    }
}

struct StressRun {
    device: Arc<dyn ComputeDevice>,
    probe: Arc<dyn TelemetryProbe>,
    state: Arc<RwLock<RunState>>,
    request: RunRequest,
    launch: KernelLaunch,
    active_units: u32,
    cancel: CancellationToken,
}

/// Returns the state to idle even if the run task panics or is aborted
struct IdleOnDrop(Arc<RwLock<RunState>>);

impl Drop for IdleOnDrop {
    fn drop(&mut self) {
        let mut state = self.0.write();
        if state.phase == RunPhase::Running {
            state.phase = RunPhase::Idle;
            state.cancel = None;
            if state.last_outcome.is_none() {
                state.last_outcome = Some(RunOutcome {
                    reason: StopReason::Failed {
                        message: "run task terminated unexpectedly".to_string(),
                    },
                    started_at: Utc::now(),
                    bursts: 0,
                    elapsed_seconds: 0.0,
                    profile: StressProfile::default(),
                    active_units: 0,
                });
            }
        }
    }
}

impl StressRun {
    async fn execute(self) -> RunOutcome {
        let _guard = IdleOnDrop(Arc::clone(&self.state));
        let started_at = Utc::now();
        let started = Instant::now();
        let mut bursts = 0u64;

        let reason = self.drive(started, &mut bursts).await;
        let outcome = RunOutcome {
            reason,
            started_at,
            bursts,
            elapsed_seconds: started.elapsed().as_secs_f64(),
            profile: self.request.profile,
            active_units: self.active_units,
        };

        if outcome.reason.is_failure() {
            error!(bursts, "Stress run aborted: {}", outcome.reason);
        } else {
            info!(bursts, elapsed = outcome.elapsed_seconds, "Stress run finished: {}", outcome.reason);
        }

        let mut state = self.state.write();
        state.phase = RunPhase::Idle;
        state.cancel = None;
        state.last_outcome = Some(outcome.clone());
        outcome
    }

    async fn drive(&self, started: Instant, bursts: &mut u64) -> StopReason {
        let device = Arc::clone(&self.device);
        let work_items = self.launch.work_items;
        let mut target: Box<dyn BurnTarget> =
            match tokio::task::spawn_blocking(move || device.allocate(work_items)).await {
                Ok(Ok(target)) => target,
                Ok(Err(e)) => return failed(e.to_string()),
                Err(e) => return failed(format!("allocation task: {}", e)),
            };

        let mut warned_unguarded = false;
        loop {
            if self.cancel.is_cancelled() {
                return StopReason::Stopped;
            }

            if started.elapsed().as_secs_f64() >= self.request.duration_seconds {
                return StopReason::TimeLimit;
            }

            if let Some(limit) = self.request.max_temperature {
                match self.probe.read_temperature().await {
                    Reading::Value(temperature) if temperature >= limit => {
                        warn!("Temperature {}°C reached limit {}°C", temperature, limit);
                        return StopReason::ThermalLimit { temperature, limit };
                    }
                    Reading::Value(_) => {}
                    Reading::Absent(reason) => {
                        if !warned_unguarded {
                            warned_unguarded = true;
                            warn!("No temperature reading ({}), the {}°C limit is not enforced", reason, limit);
                        }
                    }
                }
            }

            let iterations = self.launch.iterations;
            let dispatched = tokio::task::spawn_blocking(move || {
                let result = target.dispatch(iterations);
                (target, result)
            })
            .await;

            target = match dispatched {
                Ok((target, Ok(timing))) => {
                    debug!(burst = *bursts + 1, device_seconds = timing.seconds(), "Burst complete");
                    target
                }
                Ok((_, Err(e))) => return failed(e.to_string()),
                Err(e) => return failed(format!("dispatch task: {}", e)),
            };
            *bursts += 1;

            let (temperature, utilization) =
                tokio::join!(self.probe.read_temperature(), self.probe.read_utilization());

            let sample = Sample {
                elapsed_seconds: started.elapsed().as_secs_f64(),
                temperature: temperature.value().map(f64::from),
                utilization: utilization.value().map(f64::from),
            };
            if !self.state.write().history.push(sample) {
                warn!(elapsed = sample.elapsed_seconds, "Dropped sample that does not follow the previous one");
            }
        }
    }
}

fn failed(message: String) -> StopReason {
    StopReason::Failed { message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCounters, MockDevice, MockProbe};
    use crate::telemetry::DisabledProbe;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const BURST: Duration = Duration::from_millis(20);

    fn kernel() -> KernelConfig {
        KernelConfig { work_items_per_unit: 16 }
    }

    fn stressor(device: MockDevice, probe: impl TelemetryProbe + 'static) -> (Stressor, Arc<MockCounters>) {
        let counters = device.counters();
        let stressor = Stressor::with_parts(device.into_resolved(), Arc::new(probe), kernel());
        (stressor, counters)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_stops_at_time_limit() {
        let (stressor, counters) =
            stressor(MockDevice::gpu("g", 4).with_burst_latency(BURST), MockProbe::constant(55, 97));

        assert!(stressor.start(RunRequest::new(0.2)));
        assert!(stressor.is_running());

        let outcome = stressor.wait().await.unwrap();
        assert_eq!(outcome.reason, StopReason::TimeLimit);
        assert!(outcome.elapsed_seconds >= 0.2);
        assert!(outcome.elapsed_seconds < 0.2 + 5.0 * BURST.as_secs_f64());
        assert!(!stressor.is_running());

        let history = stressor.history();
        assert_eq!(history.len() as u64, outcome.bursts);
        assert_eq!(counters.dispatches.load(Ordering::SeqCst), outcome.bursts);
        assert!(history.samples().windows(2).all(|w| w[0].elapsed_seconds < w[1].elapsed_seconds));
        assert!(history.iter().all(|s| s.temperature == Some(55.0) && s.utilization == Some(97.0)));
        assert_eq!(counters.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_thermal_limit_checked_before_first_burst() {
        let (stressor, counters) = stressor(MockDevice::gpu("g", 4).with_burst_latency(BURST), MockProbe::constant(80, 50));

        assert!(stressor.start(RunRequest::new(10.0).with_max_temperature(80)));
        let outcome = stressor.wait().await.unwrap();

        assert_eq!(outcome.reason, StopReason::ThermalLimit { temperature: 80, limit: 80 });
        assert_eq!(outcome.bursts, 0);
        assert_eq!(counters.dispatches.load(Ordering::SeqCst), 0);
        assert!(stressor.history().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_thermal_limit_mid_run() {
        // Temperature reads alternate: pre-burst check, then post-burst sample
        let probe = MockProbe::sequence(
            vec![Reading::Value(60), Reading::Value(61), Reading::Value(90)],
            Reading::Value(99),
        );
        let (stressor, _) = stressor(MockDevice::gpu("g", 4).with_burst_latency(BURST), probe);

        assert!(stressor.start(RunRequest::new(10.0).with_max_temperature(85)));
        let outcome = stressor.wait().await.unwrap();

        assert_eq!(outcome.reason, StopReason::ThermalLimit { temperature: 90, limit: 85 });
        assert_eq!(outcome.bursts, 1);
        let history = stressor.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history.samples()[0].temperature, Some(61.0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_absent_temperature_never_trips_limit() {
        let (stressor, _) = stressor(MockDevice::gpu("g", 4).with_burst_latency(BURST), MockProbe::absent());

        assert!(stressor.start(RunRequest::new(0.1).with_max_temperature(1)));
        let outcome = stressor.wait().await.unwrap();

        assert_eq!(outcome.reason, StopReason::TimeLimit);
        let history = stressor.history();
        assert!(!history.is_empty());
        assert!(history.iter().all(|s| s.temperature.is_none() && s.utilization.is_none()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_is_cooperative() {
        let (stressor, _) = stressor(MockDevice::gpu("g", 4).with_burst_latency(BURST), DisabledProbe);

        assert!(!stressor.stop());
        assert!(stressor.start(RunRequest::new(30.0)));
        tokio::time::sleep(Duration::from_millis(60)).await;

        let requested = Instant::now();
        assert!(stressor.stop());
        let outcome = stressor.wait().await.unwrap();

        assert_eq!(outcome.reason, StopReason::Stopped);
        assert!(requested.elapsed() < BURST * 10);
        assert!(!stressor.is_running());
        assert!(!stressor.stop());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_second_start_does_not_reset_run() {
        let (stressor, counters) = stressor(MockDevice::gpu("g", 4).with_burst_latency(BURST), MockProbe::constant(50, 50));

        assert!(stressor.start(RunRequest::new(0.3)));
        tokio::time::sleep(Duration::from_millis(100)).await;
        let before = stressor.history().len();
        assert!(before > 0);

        assert!(!stressor.start(RunRequest::new(5.0).with_profile(StressProfile::Heavy)));
        assert!(stressor.history().len() >= before);

        let outcome = stressor.wait().await.unwrap();
        assert_eq!(outcome.reason, StopReason::TimeLimit);
        assert_eq!(outcome.profile, StressProfile::Medium);
        assert_eq!(counters.allocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dispatch_failure_ends_run_but_not_stressor() {
        let (stressor, _) = stressor(
            MockDevice::gpu("g", 4).with_burst_latency(BURST).fail_on_dispatch(3),
            DisabledProbe,
        );

        assert!(stressor.start(RunRequest::new(30.0)));
        let outcome = stressor.wait().await.unwrap();
        assert!(outcome.reason.is_failure());
        assert_eq!(outcome.bursts, 2);
        assert_eq!(stressor.history().len(), 2);
        assert!(!stressor.is_running());

        // The instance stays usable
        assert!(stressor.start(RunRequest::new(30.0)));
        let again = stressor.wait().await.unwrap();
        assert!(again.reason.is_failure());
        assert_eq!(stressor.history().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_allocation_failure_is_reported() {
        let (stressor, _) = stressor(MockDevice::gpu("g", 4).fail_allocation(), DisabledProbe);

        assert!(stressor.start(RunRequest::new(1.0)));
        let outcome = stressor.wait().await.unwrap();
        assert!(matches!(outcome.reason, StopReason::Failed { .. }));
        assert_eq!(outcome.bursts, 0);
        assert_eq!(stressor.last_outcome(), Some(outcome));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_active_units_are_clamped() {
        let cases = [(None, 8u64), (Some(0), 8), (Some(-2), 8), (Some(3), 3), (Some(100), 8)];

        for (requested, expected_units) in cases {
            let (stressor, counters) = stressor(MockDevice::gpu("g", 8), DisabledProbe);
            let mut request = RunRequest::new(0.02).with_profile(StressProfile::Heavy);
            request.active_units = requested;

            assert!(stressor.start(request));
            let outcome = stressor.wait().await.unwrap();

            assert_eq!(u64::from(outcome.active_units), expected_units);
            assert_eq!(counters.last_work_items.load(Ordering::SeqCst), expected_units * 16 * 2);
        }
    }

    #[tokio::test]
    async fn test_invalid_duration_is_rejected() {
        let (stressor, _) = stressor(MockDevice::gpu("g", 4), DisabledProbe);
        assert!(!stressor.start(RunRequest::new(0.0)));
        assert!(!stressor.start(RunRequest::new(-1.0)));
        assert!(!stressor.start(RunRequest::new(f64::NAN)));
        assert_eq!(stressor.phase(), RunPhase::Idle);
        assert_eq!(stressor.wait().await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_observer_never_sees_partial_samples() {
        let (stressor, _) = stressor(
            MockDevice::gpu("g", 4).with_burst_latency(Duration::from_millis(2)),
            MockProbe::constant(70, 100),
        );
        let stressor = Arc::new(stressor);

        assert!(stressor.start(RunRequest::new(0.3)));

        let observer = {
            let stressor = Arc::clone(&stressor);
            tokio::spawn(async move {
                let mut polls = 0u32;
                while stressor.is_running() {
                    let snapshot = stressor.history();
                    for sample in snapshot.iter() {
                        assert_eq!(sample.temperature, Some(70.0));
                        assert_eq!(sample.utilization, Some(100.0));
                    }
                    assert!(snapshot
                        .samples()
                        .windows(2)
                        .all(|w| w[0].elapsed_seconds < w[1].elapsed_seconds));
                    polls += 1;
                    tokio::task::yield_now().await;
                }
                polls
            })
        };

        let outcome = stressor.wait().await.unwrap();
        assert_eq!(outcome.reason, StopReason::TimeLimit);
        assert!(observer.await.unwrap() > 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_samples_since_and_summary() {
        let (stressor, _) = stressor(MockDevice::gpu("g", 4).with_burst_latency(BURST), MockProbe::constant(65, 90));

        assert!(stressor.start(RunRequest::new(0.15)));
        stressor.wait().await.unwrap();

        let all = stressor.samples_since(0);
        assert_eq!(all.len(), stressor.history().len());
        assert_eq!(stressor.samples_since(1).len(), all.len() - 1);
        assert!(stressor.samples_since(all.len() + 10).is_empty());
        assert_eq!(stressor.latest_sample(), all.last().copied());

        let summary = stressor.summarize();
        assert_eq!(summary.temperature.avg, Some(65.0));
        assert_eq!(summary.utilization.max, Some(90.0));
        assert_eq!(summary.duration_seconds, all.last().map(|s| s.elapsed_seconds));
    }

    #[test]
    fn test_stop_reason_display_is_distinct() {
        let reasons = [
            StopReason::TimeLimit,
            StopReason::ThermalLimit { temperature: 90, limit: 85 },
            StopReason::Stopped,
            StopReason::Failed { message: "boom".to_string() },
        ];
        let rendered: Vec<String> = reasons.iter().map(|r| r.to_string()).collect();
        for (i, a) in rendered.iter().enumerate() {
            for b in rendered.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
        assert_eq!(rendered[1], "temperature limit reached (90°C >= 85°C)");
    }

    #[test]
    fn test_construction_fails_without_device() {
        let config = StressConfig::new(crate::config::BackendKind::Mock)
            .with_device_class(crate::device::DeviceClass::Accelerator);
        assert!(matches!(Stressor::new(config), Err(StressError::DeviceNotFound(_))));
    }

    #[test]
    fn test_construction_with_mock_backend() {
        let config = StressConfig::new(crate::config::BackendKind::Mock).with_telemetry(false);
        let stressor = Stressor::new(config).unwrap();
        assert_eq!(stressor.platform(), "mock");
        assert_eq!(stressor.device_info().name, "Mock GPU 0");
        assert_eq!(stressor.phase(), RunPhase::Idle);
    }

    #[test]
    fn test_start_outside_runtime_leaves_stressor_idle() {
        let (stressor, counters) = stressor(MockDevice::gpu("g", 2), MockProbe::absent());

        assert!(!stressor.start(RunRequest::new(0.05)));
        assert!(!stressor.is_running());
        assert_eq!(stressor.phase(), RunPhase::Idle);
        assert_eq!(counters.allocations.load(Ordering::SeqCst), 0);

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let outcome = runtime.block_on(async {
            assert!(stressor.start(RunRequest::new(0.05)));
            stressor.wait().await
        });
        assert_eq!(outcome.unwrap().reason, StopReason::TimeLimit);
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cpu_run_ignores_gpu_diagnostic_tool() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let calls = dir.path().join("calls");
        let tool = dir.path().join("smi.sh");
        std::fs::write(&tool, format!("#!/bin/sh\necho \"$@\" >> '{}'\necho 99\n", calls.display())).unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = StressConfig::new(crate::config::BackendKind::Host)
            .with_device_class(crate::device::DeviceClass::Cpu)
            .with_telemetry_program(tool.to_string_lossy())
            .with_work_items_per_unit(1);
        let stressor = Stressor::new(config).unwrap();

        let request = RunRequest::new(0.1).with_max_temperature(85).with_profile(StressProfile::Light);
        assert!(stressor.start(request));
        let outcome = stressor.wait().await.unwrap();

        assert!(!matches!(outcome.reason, StopReason::ThermalLimit { temperature: 99, .. }));
        assert!(!outcome.reason.is_failure());
        assert!(!calls.exists());
    }
}

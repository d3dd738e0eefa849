//! Sweep orchestrator.
//!
//! A run moves through
//! `Idle → Preparing → Syncing → Armed → Running → {Completed | Aborted | Failed}`.
//! The first three phases run inside [`SweepRunner::start_run`], so their
//! failures reach the caller directly. `Running` is a background task that
//! polls `GET PSA STAT` and refetches the accumulated data whenever the step
//! count has grown since the last fetch.
//!
//! Progress is published on a broadcast channel; the runner never calls into
//! its consumers.
//!
//! # Example
//!
//! ```rust,ignore
//! let runner = SweepRunner::new(client).with_poll_interval(Duration::from_millis(50));
//! let mut events = runner.subscribe();
//! runner.start_run(request).await?;
//! while let Ok(event) = events.recv().await {
//!     if let SweepEvent::Finished(outcome) = event {
//!         println!("{}", outcome.state);
//!         break;
//!     }
//! }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::config::RunRequest;
use super::snapshot::{SweepSnapshot, SweepStatus};
use crate::error::{NevError, NevResult};
use crate::hardware::{ChannelKey, DigitizerSystem};
use crate::parsing::{parse_sweep_data, parse_sweep_status};
use crate::protocol::{DaqmxCommands, ScopeCommands, SweepCommands};
use crate::transport::ProtocolClient;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const EVENT_CAPACITY: usize = 64;

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    /// No run
    Idle,
    /// Snapshot reset
    Preparing,
    /// Pushing output and digitizer configuration
    Syncing,
    /// Sweep defined, waiting to start
    Armed,
    /// Polling the server
    Running,
    /// Every step acquired
    Completed,
    /// Stopped by the user or by the server
    Aborted,
    /// Ended on an error
    Failed,
}

impl RunState {
    /// True for the three end states.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Aborted | RunState::Failed)
    }

    /// True while a run holds the runner.
    pub fn is_active(self) -> bool {
        !self.is_terminal() && self != RunState::Idle
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "Idle",
            RunState::Preparing => "Preparing",
            RunState::Syncing => "Syncing",
            RunState::Armed => "Armed",
            RunState::Running => "Running",
            RunState::Completed => "Completed",
            RunState::Aborted => "Aborted",
            RunState::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Run identifier
    pub run_id: Uuid,
    /// Terminal state
    pub state: RunState,
    /// Error text when the run failed
    pub error: Option<String>,
    /// Final snapshot
    pub snapshot: Arc<SweepSnapshot>,
}

/// Notification published by the runner.
#[derive(Debug, Clone)]
pub enum SweepEvent {
    /// State transition
    State(RunState),
    /// New data was fetched
    Snapshot(Arc<SweepSnapshot>),
    /// The run reached a terminal state
    Finished(RunOutcome),
}

/// Releases the in-progress flag when the run ends, however it ends.
struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl RunGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> NevResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| NevError::RunInProgress)?;
        Ok(Self { flag: flag.clone() })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Shared pieces handed to the poll task.
#[derive(Clone)]
struct Shared {
    sweep: SweepCommands,
    events: broadcast::Sender<SweepEvent>,
    state: Arc<watch::Sender<RunState>>,
    stop: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl Shared {
    fn transition(&self, state: RunState) {
        self.state.send_replace(state);
        debug!(%state, "run state");
        // No subscribers is fine.
        let _ = self.events.send(SweepEvent::State(state));
    }

    fn publish(&self, snapshot: &Arc<SweepSnapshot>) {
        let _ = self.events.send(SweepEvent::Snapshot(snapshot.clone()));
    }

    fn finish(&self, snapshot: SweepSnapshot, result: Result<RunState, String>) -> RunOutcome {
        let run_id = snapshot.run_id;
        let (state, error) = match result {
            Ok(state) => (state, None),
            Err(message) => (RunState::Failed, Some(message)),
        };
        match (&state, &error) {
            (RunState::Completed, _) => info!(%run_id, steps = snapshot.stage, "sweep completed"),
            (_, Some(message)) => error!(%run_id, error = %message, "sweep failed"),
            _ => warn!(%run_id, %state, "sweep ended early"),
        }
        self.transition(state);
        let outcome = RunOutcome {
            run_id,
            state,
            error,
            snapshot: Arc::new(snapshot),
        };
        let _ = self.events.send(SweepEvent::Finished(outcome.clone()));
        outcome
    }
}

/// Runs one sweep at a time over a shared [`ProtocolClient`].
pub struct SweepRunner {
    client: ProtocolClient,
    shared: Shared,
    in_progress: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<RunOutcome>>>,
}

impl fmt::Debug for SweepRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SweepRunner")
            .field("client", &self.client)
            .field("state", &self.state())
            .field("poll_interval", &self.shared.poll_interval)
            .finish()
    }
}

impl SweepRunner {
    /// Runner polling every 100 ms.
    pub fn new(client: ProtocolClient) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (state, _) = watch::channel(RunState::Idle);
        Self {
            shared: Shared {
                sweep: SweepCommands::new(client.clone()),
                events,
                state: Arc::new(state),
                stop: Arc::new(AtomicBool::new(false)),
                poll_interval: DEFAULT_POLL_INTERVAL,
            },
            client,
            in_progress: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    /// Change the pause between status polls.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.shared.poll_interval = interval;
        self
    }

    /// Current state.
    pub fn state(&self) -> RunState {
        *self.shared.state.borrow()
    }

    /// True while a run holds the runner.
    pub fn is_running(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Subscribe to state changes, snapshots and run completion.
    pub fn subscribe(&self) -> broadcast::Receiver<SweepEvent> {
        self.shared.events.subscribe()
    }

    /// Start a run.
    ///
    /// Pushes the configuration, defines and starts the sweep, then hands
    /// polling to a background task and returns the run id. Errors before
    /// that point end the run as `Failed` and are returned here.
    #[instrument(skip(self, request), fields(union = request.union_id), err)]
    pub async fn start_run(&self, request: RunRequest) -> NevResult<Uuid> {
        let guard = RunGuard::acquire(&self.in_progress)?;
        self.shared.stop.store(false, Ordering::Release);

        self.shared.transition(RunState::Preparing);
        let run_id = Uuid::new_v4();
        let active = request.digitizers.active_channels();
        let snapshot = SweepSnapshot::new(run_id, request.union_id, &active);
        info!(%run_id, channels = active.len(), steps = request.sweep.steps, "starting sweep");

        if let Err(err) = self.prepare(&request).await {
            drop(guard);
            self.shared.finish(snapshot, Err(err.to_string()));
            return Err(err);
        }

        self.shared.transition(RunState::Running);
        let shared = self.shared.clone();
        let handle = tokio::spawn(poll_until_done(shared, guard, snapshot, active));
        *self.task.lock().await = Some(handle);
        Ok(run_id)
    }

    async fn prepare(&self, request: &RunRequest) -> NevResult<()> {
        request.sweep.validate(&request.outputs)?;
        let active_devices = request.digitizers.active_devices();
        if active_devices.is_empty() {
            return Err(NevError::Configuration(
                "No active digitizer channel to sample".into(),
            ));
        }
        for device_id in &active_devices {
            check_leading_channels(&request.digitizers, *device_id)?;
        }

        self.shared.transition(RunState::Syncing);
        DaqmxCommands::new(self.client.clone())
            .push_all(&request.outputs)
            .await?;
        sync_union(
            &ScopeCommands::new(self.client.clone()),
            request,
            &active_devices,
        )
        .await?;

        self.shared.transition(RunState::Armed);
        let sweep = &self.shared.sweep;
        sweep
            .configure(
                request.union_id,
                &request.sweep.target,
                request.sweep.encoded_range(),
                request.timing.skip_samples(),
            )
            .await?;
        sleep(request.timing.initial_delay()).await;
        sweep.run().await?;
        Ok(())
    }

    /// Ask the running sweep to stop before its next status poll.
    ///
    /// Calling it again, or with no run active, has no further effect.
    pub fn stop_run(&self) {
        if self.is_running() && !self.shared.stop.swap(true, Ordering::AcqRel) {
            info!("stop requested");
        }
    }

    /// Wait for the background poll task of the latest run.
    ///
    /// `None` when no run was handed to the poll task since the last call.
    pub async fn wait(&self) -> Option<RunOutcome> {
        let handle = self.task.lock().await.take()?;
        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                error!(error = %err, "sweep poll task panicked");
                None
            }
        }
    }
}

/// Union devices, per-device channels, data length, then frequency. Each
/// step relies on the previous one being applied server-side.
async fn sync_union(
    scope: &ScopeCommands,
    request: &RunRequest,
    active_devices: &[u32],
) -> NevResult<()> {
    let union_id = request.union_id;
    scope.set_union_devices(union_id, active_devices).await?;
    for device_id in active_devices {
        let channels = active_channel_settings(&request.digitizers, *device_id);
        scope
            .set_union_channels(union_id, *device_id, &channels)
            .await?;
    }
    scope
        .set_union_data_length(union_id, request.timing.data_length())
        .await?;
    scope
        .set_union_frequency(union_id, f64::from(request.timing.sampling.hz()))
        .await?;
    Ok(())
}

/// `SET NSU CHAN` blocks carry no channel index: the server applies them
/// from channel 0 upward and samples as many channels as it was given. The
/// active channels of a device must therefore be `0..n`.
fn check_leading_channels(digitizers: &DigitizerSystem, device_id: u32) -> NevResult<()> {
    let Some(device) = digitizers.device(device_id) else {
        return Err(NevError::Configuration(format!(
            "Unknown digitizer {device_id}"
        )));
    };
    for (position, channel) in device.active_channels().enumerate() {
        if channel.index as usize != position {
            return Err(NevError::Configuration(format!(
                "Digitizer {device_id}: active channels must start at channel 0 with no gaps \
                 (channel {} is active, channel {position} is not)",
                channel.index
            )));
        }
    }
    Ok(())
}

fn active_channel_settings(
    digitizers: &DigitizerSystem,
    device_id: u32,
) -> Vec<(crate::hardware::VerticalRange, crate::hardware::VerticalCoupling)> {
    digitizers
        .device(device_id)
        .map(|device| {
            device
                .active_channels()
                .map(|c| (c.range, c.coupling))
                .collect()
        })
        .unwrap_or_default()
}

async fn poll_until_done(
    shared: Shared,
    guard: RunGuard,
    mut snapshot: SweepSnapshot,
    active: Vec<ChannelKey>,
) -> RunOutcome {
    let result = poll_loop(&shared, &mut snapshot, &active).await;
    // Subscribers reacting to `Finished` may start the next run.
    drop(guard);
    shared.finish(snapshot, result.map_err(|err| err.to_string()))
}

async fn poll_loop(
    shared: &Shared,
    snapshot: &mut SweepSnapshot,
    active: &[ChannelKey],
) -> NevResult<RunState> {
    let mut bookmark = 0;
    loop {
        if shared.stop.load(Ordering::Acquire) {
            return Ok(RunState::Aborted);
        }

        let report = parse_sweep_status(&shared.sweep.status().await?)?;
        snapshot.apply_status(&report);
        let report = report.into_result()?;
        debug!(stage = report.stage, value = report.last_value, status = %report.status, "sweep status");

        match report.status {
            SweepStatus::Running => {}
            SweepStatus::Complete => return Ok(RunState::Completed),
            SweepStatus::Unknown => {
                return Err(NevError::SweepFailed(
                    "server reported an UNKNOWN sweep status".into(),
                ))
            }
            _ => return Ok(RunState::Aborted),
        }

        if report.stage > bookmark {
            let reply = shared.sweep.data(0, report.stage).await?;
            snapshot.replace_data(parse_sweep_data(&reply, active)?);
            shared.publish(&Arc::new(snapshot.clone()));
            bookmark = report.stage;
        }

        sleep(shared.poll_interval).await;
    }
}

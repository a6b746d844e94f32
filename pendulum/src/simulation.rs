//! The run loop: step, log, publish, check for settling or cancellation.
//!
//! A run lives on its own thread. The thread owns the `PendulumState`
//! outright; the only shared pieces are the run's `TrajectoryLog` (behind
//! a mutex, created fresh for every run) and its `CancelToken`. Everything
//! else flows out over an `mpsc` channel as `RunEvent`s tagged with the
//! run id, so a presentation layer can drop events from a retired run.
//!
//! ## Rust Lesson #22: Sharing Between Threads
//!
//! `Arc<T>` is a thread-safe reference count; `Mutex<T>` gives one writer
//! at a time; `AtomicBool` is a flag both sides can touch without a lock.
//! Setting an atomic never blocks, even after the loop has already quit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::display::DisplayUpdate;
use crate::error::PendulumError;
use crate::geometry::PivotPoint;
use crate::integrator::{PendulumState, step};
use crate::params::{PendulumParameters, StartRequest};
use crate::plot::{PlotRenderer, PlotSet};
use crate::trajectory::{TrajectoryLog, TrajectorySample};

/// Tolerance for both halves of the settling check (raw radians).
pub const SETTLE_EPSILON: f64 = 1e-6;

/// Real-time pause between iterations in the interactive app.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(10);

/// Settled: angle near zero AND the per-step angle change near zero.
///
/// Both checks are on raw radians, never on the normalized degrees shown
/// to the user.
#[inline]
pub fn is_settled(state: &PendulumState) -> bool {
    state.angle.abs() < SETTLE_EPSILON
        && (state.angular_velocity() * state.time_step).abs() < SETTLE_EPSILON
}

// ============================================================================
// Cancellation and pacing
// ============================================================================

/// Idempotent, non-blocking stop request.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Safe to call any number of times, from any
    /// thread, whether or not a loop is still listening.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// The clock that paces iterations in real time.
///
/// Simulated time always advances by `dt` per step; the pacer only decides
/// how long the wall clock waits in between.
pub trait Pacer: Send + Sync {
    fn pause(&self);
}

/// Sleeps a fixed interval after every step.
#[derive(Debug, Clone, Copy)]
pub struct RealTimePacer {
    interval: Duration,
}

impl RealTimePacer {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for RealTimePacer {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_INTERVAL)
    }
}

impl Pacer for RealTimePacer {
    fn pause(&self) {
        thread::sleep(self.interval);
    }
}

/// Never waits. Runs as fast as the CPU allows.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unpaced;

impl Pacer for Unpaced {
    fn pause(&self) {}
}

// ============================================================================
// Events and loop states
// ============================================================================

/// Where the controller is in the run lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Idle,
    Running,
    /// Cancel requested, loop has not observed it yet.
    Cancelling,
}

/// Why a loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Natural termination: the settling condition held.
    Settled,
    /// The cancel token was observed.
    Cancelled,
    /// The configured step limit was reached.
    StepLimit,
}

/// What the loop thread hands back when it is joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopExit {
    pub run_id: u64,
    pub reason: ExitReason,
    pub iterations: u64,
}

/// Messages from a run loop to the foreground.
#[derive(Debug)]
pub enum RunEvent {
    /// Published once per iteration.
    Tick { run_id: u64, update: DisplayUpdate },
    /// The pendulum settled. `plots` is `None` when no renderer is configured.
    Settled {
        run_id: u64,
        iterations: u64,
        plots: Option<Result<PlotSet, PendulumError>>,
    },
    /// The loop exited early (cancel or step limit) without rendering.
    Stopped { run_id: u64, iterations: u64, reason: ExitReason },
}

impl RunEvent {
    pub fn run_id(&self) -> u64 {
        match self {
            RunEvent::Tick { run_id, .. }
            | RunEvent::Settled { run_id, .. }
            | RunEvent::Stopped { run_id, .. } => *run_id,
        }
    }
}

fn lock_log(log: &Mutex<TrajectoryLog>) -> MutexGuard<'_, TrajectoryLog> {
    // The log stays usable even if a holder panicked mid-append.
    log.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// The loop itself
// ============================================================================

/// Everything one loop thread owns or shares.
struct RunContext {
    run_id: u64,
    params: PendulumParameters,
    pivot: PivotPoint,
    log: Arc<Mutex<TrajectoryLog>>,
    cancel: CancelToken,
    events: Sender<RunEvent>,
    pacer: Arc<dyn Pacer>,
    renderer: Option<PlotRenderer>,
    step_limit: Option<u64>,
}

fn run_loop(ctx: RunContext, mut state: PendulumState) -> LoopExit {
    let mut iterations: u64 = 0;
    let exit = |reason, iterations| LoopExit { run_id: ctx.run_id, reason, iterations };

    loop {
        let (next, position) = step(&ctx.params, &state, ctx.pivot);
        state = next;
        iterations += 1;

        lock_log(&ctx.log).append(TrajectorySample::new(
            state.elapsed,
            state.angle,
            state.angular_velocity(),
        ));

        // A closed receiver just means nobody is watching.
        let _ = ctx.events.send(RunEvent::Tick {
            run_id: ctx.run_id,
            update: DisplayUpdate::from_state(&state, position),
        });

        if is_settled(&state) {
            log::info!(
                "run {} settled after {} steps ({:.2} s simulated)",
                ctx.run_id,
                iterations,
                state.elapsed
            );
            let plots = ctx.renderer.as_ref().map(|renderer| {
                let snapshot = lock_log(&ctx.log).snapshot();
                renderer.render_run(&snapshot)
            });
            if let Some(Err(e)) = &plots {
                log::warn!("run {}: plot rendering failed: {}", ctx.run_id, e);
            }
            let _ = ctx.events.send(RunEvent::Settled {
                run_id: ctx.run_id,
                iterations,
                plots,
            });
            return exit(ExitReason::Settled, iterations);
        }

        if ctx.cancel.is_cancelled() {
            log::debug!("run {} observed cancellation after {} steps", ctx.run_id, iterations);
            let _ = ctx.events.send(RunEvent::Stopped {
                run_id: ctx.run_id,
                iterations,
                reason: ExitReason::Cancelled,
            });
            return exit(ExitReason::Cancelled, iterations);
        }

        if ctx.step_limit.is_some_and(|limit| iterations >= limit) {
            log::debug!("run {} hit its step limit ({})", ctx.run_id, iterations);
            let _ = ctx.events.send(RunEvent::Stopped {
                run_id: ctx.run_id,
                iterations,
                reason: ExitReason::StepLimit,
            });
            return exit(ExitReason::StepLimit, iterations);
        }

        ctx.pacer.pause();
    }
}

// ============================================================================
// Foreground controller
// ============================================================================

/// The run currently attached to the controller.
struct ActiveRun {
    run_id: u64,
    cancel: CancelToken,
    log: Arc<Mutex<TrajectoryLog>>,
    /// `None` once joined.
    handle: Option<JoinHandle<LoopExit>>,
    exit: Option<LoopExit>,
}

impl ActiveRun {
    /// Cancel and wait for the thread. Returns immediately if already joined.
    fn retire(&mut self) -> Option<LoopExit> {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(exit) => self.exit = Some(exit),
                Err(_) => log::warn!("run {} loop thread panicked", self.run_id),
            }
        }
        self.exit
    }
}

/// Owns at most one running loop and starts/stops it on command.
///
/// ## Rust Lesson #23: Ownership as a Concurrency Guarantee
///
/// `start` takes `&mut self`, so only one caller can be starting or
/// stopping at a time, and it joins the previous thread before spawning
/// the next. Two loops can never write to the same log: each run gets
/// its own `Arc<Mutex<TrajectoryLog>>` and the old one is dropped.
pub struct Simulation {
    pivot: PivotPoint,
    pacer: Arc<dyn Pacer>,
    renderer: Option<PlotRenderer>,
    step_limit: Option<u64>,
    events: Sender<RunEvent>,
    next_run_id: u64,
    active: Option<ActiveRun>,
}

impl Simulation {
    /// Create an idle controller and the receiver for its events.
    pub fn new(pivot: PivotPoint, pacer: Arc<dyn Pacer>) -> (Self, Receiver<RunEvent>) {
        let (events, rx) = mpsc::channel();
        let sim = Self {
            pivot,
            pacer,
            renderer: None,
            step_limit: None,
            events,
            next_run_id: 1,
            active: None,
        };
        (sim, rx)
    }

    /// Render plots on settling (in the loop) and on `stop_and_render`.
    pub fn with_renderer(mut self, renderer: PlotRenderer) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// End every run after at most `limit` steps.
    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = Some(limit);
        self
    }

    pub fn renderer(&self) -> Option<&PlotRenderer> {
        self.renderer.as_ref()
    }

    /// Start a new run, retiring any previous one first.
    ///
    /// Invalid parameters are rejected before anything is touched, so the
    /// previous run (if any) keeps going.
    pub fn start(&mut self, request: StartRequest) -> Result<u64, PendulumError> {
        request.params.validate()?;
        if !(request.time_step.is_finite() && request.time_step > 0.0) {
            return Err(PendulumError::InvalidParameters(format!(
                "time step must be positive, got {}",
                request.time_step
            )));
        }

        if let Some(previous) = self.active.as_ref().filter(|run| run.handle.is_some()) {
            log::info!("restart: retiring run {}", previous.run_id);
        }
        self.retire();

        let run_id = self.next_run_id;
        self.next_run_id += 1;

        let log = Arc::new(Mutex::new(TrajectoryLog::with_capacity(4096)));
        let cancel = CancelToken::new();
        let ctx = RunContext {
            run_id,
            params: request.params,
            pivot: self.pivot,
            log: Arc::clone(&log),
            cancel: cancel.clone(),
            events: self.events.clone(),
            pacer: Arc::clone(&self.pacer),
            renderer: self.renderer.clone(),
            step_limit: self.step_limit,
        };
        let state = request.initial_state();

        log::info!(
            "run {} start: l={} m={} g={} k={} angle={:.4} rad omega={:.4} rad/s dt={}",
            run_id,
            request.params.length,
            request.params.mass,
            request.params.gravity,
            request.params.damping,
            request.angle,
            request.angular_velocity,
            request.time_step
        );

        let handle = thread::spawn(move || run_loop(ctx, state));
        self.active = Some(ActiveRun {
            run_id,
            cancel,
            log,
            handle: Some(handle),
            exit: None,
        });
        Ok(run_id)
    }

    /// Cancel the active loop and wait for it to exit.
    ///
    /// Returns the log collected so far when this call actually ended a
    /// run early. Returns `None` when there was nothing to stop: no run,
    /// a run that already settled (and rendered its own plots), or a run
    /// that was stopped before. Never blocks on a loop that has exited.
    pub fn stop(&mut self) -> Option<Vec<TrajectorySample>> {
        let run = self.active.as_mut()?;
        if run.handle.is_none() {
            return None;
        }
        let exit = run.retire()?;
        log::info!("run {} stopped after {} steps ({:?})", run.run_id, exit.iterations, exit.reason);
        match exit.reason {
            ExitReason::Settled => None,
            ExitReason::Cancelled | ExitReason::StepLimit => Some(lock_log(&run.log).snapshot()),
        }
    }

    /// `stop`, then render the partial log with the configured renderer.
    pub fn stop_and_render(&mut self) -> Option<Result<PlotSet, PendulumError>> {
        let snapshot = self.stop()?;
        let renderer = self.renderer.as_ref()?;
        Some(renderer.render_run(&snapshot))
    }

    /// Quit path: make sure no loop outlives the controller.
    pub fn shutdown(&mut self) {
        self.retire();
    }

    fn retire(&mut self) {
        if let Some(mut run) = self.active.take() {
            run.retire();
        }
    }

    pub fn phase(&self) -> LoopPhase {
        match &self.active {
            Some(ActiveRun { handle: Some(handle), cancel, .. }) if !handle.is_finished() => {
                if cancel.is_cancelled() {
                    LoopPhase::Cancelling
                } else {
                    LoopPhase::Running
                }
            }
            _ => LoopPhase::Idle,
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase() != LoopPhase::Idle
    }

    /// Id of the run whose log is attached, if any.
    pub fn current_run_id(&self) -> Option<u64> {
        self.active.as_ref().map(|run| run.run_id)
    }

    /// Copy of the attached run's log (empty when nothing has run yet).
    ///
    /// The log is kept after a run ends, until the next `start`.
    pub fn snapshot(&self) -> Vec<TrajectorySample> {
        self.active
            .as_ref()
            .map(|run| lock_log(&run.log).snapshot())
            .unwrap_or_default()
    }

    /// Wait for the attached loop to exit on its own.
    pub fn join(&mut self) -> Option<LoopExit> {
        let run = self.active.as_mut()?;
        if let Some(handle) = run.handle.take() {
            match handle.join() {
                Ok(exit) => run.exit = Some(exit),
                Err(_) => log::warn!("run {} loop thread panicked", run.run_id),
            }
        }
        run.exit
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.retire();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::deg_to_rad;
    use std::time::Instant;

    fn reference_request() -> StartRequest {
        StartRequest::new(PendulumParameters::new(1.0, 1.0, 0.5, 9.81), 70.0, 0.0, 0.01).unwrap()
    }

    /// Undamped, so it never settles on its own.
    fn endless_request(angle_deg: f64) -> StartRequest {
        StartRequest::new(PendulumParameters::new(1.0, 1.0, 0.0, 9.81), angle_deg, 0.0, 0.01).unwrap()
    }

    fn unpaced() -> (Simulation, Receiver<RunEvent>) {
        Simulation::new(PivotPoint::default(), Arc::new(Unpaced))
    }

    fn paced() -> (Simulation, Receiver<RunEvent>) {
        Simulation::new(PivotPoint::default(), Arc::new(RealTimePacer::new(Duration::from_millis(1))))
    }

    fn wait_for_ticks(rx: &Receiver<RunEvent>, run_id: u64, count: usize) {
        let mut seen = 0;
        while seen < count {
            let event = rx.recv_timeout(Duration::from_secs(5)).expect("loop stalled");
            if matches!(event, RunEvent::Tick { run_id: id, .. } if id == run_id) {
                seen += 1;
            }
        }
    }

    fn assert_time_ordered(samples: &[TrajectorySample], dt: f64) {
        for (i, sample) in samples.iter().enumerate() {
            let expected = (i + 1) as f64 * dt;
            assert!(
                (sample.time - expected).abs() < 1e-9,
                "sample {} at t={} expected {}",
                i,
                sample.time,
                expected
            );
        }
        for pair in samples.windows(2) {
            assert!(pair[1].time > pair[0].time);
        }
    }

    #[test]
    fn settling_check_needs_both_tolerances() {
        let mut state = PendulumState::from_initial(5e-7, 0.0, 0.01);
        assert!(is_settled(&state));

        // Near zero but still moving
        state.angle_previous = state.angle - 2e-6;
        assert!(!is_settled(&state));

        // Still but displaced
        let state = PendulumState::from_initial(2e-6, 0.0, 0.01);
        assert!(!is_settled(&state));
    }

    #[test]
    fn cancel_token_is_idempotent() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn reference_run_settles_within_band() {
        // Reference run settled after 4291 steps (t = 42.91 s).
        let (mut sim, rx) = unpaced();
        let run_id = sim.start(reference_request()).unwrap();

        let exit = sim.join().unwrap();
        assert_eq!(exit.run_id, run_id);
        assert_eq!(exit.reason, ExitReason::Settled);
        assert!(
            (4200..=4400).contains(&exit.iterations),
            "settled after {} iterations",
            exit.iterations
        );

        let samples = sim.snapshot();
        assert_eq!(samples.len() as u64, exit.iterations);
        let last = samples.last().unwrap();
        assert!(last.angle.abs() < SETTLE_EPSILON);
        assert!((last.angular_velocity * 0.01).abs() < SETTLE_EPSILON);
        assert_time_ordered(&samples, 0.01);

        let settled = rx.try_iter().find_map(|event| match event {
            RunEvent::Settled { iterations, plots, .. } => Some((iterations, plots.is_none())),
            _ => None,
        });
        assert_eq!(settled, Some((exit.iterations, true)));
    }

    #[test]
    fn one_tick_per_sample() {
        let (mut sim, rx) = unpaced();
        sim.start(reference_request()).unwrap();
        let exit = sim.join().unwrap();

        let ticks: Vec<DisplayUpdate> = rx
            .try_iter()
            .filter_map(|event| match event {
                RunEvent::Tick { update, .. } => Some(update),
                _ => None,
            })
            .collect();
        assert_eq!(ticks.len() as u64, exit.iterations);
        assert!(ticks.iter().all(|u| u.angle_deg > -180.0 && u.angle_deg <= 180.0));
        assert!((ticks[0].elapsed - 0.01).abs() < 1e-12);
    }

    #[test]
    fn stop_after_natural_termination_returns_immediately() {
        let (mut sim, _rx) = unpaced();
        sim.start(reference_request()).unwrap();
        sim.join().unwrap();

        let started = Instant::now();
        assert!(sim.stop().is_none());
        assert!(sim.stop().is_none());
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(sim.phase(), LoopPhase::Idle);
    }

    #[test]
    fn stop_with_no_run_is_a_no_op() {
        let (mut sim, _rx) = unpaced();
        assert!(sim.stop().is_none());
        assert!(sim.stop_and_render().is_none());
        assert!(sim.snapshot().is_empty());
        assert_eq!(sim.phase(), LoopPhase::Idle);
    }

    #[test]
    fn stop_mid_run_hands_back_partial_log() {
        let (mut sim, rx) = paced();
        let run_id = sim.start(endless_request(30.0)).unwrap();
        wait_for_ticks(&rx, run_id, 20);
        assert_eq!(sim.phase(), LoopPhase::Running);

        let partial = sim.stop().expect("run was active");
        assert!(partial.len() >= 20);
        assert_time_ordered(&partial, 0.01);
        assert_eq!(sim.phase(), LoopPhase::Idle);

        // The log outlives the stop and no longer grows
        assert_eq!(sim.snapshot(), partial);
        assert!(sim.stop().is_none());

        let stopped = rx.try_iter().any(|event| {
            matches!(event, RunEvent::Stopped { reason: ExitReason::Cancelled, .. })
        });
        assert!(stopped);
    }

    #[test]
    fn stop_and_render_plots_the_partial_log() {
        let dir = std::env::temp_dir().join(format!("pendulum-sim-stop-{}", std::process::id()));
        let renderer =
            PlotRenderer::with_fonts(&dir, false, Arc::new(resvg::usvg::fontdb::Database::new()));
        let (sim, rx) = paced();
        let mut sim = sim.with_renderer(renderer);
        let run_id = sim.start(endless_request(40.0)).unwrap();
        wait_for_ticks(&rx, run_id, 15);

        let plots = match sim.stop_and_render() {
            Some(Ok(plots)) => plots,
            other => panic!("expected plots, got {:?}", other.map(|r| r.err())),
        };
        for (_, artifact) in plots.iter() {
            assert_eq!(artifact.dimensions(), (794, 556));
            assert!(artifact.path.is_none());
        }

        // Nothing left to stop, so nothing is rendered twice
        assert!(sim.stop_and_render().is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn restart_only_keeps_samples_from_the_new_run() {
        let (mut sim, rx) = paced();
        let first = sim.start(endless_request(70.0)).unwrap();
        wait_for_ticks(&rx, first, 30);

        let second = sim.start(endless_request(10.0)).unwrap();
        assert_ne!(first, second);
        wait_for_ticks(&rx, second, 10);
        let samples = sim.stop().unwrap();

        assert!(!samples.is_empty());
        assert_time_ordered(&samples, 0.01);
        // First step from 10° at rest stays close to 10°
        assert!((samples[0].angle - deg_to_rad(10.0)).abs() < 1e-2);
        assert!(samples.iter().all(|s| s.angle.abs() <= deg_to_rad(10.0) + 1e-3));

        // No events from the first run arrive after the second started
        let mut seen_second = false;
        for event in rx.try_iter() {
            if event.run_id() == second {
                seen_second = true;
            } else {
                assert!(!seen_second, "stale event from run {}", event.run_id());
            }
        }
    }

    #[test]
    fn invalid_start_leaves_current_run_alone() {
        let (mut sim, rx) = paced();
        let run_id = sim.start(endless_request(45.0)).unwrap();
        wait_for_ticks(&rx, run_id, 5);

        let mut bad = endless_request(45.0);
        bad.params.mass = 0.0;
        assert!(matches!(sim.start(bad), Err(PendulumError::InvalidParameters(_))));
        assert_eq!(sim.current_run_id(), Some(run_id));
        assert_eq!(sim.phase(), LoopPhase::Running);
        sim.shutdown();
        assert_eq!(sim.phase(), LoopPhase::Idle);
    }

    #[test]
    fn step_limit_ends_run_without_rendering() {
        let (sim, rx) = unpaced();
        let mut sim = sim.with_step_limit(250);
        sim.start(endless_request(20.0)).unwrap();
        let exit = sim.join().unwrap();

        assert_eq!(exit.reason, ExitReason::StepLimit);
        assert_eq!(exit.iterations, 250);
        assert_eq!(sim.snapshot().len(), 250);
        assert!(rx.try_iter().all(|event| !matches!(event, RunEvent::Settled { .. })));

        // Already joined: nothing left to stop, the log stays readable
        assert!(sim.stop().is_none());
        assert_eq!(sim.snapshot().len(), 250);
    }

    #[test]
    fn resting_start_settles_on_first_step() {
        let (mut sim, _rx) = unpaced();
        let request = StartRequest::new(PendulumParameters::default(), 0.0, 0.0, 0.01).unwrap();
        sim.start(request).unwrap();
        let exit = sim.join().unwrap();
        assert_eq!(exit.reason, ExitReason::Settled);
        assert_eq!(exit.iterations, 1);
        assert_eq!(sim.snapshot()[0].angle, 0.0);
    }
}

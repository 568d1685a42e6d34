//! Fixed-Timestep Tick Scheduler
//!
//! Advances simulation time at a fixed rate regardless of how irregularly
//! the host wakes us. The accumulator logic is a pure state machine
//! ([`TickScheduler`]) driven by monotonic timestamps, so tests feed it
//! synthetic clocks; the [`TimerThread`] wrapper supplies real wakeups from
//! a dedicated thread that nothing in the host process can throttle.
//!
//! Safety rails, all per wakeup: elapsed time is capped at 250 ms (a stalled
//! host does not trigger a spiral of death), at most 10 ticks run, and no
//! more than 50 ms of real time is spent in the loop. Whatever accumulator
//! remains is carried forward.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

/// Cap on elapsed wall time per wakeup, in milliseconds.
pub const MAX_ELAPSED_MS: u64 = 250;

/// Maximum ticks executed per wakeup.
pub const MAX_TICKS_PER_WAKE: u32 = 10;

/// Real-time budget for one wakeup's tick loop, in milliseconds.
pub const WAKE_BUDGET_MS: u64 = 50;

/// Scheduler run state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    /// Created but never started.
    Stopped,
    /// Producing ticks.
    Running,
    /// Start requested but gated on a wall-clock instant (multiplayer start
    /// coordination).
    Armed,
    /// Paused; wakeups are absorbed without producing ticks.
    Paused,
}

/// Fixed-timestep accumulator.
pub struct TickScheduler {
    state: SchedulerState,
    period_ms: u64,
    accumulator_ms: u64,
    last_wake: Option<Instant>,
    start_at: Option<Instant>,
    ticks_produced: u64,
}

impl TickScheduler {
    /// Scheduler at a tick rate (ticks/second).
    pub fn new(tick_rate: u32) -> Self {
        Self {
            state: SchedulerState::Stopped,
            period_ms: 1000 / tick_rate.max(1) as u64,
            accumulator_ms: 0,
            last_wake: None,
            start_at: None,
            ticks_produced: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Tick period in milliseconds.
    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    /// Total ticks produced since start.
    pub fn ticks_produced(&self) -> u64 {
        self.ticks_produced
    }

    /// Start producing ticks. Idempotent: starting a running scheduler does
    /// nothing.
    pub fn start(&mut self) {
        if self.state == SchedulerState::Running {
            return;
        }
        self.state = SchedulerState::Running;
        self.accumulator_ms = 0;
        self.last_wake = None;
    }

    /// Arm the scheduler to begin at an agreed wall-clock instant. All peers
    /// pass the same instant, so timer drift on one peer cannot skew the
    /// shared start tick.
    pub fn start_at(&mut self, instant: Instant) {
        if self.state == SchedulerState::Running {
            return;
        }
        self.state = SchedulerState::Armed;
        self.start_at = Some(instant);
        self.accumulator_ms = 0;
        self.last_wake = None;
    }

    /// Pause; wakeups stop producing ticks until [`resume`](Self::resume).
    pub fn pause(&mut self) {
        if self.state == SchedulerState::Running {
            self.state = SchedulerState::Paused;
        }
    }

    /// Resume from pause. Elapsed pause time is discarded, not accumulated.
    pub fn resume(&mut self) {
        if self.state == SchedulerState::Paused {
            self.state = SchedulerState::Running;
            self.last_wake = None;
        }
    }

    /// Stop permanently (match over).
    pub fn stop(&mut self) {
        self.state = SchedulerState::Stopped;
        self.accumulator_ms = 0;
        self.last_wake = None;
        self.start_at = None;
    }

    /// Change the tick rate. Takes effect on the next wakeup.
    pub fn set_rate(&mut self, tick_rate: u32) {
        self.period_ms = 1000 / tick_rate.max(1) as u64;
    }

    /// Process one timer wakeup at `now`, invoking `run_tick` once per due
    /// tick. Returns the number of ticks executed.
    pub fn on_wake(&mut self, now: Instant, mut run_tick: impl FnMut()) -> u32 {
        match self.state {
            SchedulerState::Stopped | SchedulerState::Paused => return 0,
            SchedulerState::Armed => {
                let Some(start) = self.start_at else {
                    self.state = SchedulerState::Stopped;
                    return 0;
                };
                if now < start {
                    return 0;
                }
                self.state = SchedulerState::Running;
                // Time begins at the agreed instant, not at this wakeup.
                self.last_wake = Some(start);
            }
            SchedulerState::Running => {}
        }

        let elapsed_ms = match self.last_wake {
            Some(prev) => now.saturating_duration_since(prev).as_millis() as u64,
            None => self.period_ms,
        };
        self.last_wake = Some(now);

        self.accumulator_ms += elapsed_ms.min(MAX_ELAPSED_MS);

        let loop_start = Instant::now();
        let mut executed = 0u32;
        while self.accumulator_ms >= self.period_ms {
            if executed >= MAX_TICKS_PER_WAKE {
                debug!(
                    carried_ms = self.accumulator_ms,
                    "tick iteration cap hit, carrying accumulator"
                );
                break;
            }
            if loop_start.elapsed().as_millis() as u64 >= WAKE_BUDGET_MS {
                debug!(
                    carried_ms = self.accumulator_ms,
                    "tick time budget hit, carrying accumulator"
                );
                break;
            }
            self.accumulator_ms -= self.period_ms;
            run_tick();
            executed += 1;
            self.ticks_produced += 1;
        }
        executed
    }
}

// =============================================================================
// TIMER THREAD
// =============================================================================

/// Wake signal carrying only a monotonic timestamp.
#[derive(Clone, Copy, Debug)]
pub struct WakeSignal(pub Instant);

/// Dedicated timing thread. It owns nothing but a channel sender and a
/// period; the simulation thread consumes [`WakeSignal`]s at its leisure.
pub struct TimerThread {
    receiver: Receiver<WakeSignal>,
    shutdown: Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TimerThread {
    /// Spawn a timer firing at half the tick period (oversampling keeps the
    /// accumulator smooth without busy-waiting).
    ///
    /// Fails if the OS refuses the thread; callers propagate rather than
    /// panic, since this runs at every match start.
    pub fn spawn(tick_period_ms: u64) -> std::io::Result<Self> {
        let (wake_tx, wake_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let interval = Duration::from_millis((tick_period_ms / 2).max(1));

        let handle = thread::Builder::new()
            .name("ashfall-timer".into())
            .spawn(move || loop {
                if shutdown_rx.try_recv().is_ok() {
                    return;
                }
                thread::sleep(interval);
                if wake_tx.send(WakeSignal(Instant::now())).is_err() {
                    return;
                }
            })?;

        Ok(Self {
            receiver: wake_rx,
            shutdown: shutdown_tx,
            handle: Some(handle),
        })
    }

    /// Block for the next wake signal. `None` means the timer died.
    pub fn wait(&self) -> Option<WakeSignal> {
        self.receiver.recv().ok()
    }

    /// Non-blocking poll for a pending wake signal.
    pub fn poll(&self) -> Option<WakeSignal> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for TimerThread {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

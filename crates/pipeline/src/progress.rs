//! Progress smoothing for sparse, bursty backend progress reports.
//!
//! A [`ProgressSmoother`] turns raw `0..=100` reports into a displayed
//! value that only moves forward within a job:
//!
//! | Raw target                        | Effect                                   |
//! |-----------------------------------|------------------------------------------|
//! | `0`                               | cancel pending steps, display 0          |
//! | `<= displayed`                    | ignored                                  |
//! | `>= 99`                           | cancel pending steps, display target     |
//! | `5 < t <= 20` while displayed 0   | early ramp: 5, 60%, 85%, t at 160ms steps |
//! | anything else                     | 3-8 linear steps across the ramp window  |
//!
//! Pending steps are owned by the smoother, cancelled by every accepted
//! report and aborted on drop.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Delay between early-ramp steps.
const EARLY_RAMP_STEP: Duration = Duration::from_millis(160);

const EARLY_RAMP_MIN_EXCLUSIVE: f64 = 5.0;
const EARLY_RAMP_MAX: f64 = 20.0;
const EARLY_RAMP_FIRST: f64 = 5.0;

/// Targets at or above this are shown immediately.
const IMMEDIATE_THRESHOLD: f64 = 99.0;

/// Displayed value a step will set after `delay`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressStep {
    pub delay: Duration,
    pub value: f64,
}

/// Steps that move the display from `current` to `target`.
///
/// Assumes `current < target < 99`; callers handle resets and immediate
/// targets.
pub fn plan_steps(current: f64, target: f64, window: Duration) -> Vec<ProgressStep> {
    if current == 0.0 && target > EARLY_RAMP_MIN_EXCLUSIVE && target <= EARLY_RAMP_MAX {
        return early_ramp(target);
    }

    let delta = target - current;
    let count = ((delta / 4.0).ceil() as u32).clamp(3, 8);
    let step = window / count;
    (1..=count)
        .map(|i| ProgressStep {
            delay: step * i,
            value: if i == count {
                target
            } else {
                current + delta * f64::from(i) / f64::from(count)
            },
        })
        .collect()
}

fn early_ramp(target: f64) -> Vec<ProgressStep> {
    let candidates = [
        EARLY_RAMP_FIRST,
        (target * 0.6).round(),
        (target * 0.85).round(),
        target,
    ];
    let mut steps = Vec::with_capacity(candidates.len());
    let mut previous = 0.0;
    for (i, candidate) in candidates.into_iter().enumerate() {
        let value = candidate.min(target);
        if value <= previous {
            continue;
        }
        steps.push(ProgressStep {
            delay: EARLY_RAMP_STEP * i as u32,
            value,
        });
        previous = value;
    }
    steps
}

// ---------------------------------------------------------------------------
// ProgressSmoother
// ---------------------------------------------------------------------------

type ChangeHook = Box<dyn Fn(f64) + Send + Sync>;

struct SmootherState {
    displayed: f64,
    /// Bumped whenever pending steps are invalidated.
    epoch: u64,
    pending: Vec<JoinHandle<()>>,
}

struct Shared {
    state: Mutex<SmootherState>,
    sender: watch::Sender<f64>,
    on_change: Option<ChangeHook>,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, SmootherState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, state: &mut SmootherState, value: f64) {
        state.displayed = value;
        self.sender.send_replace(value);
        if let Some(hook) = &self.on_change {
            hook(value);
        }
    }
}

/// Per-slot smoothed progress. Must be used inside a Tokio runtime.
pub struct ProgressSmoother {
    shared: Arc<Shared>,
    window: Duration,
}

impl ProgressSmoother {
    pub fn new(window: Duration) -> Self {
        Self::build(window, None)
    }

    /// Smoother that calls `on_change` with every displayed value.
    pub fn with_hook(window: Duration, on_change: impl Fn(f64) + Send + Sync + 'static) -> Self {
        Self::build(window, Some(Box::new(on_change)))
    }

    fn build(window: Duration, on_change: Option<ChangeHook>) -> Self {
        let (sender, _) = watch::channel(0.0);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SmootherState {
                    displayed: 0.0,
                    epoch: 0,
                    pending: Vec::new(),
                }),
                sender,
                on_change,
            }),
            window,
        }
    }

    pub fn displayed(&self) -> f64 {
        self.shared.lock().displayed
    }

    pub fn subscribe(&self) -> watch::Receiver<f64> {
        self.shared.sender.subscribe()
    }

    /// Number of steps scheduled but not yet applied.
    pub fn pending_steps(&self) -> usize {
        self.shared
            .lock()
            .pending
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    /// Feed one raw progress report.
    pub fn on_raw_progress(&self, target: f64) {
        if target.is_nan() {
            return;
        }
        let target = target.clamp(0.0, 100.0);
        let mut state = self.shared.lock();

        if target == 0.0 {
            Self::invalidate(&mut state);
            self.shared.set(&mut state, 0.0);
            return;
        }
        if target <= state.displayed {
            return;
        }

        Self::invalidate(&mut state);
        if target >= IMMEDIATE_THRESHOLD {
            self.shared.set(&mut state, target);
            return;
        }

        let epoch = state.epoch;
        for step in plan_steps(state.displayed, target, self.window) {
            if step.delay.is_zero() {
                self.shared.set(&mut state, step.value);
                continue;
            }
            let shared = Arc::clone(&self.shared);
            let handle = tokio::spawn(async move {
                tokio::time::sleep(step.delay).await;
                let mut state = shared.lock();
                if state.epoch == epoch && step.value > state.displayed {
                    shared.set(&mut state, step.value);
                }
            });
            state.pending.push(handle);
        }
    }

    /// Reset to 0 and drop anything in flight.
    pub fn reset(&self) {
        self.on_raw_progress(0.0);
    }

    /// Cancel pending steps without changing the displayed value.
    pub fn cancel_pending(&self) {
        Self::invalidate(&mut self.shared.lock());
    }

    fn invalidate(state: &mut SmootherState) {
        state.epoch += 1;
        for handle in state.pending.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for ProgressSmoother {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

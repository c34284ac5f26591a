//! Blocking waits on asynchronous pipeline state changes.
//!
//! Each wait owns a result slot (a `Mutex` + `Condvar` pair) that no other
//! wait shares. The listener feeding the slot is attached before the
//! pipeline is asked to move, so a transition completing on the pipeline's
//! worker thread cannot be missed.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::media::{Pipeline, PipelineEvent, PipelineState};

/// How a [`StateSynchronizer::wait`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Reached,
    /// A close or error event arrived, or the pipeline was found in a
    /// terminal state.
    Failed,
    /// [`StateSynchronizer::interrupt_all`] cancelled the wait.
    Interrupted,
}

impl WaitOutcome {
    pub fn is_reached(self) -> bool {
        self == Self::Reached
    }
}

impl fmt::Display for WaitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reached => write!(f, "Reached"),
            Self::Failed => write!(f, "Failed"),
            Self::Interrupted => write!(f, "Interrupted"),
        }
    }
}

#[derive(Debug, Default)]
struct SlotState {
    failed: bool,
    interrupted: bool,
    events: u64,
}

#[derive(Debug, Default)]
struct WaitSlot {
    state: Mutex<SlotState>,
    cond: Condvar,
}

impl WaitSlot {
    fn deliver(&self, event: &PipelineEvent) {
        let mut state = self.state.lock();
        state.events += 1;
        if event.is_fatal() {
            state.failed = true;
        }
        self.cond.notify_all();
    }

    fn interrupt(&self) {
        let mut state = self.state.lock();
        state.interrupted = true;
        self.cond.notify_all();
    }
}

/// Turns pipeline events into blocking waits.
///
/// Waits have no timeout: a pipeline that never reports progress blocks the
/// caller until [`interrupt_all`](Self::interrupt_all) is called.
///
/// An interrupt is sticky. Waits registered after it also end as
/// interrupted until [`reset`](Self::reset) clears it.
#[derive(Debug, Default)]
pub struct StateSynchronizer {
    pending: Mutex<HashMap<u64, Arc<WaitSlot>>>,
    next_wait: AtomicU64,
    cancelled: AtomicBool,
}

impl StateSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `pipeline` reaches `target`. Returns `false` on failure
    /// or interruption.
    pub fn wait_for_state(&self, pipeline: &dyn Pipeline, target: PipelineState) -> bool {
        self.wait(pipeline, target).is_reached()
    }

    /// Attach a fresh listener, trigger the transition, and block until the
    /// outcome is known.
    ///
    /// `configure()` is issued for [`PipelineState::Configured`] and
    /// `realize()` for [`PipelineState::Realized`], unless the pipeline is
    /// already there. Other targets are only waited for.
    pub fn wait(&self, pipeline: &dyn Pipeline, target: PipelineState) -> WaitOutcome {
        let slot = Arc::new(WaitSlot::default());
        let wait_id = self.next_wait.fetch_add(1, Ordering::SeqCst);
        {
            // Checked under the pending lock so a concurrent interrupt_all()
            // either sees this slot or has already set the flag.
            let mut pending = self.pending.lock();
            pending.insert(wait_id, slot.clone());
            if self.cancelled.load(Ordering::SeqCst) {
                slot.interrupt();
            }
        }

        let listener_slot = slot.clone();
        let listener = pipeline.add_listener(Arc::new(move |event: &PipelineEvent| {
            listener_slot.deliver(event)
        }));

        if !slot.state.lock().interrupted && !pipeline.state().has_reached(target) {
            match target {
                PipelineState::Configured => pipeline.configure(),
                PipelineState::Realized => pipeline.realize(),
                _ => {}
            }
        }

        let (outcome, events) = {
            let mut state = slot.state.lock();
            let outcome = loop {
                if state.interrupted {
                    break WaitOutcome::Interrupted;
                }
                if state.failed {
                    break WaitOutcome::Failed;
                }
                let current = pipeline.state();
                if current.is_terminal() {
                    break WaitOutcome::Failed;
                }
                if current.has_reached(target) {
                    break WaitOutcome::Reached;
                }
                slot.cond.wait(&mut state);
            };
            (outcome, state.events)
        };

        pipeline.remove_listener(listener);
        self.pending.lock().remove(&wait_id);

        tracing::debug!(
            %target,
            state = %pipeline.state(),
            %outcome,
            events,
            "state wait finished"
        );
        outcome
    }

    /// Mark every in-flight wait as interrupted and wake it. Later waits
    /// are interrupted as well until [`reset`](Self::reset). Returns how
    /// many waits were pending.
    pub fn interrupt_all(&self) -> usize {
        let pending = self.pending.lock();
        self.cancelled.store(true, Ordering::SeqCst);
        for slot in pending.values() {
            slot.interrupt();
        }
        if !pending.is_empty() {
            tracing::info!(waits = pending.len(), "interrupting state waits");
        }
        pending.len()
    }

    /// Clear a previous interrupt so new waits block again.
    pub fn reset(&self) {
        let _pending = self.pending.lock();
        self.cancelled.store(false, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Number of waits currently blocked.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }
}

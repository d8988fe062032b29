//! Progress reporting and cooperative cancellation.
//!
//! Progress flows one way: converter → chain → manager → caller. It never
//! influences control flow. Cancellation is a shared flag that converters
//! poll; the chain itself checks it between links.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives percentage-complete notifications.
pub trait ProgressSink {
    /// Progress in percent, `0..=100`.
    fn set_progress(&self, percent: u32);
}

impl<F> ProgressSink for F
where
    F: Fn(u32),
{
    fn set_progress(&self, percent: u32) {
        self(percent)
    }
}

struct UpdaterState {
    sink: Rc<dyn ProgressSink>,
    subtasks: Vec<(u32, u32)>,
    last_reported: Option<u32>,
    generation: u64,
}

impl UpdaterState {
    /// The new overall percentage, if it changed since the last report.
    fn pending(&mut self) -> Option<(Rc<dyn ProgressSink>, u32)> {
        let total_weight: u64 = self.subtasks.iter().map(|(w, _)| *w as u64).sum();
        if total_weight == 0 {
            return None;
        }
        let done: u64 = self
            .subtasks
            .iter()
            .map(|(w, p)| *w as u64 * (*p).min(100) as u64)
            .sum();
        let percent = (done / total_weight) as u32;
        if self.last_reported == Some(percent) {
            return None;
        }
        self.last_reported = Some(percent);
        Some((self.sink.clone(), percent))
    }
}

/// Aggregates the progress of weighted sub-tasks into a single percentage.
///
/// Cloning yields another handle onto the same aggregate.
#[derive(Clone)]
pub struct ProgressUpdater {
    state: Rc<RefCell<UpdaterState>>,
}

impl ProgressUpdater {
    /// Create an updater reporting to `sink`.
    pub fn new(sink: Rc<dyn ProgressSink>) -> Self {
        Self {
            state: Rc::new(RefCell::new(UpdaterState {
                sink,
                subtasks: Vec::new(),
                last_reported: None,
                generation: 0,
            })),
        }
    }

    /// Register a sub-task contributing `weight` to the total.
    pub fn start_subtask(&self, weight: u32) -> SubTask {
        let mut state = self.state.borrow_mut();
        state.subtasks.push((weight.max(1), 0));
        SubTask {
            state: self.state.clone(),
            index: state.subtasks.len() - 1,
            generation: state.generation,
        }
    }

    /// Drop all sub-tasks and start a fresh aggregate.
    ///
    /// Handles from before the reset no longer affect the reported total.
    pub fn reset(&self) {
        let mut state = self.state.borrow_mut();
        state.subtasks.clear();
        state.last_reported = None;
        state.generation += 1;
    }

    /// Number of sub-tasks started so far.
    pub fn subtask_count(&self) -> usize {
        self.state.borrow().subtasks.len()
    }
}

/// One weighted share of a [`ProgressUpdater`].
pub struct SubTask {
    state: Rc<RefCell<UpdaterState>>,
    index: usize,
    generation: u64,
}

impl SubTask {
    /// Update this sub-task's own progress in percent.
    pub fn set_progress(&self, percent: u32) {
        let pending = {
            let mut state = self.state.borrow_mut();
            if state.generation != self.generation {
                return;
            }
            if let Some(task) = state.subtasks.get_mut(self.index) {
                task.1 = percent.min(100);
            }
            state.pending()
        };
        // The sink may call back into the updater
        if let Some((sink, percent)) = pending {
            sink.set_progress(percent);
        }
    }

    /// Mark this sub-task complete.
    pub fn finish(&self) {
        self.set_progress(100);
    }
}

/// Where a manager sends the progress of its chains.
#[derive(Clone, Default)]
pub enum ProgressTarget {
    /// Progress is discarded.
    #[default]
    None,
    /// Raw converter progress is relayed unchanged.
    Relay(Rc<dyn ProgressSink>),
    /// Each chain link reports through its own weighted sub-task.
    Aggregate(ProgressUpdater),
}

impl ProgressTarget {
    /// One channel per chain link, in link order.
    ///
    /// Aggregated sub-tasks are all registered up front so that finishing
    /// one link never reports the whole chain as complete. Each chain starts
    /// a fresh aggregate.
    pub(crate) fn channels_for_links(&self, weights: impl IntoIterator<Item = u32>) -> VecDeque<ProgressChannel> {
        if let ProgressTarget::Aggregate(updater) = self {
            updater.reset();
        }
        weights
            .into_iter()
            .map(|weight| match self {
                ProgressTarget::None => ProgressChannel::Silent,
                ProgressTarget::Relay(sink) => ProgressChannel::Relay(sink.clone()),
                ProgressTarget::Aggregate(updater) => ProgressChannel::SubTask(updater.start_subtask(weight)),
            })
            .collect()
    }
}

/// Progress handle bound to a single running converter.
pub(crate) enum ProgressChannel {
    Silent,
    Relay(Rc<dyn ProgressSink>),
    SubTask(SubTask),
}

impl ProgressChannel {
    pub(crate) fn report(&self, percent: u32) {
        match self {
            ProgressChannel::Silent => {},
            ProgressChannel::Relay(sink) => sink.set_progress(percent.min(100)),
            ProgressChannel::SubTask(task) => task.set_progress(percent),
        }
    }

    pub(crate) fn finish(&self) {
        if let ProgressChannel::SubTask(task) = self {
            task.finish();
        }
    }
}

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear a previous cancellation request.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

//! Progress reporting and cooperative cancellation.
//!
//! Long-running phases report through a [`ProgressSink`] at a fixed cadence
//! and poll a [`CancellationToken`]. Sinks may be invoked from worker
//! threads; marshaling to an interactive context is the caller's business.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Pipeline phase a progress update belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Counting,
    Decoding,
    DeepDecoding,
    Merging,
    Statistics,
    SnapshotWrite,
    SnapshotRead,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Counting => "counting",
            Phase::Decoding => "decoding",
            Phase::DeepDecoding => "deep-decoding",
            Phase::Merging => "merging",
            Phase::Statistics => "statistics",
            Phase::SnapshotWrite => "snapshot-write",
            Phase::SnapshotRead => "snapshot-read",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One progress notification.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub phase: Phase,
    /// Human-readable description of the current operation.
    pub operation: String,
    /// Completion in percent, always within 0..=100.
    pub percent: u8,
}

impl ProgressUpdate {
    pub fn new(phase: Phase, operation: impl Into<String>, percent: u8) -> Self {
        Self {
            phase,
            operation: operation.into(),
            percent: percent.min(100),
        }
    }
}

/// Receiver of progress updates.
pub trait ProgressSink: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        self(update)
    }
}

/// Sink that drops every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _update: ProgressUpdate) {}
}

/// Integer percentage of `done` over `total`, clamped to 100.
///
/// An unknown or zero total reports 0 until the work is done.
pub fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    ((done.saturating_mul(100)) / total).min(100) as u8
}

/// Cloneable cooperative cancellation flag.
///
/// A child token observes its parent's cancellation but can be cancelled on
/// its own without touching the parent.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::clone(&self.flag)),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self
                .parent
                .as_ref()
                .is_some_and(|parent| parent.load(Ordering::SeqCst))
    }
}

//! Shared state between the controller and the worker: the three-level stop
//! intent and the live resume-point mirror.
//!
//! The controller context is the only writer of the intent flags; the worker
//! observes them at step boundaries (and the immediate flag between the
//! sub-operations of a step) and never clears them itself.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::error::StopKind;
use crate::types::ResumePoint;

/// Tri-level stop request flags. Flags latch until `clear()`.
#[derive(Debug, Default)]
pub struct RunIntent {
    after_step: AtomicBool,
    after_slice: AtomicBool,
    now: AtomicBool,
}

impl RunIntent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self, kind: StopKind) {
        match kind {
            StopKind::AfterStep => self.after_step.store(true, Ordering::Relaxed),
            StopKind::AfterSlice => self.after_slice.store(true, Ordering::Relaxed),
            StopKind::Immediate => self.now.store(true, Ordering::Relaxed),
        }
    }

    pub fn stop_after_step(&self) -> bool {
        self.after_step.load(Ordering::Relaxed)
    }

    pub fn stop_after_slice(&self) -> bool {
        self.after_slice.load(Ordering::Relaxed)
    }

    pub fn stop_now(&self) -> bool {
        self.now.load(Ordering::Relaxed)
    }

    /// Reset all flags; called by the controller before a fresh run.
    pub fn clear(&self) {
        self.after_step.store(false, Ordering::Relaxed);
        self.after_slice.store(false, Ordering::Relaxed);
        self.now.store(false, Ordering::Relaxed);
    }
}

/// Lock-free mirror of the scheduler's current resume point, readable from
/// the controller while the worker is mid-step.
#[derive(Debug)]
pub struct Progress {
    slice: AtomicU32,
    step: AtomicU32,
}

impl Default for Progress {
    fn default() -> Self {
        let start = ResumePoint::start();
        Self {
            slice: AtomicU32::new(start.slice_number),
            step: AtomicU32::new(start.step_number),
        }
    }
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, point: ResumePoint) {
        self.slice.store(point.slice_number, Ordering::Relaxed);
        self.step.store(point.step_number, Ordering::Relaxed);
    }

    pub fn load(&self) -> ResumePoint {
        ResumePoint::new(
            self.slice.load(Ordering::Relaxed),
            self.step.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_latch_until_cleared() {
        let intent = RunIntent::new();
        assert!(!intent.stop_after_step());
        intent.request(StopKind::AfterStep);
        intent.request(StopKind::Immediate);
        assert!(intent.stop_after_step());
        assert!(intent.stop_now());
        assert!(!intent.stop_after_slice());
        intent.clear();
        assert!(!intent.stop_after_step() && !intent.stop_now());
    }

    #[test]
    fn progress_round_trips() {
        let p = Progress::new();
        assert_eq!(p.load(), ResumePoint::start());
        p.store(ResumePoint::new(7, 3));
        assert_eq!(p.load(), ResumePoint::new(7, 3));
    }
}

//! Worker/controller split: the experiment runs on its own thread while the
//! controlling context stays responsive for stop requests and progress polls.
//!
//! Shared state is limited to the intent flags, the progress mirror, and a
//! once-written outcome box; driver and executors live entirely on the worker.

use crossbeam_channel as xch;
use std::sync::Arc;
use std::thread::JoinHandle;

use sectioner_traits::MicroscopeDriver;

use crate::error::{Fault, StopKind};
use crate::intent::{Progress, RunIntent};
use crate::scheduler::Experiment;
use crate::status::ExperimentStatus;
use crate::types::ResumePoint;

/// Controller-side handle to a running experiment.
pub struct ExperimentHandle {
    intent: Arc<RunIntent>,
    progress: Arc<Progress>,
    rx: xch::Receiver<ExperimentStatus>,
    join: Option<JoinHandle<()>>,
}

impl ExperimentHandle {
    /// Move `experiment` onto a worker thread and start it at `start`.
    pub fn spawn<D>(experiment: Experiment<D>, start: ResumePoint) -> Self
    where
        D: MicroscopeDriver + Send + 'static,
    {
        let intent = experiment.intent_handle();
        let progress = experiment.progress_handle();
        intent.clear();
        let (tx, rx) = xch::bounded(1);

        let join = std::thread::spawn(move || {
            let mut experiment = experiment;
            let outcome = experiment.run(start);
            if tx.send(outcome).is_err() {
                tracing::debug!("controller dropped before the outcome was delivered");
            }
        });

        Self {
            intent,
            progress,
            rx,
            join: Some(join),
        }
    }

    /// Shared intent flags, e.g. for signal handlers.
    pub fn intent(&self) -> Arc<RunIntent> {
        Arc::clone(&self.intent)
    }

    /// Request a pause once the step in progress finishes.
    pub fn stop_after_step(&self) {
        self.intent.request(StopKind::AfterStep);
    }

    /// Request a pause once the slice in progress finishes.
    pub fn stop_after_slice(&self) {
        self.intent.request(StopKind::AfterSlice);
    }

    /// Request an immediate stop. Best-effort: the worker abandons the step
    /// at its next cooperative check and attempts an emergency hardware stop;
    /// a blocking opaque operation is not preempted.
    pub fn stop_now(&self) {
        self.intent.request(StopKind::Immediate);
    }

    /// The first not-yet-completed step as of the last worker update.
    pub fn resume_point(&self) -> ResumePoint {
        self.progress.load()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(|j| j.is_finished())
    }

    /// Outcome if the worker has already finished, without blocking.
    pub fn try_outcome(&self) -> Option<ExperimentStatus> {
        self.rx.try_recv().ok()
    }

    /// Block until the worker finishes and return the outcome.
    pub fn wait(mut self) -> ExperimentStatus {
        let outcome = self.rx.recv().ok();
        if let Some(join) = self.join.take()
            && join.join().is_err()
        {
            tracing::error!("worker thread panicked");
        }
        outcome.unwrap_or_else(|| ExperimentStatus::Aborted {
            fault: Fault::Hardware("worker exited without reporting an outcome".into()),
            resume: self.progress.load(),
        })
    }
}

impl Drop for ExperimentHandle {
    fn drop(&mut self) {
        // A dropped controller must not leave the worker sectioning unattended.
        self.intent.request(StopKind::Immediate);
        if let Some(join) = self.join.take() {
            match join.join() {
                Ok(()) => tracing::trace!("worker thread joined"),
                Err(e) => tracing::warn!(?e, "worker thread panicked during shutdown"),
            }
        }
    }
}

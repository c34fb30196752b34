//! Final outcome of an experiment run.

use crate::error::Fault;
use crate::types::ResumePoint;

/// How a run ended. `Paused` and `Aborted` both carry the first
/// not-yet-completed step so a later run can restart exactly there.
#[derive(Debug, Clone)]
pub enum ExperimentStatus {
    /// Every step of every slice was executed (or frequency-skipped).
    Completed,
    /// Deferred operator stop; nothing was abandoned mid-step.
    Paused(ResumePoint),
    /// A fault (including an immediate operator stop) ended the run.
    Aborted { fault: Fault, resume: ResumePoint },
}

impl ExperimentStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, ExperimentStatus::Completed)
    }

    /// Where a follow-up run should restart, if the run did not complete.
    pub fn resume_point(&self) -> Option<ResumePoint> {
        match self {
            ExperimentStatus::Completed => None,
            ExperimentStatus::Paused(p) => Some(*p),
            ExperimentStatus::Aborted { resume, .. } => Some(*resume),
        }
    }
}

impl std::fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExperimentStatus::Completed => f.write_str("completed"),
            ExperimentStatus::Paused(p) => write!(f, "paused; resume at {p}"),
            ExperimentStatus::Aborted { fault, resume } => {
                write!(f, "aborted at {resume}: {fault}")
            }
        }
    }
}

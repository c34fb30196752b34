use sectioner_traits::{DeviceId, DeviceState, StageAxis};
use thiserror::Error;

/// Requested stop level, from softest to hardest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopKind {
    /// Finish the step in progress, then stop.
    AfterStep,
    /// Finish every remaining step of the slice in progress, then stop.
    AfterSlice,
    /// Stop at the next cooperative check, abandoning the step in progress.
    Immediate,
}

impl std::fmt::Display for StopKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StopKind::AfterStep => "after step",
            StopKind::AfterSlice => "after slice",
            StopKind::Immediate => "immediate",
        })
    }
}

/// One axis that missed its target after the retry budget was spent.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisDeviation {
    pub axis: StageAxis,
    /// Absolute error in mm (translational axes) or degrees (angular axes).
    pub error: f64,
    /// The tolerance the axis was held to, in the same unit as `error`.
    pub tolerance: f64,
}

/// Full per-axis deviation report carried by a convergence fault.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviationReport {
    pub axes: Vec<AxisDeviation>,
}

impl std::fmt::Display for DeviationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, d) in self.axes.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            let unit = if d.axis.is_translational() { "mm" } else { "deg" };
            write!(
                f,
                "{} axis error {:.6} {unit}, tolerance {:.6} {unit}",
                d.axis.label(),
                d.error,
                d.tolerance
            )?;
        }
        Ok(())
    }
}

/// Typed fault taxonomy for everything that can abort a run.
#[derive(Debug, Error, Clone)]
pub enum Fault {
    /// Bad step or position input, caught before any hardware action.
    #[error("validation error: {0}")]
    Validation(String),
    /// Target position outside the travel-limit envelope. Never auto-corrected.
    #[error(
        "unsafe target: {} = {value:.6} outside stage limit [{min:.6}, {max:.6}]",
        .axis.label()
    )]
    Safety {
        axis: StageAxis,
        value: f64,
        min: f64,
        max: f64,
    },
    /// Interlock violation: insert refused, target device untouched.
    #[error("cannot insert {device}: {blocked_by} is not retracted")]
    Collision {
        device: DeviceId,
        blocked_by: DeviceId,
    },
    /// Stage did not reach the target after the bounded retry budget.
    #[error("stage move did not converge: {0}")]
    Convergence(DeviationReport),
    /// A device reported a terminal state; requires external reset.
    #[error("device {device} is in {} state", .state.label())]
    Device {
        device: DeviceId,
        state: DeviceState,
    },
    /// Operator-initiated stop.
    #[error("run cancelled ({0})")]
    Cancelled(StopKind),
    /// Opaque executor failure; content unknown to the engine.
    #[error("operation failed in step '{step}': {message}")]
    Operation { step: String, message: String },
    /// Driver call failure.
    #[error("hardware error: {0}")]
    Hardware(String),
    /// Position log write failure.
    #[error("log error: {0}")]
    Io(String),
}

/// Map a trait-boundary driver error to a typed fault.
pub fn map_driver_error(e: &(dyn std::error::Error + 'static)) -> Fault {
    Fault::Hardware(e.to_string())
}

/// Recover the typed fault from a report, falling back to a hardware fault
/// for anything raised outside the taxonomy.
pub fn fault_of(report: &Report) -> Fault {
    report
        .downcast_ref::<Fault>()
        .cloned()
        .unwrap_or_else(|| Fault::Hardware(report.to_string()))
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing driver")]
    MissingDriver,
    #[error("missing general settings")]
    MissingGeneralSettings,
    #[error("missing step sequence")]
    MissingSteps,
    #[error("no executor registered for {0} steps")]
    MissingExecutor(&'static str),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;

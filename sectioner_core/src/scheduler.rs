//! The experiment state machine: slice/step iteration, frequency gating,
//! per-step safety choreography, fault handling, and resumability.

use std::sync::Arc;

use sectioner_traits::MicroscopeDriver;

use crate::devices::InterlockManager;
use crate::error::{Fault, Result, StopKind, fault_of};
use crate::executor::ExecutorSet;
use crate::intent::{Progress, RunIntent};
use crate::logging::{PositionLogger, PositionTag};
use crate::stage::{MotionController, target_position};
use crate::status::ExperimentStatus;
use crate::types::{GeneralSettings, ResumePoint, Step};

/// A fully validated experiment, ready to run. Owns the driver, the executor
/// table, and the log sink; constructed through [`crate::ExperimentBuilder`].
pub struct Experiment<D: MicroscopeDriver> {
    pub(crate) driver: D,
    pub(crate) general: GeneralSettings,
    pub(crate) steps: Vec<Step>,
    pub(crate) executors: ExecutorSet,
    pub(crate) logger: Box<dyn PositionLogger>,
    pub(crate) motion: MotionController,
    pub(crate) interlocks: InterlockManager,
    pub(crate) intent: Arc<RunIntent>,
    pub(crate) progress: Arc<Progress>,
}

impl<D: MicroscopeDriver> std::fmt::Debug for Experiment<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Experiment")
            .field("general", &self.general)
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

/// Immediate-stop check used between the sub-operations of a step.
fn check_immediate(intent: &RunIntent) -> Result<()> {
    if intent.stop_now() {
        return Err(eyre::Report::new(Fault::Cancelled(StopKind::Immediate)));
    }
    Ok(())
}

impl<D: MicroscopeDriver> Experiment<D> {
    /// Shared intent flags, for a controller context.
    pub fn intent_handle(&self) -> Arc<RunIntent> {
        Arc::clone(&self.intent)
    }

    /// Shared resume-point mirror, for a controller context.
    pub fn progress_handle(&self) -> Arc<Progress> {
        Arc::clone(&self.progress)
    }

    pub fn general(&self) -> &GeneralSettings {
        &self.general
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Run from `start` until completion, a stop intent, or a fault.
    ///
    /// The resume point carried by every non-completed outcome is the first
    /// not-yet-completed step: a failed or abandoned step resumes at itself,
    /// a finished step resumes after itself.
    pub fn run(&mut self, start: ResumePoint) -> ExperimentStatus {
        if let Err(fault) = self.validate_start(&start) {
            return ExperimentStatus::Aborted {
                fault,
                resume: start,
            };
        }
        tracing::info!(
            slice = start.slice_number,
            step = start.step_number,
            max_slice = self.general.max_slice_number,
            steps = self.general.step_count,
            "starting sectioning run"
        );

        let mut first_step = start.step_number;
        for slice in start.slice_number..=self.general.max_slice_number {
            for number in first_step..=self.general.step_count {
                let here = ResumePoint::new(slice, number);
                self.progress.store(here);

                if let Err(report) = self.perform_step(slice, number) {
                    let fault = fault_of(&report);
                    self.react_to_fault(&fault);
                    tracing::error!(slice, step = number, fault = %fault, "run aborted");
                    return ExperimentStatus::Aborted {
                        fault,
                        resume: here,
                    };
                }

                let next = self.next_point(slice, number);
                if let Some(next) = next {
                    self.progress.store(next);
                }

                // Step boundary: act on any latched stop intent.
                if self.intent.stop_now() {
                    let Some(resume) = next else {
                        break; // the run just finished anyway
                    };
                    let fault = Fault::Cancelled(StopKind::Immediate);
                    self.react_to_fault(&fault);
                    tracing::warn!(slice, step = number, "run stopped immediately");
                    return ExperimentStatus::Aborted { fault, resume };
                }
                if self.intent.stop_after_step() {
                    let Some(resume) = next else { break };
                    tracing::info!(slice, step = number, "run paused after step");
                    return ExperimentStatus::Paused(resume);
                }
                if number == self.general.step_count && self.intent.stop_after_slice() {
                    let Some(resume) = next else { break };
                    tracing::info!(slice, "run paused after slice");
                    return ExperimentStatus::Paused(resume);
                }
            }
            first_step = 1;
        }

        tracing::info!("sectioning run complete");
        ExperimentStatus::Completed
    }

    /// The step after `(slice, number)`, or `None` past the end of the run.
    fn next_point(&self, slice: u32, number: u32) -> Option<ResumePoint> {
        if number < self.general.step_count {
            Some(ResumePoint::new(slice, number + 1))
        } else if slice < self.general.max_slice_number {
            Some(ResumePoint::new(slice + 1, 1))
        } else {
            None
        }
    }

    fn validate_start(&self, start: &ResumePoint) -> std::result::Result<(), Fault> {
        if start.slice_number < 1 || start.slice_number > self.general.max_slice_number {
            return Err(Fault::Validation(format!(
                "start slice {} outside 1..={}",
                start.slice_number, self.general.max_slice_number
            )));
        }
        if start.step_number < 1 || start.step_number > self.general.step_count {
            return Err(Fault::Validation(format!(
                "start step {} outside 1..={}",
                start.step_number, self.general.step_count
            )));
        }
        Ok(())
    }

    /// Execute (or frequency-skip) one step of one slice.
    ///
    /// Executed steps run: log pre-position, retract all devices, move to the
    /// slice target, dispatch the opaque operation, log post-position,
    /// retract all devices. The immediate stop flag is polled between the
    /// sub-operations.
    fn perform_step(&mut self, slice: u32, number: u32) -> Result<()> {
        let step = &self.steps[(number - 1) as usize];
        tracing::info!(
            slice,
            step = number,
            of = self.general.step_count,
            name = %step.name,
            kind = %step.step_type,
            "step"
        );

        // Slices are 1-indexed; slice 1 runs every step.
        if (slice - 1) % step.frequency != 0 {
            tracing::info!(
                frequency = step.frequency,
                "step not due on this slice, skipping"
            );
            return Ok(());
        }

        check_immediate(&self.intent)?;
        let pre = self.motion.current_position(&mut self.driver)?;
        self.logger
            .record_position(number, &step.name, slice, PositionTag::Before, &pre)
            .map_err(|e| eyre::Report::new(Fault::Io(e.to_string())))?;

        self.interlocks.retract_all(&mut self.driver)?;

        check_immediate(&self.intent)?;
        let target = target_position(&step.stage, slice, self.general.slice_thickness_um)?;
        tracing::info!(position = %target, "moving to step start position");
        self.motion.move_to_position(&mut self.driver, &target)?;

        check_immediate(&self.intent)?;
        let executor = self
            .executors
            .get_mut(step.step_type)
            .ok_or_else(|| {
                eyre::Report::new(Fault::Validation(format!(
                    "no executor registered for {} steps",
                    step.step_type
                )))
            })?;
        executor
            .execute(step, &self.general, slice)
            .map_err(|e| {
                eyre::Report::new(Fault::Operation {
                    step: step.name.clone(),
                    message: e.to_string(),
                })
            })?;

        check_immediate(&self.intent)?;
        let post = self.motion.current_position(&mut self.driver)?;
        self.logger
            .record_position(number, &step.name, slice, PositionTag::After, &post)
            .map_err(|e| eyre::Report::new(Fault::Io(e.to_string())))?;

        self.interlocks.retract_all(&mut self.driver)?;
        tracing::info!(slice, step = number, "step complete");
        Ok(())
    }

    /// An immediate cancellation or an opaque-operation failure may have left
    /// hardware mid-motion; try to halt it before surfacing the fault.
    fn react_to_fault(&mut self, fault: &Fault) {
        let wants_stop = matches!(
            fault,
            Fault::Operation { .. } | Fault::Cancelled(StopKind::Immediate)
        );
        if !wants_stop {
            return;
        }
        match self.driver.emergency_stop() {
            Ok(()) => tracing::warn!("emergency stop issued"),
            Err(e) => tracing::error!(error = %e, "emergency stop failed"),
        }
    }
}

//! Pre-flight assembly and validation of an [`Experiment`].

use std::collections::HashSet;
use std::sync::Arc;

use sectioner_traits::{Clock, MicroscopeDriver, MonotonicClock};

use crate::devices::{CollisionRule, InterlockCfg, InterlockManager};
use crate::error::{BuildError, Result};
use crate::executor::{ExecutorSet, OperationExecutor};
use crate::intent::{Progress, RunIntent};
use crate::logging::{NullPositionLogger, PositionLogger};
use crate::scheduler::Experiment;
use crate::stage::{MotionCfg, MotionController};
use crate::types::{GeneralSettings, Step, StepType};
use crate::units::normalize_r_deg;

/// Builder for [`Experiment`]. All invariants of the step sequence and the
/// general settings are checked in [`ExperimentBuilder::try_build`].
pub struct ExperimentBuilder<D> {
    driver: Option<D>,
    general: Option<GeneralSettings>,
    steps: Vec<Step>,
    executors: ExecutorSet,
    logger: Option<Box<dyn PositionLogger>>,
    motion_cfg: Option<MotionCfg>,
    interlock_cfg: Option<InterlockCfg>,
    collision_rules: Vec<CollisionRule>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
}

impl<D> Default for ExperimentBuilder<D> {
    fn default() -> Self {
        Self {
            driver: None,
            general: None,
            steps: Vec::new(),
            executors: ExecutorSet::new(),
            logger: None,
            motion_cfg: None,
            interlock_cfg: None,
            collision_rules: Vec::new(),
            clock: None,
        }
    }
}

impl<D: MicroscopeDriver> Experiment<D> {
    pub fn builder() -> ExperimentBuilder<D> {
        ExperimentBuilder::default()
    }
}

impl<D: MicroscopeDriver> ExperimentBuilder<D> {
    pub fn with_driver(mut self, driver: D) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn with_general(mut self, general: GeneralSettings) -> Self {
        self.general = Some(general);
        self
    }

    pub fn with_steps(mut self, steps: Vec<Step>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_executor(
        mut self,
        step_type: StepType,
        executor: Box<dyn OperationExecutor>,
    ) -> Self {
        self.executors.register(step_type, executor);
        self
    }

    pub fn with_logger(mut self, logger: Box<dyn PositionLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_motion_cfg(mut self, cfg: MotionCfg) -> Self {
        self.motion_cfg = Some(cfg);
        self
    }

    pub fn with_interlock_cfg(mut self, cfg: InterlockCfg) -> Self {
        self.interlock_cfg = Some(cfg);
        self
    }

    pub fn with_collision_rule(mut self, rule: CollisionRule) -> Self {
        self.collision_rules.push(rule);
        self
    }

    pub fn with_collision_rules(mut self, rules: impl IntoIterator<Item = CollisionRule>) -> Self {
        self.collision_rules.extend(rules);
        self
    }

    /// Deterministic clock hook for tests; defaults to the monotonic clock.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate and assemble the experiment.
    pub fn try_build(self) -> Result<Experiment<D>> {
        let ExperimentBuilder {
            driver,
            general,
            mut steps,
            executors,
            logger,
            motion_cfg,
            interlock_cfg,
            collision_rules,
            clock,
        } = self;

        let driver = driver.ok_or_else(|| eyre::Report::new(BuildError::MissingDriver))?;
        let general =
            general.ok_or_else(|| eyre::Report::new(BuildError::MissingGeneralSettings))?;
        if steps.is_empty() {
            return Err(eyre::Report::new(BuildError::MissingSteps));
        }

        validate_general(&general, steps.len())?;
        validate_steps(&steps)?;
        executors.covers(&steps).map_err(eyre::Report::new)?;

        // Canonicalize the rotation coordinate once, before anything moves.
        for step in &mut steps {
            let r = step.stage.initial_position.r_deg;
            step.stage.initial_position.r_deg = normalize_r_deg(r);
        }

        let clock: Arc<dyn Clock + Send + Sync> = match clock {
            Some(b) => Arc::from(b),
            None => Arc::new(MonotonicClock::new()),
        };
        let motion = MotionController::new(
            general.stage_tolerance,
            motion_cfg.unwrap_or_default(),
            Arc::clone(&clock),
        );
        let interlocks = InterlockManager::new(
            collision_rules,
            interlock_cfg.unwrap_or_default(),
            Arc::clone(&clock),
        );

        Ok(Experiment {
            driver,
            general,
            steps,
            executors,
            logger: logger.unwrap_or_else(|| Box::new(NullPositionLogger)),
            motion,
            interlocks,
            intent: Arc::new(RunIntent::new()),
            progress: Arc::new(Progress::new()),
        })
    }
}

fn invalid(msg: impl Into<String>) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg.into()))
}

fn validate_general(general: &GeneralSettings, step_count: usize) -> Result<()> {
    if !(general.slice_thickness_um > 0.0) || !general.slice_thickness_um.is_finite() {
        return Err(invalid("slice_thickness_um must be > 0"));
    }
    if general.max_slice_number == 0 {
        return Err(invalid("max_slice_number must be >= 1"));
    }
    let tol = general.stage_tolerance;
    if !(tol.translational_um > 0.0) || !tol.translational_um.is_finite() {
        return Err(invalid("stage translational tolerance must be > 0"));
    }
    if !(tol.angular_deg > 0.0) || !tol.angular_deg.is_finite() {
        return Err(invalid("stage angular tolerance must be > 0"));
    }
    if general.step_count as usize != step_count {
        return Err(invalid(format!(
            "step_count is {} but {} steps were supplied",
            general.step_count, step_count
        )));
    }
    Ok(())
}

fn validate_steps(steps: &[Step]) -> Result<()> {
    let mut names = HashSet::new();
    for (i, step) in steps.iter().enumerate() {
        let expected = i as u32 + 1;
        if step.number != expected {
            return Err(invalid(format!(
                "step '{}' has number {}, expected {} (numbers are 1-indexed, dense, ascending)",
                step.name, step.number, expected
            )));
        }
        if step.name.is_empty() {
            return Err(invalid(format!("step {} has an empty name", step.number)));
        }
        if !names.insert(step.name.as_str()) {
            return Err(invalid(format!("duplicate step name '{}'", step.name)));
        }
        if step.frequency == 0 {
            return Err(invalid(format!(
                "step '{}' has frequency 0, must be >= 1",
                step.name
            )));
        }
        if step.step_type != step.operation.step_type() {
            return Err(invalid(format!(
                "step '{}' is declared as {} but carries {} settings",
                step.name,
                step.step_type,
                step.operation.step_type()
            )));
        }
    }

    // Third-party mapping integrations support a single configured map per
    // experiment; EDS can still ride along on an EBSD step.
    let has_ebsd = steps.iter().any(|s| s.step_type == StepType::Ebsd);
    let has_eds = steps.iter().any(|s| s.step_type == StepType::Eds);
    if has_ebsd && has_eds {
        return Err(invalid(
            "an experiment may contain EBSD steps or EDS steps, not both",
        ));
    }
    Ok(())
}

//! Opaque-operation dispatch: one executor per step type, resolved once when
//! the experiment is built.

use std::collections::HashMap;

use crate::error::BuildError;
use crate::types::{GeneralSettings, Step, StepType};

/// Boundary error type for executors; content is unknown to the engine.
pub type OperationError = Box<dyn std::error::Error + Send + Sync>;

/// Performs the concrete content of one step type (imaging, milling, lasing,
/// mapping, scripting). The engine never inspects `step.operation` itself.
pub trait OperationExecutor: Send {
    fn execute(
        &mut self,
        step: &Step,
        general: &GeneralSettings,
        slice_number: u32,
    ) -> Result<(), OperationError>;
}

/// Strategy table mapping step type to executor.
#[derive(Default)]
pub struct ExecutorSet {
    map: HashMap<StepType, Box<dyn OperationExecutor>>,
}

impl ExecutorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the executor for one step type.
    pub fn register(&mut self, step_type: StepType, executor: Box<dyn OperationExecutor>) {
        self.map.insert(step_type, executor);
    }

    pub fn get_mut(&mut self, step_type: StepType) -> Option<&mut Box<dyn OperationExecutor>> {
        self.map.get_mut(&step_type)
    }

    /// Verify that every step type appearing in `steps` has an executor.
    pub fn covers(&self, steps: &[Step]) -> Result<(), BuildError> {
        for step in steps {
            if !self.map.contains_key(&step.step_type) {
                return Err(BuildError::MissingExecutor(step.step_type.label()));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ExecutorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&'static str> = self.map.keys().map(|k| k.label()).collect();
        kinds.sort_unstable();
        f.debug_struct("ExecutorSet").field("kinds", &kinds).finish()
    }
}

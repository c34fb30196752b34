//! Test and helper mocks for sectioner_core

use crate::executor::{OperationExecutor, OperationError};
use crate::types::{GeneralSettings, Step};

/// An executor that performs nothing; useful when driving the scheduler
/// through its motion and interlock choreography alone.
pub struct NoopExecutor;

impl OperationExecutor for NoopExecutor {
    fn execute(
        &mut self,
        _step: &Step,
        _general: &GeneralSettings,
        _slice_number: u32,
    ) -> Result<(), OperationError> {
        Ok(())
    }
}

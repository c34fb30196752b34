//! Operation executors wired by the CLI.
//!
//! Everything except custom steps runs against the simulated backend and only
//! reports what it would do; custom steps really invoke the configured script.

use std::process::Command;

use sectioner_core::executor::{OperationError, OperationExecutor};
use sectioner_core::{GeneralSettings, OperationSettings, Step, StepType};

/// Logs the operation it stands in for and succeeds.
pub struct SimulatedOperation {
    kind: StepType,
}

impl SimulatedOperation {
    pub fn new(kind: StepType) -> Self {
        Self { kind }
    }

    pub fn boxed(kind: StepType) -> Box<dyn OperationExecutor> {
        Box::new(Self::new(kind))
    }
}

impl OperationExecutor for SimulatedOperation {
    fn execute(
        &mut self,
        step: &Step,
        _general: &GeneralSettings,
        slice_number: u32,
    ) -> Result<(), OperationError> {
        tracing::info!(
            step = %step.name,
            kind = %self.kind,
            slice = slice_number,
            "simulated operation"
        );
        Ok(())
    }
}

/// Runs the step's configured script through its configured interpreter.
pub struct CustomScriptExecutor;

impl OperationExecutor for CustomScriptExecutor {
    fn execute(
        &mut self,
        step: &Step,
        _general: &GeneralSettings,
        slice_number: u32,
    ) -> Result<(), OperationError> {
        let OperationSettings::Custom(settings) = &step.operation else {
            return Err(format!("step '{}' carries no custom settings", step.name).into());
        };
        tracing::info!(
            executable = %settings.executable.display(),
            script = %settings.script.display(),
            slice = slice_number,
            "running custom script"
        );
        let output = Command::new(&settings.executable)
            .arg(&settings.script)
            .env("SECTIONER_SLICE_NUMBER", slice_number.to_string())
            .env("SECTIONER_STEP_NAME", &step.name)
            .output()
            .map_err(|e| format!("cannot launch {}: {e}", settings.executable.display()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            tracing::info!(output = %stdout.trim(), "custom script output");
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "script {} exited with {}: {}",
                settings.script.display(),
                output.status,
                stderr.trim()
            )
            .into());
        }
        Ok(())
    }
}

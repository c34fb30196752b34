//! Append-only position logging around each executed step.

use std::io::Write;
use std::path::PathBuf;

use crate::types::StagePositionUser;

/// Boundary error type for log sinks.
pub type LogError = Box<dyn std::error::Error + Send + Sync>;

/// Which side of the step a position record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionTag {
    Before,
    After,
}

impl PositionTag {
    pub fn label(self) -> &'static str {
        match self {
            PositionTag::Before => "before",
            PositionTag::After => "after",
        }
    }
}

/// Append-only sink for stage positions, keyed by `(step, tag)`.
pub trait PositionLogger: Send {
    fn record_position(
        &mut self,
        step_number: u32,
        step_name: &str,
        slice_number: u32,
        tag: PositionTag,
        position: &StagePositionUser,
    ) -> Result<(), LogError>;
}

/// Discards every record; the default sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPositionLogger;

impl PositionLogger for NullPositionLogger {
    fn record_position(
        &mut self,
        _step_number: u32,
        _step_name: &str,
        _slice_number: u32,
        _tag: PositionTag,
        _position: &StagePositionUser,
    ) -> Result<(), LogError> {
        Ok(())
    }
}

/// Plain-text position log: one tab-separated line per record, keyed
/// `NN_name/tag`, positions rounded to 6 decimals.
#[derive(Debug, Clone)]
pub struct FilePositionLogger {
    path: PathBuf,
}

impl FilePositionLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PositionLogger for FilePositionLogger {
    fn record_position(
        &mut self,
        step_number: u32,
        step_name: &str,
        slice_number: u32,
        tag: PositionTag,
        position: &StagePositionUser,
    ) -> Result<(), LogError> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(
            file,
            "{key}\t{slice}\t{x:.6}\t{y:.6}\t{z:.6}\t{t:.6}\t{r:.6}",
            key = format_args!("{step_number:02}_{step_name}/{}", tag.label()),
            slice = slice_number,
            x = position.x_mm,
            y = position.y_mm,
            z = position.z_mm,
            t = position.t_deg,
            r = position.r_deg,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_logger_appends_keyed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.log");
        let mut logger = FilePositionLogger::new(&path);
        let pos = StagePositionUser::raw(1.0, 2.0, 3.0, 90.0, 30.0);
        logger
            .record_position(2, "sem", 5, PositionTag::Before, &pos)
            .unwrap();
        logger
            .record_position(2, "sem", 5, PositionTag::After, &pos)
            .unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("02_sem/before\t5\t"));
        assert!(lines[1].starts_with("02_sem/after\t5\t"));
    }
}

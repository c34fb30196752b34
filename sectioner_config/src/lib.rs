#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Experiment-file schema for the sectioning engine.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated
//!   structurally here (positive quantities, non-empty identifiers).
//! - Cross-step invariants (dense numbering, unique names, executor
//!   coverage) are enforced by the engine's builder.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Whole experiment file: one `[general]` table and an ordered `[[steps]]`
/// array.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub general: GeneralCfg,
    #[serde(default)]
    pub steps: Vec<StepCfg>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralCfg {
    /// Material removed per slice, in microns.
    pub slice_thickness_um: f64,
    /// Last slice of the run (inclusive).
    pub max_slice_number: u32,
    /// Also accepts alias "translational_tol_um".
    #[serde(
        default = "default_translational_tol_um",
        alias = "translational_tol_um"
    )]
    pub stage_translational_tol_um: f64,
    #[serde(default = "default_angular_tol_deg", alias = "angular_tol_deg")]
    pub stage_angular_tol_deg: f64,
}

fn default_translational_tol_um() -> f64 {
    0.5
}

fn default_angular_tol_deg() -> f64 {
    0.02
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RotationSideCfg {
    LaserMill,
    IonMill,
    BeamNormal,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SectioningAxisCfg {
    X,
    Y,
    Z,
}

/// Per-step stage geometry. Positions are user units: mm and degrees.
#[derive(Debug, Deserialize)]
pub struct StageCfg {
    pub x_mm: f64,
    pub y_mm: f64,
    pub z_mm: f64,
    pub r_deg: f64,
    pub t_deg: f64,
    #[serde(default)]
    pub pretilt_deg: f64,
    #[serde(default = "default_sectioning_axis")]
    pub sectioning_axis: SectioningAxisCfg,
    #[serde(default = "default_rotation_side")]
    pub rotation_side: RotationSideCfg,
}

fn default_sectioning_axis() -> SectioningAxisCfg {
    SectioningAxisCfg::Z
}

fn default_rotation_side() -> RotationSideCfg {
    RotationSideCfg::BeamNormal
}

#[derive(Debug, Deserialize)]
pub struct StepCfg {
    pub name: String,
    /// 1-indexed position in the sequence.
    pub number: u32,
    /// Run every N slices, starting on slice 1.
    #[serde(default = "default_frequency")]
    pub frequency: u32,
    pub stage: StageCfg,
    pub operation: OperationCfg,
}

fn default_frequency() -> u32 {
    1
}

/// Operation payload, discriminated by `type = "..."` inside the
/// `[steps.operation]` table.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OperationCfg {
    Image(ImageCfg),
    Mill(MillCfg),
    Laser(LaserCfg),
    Ebsd(EbsdCfg),
    Eds(EdsCfg),
    Custom(CustomCfg),
}

#[derive(Debug, Deserialize)]
pub struct ImageCfg {
    #[serde(default = "default_detector")]
    pub detector: String,
    pub dwell_us: f64,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_bit_depth")]
    pub bit_depth: u8,
}

fn default_detector() -> String {
    "ETD".to_string()
}

fn default_width() -> u32 {
    1024
}

fn default_height() -> u32 {
    884
}

fn default_bit_depth() -> u8 {
    8
}

#[derive(Debug, Deserialize)]
pub struct MillCfg {
    pub image: ImageCfg,
    pub application: String,
    pub depth_um: f64,
}

#[derive(Debug, Deserialize)]
pub struct LaserCfg {
    pub pulse_energy_uj: f64,
    #[serde(default = "default_pulse_divider")]
    pub pulse_divider: u32,
    #[serde(default = "default_passes")]
    pub passes: u32,
}

fn default_pulse_divider() -> u32 {
    1
}

fn default_passes() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct EbsdCfg {
    pub image: ImageCfg,
    #[serde(default)]
    pub with_eds: bool,
}

#[derive(Debug, Deserialize)]
pub struct EdsCfg {
    pub image: ImageCfg,
}

#[derive(Debug, Deserialize)]
pub struct CustomCfg {
    pub executable: PathBuf,
    pub script: PathBuf,
}

impl Config {
    /// Parse and structurally validate a TOML experiment file.
    pub fn from_toml_str(text: &str) -> eyre::Result<Self> {
        let cfg: Config = toml::from_str(text).map_err(|e| eyre::eyre!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> eyre::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("cannot read {}: {e}", path.display()))?;
        Self::from_toml_str(&text)
    }

    /// Structural checks only; sequence-level invariants live in the engine.
    pub fn validate(&self) -> eyre::Result<()> {
        let g = &self.general;
        eyre::ensure!(
            g.slice_thickness_um.is_finite() && g.slice_thickness_um > 0.0,
            "general.slice_thickness_um must be > 0"
        );
        eyre::ensure!(
            g.max_slice_number >= 1,
            "general.max_slice_number must be >= 1"
        );
        eyre::ensure!(
            g.stage_translational_tol_um.is_finite() && g.stage_translational_tol_um > 0.0,
            "general.stage_translational_tol_um must be > 0"
        );
        eyre::ensure!(
            g.stage_angular_tol_deg.is_finite() && g.stage_angular_tol_deg > 0.0,
            "general.stage_angular_tol_deg must be > 0"
        );
        eyre::ensure!(!self.steps.is_empty(), "at least one step is required");
        for step in &self.steps {
            eyre::ensure!(!step.name.is_empty(), "step {} has no name", step.number);
            eyre::ensure!(
                step.frequency >= 1,
                "step '{}': frequency must be >= 1",
                step.name
            );
            let stage = &step.stage;
            for (label, v) in [
                ("x_mm", stage.x_mm),
                ("y_mm", stage.y_mm),
                ("z_mm", stage.z_mm),
                ("r_deg", stage.r_deg),
                ("t_deg", stage.t_deg),
                ("pretilt_deg", stage.pretilt_deg),
            ] {
                eyre::ensure!(
                    v.is_finite(),
                    "step '{}': stage.{label} must be finite",
                    step.name
                );
            }
            step.operation.validate(&step.name)?;
        }
        Ok(())
    }
}

impl OperationCfg {
    fn validate(&self, step_name: &str) -> eyre::Result<()> {
        match self {
            OperationCfg::Image(img) => img.validate(step_name),
            OperationCfg::Mill(mill) => {
                mill.image.validate(step_name)?;
                eyre::ensure!(
                    !mill.application.is_empty(),
                    "step '{step_name}': mill application must not be empty"
                );
                eyre::ensure!(
                    mill.depth_um.is_finite() && mill.depth_um > 0.0,
                    "step '{step_name}': mill depth_um must be > 0"
                );
                Ok(())
            }
            OperationCfg::Laser(laser) => {
                eyre::ensure!(
                    laser.pulse_energy_uj.is_finite() && laser.pulse_energy_uj > 0.0,
                    "step '{step_name}': pulse_energy_uj must be > 0"
                );
                eyre::ensure!(
                    laser.pulse_divider >= 1,
                    "step '{step_name}': pulse_divider must be >= 1"
                );
                eyre::ensure!(
                    laser.passes >= 1,
                    "step '{step_name}': passes must be >= 1"
                );
                Ok(())
            }
            OperationCfg::Ebsd(ebsd) => ebsd.image.validate(step_name),
            OperationCfg::Eds(eds) => eds.image.validate(step_name),
            OperationCfg::Custom(custom) => {
                eyre::ensure!(
                    !custom.executable.as_os_str().is_empty(),
                    "step '{step_name}': custom executable must not be empty"
                );
                eyre::ensure!(
                    !custom.script.as_os_str().is_empty(),
                    "step '{step_name}': custom script must not be empty"
                );
                Ok(())
            }
        }
    }
}

impl ImageCfg {
    fn validate(&self, step_name: &str) -> eyre::Result<()> {
        eyre::ensure!(
            self.dwell_us.is_finite() && self.dwell_us > 0.0,
            "step '{step_name}': dwell_us must be > 0"
        );
        eyre::ensure!(
            (12..=65535).contains(&self.width) && (12..=65535).contains(&self.height),
            "step '{step_name}': resolution must be within 12..=65535 per axis"
        );
        eyre::ensure!(
            self.bit_depth == 8 || self.bit_depth == 16,
            "step '{step_name}': bit_depth must be 8 or 16"
        );
        Ok(())
    }
}

//! Value types of the experiment data model.
//!
//! Everything here is constructed once during pre-flight validation (the
//! builder or the config loader) and consumed read-only by the engine.

use sectioner_traits::Limit;
use std::path::PathBuf;

/// Stage coordinate frame. Engine moves always run in `Raw` for accuracy and
/// constancy of positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageCoordinateSystem {
    #[default]
    Raw,
    Specimen,
}

/// Stage position in user units: mm for X/Y/Z, degrees for R/T.
///
/// Canonical R lies in the right-open interval `[-180, 180)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StagePositionUser {
    pub x_mm: f64,
    pub y_mm: f64,
    pub z_mm: f64,
    pub r_deg: f64,
    pub t_deg: f64,
    pub coordinate_system: StageCoordinateSystem,
}

impl StagePositionUser {
    /// Raw-frame position from the five axis values.
    pub fn raw(x_mm: f64, y_mm: f64, z_mm: f64, r_deg: f64, t_deg: f64) -> Self {
        Self {
            x_mm,
            y_mm,
            z_mm,
            r_deg,
            t_deg,
            coordinate_system: StageCoordinateSystem::Raw,
        }
    }

    /// Same position with a replaced rotation value.
    pub fn with_r_deg(mut self, r_deg: f64) -> Self {
        self.r_deg = r_deg;
        self
    }
}

impl std::fmt::Display for StagePositionUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "x={:.4} mm, y={:.4} mm, z={:.4} mm, r={:.3} deg, t={:.3} deg",
            self.x_mm, self.y_mm, self.z_mm, self.r_deg, self.t_deg
        )
    }
}

/// Allowed deviation between a commanded and a reported axis position.
/// Both fields are strictly positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageTolerance {
    pub translational_um: f64,
    pub angular_deg: f64,
}

impl Default for StageTolerance {
    fn default() -> Self {
        Self {
            translational_um: 0.5,
            angular_deg: 0.02,
        }
    }
}

/// Travel-limit envelope in user units. X/Y/Z/T are queried from the driver;
/// R is fixed at `[-180, 180)` and checked right-open.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageLimits {
    pub x_mm: Limit,
    pub y_mm: Limit,
    pub z_mm: Limit,
    pub r_deg: Limit,
    pub t_deg: Limit,
}

/// Which machining tool the pretilt compensation is biased toward. Determines
/// the sign of the lateral Y correction during Z sectioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationSide {
    /// Specimen rotated toward the laser mill: Y walks in the negative direction.
    LaserMill,
    /// Specimen rotated toward the ion mill: Y walks in the positive direction.
    IonMill,
    /// Beam-normal work: no lateral correction.
    BeamNormal,
}

/// Sectioning direction. Only Z sectioning is currently supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectioningAxis {
    X,
    Y,
    Z,
}

/// Per-step stage geometry: where slice 1 sits and how subsequent slices
/// advance from it.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSettings {
    pub initial_position: StagePositionUser,
    pub pretilt_angle_deg: f64,
    pub sectioning_axis: SectioningAxis,
    pub rotation_side: RotationSide,
}

/// Step kind, one per registered operation executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepType {
    Image,
    Mill,
    Laser,
    Ebsd,
    Eds,
    Custom,
}

impl StepType {
    pub fn label(self) -> &'static str {
        match self {
            StepType::Image => "image",
            StepType::Mill => "mill",
            StepType::Laser => "laser",
            StepType::Ebsd => "ebsd",
            StepType::Eds => "eds",
            StepType::Custom => "custom",
        }
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Electron-image acquisition parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSettings {
    pub detector: String,
    pub dwell_us: f64,
    pub resolution: (u32, u32),
    pub bit_depth: u8,
}

/// Ion-mill parameters; a reference image is acquired before patterning.
#[derive(Debug, Clone, PartialEq)]
pub struct MillSettings {
    pub image: ImageSettings,
    pub application: String,
    pub depth_um: f64,
}

/// Laser machining parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct LaserSettings {
    pub pulse_energy_uj: f64,
    pub pulse_divider: u32,
    pub passes: u32,
}

/// EBSD mapping parameters; optionally collects EDS in the same pass.
#[derive(Debug, Clone, PartialEq)]
pub struct EbsdSettings {
    pub image: ImageSettings,
    pub with_eds: bool,
}

/// EDS mapping parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct EdsSettings {
    pub image: ImageSettings,
}

/// External script invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomSettings {
    pub executable: PathBuf,
    pub script: PathBuf,
}

/// Typed payload for one step. Opaque to the scheduler; only the matching
/// executor interprets it.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationSettings {
    Image(ImageSettings),
    Mill(MillSettings),
    Laser(LaserSettings),
    Ebsd(EbsdSettings),
    Eds(EdsSettings),
    Custom(CustomSettings),
}

impl OperationSettings {
    pub fn step_type(&self) -> StepType {
        match self {
            OperationSettings::Image(_) => StepType::Image,
            OperationSettings::Mill(_) => StepType::Mill,
            OperationSettings::Laser(_) => StepType::Laser,
            OperationSettings::Ebsd(_) => StepType::Ebsd,
            OperationSettings::Eds(_) => StepType::Eds,
            OperationSettings::Custom(_) => StepType::Custom,
        }
    }
}

/// One configured operation, executed once per qualifying slice.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub step_type: StepType,
    /// Unique within the experiment.
    pub name: String,
    /// 1-indexed, dense, ascending.
    pub number: u32,
    /// Runs on slices where `(slice - 1) % frequency == 0`.
    pub frequency: u32,
    pub stage: StageSettings,
    pub operation: OperationSettings,
}

/// Experiment-wide settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneralSettings {
    pub slice_thickness_um: f64,
    pub max_slice_number: u32,
    pub stage_tolerance: StageTolerance,
    pub step_count: u32,
}

/// The first not-yet-completed step of a run; where a resumed run restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePoint {
    pub slice_number: u32,
    pub step_number: u32,
}

impl ResumePoint {
    pub fn new(slice_number: u32, step_number: u32) -> Self {
        Self {
            slice_number,
            step_number,
        }
    }

    /// Beginning of a fresh run.
    pub fn start() -> Self {
        Self::new(1, 1)
    }
}

impl Default for ResumePoint {
    fn default() -> Self {
        Self::start()
    }
}

impl std::fmt::Display for ResumePoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "slice {}, step {}", self.slice_number, self.step_number)
    }
}

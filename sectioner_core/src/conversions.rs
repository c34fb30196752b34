//! `From` implementations bridging `sectioner_config` schema types to
//! `sectioner_core` types.
//!
//! These keep the raw-file-to-engine mapping in one place instead of scattered
//! through the CLI.

use crate::types::{
    CustomSettings, EbsdSettings, EdsSettings, GeneralSettings, ImageSettings, LaserSettings,
    MillSettings, OperationSettings, RotationSide, SectioningAxis, StagePositionUser,
    StageSettings, StageTolerance, Step,
};

// ── RotationSide / SectioningAxis ────────────────────────────────────────────

impl From<sectioner_config::RotationSideCfg> for RotationSide {
    fn from(c: sectioner_config::RotationSideCfg) -> Self {
        match c {
            sectioner_config::RotationSideCfg::LaserMill => RotationSide::LaserMill,
            sectioner_config::RotationSideCfg::IonMill => RotationSide::IonMill,
            sectioner_config::RotationSideCfg::BeamNormal => RotationSide::BeamNormal,
        }
    }
}

impl From<sectioner_config::SectioningAxisCfg> for SectioningAxis {
    fn from(c: sectioner_config::SectioningAxisCfg) -> Self {
        match c {
            sectioner_config::SectioningAxisCfg::X => SectioningAxis::X,
            sectioner_config::SectioningAxisCfg::Y => SectioningAxis::Y,
            sectioner_config::SectioningAxisCfg::Z => SectioningAxis::Z,
        }
    }
}

// ── StageSettings ────────────────────────────────────────────────────────────

impl From<&sectioner_config::StageCfg> for StageSettings {
    fn from(c: &sectioner_config::StageCfg) -> Self {
        Self {
            initial_position: StagePositionUser::raw(c.x_mm, c.y_mm, c.z_mm, c.r_deg, c.t_deg),
            pretilt_angle_deg: c.pretilt_deg,
            sectioning_axis: c.sectioning_axis.into(),
            rotation_side: c.rotation_side.into(),
        }
    }
}

// ── Operation payloads ───────────────────────────────────────────────────────

impl From<&sectioner_config::ImageCfg> for ImageSettings {
    fn from(c: &sectioner_config::ImageCfg) -> Self {
        Self {
            detector: c.detector.clone(),
            dwell_us: c.dwell_us,
            resolution: (c.width, c.height),
            bit_depth: c.bit_depth,
        }
    }
}

impl From<&sectioner_config::OperationCfg> for OperationSettings {
    fn from(c: &sectioner_config::OperationCfg) -> Self {
        match c {
            sectioner_config::OperationCfg::Image(img) => OperationSettings::Image(img.into()),
            sectioner_config::OperationCfg::Mill(mill) => OperationSettings::Mill(MillSettings {
                image: (&mill.image).into(),
                application: mill.application.clone(),
                depth_um: mill.depth_um,
            }),
            sectioner_config::OperationCfg::Laser(laser) => {
                OperationSettings::Laser(LaserSettings {
                    pulse_energy_uj: laser.pulse_energy_uj,
                    pulse_divider: laser.pulse_divider,
                    passes: laser.passes,
                })
            }
            sectioner_config::OperationCfg::Ebsd(ebsd) => OperationSettings::Ebsd(EbsdSettings {
                image: (&ebsd.image).into(),
                with_eds: ebsd.with_eds,
            }),
            sectioner_config::OperationCfg::Eds(eds) => OperationSettings::Eds(EdsSettings {
                image: (&eds.image).into(),
            }),
            sectioner_config::OperationCfg::Custom(custom) => {
                OperationSettings::Custom(CustomSettings {
                    executable: custom.executable.clone(),
                    script: custom.script.clone(),
                })
            }
        }
    }
}

// ── Step ─────────────────────────────────────────────────────────────────────

impl From<&sectioner_config::StepCfg> for Step {
    fn from(c: &sectioner_config::StepCfg) -> Self {
        let operation: OperationSettings = (&c.operation).into();
        Self {
            step_type: operation.step_type(),
            name: c.name.clone(),
            number: c.number,
            frequency: c.frequency,
            stage: (&c.stage).into(),
            operation,
        }
    }
}

// ── GeneralSettings ──────────────────────────────────────────────────────────

impl From<&sectioner_config::Config> for GeneralSettings {
    fn from(c: &sectioner_config::Config) -> Self {
        Self {
            slice_thickness_um: c.general.slice_thickness_um,
            max_slice_number: c.general.max_slice_number,
            stage_tolerance: StageTolerance {
                translational_um: c.general.stage_translational_tol_um,
                angular_deg: c.general.stage_angular_tol_deg,
            },
            step_count: c.steps.len() as u32,
        }
    }
}

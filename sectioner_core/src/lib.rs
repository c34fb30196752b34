#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Serial-sectioning experiment engine (hardware-agnostic).
//!
//! This crate sequences heterogeneous acquisition and milling steps across
//! material slices, unattended, against any instrument implementing
//! `sectioner_traits::MicroscopeDriver`. The opaque content of each step is
//! delegated to an [`OperationExecutor`]; the engine decides *when*, *whether*,
//! and *under which safety conditions* a step runs.
//!
//! ## Architecture
//!
//! - **Units**: user (mm/deg) vs. encoder (m/rad) position conversions (`units`)
//! - **Motion**: tolerance-checked, retry-bounded stage moves (`stage`)
//! - **Interlocks**: insertable-device state machine + collision matrix (`devices`)
//! - **Cancellation**: three-level stop intent shared between worker and
//!   controller (`intent`, `worker`)
//! - **Scheduling**: the slice/step loop with resumability (`scheduler`)

pub mod builder;
pub mod conversions;
pub mod devices;
pub mod error;
pub mod executor;
pub mod intent;
pub mod logging;
pub mod mocks;
pub mod scheduler;
pub mod stage;
pub mod status;
pub mod types;
pub mod units;
pub mod worker;

pub use builder::ExperimentBuilder;
pub use devices::{CollisionRule, InterlockCfg, InterlockManager};
pub use error::{BuildError, Fault, Result, StopKind};
pub use executor::{ExecutorSet, OperationExecutor};
pub use intent::{Progress, RunIntent};
pub use logging::{FilePositionLogger, NullPositionLogger, PositionLogger, PositionTag};
pub use scheduler::Experiment;
pub use stage::{MotionCfg, MotionController, target_position};
pub use status::ExperimentStatus;
pub use types::{
    GeneralSettings, OperationSettings, ResumePoint, RotationSide, SectioningAxis,
    StageCoordinateSystem, StageLimits, StagePositionUser, StageSettings, StageTolerance, Step,
    StepType,
};
pub use worker::ExperimentHandle;

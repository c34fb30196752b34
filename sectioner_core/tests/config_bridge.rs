//! End-to-end: parse an experiment file, convert it, and run it against the
//! simulated instrument.

use std::time::Duration;

use rstest::rstest;
use sectioner_core::devices::InterlockCfg;
use sectioner_core::mocks::NoopExecutor;
use sectioner_core::stage::MotionCfg;
use sectioner_core::{
    Experiment, GeneralSettings, OperationSettings, ResumePoint, RotationSide, Step, StepType,
};
use sectioner_hardware::SimulatedMicroscope;
use sectioner_traits::clock::TestClock;

const EXPERIMENT_TOML: &str = r#"
[general]
slice_thickness_um = 2.0
max_slice_number = 3
stage_translational_tol_um = 0.5
stage_angular_tol_deg = 0.02

[[steps]]
name = "laser-mill"
number = 1

[steps.stage]
x_mm = 1.0
y_mm = 2.0
z_mm = 5.0
r_deg = 50.0
t_deg = 10.0
pretilt_deg = 36.0
rotation_side = "laser_mill"

[steps.operation]
type = "laser"
pulse_energy_uj = 40.0
pulse_divider = 2

[[steps]]
name = "sem"
number = 2
frequency = 2

[steps.stage]
x_mm = 1.0
y_mm = 2.0
z_mm = 5.0
r_deg = -130.0
t_deg = 0.0

[steps.operation]
type = "image"
dwell_us = 1.0
"#;

#[rstest]
fn parsed_file_maps_onto_engine_types() {
    let cfg = sectioner_config::Config::from_toml_str(EXPERIMENT_TOML).unwrap();
    let general: GeneralSettings = (&cfg).into();
    assert_eq!(general.max_slice_number, 3);
    assert_eq!(general.step_count, 2);
    assert!((general.slice_thickness_um - 2.0).abs() < 1e-12);
    assert!((general.stage_tolerance.angular_deg - 0.02).abs() < 1e-12);

    let steps: Vec<Step> = cfg.steps.iter().map(Step::from).collect();
    assert_eq!(steps[0].step_type, StepType::Laser);
    assert_eq!(steps[0].stage.rotation_side, RotationSide::LaserMill);
    assert!((steps[0].stage.pretilt_angle_deg - 36.0).abs() < 1e-12);
    assert_eq!(steps[0].frequency, 1, "frequency defaults to every slice");
    match &steps[0].operation {
        OperationSettings::Laser(laser) => {
            assert_eq!(laser.pulse_divider, 2);
            assert_eq!(laser.passes, 1);
        }
        other => panic!("expected laser settings, got {other:?}"),
    }

    assert_eq!(steps[1].step_type, StepType::Image);
    assert_eq!(steps[1].frequency, 2);
    match &steps[1].operation {
        OperationSettings::Image(img) => {
            assert_eq!(img.detector, "ETD", "detector defaults to ETD");
            assert_eq!(img.resolution, (1024, 884));
        }
        other => panic!("expected image settings, got {other:?}"),
    }
}

#[rstest]
fn parsed_file_runs_to_completion() {
    let cfg = sectioner_config::Config::from_toml_str(EXPERIMENT_TOML).unwrap();
    let general: GeneralSettings = (&cfg).into();
    let steps: Vec<Step> = cfg.steps.iter().map(Step::from).collect();

    let mut exp = Experiment::builder()
        .with_driver(SimulatedMicroscope::new())
        .with_general(general)
        .with_steps(steps)
        .with_executor(StepType::Laser, Box::new(NoopExecutor))
        .with_executor(StepType::Image, Box::new(NoopExecutor))
        .with_motion_cfg(MotionCfg {
            settle_delay: Duration::from_millis(1),
            ..MotionCfg::default()
        })
        .with_interlock_cfg(InterlockCfg {
            poll_attempts: 3,
            poll_interval: Duration::from_millis(1),
        })
        .with_clock(Box::new(TestClock::new()))
        .try_build()
        .unwrap();
    let outcome = exp.run(ResumePoint::start());
    assert!(outcome.is_completed(), "got {outcome}");
}

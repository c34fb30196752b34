//! Pre-flight validation failures surfaced by the experiment builder.

use rstest::rstest;
use sectioner_core::error::BuildError;
use sectioner_core::mocks::NoopExecutor;
use sectioner_core::types::{EbsdSettings, EdsSettings, ImageSettings};
use sectioner_core::{
    Experiment, ExperimentBuilder, GeneralSettings, OperationSettings, RotationSide,
    SectioningAxis, StagePositionUser, StageSettings, StageTolerance, Step, StepType,
};
use sectioner_hardware::SimulatedMicroscope;

fn image_settings() -> OperationSettings {
    OperationSettings::Image(ImageSettings {
        detector: "ETD".into(),
        dwell_us: 1.0,
        resolution: (1024, 884),
        bit_depth: 8,
    })
}

fn step(number: u32, name: &str, operation: OperationSettings) -> Step {
    Step {
        step_type: operation.step_type(),
        name: name.into(),
        number,
        frequency: 1,
        stage: StageSettings {
            initial_position: StagePositionUser::raw(0.0, 0.0, 1.0, 0.0, 0.0),
            pretilt_angle_deg: 0.0,
            sectioning_axis: SectioningAxis::Z,
            rotation_side: RotationSide::BeamNormal,
        },
        operation,
    }
}

fn general(step_count: u32) -> GeneralSettings {
    GeneralSettings {
        slice_thickness_um: 2.0,
        max_slice_number: 5,
        stage_tolerance: StageTolerance::default(),
        step_count,
    }
}

fn base(steps: Vec<Step>) -> ExperimentBuilder<SimulatedMicroscope> {
    let count = steps.len() as u32;
    Experiment::builder()
        .with_driver(SimulatedMicroscope::new())
        .with_general(general(count))
        .with_steps(steps)
        .with_executor(StepType::Image, Box::new(NoopExecutor))
}

fn build_error(err: &eyre::Report) -> BuildError {
    err.downcast_ref::<BuildError>()
        .cloned()
        .unwrap_or_else(|| panic!("expected a BuildError, got: {err}"))
}

#[rstest]
fn missing_driver_is_reported() {
    let err = Experiment::<SimulatedMicroscope>::builder()
        .with_general(general(1))
        .with_steps(vec![step(1, "sem", image_settings())])
        .with_executor(StepType::Image, Box::new(NoopExecutor))
        .try_build()
        .unwrap_err();
    assert!(matches!(build_error(&err), BuildError::MissingDriver));
}

#[rstest]
fn empty_step_sequence_is_reported() {
    let err = Experiment::builder()
        .with_driver(SimulatedMicroscope::new())
        .with_general(general(0))
        .try_build()
        .unwrap_err();
    assert!(matches!(build_error(&err), BuildError::MissingSteps));
}

#[rstest]
fn sparse_step_numbering_is_rejected() {
    let steps = vec![step(1, "a", image_settings()), step(3, "b", image_settings())];
    let err = base(steps).try_build().unwrap_err();
    match build_error(&err) {
        BuildError::InvalidConfig(msg) => assert!(msg.contains("expected 2")),
        other => panic!("expected InvalidConfig, got {other:?}"),
    }
}

#[rstest]
fn duplicate_step_names_are_rejected() {
    let steps = vec![step(1, "sem", image_settings()), step(2, "sem", image_settings())];
    let err = base(steps).try_build().unwrap_err();
    match build_error(&err) {
        BuildError::InvalidConfig(msg) => assert!(msg.contains("duplicate")),
        other => panic!("expected InvalidConfig, got {other:?}"),
    }
}

#[rstest]
fn zero_frequency_is_rejected() {
    let mut bad = step(1, "sem", image_settings());
    bad.frequency = 0;
    let err = base(vec![bad]).try_build().unwrap_err();
    assert!(matches!(build_error(&err), BuildError::InvalidConfig(_)));
}

#[rstest]
fn missing_executor_for_a_used_step_type_is_rejected() {
    let laser = OperationSettings::Laser(sectioner_core::types::LaserSettings {
        pulse_energy_uj: 10.0,
        pulse_divider: 1,
        passes: 1,
    });
    let steps = vec![step(1, "cut", laser)];
    let count = steps.len() as u32;
    let err = Experiment::builder()
        .with_driver(SimulatedMicroscope::new())
        .with_general(general(count))
        .with_steps(steps)
        .with_executor(StepType::Image, Box::new(NoopExecutor))
        .try_build()
        .unwrap_err();
    assert!(matches!(
        build_error(&err),
        BuildError::MissingExecutor("laser")
    ));
}

#[rstest]
fn mixed_mapping_modalities_are_rejected() {
    let ebsd = OperationSettings::Ebsd(EbsdSettings {
        image: ImageSettings {
            detector: "ETD".into(),
            dwell_us: 1.0,
            resolution: (1024, 884),
            bit_depth: 8,
        },
        with_eds: false,
    });
    let eds = OperationSettings::Eds(EdsSettings {
        image: ImageSettings {
            detector: "ETD".into(),
            dwell_us: 1.0,
            resolution: (1024, 884),
            bit_depth: 8,
        },
    });
    let steps = vec![step(1, "ebsd-map", ebsd), step(2, "eds-map", eds)];
    let count = steps.len() as u32;
    let err = Experiment::builder()
        .with_driver(SimulatedMicroscope::new())
        .with_general(general(count))
        .with_steps(steps)
        .with_executor(StepType::Ebsd, Box::new(NoopExecutor))
        .with_executor(StepType::Eds, Box::new(NoopExecutor))
        .try_build()
        .unwrap_err();
    match build_error(&err) {
        BuildError::InvalidConfig(msg) => assert!(msg.contains("not both")),
        other => panic!("expected InvalidConfig, got {other:?}"),
    }
}

#[rstest]
fn declared_type_must_match_the_payload() {
    let mut bad = step(1, "sem", image_settings());
    bad.step_type = StepType::Laser;
    let count = 1;
    let err = Experiment::builder()
        .with_driver(SimulatedMicroscope::new())
        .with_general(general(count))
        .with_steps(vec![bad])
        .with_executor(StepType::Image, Box::new(NoopExecutor))
        .with_executor(StepType::Laser, Box::new(NoopExecutor))
        .try_build()
        .unwrap_err();
    assert!(matches!(build_error(&err), BuildError::InvalidConfig(_)));
}

#[rstest]
fn initial_rotation_is_normalized_at_build_time() {
    let mut s = step(1, "sem", image_settings());
    s.stage.initial_position.r_deg = 180.0;
    let exp = base(vec![s]).try_build().unwrap();
    assert!((exp.steps()[0].stage.initial_position.r_deg - (-180.0)).abs() < 1e-12);
}

#[rstest]
fn step_count_mismatch_is_rejected() {
    let steps = vec![step(1, "sem", image_settings())];
    let err = Experiment::builder()
        .with_driver(SimulatedMicroscope::new())
        .with_general(general(4))
        .with_steps(steps)
        .with_executor(StepType::Image, Box::new(NoopExecutor))
        .try_build()
        .unwrap_err();
    assert!(matches!(build_error(&err), BuildError::InvalidConfig(_)));
}

//! Scheduler behavior: frequency gating, stop intents, fault policy, and
//! stop/resume bookkeeping.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rstest::rstest;
use sectioner_core::devices::{CollisionRule, InterlockCfg};
use sectioner_core::error::{Fault, StopKind};
use sectioner_core::executor::{OperationError, OperationExecutor};
use sectioner_core::intent::RunIntent;
use sectioner_core::stage::MotionCfg;
use sectioner_core::{
    Experiment, ExperimentStatus, GeneralSettings, OperationSettings, ResumePoint,
    RotationSide, SectioningAxis, StagePositionUser, StageSettings, StageTolerance, Step,
    StepType,
};
use sectioner_core::types::ImageSettings;
use sectioner_hardware::SimulatedMicroscope;
use sectioner_traits::clock::TestClock;
use sectioner_traits::{DeviceId, DeviceState, MicroscopeDriver};

type CallLog = Arc<Mutex<Vec<(u32, u32)>>>;

/// Records `(slice, step_number)` for every dispatched operation.
struct RecordingExecutor {
    calls: CallLog,
    /// Optionally latch a stop intent while a given call executes.
    fire: Option<(u32, u32, StopKind, Arc<Mutex<Option<Arc<RunIntent>>>>)>,
}

impl RecordingExecutor {
    fn new(calls: CallLog) -> Self {
        Self { calls, fire: None }
    }
}

impl OperationExecutor for RecordingExecutor {
    fn execute(
        &mut self,
        step: &Step,
        _general: &GeneralSettings,
        slice_number: u32,
    ) -> Result<(), OperationError> {
        self.calls.lock().unwrap().push((slice_number, step.number));
        if let Some((slice, number, kind, intent)) = &self.fire
            && *slice == slice_number
            && *number == step.number
            && let Some(intent) = intent.lock().unwrap().as_ref()
        {
            intent.request(*kind);
        }
        Ok(())
    }
}

struct FailingExecutor;

impl OperationExecutor for FailingExecutor {
    fn execute(
        &mut self,
        _step: &Step,
        _general: &GeneralSettings,
        _slice_number: u32,
    ) -> Result<(), OperationError> {
        Err("detector bank offline".into())
    }
}

fn image_settings() -> OperationSettings {
    OperationSettings::Image(ImageSettings {
        detector: "ETD".into(),
        dwell_us: 1.0,
        resolution: (1024, 884),
        bit_depth: 8,
    })
}

fn step(number: u32, frequency: u32) -> Step {
    step_at(number, frequency, StagePositionUser::raw(1.0, 1.0, 1.0, 0.0, 0.0))
}

fn step_at(number: u32, frequency: u32, initial: StagePositionUser) -> Step {
    Step {
        step_type: StepType::Image,
        name: format!("step-{number}"),
        number,
        frequency,
        stage: StageSettings {
            initial_position: initial,
            pretilt_angle_deg: 0.0,
            sectioning_axis: SectioningAxis::Z,
            rotation_side: RotationSide::BeamNormal,
        },
        operation: image_settings(),
    }
}

fn experiment(
    max_slice: u32,
    steps: Vec<Step>,
    image_executor: Box<dyn OperationExecutor>,
) -> Experiment<SimulatedMicroscope> {
    let general = GeneralSettings {
        slice_thickness_um: 2.0,
        max_slice_number: max_slice,
        stage_tolerance: StageTolerance::default(),
        step_count: steps.len() as u32,
    };
    Experiment::builder()
        .with_driver(
            SimulatedMicroscope::new()
                .with_device("CBS")
                .with_device("EBSD"),
        )
        .with_general(general)
        .with_steps(steps)
        .with_collision_rule(CollisionRule::new("CBS", "EBSD"))
        .with_executor(StepType::Image, image_executor)
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
        .expect("experiment build")
}

#[rstest]
fn frequency_gates_execution_but_counters_advance() {
    let calls: CallLog = Arc::default();
    let mut exp = experiment(
        4,
        vec![step(1, 1), step(2, 2)],
        Box::new(RecordingExecutor::new(calls.clone())),
    );
    let outcome = exp.run(ResumePoint::start());
    assert!(outcome.is_completed(), "got {outcome}");
    // Step 2 runs on slices 1 and 3 only; slice 1 always runs everything.
    let expected = vec![(1, 1), (1, 2), (2, 1), (3, 1), (3, 2), (4, 1)];
    assert_eq!(*calls.lock().unwrap(), expected);
}

#[rstest]
fn stop_after_step_resumes_without_skip_or_repeat() {
    // Run the whole experiment one step at a time, pausing after every step,
    // and compare against the uninterrupted execution order.
    let expected = vec![(1, 1), (1, 2), (2, 1), (3, 1), (3, 2)];
    let calls: CallLog = Arc::default();
    let mut start = ResumePoint::start();
    let mut rounds = 0;
    loop {
        let mut exp = experiment(
            3,
            vec![step(1, 1), step(2, 2)],
            Box::new(RecordingExecutor::new(calls.clone())),
        );
        exp.intent_handle().request(StopKind::AfterStep);
        match exp.run(start) {
            ExperimentStatus::Paused(next) => start = next,
            ExperimentStatus::Completed => break,
            other => panic!("unexpected outcome: {other}"),
        }
        rounds += 1;
        assert!(rounds <= 6, "run did not make progress");
    }
    assert_eq!(*calls.lock().unwrap(), expected);
}

#[rstest]
fn stop_after_slice_finishes_the_slice_first() {
    let calls: CallLog = Arc::default();
    let mut exp = experiment(
        3,
        vec![step(1, 1), step(2, 1)],
        Box::new(RecordingExecutor::new(calls.clone())),
    );
    exp.intent_handle().request(StopKind::AfterSlice);
    match exp.run(ResumePoint::start()) {
        ExperimentStatus::Paused(next) => assert_eq!(next, ResumePoint::new(2, 1)),
        other => panic!("unexpected outcome: {other}"),
    }
    assert_eq!(*calls.lock().unwrap(), vec![(1, 1), (1, 2)]);
}

#[rstest]
fn immediate_stop_mid_step_aborts_and_halts_hardware() {
    let calls: CallLog = Arc::default();
    let intent_slot: Arc<Mutex<Option<Arc<RunIntent>>>> = Arc::default();
    let mut executor = RecordingExecutor::new(calls.clone());
    executor.fire = Some((1, 1, StopKind::Immediate, intent_slot.clone()));

    let mut exp = experiment(3, vec![step(1, 1), step(2, 1)], Box::new(executor));
    *intent_slot.lock().unwrap() = Some(exp.intent_handle());

    match exp.run(ResumePoint::start()) {
        ExperimentStatus::Aborted { fault, resume } => {
            assert!(matches!(fault, Fault::Cancelled(StopKind::Immediate)));
            // The interrupted step never completed; it resumes at itself.
            assert_eq!(resume, ResumePoint::new(1, 1));
        }
        other => panic!("unexpected outcome: {other}"),
    }
    assert_eq!(*calls.lock().unwrap(), vec![(1, 1)]);
    assert_eq!(exp.driver().emergency_stops(), 1);
}

#[rstest]
fn operation_fault_aborts_with_emergency_stop() {
    let mut exp = experiment(3, vec![step(1, 1)], Box::new(FailingExecutor));
    match exp.run(ResumePoint::start()) {
        ExperimentStatus::Aborted { fault, resume } => {
            match fault {
                Fault::Operation { step, message } => {
                    assert_eq!(step, "step-1");
                    assert!(message.contains("detector bank offline"));
                }
                other => panic!("expected Operation, got {other:?}"),
            }
            assert_eq!(resume, ResumePoint::new(1, 1));
        }
        other => panic!("unexpected outcome: {other}"),
    }
    assert_eq!(exp.driver().emergency_stops(), 1);
}

#[rstest]
fn unsafe_step_target_aborts_before_anything_runs() {
    let calls: CallLog = Arc::default();
    // 100 mm Z start is far outside the simulated envelope.
    let bad = step_at(1, 1, StagePositionUser::raw(0.0, 0.0, 100.0, 0.0, 0.0));
    let mut exp = experiment(2, vec![bad], Box::new(RecordingExecutor::new(calls.clone())));
    match exp.run(ResumePoint::start()) {
        ExperimentStatus::Aborted { fault, resume } => {
            assert!(matches!(fault, Fault::Safety { .. }), "got {fault:?}");
            assert_eq!(resume, ResumePoint::new(1, 1));
        }
        other => panic!("unexpected outcome: {other}"),
    }
    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(exp.driver().emergency_stops(), 0, "safety faults do not e-stop");
}

#[rstest]
#[case(ResumePoint::new(0, 1))]
#[case(ResumePoint::new(9, 1))]
#[case(ResumePoint::new(1, 0))]
#[case(ResumePoint::new(1, 7))]
fn out_of_range_resume_point_is_rejected(#[case] start: ResumePoint) {
    let calls: CallLog = Arc::default();
    let mut exp = experiment(
        3,
        vec![step(1, 1)],
        Box::new(RecordingExecutor::new(calls.clone())),
    );
    match exp.run(start) {
        ExperimentStatus::Aborted { fault, resume } => {
            assert!(matches!(fault, Fault::Validation(_)), "got {fault:?}");
            assert_eq!(resume, start, "resume point must be surfaced unmodified");
        }
        other => panic!("unexpected outcome: {other}"),
    }
    assert!(calls.lock().unwrap().is_empty());
}

#[rstest]
fn resume_mid_slice_continues_from_the_given_step() {
    let calls: CallLog = Arc::default();
    let mut exp = experiment(
        3,
        vec![step(1, 1), step(2, 1), step(3, 1)],
        Box::new(RecordingExecutor::new(calls.clone())),
    );
    let outcome = exp.run(ResumePoint::new(2, 2));
    assert!(outcome.is_completed());
    let expected = vec![(2, 2), (2, 3), (3, 1), (3, 2), (3, 3)];
    assert_eq!(*calls.lock().unwrap(), expected);
}

#[rstest]
fn devices_left_inserted_are_retracted_during_the_run() {
    let calls: CallLog = Arc::default();
    let mut exp = experiment(
        2,
        vec![step(1, 1)],
        Box::new(RecordingExecutor::new(calls)),
    );
    // Someone left the detector in the chamber before the run started.
    let cbs = DeviceId::new("CBS");
    exp.driver_mut().force_device_state(&cbs, DeviceState::Inserted);

    let outcome = exp.run(ResumePoint::start());
    assert!(outcome.is_completed());
    assert_eq!(
        exp.driver_mut().device_state(&cbs).unwrap(),
        DeviceState::Retracted
    );
}

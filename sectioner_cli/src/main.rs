mod cli;
mod ops;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use clap::Parser;
use eyre::{Result, WrapErr};
use tracing_subscriber::EnvFilter;

use sectioner_core::{
    CollisionRule, Experiment, ExperimentHandle, ExperimentStatus, FilePositionLogger,
    GeneralSettings, InterlockCfg, MotionCfg, ResumePoint, Step, StepType,
};
use sectioner_hardware::SimulatedMicroscope;

use crate::cli::{Cli, FILE_GUARD};
use crate::ops::{CustomScriptExecutor, SimulatedOperation};

fn init_tracing(args: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.clone()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match (&args.log_file, args.json) {
        (Some(path), json) => {
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file = path.file_name().map_or_else(
                || std::ffi::OsString::from("sectioner.log"),
                std::ffi::OsStr::to_os_string,
            );
            let appender = tracing_appender::rolling::never(dir, file);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            if json {
                builder.json().with_writer(writer).init();
            } else {
                builder.with_ansi(false).with_writer(writer).init();
            }
        }
        (None, true) => builder.json().init(),
        (None, false) => builder.init(),
    }
}

/// The simulated instrument park: one retractable backscatter detector and
/// the two external mapping cameras, which must never meet it in the chamber.
fn simulated_driver() -> SimulatedMicroscope {
    SimulatedMicroscope::new()
        .with_device("CBS")
        .with_device("EBSD")
        .with_device("EDS")
}

fn collision_rules() -> Vec<CollisionRule> {
    vec![
        CollisionRule::new("CBS", "EBSD"),
        CollisionRule::new("CBS", "EDS"),
    ]
}

fn print_outcome(outcome: &ExperimentStatus, json: bool) {
    if json {
        let (status, resume, fault) = match outcome {
            ExperimentStatus::Completed => ("completed", None, None),
            ExperimentStatus::Paused(p) => ("paused", Some(p), None),
            ExperimentStatus::Aborted { fault, resume } => {
                ("aborted", Some(resume), Some(fault.to_string()))
            }
        };
        let body = serde_json::json!({
            "status": status,
            "resume_slice": resume.map(|p| p.slice_number),
            "resume_step": resume.map(|p| p.step_number),
            "fault": fault,
        });
        println!("{body}");
    } else {
        println!("{outcome}");
        if let Some(p) = outcome.resume_point() {
            println!(
                "restart with: --start-slice {} --start-step {}",
                p.slice_number, p.step_number
            );
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Cli::parse();
    init_tracing(&args);

    let cfg = sectioner_config::Config::load(&args.config)
        .wrap_err_with(|| format!("loading experiment file {}", args.config.display()))?;
    let general: GeneralSettings = (&cfg).into();
    let steps: Vec<Step> = cfg.steps.iter().map(Step::from).collect();

    // The simulated stage settles instantly; keep the bench delays short.
    let motion_cfg = MotionCfg {
        settle_delay: std::time::Duration::from_millis(20),
        ..MotionCfg::default()
    };
    let interlock_cfg = InterlockCfg {
        poll_interval: std::time::Duration::from_millis(20),
        ..InterlockCfg::default()
    };

    let mut builder = Experiment::builder()
        .with_driver(simulated_driver())
        .with_general(general)
        .with_steps(steps)
        .with_collision_rules(collision_rules())
        .with_motion_cfg(motion_cfg)
        .with_interlock_cfg(interlock_cfg)
        .with_executor(StepType::Custom, Box::new(CustomScriptExecutor));
    for kind in [
        StepType::Image,
        StepType::Mill,
        StepType::Laser,
        StepType::Ebsd,
        StepType::Eds,
    ] {
        builder = builder.with_executor(kind, SimulatedOperation::boxed(kind));
    }
    if let Some(path) = &args.position_log {
        builder = builder.with_logger(Box::new(FilePositionLogger::new(path)));
    }
    let experiment = builder.try_build().wrap_err("assembling experiment")?;

    let start = ResumePoint::new(args.start_slice, args.start_step);
    let handle = ExperimentHandle::spawn(experiment, start);

    // First Ctrl-C pauses after the step in progress; a second one aborts and
    // triggers the emergency-stop attempt.
    let intent = handle.intent();
    let presses = Arc::new(AtomicUsize::new(0));
    ctrlc::set_handler(move || {
        let n = presses.fetch_add(1, Ordering::SeqCst);
        if n == 0 {
            eprintln!("stop requested: pausing after the current step (Ctrl-C again to abort)");
            intent.request(sectioner_core::StopKind::AfterStep);
        } else {
            eprintln!("aborting now");
            intent.request(sectioner_core::StopKind::Immediate);
        }
    })
    .wrap_err("installing Ctrl-C handler")?;

    let outcome = handle.wait();
    print_outcome(&outcome, args.json);

    match outcome {
        ExperimentStatus::Completed | ExperimentStatus::Paused(_) => Ok(()),
        ExperimentStatus::Aborted { fault, .. } => Err(eyre::Report::new(fault)),
    }
}

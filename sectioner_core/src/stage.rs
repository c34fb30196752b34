//! Stage motion: per-slice target geometry and tolerance-checked,
//! retry-bounded multi-axis moves against the travel-limit envelope.

use std::sync::Arc;
use std::time::Duration;

use eyre::WrapErr;
use sectioner_traits::{Clock, EncoderMove, Limit, MicroscopeDriver, StageAxis};

use crate::error::{AxisDeviation, DeviationReport, Fault, Result, map_driver_error};
use crate::types::{
    RotationSide, SectioningAxis, StageLimits, StagePositionUser, StageSettings, StageTolerance,
};
use crate::units::{
    self, DEG_TO_RAD, IntervalType, M_TO_MM, UM_TO_M, UM_TO_MM, in_interval, normalize_r_deg,
};

/// Motion parameters, passed in at construction rather than read from globals.
#[derive(Debug, Clone)]
pub struct MotionCfg {
    /// Absolute-move commands issued per axis; non-piezo stages land closer
    /// on the second command.
    pub move_attempts: u32,
    /// Settle delay after each absolute-move command.
    pub settle_delay: Duration,
    /// Where `home()` parks the stage.
    pub home_position: StagePositionUser,
}

impl Default for MotionCfg {
    fn default() -> Self {
        Self {
            move_attempts: 2,
            settle_delay: Duration::from_millis(500),
            home_position: StagePositionUser::raw(0.0, 0.0, 0.0, 0.0, 0.0),
        }
    }
}

/// Compute the target position for a slice from the step's stage geometry.
///
/// Z sectioning advances Z toward the pole piece by `cos(pretilt) * increment`
/// and walks Y by `sin(pretilt) * increment`, signed by the rotation side.
/// X, R and T pass through unchanged. Other sectioning axes are rejected.
pub fn target_position(
    stage: &StageSettings,
    slice_number: u32,
    slice_thickness_um: f64,
) -> Result<StagePositionUser> {
    if slice_number == 0 {
        return Err(eyre::Report::new(Fault::Validation(
            "slice numbers are 1-indexed".into(),
        )));
    }
    match stage.sectioning_axis {
        SectioningAxis::Z => {}
        other => {
            return Err(eyre::Report::new(Fault::Validation(format!(
                "sectioning axis {other:?} is not implemented; only Z sectioning is supported"
            ))));
        }
    }

    let initial = units::user_to_encoder(&stage.initial_position);
    let pretilt_rad = stage.pretilt_angle_deg * DEG_TO_RAD;
    // Slices are 1-indexed: slice 1 sits at the initial position.
    let increment_m = slice_thickness_um * UM_TO_M * f64::from(slice_number - 1);

    let delta_z_m = pretilt_rad.cos() * increment_m;
    let delta_y_m = pretilt_rad.sin() * increment_m;
    let y_sign = match stage.rotation_side {
        RotationSide::LaserMill => -1.0,
        RotationSide::IonMill => 1.0,
        RotationSide::BeamNormal => 0.0,
    };

    Ok(StagePositionUser {
        x_mm: stage.initial_position.x_mm,
        y_mm: (initial.y_m + y_sign * delta_y_m) * M_TO_MM,
        z_mm: (initial.z_m + delta_z_m) * M_TO_MM,
        r_deg: stage.initial_position.r_deg,
        t_deg: stage.initial_position.t_deg,
        coordinate_system: stage.initial_position.coordinate_system,
    })
}

/// Tolerance-checked stage mover. Holds no driver; every method borrows the
/// worker's driver for the duration of the call.
pub struct MotionController {
    tolerance: StageTolerance,
    cfg: MotionCfg,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl MotionController {
    pub fn new(
        tolerance: StageTolerance,
        cfg: MotionCfg,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            tolerance,
            cfg,
            clock,
        }
    }

    /// Travel limits in user units. X/Y/Z/T are queried from the driver; R is
    /// fixed at `[-180, 180)` and never queried.
    pub fn stage_limits<D: MicroscopeDriver>(&self, driver: &mut D) -> Result<StageLimits> {
        let query = |driver: &mut D, axis: StageAxis| -> Result<Limit> {
            driver
                .axis_limits(axis)
                .map_err(|e| eyre::Report::new(map_driver_error(&*e)))
                .wrap_err("querying axis limits")
        };
        let scale = |lim: Limit, factor: f64| Limit {
            min: lim.min * factor,
            max: lim.max * factor,
        };
        Ok(StageLimits {
            x_mm: scale(query(driver, StageAxis::X)?, M_TO_MM),
            y_mm: scale(query(driver, StageAxis::Y)?, M_TO_MM),
            z_mm: scale(query(driver, StageAxis::Z)?, M_TO_MM),
            r_deg: Limit {
                min: -180.0,
                max: 180.0,
            },
            t_deg: scale(query(driver, StageAxis::T)?, units::RAD_TO_DEG),
        })
    }

    /// Driver-reported position in user units with R folded into `[-180, 180)`.
    pub fn current_position<D: MicroscopeDriver>(
        &self,
        driver: &mut D,
    ) -> Result<StagePositionUser> {
        let encoder = driver
            .current_position()
            .map_err(|e| eyre::Report::new(map_driver_error(&*e)))
            .wrap_err("reading stage position")?;
        let user = units::encoder_to_user(&encoder);
        Ok(user.with_r_deg(normalize_r_deg(user.r_deg)))
    }

    /// Whether every axis of `position` lies within the travel envelope.
    /// X/Y/Z/T are closed intervals; R is right-open at ±180.
    pub fn safe<D: MicroscopeDriver>(
        &self,
        driver: &mut D,
        position: &StagePositionUser,
    ) -> Result<bool> {
        Ok(self.limit_violation(driver, position)?.is_none())
    }

    /// First axis of `position` outside the envelope, if any.
    fn limit_violation<D: MicroscopeDriver>(
        &self,
        driver: &mut D,
        position: &StagePositionUser,
    ) -> Result<Option<Fault>> {
        let limits = self.stage_limits(driver)?;
        let checks = [
            (StageAxis::X, position.x_mm, limits.x_mm, IntervalType::Closed),
            (StageAxis::Y, position.y_mm, limits.y_mm, IntervalType::Closed),
            (StageAxis::Z, position.z_mm, limits.z_mm, IntervalType::Closed),
            (
                StageAxis::R,
                position.r_deg,
                limits.r_deg,
                IntervalType::RightOpen,
            ),
            (StageAxis::T, position.t_deg, limits.t_deg, IntervalType::Closed),
        ];
        for (axis, value, limit, interval) in checks {
            if !in_interval(value, limit, interval) {
                return Ok(Some(Fault::Safety {
                    axis,
                    value,
                    min: limit.min,
                    max: limit.max,
                }));
            }
        }
        Ok(None)
    }

    /// Whether the driver-reported position of `axis` is within tolerance of
    /// the target. For R only, the ±360° wrapped targets are also accepted.
    pub fn axis_in_range<D: MicroscopeDriver>(
        &self,
        driver: &mut D,
        axis: StageAxis,
        target: &StagePositionUser,
    ) -> Result<bool> {
        let current = self.current_position(driver)?;
        let (cur, tgt, tol) = self.axis_triplet(&current, target, axis);
        if within(cur, tgt, tol) {
            return Ok(true);
        }
        if axis == StageAxis::R {
            return Ok(within(cur, tgt + 360.0, tol) || within(cur, tgt - 360.0, tol));
        }
        Ok(false)
    }

    fn axis_triplet(
        &self,
        current: &StagePositionUser,
        target: &StagePositionUser,
        axis: StageAxis,
    ) -> (f64, f64, f64) {
        let trans_tol_mm = self.tolerance.translational_um * UM_TO_MM;
        match axis {
            StageAxis::X => (current.x_mm, target.x_mm, trans_tol_mm),
            StageAxis::Y => (current.y_mm, target.y_mm, trans_tol_mm),
            StageAxis::Z => (current.z_mm, target.z_mm, trans_tol_mm),
            StageAxis::R => (current.r_deg, target.r_deg, self.tolerance.angular_deg),
            StageAxis::T => (current.t_deg, target.t_deg, self.tolerance.angular_deg),
        }
    }

    /// Issue the bounded absolute-move sequence for a single axis.
    fn move_axis<D: MicroscopeDriver>(
        &self,
        driver: &mut D,
        axis: StageAxis,
        target: &StagePositionUser,
    ) -> Result<()> {
        let encoder = units::user_to_encoder(target);
        let value = match axis {
            StageAxis::X => encoder.x_m,
            StageAxis::Y => encoder.y_m,
            StageAxis::Z => encoder.z_m,
            StageAxis::R => encoder.r_rad,
            StageAxis::T => encoder.t_rad,
        };
        tracing::debug!(axis = axis.label(), value, "moving axis");
        for _ in 0..self.cfg.move_attempts {
            driver
                .absolute_move(EncoderMove::axis(axis, value))
                .map_err(|e| eyre::Report::new(map_driver_error(&*e)))
                .wrap_err("absolute move")?;
            self.clock.sleep(self.cfg.settle_delay);
        }
        Ok(())
    }

    /// Move every out-of-tolerance axis, one at a time: R first (with T homed
    /// to 0° beforehand when R must rotate), then X, Y, Z, T.
    pub fn move_stage<D: MicroscopeDriver>(
        &self,
        driver: &mut D,
        target: &StagePositionUser,
    ) -> Result<()> {
        if !self.axis_in_range(driver, StageAxis::R, target)? {
            // Tilt to the home angle before any rotation.
            if !self.axis_in_range(driver, StageAxis::T, &self.cfg.home_position)? {
                self.move_axis(driver, StageAxis::T, &self.cfg.home_position)?;
            }
            self.move_axis(driver, StageAxis::R, target)?;
        }
        for axis in [StageAxis::X, StageAxis::Y, StageAxis::Z, StageAxis::T] {
            if !self.axis_in_range(driver, axis, target)? {
                self.move_axis(driver, axis, target)?;
            }
        }
        Ok(())
    }

    /// Whether every axis has settled within tolerance of the target.
    pub fn move_completed<D: MicroscopeDriver>(
        &self,
        driver: &mut D,
        target: &StagePositionUser,
    ) -> Result<bool> {
        for axis in [
            StageAxis::X,
            StageAxis::Y,
            StageAxis::Z,
            StageAxis::R,
            StageAxis::T,
        ] {
            if !self.axis_in_range(driver, axis, target)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Checked move: reject unsafe targets before any hardware interaction,
    /// move, verify, retry the whole sequence exactly once, and surface a
    /// convergence fault carrying the full per-axis deviation report.
    pub fn move_to_position<D: MicroscopeDriver>(
        &self,
        driver: &mut D,
        target: &StagePositionUser,
    ) -> Result<()> {
        if let Some(fault) = self.limit_violation(driver, target)? {
            return Err(eyre::Report::new(fault));
        }
        self.move_stage(driver, target)?;
        if self.move_completed(driver, target)? {
            return Ok(());
        }
        tracing::warn!(position = %target, "stage move incomplete, retrying once");
        self.move_stage(driver, target)?;
        if self.move_completed(driver, target)? {
            return Ok(());
        }
        let current = self.current_position(driver)?;
        Err(eyre::Report::new(Fault::Convergence(
            self.deviation_report(&current, target),
        )))
    }

    /// Move to the configured home position through the fully checked path.
    pub fn home<D: MicroscopeDriver>(&self, driver: &mut D) -> Result<()> {
        let home = self.cfg.home_position;
        self.move_to_position(driver, &home)
    }

    /// Axes still outside tolerance, with errors in axis-appropriate units
    /// (mm for X/Y/Z, degrees for R/T) against the axis-appropriate tolerance.
    fn deviation_report(
        &self,
        current: &StagePositionUser,
        target: &StagePositionUser,
    ) -> DeviationReport {
        let mut axes = Vec::new();
        for axis in [
            StageAxis::X,
            StageAxis::Y,
            StageAxis::Z,
            StageAxis::R,
            StageAxis::T,
        ] {
            let (cur, tgt, tol) = self.axis_triplet(current, target, axis);
            let mut error = (cur - tgt).abs();
            if axis == StageAxis::R {
                // Report the wrapped distance so -179.9° vs 180.1° reads small.
                error = error.min((cur - tgt + 360.0).abs().min((cur - tgt - 360.0).abs()));
            }
            if error > tol {
                axes.push(AxisDeviation {
                    axis,
                    error,
                    tolerance: tol,
                });
            }
        }
        DeviationReport { axes }
    }
}

#[inline]
fn within(current: f64, target: f64, tolerance: f64) -> bool {
    in_interval(
        current,
        Limit {
            min: target - tolerance,
            max: target + tolerance,
        },
        IntervalType::Closed,
    )
}

#[cfg(test)]
mod target_tests {
    use super::*;

    fn settings(pretilt_deg: f64, side: RotationSide) -> StageSettings {
        StageSettings {
            initial_position: StagePositionUser::raw(5.0, 2.0, 3.0, 90.0, 30.0),
            pretilt_angle_deg: pretilt_deg,
            sectioning_axis: SectioningAxis::Z,
            rotation_side: side,
        }
    }

    #[test]
    fn zero_pretilt_advances_z_only() {
        let t = target_position(&settings(0.0, RotationSide::LaserMill), 11, 2.0).unwrap();
        assert!((t.z_mm - 3.020).abs() < 1e-9);
        assert!((t.y_mm - 2.0).abs() < 1e-9);
        assert!((t.x_mm - 5.0).abs() < 1e-12);
        assert!((t.r_deg - 90.0).abs() < 1e-12);
        assert!((t.t_deg - 30.0).abs() < 1e-12);
    }

    #[test]
    fn pretilt_walks_y_toward_the_selected_mill() {
        let laser = target_position(&settings(30.0, RotationSide::LaserMill), 11, 2.0).unwrap();
        assert!((laser.z_mm - 3.01732).abs() < 1e-4);
        assert!((laser.y_mm - 1.990).abs() < 1e-9);

        let ion = target_position(&settings(30.0, RotationSide::IonMill), 11, 2.0).unwrap();
        assert!((ion.y_mm - 2.010).abs() < 1e-9);

        let normal = target_position(&settings(30.0, RotationSide::BeamNormal), 11, 2.0).unwrap();
        assert!((normal.y_mm - 2.0).abs() < 1e-12);
    }

    #[test]
    fn slice_one_is_the_initial_position() {
        let initial = settings(30.0, RotationSide::IonMill).initial_position;
        let t = target_position(&settings(30.0, RotationSide::IonMill), 1, 2.0).unwrap();
        assert!((t.x_mm - initial.x_mm).abs() < 1e-12);
        assert!((t.y_mm - initial.y_mm).abs() < 1e-12);
        assert!((t.z_mm - initial.z_mm).abs() < 1e-12);
        assert!((t.r_deg - initial.r_deg).abs() < 1e-12);
        assert!((t.t_deg - initial.t_deg).abs() < 1e-12);
    }

    #[test]
    fn non_z_sectioning_is_rejected() {
        let mut s = settings(0.0, RotationSide::BeamNormal);
        s.sectioning_axis = SectioningAxis::X;
        let err = target_position(&s, 2, 2.0).unwrap_err();
        assert!(err.to_string().contains("not implemented"));
    }
}

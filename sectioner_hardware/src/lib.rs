//! Simulated instrument backend.
//!
//! `SimulatedMicroscope` implements `sectioner_traits::MicroscopeDriver` with
//! an in-memory stage and device park. Moves land exactly by default; tests
//! can script convergence lag (commands that land short until repeated),
//! device transition lag (polls spent in `Busy`), and latched device errors.

pub mod error;

use std::collections::HashMap;

use sectioner_traits::{
    DeviceId, DeviceState, DriverError, EncoderMove, Limit, MicroscopeDriver,
    StagePositionEncoder, StageAxis,
};

use crate::error::HwError;

/// Travel envelope used by the simulator, in encoder units.
#[derive(Debug, Clone, Copy)]
pub struct SimLimits {
    pub x_m: Limit,
    pub y_m: Limit,
    pub z_m: Limit,
    pub r_rad: Limit,
    pub t_rad: Limit,
}

impl Default for SimLimits {
    fn default() -> Self {
        // Generous bench envelope: ±75 mm translation, full rotation,
        // -15°..+90° tilt.
        Self {
            x_m: Limit {
                min: -0.075,
                max: 0.075,
            },
            y_m: Limit {
                min: -0.075,
                max: 0.075,
            },
            z_m: Limit { min: 0.0, max: 0.05 },
            r_rad: Limit {
                min: -std::f64::consts::PI,
                max: std::f64::consts::PI,
            },
            t_rad: Limit {
                min: -0.27,
                max: 1.58,
            },
        }
    }
}

#[derive(Debug)]
struct SimDevice {
    state: DeviceState,
    /// Polls spent in `Busy` before a requested transition lands.
    transition_polls: u32,
    pending: Option<DeviceState>,
}

impl SimDevice {
    fn new() -> Self {
        Self {
            state: DeviceState::Retracted,
            transition_polls: 0,
            pending: None,
        }
    }
}

/// In-memory stand-in for the instrument.
pub struct SimulatedMicroscope {
    position: StagePositionEncoder,
    limits: SimLimits,
    devices: HashMap<DeviceId, SimDevice>,
    device_order: Vec<DeviceId>,
    /// Remaining move commands that deliberately land short of the target.
    short_moves: u32,
    move_count: u32,
    emergency_stops: u32,
}

impl Default for SimulatedMicroscope {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedMicroscope {
    pub fn new() -> Self {
        Self {
            position: StagePositionEncoder {
                x_m: 0.0,
                y_m: 0.0,
                z_m: 0.0,
                r_rad: 0.0,
                t_rad: 0.0,
                raw: true,
            },
            limits: SimLimits::default(),
            devices: HashMap::new(),
            device_order: Vec::new(),
            short_moves: 0,
            move_count: 0,
            emergency_stops: 0,
        }
    }

    pub fn with_limits(mut self, limits: SimLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Register an insertable device, retracted.
    pub fn with_device(mut self, id: impl Into<DeviceId>) -> Self {
        let id = id.into();
        self.devices.insert(id.clone(), SimDevice::new());
        self.device_order.push(id);
        self
    }

    /// Script the next `count` move commands to land 10% short of the target.
    pub fn script_short_moves(&mut self, count: u32) {
        self.short_moves = count;
    }

    /// Script a device to spend `polls` state queries in `Busy` per
    /// transition before landing.
    pub fn script_transition_polls(&mut self, id: &DeviceId, polls: u32) {
        if let Some(dev) = self.devices.get_mut(id) {
            dev.transition_polls = polls;
        }
    }

    /// Force a device state, e.g. `Error` for fault-path tests.
    pub fn force_device_state(&mut self, id: &DeviceId, state: DeviceState) {
        if let Some(dev) = self.devices.get_mut(id) {
            dev.state = state;
            dev.pending = None;
        }
    }

    pub fn move_count(&self) -> u32 {
        self.move_count
    }

    pub fn emergency_stops(&self) -> u32 {
        self.emergency_stops
    }

    fn device_mut(&mut self, id: &DeviceId) -> Result<&mut SimDevice, DriverError> {
        self.devices
            .get_mut(id)
            .ok_or_else(|| Box::new(HwError::UnknownDevice(id.to_string())) as DriverError)
    }

    fn request_transition(&mut self, id: &DeviceId, want: DeviceState) -> Result<(), DriverError> {
        let dev = self.device_mut(id)?;
        if dev.state == DeviceState::Error {
            return Err(Box::new(HwError::Driver(format!(
                "device {id} is in error state"
            ))));
        }
        if dev.state == want {
            return Ok(());
        }
        if dev.transition_polls == 0 {
            dev.state = want;
        } else {
            dev.state = DeviceState::Busy;
            dev.pending = Some(want);
        }
        Ok(())
    }
}

impl MicroscopeDriver for SimulatedMicroscope {
    fn current_position(&mut self) -> Result<StagePositionEncoder, DriverError> {
        Ok(self.position)
    }

    fn absolute_move(&mut self, mv: EncoderMove) -> Result<(), DriverError> {
        self.move_count += 1;
        // A scripted short move covers only 90% of the commanded travel.
        let factor = if self.short_moves > 0 {
            self.short_moves -= 1;
            0.9
        } else {
            1.0
        };
        let mut apply = |current: &mut f64, target: Option<f64>| {
            if let Some(t) = target {
                *current += (t - *current) * factor;
            }
        };
        apply(&mut self.position.x_m, mv.x_m);
        apply(&mut self.position.y_m, mv.y_m);
        apply(&mut self.position.z_m, mv.z_m);
        apply(&mut self.position.r_rad, mv.r_rad);
        apply(&mut self.position.t_rad, mv.t_rad);
        tracing::trace!(?mv, factor, "simulated stage move");
        Ok(())
    }

    fn axis_limits(&mut self, axis: StageAxis) -> Result<Limit, DriverError> {
        Ok(match axis {
            StageAxis::X => self.limits.x_m,
            StageAxis::Y => self.limits.y_m,
            StageAxis::Z => self.limits.z_m,
            StageAxis::R => self.limits.r_rad,
            StageAxis::T => self.limits.t_rad,
        })
    }

    fn devices(&mut self) -> Result<Vec<DeviceId>, DriverError> {
        Ok(self.device_order.clone())
    }

    fn device_state(&mut self, id: &DeviceId) -> Result<DeviceState, DriverError> {
        let dev = self.device_mut(id)?;
        if dev.state == DeviceState::Busy {
            if dev.transition_polls > 0 {
                dev.transition_polls -= 1;
            } else if let Some(want) = dev.pending.take() {
                dev.state = want;
            }
        }
        Ok(dev.state)
    }

    fn insert_device(&mut self, id: &DeviceId) -> Result<(), DriverError> {
        tracing::debug!(device = %id, "simulated insert");
        self.request_transition(id, DeviceState::Inserted)
    }

    fn retract_device(&mut self, id: &DeviceId) -> Result<(), DriverError> {
        tracing::debug!(device = %id, "simulated retract");
        self.request_transition(id, DeviceState::Retracted)
    }

    fn emergency_stop(&mut self) -> Result<(), DriverError> {
        self.emergency_stops += 1;
        tracing::warn!("simulated emergency stop");
        Ok(())
    }
}

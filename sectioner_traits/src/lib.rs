pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Boundary error type for all hardware trait methods.
pub type DriverError = Box<dyn std::error::Error + Send + Sync>;

/// One of the five mechanical stage axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageAxis {
    X,
    Y,
    Z,
    R,
    T,
}

impl StageAxis {
    /// True for the length axes (X/Y/Z), false for the angular axes (R/T).
    pub fn is_translational(self) -> bool {
        matches!(self, StageAxis::X | StageAxis::Y | StageAxis::Z)
    }

    pub fn label(self) -> &'static str {
        match self {
            StageAxis::X => "X",
            StageAxis::Y => "Y",
            StageAxis::Z => "Z",
            StageAxis::R => "R",
            StageAxis::T => "T",
        }
    }
}

/// Closed numeric range reported by the hardware for one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limit {
    pub min: f64,
    pub max: f64,
}

/// Stage position in hardware-native units: meters for X/Y/Z, radians for R/T.
///
/// The `raw` flag mirrors the driver coordinate-system tag; all engine moves
/// run in raw stage coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StagePositionEncoder {
    pub x_m: f64,
    pub y_m: f64,
    pub z_m: f64,
    pub r_rad: f64,
    pub t_rad: f64,
    pub raw: bool,
}

/// Partial absolute move in encoder units. Axes left as `None` are untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EncoderMove {
    pub x_m: Option<f64>,
    pub y_m: Option<f64>,
    pub z_m: Option<f64>,
    pub r_rad: Option<f64>,
    pub t_rad: Option<f64>,
}

impl EncoderMove {
    /// Single-axis move helper.
    pub fn axis(axis: StageAxis, value: f64) -> Self {
        let mut mv = EncoderMove::default();
        match axis {
            StageAxis::X => mv.x_m = Some(value),
            StageAxis::Y => mv.y_m = Some(value),
            StageAxis::Z => mv.z_m = Some(value),
            StageAxis::R => mv.r_rad = Some(value),
            StageAxis::T => mv.t_rad = Some(value),
        }
        mv
    }
}

/// Identifier of an insertable device (detector, mapping camera, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Reported state of an insertable device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Retracted,
    Inserted,
    Busy,
    Error,
    Indeterminate,
}

impl DeviceState {
    pub fn label(self) -> &'static str {
        match self {
            DeviceState::Retracted => "Retracted",
            DeviceState::Inserted => "Inserted",
            DeviceState::Busy => "Busy",
            DeviceState::Error => "Error",
            DeviceState::Indeterminate => "Indeterminate",
        }
    }
}

/// Capability interface to the instrument: stage motion, axis limits,
/// insertable devices, and the emergency stop.
///
/// Implementations own all connection state. Every method is a blocking call
/// and is only ever invoked from the worker context.
pub trait MicroscopeDriver {
    /// Current stage position in encoder units (raw coordinates).
    fn current_position(&mut self) -> Result<StagePositionEncoder, DriverError>;

    /// Issue a partial absolute move; returns once the command is accepted,
    /// not necessarily once motion has settled.
    fn absolute_move(&mut self, mv: EncoderMove) -> Result<(), DriverError>;

    /// Travel limits for one axis in encoder units.
    fn axis_limits(&mut self, axis: StageAxis) -> Result<Limit, DriverError>;

    /// Every insertable device known to the instrument.
    fn devices(&mut self) -> Result<Vec<DeviceId>, DriverError>;

    fn device_state(&mut self, id: &DeviceId) -> Result<DeviceState, DriverError>;

    /// Request insertion; completion is observed by polling `device_state`.
    fn insert_device(&mut self, id: &DeviceId) -> Result<(), DriverError>;

    /// Request retraction; completion is observed by polling `device_state`.
    fn retract_device(&mut self, id: &DeviceId) -> Result<(), DriverError>;

    /// Halt all stage motion immediately. Best-effort; must not block.
    fn emergency_stop(&mut self) -> Result<(), DriverError>;
}

//! Fixed unit conversions between user coordinates (mm/deg) and
//! hardware-native encoder coordinates (m/rad).

use crate::types::{StageCoordinateSystem, StagePositionUser};
use sectioner_traits::{Limit, StagePositionEncoder};

pub const MM_TO_M: f64 = 1.0e-3;
pub const M_TO_MM: f64 = 1.0 / MM_TO_M;
pub const UM_TO_MM: f64 = 1.0e-3;
pub const MM_TO_UM: f64 = 1.0 / UM_TO_MM;
pub const UM_TO_M: f64 = UM_TO_MM * MM_TO_M;
pub const DEG_TO_RAD: f64 = std::f64::consts::PI / 180.0;
pub const RAD_TO_DEG: f64 = 180.0 / std::f64::consts::PI;

/// Convert a user position (mm/deg) to an encoder position (m/rad).
pub fn user_to_encoder(pos: &StagePositionUser) -> StagePositionEncoder {
    StagePositionEncoder {
        x_m: pos.x_mm * MM_TO_M,
        y_m: pos.y_mm * MM_TO_M,
        z_m: pos.z_mm * MM_TO_M,
        r_rad: pos.r_deg * DEG_TO_RAD,
        t_rad: pos.t_deg * DEG_TO_RAD,
        raw: pos.coordinate_system == StageCoordinateSystem::Raw,
    }
}

/// Convert an encoder position (m/rad) to a user position (mm/deg).
pub fn encoder_to_user(pos: &StagePositionEncoder) -> StagePositionUser {
    StagePositionUser {
        x_mm: pos.x_m * M_TO_MM,
        y_mm: pos.y_m * M_TO_MM,
        z_mm: pos.z_m * M_TO_MM,
        r_deg: pos.r_rad * RAD_TO_DEG,
        t_deg: pos.t_rad * RAD_TO_DEG,
        coordinate_system: if pos.raw {
            StageCoordinateSystem::Raw
        } else {
            StageCoordinateSystem::Specimen
        },
    }
}

/// Fold a rotation angle into the canonical right-open interval `[-180, 180)`.
/// Exactly 180 maps to -180.
#[inline]
pub fn normalize_r_deg(r_deg: f64) -> f64 {
    let wrapped = r_deg - 360.0 * ((r_deg + 180.0) / 360.0).floor();
    // floor() can land on the open bound for inputs just below 180.
    if wrapped >= 180.0 { wrapped - 360.0 } else { wrapped }
}

/// Interval shape for limit checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalType {
    /// `[min, max]`
    Closed,
    /// `[min, max)`
    RightOpen,
}

/// Test whether `val` lies within `limit` for the given interval shape.
#[inline]
pub fn in_interval(val: f64, limit: Limit, interval: IntervalType) -> bool {
    match interval {
        IntervalType::Closed => val >= limit.min && val <= limit.max,
        IntervalType::RightOpen => val >= limit.min && val < limit.max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_normalization_is_right_open() {
        assert_eq!(normalize_r_deg(180.0), -180.0);
        assert_eq!(normalize_r_deg(-180.0), -180.0);
        assert_eq!(normalize_r_deg(0.0), 0.0);
        assert!((normalize_r_deg(540.0) - (-180.0)).abs() < 1e-9);
        assert!((normalize_r_deg(190.0) - (-170.0)).abs() < 1e-9);
        assert!((normalize_r_deg(-190.0) - 170.0).abs() < 1e-9);
    }

    #[test]
    fn normalized_values_pass_through() {
        for r in [-180.0, -90.0, 0.0, 90.0, 179.999] {
            assert!((normalize_r_deg(r) - r).abs() < 1e-9);
        }
    }

    #[test]
    fn interval_shapes() {
        let lim = Limit {
            min: -180.0,
            max: 180.0,
        };
        assert!(in_interval(180.0, lim, IntervalType::Closed));
        assert!(!in_interval(180.0, lim, IntervalType::RightOpen));
        assert!(in_interval(-180.0, lim, IntervalType::RightOpen));
    }
}

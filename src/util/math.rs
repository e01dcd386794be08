//! Angle helpers for gradient orientations.

/// Maps `atan2` output in degrees to the `[0, 360)` range.
pub(crate) fn wrap_deg_360(angle_deg: f32) -> f32 {
    let mut wrapped = angle_deg % 360.0;
    if wrapped < 0.0 {
        wrapped += 360.0;
    }
    if wrapped >= 360.0 {
        wrapped -= 360.0;
    }
    wrapped
}

/// Gradient direction in whole degrees `[0, 360]` for a derivative pair.
///
/// Uses `f32::atan2` directly; the downstream 8-bucket quantization makes the
/// historical fast-atan2 approximation unnecessary. Rounding to the nearest
/// whole degree can produce 360, which the quantization table folds back to
/// bucket 0.
pub(crate) fn orientation_deg(dy: f32, dx: f32) -> i32 {
    wrap_deg_360(dy.atan2(dx).to_degrees()).round() as i32
}

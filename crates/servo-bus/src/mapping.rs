//! Conversion between joint-space radians and servo position units.
//!
//! The servo's mechanical centre (half a revolution, 180 degrees) corresponds to
//! the joint's centre angle; `reverse` flips the direction of travel.

use std::f64::consts::PI;

/// Encoder units per revolution.
pub const DEFAULT_RESOLUTION: u32 = 4096;

/// Raw value of the mechanical centre.
pub fn center_raw(resolution: u32) -> i64 {
    i64::from(resolution / 2)
}

/// Joint angle to a raw goal value, rounded and clamped to `[0, resolution - 1]`.
pub fn angle_to_raw(angle: f64, center_angle: f64, reverse: bool, resolution: u32) -> i64 {
    let res = f64::from(resolution);
    let units = (angle - center_angle) / (2.0 * PI) * res;
    let half = center_raw(resolution) as f64;
    let raw = if reverse { half - units } else { half + units };
    // NaN saturates to 0 in the cast
    (raw.round() as i64).clamp(0, i64::from(resolution) - 1)
}

/// Absolute device position in degrees (`[0, 360)`) to a joint angle.
pub fn raw_degrees_to_angle(degrees: f64, center_angle: f64, reverse: bool) -> f64 {
    let offset_rad = (degrees - 180.0).to_radians();
    if reverse {
        center_angle - offset_rad
    } else {
        center_angle + offset_rad
    }
}

pub fn raw_to_degrees(raw: i64, resolution: u32) -> f64 {
    raw as f64 * 360.0 / f64::from(resolution)
}

/// A deadband in raw units expressed in degrees.
pub fn deadband_degrees(deadband_raw: u32, resolution: u32) -> f64 {
    f64::from(deadband_raw) * 360.0 / f64::from(resolution)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RES: u32 = DEFAULT_RESOLUTION;

    #[test]
    fn clamped_limits_map_to_known_raw_values() {
        assert_eq!(angle_to_raw(1.0, 0.0, false, RES), 2700);
        assert_eq!(angle_to_raw(-1.0, 0.0, false, RES), 1396);
        assert_eq!(angle_to_raw(0.0, 0.0, false, RES), 2048);
    }

    #[test]
    fn reverse_mirrors_around_center() {
        assert_eq!(angle_to_raw(1.0, 0.0, true, RES), 1396);
        assert_eq!(angle_to_raw(-1.0, 0.0, true, RES), 2700);
        assert!((raw_degrees_to_angle(270.0, 0.0, true) + PI / 2.0).abs() < 1e-12);
    }

    #[test]
    fn out_of_range_saturates() {
        assert_eq!(angle_to_raw(10.0, 0.0, false, RES), 4095);
        assert_eq!(angle_to_raw(-10.0, 0.0, false, RES), 0);
        assert_eq!(angle_to_raw(f64::NAN, 0.0, false, RES), 0);
    }

    #[test]
    fn center_angle_offsets_the_mapping() {
        assert_eq!(angle_to_raw(0.5, 0.5, false, RES), 2048);
        assert!((raw_degrees_to_angle(180.0, 0.5, false) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn round_trip_within_half_a_unit() {
        let tolerance = PI / f64::from(RES) + 1e-12;
        for (lower, upper) in [(-1.0, 1.0), (0.2, 2.5), (-3.0, -0.5)] {
            let center = (lower + upper) / 2.0;
            for reverse in [false, true] {
                for step in 0..=200 {
                    let a = lower + (upper - lower) * f64::from(step) / 200.0;
                    let raw = angle_to_raw(a, center, reverse, RES);
                    let back = raw_degrees_to_angle(raw_to_degrees(raw, RES), center, reverse);
                    assert!(
                        (back - a).abs() <= tolerance,
                        "{a} -> {raw} -> {back} (reverse={reverse})"
                    );
                }
            }
        }
    }

    #[test]
    fn deadband_conversion() {
        assert_eq!(deadband_degrees(2, RES), 0.17578125);
        assert_eq!(deadband_degrees(0, RES), 0.0);
        assert_eq!(center_raw(RES), 2048);
    }
}

//! Angle utilities shared by the observation models and the approximation solver.

use std::f64::consts::{PI, TAU};

/// Floored modulo `x − floor(x/y)·y`.
///
/// For positive `y` the result always lies in `[0, y)`, also for negative `x`
/// and for exact multiples of `y`.
#[inline]
pub fn modulo(x: f64, y: f64) -> f64 {
    let r = x - (x / y).floor() * y;
    // floor() rounding can leave r == y for tiny negative x
    if r >= y || r < 0.0 {
        0.0
    } else {
        r
    }
}

/// Normalizes an angle into the range [0, 2π).
#[inline]
pub fn normalize(angle: f64) -> f64 {
    modulo(angle, TAU)
}

/// Difference `observed − computed` of two directions, wrapped so that values
/// close to 0 and 2π compare as neighbours. Returns a value in (−π, π].
#[inline]
pub fn wrapped_difference(observed: f64, computed: f64) -> f64 {
    let obs = normalize(observed);
    let mut cal = normalize(computed);
    let diff = obs - cal;
    if TAU - diff.abs() < diff.abs() {
        if cal < obs {
            cal += TAU;
        } else {
            cal -= TAU;
        }
    }
    obs - cal
}

/// Grid azimuth from `(x0, y0)` towards `(x1, y1)` with x pointing north and
/// y pointing east, normalized to [0, 2π).
#[inline]
pub fn azimuth(x0: f64, y0: f64, x1: f64, y1: f64) -> f64 {
    normalize((y1 - y0).atan2(x1 - x0))
}

/// Reduces a face-two zenith angle to face one when `2π − value` lies closer
/// to the computed zenith angle than the observed value itself.
#[inline]
pub fn reduce_zenith_face(observed: f64, computed: f64) -> f64 {
    let face_two = TAU - observed;
    if (face_two - computed).abs() < (observed - computed).abs() {
        face_two
    } else {
        observed
    }
}

/// Signed angle wrapped into (−π, π].
#[inline]
pub fn signed(angle: f64) -> f64 {
    let a = normalize(angle);
    if a > PI {
        a - TAU
    } else {
        a
    }
}

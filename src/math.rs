use serde::{Deserialize, Serialize};

pub const EPSILON: f32 = 1.0e-6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MathMode {
    #[default]
    Accurate,
    Fast,
}

impl MathMode {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Fast,
            _ => Self::Accurate,
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::Accurate => 0,
            Self::Fast => 1,
        }
    }
}

pub fn norm_sq(v: &[f32]) -> f32 {
    v.iter().map(|c| c * c).sum()
}

pub fn norm(v: &[f32]) -> f32 {
    norm_sq(v).sqrt()
}

pub fn distance_sq(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

pub fn distance(a: &[f32], b: &[f32]) -> f32 {
    distance_sq(a, b).sqrt()
}

/// Rescales `v` in place to `magnitude`. Returns false (and leaves `v`
/// zeroed) when `v` is too short to carry a direction.
pub fn normalize_to_magnitude(mode: MathMode, v: &mut [f32], magnitude: f32) -> bool {
    let mag_sq = norm_sq(v);
    if mag_sq <= EPSILON * EPSILON {
        v.fill(0.0);
        return false;
    }

    let scale = magnitude * inverse_sqrt(mode, mag_sq);
    for c in v.iter_mut() {
        *c *= scale;
    }
    true
}

pub fn inverse_sqrt(mode: MathMode, value: f32) -> f32 {
    match mode {
        MathMode::Accurate => 1.0 / value.sqrt(),
        MathMode::Fast => fast_inverse_sqrt(value),
    }
}

// Bit-level estimate refined by one Newton-Raphson step; relative error
// stays under 0.2%.
fn fast_inverse_sqrt(value: f32) -> f32 {
    let half = 0.5 * value;
    let mut i = value.to_bits();
    i = 0x5f37_59df_u32.wrapping_sub(i >> 1);
    let mut y = f32::from_bits(i);
    y *= 1.5 - half * y * y;
    y.max(0.0)
}

pub fn clamp_finite(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if !value.is_finite() {
        return fallback;
    }
    value.clamp(min, max)
}

/// Radius of a sphere holding half the volume of a sphere of `radius`
/// in `dimension` dimensions.
pub fn volume_halving_radius(radius: f32, dimension: usize) -> f32 {
    radius * 0.5_f32.powf(1.0 / dimension as f32)
}

#[cfg(test)]
mod tests {
    use super::{distance, normalize_to_magnitude, volume_halving_radius, MathMode};

    #[test]
    fn fast_mode_normalize_is_reasonable() {
        let mut accurate = [3.0, 4.0, 0.0];
        let mut fast = [3.0, 4.0, 0.0];
        normalize_to_magnitude(MathMode::Accurate, &mut accurate, 10.0);
        normalize_to_magnitude(MathMode::Fast, &mut fast, 10.0);

        for (a, f) in accurate.iter().zip(fast.iter()) {
            assert!((a - f).abs() < 0.2);
        }
    }

    #[test]
    fn zero_vector_is_not_normalized() {
        let mut v = [0.0, 0.0];
        assert!(!normalize_to_magnitude(MathMode::Accurate, &mut v, 1.0));
        assert_eq!(v, [0.0, 0.0]);
    }

    #[test]
    fn halving_radius_preserves_volume() {
        let r = 0.1;
        for d in 1..=3 {
            let half = volume_halving_radius(r, d);
            let ratio = 2.0 * half.powi(d as i32) / r.powi(d as i32);
            assert!((ratio - 1.0).abs() < 1.0e-4);
        }
        assert!((distance(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1.0e-6);
    }
}

use std::ops::Range;

use serde::{Deserialize, Serialize};

use super::{ExternalForceField, FieldEffect, FieldState};
use crate::math::{inverse_sqrt, norm_sq, normalize_to_magnitude, MathMode, EPSILON};
use crate::neighbor_grid::MAX_DIMENSION;

fn center_component(center: &[f32], axis: usize) -> f32 {
    center.get(axis).copied().unwrap_or(0.5)
}

/// Radial field about a point. Positive intensity pushes particles away
/// from the center (centrifugal), negative intensity pulls them in.
#[derive(Clone, Debug, PartialEq)]
pub struct CentriForceField {
    pub center: Vec<f32>,
    pub intensity: f32,
    pub math_mode: MathMode,
}

impl CentriForceField {
    pub fn new(intensity: f32, center: &[f32]) -> Self {
        Self {
            center: center.to_vec(),
            intensity,
            math_mode: MathMode::Accurate,
        }
    }
}

impl ExternalForceField for CentriForceField {
    fn apply(&mut self, range: Range<usize>, state: &mut FieldState<'_>) -> FieldEffect {
        let d = state.dimension;
        let positions = state.positions.read();
        let write = state.velocities.write_mut();
        let mut dir = [0.0f32; MAX_DIMENSION];

        for i in range {
            for axis in 0..d {
                dir[axis] = positions[i * d + axis] - center_component(&self.center, axis);
            }
            if !normalize_to_magnitude(self.math_mode, &mut dir[..d], self.intensity) {
                continue;
            }
            for axis in 0..d {
                write[i * d + axis] += dir[axis];
            }
        }
        FieldEffect::VelocitiesOnly
    }

    fn intensity(&self) -> f32 {
        self.intensity
    }

    fn set_intensity(&mut self, intensity: f32) {
        self.intensity = intensity;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceMode {
    /// Pulls particles onto the surface from both sides.
    #[default]
    Attract,
    /// Pushes particles away from the surface on both sides.
    Repel,
    /// Zero inside; pushes outside particles back in.
    KeepInside,
    /// Zero outside; pushes inside particles back out.
    KeepOutside,
}

/// Field defined by the implicit ellipsoid
/// `f(p) = sum(((p - c) / a)^2) - 1`. The force points along the normalized
/// gradient of `f` with magnitude `intensity / |grad f|`, so it weakens away
/// from the center. Its sign is set by the mode and by which side of the
/// surface the particle is on.
#[derive(Clone, Debug, PartialEq)]
pub struct EllipsoidalForceField {
    pub center: Vec<f32>,
    pub semi_axes: Vec<f32>,
    pub intensity: f32,
    pub mode: SurfaceMode,
    pub math_mode: MathMode,
}

impl EllipsoidalForceField {
    pub fn new(intensity: f32, center: &[f32], semi_axes: &[f32], mode: SurfaceMode) -> Self {
        Self {
            center: center.to_vec(),
            semi_axes: semi_axes.to_vec(),
            intensity,
            mode,
            math_mode: MathMode::Accurate,
        }
    }

    /// Implicit function value and (unnormalized) gradient at `position`.
    pub fn evaluate(&self, position: &[f32], gradient: &mut [f32]) -> f32 {
        let mut value = -1.0;
        for (axis, (&p, g)) in position.iter().zip(gradient.iter_mut()).enumerate() {
            let a = self.semi_axes.get(axis).map_or(1.0, |a| a.max(EPSILON));
            let u = (p - center_component(&self.center, axis)) / a;
            value += u * u;
            *g = 2.0 * u / a;
        }
        value
    }

    fn sign(&self, value: f32) -> f32 {
        let outside = value > 0.0;
        match self.mode {
            SurfaceMode::Attract if outside => -1.0,
            SurfaceMode::Attract if value < 0.0 => 1.0,
            SurfaceMode::Repel if outside => 1.0,
            SurfaceMode::Repel if value < 0.0 => -1.0,
            SurfaceMode::KeepInside if outside => -1.0,
            SurfaceMode::KeepOutside if value < 0.0 => 1.0,
            _ => 0.0,
        }
    }
}

impl ExternalForceField for EllipsoidalForceField {
    fn apply(&mut self, range: Range<usize>, state: &mut FieldState<'_>) -> FieldEffect {
        let d = state.dimension;
        let positions = state.positions.read();
        let write = state.velocities.write_mut();
        let mut gradient = [0.0f32; MAX_DIMENSION];

        for i in range {
            let value = self.evaluate(&positions[i * d..i * d + d], &mut gradient[..d]);
            let sign = self.sign(value);
            if sign == 0.0 {
                continue;
            }
            let length_sq = norm_sq(&gradient[..d]);
            if length_sq <= EPSILON * EPSILON {
                continue;
            }
            // unit gradient scaled by intensity / |grad f|
            let scale = sign * self.intensity * inverse_sqrt(self.math_mode, length_sq).powi(2);
            for axis in 0..d {
                write[i * d + axis] += scale * gradient[axis];
            }
        }
        FieldEffect::VelocitiesOnly
    }

    fn intensity(&self) -> f32 {
        self.intensity
    }

    fn set_intensity(&mut self, intensity: f32) {
        self.intensity = intensity;
    }
}

/// Uniform field: `velocity += intensity * direction`.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstantForceField {
    pub direction: Vec<f32>,
    pub intensity: f32,
}

impl ConstantForceField {
    pub fn new(intensity: f32, direction: &[f32]) -> Self {
        Self {
            direction: direction.to_vec(),
            intensity,
        }
    }
}

impl ExternalForceField for ConstantForceField {
    fn apply(&mut self, range: Range<usize>, state: &mut FieldState<'_>) -> FieldEffect {
        let d = state.dimension;
        let write = state.velocities.write_mut();
        for i in range {
            for (axis, &c) in self.direction.iter().take(d).enumerate() {
                write[i * d + axis] += self.intensity * c;
            }
        }
        FieldEffect::VelocitiesOnly
    }

    fn intensity(&self) -> f32 {
        self.intensity
    }

    fn set_intensity(&mut self, intensity: f32) {
        self.intensity = intensity;
    }
}

/// `velocity := (1 - damping) * velocity`. A damping of zero leaves
/// velocities untouched.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DragForceField {
    pub damping: f32,
}

impl DragForceField {
    pub fn new(damping: f32) -> Self {
        Self { damping }
    }
}

impl ExternalForceField for DragForceField {
    fn apply(&mut self, range: Range<usize>, state: &mut FieldState<'_>) -> FieldEffect {
        let d = state.dimension;
        let factor = (1.0 - self.damping).clamp(0.0, 1.0);
        let (read, write) = state.velocities.split();
        for k in range.start * d..range.end * d {
            write[k] = factor * read[k];
        }
        FieldEffect::VelocitiesOnly
    }

    fn intensity(&self) -> f32 {
        self.damping
    }

    fn set_intensity(&mut self, intensity: f32) {
        self.damping = intensity;
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CentriForceField, ConstantForceField, DragForceField, EllipsoidalForceField, SurfaceMode,
    };
    use crate::field::ForceField;
    use crate::particles::{ParticleSystem, ParticleSystemConfig};

    fn system(points: &[[f32; 2]]) -> ParticleSystem {
        let config = ParticleSystemConfig::explicit(2, 8, 8, 8).with_seed(1);
        let mut ps = ParticleSystem::new(config).unwrap();
        for p in points {
            ps.add_particle_with_radius(p, 0.01);
        }
        ps
    }

    #[test]
    fn centripetal_pulls_toward_center() {
        let mut ps = system(&[[0.8, 0.5], [0.5, 0.2], [0.5, 0.5]]);
        let mut field = ForceField::external(CentriForceField::new(-0.01, &[0.5, 0.5]));
        ps.apply_force_field(&mut field);

        let v = ps.velocities();
        assert!((v[0] + 0.01).abs() < 1.0e-6 && v[1].abs() < 1.0e-6);
        assert!(v[2].abs() < 1.0e-6 && (v[3] - 0.01).abs() < 1.0e-6);
        // particle at the center has no direction
        assert_eq!(&v[4..6], &[0.0, 0.0]);
    }

    #[test]
    fn keep_inside_is_zero_inside() {
        let mut ps = system(&[[0.5, 0.6], [0.5, 0.95]]);
        let mut field = ForceField::external(EllipsoidalForceField::new(
            0.02,
            &[0.5, 0.5],
            &[0.3, 0.2],
            SurfaceMode::KeepInside,
        ));
        ps.apply_force_field(&mut field);

        assert_eq!(ps.velocity(0), Some(&[0.0, 0.0][..]));
        // |grad f| = 2 * 2.25 / 0.2 = 22.5
        let v = ps.velocity(1).unwrap();
        assert!(v[0].abs() < 1.0e-6);
        assert!((v[1] + 0.02 / 22.5).abs() < 1.0e-7);
    }

    #[test]
    fn keep_outside_pushes_out_only_inside() {
        let mut ps = system(&[[0.6, 0.5], [0.9, 0.5]]);
        let mut field = ForceField::external(EllipsoidalForceField::new(
            0.01,
            &[0.5, 0.5],
            &[0.2, 0.2],
            SurfaceMode::KeepOutside,
        ));
        ps.apply_force_field(&mut field);

        // |grad f| = 2 * 0.5 / 0.2 = 5
        assert!((ps.velocity(0).unwrap()[0] - 0.002).abs() < 1.0e-7);
        assert_eq!(ps.velocity(1), Some(&[0.0, 0.0][..]));
    }

    #[test]
    fn attraction_flips_sign_at_surface() {
        let mut ps = system(&[[0.6, 0.5], [0.9, 0.5]]);
        let mut field = ForceField::external(EllipsoidalForceField::new(
            0.01,
            &[0.5, 0.5],
            &[0.2, 0.2],
            SurfaceMode::Attract,
        ));
        ps.apply_force_field(&mut field);

        assert!(ps.velocity(0).unwrap()[0] > 0.0);
        assert!(ps.velocity(1).unwrap()[0] < 0.0);
    }

    #[test]
    fn magnitude_falls_with_gradient_length() {
        // |grad f| is 12.5 at x = 0.75 and 22.5 at x = 0.95
        let mut ps = system(&[[0.75, 0.5], [0.95, 0.5]]);
        let mut field = ForceField::external(EllipsoidalForceField::new(
            0.01,
            &[0.5, 0.5],
            &[0.2, 0.2],
            SurfaceMode::Attract,
        ));
        ps.apply_force_field(&mut field);

        let near = ps.velocity(0).unwrap()[0];
        let far = ps.velocity(1).unwrap()[0];
        assert!(near < 0.0 && far < 0.0);
        assert!((near + 0.01 / 12.5).abs() < 1.0e-7);
        assert!((far + 0.01 / 22.5).abs() < 1.0e-7);
        assert!((near / far - 1.8).abs() < 1.0e-4);
    }

    #[test]
    fn center_of_ellipsoid_is_skipped() {
        let mut ps = system(&[[0.5, 0.5]]);
        let mut field = ForceField::external(EllipsoidalForceField::new(
            0.01,
            &[0.5, 0.5],
            &[0.2, 0.2],
            SurfaceMode::Repel,
        ));
        ps.apply_force_field(&mut field);
        assert_eq!(ps.velocities(), &[0.0, 0.0]);
    }

    #[test]
    fn constant_and_drag_fields() {
        let mut ps = system(&[[0.5, 0.5], [0.4, 0.4]]);
        let mut push = ForceField::external(ConstantForceField::new(2.0, &[0.01, 0.0]));
        ps.apply_force_field_in(&mut push, 0..1);
        assert_eq!(ps.velocities(), &[0.02, 0.0, 0.0, 0.0]);

        let mut drag = ForceField::external(DragForceField::new(0.5));
        ps.apply_force_field(&mut drag);
        assert_eq!(ps.velocities(), &[0.01, 0.0, 0.0, 0.0]);

        drag.set_intensity(0.25);
        assert_eq!(drag.intensity(), 0.25);
    }
}

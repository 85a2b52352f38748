use std::time::Duration;

use glam::{EulerRot, Mat4, Quat, Vec2, Vec3};

use super::raycast::Ray;
use super::transform::Transform;
use crate::app::scroll::damping_alpha;
use crate::config::DEFAULT_OBSERVER_DAMPING;

const DEFAULT_FOV_Y_DEGREES: f32 = 45.0;

/// Perspective viewpoint. Rays for picking are cast from its current pose.
#[derive(Debug, Clone)]
pub struct Observer {
    transform: Transform,
    fov_y_radians: f32,
    aspect: f32,
    base_rotation: Vec3,
    rotation_target: Option<Vec3>,
    damping: f32,
}

impl Default for Observer {
    fn default() -> Self {
        Self::new(Vec3::ZERO, DEFAULT_FOV_Y_DEGREES, 16.0 / 9.0)
    }
}

impl Observer {
    pub fn new(position: Vec3, fov_y_degrees: f32, aspect: f32) -> Self {
        Self {
            transform: Transform::from_position(position),
            fov_y_radians: fov_y_degrees.to_radians(),
            aspect: aspect.max(f32::EPSILON),
            base_rotation: Vec3::ZERO,
            rotation_target: None,
            damping: DEFAULT_OBSERVER_DAMPING,
        }
    }

    pub fn with_damping(mut self, damping: f32) -> Self {
        self.damping = damping.clamp(f32::EPSILON, 1.0);
        self
    }

    pub fn position(&self) -> Vec3 {
        self.transform.position
    }

    pub fn rotation(&self) -> Vec3 {
        self.transform.rotation
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect.max(f32::EPSILON);
    }

    /// Points the observer at `target` and makes that the parallax rest pose.
    pub fn look_at(&mut self, target: Vec3) {
        let eye = self.transform.position;
        if (target - eye).length_squared() <= f32::EPSILON {
            return;
        }
        let world = Mat4::look_at_rh(eye, target, Vec3::Y).inverse();
        let (x, y, z) = Quat::from_mat4(&world).to_euler(EulerRot::XYZ);
        self.set_rest_rotation(Vec3::new(x, y, z));
    }

    pub fn set_rest_rotation(&mut self, rotation: Vec3) {
        self.transform.rotation = rotation;
        self.base_rotation = rotation;
        self.rotation_target = None;
    }

    /// Places the observer immediately, bypassing parallax damping.
    pub fn set_pose(&mut self, position: Vec3, rotation: Vec3) {
        self.transform.position = position;
        self.set_rest_rotation(rotation);
    }

    /// Tilts the rest pose towards the cursor; `update` eases into it.
    pub fn aim_parallax(&mut self, cursor_ndc: Vec2, strength: f32) {
        self.rotation_target = Some(Vec3::new(
            self.base_rotation.x + cursor_ndc.y * strength,
            self.base_rotation.y - cursor_ndc.x * strength,
            self.base_rotation.z,
        ));
    }

    pub fn update(&mut self, dt: Duration) {
        let Some(target) = self.rotation_target else {
            return;
        };
        let alpha = damping_alpha(self.damping, dt);
        self.transform.rotation = self.transform.rotation.lerp(target, alpha);
    }

    pub fn ray_through(&self, cursor_ndc: Vec2) -> Ray {
        let half_height = (self.fov_y_radians * 0.5).tan();
        let local = Vec3::new(
            cursor_ndc.x * half_height * self.aspect,
            cursor_ndc.y * half_height,
            -1.0,
        );
        Ray::new(
            self.transform.position,
            self.transform.rotation_quat() * local,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_ray_follows_view_direction() {
        let observer = Observer::new(Vec3::new(0.0, 0.0, 10.0), 60.0, 1.0);
        let ray = observer.ray_through(Vec2::ZERO);
        assert!((ray.direction - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-5);
        assert_eq!(ray.origin, Vec3::new(0.0, 0.0, 10.0));
    }

    #[test]
    fn corner_ray_spreads_with_fov() {
        let observer = Observer::new(Vec3::ZERO, 90.0, 1.0);
        let ray = observer.ray_through(Vec2::new(1.0, 0.0));
        let expected = Vec3::new(1.0, 0.0, -1.0).normalize();
        assert!((ray.direction - expected).length() < 1e-5);
    }

    #[test]
    fn look_at_turns_center_ray_towards_target() {
        let mut observer = Observer::new(Vec3::new(0.0, 5.0, 10.0), 45.0, 1.0);
        let target = Vec3::new(3.0, 0.0, 0.0);
        observer.look_at(target);
        let ray = observer.ray_through(Vec2::ZERO);
        let expected = (target - observer.position()).normalize();
        assert!((ray.direction - expected).length() < 1e-4);
    }

    #[test]
    fn parallax_eases_towards_offset_rotation() {
        let mut observer = Observer::default();
        observer.aim_parallax(Vec2::new(1.0, 1.0), 0.5);

        observer.update(Duration::from_secs_f32(1.0 / 60.0));
        let partial = observer.rotation();
        assert!(partial.x > 0.0 && partial.x < 0.5);

        for _ in 0..600 {
            observer.update(Duration::from_secs_f32(1.0 / 60.0));
        }
        let settled = observer.rotation();
        assert!((settled.x - 0.5).abs() < 1e-3);
        assert!((settled.y + 0.5).abs() < 1e-3);
    }

    #[test]
    fn set_pose_clears_pending_parallax() {
        let mut observer = Observer::default();
        observer.aim_parallax(Vec2::new(1.0, 0.0), 1.0);
        observer.set_pose(Vec3::ONE, Vec3::new(0.1, 0.0, 0.0));
        observer.update(Duration::from_secs(1));
        assert_eq!(observer.rotation(), Vec3::new(0.1, 0.0, 0.0));
    }
}

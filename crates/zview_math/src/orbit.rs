use glam::{Quat, Vec3};

use crate::Camera;

/// Keeps the camera this far away from straight up/down (radians).
const POLE_MARGIN: f32 = 0.01;

/// Orbit-style camera controls: tumble around, track and dolly toward a target point.
///
/// The controls own the target and the allowed distance range; the camera owns
/// its position. Every operation keeps `camera.target` in sync with `target`.
#[derive(Debug, Clone, Copy)]
pub struct OrbitControls {
    pub target: Vec3,
    pub min_distance: f32,
    pub max_distance: f32,
    pub rotate_speed: f32,
    pub pan_speed: f32,
    pub zoom_speed: f32,
}

impl Default for OrbitControls {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            rotate_speed: 0.005,
            pan_speed: 0.001,
            zoom_speed: 0.001,
        }
    }
}

impl OrbitControls {
    pub fn new(target: Vec3) -> Self {
        Self {
            target,
            ..Default::default()
        }
    }

    /// Write the controls' target into the camera.
    pub fn sync(&self, camera: &mut Camera) {
        camera.target = self.target;
    }

    /// Tumble the camera around the target. Deltas are in pointer pixels.
    pub fn orbit(&self, camera: &mut Camera, delta_x: f32, delta_y: f32) {
        let offset = camera.position - self.target;
        let radius = offset.length();
        if radius <= f32::EPSILON {
            return;
        }

        let yaw = -delta_x * self.rotate_speed;
        let pitch = (offset.y / radius).clamp(-1.0, 1.0).asin();
        let limit = std::f32::consts::FRAC_PI_2 - POLE_MARGIN;
        let new_pitch = (pitch - delta_y * self.rotate_speed).clamp(-limit, limit);
        let d_pitch = new_pitch - pitch;

        let yawed = Quat::from_rotation_y(yaw) * offset;
        let horizontal = Vec3::new(yawed.x, 0.0, yawed.z);
        let right = horizontal.cross(Vec3::Y).try_normalize().unwrap_or(Vec3::X);
        let rotated = Quat::from_axis_angle(right, d_pitch) * yawed;

        // Renormalize so repeated small rotations cannot drift the radius
        let direction = rotated.try_normalize().unwrap_or(offset / radius);
        camera.position = self.target + direction * radius;
        self.sync(camera);
    }

    /// Track the target and camera together in the view plane.
    pub fn pan(&mut self, camera: &mut Camera, delta_x: f32, delta_y: f32) {
        let forward = (self.target - camera.position).try_normalize().unwrap_or(Vec3::NEG_Z);
        let right = forward.cross(camera.up).try_normalize().unwrap_or(Vec3::X);
        let up = right.cross(forward);

        let scale = camera.distance().max(f32::EPSILON) * self.pan_speed;
        let offset = (-right * delta_x + up * delta_y) * scale;

        self.target += offset;
        camera.position += offset;
        self.sync(camera);
    }

    /// Move the camera along its view axis. Positive amounts move closer.
    ///
    /// The resulting distance is clamped to `[min_distance, max_distance]`.
    pub fn dolly(&self, camera: &mut Camera, amount: f32) {
        let offset = camera.position - self.target;
        let distance = offset.length();
        let direction = offset.try_normalize().unwrap_or(Vec3::Z);

        let factor = (1.0 - amount * self.zoom_speed).max(0.05);
        let new_distance = (distance * factor).clamp(self.min_distance, self.max_distance);

        camera.position = self.target + direction * new_distance;
        self.sync(camera);
    }
}

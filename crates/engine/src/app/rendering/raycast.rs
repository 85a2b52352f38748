use std::collections::HashSet;

use glam::Vec3;

use super::graph::{ObjectId, SceneGraph};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    pub fn point_at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub object: ObjectId,
    pub distance: f32,
}

pub trait RayIntersector {
    /// Hits against `roots` and their visible descendants, nearest first.
    fn intersect(&self, ray: &Ray, roots: &[ObjectId], graph: &SceneGraph) -> Vec<RayHit>;
}

/// Intersects rays with each object's world-space bounding sphere.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundsRayCaster;

impl RayIntersector for BoundsRayCaster {
    fn intersect(&self, ray: &Ray, roots: &[ObjectId], graph: &SceneGraph) -> Vec<RayHit> {
        let mut hits = Vec::new();
        let mut visited = HashSet::new();

        for root in roots {
            if !graph.is_effectively_visible(*root) {
                continue;
            }
            let mut stack = vec![*root];
            while let Some(id) = stack.pop() {
                if !visited.insert(id) {
                    continue;
                }
                let Some(object) = graph.find_object(id) else {
                    continue;
                };
                if !object.visible {
                    continue;
                }
                if let Some(radius) = object.bounds_radius {
                    let world = graph.world_matrix(id);
                    let (scale, _, center) = world.to_scale_rotation_translation();
                    let world_radius = radius * scale.abs().max_element();
                    if let Some(distance) = intersect_sphere(ray, center, world_radius) {
                        hits.push(RayHit {
                            object: id,
                            distance,
                        });
                    }
                }
                stack.extend(object.children().iter().copied());
            }
        }

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }
}

fn intersect_sphere(ray: &Ray, center: Vec3, radius: f32) -> Option<f32> {
    if radius <= 0.0 {
        return None;
    }
    let to_center = center - ray.origin;
    let along = to_center.dot(ray.direction);
    let closest_sq = to_center.length_squared() - along * along;
    let radius_sq = radius * radius;
    if closest_sq > radius_sq {
        return None;
    }
    let half_chord = (radius_sq - closest_sq).sqrt();
    let near = along - half_chord;
    let far = along + half_chord;
    if far < 0.0 {
        return None;
    }
    Some(if near >= 0.0 { near } else { far })
}

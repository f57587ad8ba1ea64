//! Intersection queries for points, rays, etc. vs. shapes.

use super::{Ray, Shape, ShapeChild};
use crate::math as m;

/// Result of a ray hitting a single shape.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShapeRayHit {
    /// Fraction of the ray's length at which the hit happened.
    pub t: f64,
    /// Surface normal at the hit point, in world space.
    pub normal: m::Vec2,
}

/// Check whether or not a point is inside a shape.
/// Edges and chains have no interior and never contain points.
pub fn point_shape_bool(point: m::Vec2, pose: &m::Pose, shape: &Shape) -> bool {
    let p = pose.inversed() * point;
    match shape {
        Shape::Circle(c) => (p - c.center).mag_sq() <= c.total_radius() * c.total_radius(),
        Shape::Polygon(poly) => poly
            .vertices()
            .iter()
            .zip(poly.normals())
            .all(|(v, n)| n.dot(p - *v) <= poly.skin),
        Shape::Edge(_) | Shape::Chain(_) => false,
    }
}

/// Cast a ray against one child of a shape.
///
/// Only hits with `t` in `[0, 1]` count.
/// Rays starting inside a circle or polygon don't hit it.
pub fn ray_shape(ray: &Ray, pose: &m::Pose, child: ShapeChild) -> Option<ShapeRayHit> {
    // everything in the shape's local space
    let inv = pose.inversed();
    let local = Ray {
        start: inv * ray.start,
        dir: inv.rotation * ray.dir,
    };
    let (t, local_normal) = match child {
        ShapeChild::Circle(c) => ray_circle(&local, c.center, c.total_radius())?,
        ShapeChild::Polygon(p) => ray_polygon(&local, p.vertices(), p.normals())?,
        ShapeChild::Edge(e) => ray_segment(&local, e.vertices()[0], e.vertices()[1])?,
    };
    Some(ShapeRayHit {
        t,
        normal: pose.rotation * local_normal,
    })
}

fn ray_circle(ray: &Ray, center: m::Vec2, radius: f64) -> Option<(f64, m::Vec2)> {
    let s = ray.start - center;
    let b = s.mag_sq() - radius * radius;
    if b <= 0.0 {
        return None;
    }
    let rr = ray.dir.mag_sq();
    if rr < m::EPSILON {
        return None;
    }
    let c = s.dot(ray.dir);
    let sigma = c * c - rr * b;
    if sigma < 0.0 {
        return None;
    }
    let t = -(c + sigma.sqrt()) / rr;
    if !(0.0..=1.0).contains(&t) {
        return None;
    }
    let normal = m::normalize_or_zero(s + t * ray.dir);
    Some((t, normal))
}

fn ray_polygon(ray: &Ray, vertices: &[m::Vec2], normals: &[m::Vec2]) -> Option<(f64, m::Vec2)> {
    let mut lower = 0.0_f64;
    let mut upper = 1.0_f64;
    let mut hit_face = None;

    for (v, n) in vertices.iter().zip(normals) {
        // dot(n, start + t * dir - v) = 0
        let numerator = n.dot(*v - ray.start);
        let denominator = n.dot(ray.dir);
        if denominator == 0.0 {
            if numerator < 0.0 {
                // parallel and outside this face
                return None;
            }
        } else if denominator < 0.0 && numerator < lower * denominator {
            // entering the half-space
            lower = numerator / denominator;
            hit_face = Some(*n);
        } else if denominator > 0.0 && numerator < upper * denominator {
            // leaving the half-space
            upper = numerator / denominator;
        }
        if upper < lower {
            return None;
        }
    }

    hit_face.map(|n| (lower, n))
}

fn ray_segment(ray: &Ray, v1: m::Vec2, v2: m::Vec2) -> Option<(f64, m::Vec2)> {
    let edge = v2 - v1;
    let normal = m::normalize_or_zero(m::right_normal(edge));
    let numerator = normal.dot(v1 - ray.start);
    let denominator = normal.dot(ray.dir);
    if denominator.abs() < m::EPSILON {
        return None;
    }
    let t = numerator / denominator;
    if !(0.0..=1.0).contains(&t) {
        return None;
    }
    let q = ray.point_at_t(t);
    let s = (q - v1).dot(edge) / edge.mag_sq();
    if !(0.0..=1.0).contains(&s) {
        return None;
    }
    // edges are two-sided, face the ray
    Some((t, if numerator > 0.0 { -normal } else { normal }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_in_shapes() {
        let pose = m::pose(m::Vec2::new(2.0, 0.0), std::f64::consts::FRAC_PI_4);
        let rect = Shape::rect(2.0, 0.5).unwrap();
        assert!(point_shape_bool(m::Vec2::new(2.5, 0.5), &pose, &rect));
        assert!(!point_shape_bool(m::Vec2::new(2.5, -0.5), &pose, &rect));

        let circle = Shape::circle_at(m::Vec2::new(1.0, 0.0), 0.5).unwrap();
        assert!(point_shape_bool(m::Vec2::new(2.7, 0.7), &pose, &circle));
        assert!(!point_shape_bool(m::Vec2::new(3.0, 0.0), &pose, &circle));

        let edge = Shape::edge(m::Vec2::zero(), m::Vec2::unit_x()).unwrap();
        assert!(!point_shape_bool(m::Vec2::new(2.5, 0.0), &m::Pose::identity(), &edge));
    }

    #[test]
    fn rays_hit_near_faces() {
        let ray = Ray::between(m::Vec2::new(-5.0, 0.2), m::Vec2::new(5.0, 0.2));

        let rect = Shape::rect(2.0, 2.0).unwrap();
        let hit = ray_shape(&ray, &m::Pose::identity(), rect.child(0)).unwrap();
        assert!((hit.t - 0.4).abs() < 1e-12);
        assert!((hit.normal - m::Vec2::new(-1.0, 0.0)).mag() < 1e-12);

        let circle = Shape::circle(1.0).unwrap();
        let hit = ray_shape(&ray, &m::pose(m::Vec2::new(2.0, 0.2), 0.0), circle.child(0)).unwrap();
        assert!((hit.t - 0.6).abs() < 1e-12);
        assert!((hit.normal - m::Vec2::new(-1.0, 0.0)).mag() < 1e-12);

        let edge = Shape::edge(m::Vec2::new(0.0, -1.0), m::Vec2::new(0.0, 1.0)).unwrap();
        let hit = ray_shape(&ray, &m::Pose::identity(), edge.child(0)).unwrap();
        assert!((hit.t - 0.5).abs() < 1e-12);
        assert!(hit.normal.x < 0.0);
        let back = Ray::between(m::Vec2::new(5.0, 0.2), m::Vec2::new(-5.0, 0.2));
        let hit = ray_shape(&back, &m::Pose::identity(), edge.child(0)).unwrap();
        assert!(hit.normal.x > 0.0);

        let short = Ray::between(m::Vec2::new(-5.0, 0.2), m::Vec2::new(-3.0, 0.2));
        assert!(ray_shape(&short, &m::Pose::identity(), rect.child(0)).is_none());
    }
}

//! Geometric shapes that fixtures attach to bodies.

use super::AABB;
use crate::{
    error::{check_positive, ShapeError},
    math as m,
};

/// Skin radius given to polygons, edges and chains unless overridden.
///
/// A small skin keeps flat shapes resting on each other from reporting
/// exactly zero separation, which keeps contacts alive between steps.
pub const DEFAULT_POLYGON_SKIN: f64 = 0.005;
/// Polygons with more vertices than this are rejected.
pub const MAX_POLYGON_VERTICES: usize = 16;
/// Edges shorter than this are considered degenerate.
const MIN_EDGE_LENGTH: f64 = 1.0e-6;

/// Mass properties of a shape with a given density.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MassData {
    pub mass: f64,
    /// Center of mass in the body's local space.
    pub centroid: m::Vec2,
    /// Rotational inertia about the body origin.
    pub inertia: f64,
}

impl MassData {
    pub fn zero() -> Self {
        Self {
            mass: 0.0,
            centroid: m::Vec2::zero(),
            inertia: 0.0,
        }
    }
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct Circle {
    /// Center of the circle in body-local space.
    pub center: m::Vec2,
    pub radius: f64,
    pub skin: f64,
}

/// A convex polygon with counter-clockwise winding.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct Polygon {
    vertices: Vec<m::Vec2>,
    normals: Vec<m::Vec2>,
    centroid: m::Vec2,
    pub skin: f64,
}

/// A line segment. Edges collide on both sides and have no mass.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct Edge {
    vertices: [m::Vec2; 2],
    // one normal per side so the edge can be clipped like a polygon
    normals: [m::Vec2; 2],
    pub skin: f64,
}

/// A sequence of connected edges, each of which collides separately.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct Chain {
    vertices: Vec<m::Vec2>,
    looped: bool,
    pub skin: f64,
}

/// The shape of a fixture.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub enum Shape {
    Circle(Circle),
    Polygon(Polygon),
    Edge(Edge),
    Chain(Chain),
}

/// A single collidable piece of a shape.
/// Every shape except a chain has exactly one.
#[derive(Clone, Copy, Debug)]
pub enum ShapeChild<'a> {
    Circle(&'a Circle),
    Polygon(&'a Polygon),
    Edge(Edge),
}

impl Circle {
    #[inline]
    pub fn total_radius(&self) -> f64 {
        self.radius + self.skin
    }
}

impl Polygon {
    /// Create a convex polygon from its vertices.
    ///
    /// Clockwise input is reversed into counter-clockwise order.
    /// Collinear consecutive vertices count as non-convex.
    pub fn new(vertices: &[m::Vec2]) -> Result<Self, ShapeError> {
        let count = vertices.len();
        if count < 3 {
            return Err(ShapeError::TooFewVertices(count));
        }
        if count > MAX_POLYGON_VERTICES {
            return Err(ShapeError::TooManyVertices {
                count,
                max: MAX_POLYGON_VERTICES,
            });
        }
        for (i, v) in vertices.iter().enumerate() {
            if !(v.x.is_finite() && v.y.is_finite()) {
                return Err(ShapeError::NotFinite {
                    what: "vertex coordinate",
                    value: if v.x.is_finite() { v.y } else { v.x },
                });
            }
            if (vertices[(i + 1) % count] - *v).mag() < MIN_EDGE_LENGTH {
                return Err(ShapeError::DegenerateEdge(i));
            }
        }

        let mut verts = vertices.to_vec();
        if signed_area(&verts) < 0.0 {
            verts.reverse();
        }

        let normals: Vec<m::Vec2> = (0..count)
            .map(|i| m::normalize_or_zero(m::right_normal(verts[(i + 1) % count] - verts[i])))
            .collect();

        // every other vertex must be strictly behind each edge
        for i in 0..count {
            let edge = verts[(i + 1) % count] - verts[i];
            for (j, v) in verts.iter().enumerate() {
                if j == i || j == (i + 1) % count {
                    continue;
                }
                if m::cross(edge, *v - verts[i]) <= MIN_EDGE_LENGTH * edge.mag() {
                    return Err(ShapeError::NotConvex);
                }
            }
        }

        let centroid = polygon_centroid(&verts);
        Ok(Self {
            vertices: verts,
            normals,
            centroid,
            skin: DEFAULT_POLYGON_SKIN,
        })
    }

    /// Create an axis-aligned rectangle centered on the body origin.
    pub fn new_rect(width: f64, height: f64) -> Result<Self, ShapeError> {
        let hw = check_positive("width", width)? / 2.0;
        let hh = check_positive("height", height)? / 2.0;
        Self::new(&[
            m::Vec2::new(-hw, -hh),
            m::Vec2::new(hw, -hh),
            m::Vec2::new(hw, hh),
            m::Vec2::new(-hw, hh),
        ])
    }

    /// Create a rectangle offset from the body origin and rotated by `angle` radians.
    pub fn new_oriented_rect(
        width: f64,
        height: f64,
        center: m::Vec2,
        angle: f64,
    ) -> Result<Self, ShapeError> {
        let rect = Self::new_rect(width, height)?;
        let pose = m::pose(center, angle);
        let verts: Vec<m::Vec2> = rect.vertices.iter().map(|v| pose * *v).collect();
        Self::new(&verts)
    }

    #[inline]
    pub fn vertices(&self) -> &[m::Vec2] {
        &self.vertices
    }

    /// Outward unit normals, one per edge. Edge `i` goes from vertex `i` to vertex `i + 1`.
    #[inline]
    pub fn normals(&self) -> &[m::Vec2] {
        &self.normals
    }

    #[inline]
    pub fn centroid(&self) -> m::Vec2 {
        self.centroid
    }

    fn mass_data(&self, density: f64) -> MassData {
        // triangle fan from the first vertex to keep the numbers small
        let origin = self.vertices[0];
        let mut area = 0.0;
        let mut center = m::Vec2::zero();
        let mut inertia = 0.0;
        for i in 1..self.vertices.len() - 1 {
            let e1 = self.vertices[i] - origin;
            let e2 = self.vertices[i + 1] - origin;
            let d = m::cross(e1, e2);
            let tri_area = 0.5 * d;
            area += tri_area;
            center += tri_area / 3.0 * (e1 + e2);
            let int_x2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
            let int_y2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
            inertia += (0.25 / 3.0) * d * (int_x2 + int_y2);
        }
        let mass = density * area;
        let local_center = center / area;
        let centroid = origin + local_center;
        // inertia relative to the fan origin, shifted to the body origin
        let inertia = density * inertia
            + mass * (centroid.mag_sq() - local_center.mag_sq());
        MassData {
            mass,
            centroid,
            inertia,
        }
    }
}

impl Edge {
    pub fn new(v1: m::Vec2, v2: m::Vec2) -> Result<Self, ShapeError> {
        if (v2 - v1).mag() < MIN_EDGE_LENGTH {
            return Err(ShapeError::DegenerateEdge(0));
        }
        Ok(Self::new_unchecked(v1, v2, DEFAULT_POLYGON_SKIN))
    }

    fn new_unchecked(v1: m::Vec2, v2: m::Vec2, skin: f64) -> Self {
        let n = m::normalize_or_zero(m::right_normal(v2 - v1));
        Self {
            vertices: [v1, v2],
            normals: [n, -n],
            skin,
        }
    }

    #[inline]
    pub fn vertices(&self) -> &[m::Vec2] {
        &self.vertices
    }

    #[inline]
    pub fn normals(&self) -> &[m::Vec2] {
        &self.normals
    }

    #[inline]
    pub fn centroid(&self) -> m::Vec2 {
        0.5 * (self.vertices[0] + self.vertices[1])
    }
}

impl Chain {
    /// Create a chain of edges through the given vertices.
    /// A looped chain also connects the last vertex back to the first.
    pub fn new(vertices: &[m::Vec2], looped: bool) -> Result<Self, ShapeError> {
        let min = if looped { 3 } else { 2 };
        if vertices.len() < min {
            return Err(ShapeError::TooFewChainVertices(vertices.len()));
        }
        let segment_count = if looped {
            vertices.len()
        } else {
            vertices.len() - 1
        };
        for i in 0..segment_count {
            let next = vertices[(i + 1) % vertices.len()];
            if (next - vertices[i]).mag() < MIN_EDGE_LENGTH {
                return Err(ShapeError::DegenerateEdge(i));
            }
        }
        Ok(Self {
            vertices: vertices.to_vec(),
            looped,
            skin: DEFAULT_POLYGON_SKIN,
        })
    }

    #[inline]
    pub fn vertices(&self) -> &[m::Vec2] {
        &self.vertices
    }

    #[inline]
    pub fn is_looped(&self) -> bool {
        self.looped
    }

    #[inline]
    pub fn segment_count(&self) -> usize {
        if self.looped {
            self.vertices.len()
        } else {
            self.vertices.len() - 1
        }
    }

    /// Get one segment of the chain as an edge.
    pub fn segment(&self, index: usize) -> Edge {
        let v1 = self.vertices[index];
        let v2 = self.vertices[(index + 1) % self.vertices.len()];
        Edge::new_unchecked(v1, v2, self.skin)
    }
}

impl Shape {
    /// A circle centered on the body origin.
    pub fn circle(radius: f64) -> Result<Self, ShapeError> {
        Self::circle_at(m::Vec2::zero(), radius)
    }

    /// A circle offset from the body origin.
    pub fn circle_at(center: m::Vec2, radius: f64) -> Result<Self, ShapeError> {
        Ok(Shape::Circle(Circle {
            center,
            radius: check_positive("radius", radius)?,
            skin: 0.0,
        }))
    }

    pub fn polygon(vertices: &[m::Vec2]) -> Result<Self, ShapeError> {
        Ok(Shape::Polygon(Polygon::new(vertices)?))
    }

    pub fn rect(width: f64, height: f64) -> Result<Self, ShapeError> {
        Ok(Shape::Polygon(Polygon::new_rect(width, height)?))
    }

    pub fn edge(v1: m::Vec2, v2: m::Vec2) -> Result<Self, ShapeError> {
        Ok(Shape::Edge(Edge::new(v1, v2)?))
    }

    pub fn chain(vertices: &[m::Vec2], looped: bool) -> Result<Self, ShapeError> {
        Ok(Shape::Chain(Chain::new(vertices, looped)?))
    }

    /// Replace the skin radius of the shape.
    pub fn with_skin(mut self, skin: f64) -> Self {
        let skin = skin.max(0.0);
        match &mut self {
            Shape::Circle(c) => c.skin = skin,
            Shape::Polygon(p) => p.skin = skin,
            Shape::Edge(e) => e.skin = skin,
            Shape::Chain(c) => c.skin = skin,
        }
        self
    }

    #[inline]
    pub fn skin(&self) -> f64 {
        match self {
            Shape::Circle(c) => c.skin,
            Shape::Polygon(p) => p.skin,
            Shape::Edge(e) => e.skin,
            Shape::Chain(c) => c.skin,
        }
    }

    /// Number of separately collidable children. Only chains have more than one.
    #[inline]
    pub fn child_count(&self) -> usize {
        match self {
            Shape::Chain(c) => c.segment_count(),
            _ => 1,
        }
    }

    /// Get a collidable child. Indices past the child count wrap around.
    pub fn child(&self, index: usize) -> ShapeChild<'_> {
        match self {
            Shape::Circle(c) => ShapeChild::Circle(c),
            Shape::Polygon(p) => ShapeChild::Polygon(p),
            Shape::Edge(e) => ShapeChild::Edge(*e),
            Shape::Chain(c) => ShapeChild::Edge(c.segment(index % c.segment_count())),
        }
    }

    /// Only circles and polygons enclose area and thus have mass.
    #[inline]
    pub fn is_solid(&self) -> bool {
        matches!(self, Shape::Circle(_) | Shape::Polygon(_))
    }

    pub fn area(&self) -> f64 {
        match self {
            Shape::Circle(c) => std::f64::consts::PI * c.radius * c.radius,
            Shape::Polygon(p) => signed_area(&p.vertices),
            Shape::Edge(_) | Shape::Chain(_) => 0.0,
        }
    }

    /// Compute mass, center of mass and rotational inertia about the body origin.
    pub fn mass_data(&self, density: f64) -> MassData {
        match self {
            Shape::Circle(c) => {
                let mass = density * std::f64::consts::PI * c.radius * c.radius;
                MassData {
                    mass,
                    centroid: c.center,
                    inertia: mass * (0.5 * c.radius * c.radius + c.center.mag_sq()),
                }
            }
            Shape::Polygon(p) => p.mass_data(density),
            Shape::Edge(e) => MassData {
                centroid: e.centroid(),
                ..MassData::zero()
            },
            Shape::Chain(_) => MassData::zero(),
        }
    }

    /// Bounding box of one child, including the skin.
    pub fn aabb(&self, child: usize, pose: &m::Pose) -> AABB {
        self.child(child).aabb(pose)
    }
}

impl<'a> ShapeChild<'a> {
    pub fn aabb(&self, pose: &m::Pose) -> AABB {
        match self {
            ShapeChild::Circle(c) => {
                let center = *pose * c.center;
                AABB::new(center, center).padded(c.total_radius())
            }
            ShapeChild::Polygon(p) => {
                AABB::from_points(p.vertices.iter().map(|v| *pose * *v)).padded(p.skin)
            }
            ShapeChild::Edge(e) => {
                AABB::from_points(e.vertices.iter().map(|v| *pose * *v)).padded(e.skin)
            }
        }
    }
}

fn signed_area(verts: &[m::Vec2]) -> f64 {
    let n = verts.len();
    0.5 * (0..n)
        .map(|i| m::cross(verts[i], verts[(i + 1) % n]))
        .sum::<f64>()
}

fn polygon_centroid(verts: &[m::Vec2]) -> m::Vec2 {
    let origin = verts[0];
    let mut area = 0.0;
    let mut center = m::Vec2::zero();
    for i in 1..verts.len() - 1 {
        let e1 = verts[i] - origin;
        let e2 = verts[i + 1] - origin;
        let tri_area = 0.5 * m::cross(e1, e2);
        area += tri_area;
        center += tri_area / 3.0 * (e1 + e2);
    }
    origin + center / area
}

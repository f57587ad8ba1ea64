//! Contact manifold generation for every pair of shape kinds.

use super::{
    manifold::{ContactId, Feature, Manifold, ManifoldKind, ManifoldPoint},
    shape::{Circle, Edge, Polygon, ShapeChild},
};
use crate::math as m;

/// Polygons and edges seen as a list of vertices with outward normals.
#[derive(Clone, Copy)]
struct PolyView<'a> {
    vertices: &'a [m::Vec2],
    normals: &'a [m::Vec2],
    skin: f64,
}

impl<'a> From<&'a Polygon> for PolyView<'a> {
    fn from(p: &'a Polygon) -> Self {
        Self {
            vertices: p.vertices(),
            normals: p.normals(),
            skin: p.skin,
        }
    }
}

impl<'a> From<&'a Edge> for PolyView<'a> {
    fn from(e: &'a Edge) -> Self {
        Self {
            vertices: e.vertices(),
            normals: e.normals(),
            skin: e.skin,
        }
    }
}

impl<'a> PolyView<'a> {
    #[inline]
    fn count(&self) -> usize {
        self.vertices.len()
    }
}

/// Compute the contact manifold between two shapes.
///
/// The manifold normal points from `a` to `b`.
/// Edges never collide with other edges.
pub fn collide(a: ShapeChild, pose_a: &m::Pose, b: ShapeChild, pose_b: &m::Pose) -> Manifold {
    use ShapeChild::*;
    match (a, b) {
        (Circle(ca), Circle(cb)) => collide_circles(ca, pose_a, cb, pose_b),
        (Polygon(pa), Circle(cb)) => collide_polygon_circle(pa.into(), pose_a, cb, pose_b),
        (Edge(ea), Circle(cb)) => collide_polygon_circle((&ea).into(), pose_a, cb, pose_b),
        (Circle(ca), Polygon(pb)) => {
            collide_polygon_circle(pb.into(), pose_b, ca, pose_a).flipped()
        }
        (Circle(ca), Edge(eb)) => {
            collide_polygon_circle((&eb).into(), pose_b, ca, pose_a).flipped()
        }
        (Polygon(pa), Polygon(pb)) => collide_polygons(pa.into(), pose_a, pb.into(), pose_b),
        (Polygon(pa), Edge(eb)) => collide_polygons(pa.into(), pose_a, (&eb).into(), pose_b),
        (Edge(ea), Polygon(pb)) => collide_polygons((&ea).into(), pose_a, pb.into(), pose_b),
        (Edge(_), Edge(_)) => Manifold::empty(),
    }
}

fn collide_circles(a: &Circle, pose_a: &m::Pose, b: &Circle, pose_b: &m::Pose) -> Manifold {
    let p_a = *pose_a * a.center;
    let p_b = *pose_b * b.center;
    let (r_a, r_b) = (a.total_radius(), b.total_radius());

    let dist = p_b - p_a;
    let dist_sq = dist.mag_sq();
    if dist_sq > (r_a + r_b) * (r_a + r_b) {
        return Manifold::empty();
    }

    let mut normal = m::normalize_or_zero(dist);
    if normal == m::Vec2::zero() {
        // concentric circles, any direction works
        normal = m::Vec2::unit_x();
    }
    let c_a = p_a + r_a * normal;
    let c_b = p_b - r_b * normal;

    let mut manifold = Manifold::new(
        ManifoldKind::Circles,
        m::Unit::new_unchecked(normal),
        m::Vec2::zero(),
        a.center,
    );
    manifold.push(ManifoldPoint::new(
        0.5 * (c_a + c_b),
        b.center,
        (c_b - c_a).dot(normal),
        ContactId::CIRCLES,
    ));
    manifold
}

fn collide_polygon_circle(
    poly: PolyView<'_>,
    pose_p: &m::Pose,
    circle: &Circle,
    pose_c: &m::Pose,
) -> Manifold {
    // work in the polygon's local space
    let c_world = *pose_c * circle.center;
    let c = pose_p.inversed() * c_world;
    let radius = poly.skin + circle.total_radius();

    let mut normal_idx = 0;
    let mut separation = f64::MIN;
    for (i, (v, n)) in poly.vertices.iter().zip(poly.normals).enumerate() {
        let s = n.dot(c - *v);
        if s > radius {
            return Manifold::empty();
        }
        if s > separation {
            separation = s;
            normal_idx = i;
        }
    }

    let i1 = normal_idx;
    let i2 = (i1 + 1) % poly.count();
    let v1 = poly.vertices[i1];
    let v2 = poly.vertices[i2];
    let face_normal = poly.normals[i1];

    let (local_normal, local_point, feature) = if separation < m::EPSILON {
        // center is inside the polygon
        (face_normal, 0.5 * (v1 + v2), Feature::Face(i1 as u8))
    } else if (c - v1).dot(v2 - v1) <= 0.0 {
        if (c - v1).mag_sq() > radius * radius {
            return Manifold::empty();
        }
        (vertex_normal(c - v1, face_normal), v1, Feature::Vertex(i1 as u8))
    } else if (c - v2).dot(v1 - v2) <= 0.0 {
        if (c - v2).mag_sq() > radius * radius {
            return Manifold::empty();
        }
        (vertex_normal(c - v2, face_normal), v2, Feature::Vertex(i2 as u8))
    } else {
        let face_center = 0.5 * (v1 + v2);
        if (c - face_center).dot(face_normal) > radius {
            return Manifold::empty();
        }
        (face_normal, face_center, Feature::Face(i1 as u8))
    };

    let normal = pose_p.rotation * local_normal;
    let plane_point = *pose_p * local_point;
    let c_p = c_world + (poly.skin - (c_world - plane_point).dot(normal)) * normal;
    let c_c = c_world - circle.total_radius() * normal;

    let mut manifold = Manifold::new(
        ManifoldKind::FaceA,
        m::Unit::new_unchecked(normal),
        local_normal,
        local_point,
    );
    manifold.push(ManifoldPoint::new(
        0.5 * (c_p + c_c),
        circle.center,
        (c_c - c_p).dot(normal),
        ContactId::new(feature, Feature::Vertex(0)),
    ));
    manifold
}

#[inline]
fn vertex_normal(offset: m::Vec2, fallback: m::Vec2) -> m::Vec2 {
    let n = m::normalize_or_zero(offset);
    if n == m::Vec2::zero() {
        fallback
    } else {
        n
    }
}

/// Find the edge of `p1` with the largest separation from the vertices of `p2`,
/// returning its index and the separation.
fn find_max_separation(
    p1: PolyView<'_>,
    pose1: &m::Pose,
    p2: PolyView<'_>,
    pose2: &m::Pose,
) -> (usize, f64) {
    // edges of p1 are moved into the local space of p2
    let inv2 = pose2.inversed();

    let mut best_idx = 0;
    let mut max_sep = f64::MIN;
    for (i, (v1, n1)) in p1.vertices.iter().zip(p1.normals).enumerate() {
        let v1 = inv2 * (*pose1 * *v1);
        let n = inv2.rotation * (pose1.rotation * *n1);
        // deepest point of p2 along this normal
        let sep = p2
            .vertices
            .iter()
            .map(|v2| n.dot(*v2 - v1))
            .fold(f64::MAX, f64::min);
        if sep > max_sep {
            max_sep = sep;
            best_idx = i;
        }
    }
    (best_idx, max_sep)
}

#[derive(Clone, Copy, Debug)]
struct ClipVertex {
    v: m::Vec2,
    id: ContactId,
}

/// Clip a segment of the incident edge `incident_edge` to the half-plane
/// `dot(normal, x) <= offset`.
/// Points created by the clip are identified by the clipping plane's vertex and the incident edge.
fn clip_segment_to_line(
    v_in: &[ClipVertex; 2],
    normal: m::Vec2,
    offset: f64,
    ref_vertex: usize,
    incident_edge: usize,
) -> Option<[ClipVertex; 2]> {
    let dist0 = normal.dot(v_in[0].v) - offset;
    let dist1 = normal.dot(v_in[1].v) - offset;

    let mut out = [v_in[0]; 2];
    let mut count = 0;
    if dist0 <= 0.0 {
        out[count] = v_in[0];
        count += 1;
    }
    if dist1 <= 0.0 {
        out[count] = v_in[1];
        count += 1;
    }
    if dist0 * dist1 < 0.0 && count < 2 {
        let denom = dist0 - dist1;
        let interp = if denom.abs() > m::EPSILON {
            dist0 / denom
        } else {
            0.5
        };
        out[count] = ClipVertex {
            v: v_in[0].v + interp * (v_in[1].v - v_in[0].v),
            id: ContactId::new(
                Feature::Vertex(ref_vertex as u8),
                Feature::Face(incident_edge as u8),
            ),
        };
        count += 1;
    }

    (count == 2).then_some(out)
}

/// Clip the incident polygon against the reference edge `ref_edge` of `ref_poly`.
/// The resulting manifold treats the reference polygon as shape A.
fn clip_against_reference(
    ref_poly: PolyView<'_>,
    ref_pose: &m::Pose,
    ref_edge: usize,
    inc_poly: PolyView<'_>,
    inc_pose: &m::Pose,
) -> Manifold {
    let total_skin = ref_poly.skin + inc_poly.skin;

    // incident edge is the one most anti-parallel to the reference normal
    let ref_normal_in_inc =
        inc_pose.rotation.reversed() * (ref_pose.rotation * ref_poly.normals[ref_edge]);
    let inc_edge = inc_poly
        .normals
        .iter()
        .enumerate()
        .map(|(i, n)| (i, n.dot(ref_normal_in_inc)))
        .fold((0, f64::MAX), |best, cur| if cur.1 < best.1 { cur } else { best })
        .0;
    let inc1 = inc_edge;
    let inc2 = (inc_edge + 1) % inc_poly.count();
    let incident = [
        ClipVertex {
            v: *inc_pose * inc_poly.vertices[inc1],
            id: ContactId::new(Feature::Face(ref_edge as u8), Feature::Vertex(inc1 as u8)),
        },
        ClipVertex {
            v: *inc_pose * inc_poly.vertices[inc2],
            id: ContactId::new(Feature::Face(ref_edge as u8), Feature::Vertex(inc2 as u8)),
        },
    ];

    let iv1 = ref_edge;
    let iv2 = (ref_edge + 1) % ref_poly.count();
    let local_v1 = ref_poly.vertices[iv1];
    let local_v2 = ref_poly.vertices[iv2];
    let local_tangent = m::normalize_or_zero(local_v2 - local_v1);
    let local_normal = m::right_normal(local_tangent);
    let plane_point = 0.5 * (local_v1 + local_v2);

    let tangent = ref_pose.rotation * local_tangent;
    let normal = m::right_normal(tangent);
    let v1 = *ref_pose * local_v1;
    let v2 = *ref_pose * local_v2;

    let front_offset = normal.dot(v1);
    let side_offset1 = -tangent.dot(v1) + total_skin;
    let side_offset2 = tangent.dot(v2) + total_skin;

    let mut manifold = Manifold::new(
        ManifoldKind::FaceA,
        m::Unit::new_unchecked(normal),
        local_normal,
        plane_point,
    );

    let clipped = match clip_segment_to_line(&incident, -tangent, side_offset1, iv1, inc_edge)
        .and_then(|c| clip_segment_to_line(&c, tangent, side_offset2, iv2, inc_edge))
    {
        Some(c) => c,
        None => return manifold,
    };

    let inc_inverse = inc_pose.inversed();
    for cp in clipped {
        let dist = normal.dot(cp.v) - front_offset;
        if dist <= total_skin {
            let c_ref = cp.v + (ref_poly.skin - dist) * normal;
            let c_inc = cp.v - inc_poly.skin * normal;
            manifold.push(ManifoldPoint::new(
                0.5 * (c_ref + c_inc),
                inc_inverse * cp.v,
                dist - total_skin,
                cp.id,
            ));
        }
    }
    manifold
}

/// Separations closer than this count as equal when picking the reference face.
const REFERENCE_TOLERANCE: f64 = 5e-4;

fn collide_polygons(
    a: PolyView<'_>,
    pose_a: &m::Pose,
    b: PolyView<'_>,
    pose_b: &m::Pose,
) -> Manifold {
    let total_skin = a.skin + b.skin;

    let (edge_a, sep_a) = find_max_separation(a, pose_a, b, pose_b);
    if sep_a > total_skin {
        return Manifold::empty();
    }
    let (edge_b, sep_b) = find_max_separation(b, pose_b, a, pose_a);
    if sep_b > total_skin {
        return Manifold::empty();
    }

    let b_is_reference = if (sep_b - sep_a).abs() <= REFERENCE_TOLERANCE {
        // nearly equal, decide by the faces themselves so that the order of the shapes
        // doesn't change which one is the reference
        let n_a = pose_a.rotation * a.normals[edge_a];
        let n_b = pose_b.rotation * b.normals[edge_b];
        (n_b.y, n_b.x) > (n_a.y, n_a.x)
    } else {
        sep_b > sep_a
    };

    if b_is_reference {
        clip_against_reference(b, pose_b, edge_b, a, pose_a).flipped()
    } else {
        clip_against_reference(a, pose_a, edge_a, b, pose_b)
    }
}

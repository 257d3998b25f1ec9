//! Planar geometry on CPT locations.
//!
//! All coordinates are project coordinates in metres. Hulls are returned
//! counter-clockwise without collinear vertices.

use nalgebra::{Point2, Rotation2, Vector2};

use crate::domain::ValidationError;

/// Distance below which a point counts as lying on a boundary [m].
pub const BOUNDARY_TOLERANCE: f64 = 1e-3;

/// A simple polygon, e.g. a building contour.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    vertices: Vec<Point2<f64>>,
}

impl Polygon {
    /// Build a polygon from its vertices in either winding order.
    ///
    /// # Errors
    ///
    /// `ValidationError::InvalidPolygon` for fewer than 3 vertices or a
    /// non-finite coordinate.
    pub fn new(vertices: Vec<Point2<f64>>) -> Result<Self, ValidationError> {
        if vertices.len() < 3 {
            return Err(ValidationError::InvalidPolygon(format!(
                "at least 3 vertices required, got {}",
                vertices.len()
            )));
        }
        if let Some(p) = vertices.iter().find(|p| !(p.x.is_finite() && p.y.is_finite())) {
            return Err(ValidationError::InvalidPolygon(format!(
                "non-finite vertex ({}, {})",
                p.x, p.y
            )));
        }
        Ok(Self { vertices })
    }

    pub fn vertices(&self) -> &[Point2<f64>] {
        &self.vertices
    }

    /// Whether `p` lies inside the polygon or on its boundary.
    pub fn contains(&self, p: &Point2<f64>) -> bool {
        edges(&self.vertices).any(|(a, b)| segment_distance(p, a, b) <= BOUNDARY_TOLERANCE)
            || winding_contains(&self.vertices, p)
    }
}

/// Even-odd ray casting; boundary points are undefined.
fn winding_contains(vertices: &[Point2<f64>], p: &Point2<f64>) -> bool {
    let mut inside = false;
    for (a, b) in edges(vertices) {
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = a.x + (p.y - a.y) / (b.y - a.y) * (b.x - a.x);
            if p.x < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}

/// Closed edge loop of a vertex list.
fn edges(vertices: &[Point2<f64>]) -> impl Iterator<Item = (&Point2<f64>, &Point2<f64>)> {
    let n = vertices.len();
    (0..n).map(move |i| (&vertices[i], &vertices[(i + 1) % n]))
}

fn cross(o: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    (a - o).perp(&(b - o))
}

/// Convex hull by monotone chain.
///
/// Fewer than 3 distinct points yield the distinct points themselves.
pub fn convex_hull(points: &[Point2<f64>]) -> Vec<Point2<f64>> {
    let mut pts: Vec<Point2<f64>> = points.to_vec();
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let mut lower: Vec<Point2<f64>> = Vec::with_capacity(pts.len());
    for p in &pts {
        while lower.len() >= 2 && cross(&lower[lower.len() - 2], &lower[lower.len() - 1], p) <= 0.0
        {
            lower.pop();
        }
        lower.push(*p);
    }
    let mut upper: Vec<Point2<f64>> = Vec::with_capacity(pts.len());
    for p in pts.iter().rev() {
        while upper.len() >= 2 && cross(&upper[upper.len() - 2], &upper[upper.len() - 1], p) <= 0.0
        {
            upper.pop();
        }
        upper.push(*p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    // all points collinear: keep the two extremes
    if lower.len() < 3 {
        lower.truncate(2);
    }
    lower
}

/// Arithmetic mean of `points`, `None` when empty.
pub fn centroid(points: &[Point2<f64>]) -> Option<Point2<f64>> {
    if points.is_empty() {
        return None;
    }
    let sum = points.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords);
    Some(Point2::from(sum / points.len() as f64))
}

/// Shortest distance from `p` to the segment `a`–`b`.
pub fn segment_distance(p: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 == 0.0 {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

/// Whether `p` lies inside `hull` or within `tolerance` of its boundary.
///
/// Degenerate hulls (a point or a segment) contain only what lies within
/// `tolerance` of them.
pub fn hull_contains(hull: &[Point2<f64>], p: &Point2<f64>, tolerance: f64) -> bool {
    match hull.len() {
        0 => false,
        1 => (p - hull[0]).norm() <= tolerance,
        2 => segment_distance(p, &hull[0], &hull[1]) <= tolerance,
        _ => {
            edges(hull).all(|(a, b)| cross(a, b, p) >= 0.0)
                || edges(hull).any(|(a, b)| segment_distance(p, a, b) <= tolerance)
        }
    }
}

/// Rotate `v` counter-clockwise by `degrees`.
pub fn rotate(v: &Vector2<f64>, degrees: f64) -> Vector2<f64> {
    Rotation2::new(degrees.to_radians()) * v
}

/// Points covering `hull`: its vertices, its edges every `step` metres and
/// an interior raster with the same step.
pub fn sample_hull(hull: &[Point2<f64>], step: f64) -> Vec<Point2<f64>> {
    let mut samples: Vec<Point2<f64>> = hull.to_vec();
    if hull.len() < 2 || step.is_nan() || step <= 0.0 {
        return samples;
    }

    let edge_list: Vec<(&Point2<f64>, &Point2<f64>)> = if hull.len() == 2 {
        vec![(&hull[0], &hull[1])]
    } else {
        edges(hull).collect()
    };
    for (a, b) in edge_list {
        let ab = b - a;
        let n = (ab.norm() / step).ceil() as usize;
        samples.extend((1..n).map(|i| a + ab * (i as f64 / n as f64)));
    }

    if hull.len() >= 3 {
        let (min_x, max_x, min_y, max_y) = hull.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY),
            |(a, b, c, d), p| (a.min(p.x), b.max(p.x), c.min(p.y), d.max(p.y)),
        );
        let mut y = min_y + step / 2.0;
        while y < max_y {
            let mut x = min_x + step / 2.0;
            while x < max_x {
                let p = Point2::new(x, y);
                if hull_contains(hull, &p, 0.0) {
                    samples.push(p);
                }
                x += step;
            }
            y += step;
        }
    }
    samples
}

//! CPT identity and location.

use std::cmp::Ordering;
use std::fmt;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Identifies a CPT within a project (e.g. `"CPT000000012345"`).
///
/// Ids order naturally: digit runs compare by numeric value, so `CPT2`
/// sorts before `CPT10`.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CptId(String);

impl CptId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CptId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CptId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Ord for CptId {
    fn cmp(&self, other: &Self) -> Ordering {
        natural_cmp(&self.0, &other.0).then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for CptId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two strings treating runs of ASCII digits as numbers.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.as_bytes();
    let mut b = b.as_bytes();
    loop {
        match (a.first(), b.first()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let (da, ra) = split_digits(a);
                let (db, rb) = split_digits(b);
                let ta = trim_zeros(da);
                let tb = trim_zeros(db);
                let ord = ta.len().cmp(&tb.len()).then_with(|| ta.cmp(tb));
                if ord != Ordering::Equal {
                    return ord;
                }
                a = ra;
                b = rb;
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(y);
                }
                a = &a[1..];
                b = &b[1..];
            }
        }
    }
}

fn split_digits(s: &[u8]) -> (&[u8], &[u8]) {
    let end = s.iter().position(|c| !c.is_ascii_digit()).unwrap_or(s.len());
    s.split_at(end)
}

fn trim_zeros(s: &[u8]) -> &[u8] {
    let start = s.iter().position(|&c| c != b'0').unwrap_or(s.len());
    &s[start..]
}

/// A located CPT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cpt {
    pub id: CptId,
    /// Horizontal position in project coordinates [m].
    pub location: Option<Point2<f64>>,
    /// Whether the CPT lies inside the building contour, when known.
    pub in_polygon: Option<bool>,
}

impl Cpt {
    pub fn new(id: impl Into<CptId>) -> Self {
        Self {
            id: id.into(),
            location: None,
            in_polygon: None,
        }
    }

    pub fn at(id: impl Into<CptId>, x: f64, y: f64) -> Self {
        Self {
            id: id.into(),
            location: Some(Point2::new(x, y)),
            in_polygon: None,
        }
    }

    pub fn with_polygon_flag(mut self, in_polygon: bool) -> Self {
        self.in_polygon = Some(in_polygon);
        self
    }

    /// The location if both coordinates are finite.
    pub fn usable_location(&self) -> Option<Point2<f64>> {
        self.location.filter(|p| p.x.is_finite() && p.y.is_finite())
    }
}

//! Spacing rules deciding whether a set of CPT locations may act together.
//!
//! Two rules are provided:
//!
//! - [`MaxPairwiseDistance`]: every pair of members lies within a fixed
//!   distance. Used while growing candidates.
//! - [`CentreToCentre`]: squares of side `spacing`, rotated with the CPT grid
//!   and centred on each member, cover the convex hull of the members. The
//!   spacing follows from the spread of the calculated bearing capacity, see
//!   [`validate_centre_to_centre`].

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::geometry::{self, BOUNDARY_TOLERANCE};

/// A level-independent admissibility check on member locations.
pub trait SpacingRule {
    fn name(&self) -> &'static str;

    /// Whether `members` satisfy the rule. Sets of 0 or 1 member always do.
    fn admits(&self, members: &[Point2<f64>]) -> bool;
}

/// All pairwise member distances are at most `max_distance` metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaxPairwiseDistance {
    pub max_distance: f64,
}

impl SpacingRule for MaxPairwiseDistance {
    fn name(&self) -> &'static str {
        "max_pairwise_distance"
    }

    fn admits(&self, members: &[Point2<f64>]) -> bool {
        members.iter().enumerate().all(|(i, a)| {
            members[i + 1..]
                .iter()
                .all(|b| (a - b).norm() <= self.max_distance + BOUNDARY_TOLERANCE)
        })
    }
}

/// Rotated squares of side `spacing` around each member cover their hull.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CentreToCentre {
    pub spacing: f64,
    /// Grid rotation in degrees, counter-clockwise.
    pub rotation: f64,
}

impl CentreToCentre {
    fn covers(&self, members: &[Point2<f64>], p: &Point2<f64>) -> bool {
        let half = self.spacing / 2.0 + BOUNDARY_TOLERANCE;
        members.iter().any(|c| {
            let local = geometry::rotate(&(p - c), -self.rotation);
            local.x.abs() <= half && local.y.abs() <= half
        })
    }
}

impl SpacingRule for CentreToCentre {
    fn name(&self) -> &'static str {
        "centre_to_centre"
    }

    fn admits(&self, members: &[Point2<f64>]) -> bool {
        let hull = geometry::convex_hull(members);
        geometry::sample_hull(&hull, self.spacing / 10.0)
            .iter()
            .all(|p| self.covers(members, p))
    }
}

/// Maximum centre-to-centre distance class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CtcClass {
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "20m")]
    M20,
    #[serde(rename = "25m")]
    M25,
}

impl CtcClass {
    /// The class allowed for a given outlier ratio, `None` above 50 %.
    pub fn for_outlier_ratio(ratio: f64) -> Option<Self> {
        if ratio <= 0.30 {
            Some(CtcClass::M25)
        } else if ratio <= 0.40 {
            Some(CtcClass::M20)
        } else if ratio <= 0.50 {
            Some(CtcClass::M15)
        } else {
            None
        }
    }

    /// Spacing in metres.
    pub fn spacing(self) -> f64 {
        match self {
            CtcClass::M15 => 15.0,
            CtcClass::M20 => 20.0,
            CtcClass::M25 => 25.0,
        }
    }
}

/// Outcome of the centre-to-centre check for one cluster at one level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CentreToCentreValidation {
    /// `max |R_c_cal,i - mean| / mean`; infinite when undefined.
    pub outlier_ratio: f64,
    /// Class required by the outlier ratio.
    pub required: Option<CtcClass>,
    pub validation_15: bool,
    pub validation_20: bool,
    pub validation_25: bool,
}

impl CentreToCentreValidation {
    pub fn passes(&self, class: CtcClass) -> bool {
        match class {
            CtcClass::M15 => self.validation_15,
            CtcClass::M20 => self.validation_20,
            CtcClass::M25 => self.validation_25,
        }
    }

    /// The members are spaced within the class their spread requires.
    pub fn passed(&self) -> bool {
        self.required.is_some_and(|class| self.passes(class))
    }
}

/// Run the centre-to-centre check for members with calculated capacities
/// `r_c_cal`. An undefined capacity fails the check.
pub fn validate_centre_to_centre(
    locations: &[Point2<f64>],
    r_c_cal: &[Option<f64>],
    rotation: f64,
) -> CentreToCentreValidation {
    let outlier_ratio = outlier_ratio(r_c_cal);
    let check = |class: CtcClass| {
        CentreToCentre {
            spacing: class.spacing(),
            rotation,
        }
        .admits(locations)
    };
    CentreToCentreValidation {
        outlier_ratio,
        required: CtcClass::for_outlier_ratio(outlier_ratio),
        validation_15: check(CtcClass::M15),
        validation_20: check(CtcClass::M20),
        validation_25: check(CtcClass::M25),
    }
}

fn outlier_ratio(values: &[Option<f64>]) -> f64 {
    let Some(values) = values.iter().copied().collect::<Option<Vec<f64>>>() else {
        return f64::INFINITY;
    };
    if values.is_empty() {
        return f64::INFINITY;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if mean <= 0.0 {
        return f64::INFINITY;
    }
    values
        .iter()
        .map(|v| (v - mean).abs() / mean)
        .fold(0.0, f64::max)
}

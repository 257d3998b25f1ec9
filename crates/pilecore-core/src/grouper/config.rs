//! Typed grouper configuration.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::domain::ValidationError;
use crate::geometry::Polygon;

/// Criteria ranking admissible candidates, first criterion dominant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizeCriterion {
    /// Prefer the shallowest valid pile tip level (shorter piles).
    MinimumPileLevel,
    /// Prefer larger groups.
    NumberOfCpts,
    /// Prefer the longest run of consecutive valid levels.
    NumberOfConsecutivePileLevels,
    /// Prefer groups passing the centre-to-centre check.
    CentreToCentreCheck,
}

impl OptimizeCriterion {
    pub fn defaults() -> Vec<Self> {
        vec![
            OptimizeCriterion::MinimumPileLevel,
            OptimizeCriterion::NumberOfCpts,
            OptimizeCriterion::NumberOfConsecutivePileLevels,
        ]
    }
}

fn default_resolution() -> f64 {
    0.5
}

fn default_max_cpt_distance() -> f64 {
    25.0
}

/// Configuration of the spatial grouper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrouperConfig {
    /// ULS pile load [kN]. Required.
    #[serde(default)]
    pub pile_load_uls: Option<f64>,
    /// Fraction of CPTs used as growth seeds, in `(0, 1]`.
    #[serde(default = "default_resolution")]
    pub resolution: f64,
    /// Maximum distance between any two members of a group [m].
    #[serde(default = "default_max_cpt_distance")]
    pub max_cpt_distance: f64,
    #[serde(default = "OptimizeCriterion::defaults")]
    pub optimize_result_by: Vec<OptimizeCriterion>,
    #[serde(default)]
    pub include_centre_to_centre_check: bool,
    /// Rotation of the centre-to-centre squares [degrees].
    #[serde(default)]
    pub cpt_grid_rotation: f64,
    /// Building contour; CPTs outside it are excluded.
    #[serde(default)]
    pub building_polygon: Option<Vec<Point2<f64>>>,
}

impl Default for GrouperConfig {
    fn default() -> Self {
        Self {
            pile_load_uls: None,
            resolution: default_resolution(),
            max_cpt_distance: default_max_cpt_distance(),
            optimize_result_by: OptimizeCriterion::defaults(),
            include_centre_to_centre_check: false,
            cpt_grid_rotation: 0.0,
            building_polygon: None,
        }
    }
}

impl GrouperConfig {
    pub fn new(pile_load_uls: f64) -> Self {
        Self::default().with_pile_load(pile_load_uls)
    }

    pub fn with_pile_load(mut self, pile_load_uls: f64) -> Self {
        self.pile_load_uls = Some(pile_load_uls);
        self
    }

    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_max_cpt_distance(mut self, distance: f64) -> Self {
        self.max_cpt_distance = distance;
        self
    }

    pub fn with_optimize_result_by(mut self, criteria: Vec<OptimizeCriterion>) -> Self {
        self.optimize_result_by = criteria;
        self
    }

    pub fn with_centre_to_centre_check(mut self, enabled: bool) -> Self {
        self.include_centre_to_centre_check = enabled;
        self
    }

    pub fn with_grid_rotation(mut self, degrees: f64) -> Self {
        self.cpt_grid_rotation = degrees;
        self
    }

    pub fn with_building_polygon(mut self, vertices: Vec<Point2<f64>>) -> Self {
        self.building_polygon = Some(vertices);
        self
    }

    /// The required load, validated.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when unset, `InvalidLoad` when not finite and positive.
    pub fn required_load(&self) -> Result<f64, ValidationError> {
        let load = self.pile_load_uls.ok_or(ValidationError::InvalidConfig {
            field: "pile_load_uls",
            reason: "is required".to_string(),
        })?;
        if !load.is_finite() || load <= 0.0 {
            return Err(ValidationError::InvalidLoad { value: load });
        }
        Ok(load)
    }

    /// The building contour, validated.
    ///
    /// # Errors
    ///
    /// `InvalidPolygon` for a degenerate contour.
    pub fn polygon(&self) -> Result<Option<Polygon>, ValidationError> {
        self.building_polygon
            .clone()
            .map(Polygon::new)
            .transpose()
    }

    /// Check every option. Run by the grouper before any work.
    ///
    /// # Errors
    ///
    /// The first violated constraint.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.required_load()?;
        if !(self.resolution > 0.0 && self.resolution <= 1.0) {
            return Err(ValidationError::InvalidConfig {
                field: "resolution",
                reason: format!("must be in (0, 1], got {}", self.resolution),
            });
        }
        if !(self.max_cpt_distance.is_finite() && self.max_cpt_distance > 0.0) {
            return Err(ValidationError::InvalidConfig {
                field: "max_cpt_distance",
                reason: format!("must be finite and positive, got {}", self.max_cpt_distance),
            });
        }
        if !self.cpt_grid_rotation.is_finite() {
            return Err(ValidationError::InvalidConfig {
                field: "cpt_grid_rotation",
                reason: format!("must be finite, got {}", self.cpt_grid_rotation),
            });
        }
        for (i, criterion) in self.optimize_result_by.iter().enumerate() {
            if self.optimize_result_by[..i].contains(criterion) {
                return Err(ValidationError::InvalidConfig {
                    field: "optimize_result_by",
                    reason: format!("lists {criterion:?} more than once"),
                });
            }
        }
        self.polygon()?;
        Ok(())
    }
}

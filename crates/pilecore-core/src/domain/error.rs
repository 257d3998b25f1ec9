//! Domain-level error taxonomy for the PileCore post-processing core.

use super::cluster::ClusterId;
use super::cpt::CptId;
use super::level::PileTipLevel;

/// Errors produced by input validation.
///
/// Every variant names the offending input and the constraint it violates.
/// Validation errors are never retried internally.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("too few CPTs for clustering: found {found}, at least {required} required")]
    TooFewCpts { found: usize, required: usize },

    #[error(
        "too few CPTs with usable locations: {usable} usable, {excluded} excluded, \
         at least {required} required"
    )]
    TooFewUsableCpts {
        usable: usize,
        excluded: usize,
        required: usize,
    },

    #[error("CPTs {first} and {second} share the same location ({x}, {y})")]
    DuplicateLocation {
        first: CptId,
        second: CptId,
        x: f64,
        y: f64,
    },

    #[error("duplicate CPT id: {0}")]
    DuplicateCptId(CptId),

    #[error("CPT {cpt} has more than one row at pile tip level {level}")]
    DuplicatePileTipLevel { cpt: CptId, level: PileTipLevel },

    #[error("CPT {cpt} has a non-finite pile tip level: {value}")]
    InvalidPileTipLevel { cpt: CptId, value: f64 },

    #[error("invalid grouper configuration: {field} {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("invalid required load: {value} kN (must be finite and positive)")]
    InvalidLoad { value: f64 },

    #[error("invalid polygon: {0}")]
    InvalidPolygon(String),
}

/// Core errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("no bearing results for CPT: {0}")]
    UnknownCpt(CptId),

    #[error("unknown cluster: {0}")]
    UnknownCluster(ClusterId),

    #[error("cluster {0} has no members")]
    EmptyCluster(ClusterId),

    #[error("unknown column '{column}' in {table} table")]
    UnknownColumn { table: &'static str, column: String },

    #[error("case mismatch: {0}")]
    CaseMismatch(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_few_cpts_names_count_and_constraint() {
        let err = CoreError::from(ValidationError::TooFewCpts {
            found: 1,
            required: 2,
        });
        let msg = err.to_string();
        assert!(msg.contains("validation error"));
        assert!(msg.contains("found 1"));
        assert!(msg.contains("at least 2"));
    }

    #[test]
    fn test_duplicate_location_names_both_cpts() {
        let err = ValidationError::DuplicateLocation {
            first: CptId::new("CPT01"),
            second: CptId::new("CPT02"),
            x: 10.0,
            y: 20.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("CPT01"));
        assert!(msg.contains("CPT02"));
    }

    #[test]
    fn test_invalid_load_error() {
        let err = ValidationError::InvalidLoad { value: -5.0 };
        assert!(err.to_string().contains("-5"));
        assert!(err.to_string().contains("required load"));
    }

    #[test]
    fn test_unknown_column_error() {
        let err = CoreError::UnknownColumn {
            table: "max bearing",
            column: "R_x".to_string(),
        };
        assert!(err.to_string().contains("R_x"));
        assert!(err.to_string().contains("max bearing"));
    }
}

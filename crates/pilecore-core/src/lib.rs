//! PileCore Core Library
//!
//! Client-side post-processing of pile bearing capacity results: the CPT
//! result store, spatial grouping of CPTs, cluster statistics and the
//! max-bearing envelope.

pub mod aggregate;
pub mod analysis;
pub mod cases;
pub mod domain;
pub mod envelope;
pub mod geometry;
pub mod grouper;
pub mod obs;
pub mod reporting;
pub mod store;
pub mod table;
pub mod telemetry;

pub use domain::{
    natural_cmp, BearingColumn, BearingRow, Cluster, ClusterId, CoreError, Cpt,
    CptBearingResults, CptId, PileTipLevel, Result, ValidationError,
};

pub use aggregate::{
    ClusterAggregator, ClusterResult, ClusterResultSeries, ClusterResultSet,
    MAX_VARIATION_COEFFICIENT,
};
pub use analysis::{Analysis, AnalysisOutcome};
pub use cases::{CaseRecord, CaseSet};
pub use envelope::{
    EnvelopeConfig, EnvelopeExtractor, LevelMaximum, MaxBearingResults, MaxBearingRow,
    MaxBearingSeries, Origin, OriginCategory, TiePolicy,
};
pub use geometry::Polygon;
pub use grouper::{
    CentreToCentre, CentreToCentreValidation, ClusterSummary, CtcClass, ExcludedCpt,
    ExclusionReason, Grouper, GrouperConfig, Grouping, LevelCandidate, LevelCandidates,
    MaxPairwiseDistance, OptimizeCriterion, SpacingRule,
};
pub use reporting::{write_envelope_json, EnvelopeArtifact, EnvelopeRowArtifact};
pub use store::ResultStore;
pub use table::{Cell, PivotTable, Table};

pub use obs::{
    emit_analysis_finished, emit_analysis_started, emit_cluster_level_skipped,
    emit_cpt_excluded, emit_envelope_built, emit_grouping_finished, AnalysisSpan,
};
pub use telemetry::init_tracing;

/// Version of the PileCore core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

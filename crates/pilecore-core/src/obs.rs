//! Structured observability hooks for analysis runs.
//!
//! This module provides:
//! - Run-scoped tracing spans via the `AnalysisSpan` RAII guard
//! - Emission functions for pipeline events: run start/finish, CPT
//!   exclusion, grouping, skipped cluster levels and envelope extraction
//!
//! Every event carries an `event = "<domain>.<action>"` field.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{ClusterId, CptId, PileTipLevel};
use crate::grouper::ExclusionReason;

/// RAII guard that enters a run-scoped tracing span for the duration of an
/// analysis.
///
/// # Example
///
/// ```ignore
/// let _span = AnalysisSpan::enter(store.run_id());
/// // every event below is associated with run_id
/// ```
pub struct AnalysisSpan {
    _span: tracing::span::EnteredSpan,
}

impl AnalysisSpan {
    pub fn enter(run_id: Uuid) -> Self {
        let span = tracing::info_span!("pilecore.analysis", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: analysis started over `n_cpts` CPTs.
pub fn emit_analysis_started(run_id: Uuid, n_cpts: usize, mode: &str) {
    info!(
        event = "analysis.started",
        run_id = %run_id,
        n_cpts = n_cpts,
        mode = mode,
    );
}

pub fn emit_analysis_finished(run_id: Uuid, duration_ms: u64, n_clusters: usize) {
    info!(
        event = "analysis.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        n_clusters = n_clusters,
    );
}

/// Emit event: a CPT was left out of grouping (warning level).
pub fn emit_cpt_excluded(cpt: &CptId, reason: ExclusionReason) {
    warn!(event = "grouper.cpt_excluded", cpt = %cpt, reason = %reason);
}

pub fn emit_grouping_finished(
    candidates: usize,
    incoherent: usize,
    selected: usize,
    excluded: usize,
) {
    info!(
        event = "grouper.finished",
        candidates = candidates,
        incoherent = incoherent,
        selected = selected,
        excluded = excluded,
    );
}

/// Emit event: a cluster has no result at `level` because a member lacks it.
pub fn emit_cluster_level_skipped(cluster: ClusterId, level: PileTipLevel) {
    debug!(
        event = "aggregate.level_skipped",
        cluster = %cluster,
        pile_tip_level = %level,
    );
}

pub fn emit_envelope_built(n_cpts: usize, n_levels: usize, group_origins: usize) {
    info!(
        event = "envelope.built",
        n_cpts = n_cpts,
        n_levels = n_levels,
        group_origins = group_origins,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_span_create() {
        let _span = AnalysisSpan::enter(Uuid::new_v4());
    }
}

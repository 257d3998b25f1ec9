//! Analysis orchestrator: store → grouper → aggregator → envelope.

use std::time::Instant;

use uuid::Uuid;

use crate::aggregate::{ClusterAggregator, ClusterResultSet};
use crate::domain::{Cluster, Result};
use crate::envelope::{EnvelopeConfig, EnvelopeExtractor, MaxBearingResults};
use crate::grouper::{Grouper, GrouperConfig, Grouping};
use crate::obs::{self, AnalysisSpan};
use crate::store::ResultStore;

/// Everything one analysis run produced.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub run_id: Uuid,
    /// Present when the clusters were computed locally.
    pub grouping: Option<Grouping>,
    /// The clusters the envelope was built over.
    pub clusters: Vec<Cluster>,
    pub cluster_results: ClusterResultSet,
    pub envelope: MaxBearingResults,
}

/// One analysis over an immutable result store.
#[derive(Debug, Clone, Copy)]
pub struct Analysis<'a> {
    store: &'a ResultStore,
}

impl<'a> Analysis<'a> {
    pub fn new(store: &'a ResultStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &'a ResultStore {
        self.store
    }

    /// Group the CPTs locally and build the envelope over the selected
    /// configuration.
    ///
    /// # Errors
    ///
    /// Any configuration or input validation failure. No partial outcome is
    /// returned.
    pub fn run_local(
        &self,
        grouper: &GrouperConfig,
        envelope: &EnvelopeConfig,
    ) -> Result<AnalysisOutcome> {
        let run_id = self.store.run_id();
        let _span = AnalysisSpan::enter(run_id);
        let started = Instant::now();
        obs::emit_analysis_started(run_id, self.store.len(), "local");

        let grouper = Grouper::new(grouper.clone())?;
        let grouping = grouper.group(self.store)?;
        let clusters: Vec<Cluster> = grouping.selected_clusters().into_iter().cloned().collect();
        let required_load = grouper.aggregator().required_load();
        let cluster_results = grouping.results().clone();
        let envelope = EnvelopeExtractor::new(required_load, envelope)?.extract(
            self.store,
            &clusters,
            &cluster_results,
        )?;

        obs::emit_analysis_finished(run_id, elapsed_ms(started), clusters.len());
        Ok(AnalysisOutcome {
            run_id,
            grouping: Some(grouping),
            clusters,
            cluster_results,
            envelope,
        })
    }

    /// Build the envelope over clusters supplied by the caller, e.g. decoded
    /// from a remote grouper response.
    ///
    /// # Errors
    ///
    /// `InvalidLoad` for a non-positive load, `UnknownCpt` when a cluster
    /// names a CPT missing from the store.
    pub fn run_with_clusters(
        &self,
        clusters: Vec<Cluster>,
        required_load: f64,
        envelope: &EnvelopeConfig,
    ) -> Result<AnalysisOutcome> {
        let run_id = self.store.run_id();
        let _span = AnalysisSpan::enter(run_id);
        let started = Instant::now();
        obs::emit_analysis_started(run_id, self.store.len(), "clusters");

        let extractor = EnvelopeExtractor::new(required_load, envelope)?;
        let cluster_results =
            ClusterAggregator::new(required_load)?.aggregate_all(&clusters, self.store)?;
        let envelope = extractor.extract(self.store, &clusters, &cluster_results)?;

        obs::emit_analysis_finished(run_id, elapsed_ms(started), clusters.len());
        Ok(AnalysisOutcome {
            run_id,
            grouping: None,
            clusters,
            cluster_results,
            envelope,
        })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

//! Spatial Grouper.
//!
//! Partitions the located CPTs of a [`ResultStore`] into clusters that may act
//! together:
//!
//! 1. CPTs without a usable location, or outside the building contour, are
//!    excluded and reported as [`ExcludedCpt`].
//! 2. Candidates are grown nearest-first from a set of seeds while every
//!    pairwise member distance stays within `max_cpt_distance`.
//! 3. A candidate whose convex hull contains another CPT is inadmissible.
//! 4. Each admissible candidate is aggregated per pile tip level and,
//!    optionally, checked for centre-to-centre spacing.
//! 5. Candidates are ranked by `optimize_result_by`; the rank is the cluster
//!    id. The configuration is the greedy disjoint selection in rank order.

mod candidates;
pub mod config;
mod ranking;
pub mod spacing;

use std::fmt;

use serde::Serialize;

use crate::aggregate::{ClusterAggregator, ClusterResultSeries, ClusterResultSet};
use crate::domain::{
    BearingColumn, Cluster, ClusterId, CptId, PileTipLevel, Result, ValidationError,
};
use crate::geometry::Polygon;
use crate::obs;
use crate::store::ResultStore;

use candidates::Site;
use ranking::RankKey;

pub use config::{GrouperConfig, OptimizeCriterion};
pub use spacing::{
    validate_centre_to_centre, CentreToCentre, CentreToCentreValidation, CtcClass,
    MaxPairwiseDistance, SpacingRule,
};

/// Minimum number of CPTs needed to form a group.
pub const MIN_CPTS: usize = 2;

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Why a CPT took no part in grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    MissingLocation,
    OutsidePolygon,
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::MissingLocation => f.write_str("missing or non-finite location"),
            ExclusionReason::OutsidePolygon => f.write_str("outside building polygon"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExcludedCpt {
    pub cpt: CptId,
    pub reason: ExclusionReason,
}

/// Level-independent description of one admissible cluster. The hull of an
/// admissible cluster never contains another CPT.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub id: ClusterId,
    pub members: Vec<CptId>,
    pub n_cpts: usize,
    pub shallowest_valid_level: Option<PileTipLevel>,
    pub deepest_valid_level: Option<PileTipLevel>,
    pub consecutive_valid_levels: usize,
    /// Mean capacity reaches the load at some level.
    pub load_check: bool,
    /// Variation coefficient within the limit at some level.
    pub variation_check: bool,
    /// Centre-to-centre check passed at some level; `None` when not run.
    pub centre_to_centre_check: Option<bool>,
    pub selected: bool,
}

/// One candidate defined at a level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelCandidate {
    pub cluster: ClusterId,
    pub mean: f64,
    pub valid: bool,
}

/// Every candidate aggregated at one pile tip level. An empty list means
/// no admissible group at this level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelCandidates {
    pub pile_tip_level: PileTipLevel,
    pub candidates: Vec<LevelCandidate>,
    /// Selected clusters valid at this level.
    pub selected: Vec<ClusterId>,
}

impl LevelCandidates {
    pub fn valid(&self) -> impl Iterator<Item = &LevelCandidate> {
        self.candidates.iter().filter(|c| c.valid)
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Result of one grouping run.
#[derive(Debug, Clone)]
pub struct Grouping {
    clusters: Vec<Cluster>,
    summaries: Vec<ClusterSummary>,
    results: ClusterResultSet,
    levels: Vec<LevelCandidates>,
    selected: Vec<ClusterId>,
    excluded: Vec<ExcludedCpt>,
}

impl Grouping {
    /// All admissible clusters in rank order.
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn cluster(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(id.0)
    }

    pub fn summaries(&self) -> &[ClusterSummary] {
        &self.summaries
    }

    pub fn summary(&self, id: ClusterId) -> Option<&ClusterSummary> {
        self.summaries.get(id.0)
    }

    /// Aggregated results of every admissible cluster.
    pub fn results(&self) -> &ClusterResultSet {
        &self.results
    }

    /// Per-level candidates, shallow to deep.
    pub fn levels(&self) -> &[LevelCandidates] {
        &self.levels
    }

    pub fn level(&self, level: PileTipLevel) -> Option<&LevelCandidates> {
        self.levels.iter().find(|l| l.pile_tip_level == level)
    }

    pub fn selected_ids(&self) -> &[ClusterId] {
        &self.selected
    }

    /// The selected configuration, in rank order.
    pub fn selected_clusters(&self) -> Vec<&Cluster> {
        self.selected.iter().filter_map(|id| self.cluster(*id)).collect()
    }

    pub fn excluded(&self) -> &[ExcludedCpt] {
        &self.excluded
    }
}

// ---------------------------------------------------------------------------
// Grouper
// ---------------------------------------------------------------------------

/// Spatial grouper over one validated configuration.
#[derive(Debug, Clone)]
pub struct Grouper {
    config: GrouperConfig,
    polygon: Option<Polygon>,
    aggregator: ClusterAggregator,
}

impl Grouper {
    /// # Errors
    ///
    /// The first configuration constraint violated.
    pub fn new(config: GrouperConfig) -> std::result::Result<Self, ValidationError> {
        config.validate()?;
        let aggregator = ClusterAggregator::new(config.required_load()?)?;
        let polygon = config.polygon()?;
        Ok(Self {
            config,
            polygon,
            aggregator,
        })
    }

    pub fn config(&self) -> &GrouperConfig {
        &self.config
    }

    pub fn aggregator(&self) -> &ClusterAggregator {
        &self.aggregator
    }

    /// Group the CPTs of `store`.
    ///
    /// # Errors
    ///
    /// `TooFewCpts` for fewer than two CPTs, `DuplicateLocation` for two
    /// CPTs at the same spot, `TooFewUsableCpts` when exclusions leave fewer
    /// than two. No partial grouping is returned.
    pub fn group(&self, store: &ResultStore) -> Result<Grouping> {
        if store.len() < MIN_CPTS {
            return Err(ValidationError::TooFewCpts {
                found: store.len(),
                required: MIN_CPTS,
            }
            .into());
        }

        let (sites, excluded) = self.partition(store)?;
        let (members, rejected) = candidates::enumerate(
            &sites,
            self.config.resolution,
            &MaxPairwiseDistance {
                max_distance: self.config.max_cpt_distance,
            },
        );

        let mut evaluated = Vec::with_capacity(members.len());
        for (i, m) in members.into_iter().enumerate() {
            let ids: Vec<CptId> = m.iter().map(|&s| sites[s].id.clone()).collect();
            let mut series = self.aggregator.combine(ClusterId(i), &ids, store)?;
            if self.config.include_centre_to_centre_check {
                self.check_centre_to_centre(&mut series, &sites, &m, store);
            }
            evaluated.push((RankKey::new(m, &series), series));
        }

        let keys: Vec<RankKey> = evaluated.iter().map(|(k, _)| k.clone()).collect();
        let ranked = ranking::rank(&keys, &self.config.optimize_result_by);
        let chosen = ranking::select_disjoint(&keys, &ranked, sites.len());

        let mut slots: Vec<Option<(RankKey, ClusterResultSeries)>> =
            evaluated.into_iter().map(Some).collect();
        let mut clusters = Vec::with_capacity(ranked.len());
        let mut summaries = Vec::with_capacity(ranked.len());
        let mut all_series = Vec::with_capacity(ranked.len());
        let mut selected = Vec::with_capacity(chosen.len());
        for (rank, &i) in ranked.iter().enumerate() {
            let Some((key, mut series)) = slots[i].take() else {
                continue;
            };
            let id = ClusterId(rank);
            series.relabel(id);
            let is_selected = chosen.contains(&i);
            if is_selected {
                selected.push(id);
                for level in series.skipped_levels() {
                    obs::emit_cluster_level_skipped(id, *level);
                }
            }
            clusters.push(Cluster::from_store(id, series.members().to_vec(), store)?);
            summaries.push(self.summarize(id, &key, &series, is_selected));
            all_series.push(series);
        }

        let results = ClusterResultSet::new(self.aggregator.required_load(), all_series);
        let levels = level_candidates(store, &results, &selected);
        obs::emit_grouping_finished(clusters.len(), rejected, selected.len(), excluded.len());

        Ok(Grouping {
            clusters,
            summaries,
            results,
            levels,
            selected,
            excluded,
        })
    }

    fn partition(&self, store: &ResultStore) -> Result<(Vec<Site>, Vec<ExcludedCpt>)> {
        let mut sites: Vec<Site> = Vec::with_capacity(store.len());
        let mut excluded = Vec::new();
        for result in store.iter() {
            let cpt = result.cpt();
            let reason = match cpt.usable_location() {
                None => Some(ExclusionReason::MissingLocation),
                Some(_) if cpt.in_polygon == Some(false) => Some(ExclusionReason::OutsidePolygon),
                Some(p) if self.polygon.as_ref().is_some_and(|poly| !poly.contains(&p)) => {
                    Some(ExclusionReason::OutsidePolygon)
                }
                Some(p) => {
                    if let Some(other) = sites.iter().find(|s| s.location == p) {
                        return Err(ValidationError::DuplicateLocation {
                            first: other.id.clone(),
                            second: cpt.id.clone(),
                            x: p.x,
                            y: p.y,
                        }
                        .into());
                    }
                    sites.push(Site {
                        id: cpt.id.clone(),
                        location: p,
                    });
                    None
                }
            };
            if let Some(reason) = reason {
                obs::emit_cpt_excluded(&cpt.id, reason);
                excluded.push(ExcludedCpt {
                    cpt: cpt.id.clone(),
                    reason,
                });
            }
        }

        if sites.len() < MIN_CPTS {
            return Err(ValidationError::TooFewUsableCpts {
                usable: sites.len(),
                excluded: excluded.len(),
                required: MIN_CPTS,
            }
            .into());
        }
        Ok((sites, excluded))
    }

    fn check_centre_to_centre(
        &self,
        series: &mut ClusterResultSeries,
        sites: &[Site],
        members: &[usize],
        store: &ResultStore,
    ) {
        let locations: Vec<_> = members.iter().map(|&s| sites[s].location).collect();
        for row in series.rows_mut() {
            let r_c_cal: Vec<Option<f64>> = members
                .iter()
                .map(|&s| {
                    store
                        .get(&sites[s].id)
                        .and_then(|r| r.value(row.pile_tip_level, BearingColumn::RCCal))
                })
                .collect();
            row.apply_centre_to_centre(validate_centre_to_centre(
                &locations,
                &r_c_cal,
                self.config.cpt_grid_rotation,
            ));
        }
    }

    fn summarize(
        &self,
        id: ClusterId,
        key: &RankKey,
        series: &ClusterResultSeries,
        selected: bool,
    ) -> ClusterSummary {
        ClusterSummary {
            id,
            members: series.members().to_vec(),
            n_cpts: series.members().len(),
            shallowest_valid_level: key.shallowest_valid,
            deepest_valid_level: series.valid_levels().last(),
            consecutive_valid_levels: key.consecutive_valid,
            load_check: series.rows().any(|r| r.load_check),
            variation_check: series.rows().any(|r| r.variation_check),
            centre_to_centre_check: self
                .config
                .include_centre_to_centre_check
                .then_some(key.centre_to_centre),
            selected,
        }
    }
}

fn level_candidates(
    store: &ResultStore,
    results: &ClusterResultSet,
    chosen: &[ClusterId],
) -> Vec<LevelCandidates> {
    store
        .pile_tip_levels()
        .into_iter()
        .map(|level| {
            let candidates: Vec<LevelCandidate> = results
                .iter()
                .filter_map(|s| {
                    s.get(level).map(|r| LevelCandidate {
                        cluster: s.cluster_id(),
                        mean: r.mean,
                        valid: r.valid,
                    })
                })
                .collect();
            let selected = candidates
                .iter()
                .filter(|c| c.valid && chosen.contains(&c.cluster))
                .map(|c| c.cluster)
                .collect();
            LevelCandidates {
                pile_tip_level: level,
                candidates,
                selected,
            }
        })
        .collect()
}

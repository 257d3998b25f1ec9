//! Cluster Result Aggregator.
//!
//! Combines the net design bearing capacity of a cluster's members into one
//! statistical result per pile tip level. A level is only aggregated when
//! every member defines `R_c_d_net` there; other levels are recorded as
//! skipped for that cluster and do not affect the rest.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use serde::Serialize;

use crate::domain::{
    BearingColumn, Cluster, ClusterId, CoreError, CptId, PileTipLevel, Result, ValidationError,
};
use crate::grouper::spacing::CentreToCentreValidation;
use crate::obs;
use crate::store::ResultStore;
use crate::table::{Cell, Table};

/// Upper bound of the variation coefficient for a trusted cluster result.
pub const MAX_VARIATION_COEFFICIENT: f64 = 0.12;

/// Combined result of one cluster at one pile tip level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterResult {
    pub pile_tip_level: PileTipLevel,
    pub n_cpts: usize,
    /// Mean `R_c_d_net` [kN].
    pub mean: f64,
    /// Sample standard deviation of `R_c_d_net`; zero for a single member.
    pub std: f64,
    /// `std / mean`; infinite when the mean is not positive.
    pub variation_coefficient: f64,
    pub min: f64,
    pub max: f64,
    /// Member with the lowest `R_c_d_net`.
    pub nominal_cpt: CptId,
    /// Mean `F_nk_d` when every member defines it.
    pub mean_f_nk_d: Option<f64>,
    pub load_check: bool,
    pub variation_check: bool,
    /// Centre-to-centre validation, when it was requested.
    pub centre_to_centre: Option<CentreToCentreValidation>,
    pub valid: bool,
}

impl ClusterResult {
    fn from_values(
        pile_tip_level: PileTipLevel,
        values: &[(&CptId, f64, Option<f64>)],
        required_load: f64,
    ) -> Option<Self> {
        let (nominal, &(_, min, _)) = values
            .iter()
            .enumerate()
            .min_by(|a, b| a.1 .1.total_cmp(&b.1 .1).then(a.0.cmp(&b.0)))?;
        let n = values.len();
        let mean = values.iter().map(|v| v.1).sum::<f64>() / n as f64;
        let std = if n > 1 {
            let ss: f64 = values.iter().map(|v| (v.1 - mean).powi(2)).sum();
            (ss / (n - 1) as f64).sqrt()
        } else {
            0.0
        };
        let variation_coefficient = if mean > 0.0 { std / mean } else { f64::INFINITY };
        let max = values.iter().map(|v| v.1).fold(f64::NEG_INFINITY, f64::max);
        let mean_f_nk_d = values
            .iter()
            .map(|v| v.2)
            .collect::<Option<Vec<f64>>>()
            .map(|f| f.iter().sum::<f64>() / n as f64);

        let load_check = mean >= required_load;
        let variation_check = variation_coefficient <= MAX_VARIATION_COEFFICIENT;
        Some(Self {
            pile_tip_level,
            n_cpts: n,
            mean,
            std,
            variation_coefficient,
            min,
            max,
            nominal_cpt: values[nominal].0.clone(),
            mean_f_nk_d,
            load_check,
            variation_check,
            centre_to_centre: None,
            valid: load_check && variation_check,
        })
    }

    pub(crate) fn apply_centre_to_centre(&mut self, validation: CentreToCentreValidation) {
        self.valid = self.load_check && self.variation_check && validation.passed();
        self.centre_to_centre = Some(validation);
    }
}

/// Per-level results of one cluster, shallow to deep.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterResultSeries {
    cluster: ClusterId,
    members: Vec<CptId>,
    rows: BTreeMap<PileTipLevel, ClusterResult>,
    skipped_levels: Vec<PileTipLevel>,
}

impl ClusterResultSeries {
    pub fn cluster_id(&self) -> ClusterId {
        self.cluster
    }

    pub fn members(&self) -> &[CptId] {
        &self.members
    }

    pub fn get(&self, level: PileTipLevel) -> Option<&ClusterResult> {
        self.rows.get(&level)
    }

    pub fn rows(&self) -> impl Iterator<Item = &ClusterResult> {
        self.rows.values()
    }

    pub(crate) fn rows_mut(&mut self) -> impl Iterator<Item = &mut ClusterResult> {
        self.rows.values_mut()
    }

    pub(crate) fn relabel(&mut self, id: ClusterId) {
        self.cluster = id;
    }

    /// Levels defined by some but not all members.
    pub fn skipped_levels(&self) -> &[PileTipLevel] {
        &self.skipped_levels
    }

    pub fn valid_levels(&self) -> impl Iterator<Item = PileTipLevel> + '_ {
        self.rows.values().filter(|r| r.valid).map(|r| r.pile_tip_level)
    }

    /// Longest run of adjacent levels that are all valid. A skipped level
    /// breaks the run like an invalid one.
    pub fn consecutive_valid_levels(&self) -> usize {
        let levels: BTreeMap<PileTipLevel, bool> = self
            .rows
            .iter()
            .map(|(level, r)| (*level, r.valid))
            .chain(self.skipped_levels.iter().map(|level| (*level, false)))
            .collect();
        let mut best = 0;
        let mut run = 0;
        for valid in levels.values() {
            run = if *valid { run + 1 } else { 0 };
            best = best.max(run);
        }
        best
    }

    fn restrict_to(&mut self, admitted: &[PileTipLevel]) {
        self.rows.retain(|level, _| admitted.binary_search(level).is_ok());
        self.skipped_levels.retain(|level| admitted.binary_search(level).is_ok());
    }
}

/// Aggregates clusters against one required load.
#[derive(Debug, Clone, Copy)]
pub struct ClusterAggregator {
    required_load: f64,
}

impl ClusterAggregator {
    /// # Errors
    ///
    /// `ValidationError::InvalidLoad` unless the load is finite and positive.
    pub fn new(required_load: f64) -> std::result::Result<Self, ValidationError> {
        if !required_load.is_finite() || required_load <= 0.0 {
            return Err(ValidationError::InvalidLoad {
                value: required_load,
            });
        }
        Ok(Self { required_load })
    }

    pub fn required_load(&self) -> f64 {
        self.required_load
    }

    /// Aggregate one cluster over every level any member defines, or over
    /// its admitted levels when it is restricted.
    ///
    /// # Errors
    ///
    /// `CoreError::UnknownCpt` for a member absent from the store.
    pub fn aggregate(
        &self,
        cluster: &Cluster,
        store: &ResultStore,
    ) -> Result<ClusterResultSeries> {
        let mut series = self.combine(cluster.id(), cluster.members(), store)?;
        if let Some(admitted) = cluster.admitted_levels() {
            series.restrict_to(admitted);
        }
        for level in &series.skipped_levels {
            obs::emit_cluster_level_skipped(series.cluster, *level);
        }
        Ok(series)
    }

    /// Aggregate a member list without logging skipped levels.
    pub(crate) fn combine(
        &self,
        id: ClusterId,
        member_ids: &[CptId],
        store: &ResultStore,
    ) -> Result<ClusterResultSeries> {
        let members = member_ids
            .iter()
            .map(|id| store.try_get(id))
            .collect::<Result<Vec<_>>>()?;
        let levels: BTreeSet<PileTipLevel> =
            members.iter().flat_map(|m| m.pile_tip_levels()).collect();

        let mut rows = BTreeMap::new();
        let mut skipped_levels = Vec::new();
        for level in levels {
            let values = members
                .iter()
                .map(|m| {
                    m.value(level, BearingColumn::RCDNet)
                        .map(|v| (m.id(), v, m.value(level, BearingColumn::FNkD)))
                })
                .collect::<Option<Vec<_>>>();
            match values.and_then(|v| ClusterResult::from_values(level, &v, self.required_load)) {
                Some(result) => {
                    rows.insert(level, result);
                }
                None => skipped_levels.push(level),
            }
        }

        Ok(ClusterResultSeries {
            cluster: id,
            members: member_ids.to_vec(),
            rows,
            skipped_levels,
        })
    }

    /// # Errors
    ///
    /// As [`ClusterAggregator::aggregate`].
    pub fn aggregate_all(
        &self,
        clusters: &[Cluster],
        store: &ResultStore,
    ) -> Result<ClusterResultSet> {
        let series = clusters
            .iter()
            .map(|c| self.aggregate(c, store))
            .collect::<Result<Vec<_>>>()?;
        Ok(ClusterResultSet::new(self.required_load, series))
    }
}

/// Aggregated results of several clusters, keyed by cluster id.
#[derive(Debug, Clone)]
pub struct ClusterResultSet {
    required_load: f64,
    series: BTreeMap<ClusterId, ClusterResultSeries>,
    table: OnceLock<Table>,
}

impl ClusterResultSet {
    pub(crate) fn new(
        required_load: f64,
        series: impl IntoIterator<Item = ClusterResultSeries>,
    ) -> Self {
        Self {
            required_load,
            series: series.into_iter().map(|s| (s.cluster, s)).collect(),
            table: OnceLock::new(),
        }
    }

    pub fn required_load(&self) -> f64 {
        self.required_load
    }

    pub fn get(&self, id: ClusterId) -> Option<&ClusterResultSeries> {
        self.series.get(&id)
    }

    /// # Errors
    ///
    /// `CoreError::UnknownCluster` when the set holds no such cluster.
    pub fn try_get(&self, id: ClusterId) -> Result<&ClusterResultSeries> {
        self.series.get(&id).ok_or(CoreError::UnknownCluster(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClusterResultSeries> {
        self.series.values()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Valid results at `level`, by cluster id. Untrusted results (variation
    /// coefficient above the limit) never appear here.
    pub fn eligible_at(&self, level: PileTipLevel) -> Vec<(ClusterId, &ClusterResult)> {
        self.series
            .iter()
            .filter_map(|(id, s)| s.get(level).filter(|r| r.valid).map(|r| (*id, r)))
            .collect()
    }

    /// One row per (cluster, aggregated level). Built once.
    pub fn to_table(&self) -> &Table {
        self.table.get_or_init(|| {
            let mut table = Table::new(
                "cluster results",
                &[
                    "cluster_id",
                    "pile_tip_level",
                    "number_of_cpts",
                    "net_design_bearing_capacity",
                    "standard_deviation",
                    "variation_coefficient",
                    "minimum",
                    "maximum",
                    "nominal_cpt",
                    "design_negative_friction",
                    "load_check",
                    "variation_check",
                    "group_centre_to_centre_validation_15",
                    "group_centre_to_centre_validation_20",
                    "group_centre_to_centre_validation_25",
                    "validity",
                ],
            );
            for series in self.series.values() {
                for r in series.rows() {
                    let ctc = |f: fn(&CentreToCentreValidation) -> bool| {
                        r.centre_to_centre.as_ref().map_or(Cell::Empty, |c| f(c).into())
                    };
                    table.push_row(vec![
                        series.cluster.0.into(),
                        r.pile_tip_level.into(),
                        r.n_cpts.into(),
                        r.mean.into(),
                        r.std.into(),
                        r.variation_coefficient.into(),
                        r.min.into(),
                        r.max.into(),
                        r.nominal_cpt.as_str().into(),
                        r.mean_f_nk_d.into(),
                        r.load_check.into(),
                        r.variation_check.into(),
                        ctc(|c| c.validation_15),
                        ctc(|c| c.validation_20),
                        ctc(|c| c.validation_25),
                        r.valid.into(),
                    ]);
                }
            }
            table
        })
    }
}

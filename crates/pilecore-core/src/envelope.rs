//! Max-Bearing Envelope Extractor.
//!
//! For every CPT and pile tip level, picks the highest net design bearing
//! capacity among the CPT's own result and the valid results of the clusters
//! it belongs to, and records where the value came from.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use nalgebra::Point2;
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::aggregate::ClusterResultSet;
use crate::domain::{
    BearingColumn, Cluster, ClusterId, CoreError, Cpt, CptId, PileTipLevel, Result,
    ValidationError,
};
use crate::obs;
use crate::store::ResultStore;
use crate::table::{Cell, PivotTable, Table};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Which origin wins when a single CPT and a group reach exactly the same
/// value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TiePolicy {
    #[default]
    PreferGroup,
    PreferSingle,
}

impl FromStr for TiePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "prefer_group" | "group" => Ok(TiePolicy::PreferGroup),
            "prefer_single" | "single" => Ok(TiePolicy::PreferSingle),
            other => Err(format!(
                "unknown tie policy '{other}' (expected prefer_group or prefer_single)"
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvelopeConfig {
    #[serde(default)]
    pub tie_policy: TiePolicy,
}

impl EnvelopeConfig {
    pub fn with_tie_policy(mut self, tie_policy: TiePolicy) -> Self {
        self.tie_policy = tie_policy;
        self
    }
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginCategory {
    Single,
    Group,
}

impl fmt::Display for OriginCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginCategory::Single => f.write_str("single"),
            OriginCategory::Group => f.write_str("group"),
        }
    }
}

/// The entity a maximum was taken from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Single(CptId),
    Group(ClusterId),
}

impl Origin {
    pub fn category(&self) -> OriginCategory {
        match self {
            Origin::Single(_) => OriginCategory::Single,
            Origin::Group(_) => OriginCategory::Group,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Single(id) => write!(f, "CPT:{id}"),
            Origin::Group(id) => write!(f, "Group:{id}"),
        }
    }
}

impl Serialize for Origin {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Envelope value of one CPT at one level. Without an eligible origin the
/// row has no value, no origin, and is invalid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaxBearingRow {
    pub pile_tip_level: PileTipLevel,
    /// Maximum `R_c_d_net` [kN].
    pub value: Option<f64>,
    /// `F_nk_d` of the origin [kN].
    #[serde(rename = "F_nk_d")]
    pub f_nk_d: Option<f64>,
    pub origin: Option<Origin>,
    /// `value >= required load`.
    pub valid: bool,
}

impl MaxBearingRow {
    pub fn category(&self) -> Option<OriginCategory> {
        self.origin.as_ref().map(Origin::category)
    }
}

/// Envelope rows of one CPT, shallow to deep.
#[derive(Debug, Clone, PartialEq)]
pub struct MaxBearingSeries {
    cpt: Cpt,
    rows: BTreeMap<PileTipLevel, MaxBearingRow>,
}

impl MaxBearingSeries {
    pub fn id(&self) -> &CptId {
        &self.cpt.id
    }

    pub fn location(&self) -> Option<Point2<f64>> {
        self.cpt.location
    }

    pub fn get(&self, level: PileTipLevel) -> Option<&MaxBearingRow> {
        self.rows.get(&level)
    }

    pub fn rows(&self) -> impl Iterator<Item = &MaxBearingRow> {
        self.rows.values()
    }
}

/// Maximum across every CPT at one level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelMaximum {
    pub pile_tip_level: PileTipLevel,
    pub value: Option<f64>,
    pub test_id: Option<CptId>,
    pub origin: Option<Origin>,
    pub valid: bool,
}

/// The envelope of one analysis run, keyed by CPT id.
#[derive(Debug, Clone)]
pub struct MaxBearingResults {
    run_id: Uuid,
    required_load: f64,
    tie_policy: TiePolicy,
    levels: Vec<PileTipLevel>,
    series: BTreeMap<CptId, MaxBearingSeries>,
    table: OnceLock<Table>,
}

const TABLE_NAME: &str = "max bearing";

impl MaxBearingResults {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn required_load(&self) -> f64 {
        self.required_load
    }

    pub fn tie_policy(&self) -> TiePolicy {
        self.tie_policy
    }

    /// Levels of every series, shallow to deep.
    pub fn levels(&self) -> &[PileTipLevel] {
        &self.levels
    }

    pub fn get(&self, id: &CptId) -> Option<&MaxBearingSeries> {
        self.series.get(id)
    }

    /// # Errors
    ///
    /// `CoreError::UnknownCpt` when the envelope has no series for `id`.
    pub fn try_get(&self, id: &CptId) -> Result<&MaxBearingSeries> {
        self.series
            .get(id)
            .ok_or_else(|| CoreError::UnknownCpt(id.clone()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &CptId> {
        self.series.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MaxBearingSeries> {
        self.series.values()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Per level, the highest value over all CPTs. Equal values keep the
    /// first CPT in natural order.
    pub fn level_maxima(&self) -> Vec<LevelMaximum> {
        self.levels
            .iter()
            .map(|&level| {
                let mut best: Option<(&MaxBearingSeries, &MaxBearingRow, f64)> = None;
                for series in self.iter() {
                    let Some(row) = series.get(level) else {
                        continue;
                    };
                    let Some(value) = row.value else {
                        continue;
                    };
                    if best.map_or(true, |b| value > b.2) {
                        best = Some((series, row, value));
                    }
                }
                match best {
                    Some((series, row, value)) => LevelMaximum {
                        pile_tip_level: level,
                        value: Some(value),
                        test_id: Some(series.id().clone()),
                        origin: row.origin.clone(),
                        valid: row.valid,
                    },
                    None => LevelMaximum {
                        pile_tip_level: level,
                        value: None,
                        test_id: None,
                        origin: None,
                        valid: false,
                    },
                }
            })
            .collect()
    }

    /// Long-format projection, one row per (CPT, level). Built on first use
    /// and reused afterwards.
    pub fn to_table(&self) -> &Table {
        self.table.get_or_init(|| {
            let mut table = Table::new(
                TABLE_NAME,
                &[
                    "test_id",
                    "x",
                    "y",
                    "pile_tip_level",
                    "value",
                    "F_nk_d",
                    "origin",
                    "category",
                    "validity",
                ],
            );
            for series in self.series.values() {
                let location = series.location();
                for row in series.rows() {
                    table.push_row(vec![
                        series.id().as_str().into(),
                        location.map(|p| p.x).into(),
                        location.map(|p| p.y).into(),
                        row.pile_tip_level.into(),
                        row.value.into(),
                        row.f_nk_d.into(),
                        row.origin
                            .as_ref()
                            .map_or(Cell::Empty, |o| o.to_string().into()),
                        row.category()
                            .map_or(Cell::Empty, |c| c.to_string().into()),
                        row.valid.into(),
                    ]);
                }
            }
            table
        })
    }

    /// `value` or `F_nk_d` pivoted to levels × CPTs.
    ///
    /// # Errors
    ///
    /// `CoreError::UnknownColumn` for any other column.
    pub fn results_per_cpt(&self, column: &str) -> Result<PivotTable> {
        let pick: fn(&MaxBearingRow) -> Option<f64> = match column {
            "value" | "R_c_d_net" => |r| r.value,
            "F_nk_d" => |r| r.f_nk_d,
            other => {
                return Err(CoreError::UnknownColumn {
                    table: TABLE_NAME,
                    column: other.to_string(),
                })
            }
        };
        Ok(PivotTable {
            column: column.to_string(),
            levels: self.levels.clone(),
            keys: self.ids().cloned().collect(),
            values: self
                .levels
                .iter()
                .map(|level| {
                    self.iter()
                        .map(|s| s.get(*level).and_then(pick))
                        .collect()
                })
                .collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct EnvelopeExtractor {
    required_load: f64,
    tie_policy: TiePolicy,
}

struct Contender {
    value: f64,
    f_nk_d: Option<f64>,
    origin: Origin,
}

impl EnvelopeExtractor {
    /// # Errors
    ///
    /// `ValidationError::InvalidLoad` unless the load is finite and positive.
    pub fn new(
        required_load: f64,
        config: &EnvelopeConfig,
    ) -> std::result::Result<Self, ValidationError> {
        if !required_load.is_finite() || required_load <= 0.0 {
            return Err(ValidationError::InvalidLoad {
                value: required_load,
            });
        }
        Ok(Self {
            required_load,
            tie_policy: config.tie_policy,
        })
    }

    /// Build the envelope of every CPT in `store` over the given clusters.
    ///
    /// Only cluster results that are valid at a level compete there, so
    /// untrusted results never reach the maximum.
    ///
    /// # Errors
    ///
    /// `CoreError::UnknownCluster` for a cluster without results.
    pub fn extract(
        &self,
        store: &ResultStore,
        clusters: &[Cluster],
        results: &ClusterResultSet,
    ) -> Result<MaxBearingResults> {
        let mut clusters: Vec<&Cluster> = clusters.iter().collect();
        clusters.sort_by_key(|c| c.id());
        for cluster in &clusters {
            results.try_get(cluster.id())?;
        }

        let levels = store.pile_tip_levels();
        let mut group_origins = 0;
        let mut series = BTreeMap::new();
        for cpt in store.iter() {
            let memberships: Vec<&Cluster> = clusters
                .iter()
                .copied()
                .filter(|c| c.contains(cpt.id()))
                .collect();
            let mut rows = BTreeMap::new();
            for &level in &levels {
                let single = cpt.value(level, BearingColumn::RCDNet).map(|value| Contender {
                    value,
                    f_nk_d: cpt.value(level, BearingColumn::FNkD),
                    origin: Origin::Single(cpt.id().clone()),
                });
                let groups = memberships.iter().filter_map(|c| {
                    results
                        .get(c.id())
                        .and_then(|s| s.get(level))
                        .filter(|r| r.valid)
                        .map(|r| Contender {
                            value: r.mean,
                            f_nk_d: r.mean_f_nk_d,
                            origin: Origin::Group(c.id()),
                        })
                });
                let row = self.select(level, single, groups);
                if matches!(row.origin, Some(Origin::Group(_))) {
                    group_origins += 1;
                }
                rows.insert(level, row);
            }
            series.insert(
                cpt.id().clone(),
                MaxBearingSeries {
                    cpt: cpt.cpt().clone(),
                    rows,
                },
            );
        }

        obs::emit_envelope_built(series.len(), levels.len(), group_origins);
        Ok(MaxBearingResults {
            run_id: store.run_id(),
            required_load: self.required_load,
            tie_policy: self.tie_policy,
            levels,
            series,
            table: OnceLock::new(),
        })
    }

    /// Groups arrive in ascending id order; a later group only wins when
    /// strictly greater.
    fn select(
        &self,
        level: PileTipLevel,
        single: Option<Contender>,
        groups: impl Iterator<Item = Contender>,
    ) -> MaxBearingRow {
        let best_group = groups.fold(None, |best: Option<Contender>, c| match best {
            Some(b) if b.value >= c.value => Some(b),
            _ => Some(c),
        });
        let winner = match (single, best_group) {
            (Some(s), Some(g)) => {
                let group_wins = match self.tie_policy {
                    TiePolicy::PreferGroup => g.value >= s.value,
                    TiePolicy::PreferSingle => g.value > s.value,
                };
                Some(if group_wins { g } else { s })
            }
            (s, g) => s.or(g),
        };
        match winner {
            Some(c) => MaxBearingRow {
                pile_tip_level: level,
                value: Some(c.value),
                f_nk_d: c.f_nk_d,
                valid: c.value >= self.required_load,
                origin: Some(c.origin),
            },
            None => MaxBearingRow {
                pile_tip_level: level,
                value: None,
                f_nk_d: None,
                origin: None,
                valid: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ClusterAggregator;
    use crate::domain::{BearingRow, CptBearingResults};

    fn level(nap: f64) -> PileTipLevel {
        PileTipLevel::from_nap(nap).unwrap()
    }

    fn cpt(id: &str, x: f64, values: &[(f64, f64)]) -> CptBearingResults {
        CptBearingResults::new(
            Cpt::at(id, x, 0.0),
            None,
            values
                .iter()
                .map(|(l, v)| BearingRow::empty(level(*l)).with_r_c_d_net(*v)),
        )
        .unwrap()
    }

    fn run(
        store: &ResultStore,
        groups: &[&[&str]],
        load: f64,
        policy: TiePolicy,
    ) -> MaxBearingResults {
        let clusters: Vec<Cluster> = groups
            .iter()
            .enumerate()
            .map(|(i, ids)| {
                Cluster::from_store(ClusterId(i), ids.iter().map(|s| CptId::from(*s)), store)
                    .unwrap()
            })
            .collect();
        let results = ClusterAggregator::new(load)
            .unwrap()
            .aggregate_all(&clusters, store)
            .unwrap();
        EnvelopeExtractor::new(load, &EnvelopeConfig::default().with_tie_policy(policy))
            .unwrap()
            .extract(store, &clusters, &results)
            .unwrap()
    }

    #[test]
    fn test_group_mean_beats_weaker_single() {
        let store = ResultStore::new(vec![
            cpt("A", 0.0, &[(-15.0, 500.0)]),
            cpt("B", 5.0, &[(-15.0, 520.0)]),
        ])
        .unwrap();
        let envelope = run(&store, &[&["A", "B"]], 400.0, TiePolicy::PreferGroup);
        let a = envelope.get(&CptId::from("A")).unwrap().get(level(-15.0)).unwrap();
        assert_eq!(a.value, Some(510.0));
        assert_eq!(a.origin, Some(Origin::Group(ClusterId(0))));
        assert_eq!(a.category(), Some(OriginCategory::Group));
        let b = envelope.get(&CptId::from("B")).unwrap().get(level(-15.0)).unwrap();
        assert_eq!(b.value, Some(520.0));
        assert_eq!(b.origin, Some(Origin::Single(CptId::from("B"))));
    }

    #[test]
    fn test_untrusted_group_excluded_from_maximum() {
        let store = ResultStore::new(vec![
            cpt("A", 0.0, &[(-15.0, 300.0)]),
            cpt("B", 5.0, &[(-15.0, 700.0)]),
        ])
        .unwrap();
        let envelope = run(&store, &[&["A", "B"]], 400.0, TiePolicy::PreferGroup);
        let a = envelope.get(&CptId::from("A")).unwrap().get(level(-15.0)).unwrap();
        assert_eq!(a.value, Some(300.0));
        assert_eq!(a.origin, Some(Origin::Single(CptId::from("A"))));
        assert!(!a.valid);
    }

    #[test]
    fn test_tie_policy_decides_exact_ties() {
        let store = ResultStore::new(vec![
            cpt("A", 0.0, &[(-15.0, 500.0)]),
            cpt("B", 5.0, &[(-15.0, 500.0)]),
        ])
        .unwrap();
        let id = CptId::from("A");

        let envelope = run(&store, &[&["A", "B"]], 400.0, TiePolicy::PreferGroup);
        let row = envelope.get(&id).unwrap().get(level(-15.0)).unwrap();
        assert_eq!(row.origin, Some(Origin::Group(ClusterId(0))));

        let envelope = run(&store, &[&["A", "B"]], 400.0, TiePolicy::PreferSingle);
        let row = envelope.get(&id).unwrap().get(level(-15.0)).unwrap();
        assert_eq!(row.origin, Some(Origin::Single(id.clone())));
    }

    #[test]
    fn test_equal_groups_resolve_to_lowest_id() {
        let store = ResultStore::new(vec![
            cpt("A", 0.0, &[(-15.0, 500.0)]),
            cpt("B", 5.0, &[(-15.0, 520.0)]),
            cpt("C", 10.0, &[(-15.0, 520.0)]),
        ])
        .unwrap();
        // Group 0 = {A, B} and group 1 = {A, C} both average 510.
        let groups: &[&[&str]] = &[&["A", "B"], &["A", "C"]];
        let envelope = run(&store, groups, 400.0, TiePolicy::PreferGroup);
        let row = envelope.get(&CptId::from("A")).unwrap().get(level(-15.0)).unwrap();
        assert_eq!(row.origin, Some(Origin::Group(ClusterId(0))));
    }

    #[test]
    fn test_no_origin_is_invalid_not_zero() {
        let store = ResultStore::new(vec![
            cpt("A", 0.0, &[(-15.0, 500.0), (-18.0, 650.0)]),
            cpt("B", 5.0, &[(-15.0, 520.0)]),
        ])
        .unwrap();
        let envelope = run(&store, &[], 400.0, TiePolicy::PreferGroup);
        let row = envelope.get(&CptId::from("B")).unwrap().get(level(-18.0)).unwrap();
        assert_eq!(row.value, None);
        assert_eq!(row.origin, None);
        assert!(!row.valid);
    }

    #[test]
    fn test_level_maxima_and_table() {
        let store = ResultStore::new(vec![
            cpt("A", 0.0, &[(-12.0, 380.0), (-15.0, 500.0)]),
            cpt("B", 5.0, &[(-15.0, 520.0)]),
        ])
        .unwrap();
        let envelope = run(&store, &[], 400.0, TiePolicy::PreferGroup);
        let maxima = envelope.level_maxima();
        assert_eq!(maxima.len(), 2);
        assert_eq!(maxima[0].value, Some(380.0));
        assert!(!maxima[0].valid);
        assert_eq!(maxima[1].value, Some(520.0));
        assert_eq!(maxima[1].test_id, Some(CptId::from("B")));

        let table = envelope.to_table();
        assert_eq!(table.len(), 4);
        let origins = table.column("origin").unwrap();
        assert_eq!(origins[0].as_str(), Some("CPT:A"));
        assert!(table.column("R_x").is_err());
    }

    #[test]
    fn test_results_per_cpt_rejects_unknown_column() {
        let store = ResultStore::new(vec![cpt("A", 0.0, &[(-15.0, 500.0)])]).unwrap();
        let envelope = run(&store, &[], 400.0, TiePolicy::PreferGroup);
        let pivot = envelope.results_per_cpt("value").unwrap();
        assert_eq!(pivot.get(level(-15.0), &CptId::from("A")), Some(500.0));
        assert!(matches!(
            envelope.results_per_cpt("R_b_cal"),
            Err(CoreError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_tie_policy_parsing() {
        assert_eq!("prefer-single".parse::<TiePolicy>(), Ok(TiePolicy::PreferSingle));
        assert_eq!("prefer_group".parse::<TiePolicy>(), Ok(TiePolicy::PreferGroup));
        assert!("coin_flip".parse::<TiePolicy>().is_err());
    }
}

//! Clusters of CPTs acting together.

use std::fmt;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use super::cpt::CptId;
use super::error::{CoreError, Result};
use super::level::PileTipLevel;
use crate::geometry;
use crate::store::ResultStore;

/// Identifies a cluster within one analysis run.
///
/// For locally grouped clusters the id is the candidate's rank, so lower ids
/// are preferred configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(pub usize);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A non-empty set of CPTs with its derived centroid and footprint.
///
/// Members are referenced by id and kept in natural order. A cluster acts at
/// every level its members share unless it is restricted to a set of
/// admitted levels, as for sub-groups formed by the remote grouper.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    id: ClusterId,
    members: Vec<CptId>,
    centroid: Option<Point2<f64>>,
    footprint: Vec<Point2<f64>>,
    admitted_levels: Option<Vec<PileTipLevel>>,
}

impl Cluster {
    /// Build a cluster from member ids, deriving geometry from the store.
    ///
    /// Duplicate member ids are collapsed. Members without a usable location
    /// do not contribute to centroid or footprint.
    ///
    /// # Errors
    ///
    /// `CoreError::EmptyCluster` without members, `CoreError::UnknownCpt`
    /// for a member absent from the store.
    pub fn from_store(
        id: ClusterId,
        members: impl IntoIterator<Item = CptId>,
        store: &ResultStore,
    ) -> Result<Self> {
        let mut members: Vec<CptId> = members.into_iter().collect();
        members.sort();
        members.dedup();
        if members.is_empty() {
            return Err(CoreError::EmptyCluster(id));
        }

        let mut locations = Vec::with_capacity(members.len());
        for member in &members {
            let results = store.try_get(member)?;
            if let Some(p) = results.cpt().usable_location() {
                locations.push(p);
            }
        }

        Ok(Self {
            id,
            centroid: geometry::centroid(&locations),
            footprint: geometry::convex_hull(&locations),
            members,
            admitted_levels: None,
        })
    }

    /// Restrict the cluster to `levels`. Results at other levels are
    /// dropped during aggregation.
    pub fn with_admitted_levels(mut self, levels: impl IntoIterator<Item = PileTipLevel>) -> Self {
        let mut levels: Vec<PileTipLevel> = levels.into_iter().collect();
        levels.sort();
        levels.dedup();
        self.admitted_levels = Some(levels);
        self
    }

    /// Admitted levels, shallow to deep; `None` when unrestricted.
    pub fn admitted_levels(&self) -> Option<&[PileTipLevel]> {
        self.admitted_levels.as_deref()
    }

    pub fn admits(&self, level: PileTipLevel) -> bool {
        self.admitted_levels
            .as_ref()
            .map_or(true, |levels| levels.binary_search(&level).is_ok())
    }

    pub fn id(&self) -> ClusterId {
        self.id
    }

    pub fn members(&self) -> &[CptId] {
        &self.members
    }

    pub fn contains(&self, cpt: &CptId) -> bool {
        self.members.binary_search(cpt).is_ok()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn centroid(&self) -> Option<Point2<f64>> {
        self.centroid
    }

    /// Convex hull of the located members, counter-clockwise.
    pub fn footprint(&self) -> &[Point2<f64>] {
        &self.footprint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BearingRow, Cpt, CptBearingResults, PileTipLevel};

    fn store() -> ResultStore {
        let level = PileTipLevel::from_nap(-15.0).unwrap();
        let results = ["CPT10", "CPT2", "CPT1"]
            .iter()
            .enumerate()
            .map(|(i, id)| {
                CptBearingResults::new(
                    Cpt::at(*id, i as f64 * 4.0, 0.0),
                    None,
                    vec![BearingRow::empty(level).with_r_c_d_net(500.0)],
                )
                .unwrap()
            })
            .collect::<Vec<_>>();
        ResultStore::new(results).unwrap()
    }

    #[test]
    fn test_members_naturally_ordered_and_deduplicated() {
        let cluster = Cluster::from_store(
            ClusterId(0),
            ["CPT10", "CPT1", "CPT2", "CPT1"].map(CptId::from),
            &store(),
        )
        .unwrap();
        let names: Vec<&str> = cluster.members().iter().map(CptId::as_str).collect();
        assert_eq!(names, vec!["CPT1", "CPT2", "CPT10"]);
        assert!(cluster.contains(&CptId::from("CPT2")));
        assert_eq!(cluster.centroid(), Some(Point2::new(4.0, 0.0)));
        assert_eq!(cluster.footprint().len(), 2);
    }

    #[test]
    fn test_empty_cluster_rejected() {
        let err = Cluster::from_store(ClusterId(3), Vec::new(), &store()).unwrap_err();
        assert!(matches!(err, CoreError::EmptyCluster(ClusterId(3))));
    }

    #[test]
    fn test_unknown_member_rejected() {
        let err = Cluster::from_store(ClusterId(0), [CptId::from("CPT9")], &store()).unwrap_err();
        assert!(matches!(err, CoreError::UnknownCpt(_)));
    }

    #[test]
    fn test_admitted_levels_sorted_and_checked() {
        let level = |nap| PileTipLevel::from_nap(nap).unwrap();
        let cluster = Cluster::from_store(ClusterId(0), [CptId::from("CPT1")], &store()).unwrap();
        assert!(cluster.admits(level(-18.0)));
        assert_eq!(cluster.admitted_levels(), None);

        let cluster = cluster.with_admitted_levels([level(-18.0), level(-15.0), level(-15.0)]);
        assert_eq!(cluster.admitted_levels(), Some(&[level(-15.0), level(-18.0)][..]));
        assert!(cluster.admits(level(-15.0)));
        assert!(!cluster.admits(level(-12.0)));
    }
}

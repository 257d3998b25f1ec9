//! Decoding of the grouper response into clusters.

use serde::Deserialize;
use serde_json::Value;

use pilecore_core::{
    Cluster, ClusterId, ClusterResultSet, CptId, PileTipLevel, ResultStore, ValidationError,
};

use crate::error::{DecodeError, Result};

/// Relative tolerance on the reported net design bearing capacity.
const CAPACITY_TOLERANCE: f64 = 0.01;

/// Absolute tolerance on the reported variation coefficient.
const VARIATION_TOLERANCE: f64 = 0.005;

#[derive(Debug, Deserialize)]
struct GrouperResponseWire {
    sub_groups: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct SubGroupWire {
    names: Vec<String>,
    coordinates: Vec<(f64, f64)>,
    table: SubGroupTableWire,
}

#[derive(Debug, Deserialize)]
struct SubGroupTableWire {
    pile_tip_level: Vec<f64>,
    net_design_bearing_capacity: Option<Vec<Option<f64>>>,
    variation_coefficient: Option<Vec<Option<f64>>>,
}

/// One server-side sub-group, resolved against the result store.
///
/// The cluster is admitted only at the levels of the server table.
#[derive(Debug, Clone, PartialEq)]
pub struct SubGroup {
    pub cluster: Cluster,
    /// Levels of the server table, in response order.
    pub levels: Vec<PileTipLevel>,
    /// Server-side net design bearing capacity per level [kN].
    pub net_design_bearing_capacity: Vec<Option<f64>>,
    pub variation_coefficient: Vec<Option<f64>>,
}

/// A value reported by the service that the local aggregation does not
/// reproduce. `computed` is `None` when no local result exists at the level.
#[derive(Debug, Clone, PartialEq)]
pub struct SubGroupMismatch {
    pub cluster: ClusterId,
    pub pile_tip_level: PileTipLevel,
    pub column: &'static str,
    pub reported: f64,
    pub computed: Option<f64>,
}

impl SubGroup {
    /// Compare the reported table with the local results of this cluster.
    pub fn cross_check(&self, results: &ClusterResultSet) -> Vec<SubGroupMismatch> {
        let id = self.cluster.id();
        let mut mismatches = Vec::new();
        for (i, &level) in self.levels.iter().enumerate() {
            let local = results.get(id).and_then(|s| s.get(level));
            let checks: [(&'static str, Option<f64>, Option<f64>, fn(f64) -> f64); 2] = [
                (
                    "net_design_bearing_capacity",
                    self.net_design_bearing_capacity[i],
                    local.map(|r| r.mean),
                    |computed| CAPACITY_TOLERANCE * computed.abs().max(1.0),
                ),
                (
                    "variation_coefficient",
                    self.variation_coefficient[i],
                    local.map(|r| r.variation_coefficient),
                    |_| VARIATION_TOLERANCE,
                ),
            ];
            for (column, reported, computed, tolerance) in checks {
                let Some(reported) = reported else {
                    continue;
                };
                if computed.map_or(true, |c| (reported - c).abs() > tolerance(c)) {
                    mismatches.push(SubGroupMismatch {
                        cluster: id,
                        pile_tip_level: level,
                        column,
                        reported,
                        computed,
                    });
                }
            }
        }
        mismatches
    }
}

fn table_column(
    group: usize,
    name: &'static str,
    values: Option<Vec<Option<f64>>>,
    expected: usize,
) -> Result<Vec<Option<f64>>> {
    match values {
        None => Ok(vec![None; expected]),
        Some(values) if values.len() == expected => Ok(values),
        Some(values) => Err(DecodeError::ColumnLength {
            context: format!("sub-group {group}"),
            column: name,
            expected,
            found: values.len(),
        }),
    }
}

/// Decode one sub-group as cluster `index`.
///
/// # Errors
///
/// `ColumnLength` when names and coordinates (or table columns) disagree in
/// length, `UnknownCpt` for a member missing from `store`, `LevelMismatch`
/// when a member lacks a result at one of the table levels.
pub fn decode_sub_group(document: &Value, index: usize, store: &ResultStore) -> Result<SubGroup> {
    let wire = SubGroupWire::deserialize(document)?;
    if wire.coordinates.len() != wire.names.len() {
        return Err(DecodeError::ColumnLength {
            context: format!("sub-group {index}"),
            column: "coordinates",
            expected: wire.names.len(),
            found: wire.coordinates.len(),
        });
    }

    let members: Vec<CptId> = wire.names.iter().map(CptId::new).collect();
    let mut results = Vec::with_capacity(members.len());
    for member in &members {
        let found = store.get(member).ok_or_else(|| DecodeError::UnknownCpt {
            group: index,
            cpt: member.to_string(),
        })?;
        results.push(found);
    }

    let table = wire.table;
    let n = table.pile_tip_level.len();
    let mut levels = Vec::with_capacity(n);
    for &nap in &table.pile_tip_level {
        let level = PileTipLevel::from_nap(nap).ok_or_else(|| {
            ValidationError::InvalidPileTipLevel {
                cpt: CptId::new(format!("sub-group {index}")),
                value: nap,
            }
        })?;
        if let Some(missing) = results.iter().find(|r| r.row(level).is_none()) {
            return Err(DecodeError::LevelMismatch {
                group: index,
                cpt: missing.id().to_string(),
                level: level.nap(),
            });
        }
        levels.push(level);
    }
    let net_design_bearing_capacity = table_column(
        index,
        "net_design_bearing_capacity",
        table.net_design_bearing_capacity,
        n,
    )?;
    let variation_coefficient =
        table_column(index, "variation_coefficient", table.variation_coefficient, n)?;

    Ok(SubGroup {
        cluster: Cluster::from_store(ClusterId(index), members, store)?
            .with_admitted_levels(levels.iter().copied()),
        levels,
        net_design_bearing_capacity,
        variation_coefficient,
    })
}

/// Decode every sub-group; cluster ids follow response order.
///
/// # Errors
///
/// As [`decode_sub_group`].
pub fn decode_grouper_response(document: &Value, store: &ResultStore) -> Result<Vec<SubGroup>> {
    let wire = GrouperResponseWire::deserialize(document)?;
    let groups = wire
        .sub_groups
        .iter()
        .enumerate()
        .map(|(i, group)| decode_sub_group(group, i, store))
        .collect::<Result<Vec<_>>>()?;
    tracing::debug!(event = "decode.grouper_response", n_groups = groups.len());
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilecore_core::{BearingRow, ClusterAggregator, Cpt, CptBearingResults};
    use serde_json::json;

    fn store() -> ResultStore {
        let cpt = |id: &str, x: f64, levels: &[f64]| {
            CptBearingResults::new(
                Cpt::at(id, x, 0.0),
                None,
                levels.iter().map(|l| {
                    BearingRow::empty(PileTipLevel::from_nap(*l).unwrap()).with_r_c_d_net(500.0)
                }),
            )
            .unwrap()
        };
        ResultStore::new(vec![
            cpt("CPT1", 0.0, &[-10.0, -12.0]),
            cpt("CPT2", 5.0, &[-10.0]),
        ])
        .unwrap()
    }

    fn sub_group(names: &[&str], levels: &[f64]) -> Value {
        json!({
            "names": names,
            "coordinates": names.iter().map(|_| [0.0, 0.0]).collect::<Vec<_>>(),
            "minimum_pile_level": -12.0,
            "maximum_pile_level": -10.0,
            "number_of_consecutive_pile_levels": 1,
            "pile_load_check": true,
            "spatial_check": true,
            "variation_check": true,
            "centre_to_centre_check": false,
            "table": {
                "pile_tip_level": levels,
                "net_design_bearing_capacity": levels.iter().map(|_| 500.0).collect::<Vec<_>>()
            }
        })
    }

    #[test]
    fn test_decode_sub_group() {
        let group = decode_sub_group(&sub_group(&["CPT2", "CPT1"], &[-10.0]), 3, &store()).unwrap();
        assert_eq!(group.cluster.id(), ClusterId(3));
        assert_eq!(
            group.cluster.members(),
            &[CptId::from("CPT1"), CptId::from("CPT2")]
        );
        assert_eq!(
            group.cluster.admitted_levels(),
            Some(&[PileTipLevel::from_nap(-10.0).unwrap()][..])
        );
        assert_eq!(group.net_design_bearing_capacity, vec![Some(500.0)]);
        assert_eq!(group.variation_coefficient, vec![None]);
    }

    #[test]
    fn test_unknown_member_rejected() {
        let err = decode_sub_group(&sub_group(&["CPT1", "CPT9"], &[-10.0]), 0, &store())
            .unwrap_err();
        assert!(matches!(err, DecodeError::UnknownCpt { group: 0, ref cpt } if cpt == "CPT9"));
    }

    #[test]
    fn test_level_missing_for_member_rejected() {
        let err = decode_sub_group(&sub_group(&["CPT1", "CPT2"], &[-10.0, -12.0]), 0, &store())
            .unwrap_err();
        assert!(matches!(err, DecodeError::LevelMismatch { ref cpt, .. } if cpt == "CPT2"));
    }

    #[test]
    fn test_coordinates_length_checked() {
        let mut doc = sub_group(&["CPT1", "CPT2"], &[-10.0]);
        doc["coordinates"] = json!([[0.0, 0.0]]);
        let err = decode_sub_group(&doc, 0, &store()).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::ColumnLength {
                column: "coordinates",
                expected: 2,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_decode_grouper_response_orders_ids() {
        let doc = json!({
            "sub_groups": [
                sub_group(&["CPT1", "CPT2"], &[-10.0]),
                sub_group(&["CPT1"], &[-10.0, -12.0]),
            ]
        });
        let groups = decode_grouper_response(&doc, &store()).unwrap();
        let ids: Vec<ClusterId> = groups.iter().map(|g| g.cluster.id()).collect();
        assert_eq!(ids, vec![ClusterId(0), ClusterId(1)]);
    }

    #[test]
    fn test_cross_check_reports_disagreeing_capacity() {
        let store = store();
        let level = PileTipLevel::from_nap(-10.0).unwrap();
        let mut doc = sub_group(&["CPT1", "CPT2"], &[-10.0]);
        let group = decode_sub_group(&doc, 0, &store).unwrap();
        let results = ClusterAggregator::new(400.0)
            .unwrap()
            .aggregate_all(&[group.cluster.clone()], &store)
            .unwrap();
        assert!(group.cross_check(&results).is_empty());

        doc["table"]["net_design_bearing_capacity"] = json!([480.0]);
        doc["table"]["variation_coefficient"] = json!([0.0]);
        let group = decode_sub_group(&doc, 0, &store).unwrap();
        assert_eq!(
            group.cross_check(&results),
            vec![SubGroupMismatch {
                cluster: ClusterId(0),
                pile_tip_level: level,
                column: "net_design_bearing_capacity",
                reported: 480.0,
                computed: Some(500.0),
            }]
        );
    }

    #[test]
    fn test_empty_response_is_valid() {
        let groups = decode_grouper_response(&json!({ "sub_groups": [] }), &store()).unwrap();
        assert!(groups.is_empty());
    }
}

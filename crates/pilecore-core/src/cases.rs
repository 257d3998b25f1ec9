//! Envelopes of several cases (e.g. pile types) over the same CPTs.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::{natural_cmp, CoreError, CptId, PileTipLevel, Result};
use crate::envelope::{MaxBearingResults, MaxBearingRow};

type Pick = fn(&MaxBearingRow) -> Option<f64>;

fn net_design_bearing_capacity(row: &MaxBearingRow) -> Option<f64> {
    row.value
}

fn design_negative_friction(row: &MaxBearingRow) -> Option<f64> {
    row.f_nk_d
}

/// Envelope quantities exported per case, with their unit.
const RESULT_DEFINITIONS: [(&str, &str, Pick); 2] = [
    ("R_c_d_net", "kN", net_design_bearing_capacity),
    ("F_nk_d", "kN", design_negative_friction),
];

/// One value of one case, in long format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseRecord {
    pub case_name: String,
    pub result_name: &'static str,
    pub test_id: CptId,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub pile_tip_level: PileTipLevel,
    pub result: Option<f64>,
    pub result_unit: &'static str,
}

/// Named envelopes sharing CPT ids and pile tip levels.
#[derive(Debug, Clone)]
pub struct CaseSet {
    cases: Vec<(String, MaxBearingResults)>,
    test_ids: Vec<CptId>,
    levels: Vec<PileTipLevel>,
}

impl CaseSet {
    /// # Errors
    ///
    /// `CoreError::CaseMismatch` for an empty set, or when cases differ in
    /// CPT ids or pile tip levels.
    pub fn new(cases: impl IntoIterator<Item = (String, MaxBearingResults)>) -> Result<Self> {
        let mut cases: Vec<(String, MaxBearingResults)> = cases.into_iter().collect();
        cases.sort_by(|a, b| natural_cmp(&a.0, &b.0).then_with(|| a.0.cmp(&b.0)));

        let Some((first_name, first)) = cases.first() else {
            return Err(CoreError::CaseMismatch(
                "at least one case is required".to_string(),
            ));
        };
        let test_ids: Vec<CptId> = first.ids().cloned().collect();
        let levels = first.levels().to_vec();
        for (name, results) in &cases[1..] {
            if !results.ids().eq(test_ids.iter()) {
                return Err(CoreError::CaseMismatch(format!(
                    "case '{name}' has different test ids than case '{first_name}'"
                )));
            }
            if results.levels() != levels.as_slice() {
                return Err(CoreError::CaseMismatch(format!(
                    "case '{name}' has different pile tip levels than case '{first_name}'"
                )));
            }
        }
        Ok(Self {
            cases,
            test_ids,
            levels,
        })
    }

    /// Case names in natural order.
    pub fn cases(&self) -> impl Iterator<Item = &str> {
        self.cases.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, case: &str) -> Option<&MaxBearingResults> {
        self.cases.iter().find(|(n, _)| n == case).map(|(_, r)| r)
    }

    pub fn test_ids(&self) -> &[CptId] {
        &self.test_ids
    }

    pub fn pile_tip_levels(&self) -> &[PileTipLevel] {
        &self.levels
    }

    /// Every exported quantity of every case, CPT and level.
    pub fn records(&self) -> Vec<CaseRecord> {
        let mut records = Vec::new();
        for (case_name, results) in &self.cases {
            for (result_name, unit, pick) in RESULT_DEFINITIONS {
                for series in results.iter() {
                    let location = series.location();
                    for row in series.rows() {
                        records.push(CaseRecord {
                            case_name: case_name.clone(),
                            result_name,
                            test_id: series.id().clone(),
                            x: location.map(|p| p.x),
                            y: location.map(|p| p.y),
                            pile_tip_level: row.pile_tip_level,
                            result: pick(row),
                            result_unit: unit,
                        });
                    }
                }
            }
        }
        records
    }

    /// Records grouped by case name.
    pub fn records_by_case(&self) -> BTreeMap<String, Vec<CaseRecord>> {
        let mut grouped: BTreeMap<String, Vec<CaseRecord>> = BTreeMap::new();
        for record in self.records() {
            grouped
                .entry(record.case_name.clone())
                .or_default()
                .push(record);
        }
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ClusterResultSet;
    use crate::domain::{BearingRow, Cpt, CptBearingResults};
    use crate::envelope::{EnvelopeConfig, EnvelopeExtractor};
    use crate::store::ResultStore;

    fn envelope(levels: &[f64], ids: &[&str]) -> MaxBearingResults {
        let store = ResultStore::new(ids.iter().enumerate().map(|(i, id)| {
            CptBearingResults::new(
                Cpt::at(*id, i as f64, 0.0),
                None,
                levels.iter().map(|l| {
                    BearingRow::empty(PileTipLevel::from_nap(*l).unwrap()).with_r_c_d_net(500.0)
                }),
            )
            .unwrap()
        }))
        .unwrap();
        EnvelopeExtractor::new(400.0, &EnvelopeConfig::default())
            .unwrap()
            .extract(&store, &[], &ClusterResultSet::new(400.0, Vec::new()))
            .unwrap()
    }

    #[test]
    fn test_cases_natural_order_and_records() {
        let set = CaseSet::new(vec![
            ("pile 10".to_string(), envelope(&[-12.0, -15.0], &["A", "B"])),
            ("pile 9".to_string(), envelope(&[-12.0, -15.0], &["A", "B"])),
        ])
        .unwrap();
        assert_eq!(set.cases().collect::<Vec<_>>(), vec!["pile 9", "pile 10"]);
        // 2 cases x 2 quantities x 2 CPTs x 2 levels
        let records = set.records();
        assert_eq!(records.len(), 16);
        assert_eq!(records[0].case_name, "pile 9");
        assert_eq!(records[0].result_name, "R_c_d_net");
        assert_eq!(records[0].result, Some(500.0));
        assert_eq!(records[0].result_unit, "kN");
        assert_eq!(set.records_by_case().len(), 2);
    }

    #[test]
    fn test_empty_set_rejected() {
        assert!(matches!(
            CaseSet::new(Vec::new()),
            Err(CoreError::CaseMismatch(_))
        ));
    }

    #[test]
    fn test_mismatched_ids_rejected() {
        let err = CaseSet::new(vec![
            ("a".to_string(), envelope(&[-12.0], &["A", "B"])),
            ("b".to_string(), envelope(&[-12.0], &["A", "C"])),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("test ids"));
    }

    #[test]
    fn test_mismatched_levels_rejected() {
        let err = CaseSet::new(vec![
            ("a".to_string(), envelope(&[-12.0], &["A"])),
            ("b".to_string(), envelope(&[-12.0, -13.0], &["A"])),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("pile tip levels"));
    }
}

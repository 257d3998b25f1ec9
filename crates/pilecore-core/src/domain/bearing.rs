//! Per-CPT bearing capacity results, as computed server-side.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::cpt::{Cpt, CptId};
use super::error::ValidationError;
use super::level::PileTipLevel;

/// Result columns of a single-CPT bearing table. All values in kN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BearingColumn {
    #[serde(rename = "R_b_cal")]
    RBCal,
    #[serde(rename = "R_s_cal")]
    RSCal,
    #[serde(rename = "F_nk_cal")]
    FNkCal,
    #[serde(rename = "R_c_cal")]
    RCCal,
    #[serde(rename = "R_c_d_net")]
    RCDNet,
    #[serde(rename = "F_nk_d")]
    FNkD,
}

impl BearingColumn {
    pub const ALL: [BearingColumn; 6] = [
        BearingColumn::RBCal,
        BearingColumn::RSCal,
        BearingColumn::FNkCal,
        BearingColumn::RCCal,
        BearingColumn::RCDNet,
        BearingColumn::FNkD,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BearingColumn::RBCal => "R_b_cal",
            BearingColumn::RSCal => "R_s_cal",
            BearingColumn::FNkCal => "F_nk_cal",
            BearingColumn::RCCal => "R_c_cal",
            BearingColumn::RCDNet => "R_c_d_net",
            BearingColumn::FNkD => "F_nk_d",
        }
    }
}

impl fmt::Display for BearingColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BearingColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| format!("unknown bearing column: {s}"))
    }
}

/// One row of a single-CPT bearing table. `None` marks an undefined value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BearingRow {
    pub pile_tip_level: PileTipLevel,
    #[serde(rename = "R_b_cal")]
    pub r_b_cal: Option<f64>,
    #[serde(rename = "R_s_cal")]
    pub r_s_cal: Option<f64>,
    #[serde(rename = "F_nk_cal")]
    pub f_nk_cal: Option<f64>,
    #[serde(rename = "R_c_cal")]
    pub r_c_cal: Option<f64>,
    #[serde(rename = "R_c_d_net")]
    pub r_c_d_net: Option<f64>,
    #[serde(rename = "F_nk_d")]
    pub f_nk_d: Option<f64>,
}

impl BearingRow {
    /// A row with every value undefined.
    pub fn empty(pile_tip_level: PileTipLevel) -> Self {
        Self {
            pile_tip_level,
            r_b_cal: None,
            r_s_cal: None,
            f_nk_cal: None,
            r_c_cal: None,
            r_c_d_net: None,
            f_nk_d: None,
        }
    }

    /// Set the net design bearing capacity.
    pub fn with_r_c_d_net(mut self, value: f64) -> Self {
        self.r_c_d_net = Some(value);
        self
    }

    /// Set the calculated total bearing capacity.
    pub fn with_r_c_cal(mut self, value: f64) -> Self {
        self.r_c_cal = Some(value);
        self
    }

    /// Set the design negative friction.
    pub fn with_f_nk_d(mut self, value: f64) -> Self {
        self.f_nk_d = Some(value);
        self
    }

    pub fn value(&self, column: BearingColumn) -> Option<f64> {
        match column {
            BearingColumn::RBCal => self.r_b_cal,
            BearingColumn::RSCal => self.r_s_cal,
            BearingColumn::FNkCal => self.f_nk_cal,
            BearingColumn::RCCal => self.r_c_cal,
            BearingColumn::RCDNet => self.r_c_d_net,
            BearingColumn::FNkD => self.f_nk_d,
        }
    }

    fn normalized(mut self) -> Self {
        for slot in [
            &mut self.r_b_cal,
            &mut self.r_s_cal,
            &mut self.f_nk_cal,
            &mut self.r_c_cal,
            &mut self.r_c_d_net,
            &mut self.f_nk_d,
        ] {
            *slot = slot.filter(|v| v.is_finite());
        }
        self
    }
}

/// Bearing results of one CPT, keyed by pile tip level (shallow to deep).
///
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct CptBearingResults {
    cpt: Cpt,
    pile_head_level_nap: Option<f64>,
    rows: BTreeMap<PileTipLevel, BearingRow>,
}

impl CptBearingResults {
    /// Build the results of one CPT.
    ///
    /// Non-finite values are normalised to undefined.
    ///
    /// # Errors
    ///
    /// `ValidationError::DuplicatePileTipLevel` when two rows round to the
    /// same level.
    pub fn new(
        cpt: Cpt,
        pile_head_level_nap: Option<f64>,
        rows: impl IntoIterator<Item = BearingRow>,
    ) -> Result<Self, ValidationError> {
        let mut by_level = BTreeMap::new();
        for row in rows {
            let level = row.pile_tip_level;
            if by_level.insert(level, row.normalized()).is_some() {
                return Err(ValidationError::DuplicatePileTipLevel {
                    cpt: cpt.id.clone(),
                    level,
                });
            }
        }
        Ok(Self {
            cpt,
            pile_head_level_nap: pile_head_level_nap.filter(|v| v.is_finite()),
            rows: by_level,
        })
    }

    pub fn id(&self) -> &CptId {
        &self.cpt.id
    }

    pub fn cpt(&self) -> &Cpt {
        &self.cpt
    }

    pub fn pile_head_level_nap(&self) -> Option<f64> {
        self.pile_head_level_nap
    }

    pub fn rows(&self) -> impl Iterator<Item = &BearingRow> {
        self.rows.values()
    }

    pub fn row(&self, level: PileTipLevel) -> Option<&BearingRow> {
        self.rows.get(&level)
    }

    pub fn pile_tip_levels(&self) -> impl Iterator<Item = PileTipLevel> + '_ {
        self.rows.keys().copied()
    }

    /// The value of `column` at `level`, if the row exists and defines it.
    pub fn value(&self, level: PileTipLevel, column: BearingColumn) -> Option<f64> {
        self.rows.get(&level).and_then(|r| r.value(column))
    }

    /// `(level, value)` pairs for one column, shallow to deep.
    pub fn series(&self, column: BearingColumn) -> Vec<(PileTipLevel, Option<f64>)> {
        self.rows
            .iter()
            .map(|(level, row)| (*level, row.value(column)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(nap: f64) -> PileTipLevel {
        PileTipLevel::from_nap(nap).unwrap()
    }

    #[test]
    fn test_column_names_round_trip_through_from_str() {
        for column in BearingColumn::ALL {
            assert_eq!(column.name().parse::<BearingColumn>().unwrap(), column);
        }
        assert!("R_c_k".parse::<BearingColumn>().is_err());
    }

    #[test]
    fn test_rows_sorted_shallow_to_deep_and_nan_normalised() {
        let results = CptBearingResults::new(
            Cpt::at("CPT1", 0.0, 0.0),
            Some(0.5),
            vec![
                BearingRow::empty(level(-18.0)).with_r_c_d_net(f64::NAN),
                BearingRow::empty(level(-12.0)).with_r_c_d_net(400.0),
            ],
        )
        .unwrap();

        let levels: Vec<f64> = results.pile_tip_levels().map(|l| l.nap()).collect();
        assert_eq!(levels, vec![-12.0, -18.0]);
        assert_eq!(results.value(level(-12.0), BearingColumn::RCDNet), Some(400.0));
        assert_eq!(results.value(level(-18.0), BearingColumn::RCDNet), None);
    }

    #[test]
    fn test_duplicate_level_rejected() {
        let err = CptBearingResults::new(
            Cpt::new("CPT1"),
            None,
            vec![
                BearingRow::empty(level(-12.0)),
                BearingRow::empty(level(-12.001)),
            ],
        )
        .unwrap_err();
        match err {
            ValidationError::DuplicatePileTipLevel { cpt, level } => {
                assert_eq!(cpt.as_str(), "CPT1");
                assert_eq!(level.nap(), -12.0);
            }
            other => panic!("Expected DuplicatePileTipLevel, got {:?}", other),
        }
    }
}

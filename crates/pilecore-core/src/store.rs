//! CPT Result Store: the immutable snapshot of one analysis run.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::{
    BearingColumn, CoreError, CptBearingResults, CptId, PileTipLevel, Result, ValidationError,
};
use crate::table::{Cell, PivotTable, Table};

/// Per-CPT bearing results keyed by CPT id, in natural id order.
///
/// Every store receives a fresh run id. Derived projections are cached on the
/// store itself, so a new snapshot never sees a previous run's tables.
#[derive(Debug, Clone)]
pub struct ResultStore {
    run_id: Uuid,
    digest: String,
    results: BTreeMap<CptId, CptBearingResults>,
    table: OnceLock<Table>,
}

impl ResultStore {
    /// # Errors
    ///
    /// `ValidationError::DuplicateCptId` when two results share an id.
    pub fn new(results: impl IntoIterator<Item = CptBearingResults>) -> Result<Self> {
        let mut by_id = BTreeMap::new();
        for result in results {
            let id = result.id().clone();
            if by_id.contains_key(&id) {
                return Err(ValidationError::DuplicateCptId(id).into());
            }
            by_id.insert(id, result);
        }
        let digest = content_digest(&by_id)?;
        Ok(Self {
            run_id: Uuid::new_v4(),
            digest,
            results: by_id,
            table: OnceLock::new(),
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// SHA-256 hex digest of the snapshot contents. Independent of the run id.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn get(&self, id: &CptId) -> Option<&CptBearingResults> {
        self.results.get(id)
    }

    /// # Errors
    ///
    /// `CoreError::UnknownCpt` when the store holds no results for `id`.
    pub fn try_get(&self, id: &CptId) -> Result<&CptBearingResults> {
        self.results
            .get(id)
            .ok_or_else(|| CoreError::UnknownCpt(id.clone()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &CptId> {
        self.results.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CptBearingResults> {
        self.results.values()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Union of all pile tip levels, shallow to deep.
    pub fn pile_tip_levels(&self) -> Vec<PileTipLevel> {
        self.iter()
            .flat_map(|r| r.pile_tip_levels())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// One column of one CPT as `(level, value)` pairs.
    ///
    /// # Errors
    ///
    /// `CoreError::UnknownCpt` when `id` is not in the store.
    pub fn series(
        &self,
        id: &CptId,
        column: BearingColumn,
    ) -> Result<Vec<(PileTipLevel, Option<f64>)>> {
        Ok(self.try_get(id)?.series(column))
    }

    /// Long-format projection: one row per (CPT, level). Built once.
    pub fn to_table(&self) -> &Table {
        self.table.get_or_init(|| {
            let mut columns = vec!["test_id", "x", "y", "pile_tip_level"];
            columns.extend(BearingColumn::ALL.iter().map(|c| c.name()));
            let mut table = Table::new("bearing", &columns);
            for result in self.iter() {
                let location = result.cpt().location;
                for row in result.rows() {
                    let mut cells: Vec<Cell> = vec![
                        result.id().as_str().into(),
                        location.map(|p| p.x).into(),
                        location.map(|p| p.y).into(),
                        row.pile_tip_level.into(),
                    ];
                    cells.extend(BearingColumn::ALL.iter().map(|c| row.value(*c).into()));
                    table.push_row(cells);
                }
            }
            table
        })
    }

    /// One column pivoted to levels × CPTs.
    pub fn results_per_cpt(&self, column: BearingColumn) -> PivotTable {
        let levels = self.pile_tip_levels();
        let keys: Vec<CptId> = self.ids().cloned().collect();
        let values = levels
            .iter()
            .map(|level| self.iter().map(|r| r.value(*level, column)).collect())
            .collect();
        PivotTable {
            column: column.name().to_string(),
            levels,
            keys,
            values,
        }
    }
}

fn content_digest(results: &BTreeMap<CptId, CptBearingResults>) -> Result<String> {
    let mut hasher = Sha256::new();
    for result in results.values() {
        hasher.update(serde_json::to_vec(result.cpt())?);
        hasher.update(serde_json::to_vec(&result.pile_head_level_nap())?);
        for row in result.rows() {
            hasher.update(serde_json::to_vec(row)?);
        }
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BearingRow, Cpt};

    fn level(nap: f64) -> PileTipLevel {
        PileTipLevel::from_nap(nap).unwrap()
    }

    fn cpt(id: &str, x: f64, values: &[(f64, f64)]) -> CptBearingResults {
        CptBearingResults::new(
            Cpt::at(id, x, 0.0),
            Some(0.0),
            values
                .iter()
                .map(|(l, v)| BearingRow::empty(level(*l)).with_r_c_d_net(*v)),
        )
        .unwrap()
    }

    fn store() -> ResultStore {
        ResultStore::new(vec![
            cpt("CPT10", 10.0, &[(-15.0, 600.0)]),
            cpt("CPT2", 0.0, &[(-12.0, 400.0), (-15.0, 500.0)]),
        ])
        .unwrap()
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let err = ResultStore::new(vec![cpt("A", 0.0, &[]), cpt("A", 1.0, &[])]).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::DuplicateCptId(_))
        ));
    }

    #[test]
    fn test_ids_natural_order_and_level_union() {
        let store = store();
        let ids: Vec<&str> = store.ids().map(CptId::as_str).collect();
        assert_eq!(ids, vec!["CPT2", "CPT10"]);
        assert_eq!(store.pile_tip_levels(), vec![level(-12.0), level(-15.0)]);
    }

    #[test]
    fn test_unknown_cpt_series() {
        let err = store()
            .series(&CptId::from("CPT3"), BearingColumn::RCDNet)
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownCpt(_)));
    }

    #[test]
    fn test_table_cached_and_complete() {
        let store = store();
        let first = store.to_table() as *const Table;
        let second = store.to_table() as *const Table;
        assert_eq!(first, second);
        assert_eq!(store.to_table().len(), 3);
        assert_eq!(store.to_table().columns().len(), 10);
    }

    #[test]
    fn test_pivot_marks_missing_levels() {
        let pivot = store().results_per_cpt(BearingColumn::RCDNet);
        assert_eq!(pivot.get(level(-12.0), &CptId::from("CPT10")), None);
        assert_eq!(pivot.get(level(-15.0), &CptId::from("CPT10")), Some(600.0));
    }

    #[test]
    fn test_digest_stable_across_runs() {
        let a = store();
        let b = store();
        assert_ne!(a.run_id(), b.run_id());
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
    }
}

//! Lexicographic ranking of candidates and greedy disjoint selection.

use std::cmp::Ordering;

use super::config::OptimizeCriterion;
use crate::aggregate::ClusterResultSeries;
use crate::domain::PileTipLevel;

/// What the ranking needs to know about one candidate.
#[derive(Debug, Clone)]
pub(crate) struct RankKey {
    /// Site indices, sorted.
    pub members: Vec<usize>,
    pub shallowest_valid: Option<PileTipLevel>,
    pub consecutive_valid: usize,
    pub centre_to_centre: bool,
    pub any_valid: bool,
}

impl RankKey {
    pub fn new(members: Vec<usize>, series: &ClusterResultSeries) -> Self {
        Self {
            members,
            shallowest_valid: series.valid_levels().next(),
            consecutive_valid: series.consecutive_valid_levels(),
            centre_to_centre: series
                .rows()
                .any(|r| r.centre_to_centre.is_some_and(|c| c.passed())),
            any_valid: series.valid_levels().next().is_some(),
        }
    }
}

fn compare_by(criterion: OptimizeCriterion, a: &RankKey, b: &RankKey) -> Ordering {
    match criterion {
        OptimizeCriterion::MinimumPileLevel => match (a.shallowest_valid, b.shallowest_valid) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        OptimizeCriterion::NumberOfCpts => b.members.len().cmp(&a.members.len()),
        OptimizeCriterion::NumberOfConsecutivePileLevels => {
            b.consecutive_valid.cmp(&a.consecutive_valid)
        }
        OptimizeCriterion::CentreToCentreCheck => b.centre_to_centre.cmp(&a.centre_to_centre),
    }
}

/// Indices of `keys` in rank order. Criteria apply in sequence; remaining
/// ties fall back to natural member order.
pub(crate) fn rank(keys: &[RankKey], criteria: &[OptimizeCriterion]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..keys.len()).collect();
    order.sort_by(|&i, &j| {
        criteria
            .iter()
            .map(|c| compare_by(*c, &keys[i], &keys[j]))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
            .then_with(|| keys[i].members.cmp(&keys[j].members))
    });
    order
}

/// Walk `ranked` and keep each candidate valid at some level whose members
/// are not yet taken.
pub(crate) fn select_disjoint(keys: &[RankKey], ranked: &[usize], n_sites: usize) -> Vec<usize> {
    let mut taken = vec![false; n_sites];
    let mut selected = Vec::new();
    for &i in ranked {
        let key = &keys[i];
        if !key.any_valid || key.members.iter().any(|&m| taken[m]) {
            continue;
        }
        for &m in &key.members {
            taken[m] = true;
        }
        selected.push(i);
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(members: Vec<usize>, shallowest: Option<f64>, consecutive: usize) -> RankKey {
        RankKey {
            members,
            shallowest_valid: shallowest.and_then(PileTipLevel::from_nap),
            consecutive_valid: consecutive,
            centre_to_centre: false,
            any_valid: shallowest.is_some(),
        }
    }

    #[test]
    fn test_first_criterion_dominates() {
        let keys = vec![
            key(vec![0, 1, 2], Some(-15.0), 5),
            key(vec![3, 4], Some(-12.0), 1),
        ];
        let ranked = rank(&keys, &OptimizeCriterion::defaults());
        assert_eq!(ranked, vec![1, 0]);

        let ranked = rank(&keys, &[OptimizeCriterion::NumberOfCpts]);
        assert_eq!(ranked, vec![0, 1]);
    }

    #[test]
    fn test_ties_fall_through_to_next_criterion_then_members() {
        let keys = vec![
            key(vec![2, 3], Some(-12.0), 2),
            key(vec![0, 1], Some(-12.0), 2),
            key(vec![4, 5], Some(-12.0), 3),
        ];
        let ranked = rank(&keys, &OptimizeCriterion::defaults());
        assert_eq!(ranked, vec![2, 1, 0]);
    }

    #[test]
    fn test_never_valid_ranks_last_and_is_not_selected() {
        let keys = vec![key(vec![0, 1], None, 0), key(vec![1, 2], Some(-20.0), 1)];
        let ranked = rank(&keys, &[OptimizeCriterion::MinimumPileLevel]);
        assert_eq!(ranked, vec![1, 0]);
        assert_eq!(select_disjoint(&keys, &ranked, 3), vec![1]);
    }

    #[test]
    fn test_selection_is_disjoint() {
        let keys = vec![
            key(vec![0, 1, 2], Some(-12.0), 1),
            key(vec![2, 3], Some(-12.0), 1),
            key(vec![3, 4], Some(-12.0), 1),
        ];
        let ranked = rank(&keys, &OptimizeCriterion::defaults());
        assert_eq!(select_disjoint(&keys, &ranked, 5), vec![0, 2]);
    }
}

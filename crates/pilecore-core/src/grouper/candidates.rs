//! Candidate enumeration: seed selection, nearest-first growth and the
//! spatial coherence filter.
//!
//! Sites are indexed in natural CPT id order, so a sorted index list is also
//! a naturally ordered member list.

use std::collections::BTreeSet;

use nalgebra::Point2;

use super::spacing::SpacingRule;
use crate::domain::CptId;
use crate::geometry::{self, BOUNDARY_TOLERANCE};

/// A CPT usable for grouping.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Site {
    pub id: CptId,
    pub location: Point2<f64>,
}

fn distance(a: &Site, b: &Site) -> f64 {
    (a.location - b.location).norm()
}

/// `ceil(resolution * n)` seed indices by farthest-point ordering, starting
/// at the site closest to the centroid. Ties resolve to the lowest index.
pub(crate) fn select_seeds(sites: &[Site], resolution: f64) -> Vec<usize> {
    let n = sites.len();
    let locations: Vec<Point2<f64>> = sites.iter().map(|s| s.location).collect();
    let Some(centre) = geometry::centroid(&locations) else {
        return Vec::new();
    };
    let count = ((resolution * n as f64).ceil() as usize).clamp(1, n);

    let first = argmin(locations.iter().map(|p| (p - centre).norm()));
    let mut seeds = vec![first];
    let mut nearest: Vec<f64> = sites.iter().map(|s| distance(s, &sites[first])).collect();
    while seeds.len() < count {
        let next = argmin(nearest.iter().map(|d| -d));
        seeds.push(next);
        for (i, site) in sites.iter().enumerate() {
            nearest[i] = nearest[i].min(distance(site, &sites[next]));
        }
    }
    seeds
}

fn argmin(values: impl Iterator<Item = f64>) -> usize {
    values
        .enumerate()
        .fold((0, f64::INFINITY), |best, (i, v)| if v < best.1 { (i, v) } else { best })
        .0
}

/// Grow from `seed`, adding the nearest remaining site while `rule` admits
/// the enlarged set. Returns every prefix of two or more members, sorted.
pub(crate) fn grow(sites: &[Site], seed: usize, rule: &dyn SpacingRule) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..sites.len()).filter(|&i| i != seed).collect();
    order.sort_by(|&a, &b| {
        distance(&sites[seed], &sites[a])
            .total_cmp(&distance(&sites[seed], &sites[b]))
            .then(a.cmp(&b))
    });

    let mut members = vec![seed];
    let mut locations = vec![sites[seed].location];
    let mut prefixes = Vec::new();
    for next in order {
        locations.push(sites[next].location);
        if !rule.admits(&locations) {
            break;
        }
        members.push(next);
        let mut prefix = members.clone();
        prefix.sort_unstable();
        prefixes.push(prefix);
    }
    prefixes
}

/// No site outside `members` lies within the members' convex hull.
pub(crate) fn is_spatially_coherent(sites: &[Site], members: &[usize]) -> bool {
    let locations: Vec<Point2<f64>> = members.iter().map(|&i| sites[i].location).collect();
    let hull = geometry::convex_hull(&locations);
    sites
        .iter()
        .enumerate()
        .filter(|(i, _)| members.binary_search(i).is_err())
        .all(|(_, s)| !geometry::hull_contains(&hull, &s.location, BOUNDARY_TOLERANCE))
}

/// Distinct, spatially coherent candidates grown from the selected seeds,
/// plus the number rejected for coherence.
pub(crate) fn enumerate(
    sites: &[Site],
    resolution: f64,
    rule: &dyn SpacingRule,
) -> (Vec<Vec<usize>>, usize) {
    let grown: BTreeSet<Vec<usize>> = select_seeds(sites, resolution)
        .into_iter()
        .flat_map(|seed| grow(sites, seed, rule))
        .collect();
    let total = grown.len();
    let admissible: Vec<Vec<usize>> = grown
        .into_iter()
        .filter(|members| is_spatially_coherent(sites, members))
        .collect();
    let rejected = total - admissible.len();
    (admissible, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouper::spacing::MaxPairwiseDistance;

    fn sites(points: &[(f64, f64)]) -> Vec<Site> {
        points
            .iter()
            .enumerate()
            .map(|(i, (x, y))| Site {
                id: CptId::new(format!("CPT{i}")),
                location: Point2::new(*x, *y),
            })
            .collect()
    }

    #[test]
    fn test_seed_count_and_start_near_centroid() {
        let sites = sites(&[(0.0, 0.0), (10.0, 0.0), (5.0, 1.0), (20.0, 0.0)]);
        let seeds = select_seeds(&sites, 0.5);
        assert_eq!(seeds.len(), 2);
        // centroid (8.75, 0.25): closest is index 1
        assert_eq!(seeds[0], 1);
        // indices 0 and 3 are both 10 m from index 1: lowest index wins
        assert_eq!(seeds[1], 0);
    }

    #[test]
    fn test_full_resolution_seeds_every_site() {
        let sites = sites(&[(0.0, 0.0), (10.0, 0.0), (5.0, 1.0)]);
        let mut seeds = select_seeds(&sites, 1.0);
        seeds.sort_unstable();
        assert_eq!(seeds, vec![0, 1, 2]);
    }

    #[test]
    fn test_growth_stops_at_first_violation() {
        let sites = sites(&[(0.0, 0.0), (5.0, 0.0), (12.0, 0.0), (14.0, 0.0)]);
        let rule = MaxPairwiseDistance { max_distance: 12.0 };
        let prefixes = grow(&sites, 0, &rule);
        assert_eq!(prefixes, vec![vec![0, 1], vec![0, 1, 2]]);
    }

    #[test]
    fn test_hull_containing_outsider_is_incoherent() {
        let sites = sites(&[(0.0, 0.0), (10.0, 0.0), (5.0, 0.0), (0.0, 10.0)]);
        assert!(!is_spatially_coherent(&sites, &[0, 1]));
        assert!(is_spatially_coherent(&sites, &[0, 2]));
        assert!(is_spatially_coherent(&sites, &[0, 1, 2, 3]));
    }

    #[test]
    fn test_enumerate_deduplicates() {
        let sites = sites(&[(0.0, 0.0), (3.0, 0.0)]);
        let rule = MaxPairwiseDistance { max_distance: 25.0 };
        let (candidates, rejected) = enumerate(&sites, 1.0, &rule);
        assert_eq!(candidates, vec![vec![0, 1]]);
        assert_eq!(rejected, 0);
    }
}

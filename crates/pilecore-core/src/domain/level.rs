//! Pile tip levels.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A pile tip level in m w.r.t. NAP, rounded to 2 decimals.
///
/// Stored as whole centimetres so that levels computed independently per CPT
/// align exactly. Levels order shallow to deep (descending NAP): `-12.0`
/// sorts before `-15.5`. Every level-keyed collection in this crate iterates
/// in that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PileTipLevel {
    centimetres: i64,
}

impl PileTipLevel {
    /// Round `nap` to 2 decimals. Returns `None` for non-finite input.
    pub fn from_nap(nap: f64) -> Option<Self> {
        if !nap.is_finite() {
            return None;
        }
        Some(Self {
            centimetres: (nap * 100.0).round() as i64,
        })
    }

    /// The level in m w.r.t. NAP.
    pub fn nap(self) -> f64 {
        self.centimetres as f64 / 100.0
    }

    /// Whether `self` lies above `other`.
    pub fn is_above(self, other: Self) -> bool {
        self.centimetres > other.centimetres
    }
}

impl Ord for PileTipLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        other.centimetres.cmp(&self.centimetres)
    }
}

impl PartialOrd for PileTipLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PileTipLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.nap())
    }
}

impl Serialize for PileTipLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.nap())
    }
}

impl<'de> Deserialize<'de> for PileTipLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let nap = f64::deserialize(deserializer)?;
        Self::from_nap(nap)
            .ok_or_else(|| serde::de::Error::custom(format!("non-finite pile tip level: {nap}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(nap: f64) -> PileTipLevel {
        PileTipLevel::from_nap(nap).unwrap()
    }

    #[test]
    fn test_rounding_aligns_float_noise() {
        assert_eq!(level(-15.000000001), level(-15.0));
        assert_eq!(level(-14.999), level(-15.0));
        assert_ne!(level(-15.01), level(-15.0));
    }

    #[test]
    fn test_ordering_is_shallow_to_deep() {
        let mut levels = vec![level(-18.0), level(-12.0), level(-15.5)];
        levels.sort();
        let naps: Vec<f64> = levels.iter().map(|l| l.nap()).collect();
        assert_eq!(naps, vec![-12.0, -15.5, -18.0]);
        assert!(level(-12.0).is_above(level(-15.5)));
    }

    #[test]
    fn test_non_finite_rejected() {
        assert!(PileTipLevel::from_nap(f64::NAN).is_none());
        assert!(PileTipLevel::from_nap(f64::INFINITY).is_none());
    }

    #[test]
    fn test_serde_as_number() {
        let json = serde_json::to_string(&level(-15.25)).unwrap();
        assert_eq!(json, "-15.25");
        let back: PileTipLevel = serde_json::from_str("-15.251").unwrap();
        assert_eq!(back, level(-15.25));
    }
}

//! TOML configuration of the `pilecore` binary.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use pilecore_core::{EnvelopeConfig, GrouperConfig, TiePolicy};

/// Contents of a `pilecore.toml` file.
///
/// ```toml
/// [grouper]
/// pile_load_uls = 400.0
/// resolution = 0.5
///
/// [envelope]
/// tie_policy = "prefer_group"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub grouper: GrouperConfig,
    pub envelope: EnvelopeConfig,
}

impl AppConfig {
    /// Load from `path`, or defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Invalid config in {:?}", path))
    }

    /// Apply command-line overrides.
    pub fn with_overrides(mut self, pile_load: Option<f64>, tie_policy: Option<TiePolicy>) -> Self {
        if let Some(load) = pile_load {
            self.grouper = self.grouper.with_pile_load(load);
        }
        if let Some(policy) = tie_policy {
            self.envelope = self.envelope.with_tie_policy(policy);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilecore_core::OptimizeCriterion;

    #[test]
    fn test_load_toml_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pilecore.toml");
        std::fs::write(
            &path,
            r#"
[grouper]
pile_load_uls = 400.0
resolution = 0.25
optimize_result_by = ["number_of_cpts", "minimum_pile_level"]
building_polygon = [[0.0, 0.0], [50.0, 0.0], [50.0, 50.0]]

[envelope]
tie_policy = "prefer_single"
"#,
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.grouper.pile_load_uls, Some(400.0));
        assert_eq!(config.grouper.resolution, 0.25);
        assert_eq!(config.grouper.max_cpt_distance, 25.0);
        assert_eq!(
            config.grouper.optimize_result_by,
            vec![
                OptimizeCriterion::NumberOfCpts,
                OptimizeCriterion::MinimumPileLevel
            ]
        );
        assert_eq!(config.grouper.building_polygon.map(|p| p.len()), Some(3));
        assert_eq!(config.envelope.tie_policy, TiePolicy::PreferSingle);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pilecore.toml");
        std::fs::write(&path, "[grouper]\nresolutoin = 0.5\n").unwrap();
        assert!(AppConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn test_overrides_win() {
        let config = AppConfig::default().with_overrides(Some(550.0), Some(TiePolicy::PreferSingle));
        assert_eq!(config.grouper.pile_load_uls, Some(550.0));
        assert_eq!(config.envelope.tie_policy, TiePolicy::PreferSingle);
        assert_eq!(AppConfig::load(None).unwrap(), AppConfig::default());
    }
}

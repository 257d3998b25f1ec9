use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{CptId, Result};
use crate::envelope::{LevelMaximum, MaxBearingResults, MaxBearingRow, TiePolicy};
use crate::store::ResultStore;

pub const SCHEMA_VERSION: &str = "1.0";

/// One envelope row with the CPT it belongs to.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EnvelopeRowArtifact {
    pub test_id: CptId,
    pub x: Option<f64>,
    pub y: Option<f64>,
    #[serde(flatten)]
    pub row: MaxBearingRow,
}

/// Envelope artifact persisted by the CLI.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EnvelopeArtifact {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub run_id: Uuid,
    pub store_digest: String,
    pub required_load: f64,
    pub tie_policy: TiePolicy,
    pub level_maxima: Vec<LevelMaximum>,
    pub rows: Vec<EnvelopeRowArtifact>,
}

impl EnvelopeArtifact {
    pub fn new(store: &ResultStore, envelope: &MaxBearingResults) -> Self {
        Self::at(Utc::now(), store, envelope)
    }

    pub fn at(
        generated_at: DateTime<Utc>,
        store: &ResultStore,
        envelope: &MaxBearingResults,
    ) -> Self {
        let rows = envelope
            .iter()
            .flat_map(|series| {
                let location = series.location();
                series.rows().map(move |row| EnvelopeRowArtifact {
                    test_id: series.id().clone(),
                    x: location.map(|p| p.x),
                    y: location.map(|p| p.y),
                    row: row.clone(),
                })
            })
            .collect();
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at,
            run_id: envelope.run_id(),
            store_digest: store.digest().to_string(),
            required_load: envelope.required_load(),
            tie_policy: envelope.tie_policy(),
            level_maxima: envelope.level_maxima(),
            rows,
        }
    }
}

/// Write the envelope artifact in pretty JSON format.
pub fn write_envelope_json(path: &Path, artifact: &EnvelopeArtifact) -> Result<()> {
    let content = serde_json::to_string_pretty(artifact)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ClusterResultSet;
    use crate::domain::{BearingRow, Cpt, CptBearingResults, PileTipLevel};
    use crate::envelope::{EnvelopeConfig, EnvelopeExtractor};

    fn fixture() -> (ResultStore, MaxBearingResults) {
        let level = PileTipLevel::from_nap(-15.0).unwrap();
        let store = ResultStore::new(vec![
            CptBearingResults::new(
                Cpt::at("A", 0.0, 0.0),
                Some(0.5),
                vec![BearingRow::empty(level).with_r_c_d_net(500.0).with_f_nk_d(20.0)],
            )
            .unwrap(),
            CptBearingResults::new(
                Cpt::new("B"),
                None,
                vec![BearingRow::empty(level).with_r_c_d_net(300.0)],
            )
            .unwrap(),
        ])
        .unwrap();
        let envelope = EnvelopeExtractor::new(400.0, &EnvelopeConfig::default())
            .unwrap()
            .extract(&store, &[], &ClusterResultSet::new(400.0, Vec::new()))
            .unwrap();
        (store, envelope)
    }

    #[test]
    fn envelope_artifact_schema_has_expected_keys() {
        let (store, envelope) = fixture();
        let artifact = EnvelopeArtifact::at(
            DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .expect("parse RFC3339")
                .with_timezone(&Utc),
            &store,
            &envelope,
        );
        let value = serde_json::to_value(&artifact).expect("serialize artifact");
        for key in [
            "schema_version",
            "generated_at",
            "run_id",
            "store_digest",
            "required_load",
            "tie_policy",
            "level_maxima",
            "rows",
        ] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
        assert_eq!(value["tie_policy"], "prefer_group");
        assert_eq!(value["rows"][0]["test_id"], "A");
        assert_eq!(value["rows"][0]["origin"], "CPT:A");
        assert_eq!(value["rows"][0]["F_nk_d"], 20.0);
        assert_eq!(value["rows"][0]["valid"], true);
        assert_eq!(value["rows"][1]["x"], serde_json::Value::Null);
        assert_eq!(value["rows"][1]["valid"], false);
    }

    #[test]
    fn write_envelope_json_creates_file() {
        let (store, envelope) = fixture();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("envelope.json");
        write_envelope_json(&path, &EnvelopeArtifact::new(&store, &envelope))
            .expect("write artifact");

        let content = std::fs::read_to_string(&path).expect("read artifact");
        let parsed: serde_json::Value = serde_json::from_str(&content).expect("parse artifact");
        assert_eq!(parsed["store_digest"], store.digest());
        assert_eq!(parsed["rows"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn write_envelope_json_reports_io_error() {
        let (store, envelope) = fixture();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing").join("envelope.json");
        let err = write_envelope_json(&path, &EnvelopeArtifact::new(&store, &envelope))
            .unwrap_err();
        assert!(matches!(err, crate::domain::CoreError::Io(_)));
    }
}

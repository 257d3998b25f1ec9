//! PileCore API decoding
//!
//! Turns the JSON documents returned by the PileCore service into
//! `pilecore-core` types. Every entity has its own pure decode step; no I/O
//! happens here.

pub mod bearing;
pub mod error;
pub mod grouper;
pub mod task;

use std::collections::HashMap;

use serde_json::Value;

use pilecore_core::{Cluster, ClusterResultSet, ResultStore};

pub use bearing::{
    decode_bearing_response, decode_cpt_input, decode_cpt_results, CptInput, LocationWire,
};
pub use error::{DecodeError, Result};
pub use grouper::{decode_grouper_response, decode_sub_group, SubGroup, SubGroupMismatch};
pub use task::{resolve_document, PollBackoff, TaskDocument, TaskOutcome, TaskState};

/// Everything decoded from one set of service responses.
#[derive(Debug, Clone)]
pub struct DecodedInputs {
    pub store: ResultStore,
    /// Server-side sub-groups, when a grouper response was supplied.
    pub sub_groups: Option<Vec<SubGroup>>,
}

impl DecodedInputs {
    /// Clusters of the decoded sub-groups, in response order, each admitted
    /// only at the levels of its server table.
    pub fn clusters(&self) -> Option<Vec<Cluster>> {
        self.sub_groups
            .as_ref()
            .map(|groups| groups.iter().map(|g| g.cluster.clone()).collect())
    }

    /// Compare every sub-group's reported values with `results` and log
    /// each disagreement as a warning.
    pub fn cross_check(&self, results: &ClusterResultSet) -> Vec<SubGroupMismatch> {
        let mismatches: Vec<SubGroupMismatch> = self
            .sub_groups
            .iter()
            .flatten()
            .flat_map(|g| g.cross_check(results))
            .collect();
        for m in &mismatches {
            tracing::warn!(
                event = "decode.sub_group_mismatch",
                cluster = %m.cluster,
                pile_tip_level = %m.pile_tip_level,
                column = m.column,
                reported = m.reported,
                computed = ?m.computed,
            );
        }
        mismatches
    }
}

/// Decode a bearing response, its CPT input metadata and an optional grouper
/// response.
///
/// # Errors
///
/// The first decoding error of any document.
pub fn decode_inputs(
    bearing: &Value,
    cpt_input: Option<&Value>,
    grouper: Option<&Value>,
) -> Result<DecodedInputs> {
    let cpt_input = match cpt_input {
        Some(document) => decode_cpt_input(document)?,
        None => HashMap::new(),
    };
    let store = decode_bearing_response(bearing, &cpt_input)?;
    let sub_groups = grouper
        .map(|document| decode_grouper_response(document, &store))
        .transpose()?;
    Ok(DecodedInputs { store, sub_groups })
}

/// Version of the PileCore API decoding crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

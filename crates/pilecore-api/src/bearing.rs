//! Decoding of the multiple-CPT bearing capacity response.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use pilecore_core::{
    BearingRow, Cpt, CptBearingResults, CptId, PileTipLevel, ResultStore, ValidationError,
};

use crate::error::{DecodeError, Result};

#[derive(Debug, Deserialize)]
struct BearingResponseWire {
    cpts: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct CptResultsWire {
    test_id: String,
    results_table: ResultsTableWire,
    #[serde(default)]
    annotations: Option<AnnotationsWire>,
}

#[derive(Debug, Deserialize)]
struct AnnotationsWire {
    pile_head_level_nap: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ResultsTableWire {
    pile_tip_level_nap: Vec<f64>,
    #[serde(rename = "R_b_cal")]
    r_b_cal: Option<Vec<Option<f64>>>,
    #[serde(rename = "R_s_cal")]
    r_s_cal: Option<Vec<Option<f64>>>,
    #[serde(rename = "F_nk_cal")]
    f_nk_cal: Option<Vec<Option<f64>>>,
    #[serde(rename = "R_c_cal")]
    r_c_cal: Option<Vec<Option<f64>>>,
    #[serde(rename = "R_c_d_net")]
    r_c_d_net: Option<Vec<Option<f64>>>,
    #[serde(rename = "F_nk_d")]
    f_nk_d: Option<Vec<Option<f64>>>,
}

/// CPT metadata sent with the bearing request, keyed by test id.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CptInput {
    #[serde(default)]
    pub location: Option<LocationWire>,
    #[serde(default)]
    pub in_polygon: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LocationWire {
    pub x: Option<f64>,
    pub y: Option<f64>,
}

/// Parse the CPT input metadata map.
///
/// # Errors
///
/// `DecodeError::Json` for a malformed document.
pub fn decode_cpt_input(document: &Value) -> Result<HashMap<String, CptInput>> {
    Ok(HashMap::<String, CptInput>::deserialize(document)?)
}

fn column(
    context: &str,
    name: &'static str,
    values: Option<Vec<Option<f64>>>,
    expected: usize,
) -> Result<Vec<Option<f64>>> {
    match values {
        None => Ok(vec![None; expected]),
        Some(values) if values.len() == expected => Ok(values),
        Some(values) => Err(DecodeError::ColumnLength {
            context: context.to_string(),
            column: name,
            expected,
            found: values.len(),
        }),
    }
}

/// Decode the results of one CPT.
///
/// Levels are rounded to centimetres. Location and polygon flag come from
/// `input` when present.
///
/// # Errors
///
/// `ColumnLength` when a column disagrees with the number of levels, a core
/// validation error for a non-finite or duplicate level.
pub fn decode_cpt_results(document: &Value, input: Option<&CptInput>) -> Result<CptBearingResults> {
    let wire = CptResultsWire::deserialize(document)?;
    let table = wire.results_table;
    let n = table.pile_tip_level_nap.len();
    let context = format!("CPT {}", wire.test_id);

    let r_b_cal = column(&context, "R_b_cal", table.r_b_cal, n)?;
    let r_s_cal = column(&context, "R_s_cal", table.r_s_cal, n)?;
    let f_nk_cal = column(&context, "F_nk_cal", table.f_nk_cal, n)?;
    let r_c_cal = column(&context, "R_c_cal", table.r_c_cal, n)?;
    let r_c_d_net = column(&context, "R_c_d_net", table.r_c_d_net, n)?;
    let f_nk_d = column(&context, "F_nk_d", table.f_nk_d, n)?;

    let id = CptId::new(wire.test_id);
    let mut rows = Vec::with_capacity(n);
    for (i, &nap) in table.pile_tip_level_nap.iter().enumerate() {
        let pile_tip_level =
            PileTipLevel::from_nap(nap).ok_or_else(|| ValidationError::InvalidPileTipLevel {
                cpt: id.clone(),
                value: nap,
            })?;
        rows.push(BearingRow {
            pile_tip_level,
            r_b_cal: r_b_cal[i],
            r_s_cal: r_s_cal[i],
            f_nk_cal: f_nk_cal[i],
            r_c_cal: r_c_cal[i],
            r_c_d_net: r_c_d_net[i],
            f_nk_d: f_nk_d[i],
        });
    }

    let mut cpt = Cpt::new(id);
    if let Some(input) = input {
        if let Some(LocationWire {
            x: Some(x),
            y: Some(y),
        }) = input.location
        {
            cpt = Cpt::at(cpt.id, x, y);
        }
        if let Some(flag) = input.in_polygon {
            cpt = cpt.with_polygon_flag(flag);
        }
    }

    let pile_head = wire.annotations.and_then(|a| a.pile_head_level_nap);
    Ok(CptBearingResults::new(cpt, pile_head, rows)?)
}

/// Decode the `cpts` array of a bearing response into a result store.
///
/// # Errors
///
/// As [`decode_cpt_results`], plus duplicate test ids.
pub fn decode_bearing_response(
    document: &Value,
    cpt_input: &HashMap<String, CptInput>,
) -> Result<ResultStore> {
    let wire = BearingResponseWire::deserialize(document)?;
    let mut results = Vec::with_capacity(wire.cpts.len());
    for entry in &wire.cpts {
        let input = entry
            .get("test_id")
            .and_then(Value::as_str)
            .and_then(|id| cpt_input.get(id));
        results.push(decode_cpt_results(entry, input)?);
    }
    let store = ResultStore::new(results)?;
    tracing::debug!(
        event = "decode.bearing_response",
        n_cpts = store.len(),
        digest = store.digest(),
    );
    Ok(store)
}

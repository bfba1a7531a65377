//! Merge per-state municipality GeoJSON files into one FeatureCollection
//! for the dashboard map.

use std::path::Path;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::StoreError;
use crate::states::BRAZILIAN_STATES;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombineSummary {
    pub total_features: usize,
    /// (state code, features added), in state order, for files that were read.
    pub per_state: Vec<(&'static str, usize)>,
    pub missing: Vec<&'static str>,
}

/// Read `<dir>/<UF>.geojson` for every state and write the concatenated
/// features to `out` (compact JSON). Missing or unreadable state files are
/// skipped with a warning.
pub fn combine_geojson(dir: &Path, out: &Path) -> Result<CombineSummary, StoreError> {
    let mut summary = CombineSummary::default();
    let mut features: Vec<Value> = Vec::new();

    for state in BRAZILIAN_STATES {
        let path = dir.join(format!("{}.geojson", state.code));
        if !path.exists() {
            warn!(state = state.code, path = %path.display(), "state geojson not found");
            summary.missing.push(state.code);
            continue;
        }

        let parsed = std::fs::read(&path)
            .map_err(StoreError::from)
            .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).map_err(StoreError::from));
        let mut doc = match parsed {
            Ok(doc) => doc,
            Err(e) => {
                warn!(state = state.code, error = %e, "skipping unreadable state geojson");
                summary.missing.push(state.code);
                continue;
            }
        };

        let added = match doc.get_mut("features").map(Value::take) {
            Some(Value::Array(state_features)) => {
                let n = state_features.len();
                features.extend(state_features);
                n
            }
            _ => 0,
        };
        info!(state = state.code, municipalities = added, "state geojson added");
        summary.per_state.push((state.code, added));
    }

    summary.total_features = features.len();
    let combined = json!({
        "type": "FeatureCollection",
        "features": features,
    });

    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(out, serde_json::to_vec(&combined)?)?;
    info!(
        path = %out.display(),
        municipalities = summary.total_features,
        "combined geojson written"
    );
    Ok(summary)
}

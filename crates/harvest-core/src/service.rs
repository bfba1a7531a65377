//! Query/aggregation service over a swappable snapshot.
//!
//! Reads clone the current `Arc<Snapshot>` and work on it lock-free; `reload`
//! builds a complete new snapshot first and only then swaps the pointer.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use crate::error::{QueryError, StoreError};
use crate::index::{CropData, MunicipalityEntry, MunicipalityProfile};
use crate::locality::{is_map_code, normalize_municipality_code};
use crate::sources::{IndexSource, Snapshot};

/// Entries shown in a crop's ranking chart.
pub const CHART_TOP_N: usize = 20;

/// Reported as `last_update` when no processing run has been logged.
pub const LAST_UPDATE_PLACEHOLDER: &str = "2023-12-31T00:00:00";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parallel label/value sequences for a bar chart.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub total_crops: usize,
    pub total_municipalities: usize,
    pub total_records: usize,
    pub last_update: String,
}

pub struct CropService {
    source: Box<dyn IndexSource>,
    current: RwLock<Arc<Snapshot>>,
}

impl CropService {
    /// Build the service and load the first snapshot.
    pub async fn open(source: impl IndexSource + 'static) -> Result<Self, StoreError> {
        let snapshot = source.load().await?;
        info!(source = %source.describe(), crops = snapshot.crops.len(), "crop service ready");
        Ok(Self {
            source: Box::new(source),
            current: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// Re-read the source and swap in the new snapshot. On failure the
    /// previous snapshot stays in place.
    pub async fn reload(&self) -> Result<(), StoreError> {
        let fresh = match self.source.load().await {
            Ok(snapshot) => Arc::new(snapshot),
            Err(e) => {
                error!(source = %self.source.describe(), error = %e, "reload failed");
                return Err(e);
            }
        };
        let crops = fresh.crops.len();
        match self.current.write() {
            Ok(mut guard) => *guard = fresh,
            Err(poisoned) => *poisoned.into_inner() = fresh,
        }
        info!(crops, "crop index reloaded");
        Ok(())
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    /// Distinct crop names in code-point order.
    pub fn list_crops(&self) -> Vec<String> {
        let mut crops: Vec<String> = self.snapshot().crops.keys().cloned().collect();
        crops.sort();
        crops
    }

    /// Distinct municipality codes across all crops.
    pub fn list_municipalities(&self) -> BTreeSet<String> {
        self.snapshot()
            .crops
            .values()
            .flat_map(|municipalities| municipalities.keys().cloned())
            .collect()
    }

    pub fn get_crop_data(&self, crop_name: &str) -> Result<CropData, QueryError> {
        self.snapshot()
            .crops
            .get(crop_name)
            .cloned()
            .ok_or_else(|| QueryError::CropNotFound(crop_name.to_string()))
    }

    /// Crop data restricted to codes the map layer can join on.
    pub fn get_map_data(&self, crop_name: &str) -> Result<CropData, QueryError> {
        let mut data = self.get_crop_data(crop_name)?;
        data.retain(|code, _| is_map_code(code));
        Ok(data)
    }

    /// Top municipalities by harvested area, largest first. Ties keep
    /// insertion order.
    pub fn get_chart_data(&self, crop_name: &str) -> Result<ChartData, QueryError> {
        let snapshot = self.snapshot();
        let data = snapshot
            .crops
            .get(crop_name)
            .ok_or_else(|| QueryError::CropNotFound(crop_name.to_string()))?;

        let mut ranked: Vec<&MunicipalityEntry> = data.values().collect();
        ranked.sort_by(|a, b| b.harvested_area.total_cmp(&a.harvested_area));
        ranked.truncate(CHART_TOP_N);

        Ok(ChartData {
            labels: ranked
                .iter()
                .map(|e| format!("{} ({})", e.municipality_name, e.state_code))
                .collect(),
            values: ranked.iter().map(|e| e.harvested_area).collect(),
        })
    }

    pub fn get_municipality(&self, code: &str) -> Result<MunicipalityProfile, QueryError> {
        let code = normalize_municipality_code(Some(code));
        self.snapshot()
            .municipalities
            .get(&code)
            .cloned()
            .ok_or(QueryError::MunicipalityNotFound(code))
    }

    pub fn get_statistics(&self) -> Statistics {
        let snapshot = self.snapshot();
        let total_municipalities = snapshot
            .crops
            .values()
            .flat_map(|municipalities| municipalities.keys())
            .collect::<BTreeSet<_>>()
            .len();
        // One per (crop, municipality) pair, so a municipality counts once
        // per crop it grows.
        let total_records = snapshot.crops.values().map(|m| m.len()).sum();

        Statistics {
            total_crops: snapshot.crops.len(),
            total_municipalities,
            total_records,
            last_update: format_last_update(snapshot.last_update),
        }
    }
}

fn format_last_update(at: Option<DateTime<Utc>>) -> String {
    match at {
        Some(at) => at.format(TIMESTAMP_FORMAT).to_string(),
        None => LAST_UPDATE_PLACEHOLDER.to_string(),
    }
}

//! Reshape flat records into serving views.
//!
//! Both views keep insertion order (run order); consumers that need a
//! ranking sort explicitly. Repeated keys overwrite silently.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ingest::IngestedRecord;

/// Per-municipality value inside a crop bucket. Field names match the
/// persisted JSON artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MunicipalityEntry {
    pub municipality_name: String,
    pub state_code: String,
    pub harvested_area: f64,
}

/// municipality code -> entry, for one crop
pub type CropData = IndexMap<String, MunicipalityEntry>;

/// crop name -> municipality code -> entry
pub type CropIndex = IndexMap<String, CropData>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MunicipalityProfile {
    pub municipality_name: String,
    pub state_code: String,
    pub crops: IndexMap<String, f64>,
}

/// municipality code -> profile with every crop it grows
pub type MunicipalityIndex = IndexMap<String, MunicipalityProfile>;

pub fn build_crop_index(records: &[IngestedRecord]) -> CropIndex {
    let mut index = CropIndex::new();
    for record in records {
        index.entry(record.crop_name.clone()).or_default().insert(
            record.municipality_code.clone(),
            MunicipalityEntry {
                municipality_name: record.municipality_name.clone(),
                state_code: record.state_code.clone(),
                harvested_area: record.harvested_area,
            },
        );
    }
    index
}

pub fn build_municipality_index(records: &[IngestedRecord]) -> MunicipalityIndex {
    let mut index = MunicipalityIndex::new();
    for record in records {
        insert_profile(
            &mut index,
            &record.municipality_code,
            &record.municipality_name,
            &record.state_code,
            &record.crop_name,
            record.harvested_area,
        );
    }
    index
}

/// Same as `build_municipality_index`, starting from an already pivoted
/// crop view (what the file and database sources hand back).
pub fn pivot_to_municipalities(crops: &CropIndex) -> MunicipalityIndex {
    let mut index = MunicipalityIndex::new();
    for (crop_name, municipalities) in crops {
        for (code, entry) in municipalities {
            insert_profile(
                &mut index,
                code,
                &entry.municipality_name,
                &entry.state_code,
                crop_name,
                entry.harvested_area,
            );
        }
    }
    index
}

fn insert_profile(
    index: &mut MunicipalityIndex,
    code: &str,
    name: &str,
    state: &str,
    crop: &str,
    area: f64,
) {
    let profile = index
        .entry(code.to_string())
        .or_insert_with(|| MunicipalityProfile {
            municipality_name: name.to_string(),
            state_code: state.to_string(),
            crops: IndexMap::new(),
        });
    profile.municipality_name = name.to_string();
    profile.state_code = state.to_string();
    profile.crops.insert(crop.to_string(), area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(code: &str, crop: &str, area: f64) -> IngestedRecord {
        IngestedRecord {
            municipality_code: code.to_string(),
            municipality_name: format!("M{code}"),
            state_code: "MT".to_string(),
            crop_name: crop.to_string(),
            harvested_area: area,
            year: 2023,
        }
    }

    #[test]
    fn test_crop_index_groups_by_crop_then_code() {
        let records = vec![
            record("5108352", "Soja", 650000.0),
            record("5108352", "Milho", 285000.0),
            record("5105622", "Soja", 580000.0),
        ];
        let index = build_crop_index(&records);
        assert_eq!(index.keys().collect::<Vec<_>>(), vec!["Soja", "Milho"]);
        assert_eq!(
            index["Soja"].keys().collect::<Vec<_>>(),
            vec!["5108352", "5105622"]
        );
        assert_eq!(index["Milho"]["5108352"].harvested_area, 285000.0);
        assert_eq!(index["Milho"]["5108352"].municipality_name, "M5108352");
    }

    #[test]
    fn test_crop_index_last_write_wins() {
        let records = vec![record("1", "Soja", 1.0), record("1", "Soja", 2.0)];
        let index = build_crop_index(&records);
        assert_eq!(index["Soja"].len(), 1);
        assert_eq!(index["Soja"]["1"].harvested_area, 2.0);
    }

    #[test]
    fn test_municipality_index() {
        let records = vec![
            record("5108352", "Soja", 650000.0),
            record("5108352", "Milho", 285000.0),
            record("5105622", "Soja", 580000.0),
            record("5108352", "Milho", 1.0),
        ];
        let index = build_municipality_index(&records);
        assert_eq!(index.len(), 2);
        let sorriso = &index["5108352"];
        assert_eq!(sorriso.state_code, "MT");
        assert_eq!(sorriso.crops.len(), 2);
        assert_eq!(sorriso.crops["Milho"], 1.0);
    }

    #[test]
    fn test_pivot_matches_direct_build() {
        let records = vec![
            record("1", "Soja", 10.0),
            record("2", "Soja", 20.0),
            record("1", "Milho", 5.0),
        ];
        let direct = build_municipality_index(&records);
        let pivoted = pivot_to_municipalities(&build_crop_index(&records));
        assert_eq!(direct.len(), pivoted.len());
        for (code, profile) in &direct {
            assert_eq!(pivoted[code].crops.len(), profile.crops.len());
            for (crop, area) in &profile.crops {
                assert_eq!(pivoted[code].crops[crop], *area);
            }
        }
    }

    #[test]
    fn test_json_shape() {
        let index = build_crop_index(&[record("1100015", "Açaí", 3.0)]);
        let json = serde_json::to_string(&index).unwrap();
        assert_eq!(
            json,
            r#"{"Açaí":{"1100015":{"municipality_name":"M1100015","state_code":"MT","harvested_area":3.0}}}"#
        );
    }
}

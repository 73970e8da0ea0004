//! Per-parcel feature extraction for single-family residential parcels.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use crate::codes::TaxrollCodes;
use crate::error::{EtlError, Result};
use crate::fields::{self, ApnError};
use crate::pipeline::{StageCounts, Verdict};
use crate::tabular::Row;

pub const REJECT_NOT_SINGLE_FAMILY: &str = "not single family residence";
pub const REJECT_NO_APN: &str = "no parcel identifier present";
pub const REJECT_BAD_APN: &str = "unparseable parcel identifier";
pub const REJECT_EMPTY_CITY: &str = "empty property city";

/// Fields that must parse as strictly positive numbers. The rejection
/// reason is the field name itself.
const POSITIVE_FIELDS: &[&str] = &[
    "TOTAL VALUE CALCULATED",
    "LAND SQUARE FOOTAGE",
    "LIVING SQUARE FEET",
    "EFFECTIVE YEAR BUILT",
    "BEDROOMS",
    "TOTAL ROOMS",
    "TOTAL BATHS",
    "UNITS NUMBER",
];

/// Fields that must parse as non-negative numbers.
const NONNEGATIVE_FIELDS: &[&str] = &["FIREPLACE NUMBER", "PARKING SPACES"];

/// The fixed feature vector extracted per single-family parcel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParcelFeatures {
    pub apn: i64,
    pub census_tract: String,
    pub property_city: String,
    pub assessed_value: f64,
    pub land_area: f64,
    pub living_area: f64,
    pub effective_year_built: f64,
    pub bedrooms: f64,
    pub total_rooms: f64,
    pub total_baths: f64,
    pub units: f64,
    pub fireplaces: f64,
    pub parking_spaces: f64,
    pub has_pool: f64,
}

/// Finalized output of the parcel-feature stage.
#[derive(Debug)]
pub struct ParcelFeatureSet {
    pub features: BTreeMap<i64, ParcelFeatures>,
    pub counts: StageCounts,
}

pub struct ParcelAccumulator<'a> {
    codes: &'a TaxrollCodes,
    features: BTreeMap<i64, ParcelFeatures>,
    counts: StageCounts,
}

impl<'a> ParcelAccumulator<'a> {
    pub fn new(codes: &'a TaxrollCodes) -> Self {
        Self {
            codes,
            features: BTreeMap::new(),
            counts: StageCounts::default(),
        }
    }

    /// A duplicate parcel id is a data-integrity fault and aborts the run;
    /// everything else is a tallied verdict.
    pub fn observe(&mut self, row: &Row) -> Result<()> {
        match self.extract(row)? {
            Verdict::Accept(features) => {
                if self.features.contains_key(&features.apn) {
                    return Err(EtlError::DuplicateParcel(features.apn));
                }
                self.features.insert(features.apn, features);
                self.counts.accept();
            }
            Verdict::Reject(reason) => self.counts.reject(reason),
        }
        Ok(())
    }

    fn extract(&self, row: &Row) -> Result<Verdict<ParcelFeatures>> {
        if row.get("PROPERTY INDICATOR CODE")?.trim() != self.codes.single_family {
            return Ok(Verdict::Reject(REJECT_NOT_SINGLE_FAMILY));
        }

        let apn = match fields::resolve_apn(
            row.get("APN FORMATTED")?.trim(),
            row.get("APN UNFORMATTED")?.trim(),
        ) {
            Ok(apn) => apn,
            Err(ApnError::Missing) => return Ok(Verdict::Reject(REJECT_NO_APN)),
            Err(ApnError::Unparseable) => return Ok(Verdict::Reject(REJECT_BAD_APN)),
        };

        let mut positive = [0.0f64; POSITIVE_FIELDS.len()];
        for (slot, field) in positive.iter_mut().zip(POSITIVE_FIELDS.iter().copied()) {
            match fields::parse_positive(row.get(field)?) {
                Some(value) => *slot = value,
                None => return Ok(Verdict::Reject(field)),
            }
        }

        let mut nonnegative = [0.0f64; NONNEGATIVE_FIELDS.len()];
        for (slot, field) in nonnegative.iter_mut().zip(NONNEGATIVE_FIELDS.iter().copied()) {
            match fields::parse_nonnegative(row.get(field)?) {
                Some(value) => *slot = value,
                None => return Ok(Verdict::Reject(field)),
            }
        }

        let property_city = row.get("PROPERTY CITY")?.trim();
        if property_city.is_empty() {
            return Ok(Verdict::Reject(REJECT_EMPTY_CITY));
        }

        let has_pool = if row.get("POOL FLAG")?.trim() == "Y" {
            1.0
        } else {
            0.0
        };

        Ok(Verdict::Accept(ParcelFeatures {
            apn,
            census_tract: row.get("CENSUS TRACT")?.trim().to_string(),
            property_city: property_city.to_string(),
            assessed_value: positive[0],
            land_area: positive[1],
            living_area: positive[2],
            effective_year_built: positive[3],
            bedrooms: positive[4],
            total_rooms: positive[5],
            total_baths: positive[6],
            units: positive[7],
            fireplaces: nonnegative[0],
            parking_spaces: nonnegative[1],
            has_pool,
        }))
    }

    pub fn finalize(self) -> ParcelFeatureSet {
        info!(
            parcels = self.features.len(),
            accepted = self.counts.accepted,
            rejected = self.counts.rejected,
            "parcel feature extraction finalized"
        );
        ParcelFeatureSet {
            features: self.features,
            counts: self.counts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::PropertyClass;
    use crate::tabular::DelimitedReader;
    use std::collections::{HashMap, HashSet};

    fn codes() -> TaxrollCodes {
        TaxrollCodes {
            single_family: "10".to_string(),
            class_by_code: HashMap::from([("10".to_string(), PropertyClass::Residential)]),
            skip_property: HashSet::new(),
            unknown_land_use: "999".to_string(),
            school_land_use: "650".to_string(),
            park_land_use: "757".to_string(),
        }
    }

    const COLUMNS: &[(&str, &str)] = &[
        ("APN FORMATTED", "123-456"),
        ("APN UNFORMATTED", "123456"),
        ("PROPERTY INDICATOR CODE", "10"),
        ("CENSUS TRACT", "101110"),
        ("PROPERTY CITY", "LOS ANGELES"),
        ("TOTAL VALUE CALCULATED", "350000"),
        ("LAND SQUARE FOOTAGE", "6000"),
        ("LIVING SQUARE FEET", "1800"),
        ("EFFECTIVE YEAR BUILT", "1962"),
        ("BEDROOMS", "3"),
        ("TOTAL ROOMS", "6"),
        ("TOTAL BATHS", "2"),
        ("UNITS NUMBER", "1"),
        ("FIREPLACE NUMBER", "0"),
        ("PARKING SPACES", "2"),
        ("POOL FLAG", ""),
    ];

    fn taxroll_row(overrides: &[(&str, &str)]) -> Row {
        let mut values: Vec<(&str, &str)> = COLUMNS.to_vec();
        for &(key, value) in overrides {
            let slot = values
                .iter_mut()
                .find(|(k, _)| *k == key)
                .expect("unknown column in override");
            slot.1 = value;
        }
        let header: Vec<&str> = values.iter().map(|(k, _)| *k).collect();
        let data: Vec<&str> = values.iter().map(|(_, v)| *v).collect();
        let text = format!("{}\n{}\n", header.join("\t"), data.join("\t"));
        DelimitedReader::new(&text, '\t').unwrap().next().unwrap()
    }

    #[test]
    fn extracts_the_full_feature_vector() {
        let codes = codes();
        let mut acc = ParcelAccumulator::new(&codes);
        acc.observe(&taxroll_row(&[("POOL FLAG", "Y")])).unwrap();
        let out = acc.finalize();
        let features = &out.features[&123456];
        assert_eq!(features.census_tract, "101110");
        assert_eq!(features.property_city, "LOS ANGELES");
        assert_eq!(features.assessed_value, 350000.0);
        assert_eq!(features.bedrooms, 3.0);
        assert_eq!(features.fireplaces, 0.0);
        assert_eq!(features.has_pool, 1.0);
    }

    #[test]
    fn pool_flag_defaults_to_zero() {
        let codes = codes();
        let mut acc = ParcelAccumulator::new(&codes);
        acc.observe(&taxroll_row(&[("POOL FLAG", "N")])).unwrap();
        assert_eq!(acc.finalize().features[&123456].has_pool, 0.0);
    }

    #[test]
    fn non_single_family_parcels_are_rejected() {
        let codes = codes();
        let mut acc = ParcelAccumulator::new(&codes);
        acc.observe(&taxroll_row(&[("PROPERTY INDICATOR CODE", "23")]))
            .unwrap();
        let out = acc.finalize();
        assert!(out.features.is_empty());
        assert_eq!(
            out.counts.reasons.get(REJECT_NOT_SINGLE_FAMILY).copied(),
            Some(1)
        );
    }

    #[test]
    fn bad_numeric_fields_reject_with_the_field_name() {
        let cases: &[(&str, &str)] = &[
            ("TOTAL VALUE CALCULATED", "0"),
            ("LAND SQUARE FOOTAGE", ""),
            ("LIVING SQUARE FEET", "-5"),
            ("EFFECTIVE YEAR BUILT", "unknown"),
            ("BEDROOMS", "0"),
            ("TOTAL ROOMS", "0"),
            ("TOTAL BATHS", "0"),
            ("UNITS NUMBER", "0"),
            ("FIREPLACE NUMBER", "-1"),
            ("PARKING SPACES", "many"),
        ];
        for &(field, bad_value) in cases {
            let codes = codes();
            let mut acc = ParcelAccumulator::new(&codes);
            acc.observe(&taxroll_row(&[(field, bad_value)])).unwrap();
            let out = acc.finalize();
            assert_eq!(
                out.counts.reasons.get(field).copied(),
                Some(1),
                "expected rejection reason {field}: {:?}",
                out.counts.reasons
            );
        }
    }

    #[test]
    fn empty_city_is_rejected() {
        let codes = codes();
        let mut acc = ParcelAccumulator::new(&codes);
        acc.observe(&taxroll_row(&[("PROPERTY CITY", " ")])).unwrap();
        let out = acc.finalize();
        assert_eq!(out.counts.reasons.get(REJECT_EMPTY_CITY).copied(), Some(1));
    }

    #[test]
    fn duplicate_parcel_id_is_an_integrity_fault() {
        let codes = codes();
        let mut acc = ParcelAccumulator::new(&codes);
        acc.observe(&taxroll_row(&[])).unwrap();
        let err = acc.observe(&taxroll_row(&[])).unwrap_err();
        assert!(matches!(err, EtlError::DuplicateParcel(123456)));
    }
}

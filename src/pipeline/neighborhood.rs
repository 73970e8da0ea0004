//! Neighborhood aggregation: per census tract, how the tract's land area
//! divides among land-use kinds.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use crate::codes::{PropertyClass, TaxrollCodes};
use crate::error::Result;
use crate::pipeline::{StageCounts, Verdict};
use crate::tabular::Row;

pub const REJECT_EMPTY_TRACT: &str = "empty census tract";
pub const REJECT_SKIPPED_PROPERTY: &str = "vacant or unclassified parcel";
pub const REJECT_UNKNOWN_LAND_USE: &str = "unknown land use";
pub const REJECT_BAD_LAND_AREA: &str = "unparseable land area";

/// Land-use kinds tracked per tract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandKind {
    Residential,
    Commercial,
    Industrial,
    School,
    Park,
    Other,
}

const KIND_COUNT: usize = 6;

impl LandKind {
    fn index(self) -> usize {
        match self {
            LandKind::Residential => 0,
            LandKind::Commercial => 1,
            LandKind::Industrial => 2,
            LandKind::School => 3,
            LandKind::Park => 4,
            LandKind::Other => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct KindBucket {
    parcels: u64,
    land_area: f64,
}

/// Fraction of a tract's land area in each kind. Fractions sum to 1 for any
/// emitted tract; zero-area tracts are never emitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeighborhoodProfile {
    pub frac_residential: f64,
    pub frac_commercial: f64,
    pub frac_industrial: f64,
    pub frac_school: f64,
    pub frac_park: f64,
    pub frac_other: f64,
}

/// Finalized output of the neighborhood stage.
#[derive(Debug)]
pub struct NeighborhoodAggregates {
    pub profiles: BTreeMap<String, NeighborhoodProfile>,
    pub counts: StageCounts,
    /// Tracts dropped because their accumulated land area was zero.
    pub zero_area_tracts: u64,
}

pub struct NeighborhoodAccumulator<'a> {
    codes: &'a TaxrollCodes,
    tracts: BTreeMap<String, [KindBucket; KIND_COUNT]>,
    counts: StageCounts,
}

impl<'a> NeighborhoodAccumulator<'a> {
    pub fn new(codes: &'a TaxrollCodes) -> Self {
        Self {
            codes,
            tracts: BTreeMap::new(),
            counts: StageCounts::default(),
        }
    }

    pub fn observe(&mut self, row: &Row) -> Result<()> {
        match self.classify(row)? {
            Verdict::Accept((tract, kind, land_area)) => {
                let buckets = self.tracts.entry(tract).or_default();
                let bucket = &mut buckets[kind.index()];
                bucket.parcels += 1;
                bucket.land_area += land_area;
                self.counts.accept();
            }
            Verdict::Reject(reason) => self.counts.reject(reason),
        }
        Ok(())
    }

    fn classify(&self, row: &Row) -> Result<Verdict<(String, LandKind, f64)>> {
        let tract = row.get("CENSUS TRACT")?.trim();
        if tract.is_empty() {
            return Ok(Verdict::Reject(REJECT_EMPTY_TRACT));
        }

        let property_code = row.get("PROPERTY INDICATOR CODE")?.trim();
        if self.codes.skip_property.contains(property_code) {
            return Ok(Verdict::Reject(REJECT_SKIPPED_PROPERTY));
        }

        let land_use = row.get("LAND USE CODE")?.trim();
        if land_use == self.codes.unknown_land_use {
            return Ok(Verdict::Reject(REJECT_UNKNOWN_LAND_USE));
        }

        let land_area = match crate::fields::parse_nonnegative(row.get("LAND SQUARE FOOTAGE")?) {
            Some(value) => value,
            None => return Ok(Verdict::Reject(REJECT_BAD_LAND_AREA)),
        };

        let kind = match self.codes.classify(property_code) {
            PropertyClass::Residential => LandKind::Residential,
            PropertyClass::Commercial => LandKind::Commercial,
            PropertyClass::Industrial => LandKind::Industrial,
            PropertyClass::PublicService => {
                if land_use == self.codes.school_land_use {
                    LandKind::School
                } else {
                    LandKind::Other
                }
            }
            PropertyClass::Amusement => {
                if land_use == self.codes.park_land_use {
                    LandKind::Park
                } else {
                    LandKind::Other
                }
            }
            PropertyClass::Other => LandKind::Other,
        };

        Ok(Verdict::Accept((tract.to_string(), kind, land_area)))
    }

    pub fn finalize(self) -> NeighborhoodAggregates {
        let mut profiles = BTreeMap::new();
        let mut zero_area_tracts = 0u64;
        for (tract, buckets) in self.tracts {
            let total: f64 = buckets.iter().map(|b| b.land_area).sum();
            if total == 0.0 {
                zero_area_tracts += 1;
                continue;
            }
            let frac = |kind: LandKind| buckets[kind.index()].land_area / total;
            profiles.insert(
                tract,
                NeighborhoodProfile {
                    frac_residential: frac(LandKind::Residential),
                    frac_commercial: frac(LandKind::Commercial),
                    frac_industrial: frac(LandKind::Industrial),
                    frac_school: frac(LandKind::School),
                    frac_park: frac(LandKind::Park),
                    frac_other: frac(LandKind::Other),
                },
            );
        }
        info!(
            tracts = profiles.len(),
            zero_area_tracts,
            accepted = self.counts.accepted,
            rejected = self.counts.rejected,
            "neighborhood aggregation finalized"
        );
        NeighborhoodAggregates {
            profiles,
            counts: self.counts,
            zero_area_tracts,
        }
    }
}

//! Census-tract demographic aggregation.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::pipeline::{StageCounts, Verdict};
use crate::tabular::Row;

pub const REJECT_BAD_GEO_ID: &str = "geographic id too short";
pub const REJECT_BAD_COMMUTE_COUNT: &str = "unparseable commute count";
pub const REJECT_NO_COMMUTERS: &str = "no commuters";
pub const REJECT_BAD_MEDIAN_INCOME: &str = "unparseable median income";
pub const REJECT_BAD_HOUSING_COUNT: &str = "unparseable housing unit count";
pub const REJECT_NO_OCCUPIED_UNITS: &str = "no occupied housing units";
pub const REJECT_DUPLICATE_TRACT: &str = "duplicate tract";

/// The tract code sits at a fixed offset inside the geographic identifier,
/// after the 2-digit state and 3-digit county prefix.
const TRACT_OFFSET: usize = 5;
const TRACT_LEN: usize = 6;

/// Commute-time buckets with their representative minute values. The
/// open-ended "90 minutes or more" bucket is represented by 110.
const COMMUTE_BUCKETS: &[(&str, f64)] = &[
    ("COMMUTE UNDER 5 MINUTES", 2.5),
    ("COMMUTE 5 TO 9 MINUTES", 7.0),
    ("COMMUTE 10 TO 14 MINUTES", 12.0),
    ("COMMUTE 15 TO 19 MINUTES", 17.0),
    ("COMMUTE 20 TO 24 MINUTES", 22.0),
    ("COMMUTE 25 TO 29 MINUTES", 27.0),
    ("COMMUTE 30 TO 34 MINUTES", 32.0),
    ("COMMUTE 35 TO 44 MINUTES", 39.5),
    ("COMMUTE 45 TO 59 MINUTES", 52.0),
    ("COMMUTE 60 TO 89 MINUTES", 74.5),
    ("COMMUTE 90 OR MORE MINUTES", 110.0),
];

/// Derived tract-level statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CensusProfile {
    pub avg_commute: f64,
    pub median_income: f64,
    pub frac_owner_occupied: f64,
}

/// Finalized output of the census stage.
#[derive(Debug)]
pub struct CensusAggregates {
    pub profiles: BTreeMap<String, CensusProfile>,
    pub counts: StageCounts,
}

#[derive(Default)]
pub struct CensusAccumulator {
    profiles: BTreeMap<String, CensusProfile>,
    counts: StageCounts,
}

impl CensusAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, row: &Row) -> Result<()> {
        match self.derive(row)? {
            Verdict::Accept((tract, profile)) => {
                // First record wins; a repeated tract is tallied, not merged.
                if self.profiles.contains_key(&tract) {
                    self.counts.reject(REJECT_DUPLICATE_TRACT);
                } else {
                    self.profiles.insert(tract, profile);
                    self.counts.accept();
                }
            }
            Verdict::Reject(reason) => self.counts.reject(reason),
        }
        Ok(())
    }

    fn derive(&self, row: &Row) -> Result<Verdict<(String, CensusProfile)>> {
        let geo_id = row.get("GEO ID")?.trim();
        let tract: String = geo_id.chars().skip(TRACT_OFFSET).take(TRACT_LEN).collect();
        if tract.len() != TRACT_LEN {
            return Ok(Verdict::Reject(REJECT_BAD_GEO_ID));
        }

        let mut commuters = 0.0f64;
        let mut weighted_minutes = 0.0f64;
        for (field, minutes) in COMMUTE_BUCKETS.iter().copied() {
            let count: f64 = match row.get(field)?.trim().parse() {
                Ok(value) => value,
                Err(_) => return Ok(Verdict::Reject(REJECT_BAD_COMMUTE_COUNT)),
            };
            commuters += count;
            weighted_minutes += count * minutes;
        }
        if commuters == 0.0 {
            return Ok(Verdict::Reject(REJECT_NO_COMMUTERS));
        }

        let median_income: f64 = match row.get("MEDIAN HOUSEHOLD INCOME")?.trim().parse() {
            Ok(value) => value,
            Err(_) => return Ok(Verdict::Reject(REJECT_BAD_MEDIAN_INCOME)),
        };

        let occupied: f64 = match row.get("OCCUPIED HOUSING UNITS")?.trim().parse() {
            Ok(value) => value,
            Err(_) => return Ok(Verdict::Reject(REJECT_BAD_HOUSING_COUNT)),
        };
        let owner_occupied: f64 = match row.get("OWNER OCCUPIED HOUSING UNITS")?.trim().parse() {
            Ok(value) => value,
            Err(_) => return Ok(Verdict::Reject(REJECT_BAD_HOUSING_COUNT)),
        };
        if occupied == 0.0 {
            return Ok(Verdict::Reject(REJECT_NO_OCCUPIED_UNITS));
        }

        Ok(Verdict::Accept((
            tract,
            CensusProfile {
                avg_commute: weighted_minutes / commuters,
                median_income,
                frac_owner_occupied: owner_occupied / occupied,
            },
        )))
    }

    pub fn finalize(self) -> CensusAggregates {
        info!(
            tracts = self.profiles.len(),
            accepted = self.counts.accepted,
            rejected = self.counts.rejected,
            "census aggregation finalized"
        );
        CensusAggregates {
            profiles: self.profiles,
            counts: self.counts,
        }
    }
}

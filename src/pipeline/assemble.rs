//! Join assembly: one output row per deed whose parcel and tract resolve in
//! every other source.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use tracing::info;

use crate::pipeline::census::CensusProfile;
use crate::pipeline::deeds::DeedSale;
use crate::pipeline::neighborhood::NeighborhoodProfile;
use crate::pipeline::parcels::ParcelFeatures;

/// A fully assembled transaction: deed ++ parcel features ++ neighborhood
/// fractions ++ census statistics, plus the training-set label assigned by
/// the splitter.
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub apn: i64,
    pub sale_date: NaiveDate,
    pub sale_year: i32,
    pub sale_month: u32,
    pub sale_amount: f64,
    pub parcel: ParcelFeatures,
    pub neighborhood: NeighborhoodProfile,
    pub census: CensusProfile,
    pub in_training: bool,
}

impl Transaction {
    /// Every real-valued output column, in table order. Integer-typed
    /// columns (keys, year, month, the training flag) are not standardized.
    pub fn numeric_columns(&self) -> [(&'static str, f64); 21] {
        [
            ("sale_amount", self.sale_amount),
            ("assessed_value", self.parcel.assessed_value),
            ("land_area", self.parcel.land_area),
            ("living_area", self.parcel.living_area),
            ("effective_year_built", self.parcel.effective_year_built),
            ("bedrooms", self.parcel.bedrooms),
            ("total_rooms", self.parcel.total_rooms),
            ("total_baths", self.parcel.total_baths),
            ("units", self.parcel.units),
            ("fireplaces", self.parcel.fireplaces),
            ("parking_spaces", self.parcel.parking_spaces),
            ("has_pool", self.parcel.has_pool),
            ("frac_residential", self.neighborhood.frac_residential),
            ("frac_commercial", self.neighborhood.frac_commercial),
            ("frac_industrial", self.neighborhood.frac_industrial),
            ("frac_school", self.neighborhood.frac_school),
            ("frac_park", self.neighborhood.frac_park),
            ("frac_other", self.neighborhood.frac_other),
            ("avg_commute", self.census.avg_commute),
            ("median_income", self.census.median_income),
            ("frac_owner_occupied", self.census.frac_owner_occupied),
        ]
    }
}

/// Strict inner join. Deeds whose parcel or tract is missing from any of the
/// three other sources are dropped; misses are expected filtering and are
/// only reflected in the returned drop count.
pub fn assemble(
    deeds: &[DeedSale],
    parcels: &BTreeMap<i64, ParcelFeatures>,
    neighborhoods: &BTreeMap<String, NeighborhoodProfile>,
    census: &BTreeMap<String, CensusProfile>,
) -> (Vec<Transaction>, u64) {
    let mut transactions = Vec::new();
    let mut dropped = 0u64;
    for deed in deeds {
        let Some(parcel) = parcels.get(&deed.apn) else {
            dropped += 1;
            continue;
        };
        let Some(neighborhood) = neighborhoods.get(&parcel.census_tract) else {
            dropped += 1;
            continue;
        };
        let Some(census_profile) = census.get(&parcel.census_tract) else {
            dropped += 1;
            continue;
        };
        transactions.push(Transaction {
            apn: deed.apn,
            sale_date: deed.sale_date,
            sale_year: deed.sale_date.year(),
            sale_month: deed.sale_date.month(),
            sale_amount: deed.sale_amount,
            parcel: parcel.clone(),
            neighborhood: neighborhood.clone(),
            census: census_profile.clone(),
            in_training: false,
        });
    }
    info!(
        assembled = transactions.len(),
        dropped, "transaction assembly finished"
    );
    (transactions, dropped)
}

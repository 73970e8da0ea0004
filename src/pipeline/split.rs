//! Time-stratified training/holdout split.
//!
//! Each (sale year, sale month) period is visited in calendar order; within
//! a period, rows are visited in encounter order. One generator, seeded once
//! for the whole phase, draws a uniform value per row. Same seed, same
//! fraction, same ordering: same partition.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::pipeline::assemble::Transaction;

/// Calendar months from `first` through `last` inclusive.
fn month_periods(first: NaiveDate, last: NaiveDate) -> Vec<(i32, u32)> {
    let mut periods = Vec::new();
    let (mut year, mut month) = (first.year(), first.month());
    let end = (last.year(), last.month());
    while (year, month) <= end {
        periods.push((year, month));
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }
    periods
}

/// Label each transaction, returning (training, holdout) counts.
pub fn assign_training_labels(
    transactions: &mut [Transaction],
    seed: u64,
    fraction: f64,
    first_period: NaiveDate,
    last_period: NaiveDate,
) -> (u64, u64) {
    let mut by_period: BTreeMap<(i32, u32), Vec<usize>> = BTreeMap::new();
    for (index, transaction) in transactions.iter().enumerate() {
        by_period
            .entry((transaction.sale_year, transaction.sale_month))
            .or_default()
            .push(index);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    for period in month_periods(first_period, last_period) {
        let Some(rows) = by_period.get(&period) else {
            continue;
        };
        for &index in rows {
            transactions[index].in_training = rng.gen::<f64>() < fraction;
        }
    }

    let training = transactions.iter().filter(|t| t.in_training).count() as u64;
    let holdout = transactions.len() as u64 - training;
    info!(training, holdout, seed, fraction, "stratified split assigned");
    (training, holdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::census::CensusProfile;
    use crate::pipeline::neighborhood::NeighborhoodProfile;
    use crate::pipeline::parcels::ParcelFeatures;

    fn transaction(apn: i64, year: i32, month: u32) -> Transaction {
        Transaction {
            apn,
            sale_date: NaiveDate::from_ymd_opt(year, month, 15).unwrap(),
            sale_year: year,
            sale_month: month,
            sale_amount: 500000.0,
            parcel: ParcelFeatures {
                apn,
                census_tract: "101110".to_string(),
                property_city: "LOS ANGELES".to_string(),
                assessed_value: 350000.0,
                land_area: 6000.0,
                living_area: 1800.0,
                effective_year_built: 1962.0,
                bedrooms: 3.0,
                total_rooms: 6.0,
                total_baths: 2.0,
                units: 1.0,
                fireplaces: 1.0,
                parking_spaces: 2.0,
                has_pool: 0.0,
            },
            neighborhood: NeighborhoodProfile {
                frac_residential: 1.0,
                frac_commercial: 0.0,
                frac_industrial: 0.0,
                frac_school: 0.0,
                frac_park: 0.0,
                frac_other: 0.0,
            },
            census: CensusProfile {
                avg_commute: 28.5,
                median_income: 52000.0,
                frac_owner_occupied: 0.6,
            },
            in_training: false,
        }
    }

    fn date(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    #[test]
    fn periods_advance_one_month_at_a_time() {
        let periods = month_periods(date(2004, 11), date(2005, 2));
        assert_eq!(periods, vec![(2004, 11), (2004, 12), (2005, 1), (2005, 2)]);
    }

    #[test]
    fn single_month_range() {
        assert_eq!(month_periods(date(2005, 6), date(2005, 6)), vec![(2005, 6)]);
    }

    #[test]
    fn same_seed_reproduces_the_partition() {
        let build = || {
            let mut transactions: Vec<Transaction> = (0..200)
                .map(|i| transaction(i, 2005, (i % 12) as u32 + 1))
                .collect();
            assign_training_labels(&mut transactions, 113, 0.8, date(2005, 1), date(2005, 12));
            transactions.iter().map(|t| t.in_training).collect::<Vec<_>>()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn different_seeds_differ() {
        let build = |seed| {
            let mut transactions: Vec<Transaction> =
                (0..200).map(|i| transaction(i, 2005, 6)).collect();
            assign_training_labels(&mut transactions, seed, 0.5, date(2005, 1), date(2005, 12));
            transactions.iter().map(|t| t.in_training).collect::<Vec<_>>()
        };
        assert_ne!(build(1), build(2));
    }

    #[test]
    fn realized_fraction_converges_per_period() {
        let mut transactions: Vec<Transaction> =
            (0..5000).map(|i| transaction(i, 2005, 6)).collect();
        let (training, holdout) =
            assign_training_labels(&mut transactions, 113, 0.8, date(2005, 1), date(2005, 12));
        assert_eq!(training + holdout, 5000);
        let realized = training as f64 / 5000.0;
        assert!((realized - 0.8).abs() < 0.02, "realized {realized}");
    }

    #[test]
    fn rows_outside_the_period_range_stay_holdout() {
        let mut transactions = vec![transaction(1, 2010, 6)];
        let (training, holdout) =
            assign_training_labels(&mut transactions, 113, 1.0, date(2005, 1), date(2005, 12));
        assert_eq!(training, 0);
        assert_eq!(holdout, 1);
    }

    #[test]
    fn fraction_one_takes_every_row_in_range() {
        let mut transactions: Vec<Transaction> =
            (0..50).map(|i| transaction(i, 2005, 6)).collect();
        let (training, _) =
            assign_training_labels(&mut transactions, 7, 1.0, date(2005, 1), date(2005, 12));
        assert_eq!(training, 50);
    }
}

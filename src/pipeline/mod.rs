//! The assembly pipeline: code registries, per-entity validation and
//! aggregation, join assembly, stratified split, standardization, and
//! persistence, executed strictly in dependency order.

pub mod assemble;
pub mod census;
pub mod deeds;
pub mod neighborhood;
pub mod parcels;
pub mod split;
pub mod standardize;

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use crate::codes::{self, DeedCodes, TaxrollCodes};
use crate::config::Config;
use crate::error::Result;
use crate::storage::Database;
use crate::tabular::{self, DelimitedReader};

/// The outcome of validating one raw record.
pub enum Verdict<T> {
    Accept(T),
    Reject(&'static str),
}

/// Per-stage acceptance/rejection tallies. The reason map is ordered so the
/// reported breakdown is sorted.
#[derive(Debug, Default, Clone, Serialize)]
pub struct StageCounts {
    pub accepted: u64,
    pub rejected: u64,
    pub reasons: BTreeMap<String, u64>,
}

impl StageCounts {
    pub fn accept(&mut self) {
        self.accepted += 1;
    }

    pub fn reject(&mut self, reason: &str) {
        self.rejected += 1;
        *self.reasons.entry(reason.to_string()).or_default() += 1;
    }

    pub fn log(&self, stage: &str) {
        info!(
            stage,
            accepted = self.accepted,
            rejected = self.rejected,
            "stage finished"
        );
        for (reason, count) in &self.reasons {
            info!(stage, reason, count, "rejection breakdown");
        }
    }
}

/// Structured summary of a successful run, one block per stage.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub deeds: StageCounts,
    pub day_zero_normalized: u64,
    pub conflicted_keys: u64,
    pub neighborhoods: StageCounts,
    pub zero_area_tracts: u64,
    pub parcels: StageCounts,
    pub census: StageCounts,
    pub assembled: u64,
    pub join_dropped: u64,
    pub training_rows: u64,
    pub holdout_rows: u64,
    pub columns_standardized: u64,
}

impl RunSummary {
    pub fn log(&self) {
        self.deeds.log("deeds");
        self.neighborhoods.log("neighborhoods");
        self.parcels.log("parcels");
        self.census.log("census");
        info!(
            assembled = self.assembled,
            join_dropped = self.join_dropped,
            training = self.training_rows,
            holdout = self.holdout_rows,
            columns = self.columns_standardized,
            "run finished"
        );
    }
}

fn read_archive_text(path: &std::path::Path) -> Result<String> {
    let bytes = tabular::extract_archive(path)?;
    Ok(tabular::decode_latin1(&bytes))
}

/// Execute the full pipeline against the resolved configuration.
pub fn run(config: &Config) -> Result<RunSummary> {
    // Code registries come first; every validator resolves through them.
    let deed_registry = codes::load_reference_file(&config.in_codes_deeds, "deeds")?;
    let deed_codes = DeedCodes::resolve(&deed_registry)?;
    let taxroll_registry = codes::load_reference_file(&config.in_codes_taxrolls, "taxrolls")?;
    let taxroll_codes = TaxrollCodes::resolve(&taxroll_registry)?;

    let mut deed_acc =
        deeds::DeedAccumulator::new(deed_codes, config.date_cutoff, config.max_sale_amount);
    for path in &config.in_deeds {
        info!(path = %path.display(), "reading deeds");
        let text = read_archive_text(path)?;
        for row in DelimitedReader::new(&text, '\t')? {
            deed_acc.observe(&row)?;
        }
    }
    let deeds = deed_acc.finalize();

    // The neighborhood aggregator and the parcel extractor consume the same
    // raw taxroll stream.
    let mut neighborhood_acc = neighborhood::NeighborhoodAccumulator::new(&taxroll_codes);
    let mut parcel_acc = parcels::ParcelAccumulator::new(&taxroll_codes);
    for path in &config.in_taxrolls {
        info!(path = %path.display(), "reading taxrolls");
        let text = read_archive_text(path)?;
        for row in DelimitedReader::new(&text, '\t')? {
            neighborhood_acc.observe(&row)?;
            parcel_acc.observe(&row)?;
        }
    }
    let neighborhoods = neighborhood_acc.finalize();
    let parcels = parcel_acc.finalize();

    let mut census_acc = census::CensusAccumulator::new();
    info!(path = %config.in_census.display(), "reading census");
    let bytes = std::fs::read(&config.in_census)?;
    let text = tabular::decode_latin1(&bytes);
    let mut reader = DelimitedReader::new(&text, '\t')?;
    reader.skip_row(); // header-explanation row
    for row in reader {
        census_acc.observe(&row)?;
    }
    let census = census_acc.finalize();

    let (mut transactions, join_dropped) = assemble::assemble(
        &deeds.sales,
        &parcels.features,
        &neighborhoods.profiles,
        &census.profiles,
    );

    let (training_rows, holdout_rows) = split::assign_training_labels(
        &mut transactions,
        config.split_seed,
        config.split_fraction,
        config.census_known_date,
        config.last_transaction_date,
    );

    let stats = standardize::column_statistics(&transactions);

    let mut db = Database::open(&config.out_db)?;
    db.insert_transactions(&transactions)?;
    db.insert_standardization(&stats)?;

    let summary = RunSummary {
        deeds: deeds.counts,
        day_zero_normalized: deeds.day_zero_normalized,
        conflicted_keys: deeds.conflicted_keys,
        neighborhoods: neighborhoods.counts,
        zero_area_tracts: neighborhoods.zero_area_tracts,
        parcels: parcels.counts,
        census: census.counts,
        assembled: transactions.len() as u64,
        join_dropped,
        training_rows,
        holdout_rows,
        columns_standardized: stats.len() as u64,
    };
    summary.log();
    Ok(summary)
}

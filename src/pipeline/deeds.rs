//! Deed validation and deduplication.
//!
//! Raw deed rows pass through an ordered chain of business-rule predicates;
//! the first failure determines the tallied rejection reason. Surviving
//! records accumulate into a (parcel id, sale date) map in which conflicting
//! sale amounts poison the key: neither record is trusted, so neither is
//! emitted.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use tracing::info;

use crate::codes::DeedCodes;
use crate::error::Result;
use crate::fields::{self, ApnError};
use crate::pipeline::{StageCounts, Verdict};
use crate::tabular::Row;

pub const REJECT_NOT_SINGLE_FAMILY: &str = "not single family residence";
pub const REJECT_NOT_GRANT_DEED: &str = "not grant deed";
pub const REJECT_NOT_ARMS_LENGTH: &str = "not arms length";
pub const REJECT_MULTI_PARCEL: &str = "multi-parcel deed";
pub const REJECT_BAD_TRANSACTION_TYPE: &str = "bad transaction type";
pub const REJECT_NOT_FULL_PRICE: &str = "not full price";
pub const REJECT_BAD_SALE_DATE: &str = "unparseable sale date";
pub const REJECT_PREDATES_CUTOFF: &str = "sale predates cutoff";
pub const REJECT_NO_APN: &str = "no parcel identifier present";
pub const REJECT_BAD_APN: &str = "unparseable parcel identifier";
pub const REJECT_BAD_SALE_AMOUNT: &str = "unparseable sale amount";
pub const REJECT_AMOUNT_NOT_POSITIVE: &str = "sale amount not positive";
pub const REJECT_AMOUNT_ABOVE_MAXIMUM: &str = "sale amount above maximum";
pub const REJECT_CONFLICTING_AMOUNT: &str = "conflicting sale amount";

/// One validated, deduplicated sale.
#[derive(Debug, Clone, PartialEq)]
pub struct DeedSale {
    pub apn: i64,
    pub sale_date: NaiveDate,
    pub sale_amount: f64,
}

/// Finalized output of the deed stage.
#[derive(Debug)]
pub struct ValidatedDeeds {
    pub sales: Vec<DeedSale>,
    pub counts: StageCounts,
    /// Sales whose day-of-month of zero was normalized to day 1.
    pub day_zero_normalized: u64,
    /// Keys dropped entirely because two records disagreed on the amount.
    pub conflicted_keys: u64,
}

pub struct DeedAccumulator {
    codes: DeedCodes,
    date_cutoff: NaiveDate,
    max_sale_amount: f64,
    sales: BTreeMap<(i64, NaiveDate), f64>,
    conflicted: BTreeSet<(i64, NaiveDate)>,
    counts: StageCounts,
    day_zero_normalized: u64,
}

impl DeedAccumulator {
    pub fn new(codes: DeedCodes, date_cutoff: NaiveDate, max_sale_amount: f64) -> Self {
        Self {
            codes,
            date_cutoff,
            max_sale_amount,
            sales: BTreeMap::new(),
            conflicted: BTreeSet::new(),
            counts: StageCounts::default(),
            day_zero_normalized: 0,
        }
    }

    pub fn observe(&mut self, row: &Row) -> Result<()> {
        match self.validate(row)? {
            Verdict::Accept(sale) => self.accumulate(sale),
            Verdict::Reject(reason) => self.counts.reject(reason),
        }
        Ok(())
    }

    /// The ordered predicate chain. Fatal errors (a column missing from the
    /// file) propagate; everything else is a per-record verdict.
    fn validate(&mut self, row: &Row) -> Result<Verdict<DeedSale>> {
        if row.get("PROPERTY INDICATOR CODE")?.trim() != self.codes.single_family {
            return Ok(Verdict::Reject(REJECT_NOT_SINGLE_FAMILY));
        }
        if row.get("DOCUMENT TYPE CODE")?.trim() != self.codes.grant_deed {
            return Ok(Verdict::Reject(REJECT_NOT_GRANT_DEED));
        }
        if row.get("PRI CAT CODE")?.trim() != self.codes.arms_length {
            return Ok(Verdict::Reject(REJECT_NOT_ARMS_LENGTH));
        }

        let multi_flag = !row.get("MULTI APN FLAG CODE")?.trim().is_empty();
        let multi_count = row
            .get("MULTI APN COUNT")?
            .trim()
            .parse::<i64>()
            .map(|n| n > 1)
            .unwrap_or(false);
        if multi_flag || multi_count {
            return Ok(Verdict::Reject(REJECT_MULTI_PARCEL));
        }

        let transaction_type = match row.get("TRANSACTION TYPE CODE")?.trim().parse::<i64>() {
            Ok(value) => value,
            Err(_) => return Ok(Verdict::Reject(REJECT_BAD_TRANSACTION_TYPE)),
        };
        if transaction_type != self.codes.resale && transaction_type != self.codes.new_construction
        {
            return Ok(Verdict::Reject(REJECT_BAD_TRANSACTION_TYPE));
        }

        if row.get("SALE CODE")?.trim() != self.codes.full_price {
            return Ok(Verdict::Reject(REJECT_NOT_FULL_PRICE));
        }

        let parsed = match fields::parse_date(row.get("SALE DATE")?) {
            Some(parsed) => parsed,
            None => return Ok(Verdict::Reject(REJECT_BAD_SALE_DATE)),
        };
        if parsed.day_zero_normalized {
            self.day_zero_normalized += 1;
        }
        if parsed.date < self.date_cutoff {
            return Ok(Verdict::Reject(REJECT_PREDATES_CUTOFF));
        }

        let apn = match fields::resolve_apn(
            row.get("APN FORMATTED")?.trim(),
            row.get("APN UNFORMATTED")?.trim(),
        ) {
            Ok(apn) => apn,
            Err(ApnError::Missing) => return Ok(Verdict::Reject(REJECT_NO_APN)),
            Err(ApnError::Unparseable) => return Ok(Verdict::Reject(REJECT_BAD_APN)),
        };

        let sale_amount = match row.get("SALE AMOUNT")?.trim().parse::<f64>() {
            Ok(value) => value,
            Err(_) => return Ok(Verdict::Reject(REJECT_BAD_SALE_AMOUNT)),
        };
        if sale_amount <= 0.0 {
            return Ok(Verdict::Reject(REJECT_AMOUNT_NOT_POSITIVE));
        }
        if sale_amount > self.max_sale_amount {
            return Ok(Verdict::Reject(REJECT_AMOUNT_ABOVE_MAXIMUM));
        }

        Ok(Verdict::Accept(DeedSale {
            apn,
            sale_date: parsed.date,
            sale_amount,
        }))
    }

    fn accumulate(&mut self, sale: DeedSale) {
        let key = (sale.apn, sale.sale_date);
        if self.conflicted.contains(&key) {
            self.counts.reject(REJECT_CONFLICTING_AMOUNT);
            return;
        }
        match self.sales.get(&key) {
            Some(&existing) if existing != sale.sale_amount => {
                // Neither amount can be trusted; the key is dropped at finalize.
                self.conflicted.insert(key);
                self.counts.reject(REJECT_CONFLICTING_AMOUNT);
            }
            Some(_) => self.counts.accept(),
            None => {
                self.sales.insert(key, sale.sale_amount);
                self.counts.accept();
            }
        }
    }

    pub fn finalize(mut self) -> ValidatedDeeds {
        for key in &self.conflicted {
            self.sales.remove(key);
        }
        let conflicted_keys = self.conflicted.len() as u64;
        let sales: Vec<DeedSale> = self
            .sales
            .into_iter()
            .map(|((apn, sale_date), sale_amount)| DeedSale {
                apn,
                sale_date,
                sale_amount,
            })
            .collect();
        info!(
            accepted = self.counts.accepted,
            rejected = self.counts.rejected,
            surviving_keys = sales.len(),
            conflicted_keys,
            day_zero_normalized = self.day_zero_normalized,
            "deed validation finalized"
        );
        ValidatedDeeds {
            sales,
            counts: self.counts,
            day_zero_normalized: self.day_zero_normalized,
            conflicted_keys,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tabular::DelimitedReader;

    fn codes() -> DeedCodes {
        DeedCodes {
            single_family: "10".to_string(),
            grant_deed: "G".to_string(),
            arms_length: "A".to_string(),
            full_price: "F".to_string(),
            resale: 1,
            new_construction: 3,
        }
    }

    fn accumulator() -> DeedAccumulator {
        DeedAccumulator::new(
            codes(),
            NaiveDate::from_ymd_opt(1984, 1, 1).unwrap(),
            85_000_000.0,
        )
    }

    const COLUMNS: &[(&str, &str)] = &[
        ("APN FORMATTED", "123-456"),
        ("APN UNFORMATTED", "123456"),
        ("DOCUMENT TYPE CODE", "G"),
        ("PRI CAT CODE", "A"),
        ("PROPERTY INDICATOR CODE", "10"),
        ("MULTI APN FLAG CODE", ""),
        ("MULTI APN COUNT", "1"),
        ("TRANSACTION TYPE CODE", "1"),
        ("SALE CODE", "F"),
        ("SALE DATE", "20050615"),
        ("SALE AMOUNT", "500000"),
    ];

    fn deed_row(overrides: &[(&str, &str)]) -> Row {
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
    fn a_clean_deed_is_accepted() {
        let mut acc = accumulator();
        acc.observe(&deed_row(&[])).unwrap();
        let out = acc.finalize();
        assert_eq!(
            out.sales,
            vec![DeedSale {
                apn: 123456,
                sale_date: NaiveDate::from_ymd_opt(2005, 6, 15).unwrap(),
                sale_amount: 500000.0,
            }]
        );
        assert_eq!(out.counts.accepted, 1);
        assert_eq!(out.counts.rejected, 0);
    }

    #[test]
    fn each_violated_predicate_attributes_its_reason() {
        let cases: &[(&[(&str, &str)], &str)] = &[
            (&[("PROPERTY INDICATOR CODE", "21")], REJECT_NOT_SINGLE_FAMILY),
            (&[("DOCUMENT TYPE CODE", "Q")], REJECT_NOT_GRANT_DEED),
            (&[("PRI CAT CODE", "B")], REJECT_NOT_ARMS_LENGTH),
            (&[("MULTI APN FLAG CODE", "M")], REJECT_MULTI_PARCEL),
            (&[("MULTI APN COUNT", "2")], REJECT_MULTI_PARCEL),
            (&[("TRANSACTION TYPE CODE", "x")], REJECT_BAD_TRANSACTION_TYPE),
            (&[("TRANSACTION TYPE CODE", "2")], REJECT_BAD_TRANSACTION_TYPE),
            (&[("SALE CODE", "P")], REJECT_NOT_FULL_PRICE),
            (&[("SALE DATE", "garbage")], REJECT_BAD_SALE_DATE),
            (&[("SALE DATE", "19830615")], REJECT_PREDATES_CUTOFF),
            (
                &[("APN FORMATTED", ""), ("APN UNFORMATTED", "")],
                REJECT_NO_APN,
            ),
            (
                &[("APN FORMATTED", "abc"), ("APN UNFORMATTED", "xyz")],
                REJECT_BAD_APN,
            ),
            (&[("SALE AMOUNT", "lots")], REJECT_BAD_SALE_AMOUNT),
            (&[("SALE AMOUNT", "0")], REJECT_AMOUNT_NOT_POSITIVE),
            (&[("SALE AMOUNT", "90000000")], REJECT_AMOUNT_ABOVE_MAXIMUM),
        ];
        for (overrides, expected_reason) in cases {
            let mut acc = accumulator();
            acc.observe(&deed_row(overrides)).unwrap();
            let out = acc.finalize();
            assert!(out.sales.is_empty(), "expected rejection for {expected_reason}");
            assert_eq!(
                out.counts.reasons.get(*expected_reason).copied(),
                Some(1),
                "wrong reason tallied, expected {expected_reason}: {:?}",
                out.counts.reasons
            );
        }
    }

    #[test]
    fn new_construction_passes_the_transaction_type_predicate() {
        let mut acc = accumulator();
        acc.observe(&deed_row(&[("TRANSACTION TYPE CODE", "3")]))
            .unwrap();
        assert_eq!(acc.finalize().sales.len(), 1);
    }

    #[test]
    fn exact_duplicates_collapse_to_one_row() {
        let mut acc = accumulator();
        acc.observe(&deed_row(&[])).unwrap();
        acc.observe(&deed_row(&[])).unwrap();
        let out = acc.finalize();
        assert_eq!(out.sales.len(), 1);
        assert_eq!(out.counts.accepted, 2);
    }

    #[test]
    fn conflicting_amounts_poison_the_key() {
        let mut acc = accumulator();
        acc.observe(&deed_row(&[])).unwrap();
        acc.observe(&deed_row(&[("SALE AMOUNT", "600000")])).unwrap();
        // A third record for the same key is rejected outright.
        acc.observe(&deed_row(&[])).unwrap();
        let out = acc.finalize();
        assert!(out.sales.is_empty());
        assert_eq!(out.conflicted_keys, 1);
        assert_eq!(
            out.counts.reasons.get(REJECT_CONFLICTING_AMOUNT).copied(),
            Some(2)
        );
    }

    #[test]
    fn day_zero_dates_are_normalized_and_audited() {
        let mut acc = accumulator();
        acc.observe(&deed_row(&[("SALE DATE", "20050600")])).unwrap();
        let out = acc.finalize();
        assert_eq!(
            out.sales[0].sale_date,
            NaiveDate::from_ymd_opt(2005, 6, 1).unwrap()
        );
        assert_eq!(out.day_zero_normalized, 1);
    }

    #[test]
    fn missing_column_aborts_instead_of_tallying() {
        let text = "SALE DATE\tSALE AMOUNT\n20050615\t500000\n";
        let row = DelimitedReader::new(text, '\t').unwrap().next().unwrap();
        let mut acc = accumulator();
        assert!(acc.observe(&row).is_err());
    }
}

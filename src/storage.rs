//! Output persistence: the assembled transaction table and the per-column
//! standardization statistics, in a single SQLite database.

use std::path::Path;

use chrono::NaiveDate;
use rusqlite::{params, Connection};
use tracing::info;

use crate::error::Result;
use crate::pipeline::assemble::Transaction;
use crate::pipeline::standardize::ColumnStats;

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the output database and ensure the schema exists.
    /// Schema creation is separate from row insertion.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS transactions (
                apn                  INTEGER NOT NULL,
                sale_date            TEXT    NOT NULL,
                sale_year            INTEGER NOT NULL,
                sale_month           INTEGER NOT NULL,
                sale_amount          REAL    NOT NULL,
                census_tract         TEXT    NOT NULL,
                property_city        TEXT    NOT NULL,
                assessed_value       REAL    NOT NULL,
                land_area            REAL    NOT NULL,
                living_area          REAL    NOT NULL,
                effective_year_built REAL    NOT NULL,
                bedrooms             REAL    NOT NULL,
                total_rooms          REAL    NOT NULL,
                total_baths          REAL    NOT NULL,
                units                REAL    NOT NULL,
                fireplaces           REAL    NOT NULL,
                parking_spaces       REAL    NOT NULL,
                has_pool             REAL    NOT NULL,
                frac_residential     REAL    NOT NULL,
                frac_commercial      REAL    NOT NULL,
                frac_industrial      REAL    NOT NULL,
                frac_school          REAL    NOT NULL,
                frac_park            REAL    NOT NULL,
                frac_other           REAL    NOT NULL,
                avg_commute          REAL    NOT NULL,
                median_income        REAL    NOT NULL,
                frac_owner_occupied  REAL    NOT NULL,
                in_training          INTEGER NOT NULL,
                PRIMARY KEY (apn, sale_date)
            );
            CREATE TABLE IF NOT EXISTS standardization (
                column_name TEXT PRIMARY KEY,
                mean        REAL NOT NULL,
                median      REAL NOT NULL,
                std_dev     REAL NOT NULL
            );
            "#,
        )?;
        Ok(Self { conn })
    }

    /// Insert assembled transactions with one prepared statement inside one
    /// batch transaction.
    pub fn insert_transactions(&mut self, transactions: &[Transaction]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO transactions (
                    apn, sale_date, sale_year, sale_month, sale_amount,
                    census_tract, property_city,
                    assessed_value, land_area, living_area, effective_year_built,
                    bedrooms, total_rooms, total_baths, units,
                    fireplaces, parking_spaces, has_pool,
                    frac_residential, frac_commercial, frac_industrial,
                    frac_school, frac_park, frac_other,
                    avg_commute, median_income, frac_owner_occupied,
                    in_training
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                    ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26,
                    ?27, ?28
                )",
            )?;
            for t in transactions {
                stmt.execute(params![
                    t.apn,
                    t.sale_date.to_string(),
                    t.sale_year,
                    t.sale_month,
                    t.sale_amount,
                    t.parcel.census_tract,
                    t.parcel.property_city,
                    t.parcel.assessed_value,
                    t.parcel.land_area,
                    t.parcel.living_area,
                    t.parcel.effective_year_built,
                    t.parcel.bedrooms,
                    t.parcel.total_rooms,
                    t.parcel.total_baths,
                    t.parcel.units,
                    t.parcel.fireplaces,
                    t.parcel.parking_spaces,
                    t.parcel.has_pool,
                    t.neighborhood.frac_residential,
                    t.neighborhood.frac_commercial,
                    t.neighborhood.frac_industrial,
                    t.neighborhood.frac_school,
                    t.neighborhood.frac_park,
                    t.neighborhood.frac_other,
                    t.census.avg_commute,
                    t.census.median_income,
                    t.census.frac_owner_occupied,
                    t.in_training as i64,
                ])?;
            }
        }
        tx.commit()?;
        info!(rows = transactions.len(), "transactions persisted");
        Ok(())
    }

    pub fn insert_standardization(&mut self, stats: &[ColumnStats]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO standardization (column_name, mean, median, std_dev)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for s in stats {
                stmt.execute(params![s.column, s.mean, s.median, s.std_dev])?;
            }
        }
        tx.commit()?;
        info!(rows = stats.len(), "standardization statistics persisted");
        Ok(())
    }

    pub fn transaction_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Primary-key equality lookup of one sale amount.
    pub fn sale_amount(&self, apn: i64, sale_date: NaiveDate) -> Result<Option<f64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT sale_amount FROM transactions WHERE apn = ?1 AND sale_date = ?2")?;
        let mut rows = stmt.query(params![apn, sale_date.to_string()])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    /// Primary-key equality lookup of one column's statistics.
    pub fn standardization(&self, column: &str) -> Result<Option<(f64, f64, f64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT mean, median, std_dev FROM standardization WHERE column_name = ?1",
        )?;
        let mut rows = stmt.query(params![column])?;
        if let Some(row) = rows.next()? {
            Ok(Some((row.get(0)?, row.get(1)?, row.get(2)?)))
        } else {
            Ok(None)
        }
    }
}

//! Layered run configuration.
//!
//! Every invocation argument is either a JSON configuration file or a
//! `key=value` override. Resolution is first match wins: overrides, then the
//! files in argument order. Override values are coerced to an integer, then
//! a float, then any JSON literal, and finally kept as a string.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde_json::{Map, Value};
use tracing::info;

use crate::error::{EtlError, Result};

#[derive(Debug, Default)]
pub struct ConfigLayers {
    overrides: Map<String, Value>,
    layers: Vec<Map<String, Value>>,
}

fn parse_override(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Value::from(f);
    }
    if let Ok(v) = serde_json::from_str::<Value>(raw) {
        return v;
    }
    Value::from(raw)
}

impl ConfigLayers {
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut resolved = Self::default();
        for arg in args {
            if Path::new(arg).is_file() {
                let text = std::fs::read_to_string(arg)?;
                let value: Value = serde_json::from_str(&text)?;
                match value {
                    Value::Object(map) => resolved.layers.push(map),
                    _ => {
                        return Err(EtlError::Config(format!(
                            "config file {arg} is not a JSON object"
                        )))
                    }
                }
            } else if let Some((key, value)) = arg.split_once('=') {
                resolved
                    .overrides
                    .insert(key.to_string(), parse_override(value));
            } else {
                return Err(EtlError::Config(format!(
                    "invocation argument is neither a config file nor key=value: {arg}"
                )));
            }
        }
        Ok(resolved)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        if let Some(v) = self.overrides.get(key) {
            return Some(v);
        }
        self.layers.iter().find_map(|layer| layer.get(key))
    }

    pub fn keys(&self) -> BTreeSet<&str> {
        self.overrides
            .keys()
            .chain(self.layers.iter().flat_map(|layer| layer.keys()))
            .map(String::as_str)
            .collect()
    }

    /// Log every resolved key and value, list entries indexed.
    pub fn log_all(&self) {
        for key in self.keys() {
            match self.get(key) {
                Some(Value::Array(items)) => {
                    for (i, item) in items.iter().enumerate() {
                        info!("config key {key}[{i}] value {item}");
                    }
                }
                Some(value) => info!("config key {key} value {value}"),
                None => {}
            }
        }
    }

    fn require(&self, key: &str) -> Result<&Value> {
        self.get(key)
            .ok_or_else(|| EtlError::Config(format!("missing configuration key '{key}'")))
    }

    fn str(&self, key: &str) -> Result<String> {
        match self.require(key)? {
            Value::String(s) => Ok(s.clone()),
            other => Err(EtlError::Config(format!(
                "configuration key '{key}' must be a string, got {other}"
            ))),
        }
    }

    fn f64(&self, key: &str) -> Result<f64> {
        self.require(key)?
            .as_f64()
            .ok_or_else(|| EtlError::Config(format!("configuration key '{key}' must be a number")))
    }

    fn u64(&self, key: &str) -> Result<u64> {
        self.require(key)?.as_u64().ok_or_else(|| {
            EtlError::Config(format!(
                "configuration key '{key}' must be a non-negative integer"
            ))
        })
    }

    fn date(&self, key: &str) -> Result<NaiveDate> {
        let raw = self.str(key)?;
        NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| {
            EtlError::Config(format!(
                "configuration key '{key}' must be a YYYY-MM-DD date, got '{raw}'"
            ))
        })
    }

    fn str_list(&self, key: &str) -> Result<Vec<String>> {
        match self.require(key)? {
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(EtlError::Config(format!(
                        "configuration key '{key}' must be a list of strings, got {other}"
                    ))),
                })
                .collect(),
            other => Err(EtlError::Config(format!(
                "configuration key '{key}' must be a list, got {other}"
            ))),
        }
    }
}

/// The typed view of the configuration the pipeline actually reads.
#[derive(Debug, Clone)]
pub struct Config {
    pub in_deeds: Vec<PathBuf>,
    pub in_taxrolls: Vec<PathBuf>,
    pub in_census: PathBuf,
    pub in_codes_deeds: PathBuf,
    pub in_codes_taxrolls: PathBuf,
    pub out_db: PathBuf,
    pub date_cutoff: NaiveDate,
    pub max_sale_amount: f64,
    pub split_seed: u64,
    pub split_fraction: f64,
    pub census_known_date: NaiveDate,
    pub last_transaction_date: NaiveDate,
    pub logging_level: String,
}

impl Config {
    pub fn resolve(layers: &ConfigLayers) -> Result<Self> {
        let dir_data = PathBuf::from(layers.str("dir_data")?);
        let join = |raw: String| dir_data.join(raw);

        let split_fraction = layers.f64("split_fraction")?;
        if !(0.0..=1.0).contains(&split_fraction) {
            return Err(EtlError::Config(format!(
                "split_fraction must be within [0, 1], got {split_fraction}"
            )));
        }

        Ok(Self {
            in_deeds: layers.str_list("in_deeds")?.into_iter().map(join).collect(),
            in_taxrolls: layers
                .str_list("in_taxrolls")?
                .into_iter()
                .map(join)
                .collect(),
            in_census: join(layers.str("in_census")?),
            in_codes_deeds: join(layers.str("in_codes_deeds")?),
            in_codes_taxrolls: join(layers.str("in_codes_taxrolls")?),
            out_db: join(layers.str("out_db")?),
            date_cutoff: layers.date("date_cutoff")?,
            max_sale_amount: layers.f64("max_sale_amount")?,
            split_seed: layers.u64("split_seed")?,
            split_fraction,
            census_known_date: layers.date("census_known_date")?,
            last_transaction_date: layers.date("last_transaction_date")?,
            logging_level: match layers.get("logging_level") {
                Some(Value::String(s)) => s.clone(),
                _ => "info".to_string(),
            },
        })
    }
}

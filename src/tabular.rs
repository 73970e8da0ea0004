use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use tracing::debug;

use crate::error::{EtlError, Result};

/// One record of a delimited file, addressed by column name.
///
/// Rows shorter than the header read as empty strings for the missing
/// trailing fields; asking for a column the file does not have at all is a
/// schema violation and fails the run.
#[derive(Debug, Clone)]
pub struct Row {
    header: Arc<HashMap<String, usize>>,
    fields: Vec<String>,
}

impl Row {
    pub fn get(&self, column: &str) -> Result<&str> {
        let idx = self
            .header
            .get(column)
            .ok_or_else(|| EtlError::MissingColumn(column.to_string()))?;
        Ok(self.fields.get(*idx).map(String::as_str).unwrap_or(""))
    }
}

/// Iterator over the records of an in-memory delimited file.
///
/// The first line is the header. Fields are split on the delimiter with no
/// quote handling: the deed/taxroll extracts are tab-separated with no quote
/// escaping, and the code reference files are plain comma-separated.
pub struct DelimitedReader<'a> {
    header: Arc<HashMap<String, usize>>,
    lines: std::str::Lines<'a>,
    delimiter: char,
}

impl<'a> DelimitedReader<'a> {
    pub fn new(text: &'a str, delimiter: char) -> Result<Self> {
        let mut lines = text.lines();
        let header_line = lines
            .next()
            .ok_or_else(|| EtlError::Config("input file is empty".to_string()))?;
        let header: HashMap<String, usize> = header_line
            .trim_end_matches('\r')
            .split(delimiter)
            .enumerate()
            .map(|(i, name)| (name.trim().to_string(), i))
            .collect();
        Ok(Self {
            header: Arc::new(header),
            lines,
            delimiter,
        })
    }

    /// Skip one data row. The census extract carries a human-readable
    /// explanation row directly under the header.
    pub fn skip_row(&mut self) {
        self.lines.next();
    }
}

impl Iterator for DelimitedReader<'_> {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        loop {
            let line = self.lines.next()?;
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let fields = line.split(self.delimiter).map(str::to_string).collect();
            return Some(Row {
                header: Arc::clone(&self.header),
                fields,
            });
        }
    }
}

/// Extract the single member of a zip archive via the external `unzip`
/// utility, returning its raw bytes.
pub fn extract_archive(path: &Path) -> Result<Vec<u8>> {
    debug!("extracting archive {}", path.display());
    let output = Command::new("unzip").arg("-p").arg(path).output()?;
    if !output.status.success() {
        return Err(EtlError::Extract {
            path: path.display().to_string(),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output.stdout)
}

/// Decode a single-byte Western (Latin-1) buffer. Every byte maps directly
/// to the Unicode code point of the same value.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

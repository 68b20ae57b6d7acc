// Raw dataset CSV reading and facet table export

use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};

use facets_engine::{DatasetDescriptor, DatasetReader, EngineError, Table, Value};

use crate::error::IoError;

/// Read a dataset or classification export as UTF-8 text.
///
/// Statistical agencies publish in two encodings: UTF-8, often with a byte
/// order mark when saved from a spreadsheet, and Windows-1252 for older
/// Spanish-language exports. The mark is dropped so it cannot end up glued
/// to the first column name; anything that is not valid UTF-8 is decoded as
/// Windows-1252, which maps every byte.
pub fn read_file_as_utf8(path: &Path) -> Result<String, IoError> {
    let file_error = |source| IoError::File {
        origin: path.display().to_string(),
        source,
    };
    let mut file = std::fs::File::open(path).map_err(file_error)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(file_error)?;

    let text = match String::from_utf8(bytes) {
        Ok(mut s) => {
            if s.starts_with('\u{feff}') {
                s.drain(..'\u{feff}'.len_utf8());
            }
            s
        }
        Err(e) => {
            let (decoded, _) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(e.as_bytes());
            tracing::debug!(path = %path.display(), "decoded as windows-1252");
            decoded.into_owned()
        }
    };
    Ok(text)
}

/// Guess the field delimiter of a dataset export.
///
/// Exports from locales with a decimal comma use `;` and still contain
/// commas inside numbers, so a candidate is scored on whole records: the
/// number of sampled records with exactly the header's field count, times
/// that count. A candidate that leaves the header in one field never wins,
/// and with no winner the delimiter is `,`. Records come from the csv
/// reader, so quoted fields with embedded delimiters or newlines count once.
pub fn sniff_delimiter(content: &str) -> u8 {
    const CANDIDATES: [u8; 4] = [b';', b'\t', b',', b'|'];
    const SAMPLE_RECORDS: usize = 10;

    let mut best = (b',', 0usize);
    for delim in CANDIDATES {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delim)
            .has_headers(false)
            .flexible(true)
            .from_reader(content.as_bytes());
        let widths: Vec<usize> = reader
            .records()
            .take(SAMPLE_RECORDS)
            .map_while(Result::ok)
            .map(|record| record.len())
            .collect();
        let Some(&header) = widths.first().filter(|&&n| n > 1) else {
            continue;
        };
        let score = widths.iter().filter(|&&n| n == header).count() * header;
        if score > best.1 {
            best = (delim, score);
        }
    }

    tracing::trace!(delimiter = %char::from(best.0), score = best.1, "delimiter sniffed");
    best.0
}

/// Parse headed CSV text into a [`Table`]. Fields go through
/// [`Value::parse_field`]: empty is null, numbers become numbers.
pub fn parse_table(content: &str, delimiter: u8, origin: &str) -> Result<Table, IoError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader.headers().map_err(|e| IoError::csv(origin, e))?.clone();
    let mut seen = HashSet::new();
    for name in headers.iter() {
        if name.is_empty() || !seen.insert(name) {
            return Err(IoError::record(
                origin,
                1,
                format!("header '{name}' is empty or repeated"),
            ));
        }
    }

    let mut table = Table::new(headers.iter());
    for result in reader.records() {
        let record = result.map_err(|e| IoError::csv(origin, e))?;
        table.push_row(record.iter().map(Value::parse_field).collect())?;
    }

    tracing::debug!(origin, rows = table.len(), columns = table.columns().len(), "read table");
    Ok(table)
}

/// Read a dataset file, sniffing the delimiter.
pub fn read_table(path: &Path) -> Result<Table, IoError> {
    let content = read_file_as_utf8(path)?;
    let delimiter = sniff_delimiter(&content);
    parse_table(&content, delimiter, &path.display().to_string())
}

/// Write a table as comma-separated text with a header row. Nulls are
/// written as empty fields.
pub fn write_table(table: &Table, path: &Path) -> Result<(), IoError> {
    let origin = path.display().to_string();
    let mut writer = csv::WriterBuilder::new()
        .from_path(path)
        .map_err(|e| IoError::csv(&origin, e))?;

    writer
        .write_record(table.columns())
        .map_err(|e| IoError::csv(&origin, e))?;
    for row in table.rows() {
        writer
            .write_record(row.iter().map(|v| v.to_string()))
            .map_err(|e| IoError::csv(&origin, e))?;
    }

    writer.flush().map_err(|source| IoError::File { origin, source })?;
    Ok(())
}

/// Reads each descriptor's `source` file relative to a base directory.
#[derive(Debug, Clone)]
pub struct CsvReader {
    base_dir: PathBuf,
    delimiter: Option<u8>,
}

impl CsvReader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            delimiter: None,
        }
    }

    /// Use a fixed delimiter instead of sniffing.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn path_for(&self, descriptor: &DatasetDescriptor) -> Result<PathBuf, IoError> {
        descriptor
            .source
            .as_deref()
            .map(|source| self.base_dir.join(source))
            .ok_or_else(|| IoError::MissingSource(descriptor.name.clone()))
    }

    pub fn read_dataset(&self, descriptor: &DatasetDescriptor) -> Result<Table, IoError> {
        let path = self.path_for(descriptor)?;
        match self.delimiter {
            None => read_table(&path),
            Some(delimiter) => {
                let content = read_file_as_utf8(&path)?;
                parse_table(&content, delimiter, &path.display().to_string())
            }
        }
    }
}

impl DatasetReader for CsvReader {
    fn read(&self, descriptor: &DatasetDescriptor) -> Result<Table, EngineError> {
        self.read_dataset(descriptor)
            .map_err(|e| EngineError::Read(e.to_string()))
    }
}

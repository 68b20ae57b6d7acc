// Classification CSV loading

use std::path::Path;

use facets_engine::{Classification, ClassificationId, ClassificationRecord, Taxonomy};

use crate::dataset::{read_file_as_utf8, sniff_delimiter};
use crate::error::IoError;

const REQUIRED: [&str; 4] = ["id", "code", "level", "parent_id"];

/// Parse classification records from headed CSV text.
///
/// Required columns: `id`, `code`, `level`, `parent_id` (empty for roots).
/// Every `name*` column (`name`, `name_en`, `name_short_es`, ...) is kept as
/// a display label. Codes are taken verbatim, leading zeros included.
pub fn parse_classification_records(
    content: &str,
    delimiter: u8,
    origin: &str,
) -> Result<Vec<ClassificationRecord>, IoError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader.headers().map_err(|e| IoError::csv(origin, e))?.clone();
    let mut index = [0usize; 4];
    for (slot, column) in index.iter_mut().zip(REQUIRED) {
        *slot = headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| IoError::record(origin, 1, format!("missing column '{column}'")))?;
    }
    let [id_idx, code_idx, level_idx, parent_idx] = index;
    let display: Vec<(usize, &str)> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| h.starts_with("name"))
        .collect();

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result.map_err(|e| IoError::csv(origin, e))?;
        let line = row.position().map_or(0, |p| p.line());
        let field = |i: usize| row.get(i).unwrap_or("");
        let parse_id = |column: &str, raw: &str| -> Result<ClassificationId, IoError> {
            raw.parse()
                .map_err(|_| IoError::record(origin, line, format!("{column} '{raw}' is not an integer")))
        };

        let code = field(code_idx);
        if code.is_empty() {
            return Err(IoError::record(origin, line, "empty code"));
        }
        let parent = match field(parent_idx) {
            "" => None,
            raw => Some(parse_id("parent_id", raw)?),
        };
        let mut record = ClassificationRecord::new(parse_id("id", field(id_idx))?, code, field(level_idx), parent);
        for &(i, name) in &display {
            let label = field(i);
            if !label.is_empty() {
                record.display.insert(name.to_string(), label.to_string());
            }
        }
        records.push(record);
    }
    Ok(records)
}

/// Load one taxonomy's classification file.
pub fn load_classification(path: &Path, taxonomy: Taxonomy) -> Result<Classification, IoError> {
    let content = read_file_as_utf8(path)?;
    let records = parse_classification_records(&content, sniff_delimiter(&content), &path.display().to_string())?;
    tracing::debug!(path = %path.display(), taxonomy = %taxonomy.name, records = records.len(), "read classification");
    Ok(Classification::load(taxonomy, records)?)
}

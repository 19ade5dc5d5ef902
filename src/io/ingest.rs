//! CSV ingest.
//!
//! Turns an observation list (`category,<observable>[,weight]`) into one
//! unbinned [`Dataset`] per category.
//!
//! - **Strict schema**: the `category` and observable columns must exist
//! - **Row-level validation**: bad rows are skipped and reported, not fatal
//! - **Range filtering**: values outside the observable range are dropped with a warning

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use tracing::warn;

use crate::domain::{Dataset, Entry, Observable};
use crate::error::AppError;

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Ingest output: datasets keyed by category, plus row accounting.
#[derive(Debug, Clone)]
pub struct IngestedData {
    pub datasets: HashMap<String, Dataset>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    /// Rows whose value fell outside the observable range.
    pub rows_out_of_range: usize,
}

impl IngestedData {
    /// Dataset `data_obs_<category>`, or exit code 5 when the category has no rows.
    pub fn dataset(&self, category: &str) -> Result<&Dataset, AppError> {
        self.datasets.get(category).ok_or_else(|| {
            AppError::new(
                5,
                format!("Dataset data_obs_{category} not found: no rows for category '{category}'."),
            )
        })
    }
}

/// Load the observation CSV at `path`.
pub fn load_category_data(path: &Path, observable: &Observable) -> Result<IngestedData, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;
    read_category_data(file, observable)
}

/// Parse observations from any reader (file or in-memory).
pub fn read_category_data<R: Read>(input: R, observable: &Observable) -> Result<IngestedData, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    if !header_map.contains_key("category") {
        return Err(AppError::new(2, "Missing required column: `category`"));
    }
    let observable_key = normalize_header_name(&observable.name);
    if !header_map.contains_key(&observable_key) {
        return Err(AppError::new(
            5,
            format!("Observable column `{}` not found in input.", observable.name),
        ));
    }

    let mut datasets: HashMap<String, Dataset> = HashMap::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;
    let mut rows_out_of_range = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        let (category, entry) = match parse_row(&record, &header_map, &observable_key) {
            Ok(v) => v,
            Err(message) => {
                row_errors.push(RowError { line, message });
                continue;
            }
        };

        if !observable.contains(entry.value) {
            rows_out_of_range += 1;
            continue;
        }

        datasets
            .entry(category.to_string())
            .or_insert_with(|| Dataset {
                name: format!("data_obs_{category}"),
                observable: observable.clone(),
                entries: Vec::new(),
            })
            .entries
            .push(entry);
    }

    if rows_out_of_range > 0 {
        warn!(
            rows = rows_out_of_range,
            low = observable.low,
            high = observable.high,
            "dropped observations outside the observable range"
        );
    }
    for err in row_errors.iter().take(5) {
        warn!(line = err.line, "{}", err.message);
    }
    if row_errors.len() > 5 {
        warn!(more = row_errors.len() - 5, "further row errors suppressed");
    }

    Ok(IngestedData {
        datasets,
        row_errors,
        rows_read,
        rows_out_of_range,
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Strip a UTF-8 BOM left on the first header by spreadsheet exports.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn parse_row<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    observable_key: &str,
) -> Result<(&'a str, Entry), String> {
    let category = get_required(record, header_map, "category")?;
    let raw = get_required(record, header_map, observable_key)?;
    let value = parse_opt_f64(Some(raw)).ok_or_else(|| format!("Invalid `{observable_key}` value: '{raw}'"))?;

    let weight = match get_optional(record, header_map, "weight") {
        Some(raw) => parse_opt_f64(Some(raw)).ok_or_else(|| format!("Invalid `weight` value: '{raw}'"))?,
        None => 1.0,
    };

    Ok((category, Entry { value, weight }))
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    let idx = header_map
        .get(name)
        .ok_or_else(|| format!("Missing required column: `{name}`"))?;
    record
        .get(*idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_opt_f64(s: Option<&str>) -> Option<f64> {
    let s = s?;
    let v = s.parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observable() -> Observable {
        Observable::new("CMS_higgs_mass", 110.0, 170.0)
    }

    #[test]
    fn rows_are_grouped_by_category() {
        let csv = "\u{feff}Category,CMS_higgs_mass,weight\n\
                   cat0,115.0,1.0\n\
                   cat1,150.5,\n\
                   cat0,120.0,0.5\n";
        let data = read_category_data(csv.as_bytes(), &observable()).unwrap();

        assert_eq!(data.rows_read, 3);
        let cat0 = data.dataset("cat0").unwrap();
        assert_eq!(cat0.name, "data_obs_cat0");
        assert_eq!(cat0.entries.len(), 2);
        assert!((cat0.sum_entries() - 1.5).abs() < 1e-12);
        // Missing weight defaults to one.
        assert_eq!(data.dataset("cat1").unwrap().entries[0].weight, 1.0);
    }

    #[test]
    fn out_of_range_and_bad_rows_are_dropped() {
        let csv = "category,CMS_higgs_mass\n\
                   cat0,100.0\n\
                   cat0,abc\n\
                   cat0,170.0\n\
                   ,130.0\n";
        let data = read_category_data(csv.as_bytes(), &observable()).unwrap();

        assert_eq!(data.rows_out_of_range, 1);
        assert_eq!(data.row_errors.len(), 2);
        assert_eq!(data.row_errors[0].line, 3);
        assert_eq!(data.dataset("cat0").unwrap().entries.len(), 1);
    }

    #[test]
    fn missing_observable_column_is_fatal() {
        let csv = "category,mgg\ncat0,125.0\n";
        let err = read_category_data(csv.as_bytes(), &observable()).unwrap_err();
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn unknown_category_is_a_missing_dataset() {
        let csv = "category,CMS_higgs_mass\ncat0,125.0\n";
        let data = read_category_data(csv.as_bytes(), &observable()).unwrap();
        assert_eq!(data.dataset("cat7").unwrap_err().exit_code(), 5);
    }
}

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use anyhow::{anyhow, Context, Result};
use tracing::{debug, info, warn};

use crate::process::{normalize, ProcessOptions};
use crate::write::OutputFormat;

/// header text that anchors detection and names the protected column
pub const KEY_NAME_MARKER: &str = "車名";
/// column filled down on every data row
pub const ALWAYS_FILL_HEADER: &str = "Car Name";
/// column filled down until the next distinct value
pub const UNTIL_NEXT_FILL_HEADER: &str = "Common Name";
pub const DEFAULT_HEADERS_FILE: &str = "permittedHeaders.csv";
pub const DEFAULT_KEY_NAMES_FILE: &str = "autoList.csv";

/// normalized source label -> target label
pub type TranslationTable = HashMap<String, String>;
/// names that mark the first data row
pub type KeyNames = HashSet<String>;

/// Everything one run needs.
#[derive(Debug, Clone)]
pub struct Config {
    pub input_file: PathBuf,
    pub output_file: PathBuf,
    pub headers_file: PathBuf,
    pub key_names_file: PathBuf,
    /// `None` picks the format from the output extension
    pub format: Option<OutputFormat>,
    pub options: ProcessOptions,
}

impl Config {
    pub fn new<P: AsRef<Path>>(input_file: P, output_file: P, column_threshold: f64) -> Self {
        Self {
            input_file: input_file.as_ref().to_path_buf(),
            output_file: output_file.as_ref().to_path_buf(),
            headers_file: PathBuf::from(DEFAULT_HEADERS_FILE),
            key_names_file: PathBuf::from(DEFAULT_KEY_NAMES_FILE),
            format: None,
            options: ProcessOptions::with_threshold(column_threshold),
        }
    }

    /// fill threshold the processor runs with
    pub fn column_threshold(&self) -> f64 {
        self.options.column_threshold
    }

    /// Check arguments before any work is done.
    pub fn validate(&self) -> Result<()> {
        check_ratio(self.options.column_threshold, "column threshold")?;
        check_ratio(self.options.dedup_fill_ratio, "dedup ratio")?;
        if !self.input_file.is_file() {
            return Err(anyhow!("input file not found: {}", self.input_file.display()));
        }
        if let Some(parent) = self.output_file.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                info!(dir = %parent.display(), "output directory will be created");
            }
        }
        Ok(())
    }

    pub fn output_format(&self) -> Result<OutputFormat> {
        match self.format {
            Some(format) => Ok(format),
            None => OutputFormat::from_path(&self.output_file),
        }
    }
}

fn check_ratio(value: f64, what: &str) -> Result<f64> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(anyhow!("{} must be between 0 and 1, got {}", what, value))
    }
}

fn parse_ratio(s: &str, what: &str) -> Result<f64> {
    let value = s
        .trim()
        .parse::<f64>()
        .map_err(|_| anyhow!("invalid {}: {}", what, s))?;
    check_ratio(value, what)
}

/// Parse the fill threshold argument, a finite number within [0, 1].
pub fn parse_column_threshold(s: &str) -> Result<f64> {
    parse_ratio(s, "column threshold")
}

/// Parse the duplicate fill ratio argument, a finite number within [0, 1].
pub fn parse_dedup_ratio(s: &str) -> Result<f64> {
    parse_ratio(s, "dedup ratio")
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
}

/// Build a translation table from `source,target` records. Sources are stored normalized,
/// the first mapping of a source wins.
pub fn translation_table_from_reader<R: Read>(reader: R) -> Result<TranslationTable> {
    let mut table = TranslationTable::new();
    for record in csv_reader(reader).records() {
        let record = record?;
        let source = record.get(0).map(normalize).unwrap_or_default();
        if source.is_empty() {
            continue;
        }
        let target = record.iter().skip(1).collect::<Vec<_>>().join(",");
        let target = match target.trim() {
            "" => source.clone(),
            t => t.to_owned(),
        };
        table.entry(source).or_insert(target);
    }
    Ok(table)
}

/// Collect the first field of every record as a key name.
pub fn key_names_from_reader<R: Read>(reader: R) -> Result<KeyNames> {
    let mut names = KeyNames::new();
    for record in csv_reader(reader).records() {
        let record = record?;
        if let Some(name) = record.get(0).map(str::trim).filter(|s| !s.is_empty()) {
            names.insert(name.to_owned());
        }
    }
    Ok(names)
}

fn open<P: AsRef<Path>>(path: P) -> Result<File> {
    let path = path.as_ref();
    File::open(path).with_context(|| format!("cannot open {}", path.display()))
}

/// Load the translation table; an unreadable file gives an empty table.
pub fn load_translation_table<P: AsRef<Path>>(path: P) -> TranslationTable {
    let path = path.as_ref();
    match open(path).and_then(translation_table_from_reader) {
        Ok(table) => {
            debug!(file = %path.display(), entries = table.len(), "translation table loaded");
            table
        }
        Err(e) => {
            warn!(file = %path.display(), "header translations unavailable, labels kept as-is: {e:#}");
            TranslationTable::new()
        }
    }
}

/// Load key names; an unreadable file gives an empty set.
pub fn load_key_names<P: AsRef<Path>>(path: P) -> KeyNames {
    let path = path.as_ref();
    match open(path).and_then(key_names_from_reader) {
        Ok(names) => {
            debug!(file = %path.display(), entries = names.len(), "key names loaded");
            names
        }
        Err(e) => {
            warn!(file = %path.display(), "key names unavailable, header ends at the marker row: {e:#}");
            KeyNames::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_parsing() {
        assert_eq!(parse_column_threshold("0.3").unwrap(), 0.3);
        assert_eq!(parse_column_threshold(" 1 ").unwrap(), 1.0);
        assert_eq!(parse_column_threshold("0").unwrap(), 0.0);
        assert!(parse_column_threshold("1.5").is_err());
        assert!(parse_column_threshold("-0.1").is_err());
        assert!(parse_column_threshold("NaN").is_err());
        assert!(parse_column_threshold("abc").is_err());
    }

    #[test]
    fn translation_records() {
        let csv = "source,target\n全長,Length\n\n 全幅 , Width \n全高\n,orphan\n全長,Other\n備考,Note, extra\n";
        let table = translation_table_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table["全長"], "Length");
        assert_eq!(table["全幅"], "Width");
        assert_eq!(table["全高"], "全高");
        assert_eq!(table["備考"], "Note,extra");
    }

    #[test]
    fn multi_line_sources_are_normalized() {
        let csv = "source,target\n\"排気\r\n量\",Displacement\n\"全\n長\",Length\n";
        let table = translation_table_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(table["排気量"], "Displacement");
        assert_eq!(table["全長"], "Length");
        assert_eq!(table.get(&normalize("排気\n量")).map(String::as_str), Some("Displacement"));
    }

    #[test]
    fn key_name_records() {
        let csv = "name,country\nToyota,JP\n Honda \n\n,x\n";
        let names = key_names_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(names, KeyNames::from(["Toyota".to_string(), "Honda".to_string()]));
    }

    #[test]
    fn missing_files_give_empty_tables() {
        assert!(load_translation_table("no/such/file.csv").is_empty());
        assert!(load_key_names("no/such/file.csv").is_empty());
    }

    #[test]
    fn validate_rejects_missing_input() {
        let config = Config::new("no/such/input.xlsx", "out.json", 0.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn threshold_has_one_source() {
        let input = tempfile::NamedTempFile::new().unwrap();
        let mut config = Config::new(input.path(), Path::new("out.json"), 0.5);
        config.options.column_threshold = 0.9;
        assert_eq!(config.column_threshold(), 0.9);
        assert!(config.validate().is_ok());

        config.options.column_threshold = 1.5;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("column threshold"), "{err}");
    }

    #[test]
    fn ratio_errors_name_the_argument() {
        let err = parse_dedup_ratio("2").unwrap_err().to_string();
        assert!(err.contains("dedup ratio"), "{err}");
        assert!(!err.contains("column threshold"), "{err}");
        assert_eq!(parse_dedup_ratio("0.25").unwrap(), 0.25);
        assert!(parse_column_threshold("2").unwrap_err().to_string().contains("column threshold"));
    }
}

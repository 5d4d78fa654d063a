use std::{fs::{self, File}, io::BufWriter, path::Path};
use anyhow::{anyhow, Context, Result};
use tracing::debug;

use crate::process::ProcessedWorkBook;

#[cfg(feature = "xlsxwriter")]
mod xlsx;
#[cfg(feature = "xlsxwriter")]
pub use xlsx::XlsxWriter;

/// output file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Xlsx,
}

impl OutputFormat {
    /// format from the file extension, `.json` or `.xlsx`
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
            Some("json") => Ok(OutputFormat::Json),
            Some("xlsx") => Ok(OutputFormat::Xlsx),
            _ => Err(anyhow!("cannot tell output format from {}, use .json or .xlsx", path.display())),
        }
    }
}

/// create the parent directory of `path` when missing
pub fn ensure_parent_dir<P: AsRef<Path>>(path: P) -> Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).with_context(|| format!("cannot create {}", parent.display()))?;
            debug!(dir = %parent.display(), "output directory created");
        }
    }
    Ok(())
}

/// write the workbook as pretty-printed json
pub fn write_json<P: AsRef<Path>>(book: &ProcessedWorkBook, path: P) -> Result<()> {
    let path = path.as_ref();
    ensure_parent_dir(path)?;
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), book)?;
    Ok(())
}

/// one worksheet per processed sheet, header row first
#[cfg(feature = "xlsxwriter")]
pub fn write_xlsx<P: AsRef<Path>>(book: &ProcessedWorkBook, path: P) -> Result<()> {
    let mut writer = XlsxWriter::new();
    for sheet in &book.sheets {
        writer.append_rows(&sheet.name, &sheet.headers, &sheet.rows)?;
    }
    writer.save_as(path)
}

#[cfg(not(feature = "xlsxwriter"))]
pub fn write_xlsx<P: AsRef<Path>>(_book: &ProcessedWorkBook, path: P) -> Result<()> {
    Err(anyhow!("xlsx output needs the xlsxwriter feature: {}", path.as_ref().display()))
}

/// write `book` to `path` in `format`
pub fn write_workbook<P: AsRef<Path>>(book: &ProcessedWorkBook, path: P, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => write_json(book, path),
        OutputFormat::Xlsx => write_xlsx(book, path),
    }
}

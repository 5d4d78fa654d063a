use std::path::Path;
use anyhow::Result;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::{load_key_names, load_translation_table, Config, KeyNames, TranslationTable};
use crate::detect::HeaderRangeDetector;
use crate::diag::Diagnostics;
use crate::grid::Grid;
use crate::process::{ProcessOptions, ProcessedWorkBook, Processor};
use crate::read::read_workbook;
use crate::sheet::{Sheet, WorkBook};
use crate::write::write_workbook;

/// Outcome of one run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub book: ProcessedWorkBook,
    pub diagnostics: Vec<Diagnostics>,
}

impl RunSummary {
    pub fn warning_count(&self) -> usize {
        self.diagnostics.iter().map(|d| d.warnings().count()).sum()
    }
}

/// Lookup tables plus options, shared by every sheet of a run.
pub struct DataPrep {
    options: ProcessOptions,
    translations: TranslationTable,
    key_names: KeyNames,
}

impl DataPrep {
    pub fn new(options: ProcessOptions, translations: TranslationTable, key_names: KeyNames) -> Self {
        Self { options, translations, key_names }
    }

    /// Load the lookup tables named in `config`.
    pub fn from_config(config: &Config) -> Self {
        let translations = load_translation_table(&config.headers_file);
        let key_names = load_key_names(&config.key_names_file);
        Self::new(config.options.clone(), translations, key_names)
    }

    fn detector(&self) -> HeaderRangeDetector<'_> {
        HeaderRangeDetector::new(&self.options.protected_marker, &self.key_names)
            .with_min_header_cells(self.options.min_header_cells)
    }

    /// detect the header block of one grid and split it
    pub fn split_grid(&self, grid: &Grid) -> (Sheet, Diagnostics) {
        let mut diag = Diagnostics::new(&grid.name);
        let sheet = Sheet::from_grid(grid, &self.detector(), &mut diag);
        debug!(
            sheet = %sheet.name,
            header_start = sheet.header_range.start_row_index(),
            header_end = sheet.header_range.end_row_index(),
            data_rows = sheet.rows.len(),
            "sheet split"
        );
        (sheet, diag)
    }

    /// Split grids into a workbook in parallel, keeping their order.
    pub fn split_grids(&self, file_name: &str, grids: &[Grid]) -> (WorkBook, Vec<Diagnostics>) {
        let (sheets, diagnostics): (Vec<_>, Vec<_>) = grids.par_iter().map(|g| self.split_grid(g)).unzip();
        (WorkBook::new(file_name, sheets), diagnostics)
    }

    /// Split and process grids. Each sheet's detection events come before its processing events.
    pub fn process_grids(&self, file_name: &str, grids: &[Grid]) -> RunSummary {
        let (workbook, mut diagnostics) = self.split_grids(file_name, grids);
        let (book, processed) = Processor::new(&self.options, &self.translations).process(&workbook);
        for (diag, events) in diagnostics.iter_mut().zip(processed) {
            diag.extend(events);
        }
        RunSummary { book, diagnostics }
    }

    /// read, process and return the result without writing it
    pub fn process_file<P: AsRef<Path>>(&self, input: P) -> Result<RunSummary> {
        let input = input.as_ref();
        let grids = read_workbook(input)?;
        debug!(sheets = grids.len(), "workbook read");
        let file_name = input.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        Ok(self.process_grids(&file_name, &grids))
    }

    /// Run the whole pipeline described by `config`.
    pub fn execute(config: &Config) -> Result<RunSummary> {
        config.validate()?;
        let format = config.output_format()?;
        info!(
            input = %config.input_file.display(),
            output = %config.output_file.display(),
            threshold = config.column_threshold(),
            "processing started"
        );
        let prep = Self::from_config(config);
        let summary = prep.process_file(&config.input_file)?;
        for (sheet, diag) in summary.book.sheets.iter().zip(&summary.diagnostics) {
            let warnings = diag.warnings().count();
            if warnings > 0 {
                warn!(sheet = %sheet.name, warnings, "sheet processed with warnings");
            }
            info!(sheet = %sheet.name, columns = sheet.headers.len(), rows = sheet.rows.len(), "sheet processed");
        }
        write_workbook(&summary.book, &config.output_file, format)?;
        info!(
            output = %config.output_file.display(),
            sheets = summary.book.sheets.len(),
            warnings = summary.warning_count(),
            "processing finished"
        );
        Ok(summary)
    }
}

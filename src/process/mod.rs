use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::config::{TranslationTable, ALWAYS_FILL_HEADER, KEY_NAME_MARKER, UNTIL_NEXT_FILL_HEADER};
use crate::detect::MIN_HEADER_CELLS;
use crate::diag::{Diagnostic, Diagnostics};
use crate::grid::Row;
use crate::sheet::{Sheet, WorkBook};

/// Multi-row header resolution
pub mod header;
/// Fill filtering and duplicate resolution
pub mod columns;
/// Group column fill-down
pub mod filldown;

pub use columns::ResolvedColumn;
pub use header::{normalize, HeaderResolver};

/// data rows need this many non-empty cells to count as real
pub const DATA_ROW_MIN_CELLS: usize = 4;
/// duplicates below this share of the best fill rate are dropped
pub const DEDUP_FILL_RATIO: f64 = 0.5;

/// Tunables of the processing stages.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOptions {
    /// minimum fill ratio for a column to survive, within [0, 1]
    pub column_threshold: f64,
    /// pre-header rows have fewer non-empty cells than this
    pub min_header_cells: usize,
    pub data_row_min_cells: usize,
    pub dedup_fill_ratio: f64,
    /// header text of the protected column, also the detection marker
    pub protected_marker: String,
    pub always_fill_header: String,
    pub until_next_fill_header: String,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            column_threshold: 0.0,
            min_header_cells: MIN_HEADER_CELLS,
            data_row_min_cells: DATA_ROW_MIN_CELLS,
            dedup_fill_ratio: DEDUP_FILL_RATIO,
            protected_marker: KEY_NAME_MARKER.to_owned(),
            always_fill_header: ALWAYS_FILL_HEADER.to_owned(),
            until_next_fill_header: UNTIL_NEXT_FILL_HEADER.to_owned(),
        }
    }
}

impl ProcessOptions {
    pub fn with_threshold(column_threshold: f64) -> Self {
        Self { column_threshold, ..Self::default() }
    }
}

/// A cleaned sheet. Every row is aligned with `headers`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessedSheet {
    pub name: String,
    pub index: usize,
    pub original_row_count: usize,
    pub original_column_count: usize,
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

/// A cleaned workbook, sheets in workbook order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessedWorkBook {
    pub file_name: String,
    pub sheets: Vec<ProcessedSheet>,
}

/// Runs the processing stages on split sheets.
#[derive(Debug, Clone)]
pub struct Processor<'a> {
    options: &'a ProcessOptions,
    translations: &'a TranslationTable,
}

impl<'a> Processor<'a> {
    pub fn new(options: &'a ProcessOptions, translations: &'a TranslationTable) -> Self {
        Self { options, translations }
    }

    /// fill filter, header resolution, unlabelled and duplicate removal, fill-down
    pub fn process_sheet(&self, sheet: &Sheet, diag: &mut Diagnostics) -> ProcessedSheet {
        let opts = self.options;
        let protected = columns::find_protected_column(&sheet.raw_header_rows, &opts.protected_marker);
        if protected.is_none() {
            diag.push(Diagnostic::ProtectedColumnNotFound { marker: opts.protected_marker.clone() });
        }
        let kept = columns::columns_to_keep(
            &sheet.rows,
            sheet.original_column_count,
            protected,
            opts.column_threshold,
            diag,
        );
        debug!(sheet = %sheet.name, kept = kept.len(), total = sheet.original_column_count, "fill filter done");

        let labels = HeaderResolver::new(self.translations).resolve(&sheet.raw_header_rows, &kept, diag);
        let labelled = columns::drop_unlabelled(&kept, labels, diag);
        let resolved = columns::resolve_duplicates(
            labelled,
            &sheet.rows,
            opts.data_row_min_cells,
            opts.dedup_fill_ratio,
            diag,
        );
        if resolved.is_empty() {
            diag.push(Diagnostic::NoColumnsKept);
        }

        let (headers, rows) = columns::select_columns(&sheet.rows, &resolved);
        let rows = filldown::fill_down(
            &headers,
            &rows,
            &opts.always_fill_header,
            &opts.until_next_fill_header,
            opts.data_row_min_cells,
            diag,
        );
        ProcessedSheet {
            name: sheet.name.clone(),
            index: sheet.index,
            original_row_count: sheet.original_row_count,
            original_column_count: sheet.original_column_count,
            headers,
            rows,
        }
    }

    /// Process every sheet in parallel. Results keep workbook order, with one diagnostics list per sheet.
    pub fn process(&self, book: &WorkBook) -> (ProcessedWorkBook, Vec<Diagnostics>) {
        let (sheets, diags): (Vec<_>, Vec<_>) = book
            .sheets
            .par_iter()
            .map(|sheet| {
                let mut diag = Diagnostics::new(&sheet.name);
                let processed = self.process_sheet(sheet, &mut diag);
                (processed, diag)
            })
            .unzip();
        (ProcessedWorkBook { file_name: book.file_name.clone(), sheets }, diags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::HeaderRange;

    fn rows(rows: &[&[&str]]) -> Vec<Row> {
        rows.iter().map(|r| r.iter().copied().collect()).collect()
    }

    fn sheet(name: &str, header: &[&[&str]], data: &[&[&str]]) -> Sheet {
        let raw_header_rows = rows(header);
        Sheet {
            name: name.to_owned(),
            index: 0,
            original_row_count: header.len() + data.len(),
            original_column_count: raw_header_rows.iter().map(Row::len).max().unwrap_or(0),
            header_range: HeaderRange::new(0, header.len().saturating_sub(1)).unwrap(),
            raw_header_rows,
            rows: rows(data),
        }
    }

    fn table(pairs: &[(&str, &str)]) -> TranslationTable {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn process_sheet_end_to_end() {
        let s = sheet(
            "cars",
            &[&["車名", "通称名", "寸法", "寸法", "排気量", "備考"], &["", "", "全長", "全幅", "", ""]],
            &[
                &["Toyota", "Corolla", "4500", "1780", "1500", ""],
                &["", "", "4600", "1790", "1800", ""],
                &["Honda", "Civic", "4550", "1800", "2000", "x"],
                &["", "Fit", "3990", "1695", "1300", ""],
            ],
        );
        let translations = table(&[
            ("車名", "Car Name"),
            ("通称名", "Common Name"),
            ("全長", "Length"),
            ("全幅", "Width"),
            ("排気量", "Displacement"),
        ]);
        let options = ProcessOptions::with_threshold(0.5);
        let mut diag = Diagnostics::new("cars");
        let out = Processor::new(&options, &translations).process_sheet(&s, &mut diag);

        assert_eq!(out.headers, vec!["Car Name", "Common Name", "Length", "Width", "Displacement"]);
        assert_eq!(
            out.rows,
            rows(&[
                &["Toyota", "Corolla", "4500", "1780", "1500"],
                &["Toyota", "Corolla", "4600", "1790", "1800"],
                &["Honda", "Civic", "4550", "1800", "2000"],
                &["Honda", "Fit", "3990", "1695", "1300"],
            ])
        );
        assert_eq!(out.original_column_count, 6);
        assert!(diag.iter().any(|e| matches!(e, Diagnostic::ColumnRemoved { column: 5, .. })));
    }

    #[test]
    fn protected_column_survives_low_fill() {
        let s = sheet(
            "s",
            &[&["車名", "a", "b", "c"]],
            &[&["Toyota", "1", "2", "3"], &["", "4", "5", "6"], &["", "7", "8", "9"], &["", "1", "2", "3"]],
        );
        let translations = TranslationTable::new();
        let options = ProcessOptions::with_threshold(0.9);
        let mut diag = Diagnostics::new("s");
        let out = Processor::new(&options, &translations).process_sheet(&s, &mut diag);
        assert_eq!(out.headers, vec!["車名", "a", "b", "c"]);
    }

    #[test]
    fn no_data_rows_gives_empty_sheet() {
        let s = sheet("s", &[&["車名", "a", "b"]], &[]);
        let translations = TranslationTable::new();
        let options = ProcessOptions::with_threshold(0.5);
        let mut diag = Diagnostics::new("s");
        let out = Processor::new(&options, &translations).process_sheet(&s, &mut diag);
        assert!(out.headers.is_empty());
        assert!(out.rows.is_empty());
        assert!(diag.iter().any(|e| matches!(e, Diagnostic::NoDataRows)));
        assert!(diag.iter().any(|e| matches!(e, Diagnostic::NoColumnsKept)));
    }

    #[test]
    fn workbook_keeps_sheet_order() {
        let book = WorkBook::new(
            "book.xlsx",
            (0..8).map(|i| sheet(&format!("s{i}"), &[&["車名", "a", "b"]], &[&["x", "1", "2"]])).collect(),
        );
        let translations = TranslationTable::new();
        let options = ProcessOptions::with_threshold(0.0);
        let (out, diags) = Processor::new(&options, &translations).process(&book);
        let names: Vec<&str> = out.sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7"]);
        assert_eq!(diags.len(), 8);
        assert_eq!(diags[3].sheet, "s3");
    }
}

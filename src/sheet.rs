use serde::Serialize;

use crate::detect::{HeaderRange, HeaderRangeDetector};
use crate::diag::{Diagnostic, Diagnostics};
use crate::grid::{Grid, Row};

/// A sheet split into header and data rows, with merged values expanded.
#[derive(Debug, Clone, Serialize)]
pub struct Sheet {
    pub name: String,
    pub index: usize,
    /// data rows, below the header block
    pub rows: Vec<Row>,
    pub original_row_count: usize,
    /// widest raw header row
    pub original_column_count: usize,
    pub header_range: HeaderRange,
    pub raw_header_rows: Vec<Row>,
}

impl Sheet {
    /// Split `grid` at the detected header range, or at row 0 when the marker is missing.
    pub fn from_grid(grid: &Grid, detector: &HeaderRangeDetector, diag: &mut Diagnostics) -> Self {
        let detected = detector.detect(grid, diag);
        let header_range = detected.unwrap_or_else(|| HeaderRange::single(0));
        if detected.is_some() {
            check_data_start(grid, header_range, detector, diag);
        }
        Self::split(grid, header_range)
    }

    /// Split `grid` at a known header range.
    pub fn split(grid: &Grid, header_range: HeaderRange) -> Self {
        let row_count = grid.row_count();
        let header_end = header_range.end_row_index().min(row_count.saturating_sub(1));
        let raw_header_rows: Vec<Row> = (header_range.start_row_index()..=header_end)
            .filter(|&r| r < row_count)
            .map(|r| grid.expanded_row(r))
            .collect();
        let rows = (header_range.data_start_row_index()..row_count)
            .map(|r| grid.expanded_row(r))
            .collect();
        let original_column_count = raw_header_rows.iter().map(Row::len).max().unwrap_or(0);
        Self {
            name: grid.name.clone(),
            index: grid.index,
            rows,
            original_row_count: row_count,
            original_column_count,
            header_range,
            raw_header_rows,
        }
    }
}

fn check_data_start(grid: &Grid, range: HeaderRange, detector: &HeaderRangeDetector, diag: &mut Diagnostics) {
    if detector.key_names().is_empty() {
        return;
    }
    let row = range.data_start_row_index();
    let value = grid.cell(row, 0).trim();
    if row >= grid.row_count() || !detector.key_names().contains(value) {
        diag.push(Diagnostic::DataStartMismatch { row, value: value.to_owned() });
    }
}

/// A workbook as a list of split sheets.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkBook {
    pub file_name: String,
    pub sheets: Vec<Sheet>,
}

impl WorkBook {
    pub fn new(file_name: &str, sheets: Vec<Sheet>) -> Self {
        Self { file_name: file_name.to_owned(), sheets }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use super::*;
    use crate::grid::MergedValues;

    fn rows(rows: &[&[&str]]) -> Vec<Row> {
        rows.iter().map(|r| r.iter().copied().collect()).collect()
    }

    #[test]
    fn split_expands_merged_headers() {
        let raw = rows(&[
            &["title"],
            &["車名", "Size", "", ""],
            &["", "Length", "Width", "Height"],
            &["Toyota", "1", "2", "3"],
            &["Honda", "4", "5", "6"],
        ]);
        // B2:D2 and A2:A3
        let merged = MergedValues::from_ranges(&raw, &[((2, 2), (2, 4)), ((2, 1), (3, 1))]);
        let grid = Grid::new("cars", 1, raw, merged);
        let keys: HashSet<String> = ["Toyota".to_string()].into();
        let mut diag = Diagnostics::new("cars");
        let sheet = Sheet::from_grid(&grid, &HeaderRangeDetector::new("車名", &keys), &mut diag);

        assert_eq!(sheet.header_range, HeaderRange::new(1, 2).unwrap());
        assert_eq!(sheet.raw_header_rows, rows(&[&["車名", "Size", "Size", "Size"], &["車名", "Length", "Width", "Height"]]));
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.original_row_count, 5);
        assert_eq!(sheet.original_column_count, 4);
        assert!(diag.warnings().next().is_none());
    }

    #[test]
    fn missing_marker_uses_first_row() {
        let grid = Grid::new("s", 0, rows(&[&["a", "b"], &["1", "2"]]), MergedValues::default());
        let keys = HashSet::new();
        let mut diag = Diagnostics::new("s");
        let sheet = Sheet::from_grid(&grid, &HeaderRangeDetector::new("車名", &keys), &mut diag);
        assert_eq!(sheet.header_range, HeaderRange::single(0));
        assert_eq!(sheet.rows, rows(&[&["1", "2"]]));
    }

    #[test]
    fn data_start_mismatch_is_reported() {
        let raw = rows(&[&["車名", "a", "b"], &["note", "", ""], &["Toyota", "1", "2"]]);
        let grid = Grid::new("s", 0, raw, MergedValues::default());
        let keys: HashSet<String> = ["Toyota".to_string()].into();
        let mut diag = Diagnostics::new("s");
        let sheet = Sheet::from_grid(&grid, &HeaderRangeDetector::new("車名", &keys), &mut diag);
        // the note row is folded into the header block, so data starts at Toyota
        assert_eq!(sheet.header_range, HeaderRange::new(0, 1).unwrap());
        assert!(diag.warnings().next().is_none());

        let raw = rows(&[&["車名", "a", "b"]]);
        let grid = Grid::new("s", 0, raw, MergedValues::default());
        let mut diag = Diagnostics::new("s");
        let sheet = Sheet::from_grid(&grid, &HeaderRangeDetector::new("車名", &keys), &mut diag);
        assert!(sheet.rows.is_empty());
        assert!(diag.iter().any(|e| matches!(e, Diagnostic::DataStartMismatch { row: 1, .. })));
    }
}

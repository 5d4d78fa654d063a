use std::collections::HashSet;

use crate::diag::{Diagnostic, Diagnostics};
use crate::grid::Grid;

/// rows with fewer non-empty cells than this are pre-header metadata
pub const MIN_HEADER_CELLS: usize = 3;

/// Inclusive, 0-based row span holding the column labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct HeaderRange {
    start_row_index: usize,
    end_row_index: usize,
}

impl HeaderRange {
    /// `None` when `start > end`
    pub fn new(start_row_index: usize, end_row_index: usize) -> Option<Self> {
        if start_row_index > end_row_index {
            return None;
        }
        Some(Self { start_row_index, end_row_index })
    }
    pub fn single(row: usize) -> Self {
        Self { start_row_index: row, end_row_index: row }
    }
    pub fn start_row_index(&self) -> usize {
        self.start_row_index
    }
    pub fn end_row_index(&self) -> usize {
        self.end_row_index
    }
    pub fn data_start_row_index(&self) -> usize {
        self.end_row_index + 1
    }
    pub fn is_header_row(&self, row: usize) -> bool {
        row >= self.start_row_index && row <= self.end_row_index
    }
    pub fn is_pre_header_row(&self, row: usize) -> bool {
        row < self.start_row_index
    }
}

/// Finds the header block of a grid by the first cell equal to `marker`.
#[derive(Debug, Clone)]
pub struct HeaderRangeDetector<'a> {
    marker: &'a str,
    key_names: &'a HashSet<String>,
    min_header_cells: usize,
}

impl<'a> HeaderRangeDetector<'a> {
    pub fn new(marker: &'a str, key_names: &'a HashSet<String>) -> Self {
        Self { marker, key_names, min_header_cells: MIN_HEADER_CELLS }
    }
    pub fn with_min_header_cells(mut self, min_header_cells: usize) -> Self {
        self.min_header_cells = min_header_cells;
        self
    }
    pub fn key_names(&self) -> &HashSet<String> {
        self.key_names
    }

    /// Detect on raw cell values. `None` when the marker appears nowhere.
    pub fn detect(&self, grid: &Grid, diag: &mut Diagnostics) -> Option<HeaderRange> {
        let Some(marker_row) = self.find_marker_row(grid) else {
            diag.push(Diagnostic::MarkerNotFound { marker: self.marker.to_owned() });
            return None;
        };
        let start = self.range_start(grid, marker_row);
        let end = self.range_end(grid, marker_row, diag);
        diag.push(Diagnostic::HeaderRangeDetected { start, end });
        HeaderRange::new(start, end)
    }

    fn find_marker_row(&self, grid: &Grid) -> Option<usize> {
        grid.rows.iter().position(|row| row.cells().iter().any(|c| c.trim() == self.marker))
    }

    fn range_start(&self, grid: &Grid, marker_row: usize) -> usize {
        (0..marker_row)
            .rev()
            .find(|&r| grid.rows[r].non_empty_count() < self.min_header_cells)
            .map_or(0, |r| r + 1)
    }

    fn range_end(&self, grid: &Grid, marker_row: usize, diag: &mut Diagnostics) -> usize {
        if self.key_names.is_empty() {
            return marker_row;
        }
        match (marker_row + 1..grid.row_count()).find(|&r| self.key_names.contains(grid.cell(r, 0).trim())) {
            Some(first_data_row) => first_data_row - 1,
            None => {
                diag.push(Diagnostic::KeyNameNotFound { marker_row });
                marker_row
            }
        }
    }
}

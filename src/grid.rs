use std::collections::HashMap;
use serde::Serialize;

use crate::MergedRange;

/// One row of display-text cells. Reading past the end yields an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Row {
    cells: Vec<String>,
}

impl Row {
    pub fn new(cells: Vec<String>) -> Self {
        Self { cells }
    }
    /// cell text at `index`, `""` when out of range
    pub fn cell(&self, index: usize) -> &str {
        self.cells.get(index).map(String::as_str).unwrap_or("")
    }
    pub fn cells(&self) -> &[String] {
        &self.cells
    }
    pub fn len(&self) -> usize {
        self.cells.len()
    }
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
    /// number of cells whose trimmed text is not empty
    pub fn non_empty_count(&self) -> usize {
        self.cells.iter().filter(|c| !c.trim().is_empty()).count()
    }
    /// project the row onto `columns`, missing cells become `""`
    pub fn select(&self, columns: &[usize]) -> Row {
        Row::new(columns.iter().map(|&c| self.cell(c).to_owned()).collect())
    }
}

impl From<Vec<String>> for Row {
    fn from(cells: Vec<String>) -> Self {
        Self::new(cells)
    }
}

impl<S: Into<String>> FromIterator<S> for Row {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

/// Values that merged rectangles lend to their non-origin cells, keyed by 0-based (row, col).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedValues {
    values: HashMap<(usize, usize), String>,
    widths: HashMap<usize, usize>,
}

impl MergedValues {
    /// Expand every rectangle whose origin cell is not blank. `ranges` are 1-based, as read from the sheet.
    pub fn from_ranges(rows: &[Row], ranges: &[MergedRange]) -> Self {
        let mut merged = Self::default();
        for ((top, left), (bottom, right)) in ranges {
            if *top == 0 || *left == 0 {
                continue;
            }
            let (top, left) = (*top as usize - 1, *left as usize - 1);
            let (bottom, right) = (*bottom as usize - 1, *right as usize - 1);
            let value = rows.get(top).map(|r| r.cell(left).trim()).unwrap_or("");
            if value.is_empty() {
                continue;
            }
            for r in top..=bottom {
                for c in left..=right {
                    if r == top && c == left {
                        continue;
                    }
                    merged.insert(r, c, value);
                }
            }
        }
        merged
    }
    pub fn insert(&mut self, row: usize, col: usize, value: &str) {
        self.values.insert((row, col), value.to_owned());
        let width = self.widths.entry(row).or_insert(0);
        *width = (*width).max(col + 1);
    }
    pub fn get(&self, row: usize, col: usize) -> Option<&str> {
        self.values.get(&(row, col)).map(String::as_str)
    }
    /// one past the rightmost merged position on `row`
    pub fn width(&self, row: usize) -> usize {
        self.widths.get(&row).copied().unwrap_or(0)
    }
    pub fn len(&self) -> usize {
        self.values.len()
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A decoded sheet: raw rows plus the merged-cell value map.
#[derive(Debug, Clone, Default)]
pub struct Grid {
    pub name: String,
    pub index: usize,
    pub rows: Vec<Row>,
    pub merged: MergedValues,
}

impl Grid {
    pub fn new(name: &str, index: usize, rows: Vec<Row>, merged: MergedValues) -> Self {
        Self { name: name.to_owned(), index, rows, merged }
    }
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
    /// raw cell text, `""` outside the grid
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows.get(row).map(|r| r.cell(col)).unwrap_or("")
    }
    /// trimmed cell text, falling back to the merged value when the cell is blank
    pub fn display_cell(&self, row: usize, col: usize) -> &str {
        let value = self.cell(row, col).trim();
        if value.is_empty() {
            self.merged.get(row, col).unwrap_or("")
        } else {
            value
        }
    }
    /// row `row` with merged values filled in, wide enough to cover every merged position on it
    pub fn expanded_row(&self, row: usize) -> Row {
        let raw_width = self.rows.get(row).map(Row::len).unwrap_or(0);
        let width = raw_width.max(self.merged.width(row));
        (0..width).map(|c| self.display_cell(row, c)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Row {
        cells.iter().copied().collect()
    }

    #[test]
    fn row_out_of_range_is_empty() {
        let r = row(&["a", " ", "b"]);
        assert_eq!(r.cell(0), "a");
        assert_eq!(r.cell(7), "");
        assert_eq!(r.non_empty_count(), 2);
        assert_eq!(r.select(&[2, 5, 0]), row(&["b", "", "a"]));
    }

    #[test]
    fn merged_values_skip_origin_and_blank_origins() {
        let rows = vec![row(&["Group", "", ""]), row(&["", "x", ""])];
        // A1:C1 has an origin value, A2:A3 does not
        let merged = MergedValues::from_ranges(&rows, &[((1, 1), (1, 3)), ((2, 1), (3, 1))]);
        assert_eq!(merged.get(0, 0), None);
        assert_eq!(merged.get(0, 1), Some("Group"));
        assert_eq!(merged.get(0, 2), Some("Group"));
        assert_eq!(merged.get(2, 0), None);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.width(0), 3);
    }

    #[test]
    fn expanded_row_covers_merged_tail() {
        let rows = vec![row(&["Spec", ""]), row(&["a", "b"])];
        let merged = MergedValues::from_ranges(&rows, &[((1, 1), (1, 4))]);
        let grid = Grid::new("s", 0, rows, merged);
        assert_eq!(grid.expanded_row(0), row(&["Spec", "Spec", "Spec", "Spec"]));
        assert_eq!(grid.expanded_row(1), row(&["a", "b"]));
        assert_eq!(grid.expanded_row(9), Row::default());
    }
}

use std::collections::HashSet;
use indexmap::IndexMap;

use crate::diag::{Diagnostic, Diagnostics};
use crate::grid::Row;

/// Fraction of `rows` whose cell at `column` is not blank. 0 for no rows.
pub fn fill_ratio(rows: &[Row], column: usize) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    let filled = rows.iter().filter(|r| !r.cell(column).trim().is_empty()).count();
    filled as f64 / rows.len() as f64
}

/// First column, scanning header rows top-down and columns left-to-right, whose header equals `marker`.
pub fn find_protected_column(header_rows: &[Row], marker: &str) -> Option<usize> {
    header_rows
        .iter()
        .find_map(|row| row.cells().iter().position(|c| c.trim() == marker))
}

/// Columns below `column_count` that survive fill filtering, in column order.
pub fn columns_to_keep(
    rows: &[Row],
    column_count: usize,
    protected: Option<usize>,
    threshold: f64,
    diag: &mut Diagnostics,
) -> Vec<usize> {
    if rows.is_empty() {
        diag.push(Diagnostic::NoDataRows);
        return Vec::new();
    }
    let mut keep = Vec::with_capacity(column_count);
    for column in 0..column_count {
        let fill = fill_ratio(rows, column);
        if Some(column) == protected {
            diag.push(Diagnostic::ColumnProtected { column, fill });
            keep.push(column);
        } else if fill >= threshold {
            keep.push(column);
        } else {
            diag.push(Diagnostic::ColumnRemoved { column, fill, threshold });
        }
    }
    keep
}

/// A kept column with its label, mid-pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedColumn {
    pub original_column_index: usize,
    pub label: String,
    pub fill_rate: f64,
}

/// Pair columns with labels and drop the unlabelled ones.
pub fn drop_unlabelled(columns: &[usize], labels: Vec<String>, diag: &mut Diagnostics) -> Vec<(usize, String)> {
    columns
        .iter()
        .copied()
        .zip(labels)
        .filter(|(column, label)| {
            if label.is_empty() {
                diag.push(Diagnostic::UnlabelledColumnRemoved { column: *column });
                false
            } else {
                true
            }
        })
        .collect()
}

/// Fill rate over rows with at least `min_cells` non-empty cells, or over all rows when none qualify.
pub fn data_fill_rate(rows: &[Row], column: usize, min_cells: usize) -> f64 {
    let (mut real, mut filled) = (0usize, 0usize);
    for row in rows.iter().filter(|r| r.non_empty_count() >= min_cells) {
        real += 1;
        if !row.cell(column).trim().is_empty() {
            filled += 1;
        }
    }
    if real == 0 {
        fill_ratio(rows, column)
    } else {
        filled as f64 / real as f64
    }
}

/// Settle duplicate labels by data density. The result is in original column order.
pub fn resolve_duplicates(
    labelled: Vec<(usize, String)>,
    rows: &[Row],
    min_cells: usize,
    dedup_ratio: f64,
    diag: &mut Diagnostics,
) -> Vec<ResolvedColumn> {
    let rate = |column: usize| data_fill_rate(rows, column, min_cells);

    let mut groups: IndexMap<String, Vec<usize>> = IndexMap::new();
    for (column, label) in labelled {
        groups.entry(label).or_default().push(column);
    }

    // numbered labels skip names already taken by another group
    let mut taken: HashSet<String> = groups.keys().cloned().collect();
    let mut resolved = Vec::new();
    for (label, mut members) in groups {
        members.sort_unstable();
        if members.len() == 1 {
            resolved.push(ResolvedColumn { original_column_index: members[0], label, fill_rate: rate(members[0]) });
            continue;
        }
        let rates: Vec<f64> = members.iter().map(|&c| rate(c)).collect();
        let max_fill = rates.iter().copied().fold(0.0, f64::max);
        let mut ordinal = 0;
        for (column, fill) in members.into_iter().zip(rates) {
            if fill < max_fill * dedup_ratio {
                diag.push(Diagnostic::DuplicateDropped { column, label: label.clone(), fill, max_fill });
                continue;
            }
            ordinal += 1;
            let name = if ordinal == 1 {
                label.clone()
            } else {
                let mut name = format!("{label} ({ordinal})");
                while taken.contains(&name) {
                    ordinal += 1;
                    name = format!("{label} ({ordinal})");
                }
                taken.insert(name.clone());
                diag.push(Diagnostic::DuplicateRenamed { column, label: name.clone() });
                name
            };
            resolved.push(ResolvedColumn { original_column_index: column, label: name, fill_rate: fill });
        }
    }
    resolved.sort_by_key(|c| c.original_column_index);
    resolved
}

/// Project `rows` onto the resolved columns.
pub fn select_columns(rows: &[Row], columns: &[ResolvedColumn]) -> (Vec<String>, Vec<Row>) {
    let indices: Vec<usize> = columns.iter().map(|c| c.original_column_index).collect();
    let headers = columns.iter().map(|c| c.label.clone()).collect();
    let rows = rows.iter().map(|r| r.select(&indices)).collect();
    (headers, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(rows: &[&[&str]]) -> Vec<Row> {
        rows.iter().map(|r| r.iter().copied().collect()).collect()
    }

    #[test]
    fn protected_column_kept_at_zero_fill() {
        let data = rows(&[&["", "1", ""], &["", "2", ""]]);
        let mut diag = Diagnostics::new("s");
        let keep = columns_to_keep(&data, 3, Some(0), 0.5, &mut diag);
        assert_eq!(keep, vec![0, 1]);
    }

    #[test]
    fn fill_equal_to_threshold_is_kept() {
        let data = rows(&[&["a", "x"], &["b", ""], &["c", ""], &["d", "y"]]);
        let mut diag = Diagnostics::new("s");
        assert_eq!(columns_to_keep(&data, 2, None, 0.5, &mut diag), vec![0, 1]);
        assert_eq!(columns_to_keep(&data, 2, None, 0.51, &mut diag), vec![0]);
    }

    #[test]
    fn no_rows_keeps_nothing() {
        let mut diag = Diagnostics::new("s");
        assert!(columns_to_keep(&[], 3, Some(0), 0.0, &mut diag).is_empty());
        assert_eq!(diag.warnings().count(), 1);
    }

    #[test]
    fn protected_column_search_is_row_major() {
        let header = rows(&[&["x", "", "車名"], &["車名", "", ""]]);
        assert_eq!(find_protected_column(&header, "車名"), Some(2));
        assert_eq!(find_protected_column(&header, "none"), None);
    }

    #[test]
    fn duplicates_dropped_by_fill_then_numbered() {
        // column 1 is 80% filled, column 2 75%, column 3 10%
        let data: Vec<Row> = (0..20)
            .map(|i| {
                let cell = |filled: bool| if filled { "v" } else { "" };
                vec!["k", cell(i < 16), cell(i < 15), cell(i < 2), "z", "z", "z"]
                    .into_iter()
                    .collect()
            })
            .collect();
        let labelled = vec![
            (0, "Name".to_string()),
            (1, "X".to_string()),
            (2, "X".to_string()),
            (3, "X".to_string()),
        ];
        let mut diag = Diagnostics::new("s");
        let resolved = resolve_duplicates(labelled, &data, 4, 0.5, &mut diag);
        let labels: Vec<(usize, &str)> = resolved.iter().map(|c| (c.original_column_index, c.label.as_str())).collect();
        assert_eq!(labels, vec![(0, "Name"), (1, "X"), (2, "X (2)")]);
        assert!(diag.iter().any(|e| matches!(e, Diagnostic::DuplicateDropped { column: 3, .. })));
    }

    #[test]
    fn numbered_labels_skip_existing_labels() {
        let data = rows(&[&["a", "b", "c", "d"], &["a", "b", "c", "d"]]);
        let labelled = vec![
            (0, "X".to_string()),
            (1, "X".to_string()),
            (2, "X (2)".to_string()),
            (3, "X".to_string()),
        ];
        let mut diag = Diagnostics::new("s");
        let resolved = resolve_duplicates(labelled, &data, 4, 0.5, &mut diag);
        let labels: Vec<&str> = resolved.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["X", "X (3)", "X (2)", "X (4)"]);
    }

    #[test]
    fn data_fill_rate_falls_back_to_all_rows() {
        let data = rows(&[&["a", ""], &["b", "c"]]);
        assert_eq!(data_fill_rate(&data, 1, 4), 0.5);
        assert_eq!(data_fill_rate(&data, 1, 2), 1.0);
    }

    #[test]
    fn select_keeps_column_order() {
        let data = rows(&[&["a", "b", "c"]]);
        let columns = vec![
            ResolvedColumn { original_column_index: 0, label: "A".into(), fill_rate: 1.0 },
            ResolvedColumn { original_column_index: 2, label: "C".into(), fill_rate: 1.0 },
        ];
        let (headers, out) = select_columns(&data, &columns);
        assert_eq!(headers, vec!["A".to_string(), "C".to_string()]);
        assert_eq!(out, rows(&[&["a", "c"]]));
    }
}

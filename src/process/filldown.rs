use crate::diag::{Diagnostic, Diagnostics};
use crate::grid::Row;

/// Last row with at least `min_cells` non-empty cells, or the last row when none has.
pub fn last_data_row_index(rows: &[Row], min_cells: usize) -> Option<usize> {
    rows.iter()
        .rposition(|r| r.non_empty_count() >= min_cells)
        .or_else(|| rows.len().checked_sub(1))
}

/// Fill blank cells of the `always` and `until_next` columns with the last value seen above them.
///
/// Rows after [`last_data_row_index`] keep their blanks. Non-blank cells are never rewritten.
pub fn fill_down(
    headers: &[String],
    rows: &[Row],
    always: &str,
    until_next: &str,
    min_cells: usize,
    diag: &mut Diagnostics,
) -> Vec<Row> {
    let targets: Vec<usize> = [always, until_next]
        .iter()
        .filter_map(|name| headers.iter().position(|h| h == name))
        .collect();
    let Some(last) = last_data_row_index(rows, min_cells) else {
        return rows.to_vec();
    };
    if targets.is_empty() {
        diag.push(Diagnostic::FillDownSkipped);
        return rows.to_vec();
    }

    let mut last_seen = vec![String::new(); targets.len()];
    rows.iter()
        .enumerate()
        .map(|(index, row)| {
            let mut cells = row.cells().to_vec();
            for (seen, &column) in last_seen.iter_mut().zip(&targets) {
                let value = row.cell(column).trim();
                if !value.is_empty() {
                    *seen = value.to_owned();
                } else if index <= last && !seen.is_empty() {
                    if cells.len() <= column {
                        cells.resize(column + 1, String::new());
                    }
                    cells[column] = seen.clone();
                }
            }
            Row::new(cells)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(rows: &[&[&str]]) -> Vec<Row> {
        rows.iter().map(|r| r.iter().copied().collect()).collect()
    }

    fn headers(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn fills_brand_always_and_model_until_next() {
        let data = rows(&[&["A", "m1"], &["", "m1"], &["", "m2"], &["", "m2"]]);
        let mut diag = Diagnostics::new("s");
        let out = fill_down(&headers(&["Car Name", "Common Name"]), &data, "Car Name", "Common Name", 4, &mut diag);
        assert_eq!(out, rows(&[&["A", "m1"], &["A", "m1"], &["A", "m2"], &["A", "m2"]]));
    }

    #[test]
    fn blanks_fill_from_previous_value() {
        let data = rows(&[
            &["A", "m1", "1", "2", "3", "4"],
            &["", "", "3", "4", "5", "6"],
            &["B", "m2", "5", "6", "7", "8"],
            &["", "", "7", "8", "9", "0"],
        ]);
        let mut diag = Diagnostics::new("s");
        let out = fill_down(&headers(&["Car Name", "Common Name", "w", "x", "y", "z"]), &data, "Car Name", "Common Name", 4, &mut diag);
        let names: Vec<(&str, &str)> = out.iter().map(|r| (r.cell(0), r.cell(1))).collect();
        assert_eq!(names, vec![("A", "m1"), ("A", "m1"), ("B", "m2"), ("B", "m2")]);
    }

    #[test]
    fn stops_at_last_real_data_row() {
        let data = rows(&[
            &["A", "m1", "1", "2", "3", "4"],
            &["", "", "3", "4", "5", "6"],
            &["", "", "note", "", "", ""],
        ]);
        let mut diag = Diagnostics::new("s");
        let out = fill_down(&headers(&["Car Name", "Common Name", "w", "x", "y", "z"]), &data, "Car Name", "Common Name", 4, &mut diag);
        assert_eq!(out[1].cell(0), "A");
        assert_eq!(out[2], data[2]);
    }

    #[test]
    fn no_target_columns_leaves_rows_alone() {
        let data = rows(&[&["A", ""], &["", ""]]);
        let mut diag = Diagnostics::new("s");
        let out = fill_down(&headers(&["p", "q"]), &data, "Car Name", "Common Name", 4, &mut diag);
        assert_eq!(out, data);
    }

    #[test]
    fn last_data_row_falls_back_to_last_row() {
        assert_eq!(last_data_row_index(&rows(&[&["a"], &["b"]]), 4), Some(1));
        assert_eq!(last_data_row_index(&rows(&[&["a", "b", "c", "d"], &["e"]]), 4), Some(0));
        assert_eq!(last_data_row_index(&[], 4), None);
    }
}

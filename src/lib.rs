//! Cleans semi-structured spreadsheet exports into normalized tables, in pure Rust. Exports of this kind carry multi-row merged headers, sparse spacer columns, footnote rows and "blank means same as above" group columns. The crate reads an xlsx workbook into string grids, detects each sheet's header block, resolves one translated label per column, drops sparse and duplicate columns, fills group columns down, and writes the result as JSON or xlsx.
//!
//! The processing core (`detect`, `sheet`, `process`) is pure: every stage takes a snapshot and returns a new one, and nothing in it fails for data-shape reasons. Degraded results are reported through [`diag::Diagnostics`].
use anyhow::{anyhow, Result};

/// Cell grid model
pub mod grid;
/// Header range detection
pub mod detect;
/// Splitting grids into header and data rows
pub mod sheet;
/// Header resolution, column filtering, fill-down
pub mod process;
/// Structured non-fatal events
pub mod diag;
/// Configuration and lookup-table loaders
pub mod config;
/// Read, process and write a whole workbook
pub mod pipeline;
/// Excel file reader
pub mod read;
/// Workbook writers (json, xlsx)
pub mod write;

pub use detect::{HeaderRange, HeaderRangeDetector};
pub use diag::{Diagnostic, Diagnostics, Severity};
pub use grid::{Grid, MergedValues, Row};
pub use process::{ProcessOptions, ProcessedSheet, ProcessedWorkBook, Processor};
pub use sheet::{Sheet, WorkBook};

/// row number
pub type RowNum = u32;
/// column number
pub type ColNum = u16;
/// merged range, ((top, left), (bottom, right)), 1-based and inclusive
pub type MergedRange = ((RowNum, ColNum), (RowNum, ColNum));

/// max column number
pub static MAX_COL_NUM: u16 = u16::MAX;

/// Convert character based Excel cell column addresses to number. If you pass parameter D to this function, you will get 4. Row digits are ignored, so B3 gives 2.
pub fn get_num_from_ord(addr: &[u8]) -> Result<ColNum> {
    let mut col: u32 = 0;
    for b in addr.iter().map(u8::to_ascii_uppercase) {
        if b.is_ascii_uppercase() {
            col = col * 26 + (b - b'@') as u32;
            if col > MAX_COL_NUM as u32 {
                return Err(anyhow!("column out of range: {}", String::from_utf8_lossy(addr)));
            }
        } else if !b.is_ascii_digit() && b != b'$' {
            return Err(anyhow!("invalid column address: {}", String::from_utf8_lossy(addr)));
        }
    }
    Ok(col as ColNum)
}

/// Convert number based Excel cell column addresses to character. If you pass parameter 4 to this function, you will get D
pub fn get_ord_from_num(num: ColNum) -> Result<String> {
    if num == 0 {
        return Err(anyhow!("column number starts from 1"));
    }
    let mut col = num as u32;
    let mut addr = Vec::with_capacity(3);
    while col > 0 {
        let rem = (col - 1) % 26;
        addr.push((b'A' + rem as u8) as char);
        col = (col - 1) / 26;
    }
    addr.reverse();
    Ok(String::from_iter(addr))
}

/// Convert character based Excel cell addresses to numbers. If you pass parameter D2 to this function, you will get (2, 4)
pub fn get_tuple_from_ord(addr: &[u8]) -> Result<(RowNum, ColNum)> {
    let addr: Vec<u8> = addr.iter().copied().filter(|b| *b != b'$').collect();
    let split = addr.iter().position(u8::is_ascii_digit)
        .ok_or(anyhow!("invalid cell address: {}", String::from_utf8_lossy(&addr)))?;
    if split == 0 {
        return Err(anyhow!("invalid cell address: {}", String::from_utf8_lossy(&addr)));
    }
    let col = get_num_from_ord(&addr[..split])?;
    let row = std::str::from_utf8(&addr[split..])?.parse::<RowNum>()?;
    Ok((row, col))
}

/// Convert numbers based Excel cell addresses to characters. If you pass parameter (2, 4) to this function, you will get D2.
pub fn get_ord_from_tuple(row: RowNum, col: ColNum) -> Result<String> {
    Ok(format!("{}{}", get_ord_from_num(col)?, row))
}

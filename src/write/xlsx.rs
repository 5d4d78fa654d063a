use std::{collections::HashMap, path::Path};
use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use rust_xlsxwriter::{Format, Workbook, Worksheet};

use crate::grid::Row;
use crate::{ColNum, RowNum};
use super::ensure_parent_dir;

struct Sheet {
    sheet: Worksheet,
    nextrow: RowNum,
}

impl Sheet {
    fn write_header(&mut self, head: &[String]) -> Result<()> {
        if head.is_empty() {
            return Ok(());
        }
        for (icol, label) in head.iter().enumerate() {
            self.sheet.write_string_with_format(self.nextrow, icol as ColNum, label, &FMT_HEADER)?;
        }
        self.nextrow += 1;
        Ok(())
    }
    fn write_rows(&mut self, data: &[Row]) -> Result<()> {
        for row in data {
            for (icol, value) in row.cells().iter().enumerate() {
                // blank cells are left out
                if !value.is_empty() {
                    self.sheet.write_string(self.nextrow, icol as ColNum, value)?;
                }
            }
            self.nextrow += 1;
        }
        Ok(())
    }
}

/// xlsx writer, sheets are saved in the order they were first appended to
pub struct XlsxWriter {
    names: Vec<String>,
    sheets: HashMap<String, Sheet>,
    opened: bool,
}

impl Default for XlsxWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl XlsxWriter {
    pub fn new() -> Self {
        Self {
            names: vec![],
            sheets: HashMap::new(),
            opened: true,
        }
    }
    /// Append rows to sheet `name`. The header is written only when the sheet is created.
    pub fn append_rows(&mut self, name: &str, head: &[String], data: &[Row]) -> Result<()> {
        if !self.opened {
            return Err(anyhow!("cannot write saved workbook"));
        }
        if !self.sheets.contains_key(name) {
            let mut sht = Sheet {
                nextrow: 0,
                sheet: Worksheet::new(),
            };
            sht.sheet.set_name(name)?;
            sht.write_header(head)?;
            self.sheets.insert(name.to_owned(), sht);
            self.names.push(name.to_owned());
        };
        self.sheets.get_mut(name).ok_or(anyhow!("sheet-{} not exist", name))?.write_rows(data)
    }
    /// save as file
    pub fn save_as<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        ensure_parent_dir(path)?;
        let mut book = Workbook::new();
        for name in self.names.iter() {
            let sht = self.sheets.remove(name).ok_or(anyhow!("sheet-{} not exist", name))?;
            book.push_worksheet(sht.sheet);
        };
        book.save(path)?;
        self.opened = false;
        Ok(())
    }
}

lazy_static! {
    static ref FMT_HEADER: Format = Format::new().set_bold();
}

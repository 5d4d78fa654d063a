use crate::config::TranslationTable;
use crate::diag::{Diagnostic, Diagnostics};
use crate::grid::Row;

/// Strip embedded line breaks and trim.
pub fn normalize(label: &str) -> String {
    label.replace("\r\n", "").replace(['\r', '\n'], "").trim().to_owned()
}

/// Collapses a stack of header rows into one label per column.
#[derive(Debug, Clone, Copy)]
pub struct HeaderResolver<'a> {
    translations: &'a TranslationTable,
}

impl<'a> HeaderResolver<'a> {
    pub fn new(translations: &'a TranslationTable) -> Self {
        Self { translations }
    }

    /// One label for each of `columns`, in the same order.
    pub fn resolve(&self, header_rows: &[Row], columns: &[usize], diag: &mut Diagnostics) -> Vec<String> {
        columns.iter().map(|&c| self.resolve_column(header_rows, c, diag)).collect()
    }

    /// Scan bottom-up; the first translated value wins, else the bottom-most non-empty label.
    pub fn resolve_column(&self, header_rows: &[Row], column: usize, diag: &mut Diagnostics) -> String {
        let mut fallback: Option<String> = None;
        for row in header_rows.iter().rev() {
            let cell = row.cell(column).trim();
            if cell.is_empty() {
                continue;
            }
            let label = normalize(cell);
            if let Some(target) = self.translations.get(&label) {
                return target.clone();
            }
            if fallback.is_none() {
                fallback = Some(label);
            }
        }
        match fallback {
            Some(label) => {
                if !self.translations.is_empty() {
                    diag.push(Diagnostic::UntranslatedHeader { column, label: label.clone() });
                }
                label
            }
            None => {
                diag.push(Diagnostic::EmptyHeader { column });
                String::new()
            }
        }
    }
}

use std::fmt;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Level a diagnostic is reported at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warn,
}

/// A non-fatal event raised while detecting or processing a sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    MarkerNotFound { marker: String },
    HeaderRangeDetected { start: usize, end: usize },
    KeyNameNotFound { marker_row: usize },
    DataStartMismatch { row: usize, value: String },
    NoDataRows,
    ProtectedColumnNotFound { marker: String },
    ColumnProtected { column: usize, fill: f64 },
    ColumnRemoved { column: usize, fill: f64, threshold: f64 },
    UnlabelledColumnRemoved { column: usize },
    UntranslatedHeader { column: usize, label: String },
    EmptyHeader { column: usize },
    DuplicateDropped { column: usize, label: String, fill: f64, max_fill: f64 },
    DuplicateRenamed { column: usize, label: String },
    NoColumnsKept,
    FillDownSkipped,
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self {
            Diagnostic::MarkerNotFound { .. }
            | Diagnostic::DataStartMismatch { .. }
            | Diagnostic::NoDataRows
            | Diagnostic::ProtectedColumnNotFound { .. }
            | Diagnostic::UntranslatedHeader { .. }
            | Diagnostic::EmptyHeader { .. }
            | Diagnostic::NoColumnsKept => Severity::Warn,
            Diagnostic::HeaderRangeDetected { .. }
            | Diagnostic::KeyNameNotFound { .. }
            | Diagnostic::DuplicateDropped { .. }
            | Diagnostic::DuplicateRenamed { .. } => Severity::Info,
            Diagnostic::ColumnProtected { .. }
            | Diagnostic::ColumnRemoved { .. }
            | Diagnostic::UnlabelledColumnRemoved { .. }
            | Diagnostic::FillDownSkipped => Severity::Debug,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MarkerNotFound { marker } => {
                write!(f, "marker {marker:?} not found, using row 0 as the only header row")
            }
            Diagnostic::HeaderRangeDetected { start, end } => {
                write!(f, "header rows {start}..={end}")
            }
            Diagnostic::KeyNameNotFound { marker_row } => {
                write!(f, "no key name found below row {marker_row}, header ends at the marker row")
            }
            Diagnostic::DataStartMismatch { row, value } => {
                write!(f, "data row {row} starts with {value:?}, which is not a known key name")
            }
            Diagnostic::NoDataRows => write!(f, "no data rows"),
            Diagnostic::ProtectedColumnNotFound { marker } => {
                write!(f, "no header cell equals {marker:?}, no column is protected")
            }
            Diagnostic::ColumnProtected { column, fill } => {
                write!(f, "column {column} kept as protected (fill {:.1}%)", fill * 100.0)
            }
            Diagnostic::ColumnRemoved { column, fill, threshold } => write!(
                f,
                "column {column} removed (fill {:.1}% < {:.1}%)",
                fill * 100.0,
                threshold * 100.0
            ),
            Diagnostic::UnlabelledColumnRemoved { column } => {
                write!(f, "column {column} removed, header is empty")
            }
            Diagnostic::UntranslatedHeader { column, label } => {
                write!(f, "column {column} header {label:?} has no translation")
            }
            Diagnostic::EmptyHeader { column } => write!(f, "column {column} has no header text"),
            Diagnostic::DuplicateDropped { column, label, fill, max_fill } => write!(
                f,
                "duplicate {label:?} in column {column} dropped (fill {:.1}% vs {:.1}%)",
                fill * 100.0,
                max_fill * 100.0
            ),
            Diagnostic::DuplicateRenamed { column, label } => {
                write!(f, "duplicate in column {column} renamed to {label:?}")
            }
            Diagnostic::NoColumnsKept => write!(f, "no columns kept"),
            Diagnostic::FillDownSkipped => write!(f, "no fill-down columns in headers"),
        }
    }
}

/// Diagnostics collected for one sheet. Every push is also emitted as a tracing event.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub sheet: String,
    pub events: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new(sheet: &str) -> Self {
        Self { sheet: sheet.to_owned(), events: Vec::new() }
    }
    pub fn push(&mut self, event: Diagnostic) {
        match event.severity() {
            Severity::Debug => debug!(sheet = %self.sheet, "{event}"),
            Severity::Info => info!(sheet = %self.sheet, "{event}"),
            Severity::Warn => warn!(sheet = %self.sheet, "{event}"),
        }
        self.events.push(event);
    }
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.events.iter()
    }
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.events.iter().filter(|e| e.severity() == Severity::Warn)
    }
    pub fn len(&self) -> usize {
        self.events.len()
    }
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
    /// merge events of another list, without logging them again
    pub fn extend(&mut self, other: Diagnostics) {
        self.events.extend(other.events);
    }
}

use std::{collections::HashMap, fmt, fs::File, io::BufReader, path::Path};
use anyhow::{anyhow, Context, Result};
use zip::ZipArchive;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use quick_xml::{events::{BytesStart, Event}, reader::Reader};
use tracing::debug;

use lazy_static::lazy_static;
use crate::{get_num_from_ord, get_tuple_from_ord, ColNum, MergedRange, RowNum};
use crate::grid::{Grid, MergedValues, Row};

// ooxml： http://www.officeopenxml.com/

macro_rules! get_attr_val {
    ($e:expr, $tag:expr) => {
        match $e.try_get_attribute($tag)? {
            Some(v) => {v.unescape_value()?},
            None => return Err(anyhow!("attribute {} not exist", $tag))
        }
    };
    ($e:expr, $tag:expr, parse) => {
        match $e.try_get_attribute($tag)? {
            Some(v) => {v.unescape_value()?.parse()?},
            None => return Err(anyhow!("attribute {} not exist", $tag))
        }
    };
    ($e:expr, $tag:expr, to_string) => {
        match $e.try_get_attribute($tag)? {
            Some(v) => {v.unescape_value()?.to_string()},
            None => return Err(anyhow!("attribute {} not exist", $tag))
        }
    };
}

/// optional attribute, unescaped
macro_rules! get_attr_opt {
    ($e:expr, $tag:expr) => {
        match $e.try_get_attribute($tag)? {
            Some(v) => Some(v.unescape_value()?.to_string()),
            None => None
        }
    };
}

/// zip member of a sheet, from its relationship target
fn sheet_path(target: &str) -> String {
    if target.starts_with('/') {
        target.trim_start_matches('/').to_string()
    } else {
        format!("xl/{}", target)
    }
}

/// xlsx book reader
pub struct XlsxBook {
    str_share: Vec<String>,
    shts_all: Vec<String>,
    map_style: HashMap<u32, u32>,
    map_sheet: HashMap<String, String>,
    zip_archive: ZipArchive<BufReader<File>>,
    datetime_fmts: HashMap<u32, u8>,
}

impl XlsxBook {
    /// open a workbook and load its sheet list, styles and shared strings
    pub fn new<T: AsRef<Path>>(path: T) -> Result<XlsxBook> {
        let path = path.as_ref();
        let mut zip_archive = {
            let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
            let zipreader = BufReader::new(file);
            ZipArchive::new(zipreader).with_context(|| format!("{} is not an xlsx file", path.display()))?
        };

        let book_refs = {
            let file = zip_archive.by_name("xl/_rels/workbook.xml.rels")?;

            let mut buf = Vec::new();
            let mut refs = HashMap::new();
            let mut reader = Reader::from_reader(BufReader::new(file));
            loop {
                match reader.read_event_into(&mut buf) {
                    Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => {
                        if e.name().as_ref() == b"Relationship" {
                            refs.insert(get_attr_val!(e, "Id", to_string), get_attr_val!(e, "Target", to_string));
                        };
                    },
                    Ok(Event::Eof) => break,
                    Err(e) => return Err(anyhow!("workbook.xml.rels broken: {:?}", e)),
                    _ => ()
                }
                buf.clear();
            };
            refs
        };

        let mut shts_all = Vec::<String>::new();
        let map_sheet = {
            let file = zip_archive.by_name("xl/workbook.xml")?;
            let mut reader = Reader::from_reader(BufReader::new(file));

            let mut buf = Vec::new();
            let mut map_sheet: HashMap<String, String> = HashMap::new();
            loop {
                match reader.read_event_into(&mut buf) {
                    Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => {
                        if e.name().as_ref() == b"sheet" {
                            let name = get_attr_val!(e, "name", to_string);
                            let rid = get_attr_val!(e, "r:id", to_string);
                            let sheet = match book_refs.get(&rid) {
                                Some(target) => sheet_path(target),
                                None => return Err(anyhow!("Relationship of sheet-{rid} not found")),
                            };
                            shts_all.push(name.clone());
                            map_sheet.insert(name, sheet);
                        };
                    },
                    Ok(Event::Eof) => break,
                    Err(e) => return Err(anyhow!("workbook.xml is broken: {:?}", e)),
                    _ => ()
                }
                buf.clear();
            };
            map_sheet
        };

        // cell style index -> number format id
        let mut datetime_fmts = DATETIME_FMTS.clone();
        let map_style = {
            match zip_archive.by_name("xl/styles.xml") {
                Ok(file) => {
                    let mut reader = Reader::from_reader(BufReader::new(file));

                    let mut inx: u32 = 0;
                    let mut act = false;
                    let mut in_xfs = false;
                    let mut buf = Vec::new();
                    let mut map_style: HashMap<u32, u32> = HashMap::new();
                    loop {
                        match reader.read_event_into(&mut buf) {
                            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                                match e.name().as_ref() {
                                    b"numFmts" => act = true,
                                    b"cellXfs" => {act = true; in_xfs = true},
                                    b"numFmt" if act => {
                                        let code = get_attr_val!(e, "formatCode", to_string);
                                        let id: u32 = get_attr_val!(e, "numFmtId", parse);
                                        if let Some(fmt) = classify_format(&code) {
                                            datetime_fmts.insert(id, fmt);
                                        }
                                    },
                                    b"xf" if act && in_xfs => {
                                        let id = match get_attr_opt!(e, "numFmtId") {
                                            Some(v) => v.parse()?,
                                            None => 0,
                                        };
                                        map_style.insert(inx, id);
                                        inx += 1;
                                    },
                                    _ => ()
                                }
                            },
                            Ok(Event::End(ref e)) => {
                                if e.name().as_ref() == b"numFmts" {
                                    act = false;
                                } else if e.name().as_ref() == b"cellXfs" {
                                    break;
                                };
                            },
                            Ok(Event::Eof) => break,
                            Err(e) => return Err(anyhow!("styles.xml is broken: {:?}", e)),
                            _ => ()
                        }
                        buf.clear();
                    };
                    map_style
                },
                Err(_) => {
                    HashMap::new()
                }
            }
        };

        let str_share = {
            match zip_archive.by_name("xl/sharedStrings.xml") {
                Ok(file) => read_shared_strings(Reader::from_reader(BufReader::new(file)))?,
                Err(_) => Vec::new(),
            }
        };
        debug!(file = %path.display(), sheets = shts_all.len(), strings = str_share.len(), "workbook opened");

        Ok(XlsxBook {
            str_share,
            shts_all,
            map_style,
            map_sheet,
            zip_archive,
            datetime_fmts,
        })
    }
    /// all sheets in workbook order
    pub fn sheet_names(&self) -> &Vec<String> {
        &self.shts_all
    }
    /// Read one sheet into a grid of display strings.
    /// Missing rows and cells become empty, so row and column positions match the sheet.
    pub fn read_grid(&mut self, sht_name: &str) -> Result<Grid> {
        let index = self.shts_all.iter().position(|s| s == sht_name)
            .ok_or(anyhow!("{} sheet not found!", sht_name))?;
        let path = match self.map_sheet.get(sht_name) {
            Some(p) => p.clone(),
            None => return Err(anyhow!("{} sheet not found!", sht_name)),
        };
        let file = match self.zip_archive.by_name(&path) {
            Ok(file) => file,
            Err(_) => return Err(anyhow!("sheet {} - {} lost！", sht_name, path)),
        };
        let mut reader = Reader::from_reader(BufReader::new(file));

        let mut buf = Vec::with_capacity(8 * 1024);
        let mut rows: Vec<Row> = Vec::new();
        let mut merged_rects: Vec<MergedRange> = Vec::new();

        let mut currow: RowNum = 0;
        let mut row_value: Vec<String> = Vec::new();
        let mut col: ColNum = 0;
        let mut cell_type = Vec::new();
        let mut num_fmt_id: u32 = 0;
        let mut cell_text = String::new();
        let mut capture = false;   // inside <v> or <t>
        let mut in_rph = false;
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    match e.name().as_ref() {
                        b"row" => {
                            currow = next_row_num(e, currow)?;
                            fill_missing_rows(&mut rows, currow);
                            row_value = Vec::new();
                            col = 0;
                        },
                        b"c" => {
                            (col, cell_type, num_fmt_id) = cell_head(e, col, &self.map_style)?;
                            cell_text.clear();
                        },
                        b"v" | b"t" if !in_rph => capture = true,
                        b"rPh" => in_rph = true,
                        b"mergeCell" => merged_rects.push(parse_merged_ref(e)?),
                        _ => (),
                    }
                },
                Ok(Event::Empty(ref e)) => {
                    match e.name().as_ref() {
                        b"row" => {
                            currow = next_row_num(e, currow)?;
                            fill_missing_rows(&mut rows, currow);
                            rows.push(Row::default());
                        },
                        b"c" => {
                            // styled blank cell, often a merged non-origin
                            (col, _, _) = cell_head(e, col, &self.map_style)?;
                            put_cell(&mut row_value, col, String::new());
                        },
                        b"mergeCell" => merged_rects.push(parse_merged_ref(e)?),
                        _ => (),
                    }
                },
                Ok(Event::Text(ref t)) => {
                    if capture {
                        cell_text.push_str(&t.unescape()?);
                    }
                },
                Ok(Event::End(ref e)) => {
                    match e.name().as_ref() {
                        b"v" | b"t" => capture = false,
                        b"rPh" => in_rph = false,
                        b"c" => {
                            let fmt = self.datetime_fmts.get(&num_fmt_id).copied().unwrap_or(FMT_DEFAULT);
                            let value = CellValue::parse(&cell_type, fmt, &cell_text, &self.str_share)?;
                            put_cell(&mut row_value, col, value.to_string());
                        },
                        b"row" => {
                            rows.push(Row::new(std::mem::take(&mut row_value)));
                        },
                        _ => (),
                    }
                },
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(anyhow!("sheet data is broken: {:?}", e));
                },
                _ => ()
            }
            buf.clear();
        }

        let merged = MergedValues::from_ranges(&rows, &merged_rects);
        debug!(sheet = sht_name, rows = rows.len(), merged = merged_rects.len(), "sheet read");
        Ok(Grid::new(sht_name, index, rows, merged))
    }
}

/// column, cell type and number format of a `<c>` element
fn cell_head(e: &BytesStart, prev_col: ColNum, map_style: &HashMap<u32, u32>) -> Result<(ColNum, Vec<u8>, u32)> {
    let cell_type = match e.try_get_attribute("t")? {
        Some(attr) => attr.unescape_value()?.as_bytes().to_owned(),
        None => b"n".to_vec(),
    };
    let num_fmt_id = match get_attr_opt!(e, "s") {
        Some(s) => map_style.get(&s.parse::<u32>()?).copied().unwrap_or(0),
        None => 0,
    };
    let col = match get_attr_opt!(e, "r") {
        Some(addr) => get_num_from_ord(addr.as_bytes())?,
        None => prev_col + 1,
    };
    Ok((col, cell_type, num_fmt_id))
}

/// Read all sheets of a workbook, in workbook order.
pub fn read_workbook<T: AsRef<Path>>(path: T) -> Result<Vec<Grid>> {
    let mut book = XlsxBook::new(path)?;
    let names = book.sheet_names().clone();
    names.iter().map(|name| book.read_grid(name)).collect()
}

fn read_shared_strings<R: std::io::BufRead>(mut reader: Reader<R>) -> Result<Vec<String>> {
    let mut buf = Vec::with_capacity(3069);
    let mut insert = false;
    let mut in_rph = false;
    let mut shstring = String::new();
    let mut vec_share: Vec<String> = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                match e.name().as_ref() {
                    b"sst" => {
                        if let Some(cnt) = get_attr_opt!(e, "uniqueCount") {
                            vec_share.reserve(cnt.parse()?);
                        }
                    },
                    b"si" => shstring.clear(),
                    b"rPh" => in_rph = true,
                    b"t" => insert = !in_rph,
                    _ => (),
                }
            },
            Ok(Event::Empty(ref e)) => {
                if e.name().as_ref() == b"si" {
                    vec_share.push(String::new());
                }
            },
            Ok(Event::Text(ref t)) => {
                if insert {
                    shstring.push_str(&t.unescape()?);
                }
            },
            Ok(Event::End(ref e)) => {
                match e.name().as_ref() {
                    b"si" => vec_share.push(std::mem::take(&mut shstring)),
                    b"rPh" => in_rph = false,
                    b"t" => insert = false,
                    _ => (),
                }
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(anyhow!("sharedStrings.xml is broken: {:?}", e)),
            _ => ()
        }
        buf.clear();
    };
    Ok(vec_share)
}

fn next_row_num(e: &BytesStart, prev: RowNum) -> Result<RowNum> {
    Ok(match get_attr_opt!(e, "r") {
        Some(r) => r.parse()?,
        None => prev + 1,
    })
}

/// pad with empty rows so the next pushed row lands at 1-based `row_num`
fn fill_missing_rows(rows: &mut Vec<Row>, row_num: RowNum) {
    while (rows.len() as RowNum) + 1 < row_num {
        rows.push(Row::default());
    }
}

/// store a cell at 1-based column `col`, padding the gap with empty cells
fn put_cell(row: &mut Vec<String>, col: ColNum, value: String) {
    if col == 0 {
        return;
    }
    let inx = col as usize - 1;
    if row.len() <= inx {
        row.resize(inx + 1, String::new());
    }
    row[inx] = value;
}

fn parse_merged_ref(e: &BytesStart) -> Result<MergedRange> {
    let attr = get_attr_val!(e, "ref", to_string);
    let mut dim = attr.split(':');
    match (dim.next(), dim.next()) {
        (Some(left_top), Some(right_end)) => {
            Ok((get_tuple_from_ord(left_top.as_bytes())?, get_tuple_from_ord(right_end.as_bytes())?))
        },
        (Some(single), None) => {
            let cell = get_tuple_from_ord(single.as_bytes())?;
            Ok((cell, cell))
        },
        _ => Err(anyhow!("mergeCell error：{}", attr)),
    }
}

/// date/time kind of a custom number format, if any
fn classify_format(code: &str) -> Option<u8> {
    if code.contains("yy") {
        if code.contains('h') || code.contains("ss") {
            Some(FMT_DATETIME)
        } else {
            Some(FMT_DATE)
        }
    } else if code.contains("ss") || code.contains("h:mm") {
        Some(FMT_TIME)
    } else {
        None
    }
}

/// decoded cell value
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Blank,
    Bool(bool),
    Number(f64),
    Date(f64),
    Time(f64),
    Datetime(f64),
    String(String),
    Error(String),
}

impl CellValue {
    /// b for boolean
    /// d for date
    /// e for error
    /// inlineStr for an inline string
    /// n for number
    /// s for shared string
    /// str for a formula result string
    fn parse(cell_type: &[u8], fmt: u8, text: &str, str_share: &[String]) -> Result<CellValue> {
        if text.is_empty() && cell_type != b"inlineStr" && cell_type != b"str" {
            return Ok(CellValue::Blank);
        }
        Ok(match cell_type {
            b"s" => {
                let inx = text.trim().parse::<usize>()?;
                match str_share.get(inx) {
                    Some(s) => CellValue::String(s.clone()),
                    None => return Err(anyhow!("shared string {} out of range", inx)),
                }
            },
            b"n" => {
                let n = text.trim().parse::<f64>()?;
                match fmt {
                    FMT_DATE => CellValue::Date(n),
                    FMT_TIME => CellValue::Time(n),
                    FMT_DATETIME => CellValue::Datetime(n),
                    _ => CellValue::Number(n),
                }
            },
            b"b" => CellValue::Bool(text.trim() == "1"),
            b"e" => CellValue::Error(text.to_string()),
            b"d" | b"str" | b"inlineStr" => CellValue::String(text.to_string()),
            _ => CellValue::String(text.to_string()),
        })
    }
}

/// excel serial -> datetime, rounded to the second
fn serial_to_datetime(n: f64) -> Option<NaiveDateTime> {
    let secs = (n * 86400.0).round();
    if !secs.is_finite() {
        return None;
    }
    BASE_DATETIME.checked_add_signed(Duration::try_seconds(secs as i64)?)
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Blank => Ok(()),
            CellValue::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            CellValue::Number(n) => write!(f, "{}", format_number(*n)),
            CellValue::Date(n) => match serial_to_datetime(*n) {
                Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d")),
                None => write!(f, "{}", format_number(*n)),
            },
            CellValue::Time(n) => match serial_to_datetime(*n) {
                Some(dt) => write!(f, "{}", dt.format("%H:%M:%S")),
                None => write!(f, "{}", format_number(*n)),
            },
            CellValue::Datetime(n) => match serial_to_datetime(*n) {
                Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
                None => write!(f, "{}", format_number(*n)),
            },
            CellValue::String(s) | CellValue::Error(s) => write!(f, "{}", s),
        }
    }
}

// datetime sign
const FMT_DATE: u8 = 0;
const FMT_TIME: u8 = 1;
const FMT_DATETIME: u8 = 2;
const FMT_DEFAULT: u8 = 255;

lazy_static! {
    static ref BASE_DATE: NaiveDate = NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or_default();
    static ref BASE_DATETIME: NaiveDateTime = BASE_DATE.and_hms_opt(0, 0, 0).unwrap_or_default();
    static ref DATETIME_FMTS: HashMap<u32, u8> = {
        let mut v = HashMap::new();
        v.extend((14..18).map(|n| (n, FMT_DATE)));
        v.extend((27..32).map(|n| (n, FMT_DATE)));
        v.extend((34..37).map(|n| (n, FMT_DATE)));
        v.extend((50..59).map(|n| (n, FMT_DATE)));
        v.extend((18..22).map(|n| (n, FMT_TIME)));
        v.extend((32..34).map(|n| (n, FMT_TIME)));
        v.extend((45..48).map(|n| (n, FMT_TIME)));
        v.insert(22, FMT_DATETIME);
        v
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_display_text() {
        assert_eq!(CellValue::Number(4500.0).to_string(), "4500");
        assert_eq!(CellValue::Number(-2.0).to_string(), "-2");
        assert_eq!(CellValue::Number(1.25).to_string(), "1.25");
        assert_eq!(CellValue::Bool(true).to_string(), "TRUE");
        assert_eq!(CellValue::Date(45292.0).to_string(), "2024-01-01");
        assert_eq!(CellValue::Time(0.5).to_string(), "12:00:00");
        assert_eq!(CellValue::Datetime(45292.75).to_string(), "2024-01-01 18:00:00");
        assert_eq!(CellValue::Error("#DIV/0!".into()).to_string(), "#DIV/0!");
        assert_eq!(CellValue::Blank.to_string(), "");
    }

    #[test]
    fn cell_parse_by_type() {
        let shared = vec!["車名".to_string()];
        assert_eq!(CellValue::parse(b"s", FMT_DEFAULT, "0", &shared).unwrap(), CellValue::String("車名".into()));
        assert!(CellValue::parse(b"s", FMT_DEFAULT, "3", &shared).is_err());
        assert_eq!(CellValue::parse(b"n", FMT_DATE, "45292", &shared).unwrap(), CellValue::Date(45292.0));
        assert_eq!(CellValue::parse(b"b", FMT_DEFAULT, "0", &shared).unwrap(), CellValue::Bool(false));
        assert_eq!(CellValue::parse(b"n", FMT_DEFAULT, "", &shared).unwrap(), CellValue::Blank);
    }

    #[test]
    fn shared_strings_skip_phonetic_runs() {
        let xml = r#"<sst uniqueCount="3"><si><t>車名</t><rPh sb="0" eb="2"><t>シャメイ</t></rPh></si><si><r><t>Full</t></r><r><t xml:space="preserve"> Name</t></r></si><si><t>A &amp; B</t></si></sst>"#;
        let strings = read_shared_strings(Reader::from_str(xml)).unwrap();
        assert_eq!(strings, vec!["車名".to_string(), "Full Name".to_string(), "A & B".to_string()]);
    }

    #[test]
    fn custom_formats() {
        assert_eq!(classify_format("yyyy/mm/dd"), Some(FMT_DATE));
        assert_eq!(classify_format("yyyy/mm/dd hh:mm"), Some(FMT_DATETIME));
        assert_eq!(classify_format("[h]:mm:ss"), Some(FMT_TIME));
        assert_eq!(classify_format("#,##0.0"), None);
        assert_eq!(sheet_path("worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(sheet_path("/xl/worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
    }
}

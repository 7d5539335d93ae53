//! Read uploaded workbooks into header-keyed rows

use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;

use anyhow::{Context, Result};
use calamine::{Data, Reader, open_workbook_auto_from_rs};
use chrono::{NaiveDate, NaiveTime, TimeDelta};
use serde_json::{Map, Value};

/// Extensions calamine can open
pub const SUPPORTED_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "ods"];

/// A data row: normalised header -> non-empty cell text
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SheetRow {
    /// 0-based position among the sheet's non-empty data rows
    pub index: usize,
    pub cells: BTreeMap<String, String>,
}

impl SheetRow {
    /// First non-empty value among `aliases`.
    pub fn get(&self, aliases: &[&str]) -> Option<&str> {
        aliases
            .iter()
            .filter_map(|alias| self.cells.get(*alias))
            .map(|v| v.as_str())
            .find(|v| !v.is_empty())
    }

    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .cells
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        Value::Object(map)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedSheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<SheetRow>,
}

pub fn has_supported_extension(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Parse every worksheet of an in-memory workbook.
pub fn read_workbook(bytes: Vec<u8>) -> Result<Vec<ParsedSheet>> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes)).context("File is not a readable spreadsheet")?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .with_context(|| format!("Failed to read sheet: {}", name))?;
        sheets.push(parse_sheet(&name, range.rows()));
    }

    Ok(sheets)
}

/// Turn raw cell rows into a [`ParsedSheet`]. The first row holding any text is the header.
pub fn parse_sheet<'a, I>(name: &str, rows: I) -> ParsedSheet
where
    I: IntoIterator<Item = &'a [Data]>,
{
    let mut rows = rows
        .into_iter()
        .map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>());

    let header_cells = loop {
        match rows.next() {
            Some(cells) if cells.iter().any(|c| !c.is_empty()) => break cells,
            Some(_) => continue,
            None => {
                return ParsedSheet {
                    name: name.to_string(),
                    ..Default::default()
                };
            }
        }
    };

    let headers = normalize_headers(&header_cells);
    let mut parsed = Vec::new();

    for cells in rows {
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }

        let cells = cells
            .into_iter()
            .enumerate()
            .filter(|(_, value)| !value.is_empty())
            .map(|(col, value)| {
                let key = headers
                    .get(col)
                    .cloned()
                    .unwrap_or_else(|| format!("column_{}", col + 1));
                (key, value)
            })
            .collect();

        parsed.push(SheetRow {
            index: parsed.len(),
            cells,
        });
    }

    ParsedSheet {
        name: name.to_string(),
        headers,
        rows: parsed,
    }
}

/// `" Employee Name (Full) "` -> `"employee_name_full"`
pub fn normalize_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;

    for ch in raw.trim().chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_sep = true;
        }
    }

    out
}

fn normalize_headers(raw: &[String]) -> Vec<String> {
    let width = raw.iter().rposition(|c| !c.is_empty()).map_or(0, |i| i + 1);
    let mut used: BTreeSet<String> = BTreeSet::new();

    raw[..width]
        .iter()
        .enumerate()
        .map(|(col, cell)| {
            let mut base = normalize_header(cell);
            if base.is_empty() {
                base = format!("column_{}", col + 1);
            }

            // a later real header may already own `name_2`
            let mut name = base.clone();
            let mut n = 1;
            while !used.insert(name.clone()) {
                n += 1;
                name = format!("{}_{}", base, n);
            }
            name
        })
        .collect()
}

pub fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => float_to_string(*f),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_string(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Error(_) | Data::Empty => String::new(),
    }
}

fn float_to_string(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        (f as i64).to_string()
    } else {
        f.to_string()
    }
}

/// Excel stores dates as days since 1899-12-30 (1900 date system).
/// Serials outside chrono's range come back as the plain number.
pub fn excel_serial_to_string(serial: f64) -> String {
    let stamp = NaiveDate::from_ymd_opt(1899, 12, 30)
        .map(|epoch| epoch.and_time(NaiveTime::MIN))
        .filter(|_| serial.is_finite() && serial.abs() < 1e12)
        .zip(TimeDelta::try_seconds((serial * 86_400.0).round() as i64))
        .and_then(|(epoch, offset)| epoch.checked_add_signed(offset));

    match stamp {
        Some(stamp) if stamp.time() == NaiveTime::MIN => stamp.format("%Y-%m-%d").to_string(),
        Some(stamp) => stamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => float_to_string(serial),
    }
}

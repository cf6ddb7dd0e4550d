use crate::models::{Column, ColumnKind, Dataset, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use csv::{ReaderBuilder, Trim};
use rand::Rng;
use rand::seq::SliceRandom;
use std::fmt;

pub const SAMPLE_CITIES: [&str; 3] = ["Jakarta", "Bandung", "Surabaya"];
pub const SAMPLE_YEAR: i32 = 2025;
pub const DATE_COLUMN: &str = "date";

const MISSING_MARKERS: [&str; 12] = [
    "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "null", "NULL", "None", "#N/A", "<NA>",
];

const DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y", "%d/%m/%Y"];

#[derive(Debug)]
pub enum ParseError {
    Empty,
    TooManyFields { line: u64, expected: usize, found: usize },
    Csv(csv::Error),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Empty => f.write_str("no columns to parse from file"),
            ParseError::TooManyFields {
                line,
                expected,
                found,
            } => write!(f, "expected {expected} fields in line {line}, saw {found}"),
            ParseError::Csv(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<csv::Error> for ParseError {
    fn from(err: csv::Error) -> Self {
        ParseError::Csv(err)
    }
}

pub fn generate_sample() -> Dataset {
    generate_sample_with(&mut rand::thread_rng())
}

/// Twelve month-end rows of 2025 with random sales, cost and city.
pub fn generate_sample_with<R: Rng>(rng: &mut R) -> Dataset {
    let columns = vec![
        Column {
            name: DATE_COLUMN.to_string(),
            kind: ColumnKind::DateTime,
        },
        Column {
            name: "sales".to_string(),
            kind: ColumnKind::Integer,
        },
        Column {
            name: "cost".to_string(),
            kind: ColumnKind::Integer,
        },
        Column {
            name: "city".to_string(),
            kind: ColumnKind::Text,
        },
    ];

    let rows = (1..=12)
        .filter_map(|month| month_end(SAMPLE_YEAR, month))
        .map(|date| {
            let city = SAMPLE_CITIES.choose(rng).copied().unwrap_or(SAMPLE_CITIES[0]);
            vec![
                Value::DateTime(date.and_time(NaiveTime::MIN)),
                Value::Int(rng.gen_range(100..500)),
                Value::Int(rng.gen_range(50..300)),
                Value::Text(city.to_string()),
            ]
        })
        .collect();

    Dataset { columns, rows }
}

fn month_end(year: i32, month: u32) -> Option<NaiveDate> {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    next?.pred_opt()
}

/// Parses an uploaded delimited text table, inferring a kind for every column.
pub fn parse_csv(bytes: &[u8]) -> Result<Dataset, ParseError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let text = String::from_utf8_lossy(bytes);
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let mut reader = ReaderBuilder::new()
        .delimiter(detect_delimiter(&text))
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let names = header_names(reader.headers()?.iter());
    if names.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut raw_rows: Vec<Vec<String>> = Vec::new();
    for result in reader.records() {
        let record = result?;
        if record.len() > names.len() {
            return Err(ParseError::TooManyFields {
                line: record.position().map(|pos| pos.line()).unwrap_or_default(),
                expected: names.len(),
                found: record.len(),
            });
        }
        raw_rows.push(record.iter().map(str::to_string).collect());
    }

    let mut column_values: Vec<Vec<Value>> = Vec::with_capacity(names.len());
    let mut columns = Vec::with_capacity(names.len());
    for (index, name) in names.into_iter().enumerate() {
        let cells: Vec<Option<&str>> = raw_rows
            .iter()
            .map(|row| row.get(index).map(String::as_str).filter(|cell| !is_missing(cell)))
            .collect();
        let (kind, values) = infer_column(&cells);
        columns.push(Column { name, kind });
        column_values.push(values);
    }

    let rows = (0..raw_rows.len())
        .map(|row| {
            column_values
                .iter_mut()
                .map(|values| std::mem::replace(&mut values[row], Value::Missing))
                .collect()
        })
        .collect();

    Ok(Dataset { columns, rows })
}

fn detect_delimiter(text: &str) -> u8 {
    let Some(first_line) = text.lines().find(|line| !line.trim().is_empty()) else {
        return b',';
    };

    let mut best = b',';
    let mut best_count = 0;
    for delimiter in DELIMITERS {
        let count = first_line.bytes().filter(|byte| *byte == delimiter).count();
        if count > best_count {
            best = delimiter;
            best_count = count;
        }
    }
    best
}

fn header_names<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for (index, name) in raw.enumerate() {
        let base = if name.is_empty() {
            format!("Unnamed: {index}")
        } else {
            name.to_string()
        };

        let mut candidate = base.clone();
        let mut suffix = 1;
        while names.contains(&candidate) {
            candidate = format!("{base}.{suffix}");
            suffix += 1;
        }
        names.push(candidate);
    }
    names
}

fn is_missing(cell: &str) -> bool {
    cell.is_empty() || MISSING_MARKERS.contains(&cell)
}

fn infer_column(cells: &[Option<&str>]) -> (ColumnKind, Vec<Value>) {
    let present = || cells.iter().flatten();

    // Nothing but missing cells reads as an empty float column.
    if present().next().is_none() {
        return (ColumnKind::Float, vec![Value::Missing; cells.len()]);
    }

    if present().all(|cell| cell.parse::<i64>().is_ok()) {
        let values = cells
            .iter()
            .map(|cell| match cell.and_then(|c| c.parse().ok()) {
                Some(v) => Value::Int(v),
                None => Value::Missing,
            })
            .collect();
        return (ColumnKind::Integer, values);
    }

    if present().all(|cell| cell.parse::<f64>().is_ok()) {
        let values = cells
            .iter()
            .map(|cell| match cell.and_then(|c| c.parse().ok()) {
                Some(v) => Value::Float(v),
                None => Value::Missing,
            })
            .collect();
        return (ColumnKind::Float, values);
    }

    let values = cells
        .iter()
        .map(|cell| match cell {
            Some(text) => Value::Text((*text).to_string()),
            None => Value::Missing,
        })
        .collect();
    (ColumnKind::Text, values)
}

/// Converts a text column named `date` to timestamps. Any value that does not
/// parse leaves the whole column untouched.
pub fn normalize_date_column(dataset: &mut Dataset) {
    let Some(index) = dataset.column_index(DATE_COLUMN) else {
        return;
    };
    if dataset.columns[index].kind != ColumnKind::Text {
        return;
    }

    let mut parsed = Vec::with_capacity(dataset.rows.len());
    let mut any_present = false;
    for row in &dataset.rows {
        match row.get(index) {
            Some(Value::Text(text)) => match parse_datetime(text) {
                Some(value) => {
                    any_present = true;
                    parsed.push(Value::DateTime(value));
                }
                None => return,
            },
            _ => parsed.push(Value::Missing),
        }
    }
    if !any_present {
        return;
    }

    for (row, value) in dataset.rows.iter_mut().zip(parsed) {
        if let Some(cell) = row.get_mut(index) {
            *cell = value;
        }
    }
    dataset.columns[index].kind = ColumnKind::DateTime;
}

pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(value) = DateTime::parse_from_rfc3339(text) {
        return Some(value.naive_local());
    }
    for format in DATETIME_FORMATS {
        if let Ok(value) = NaiveDateTime::parse_from_str(text, format) {
            return Some(value);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(value) = NaiveDate::parse_from_str(text, format) {
            return Some(value.and_time(NaiveTime::MIN));
        }
    }
    NaiveDate::parse_from_str(&format!("{text}-01"), "%Y-%m-%d")
        .ok()
        .map(|value| value.and_time(NaiveTime::MIN))
}

use crate::chart::RenderedChart;
use crate::dashboard::ViewOptions;
use crate::stats::Summary;
use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Integer,
    Float,
    Text,
    DateTime,
}

impl ColumnKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnKind::Integer | ColumnKind::Float)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
    Missing,
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) if !v.is_nan() => Some(*v),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Text form used for display, bar labels and the city filter.
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) if v.fract() == 0.0 && v.abs() < 1e15 => write!(f, "{v:.1}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::DateTime(v) if v.time().num_seconds_from_midnight() == 0 && v.nanosecond() == 0 => {
                write!(f, "{}", v.format("%Y-%m-%d"))
            }
            Value::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S")),
            Value::Missing => Ok(()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Float(v) if v.is_finite() => serializer.serialize_f64(*v),
            Value::Float(_) | Value::Missing => serializer.serialize_none(),
            Value::Text(_) | Value::DateTime(_) => serializer.serialize_str(&self.to_text()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

/// In-memory table for one render.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

impl Dataset {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }

    pub fn values<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = &'a Value> + use<'a>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| row.get(index).unwrap_or(&Value::Missing)))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    #[default]
    Sample,
    Upload,
}

impl DataSource {
    pub fn as_str(self) -> &'static str {
        match self {
            DataSource::Sample => "sample",
            DataSource::Upload => "upload",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DataSource::Sample => "Use sample data",
            DataSource::Upload => "Upload your own CSV file",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "sample" => Some(DataSource::Sample),
            "upload" => Some(DataSource::Upload),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    #[default]
    Line,
    Bar,
}

impl ChartKind {
    pub const ALL: [ChartKind; 2] = [ChartKind::Line, ChartKind::Bar];

    pub fn as_str(self) -> &'static str {
        match self {
            ChartKind::Line => "line",
            ChartKind::Bar => "bar",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ChartKind::Line => "Line chart",
            ChartKind::Bar => "Bar chart",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "line" => Some(ChartKind::Line),
            "bar" => Some(ChartKind::Bar),
            _ => None,
        }
    }
}

pub const ALL_CITIES: &str = "all";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewSelection {
    pub chart: ChartKind,
    pub x: String,
    pub y: String,
    /// `None` when the dataset has no city column.
    pub city: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Raw query string of `/` and `/api/dashboard`. Every field is optional and
/// resolved against the dataset during the render.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewQuery {
    pub source: Option<String>,
    pub chart: Option<String>,
    pub x: Option<String>,
    pub y: Option<String>,
    pub city: Option<String>,
}

impl ViewQuery {
    /// The requested data source; anything unrecognised means the sample.
    pub fn data_source(&self) -> DataSource {
        self.source
            .as_deref()
            .and_then(DataSource::parse)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadInfo {
    pub file_name: String,
    pub size: usize,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ViewResponse {
    Hidden,
    NoNumericColumns {
        message: String,
    },
    Empty {
        message: String,
    },
    Ready {
        x: String,
        y: String,
        row_count: usize,
        chart: Option<RenderedChart>,
        chart_error: Option<String>,
        summary: Summary,
    },
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub source: DataSource,
    pub upload: Option<UploadInfo>,
    pub notices: Vec<Notice>,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
    pub numeric_columns: Vec<String>,
    pub options: Option<ViewOptions>,
    pub selection: Option<ViewSelection>,
    pub view: ViewResponse,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn datetime_at_midnight_displays_as_date() {
        let midnight = NaiveDate::from_ymd_opt(2025, 1, 31)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(Value::DateTime(midnight).to_text(), "2025-01-31");

        let evening = NaiveDate::from_ymd_opt(2025, 1, 31)
            .unwrap()
            .and_hms_opt(18, 30, 5)
            .unwrap();
        assert_eq!(Value::DateTime(evening).to_text(), "2025-01-31 18:30:05");
    }

    #[test]
    fn value_serializes_missing_and_nan_as_null() {
        let json = serde_json::to_value(vec![
            Value::Int(3),
            Value::Float(f64::NAN),
            Value::Missing,
            Value::Text("Bandung".into()),
        ])
        .unwrap();
        assert_eq!(json, serde_json::json!([3, null, null, "Bandung"]));
    }

    #[test]
    fn chart_kind_parse_rejects_unknown() {
        assert_eq!(ChartKind::parse("bar"), Some(ChartKind::Bar));
        assert_eq!(ChartKind::parse(" line "), Some(ChartKind::Line));
        assert_eq!(ChartKind::parse("pie"), None);
    }

    #[test]
    fn unknown_data_source_falls_back_to_sample() {
        let query = |source: Option<&str>| ViewQuery {
            source: source.map(str::to_string),
            ..ViewQuery::default()
        };
        assert_eq!(query(Some("upload")).data_source(), DataSource::Upload);
        assert_eq!(query(Some("bogus")).data_source(), DataSource::Sample);
        assert_eq!(query(None).data_source(), DataSource::Sample);
    }
}

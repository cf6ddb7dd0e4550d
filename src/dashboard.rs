//! One page render: resolve the data, classify columns, apply the user's
//! selection and produce everything the page and the JSON API show.

use crate::chart::{self, ChartOutcome};
use crate::models::{
    ALL_CITIES, ChartKind, DataSource, Dataset, Notice, UploadInfo, ViewQuery, ViewSelection,
};
use crate::session::StoredUpload;
use crate::source::{self, normalize_date_column};
use crate::stats::{self, Summary};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, warn};

pub const CITY_COLUMN: &str = "city";

pub const MISSING_UPLOAD: &str =
    "Please upload a CSV file first, or choose 'Use sample data'.";
pub const NO_NUMERIC_COLUMNS: &str =
    "There are no numeric columns in the data. Add number columns (int/float) to your CSV.";
pub const EMPTY_AFTER_FILTER: &str =
    "The data is empty after filtering. Try changing the filter or uploading other data.";

/// Per-request state, built at the start of a render and dropped at its end.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub source: DataSource,
    pub upload: Option<UploadInfo>,
    pub notices: Vec<Notice>,
    pub dataset: Option<Dataset>,
}

/// Resolves the data source. `sample` is only called when the sample is used.
pub fn acquire(
    source: DataSource,
    upload: Option<&StoredUpload>,
    sample: impl FnOnce() -> Dataset,
) -> RenderContext {
    let mut notices = Vec::new();
    let upload_info = upload.map(StoredUpload::info);

    let dataset = match (source, upload) {
        (DataSource::Upload, Some(file)) => match source::parse_csv(&file.bytes) {
            Ok(data) => Some(data),
            Err(err) => {
                warn!(file = %file.file_name, "failed to parse upload: {err}");
                notices.push(Notice::error(format!(
                    "Could not read the uploaded file: {err}"
                )));
                None
            }
        },
        (DataSource::Upload, None) => {
            notices.push(Notice::warning(MISSING_UPLOAD));
            Some(sample())
        }
        (DataSource::Sample, _) => Some(sample()),
    };

    let dataset = dataset.map(|mut data| {
        normalize_date_column(&mut data);
        data
    });

    RenderContext {
        source,
        upload: upload_info,
        notices,
        dataset,
    }
}

/// Numeric columns in source order.
pub fn numeric_columns(dataset: &Dataset) -> Vec<String> {
    dataset
        .columns
        .iter()
        .filter(|column| column.kind.is_numeric())
        .map(|column| column.name.clone())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewOptions {
    pub charts: Vec<ChartKind>,
    pub x_columns: Vec<String>,
    pub y_columns: Vec<String>,
    /// Distinct observed cities, sorted; `None` without a city column.
    pub cities: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewConfig {
    pub options: ViewOptions,
    pub selection: ViewSelection,
}

pub fn city_options(dataset: &Dataset) -> Option<Vec<String>> {
    let values = dataset.values(CITY_COLUMN)?;
    let cities: BTreeSet<String> = values
        .filter(|value| !value.is_missing())
        .map(|value| value.to_text())
        .collect();
    Some(cities.into_iter().collect())
}

/// Offers the selectable options and resolves the query against them; an
/// invalid or absent choice falls back to the first option.
pub fn configure(dataset: &Dataset, numeric: &[String], query: &ViewQuery) -> ViewConfig {
    let x_columns = dataset.column_names();
    let y_columns = numeric.to_vec();
    let cities = city_options(dataset);

    let chart = query
        .chart
        .as_deref()
        .and_then(ChartKind::parse)
        .unwrap_or_default();
    let x = pick(query.x.as_deref(), &x_columns);
    let y = pick(query.y.as_deref(), &y_columns);
    let city = cities.as_ref().map(|cities| {
        query
            .city
            .as_deref()
            .filter(|city| cities.iter().any(|known| known.as_str() == *city))
            .unwrap_or(ALL_CITIES)
            .to_string()
    });

    ViewConfig {
        options: ViewOptions {
            charts: ChartKind::ALL.to_vec(),
            x_columns,
            y_columns,
            cities,
        },
        selection: ViewSelection { chart, x, y, city },
    }
}

fn pick(requested: Option<&str>, options: &[String]) -> String {
    requested
        .and_then(|wanted| options.iter().find(|option| option.as_str() == wanted))
        .or_else(|| options.first())
        .cloned()
        .unwrap_or_default()
}

/// Rows whose city text equals `city`; every row for `all`, `None`, or a
/// dataset without a city column.
pub fn filter_by_city(dataset: &Dataset, city: Option<&str>) -> Dataset {
    let index = match (city, dataset.column_index(CITY_COLUMN)) {
        (Some(city), Some(index)) if city != ALL_CITIES => index,
        _ => return dataset.clone(),
    };
    let wanted = city.unwrap_or_default();

    Dataset {
        columns: dataset.columns.clone(),
        rows: dataset
            .rows
            .iter()
            .filter(|row| row.get(index).is_some_and(|value| value.to_text() == wanted))
            .cloned()
            .collect(),
    }
}

#[derive(Debug, Clone)]
pub struct Panels {
    pub chart_kind: ChartKind,
    pub chart: ChartOutcome,
    pub summary: Summary,
    pub x: String,
    pub y: String,
    pub row_count: usize,
}

impl Panels {
    pub fn chart_error(&self) -> Option<String> {
        self.chart.as_ref().err().map(|err| {
            format!(
                "Failed to build {} chart: {err}",
                self.chart_kind.as_str()
            )
        })
    }
}

#[derive(Debug, Clone)]
pub enum Visualization {
    /// No dataset could be loaded.
    Hidden,
    NoNumericColumns(Notice),
    Empty(Notice),
    Ready(Box<Panels>),
}

#[derive(Debug, Clone)]
pub struct Dashboard {
    pub source: DataSource,
    pub upload: Option<UploadInfo>,
    pub notices: Vec<Notice>,
    pub dataset: Option<Dataset>,
    pub numeric_columns: Vec<String>,
    pub config: Option<ViewConfig>,
    pub visualization: Visualization,
}

pub fn build(ctx: RenderContext, query: &ViewQuery) -> Dashboard {
    let RenderContext {
        source,
        upload,
        notices,
        dataset,
    } = ctx;

    let Some(data) = dataset else {
        return Dashboard {
            source,
            upload,
            notices,
            dataset: None,
            numeric_columns: Vec::new(),
            config: None,
            visualization: Visualization::Hidden,
        };
    };

    let numeric = numeric_columns(&data);
    if numeric.is_empty() {
        debug!(columns = data.columns.len(), "dataset has no numeric columns");
        return Dashboard {
            source,
            upload,
            notices,
            dataset: Some(data),
            numeric_columns: numeric,
            config: None,
            visualization: Visualization::NoNumericColumns(Notice::error(NO_NUMERIC_COLUMNS)),
        };
    }

    let config = configure(&data, &numeric, query);
    let selection = &config.selection;
    let view = filter_by_city(&data, selection.city.as_deref());

    let visualization = if view.is_empty() {
        Visualization::Empty(Notice::warning(EMPTY_AFTER_FILTER))
    } else {
        let chart = chart::render(&view, selection.chart, &selection.x, &selection.y);
        if let Err(err) = &chart {
            debug!(chart = selection.chart.as_str(), "chart failed: {err}");
        }
        let summary = stats::describe(view.values(&selection.y).into_iter().flatten());
        Visualization::Ready(Box::new(Panels {
            chart_kind: selection.chart,
            chart,
            summary,
            x: selection.x.clone(),
            y: selection.y.clone(),
            row_count: view.len(),
        }))
    };

    debug!(
        source = source.as_str(),
        rows = data.len(),
        filtered = view.len(),
        "dashboard rendered"
    );

    Dashboard {
        source,
        upload,
        notices,
        dataset: Some(data),
        numeric_columns: numeric,
        config: Some(config),
        visualization,
    }
}

use crate::models::Value;
use serde::{Serialize, Serializer};

/// Descriptive statistics of one numeric column. Undefined entries are NaN.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    #[serde(serialize_with = "finite_or_null")]
    pub mean: f64,
    #[serde(serialize_with = "finite_or_null")]
    pub std: f64,
    #[serde(serialize_with = "finite_or_null")]
    pub min: f64,
    #[serde(rename = "25%", serialize_with = "finite_or_null")]
    pub q25: f64,
    #[serde(rename = "50%", serialize_with = "finite_or_null")]
    pub median: f64,
    #[serde(rename = "75%", serialize_with = "finite_or_null")]
    pub q75: f64,
    #[serde(serialize_with = "finite_or_null")]
    pub max: f64,
}

impl Summary {
    pub fn rows(&self) -> [(&'static str, f64); 8] {
        [
            ("count", self.count as f64),
            ("mean", self.mean),
            ("std", self.std),
            ("min", self.min),
            ("25%", self.q25),
            ("50%", self.median),
            ("75%", self.q75),
            ("max", self.max),
        ]
    }
}

fn finite_or_null<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_finite() {
        serializer.serialize_f64(*value)
    } else {
        serializer.serialize_none()
    }
}

pub fn describe<'a>(values: impl IntoIterator<Item = &'a Value>) -> Summary {
    let mut data: Vec<f64> = values.into_iter().filter_map(Value::as_f64).collect();
    data.sort_by(f64::total_cmp);
    describe_sorted(&data)
}

fn describe_sorted(data: &[f64]) -> Summary {
    let count = data.len();
    if count == 0 {
        return Summary {
            count,
            mean: f64::NAN,
            std: f64::NAN,
            min: f64::NAN,
            q25: f64::NAN,
            median: f64::NAN,
            q75: f64::NAN,
            max: f64::NAN,
        };
    }

    let mean = data.iter().sum::<f64>() / count as f64;
    let std = if count < 2 {
        f64::NAN
    } else {
        let squares: f64 = data.iter().map(|v| (v - mean).powi(2)).sum();
        (squares / (count - 1) as f64).sqrt()
    };

    Summary {
        count,
        mean,
        std,
        min: data[0],
        q25: quantile(data, 0.25),
        median: quantile(data, 0.5),
        q75: quantile(data, 0.75),
        max: data[count - 1],
    }
}

/// Linear interpolation between closest ranks; `data` must be sorted.
fn quantile(data: &[f64], q: f64) -> f64 {
    let position = (data.len() - 1) as f64 * q;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    data[lower] + (data[upper] - data[lower]) * weight
}

pub fn format_stat(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else {
        format!("{value:.6}")
    }
}

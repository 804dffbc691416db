use chrono::NaiveDate;
use serde::Deserialize;

/// Body of the time-series API: `{"data": [["2024-01-01", 0.206], ...]}`.
/// Values are fractions when requested with `representation_mode=percent_change`;
/// a month the source has not published yet comes back as `null`.
#[derive(Debug, Clone, Deserialize)]
pub struct SeriesResponse {
    pub data: Vec<(NaiveDate, Option<f64>)>,
}

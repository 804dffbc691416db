use crate::config::Settings;
use crate::domain::inflation::InflationDataPoint;
use crate::ingest::types::SeriesResponse;
use crate::ingest::InflationFetcher;
use crate::time::period::YearMonth;
use anyhow::{Context, Result};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
// National CPI, general level, monthly.
const DEFAULT_SERIES_ID: &str = "148.3_INIVELNAL_DICI_M_26";
const MAX_ROWS: u32 = 1000;

#[derive(Debug, Clone)]
pub struct HttpInflationProvider {
    http: reqwest::Client,
    base_url: String,
    series_id: String,
}

impl HttpInflationProvider {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.inflation_api_base_url().to_string();

        let timeout_secs = std::env::var("INFLATION_API_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let series_id = std::env::var("INFLATION_SERIES_ID")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SERIES_ID.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build inflation api http client")?;

        Ok(Self {
            http,
            base_url,
            series_id,
        })
    }

    fn url(&self) -> String {
        format!("{}/series/", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl InflationFetcher for HttpInflationProvider {
    fn source_name(&self) -> &'static str {
        "datos_gob_ar_series"
    }

    async fn fetch_monthly_series(&self) -> Result<Vec<InflationDataPoint>> {
        let res = self
            .http
            .get(self.url())
            .query(&[
                ("ids", self.series_id.as_str()),
                ("representation_mode", "percent_change"),
                ("format", "json"),
                ("sort", "asc"),
            ])
            .query(&[("limit", MAX_ROWS)])
            .send()
            .await
            .context("inflation api request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read inflation api response")?;
        if !status.is_success() {
            anyhow::bail!("inflation api HTTP {status}: {text}");
        }

        let parsed = serde_json::from_str::<SeriesResponse>(&text)
            .with_context(|| format!("failed to parse inflation api response: {text}"))?;
        Ok(into_points(parsed))
    }
}

/// Fractions become percent with two decimals; unpublished months are skipped.
fn into_points(resp: SeriesResponse) -> Vec<InflationDataPoint> {
    let mut out: Vec<InflationDataPoint> = resp
        .data
        .into_iter()
        .filter_map(|(date, value)| {
            let value = value.filter(|v| v.is_finite())?;
            Some(InflationDataPoint {
                period: YearMonth::from_date(date),
                value: (value * 10_000.0).round() / 100.0,
                is_estimated: false,
            })
        })
        .collect();
    out.sort_by_key(|p| p.period);
    out.dedup_by_key(|p| p.period);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_series_rows_as_monthly_percent() {
        let v = json!({
            "data": [
                ["2024-02-01", 0.132],
                ["2024-01-01", 0.206],
                ["2024-03-01", null]
            ],
            "meta": [{"frequency": "month"}]
        });
        let parsed: SeriesResponse = serde_json::from_value(v).unwrap();
        let points = into_points(parsed);

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].period, YearMonth::new(2024, 1).unwrap());
        assert_eq!(points[0].value, 20.6);
        assert_eq!(points[1].value, 13.2);
        assert!(points.iter().all(|p| !p.is_estimated));
    }

    #[test]
    fn rejects_non_date_rows() {
        let v = json!({"data": [["enero", 0.1]]});
        assert!(serde_json::from_value::<SeriesResponse>(v).is_err());
    }
}

use crate::time::period::YearMonth;
use serde::{Deserialize, Serialize};

/// Monthly consumer price change. `value` is the month-over-month rate in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InflationDataPoint {
    pub period: YearMonth,
    pub value: f64,
    pub is_estimated: bool,
}

/// Fills the months after the last observation up to and including `through` with
/// estimates equal to the mean of the last three observed values.
pub fn extrapolate_estimates(
    observed: &[InflationDataPoint],
    through: YearMonth,
) -> Vec<InflationDataPoint> {
    let mut out: Vec<InflationDataPoint> = observed.to_vec();
    out.sort_by_key(|p| p.period);
    out.dedup_by_key(|p| p.period);

    let real: Vec<f64> = out
        .iter()
        .filter(|p| !p.is_estimated)
        .map(|p| p.value)
        .collect();
    let Some(last) = out.last().map(|p| p.period) else {
        return out;
    };
    if real.is_empty() {
        return out;
    }

    let tail = &real[real.len().saturating_sub(3)..];
    let estimate = tail.iter().sum::<f64>() / tail.len() as f64;
    let estimate = (estimate * 100.0).round() / 100.0;

    let mut period = last.next();
    while period <= through {
        out.push(InflationDataPoint {
            period,
            value: estimate,
            is_estimated: true,
        });
        period = period.next();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ym(y: i32, m: u32) -> YearMonth {
        YearMonth::new(y, m).unwrap()
    }

    fn point(y: i32, m: u32, value: f64) -> InflationDataPoint {
        InflationDataPoint {
            period: ym(y, m),
            value,
            is_estimated: false,
        }
    }

    #[test]
    fn extrapolates_with_mean_of_last_three() {
        let observed = vec![
            point(2024, 1, 20.0),
            point(2024, 2, 3.0),
            point(2024, 3, 4.0),
            point(2024, 4, 5.0),
        ];
        let out = extrapolate_estimates(&observed, ym(2024, 6));
        assert_eq!(out.len(), 6);
        assert!(out[4].is_estimated && out[5].is_estimated);
        assert_eq!(out[4].period, ym(2024, 5));
        assert!((out[4].value - 4.0).abs() < 1e-9);
        assert!(!out[3].is_estimated);
    }

    #[test]
    fn nothing_to_fill_when_series_is_current() {
        let observed = vec![point(2024, 5, 4.2), point(2024, 6, 3.9)];
        let out = extrapolate_estimates(&observed, ym(2024, 6));
        assert_eq!(out, observed);
    }

    #[test]
    fn empty_series_stays_empty() {
        assert!(extrapolate_estimates(&[], ym(2024, 6)).is_empty());
    }
}

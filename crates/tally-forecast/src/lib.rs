// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Minimal next-period spend forecasting.
//!
//! Fits a one-lag autoregression on the first differences of the series via
//! ordinary least squares, with a pure linear shortcut when the differences
//! are constant. This is deliberately not a general time-series library.

use tally_core::TallyError;
use tally_ledger::UsageLedger;
use tracing::debug;

/// Forecast the next value of an ordered numeric series.
///
/// - empty series: error
/// - fewer than 2 points: the last value unchanged
/// - constant differences: `last + difference`
/// - otherwise: AR(1) on the differences; with zero variance in the lagged
///   differences the coefficient degenerates to 0 and the mean difference
///   alone carries the forecast
pub fn extrapolate(series: &[f64]) -> Result<f64, TallyError> {
    let Some(&last) = series.last() else {
        return Err(TallyError::Validation(
            "series must not be empty".to_string(),
        ));
    };
    if series.len() < 2 {
        return Ok(last);
    }

    let diffs: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();
    let last_diff = diffs[diffs.len() - 1];
    if diffs.iter().all(|d| *d == diffs[0]) {
        return Ok(last + last_diff);
    }

    // Lag-1 autocorrelation over all but the first difference against all
    // but the last.
    let n = diffs.len() - 1;
    let mean = diffs[..n].iter().sum::<f64>() / n.max(1) as f64;
    let mut num = 0.0;
    let mut den = 0.0;
    for i in 1..diffs.len() {
        num += (diffs[i] - mean) * (diffs[i - 1] - mean);
        den += (diffs[i - 1] - mean).powi(2);
    }
    let phi = if den != 0.0 { num / den } else { 0.0 };
    let forecast_diff = mean + phi * (last_diff - mean);
    debug!(phi, mean, forecast_diff, "AR(1) extrapolation");
    Ok(last + forecast_diff)
}

/// Forecast the next period's spend from the ledger's hourly aggregates.
pub async fn forecast_next_period(
    ledger: &UsageLedger,
    hours: u32,
) -> Result<f64, TallyError> {
    let totals = ledger.get_hourly_totals(hours).await?;
    extrapolate(&totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DurationRound, TimeDelta, Utc};
    use std::sync::Arc;
    use tally_fx::RateStore;
    use tally_ledger::NewUsageEvent;
    use tally_pricing::MarkupRuleStore;
    use tally_storage::Database;

    #[test]
    fn empty_series_is_an_error() {
        assert!(extrapolate(&[]).is_err());
    }

    #[test]
    fn single_point_returns_it_unchanged() {
        assert_eq!(extrapolate(&[7.0]).unwrap(), 7.0);
    }

    #[test]
    fn constant_differences_extend_linearly() {
        assert_eq!(extrapolate(&[1.0, 2.0, 3.0, 4.0]).unwrap(), 5.0);
        assert_eq!(extrapolate(&[10.0, 8.0, 6.0]).unwrap(), 4.0);
    }

    #[test]
    fn flat_series_stays_flat() {
        assert_eq!(extrapolate(&[3.0, 3.0, 3.0]).unwrap(), 3.0);
    }

    #[test]
    fn oscillating_series_uses_ar1() {
        // diffs = [1, -1, 1]; mean of first two = 0; phi = -1;
        // forecast diff = 0 + (-1) * (1 - 0) = -1.
        let next = extrapolate(&[0.0, 1.0, 0.0, 1.0]).unwrap();
        assert!((next - 0.0).abs() < 1e-9);
    }

    #[test]
    fn zero_variance_in_lagged_diffs_degenerates_to_mean() {
        // diffs = [1, 1, 2]; lagged diffs all equal the mean, so phi = 0
        // and the forecast difference is the mean alone.
        let next = extrapolate(&[0.0, 1.0, 2.0, 4.0]).unwrap();
        assert!((next - 5.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn forecasts_from_hourly_ledger_totals() {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let markup = Arc::new(MarkupRuleStore::new(db.clone()));
        let rates = Arc::new(RateStore::new(db.clone()));
        let ledger = UsageLedger::new(db, markup, rates, "USD".to_string());

        let top_of_hour = Utc::now().duration_trunc(TimeDelta::hours(1)).unwrap();
        for i in 0..3u32 {
            let event = NewUsageEvent {
                event_id: format!("e{i}"),
                ts: top_of_hour - TimeDelta::hours(i64::from(3 - i)),
                customer_id: "cust".to_string(),
                provider: "openai".to_string(),
                model: "gpt".to_string(),
                metric_type: "tokens".to_string(),
                units: 10.0,
                unit_cost: 0.5,
                currency: "USD".to_string(),
                cycle: "2026-05".to_string(),
            };
            ledger.add_event(&event).await.unwrap();
        }

        let forecast = forecast_next_period(&ledger, 4).await.unwrap();
        assert!(forecast > 0.0);
    }
}

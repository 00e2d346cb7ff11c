use chrono::{Datelike, NaiveDate};

use super::error::{Result, SimError};
use super::types::{DateWindow, PricePoint, RatePoint, ValuePoint};

pub fn validate_series(series: &[PricePoint]) -> Result<()> {
    if series.is_empty() {
        return Err(SimError::InvalidSeries("price series is empty".to_string()));
    }

    for (idx, point) in series.iter().enumerate() {
        if !point.price.is_finite() || point.price <= 0.0 {
            return Err(SimError::InvalidSeries(format!(
                "price on {} must be finite and > 0",
                point.date
            )));
        }
        if let Some(dividend) = point.dividend_per_unit {
            if !dividend.is_finite() || dividend < 0.0 {
                return Err(SimError::InvalidSeries(format!(
                    "dividend on {} must be finite and >= 0",
                    point.date
                )));
            }
        }
        if idx > 0 && series[idx - 1].date >= point.date {
            return Err(SimError::InvalidSeries(format!(
                "dates must be strictly ascending, found {} after {}",
                point.date,
                series[idx - 1].date
            )));
        }
    }
    Ok(())
}

pub(crate) fn validate_index(index: &[ValuePoint]) -> Result<()> {
    if index.is_empty() {
        return Err(SimError::InvalidSeries("price index is empty".to_string()));
    }

    for (idx, point) in index.iter().enumerate() {
        if !point.value.is_finite() || point.value <= 0.0 {
            return Err(SimError::InvalidSeries(format!(
                "price index on {} must be finite and > 0",
                point.date
            )));
        }
        if idx > 0 && index[idx - 1].date >= point.date {
            return Err(SimError::InvalidSeries(format!(
                "price index dates must be strictly ascending, found {} after {}",
                point.date,
                index[idx - 1].date
            )));
        }
    }
    Ok(())
}

/// Points of an ascending series whose date falls inside the window.
pub fn slice_window(series: &[PricePoint], window: DateWindow) -> &[PricePoint] {
    let lower = series.partition_point(|p| p.date < window.start());
    let upper = series.partition_point(|p| p.date <= window.end());
    &series[lower..upper.max(lower)]
}

/// Turns a table of annual savings rates into a value series starting at 1.0.
///
/// Each row's rate compounds monthly until the next row's date, so a
/// monthly Livret A table behaves like a unit price that can be bought and
/// sold by the engine. Regulated rates change on the first of a month, and
/// rows dated on any other day are rejected.
pub fn rate_index_series(rates: &[RatePoint]) -> Result<Vec<PricePoint>> {
    if rates.is_empty() {
        return Err(SimError::InvalidSeries("rate table is empty".to_string()));
    }

    let mut series = Vec::with_capacity(rates.len());
    let mut value = 1.0;
    for (idx, row) in rates.iter().enumerate() {
        if !row.annual_rate_pct.is_finite() || row.annual_rate_pct <= -100.0 {
            return Err(SimError::InvalidSeries(format!(
                "annual rate on {} must be finite and > -100",
                row.date
            )));
        }
        if row.date.day() != 1 {
            return Err(SimError::InvalidSeries(format!(
                "rate row {} must fall on the first day of a month",
                row.date
            )));
        }
        if idx > 0 {
            let previous = &rates[idx - 1];
            if previous.date >= row.date {
                return Err(SimError::InvalidSeries(format!(
                    "rate dates must be strictly ascending, found {} after {}",
                    row.date, previous.date
                )));
            }
            let months = months_between(previous.date, row.date);
            let annual = 1.0 + previous.annual_rate_pct / 100.0;
            value *= annual.powf(f64::from(months) / 12.0);
        }
        series.push(PricePoint::new(row.date, value));
    }
    Ok(series)
}

fn months_between(from: NaiveDate, to: NaiveDate) -> u32 {
    let months = (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32;
    months.max(0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn validate_series_rejects_empty_unsorted_and_bad_prices() {
        assert!(validate_series(&[]).is_err());

        let unsorted = [
            PricePoint::new(date(2020, 2, 1), 100.0),
            PricePoint::new(date(2020, 1, 1), 100.0),
        ];
        assert!(matches!(
            validate_series(&unsorted),
            Err(SimError::InvalidSeries(_))
        ));

        let duplicate = [
            PricePoint::new(date(2020, 1, 1), 100.0),
            PricePoint::new(date(2020, 1, 1), 101.0),
        ];
        assert!(validate_series(&duplicate).is_err());

        let zero_price = [PricePoint::new(date(2020, 1, 1), 0.0)];
        assert!(validate_series(&zero_price).is_err());

        let negative_dividend = [PricePoint::new(date(2020, 1, 1), 10.0).with_dividend(-1.0)];
        assert!(validate_series(&negative_dividend).is_err());
    }

    #[test]
    fn slice_window_keeps_inclusive_bounds() {
        let series = (1..=6)
            .map(|m| PricePoint::new(date(2020, m, 1), 100.0 + m as f64))
            .collect::<Vec<_>>();
        let window = DateWindow::new(date(2020, 2, 1), date(2020, 4, 1)).expect("valid window");
        let sliced = slice_window(&series, window);
        assert_eq!(sliced.len(), 3);
        assert_eq!(sliced[0].date, date(2020, 2, 1));
        assert_eq!(sliced[2].date, date(2020, 4, 1));
    }

    #[test]
    fn slice_window_between_samples_is_empty() {
        let series = [
            PricePoint::new(date(2019, 1, 1), 100.0),
            PricePoint::new(date(2025, 1, 1), 100.0),
        ];
        let window = DateWindow::new(date(2020, 1, 1), date(2021, 1, 1)).expect("valid window");
        assert!(slice_window(&series, window).is_empty());
    }

    #[test]
    fn rate_index_series_compounds_monthly() {
        let rates = (1..=13)
            .map(|m| RatePoint {
                date: date(2020 + (m as i32 - 1) / 12, (m - 1) % 12 + 1, 1),
                annual_rate_pct: 3.0,
            })
            .collect::<Vec<_>>();
        let series = rate_index_series(&rates).expect("valid rates");
        assert_eq!(series.len(), 13);
        assert_approx(series[0].price, 1.0);
        assert_approx(series[1].price, 1.03_f64.powf(1.0 / 12.0));
        assert_approx(series[12].price, 1.03);
    }

    #[test]
    fn rate_index_series_applies_previous_rate_over_gaps() {
        let rates = [
            RatePoint {
                date: date(2020, 1, 1),
                annual_rate_pct: 2.0,
            },
            RatePoint {
                date: date(2021, 1, 1),
                annual_rate_pct: 3.0,
            },
            RatePoint {
                date: date(2021, 7, 1),
                annual_rate_pct: 3.0,
            },
        ];
        let series = rate_index_series(&rates).expect("valid rates");
        assert_approx(series[1].price, 1.02);
        assert_approx(series[2].price, 1.02 * 1.03_f64.sqrt());
    }

    #[test]
    fn rate_index_series_rejects_rows_off_month_start() {
        let rates = [
            RatePoint {
                date: date(2020, 1, 1),
                annual_rate_pct: 12.0,
            },
            RatePoint {
                date: date(2020, 1, 31),
                annual_rate_pct: 12.0,
            },
            RatePoint {
                date: date(2020, 2, 1),
                annual_rate_pct: 12.0,
            },
        ];
        let err = rate_index_series(&rates).expect_err("mid-month row");
        assert!(matches!(err, SimError::InvalidSeries(_)));
        assert!(err.to_string().contains("2020-01-31"));
    }

    #[test]
    fn rate_index_series_rejects_bad_rows() {
        assert!(rate_index_series(&[]).is_err());
        let bad = [RatePoint {
            date: date(2020, 1, 1),
            annual_rate_pct: f64::INFINITY,
        }];
        assert!(rate_index_series(&bad).is_err());
    }
}

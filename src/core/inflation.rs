use chrono::NaiveDate;

use super::error::{Result, SimError};
use super::series::validate_index;
use super::types::{SimulationPoint, SimulationResult, ValuePoint};

/// Expresses nominal values in purchasing power of the first nominal date.
pub fn adjust_for_inflation(
    nominal: &[ValuePoint],
    index: &[ValuePoint],
) -> Result<Vec<ValuePoint>> {
    let dates = nominal.iter().map(|p| p.date).collect::<Vec<_>>();
    let ratios = index_ratios(&dates, index)?;
    Ok(nominal
        .iter()
        .zip(ratios)
        .map(|(point, ratio)| ValuePoint::new(point.date, point.value / ratio))
        .collect())
}

/// Inverse of [`adjust_for_inflation`] for the same index.
pub fn reinflate(real: &[ValuePoint], index: &[ValuePoint]) -> Result<Vec<ValuePoint>> {
    let dates = real.iter().map(|p| p.date).collect::<Vec<_>>();
    let ratios = index_ratios(&dates, index)?;
    Ok(real
        .iter()
        .zip(ratios)
        .map(|(point, ratio)| ValuePoint::new(point.date, point.value * ratio))
        .collect())
}

impl SimulationResult {
    /// Rescales values to start-date money. Each contribution is deflated
    /// at the date it was paid, so real contributions are the sum of real
    /// deposits. Units and the cost breakdown stay nominal.
    pub fn to_real_terms(&self, index: &[ValuePoint]) -> Result<SimulationResult> {
        let ratios = index_ratios(&self.dates(), index)?;
        let mut paid = 0.0;
        let mut real_paid = 0.0;
        let points = self
            .points()
            .iter()
            .zip(ratios)
            .map(|(point, ratio)| {
                real_paid += (point.cumulative_contributions - paid) / ratio;
                paid = point.cumulative_contributions;
                SimulationPoint {
                    gross_value: point.gross_value / ratio,
                    net_value: point.net_value / ratio,
                    cumulative_contributions: real_paid,
                    ..*point
                }
            })
            .collect();
        Ok(SimulationResult::new(points, self.costs())
            .with_overflow_contributions(self.overflow_contributions()))
    }
}

/// `index(date) / index(dates[0])` for every date, using the last index
/// value known at each date.
fn index_ratios(dates: &[NaiveDate], index: &[ValuePoint]) -> Result<Vec<f64>> {
    let (Some(&first), Some(&last)) = (dates.first(), dates.last()) else {
        return Ok(Vec::new());
    };
    if index.is_empty() {
        return Err(SimError::DataAlignment(
            "price index is empty and cannot cover the nominal series".to_string(),
        ));
    }
    validate_index(index)?;

    let index_start = index[0].date;
    let index_end = index[index.len() - 1].date;
    if index_start > first || index_end < last {
        return Err(SimError::DataAlignment(format!(
            "price index covers {index_start}..{index_end} but the series spans {first}..{last}"
        )));
    }

    let base = index_at(index, first)?;
    dates
        .iter()
        .map(|&date| index_at(index, date).map(|value| value / base))
        .collect()
}

fn index_at(index: &[ValuePoint], date: NaiveDate) -> Result<f64> {
    let known = index.partition_point(|p| p.date <= date);
    if known == 0 {
        return Err(SimError::DataAlignment(format!(
            "no price index value on or before {date}"
        )));
    }
    Ok(index[known - 1].value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Months;
    use proptest::prelude::{prop_assert, proptest};

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn monthly_values(start: NaiveDate, values: &[f64]) -> Vec<ValuePoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let d = start
                    .checked_add_months(Months::new(i as u32))
                    .expect("in range");
                ValuePoint::new(d, v)
            })
            .collect()
    }

    #[test]
    fn divides_by_index_ratio_from_start() {
        let nominal = monthly_values(date(2020, 1, 1), &[100.0, 110.0, 121.0]);
        let index = monthly_values(date(2020, 1, 1), &[200.0, 220.0, 242.0]);
        let real = adjust_for_inflation(&nominal, &index).expect("index covers");
        assert_approx(real[0].value, 100.0);
        assert_approx(real[1].value, 100.0);
        assert_approx(real[2].value, 100.0);
    }

    #[test]
    fn uses_last_known_index_value_between_samples() {
        let nominal = monthly_values(date(2020, 1, 1), &[100.0, 100.0, 100.0, 100.0]);
        let index = vec![
            ValuePoint::new(date(2019, 12, 1), 100.0),
            ValuePoint::new(date(2020, 2, 1), 125.0),
            ValuePoint::new(date(2020, 6, 1), 150.0),
        ];
        let real = adjust_for_inflation(&nominal, &index).expect("index covers");
        assert_approx(real[0].value, 100.0);
        assert_approx(real[1].value, 80.0);
        assert_approx(real[3].value, 80.0);
    }

    #[test]
    fn short_index_is_an_alignment_error() {
        let nominal = monthly_values(date(2020, 1, 1), &[1.0, 1.0, 1.0]);
        let late_start = monthly_values(date(2020, 2, 1), &[100.0, 101.0, 102.0]);
        let early_end = monthly_values(date(2019, 1, 1), &[100.0, 101.0]);

        for index in [late_start, early_end, Vec::new()] {
            let err = adjust_for_inflation(&nominal, &index).expect_err("must not cover");
            assert!(matches!(err, SimError::DataAlignment(_)));
        }
    }

    #[test]
    fn non_positive_index_is_invalid() {
        let nominal = monthly_values(date(2020, 1, 1), &[1.0]);
        let index = monthly_values(date(2020, 1, 1), &[0.0]);
        let err = adjust_for_inflation(&nominal, &index).expect_err("zero index");
        assert!(matches!(err, SimError::InvalidSeries(_)));
    }

    #[test]
    fn real_contributions_use_the_index_at_each_deposit() {
        let result = SimulationResult::new(
            vec![
                SimulationPoint {
                    date: date(2020, 1, 1),
                    units_held: 1.0,
                    gross_value: 100.0,
                    net_value: 100.0,
                    cumulative_contributions: 100.0,
                },
                SimulationPoint {
                    date: date(2020, 2, 1),
                    units_held: 2.0,
                    gross_value: 200.0,
                    net_value: 200.0,
                    cumulative_contributions: 200.0,
                },
                SimulationPoint {
                    date: date(2020, 3, 1),
                    units_held: 2.0,
                    gross_value: 200.0,
                    net_value: 200.0,
                    cumulative_contributions: 200.0,
                },
            ],
            Default::default(),
        );
        let index = monthly_values(date(2020, 1, 1), &[100.0, 200.0, 400.0]);

        let real = result.to_real_terms(&index).expect("index covers");
        let points = real.points();
        assert_approx(points[0].cumulative_contributions, 100.0);
        assert_approx(points[1].cumulative_contributions, 150.0);
        assert_approx(points[2].cumulative_contributions, 150.0);
        assert_approx(points[1].net_value, 100.0);
        assert_approx(points[2].net_value, 50.0);
        assert_approx(points[2].units_held, 2.0);

        let summary = real.summary();
        assert_approx(summary.total_return.expect("invested"), 50.0 / 150.0 - 1.0);
    }

    #[test]
    fn empty_nominal_series_is_empty() {
        let real = adjust_for_inflation(&[], &[]).expect("nothing to adjust");
        assert!(real.is_empty());
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_adjust_then_reinflate_round_trips(
            values in proptest::collection::vec(0u32..10_000_000, 1..60),
            index_steps in proptest::collection::vec(9_000u32..12_000, 60)
        ) {
            let nominal = monthly_values(
                date(1950, 1, 1),
                &values.iter().map(|&v| v as f64 / 100.0).collect::<Vec<_>>(),
            );
            let mut level = 100.0;
            let index_values = index_steps
                .iter()
                .map(|&step| {
                    level *= step as f64 / 10_000.0;
                    level
                })
                .collect::<Vec<_>>();
            let index = monthly_values(date(1950, 1, 1), &index_values);

            let real = adjust_for_inflation(&nominal, &index).expect("index covers");
            let back = reinflate(&real, &index).expect("index covers");
            for (original, restored) in nominal.iter().zip(&back) {
                prop_assert!(original.date == restored.date);
                let tol = 1e-9 * original.value.abs().max(1.0);
                prop_assert!((original.value - restored.value).abs() <= tol);
            }
        }
    }
}

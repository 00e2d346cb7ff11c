use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::error::{Result, SimError};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
    /// Cash paid per unit held since the previous point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dividend_per_unit: Option<f64>,
}

impl PricePoint {
    pub fn new(date: NaiveDate, price: f64) -> Self {
        Self {
            date,
            price,
            dividend_per_unit: None,
        }
    }

    pub fn with_dividend(mut self, dividend_per_unit: f64) -> Self {
        self.dividend_per_unit = Some(dividend_per_unit);
        self
    }
}

/// One row of a regulated savings rate table, e.g. Livret A.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatePoint {
    pub date: NaiveDate,
    #[serde(alias = "annualRate", alias = "rate")]
    pub annual_rate_pct: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValuePoint {
    pub date: NaiveDate,
    pub value: f64,
}

impl ValuePoint {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum TaxMode {
    #[default]
    #[serde(rename = "pea", alias = "PEA")]
    Pea,
    #[serde(rename = "none", alias = "NONE", alias = "aucune")]
    Untaxed,
}

/// Raw strategy parameters, all rates as fractions. Turned into a
/// [`StrategyConfig`] by [`StrategyConfig::new`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyParams {
    pub initial_investment: f64,
    pub periodic_contribution: f64,
    /// Months between two periodic contributions.
    pub contribution_frequency: u32,
    pub yearly_contribution_increase: f64,
    pub entry_fee_rate: f64,
    pub exit_fee_rate: f64,
    pub annual_management_fee_rate: f64,
    pub tax_mode: TaxMode,
    pub tax_rate: f64,
    /// Flat rate applied to the part of a gain above `pea_threshold`.
    pub alternate_tax_rate: f64,
    pub pea_threshold: f64,
    /// Cap on cash paid into the PEA. Deposits past it go to an ordinary
    /// account whose gain is taxed at `alternate_tax_rate`.
    pub pea_deposit_limit: Option<f64>,
    pub dividend_reinvestment: bool,
    /// Sampling frequency of the price series, used to pro-rate the management fee.
    pub periods_per_year: u32,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            initial_investment: 10_000.0,
            periodic_contribution: 100.0,
            contribution_frequency: 1,
            yearly_contribution_increase: 0.0,
            entry_fee_rate: 0.0,
            exit_fee_rate: 0.0,
            annual_management_fee_rate: 0.0,
            tax_mode: TaxMode::Pea,
            tax_rate: 0.172,
            alternate_tax_rate: 0.30,
            pea_threshold: 150_000.0,
            pea_deposit_limit: None,
            dividend_reinvestment: true,
            periods_per_year: 12,
        }
    }
}

/// Validated, immutable strategy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyConfig {
    initial_investment: f64,
    periodic_contribution: f64,
    contribution_frequency: u32,
    yearly_contribution_increase: f64,
    entry_fee_rate: f64,
    exit_fee_rate: f64,
    annual_management_fee_rate: f64,
    tax_mode: TaxMode,
    tax_rate: f64,
    alternate_tax_rate: f64,
    pea_threshold: f64,
    pea_deposit_limit: Option<f64>,
    dividend_reinvestment: bool,
    periods_per_year: u32,
}

impl StrategyConfig {
    pub fn new(params: StrategyParams) -> Result<Self> {
        for (name, amount) in [
            ("initial_investment", params.initial_investment),
            ("periodic_contribution", params.periodic_contribution),
            (
                "yearly_contribution_increase",
                params.yearly_contribution_increase,
            ),
            ("pea_threshold", params.pea_threshold),
        ]
        .into_iter()
        .chain(params.pea_deposit_limit.map(|limit| ("pea_deposit_limit", limit)))
        {
            if !amount.is_finite() || amount < 0.0 {
                return Err(SimError::InvalidConfig(format!(
                    "{name} must be a finite amount >= 0"
                )));
            }
        }

        for (name, rate) in [
            ("entry_fee_rate", params.entry_fee_rate),
            ("exit_fee_rate", params.exit_fee_rate),
            (
                "annual_management_fee_rate",
                params.annual_management_fee_rate,
            ),
            ("tax_rate", params.tax_rate),
            ("alternate_tax_rate", params.alternate_tax_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(SimError::InvalidConfig(format!(
                    "{name} must be between 0 and 1"
                )));
            }
        }

        if params.contribution_frequency == 0 {
            return Err(SimError::InvalidConfig(
                "contribution_frequency must be > 0".to_string(),
            ));
        }
        if params.periods_per_year == 0 {
            return Err(SimError::InvalidConfig(
                "periods_per_year must be > 0".to_string(),
            ));
        }

        Ok(Self {
            initial_investment: params.initial_investment,
            periodic_contribution: params.periodic_contribution,
            contribution_frequency: params.contribution_frequency,
            yearly_contribution_increase: params.yearly_contribution_increase,
            entry_fee_rate: params.entry_fee_rate,
            exit_fee_rate: params.exit_fee_rate,
            annual_management_fee_rate: params.annual_management_fee_rate,
            tax_mode: params.tax_mode,
            tax_rate: params.tax_rate,
            alternate_tax_rate: params.alternate_tax_rate,
            pea_threshold: params.pea_threshold,
            pea_deposit_limit: params.pea_deposit_limit,
            dividend_reinvestment: params.dividend_reinvestment,
            periods_per_year: params.periods_per_year,
        })
    }

    pub fn params(&self) -> StrategyParams {
        StrategyParams {
            initial_investment: self.initial_investment,
            periodic_contribution: self.periodic_contribution,
            contribution_frequency: self.contribution_frequency,
            yearly_contribution_increase: self.yearly_contribution_increase,
            entry_fee_rate: self.entry_fee_rate,
            exit_fee_rate: self.exit_fee_rate,
            annual_management_fee_rate: self.annual_management_fee_rate,
            tax_mode: self.tax_mode,
            tax_rate: self.tax_rate,
            alternate_tax_rate: self.alternate_tax_rate,
            pea_threshold: self.pea_threshold,
            pea_deposit_limit: self.pea_deposit_limit,
            dividend_reinvestment: self.dividend_reinvestment,
            periods_per_year: self.periods_per_year,
        }
    }

    pub fn initial_investment(&self) -> f64 {
        self.initial_investment
    }

    pub fn periodic_contribution(&self) -> f64 {
        self.periodic_contribution
    }

    pub fn contribution_frequency(&self) -> u32 {
        self.contribution_frequency
    }

    pub fn yearly_contribution_increase(&self) -> f64 {
        self.yearly_contribution_increase
    }

    pub fn entry_fee_rate(&self) -> f64 {
        self.entry_fee_rate
    }

    pub fn exit_fee_rate(&self) -> f64 {
        self.exit_fee_rate
    }

    pub fn annual_management_fee_rate(&self) -> f64 {
        self.annual_management_fee_rate
    }

    pub fn tax_mode(&self) -> TaxMode {
        self.tax_mode
    }

    pub fn tax_rate(&self) -> f64 {
        self.tax_rate
    }

    pub fn alternate_tax_rate(&self) -> f64 {
        self.alternate_tax_rate
    }

    pub fn pea_threshold(&self) -> f64 {
        self.pea_threshold
    }

    pub fn pea_deposit_limit(&self) -> Option<f64> {
        self.pea_deposit_limit
    }

    pub fn dividend_reinvestment(&self) -> bool {
        self.dividend_reinvestment
    }

    pub fn periods_per_year(&self) -> u32 {
        self.periods_per_year
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationPoint {
    pub date: NaiveDate,
    pub units_held: f64,
    pub gross_value: f64,
    pub net_value: f64,
    pub cumulative_contributions: f64,
}

impl SimulationPoint {
    pub(crate) fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            units_held: 0.0,
            gross_value: 0.0,
            net_value: 0.0,
            cumulative_contributions: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub entry_fees: f64,
    pub management_fees: f64,
    pub exit_fees: f64,
    pub tax: f64,
    /// Part of `tax` owed by the account holding deposits above the PEA limit.
    pub overflow_tax: f64,
}

impl CostBreakdown {
    pub fn total(self) -> f64 {
        self.entry_fees + self.management_fees + self.exit_fees + self.tax
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub final_gross_value: f64,
    pub final_net_value: f64,
    pub total_contributions: f64,
    /// Contributions that did not fit under the PEA deposit limit.
    pub overflow_contributions: f64,
    pub total_return: Option<f64>,
    pub annualized_return: Option<f64>,
    pub costs: CostBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    points: Vec<SimulationPoint>,
    costs: CostBreakdown,
    overflow_contributions: f64,
}

impl SimulationResult {
    pub(crate) fn new(points: Vec<SimulationPoint>, costs: CostBreakdown) -> Self {
        Self {
            points,
            costs,
            overflow_contributions: 0.0,
        }
    }

    pub(crate) fn with_overflow_contributions(mut self, amount: f64) -> Self {
        self.overflow_contributions = amount;
        self
    }

    pub fn points(&self) -> &[SimulationPoint] {
        &self.points
    }

    pub fn costs(&self) -> CostBreakdown {
        self.costs
    }

    pub fn overflow_contributions(&self) -> f64 {
        self.overflow_contributions
    }

    pub fn final_point(&self) -> Option<&SimulationPoint> {
        self.points.last()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(SimError::InvalidConfig(format!(
                "window start {start} must not be after window end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_build_a_valid_config() {
        let config = StrategyConfig::new(StrategyParams::default()).expect("valid defaults");
        assert_eq!(config.tax_mode(), TaxMode::Pea);
        assert_eq!(config.contribution_frequency(), 1);
        assert!(config.dividend_reinvestment());
        assert_eq!(config.params(), StrategyParams::default());
    }

    #[test]
    fn rejects_rates_outside_unit_interval() {
        let mutations: [fn(&mut StrategyParams); 5] = [
            |p| p.entry_fee_rate = 1.5,
            |p| p.exit_fee_rate = -0.01,
            |p| p.annual_management_fee_rate = f64::NAN,
            |p| p.tax_rate = 2.0,
            |p| p.alternate_tax_rate = -1.0,
        ];
        for mutate in mutations {
            let mut params = StrategyParams::default();
            mutate(&mut params);
            let err = StrategyConfig::new(params).expect_err("must reject rate");
            assert!(matches!(err, SimError::InvalidConfig(_)));
        }
    }

    #[test]
    fn accepts_rate_bounds() {
        let params = StrategyParams {
            entry_fee_rate: 0.0,
            exit_fee_rate: 1.0,
            tax_rate: 1.0,
            ..StrategyParams::default()
        };
        assert!(StrategyConfig::new(params).is_ok());
    }

    #[test]
    fn rejects_zero_frequency() {
        let params = StrategyParams {
            contribution_frequency: 0,
            ..StrategyParams::default()
        };
        let err = StrategyConfig::new(params).expect_err("must reject frequency");
        assert_eq!(
            err,
            SimError::InvalidConfig("contribution_frequency must be > 0".to_string())
        );
    }

    #[test]
    fn rejects_negative_amounts() {
        let params = StrategyParams {
            periodic_contribution: -10.0,
            ..StrategyParams::default()
        };
        let err = StrategyConfig::new(params).expect_err("must reject amount");
        assert!(err.to_string().contains("periodic_contribution"));
    }

    #[test]
    fn rejects_negative_deposit_limit() {
        let params = StrategyParams {
            pea_deposit_limit: Some(-1.0),
            ..StrategyParams::default()
        };
        let err = StrategyConfig::new(params).expect_err("must reject limit");
        assert!(err.to_string().contains("pea_deposit_limit"));

        let params = StrategyParams {
            pea_deposit_limit: Some(150_000.0),
            ..StrategyParams::default()
        };
        let config = StrategyConfig::new(params).expect("valid limit");
        assert_eq!(config.pea_deposit_limit(), Some(150_000.0));
    }

    #[test]
    fn cost_breakdown_total_sums_every_cost() {
        let costs = CostBreakdown {
            entry_fees: 1.0,
            management_fees: 2.0,
            exit_fees: 3.0,
            tax: 4.0,
            overflow_tax: 1.5,
        };
        assert_eq!(costs.total(), 10.0);
    }

    #[test]
    fn tax_mode_parses_wire_names() {
        let pea: TaxMode = serde_json::from_str("\"PEA\"").expect("pea parses");
        let none: TaxMode = serde_json::from_str("\"none\"").expect("none parses");
        assert_eq!(pea, TaxMode::Pea);
        assert_eq!(none, TaxMode::Untaxed);
    }

    #[test]
    fn window_rejects_reversed_bounds() {
        let start = NaiveDate::from_ymd_opt(2021, 1, 1).expect("valid date");
        let end = NaiveDate::from_ymd_opt(2020, 1, 1).expect("valid date");
        assert!(DateWindow::new(start, end).is_err());
        assert!(DateWindow::new(end, start).is_ok());
    }
}

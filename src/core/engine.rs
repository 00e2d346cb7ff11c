use chrono::Months;
use tracing::debug;

use super::error::{Result, SimError};
use super::series::validate_series;
use super::types::{
    CostBreakdown, PricePoint, SimulationPoint, SimulationResult, StrategyConfig, TaxMode,
};

#[derive(Debug, Default, Clone, Copy)]
struct Account {
    units: f64,
    cash: f64,
    contributed: f64,
}

impl Account {
    fn gross_value(&self, price: f64) -> f64 {
        self.units * price + self.cash
    }

    /// Returns the value of the units given up to the fee.
    fn charge_management_fee(&mut self, factor: f64, price: f64) -> f64 {
        let before = self.units;
        self.units *= factor;
        (before - self.units) * price
    }

    fn receive_dividend(&mut self, dividend_per_unit: f64, price: f64, reinvest: bool) {
        let payout = self.units * dividend_per_unit;
        if reinvest {
            self.units += payout / price;
        } else {
            self.cash += payout;
        }
    }

    /// Returns the entry fee paid.
    fn buy(&mut self, amount: f64, entry_fee_rate: f64, price: f64) -> f64 {
        if amount <= 0.0 {
            return 0.0;
        }
        let fee = amount * entry_fee_rate;
        self.units += (amount - fee) / price;
        self.contributed += amount;
        fee
    }
}

/// The PEA itself, plus the ordinary account receiving deposits above the
/// PEA deposit limit. Without a limit everything stays in `pea`.
#[derive(Debug, Default)]
struct Holdings {
    pea: Account,
    overflow: Account,
}

impl Holdings {
    fn gross_value(&self, price: f64) -> f64 {
        self.pea.gross_value(price) + self.overflow.gross_value(price)
    }

    fn contributed(&self) -> f64 {
        self.pea.contributed + self.overflow.contributed
    }

    fn units(&self) -> f64 {
        self.pea.units + self.overflow.units
    }

    fn split_deposit(&self, amount: f64, config: &StrategyConfig) -> (f64, f64) {
        match (config.tax_mode(), config.pea_deposit_limit()) {
            (TaxMode::Pea, Some(limit)) => {
                let room = (limit - self.pea.contributed).max(0.0);
                let sheltered = amount.min(room);
                (sheltered, amount - sheltered)
            }
            _ => (amount, 0.0),
        }
    }
}

/// Replays a DCA strategy over `series` and returns the value of the
/// position at every date.
///
/// Per period the management fee is taken from held units first, then the
/// period's dividends are paid on what remains, then any scheduled
/// contribution is bought. Tax is only charged on the last point.
pub fn simulate(series: &[PricePoint], config: &StrategyConfig) -> Result<SimulationResult> {
    validate_series(series)?;
    let contributions = contribution_schedule(series, config)?;

    let fee_factor = management_fee_factor(config);
    let exit_factor = 1.0 - config.exit_fee_rate();
    let mut holdings = Holdings::default();
    let mut costs = CostBreakdown::default();
    let mut points = Vec::with_capacity(series.len());

    for (idx, point) in series.iter().enumerate() {
        if idx > 0 {
            for account in [&mut holdings.pea, &mut holdings.overflow] {
                costs.management_fees += account.charge_management_fee(fee_factor, point.price);
                if let Some(dividend) = point.dividend_per_unit {
                    account.receive_dividend(
                        dividend,
                        point.price,
                        config.dividend_reinvestment(),
                    );
                }
            }
        }

        let (sheltered, overflow) = holdings.split_deposit(contributions[idx], config);
        costs.entry_fees += holdings
            .pea
            .buy(sheltered, config.entry_fee_rate(), point.price);
        costs.entry_fees += holdings
            .overflow
            .buy(overflow, config.entry_fee_rate(), point.price);

        let gross_value = holdings.gross_value(point.price);
        points.push(SimulationPoint {
            date: point.date,
            units_held: holdings.units(),
            gross_value,
            net_value: gross_value * exit_factor,
            cumulative_contributions: holdings.contributed(),
        });
    }

    if let (Some(last), Some(final_price)) = (points.last_mut(), series.last()) {
        costs.exit_fees = last.gross_value - last.net_value;

        let sheltered_tax = exit_tax(
            holdings.pea.gross_value(final_price.price) * exit_factor,
            holdings.pea.contributed,
            config,
        );
        let overflow_tax = overflow_account_tax(
            holdings.overflow.gross_value(final_price.price) * exit_factor,
            holdings.overflow.contributed,
            config,
        );
        costs.tax = sheltered_tax + overflow_tax;
        costs.overflow_tax = overflow_tax;
        last.net_value -= costs.tax;

        debug!(
            periods = series.len(),
            contributed = last.cumulative_contributions,
            overflow_contributed = holdings.overflow.contributed,
            final_net_value = last.net_value,
            total_costs = costs.total(),
            "simulation complete"
        );
    }

    Ok(SimulationResult::new(points, costs)
        .with_overflow_contributions(holdings.overflow.contributed))
}

/// Tax owed when liquidating `liquidation_value` against the cash paid in.
pub fn exit_tax(liquidation_value: f64, contributed: f64, config: &StrategyConfig) -> f64 {
    match config.tax_mode() {
        TaxMode::Untaxed => 0.0,
        TaxMode::Pea => pea_tax(
            liquidation_value - contributed,
            config.tax_rate(),
            config.pea_threshold(),
            config.alternate_tax_rate(),
        ),
    }
}

pub fn pea_tax(gain: f64, tax_rate: f64, threshold: f64, alternate_rate: f64) -> f64 {
    if gain <= 0.0 {
        return 0.0;
    }
    let within = gain.min(threshold);
    let above = (gain - threshold).max(0.0);
    within * tax_rate + above * alternate_rate
}

/// Flat tax on the gain of deposits made above the PEA deposit limit.
fn overflow_account_tax(
    liquidation_value: f64,
    contributed: f64,
    config: &StrategyConfig,
) -> f64 {
    match config.tax_mode() {
        TaxMode::Untaxed => 0.0,
        TaxMode::Pea => (liquidation_value - contributed).max(0.0) * config.alternate_tax_rate(),
    }
}

fn management_fee_factor(config: &StrategyConfig) -> f64 {
    (1.0 - config.annual_management_fee_rate()).powf(1.0 / f64::from(config.periods_per_year()))
}

/// Cash contributed on each point of `series`. The first date receives the
/// initial investment and the first periodic contribution.
fn contribution_schedule(series: &[PricePoint], config: &StrategyConfig) -> Result<Vec<f64>> {
    let mut amounts = vec![0.0; series.len()];
    amounts[0] = config.initial_investment();

    if config.periodic_contribution() <= 0.0 && config.yearly_contribution_increase() <= 0.0 {
        return Ok(amounts);
    }

    let start = series[0].date;
    let end = series[series.len() - 1].date;
    let step = config.contribution_frequency();
    let mut elapsed_months = 0;
    while let Some(date) = start.checked_add_months(Months::new(elapsed_months)) {
        if date > end {
            break;
        }

        let amount = contribution_amount(config, elapsed_months);
        if amount > 0.0 {
            let idx = series
                .binary_search_by_key(&date, |p| p.date)
                .map_err(|_| {
                    SimError::DataAlignment(format!(
                        "no price on {date} for the contribution scheduled {elapsed_months} months after {start}"
                    ))
                })?;
            amounts[idx] += amount;
        }

        let Some(next) = elapsed_months.checked_add(step) else {
            break;
        };
        elapsed_months = next;
    }
    Ok(amounts)
}

/// The raise lands on the contribution that completes each year, so a
/// monthly plan pays the increased amount from its 12th payment on.
fn contribution_amount(config: &StrategyConfig, elapsed_months: u32) -> f64 {
    let completed_years = elapsed_months.saturating_add(config.contribution_frequency()) / 12;
    config.periodic_contribution()
        + config.yearly_contribution_increase() * f64::from(completed_years)
}

use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::{
    Router,
    extract::Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use chrono::NaiveDate;
use clap::{ArgAction, Args, ValueEnum};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    DateWindow, PricePoint, RatePoint, SimError, SimulationPoint, SimulationResult,
    StrategyConfig, StrategyParams, Summary, TaxMode, ValuePoint, compare, rate_index_series,
    simulate, validate_series,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliTaxMode {
    Pea,
    #[value(name = "none")]
    Untaxed,
}

impl From<CliTaxMode> for TaxMode {
    fn from(value: CliTaxMode) -> Self {
        match value {
            CliTaxMode::Pea => TaxMode::Pea,
            CliTaxMode::Untaxed => TaxMode::Untaxed,
        }
    }
}

impl From<TaxMode> for CliTaxMode {
    fn from(value: TaxMode) -> Self {
        match value {
            TaxMode::Pea => CliTaxMode::Pea,
            TaxMode::Untaxed => CliTaxMode::Untaxed,
        }
    }
}

/// Strategy flags shared by the CLI and the HTTP API. Rates are percentages.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct StrategyArgs {
    #[arg(
        long,
        default_value_t = 10_000.0,
        help = "Lump sum invested on the first date"
    )]
    pub initial_investment: f64,
    #[arg(long, default_value_t = 100.0)]
    pub periodic_contribution: f64,
    #[arg(
        long,
        default_value_t = 1,
        help = "Months between two periodic contributions"
    )]
    pub contribution_frequency: u32,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Added to the periodic contribution after each full year"
    )]
    pub yearly_contribution_increase: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Entry fee on each contribution in percent"
    )]
    pub entry_fee: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Exit fee on the liquidation value in percent"
    )]
    pub exit_fee: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Annual management fee in percent, pro-rated per period"
    )]
    pub management_fee: f64,
    #[arg(long, value_enum, default_value_t = CliTaxMode::Pea)]
    pub tax_mode: CliTaxMode,
    #[arg(
        long,
        default_value_t = 17.2,
        help = "Tax rate on gains up to the PEA threshold in percent"
    )]
    pub tax_rate: f64,
    #[arg(
        long,
        default_value_t = 30.0,
        help = "Flat tax rate on gains above the PEA threshold in percent"
    )]
    pub alternate_tax_rate: f64,
    #[arg(long, default_value_t = 150_000.0)]
    pub pea_threshold: f64,
    #[arg(
        long,
        help = "Cap on PEA deposits; the excess is invested in an ordinary taxed account"
    )]
    pub pea_deposit_limit: Option<f64>,
    #[arg(
        long = "no-dividend-reinvestment",
        action = ArgAction::SetFalse,
        help = "Keep dividends as cash instead of buying units"
    )]
    pub dividend_reinvestment: bool,
    #[arg(
        long,
        default_value_t = 12,
        help = "Number of price points per year, used to pro-rate the management fee"
    )]
    pub periods_per_year: u32,
}

pub fn default_args_for_api() -> StrategyArgs {
    StrategyArgs {
        initial_investment: 10_000.0,
        periodic_contribution: 100.0,
        contribution_frequency: 1,
        yearly_contribution_increase: 0.0,
        entry_fee: 0.0,
        exit_fee: 0.0,
        management_fee: 0.0,
        tax_mode: CliTaxMode::Pea,
        tax_rate: 17.2,
        alternate_tax_rate: 30.0,
        pea_threshold: 150_000.0,
        pea_deposit_limit: None,
        dividend_reinvestment: true,
        periods_per_year: 12,
    }
}

pub fn build_config(args: &StrategyArgs) -> Result<StrategyConfig, SimError> {
    for (name, pct) in [
        ("--entry-fee", args.entry_fee),
        ("--exit-fee", args.exit_fee),
        ("--management-fee", args.management_fee),
        ("--tax-rate", args.tax_rate),
        ("--alternate-tax-rate", args.alternate_tax_rate),
    ] {
        if !(0.0..=100.0).contains(&pct) {
            return Err(SimError::InvalidConfig(format!(
                "{name} must be between 0 and 100"
            )));
        }
    }

    StrategyConfig::new(StrategyParams {
        initial_investment: args.initial_investment,
        periodic_contribution: args.periodic_contribution,
        contribution_frequency: args.contribution_frequency,
        yearly_contribution_increase: args.yearly_contribution_increase,
        entry_fee_rate: args.entry_fee / 100.0,
        exit_fee_rate: args.exit_fee / 100.0,
        annual_management_fee_rate: args.management_fee / 100.0,
        tax_mode: args.tax_mode.into(),
        tax_rate: args.tax_rate / 100.0,
        alternate_tax_rate: args.alternate_tax_rate / 100.0,
        pea_threshold: args.pea_threshold,
        pea_deposit_limit: args.pea_deposit_limit,
        dividend_reinvestment: args.dividend_reinvestment,
        periods_per_year: args.periods_per_year,
    })
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StrategyPayload {
    initial_investment: Option<f64>,
    #[serde(alias = "monthlyContribution")]
    periodic_contribution: Option<f64>,
    contribution_frequency: Option<u32>,
    #[serde(alias = "yearlyBump")]
    yearly_contribution_increase: Option<f64>,
    entry_fee: Option<f64>,
    exit_fee: Option<f64>,
    management_fee: Option<f64>,
    tax_mode: Option<TaxMode>,
    tax_rate: Option<f64>,
    alternate_tax_rate: Option<f64>,
    pea_threshold: Option<f64>,
    #[serde(alias = "peaLimit")]
    pea_deposit_limit: Option<f64>,
    dividend_reinvestment: Option<bool>,
    periods_per_year: Option<u32>,
}

impl StrategyPayload {
    fn apply_to(&self, args: &mut StrategyArgs) {
        if let Some(v) = self.initial_investment {
            args.initial_investment = v;
        }
        if let Some(v) = self.periodic_contribution {
            args.periodic_contribution = v;
        }
        if let Some(v) = self.contribution_frequency {
            args.contribution_frequency = v;
        }
        if let Some(v) = self.yearly_contribution_increase {
            args.yearly_contribution_increase = v;
        }
        if let Some(v) = self.entry_fee {
            args.entry_fee = v;
        }
        if let Some(v) = self.exit_fee {
            args.exit_fee = v;
        }
        if let Some(v) = self.management_fee {
            args.management_fee = v;
        }
        if let Some(v) = self.tax_mode {
            args.tax_mode = v.into();
        }
        if let Some(v) = self.tax_rate {
            args.tax_rate = v;
        }
        if let Some(v) = self.alternate_tax_rate {
            args.alternate_tax_rate = v;
        }
        if let Some(v) = self.pea_threshold {
            args.pea_threshold = v;
        }
        if let Some(v) = self.pea_deposit_limit {
            args.pea_deposit_limit = Some(v);
        }
        if let Some(v) = self.dividend_reinvestment {
            args.dividend_reinvestment = v;
        }
        if let Some(v) = self.periods_per_year {
            args.periods_per_year = v;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssetPayload {
    pub label: String,
    pub prices: Vec<PricePoint>,
    /// Annual savings rates, turned into a value series when `prices` is empty.
    pub rates: Vec<RatePoint>,
    pub strategy: StrategyPayload,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WindowPayload {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScenarioPayload {
    pub window: Option<WindowPayload>,
    pub strategy: StrategyPayload,
    pub assets: Vec<AssetPayload>,
    pub price_index: Option<Vec<ValuePoint>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulatePayload {
    pub label: Option<String>,
    pub prices: Vec<PricePoint>,
    pub rates: Vec<RatePoint>,
    pub strategy: StrategyPayload,
    pub price_index: Option<Vec<ValuePoint>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesResponse {
    pub label: String,
    pub summary: Summary,
    pub points: Vec<SimulationPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub real_summary: Option<Summary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub real_points: Option<Vec<SimulationPoint>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    pub label: String,
    pub final_net_value: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareResponse {
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub axis: Vec<NaiveDate>,
    pub ranking: Vec<RankingEntry>,
    pub assets: Vec<SeriesResponse>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn series_from_parts(
    label: &str,
    prices: Vec<PricePoint>,
    rates: &[RatePoint],
) -> Result<Vec<PricePoint>, SimError> {
    match (prices.is_empty(), rates.is_empty()) {
        (false, true) => Ok(prices),
        (true, false) => rate_index_series(rates),
        (false, false) => Err(SimError::InvalidSeries(format!(
            "asset '{label}' must provide either prices or rates, not both"
        ))),
        (true, true) => Err(SimError::InvalidSeries(format!(
            "asset '{label}' has no prices or rates"
        ))),
    }
}

fn series_response(
    label: String,
    result: &SimulationResult,
    real: Option<&SimulationResult>,
) -> SeriesResponse {
    let summary = result.summary();
    let mut warnings = Vec::new();
    if summary.overflow_contributions > 0.0 {
        info!(
            asset = %label,
            overflow = summary.overflow_contributions,
            "PEA deposit limit reached"
        );
        warnings.push(format!(
            "PEA deposit limit reached: {:.2} invested in an ordinary account taxed at the alternate rate",
            summary.overflow_contributions
        ));
    }

    SeriesResponse {
        label,
        summary,
        points: result.points().to_vec(),
        real_summary: real.map(SimulationResult::summary),
        real_points: real.map(|r| r.points().to_vec()),
        warnings,
    }
}

pub fn simulate_series(
    label: &str,
    args: &StrategyArgs,
    series: &[PricePoint],
    price_index: Option<&[ValuePoint]>,
) -> Result<SeriesResponse, SimError> {
    let config = build_config(args)?;
    let result = simulate(series, &config)?;
    let real = price_index
        .map(|index| result.to_real_terms(index))
        .transpose()?;
    Ok(series_response(label.to_string(), &result, real.as_ref()))
}

pub fn simulate_request(payload: SimulatePayload) -> Result<SeriesResponse, SimError> {
    let mut args = default_args_for_api();
    payload.strategy.apply_to(&mut args);

    let label = payload.label.unwrap_or_else(|| "portfolio".to_string());
    let series = series_from_parts(&label, payload.prices, &payload.rates)?;
    simulate_series(&label, &args, &series, payload.price_index.as_deref())
}

pub fn evaluate_scenario(payload: ScenarioPayload) -> Result<CompareResponse, SimError> {
    let mut shared = default_args_for_api();
    payload.strategy.apply_to(&mut shared);

    let mut series_by_asset = BTreeMap::new();
    let mut config_by_asset = BTreeMap::new();
    for asset in payload.assets {
        if asset.label.trim().is_empty() {
            return Err(SimError::InvalidConfig(
                "every asset needs a non-empty label".to_string(),
            ));
        }
        if series_by_asset.contains_key(&asset.label) {
            return Err(SimError::InvalidConfig(format!(
                "asset '{}' is listed more than once",
                asset.label
            )));
        }

        let mut args = shared.clone();
        asset.strategy.apply_to(&mut args);
        let config = build_config(&args)?;
        let series = series_from_parts(&asset.label, asset.prices, &asset.rates)?;
        config_by_asset.insert(asset.label.clone(), config);
        series_by_asset.insert(asset.label, series);
    }

    let window = match payload.window {
        Some(w) => DateWindow::new(w.start, w.end)?,
        None => common_window(&series_by_asset)?,
    };

    let comparison = compare(&series_by_asset, &config_by_asset, window)?;
    let real = payload
        .price_index
        .as_deref()
        .map(|index| comparison.to_real_terms(index))
        .transpose()?;

    let assets = comparison
        .iter()
        .map(|(label, result)| {
            let real_result = real.as_ref().and_then(|r| r.get(label));
            series_response(label.to_string(), result, real_result)
        })
        .collect();
    let ranking = comparison
        .ranking()
        .into_iter()
        .map(|(label, final_net_value)| RankingEntry {
            label,
            final_net_value,
        })
        .collect();

    Ok(CompareResponse {
        window_start: window.start(),
        window_end: window.end(),
        axis: comparison.axis().to_vec(),
        ranking,
        assets,
    })
}

/// Largest window covered by every asset.
fn common_window(
    series_by_asset: &BTreeMap<String, Vec<PricePoint>>,
) -> Result<DateWindow, SimError> {
    let mut start: Option<NaiveDate> = None;
    let mut end: Option<NaiveDate> = None;
    for series in series_by_asset.values() {
        validate_series(series)?;
        let first = series[0].date;
        let last = series[series.len() - 1].date;
        start = Some(start.map_or(first, |s| s.max(first)));
        end = Some(end.map_or(last, |e| e.min(last)));
    }

    match (start, end) {
        (Some(start), Some(end)) if start <= end => DateWindow::new(start, end),
        (Some(_), Some(_)) => Err(SimError::InvalidConfig(
            "assets share no common date range".to_string(),
        )),
        _ => Err(SimError::InvalidConfig(
            "at least one asset is required for a comparison".to_string(),
        )),
    }
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/api/simulate", post(simulate_handler))
        .route("/api/compare", post(compare_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "DCA simulation API listening");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_handler(Json(payload): Json<SimulatePayload>) -> Response {
    match simulate_request(payload) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(err) => {
            warn!(error = %err, "rejected simulate request");
            error_response(StatusCode::BAD_REQUEST, &err.to_string())
        }
    }
}

async fn compare_handler(Json(payload): Json<ScenarioPayload>) -> Response {
    match evaluate_scenario(payload) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(err) => {
            warn!(error = %err, "rejected compare request");
            error_response(StatusCode::BAD_REQUEST, &err.to_string())
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

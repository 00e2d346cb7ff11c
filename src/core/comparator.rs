use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use super::engine::simulate;
use super::error::{Result, SimError};
use super::series::{slice_window, validate_series};
use super::types::{
    DateWindow, PricePoint, SimulationPoint, SimulationResult, StrategyConfig, ValuePoint,
};

/// Simulation results of several assets sharing one date axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    window: DateWindow,
    axis: Vec<NaiveDate>,
    results: BTreeMap<String, SimulationResult>,
}

impl ComparisonResult {
    pub fn window(&self) -> DateWindow {
        self.window
    }

    pub fn axis(&self) -> &[NaiveDate] {
        &self.axis
    }

    pub fn get(&self, label: &str) -> Option<&SimulationResult> {
        self.results.get(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.results.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SimulationResult)> {
        self.results.iter().map(|(label, result)| (label.as_str(), result))
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Final net values, best first. Ties keep label order.
    pub fn ranking(&self) -> Vec<(String, f64)> {
        let mut ranked = self
            .results
            .iter()
            .map(|(label, result)| {
                let value = result.final_point().map(|p| p.net_value).unwrap_or(0.0);
                (label.clone(), value)
            })
            .collect::<Vec<_>>();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    pub fn to_real_terms(&self, index: &[ValuePoint]) -> Result<Self> {
        let mut results = BTreeMap::new();
        for (label, result) in &self.results {
            results.insert(label.clone(), result.to_real_terms(index)?);
        }
        Ok(Self {
            window: self.window,
            axis: self.axis.clone(),
            results,
        })
    }
}

/// Runs every asset's strategy over `window` and aligns the results on the
/// union of their sampled dates.
pub fn compare(
    series_by_asset: &BTreeMap<String, Vec<PricePoint>>,
    config_by_asset: &BTreeMap<String, StrategyConfig>,
    window: DateWindow,
) -> Result<ComparisonResult> {
    if series_by_asset.is_empty() {
        return Err(SimError::InvalidConfig(
            "at least one asset is required for a comparison".to_string(),
        ));
    }

    let mut raw = BTreeMap::new();
    for (label, series) in series_by_asset {
        let config = config_by_asset.get(label).ok_or_else(|| {
            SimError::InvalidConfig(format!("no strategy configured for asset '{label}'"))
        })?;

        let sliced = covered_slice(label, series, window)?;
        let result = simulate(sliced, config)?;
        debug!(
            asset = %label,
            periods = result.len(),
            "asset simulated for comparison"
        );
        raw.insert(label.clone(), result);
    }

    let axis = raw
        .values()
        .flat_map(|result| result.points().iter().map(|p| p.date))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>();

    let results = raw
        .into_iter()
        .map(|(label, result)| (label, forward_fill(&result, &axis)))
        .collect::<BTreeMap<_, _>>();

    info!(
        assets = results.len(),
        axis_len = axis.len(),
        start = %window.start(),
        end = %window.end(),
        "comparison complete"
    );

    Ok(ComparisonResult {
        window,
        axis,
        results,
    })
}

fn covered_slice<'a>(
    label: &str,
    series: &'a [PricePoint],
    window: DateWindow,
) -> Result<&'a [PricePoint]> {
    validate_series(series)?;
    let available_start = series[0].date;
    let available_end = series[series.len() - 1].date;
    let mismatch = || SimError::WindowMismatch {
        asset: label.to_string(),
        start: window.start(),
        end: window.end(),
        available_start,
        available_end,
    };

    if available_start > window.start() || available_end < window.end() {
        return Err(mismatch());
    }
    let sliced = slice_window(series, window);
    if sliced.is_empty() {
        return Err(mismatch());
    }
    Ok(sliced)
}

/// Samples `result` on every date of `axis`, carrying the last known point
/// forward. Dates before the first simulated point get an empty position.
pub fn forward_fill(result: &SimulationResult, axis: &[NaiveDate]) -> SimulationResult {
    let points = result.points();
    let mut next = 0;
    let mut last: Option<SimulationPoint> = None;
    let mut aligned = Vec::with_capacity(axis.len());

    for &date in axis {
        while next < points.len() && points[next].date <= date {
            last = Some(points[next]);
            next += 1;
        }
        let point = match last {
            Some(known) => SimulationPoint { date, ..known },
            None => SimulationPoint::empty(date),
        };
        aligned.push(point);
    }

    SimulationResult::new(aligned, result.costs())
        .with_overflow_contributions(result.overflow_contributions())
}

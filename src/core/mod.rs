mod comparator;
mod engine;
mod error;
mod inflation;
mod metrics;
mod series;
mod types;

pub use comparator::{ComparisonResult, compare, forward_fill};
pub use engine::{exit_tax, pea_tax, simulate};
pub use error::{Result, SimError};
pub use inflation::{adjust_for_inflation, reinflate};
pub use metrics::{annualized_return, total_return};
pub use series::{rate_index_series, slice_window, validate_series};
pub use types::{
    CostBreakdown, DateWindow, PricePoint, RatePoint, SimulationPoint, SimulationResult,
    StrategyConfig, StrategyParams, Summary, TaxMode, ValuePoint,
};

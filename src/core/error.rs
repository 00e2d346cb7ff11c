use chrono::NaiveDate;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SimError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Data alignment error: {0}")]
    DataAlignment(String),

    #[error(
        "Asset '{asset}' covers {available_start}..{available_end}, which does not span the requested window {start}..{end}"
    )]
    WindowMismatch {
        asset: String,
        start: NaiveDate,
        end: NaiveDate,
        available_start: NaiveDate,
        available_end: NaiveDate,
    },

    #[error("Invalid series: {0}")]
    InvalidSeries(String),
}

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum CoreError {
    #[error("invalid amount: {0:?}")]
    InvalidAmount(String),
    #[error("invalid date: {0:?}")]
    InvalidDate(String),
    #[error("unknown frequency: {0:?}")]
    UnknownFrequency(String),
    #[error("invalid duration: {0:?}")]
    InvalidDuration(String),
    #[error("pay period must span at least one week")]
    InvalidPayPeriod,
    #[error("could not allocate a unique asset tag after {attempts} attempts")]
    AssetTagExhausted { attempts: u32 },
    #[error("missing required column: {0}")]
    MissingColumn(&'static str),
    #[error("CSV error: {0}")]
    Csv(String),
}

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    InvalidRange { start: NaiveDate, end: NaiveDate },
    UnknownSpaceType(String),
    LimitExceeded(&'static str),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidRange { start, end } => {
                write!(f, "invalid range: start {start} is after end {end}")
            }
            EngineError::UnknownSpaceType(key) => write!(f, "unknown space type: {key}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

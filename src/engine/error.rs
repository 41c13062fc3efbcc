use crate::config::ConfigError;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    LotFull,
    DuplicateEntry(String),
    NoOpenVisit(String),
    InvalidPlate(&'static str),
    InvalidRate(f64),
    PersistenceFailure(String),
    ConfigLoadFailure(String),
}

impl EngineError {
    /// Expected, user-facing outcomes. Everything else is a storage or
    /// configuration fault the caller may need to halt or retry on.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            EngineError::LotFull
                | EngineError::DuplicateEntry(_)
                | EngineError::NoOpenVisit(_)
                | EngineError::InvalidPlate(_)
                | EngineError::InvalidRate(_)
        )
    }

    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            EngineError::LotFull => "lot_full",
            EngineError::DuplicateEntry(_) => "duplicate_entry",
            EngineError::NoOpenVisit(_) => "no_open_visit",
            EngineError::InvalidPlate(_) => "invalid_plate",
            EngineError::InvalidRate(_) => "invalid_rate",
            EngineError::PersistenceFailure(_) => "persistence",
            EngineError::ConfigLoadFailure(_) => "config",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::LotFull => write!(f, "parking lot is full"),
            EngineError::DuplicateEntry(plate) => {
                write!(f, "vehicle {plate} is already in the parking lot")
            }
            EngineError::NoOpenVisit(plate) => {
                write!(f, "no entry record found for vehicle {plate}")
            }
            EngineError::InvalidPlate(msg) => write!(f, "invalid plate: {msg}"),
            EngineError::InvalidRate(rate) => write!(f, "invalid hourly rate: {rate}"),
            EngineError::PersistenceFailure(e) => write!(f, "persistence failure: {e}"),
            EngineError::ConfigLoadFailure(e) => write!(f, "config load failure: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        EngineError::ConfigLoadFailure(e.to_string())
    }
}

//! Domain error types.
//!
//! Structural problems (bad lookback ranges, unknown names, cycles) and
//! collaborator failures abort a calculation. Per-security data gaps are not
//! errors; they travel as missing values inside a
//! [`CrossSection`](crate::domain::cross_section::CrossSection).

/// Top-level error type for pitcalc.
#[derive(Debug, thiserror::Error)]
pub enum PitcalcError {
    #[error("invalid range: {reason}")]
    InvalidRange { reason: String },

    #[error("unknown equation: {name}")]
    UnknownEquation { name: String },

    #[error("cyclic reference: {}", path.join(" -> "))]
    CyclicReference { path: Vec<String> },

    #[error("data access error: {reason}")]
    DataAccess { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PitcalcError {
    pub fn invalid_range(reason: impl Into<String>) -> Self {
        PitcalcError::InvalidRange {
            reason: reason.into(),
        }
    }

    pub fn data_access(reason: impl Into<String>) -> Self {
        PitcalcError::DataAccess {
            reason: reason.into(),
        }
    }

    /// True for errors caused by the shape of the equation graph rather than
    /// by the environment.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            PitcalcError::InvalidRange { .. }
                | PitcalcError::UnknownEquation { .. }
                | PitcalcError::CyclicReference { .. }
        )
    }
}

impl From<&PitcalcError> for std::process::ExitCode {
    fn from(err: &PitcalcError) -> Self {
        let code: u8 = match err {
            PitcalcError::Io(_) => 1,
            PitcalcError::ConfigParse { .. }
            | PitcalcError::ConfigMissing { .. }
            | PitcalcError::ConfigInvalid { .. } => 2,
            PitcalcError::DataAccess { .. } => 3,
            PitcalcError::InvalidRange { .. }
            | PitcalcError::UnknownEquation { .. }
            | PitcalcError::CyclicReference { .. } => 4,
        };
        std::process::ExitCode::from(code)
    }
}

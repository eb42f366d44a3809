use crate::domain::Stage;

/// Application-level error carried up to `main`.
///
/// The exit code is what the `sedfit` binary returns to the shell:
/// `2` for input/configuration problems, `4` for numerical failures.
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Errors raised by the numeric core.
///
/// All of these are scoped to a single (spatial bin, model) fit: the batch
/// layer records them in the result grid and moves on to the next bin.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitError {
    /// Two profiles that share an axis disagree in length.
    #[error("data shape mismatch: {what} has length {found}, expected {expected}")]
    DataShape {
        what: String,
        expected: usize,
        found: usize,
    },

    /// `background + model` is not strictly positive where counts were observed.
    #[error("expected counts {value:e} are not positive in bin {bin} ({observed} counts observed)")]
    NonPositiveModel { bin: usize, value: f64, observed: f64 },

    /// The minimizer did not converge, timed out, or hit an invalid evaluation.
    #[error("{stage} failed at parameters {params:?}: {reason}")]
    FitFailed {
        stage: Stage,
        params: Vec<f64>,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// ISRF and CMB spectra could not be placed on one common energy grid.
    #[error("photon field grid mismatch: {0}")]
    PhotonFieldGrid(String),
}

impl FitError {
    pub fn shape(what: impl Into<String>, expected: usize, found: usize) -> Self {
        FitError::DataShape {
            what: what.into(),
            expected,
            found,
        }
    }

    /// Exit code used when the error reaches the binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            FitError::DataShape { .. } | FitError::InvalidConfig(_) | FitError::PhotonFieldGrid(_) => 2,
            FitError::NonPositiveModel { .. } | FitError::FitFailed { .. } => 4,
        }
    }
}

impl From<FitError> for AppError {
    fn from(value: FitError) -> Self {
        AppError::new(value.exit_code(), value.to_string())
    }
}

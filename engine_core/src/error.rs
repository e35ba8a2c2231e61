/// error.rs — Typed error taxonomy (C12)
///
/// Every fallible operation in this crate returns `Result<T, EngineError>`.
/// `EngineError` is a sealed set of kinds, each carrying a machine-readable
/// `code()` and an optional boxed cause, plus the distinguished
/// `InsufficientData` carrier used whenever a caller asked for more history
/// than exists.
use std::fmt;

use thiserror::Error;

/// Machine-readable error code, stable across crate versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    MissingParameter,
    InvalidType,
    InvalidPeriod,
    InvalidParameter,
    HistoricalDataFailed,
    NoDataFound,
    DataNotFound,
    IndicatorNotFound,
    IndicatorAlreadyRegistered,
    IndicatorCalculation,
    InvalidOrder,
    InvalidExecuteOrder,
    InvalidTakeProfit,
    InvalidStopLoss,
    InsufficientData,
    VersionMismatch,
    SessionIo,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("[{code}] missing parameter: {message}")]
    MissingParameter { code: ErrorCode, message: String },

    #[error("[{code}] invalid type: {message}")]
    InvalidType { code: ErrorCode, message: String },

    #[error("[{code}] invalid period: {message}")]
    InvalidPeriod { code: ErrorCode, message: String },

    #[error("[{code}] invalid parameter: {message}")]
    InvalidParameter { code: ErrorCode, message: String },

    #[error("[{code}] historical data fetch failed: {message}")]
    HistoricalDataFailed {
        code: ErrorCode,
        message: String,
        #[source]
        cause: Option<Box<EngineError>>,
    },

    #[error("[{code}] no data found: {message}")]
    NoDataFound { code: ErrorCode, message: String },

    #[error("[{code}] data not found: {message}")]
    DataNotFound { code: ErrorCode, message: String },

    #[error("[{code}] indicator not found: {message}")]
    IndicatorNotFound { code: ErrorCode, message: String },

    #[error("[{code}] indicator already registered: {message}")]
    IndicatorAlreadyRegistered { code: ErrorCode, message: String },

    #[error("[{code}] indicator calculation failed: {message}")]
    IndicatorCalculation {
        code: ErrorCode,
        message: String,
        #[source]
        cause: Option<Box<EngineError>>,
    },

    #[error("[{code}] invalid order: {message}")]
    InvalidOrder { code: ErrorCode, message: String },

    #[error("[{code}] invalid execute order: {message}")]
    InvalidExecuteOrder { code: ErrorCode, message: String },

    #[error("[{code}] invalid take profit: {message}")]
    InvalidTakeProfit { code: ErrorCode, message: String },

    #[error("[{code}] invalid stop loss: {message}")]
    InvalidStopLoss { code: ErrorCode, message: String },

    /// Distinguished carrier: raised whenever a caller asks for more
    /// history than is available.
    #[error("insufficient data for {symbol}: required {required}, actual {actual}")]
    InsufficientData {
        required: usize,
        actual: usize,
        symbol: String,
    },

    #[error("[{code}] version mismatch: {message}")]
    VersionMismatch { code: ErrorCode, message: String },

    #[error("[{code}] session I/O failed: {message}")]
    SessionIo {
        code: ErrorCode,
        message: String,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        use EngineError::*;
        match self {
            MissingParameter { code, .. }
            | InvalidType { code, .. }
            | InvalidPeriod { code, .. }
            | InvalidParameter { code, .. }
            | HistoricalDataFailed { code, .. }
            | NoDataFound { code, .. }
            | DataNotFound { code, .. }
            | IndicatorNotFound { code, .. }
            | IndicatorAlreadyRegistered { code, .. }
            | IndicatorCalculation { code, .. }
            | InvalidOrder { code, .. }
            | InvalidExecuteOrder { code, .. }
            | InvalidTakeProfit { code, .. }
            | InvalidStopLoss { code, .. }
            | VersionMismatch { code, .. }
            | SessionIo { code, .. } => *code,
            InsufficientData { .. } => ErrorCode::InsufficientData,
        }
    }

    /// Wrap an existing error with a new code and message, keeping the
    /// original as `source()`. Used when a lower-level failure (e.g. a
    /// parquet read error) needs to surface as a typed `EngineError`
    /// without losing the underlying cause.
    pub fn wrap(code: ErrorCode, message: impl Into<String>, cause: EngineError) -> Self {
        EngineError::HistoricalDataFailed {
            code,
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    pub fn insufficient_data(required: usize, actual: usize, symbol: impl Into<String>) -> Self {
        EngineError::InsufficientData {
            required,
            actual,
            symbol: symbol.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        EngineError::DataNotFound {
            code: ErrorCode::DataNotFound,
            message: message.into(),
        }
    }
}

/// True for the distinguished "caller asked for more history than exists"
/// error kind, letting callers branch on it without a full match.
pub fn is_insufficient_data_error(e: &EngineError) -> bool {
    matches!(e, EngineError::InsufficientData { .. })
}

/// Errors recoverable at the core boundary: callers may degrade
/// gracefully rather than propagate.
pub fn is_recoverable(e: &EngineError) -> bool {
    matches!(
        e,
        EngineError::InsufficientData { .. } | EngineError::DataNotFound { .. }
    )
}

pub type Result<T> = std::result::Result<T, EngineError>;

//! Error taxonomy for the core: a recoverable [`LiftError`] (and its
//! [`LiftStatus`] projection, sticky across one instruction lift) plus the
//! fatal conditions the core deliberately does not wrap in `Result` at all
//! (see `varnode_resolver`, which `panic!`s on an unrecognized address
//! space — that indicates a decoder/architecture mismatch bug, not runtime
//! data).

#[derive(Debug, thiserror::Error)]
pub enum LiftError {
    #[error("instruction could not be decoded: {0}")]
    Invalid(String),

    #[error("unsupported p-code operation: {0}")]
    Unsupported(String),

    #[error("lifter contract violated: {0}")]
    Internal(String),

    #[error("LLVM builder error: {0}")]
    Builder(#[from] inkwell::builder::BuilderError),
}

impl LiftError {
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    /// Project this error onto the sticky [`LiftStatus`] it corresponds to.
    pub fn status(&self) -> LiftStatus {
        match self {
            LiftError::Invalid(_) => LiftStatus::Invalid,
            LiftError::Unsupported(_) => LiftStatus::Unsupported,
            LiftError::Internal(_) | LiftError::Builder(_) => LiftStatus::LifterError,
        }
    }
}

pub type Result<T> = std::result::Result<T, LiftError>;

/// The outcome of lifting one instruction. Monotone sticky: once a
/// non-`Lifted` status is recorded it dominates for the rest of the
/// instruction, even though lowering continues (see [`StatusTracker`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiftStatus {
    Lifted,
    Invalid,
    Unsupported,
    LifterError,
}

impl Default for LiftStatus {
    fn default() -> Self {
        Self::Lifted
    }
}

/// Accumulates a [`LiftStatus`] across the ops of one instruction lift. The
/// first non-`Lifted` status recorded is retained; later ones (even of a
/// different kind) are ignored.
#[derive(Debug, Default)]
pub struct StatusTracker(LiftStatus);

impl StatusTracker {
    pub fn new() -> Self {
        Self(LiftStatus::Lifted)
    }

    pub fn record(&mut self, status: LiftStatus) {
        if self.0 == LiftStatus::Lifted {
            self.0 = status;
        }
    }

    pub fn record_err(&mut self, err: &LiftError) {
        self.record(err.status());
    }

    pub fn finish(self) -> LiftStatus {
        self.0
    }
}

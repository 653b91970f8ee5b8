/// Error category.
///
/// The category drives both the process exit code and how the pipeline reacts:
/// input problems abort before any optimizer stage runs, a missing feasible
/// orientation aborts the whole pipeline, and numerical problems only surface
/// as errors when a run cannot proceed at all (per-evaluation instabilities
/// are absorbed as infinite cost instead).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid or inconsistent inputs: orphan configuration references,
    /// empty observation sets, bad uncertainties, tensor/symmetry mismatch.
    InvalidInput,
    /// Stage 1 found no finite-cost orientation anywhere in the domain.
    NoFeasibleOrientation,
    /// A numerical failure the run could not absorb.
    NumericalInstability,
}

#[derive(Clone)]
pub struct AppError {
    kind: ErrorKind,
    message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn no_feasible(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoFeasibleOrientation, message)
    }

    pub fn numerical(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NumericalInstability, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn exit_code(&self) -> u8 {
        match self.kind {
            ErrorKind::InvalidInput => 2,
            ErrorKind::NoFeasibleOrientation => 3,
            ErrorKind::NumericalInstability => 4,
        }
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
            .field("kind", &self.kind)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

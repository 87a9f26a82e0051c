use std::fmt;
use std::path::PathBuf;

/// A single problem found while loading Go packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub file: PathBuf,
    pub line: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn new(file: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.file.display(), self.line, self.message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("go.mod not found for {dir}: {reason}")]
    ModuleNotFound { dir: PathBuf, reason: String },

    #[error("package loading failed with {} error(s): {}", .diagnostics.len(), first_diagnostic(.diagnostics))]
    PackageLoad { diagnostics: Vec<Diagnostic> },

    #[error("unsupported call graph algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("no main package found")]
    NoMainPackage,

    #[error("{algorithm} analysis produced an empty call graph")]
    EmptyCallGraph { algorithm: String },

    #[error("call graph traversal failed: {0}")]
    Traversal(String),

    #[error("analysis cancelled")]
    Cancelled,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} writer thread panicked")]
    WriterPanicked(&'static str),
}

fn first_diagnostic(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .first()
        .map(|d| d.to_string())
        .unwrap_or_default()
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Invalid(String),
}

pub type Result<T, E = AnalysisError> = std::result::Result<T, E>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;

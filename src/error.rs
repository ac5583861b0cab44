use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Decode Error in {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("Shape Mismatch in {}: expected 2D array, got {shape:?}", path.display())]
    ShapeMismatch { path: PathBuf, shape: Vec<usize> },

    #[error(
        "Shape Mismatch in {}: map is {}x{}, earlier maps were {}x{}",
        path.display(), found.1, found.0, expected.1, expected.0
    )]
    GridMismatch {
        path: PathBuf,
        /// (rows, cols) of the first decoded map
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Parse Error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("Config Error: {0}")]
    Config(String),

    #[error("Analysis Error: {0}")]
    Analysis(String),

    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Json Error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn decode(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Decode {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn parse(line: usize, reason: impl Into<String>) -> Self {
        Error::Parse {
            line,
            reason: reason.into(),
        }
    }

    /// Maps `NotFound` onto [`Error::FileNotFound`] so callers see the path.
    pub(crate) fn open(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound { path: path.into() }
        } else {
            Error::IoError(err)
        }
    }
}

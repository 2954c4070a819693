//! Error kinds surfaced by loaders, the guarded reader and item actions.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("path {path} escapes base directory {base}")]
    PathEscape { path: PathBuf, base: PathBuf },

    #[error("extension not allowed for {path}")]
    ExtensionNotAllowed { path: PathBuf },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("local '{0}' did not resolve")]
    NotResolved(String),

    #[error("environment {0} is not valid for this repository")]
    InvalidEnvironment(String),

    #[error("failed to load {category}: {message}")]
    Loader { category: String, message: String },

    #[error("{action} failed for {target}: {message}")]
    Action {
        action: String,
        target: String,
        message: String,
    },

    #[error("operation canceled")]
    Canceled,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn loader(category: impl ToString, message: impl ToString) -> Self {
        Self::Loader {
            category: category.to_string(),
            message: message.to_string(),
        }
    }

    pub fn action(action: impl ToString, target: impl ToString, message: impl ToString) -> Self {
        Self::Action {
            action: action.to_string(),
            target: target.to_string(),
            message: message.to_string(),
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

use std::path::PathBuf;

use faas_store::StoreError;
use thiserror::Error;

/// Everything a pipeline stage can fail with. The orchestrator renders these
/// into the task record's error message, so the texts are user-facing.
#[derive(Debug, Error)]
pub enum PackError {
    #[error("Unsupported file type: {0}. Only .py and .zip files are supported.")]
    UnsupportedFileType(String),

    #[error("Invalid or corrupted zip file")]
    InvalidArchive,

    #[error("spin.toml not found in zip archive")]
    MissingDescriptor,

    #[error("source file is not valid UTF-8: {0}")]
    InvalidSource(String),

    #[error("MyPy validation failed:\n{0}")]
    TypeCheckFailed(String),

    #[error("venv template not found at {0}")]
    VenvTemplateMissing(PathBuf),

    #[error("Invalid venv template: bin directory not found")]
    VenvTemplateInvalid,

    #[error("pip install failed: {0}")]
    PipInstallFailed(String),

    #[error("pip install timed out after 5 minutes")]
    PipInstallTimeout,

    #[error("spin build failed: {0}")]
    BuildFailed(String),

    #[error("spin build timed out after 10 minutes")]
    BuildTimeout,

    #[error("Build succeeded but WASM artifact not found")]
    ArtifactMissing,

    #[error("Application directory not found: {0}")]
    AppDirMissing(PathBuf),

    #[error("registry login failed: {0}")]
    LoginFailed(String),

    #[error("spin registry push failed: {0}")]
    PushFailed(String),

    #[error("spin registry push timed out after 5 minutes")]
    PushTimeout,

    #[error("{tool} not found. Please ensure it is installed and in PATH")]
    ToolMissing { tool: &'static str },

    #[error("Core Service {operation} failed: {detail}")]
    CoreService {
        operation: &'static str,
        detail: String,
    },

    #[error("Core Service {operation} timed out after {seconds} seconds")]
    CoreServiceTimeout {
        operation: &'static str,
        seconds: u64,
    },

    #[error("Core Service request error: {0}")]
    CoreServiceTransport(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

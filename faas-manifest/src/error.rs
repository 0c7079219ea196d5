use thiserror::Error;

/// Construction-time validation failures for a SpinApp manifest.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("SpinApp name cannot be empty")]
    EmptyName,

    #[error("SpinApp image cannot be empty")]
    EmptyImage,

    #[error("replicas must be at least 1")]
    InvalidReplicas,

    #[error(
        "enableAutoscaling and replicas are mutually exclusive. \
         When enableAutoscaling is true, replicas must not be specified."
    )]
    AutoscalingConflict,

    #[error(
        "invalid resource format for {field}: '{value}'. \
         Expected format like '100m', '128Mi', '1Gi', etc."
    )]
    InvalidResourceFormat { field: &'static str, value: String },

    #[error("failed to serialize manifest: {0}")]
    Serialize(String),
}

fn fmt_line(line: &Option<usize>) -> String {
    match line {
        Some(line) => format!(" at line {line}"),
        None => String::new(),
    }
}

/// Failures while parsing a YAML document back into a manifest.
#[derive(Debug, Error)]
pub enum ManifestParseError {
    #[error("invalid YAML syntax{}: {message}", fmt_line(.line))]
    Syntax { line: Option<usize>, message: String },

    #[error("empty YAML content")]
    Empty,

    #[error("YAML must be a mapping")]
    NotAMapping,

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("{0} must be a mapping")]
    ExpectedMapping(&'static str),

    #[error("{0} must be a list")]
    ExpectedList(&'static str),

    #[error("invalid manifest data: {0}")]
    Invalid(#[from] ManifestError),
}

impl ManifestParseError {
    /// 1-indexed line of the underlying parser error, when known.
    pub fn line(&self) -> Option<usize> {
        match self {
            ManifestParseError::Syntax { line, .. } => *line,
            _ => None,
        }
    }
}

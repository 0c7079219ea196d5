use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid S3 uri: {0}")]
    InvalidUri(String),

    #[error("path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("no objects found at S3 path: {0}")]
    EmptyPrefix(String),

    #[error("S3 error ({code}): {message}")]
    S3 { code: String, message: String },

    #[error("DynamoDB error ({code}): {message}")]
    DynamoDb { code: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn s3<E>(err: aws_sdk_s3::error::SdkError<E>) -> Self
    where
        E: aws_sdk_s3::error::ProvideErrorMetadata + std::fmt::Debug,
    {
        use aws_sdk_s3::error::ProvideErrorMetadata;
        let code = err.code().unwrap_or("Unknown").to_string();
        let message = err
            .message()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{err:?}"));
        StoreError::S3 { code, message }
    }

    pub(crate) fn dynamodb<E>(err: aws_sdk_dynamodb::error::SdkError<E>) -> Self
    where
        E: aws_sdk_dynamodb::error::ProvideErrorMetadata + std::fmt::Debug,
    {
        use aws_sdk_dynamodb::error::ProvideErrorMetadata;
        let code = err.code().unwrap_or("Unknown").to_string();
        let message = err
            .message()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{err:?}"));
        StoreError::DynamoDb { code, message }
    }
}

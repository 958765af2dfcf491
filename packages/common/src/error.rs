use thiserror::Error;

/// Failure reported by a [`FileStore`](crate::FileStore)
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {0}")]
    NotFound(String),

    /// Empty, absolute, or escaping the store root
    #[error("Invalid file name: {0}")]
    InvalidName(String),
}

pub type CommonResult<T> = Result<T, CommonError>;

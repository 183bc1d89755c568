use thiserror::Error;

pub type SbxResult<T> = Result<T, SbxError>;

#[derive(Debug, Error)]
pub enum SbxError {
    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

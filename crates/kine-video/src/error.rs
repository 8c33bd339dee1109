use thiserror::Error;

#[derive(Error, Debug)]
pub enum VideoError {
    #[error("failed to open frame-source file: {0}")]
    OpenFailed(String),

    #[error("failed to decode frame: {0}")]
    DecodeFailed(String),

    #[error("no frames decoded from file loop")]
    EmptyLoop,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type VideoResult<T> = Result<T, VideoError>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("frame source error: {0}")]
    FrameSource(#[from] kine_video::VideoError),

    #[error("vision trigger queue is full")]
    TriggerQueueFull,
}

pub type VisionResult<T> = Result<T, VisionError>;

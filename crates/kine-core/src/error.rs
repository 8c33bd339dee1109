//! Core error taxonomy for the synthesis core
//!
//! Real-time threads (audio callback, GL draw loop, vision scan) never
//! raise: they record a counter and continue. These variants exist for
//! the non-realtime setup/teardown paths and for the counters a
//! non-realtime thread drains.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Audio device cannot open, GL context cannot create, camera
    /// unavailable. Surfaced at start; the core refuses to enter run
    /// state.
    #[error("fatal startup error: {0}")]
    FatalStartup(String),

    /// Frame-source failure or temporary dropout. Logged; the previous
    /// frame is reused, never propagated to a caller.
    #[error("transient device error: {0}")]
    TransientDevice(String),

    /// The GL thread did not complete a render within its deadline.
    #[error("render timed out after {0:?}")]
    RenderTimeout(std::time::Duration),

    /// An invalid parameter value was supplied. Always accompanied by
    /// clamping at the call site; never surfaced to the user.
    #[error("parameter {0:?} out of range")]
    ParameterRange(crate::ParamTag),

    #[error("audio buffer overrun")]
    BufferOverrun,

    #[error("audio buffer underrun")]
    BufferUnderrun,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// An operation that needs a player was called while none is bound.
    #[error("{0} can only be used when a player is present")]
    NoPlayer(&'static str),
    /// The player emitted a new state before the previous frame finished.
    #[error("new player state was emitted before the last player state was rendered")]
    FrameInFlight,
    #[error("player does not support {0}")]
    UnsupportedCapability(String),
    #[error("failed to fetch {uri}: {status} {status_text}")]
    HttpStatus {
        uri: String,
        status: u16,
        status_text: String,
    },
    #[error("failed to load asset {0}")]
    AssetNotFound(String),
    #[error("invalid uri: {0}")]
    InvalidUri(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("message pipeline store is closed")]
    StoreClosed,
    #[error("worker closed")]
    WorkerClosed,
    #[error("operation cancelled")]
    Cancelled,
}

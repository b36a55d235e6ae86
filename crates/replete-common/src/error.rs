use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepleteError {
    #[error("Engine used before it was initialized")]
    EngineNotInitialized,

    #[error("Dispatcher is no longer accepting commands")]
    DispatcherClosed,

    #[error("JavaScript execution error: {0}")]
    JavaScriptExecution(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RepleteError>;

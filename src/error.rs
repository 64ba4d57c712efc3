//! Error taxonomy for the compositor core.
//!
//! Startup failures are fatal and typed; everything that can go wrong
//! after startup is either recoverable (logged, empty result) or a
//! client protocol hiccup absorbed by idempotent teardown guards.

use thiserror::Error;

/// Fatal startup and lifecycle errors surfaced to the embedding layer.
///
/// If `initialize` or `start` returns one of these, no partial session
/// is left running.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("backend initialization failed: {0}")]
    BackendInit(String),

    #[error("renderer initialization failed: {0}")]
    RendererInit(String),

    #[error("allocator initialization failed: {0}")]
    AllocatorInit(String),

    #[error("seat initialization failed: {0}")]
    SeatInit(String),

    #[error("shell initialization failed: {0}")]
    ShellInit(String),

    #[error("server is not initialized")]
    NotInitialized,

    #[error("server is already initialized")]
    AlreadyInitialized,

    #[error("server is already running")]
    AlreadyRunning,

    #[error("backend has not been started")]
    BackendNotStarted,
}

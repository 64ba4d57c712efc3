//! # Alcove Embeddable Compositor Core
//!
//! Alcove hosts display-protocol client windows inside another UI: the
//! compositor runs headless, the host application drives event dispatch
//! and rendering cadence, and every client window is exposed as a frame
//! the host can draw wherever it likes.
//!
//! ## Architecture
//!
//! Alcove is built on a modular architecture:
//! - `server`: Root context, lifecycle and the embedding interface
//! - `shell`: Client window (toplevel) lifecycle state machine
//! - `seat`: Keyboard/pointer state, hit-testing and focus transfer
//! - `output`: Event-driven virtual output creation and frame scheduling
//! - `render`: Dual-mode (CPU readback / fd-sharing) render backend
//! - `toolkit`: The low-level collaborator — headless backend, scene
//!   graph, protocol object model and shm buffers
//! - `config`: Configuration parsing and management
//!
//! ## Usage
//!
//! ```rust,no_run
//! use alcove::{AlcoveConfig, Server};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut server = Server::new(AlcoveConfig::default())?;
//!     server.initialize()?;
//!     server.start()?;
//!     // Host loop: poll server.event_fd(), then
//!     server.dispatch_events();
//!     server.stop();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod output;
pub mod render;
pub mod seat;
pub mod server;
pub mod shell;
pub mod toolkit;

// Re-export main types for easy access
pub use config::AlcoveConfig;
pub use error::ServerError;
pub use render::{hardware_available, FrameCapture, RenderBackend, RenderMode, ViewFrame};
pub use seat::Seat;
pub use server::{Notification, Server};
pub use shell::{View, ViewState};

// Re-export common error types
pub use anyhow::{Context, Error, Result};

/// Version information for Alcove
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

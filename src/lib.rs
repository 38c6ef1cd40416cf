//! # tessera
//!
//! The input and surface-lifecycle core of a small Wayland compositor.
//!
//! ## Architecture
//!
//! tessera is built around a single [`Compositor`] value:
//! - `resource`: generation-checked resource registry with destroy listeners
//! - `surface`: surfaces, buffers, frame callbacks and commit
//! - `input`: pointer and keyboard focus, grabs and the shared keymap
//! - `seat`: the seat global tying pointer, keyboard and data device together
//! - `data_device`: clipboard selection and drag-and-drop
//! - `shell`, `output`, `region`: the remaining core globals
//! - `renderer`: the collaborator that presents buffers and hit-tests
//! - `xwayland`: X server supervision
//! - `replay`: scripted sessions against the headless renderer
//! - `config`: configuration parsing and validation
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tessera::{Compositor, HeadlessRenderer, TesseraConfig};
//! use tessera::input::InputEvent;
//!
//! let mut compositor = Compositor::new(TesseraConfig::default(), HeadlessRenderer::new())?;
//! compositor.handle_input(InputEvent::Motion { time: 0, x: 10.0, y: 10.0 });
//! let _messages = compositor.take_messages();
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod compositor;
pub mod config;
pub mod data_device;
pub mod error;
pub mod events;
pub mod input;
pub mod output;
pub mod region;
pub mod renderer;
pub mod replay;
pub mod resource;
pub mod seat;
pub mod shell;
pub mod surface;
pub mod xwayland;

#[cfg(test)]
mod testing;

// Re-export main types for easy access
pub use compositor::Compositor;
pub use config::TesseraConfig;
pub use renderer::HeadlessRenderer;

// Re-export common error types
pub use anyhow::{Context, Error, Result};

/// Version information for tessera
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

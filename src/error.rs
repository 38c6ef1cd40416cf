//! Error types for the tessera core
//!
//! Protocol errors are never returned to the caller of a request handler. They
//! are queued for the offending client (see [`crate::events::Message::Error`])
//! and the transport decides how to terminate that connection. The remaining
//! types cover the few fallible seams: resource allocation, the renderer
//! collaborator, and keymap construction.

use crate::resource::{Interface, ResourceId};
use serde::Serialize;
use thiserror::Error;

/// Core `wl_display` error code for a request naming a dead or wrong object
pub const DISPLAY_ERROR_INVALID_OBJECT: u32 = 0;
/// Core `wl_display` error code for an allocation failure
pub const DISPLAY_ERROR_NO_MEMORY: u32 = 2;
/// `wl_shell` error code for a surface that already has a role
pub const SHELL_ERROR_ROLE: u32 = 0;

/// A client protocol violation, reported to that client only
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum ProtocolError {
    /// A request argument names an object that does not exist or has the wrong type
    #[error("invalid object {object:?}: expected {expected:?}")]
    InvalidObject {
        object: ResourceId,
        expected: Interface,
    },

    /// A second shell role was requested for a surface
    #[error("surface {surface:?} already has a shell surface")]
    RoleAlreadyAssigned { surface: ResourceId },

    /// The core could not allocate storage for a client object
    #[error("out of memory")]
    NoMemory,
}

impl ProtocolError {
    /// Wire error code carried by the error event
    pub fn code(&self) -> u32 {
        match self {
            ProtocolError::InvalidObject { .. } => DISPLAY_ERROR_INVALID_OBJECT,
            ProtocolError::RoleAlreadyAssigned { .. } => SHELL_ERROR_ROLE,
            ProtocolError::NoMemory => DISPLAY_ERROR_NO_MEMORY,
        }
    }
}

/// Failures of the resource registry
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unable to reserve storage for a new {0:?} resource")]
    OutOfMemory(Interface),
}

impl From<RegistryError> for ProtocolError {
    fn from(_: RegistryError) -> Self {
        ProtocolError::NoMemory
    }
}

/// Failures reported by a [`crate::renderer::Renderer`]
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("buffer {0:?} has a format the renderer cannot import")]
    UnsupportedBuffer(ResourceId),

    #[error("presentation failed: {0}")]
    Failed(String),
}

/// Failures while building the shared keymap
#[derive(Debug, Error)]
pub enum KeymapError {
    #[error("keymap compilation failed for layout '{layout}'")]
    Compile { layout: String },

    #[error("keymap text is empty")]
    Empty,

    #[error("keymap support was not compiled in (enable the `xkb` feature or set keyboard.keymap_file)")]
    Unsupported,

    #[error("failed to share keymap: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_codes() {
        assert_eq!(ProtocolError::NoMemory.code(), DISPLAY_ERROR_NO_MEMORY);
        let err = ProtocolError::RoleAlreadyAssigned {
            surface: ResourceId::new(3, 1),
        };
        assert_eq!(err.code(), SHELL_ERROR_ROLE);
        assert!(err.to_string().contains("already has a shell surface"));
    }

    #[test]
    fn test_registry_error_maps_to_no_memory() {
        let err: ProtocolError = RegistryError::OutOfMemory(Interface::DataOffer).into();
        assert_eq!(err, ProtocolError::NoMemory);
    }
}

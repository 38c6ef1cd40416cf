//! Renderer collaborator
//!
//! The core does not draw. Committed buffers are handed to a [`Renderer`],
//! which owns presentation handles and answers the two geometric questions the
//! input code needs: which surface is under a point, and where that point is
//! in surface-local coordinates.
//!
//! [`headless::HeadlessRenderer`] is a complete in-memory implementation used
//! by the replay driver and the integration tests.

pub mod headless;

use crate::error::RenderError;
use crate::region::Rectangle;
use crate::resource::ResourceId;
use serde::Serialize;

pub use headless::HeadlessRenderer;

/// Opaque handle to a renderer-side presentation of a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PresentationId(pub u64);

/// What the renderer needs to know about a committed buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    pub buffer: ResourceId,
    pub width: i32,
    pub height: i32,
    pub stride: i32,
    pub format: u32,
}

/// Rendering and scene-graph backend
#[cfg_attr(test, mockall::automock)]
pub trait Renderer {
    /// Shows `buffer` as the content of `surface`.
    ///
    /// The first successful call for a surface creates its presentation;
    /// later calls return the same handle.
    fn present(&mut self, surface: ResourceId, buffer: &BufferInfo)
        -> Result<PresentationId, RenderError>;

    /// Marks a surface-local rectangle of a presentation as changed
    fn damage(&mut self, presentation: PresentationId, rect: Rectangle);

    /// Drops a presentation; the surface is gone
    fn destroy(&mut self, presentation: PresentationId);

    /// Topmost surface containing the global point, if any
    fn hit_test(&self, x: f64, y: f64) -> Option<ResourceId>;

    /// Converts a global point into `surface`-local coordinates
    fn transform_to_local(&self, surface: ResourceId, x: f64, y: f64) -> (f64, f64);
}

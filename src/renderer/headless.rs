//! In-memory renderer
//!
//! Keeps a bottom-to-top stack of presented surfaces with their global
//! position and buffer size, and accumulates damage per presentation instead
//! of drawing it. Good enough to drive focus, hit-testing and drag-and-drop
//! without a GPU.
//!
//! ```
//! use tessera::renderer::{BufferInfo, HeadlessRenderer, Renderer};
//! # use tessera::resource::{ClientId, Interface, ResourceRegistry};
//! # let mut registry: ResourceRegistry<()> = ResourceRegistry::new();
//! # let surface = registry.create(Interface::Surface, 3, ClientId(1)).unwrap();
//! # let buffer = registry.create(Interface::Buffer, 4, ClientId(1)).unwrap();
//!
//! let mut renderer = HeadlessRenderer::new();
//! renderer.place(surface, 100, 50);
//! let info = BufferInfo { buffer, width: 20, height: 20, stride: 80, format: 0 };
//! renderer.present(surface, &info).unwrap();
//!
//! assert_eq!(renderer.hit_test(110.0, 60.0), Some(surface));
//! assert_eq!(renderer.transform_to_local(surface, 110.0, 60.0), (10.0, 10.0));
//! ```

use super::{BufferInfo, PresentationId, Renderer};
use crate::error::RenderError;
use crate::region::Rectangle;
use crate::resource::ResourceId;
use log::debug;
use std::collections::HashMap;

/// One presented surface in the stack
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub presentation: PresentationId,
    pub surface: ResourceId,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl SceneNode {
    fn bounds(&self) -> Rectangle {
        Rectangle::new(self.x, self.y, self.width, self.height)
    }
}

#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    /// Ordered from bottom to top
    stack: Vec<SceneNode>,
    /// Positions requested before a surface was first presented
    placements: HashMap<ResourceId, (i32, i32)>,
    damage: HashMap<PresentationId, Vec<Rectangle>>,
    next_presentation: u64,
    presented: u64,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves a surface to a global position, now or when it is first presented
    pub fn place(&mut self, surface: ResourceId, x: i32, y: i32) {
        self.placements.insert(surface, (x, y));
        if let Some(node) = self.node_mut(surface) {
            node.x = x;
            node.y = y;
        }
    }

    /// Brings a presented surface to the top of the stack
    pub fn raise(&mut self, surface: ResourceId) -> bool {
        match self.stack.iter().position(|n| n.surface == surface) {
            Some(position) => {
                let node = self.stack.remove(position);
                self.stack.push(node);
                true
            }
            None => false,
        }
    }

    pub fn nodes(&self) -> &[SceneNode] {
        &self.stack
    }

    pub fn presentation_of(&self, surface: ResourceId) -> Option<PresentationId> {
        self.stack
            .iter()
            .find(|n| n.surface == surface)
            .map(|n| n.presentation)
    }

    /// Damage accumulated for a presentation since the last call
    pub fn take_damage(&mut self, presentation: PresentationId) -> Vec<Rectangle> {
        self.damage.remove(&presentation).unwrap_or_default()
    }

    /// Total number of successful `present` calls
    pub fn present_count(&self) -> u64 {
        self.presented
    }

    fn node(&self, surface: ResourceId) -> Option<&SceneNode> {
        self.stack.iter().find(|n| n.surface == surface)
    }

    fn node_mut(&mut self, surface: ResourceId) -> Option<&mut SceneNode> {
        self.stack.iter_mut().find(|n| n.surface == surface)
    }
}

impl Renderer for HeadlessRenderer {
    fn present(
        &mut self,
        surface: ResourceId,
        buffer: &BufferInfo,
    ) -> Result<PresentationId, RenderError> {
        if buffer.width <= 0 || buffer.height <= 0 {
            return Err(RenderError::UnsupportedBuffer(buffer.buffer));
        }
        self.presented += 1;

        if let Some(node) = self.node_mut(surface) {
            node.width = buffer.width;
            node.height = buffer.height;
            return Ok(node.presentation);
        }

        self.next_presentation += 1;
        let presentation = PresentationId(self.next_presentation);
        let (x, y) = self.placements.get(&surface).copied().unwrap_or((0, 0));
        debug!(
            "presenting {:?} as {:?} at {},{} ({}x{})",
            surface, presentation, x, y, buffer.width, buffer.height
        );
        self.stack.push(SceneNode {
            presentation,
            surface,
            x,
            y,
            width: buffer.width,
            height: buffer.height,
        });
        Ok(presentation)
    }

    fn damage(&mut self, presentation: PresentationId, rect: Rectangle) {
        self.damage.entry(presentation).or_default().push(rect);
    }

    fn destroy(&mut self, presentation: PresentationId) {
        if let Some(position) = self.stack.iter().position(|n| n.presentation == presentation) {
            let node = self.stack.remove(position);
            self.placements.remove(&node.surface);
        }
        self.damage.remove(&presentation);
    }

    fn hit_test(&self, x: f64, y: f64) -> Option<ResourceId> {
        self.stack
            .iter()
            .rev()
            .find(|n| n.bounds().contains_point(x, y))
            .map(|n| n.surface)
    }

    fn transform_to_local(&self, surface: ResourceId, x: f64, y: f64) -> (f64, f64) {
        match self.node(surface) {
            Some(node) => (x - node.x as f64, y - node.y as f64),
            None => (x, y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ClientId, Interface, ResourceRegistry};

    fn ids() -> (ResourceId, ResourceId, ResourceId) {
        let mut registry: ResourceRegistry<()> = ResourceRegistry::new();
        let a = registry.create(Interface::Surface, 3, ClientId(1)).unwrap();
        let b = registry.create(Interface::Surface, 4, ClientId(2)).unwrap();
        let buffer = registry.create(Interface::Buffer, 5, ClientId(1)).unwrap();
        (a, b, buffer)
    }

    fn info(buffer: ResourceId, size: i32) -> BufferInfo {
        BufferInfo {
            buffer,
            width: size,
            height: size,
            stride: size * 4,
            format: 0,
        }
    }

    #[test]
    fn test_topmost_surface_wins_hit_test() {
        let (a, b, buffer) = ids();
        let mut renderer = HeadlessRenderer::new();
        renderer.present(a, &info(buffer, 100)).unwrap();
        renderer.place(b, 50, 50);
        renderer.present(b, &info(buffer, 100)).unwrap();

        assert_eq!(renderer.hit_test(75.0, 75.0), Some(b));
        assert_eq!(renderer.hit_test(10.0, 10.0), Some(a));
        assert!(renderer.raise(a));
        assert_eq!(renderer.hit_test(75.0, 75.0), Some(a));
        assert_eq!(renderer.hit_test(500.0, 500.0), None);
    }

    #[test]
    fn test_present_reuses_presentation() {
        let (a, _, buffer) = ids();
        let mut renderer = HeadlessRenderer::new();
        let first = renderer.present(a, &info(buffer, 10)).unwrap();
        let second = renderer.present(a, &info(buffer, 20)).unwrap();
        assert_eq!(first, second);
        assert_eq!(renderer.nodes()[0].width, 20);
        assert_eq!(renderer.present_count(), 2);
    }

    #[test]
    fn test_destroy_removes_from_stack_and_damage() {
        let (a, _, buffer) = ids();
        let mut renderer = HeadlessRenderer::new();
        let p = renderer.present(a, &info(buffer, 10)).unwrap();
        renderer.damage(p, Rectangle::new(0, 0, 5, 5));
        renderer.destroy(p);
        assert!(renderer.nodes().is_empty());
        assert!(renderer.take_damage(p).is_empty());
        assert_eq!(renderer.hit_test(1.0, 1.0), None);
    }

    #[test]
    fn test_empty_buffer_is_rejected() {
        let (a, _, buffer) = ids();
        let mut renderer = HeadlessRenderer::new();
        assert!(renderer.present(a, &info(buffer, 0)).is_err());
        assert_eq!(renderer.presentation_of(a), None);
    }
}

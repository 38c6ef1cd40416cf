//! The single output global
//!
//! Geometry is fixed at startup from [`OutputConfig`]; binding announces it
//! once and nothing changes afterwards.

use crate::compositor::Compositor;
use crate::config::OutputConfig;
use crate::events::{Event, OUTPUT_MODE_CURRENT, OUTPUT_MODE_PREFERRED};
use crate::renderer::Renderer;
use crate::resource::{ClientId, Interface, ResourceId};
use log::debug;

#[derive(Debug)]
pub struct Output {
    pub width: i32,
    pub height: i32,
    /// mHz
    pub refresh: i32,
    pub physical_width: i32,
    pub physical_height: i32,
    pub make: String,
    pub model: String,
    pub(crate) resources: Vec<ResourceId>,
}

impl Output {
    pub fn new(config: &OutputConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            refresh: config.refresh,
            physical_width: config.physical_width_mm,
            physical_height: config.physical_height_mm,
            make: config.make.clone(),
            model: config.model.clone(),
            resources: Vec::new(),
        }
    }

    /// Bound output resources
    pub fn resources(&self) -> &[ResourceId] {
        &self.resources
    }
}

impl<R: Renderer> Compositor<R> {
    /// Binds `wl_output`: geometry, then the only mode
    pub fn bind_output(&mut self, client: ClientId, id: u32) -> Option<ResourceId> {
        let resource = self.allocate(Interface::Output, id, client)?;
        self.output.resources.push(resource);

        let geometry = Event::OutputGeometry {
            x: 0,
            y: 0,
            physical_width: self.output.physical_width,
            physical_height: self.output.physical_height,
            make: self.output.make.clone(),
            model: self.output.model.clone(),
        };
        let mode = Event::OutputMode {
            flags: OUTPUT_MODE_CURRENT | OUTPUT_MODE_PREFERRED,
            width: self.output.width,
            height: self.output.height,
            refresh: self.output.refresh,
        };
        self.send(resource, geometry);
        self.send(resource, mode);
        debug!("client {:?} bound output as {:?}", client, resource);
        Some(resource)
    }
}

//! Shell-surface role
//!
//! A surface can be given the shell role exactly once. Window management
//! requests are accepted and logged; there is no policy behind them.

use crate::compositor::{Compositor, DestroyListener};
use crate::error::ProtocolError;
use crate::renderer::Renderer;
use crate::resource::{ClientId, Interface, ListenerToken, ResourceId};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub struct ShellSurface {
    surface: ResourceId,
    surface_listener: ListenerToken,
    title: Option<String>,
    class: Option<String>,
}

impl ShellSurface {
    pub fn surface(&self) -> ResourceId {
        self.surface
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn class(&self) -> Option<&str> {
        self.class.as_deref()
    }
}

/// Requests on a shell surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum ShellSurfaceRequest {
    Pong { serial: u32 },
    Move { serial: u32 },
    Resize { serial: u32, edges: u32 },
    SetToplevel,
    SetTransient { parent: ResourceId, x: i32, y: i32, flags: u32 },
    SetFullscreen { method: u32, framerate: u32 },
    SetPopup { serial: u32, parent: ResourceId, x: i32, y: i32, flags: u32 },
    SetMaximized,
    SetTitle { title: String },
    SetClass { class: String },
}

impl<R: Renderer> Compositor<R> {
    pub fn shell_surface(&self, id: ResourceId) -> Option<&ShellSurface> {
        self.shell_surfaces.get(&id)
    }

    /// `wl_shell.get_shell_surface`
    pub fn get_shell_surface(
        &mut self,
        client: ClientId,
        id: u32,
        surface: ResourceId,
    ) -> Option<ResourceId> {
        if !self.registry.is_a(surface, Interface::Surface) {
            self.outbox.post_error(
                client,
                Some(surface),
                ProtocolError::InvalidObject {
                    object: surface,
                    expected: Interface::Surface,
                },
            );
            return None;
        }
        if self.surfaces.get(&surface).map_or(false, |s| s.has_shell_surface()) {
            warn!("client {:?} requested a second shell surface for {:?}", client, surface);
            self.outbox
                .post_error(client, Some(surface), ProtocolError::RoleAlreadyAssigned { surface });
            return None;
        }

        let shell_surface = self.allocate(Interface::ShellSurface, id, client)?;
        let surface_listener = self
            .registry
            .add_destroy_listener(surface, DestroyListener::ShellSurfaceOwner { shell_surface });
        self.shell_surfaces.insert(
            shell_surface,
            ShellSurface {
                surface,
                surface_listener,
                title: None,
                class: None,
            },
        );
        if let Some(state) = self.surfaces.get_mut(&surface) {
            state.shell_surface = Some(shell_surface);
        }
        debug!("{:?} is now the shell surface of {:?}", shell_surface, surface);
        Some(shell_surface)
    }

    pub fn shell_surface_request(&mut self, id: ResourceId, request: ShellSurfaceRequest) {
        if !self.is_target(id, Interface::ShellSurface) {
            return;
        }
        let Some(shell) = self.shell_surfaces.get_mut(&id) else {
            return;
        };
        match request {
            ShellSurfaceRequest::SetTitle { title } => {
                debug!("{:?} title: {}", id, title);
                shell.title = Some(title);
            }
            ShellSurfaceRequest::SetClass { class } => {
                debug!("{:?} class: {}", id, class);
                shell.class = Some(class);
            }
            other => debug!("{:?}: ignoring {:?}", id, other),
        }
    }

    pub(crate) fn shell_surface_destroyed(&mut self, id: ResourceId) {
        let Some(shell) = self.shell_surfaces.remove(&id) else {
            return;
        };
        self.registry.remove_destroy_listener(shell.surface_listener);
        if let Some(surface) = self.surfaces.get_mut(&shell.surface) {
            surface.shell_surface = None;
        }
    }
}

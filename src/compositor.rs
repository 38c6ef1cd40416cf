//! Core compositor state
//!
//! [`Compositor`] owns every piece of protocol state: the resource registry,
//! surfaces and buffers, the single output and the seat. Requests from the
//! transport and events from the toolkit are plain method calls; whatever the
//! clients should see ends up in the outbox.
//!
//! The request handlers live next to the state they touch (`surface.rs`,
//! `seat.rs`, `data_device.rs`, ...). This file holds construction, the
//! destroy-listener dispatch and client teardown.
//!
//! # Usage
//!
//! ```no_run
//! use tessera::{Compositor, HeadlessRenderer, TesseraConfig};
//! use tessera::resource::ClientId;
//!
//! let config = TesseraConfig::default();
//! let mut compositor = Compositor::new(config, HeadlessRenderer::new())?;
//! let surface = compositor.create_surface(ClientId(1), 3).expect("surface");
//! compositor.surface_commit(surface);
//! for message in compositor.take_messages() {
//!     println!("{:?}", message);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::config::TesseraConfig;
use crate::data_device::{DataOffer, DataSource};
use crate::error::ProtocolError;
use crate::events::{Event, Message, Outbox};
use crate::input::keymap::Keymap;
use crate::output::Output;
use crate::region::Region;
use crate::renderer::Renderer;
use crate::resource::{ClientId, Interface, ResourceId, ResourceRegistry, SerialCounter};
use crate::seat::Seat;
use crate::shell::ShellSurface;
use crate::surface::{Buffer, Surface};
use crate::xwayland::XwaylandSupervisor;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::HashMap;

/// First protocol id of objects created by the server side
const SERVER_ID_START: u32 = 0xff00_0000;

/// What to do when a watched resource is destroyed
///
/// Each variant is one weak reference held somewhere in the core; firing it
/// clears that reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyListener {
    /// On a buffer: a surface's pending slot refers to it
    PendingBuffer { surface: ResourceId },
    /// On a buffer: a surface's current slot refers to it
    CurrentBuffer { surface: ResourceId },
    /// On a surface: its shell surface goes with it
    ShellSurfaceOwner { shell_surface: ResourceId },
    PointerFocusSurface,
    PointerFocusResource,
    /// On the surface last hit-tested under the cursor
    PointerCurrent,
    CursorSprite,
    KeyboardFocusSurface,
    KeyboardFocusResource,
    KeyboardGrabResource,
    SelectionSource,
    DragSource,
    DragIcon,
    DragFocusSurface,
    DragFocusResource,
    /// On a data source: an offer's back-reference to it
    OfferSource { offer: ResourceId },
}

/// The input and surface-lifecycle core
pub struct Compositor<R: Renderer> {
    pub(crate) config: TesseraConfig,
    pub(crate) registry: ResourceRegistry<DestroyListener>,
    pub(crate) serials: SerialCounter,
    pub(crate) outbox: Outbox,
    pub(crate) renderer: R,

    pub(crate) surfaces: HashMap<ResourceId, Surface>,
    /// Live surfaces in creation order
    pub(crate) surface_list: Vec<ResourceId>,
    pub(crate) buffers: HashMap<ResourceId, Buffer>,
    pub(crate) regions: HashMap<ResourceId, Region>,
    pub(crate) shell_surfaces: HashMap<ResourceId, ShellSurface>,
    /// Committed frame callbacks waiting for the next paint, oldest first
    pub(crate) frame_callbacks: Vec<ResourceId>,

    pub(crate) sources: HashMap<ResourceId, DataSource>,
    pub(crate) offers: HashMap<ResourceId, DataOffer>,

    pub(crate) output: Output,
    pub(crate) seat: Seat,
    pub(crate) xwayland: XwaylandSupervisor,

    next_server_id: u32,
}

impl<R: Renderer> Compositor<R> {
    /// Creates a compositor, building the keymap from the configuration
    pub fn new(config: TesseraConfig, renderer: R) -> Result<Self> {
        config.validate()?;
        let keymap = Keymap::from_config(&config.keyboard).context("Failed to build keymap")?;
        Ok(Self::with_keymap(config, keymap, renderer))
    }

    /// Creates a compositor around an already built keymap
    pub fn with_keymap(config: TesseraConfig, keymap: Keymap, renderer: R) -> Self {
        info!(
            "🪟 Initializing core: output {}x{}, seat '{}'",
            config.output.width, config.output.height, config.seat.name
        );
        let output = Output::new(&config.output);
        let seat = Seat::new(&config.seat, keymap);
        let xwayland = XwaylandSupervisor::new(&config.xwayland);
        Self {
            config,
            registry: ResourceRegistry::new(),
            serials: SerialCounter::new(),
            outbox: Outbox::new(),
            renderer,
            surfaces: HashMap::new(),
            surface_list: Vec::new(),
            buffers: HashMap::new(),
            regions: HashMap::new(),
            shell_surfaces: HashMap::new(),
            frame_callbacks: Vec::new(),
            sources: HashMap::new(),
            offers: HashMap::new(),
            output,
            seat,
            xwayland,
            next_server_id: SERVER_ID_START,
        }
    }

    pub fn config(&self) -> &TesseraConfig {
        &self.config
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn registry(&self) -> &ResourceRegistry<DestroyListener> {
        &self.registry
    }

    pub fn seat(&self) -> &Seat {
        &self.seat
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    pub fn is_alive(&self, id: ResourceId) -> bool {
        self.registry.is_alive(id)
    }

    /// Most recently handed out serial
    pub fn last_serial(&self) -> u32 {
        self.serials.last()
    }

    /// Replaces the serial generator, e.g. to exercise wraparound
    pub fn set_serial_counter(&mut self, serials: SerialCounter) {
        self.serials = serials;
    }

    /// Drains every queued message, oldest first
    pub fn take_messages(&mut self) -> Vec<Message> {
        self.outbox.drain()
    }

    pub fn pending_messages(&self) -> usize {
        self.outbox.len()
    }

    pub(crate) fn next_serial(&mut self) -> u32 {
        self.serials.next_serial()
    }

    pub(crate) fn send(&mut self, target: ResourceId, event: Event) {
        self.outbox.send(target, event);
    }

    /// Queues a protocol error for the client owning `object`
    pub(crate) fn post_error(&mut self, object: ResourceId, error: ProtocolError) {
        match self.registry.client(object) {
            Some(client) => {
                warn!("protocol error for client {:?} on {:?}: {}", client, object, error);
                self.outbox.post_error(client, Some(object), error);
            }
            None => warn!("dropping protocol error for dead object {:?}: {}", object, error),
        }
    }

    /// Creates a resource, reporting allocation failure to the client
    pub(crate) fn allocate(
        &mut self,
        interface: Interface,
        protocol_id: u32,
        client: ClientId,
    ) -> Option<ResourceId> {
        match self.registry.create(interface, protocol_id, client) {
            Ok(id) => Some(id),
            Err(err) => {
                warn!("client {:?}: {}", client, err);
                self.outbox.post_error(client, None, err.into());
                None
            }
        }
    }

    /// Creates a resource whose protocol id is chosen by the server
    pub(crate) fn allocate_server_object(
        &mut self,
        interface: Interface,
        client: ClientId,
    ) -> Option<ResourceId> {
        let protocol_id = self.next_server_id;
        self.next_server_id = self.next_server_id.wrapping_add(1).max(SERVER_ID_START);
        self.allocate(interface, protocol_id, client)
    }

    /// True if `id` is a live request target of the given interface. Requests
    /// on anything else are a transport bug and only logged.
    pub(crate) fn is_target(&self, id: ResourceId, interface: Interface) -> bool {
        if self.registry.is_a(id, interface) {
            true
        } else {
            warn!("ignoring request on {:?}: not a live {:?}", id, interface);
            false
        }
    }

    /// Validates a request argument. A wrong or dead object is a protocol
    /// error for the client that sent the request on `requester`.
    pub(crate) fn check_argument(
        &mut self,
        requester: ResourceId,
        object: ResourceId,
        expected: Interface,
    ) -> bool {
        if self.registry.is_a(object, expected) {
            return true;
        }
        self.post_error(requester, ProtocolError::InvalidObject { object, expected });
        false
    }

    /// Destroys a resource: listeners first, in registration order, then the
    /// interface-specific teardown, then the slot itself.
    ///
    /// # Panics
    ///
    /// If `id` is already dead or being destroyed.
    pub fn destroy_resource(&mut self, id: ResourceId) {
        let interface = self.registry.interface(id);
        for listener in self.registry.begin_destroy(id) {
            self.on_destroyed(id, listener);
        }

        match interface {
            Some(Interface::Surface) => self.surface_destroyed(id),
            Some(Interface::Buffer) => {
                self.buffers.remove(&id);
            }
            Some(Interface::Callback) => self.callback_destroyed(id),
            Some(Interface::Region) => {
                self.regions.remove(&id);
            }
            Some(Interface::ShellSurface) => self.shell_surface_destroyed(id),
            Some(Interface::Output) => self.output.resources.retain(|r| *r != id),
            Some(Interface::Seat) => self.seat.resources.retain(|r| *r != id),
            Some(Interface::Pointer) => self.seat.pointer.resources.retain(|r| *r != id),
            Some(Interface::Keyboard) => self.seat.keyboard.resources.retain(|r| *r != id),
            Some(Interface::DataDevice) => self.seat.data.devices.retain(|r| *r != id),
            Some(Interface::DataSource) => {
                self.sources.remove(&id);
            }
            Some(Interface::DataOffer) => self.offer_destroyed(id),
            None => {}
        }

        self.registry.finish_destroy(id);
        debug!("destroyed {:?} ({:?})", id, interface);

        if interface == Some(Interface::Surface) {
            // the surface can no longer be a hit target or focus
            self.repick();
        }
    }

    fn on_destroyed(&mut self, id: ResourceId, listener: DestroyListener) {
        match listener {
            DestroyListener::PendingBuffer { surface } => {
                if let Some(surface) = self.surfaces.get_mut(&surface) {
                    surface.pending_buffer_destroyed(id);
                }
            }
            DestroyListener::CurrentBuffer { surface } => {
                if let Some(surface) = self.surfaces.get_mut(&surface) {
                    surface.current_buffer_destroyed(id);
                }
            }
            DestroyListener::ShellSurfaceOwner { shell_surface } => {
                if self.registry.get(shell_surface).map_or(false, |e| !e.is_destroying()) {
                    self.destroy_resource(shell_surface);
                }
            }
            DestroyListener::PointerFocusSurface => self.pointer_focus_surface_destroyed(),
            DestroyListener::PointerFocusResource => self.seat.pointer.focus_resource_destroyed(),
            DestroyListener::PointerCurrent => self.seat.pointer.current_destroyed(),
            DestroyListener::CursorSprite => self.seat.pointer.sprite_destroyed(),
            DestroyListener::KeyboardFocusSurface => self.keyboard_focus_surface_destroyed(),
            DestroyListener::KeyboardFocusResource => self.seat.keyboard.focus_resource_destroyed(),
            DestroyListener::KeyboardGrabResource => self.keyboard_grab_resource_destroyed(),
            DestroyListener::SelectionSource => self.selection_source_destroyed(),
            DestroyListener::DragSource => self.drag_source_destroyed(),
            DestroyListener::DragIcon => self.drag_icon_destroyed(),
            DestroyListener::DragFocusSurface => self.drag_focus_surface_destroyed(),
            DestroyListener::DragFocusResource => self.drag_focus_resource_destroyed(),
            DestroyListener::OfferSource { offer } => {
                if let Some(offer) = self.offers.get_mut(&offer) {
                    offer.source_destroyed();
                }
            }
        }
    }

    /// Tears down everything a disconnected client owned, oldest first
    pub fn client_disconnected(&mut self, client: ClientId) {
        let owned = self.registry.resources_of(client);
        info!("👋 Client {:?} disconnected, destroying {} resources", client, owned.len());
        for id in owned {
            // earlier destructions may have taken dependants with them
            if self.registry.get(id).map_or(false, |e| !e.is_destroying()) {
                self.destroy_resource(id);
            }
        }
    }
}

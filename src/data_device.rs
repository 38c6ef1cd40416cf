//! Clipboard selection and drag-and-drop
//!
//! # Protocol Flow
//!
//! ## Copy/Paste:
//! 1. Client creates a data source and lists its MIME types
//! 2. Client calls `set_selection` on its data device
//! 3. The keyboard-focused client's data device gets a fresh data offer
//! 4. That client asks the offer to `receive`; the source is told to `send`
//!    into the client's file descriptor
//!
//! ## Drag and Drop:
//! 1. While a button is held, a client calls `start_drag`
//! 2. The pointer switches to the drag grab
//! 3. Surfaces under the cursor get enter/motion/leave on their data device
//! 4. Releasing the initiating button drops; releasing the last button ends
//!    the drag
//!
//! Offers never own their source. When a source dies its offers stay alive
//! but inert: `accept` does nothing and `receive` just closes the descriptor.

use crate::compositor::{Compositor, DestroyListener};
use crate::error::ProtocolError;
use crate::events::{ButtonState, Event, TransferFd};
use crate::input::pointer::{GrabFocus, GrabKind};
use crate::renderer::Renderer;
use crate::resource::{serial_is_newer, ClientId, Interface, ListenerToken, ResourceId};
use log::{debug, info, warn};
use std::os::fd::OwnedFd;

/// Common MIME types for clipboard
pub mod mime_types {
    pub const TEXT_PLAIN: &str = "text/plain";
    pub const TEXT_PLAIN_UTF8: &str = "text/plain;charset=utf-8";
    pub const IMAGE_PNG: &str = "image/png";
}

/// Represents a data source (the "copy" side)
#[derive(Debug, Default)]
pub struct DataSource {
    mime_types: Vec<String>,
}

impl DataSource {
    pub fn mime_types(&self) -> &[String] {
        &self.mime_types
    }

    /// Checks if this source offers a specific MIME type
    pub fn offers(&self, mime_type: &str) -> bool {
        self.mime_types.iter().any(|t| t == mime_type)
    }
}

/// Represents a data offer (the "paste" side)
#[derive(Debug)]
pub struct DataOffer {
    source: Option<ResourceId>,
    source_listener: Option<ListenerToken>,
}

impl DataOffer {
    /// Source backing this offer, until it is destroyed
    pub fn source(&self) -> Option<ResourceId> {
        self.source
    }

    pub(crate) fn source_destroyed(&mut self) {
        self.source = None;
        self.source_listener = None;
    }
}

/// Drag and drop operation
#[derive(Debug)]
pub struct DragSession {
    client: ClientId,
    source: Option<(ResourceId, ListenerToken)>,
    icon: Option<(ResourceId, ListenerToken)>,
    focus: Option<ResourceId>,
    focus_resource: Option<ResourceId>,
    focus_surface_listener: Option<ListenerToken>,
    focus_resource_listener: Option<ListenerToken>,
}

impl DragSession {
    /// Client that started the drag
    pub fn client(&self) -> ClientId {
        self.client
    }

    pub fn source(&self) -> Option<ResourceId> {
        self.source.map(|(source, _)| source)
    }

    pub fn icon(&self) -> Option<ResourceId> {
        self.icon.map(|(icon, _)| icon)
    }

    /// Surface currently entered
    pub fn focus(&self) -> Option<ResourceId> {
        self.focus
    }

    /// Data device that received the last enter
    pub fn focus_resource(&self) -> Option<ResourceId> {
        self.focus_resource
    }
}

/// Per-seat selection and drag bookkeeping
#[derive(Debug, Default)]
pub struct DataDeviceState {
    pub(crate) devices: Vec<ResourceId>,
    selection: Option<ResourceId>,
    selection_listener: Option<ListenerToken>,
    selection_serial: u32,
    drag: Option<DragSession>,
}

impl DataDeviceState {
    pub fn devices(&self) -> &[ResourceId] {
        &self.devices
    }

    /// Source of the current selection
    pub fn selection(&self) -> Option<ResourceId> {
        self.selection
    }

    pub fn selection_serial(&self) -> u32 {
        self.selection_serial
    }

    pub fn drag(&self) -> Option<&DragSession> {
        self.drag.as_ref()
    }
}

impl<R: Renderer> Compositor<R> {
    pub fn data_source(&self, id: ResourceId) -> Option<&DataSource> {
        self.sources.get(&id)
    }

    pub fn data_offer(&self, id: ResourceId) -> Option<&DataOffer> {
        self.offers.get(&id)
    }

    /// `wl_data_device_manager.create_data_source`
    pub fn create_data_source(&mut self, client: ClientId, id: u32) -> Option<ResourceId> {
        let source = self.allocate(Interface::DataSource, id, client)?;
        self.sources.insert(source, DataSource::default());
        Some(source)
    }

    /// `wl_data_source.offer`
    pub fn data_source_offer(&mut self, source: ResourceId, mime_type: &str) {
        if !self.is_target(source, Interface::DataSource) {
            return;
        }
        let Some(state) = self.sources.get_mut(&source) else {
            return;
        };
        if state.mime_types.try_reserve(1).is_err() {
            self.post_error(source, ProtocolError::NoMemory);
            return;
        }
        state.mime_types.push(mime_type.to_string());
    }

    /// `wl_data_device_manager.get_data_device`
    pub fn get_data_device(&mut self, client: ClientId, id: u32, seat: ResourceId) -> Option<ResourceId> {
        if !self.registry.is_a(seat, Interface::Seat) {
            self.outbox.post_error(
                client,
                Some(seat),
                ProtocolError::InvalidObject {
                    object: seat,
                    expected: Interface::Seat,
                },
            );
            return None;
        }
        let device = self.allocate(Interface::DataDevice, id, client)?;
        self.seat.data.devices.insert(0, device);

        let focused_client = self
            .seat
            .keyboard
            .focus_resource()
            .and_then(|r| self.registry.client(r));
        if focused_client == Some(client) {
            self.data_device_set_keyboard_focus();
        }
        Some(device)
    }

    /// Data device of the client owning `resource`
    fn data_device_for(&self, resource: ResourceId) -> Option<ResourceId> {
        let client = self.registry.client(resource)?;
        self.registry.find(&self.seat.data.devices, client)
    }

    /// Creates an offer for `source` on `device` and lists the MIME types on it
    fn send_offer(&mut self, source: ResourceId, device: ResourceId) -> Option<ResourceId> {
        let client = self.registry.client(device)?;
        let mime_types = self.sources.get(&source)?.mime_types.clone();
        let offer = self.allocate_server_object(Interface::DataOffer, client)?;

        let listener = self
            .registry
            .add_destroy_listener(source, DestroyListener::OfferSource { offer });
        self.offers.insert(
            offer,
            DataOffer {
                source: Some(source),
                source_listener: Some(listener),
            },
        );

        self.send(device, Event::DataDeviceDataOffer { offer });
        for mime_type in mime_types {
            self.send(offer, Event::DataOfferOffer { mime_type });
        }
        Some(offer)
    }

    pub(crate) fn offer_destroyed(&mut self, offer: ResourceId) {
        if let Some(offer) = self.offers.remove(&offer) {
            if let Some(token) = offer.source_listener {
                self.registry.remove_destroy_listener(token);
            }
        }
    }

    /// `wl_data_offer.accept`: forwarded to the source as `target`
    pub fn data_offer_accept(&mut self, offer: ResourceId, _serial: u32, mime_type: Option<String>) {
        if !self.is_target(offer, Interface::DataOffer) {
            return;
        }
        if let Some(source) = self.offers.get(&offer).and_then(DataOffer::source) {
            self.send(source, Event::DataSourceTarget { mime_type });
        }
    }

    /// `wl_data_offer.receive`: hands `fd` to the source, or closes it if
    /// the source is gone
    pub fn data_offer_receive(&mut self, offer: ResourceId, mime_type: String, fd: OwnedFd) {
        if !self.is_target(offer, Interface::DataOffer) {
            return;
        }
        match self.offers.get(&offer).and_then(DataOffer::source) {
            Some(source) => self.send(
                source,
                Event::DataSourceSend {
                    mime_type,
                    fd: TransferFd(fd),
                },
            ),
            None => debug!("receive on inert offer {:?}, closing fd", offer),
        }
    }

    /// `wl_data_device.set_selection`
    pub fn data_device_set_selection(&mut self, device: ResourceId, source: Option<ResourceId>, serial: u32) {
        if !self.is_target(device, Interface::DataDevice) {
            return;
        }
        if let Some(source) = source {
            if !self.check_argument(device, source, Interface::DataSource) {
                return;
            }
        }
        self.set_selection(source, serial);
    }

    /// Replaces the selection unless the current one carries a newer serial
    pub fn set_selection(&mut self, source: Option<ResourceId>, serial: u32) {
        let data = &mut self.seat.data;
        if let Some(current) = data.selection {
            if serial_is_newer(data.selection_serial, serial) {
                debug!(
                    "stale selection serial {} (current {}) ignored",
                    serial, data.selection_serial
                );
                return;
            }
            if let Some(token) = data.selection_listener.take() {
                self.registry.remove_destroy_listener(token);
            }
            if source != Some(current) {
                self.send(current, Event::DataSourceCancelled);
            }
        }

        self.seat.data.selection = source;
        self.seat.data.selection_serial = serial;
        info!("📋 Selection set to {:?} (serial {})", source, serial);

        let device = self
            .seat
            .keyboard
            .focus_resource()
            .and_then(|focus| self.data_device_for(focus));
        if let Some(device) = device {
            let offer = source.and_then(|source| self.send_offer(source, device));
            self.send(device, Event::DataDeviceSelection { offer });
        }

        if let Some(source) = source {
            self.seat.data.selection_listener = Some(
                self.registry
                    .add_destroy_listener(source, DestroyListener::SelectionSource),
            );
        }
    }

    pub(crate) fn selection_source_destroyed(&mut self) {
        self.seat.data.selection = None;
        self.seat.data.selection_listener = None;

        let device = self
            .seat
            .keyboard
            .focus_resource()
            .and_then(|focus| self.data_device_for(focus));
        if let Some(device) = device {
            self.send(device, Event::DataDeviceSelection { offer: None });
        }
    }

    /// Offers the current selection to the newly keyboard-focused client
    pub(crate) fn data_device_set_keyboard_focus(&mut self) {
        let Some(focus) = self.seat.keyboard.focus_resource() else {
            return;
        };
        let Some(device) = self.data_device_for(focus) else {
            return;
        };
        if let Some(source) = self.seat.data.selection {
            let offer = self.send_offer(source, device);
            self.send(device, Event::DataDeviceSelection { offer });
        }
    }

    /// `wl_data_device.start_drag`
    ///
    /// Only honoured while a button is held and `serial` is the serial of the
    /// press that started it.
    pub fn data_device_start_drag(
        &mut self,
        device: ResourceId,
        source: Option<ResourceId>,
        origin: ResourceId,
        icon: Option<ResourceId>,
        serial: u32,
    ) {
        if !self.is_target(device, Interface::DataDevice) {
            return;
        }
        if !self.check_argument(device, origin, Interface::Surface) {
            return;
        }
        if let Some(source) = source {
            if !self.check_argument(device, source, Interface::DataSource) {
                return;
            }
        }
        if let Some(icon) = icon {
            if !self.check_argument(device, icon, Interface::Surface) {
                return;
            }
        }

        if self.seat.data.drag.is_some() {
            warn!("start_drag while a drag is already running");
            return;
        }
        let pointer = &self.seat.pointer;
        if pointer.button_count() == 0 || pointer.grab_serial() != serial {
            debug!(
                "start_drag with serial {} rejected (grab serial {}, {} buttons)",
                serial,
                pointer.grab_serial(),
                pointer.button_count()
            );
            return;
        }
        let Some(client) = self.registry.client(device) else {
            return;
        };

        let source = source.map(|s| (s, self.registry.add_destroy_listener(s, DestroyListener::DragSource)));
        let icon = icon.map(|i| (i, self.registry.add_destroy_listener(i, DestroyListener::DragIcon)));
        self.seat.data.drag = Some(DragSession {
            client,
            source,
            icon,
            focus: None,
            focus_resource: None,
            focus_surface_listener: None,
            focus_resource_listener: None,
        });
        info!("🖱️ Drag started by client {:?} from {:?}", client, origin);

        self.pointer_set_focus(None, 0.0, 0.0);
        self.pointer_start_grab(GrabKind::Drag);
    }

    /// Drag grab focus: leave the old target, enter the new one
    pub(crate) fn drag_grab_focus(&mut self, surface: Option<ResourceId>, x: f64, y: f64) {
        let Some(drag) = self.seat.data.drag.as_mut() else {
            return;
        };
        let old_resource = drag.focus_resource.take();
        let tokens = [drag.focus_surface_listener.take(), drag.focus_resource_listener.take()];
        drag.focus = None;
        let drag_client = drag.client;
        let drag_source = drag.source();
        self.seat.pointer.drag_grab.focus = None;

        if let Some(resource) = old_resource {
            self.send(resource, Event::DataDeviceLeave);
        }
        for token in tokens.into_iter().flatten() {
            self.registry.remove_destroy_listener(token);
        }

        let Some(surface) = surface else {
            return;
        };
        if drag_source.is_none() && self.registry.client(surface) != Some(drag_client) {
            return;
        }
        let Some(device) = self.data_device_for(surface) else {
            return;
        };

        let serial = self.next_serial();
        let offer = drag_source.and_then(|source| self.send_offer(source, device));
        self.send(
            device,
            Event::DataDeviceEnter {
                serial,
                surface,
                x,
                y,
                offer,
            },
        );

        let surface_listener = self
            .registry
            .add_destroy_listener(surface, DestroyListener::DragFocusSurface);
        let resource_listener = self
            .registry
            .add_destroy_listener(device, DestroyListener::DragFocusResource);
        if let Some(drag) = self.seat.data.drag.as_mut() {
            drag.focus = Some(surface);
            drag.focus_resource = Some(device);
            drag.focus_surface_listener = Some(surface_listener);
            drag.focus_resource_listener = Some(resource_listener);
        }
        self.seat.pointer.drag_grab.focus = Some(surface);
    }

    pub(crate) fn drag_grab_motion(&mut self, time: u32) {
        let Some(resource) = self.seat.data.drag.as_ref().and_then(|d| d.focus_resource) else {
            return;
        };
        let GrabFocus { x, y, .. } = self.seat.pointer.drag_grab;
        self.send(resource, Event::DataDeviceMotion { time, x, y });
    }

    pub(crate) fn drag_grab_button(&mut self, button: u32, state: ButtonState) {
        if state != ButtonState::Released {
            return;
        }
        let target = self.seat.data.drag.as_ref().and_then(|d| d.focus_resource);
        if let Some(resource) = target {
            if self.seat.pointer.grab_button() == button {
                self.send(resource, Event::DataDeviceDrop);
            }
        }
        if self.seat.pointer.button_count() == 0 {
            self.end_drag();
        }
    }

    /// Finishes the drag: leave the target, restore the default grab, drop
    /// every listener. Does nothing when no drag is running.
    pub fn end_drag(&mut self) {
        if self.seat.data.drag.is_none() {
            return;
        }
        self.drag_grab_focus(None, 0.0, 0.0);

        if let Some(drag) = self.seat.data.drag.take() {
            for (_, token) in drag.icon.into_iter().chain(drag.source) {
                self.registry.remove_destroy_listener(token);
            }
            debug!("drag by client {:?} ended", drag.client);
        }
        self.seat.pointer.drag_grab = GrabFocus::default();
        if self.seat.pointer.grab() == GrabKind::Drag {
            self.pointer_end_grab();
        }
    }

    pub(crate) fn drag_source_destroyed(&mut self) {
        self.end_drag();
    }

    pub(crate) fn drag_icon_destroyed(&mut self) {
        self.end_drag();
    }

    pub(crate) fn drag_focus_surface_destroyed(&mut self) {
        let Some(drag) = self.seat.data.drag.as_mut() else {
            return;
        };
        drag.focus = None;
        drag.focus_surface_listener = None;
        let resource = drag.focus_resource.take();
        let token = drag.focus_resource_listener.take();
        self.seat.pointer.drag_grab.focus = None;

        if let Some(resource) = resource {
            self.send(resource, Event::DataDeviceLeave);
        }
        if let Some(token) = token {
            self.registry.remove_destroy_listener(token);
        }
    }

    pub(crate) fn drag_focus_resource_destroyed(&mut self) {
        if let Some(drag) = self.seat.data.drag.as_mut() {
            drag.focus_resource = None;
            drag.focus_resource_listener = None;
        }
    }
}

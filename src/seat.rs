//! The seat global: one pointer, one keyboard and the data device state

use crate::compositor::Compositor;
use crate::config::SeatConfig;
use crate::data_device::DataDeviceState;
use crate::events::{Event, SEAT_CAPABILITY_KEYBOARD, SEAT_CAPABILITY_POINTER};
use crate::input::keyboard::Keyboard;
use crate::input::keymap::Keymap;
use crate::input::pointer::Pointer;
use crate::input::InputEvent;
use crate::renderer::Renderer;
use crate::resource::{ClientId, Interface, ResourceId};
use log::debug;

#[derive(Debug)]
pub struct Seat {
    name: String,
    pub(crate) resources: Vec<ResourceId>,
    pub pointer: Pointer,
    pub keyboard: Keyboard,
    pub(crate) data: DataDeviceState,
}

impl Seat {
    pub fn new(config: &SeatConfig, keymap: Keymap) -> Self {
        Self {
            name: config.name.clone(),
            resources: Vec::new(),
            pointer: Pointer::new(config.default_hotspot),
            keyboard: Keyboard::new(keymap),
            data: DataDeviceState::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resources(&self) -> &[ResourceId] {
        &self.resources
    }

    pub fn data_device(&self) -> &DataDeviceState {
        &self.data
    }
}

impl<R: Renderer> Compositor<R> {
    /// Binds `wl_seat` and advertises pointer and keyboard
    pub fn bind_seat(&mut self, client: ClientId, id: u32) -> Option<ResourceId> {
        let resource = self.allocate(Interface::Seat, id, client)?;
        self.seat.resources.insert(0, resource);
        self.send(
            resource,
            Event::SeatCapabilities {
                capabilities: SEAT_CAPABILITY_POINTER | SEAT_CAPABILITY_KEYBOARD,
            },
        );
        debug!("client {:?} bound seat '{}'", client, self.seat.name);
        Some(resource)
    }

    /// `wl_seat.get_pointer`; a focused client immediately gets enter on it
    pub fn get_pointer(&mut self, seat: ResourceId, id: u32) -> Option<ResourceId> {
        if !self.is_target(seat, Interface::Seat) {
            return None;
        }
        let client = self.registry.client(seat)?;
        let pointer = self.allocate(Interface::Pointer, id, client)?;
        // newest first, so it wins the per-client lookup
        self.seat.pointer.resources.insert(0, pointer);

        if let Some(focus) = self.seat.pointer.focus() {
            if self.registry.client(focus) == Some(client) {
                let (x, y) = self.seat.pointer.position();
                let (sx, sy) = self.renderer.transform_to_local(focus, x, y);
                self.pointer_set_focus(Some(focus), sx, sy);
            }
        }
        Some(pointer)
    }

    /// `wl_seat.get_keyboard`: keymap first, then focus if the client has it
    pub fn get_keyboard(&mut self, seat: ResourceId, id: u32) -> Option<ResourceId> {
        if !self.is_target(seat, Interface::Seat) {
            return None;
        }
        let client = self.registry.client(seat)?;
        let keyboard = self.allocate(Interface::Keyboard, id, client)?;
        self.seat.keyboard.resources.insert(0, keyboard);
        self.send_keymap(keyboard);

        if let Some(focus) = self.seat.keyboard.focus() {
            if self.registry.client(focus) == Some(client) {
                self.keyboard_set_focus(Some(focus));
            }
        }
        Some(keyboard)
    }

    /// `wl_seat.get_touch`; touch is not supported and no object is created
    pub fn get_touch(&mut self, seat: ResourceId, _id: u32) {
        if self.is_target(seat, Interface::Seat) {
            debug!("get_touch on {:?} ignored", seat);
        }
    }

    /// Feeds one toolkit input event through the seat
    pub fn handle_input(&mut self, event: InputEvent) {
        match event {
            InputEvent::Motion { time, x, y } => self.notify_motion(time, x, y),
            InputEvent::Button {
                time,
                x,
                y,
                button,
                pressed,
            } => self.notify_button(time, x, y, button, pressed),
            InputEvent::Key {
                time,
                keycode,
                pressed,
                modifiers,
            } => self.notify_key(time, keycode, pressed, modifiers),
        }
    }
}

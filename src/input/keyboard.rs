//! Keyboard focus, held keys and modifier state

use crate::compositor::{Compositor, DestroyListener};
use crate::events::{Event, KeyState, KEYMAP_FORMAT_XKB_V1};
use crate::input::keymap::{Keymap, ModifierState};
use crate::input::ModifierFlags;
use crate::renderer::Renderer;
use crate::resource::{Interface, ListenerToken, ResourceId};
use log::{debug, warn};

/// Who receives key events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyboardGrab {
    /// The focused client's keyboard resource
    Default,
    /// One keyboard resource, regardless of focus
    Exclusive {
        resource: ResourceId,
        listener: ListenerToken,
    },
}

#[derive(Debug)]
pub struct Keyboard {
    pub(crate) resources: Vec<ResourceId>,

    focus: Option<ResourceId>,
    focus_resource: Option<ResourceId>,
    focus_serial: u32,
    focus_surface_listener: Option<ListenerToken>,
    focus_resource_listener: Option<ListenerToken>,

    grab: KeyboardGrab,
    /// Held keys; order is what enter reports
    keys: Vec<u32>,
    modifiers: ModifierState,

    keymap: Keymap,
}

impl Keyboard {
    pub(crate) fn new(keymap: Keymap) -> Self {
        Self {
            resources: Vec::new(),
            focus: None,
            focus_resource: None,
            focus_serial: 0,
            focus_surface_listener: None,
            focus_resource_listener: None,
            grab: KeyboardGrab::Default,
            keys: Vec::new(),
            modifiers: ModifierState::default(),
            keymap,
        }
    }

    pub fn resources(&self) -> &[ResourceId] {
        &self.resources
    }

    pub fn focus(&self) -> Option<ResourceId> {
        self.focus
    }

    pub fn focus_resource(&self) -> Option<ResourceId> {
        self.focus_resource
    }

    pub fn focus_serial(&self) -> u32 {
        self.focus_serial
    }

    pub fn keys(&self) -> &[u32] {
        &self.keys
    }

    pub fn modifiers(&self) -> ModifierState {
        self.modifiers
    }

    pub fn grab(&self) -> KeyboardGrab {
        self.grab
    }

    pub fn keymap(&self) -> &Keymap {
        &self.keymap
    }

    pub(crate) fn focus_resource_destroyed(&mut self) {
        self.focus_resource = None;
        self.focus_resource_listener = None;
    }

    fn modifiers_event(&self, serial: u32) -> Event {
        Event::KeyboardModifiers {
            serial,
            depressed: self.modifiers.depressed,
            latched: self.modifiers.latched,
            locked: self.modifiers.locked,
            group: self.modifiers.group,
        }
    }
}

impl<R: Renderer> Compositor<R> {
    /// Sends the shared keymap to a freshly bound keyboard resource
    pub(crate) fn send_keymap(&mut self, keyboard: ResourceId) {
        let keymap = self.seat.keyboard.keymap();
        let event = Event::KeyboardKeymap {
            format: KEYMAP_FORMAT_XKB_V1,
            fd: keymap.raw_fd(),
            size: keymap.size(),
        };
        self.send(keyboard, event);
    }

    /// Key pressed or released
    pub fn notify_key(&mut self, time: u32, key: u32, pressed: bool, flags: ModifierFlags) {
        let keys = &mut self.seat.keyboard.keys;
        if pressed {
            if keys.contains(&key) {
                // autorepeat
                return;
            }
            keys.push(key);
        } else if let Some(position) = keys.iter().position(|k| *k == key) {
            keys.swap_remove(position);
        } else {
            warn!("unexpected key release event for key {:#x}", key);
        }

        let serial = self.next_serial();
        let state = self.seat.keyboard.keymap.modifier_indices().state_for(flags);
        if state != self.seat.keyboard.modifiers {
            self.seat.keyboard.modifiers = state;
            self.grab_modifiers(serial);
        }

        let state = if pressed {
            KeyState::Pressed
        } else {
            KeyState::Released
        };
        self.grab_key(time, key, state);
    }

    fn grab_key(&mut self, time: u32, key: u32, state: KeyState) {
        let target = match self.seat.keyboard.grab {
            KeyboardGrab::Default => self.seat.keyboard.focus_resource,
            KeyboardGrab::Exclusive { resource, .. } => Some(resource),
        };
        if let Some(resource) = target {
            let serial = self.next_serial();
            self.send(
                resource,
                Event::KeyboardKey {
                    serial,
                    time,
                    key,
                    state,
                },
            );
        }
    }

    fn grab_modifiers(&mut self, serial: u32) {
        let event = self.seat.keyboard.modifiers_event(serial);
        match self.seat.keyboard.grab {
            KeyboardGrab::Exclusive { resource, .. } => self.send(resource, event),
            KeyboardGrab::Default => {
                let Some(resource) = self.seat.keyboard.focus_resource else {
                    return;
                };
                self.send(resource, event);

                // the client under the pointer tracks modifiers too, e.g. for ctrl-click
                let pointer_focus = self.seat.pointer.focus();
                if pointer_focus.is_some() && pointer_focus != self.seat.keyboard.focus {
                    let other = pointer_focus
                        .and_then(|s| self.registry.client(s))
                        .and_then(|client| self.registry.find(&self.seat.keyboard.resources, client));
                    if let Some(other) = other.filter(|r| *r != resource) {
                        let event = self.seat.keyboard.modifiers_event(serial);
                        self.send(other, event);
                    }
                }
            }
        }
    }

    /// Moves keyboard focus. The new client gets enter with the held keys,
    /// then the current modifiers, then the selection.
    pub fn keyboard_set_focus(&mut self, surface: Option<ResourceId>) {
        let old_focus = self.seat.keyboard.focus;
        let old_resource = self.seat.keyboard.focus_resource;

        if let (Some(resource), Some(old)) = (old_resource, old_focus) {
            if old_focus != surface {
                let serial = self.next_serial();
                self.send(resource, Event::KeyboardLeave { serial, surface: old });
            }
        }

        let resource = surface
            .and_then(|s| self.registry.client(s))
            .and_then(|client| self.registry.find(&self.seat.keyboard.resources, client));

        if let (Some(resource), Some(surface)) = (resource, surface) {
            if old_focus != Some(surface) || old_resource != Some(resource) {
                let serial = self.next_serial();
                let keys = self.seat.keyboard.keys.clone();
                self.send(resource, Event::KeyboardEnter { serial, surface, keys });
                let modifiers = self.seat.keyboard.modifiers_event(serial);
                self.send(resource, modifiers);
                self.seat.keyboard.focus_serial = serial;
            }
        }

        if old_resource != resource {
            if let Some(token) = self.seat.keyboard.focus_resource_listener.take() {
                self.registry.remove_destroy_listener(token);
            }
            self.seat.keyboard.focus_resource_listener = resource.map(|r| {
                self.registry
                    .add_destroy_listener(r, DestroyListener::KeyboardFocusResource)
            });
        }
        if old_focus != surface {
            if let Some(token) = self.seat.keyboard.focus_surface_listener.take() {
                self.registry.remove_destroy_listener(token);
            }
            self.seat.keyboard.focus_surface_listener = surface.map(|s| {
                self.registry
                    .add_destroy_listener(s, DestroyListener::KeyboardFocusSurface)
            });
            debug!("keyboard focus {:?} -> {:?}", old_focus, surface);
        }

        self.seat.keyboard.focus = surface;
        self.seat.keyboard.focus_resource = resource;

        self.data_device_set_keyboard_focus();
    }

    pub(crate) fn keyboard_focus_surface_destroyed(&mut self) {
        let keyboard = &mut self.seat.keyboard;
        keyboard.focus = None;
        keyboard.focus_surface_listener = None;
        if let Some(token) = keyboard.focus_resource_listener.take() {
            self.registry.remove_destroy_listener(token);
        }
        self.seat.keyboard.focus_resource = None;
    }

    /// Routes all key events to `resource` until the grab ends or the
    /// resource goes away
    pub fn keyboard_start_grab(&mut self, resource: ResourceId) {
        if !self.is_target(resource, Interface::Keyboard) {
            return;
        }
        self.keyboard_end_grab();
        let listener = self
            .registry
            .add_destroy_listener(resource, DestroyListener::KeyboardGrabResource);
        self.seat.keyboard.grab = KeyboardGrab::Exclusive { resource, listener };
        debug!("keyboard grabbed by {:?}", resource);
    }

    pub fn keyboard_end_grab(&mut self) {
        if let KeyboardGrab::Exclusive { listener, .. } =
            std::mem::replace(&mut self.seat.keyboard.grab, KeyboardGrab::Default)
        {
            self.registry.remove_destroy_listener(listener);
        }
    }

    pub(crate) fn keyboard_grab_resource_destroyed(&mut self) {
        self.seat.keyboard.grab = KeyboardGrab::Default;
    }
}

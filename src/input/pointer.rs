//! Pointer focus, grabs and button accounting
//!
//! Three surfaces matter to the pointer:
//!
//! - `current`: whatever the renderer reports under the cursor, updated on
//!   every repick
//! - `focus`: the surface whose client receives pointer events
//! - the active grab's focus, which is `focus` for the default grab and the
//!   drag target while a drag is running
//!
//! All routing goes through the active grab. The default grab follows
//! `current` whenever no button is held, which gives the implicit grab on
//! button press.

use crate::compositor::{Compositor, DestroyListener};
use crate::events::{ButtonState, Event};
use crate::input::MouseButton;
use crate::renderer::Renderer;
use crate::resource::{Interface, ListenerToken, ResourceId};
use log::{debug, warn};

/// Which grab currently routes pointer events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrabKind {
    /// Deliver to the focused client, follow the cursor when no button is held
    Default,
    /// Drag-and-drop session
    Drag,
}

/// Focus of a grab and the cursor position local to it
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GrabFocus {
    pub focus: Option<ResourceId>,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug)]
pub struct Pointer {
    pub(crate) resources: Vec<ResourceId>,

    focus: Option<ResourceId>,
    focus_resource: Option<ResourceId>,
    focus_serial: u32,
    focus_surface_listener: Option<ListenerToken>,
    focus_resource_listener: Option<ListenerToken>,

    current: Option<ResourceId>,
    current_listener: Option<ListenerToken>,
    current_x: f64,
    current_y: f64,

    x: f64,
    y: f64,

    button_count: u32,
    grab_button: u32,
    grab_time: u32,
    grab_x: f64,
    grab_y: f64,
    grab_serial: u32,

    grab: GrabKind,
    default_grab: GrabFocus,
    pub(crate) drag_grab: GrabFocus,

    sprite: Option<(ResourceId, ListenerToken)>,
    hotspot: (i32, i32),
}

impl Pointer {
    pub(crate) fn new(default_hotspot: (i32, i32)) -> Self {
        Self {
            resources: Vec::new(),
            focus: None,
            focus_resource: None,
            focus_serial: 0,
            focus_surface_listener: None,
            focus_resource_listener: None,
            current: None,
            current_listener: None,
            current_x: 0.0,
            current_y: 0.0,
            x: 0.0,
            y: 0.0,
            button_count: 0,
            grab_button: 0,
            grab_time: 0,
            grab_x: 0.0,
            grab_y: 0.0,
            grab_serial: 0,
            grab: GrabKind::Default,
            default_grab: GrabFocus::default(),
            drag_grab: GrabFocus::default(),
            sprite: None,
            hotspot: default_hotspot,
        }
    }

    pub fn resources(&self) -> &[ResourceId] {
        &self.resources
    }

    /// Surface receiving pointer events
    pub fn focus(&self) -> Option<ResourceId> {
        self.focus
    }

    /// Pointer resource of the focused client, if it bound one
    pub fn focus_resource(&self) -> Option<ResourceId> {
        self.focus_resource
    }

    /// Serial of the last enter event
    pub fn focus_serial(&self) -> u32 {
        self.focus_serial
    }

    /// Surface under the cursor as of the last repick
    pub fn current(&self) -> Option<ResourceId> {
        self.current
    }

    /// `current`-local cursor position
    pub fn current_position(&self) -> (f64, f64) {
        (self.current_x, self.current_y)
    }

    /// Global cursor position
    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    pub fn button_count(&self) -> u32 {
        self.button_count
    }

    /// Button that started the current press sequence
    pub fn grab_button(&self) -> u32 {
        self.grab_button
    }

    pub fn grab_time(&self) -> u32 {
        self.grab_time
    }

    /// Global position where the current press sequence started
    pub fn grab_position(&self) -> (f64, f64) {
        (self.grab_x, self.grab_y)
    }

    /// Serial of the press that started the current sequence
    pub fn grab_serial(&self) -> u32 {
        self.grab_serial
    }

    pub fn grab(&self) -> GrabKind {
        self.grab
    }

    /// Focus of the active grab
    pub fn grab_focus(&self) -> GrabFocus {
        match self.grab {
            GrabKind::Default => self.default_grab,
            GrabKind::Drag => self.drag_grab,
        }
    }

    fn active_grab_mut(&mut self) -> &mut GrabFocus {
        match self.grab {
            GrabKind::Default => &mut self.default_grab,
            GrabKind::Drag => &mut self.drag_grab,
        }
    }

    /// Cursor sprite surface set by the focused client
    pub fn sprite(&self) -> Option<ResourceId> {
        self.sprite.map(|(surface, _)| surface)
    }

    pub fn hotspot(&self) -> (i32, i32) {
        self.hotspot
    }

    pub(crate) fn focus_resource_destroyed(&mut self) {
        self.focus_resource = None;
        self.focus_resource_listener = None;
    }

    pub(crate) fn current_destroyed(&mut self) {
        self.current = None;
        self.current_listener = None;
    }

    pub(crate) fn sprite_destroyed(&mut self) {
        self.sprite = None;
    }
}

impl<R: Renderer> Compositor<R> {
    /// Moves pointer focus, sending leave to the old client and enter to the
    /// new one. Local coordinates are relative to `surface`.
    pub fn pointer_set_focus(&mut self, surface: Option<ResourceId>, sx: f64, sy: f64) {
        let old_focus = self.seat.pointer.focus;
        let old_resource = self.seat.pointer.focus_resource;

        if let (Some(resource), Some(old)) = (old_resource, old_focus) {
            if old_focus != surface {
                let serial = self.next_serial();
                self.send(resource, Event::PointerLeave { serial, surface: old });
            }
        }

        let resource = surface
            .and_then(|s| self.registry.client(s))
            .and_then(|client| self.registry.find(&self.seat.pointer.resources, client));

        if let (Some(resource), Some(surface)) = (resource, surface) {
            if old_focus != Some(surface) || old_resource != Some(resource) {
                let serial = self.next_serial();
                self.send(
                    resource,
                    Event::PointerEnter {
                        serial,
                        surface,
                        x: sx,
                        y: sy,
                    },
                );
                self.seat.pointer.focus_serial = serial;
            }
        }

        if old_resource != resource {
            if let Some(token) = self.seat.pointer.focus_resource_listener.take() {
                self.registry.remove_destroy_listener(token);
            }
            self.seat.pointer.focus_resource_listener = resource.map(|r| {
                self.registry
                    .add_destroy_listener(r, DestroyListener::PointerFocusResource)
            });
        }
        if old_focus != surface {
            if let Some(token) = self.seat.pointer.focus_surface_listener.take() {
                self.registry.remove_destroy_listener(token);
            }
            self.seat.pointer.focus_surface_listener = surface.map(|s| {
                self.registry
                    .add_destroy_listener(s, DestroyListener::PointerFocusSurface)
            });
            debug!("pointer focus {:?} -> {:?}", old_focus, surface);
        }

        let pointer = &mut self.seat.pointer;
        pointer.focus = surface;
        pointer.focus_resource = resource;
        pointer.default_grab.focus = surface;
    }

    pub(crate) fn pointer_focus_surface_destroyed(&mut self) {
        let pointer = &mut self.seat.pointer;
        pointer.focus = None;
        pointer.focus_surface_listener = None;
        pointer.default_grab.focus = None;
        if let Some(token) = pointer.focus_resource_listener.take() {
            self.registry.remove_destroy_listener(token);
        }
        self.seat.pointer.focus_resource = None;
    }

    /// Re-resolves the surface under the cursor and refreshes grab-local
    /// coordinates. Runs before every pointer event and whenever the stacking
    /// changes.
    pub fn repick(&mut self) {
        let (x, y) = (self.seat.pointer.x, self.seat.pointer.y);
        let hit = self
            .renderer
            .hit_test(x, y)
            .filter(|s| self.registry.is_a(*s, Interface::Surface));

        if let Some(surface) = hit {
            let (lx, ly) = self.renderer.transform_to_local(surface, x, y);
            self.seat.pointer.current_x = lx;
            self.seat.pointer.current_y = ly;
        }

        if hit != self.seat.pointer.current {
            let (cx, cy) = self.seat.pointer.current_position();
            self.grab_focus(hit, cx, cy);

            if let Some(token) = self.seat.pointer.current_listener.take() {
                self.registry.remove_destroy_listener(token);
            }
            self.seat.pointer.current_listener =
                hit.map(|s| self.registry.add_destroy_listener(s, DestroyListener::PointerCurrent));
            self.seat.pointer.current = hit;
        }

        if let Some(focus) = self.seat.pointer.grab_focus().focus {
            let (gx, gy) = self.renderer.transform_to_local(focus, x, y);
            let grab = self.seat.pointer.active_grab_mut();
            grab.x = gx;
            grab.y = gy;
        }
    }

    fn grab_focus(&mut self, surface: Option<ResourceId>, x: f64, y: f64) {
        match self.seat.pointer.grab {
            GrabKind::Default => {
                if self.seat.pointer.button_count == 0 {
                    self.pointer_set_focus(surface, x, y);
                }
            }
            GrabKind::Drag => self.drag_grab_focus(surface, x, y),
        }
    }

    fn grab_motion(&mut self, time: u32) {
        match self.seat.pointer.grab {
            GrabKind::Default => {
                if let Some(resource) = self.seat.pointer.focus_resource {
                    let GrabFocus { x, y, .. } = self.seat.pointer.default_grab;
                    self.send(resource, Event::PointerMotion { time, x, y });
                }
            }
            GrabKind::Drag => self.drag_grab_motion(time),
        }
    }

    fn grab_button(&mut self, time: u32, button: u32, state: ButtonState) {
        match self.seat.pointer.grab {
            GrabKind::Default => {
                if let Some(resource) = self.seat.pointer.focus_resource {
                    let serial = self.next_serial();
                    self.send(
                        resource,
                        Event::PointerButton {
                            serial,
                            time,
                            button,
                            state,
                        },
                    );
                }
                if self.seat.pointer.button_count == 0 && state == ButtonState::Released {
                    let current = self.seat.pointer.current;
                    let (cx, cy) = self.seat.pointer.current_position();
                    self.pointer_set_focus(current, cx, cy);
                }
            }
            GrabKind::Drag => self.drag_grab_button(button, state),
        }
    }

    /// Installs a grab; it is immediately focused on the surface under the cursor
    pub(crate) fn pointer_start_grab(&mut self, kind: GrabKind) {
        self.seat.pointer.grab = kind;
        if let Some(current) = self.seat.pointer.current {
            let (cx, cy) = self.seat.pointer.current_position();
            self.grab_focus(Some(current), cx, cy);
        }
    }

    /// Returns to the default grab, refocusing the surface under the cursor
    pub(crate) fn pointer_end_grab(&mut self) {
        self.seat.pointer.grab = GrabKind::Default;
        let current = self.seat.pointer.current;
        let (cx, cy) = self.seat.pointer.current_position();
        self.grab_focus(current, cx, cy);
    }

    /// Cursor moved to a global position
    pub fn notify_motion(&mut self, time: u32, x: f64, y: f64) {
        self.seat.pointer.x = x;
        self.seat.pointer.y = y;
        self.repick();
        self.grab_motion(time);
    }

    /// Button pressed or released at a global position
    pub fn notify_button(&mut self, time: u32, x: f64, y: f64, button: MouseButton, pressed: bool) {
        self.notify_motion(time, x, y);
        let code = button.to_evdev();

        let pointer = &mut self.seat.pointer;
        if pressed {
            if pointer.button_count == 0 {
                pointer.grab_button = code;
                pointer.grab_time = time;
                pointer.grab_x = pointer.x;
                pointer.grab_y = pointer.y;
            }
            pointer.button_count += 1;
        } else if pointer.button_count == 0 {
            warn!("release of button {:#x} with no buttons held", code);
            return;
        } else {
            pointer.button_count -= 1;
        }

        let state = if pressed {
            ButtonState::Pressed
        } else {
            ButtonState::Released
        };
        self.grab_button(time, code, state);

        if pressed && self.seat.pointer.button_count == 1 {
            self.seat.pointer.grab_serial = self.serials.last();
        }

        if pressed && self.config.seat.click_to_focus {
            if let Some(surface) = self.seat.pointer.current {
                self.keyboard_set_focus(Some(surface));
            }
        }
    }

    /// `wl_pointer.set_cursor`
    pub fn pointer_set_cursor(
        &mut self,
        pointer: ResourceId,
        serial: u32,
        surface: Option<ResourceId>,
        hotspot_x: i32,
        hotspot_y: i32,
    ) {
        if !self.is_target(pointer, Interface::Pointer) {
            return;
        }
        if let Some(surface) = surface {
            if !self.check_argument(pointer, surface, Interface::Surface) {
                return;
            }
        }

        let Some(focus) = self.seat.pointer.focus else {
            return;
        };
        if self.registry.client(focus) != self.registry.client(pointer) {
            debug!("set_cursor from unfocused client ignored");
            return;
        }
        if self.seat.pointer.focus_serial.wrapping_sub(serial) > u32::MAX / 2 {
            debug!(
                "set_cursor with serial {} after focus serial {} ignored",
                serial, self.seat.pointer.focus_serial
            );
            return;
        }

        if let Some((_, token)) = self.seat.pointer.sprite.take() {
            self.registry.remove_destroy_listener(token);
        }
        let Some(surface) = surface else {
            return;
        };
        let token = self
            .registry
            .add_destroy_listener(surface, DestroyListener::CursorSprite);
        self.seat.pointer.sprite = Some((surface, token));
        self.seat.pointer.hotspot = (hotspot_x, hotspot_y);
    }
}

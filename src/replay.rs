//! Scripted sessions
//!
//! A script is a list of client requests and input events addressed by
//! names instead of resource ids. [`run`] plays it against a headless core and
//! collects the outbox after every step, which makes it easy to inspect how
//! focus, selections and drags play out without a real client.
//!
//! ```toml
//! [[step]]
//! op = "create_surface"
//! client = 1
//! name = "terminal"
//! x = 10
//! y = 10
//!
//! [[step]]
//! op = "input"
//! type = "motion"
//! time = 5
//! x = 20.0
//! y = 20.0
//! ```

use crate::compositor::Compositor;
use crate::config::TesseraConfig;
use crate::events::Message;
use crate::input::InputEvent;
use crate::renderer::HeadlessRenderer;
use crate::resource::{ClientId, ResourceId};
use crate::shell::ShellSurfaceRequest;
use crate::surface::BufferSpec;
use crate::xwayland::{ProcessEvent, SupervisorAction};
use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// One scripted request or event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    CreateSurface {
        client: u32,
        name: String,
        #[serde(default)]
        x: i32,
        #[serde(default)]
        y: i32,
    },
    CreateBuffer {
        client: u32,
        name: String,
        width: i32,
        height: i32,
    },
    CreateRegion {
        client: u32,
        name: String,
    },
    RegionAdd {
        region: String,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },
    RegionSubtract {
        region: String,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },
    Attach {
        surface: String,
        buffer: Option<String>,
        #[serde(default)]
        dx: i32,
        #[serde(default)]
        dy: i32,
    },
    Damage {
        surface: String,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },
    Frame {
        surface: String,
        name: String,
    },
    Commit {
        surface: String,
    },
    FrameDone {
        time: u32,
    },
    /// Moves a surface in the headless scene
    Place {
        surface: String,
        x: i32,
        y: i32,
    },
    Raise {
        surface: String,
    },
    Destroy {
        name: String,
    },
    Disconnect {
        client: u32,
    },

    GetShellSurface {
        client: u32,
        name: String,
        surface: String,
    },
    Shell {
        shell_surface: String,
        #[serde(flatten)]
        request: ShellSurfaceRequest,
    },

    BindOutput {
        client: u32,
        name: String,
    },
    BindSeat {
        client: u32,
        name: String,
    },
    GetPointer {
        seat: String,
        name: String,
    },
    GetKeyboard {
        seat: String,
        name: String,
    },
    SetCursor {
        pointer: String,
        /// Defaults to the pointer's current focus serial
        serial: Option<u32>,
        surface: Option<String>,
        #[serde(default)]
        hotspot_x: i32,
        #[serde(default)]
        hotspot_y: i32,
    },
    KeyboardFocus {
        surface: Option<String>,
    },

    CreateDataSource {
        client: u32,
        name: String,
        #[serde(default)]
        mime_types: Vec<String>,
    },
    GetDataDevice {
        client: u32,
        name: String,
        seat: String,
    },
    SetSelection {
        device: String,
        source: Option<String>,
        /// Defaults to the most recent serial
        serial: Option<u32>,
    },
    StartDrag {
        device: String,
        source: Option<String>,
        origin: String,
        icon: Option<String>,
        /// Defaults to the serial of the button press holding the pointer
        serial: Option<u32>,
    },

    Input(InputEvent),
    Process(ProcessEvent),
}

impl Step {
    /// Short label used in the output
    pub fn label(&self) -> String {
        serde_json::to_value(self)
            .ok()
            .and_then(|v| v.get("op").and_then(|op| op.as_str().map(str::to_string)))
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// A replayable session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    /// Overrides the configuration the core is created with
    #[serde(default)]
    pub config: Option<TesseraConfig>,

    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

impl Script {
    /// Loads a script, as JSON if the extension says so and TOML otherwise
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read script: {}", path.display()))?;

        let is_json = path.extension().map_or(false, |ext| ext == "json");
        let script = if is_json {
            Self::from_json_str(&contents)
        } else {
            Self::from_toml_str(&contents)
        };
        script.with_context(|| format!("Failed to parse script: {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Messages produced by one step
#[derive(Debug, Serialize)]
pub struct StepOutput {
    pub step: usize,
    pub op: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<SupervisorAction>,
    pub messages: Vec<Message>,
}

/// Plays scripts against a headless core
pub struct Replay {
    compositor: Compositor<HeadlessRenderer>,
    names: HashMap<String, ResourceId>,
}

impl Replay {
    pub fn new(config: TesseraConfig) -> Result<Self> {
        let compositor = Compositor::new(config, HeadlessRenderer::new())?;
        Ok(Self {
            compositor,
            names: HashMap::new(),
        })
    }

    pub fn compositor(&self) -> &Compositor<HeadlessRenderer> {
        &self.compositor
    }

    /// Resource bound to `name` by an earlier step
    pub fn resource(&self, name: &str) -> Option<ResourceId> {
        self.names.get(name).copied()
    }

    fn lookup(&self, name: &str) -> Result<ResourceId> {
        self.resource(name)
            .with_context(|| format!("Unknown resource name '{}'", name))
    }

    fn lookup_opt(&self, name: &Option<String>) -> Result<Option<ResourceId>> {
        name.as_deref().map(|n| self.lookup(n)).transpose()
    }

    fn bind(&mut self, name: &str, id: Option<ResourceId>) {
        match id {
            Some(id) => {
                self.names.insert(name.to_string(), id);
            }
            None => debug!("'{}' was not created", name),
        }
    }

    /// Applies one step and returns what it queued
    pub fn apply(&mut self, index: usize, step: &Step) -> Result<StepOutput> {
        let mut action = None;

        match step {
            Step::CreateSurface { client, name, x, y } => {
                let id = self.compositor.create_surface(ClientId(*client), protocol_id(name));
                if let Some(surface) = id {
                    self.compositor.renderer_mut().place(surface, *x, *y);
                }
                self.bind(name, id);
            }
            Step::CreateBuffer {
                client,
                name,
                width,
                height,
            } => {
                let spec = BufferSpec::argb8888(*width, *height);
                let id = self.compositor.create_buffer(ClientId(*client), protocol_id(name), spec);
                self.bind(name, id);
            }
            Step::CreateRegion { client, name } => {
                let id = self.compositor.create_region(ClientId(*client), protocol_id(name));
                self.bind(name, id);
            }
            Step::RegionAdd {
                region,
                x,
                y,
                width,
                height,
            } => {
                let region = self.lookup(region)?;
                self.compositor.region_add(region, *x, *y, *width, *height);
            }
            Step::RegionSubtract {
                region,
                x,
                y,
                width,
                height,
            } => {
                let region = self.lookup(region)?;
                self.compositor.region_subtract(region, *x, *y, *width, *height);
            }
            Step::Attach {
                surface,
                buffer,
                dx,
                dy,
            } => {
                let surface = self.lookup(surface)?;
                let buffer = self.lookup_opt(buffer)?;
                self.compositor.surface_attach(surface, buffer, *dx, *dy);
            }
            Step::Damage {
                surface,
                x,
                y,
                width,
                height,
            } => {
                let surface = self.lookup(surface)?;
                self.compositor.surface_damage(surface, *x, *y, *width, *height);
            }
            Step::Frame { surface, name } => {
                let surface = self.lookup(surface)?;
                let id = self.compositor.surface_frame(surface, protocol_id(name));
                self.bind(name, id);
            }
            Step::Commit { surface } => {
                let surface = self.lookup(surface)?;
                self.compositor.surface_commit(surface);
            }
            Step::FrameDone { time } => self.compositor.frame_done(*time),
            Step::Place { surface, x, y } => {
                let surface = self.lookup(surface)?;
                self.compositor.renderer_mut().place(surface, *x, *y);
                self.compositor.repick();
            }
            Step::Raise { surface } => {
                let surface = self.lookup(surface)?;
                self.compositor.renderer_mut().raise(surface);
                self.compositor.repick();
            }
            Step::Destroy { name } => {
                let id = self.lookup(name)?;
                if !self.compositor.is_alive(id) {
                    anyhow::bail!("'{}' is already destroyed", name);
                }
                self.compositor.destroy_resource(id);
                self.names.remove(name);
            }
            Step::Disconnect { client } => self.compositor.client_disconnected(ClientId(*client)),

            Step::GetShellSurface {
                client,
                name,
                surface,
            } => {
                let surface = self.lookup(surface)?;
                let id = self
                    .compositor
                    .get_shell_surface(ClientId(*client), protocol_id(name), surface);
                self.bind(name, id);
            }
            Step::Shell {
                shell_surface,
                request,
            } => {
                let shell_surface = self.lookup(shell_surface)?;
                self.compositor.shell_surface_request(shell_surface, request.clone());
            }

            Step::BindOutput { client, name } => {
                let id = self.compositor.bind_output(ClientId(*client), protocol_id(name));
                self.bind(name, id);
            }
            Step::BindSeat { client, name } => {
                let id = self.compositor.bind_seat(ClientId(*client), protocol_id(name));
                self.bind(name, id);
            }
            Step::GetPointer { seat, name } => {
                let seat = self.lookup(seat)?;
                let id = self.compositor.get_pointer(seat, protocol_id(name));
                self.bind(name, id);
            }
            Step::GetKeyboard { seat, name } => {
                let seat = self.lookup(seat)?;
                let id = self.compositor.get_keyboard(seat, protocol_id(name));
                self.bind(name, id);
            }
            Step::SetCursor {
                pointer,
                serial,
                surface,
                hotspot_x,
                hotspot_y,
            } => {
                let pointer = self.lookup(pointer)?;
                let surface = self.lookup_opt(surface)?;
                let serial = serial.unwrap_or_else(|| self.compositor.seat().pointer.focus_serial());
                self.compositor
                    .pointer_set_cursor(pointer, serial, surface, *hotspot_x, *hotspot_y);
            }
            Step::KeyboardFocus { surface } => {
                let surface = self.lookup_opt(surface)?;
                self.compositor.keyboard_set_focus(surface);
            }

            Step::CreateDataSource {
                client,
                name,
                mime_types,
            } => {
                let id = self.compositor.create_data_source(ClientId(*client), protocol_id(name));
                if let Some(source) = id {
                    for mime_type in mime_types {
                        self.compositor.data_source_offer(source, mime_type);
                    }
                }
                self.bind(name, id);
            }
            Step::GetDataDevice { client, name, seat } => {
                let seat = self.lookup(seat)?;
                let id = self
                    .compositor
                    .get_data_device(ClientId(*client), protocol_id(name), seat);
                self.bind(name, id);
            }
            Step::SetSelection {
                device,
                source,
                serial,
            } => {
                let device = self.lookup(device)?;
                let source = self.lookup_opt(source)?;
                let serial = serial.unwrap_or_else(|| self.compositor.last_serial());
                self.compositor.data_device_set_selection(device, source, serial);
            }
            Step::StartDrag {
                device,
                source,
                origin,
                icon,
                serial,
            } => {
                let device = self.lookup(device)?;
                let source = self.lookup_opt(source)?;
                let origin = self.lookup(origin)?;
                let icon = self.lookup_opt(icon)?;
                let serial = serial.unwrap_or_else(|| self.compositor.seat().pointer.grab_serial());
                self.compositor
                    .data_device_start_drag(device, source, origin, icon, serial);
            }

            Step::Input(event) => self.compositor.handle_input(event.clone()),
            Step::Process(event) => action = Some(self.compositor.process_event(*event)),
        }

        Ok(StepOutput {
            step: index,
            op: step.label(),
            action,
            messages: self.compositor.take_messages(),
        })
    }
}

/// Client-visible id for a scripted name; only used in logs and errors
fn protocol_id(name: &str) -> u32 {
    name.bytes()
        .fold(2u32, |hash, b| hash.wrapping_mul(31).wrapping_add(u32::from(b)))
        .max(2)
}

/// Plays every step of `script`, stopping at the first one that names an
/// unknown resource
pub fn run(script: &Script, config: TesseraConfig) -> Result<Vec<StepOutput>> {
    let config = script.config.clone().unwrap_or(config);
    let mut replay = Replay::new(config)?;
    info!("▶️ Replaying {} steps", script.steps.len());

    script
        .steps
        .iter()
        .enumerate()
        .map(|(index, step)| {
            replay
                .apply(index, step)
                .with_context(|| format!("Step {} ({}) failed", index, step.label()))
        })
        .collect()
}

//! Outbound protocol traffic
//!
//! The core never writes to a socket. Everything it wants a client to see is
//! queued as a [`Message`] in the [`Outbox`] in the exact order it was
//! produced; the transport drains the queue after each request or input
//! event and serialises it onto the right connection.

use crate::error::ProtocolError;
use crate::resource::{ClientId, ResourceId};
use serde::{Serialize, Serializer};
use std::collections::VecDeque;
use std::fmt;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

/// `wl_keyboard.keymap_format.xkb_v1`
pub const KEYMAP_FORMAT_XKB_V1: u32 = 1;

/// `wl_output.mode` flag for the current mode
pub const OUTPUT_MODE_CURRENT: u32 = 0x1;
/// `wl_output.mode` flag for the preferred mode
pub const OUTPUT_MODE_PREFERRED: u32 = 0x2;

/// Seat capability bits advertised on bind
pub const SEAT_CAPABILITY_POINTER: u32 = 1;
pub const SEAT_CAPABILITY_KEYBOARD: u32 = 2;

/// A file descriptor travelling with an event
///
/// The transport passes it to the client and then drops it, which closes the
/// core's copy.
pub struct TransferFd(pub OwnedFd);

impl fmt::Debug for TransferFd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd {}", self.0.as_raw_fd())
    }
}

impl PartialEq for TransferFd {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_raw_fd() == other.0.as_raw_fd()
    }
}

impl Serialize for TransferFd {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.0.as_raw_fd())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonState {
    Released,
    Pressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyState {
    Released,
    Pressed,
}

/// Event delivered to a single client resource
#[derive(Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    BufferRelease,
    CallbackDone {
        time: u32,
    },

    OutputGeometry {
        x: i32,
        y: i32,
        physical_width: i32,
        physical_height: i32,
        make: String,
        model: String,
    },
    OutputMode {
        flags: u32,
        width: i32,
        height: i32,
        refresh: i32,
    },

    SeatCapabilities {
        capabilities: u32,
    },

    PointerEnter {
        serial: u32,
        surface: ResourceId,
        x: f64,
        y: f64,
    },
    PointerLeave {
        serial: u32,
        surface: ResourceId,
    },
    PointerMotion {
        time: u32,
        x: f64,
        y: f64,
    },
    PointerButton {
        serial: u32,
        time: u32,
        button: u32,
        state: ButtonState,
    },

    KeyboardKeymap {
        format: u32,
        fd: RawFd,
        size: u32,
    },
    KeyboardEnter {
        serial: u32,
        surface: ResourceId,
        keys: Vec<u32>,
    },
    KeyboardLeave {
        serial: u32,
        surface: ResourceId,
    },
    KeyboardKey {
        serial: u32,
        time: u32,
        key: u32,
        state: KeyState,
    },
    KeyboardModifiers {
        serial: u32,
        depressed: u32,
        latched: u32,
        locked: u32,
        group: u32,
    },

    /// Introduces a new offer object to a data device
    DataDeviceDataOffer {
        offer: ResourceId,
    },
    DataDeviceSelection {
        offer: Option<ResourceId>,
    },
    DataDeviceEnter {
        serial: u32,
        surface: ResourceId,
        x: f64,
        y: f64,
        offer: Option<ResourceId>,
    },
    DataDeviceLeave,
    DataDeviceMotion {
        time: u32,
        x: f64,
        y: f64,
    },
    DataDeviceDrop,

    DataOfferOffer {
        mime_type: String,
    },

    DataSourceTarget {
        mime_type: Option<String>,
    },
    DataSourceSend {
        mime_type: String,
        fd: TransferFd,
    },
    DataSourceCancelled,
}

/// One item of outbound traffic
#[derive(Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    Event {
        target: ResourceId,
        #[serde(flatten)]
        event: Event,
    },
    /// Fatal protocol error for one client; the transport disconnects it
    Error {
        client: ClientId,
        object: Option<ResourceId>,
        code: u32,
        error: ProtocolError,
    },
}

impl Message {
    /// Target resource of an event message
    pub fn target(&self) -> Option<ResourceId> {
        match self {
            Message::Event { target, .. } => Some(*target),
            Message::Error { .. } => None,
        }
    }

    pub fn event(&self) -> Option<&Event> {
        match self {
            Message::Event { event, .. } => Some(event),
            Message::Error { .. } => None,
        }
    }
}

/// FIFO of outbound messages
#[derive(Debug, Default)]
pub struct Outbox {
    queue: VecDeque<Message>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, target: ResourceId, event: Event) {
        self.queue.push_back(Message::Event { target, event });
    }

    pub fn post_error(&mut self, client: ClientId, object: Option<ResourceId>, error: ProtocolError) {
        let code = error.code();
        self.queue.push_back(Message::Error {
            client,
            object,
            code,
            error,
        });
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Takes every queued message, oldest first
    pub fn drain(&mut self) -> Vec<Message> {
        self.queue.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.queue.iter()
    }
}

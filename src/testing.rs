//! Shared fixtures for unit tests

use crate::compositor::Compositor;
use crate::config::TesseraConfig;
use crate::events::{Event, Message};
use crate::input::keymap::Keymap;
use crate::renderer::HeadlessRenderer;
use crate::resource::{ClientId, ResourceId};

pub(crate) const CLIENT_A: ClientId = ClientId(1);
pub(crate) const CLIENT_B: ClientId = ClientId(2);

pub(crate) fn test_keymap() -> Keymap {
    Keymap::from_string("xkb_keymap { };").unwrap()
}

pub(crate) fn compositor() -> Compositor<HeadlessRenderer> {
    compositor_with(TesseraConfig::default())
}

pub(crate) fn compositor_with(config: TesseraConfig) -> Compositor<HeadlessRenderer> {
    Compositor::with_keymap(config, test_keymap(), HeadlessRenderer::new())
}

/// Events addressed to `target`, in order
pub(crate) fn events_for(messages: &[Message], target: ResourceId) -> Vec<&Event> {
    messages
        .iter()
        .filter(|m| m.target() == Some(target))
        .filter_map(Message::event)
        .collect()
}

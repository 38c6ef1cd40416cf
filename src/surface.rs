//! Surfaces, buffers, frame callbacks and region objects
//!
//! A surface is double-buffered: `attach`, `damage` and `frame` only touch the
//! pending state, and `commit` is the single point where that state becomes
//! current and visible to the renderer.
//!
//! # Buffer accounting
//!
//! A buffer's busy count is the number of surface slots (pending or current)
//! that refer to it. Whenever the count drops to zero while the buffer is still
//! alive, exactly one `release` is sent to its owner. A destroyed buffer simply
//! disappears from every slot through its destroy listeners.

use crate::compositor::{Compositor, DestroyListener};
use crate::events::Event;
use crate::region::{Rectangle, Region};
use crate::renderer::{BufferInfo, PresentationId, Renderer};
use crate::resource::{ClientId, Interface, ListenerToken, ResourceId};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// A surface slot holding a buffer, with the listener that clears it
#[derive(Debug, Clone, Copy)]
pub(crate) struct BufferSlot {
    buffer: ResourceId,
    listener: ListenerToken,
}

/// State staged by requests and applied on commit
#[derive(Debug, Default)]
pub struct PendingState {
    buffer: Option<BufferSlot>,
    sx: i32,
    sy: i32,
    newly_attached: bool,
    damage: Region,
    frame_callbacks: Vec<ResourceId>,
}

/// A client surface
#[derive(Debug)]
pub struct Surface {
    client: ClientId,
    buffer: Option<BufferSlot>,
    pending: PendingState,
    presentation: Option<PresentationId>,
    /// Sum of committed attach offsets
    offset: (i32, i32),
    pub(crate) shell_surface: Option<ResourceId>,
}

impl Surface {
    fn new(client: ClientId) -> Self {
        Self {
            client,
            buffer: None,
            pending: PendingState::default(),
            presentation: None,
            offset: (0, 0),
            shell_surface: None,
        }
    }

    pub fn client(&self) -> ClientId {
        self.client
    }

    /// Buffer made current by the last commit
    pub fn buffer(&self) -> Option<ResourceId> {
        self.buffer.map(|slot| slot.buffer)
    }

    pub fn pending_buffer(&self) -> Option<ResourceId> {
        self.pending.buffer.map(|slot| slot.buffer)
    }

    pub fn pending_damage(&self) -> &Region {
        &self.pending.damage
    }

    pub fn pending_frame_callbacks(&self) -> &[ResourceId] {
        &self.pending.frame_callbacks
    }

    pub fn presentation(&self) -> Option<PresentationId> {
        self.presentation
    }

    pub fn offset(&self) -> (i32, i32) {
        self.offset
    }

    pub fn has_shell_surface(&self) -> bool {
        self.shell_surface.is_some()
    }

    pub(crate) fn pending_buffer_destroyed(&mut self, buffer: ResourceId) {
        if self.pending_buffer() == Some(buffer) {
            self.pending.buffer = None;
        }
    }

    pub(crate) fn current_buffer_destroyed(&mut self, buffer: ResourceId) {
        if self.buffer() == Some(buffer) {
            self.buffer = None;
        }
    }
}

/// Client-supplied pixel storage description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferSpec {
    pub width: i32,
    pub height: i32,
    #[serde(default)]
    pub stride: i32,
    /// wl_shm format code (0 = argb8888)
    #[serde(default)]
    pub format: u32,
}

impl BufferSpec {
    pub fn argb8888(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            stride: width.saturating_mul(4),
            format: 0,
        }
    }
}

#[derive(Debug)]
pub struct Buffer {
    client: ClientId,
    spec: BufferSpec,
    busy_count: u32,
}

impl Buffer {
    pub fn client(&self) -> ClientId {
        self.client
    }

    pub fn spec(&self) -> BufferSpec {
        self.spec
    }

    /// Number of surface slots referring to this buffer
    pub fn busy_count(&self) -> u32 {
        self.busy_count
    }
}

impl<R: Renderer> Compositor<R> {
    pub fn surface(&self, id: ResourceId) -> Option<&Surface> {
        self.surfaces.get(&id)
    }

    /// Live surfaces in creation order
    pub fn surfaces(&self) -> &[ResourceId] {
        &self.surface_list
    }

    pub fn buffer(&self, id: ResourceId) -> Option<&Buffer> {
        self.buffers.get(&id)
    }

    pub fn region(&self, id: ResourceId) -> Option<&Region> {
        self.regions.get(&id)
    }

    /// Committed callbacks waiting for the next paint
    pub fn frame_callbacks(&self) -> &[ResourceId] {
        &self.frame_callbacks
    }

    /// `wl_compositor.create_surface`
    pub fn create_surface(&mut self, client: ClientId, id: u32) -> Option<ResourceId> {
        let surface = self.allocate(Interface::Surface, id, client)?;
        self.surfaces.insert(surface, Surface::new(client));
        self.surface_list.push(surface);
        debug!("client {:?} created surface {:?}", client, surface);
        Some(surface)
    }

    /// Registers client pixel storage (the shm pool side lives in the transport)
    pub fn create_buffer(&mut self, client: ClientId, id: u32, spec: BufferSpec) -> Option<ResourceId> {
        let buffer = self.allocate(Interface::Buffer, id, client)?;
        self.buffers.insert(
            buffer,
            Buffer {
                client,
                spec,
                busy_count: 0,
            },
        );
        Some(buffer)
    }

    /// `wl_surface.attach`: stages `buffer` (or no buffer) for the next commit
    pub fn surface_attach(&mut self, surface: ResourceId, buffer: Option<ResourceId>, dx: i32, dy: i32) {
        if !self.is_target(surface, Interface::Surface) {
            return;
        }
        if let Some(buffer) = buffer {
            if !self.check_argument(surface, buffer, Interface::Buffer) {
                return;
            }
        }

        // take the new reference before dropping the old one, so re-attaching
        // the same buffer never bounces through zero
        let new_slot = buffer.map(|buffer| {
            self.ref_buffer(buffer);
            BufferSlot {
                buffer,
                listener: self
                    .registry
                    .add_destroy_listener(buffer, DestroyListener::PendingBuffer { surface }),
            }
        });

        let Some(state) = self.surfaces.get_mut(&surface) else {
            return;
        };
        let old = std::mem::replace(&mut state.pending.buffer, new_slot);
        state.pending.sx = dx;
        state.pending.sy = dy;
        state.pending.newly_attached = true;

        if let Some(old) = old {
            self.release_slot(old);
        }
    }

    /// `wl_surface.damage`: accumulates damage for the next commit
    pub fn surface_damage(&mut self, surface: ResourceId, x: i32, y: i32, width: i32, height: i32) {
        if !self.is_target(surface, Interface::Surface) {
            return;
        }
        if let Some(state) = self.surfaces.get_mut(&surface) {
            state.pending.damage.union(Rectangle::new(x, y, width, height));
        }
    }

    /// `wl_surface.frame`: queues a one-shot callback for after the next paint
    pub fn surface_frame(&mut self, surface: ResourceId, callback_id: u32) -> Option<ResourceId> {
        if !self.is_target(surface, Interface::Surface) {
            return None;
        }
        let client = self.registry.client(surface)?;
        let callback = self.allocate(Interface::Callback, callback_id, client)?;
        if let Some(state) = self.surfaces.get_mut(&surface) {
            state.pending.frame_callbacks.push(callback);
        }
        Some(callback)
    }

    /// `wl_surface.set_opaque_region`; accepted and ignored
    pub fn surface_set_opaque_region(&mut self, surface: ResourceId, region: Option<ResourceId>) {
        self.region_hint(surface, region, "opaque");
    }

    /// `wl_surface.set_input_region`; accepted and ignored
    pub fn surface_set_input_region(&mut self, surface: ResourceId, region: Option<ResourceId>) {
        self.region_hint(surface, region, "input");
    }

    fn region_hint(&mut self, surface: ResourceId, region: Option<ResourceId>, kind: &str) {
        if !self.is_target(surface, Interface::Surface) {
            return;
        }
        if let Some(region) = region {
            if !self.check_argument(surface, region, Interface::Region) {
                return;
            }
        }
        debug!("{} region for {:?} ignored", kind, surface);
    }

    /// `wl_surface.commit`: makes the pending state current
    pub fn surface_commit(&mut self, surface: ResourceId) {
        if !self.is_target(surface, Interface::Surface) {
            return;
        }
        let Some(state) = self.surfaces.get_mut(&surface) else {
            return;
        };

        let newly_attached = std::mem::take(&mut state.pending.newly_attached);
        let pending = state.pending.buffer.take();
        let (dx, dy) = (
            std::mem::take(&mut state.pending.sx),
            std::mem::take(&mut state.pending.sy),
        );
        state.offset = (state.offset.0 + dx, state.offset.1 + dy);

        let mut detached = None;
        if newly_attached && pending.map(|p| p.buffer) != state.buffer() {
            detached = state.buffer.take();
        }
        let current = state.buffer();

        if let Some(old) = detached {
            self.release_slot(old);
        }

        if let Some(pending) = pending {
            self.registry.remove_destroy_listener(pending.listener);
            self.present(surface, pending.buffer);

            if current == Some(pending.buffer) {
                // current slot already holds a reference to it
                self.unref_buffer(pending.buffer);
            } else {
                let listener = self
                    .registry
                    .add_destroy_listener(pending.buffer, DestroyListener::CurrentBuffer { surface });
                if let Some(state) = self.surfaces.get_mut(&surface) {
                    state.buffer = Some(BufferSlot {
                        buffer: pending.buffer,
                        listener,
                    });
                }
            }
        }

        let Some(state) = self.surfaces.get_mut(&surface) else {
            return;
        };
        let damage = std::mem::take(&mut state.pending.damage);
        if let (Some(_), Some(presentation)) = (state.buffer, state.presentation) {
            for rect in damage.rects() {
                self.renderer.damage(presentation, *rect);
            }
        }

        let callbacks = std::mem::take(&mut state.pending.frame_callbacks);
        self.frame_callbacks.extend(callbacks);
    }

    fn present(&mut self, surface: ResourceId, buffer: ResourceId) {
        let Some(spec) = self.buffers.get(&buffer).map(Buffer::spec) else {
            return;
        };
        let info = BufferInfo {
            buffer,
            width: spec.width,
            height: spec.height,
            stride: spec.stride,
            format: spec.format,
        };
        match self.renderer.present(surface, &info) {
            Ok(presentation) => {
                if let Some(state) = self.surfaces.get_mut(&surface) {
                    state.presentation = Some(presentation);
                }
            }
            Err(err) => warn!("failed to present {:?} on {:?}: {}", buffer, surface, err),
        }
    }

    /// Paint completion: every committed frame callback gets `done` and dies
    pub fn frame_done(&mut self, time: u32) {
        let callbacks = std::mem::take(&mut self.frame_callbacks);
        if !callbacks.is_empty() {
            debug!("firing {} frame callbacks at {}", callbacks.len(), time);
        }
        for callback in callbacks {
            self.send(callback, Event::CallbackDone { time });
            self.destroy_resource(callback);
        }
    }

    fn ref_buffer(&mut self, buffer: ResourceId) {
        if let Some(buffer) = self.buffers.get_mut(&buffer) {
            buffer.busy_count += 1;
        }
    }

    /// Drops one slot reference; the last one releases the buffer to its client
    fn unref_buffer(&mut self, id: ResourceId) {
        let Some(buffer) = self.buffers.get_mut(&id) else {
            return;
        };
        assert!(buffer.busy_count > 0, "busy count of {:?} went negative", id);
        buffer.busy_count -= 1;
        if buffer.busy_count == 0 {
            self.send(id, Event::BufferRelease);
        }
    }

    fn release_slot(&mut self, slot: BufferSlot) {
        self.registry.remove_destroy_listener(slot.listener);
        self.unref_buffer(slot.buffer);
    }

    pub(crate) fn surface_destroyed(&mut self, id: ResourceId) {
        self.surface_list.retain(|s| *s != id);
        let Some(surface) = self.surfaces.remove(&id) else {
            return;
        };

        if let Some(slot) = surface.buffer {
            self.release_slot(slot);
        }
        if let Some(presentation) = surface.presentation {
            self.renderer.destroy(presentation);
        }
        if let Some(slot) = surface.pending.buffer {
            self.release_slot(slot);
        }
        for callback in surface.pending.frame_callbacks {
            if self.registry.get(callback).map_or(false, |e| !e.is_destroying()) {
                self.destroy_resource(callback);
            }
        }
    }

    pub(crate) fn callback_destroyed(&mut self, id: ResourceId) {
        self.frame_callbacks.retain(|c| *c != id);
        for surface in self.surfaces.values_mut() {
            surface.pending.frame_callbacks.retain(|c| *c != id);
        }
    }

    /// `wl_compositor.create_region`
    pub fn create_region(&mut self, client: ClientId, id: u32) -> Option<ResourceId> {
        let region = self.allocate(Interface::Region, id, client)?;
        self.regions.insert(region, Region::new());
        Some(region)
    }

    /// `wl_region.add`
    pub fn region_add(&mut self, region: ResourceId, x: i32, y: i32, width: i32, height: i32) {
        if !self.is_target(region, Interface::Region) {
            return;
        }
        if let Some(region) = self.regions.get_mut(&region) {
            region.union(Rectangle::new(x, y, width, height));
        }
    }

    /// `wl_region.subtract`
    pub fn region_subtract(&mut self, region: ResourceId, x: i32, y: i32, width: i32, height: i32) {
        if !self.is_target(region, Interface::Region) {
            return;
        }
        if let Some(region) = self.regions.get_mut(&region) {
            region.subtract(Rectangle::new(x, y, width, height));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TesseraConfig;
    use crate::events::Message;
    use crate::renderer::MockRenderer;
    use crate::testing::{compositor, events_for, test_keymap, CLIENT_A, CLIENT_B};
    use mockall::predicate::eq;
    use proptest::prelude::*;

    fn releases(messages: &[Message], buffer: ResourceId) -> usize {
        events_for(messages, buffer)
            .iter()
            .filter(|e| matches!(e, Event::BufferRelease))
            .count()
    }

    #[test]
    fn test_commit_presents_buffer_and_forwards_damage() {
        let mut renderer = MockRenderer::new();
        renderer
            .expect_present()
            .times(1)
            .returning(|_, _| Ok(PresentationId(7)));
        renderer
            .expect_damage()
            .with(eq(PresentationId(7)), eq(Rectangle::new(0, 0, 50, 50)))
            .times(1)
            .return_const(());
        let mut compositor = Compositor::with_keymap(TesseraConfig::default(), test_keymap(), renderer);

        let surface = compositor.create_surface(CLIENT_A, 3).unwrap();
        let buffer = compositor
            .create_buffer(CLIENT_A, 4, BufferSpec::argb8888(100, 100))
            .unwrap();
        compositor.surface_attach(surface, Some(buffer), 0, 0);
        compositor.surface_damage(surface, 0, 0, 50, 50);
        compositor.surface_commit(surface);

        let state = compositor.surface(surface).unwrap();
        assert_eq!(state.buffer(), Some(buffer));
        assert_eq!(state.pending_buffer(), None);
        assert!(state.pending_damage().is_empty());
        assert_eq!(state.presentation(), Some(PresentationId(7)));
        assert_eq!(compositor.buffer(buffer).unwrap().busy_count(), 1);
        assert!(compositor.take_messages().is_empty());
    }

    #[test]
    fn test_commit_without_buffer_clears_damage_without_rendering() {
        let mut renderer = MockRenderer::new();
        renderer.expect_present().never();
        renderer.expect_damage().never();
        let mut compositor = Compositor::with_keymap(TesseraConfig::default(), test_keymap(), renderer);

        let surface = compositor.create_surface(CLIENT_A, 3).unwrap();
        compositor.surface_damage(surface, 0, 0, 10, 10);
        compositor.surface_commit(surface);

        assert!(compositor.surface(surface).unwrap().pending_damage().is_empty());
    }

    #[test]
    fn test_damage_at_both_ends_of_the_coordinate_range() {
        let mut compositor = compositor();
        let surface = compositor.create_surface(CLIENT_A, 3).unwrap();
        compositor.surface_damage(surface, i32::MAX - 1, 0, 1, 1);
        compositor.surface_damage(surface, i32::MIN, 0, 1, 1);

        let damage = compositor.surface(surface).unwrap().pending_damage();
        assert_eq!(
            damage.rects(),
            &[Rectangle::new(i32::MAX - 1, 0, 1, 1), Rectangle::new(i32::MIN, 0, 1, 1)]
        );
    }

    #[test]
    fn test_oversized_buffer_stride_saturates() {
        let spec = BufferSpec::argb8888(i32::MAX, 1);
        assert_eq!(spec.stride, i32::MAX);

        let mut compositor = compositor();
        let buffer = compositor.create_buffer(CLIENT_A, 4, spec).unwrap();
        assert_eq!(compositor.buffer(buffer).unwrap().spec().stride, i32::MAX);
    }

    #[test]
    fn test_new_buffer_releases_previous_one() {
        let mut compositor = compositor();
        let surface = compositor.create_surface(CLIENT_A, 3).unwrap();
        let first = compositor.create_buffer(CLIENT_A, 4, BufferSpec::argb8888(10, 10)).unwrap();
        let second = compositor.create_buffer(CLIENT_A, 5, BufferSpec::argb8888(10, 10)).unwrap();

        compositor.surface_attach(surface, Some(first), 0, 0);
        compositor.surface_commit(surface);
        compositor.surface_attach(surface, Some(second), 0, 0);
        compositor.surface_commit(surface);

        let messages = compositor.take_messages();
        assert_eq!(releases(&messages, first), 1);
        assert_eq!(releases(&messages, second), 0);
        assert_eq!(compositor.buffer(first).unwrap().busy_count(), 0);
        assert_eq!(compositor.buffer(second).unwrap().busy_count(), 1);
    }

    #[test]
    fn test_reattaching_current_buffer_keeps_it_busy() {
        let mut compositor = compositor();
        let surface = compositor.create_surface(CLIENT_A, 3).unwrap();
        let buffer = compositor.create_buffer(CLIENT_A, 4, BufferSpec::argb8888(10, 10)).unwrap();

        compositor.surface_attach(surface, Some(buffer), 0, 0);
        compositor.surface_commit(surface);
        compositor.surface_attach(surface, Some(buffer), 0, 0);
        assert_eq!(compositor.buffer(buffer).unwrap().busy_count(), 2);
        compositor.surface_commit(surface);

        assert_eq!(compositor.buffer(buffer).unwrap().busy_count(), 1);
        assert_eq!(releases(&compositor.take_messages(), buffer), 0);
        assert_eq!(compositor.renderer().present_count(), 2);
    }

    #[test]
    fn test_attach_null_detaches_on_commit() {
        let mut compositor = compositor();
        let surface = compositor.create_surface(CLIENT_A, 3).unwrap();
        let buffer = compositor.create_buffer(CLIENT_A, 4, BufferSpec::argb8888(10, 10)).unwrap();

        compositor.surface_attach(surface, Some(buffer), 0, 0);
        compositor.surface_commit(surface);
        compositor.surface_attach(surface, None, 0, 0);
        compositor.surface_commit(surface);

        assert_eq!(compositor.surface(surface).unwrap().buffer(), None);
        assert_eq!(releases(&compositor.take_messages(), buffer), 1);
    }

    #[test]
    fn test_destroyed_buffer_clears_both_slots() {
        let mut compositor = compositor();
        let surface = compositor.create_surface(CLIENT_A, 3).unwrap();
        let buffer = compositor.create_buffer(CLIENT_A, 4, BufferSpec::argb8888(10, 10)).unwrap();

        compositor.surface_attach(surface, Some(buffer), 0, 0);
        compositor.surface_commit(surface);
        compositor.surface_attach(surface, Some(buffer), 0, 0);
        compositor.destroy_resource(buffer);

        let state = compositor.surface(surface).unwrap();
        assert_eq!(state.buffer(), None);
        assert_eq!(state.pending_buffer(), None);
        // a later commit must not touch the dead buffer
        compositor.surface_commit(surface);
        assert!(compositor.take_messages().is_empty());
    }

    #[test]
    fn test_attach_offsets_accumulate() {
        let mut compositor = compositor();
        let surface = compositor.create_surface(CLIENT_A, 3).unwrap();
        compositor.surface_attach(surface, None, 5, -2);
        compositor.surface_commit(surface);
        compositor.surface_attach(surface, None, 1, 1);
        compositor.surface_commit(surface);
        assert_eq!(compositor.surface(surface).unwrap().offset(), (6, -1));
    }

    #[test]
    fn test_frame_callbacks_fire_in_commit_order() {
        let mut compositor = compositor();
        let a = compositor.create_surface(CLIENT_A, 3).unwrap();
        let b = compositor.create_surface(CLIENT_B, 3).unwrap();

        let first = compositor.surface_frame(b, 10).unwrap();
        let second = compositor.surface_frame(a, 11).unwrap();
        let third = compositor.surface_frame(a, 12).unwrap();
        compositor.surface_commit(b);
        // only callbacks requested before the commit are spliced
        compositor.surface_commit(a);
        let late = compositor.surface_frame(a, 13).unwrap();

        assert_eq!(compositor.frame_callbacks(), &[first, second, third]);
        compositor.frame_done(1234);

        let done: Vec<ResourceId> = compositor
            .take_messages()
            .iter()
            .filter(|m| matches!(m.event(), Some(Event::CallbackDone { time: 1234 })))
            .filter_map(Message::target)
            .collect();
        assert_eq!(done, vec![first, second, third]);
        assert!(!compositor.is_alive(first));
        assert!(compositor.frame_callbacks().is_empty());
        assert_eq!(compositor.surface(a).unwrap().pending_frame_callbacks(), &[late]);
    }

    #[test]
    fn test_destroyed_callback_leaves_queue() {
        let mut compositor = compositor();
        let surface = compositor.create_surface(CLIENT_A, 3).unwrap();
        let callback = compositor.surface_frame(surface, 10).unwrap();
        compositor.surface_commit(surface);
        compositor.destroy_resource(callback);

        compositor.frame_done(1);
        assert!(compositor.take_messages().is_empty());
    }

    #[test]
    fn test_surface_destroy_releases_and_cleans_up() {
        let mut compositor = compositor();
        let surface = compositor.create_surface(CLIENT_A, 3).unwrap();
        let current = compositor.create_buffer(CLIENT_A, 4, BufferSpec::argb8888(10, 10)).unwrap();
        let pending = compositor.create_buffer(CLIENT_A, 5, BufferSpec::argb8888(10, 10)).unwrap();

        compositor.surface_attach(surface, Some(current), 0, 0);
        compositor.surface_commit(surface);
        compositor.surface_attach(surface, Some(pending), 0, 0);
        let callback = compositor.surface_frame(surface, 6).unwrap();
        compositor.take_messages();

        compositor.destroy_resource(surface);

        let messages = compositor.take_messages();
        assert_eq!(releases(&messages, current), 1);
        assert_eq!(releases(&messages, pending), 1);
        assert!(!compositor.is_alive(callback));
        assert!(compositor.surfaces().is_empty());
        assert!(compositor.renderer().nodes().is_empty());
        assert_eq!(compositor.buffer(current).unwrap().busy_count(), 0);
    }

    #[test]
    fn test_attach_rejects_non_buffer_argument() {
        let mut compositor = compositor();
        let surface = compositor.create_surface(CLIENT_A, 3).unwrap();
        let region = compositor.create_region(CLIENT_A, 4).unwrap();

        compositor.surface_attach(surface, Some(region), 0, 0);
        let messages = compositor.take_messages();
        assert!(matches!(messages.as_slice(), [Message::Error { client, .. }] if *client == CLIENT_A));
        assert_eq!(compositor.surface(surface).unwrap().pending_buffer(), None);
    }

    #[test]
    fn test_region_requests() {
        let mut compositor = compositor();
        let region = compositor.create_region(CLIENT_A, 4).unwrap();
        compositor.region_add(region, 0, 0, 20, 20);
        compositor.region_subtract(region, 10, 0, 10, 20);
        assert_eq!(compositor.region(region).unwrap().area(), 200);

        let surface = compositor.create_surface(CLIENT_A, 3).unwrap();
        compositor.surface_set_input_region(surface, Some(region));
        compositor.surface_set_opaque_region(surface, None);
        assert!(compositor.take_messages().is_empty());

        compositor.destroy_resource(region);
        assert!(compositor.region(region).is_none());
    }

    #[derive(Debug, Clone)]
    enum Step {
        Attach(usize),
        AttachNone,
        Commit,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (0usize..3).prop_map(Step::Attach),
            Just(Step::AttachNone),
            Just(Step::Commit),
        ]
    }

    proptest! {
        #[test]
        fn prop_busy_count_matches_slot_references(steps in prop::collection::vec(step(), 1..40)) {
            let mut compositor = compositor();
            let surface = compositor.create_surface(CLIENT_A, 3).unwrap();
            let buffers: Vec<ResourceId> = (0..3)
                .map(|i| compositor.create_buffer(CLIENT_A, 10 + i, BufferSpec::argb8888(8, 8)).unwrap())
                .collect();
            let mut released = vec![0usize; buffers.len()];
            let mut was_busy = vec![false; buffers.len()];

            for step in steps {
                match step {
                    Step::Attach(i) => compositor.surface_attach(surface, Some(buffers[i]), 0, 0),
                    Step::AttachNone => compositor.surface_attach(surface, None, 0, 0),
                    Step::Commit => compositor.surface_commit(surface),
                }
                let messages = compositor.take_messages();
                let state = compositor.surface(surface).unwrap();
                for (i, buffer) in buffers.iter().enumerate() {
                    let slots = [state.buffer(), state.pending_buffer()]
                        .iter()
                        .filter(|slot| **slot == Some(*buffer))
                        .count() as u32;
                    let busy = compositor.buffer(*buffer).unwrap().busy_count();
                    prop_assert_eq!(busy, slots);

                    let new_releases = releases(&messages, *buffer);
                    released[i] += new_releases;
                    // a release is sent exactly when the count falls to zero
                    prop_assert_eq!(new_releases == 1, was_busy[i] && busy == 0);
                    prop_assert!(new_releases <= 1);
                    was_busy[i] = busy > 0;
                }
            }
        }
    }
}

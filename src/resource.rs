//! Resource registry
//!
//! Every client-visible object lives in one arena slot addressed by a
//! [`ResourceId`]. A slot carries a generation counter, so a handle kept past
//! the object's destruction never aliases whatever reuses the slot later.
//!
//! Objects that refer to each other do so weakly: the holder registers a
//! destroy listener on the target and clears its reference when that listener
//! fires. Listeners are plain values of the registry's listener type `L`; the
//! owner of the registry decides what each one means.
//!
//! Destruction happens in two phases so the owner can run listeners while the
//! dying object is still resolvable:
//!
//! ```
//! use tessera::resource::{ClientId, Interface, ResourceRegistry};
//!
//! let mut registry: ResourceRegistry<&'static str> = ResourceRegistry::new();
//! let surface = registry.create(Interface::Surface, 3, ClientId(1)).unwrap();
//! registry.add_destroy_listener(surface, "clear focus");
//!
//! let mut fired = Vec::new();
//! registry.destroy(surface, |_, listener| fired.push(listener));
//! assert_eq!(fired, vec!["clear focus"]);
//! assert!(!registry.is_alive(surface));
//! ```

use crate::error::RegistryError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identity of a client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub u32);

/// Generation-checked handle to a resource slot
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    index: u32,
    generation: u32,
}

impl ResourceId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Protocol interface implemented by a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interface {
    Surface,
    Region,
    Buffer,
    Callback,
    ShellSurface,
    Output,
    Seat,
    Pointer,
    Keyboard,
    DataDevice,
    DataSource,
    DataOffer,
}

/// Identifies one registered destroy listener so it can be removed again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken {
    resource: ResourceId,
    seq: u64,
}

impl ListenerToken {
    /// Resource the listener is attached to
    pub fn resource(&self) -> ResourceId {
        self.resource
    }
}

/// Bookkeeping for one live resource
#[derive(Debug)]
pub struct ResourceEntry<L> {
    pub interface: Interface,
    /// Object id on the owning client's connection
    pub protocol_id: u32,
    pub client: ClientId,
    created: u64,
    listeners: Vec<(u64, L)>,
    destroying: bool,
}

impl<L> ResourceEntry<L> {
    /// True once destruction has started and listeners have been handed out
    pub fn is_destroying(&self) -> bool {
        self.destroying
    }
}

#[derive(Debug)]
struct Slot<L> {
    generation: u32,
    entry: Option<ResourceEntry<L>>,
}

/// Arena of client-visible objects with ordered destroy notification
#[derive(Debug)]
pub struct ResourceRegistry<L> {
    slots: Vec<Slot<L>>,
    free: Vec<u32>,
    next_seq: u64,
    live: usize,
}

impl<L> ResourceRegistry<L> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            next_seq: 0,
            live: 0,
        }
    }

    /// Allocates a slot for a new resource owned by `client`.
    ///
    /// Storage is reserved fallibly; the error is meant to be reported to the
    /// client as a no-memory condition.
    pub fn create(
        &mut self,
        interface: Interface,
        protocol_id: u32,
        client: ClientId,
    ) -> Result<ResourceId, RegistryError> {
        let created = self.bump_seq();
        let entry = ResourceEntry {
            interface,
            protocol_id,
            client,
            created,
            listeners: Vec::new(),
            destroying: false,
        };

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots
                    .try_reserve(1)
                    .map_err(|_| RegistryError::OutOfMemory(interface))?;
                self.slots.push(Slot {
                    generation: 0,
                    entry: None,
                });
                (self.slots.len() - 1) as u32
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.entry = Some(entry);
        self.live += 1;
        Ok(ResourceId::new(index, slot.generation))
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn slot(&self, id: ResourceId) -> Option<&ResourceEntry<L>> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    fn slot_mut(&mut self, id: ResourceId) -> Option<&mut ResourceEntry<L>> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    pub fn get(&self, id: ResourceId) -> Option<&ResourceEntry<L>> {
        self.slot(id)
    }

    /// True while the handle still names its original object, including
    /// during that object's destroy notification.
    pub fn is_alive(&self, id: ResourceId) -> bool {
        self.slot(id).is_some()
    }

    pub fn client(&self, id: ResourceId) -> Option<ClientId> {
        self.slot(id).map(|entry| entry.client)
    }

    pub fn interface(&self, id: ResourceId) -> Option<Interface> {
        self.slot(id).map(|entry| entry.interface)
    }

    /// True if `id` is alive and implements `interface`
    pub fn is_a(&self, id: ResourceId, interface: Interface) -> bool {
        self.interface(id) == Some(interface)
    }

    /// Number of live resources
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Registers `listener` to be handed back when `id` is destroyed.
    ///
    /// Registering on a stale handle is accepted and never fires.
    pub fn add_destroy_listener(&mut self, id: ResourceId, listener: L) -> ListenerToken {
        let seq = self.bump_seq();
        if let Some(entry) = self.slot_mut(id) {
            entry.listeners.push((seq, listener));
        }
        ListenerToken { resource: id, seq }
    }

    /// Drops a listener. Returns it if it had not fired yet.
    pub fn remove_destroy_listener(&mut self, token: ListenerToken) -> Option<L> {
        let entry = self.slot_mut(token.resource)?;
        let position = entry.listeners.iter().position(|(seq, _)| *seq == token.seq)?;
        Some(entry.listeners.remove(position).1)
    }

    /// First phase of destruction: marks the resource as dying and returns its
    /// listeners in registration order. The handle stays resolvable until
    /// [`finish_destroy`](Self::finish_destroy).
    ///
    /// # Panics
    ///
    /// Destroying a dead resource, or one already being destroyed, is a bug in
    /// the caller.
    pub fn begin_destroy(&mut self, id: ResourceId) -> Vec<L> {
        let entry = match self.slot_mut(id) {
            Some(entry) => entry,
            None => panic!("resource {:?} destroyed twice", id),
        };
        assert!(!entry.destroying, "resource {:?} destroyed twice", id);
        entry.destroying = true;
        std::mem::take(&mut entry.listeners)
            .into_iter()
            .map(|(_, listener)| listener)
            .collect()
    }

    /// Second phase of destruction: frees the slot and invalidates every handle to it.
    pub fn finish_destroy(&mut self, id: ResourceId) {
        let slot = &mut self.slots[id.index as usize];
        assert!(
            slot.generation == id.generation && slot.entry.is_some(),
            "resource {:?} freed twice",
            id
        );
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
    }

    /// Destroys `id`, handing each listener to `notify` in registration order
    /// before the slot is freed.
    pub fn destroy(&mut self, id: ResourceId, mut notify: impl FnMut(ResourceId, L)) {
        for listener in self.begin_destroy(id) {
            notify(id, listener);
        }
        self.finish_destroy(id);
    }

    /// First resource in `list` owned by `client`
    pub fn find(&self, list: &[ResourceId], client: ClientId) -> Option<ResourceId> {
        list.iter()
            .copied()
            .find(|id| self.client(*id) == Some(client))
    }

    /// Live resources owned by `client`, oldest first
    pub fn resources_of(&self, client: ClientId) -> Vec<ResourceId> {
        let mut owned: Vec<(u64, ResourceId)> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let entry = slot.entry.as_ref()?;
                (entry.client == client && !entry.destroying)
                    .then(|| (entry.created, ResourceId::new(index as u32, slot.generation)))
            })
            .collect();
        owned.sort_unstable_by_key(|(created, _)| *created);
        owned.into_iter().map(|(_, id)| id).collect()
    }
}

impl<L> Default for ResourceRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}

/// Display-wide serial generator
///
/// Serials wrap around; ordering between two serials is only meaningful
/// through [`serial_is_newer`].
#[derive(Debug, Clone, Default)]
pub struct SerialCounter {
    last: u32,
}

impl SerialCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the counter just below `start`, mainly for wraparound tests
    pub fn starting_at(start: u32) -> Self {
        Self {
            last: start.wrapping_sub(1),
        }
    }

    pub fn next_serial(&mut self) -> u32 {
        self.last = self.last.wrapping_add(1);
        self.last
    }

    /// Most recently handed out serial
    pub fn last(&self) -> u32 {
        self.last
    }
}

/// True if `current` is at least as recent as `candidate` under wraparound.
///
/// A distance below half the serial space counts as "in the past".
pub fn serial_is_newer(current: u32, candidate: u32) -> bool {
    current.wrapping_sub(candidate) < u32::MAX / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destroy_runs_listeners_in_registration_order() {
        let mut registry = ResourceRegistry::new();
        let id = registry.create(Interface::Buffer, 7, ClientId(1)).unwrap();
        registry.add_destroy_listener(id, 1);
        registry.add_destroy_listener(id, 2);
        registry.add_destroy_listener(id, 3);

        let mut order = Vec::new();
        registry.destroy(id, |_, l| order.push(l));
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_removed_listener_does_not_fire() {
        let mut registry = ResourceRegistry::new();
        let id = registry.create(Interface::Buffer, 7, ClientId(1)).unwrap();
        let keep = registry.add_destroy_listener(id, "keep");
        let drop = registry.add_destroy_listener(id, "drop");
        assert_eq!(registry.remove_destroy_listener(drop), Some("drop"));
        assert_eq!(registry.remove_destroy_listener(drop), None);
        assert_eq!(keep.resource(), id);

        let mut fired = Vec::new();
        registry.destroy(id, |_, l| fired.push(l));
        assert_eq!(fired, vec!["keep"]);
    }

    #[test]
    fn test_stale_handle_never_aliases_reused_slot() {
        let mut registry: ResourceRegistry<()> = ResourceRegistry::new();
        let old = registry.create(Interface::Surface, 3, ClientId(1)).unwrap();
        registry.destroy(old, |_, _| {});

        let new = registry.create(Interface::Surface, 3, ClientId(2)).unwrap();
        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert!(!registry.is_alive(old));
        assert_eq!(registry.client(new), Some(ClientId(2)));
        assert_eq!(registry.client(old), None);
    }

    #[test]
    fn test_resource_resolvable_during_notification() {
        let mut registry = ResourceRegistry::new();
        let id = registry.create(Interface::DataSource, 9, ClientId(4)).unwrap();
        registry.add_destroy_listener(id, ());

        let listeners = registry.begin_destroy(id);
        assert_eq!(listeners.len(), 1);
        assert!(registry.is_alive(id));
        assert!(registry.get(id).unwrap().is_destroying());
        registry.finish_destroy(id);
        assert!(!registry.is_alive(id));
    }

    #[test]
    #[should_panic(expected = "destroyed twice")]
    fn test_double_destroy_panics() {
        let mut registry: ResourceRegistry<()> = ResourceRegistry::new();
        let id = registry.create(Interface::Callback, 1, ClientId(1)).unwrap();
        registry.destroy(id, |_, _| {});
        registry.destroy(id, |_, _| {});
    }

    #[test]
    #[should_panic(expected = "destroyed twice")]
    fn test_reentrant_destroy_panics() {
        let mut registry: ResourceRegistry<()> = ResourceRegistry::new();
        let id = registry.create(Interface::Callback, 1, ClientId(1)).unwrap();
        registry.begin_destroy(id);
        registry.begin_destroy(id);
    }

    #[test]
    fn test_find_scans_binding_list_by_client() {
        let mut registry: ResourceRegistry<()> = ResourceRegistry::new();
        let a = registry.create(Interface::Pointer, 10, ClientId(1)).unwrap();
        let b = registry.create(Interface::Pointer, 11, ClientId(2)).unwrap();
        let list = vec![a, b];

        assert_eq!(registry.find(&list, ClientId(2)), Some(b));
        assert_eq!(registry.find(&list, ClientId(3)), None);
    }

    #[test]
    fn test_resources_of_client_in_creation_order() {
        let mut registry: ResourceRegistry<()> = ResourceRegistry::new();
        let first = registry.create(Interface::Surface, 3, ClientId(1)).unwrap();
        let other = registry.create(Interface::Surface, 3, ClientId(2)).unwrap();
        registry.destroy(other, |_, _| {});
        // reuses the freed slot
        let second = registry.create(Interface::Buffer, 4, ClientId(1)).unwrap();

        assert_eq!(registry.resources_of(ClientId(1)), vec![first, second]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_serial_wraparound_ordering() {
        assert!(serial_is_newer(5, 5));
        assert!(serial_is_newer(6, 5));
        assert!(!serial_is_newer(5, 6));
        // 2 was handed out after u32::MAX wrapped
        assert!(serial_is_newer(2, u32::MAX - 1));
        assert!(!serial_is_newer(u32::MAX - 1, 2));

        let mut serials = SerialCounter::starting_at(u32::MAX);
        assert_eq!(serials.next_serial(), u32::MAX);
        assert_eq!(serials.next_serial(), 0);
        assert_eq!(serials.last(), 0);
    }
}

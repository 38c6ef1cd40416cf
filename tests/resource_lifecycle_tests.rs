// Resource lifecycle integration tests for tessera
//
// Tests the creation and destruction patterns for core resources including
// surfaces, shell surfaces, regions and global bindings.

use tessera::error::ProtocolError;
use tessera::events::Message;
use tessera::input::keymap::Keymap;
use tessera::region::Rectangle;
use tessera::resource::{ClientId, Interface, ResourceRegistry};
use tessera::shell::ShellSurfaceRequest;
use tessera::{Compositor, HeadlessRenderer, TesseraConfig};

const CLIENT: ClientId = ClientId(3);

fn compositor() -> Compositor<HeadlessRenderer> {
    let keymap = Keymap::from_string("xkb_keymap { };").unwrap();
    Compositor::with_keymap(TesseraConfig::default(), keymap, HeadlessRenderer::new())
}

#[test]
fn test_registry_slot_reuse() {
    let mut registry: ResourceRegistry<u32> = ResourceRegistry::new();

    // Create a handful of resources
    let ids: Vec<_> = (0..3)
        .map(|i| registry.create(Interface::Surface, 10 + i, CLIENT).unwrap())
        .collect();
    assert_eq!(registry.len(), 3);

    // Remove the middle one
    registry.destroy(ids[1], |_, _| {});
    assert!(registry.is_alive(ids[0]));
    assert!(!registry.is_alive(ids[1]));
    assert!(registry.is_alive(ids[2]));

    // The freed slot comes back under a new generation
    let reused = registry.create(Interface::Region, 20, CLIENT).unwrap();
    assert_eq!(reused.index(), ids[1].index());
    assert_ne!(reused.generation(), ids[1].generation());
    assert_eq!(registry.interface(ids[1]), None);
    assert_eq!(registry.interface(reused), Some(Interface::Region));

    // Listeners registered on the stale handle never fire
    registry.add_destroy_listener(ids[1], 99);
    let mut fired = Vec::new();
    registry.destroy(reused, |_, l| fired.push(l));
    assert!(fired.is_empty());
}

#[test]
fn test_shell_surface_follows_its_surface() {
    let mut compositor = compositor();
    let surface = compositor.create_surface(CLIENT, 3).unwrap();
    let shell = compositor.get_shell_surface(CLIENT, 4, surface).unwrap();
    assert!(compositor.surface(surface).unwrap().has_shell_surface());

    compositor.shell_surface_request(
        shell,
        ShellSurfaceRequest::SetTitle {
            title: "notes".to_string(),
        },
    );
    assert_eq!(compositor.shell_surface(shell).unwrap().title(), Some("notes"));

    compositor.destroy_resource(surface);
    assert!(!compositor.is_alive(shell));
    assert!(compositor.shell_surface(shell).is_none());
}

#[test]
fn test_shell_role_can_be_reassigned_after_destroy() {
    let mut compositor = compositor();
    let surface = compositor.create_surface(CLIENT, 3).unwrap();
    let shell = compositor.get_shell_surface(CLIENT, 4, surface).unwrap();

    // Second role while the first is alive is an error
    assert!(compositor.get_shell_surface(CLIENT, 5, surface).is_none());
    let messages = compositor.take_messages();
    assert!(matches!(
        messages.as_slice(),
        [Message::Error { error: ProtocolError::RoleAlreadyAssigned { .. }, .. }]
    ));

    compositor.destroy_resource(shell);
    assert!(!compositor.surface(surface).unwrap().has_shell_surface());
    assert!(compositor.get_shell_surface(CLIENT, 6, surface).is_some());
}

#[test]
fn test_region_lifecycle() {
    let mut compositor = compositor();
    let region = compositor.create_region(CLIENT, 3).unwrap();

    compositor.region_add(region, 0, 0, 100, 100);
    compositor.region_subtract(region, 0, 0, 50, 100);
    let state = compositor.region(region).unwrap();
    assert_eq!(state.area(), 5000);
    assert_eq!(state.extents(), Some(Rectangle::new(50, 0, 50, 100)));

    let surface = compositor.create_surface(CLIENT, 4).unwrap();
    compositor.surface_set_input_region(surface, Some(region));
    compositor.surface_set_opaque_region(surface, None);
    assert!(compositor.take_messages().is_empty());

    compositor.destroy_resource(region);
    assert!(compositor.region(region).is_none());

    // A dead region is an invalid argument
    compositor.surface_set_opaque_region(surface, Some(region));
    assert!(matches!(
        compositor.take_messages().as_slice(),
        [Message::Error { client: CLIENT, .. }]
    ));
}

#[test]
fn test_global_bindings_are_dropped_on_destroy() {
    let mut compositor = compositor();
    let output = compositor.bind_output(CLIENT, 3).unwrap();
    let seat = compositor.bind_seat(CLIENT, 4).unwrap();
    let pointer = compositor.get_pointer(seat, 5).unwrap();
    let keyboard = compositor.get_keyboard(seat, 6).unwrap();

    assert_eq!(compositor.output().resources(), &[output]);
    assert_eq!(compositor.seat().resources(), &[seat]);

    compositor.client_disconnected(CLIENT);
    assert!(compositor.output().resources().is_empty());
    assert!(compositor.seat().resources().is_empty());
    assert!(!compositor.seat().pointer.resources().contains(&pointer));
    assert!(!compositor.seat().keyboard.resources().contains(&keyboard));
    assert!(compositor.registry().is_empty());
}

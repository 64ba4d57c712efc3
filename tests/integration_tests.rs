//! Integration tests for the Alcove compositor core.
//!
//! These drive the full stack the way an embedding host would: start
//! the server, play a client through the toolkit's client-side API,
//! and observe views, focus, frames and notifications.

use anyhow::Result;
use std::cell::RefCell;
use std::rc::Rc;

use alcove::{
    config::AlcoveConfig,
    render::{FrameCapture, RenderMode},
    server::{Notification, Server},
    shell::ViewState,
    toolkit::{DecorationMode, OutputMode, ToplevelId},
};

fn started_server() -> Result<Server> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut server = Server::new(AlcoveConfig::default())?;
    server.initialize()?;
    server.start()?;
    Ok(server)
}

/// Run a client through create → initial commit → ack → buffer commit,
/// leaving one mapped view behind.
fn open_window(server: &mut Server, title: &str) -> ToplevelId {
    let t = server.display_mut().client_create_toplevel();
    server.dispatch_events();
    server.display_mut().client_set_title(t, title);
    server.display_mut().client_commit(t);
    server.dispatch_events();
    server.display_mut().client_ack_configure(t);
    server.display_mut().client_attach_buffer(t, 640, 480, 0xFF33_6699);
    server.display_mut().client_commit(t);
    server.dispatch_events();
    t
}

/// Startup surfaces the socket name and the running transition, and
/// binds exactly one primary output — but only after the backend
/// started.
#[test]
fn startup_order_and_primary_output() -> Result<()> {
    let notes = Rc::new(RefCell::new(Vec::new()));
    let sink = notes.clone();

    let mut server = Server::new(AlcoveConfig::default())?;
    server.set_notification_sink(move |n| sink.borrow_mut().push(n));
    server.initialize()?;

    // Output creation before backend start must be refused.
    assert!(server.display_mut().headless_add_output(1280, 720).is_err());
    assert_eq!(server.outputs().count(), 0);

    server.start()?;
    assert!(server.is_running());
    assert_eq!(server.outputs().count(), 1);
    assert_eq!(
        server.outputs().primary().map(|o| (o.width, o.height)),
        Some((1280, 720))
    );
    assert!(server.seat().keyboard_attached());

    let notes = notes.borrow();
    assert!(matches!(notes[0], Notification::SocketReady(ref s) if s.starts_with("alcove-")));
    assert!(notes.contains(&Notification::RunningChanged(true)));
    assert_eq!(server.socket_name(), Some(notes_socket(&notes).as_str()));
    Ok(())
}

fn notes_socket(notes: &[Notification]) -> String {
    match &notes[0] {
        Notification::SocketReady(s) => s.clone(),
        other => panic!("expected SocketReady first, got {:?}", other),
    }
}

/// The scene attachment exists iff the view is mapped, across the whole
/// create → map → unmap → re-map → destroy cycle.
#[test]
fn scene_attachment_tracks_mapped_state() -> Result<()> {
    let mut server = started_server()?;

    let t = server.display_mut().client_create_toplevel();
    server.dispatch_events();
    assert_eq!(server.view_count(), 1);
    assert!(server.views()[0].scene_tree.is_none());
    assert_eq!(server.views()[0].state, ViewState::AwaitingInitialCommit);

    server.display_mut().client_commit(t);
    server.dispatch_events();
    assert_eq!(server.views()[0].state, ViewState::Configured);
    assert!(server.views()[0].scene_tree.is_none());

    server.display_mut().client_ack_configure(t);
    server.display_mut().client_attach_buffer(t, 320, 240, 0xFF00_FF00);
    server.display_mut().client_commit(t);
    server.dispatch_events();
    assert_eq!(server.views()[0].state, ViewState::Mapped);
    assert!(server.views()[0].scene_tree.is_some());

    server.display_mut().client_unmap(t);
    server.dispatch_events();
    assert_eq!(server.views()[0].state, ViewState::Unmapped);
    assert!(server.views()[0].scene_tree.is_none());
    // The view stays in the list: it may re-map.
    assert_eq!(server.view_count(), 1);

    server.display_mut().client_commit(t);
    server.dispatch_events();
    assert_eq!(server.views()[0].state, ViewState::Mapped);
    assert!(server.views()[0].scene_tree.is_some());

    server.display_mut().client_unmap(t);
    server.display_mut().client_destroy(t);
    server.dispatch_events();
    assert_eq!(server.view_count(), 0);
    Ok(())
}

/// Exactly one initial configure goes out, and it goes out before the
/// map — a client that commits repeatedly before mapping still sees one.
#[test]
fn initial_configure_sent_exactly_once() -> Result<()> {
    let mut server = started_server()?;

    let t = server.display_mut().client_create_toplevel();
    server.dispatch_events();
    server.display_mut().client_commit(t);
    server.dispatch_events();

    let after_initial = server.display().client_stats(t).unwrap().configures_sent;
    assert_eq!(after_initial, 1);

    // More commits without mapping do not re-send.
    server.display_mut().client_commit(t);
    server.display_mut().client_commit(t);
    server.dispatch_events();
    assert_eq!(
        server.display().client_stats(t).unwrap().configures_sent,
        after_initial
    );
    Ok(())
}

/// Refocusing the already-focused view is a no-op; switching focus
/// deactivates the old view, enters the new one and reorders the list.
#[test]
fn focus_is_idempotent_and_reorders() -> Result<()> {
    let mut server = started_server()?;
    let a = open_window(&mut server, "a");
    let b = open_window(&mut server, "b");

    // b mapped last, so it is focused and at the front.
    assert_eq!(server.view_title(0).as_deref(), Some("b"));
    let enters_b = server.display().client_stats(b).unwrap().keyboard_enters;
    assert_eq!(enters_b, 1);

    // Refocus the focused view: nothing moves, nothing is re-sent.
    server.focus_view(0);
    assert_eq!(
        server.display().client_stats(b).unwrap().keyboard_enters,
        enters_b
    );

    // Focus a: b is deactivated and left, a is entered and raised.
    server.focus_view(1);
    assert_eq!(server.view_title(0).as_deref(), Some("a"));
    assert_eq!(server.seat().focused_view(), Some(server.views()[0].id));
    assert_eq!(server.display().client_stats(a).unwrap().keyboard_enters, 2);
    assert_eq!(server.display().client_stats(b).unwrap().keyboard_leaves, 1);
    Ok(())
}

/// A destroy that arrives while the view is still mapped replays the
/// unmap path; a duplicate destroy is absorbed without touching state.
#[test]
fn destroy_without_unmap_tears_down_once() -> Result<()> {
    let notes = Rc::new(RefCell::new(Vec::new()));
    let sink = notes.clone();
    let mut server = started_server()?;
    server.set_notification_sink(move |n| sink.borrow_mut().push(n));

    let t = open_window(&mut server, "rude");
    assert_eq!(server.view_count(), 1);

    server.display_mut().client_destroy(t);
    server.display_mut().client_destroy(t);
    server.dispatch_events();

    assert_eq!(server.view_count(), 0);
    let removed = notes
        .borrow()
        .iter()
        .filter(|n| matches!(n, Notification::ViewRemoved(_)))
        .count();
    assert_eq!(removed, 1);
    Ok(())
}

/// Pointer focus follows the hit-test: enter once while inside, leave
/// when moving off, enter again when coming back.
#[test]
fn pointer_enter_leave_cycle() -> Result<()> {
    let mut server = started_server()?;
    let t = open_window(&mut server, "target");

    // View sits at the configured default position (50, 50).
    server.pointer_motion(100.0, 100.0);
    server.pointer_motion(110.0, 110.0);
    let stats = server.display().client_stats(t).unwrap();
    assert_eq!(stats.pointer_enters, 1);
    assert_eq!(stats.motions, 2);

    server.pointer_motion(5.0, 5.0);
    let stats = server.display().client_stats(t).unwrap();
    assert_eq!(stats.pointer_leaves, 1);
    assert!(server.seat().pointer_focus().is_none());

    server.pointer_motion(100.0, 100.0);
    assert_eq!(server.display().client_stats(t).unwrap().pointer_enters, 2);

    // Click-to-focus forwards the button and keeps focus where it is.
    server.pointer_button(0x110, true);
    server.pointer_button(0x110, false);
    assert_eq!(server.display().client_stats(t).unwrap().buttons, 2);
    Ok(())
}

/// Clicking the background deselects nothing: keyboard focus stays on
/// the focused view, and no button event goes anywhere.
#[test]
fn background_click_keeps_keyboard_focus() -> Result<()> {
    let mut server = started_server()?;
    let t = open_window(&mut server, "steady");
    let focused = server.seat().focused_view();
    assert!(focused.is_some());

    server.pointer_motion(5.0, 5.0);
    assert!(server.seat().pointer_focus().is_none());

    server.pointer_button(0x110, true);
    server.pointer_button(0x110, false);
    assert_eq!(server.seat().focused_view(), focused);
    assert_eq!(server.display().client_stats(t).unwrap().buttons, 0);
    Ok(())
}

/// Key and modifier events reach the focused client with the held-key
/// set tracked across presses.
#[test]
fn keys_reach_the_focused_client() -> Result<()> {
    let mut server = started_server()?;
    let t = open_window(&mut server, "typing");

    server.send_key(30, true);
    server.send_key(30, false);
    server.send_modifiers(alcove::toolkit::Modifiers {
        depressed: 1,
        ..Default::default()
    });

    let stats = server.display().client_stats(t).unwrap();
    assert_eq!(stats.keys, 2);
    assert_eq!(stats.modifier_events, 1);
    Ok(())
}

/// The full embedding scenario: open → viewAdded(0) and title, resize
/// via requestResize reflected after the client's next commit, close →
/// close request delivered, client exit yields viewRemoved and an empty
/// list.
#[test]
fn end_to_end_embedding_scenario() -> Result<()> {
    let notes = Rc::new(RefCell::new(Vec::new()));
    let sink = notes.clone();
    let mut server = started_server()?;
    server.set_notification_sink(move |n| sink.borrow_mut().push(n));

    let t = open_window(&mut server, "editor");
    assert!(notes.borrow().contains(&Notification::ViewAdded(0)));
    assert_eq!(server.view_count(), 1);
    assert_eq!(server.view_title(0).as_deref(), Some("editor"));

    // Host asks for 800x600; the client obeys on its next commit.
    server.request_resize(0, 800, 600);
    server.display_mut().client_ack_configure(t);
    server.display_mut().client_attach_buffer(t, 800, 600, 0xFF11_2233);
    server.display_mut().client_commit(t);
    server.dispatch_events();
    assert_eq!(server.view_geometry(0), Some((800, 600)));
    assert!(notes.borrow().contains(&Notification::FrameReady));
    assert!(notes.borrow().contains(&Notification::CommitOccurred));

    // Host closes the window; the client shuts itself down.
    server.close_view(0);
    assert_eq!(server.display().client_stats(t).unwrap().close_requests, 1);
    server.display_mut().client_unmap(t);
    server.display_mut().client_destroy(t);
    server.dispatch_events();

    assert!(notes.borrow().contains(&Notification::ViewRemoved(0)));
    assert_eq!(server.view_count(), 0);
    Ok(())
}

/// CPU mode capture yields a pixel snapshot of the composed primary
/// output; per-view frames come back at the committed surface size.
#[test]
fn frame_capture_in_cpu_mode() -> Result<()> {
    let mut server = started_server()?;
    assert_eq!(server.render_mode(), Some(RenderMode::Cpu));

    let t = open_window(&mut server, "painted");
    // A commit while mapped composes the scene into the output.
    server.display_mut().client_attach_buffer(t, 640, 480, 0xFFAB_CDEF);
    server.display_mut().client_commit(t);
    server.dispatch_events();

    match server.capture_frame() {
        Some(FrameCapture::Pixels {
            width,
            height,
            stride,
            data,
            ..
        }) => {
            assert_eq!((width, height), (1280, 720));
            assert_eq!(stride, 1280 * 4);
            assert_eq!(data.len(), (stride * height) as usize);
        }
        other => panic!("expected a pixel capture, got {:?}", other),
    }

    let frame = server.view_frame(0).expect("view frame");
    assert_eq!((frame.width, frame.height), (640, 480));
    assert_eq!(frame.data.len(), (frame.stride * frame.height) as usize);

    // Caller-buffer readbacks clip to the destination.
    let mut dest = vec![0u8; 4 * 4 * 4];
    assert!(server.render_frame_into(&mut dest, 4, 4, 16));
    let mut dest = vec![0u8; 4 * 4 * 4];
    assert!(server.render_view_into(0, &mut dest, 4, 4, 16));
    assert_eq!(&dest[0..4], &0xFFAB_CDEFu32.to_le_bytes()[..]);

    // The frame-done timestamp reached the rendered client.
    assert!(server.display().toplevel_last_frame_done(t).is_some());
    server.flush_clients();
    Ok(())
}

/// Views that never committed content still yield a placeholder frame
/// so the host always has something to draw.
#[test]
fn placeholder_frame_for_empty_views() -> Result<()> {
    let mut server = started_server()?;
    let _t = server.display_mut().client_create_toplevel();
    server.dispatch_events();

    let frame = server.view_frame(0).expect("placeholder frame");
    assert_eq!((frame.width, frame.height), (640, 480));
    Ok(())
}

/// Outputs that advertise a preferred mode keep it; host state requests
/// resize bound outputs; removal unbinds them.
#[test]
fn preferred_mode_and_state_requests() -> Result<()> {
    let mut server = started_server()?;

    let id = server.display_mut().add_output_with_mode(OutputMode {
        width: 1920,
        height: 1080,
        refresh: 60_000,
    })?;
    server.dispatch_events();
    assert_eq!(server.outputs().count(), 2);
    let out = server.outputs().outputs.iter().find(|o| o.id == id).unwrap();
    assert_eq!((out.width, out.height), (1920, 1080));

    server.display_mut().request_output_state(id, 800, 600);
    server.dispatch_events();
    let out = server.outputs().outputs.iter().find(|o| o.id == id).unwrap();
    assert_eq!((out.width, out.height), (800, 600));

    server.display_mut().remove_output(id);
    server.dispatch_events();
    assert_eq!(server.outputs().count(), 1);
    Ok(())
}

/// Popup, decoration, selection and cursor requests are all absorbed:
/// popups land in the parent's subtree, decorations come back
/// server-side, the selection source is installed.
#[test]
fn auxiliary_client_requests() -> Result<()> {
    let mut server = started_server()?;
    let t = open_window(&mut server, "parent");

    server.display_mut().client_create_popup(t);
    server.display_mut().client_request_decoration(t);
    server.display_mut().client_set_selection(7);
    server.display_mut().client_request_cursor(t);
    server.dispatch_events();

    assert_eq!(
        server.display().toplevel_decoration_mode(t),
        Some(DecorationMode::ServerSide)
    );
    assert_eq!(server.display().selection(), Some(7));
    Ok(())
}

/// Client-side resize/maximize/fullscreen requests are acknowledged
/// with a fresh configure each; move requests are ignored.
#[test]
fn client_requests_are_acked_not_obeyed() -> Result<()> {
    let mut server = started_server()?;
    let t = open_window(&mut server, "pushy");

    let before = server.display().client_stats(t).unwrap().configures_sent;
    server.display_mut().client_request_move(t);
    server.display_mut().client_request_resize(t, 0x5);
    server.display_mut().client_request_maximize(t);
    server.display_mut().client_request_fullscreen(t);
    server.dispatch_events();

    let after = server.display().client_stats(t).unwrap().configures_sent;
    assert_eq!(after, before + 3);
    // Compositor-assigned position is untouched.
    assert_eq!((server.views()[0].x, server.views()[0].y), (50, 50));
    Ok(())
}

/// Stopping tears everything down in reverse order and reports the
/// running transition; stopping twice is harmless.
#[test]
fn stop_is_total_and_idempotent() -> Result<()> {
    let notes = Rc::new(RefCell::new(Vec::new()));
    let sink = notes.clone();
    let mut server = started_server()?;
    server.set_notification_sink(move |n| sink.borrow_mut().push(n));

    open_window(&mut server, "doomed");
    server.stop();
    assert!(!server.is_running());
    assert_eq!(server.view_count(), 0);
    assert_eq!(server.outputs().count(), 0);
    assert!(notes.borrow().contains(&Notification::RunningChanged(false)));

    server.stop();
    assert!(!server.is_running());
    Ok(())
}

/// Lifecycle misuse is rejected with typed errors.
#[test]
fn lifecycle_guards() -> Result<()> {
    let mut server = Server::new(AlcoveConfig::default())?;
    assert!(server.start().is_err(), "start before initialize");
    server.initialize()?;
    assert!(server.initialize().is_err(), "double initialize");
    server.start()?;
    assert!(server.start().is_err(), "double start");
    Ok(())
}

//! Single-seat input: keyboard focus, pointer hit-testing, event routing.
//!
//! The seat always advertises keyboard+pointer capabilities; a virtual
//! keyboard device may attach later (or never), and focus transfers
//! work either way, sending an empty key set until one exists.

use crate::server::Server;
use crate::shell::ViewId;
use crate::toolkit::{InputDeviceKind, Modifiers, ToplevelId};
use log::{debug, info};

#[derive(Debug)]
pub(crate) struct KeyboardState {
    pub layout: String,
    pub repeat_rate: u32,
    pub repeat_delay: u32,
    /// Currently held keys, delivered on keyboard enter
    pub pressed: Vec<u32>,
    pub mods: Modifiers,
    pub attached: bool,
}

/// The one seat of the server.
#[derive(Debug)]
pub struct Seat {
    pub name: String,
    pub(crate) keyboard: KeyboardState,
    pub(crate) focused_view: Option<ViewId>,
    pub(crate) pointer_focus: Option<ViewId>,
    pub cursor_x: f64,
    pub cursor_y: f64,
}

impl Seat {
    pub fn new(config: &crate::config::SeatConfig) -> Self {
        info!("⌨️ Seat '{}' created (layout {})", config.name, config.keyboard_layout);
        Self {
            name: config.name.clone(),
            keyboard: KeyboardState {
                layout: config.keyboard_layout.clone(),
                repeat_rate: config.repeat_rate,
                repeat_delay: config.repeat_delay,
                pressed: Vec::new(),
                mods: Modifiers::default(),
                attached: false,
            },
            focused_view: None,
            pointer_focus: None,
            cursor_x: 0.0,
            cursor_y: 0.0,
        }
    }

    pub fn focused_view(&self) -> Option<ViewId> {
        self.focused_view
    }

    pub fn pointer_focus(&self) -> Option<ViewId> {
        self.pointer_focus
    }

    pub fn keyboard_attached(&self) -> bool {
        self.keyboard.attached
    }
}

fn toplevel_of(server: &Server, view: ViewId) -> Option<ToplevelId> {
    server.views.iter().find(|v| v.id == view).map(|v| v.toplevel)
}

/// Transfer keyboard focus.
///
/// `None` (or an unmapped target) clears focus. Refocusing the current
/// target is a no-op. Otherwise: deactivate the old toplevel, keyboard
/// enter on the new one with current key/modifier state, raise its
/// scene node, move it to the front of the view list, activate it.
pub(crate) fn focus_view(server: &mut Server, target: Option<ViewId>) {
    let target = target.filter(|id| {
        server
            .views
            .iter()
            .any(|v| v.id == *id && v.mapped())
    });

    if target == server.seat.focused_view {
        return;
    }

    if let Some(prev) = server.seat.focused_view.take() {
        if let Some(toplevel) = toplevel_of(server, prev) {
            server.display.keyboard_leave(toplevel);
            server.display.toplevel_set_activated(toplevel, false);
            let _ = server.display.toplevel_schedule_configure(toplevel);
        }
    }

    let Some(id) = target else {
        debug!("⌨️ Keyboard focus cleared");
        return;
    };
    let Some(idx) = server.views.iter().position(|v| v.id == id) else {
        return;
    };
    let toplevel = server.views[idx].toplevel;

    // Empty key state is fine when no keyboard device is attached yet.
    let pressed = server.seat.keyboard.pressed.clone();
    server
        .display
        .keyboard_enter(toplevel, &pressed, server.seat.keyboard.mods);

    if let Some(tree) = server.views[idx].scene_tree {
        server.display.scene.raise_to_top(tree);
    }

    // Most-recently-focused ordering: front of the list.
    let view = server.views.remove(idx);
    server.views.insert(0, view);

    server.display.toplevel_set_activated(toplevel, true);
    let _ = server.display.toplevel_schedule_configure(toplevel);
    server.seat.focused_view = Some(id);
    debug!("⌨️ Keyboard focus -> {}", id);
}

/// Absolute pointer motion: hit-test, manage enter/leave, send motion.
pub(crate) fn pointer_motion(server: &mut Server, x: f64, y: f64) {
    server.seat.cursor_x = x;
    server.seat.cursor_y = y;
    let time = server.display.now_ms();

    let hit = server.display.scene.view_at(x, y).and_then(|(tag, sx, sy)| {
        server
            .views
            .iter()
            .find(|v| v.id.0 == tag && v.mapped())
            .map(|v| (v.id, v.toplevel, sx, sy))
    });

    let Some((id, toplevel, sx, sy)) = hit else {
        if let Some(prev) = server.seat.pointer_focus.take() {
            if let Some(t) = toplevel_of(server, prev) {
                server.display.pointer_leave(t);
            }
        }
        return;
    };

    if server.seat.pointer_focus != Some(id) {
        if let Some(prev) = server.seat.pointer_focus.take() {
            if let Some(t) = toplevel_of(server, prev) {
                server.display.pointer_leave(t);
            }
        }
        server.display.pointer_enter(toplevel, sx, sy);
        server.seat.pointer_focus = Some(id);
    }
    server.display.pointer_motion(toplevel, time, sx, sy);
}

/// Button event to the pointer-focused surface; a press on a view also
/// transfers keyboard focus (click-to-focus). A press over nothing
/// leaves keyboard focus where it is.
pub(crate) fn pointer_button(server: &mut Server, button: u32, pressed: bool) {
    let time = server.display.now_ms();
    let target = server.seat.pointer_focus;
    if let Some(toplevel) = target.and_then(|id| toplevel_of(server, id)) {
        server.display.pointer_button(toplevel, time, button, pressed);
    }
    if pressed {
        if let Some(id) = target {
            focus_view(server, Some(id));
        }
    }
}

/// Scroll event with wheel-source semantics.
pub(crate) fn pointer_axis(server: &mut Server, horizontal: bool, value: f64) {
    let time = server.display.now_ms();
    if let Some(toplevel) = server
        .seat
        .pointer_focus
        .and_then(|id| toplevel_of(server, id))
    {
        server.display.pointer_axis(toplevel, time, horizontal, value);
    }
}

/// Raw key event: track held keys, forward to the focused surface.
pub(crate) fn send_key(server: &mut Server, key: u32, pressed: bool) {
    if pressed {
        if !server.seat.keyboard.pressed.contains(&key) {
            server.seat.keyboard.pressed.push(key);
        }
    } else {
        server.seat.keyboard.pressed.retain(|k| *k != key);
    }

    let time = server.display.now_ms();
    if let Some(toplevel) = server
        .seat
        .focused_view
        .and_then(|id| toplevel_of(server, id))
    {
        server.display.keyboard_key(toplevel, time, key, pressed);
    }
}

/// Modifier update: track and forward to the focused surface.
pub(crate) fn send_modifiers(server: &mut Server, mods: Modifiers) {
    server.seat.keyboard.mods = mods;
    if let Some(toplevel) = server
        .seat
        .focused_view
        .and_then(|id| toplevel_of(server, id))
    {
        server.display.keyboard_modifiers(toplevel, mods);
    }
}

pub(crate) fn handle_new_input(server: &mut Server, kind: InputDeviceKind) {
    match kind {
        InputDeviceKind::Keyboard => {
            server.seat.keyboard.attached = true;
            info!("⌨️ Keyboard device attached to seat '{}'", server.seat.name);
        }
        InputDeviceKind::Pointer => {
            info!("🖱️ Pointer device attached to seat '{}'", server.seat.name);
        }
    }
}

/// A client published a cursor image for its pointer focus. The
/// embedded host draws its own cursor, so this is acknowledged only.
pub(crate) fn handle_cursor_image(server: &mut Server, toplevel: ToplevelId) {
    if server
        .seat
        .pointer_focus
        .and_then(|id| toplevel_of(server, id))
        == Some(toplevel)
    {
        debug!("🖱️ Cursor image from {} acknowledged", toplevel);
    }
}

/// Selection ownership passes straight through to the seat.
pub(crate) fn handle_selection(server: &mut Server, source: u32) {
    server.display.set_selection(source);
    debug!("📋 Selection source {} installed", source);
}

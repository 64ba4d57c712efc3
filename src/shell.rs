//! View lifecycle: the shell side of the compositor.
//!
//! One [`View`] per client toplevel, driven through
//! `Created → AwaitingInitialCommit → Configured → Mapped → Unmapped →
//! Destroyed`. The hard ordering rule lives here: the client gets its
//! first configure on its initial commit, and the scene attachment is
//! created at map time and released no later than unmap.

use crate::output;
use crate::seat;
use crate::server::{Notification, Server};
use crate::toolkit::{DecorationMode, ListenerSet, NodeId, ToplevelId};
use anyhow::{Context, Result};
use log::{debug, info, warn};

/// Identity of one view, stable across its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewId(pub(crate) u64);

impl std::fmt::Display for ViewId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "view#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    AwaitingInitialCommit,
    Configured,
    Mapped,
    Unmapped,
}

/// One client window under compositor management.
#[derive(Debug)]
pub struct View {
    pub id: ViewId,
    pub toplevel: ToplevelId,
    /// Compositor-assigned position
    pub x: i32,
    pub y: i32,
    pub state: ViewState,
    /// Set once the initial configure went out
    pub pending_configure: bool,
    /// Scene attachment; present iff currently mapped
    pub scene_tree: Option<NodeId>,
    pub(crate) listeners: ListenerSet,
}

impl View {
    pub fn mapped(&self) -> bool {
        self.state == ViewState::Mapped
    }
}

/// A client asked for a new toplevel: allocate the view, subscribe, and
/// append it to the server's list. No configure is sent yet.
pub(crate) fn handle_new_toplevel(server: &mut Server, toplevel: ToplevelId) {
    let id = ViewId(server.next_view_id);
    server.next_view_id += 1;

    let view = View {
        id,
        toplevel,
        x: server.config.view.default_x,
        y: server.config.view.default_y,
        state: ViewState::AwaitingInitialCommit,
        pending_configure: false,
        scene_tree: None,
        listeners: ListenerSet::new(),
    };
    info!("🪟 New toplevel {} managed as {}", toplevel, id);
    server.views.push(view);
}

/// Surface commit. The initial commit triggers the one-and-only initial
/// configure; commits while mapped drive rendering and the
/// commit/frame notifications.
pub(crate) fn handle_commit(server: &mut Server, toplevel: ToplevelId, initial: bool) {
    let Some(idx) = server.find_view(toplevel) else {
        return;
    };

    if initial && !server.views[idx].pending_configure {
        let width = server.config.view.default_width;
        let height = server.config.view.default_height;
        server.display.toplevel_set_size(toplevel, width, height);
        server
            .display
            .toplevel_set_fullscreen(toplevel, server.config.view.fullscreen_on_map);
        server.display.toplevel_set_activated(toplevel, true);
        match server.display.toplevel_schedule_configure(toplevel) {
            Ok(serial) => {
                debug!(
                    "📨 Initial configure for {} ({}x{}, serial {})",
                    toplevel, width, height, serial
                );
                server.views[idx].pending_configure = true;
                server.views[idx].state = ViewState::Configured;
            }
            Err(e) => warn!("⚠️ Failed to configure {}: {}", toplevel, e),
        }
    }

    if server.views[idx].mapped() {
        // A mapped view that lost its scene attachment at map time gets
        // another chance on every commit.
        if server.views[idx].scene_tree.is_none() {
            if let Err(e) = attach_scene(server, idx) {
                warn!(
                    "⚠️ Scene attachment repair for {} failed: {}",
                    server.views[idx].id, e
                );
            }
        }
        if let Err(e) = output::render_frame(server) {
            warn!("⚠️ Frame render after commit failed: {}", e);
        }
        server.notify(Notification::CommitOccurred);
        server.notify(Notification::FrameReady);
    }
}

fn attach_scene(server: &mut Server, idx: usize) -> Result<()> {
    let toplevel = server.views[idx].toplevel;
    let (w, h) = server.display.toplevel_surface_size(toplevel);
    let root = server.display.scene.root();

    let tree = server
        .display
        .scene
        .create_tree(root)
        .context("Failed to create view scene tree")?;
    server
        .display
        .scene
        .create_buffer(tree, toplevel, w, h)
        .context("Failed to create view buffer node")?;
    server.display.scene.set_data(tree, server.views[idx].id.0);
    server
        .display
        .scene
        .set_position(tree, server.views[idx].x, server.views[idx].y);

    server.views[idx].scene_tree = Some(tree);
    Ok(())
}

/// The toolkit mapped the surface: create the scene attachment, focus
/// the view and announce it.
pub(crate) fn handle_mapped(server: &mut Server, toplevel: ToplevelId) {
    let Some(idx) = server.find_view(toplevel) else {
        return;
    };
    let view_id = server.views[idx].id;

    // Scene creation failure is recoverable: the view is still marked
    // mapped so a later commit can repair the attachment.
    if let Err(e) = attach_scene(server, idx) {
        warn!("⚠️ Scene attachment for {} failed: {}", view_id, e);
    }
    server.views[idx].state = ViewState::Mapped;
    info!("🗺️ {} mapped", view_id);

    seat::focus_view(server, Some(view_id));

    if let Some(idx_now) = server.views.iter().position(|v| v.id == view_id) {
        server.notify(Notification::ViewAdded(idx_now));
    }
    server.notify(Notification::ViewsChanged);
}

/// The client withdrew the surface. Focus is dropped first, then the
/// removal is announced, then the scene attachment goes away. The view
/// stays in the list so it can map again.
pub(crate) fn handle_unmapped(server: &mut Server, toplevel: ToplevelId) {
    let Some(idx) = server.find_view(toplevel) else {
        return;
    };
    if !server.views[idx].mapped() {
        return;
    }
    let view_id = server.views[idx].id;

    if server.seat.focused_view == Some(view_id) {
        seat::focus_view(server, None);
    }
    if server.seat.pointer_focus == Some(view_id) {
        server.display.pointer_leave(toplevel);
        server.seat.pointer_focus = None;
    }

    server.notify(Notification::ViewRemoved(idx));
    server.notify(Notification::ViewsChanged);

    if let Some(tree) = server.views[idx].scene_tree.take() {
        server.display.scene.destroy(tree);
    }
    server.views[idx].state = ViewState::Unmapped;
    server.views[idx].pending_configure = false;
    info!("🫥 {} unmapped", view_id);
}

/// The toplevel object is gone. Teardown runs exactly once per view,
/// guarded by its listener set; a destroy that arrives while the view
/// is still mapped replays the unmap path first.
pub(crate) fn handle_destroyed(server: &mut Server, toplevel: ToplevelId) {
    let Some(idx) = server.find_view(toplevel) else {
        return;
    };
    if !server.views[idx].listeners.disarm() {
        debug!("Duplicate destroy for {} ignored", server.views[idx].id);
        return;
    }

    if server.views[idx].mapped() {
        handle_unmapped(server, toplevel);
    }

    if let Some(idx) = server.find_view(toplevel) {
        let view = server.views.remove(idx);
        info!("💀 {} destroyed", view.id);
    }
}

pub(crate) fn handle_title_changed(server: &mut Server, toplevel: ToplevelId) {
    if server.find_view(toplevel).is_some() {
        server.notify(Notification::ViewsChanged);
    }
}

/// Interactive moves are accepted but not acted upon.
pub(crate) fn handle_move_requested(server: &mut Server, toplevel: ToplevelId) {
    if server.find_view(toplevel).is_some() {
        debug!("Move request from {} ignored", toplevel);
    }
}

/// Resize/maximize/fullscreen requests are acknowledged with a fresh
/// configure; the compositor keeps its chosen geometry.
pub(crate) fn handle_resize_requested(server: &mut Server, toplevel: ToplevelId, edges: u32) {
    if server.find_view(toplevel).is_none() {
        return;
    }
    debug!("Resize request (edges {:#x}) from {}", edges, toplevel);
    if let Err(e) = server.display.toplevel_schedule_configure(toplevel) {
        warn!("⚠️ Failed to re-configure {}: {}", toplevel, e);
    }
}

pub(crate) fn handle_maximize_requested(server: &mut Server, toplevel: ToplevelId) {
    if server.find_view(toplevel).is_none() {
        return;
    }
    if let Err(e) = server.display.toplevel_schedule_configure(toplevel) {
        warn!("⚠️ Failed to re-configure {}: {}", toplevel, e);
    }
}

pub(crate) fn handle_fullscreen_requested(server: &mut Server, toplevel: ToplevelId) {
    if server.find_view(toplevel).is_none() {
        return;
    }
    if let Err(e) = server.display.toplevel_schedule_configure(toplevel) {
        warn!("⚠️ Failed to re-configure {}: {}", toplevel, e);
    }
}

/// Popups render inside their parent's scene subtree; an unmapped
/// parent has no subtree and the popup is left unmanaged.
pub(crate) fn handle_new_popup(server: &mut Server, parent: ToplevelId) {
    let Some(idx) = server.find_view(parent) else {
        return;
    };
    match server.views[idx].scene_tree {
        Some(tree) => {
            if let Err(e) = server.display.scene.create_tree(tree) {
                warn!("⚠️ Popup scene tree under {} failed: {}", parent, e);
            }
        }
        None => debug!("Popup for unmapped parent {} left unmanaged", parent),
    }
}

/// Decoration negotiation: this compositor always answers server-side,
/// keeping embedded surfaces free of client chrome.
pub(crate) fn handle_new_decoration(server: &mut Server, toplevel: ToplevelId) {
    server
        .display
        .toplevel_set_decoration_mode(toplevel, DecorationMode::ServerSide);
    if let Err(e) = server.display.toplevel_schedule_configure(toplevel) {
        warn!("⚠️ Failed to configure decoration on {}: {}", toplevel, e);
    }
}

//! The compositor toolkit boundary.
//!
//! Everything the orchestration layer consumes from "below" lives here:
//! the headless backend, the renderer/allocator bookkeeping, the scene
//! graph, the protocol object model, shm buffers and the event queue
//! the host polls. The [`Display`] is the single entry point — it plays
//! the same role `wl_display` plus the backend plays for a wire-backed
//! compositor, and it doubles as the client end for tests and demos.
//!
//! Signal delivery is queue-based: protocol activity pushes a
//! [`ToolkitEvent`] and wakes the readiness fd; the host's dispatch
//! pass drains the queue in order. Per-entity subscriptions are modeled
//! by [`ListenerSet`], a disarm-once guard owned by whoever subscribed.

pub mod buffer;
pub mod output;
pub mod scene;
pub mod toplevel;

pub use buffer::{Buffer, FORMAT_ARGB8888};
pub use output::{OutputId, OutputMode};
pub use scene::{NodeId, NodeKind, PaintItem, Scene};
pub use toplevel::{ClientStats, DecorationMode, Modifiers, ToplevelId};

use crate::error::ServerError;
use anyhow::{anyhow, Result};
use log::{debug, warn};
use output::OutputHandle;
use std::collections::{HashMap, VecDeque};
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Instant;
use toplevel::Toplevel;

/// Events the toolkit delivers to the orchestration layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolkitEvent {
    NewToplevel(ToplevelId),
    SurfaceCommit { toplevel: ToplevelId, initial: bool },
    ToplevelMapped(ToplevelId),
    ToplevelUnmapped(ToplevelId),
    ToplevelDestroyed(ToplevelId),
    TitleChanged(ToplevelId),
    MoveRequested(ToplevelId),
    ResizeRequested { toplevel: ToplevelId, edges: u32 },
    MaximizeRequested(ToplevelId),
    FullscreenRequested(ToplevelId),
    NewPopup { parent: ToplevelId },
    NewDecoration(ToplevelId),
    NewOutput(OutputId),
    OutputDestroyed(OutputId),
    OutputStateRequested { output: OutputId, width: u32, height: u32 },
    NewInputDevice(InputDeviceKind),
    CursorImageRequested(ToplevelId),
    SelectionRequested { source: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDeviceKind {
    Keyboard,
    Pointer,
}

/// A subscription group owned by one entity (a view, an output).
///
/// Teardown must go through `disarm`, which reports whether this call
/// was the one that actually released the subscriptions. Repeated
/// teardown requests are absorbed.
#[derive(Debug)]
pub struct ListenerSet {
    armed: bool,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self { armed: true }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Disarm once. Returns true only for the first call.
    pub fn disarm(&mut self) -> bool {
        std::mem::replace(&mut self.armed, false)
    }
}

impl Default for ListenerSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Self-pipe used to expose queue readiness as a pollable fd.
#[derive(Debug)]
struct WakePipe {
    read: OwnedFd,
    write: OwnedFd,
}

impl WakePipe {
    fn new() -> Result<Self> {
        let mut fds = [0i32; 2];
        let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK) };
        if rc != 0 {
            return Err(anyhow!(std::io::Error::last_os_error()).context("Failed to create wake pipe"));
        }
        Ok(Self {
            read: unsafe { OwnedFd::from_raw_fd(fds[0]) },
            write: unsafe { OwnedFd::from_raw_fd(fds[1]) },
        })
    }

    fn signal(&self) {
        let byte = 1u8;
        // Full pipe just means the fd is already readable.
        unsafe {
            libc::write(
                self.write.as_raw_fd(),
                &byte as *const u8 as *const libc::c_void,
                1,
            );
        }
    }

    fn drain(&self) {
        let mut buf = [0u8; 64];
        loop {
            let n = unsafe {
                libc::read(
                    self.read.as_raw_fd(),
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                )
            };
            if n <= 0 {
                break;
            }
        }
    }

    fn fd(&self) -> RawFd {
        self.read.as_raw_fd()
    }
}

/// The toolkit display: backend, renderer bookkeeping, scene graph,
/// protocol objects and the pending-event queue.
#[derive(Debug)]
pub struct Display {
    pub scene: Scene,

    toplevels: HashMap<ToplevelId, Toplevel>,
    outputs: HashMap<OutputId, OutputHandle>,

    backend_created: bool,
    backend_started: bool,
    renderer_created: bool,
    allocator_created: bool,
    /// Allocate shareable (shm) output buffers when composing
    shared_output_buffers: bool,

    queue: VecDeque<ToolkitEvent>,
    wake: WakePipe,

    socket: Option<String>,
    selection_source: Option<u32>,
    epoch: Instant,

    next_toplevel_id: u64,
    next_output_id: u64,
    next_serial: u32,
}

impl Display {
    pub fn new() -> Result<Self> {
        Ok(Self {
            scene: Scene::new(),
            toplevels: HashMap::new(),
            outputs: HashMap::new(),
            backend_created: false,
            backend_started: false,
            renderer_created: false,
            allocator_created: false,
            shared_output_buffers: false,
            queue: VecDeque::new(),
            wake: WakePipe::new()?,
            socket: None,
            selection_source: None,
            epoch: Instant::now(),
            next_toplevel_id: 1,
            next_output_id: 1,
            next_serial: 1,
        })
    }

    fn push(&mut self, event: ToolkitEvent) {
        self.queue.push_back(event);
        self.wake.signal();
    }

    /// Readiness fd for the host's poll loop.
    pub fn event_fd(&self) -> RawFd {
        self.wake.fd()
    }

    /// Take the currently pending events. Events generated while the
    /// host handles this batch land in the next pass, which keeps every
    /// dispatch bounded.
    pub fn drain_events(&mut self) -> Vec<ToolkitEvent> {
        self.wake.drain();
        self.queue.drain(..).collect()
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Monotonic timestamp in milliseconds since display creation.
    pub fn now_ms(&self) -> u32 {
        self.epoch.elapsed().as_millis() as u32
    }

    fn next_serial(&mut self) -> u32 {
        let s = self.next_serial;
        self.next_serial = self.next_serial.wrapping_add(1);
        s
    }

    // --- Display / socket ------------------------------------------------

    pub fn add_socket_auto(&mut self) -> Result<&str> {
        if self.socket.is_none() {
            self.socket = Some(format!("alcove-{}", std::process::id()));
        }
        self.socket
            .as_deref()
            .ok_or_else(|| anyhow!("no socket name available"))
    }

    pub fn socket_name(&self) -> Option<&str> {
        self.socket.as_deref()
    }

    /// Flush buffered client messages. The in-process model has no wire
    /// to flush; the entry point exists so hosts can keep the same loop
    /// shape as with a socket-backed display.
    pub fn flush_clients(&mut self) {}

    // --- Backend / renderer lifecycle ------------------------------------

    pub fn create_headless_backend(&mut self) -> Result<()> {
        if self.backend_created {
            return Err(ServerError::AlreadyInitialized.into());
        }
        self.backend_created = true;
        debug!("🔩 Headless backend created");
        Ok(())
    }

    /// Create the renderer. `shared_buffers` selects whether composed
    /// output buffers are allocated fd-shareable.
    pub fn create_renderer(&mut self, shared_buffers: bool) -> Result<()> {
        if !self.backend_created {
            return Err(ServerError::BackendInit("no backend".into()).into());
        }
        self.renderer_created = true;
        self.shared_output_buffers = shared_buffers;
        Ok(())
    }

    pub fn create_allocator(&mut self) -> Result<()> {
        if !self.renderer_created {
            return Err(ServerError::AllocatorInit("no renderer".into()).into());
        }
        self.allocator_created = true;
        Ok(())
    }

    pub fn backend_start(&mut self) -> Result<()> {
        if !self.backend_created {
            return Err(ServerError::BackendInit("no backend".into()).into());
        }
        self.backend_started = true;
        debug!("🔩 Backend started");
        Ok(())
    }

    pub fn backend_started(&self) -> bool {
        self.backend_started
    }

    /// Attach a virtual keyboard device to the session.
    pub fn backend_add_keyboard(&mut self) -> Result<()> {
        if !self.backend_started {
            return Err(ServerError::BackendNotStarted.into());
        }
        self.push(ToolkitEvent::NewInputDevice(InputDeviceKind::Keyboard));
        Ok(())
    }

    // --- Outputs ----------------------------------------------------------

    /// Add a headless output. Headless outputs advertise no modes; the
    /// orchestration layer must commit a custom mode. Only legal after
    /// the backend started — host devices are not enumerable before.
    pub fn headless_add_output(&mut self, width: u32, height: u32) -> Result<OutputId> {
        if !self.backend_started {
            return Err(ServerError::BackendNotStarted.into());
        }
        let id = OutputId(self.next_output_id);
        self.next_output_id += 1;
        let name = format!("HEADLESS-{}", id.0);
        debug!("🖥️ New headless output {} ({}x{} requested)", name, width, height);
        self.outputs.insert(id, OutputHandle::new(name, None));
        self.push(ToolkitEvent::NewOutput(id));
        Ok(id)
    }

    /// Add an output that advertises a preferred mode (nested backends).
    pub fn add_output_with_mode(&mut self, mode: OutputMode) -> Result<OutputId> {
        if !self.backend_started {
            return Err(ServerError::BackendNotStarted.into());
        }
        let id = OutputId(self.next_output_id);
        self.next_output_id += 1;
        let name = format!("VIRT-{}", id.0);
        self.outputs.insert(id, OutputHandle::new(name, Some(mode)));
        self.push(ToolkitEvent::NewOutput(id));
        Ok(id)
    }

    pub fn remove_output(&mut self, id: OutputId) {
        if self.outputs.remove(&id).is_some() {
            self.push(ToolkitEvent::OutputDestroyed(id));
        }
    }

    /// Host-side request for a different output state (nested resize).
    pub fn request_output_state(&mut self, id: OutputId, width: u32, height: u32) {
        if self.outputs.contains_key(&id) {
            self.push(ToolkitEvent::OutputStateRequested {
                output: id,
                width,
                height,
            });
        }
    }

    pub fn output_name(&self, id: OutputId) -> Option<&str> {
        self.outputs.get(&id).map(|o| o.name.as_str())
    }

    pub fn output_preferred_mode(&self, id: OutputId) -> Option<OutputMode> {
        self.outputs.get(&id).and_then(|o| o.preferred_mode)
    }

    pub fn output_init_render(&mut self, id: OutputId) -> Result<()> {
        if !self.renderer_created || !self.allocator_created {
            return Err(ServerError::RendererInit("renderer/allocator missing".into()).into());
        }
        let out = self
            .outputs
            .get_mut(&id)
            .ok_or_else(|| anyhow!("{} does not exist", id))?;
        out.render_inited = true;
        Ok(())
    }

    /// Commit an enabled state with the given mode.
    pub fn output_commit(&mut self, id: OutputId, width: u32, height: u32) -> Result<()> {
        let out = self
            .outputs
            .get_mut(&id)
            .ok_or_else(|| anyhow!("{} does not exist", id))?;
        if width == 0 || height == 0 {
            return Err(anyhow!("refusing to commit zero-sized mode on {}", id));
        }
        out.current = Some((width, height));
        out.enabled = true;
        Ok(())
    }

    pub fn output_current_mode(&self, id: OutputId) -> Option<(u32, u32)> {
        self.outputs.get(&id).and_then(|o| o.current)
    }

    pub fn scene_output_create(&mut self, id: OutputId) -> Result<()> {
        let out = self
            .outputs
            .get_mut(&id)
            .ok_or_else(|| anyhow!("{} does not exist", id))?;
        out.scene_bound = true;
        Ok(())
    }

    /// Compose the current scene state into the output's front buffer.
    pub fn scene_output_commit(&mut self, id: OutputId) -> Result<()> {
        let (width, height) = {
            let out = self
                .outputs
                .get(&id)
                .ok_or_else(|| anyhow!("{} does not exist", id))?;
            if !out.scene_bound || !out.render_inited {
                return Err(anyhow!("{} is not bound for rendering", id));
            }
            out.current
                .ok_or_else(|| anyhow!("{} has no committed mode", id))?
        };

        let mut frame = if self.shared_output_buffers {
            Buffer::alloc_shm(width, height).unwrap_or_else(|e| {
                warn!("⚠️ shm output buffer allocation failed, using heap: {}", e);
                Buffer::alloc(width, height)
            })
        } else {
            Buffer::alloc(width, height)
        };
        frame.fill(0xFF10_1010);

        for item in self.scene.paint_list() {
            match item {
                PaintItem::Rect {
                    x,
                    y,
                    width: w,
                    height: h,
                    color,
                } => {
                    let mut r = Buffer::alloc(w, h);
                    r.fill(color);
                    frame.blit_from(&r, x, y);
                }
                PaintItem::Surface { toplevel, x, y } => {
                    if let Some(buf) = self.toplevels.get(&toplevel).and_then(|t| t.committed.as_ref())
                    {
                        frame.blit_from(buf, x, y);
                    }
                }
            }
        }

        if let Some(out) = self.outputs.get_mut(&id) {
            out.front = Some(frame);
        }
        Ok(())
    }

    pub fn output_front(&self, id: OutputId) -> Option<&Buffer> {
        self.outputs.get(&id).and_then(|o| o.front.as_ref())
    }

    /// Deliver a frame-completion timestamp to every surface waiting on
    /// a frame callback. Without this, frame-paced clients stall.
    pub fn send_frame_done(&mut self) {
        let now = self.now_ms();
        for t in self.toplevels.values_mut() {
            if t.frame_pending {
                t.frame_pending = false;
                t.last_frame_done_ms = Some(now);
                t.stats.frames_done += 1;
            }
        }
    }

    // --- Toplevels: compositor -> client ----------------------------------

    fn toplevel_mut(&mut self, id: ToplevelId) -> Option<&mut Toplevel> {
        self.toplevels.get_mut(&id)
    }

    pub fn toplevel_exists(&self, id: ToplevelId) -> bool {
        self.toplevels.contains_key(&id)
    }

    pub fn toplevel_set_size(&mut self, id: ToplevelId, width: u32, height: u32) {
        if let Some(t) = self.toplevel_mut(id) {
            t.staged.size = (width, height);
        }
    }

    pub fn toplevel_set_activated(&mut self, id: ToplevelId, activated: bool) {
        if let Some(t) = self.toplevel_mut(id) {
            if t.staged.activated != activated {
                t.staged.activated = activated;
                t.stats.activation_changes += 1;
            }
        }
    }

    pub fn toplevel_set_fullscreen(&mut self, id: ToplevelId, fullscreen: bool) {
        if let Some(t) = self.toplevel_mut(id) {
            t.staged.fullscreen = fullscreen;
        }
    }

    /// Send the staged configure state. Returns the configure serial.
    pub fn toplevel_schedule_configure(&mut self, id: ToplevelId) -> Result<u32> {
        let serial = self.next_serial();
        let t = self
            .toplevel_mut(id)
            .ok_or_else(|| anyhow!("{} does not exist", id))?;
        t.last_serial = serial;
        t.acked = false;
        t.stats.configures_sent += 1;
        Ok(serial)
    }

    pub fn toplevel_send_close(&mut self, id: ToplevelId) {
        if let Some(t) = self.toplevel_mut(id) {
            t.stats.close_requests += 1;
        }
    }

    pub fn toplevel_set_decoration_mode(&mut self, id: ToplevelId, mode: DecorationMode) {
        if let Some(t) = self.toplevel_mut(id) {
            t.decoration_mode = Some(mode);
        }
    }

    // --- Toplevels: seat event delivery ------------------------------------

    pub fn keyboard_enter(&mut self, id: ToplevelId, _keys: &[u32], _mods: Modifiers) {
        if let Some(t) = self.toplevel_mut(id) {
            t.stats.keyboard_enters += 1;
        }
    }

    pub fn keyboard_leave(&mut self, id: ToplevelId) {
        if let Some(t) = self.toplevel_mut(id) {
            t.stats.keyboard_leaves += 1;
        }
    }

    pub fn keyboard_key(&mut self, id: ToplevelId, _time_ms: u32, _key: u32, _pressed: bool) {
        if let Some(t) = self.toplevel_mut(id) {
            t.stats.keys += 1;
        }
    }

    pub fn keyboard_modifiers(&mut self, id: ToplevelId, _mods: Modifiers) {
        if let Some(t) = self.toplevel_mut(id) {
            t.stats.modifier_events += 1;
        }
    }

    pub fn pointer_enter(&mut self, id: ToplevelId, _sx: f64, _sy: f64) {
        if let Some(t) = self.toplevel_mut(id) {
            t.stats.pointer_enters += 1;
        }
    }

    pub fn pointer_leave(&mut self, id: ToplevelId) {
        if let Some(t) = self.toplevel_mut(id) {
            t.stats.pointer_leaves += 1;
        }
    }

    pub fn pointer_motion(&mut self, id: ToplevelId, _time_ms: u32, _sx: f64, _sy: f64) {
        if let Some(t) = self.toplevel_mut(id) {
            t.stats.motions += 1;
        }
    }

    pub fn pointer_button(&mut self, id: ToplevelId, _time_ms: u32, _button: u32, _pressed: bool) {
        if let Some(t) = self.toplevel_mut(id) {
            t.stats.buttons += 1;
        }
    }

    pub fn pointer_axis(&mut self, id: ToplevelId, _time_ms: u32, _horizontal: bool, _value: f64) {
        if let Some(t) = self.toplevel_mut(id) {
            t.stats.axes += 1;
        }
    }

    pub fn set_selection(&mut self, source: u32) {
        self.selection_source = Some(source);
    }

    pub fn selection(&self) -> Option<u32> {
        self.selection_source
    }

    // --- Toplevels: accessors ----------------------------------------------

    pub fn toplevel_title(&self, id: ToplevelId) -> Option<&str> {
        self.toplevels.get(&id).map(|t| t.title.as_str())
    }

    pub fn toplevel_surface_size(&self, id: ToplevelId) -> (u32, u32) {
        self.toplevels
            .get(&id)
            .map(|t| t.surface_size)
            .unwrap_or((0, 0))
    }

    /// Window geometry if the client set one, surface size otherwise.
    pub fn toplevel_geometry_size(&self, id: ToplevelId) -> (u32, u32) {
        match self.toplevels.get(&id) {
            Some(t) => match t.geometry {
                Some((_, _, w, h)) if w > 0 && h > 0 => (w, h),
                _ => t.surface_size,
            },
            None => (0, 0),
        }
    }

    pub fn toplevel_committed_buffer(&self, id: ToplevelId) -> Option<&Buffer> {
        self.toplevels.get(&id).and_then(|t| t.committed.as_ref())
    }

    pub fn toplevel_decoration_mode(&self, id: ToplevelId) -> Option<DecorationMode> {
        self.toplevels.get(&id).and_then(|t| t.decoration_mode)
    }

    pub fn toplevel_last_frame_done(&self, id: ToplevelId) -> Option<u32> {
        self.toplevels.get(&id).and_then(|t| t.last_frame_done_ms)
    }

    pub fn client_stats(&self, id: ToplevelId) -> Option<ClientStats> {
        self.toplevels.get(&id).map(|t| t.stats)
    }

    // --- Client side (tests, demos, a future wire bridge) ------------------

    pub fn client_create_toplevel(&mut self) -> ToplevelId {
        let id = ToplevelId(self.next_toplevel_id);
        self.next_toplevel_id += 1;
        self.toplevels.insert(id, Toplevel::new());
        self.push(ToolkitEvent::NewToplevel(id));
        id
    }

    pub fn client_set_title(&mut self, id: ToplevelId, title: &str) {
        match self.toplevel_mut(id) {
            Some(t) => t.title = title.to_string(),
            None => return,
        }
        self.push(ToolkitEvent::TitleChanged(id));
    }

    pub fn client_attach_buffer(&mut self, id: ToplevelId, width: u32, height: u32, argb: u32) {
        if let Some(t) = self.toplevel_mut(id) {
            let mut buf = Buffer::alloc(width, height);
            buf.fill(argb);
            t.pending_buffer = Some(buf);
        }
    }

    /// Attach an fd-shareable buffer, as dmabuf-capable clients would.
    pub fn client_attach_shm_buffer(
        &mut self,
        id: ToplevelId,
        width: u32,
        height: u32,
        argb: u32,
    ) -> Result<()> {
        let mut buf = Buffer::alloc_shm(width, height)?;
        buf.fill(argb);
        if let Some(t) = self.toplevel_mut(id) {
            t.pending_buffer = Some(buf);
        }
        Ok(())
    }

    pub fn client_set_geometry(&mut self, id: ToplevelId, x: i32, y: i32, width: u32, height: u32) {
        if let Some(t) = self.toplevel_mut(id) {
            t.geometry = Some((x, y, width, height));
        }
    }

    pub fn client_ack_configure(&mut self, id: ToplevelId) {
        if let Some(t) = self.toplevel_mut(id) {
            if t.last_serial != 0 {
                t.acked = true;
            }
        }
    }

    /// Commit pending surface state. The first commit establishes the
    /// surface role; a commit with an attached buffer after the client
    /// acked a configure maps the surface.
    pub fn client_commit(&mut self, id: ToplevelId) {
        let (initial, mapped_now) = match self.toplevels.get_mut(&id) {
            Some(t) => {
                t.commit_count += 1;
                let initial = t.commit_count == 1;
                if let Some(buf) = t.pending_buffer.take() {
                    t.surface_size = (buf.width(), buf.height());
                    t.committed = Some(buf);
                    t.frame_pending = true;
                }
                // The ack handshake gates the first map only; a surface
                // that was mapped before re-maps on any buffer commit.
                let mapped_now =
                    !t.mapped && t.committed.is_some() && (t.acked || t.ever_mapped);
                if mapped_now {
                    t.mapped = true;
                    t.ever_mapped = true;
                }
                (initial, mapped_now)
            }
            None => return,
        };

        let size = self.toplevel_surface_size(id);
        self.scene.update_buffer_size(id, size.0, size.1);

        self.push(ToolkitEvent::SurfaceCommit {
            toplevel: id,
            initial,
        });
        if mapped_now {
            self.push(ToolkitEvent::ToplevelMapped(id));
        }
    }

    /// Withdraw the surface (the client hides it; it may map again).
    pub fn client_unmap(&mut self, id: ToplevelId) {
        let was_mapped = match self.toplevel_mut(id) {
            Some(t) if t.mapped => {
                t.mapped = false;
                true
            }
            _ => false,
        };
        if was_mapped {
            self.push(ToolkitEvent::ToplevelUnmapped(id));
        }
    }

    /// Destroy the toplevel object. A well-behaved client unmaps first;
    /// destroying while mapped is tolerated and absorbed upstream.
    pub fn client_destroy(&mut self, id: ToplevelId) {
        if self.toplevels.remove(&id).is_some() {
            self.push(ToolkitEvent::ToplevelDestroyed(id));
        }
    }

    pub fn client_request_move(&mut self, id: ToplevelId) {
        if self.toplevels.contains_key(&id) {
            self.push(ToolkitEvent::MoveRequested(id));
        }
    }

    pub fn client_request_resize(&mut self, id: ToplevelId, edges: u32) {
        if self.toplevels.contains_key(&id) {
            self.push(ToolkitEvent::ResizeRequested {
                toplevel: id,
                edges,
            });
        }
    }

    pub fn client_request_maximize(&mut self, id: ToplevelId) {
        if self.toplevels.contains_key(&id) {
            self.push(ToolkitEvent::MaximizeRequested(id));
        }
    }

    pub fn client_request_fullscreen(&mut self, id: ToplevelId) {
        if self.toplevels.contains_key(&id) {
            self.push(ToolkitEvent::FullscreenRequested(id));
        }
    }

    pub fn client_create_popup(&mut self, parent: ToplevelId) {
        if self.toplevels.contains_key(&parent) {
            self.push(ToolkitEvent::NewPopup { parent });
        }
    }

    pub fn client_request_decoration(&mut self, id: ToplevelId) {
        if self.toplevels.contains_key(&id) {
            self.push(ToolkitEvent::NewDecoration(id));
        }
    }

    pub fn client_request_cursor(&mut self, id: ToplevelId) {
        if self.toplevels.contains_key(&id) {
            self.push(ToolkitEvent::CursorImageRequested(id));
        }
    }

    pub fn client_set_selection(&mut self, source: u32) {
        self.push(ToolkitEvent::SelectionRequested { source });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_set_disarms_exactly_once() {
        let mut listeners = ListenerSet::new();
        assert!(listeners.is_armed());
        assert!(listeners.disarm());
        assert!(!listeners.disarm());
        assert!(!listeners.disarm());
        assert!(!listeners.is_armed());
    }

    #[test]
    fn event_fd_signals_pending_events() {
        let mut display = Display::new().unwrap();
        display.client_create_toplevel();
        assert_eq!(display.pending_events(), 1);

        let mut pfd = libc::pollfd {
            fd: display.event_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let rc = unsafe { libc::poll(&mut pfd, 1, 0) };
        assert_eq!(rc, 1, "wake fd should be readable");

        let events = display.drain_events();
        assert_eq!(events.len(), 1);
        let rc = unsafe { libc::poll(&mut pfd, 1, 0) };
        assert_eq!(rc, 0, "wake fd drained with the queue");
    }

    #[test]
    fn commit_maps_only_after_ack_and_buffer() {
        let mut display = Display::new().unwrap();
        let id = display.client_create_toplevel();

        // Initial commit: no buffer, no ack -> role established only.
        display.client_commit(id);
        let events = display.drain_events();
        assert!(events.contains(&ToolkitEvent::SurfaceCommit {
            toplevel: id,
            initial: true
        }));
        assert!(!events.iter().any(|e| matches!(e, ToolkitEvent::ToplevelMapped(_))));

        // Configure + ack + buffer commit -> mapped.
        display.toplevel_set_size(id, 640, 480);
        display.toplevel_schedule_configure(id).unwrap();
        display.client_ack_configure(id);
        display.client_attach_buffer(id, 640, 480, 0xFF0000FF);
        display.client_commit(id);
        let events = display.drain_events();
        assert!(events.contains(&ToolkitEvent::ToplevelMapped(id)));
        assert_eq!(display.toplevel_surface_size(id), (640, 480));
    }

    #[test]
    fn outputs_require_a_started_backend() {
        let mut display = Display::new().unwrap();
        display.create_headless_backend().unwrap();
        assert!(display.headless_add_output(1280, 720).is_err());
        display.backend_start().unwrap();
        let id = display.headless_add_output(1280, 720).unwrap();
        assert!(display.output_preferred_mode(id).is_none());
    }

    #[test]
    fn frame_done_reaches_waiting_surfaces_only() {
        let mut display = Display::new().unwrap();
        let a = display.client_create_toplevel();
        let b = display.client_create_toplevel();
        display.client_attach_buffer(a, 4, 4, 0);
        display.client_commit(a);
        // b never commits a buffer, so it never waits on a frame.
        display.client_commit(b);

        display.send_frame_done();
        assert_eq!(display.client_stats(a).unwrap().frames_done, 1);
        assert_eq!(display.client_stats(b).unwrap().frames_done, 0);

        // No second callback without a new commit.
        display.send_frame_done();
        assert_eq!(display.client_stats(a).unwrap().frames_done, 1);
    }
}

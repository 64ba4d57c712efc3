//! The compositor server: root object and embedding surface.
//!
//! Owns the toolkit display, the render backend, the output manager,
//! the seat and the view list (most-recently-focused first). The host
//! drives it cooperatively: poll [`Server::event_fd`], call
//! [`Server::dispatch_events`], and consume [`Notification`]s pushed
//! through the registered sink. Every mutation happens on the host's
//! dispatch thread; frames handed across the boundary are snapshots.

use crate::config::AlcoveConfig;
use crate::error::ServerError;
use crate::output::{self, OutputManager};
use crate::render::{FrameCapture, RenderBackend, RenderMode, ViewFrame};
use crate::seat::{self, Seat};
use crate::shell::{self, View};
use crate::toolkit::{Display, Modifiers, ToolkitEvent, ToplevelId};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::os::unix::io::RawFd;

/// Push notifications to the embedding layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// The display socket is ready under this name
    SocketReady(String),
    RunningChanged(bool),
    ViewsChanged,
    ViewAdded(usize),
    ViewRemoved(usize),
    /// A composed frame is ready for capture
    FrameReady,
    /// A mapped surface committed new content
    CommitOccurred,
    /// Fatal error, the session is unusable
    Error(String),
}

pub(crate) struct Notifier {
    sink: Option<Box<dyn FnMut(Notification)>>,
}

impl Notifier {
    fn new() -> Self {
        Self { sink: None }
    }

    fn emit(&mut self, notification: Notification) {
        if let Some(sink) = self.sink.as_mut() {
            sink(notification);
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

/// The compositor server.
#[derive(Debug)]
pub struct Server {
    pub(crate) config: AlcoveConfig,
    pub(crate) display: Display,
    pub(crate) render: Option<RenderBackend>,
    pub(crate) outputs: OutputManager,
    pub(crate) seat: Seat,
    /// Most-recently-focused first
    pub(crate) views: Vec<View>,
    pub(crate) notifier: Notifier,
    pub(crate) next_view_id: u64,
    initialized: bool,
    running: bool,
}

impl Server {
    pub fn new(config: AlcoveConfig) -> Result<Self> {
        config.validate().context("Invalid configuration")?;
        let display = Display::new().context("Failed to create display")?;
        let seat = Seat::new(&config.seat);
        Ok(Self {
            config,
            display,
            render: None,
            outputs: OutputManager::new(),
            seat,
            views: Vec::new(),
            notifier: Notifier::new(),
            next_view_id: 1,
            initialized: false,
            running: false,
        })
    }

    /// Register the notification sink. One sink at a time; registering
    /// replaces the previous one.
    pub fn set_notification_sink<F>(&mut self, sink: F)
    where
        F: FnMut(Notification) + 'static,
    {
        self.notifier.sink = Some(Box::new(sink));
    }

    pub(crate) fn notify(&mut self, notification: Notification) {
        self.notifier.emit(notification);
    }

    fn fatal(&mut self, what: &str, err: &anyhow::Error) {
        let message = format!("{}: {:#}", what, err);
        self.notify(Notification::Error(message));
    }

    /// Bring up backend, renderer, allocator and the display socket.
    /// Any failure here aborts startup; no partial session survives.
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Err(ServerError::AlreadyInitialized.into());
        }
        info!("🚀 Initializing compositor server");

        if let Err(e) = self
            .display
            .create_headless_backend()
            .context("Backend creation failed")
        {
            self.fatal("backend", &e);
            return Err(e);
        }

        let render = RenderBackend::new(self.config.renderer.prefer_hardware);
        let shared = render.mode() == RenderMode::Gpu;
        if let Err(e) = self
            .display
            .create_renderer(shared)
            .context("Renderer creation failed")
        {
            self.fatal("renderer", &e);
            return Err(e);
        }
        if let Err(e) = self
            .display
            .create_allocator()
            .context("Allocator creation failed")
        {
            self.fatal("allocator", &e);
            return Err(e);
        }
        self.render = Some(render);

        let socket = self
            .display
            .add_socket_auto()
            .map(|name| name.to_string())
            .context("No socket available");
        let socket = match socket {
            Ok(name) => name,
            Err(e) => {
                self.fatal("socket", &e);
                return Err(e);
            }
        };
        info!("✅ Display socket ready: {}", socket);
        self.notify(Notification::SocketReady(socket));

        self.initialized = true;
        Ok(())
    }

    /// Start the backend and bind the initial output and input devices.
    pub fn start(&mut self) -> Result<()> {
        if !self.initialized {
            return Err(ServerError::NotInitialized.into());
        }
        if self.running {
            return Err(ServerError::AlreadyRunning.into());
        }

        if let Err(e) = self.display.backend_start().context("Backend start failed") {
            self.fatal("backend start", &e);
            return Err(e);
        }
        self.display
            .backend_add_keyboard()
            .context("Keyboard device attach failed")?;
        self.display
            .headless_add_output(self.config.output.width, self.config.output.height)
            .context("Initial output creation failed")?;

        // Bind the output and input device before reporting running.
        self.dispatch_events();

        self.running = true;
        info!("✅ Compositor server running");
        self.notify(Notification::RunningChanged(true));
        Ok(())
    }

    /// Total teardown in reverse dependency order: views, seat focus,
    /// outputs, renderer. Safe to call once; subsequent calls no-op.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        info!("🛑 Stopping compositor server");

        seat::focus_view(self, None);
        let toplevels: Vec<ToplevelId> = self.views.iter().map(|v| v.toplevel).collect();
        for toplevel in toplevels {
            // Replays the unmap path for still-mapped views.
            shell::handle_destroyed(self, toplevel);
        }

        let outputs: Vec<_> = self.outputs.outputs.iter().map(|o| o.id).collect();
        for id in outputs {
            self.display.remove_output(id);
        }
        self.dispatch_events();

        self.render = None;
        self.running = false;
        self.notify(Notification::RunningChanged(false));
    }

    /// Readiness fd the host should poll; readable whenever protocol
    /// events are pending.
    pub fn event_fd(&self) -> RawFd {
        self.display.event_fd()
    }

    /// One bounded, non-blocking dispatch pass over pending protocol
    /// events. Returns the number of events handled. Events produced
    /// while handling land in the next pass.
    pub fn dispatch_events(&mut self) -> usize {
        let events = self.display.drain_events();
        let handled = events.len();
        for event in events {
            debug!("Dispatch: {:?}", event);
            match event {
                ToolkitEvent::NewToplevel(t) => shell::handle_new_toplevel(self, t),
                ToolkitEvent::SurfaceCommit { toplevel, initial } => {
                    shell::handle_commit(self, toplevel, initial)
                }
                ToolkitEvent::ToplevelMapped(t) => shell::handle_mapped(self, t),
                ToolkitEvent::ToplevelUnmapped(t) => shell::handle_unmapped(self, t),
                ToolkitEvent::ToplevelDestroyed(t) => shell::handle_destroyed(self, t),
                ToolkitEvent::TitleChanged(t) => shell::handle_title_changed(self, t),
                ToolkitEvent::MoveRequested(t) => shell::handle_move_requested(self, t),
                ToolkitEvent::ResizeRequested { toplevel, edges } => {
                    shell::handle_resize_requested(self, toplevel, edges)
                }
                ToolkitEvent::MaximizeRequested(t) => shell::handle_maximize_requested(self, t),
                ToolkitEvent::FullscreenRequested(t) => {
                    shell::handle_fullscreen_requested(self, t)
                }
                ToolkitEvent::NewPopup { parent } => shell::handle_new_popup(self, parent),
                ToolkitEvent::NewDecoration(t) => shell::handle_new_decoration(self, t),
                ToolkitEvent::NewOutput(id) => output::handle_new_output(self, id),
                ToolkitEvent::OutputDestroyed(id) => output::handle_output_destroyed(self, id),
                ToolkitEvent::OutputStateRequested {
                    output: id,
                    width,
                    height,
                } => output::handle_request_state(self, id, width, height),
                ToolkitEvent::NewInputDevice(kind) => seat::handle_new_input(self, kind),
                ToolkitEvent::CursorImageRequested(t) => seat::handle_cursor_image(self, t),
                ToolkitEvent::SelectionRequested { source } => {
                    seat::handle_selection(self, source)
                }
            }
        }
        handled
    }

    /// Flush buffered client messages after a dispatch pass.
    pub fn flush_clients(&mut self) {
        self.display.flush_clients();
    }

    // --- Observability ------------------------------------------------------

    pub fn socket_name(&self) -> Option<&str> {
        self.display.socket_name()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Active frame hand-off mode, or `None` before initialization.
    pub fn render_mode(&self) -> Option<RenderMode> {
        self.render.as_ref().map(|r| r.mode())
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    pub fn views(&self) -> &[View] {
        &self.views
    }

    pub fn seat(&self) -> &Seat {
        &self.seat
    }

    pub fn outputs(&self) -> &OutputManager {
        &self.outputs
    }

    pub(crate) fn find_view(&self, toplevel: ToplevelId) -> Option<usize> {
        self.views.iter().position(|v| v.toplevel == toplevel)
    }

    // --- Per-view API -------------------------------------------------------

    pub fn view_title(&self, index: usize) -> Option<String> {
        let view = self.views.get(index)?;
        self.display
            .toplevel_title(view.toplevel)
            .map(|t| t.to_string())
    }

    /// Current view geometry: the client's window geometry if set, the
    /// committed surface size otherwise.
    pub fn view_geometry(&self, index: usize) -> Option<(u32, u32)> {
        let view = self.views.get(index)?;
        Some(self.display.toplevel_geometry_size(view.toplevel))
    }

    /// Transfer keyboard focus to the view at `index`.
    pub fn focus_view(&mut self, index: usize) {
        if let Some(id) = self.views.get(index).map(|v| v.id) {
            seat::focus_view(self, Some(id));
        }
    }

    /// Politely ask the client at `index` to close.
    pub fn close_view(&mut self, index: usize) {
        if let Some(toplevel) = self.views.get(index).map(|v| v.toplevel) {
            debug!("Close requested for {}", toplevel);
            self.display.toplevel_send_close(toplevel);
        }
    }

    /// Ask the client at `index` to adopt a new size. The client obeys
    /// on its next commit; geometry reflects the change only then.
    pub fn request_resize(&mut self, index: usize, width: u32, height: u32) {
        let Some(toplevel) = self.views.get(index).map(|v| v.toplevel) else {
            return;
        };
        self.display.toplevel_set_size(toplevel, width, height);
        if let Err(e) = self.display.toplevel_schedule_configure(toplevel) {
            warn!("⚠️ Resize configure for {} failed: {}", toplevel, e);
        }
    }

    /// Snapshot one view's last-committed content. Views with no
    /// content yet get an opaque placeholder of their assigned size.
    pub fn view_frame(&self, index: usize) -> Option<ViewFrame> {
        let view = self.views.get(index)?;
        let render = self.render.as_ref()?;
        match self.display.toplevel_committed_buffer(view.toplevel) {
            Some(buf) => Some(render.view_frame(buf)),
            None => {
                let (w, h) = (
                    self.config.view.default_width,
                    self.config.view.default_height,
                );
                Some(render.placeholder_frame(w, h))
            }
        }
    }

    /// Copy one view's last-committed content into a caller-provided
    /// pixel buffer, clipping to the smaller extent. Returns false if
    /// the view has no content yet.
    pub fn render_view_into(
        &self,
        index: usize,
        dest: &mut [u8],
        width: u32,
        height: u32,
        stride: u32,
    ) -> bool {
        let Some(view) = self.views.get(index) else {
            return false;
        };
        let Some(buf) = self.display.toplevel_committed_buffer(view.toplevel) else {
            return false;
        };
        let Some(render) = self.render.as_ref() else {
            return false;
        };
        render.render_view_into(buf, dest, width, height, stride);
        true
    }

    /// Copy the latest composed full-scene frame into a caller-provided
    /// pixel buffer, clipping to the smaller extent. Returns false
    /// before the first composed frame.
    pub fn render_frame_into(
        &self,
        dest: &mut [u8],
        width: u32,
        height: u32,
        stride: u32,
    ) -> bool {
        let Some(id) = self.outputs.primary().map(|o| o.id) else {
            return false;
        };
        let Some(buf) = self.display.output_front(id) else {
            return false;
        };
        let Some(render) = self.render.as_ref() else {
            return false;
        };
        render.render_view_into(buf, dest, width, height, stride);
        true
    }

    /// Capture the latest composed frame from the primary output, in
    /// whatever representation the active render mode produces.
    pub fn capture_frame(&mut self) -> Option<FrameCapture<'_>> {
        let id = self.outputs.primary()?.id;
        let buf = self.display.output_front(id)?;
        let render = self.render.as_mut()?;
        Some(render.capture(buf))
    }

    // --- Input injection ----------------------------------------------------

    pub fn pointer_motion(&mut self, x: f64, y: f64) {
        seat::pointer_motion(self, x, y);
    }

    pub fn pointer_button(&mut self, button: u32, pressed: bool) {
        seat::pointer_button(self, button, pressed);
    }

    pub fn pointer_axis(&mut self, horizontal: bool, value: f64) {
        seat::pointer_axis(self, horizontal, value);
    }

    pub fn send_key(&mut self, key: u32, pressed: bool) {
        seat::send_key(self, key, pressed);
    }

    pub fn send_modifiers(&mut self, mods: Modifiers) {
        seat::send_modifiers(self, mods);
    }

    // --- Test and embedding access to the toolkit ---------------------------

    pub fn display(&self) -> &Display {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut Display {
        &mut self.display
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

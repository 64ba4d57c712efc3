//! Protocol object model for toplevel surfaces.
//!
//! Each record tracks both sides of the wire: the client's committed
//! surface state (buffer, geometry, title) and the compositor's staged
//! configure state (size, activated, fullscreen). Events the compositor
//! sends to the client are tallied in [`ClientStats`], which is what a
//! wire connection would deliver and what tests observe.

use super::buffer::Buffer;

/// Identity of one toplevel protocol object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ToplevelId(pub(crate) u64);

impl std::fmt::Display for ToplevelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "toplevel#{}", self.0)
    }
}

/// Keyboard modifier state in wire layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub depressed: u32,
    pub latched: u32,
    pub locked: u32,
    pub group: u32,
}

/// Decoration mode negotiated with the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecorationMode {
    ClientSide,
    ServerSide,
}

/// Per-client tally of events the compositor sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub configures_sent: u32,
    pub activation_changes: u32,
    pub keyboard_enters: u32,
    pub keyboard_leaves: u32,
    pub keys: u32,
    pub modifier_events: u32,
    pub pointer_enters: u32,
    pub pointer_leaves: u32,
    pub motions: u32,
    pub buttons: u32,
    pub axes: u32,
    pub frames_done: u32,
    pub close_requests: u32,
}

/// Compositor-staged configure state, flushed by `schedule_configure`.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ConfigureState {
    pub size: (u32, u32),
    pub activated: bool,
    pub fullscreen: bool,
}

#[derive(Debug)]
pub(crate) struct Toplevel {
    pub title: String,

    // Client-committed surface state
    pub pending_buffer: Option<Buffer>,
    pub committed: Option<Buffer>,
    pub surface_size: (u32, u32),
    pub geometry: Option<(i32, i32, u32, u32)>,
    pub commit_count: u32,

    // Compositor -> client configure handshake
    pub staged: ConfigureState,
    pub last_serial: u32,
    pub acked: bool,

    // Role state
    pub mapped: bool,
    /// Once true, re-maps need only a committed buffer, not a new ack
    pub ever_mapped: bool,
    pub decoration_mode: Option<DecorationMode>,

    // Frame-callback pacing
    pub frame_pending: bool,
    pub last_frame_done_ms: Option<u32>,

    pub stats: ClientStats,
}

impl Toplevel {
    pub(crate) fn new() -> Self {
        Self {
            title: String::new(),
            pending_buffer: None,
            committed: None,
            surface_size: (0, 0),
            geometry: None,
            commit_count: 0,
            staged: ConfigureState::default(),
            last_serial: 0,
            acked: false,
            mapped: false,
            ever_mapped: false,
            decoration_mode: None,
            frame_pending: false,
            last_frame_done_ms: None,
            stats: ClientStats::default(),
        }
    }
}

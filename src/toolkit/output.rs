//! Backend-owned output objects.
//!
//! Headless outputs carry no modes and rely on the orchestration layer
//! committing a custom mode; nested/test outputs may advertise a
//! preferred mode instead.

use super::buffer::Buffer;

/// Identity of one backend output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputId(pub(crate) u64);

impl std::fmt::Display for OutputId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "output#{}", self.0)
    }
}

/// An advertised output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputMode {
    pub width: u32,
    pub height: u32,
    /// Refresh rate in mHz; 0 means "whatever the host drives"
    pub refresh: u32,
}

#[derive(Debug)]
pub(crate) struct OutputHandle {
    pub name: String,
    pub preferred_mode: Option<OutputMode>,
    /// Mode committed by the orchestration layer
    pub current: Option<(u32, u32)>,
    pub enabled: bool,
    pub render_inited: bool,
    pub scene_bound: bool,
    /// Last composed frame for this output
    pub front: Option<Buffer>,
}

impl OutputHandle {
    pub(crate) fn new(name: String, preferred_mode: Option<OutputMode>) -> Self {
        Self {
            name,
            preferred_mode,
            current: None,
            enabled: false,
            render_inited: false,
            scene_bound: false,
            front: None,
        }
    }
}

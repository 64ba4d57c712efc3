//! Output management and frame scheduling.
//!
//! Outputs are bound strictly on the toolkit's new-output event — never
//! eagerly, because backend devices only become enumerable once the
//! backend has started. Each output gets a committed mode (preferred if
//! the device advertises one, the configured fallback otherwise), a
//! slot in the output layout and a scene binding.

use crate::server::Server;
use crate::toolkit::{ListenerSet, OutputId, OutputMode};
use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};

/// Tracking record for one bound output.
#[derive(Debug)]
pub struct Output {
    pub id: OutputId,
    pub width: u32,
    pub height: u32,
    pub(crate) listeners: ListenerSet,
}

/// Side-by-side arrangement of bound outputs.
#[derive(Debug, Default)]
pub struct OutputLayout {
    entries: Vec<(OutputId, i32)>,
    next_x: i32,
}

impl OutputLayout {
    pub fn add(&mut self, id: OutputId, width: u32) {
        let x = self.next_x;
        self.entries.push((id, x));
        self.next_x += width as i32;
    }

    pub fn remove(&mut self, id: OutputId) {
        self.entries.retain(|(o, _)| *o != id);
    }

    pub fn position(&self, id: OutputId) -> Option<i32> {
        self.entries.iter().find(|(o, _)| *o == id).map(|(_, x)| *x)
    }
}

/// All bound outputs, in binding order. The first is the primary one
/// frames are captured from.
#[derive(Debug, Default)]
pub struct OutputManager {
    pub outputs: Vec<Output>,
    pub layout: OutputLayout,
}

impl OutputManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn primary(&self) -> Option<&Output> {
        self.outputs.first()
    }

    pub fn count(&self) -> usize {
        self.outputs.len()
    }
}

/// Bind a freshly announced output: renderer init, mode choice, commit,
/// layout registration and scene binding.
pub(crate) fn handle_new_output(server: &mut Server, id: OutputId) {
    if let Err(e) = bind_output(server, id) {
        warn!("⚠️ Failed to bind {}: {}", id, e);
    }
}

fn bind_output(server: &mut Server, id: OutputId) -> Result<()> {
    server
        .display
        .output_init_render(id)
        .context("Output renderer init failed")?;

    let (width, height) = match server.display.output_preferred_mode(id) {
        Some(OutputMode { width, height, .. }) => {
            debug!("🖥️ {} advertises preferred mode {}x{}", id, width, height);
            (width, height)
        }
        None => {
            let w = server.config.output.width;
            let h = server.config.output.height;
            debug!("🖥️ {} has no modes, using custom {}x{}", id, w, h);
            (w, h)
        }
    };
    server
        .display
        .output_commit(id, width, height)
        .context("Output mode commit failed")?;

    server.outputs.layout.add(id, width);
    server
        .display
        .scene_output_create(id)
        .context("Scene output binding failed")?;

    server.outputs.outputs.push(Output {
        id,
        width,
        height,
        listeners: ListenerSet::new(),
    });
    let name = server.display.output_name(id).unwrap_or("?").to_string();
    info!("🖥️ Output {} bound: {} at {}x{}", id, name, width, height);
    Ok(())
}

/// Commit the scene to the primary output and tell every waiting
/// surface its frame completed. This is the only mechanism that lets
/// frame-paced clients draw again.
pub(crate) fn render_frame(server: &mut Server) -> Result<()> {
    let id = server
        .outputs
        .primary()
        .map(|o| o.id)
        .ok_or_else(|| anyhow!("no output bound"))?;
    server.display.scene_output_commit(id)?;
    server.display.send_frame_done();
    Ok(())
}

/// Unbind a destroyed output. Listener teardown is idempotent.
pub(crate) fn handle_output_destroyed(server: &mut Server, id: OutputId) {
    let Some(idx) = server.outputs.outputs.iter().position(|o| o.id == id) else {
        return;
    };
    if !server.outputs.outputs[idx].listeners.disarm() {
        debug!("Duplicate destroy for {} ignored", id);
        return;
    }
    server.outputs.layout.remove(id);
    let out = server.outputs.outputs.remove(idx);
    info!("🖥️ Output {} unbound ({}x{})", id, out.width, out.height);
}

/// The host asked for a new output state (a nested window resize).
pub(crate) fn handle_request_state(server: &mut Server, id: OutputId, width: u32, height: u32) {
    if let Err(e) = server.display.output_commit(id, width, height) {
        warn!("⚠️ Requested state {}x{} on {} rejected: {}", width, height, id, e);
        return;
    }
    if let Some(out) = server.outputs.outputs.iter_mut().find(|o| o.id == id) {
        out.width = width;
        out.height = height;
    }
    debug!("🖥️ {} now {}x{}", id, width, height);
}

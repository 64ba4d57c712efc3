//! Frame delivery to the embedding host.
//!
//! Two modes, chosen once at initialization:
//!
//! - **Cpu**: every frame is handed over as a pixel copy.
//! - **Gpu**: frames whose backing storage is fd-shareable are handed
//!   over as a duplicated fd plus metadata; anything else silently
//!   falls back to the pixel-copy path for that frame. The mode itself
//!   never changes after init.

use crate::toolkit::Buffer;
use log::{debug, info, warn};
use std::env;
use std::os::unix::io::OwnedFd;

/// How frames cross the embedding boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Cpu,
    Gpu,
}

impl std::fmt::Display for RenderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderMode::Cpu => write!(f, "cpu"),
            RenderMode::Gpu => write!(f, "gpu"),
        }
    }
}

/// One captured frame, in whichever representation the mode produced.
#[derive(Debug)]
pub enum FrameCapture<'a> {
    /// Pixel copy. `data` borrows the backend's scratch storage and is
    /// valid until the next capture.
    Pixels {
        data: &'a [u8],
        width: u32,
        height: u32,
        stride: u32,
        format: u32,
    },
    /// Duplicated buffer fd; the caller owns the fd and must close it
    /// (dropping the `OwnedFd` does).
    Shared {
        fd: OwnedFd,
        width: u32,
        height: u32,
        stride: u32,
        format: u32,
    },
}

/// A standalone per-view frame copy handed to embedders.
#[derive(Debug, Clone)]
pub struct ViewFrame {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub data: Vec<u8>,
}

/// The render backend. Owns the scratch buffer the pixel-copy path
/// writes into, grown lazily and never shrunk.
#[derive(Debug)]
pub struct RenderBackend {
    mode: RenderMode,
    scratch: Vec<u8>,
}

impl RenderBackend {
    /// Initialize with the requested mode. Requesting Gpu when the
    /// session cannot share buffers degrades to Cpu with a warning
    /// rather than failing.
    pub fn new(prefer_hardware: bool) -> Self {
        let mode = if prefer_hardware {
            if hardware_available() {
                RenderMode::Gpu
            } else {
                warn!("⚠️ Hardware buffer sharing unavailable, falling back to CPU frames");
                RenderMode::Cpu
            }
        } else {
            RenderMode::Cpu
        };
        info!("🎨 Render backend initialized in {} mode", mode);
        Self {
            mode,
            scratch: Vec::new(),
        }
    }

    /// Construct with an explicit mode, bypassing the session probe.
    pub fn with_mode(mode: RenderMode) -> Self {
        Self {
            mode,
            scratch: Vec::new(),
        }
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Capture a composed buffer for the host.
    ///
    /// Gpu mode first tries to duplicate the buffer's fd; heap-backed
    /// buffers fall through to the copy path. The reported mode stays
    /// Gpu either way.
    pub fn capture<'a>(&'a mut self, buf: &Buffer) -> FrameCapture<'a> {
        if self.mode == RenderMode::Gpu {
            if let Some(fd) = buf.share() {
                return FrameCapture::Shared {
                    fd,
                    width: buf.width(),
                    height: buf.height(),
                    stride: buf.stride(),
                    format: buf.format(),
                };
            }
            debug!("🎨 Frame not fd-shareable, copying pixels for this frame");
        }

        let len = buf.bytes().len();
        if self.scratch.len() < len {
            self.scratch.resize(len, 0);
        }
        self.scratch[..len].copy_from_slice(buf.bytes());
        FrameCapture::Pixels {
            data: &self.scratch[..len],
            width: buf.width(),
            height: buf.height(),
            stride: buf.stride(),
            format: buf.format(),
        }
    }

    /// Copy one view's committed buffer into a standalone frame.
    pub fn view_frame(&self, buf: &Buffer) -> ViewFrame {
        ViewFrame {
            width: buf.width(),
            height: buf.height(),
            stride: buf.stride(),
            data: buf.bytes().to_vec(),
        }
    }

    /// Copy one view's committed buffer into a caller-provided pixel
    /// buffer, clipping to the smaller of the two extents.
    pub fn render_view_into(
        &self,
        src: &Buffer,
        dest: &mut [u8],
        dest_width: u32,
        dest_height: u32,
        dest_stride: u32,
    ) {
        let rows = src.height().min(dest_height) as usize;
        let row_bytes = src.width().min(dest_width) as usize * 4;
        let src_bytes = src.bytes();
        for row in 0..rows {
            let s = row * src.stride() as usize;
            let d = row * dest_stride as usize;
            if d + row_bytes > dest.len() || s + row_bytes > src_bytes.len() {
                break;
            }
            dest[d..d + row_bytes].copy_from_slice(&src_bytes[s..s + row_bytes]);
        }
    }

    /// A placeholder frame for views with no committed content yet.
    pub fn placeholder_frame(&self, width: u32, height: u32) -> ViewFrame {
        let mut buf = Buffer::alloc(width.max(1), height.max(1));
        buf.fill(0xFF1E_1E1E);
        ViewFrame {
            width: buf.width(),
            height: buf.height(),
            stride: buf.stride(),
            data: buf.bytes().to_vec(),
        }
    }
}

/// Whether the session can realistically share buffers by fd with a
/// host-side GPU consumer. Headless CI sessions cannot.
pub fn hardware_available() -> bool {
    env::var("XDG_SESSION_TYPE").map(|v| v == "wayland").unwrap_or(false)
        || env::var("DISPLAY").is_ok()
        || env::var("WAYLAND_DISPLAY").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolkit::FORMAT_ARGB8888;

    #[test]
    fn cpu_mode_always_copies() {
        let mut backend = RenderBackend::new(false);
        assert_eq!(backend.mode(), RenderMode::Cpu);

        let mut buf = Buffer::alloc_shm(4, 4).unwrap();
        buf.fill(0xFFAA_BBCC);
        match backend.capture(&buf) {
            FrameCapture::Pixels {
                data,
                width,
                height,
                stride,
                format,
            } => {
                assert_eq!((width, height, stride), (4, 4, 16));
                assert_eq!(format, FORMAT_ARGB8888);
                let words: &[u32] = bytemuck::cast_slice(data);
                assert!(words.iter().all(|w| *w == 0xFFAA_BBCC));
            }
            FrameCapture::Shared { .. } => panic!("cpu mode must not share fds"),
        }
    }

    #[test]
    fn scratch_grows_and_is_reused() {
        let mut backend = RenderBackend::new(false);
        let small = Buffer::alloc(2, 2);
        let large = Buffer::alloc(8, 8);
        let _ = backend.capture(&small);
        let _ = backend.capture(&large);
        let _ = backend.capture(&small);
        assert!(backend.scratch.len() >= 8 * 8 * 4);
    }

    #[test]
    fn view_readback_clips_to_smaller_extent() {
        let backend = RenderBackend::new(false);
        let mut src = Buffer::alloc(4, 4);
        src.fill(0xFF11_2233);

        // Destination smaller than the source: only 2x2 is written.
        let mut dest = vec![0u8; 2 * 2 * 4];
        backend.render_view_into(&src, &mut dest, 2, 2, 8);
        let words: &[u32] = bytemuck::cast_slice(&dest);
        assert!(words.iter().all(|w| *w == 0xFF11_2233));

        // Destination larger: trailing pixels stay untouched.
        let mut dest = vec![0u8; 8 * 8 * 4];
        backend.render_view_into(&src, &mut dest, 8, 8, 32);
        let words: &[u32] = bytemuck::cast_slice(&dest);
        assert_eq!(words[0], 0xFF11_2233);
        assert_eq!(words[8 * 7 + 7], 0);
    }

    #[test]
    fn gpu_mode_shares_shm_and_copies_heap() {
        let mut backend = RenderBackend::with_mode(RenderMode::Gpu);

        let shm = Buffer::alloc_shm(4, 4).unwrap();
        assert!(matches!(
            backend.capture(&shm),
            FrameCapture::Shared { width: 4, height: 4, .. }
        ));

        // Heap buffers take the copy path, but the mode stays Gpu.
        let heap = Buffer::alloc(4, 4);
        assert!(matches!(backend.capture(&heap), FrameCapture::Pixels { .. }));
        assert_eq!(backend.mode(), RenderMode::Gpu);
    }

    #[test]
    fn placeholder_frame_is_never_empty() {
        let backend = RenderBackend::new(false);
        let frame = backend.placeholder_frame(0, 0);
        assert_eq!((frame.width, frame.height), (1, 1));
        assert_eq!(frame.data.len(), 4);
    }
}

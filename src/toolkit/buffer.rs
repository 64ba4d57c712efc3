//! Pixel buffers for the headless toolkit.
//!
//! Two storage classes: plain heap buffers and shm buffers backed by a
//! sealed memfd. Only shm buffers can hand their fd across the
//! embedding boundary; the render backend falls back to a pixel copy
//! for everything else.

use anyhow::{Context, Result};
use log::warn;
use memmap2::{MmapMut, MmapOptions};
use std::ffi::CString;
use std::fs::File;
use std::os::unix::io::{FromRawFd, OwnedFd};

/// DRM fourcc 'AR24': 32-bit ARGB, 8 bits per channel, little-endian.
pub const FORMAT_ARGB8888: u32 = 0x3432_4152;

const BYTES_PER_PIXEL: u32 = 4;

enum Storage {
    Heap(Vec<u8>),
    Shm { file: File, map: MmapMut },
}

/// A single rendered or client-committed buffer.
pub struct Buffer {
    width: u32,
    height: u32,
    stride: u32,
    format: u32,
    storage: Storage,
}

impl Buffer {
    /// Allocate a plain heap buffer. Cannot be shared by fd.
    pub fn alloc(width: u32, height: u32) -> Self {
        let stride = width * BYTES_PER_PIXEL;
        Self {
            width,
            height,
            stride,
            format: FORMAT_ARGB8888,
            storage: Storage::Heap(vec![0; (stride * height) as usize]),
        }
    }

    /// Allocate an shm buffer backed by a memfd, mapped read-write.
    pub fn alloc_shm(width: u32, height: u32) -> Result<Self> {
        let stride = width * BYTES_PER_PIXEL;
        let size = (stride * height) as u64;

        let file = create_memfd(size).context("Failed to create shm buffer memfd")?;
        let map = unsafe { MmapOptions::new().map_mut(&file) }
            .context("Failed to map shm buffer")?;

        Ok(Self {
            width,
            height,
            stride,
            format: FORMAT_ARGB8888,
            storage: Storage::Shm { file, map },
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn format(&self) -> u32 {
        self.format
    }

    pub fn bytes(&self) -> &[u8] {
        match &self.storage {
            Storage::Heap(v) => v,
            Storage::Shm { map, .. } => map,
        }
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        match &mut self.storage {
            Storage::Heap(v) => v,
            Storage::Shm { map, .. } => map,
        }
    }

    /// Duplicate the backing fd so the caller owns its own reference.
    /// Returns `None` for heap buffers, which have nothing to share.
    pub fn share(&self) -> Option<OwnedFd> {
        match &self.storage {
            Storage::Heap(_) => None,
            Storage::Shm { file, .. } => match file.try_clone() {
                Ok(dup) => Some(OwnedFd::from(dup)),
                Err(e) => {
                    warn!("⚠️ Failed to duplicate shm buffer fd: {}", e);
                    None
                }
            },
        }
    }

    /// Fill the whole buffer with one packed ARGB pixel value.
    pub fn fill(&mut self, argb: u32) {
        let words: &mut [u32] = bytemuck::cast_slice_mut(self.bytes_mut());
        for w in words.iter_mut() {
            *w = argb;
        }
    }

    /// Blit `src` into this buffer at (x, y), clipped to the destination.
    pub fn blit_from(&mut self, src: &Buffer, x: i32, y: i32) {
        let dst_w = self.width as i64;
        let dst_h = self.height as i64;
        let src_w = src.width as i64;
        let src_h = src.height as i64;

        let x0 = (x as i64).max(0);
        let y0 = (y as i64).max(0);
        let x1 = (x as i64 + src_w).min(dst_w);
        let y1 = (y as i64 + src_h).min(dst_h);
        if x1 <= x0 || y1 <= y0 {
            return;
        }

        let copy_w = ((x1 - x0) * BYTES_PER_PIXEL as i64) as usize;
        let src_stride = src.stride as usize;
        let dst_stride = self.stride as usize;
        let src_x_off = ((x0 - x as i64) * BYTES_PER_PIXEL as i64) as usize;
        let src_y_off = (y0 - y as i64) as usize;
        let _ = src_h;

        let src_bytes = src.bytes();
        let dst_bytes = self.bytes_mut();
        for row in 0..(y1 - y0) as usize {
            let sy = src_y_off + row;
            let so = sy * src_stride + src_x_off;
            let d = (y0 as usize + row) * dst_stride + (x0 as usize * BYTES_PER_PIXEL as usize);
            dst_bytes[d..d + copy_w].copy_from_slice(&src_bytes[so..so + copy_w]);
        }
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field(
                "storage",
                &match self.storage {
                    Storage::Heap(_) => "heap",
                    Storage::Shm { .. } => "shm",
                },
            )
            .finish()
    }
}

fn create_memfd(size: u64) -> std::io::Result<File> {
    let name = CString::new("alcove-buffer").unwrap();
    let fd = unsafe { libc::memfd_create(name.as_ptr(), libc::MFD_CLOEXEC) };
    if fd < 0 {
        return Err(std::io::Error::last_os_error());
    }
    let file = unsafe { File::from_raw_fd(fd) };
    file.set_len(size)?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_buffers_are_not_shareable() {
        let buf = Buffer::alloc(16, 16);
        assert!(buf.share().is_none());
        assert_eq!(buf.bytes().len(), 16 * 16 * 4);
    }

    #[test]
    fn shm_buffers_duplicate_their_fd() {
        let buf = Buffer::alloc_shm(8, 8).unwrap();
        let a = buf.share().expect("shm buffer should share");
        let b = buf.share().expect("shm buffer should share again");
        // Two independent duplicates, not the producer's own fd.
        use std::os::unix::io::AsRawFd;
        assert_ne!(a.as_raw_fd(), b.as_raw_fd());
        assert_eq!(buf.stride(), 8 * 4);
    }

    #[test]
    fn fill_and_clipped_blit() {
        let mut dst = Buffer::alloc(4, 4);
        dst.fill(0xFF00_0000);

        let mut src = Buffer::alloc(2, 2);
        src.fill(0xFFFF_FFFF);

        // Partially off the bottom-right corner.
        dst.blit_from(&src, 3, 3);
        let words: &[u32] = bytemuck::cast_slice(dst.bytes());
        assert_eq!(words[4 * 3 + 3], 0xFFFF_FFFF);
        assert_eq!(words[4 * 3 + 2], 0xFF00_0000);

        // Fully outside: no-op.
        dst.blit_from(&src, 10, 10);
        dst.blit_from(&src, -5, -5);
    }
}

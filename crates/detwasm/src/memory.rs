use alloc::vec::Vec;

use crate::{cold, log, Error, Result, Trap};

/// The size of a WebAssembly page in bytes.
pub const PAGE_SIZE: usize = 64 * 1024;

/// Backing storage for a module's linear memory.
///
/// The engine only ever talks to linear memory through this trait, so embedders can plug in
/// their own storage (a pre-reserved arena, a memory-mapped file, an accounting wrapper, ...).
/// Implementations must keep `data().len() == page_count() * PAGE_SIZE` and zero-fill every
/// byte that becomes addressable.
pub trait MemoryAllocator: core::fmt::Debug {
    /// Drop the current contents and start over with `initial` zeroed pages. `maximum` is
    /// the page count `grow` must never go past.
    fn reset(&mut self, initial: u32, maximum: u32) -> Result<()>;

    /// The current size in pages.
    fn page_count(&self) -> u32;

    /// Grow by `delta` pages. Returns the previous page count, or `None` if the memory
    /// cannot grow that far.
    fn grow(&mut self, delta: u32) -> Option<u32>;

    /// The addressable bytes.
    fn data(&self) -> &[u8];

    /// The addressable bytes, mutably.
    fn data_mut(&mut self) -> &mut [u8];

    /// Read `len` bytes at `addr`.
    fn load(&self, addr: u64, len: usize) -> Result<&[u8]> {
        let data = self.data();
        let range = checked_range(addr, len, data.len())?;
        Ok(&data[range])
    }

    /// Write `bytes` at `addr`.
    fn store(&mut self, addr: u64, bytes: &[u8]) -> Result<()> {
        let data = self.data_mut();
        let range = checked_range(addr, bytes.len(), data.len())?;
        data[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Set `len` bytes at `addr` to `value`.
    fn fill(&mut self, addr: u64, len: usize, value: u8) -> Result<()> {
        let data = self.data_mut();
        let range = checked_range(addr, len, data.len())?;
        data[range].fill(value);
        Ok(())
    }

    /// Copy `len` bytes from `src` to `dst`. The ranges may overlap.
    fn copy_within(&mut self, dst: u64, src: u64, len: usize) -> Result<()> {
        let data = self.data_mut();
        let src = checked_range(src, len, data.len())?;
        let dst = checked_range(dst, len, data.len())?;
        data.copy_within(src, dst.start);
        Ok(())
    }
}

#[inline]
fn checked_range(addr: u64, len: usize, max: usize) -> Result<core::ops::Range<usize>> {
    let start = usize::try_from(addr).ok();
    match start.and_then(|start| Some(start..start.checked_add(len)?)) {
        Some(range) if range.end <= max => Ok(range),
        _ => {
            cold();
            Err(Error::Trap(Trap::MemoryOutOfBounds {
                offset: usize::try_from(addr).unwrap_or(usize::MAX),
                len,
                max,
            }))
        }
    }
}

/// A [`MemoryAllocator`] backed by a `Vec<u8>`.
///
/// Pages are only handed out when the host allocator can provide them, so a module asking for
/// more memory than the host has gets a failed `memory.grow` instead of taking the process
/// down. [`WasmAllocator::with_byte_limit`] caps the backing storage below that.
#[derive(Debug)]
pub struct WasmAllocator {
    data: Vec<u8>,
    max_pages: u32,
    byte_limit: usize,
}

impl Default for WasmAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl WasmAllocator {
    /// Create an empty allocator. It holds no memory until it is reset.
    pub fn new() -> Self {
        Self::with_byte_limit(usize::MAX)
    }

    /// Create an empty allocator that never holds more than `byte_limit` bytes.
    pub fn with_byte_limit(byte_limit: usize) -> Self {
        Self { data: Vec::new(), max_pages: 0, byte_limit }
    }

    /// Resize the storage to `pages` zeroed pages, or leave it untouched if the bytes are
    /// not available.
    fn resize(&mut self, pages: u32) -> bool {
        let Some(bytes) = (pages as usize).checked_mul(PAGE_SIZE).filter(|bytes| *bytes <= self.byte_limit) else {
            return false;
        };

        if self.data.try_reserve_exact(bytes.saturating_sub(self.data.len())).is_err() {
            cold();
            log::error!("host refused {} bytes of linear memory", bytes);
            return false;
        }

        self.data.resize(bytes, 0);
        true
    }
}

impl MemoryAllocator for WasmAllocator {
    fn reset(&mut self, initial: u32, maximum: u32) -> Result<()> {
        if initial > maximum {
            return Err(Error::Other(alloc::format!(
                "initial memory size of {initial} pages exceeds the maximum of {maximum} pages"
            )));
        }

        log::debug!("resetting memory to {} pages (maximum {})", initial, maximum);
        self.data.clear();
        if !self.resize(initial) {
            return Err(Error::Other(alloc::format!("cannot allocate {initial} pages of linear memory")));
        }
        self.max_pages = maximum;
        Ok(())
    }

    fn page_count(&self) -> u32 {
        (self.data.len() / PAGE_SIZE) as u32
    }

    fn grow(&mut self, delta: u32) -> Option<u32> {
        let current = self.page_count();
        let new_pages = current.checked_add(delta)?;
        if new_pages > self.max_pages {
            return None;
        }

        if !self.resize(new_pages) {
            return None;
        }
        Some(current)
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

//! Over-aligned heap allocation for Karst runtime values.
//!
//! Values manipulated through the type-erased protocol are stored in
//! raw memory whose size and alignment are only known at runtime, and
//! they must be releasable from a bare payload pointer with no further
//! context. Each allocation therefore carries a small header directly
//! in front of the payload recording the payload's size and alignment,
//! from which [`free_aligned`] recovers the base address and layout of
//! the underlying block.

use std::{alloc, mem, ptr};

use thiserror::Error;

/// Error raised when the host allocator cannot satisfy a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("failed to allocate {size} bytes aligned to {align} bytes")]
pub struct AllocError {
    /// The requested payload size in bytes.
    pub size: usize,

    /// The requested payload alignment in bytes.
    pub align: usize,
}

/// Book-keeping stored immediately in front of every payload.
#[repr(C)]
#[derive(Clone, Copy)]
struct Header {
    /// The size of the payload in bytes.
    size: usize,

    /// The alignment of the payload in bytes.
    align: usize,
}

/// Compute the layout of the whole block backing a payload of the
/// given size and alignment, and the offset of the payload within it.
fn block_layout(size: usize, align: usize) -> Result<(alloc::Layout, usize), AllocError> {
    let block_align = align.max(mem::align_of::<Header>());

    // Round the header up to the payload alignment so that the payload
    // starts on an aligned boundary. The header itself stays aligned
    // because `block_align` is at least its own alignment.
    let offset = mem::size_of::<Header>().next_multiple_of(block_align);

    let block_size = offset.checked_add(size).ok_or(AllocError { size, align })?;
    let layout = alloc::Layout::from_size_align(block_size, block_align)
        .map_err(|_| AllocError { size, align })?;

    Ok((layout, offset))
}

/// Allocate `size` bytes of storage aligned to `align`, initialized to
/// zero iff `zeroed` is set.
///
/// A request for zero bytes returns the null pointer. The returned
/// pointer must be released with [`free_aligned`].
///
/// - Requires: `align` is a power of two.
pub fn alloc_aligned(size: usize, align: usize, zeroed: bool) -> Result<*mut u8, AllocError> {
    debug_assert!(align.is_power_of_two());

    if size == 0 {
        return Ok(ptr::null_mut());
    }

    let (layout, offset) = block_layout(size, align)?;

    // SAFETY: `layout` has a non-zero size because `offset` is at
    // least the size of the header.
    let base = unsafe {
        if zeroed {
            alloc::alloc_zeroed(layout)
        } else {
            alloc::alloc(layout)
        }
    };

    if base.is_null() {
        return Err(AllocError { size, align });
    }

    // SAFETY: `offset + size` is within the block, and the header slot
    // directly precedes the payload inside it.
    unsafe {
        let payload = base.add(offset);
        payload.sub(mem::size_of::<Header>()).cast::<Header>().write(Header { size, align });
        Ok(payload)
    }
}

/// Release memory previously returned by [`alloc_aligned`].
///
/// This function is a no-op if `payload` is null.
///
/// # Safety
///
/// `payload` must be null or a pointer returned by [`alloc_aligned`]
/// that has not been freed already.
pub unsafe fn free_aligned(payload: *mut u8) {
    if payload.is_null() {
        return;
    }

    let header = payload.sub(mem::size_of::<Header>()).cast::<Header>().read();

    // The header round-trips the exact request, so the recomputed
    // layout matches the one the block was allocated with.
    let (layout, offset) = block_layout(header.size, header.align)
        .expect("allocation header describes an impossible layout");

    alloc::dealloc(payload.sub(offset), layout);
}

/// An aligned, zero-initialized allocation released when the value is
/// dropped, on all exit paths including panics.
pub struct ScopedBuffer {
    ptr: *mut u8,
}

impl ScopedBuffer {
    /// Acquire a zeroed buffer of `size` bytes aligned to `align`.
    ///
    /// A request for zero bytes yields a buffer whose pointer is null.
    pub fn zeroed(size: usize, align: usize) -> Result<Self, AllocError> {
        Ok(Self { ptr: alloc_aligned(size, align, true)? })
    }

    /// The base address of the buffer. The pointer is invalidated when
    /// the buffer is dropped.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }
}

impl Drop for ScopedBuffer {
    fn drop(&mut self) {
        // SAFETY: `ptr` came from `alloc_aligned` and is freed exactly
        // once, here.
        unsafe { free_aligned(self.ptr) };
    }
}

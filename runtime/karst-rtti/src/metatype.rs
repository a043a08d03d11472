//! Computed layout information about the runtime type of a value.
//!
//! A [Metatype] is produced exclusively by the store when a type is
//! defined; afterwards it is read-only. For product types `fields` and
//! `offsets` run in parallel, one entry per field. For sum types with
//! two or more cases the convention differs: `fields` holds one entry
//! per *case*, while `offsets` holds exactly two *slots* — slot 0 is
//! the payload at the base address and slot 1 is the trailing 16-bit
//! tag. The type needed to copy or destroy the payload is recovered
//! through `fields()[tag]`.

use bitflags::bitflags;
use karst_target::{Alignment, Size};

use crate::ty::Field;

bitflags! {
    /// Properties of a defined [Metatype].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MetatypeFlags: u8 {
        /// Instances can be copied with a bitwise copy and destroyed
        /// by doing nothing: no out-of-line storage is transitively
        /// reachable without crossing an indirection.
        const TRIVIAL = 1 << 0;
    }
}

/// Information about the runtime layout of a defined type.
#[derive(Debug)]
pub struct Metatype {
    /// The size of an instance in its natural, non-indirected form.
    size: Size,

    /// The alignment of an instance.
    alignment: Alignment,

    /// Property flags of the described type.
    flags: MetatypeFlags,

    /// The field descriptors supplied at definition time, in order.
    fields: Vec<Field>,

    /// Byte offsets of the addressable slots of an instance.
    offsets: Vec<Size>,
}

impl Metatype {
    /// Create a metatype with the given layout. Only the store builds
    /// these, once per type, after the whole layout is computed.
    pub(crate) fn new(
        size: Size,
        alignment: Alignment,
        trivial: bool,
        fields: Vec<Field>,
        offsets: Vec<Size>,
    ) -> Self {
        let flags = if trivial { MetatypeFlags::TRIVIAL } else { MetatypeFlags::empty() };
        Self { size, alignment, flags, fields, offsets }
    }

    /// The size of an instance of the described type.
    #[inline]
    pub fn size(&self) -> Size {
        self.size
    }

    /// The alignment of an instance of the described type.
    #[inline]
    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    /// Whether instances involve no out-of-line storage.
    #[inline]
    pub fn is_trivial(&self) -> bool {
        self.flags.contains(MetatypeFlags::TRIVIAL)
    }

    /// The fields of the described type: per-field for products,
    /// per-case for sums.
    #[inline]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// The offsets of the addressable slots of an instance.
    #[inline]
    pub fn offsets(&self) -> &[Size] {
        &self.offsets
    }

    /// The offset of the `index`-th slot, if there is one.
    #[inline]
    pub fn offset(&self, index: usize) -> Option<Size> {
        self.offsets.get(index).copied()
    }
}

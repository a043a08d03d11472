//! The type-erased value protocol: copying, destroying, and addressing
//! values through untyped pointers, driven by the metatype computed at
//! definition time.
//!
//! Every operation receives a type handle and raw addresses and
//! dispatches on the header variant. Out-of-line fields occupy one
//! pointer slot in their parent; the slot is null until the address of
//! that field is first taken, at which point zeroed backing storage is
//! allocated. That makes initialization and traversal of partially
//! built values uniform, and lets recursive types bottom out.

use std::{mem, ptr};

use karst_alloc::{alloc_aligned, free_aligned, ScopedBuffer};
use karst_target::Size;

use crate::{
    error::{TypeError, TypeResult},
    metatype::Metatype,
    store::TypeStore,
    ty::{Field, TypeHeader, TypeId},
};

impl TypeStore {
    /// Returns `base` advanced by the offset of the `index`-th slot of
    /// an instance of `ty`.
    ///
    /// For product types the slot is a field: if it is stored
    /// out-of-line and its pointer is still null, zeroed backing
    /// storage for the field's type is allocated and stored first, and
    /// the indirected address is returned. For sum types slot 0 is the
    /// payload and slot 1 the tag; indirection of the active case is
    /// resolved by the copy and destroy operations, which know the tag.
    ///
    /// # Safety
    ///
    /// `base` must point to writable memory laid out as an instance of
    /// `ty` (initialized or zeroed).
    pub unsafe fn address_of(
        &self,
        ty: TypeId,
        index: usize,
        base: *mut u8,
    ) -> TypeResult<*mut u8> {
        let metatype = self.metatype(ty)?;
        let offset = metatype.offset(index).ok_or_else(|| TypeError::IndexOutOfRange {
            description: self.description(ty),
            index,
        })?;

        match self.header(ty)? {
            TypeHeader::Struct(_) => {
                self.projected_address(metatype.fields()[index], offset, base)
            }
            _ => Ok(base.add(offset.bytes_usize())),
        }
    }

    /// Resolve the address where the value of `field` lives, given the
    /// offset of its slot within `base`. For out-of-line fields the
    /// slot holds a pointer, which is lazily initialized to fresh
    /// zeroed storage when it is still null.
    pub(crate) unsafe fn projected_address(
        &self,
        field: Field,
        offset: Size,
        base: *mut u8,
    ) -> TypeResult<*mut u8> {
        let slot = base.add(offset.bytes_usize());
        if !field.is_out_of_line() {
            return Ok(slot);
        }

        let slot = slot.cast::<*mut u8>();
        let current = slot.read();
        if !current.is_null() {
            return Ok(current);
        }

        let size = self.size(field.ty())?;
        let alignment = self.alignment(field.ty())?;
        let storage = alloc_aligned(size.bytes_usize(), alignment.bytes_usize(), true).map_err(
            |source| TypeError::Allocation { description: self.description(field.ty()), source },
        )?;

        slot.write(storage);
        Ok(storage)
    }

    /// Read the active case tag of a sum value. Sums with fewer than
    /// two cases carry no tag slot; their only possible case is 0.
    pub(crate) unsafe fn read_tag(&self, metatype: &Metatype, source: *mut u8) -> usize {
        match metatype.offset(1) {
            Some(offset) => source.add(offset.bytes_usize()).cast::<u16>().read() as usize,
            None => 0,
        }
    }

    /// The descriptor of the `tag`-th case of the sum type `ty`.
    pub(crate) fn case_field(
        &self,
        ty: TypeId,
        metatype: &Metatype,
        tag: usize,
    ) -> TypeResult<Field> {
        metatype.fields().get(tag).copied().ok_or_else(|| TypeError::IndexOutOfRange {
            description: self.description(ty),
            index: tag,
        })
    }

    /// Initialize `target` with a copy of the instance of `ty` stored
    /// at `source`.
    ///
    /// # Safety
    ///
    /// `source` must hold an initialized instance of `ty` (null
    /// out-of-line slots count as initialized-empty), and `target` must
    /// point to writable, zero-initialized storage for one.
    pub unsafe fn copy_initialize(
        &self,
        ty: TypeId,
        target: *mut u8,
        source: *mut u8,
    ) -> TypeResult<()> {
        match self.header(ty)? {
            TypeHeader::Primitive(_) => self.copy_bits(ty, target, source),
            TypeHeader::Struct(_) => self.copy_initialize_struct(ty, target, source),
            TypeHeader::Enum(_) => self.copy_initialize_enum(ty, target, source),
        }
    }

    /// Copy an instance of `ty` bitwise.
    unsafe fn copy_bits(&self, ty: TypeId, target: *mut u8, source: *mut u8) -> TypeResult<()> {
        let size = self.size(ty)?.bytes_usize();
        if size > 0 {
            ptr::copy_nonoverlapping(source, target, size);
        }
        Ok(())
    }

    unsafe fn copy_initialize_struct(
        &self,
        ty: TypeId,
        target: *mut u8,
        source: *mut u8,
    ) -> TypeResult<()> {
        let metatype = self.metatype(ty)?;
        if metatype.is_trivial() {
            return self.copy_bits(ty, target, source);
        }

        for (index, &field) in metatype.fields().iter().enumerate() {
            let offset = metatype.offsets()[index];
            let field_target = self.projected_address(field, offset, target)?;
            let field_source = self.projected_address(field, offset, source)?;
            self.copy_initialize(field.ty(), field_target, field_source)?;
        }

        Ok(())
    }

    unsafe fn copy_initialize_enum(
        &self,
        ty: TypeId,
        target: *mut u8,
        source: *mut u8,
    ) -> TypeResult<()> {
        let metatype = self.metatype(ty)?;
        if metatype.is_trivial() {
            return self.copy_bits(ty, target, source);
        }

        let tag = self.read_tag(metatype, source);
        let case = self.case_field(ty, metatype, tag)?;

        // Copy the active payload.
        let payload_target = self.projected_address(case, Size::ZERO, target)?;
        let payload_source = self.projected_address(case, Size::ZERO, source)?;
        self.copy_initialize(case.ty(), payload_target, payload_source)?;

        // Copy the tag, unless the sum carries none.
        if let Some(offset) = metatype.offset(1) {
            target.add(offset.bytes_usize()).cast::<u16>().write(tag as u16);
        }

        Ok(())
    }

    /// Initialize `target` to a fresh instance of the sum type `ty`
    /// whose active case is `tag`, copying the payload from `source`.
    ///
    /// # Safety
    ///
    /// `source` must hold an initialized instance of the `tag`-th
    /// case's type, and `target` must point to writable,
    /// zero-initialized storage for an instance of `ty`.
    pub unsafe fn copy_initialize_enum_case(
        &self,
        ty: TypeId,
        tag: usize,
        target: *mut u8,
        source: *mut u8,
    ) -> TypeResult<()> {
        let metatype = self.metatype(ty)?;
        debug_assert!(
            matches!(self.entries[ty].header, TypeHeader::Enum(_)),
            "copy_initialize_enum_case on a non-enum header"
        );

        let case = self.case_field(ty, metatype, tag)?;

        // Copy the payload.
        let payload = self.projected_address(case, Size::ZERO, target)?;
        self.copy_initialize(case.ty(), payload, source)?;

        // Set the tag.
        if let Some(offset) = metatype.offset(1) {
            target.add(offset.bytes_usize()).cast::<u16>().write(tag as u16);
        }

        Ok(())
    }

    /// Initialize `target` with a copy of the host value `value`,
    /// which must have the same size as an instance of `ty`.
    ///
    /// # Safety
    ///
    /// `target` must point to writable storage for an instance of `ty`.
    pub unsafe fn copy_initialize_primitive<T: Copy>(
        &self,
        ty: TypeId,
        target: *mut u8,
        value: T,
    ) -> TypeResult<()> {
        let expected = self.size(ty)?.bytes();
        let actual = mem::size_of::<T>() as u64;
        if expected != actual {
            return Err(TypeError::ShapeMismatch {
                description: self.description(ty),
                expected,
                actual,
            });
        }

        let mut value = value;
        self.copy_initialize(ty, target, (&mut value as *mut T).cast::<u8>())
    }

    /// Destroy the instance of `ty` stored at `source`, releasing all
    /// of its out-of-line storage and nulling the released slots.
    ///
    /// Destruction never allocates: out-of-line slots that were never
    /// forced are skipped.
    ///
    /// # Safety
    ///
    /// `source` must hold an initialized instance of `ty` (null
    /// out-of-line slots count as initialized-empty). The value must
    /// not be used again without re-initialization.
    pub unsafe fn deinitialize(&self, ty: TypeId, source: *mut u8) -> TypeResult<()> {
        match self.header(ty)? {
            TypeHeader::Primitive(_) => Ok(()),
            TypeHeader::Struct(_) => self.deinitialize_struct(ty, source),
            TypeHeader::Enum(_) => self.deinitialize_enum(ty, source),
        }
    }

    unsafe fn deinitialize_struct(&self, ty: TypeId, source: *mut u8) -> TypeResult<()> {
        let metatype = self.metatype(ty)?;
        if metatype.is_trivial() {
            return Ok(());
        }

        for (index, &field) in metatype.fields().iter().enumerate() {
            self.deinitialize_slot(field, metatype.offsets()[index], source)?;
        }

        Ok(())
    }

    unsafe fn deinitialize_enum(&self, ty: TypeId, source: *mut u8) -> TypeResult<()> {
        let metatype = self.metatype(ty)?;
        if metatype.is_trivial() {
            return Ok(());
        }

        let tag = self.read_tag(metatype, source);
        let case = self.case_field(ty, metatype, tag)?;
        self.deinitialize_slot(case, Size::ZERO, source)
    }

    /// Destroy the value of `field` held in the slot at `offset` within
    /// `base`. Out-of-line backing storage is released and the slot is
    /// nulled afterwards, so a fully deinitialized value holds only
    /// null pointer slots.
    unsafe fn deinitialize_slot(
        &self,
        field: Field,
        offset: Size,
        base: *mut u8,
    ) -> TypeResult<()> {
        if !field.is_out_of_line() {
            return self.deinitialize(field.ty(), base.add(offset.bytes_usize()));
        }

        let slot = base.add(offset.bytes_usize()).cast::<*mut u8>();
        let storage = slot.read();
        if storage.is_null() {
            return Ok(());
        }

        self.deinitialize(field.ty(), storage)?;
        free_aligned(storage);
        slot.write(ptr::null_mut());
        Ok(())
    }

    /// Destroy the value of `field` stored at `source`, where `source`
    /// is the resolved address of the field's value (as returned by
    /// [`Self::address_of`]), releasing that storage itself if the
    /// field is indirect. The containing slot is not touched; prefer
    /// deinitializing the whole parent when it is reachable.
    ///
    /// # Safety
    ///
    /// `source` must hold an initialized instance of the field's type,
    /// and, for indirect fields, must be storage obtained from the
    /// runtime's aligned allocator.
    pub unsafe fn deinitialize_field(&self, field: Field, source: *mut u8) -> TypeResult<()> {
        self.deinitialize(field.ty(), source)?;
        if field.is_out_of_line() {
            free_aligned(source);
        }
        Ok(())
    }

    /// Call `action` with the base address of a zero-initialized
    /// buffer large enough to hold `count` instances of `ty`: exactly
    /// `size` bytes when `count` is 1, `stride × count` otherwise.
    ///
    /// The buffer is released when `action` returns, on all exit paths.
    /// Zero-sized requests yield the null pointer. Instances stored in
    /// the buffer must be deinitialized before `action` returns; this
    /// is a caller contract, not enforced.
    pub fn with_temporary_allocation<R>(
        &self,
        ty: TypeId,
        count: usize,
        action: impl FnOnce(*mut u8) -> R,
    ) -> TypeResult<R> {
        let bytes = if count == 1 { self.size(ty)? } else { self.stride(ty)? * count as u64 };
        if bytes.is_zero() {
            return Ok(action(ptr::null_mut()));
        }

        let alignment = self.alignment(ty)?;
        let buffer = ScopedBuffer::zeroed(bytes.bytes_usize(), alignment.bytes_usize())
            .map_err(|source| TypeError::Allocation { description: self.description(ty), source })?;

        Ok(action(buffer.as_ptr()))
    }
}

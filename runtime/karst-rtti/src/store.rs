//! The type interning store. The store owns every [TypeHeader] that
//! has been declared, assigns each structurally distinct header a
//! single canonical [TypeId], and associates it with a [Metatype]
//! once the type is defined.
//!
//! The declare/define split lets mutually recursive types be laid out:
//! a header may be declared, referenced behind an out-of-line field of
//! another type's definition, and only defined afterwards. Layout is
//! computed in full before any of it becomes observable, so a failed
//! `define` leaves the store unchanged.

use index_vec::IndexVec;
use karst_target::{Alignment, HostDataLayout, Size};
use log::debug;

use crate::{
    error::{TypeError, TypeResult},
    hashing::FnvHashMap,
    metatype::Metatype,
    ty::{Field, PrimitiveTy, TypeHeader, TypeId},
};

/// Handles of the primitive types, which every store declares (and
/// defines) at construction.
#[derive(Debug, Clone, Copy)]
pub struct CommonTypes {
    pub boolean: TypeId,
    pub i32: TypeId,
    pub i64: TypeId,
    pub str: TypeId,
}

/// An interned header together with its metatype, which stays `None`
/// between declaration and definition.
pub(crate) struct TypeEntry {
    pub(crate) header: TypeHeader,
    pub(crate) metatype: Option<Metatype>,
}

/// The store of every type the runtime knows about.
///
/// Not thread-safe: declaring and defining race on the interning table,
/// so a store must be confined to one thread or externally locked.
pub struct TypeStore {
    /// The layout rules of the machine values live on.
    data_layout: HostDataLayout,

    /// The interned headers and their metatypes, indexed by handle.
    pub(crate) entries: IndexVec<TypeId, TypeEntry>,

    /// A table from a header to its canonical handle.
    interner: FnvHashMap<TypeHeader, TypeId>,

    /// Commonly used types, stored in a table.
    pub common_tys: CommonTypes,
}

impl TypeStore {
    /// Create a store for values living on the host machine.
    pub fn new() -> Self {
        Self::with_data_layout(HostDataLayout::host())
    }

    /// Create a store with an explicit data layout.
    pub fn with_data_layout(data_layout: HostDataLayout) -> Self {
        let placeholder = TypeId::from_usize(0);
        let mut store = Self {
            data_layout,
            entries: IndexVec::new(),
            interner: FnvHashMap::default(),
            common_tys: CommonTypes {
                boolean: placeholder,
                i32: placeholder,
                i64: placeholder,
                str: placeholder,
            },
        };

        store.common_tys = CommonTypes {
            boolean: store.declare(PrimitiveTy::Bool.into()),
            i32: store.declare(PrimitiveTy::I32.into()),
            i64: store.declare(PrimitiveTy::I64.into()),
            str: store.declare(PrimitiveTy::Str.into()),
        };

        store
    }

    /// The layout rules this store computes layouts against.
    pub fn data_layout(&self) -> &HostDataLayout {
        &self.data_layout
    }

    /// Return the canonical handle of the unique interned header equal
    /// to `header`, interning it first if it is new.
    ///
    /// Newly interned composite headers start out undefined; primitive
    /// headers are defined the moment they are declared, since their
    /// layout is fixed by the host.
    pub fn declare(&mut self, header: TypeHeader) -> TypeId {
        if let Some(&existing) = self.interner.get(&header) {
            return existing;
        }

        let metatype = match &header {
            TypeHeader::Primitive(primitive) => Some(Metatype::new(
                primitive.size(&self.data_layout),
                primitive.alignment(&self.data_layout),
                true,
                Vec::new(),
                Vec::new(),
            )),
            TypeHeader::Struct(_) | TypeHeader::Enum(_) => None,
        };

        let id = self.entries.push(TypeEntry { header: header.clone(), metatype });
        self.interner.insert(header, id);
        debug!("declared {} as {:?}", self.description(id), id);
        id
    }

    /// Declare the primitive type identified by `tag`.
    pub fn declare_primitive(&mut self, tag: PrimitiveTy) -> TypeId {
        self.declare(TypeHeader::Primitive(tag))
    }

    /// The handle of a primitive type, without touching the interner.
    pub fn primitive(&self, tag: PrimitiveTy) -> TypeId {
        match tag {
            PrimitiveTy::Bool => self.common_tys.boolean,
            PrimitiveTy::I32 => self.common_tys.i32,
            PrimitiveTy::I64 => self.common_tys.i64,
            PrimitiveTy::Str => self.common_tys.str,
        }
    }

    /// The entry behind a handle, or the unknown-type error.
    fn entry(&self, ty: TypeId) -> TypeResult<&TypeEntry> {
        self.entries
            .get(ty)
            .ok_or_else(|| TypeError::UnknownType { description: self.description(ty) })
    }

    /// The interned header behind a handle.
    pub fn header(&self, ty: TypeId) -> TypeResult<&TypeHeader> {
        Ok(&self.entry(ty)?.header)
    }

    /// Whether `ty` has been declared and defined in this store.
    pub fn defined(&self, ty: TypeId) -> bool {
        self.entries.get(ty).is_some_and(|entry| entry.metatype.is_some())
    }

    /// The metatype of `ty`.
    ///
    /// Fails if `ty` is unknown to this store or not yet defined.
    pub fn metatype(&self, ty: TypeId) -> TypeResult<&Metatype> {
        self.entry(ty)?
            .metatype
            .as_ref()
            .ok_or_else(|| TypeError::UndefinedType { description: self.description(ty) })
    }

    /// Check that `ty` is known and has not been defined yet.
    fn check_undefined(&self, ty: TypeId) -> TypeResult<()> {
        if self.entry(ty)?.metatype.is_some() {
            return Err(TypeError::Redefinition { description: self.description(ty) });
        }
        Ok(())
    }

    /// Assign a product layout to `ty` from the given fields.
    ///
    /// Fails if `ty` is unknown, already defined, or if a non-indirect
    /// field references a type that is not defined yet.
    pub fn define_struct(&mut self, ty: TypeId, fields: Vec<Field>) -> TypeResult<&Metatype> {
        self.check_undefined(ty)?;
        debug_assert!(
            matches!(self.entries[ty].header, TypeHeader::Struct(_)),
            "define_struct on a non-struct header"
        );

        let metatype = self.compute_struct_layout(fields)?;
        debug!(
            "defined {}: size {}, alignment {}",
            self.description(ty),
            metatype.size(),
            metatype.alignment()
        );

        Ok(self.entries[ty].metatype.insert(metatype))
    }

    /// Assign a sum layout to `ty` from the given cases.
    ///
    /// Fails if `ty` is unknown, already defined, or if a non-indirect
    /// case references a type that is not defined yet.
    pub fn define_enum(&mut self, ty: TypeId, cases: Vec<Field>) -> TypeResult<&Metatype> {
        self.check_undefined(ty)?;
        debug_assert!(
            matches!(self.entries[ty].header, TypeHeader::Enum(_)),
            "define_enum on a non-enum header"
        );

        let metatype = self.compute_enum_layout(cases)?;
        debug!(
            "defined {}: size {}, alignment {}",
            self.description(ty),
            metatype.size(),
            metatype.alignment()
        );

        Ok(self.entries[ty].metatype.insert(metatype))
    }

    /// Lay out a product: fields in declared order, each aligned to its
    /// natural alignment.
    fn compute_struct_layout(&self, fields: Vec<Field>) -> TypeResult<Metatype> {
        if fields.is_empty() {
            return Ok(Metatype::new(Size::ZERO, Alignment::ONE, true, fields, Vec::new()));
        }

        let mut offsets = Vec::with_capacity(fields.len());
        offsets.push(Size::ZERO);
        for index in 1..fields.len() {
            let end = offsets[index - 1] + self.field_size(fields[index - 1])?;
            offsets.push(end.align_to(self.field_alignment(fields[index])?));
        }

        let last = fields.len() - 1;
        let size = offsets[last] + self.field_size(fields[last])?;

        let mut alignment = Alignment::ONE;
        for &field in &fields {
            alignment = alignment.max(self.field_alignment(field)?);
        }

        let trivial = self.all_trivial(&fields)?;
        Ok(Metatype::new(size, alignment, trivial, fields, offsets))
    }

    /// Lay out a sum. A sum with no cases is uninhabited and takes no
    /// space; one with a single case borrows that case's layout and
    /// needs no tag; a sum with two or more cases stores the payload at
    /// the base address and a 16-bit tag after the largest payload.
    fn compute_enum_layout(&self, cases: Vec<Field>) -> TypeResult<Metatype> {
        match cases.len() {
            0 => Ok(Metatype::new(Size::ZERO, Alignment::ONE, true, cases, Vec::new())),
            1 => {
                let size = self.field_size(cases[0])?;
                let alignment = self.field_alignment(cases[0])?;
                let trivial = self.field_is_trivial(cases[0])?;
                Ok(Metatype::new(size, alignment, trivial, cases, vec![Size::ZERO]))
            }
            _ => {
                let mut payload = Size::ZERO;
                let mut alignment = Alignment::ONE;
                for &case in &cases {
                    payload = payload.max(self.field_size(case)?);
                    alignment = alignment.max(self.field_alignment(case)?);
                }

                let tag_offset = payload.align_to(self.data_layout.tag_align());
                let size = tag_offset + self.data_layout.tag_size();
                let alignment = alignment.max(self.data_layout.tag_align());

                let trivial = self.all_trivial(&cases)?;
                Ok(Metatype::new(size, alignment, trivial, cases, vec![Size::ZERO, tag_offset]))
            }
        }
    }

    /// The size of an instance of `ty`.
    pub fn size(&self, ty: TypeId) -> TypeResult<Size> {
        Ok(self.metatype(ty)?.size())
    }

    /// The alignment of an instance of `ty`.
    pub fn alignment(&self, ty: TypeId) -> TypeResult<Alignment> {
        Ok(self.metatype(ty)?.alignment())
    }

    /// Whether instances of `ty` involve no out-of-line storage.
    pub fn is_trivial(&self, ty: TypeId) -> TypeResult<bool> {
        Ok(self.metatype(ty)?.is_trivial())
    }

    /// The size a field occupies within its parent: a pointer slot for
    /// out-of-line fields, the field type's own size otherwise.
    pub fn field_size(&self, field: Field) -> TypeResult<Size> {
        if field.is_out_of_line() {
            Ok(self.data_layout.pointer_size)
        } else {
            self.size(field.ty())
        }
    }

    /// The alignment a field requires within its parent.
    pub fn field_alignment(&self, field: Field) -> TypeResult<Alignment> {
        if field.is_out_of_line() {
            Ok(self.data_layout.pointer_align)
        } else {
            self.alignment(field.ty())
        }
    }

    /// Whether `field` involves no out-of-line storage. An indirect
    /// field never is, and the answer does not consult its type, so
    /// indirection to a not-yet-defined type is still answerable.
    pub fn field_is_trivial(&self, field: Field) -> TypeResult<bool> {
        if field.is_out_of_line() {
            return Ok(false);
        }
        self.is_trivial(field.ty())
    }

    /// Whether none of the given fields involves out-of-line storage.
    pub fn all_trivial(&self, fields: &[Field]) -> TypeResult<bool> {
        for &field in fields {
            if !self.field_is_trivial(field)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// The number of bytes from the start of one instance of `ty` to
    /// the start of the next when stored contiguously.
    pub fn stride(&self, ty: TypeId) -> TypeResult<Size> {
        let metatype = self.metatype(ty)?;
        let pitch = metatype.size().align_to(metatype.alignment());
        Ok(pitch.max(Size::from_bytes(1u64)))
    }

    /// The offset of the `index`-th slot of an instance of `ty`.
    ///
    /// For products the slots are the fields; for sums with two or more
    /// cases, slot 0 is the payload and slot 1 is the tag.
    pub fn offset(&self, ty: TypeId, index: usize) -> TypeResult<Size> {
        self.metatype(ty)?
            .offset(index)
            .ok_or_else(|| TypeError::IndexOutOfRange { description: self.description(ty), index })
    }
}

impl Default for TypeStore {
    fn default() -> Self {
        Self::new()
    }
}

//! The canonical identifiers of runtime types. A [TypeHeader] is the
//! information necessary to uniquely identify a type at runtime: for
//! primitives the tag alone, for composites the interned name together
//! with the ordered type arguments.
//!
//! Headers are owned by the [`TypeStore`](crate::store::TypeStore),
//! which interns them and hands out [TypeId] handles. Two headers are
//! equal iff they have the same variant and, for composites, the same
//! name and the same argument handles in the same order; since both
//! names and arguments are themselves canonical, derived structural
//! equality coincides with identity of the described type.

use std::mem;

use derive_more::Constructor;
use karst_target::{Alignment, HostDataLayout, Size};
use smallvec::SmallVec;

use crate::identifier::Identifier;

index_vec::define_index_type! {
    /// A handle to a type interned in a store. Handles are only
    /// meaningful together with the store that produced them.
    pub struct TypeId = u32;

    MAX_INDEX = i32::max_value() as usize;
    DISABLE_MAX_INDEX_CHECK = cfg!(not(debug_assertions));

    DEBUG_FORMAT = "ty#{}";

    DISPLAY_FORMAT = "{}";
}

/// A tag identifying a primitive type. The discriminants form a stable
/// enumeration that external tables may rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PrimitiveTy {
    /// A single-byte boolean value.
    Bool = 0,

    /// A 32-bit signed integer.
    I32 = 1,

    /// A 64-bit signed integer.
    I64 = 2,

    /// A borrowed pointer to a nul-terminated string.
    Str = 3,
}

impl PrimitiveTy {
    /// All primitive tags, in declaration order.
    pub const ALL: [PrimitiveTy; 4] =
        [PrimitiveTy::Bool, PrimitiveTy::I32, PrimitiveTy::I64, PrimitiveTy::Str];

    /// The name of the primitive as it appears in type descriptions.
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveTy::Bool => "Bool",
            PrimitiveTy::I32 => "Int32",
            PrimitiveTy::I64 => "Int64",
            PrimitiveTy::Str => "String",
        }
    }

    /// The size of an instance of the primitive on the given host.
    pub fn size(self, dl: &HostDataLayout) -> Size {
        match self {
            PrimitiveTy::Bool => Size::from_bytes(mem::size_of::<bool>()),
            PrimitiveTy::I32 => Size::from_bytes(mem::size_of::<i32>()),
            PrimitiveTy::I64 => Size::from_bytes(mem::size_of::<i64>()),
            PrimitiveTy::Str => dl.pointer_size,
        }
    }

    /// The alignment of an instance of the primitive on the given host.
    pub fn alignment(self, dl: &HostDataLayout) -> Alignment {
        match self {
            PrimitiveTy::Bool => dl.i8_align,
            PrimitiveTy::I32 => dl.i32_align,
            PrimitiveTy::I64 => dl.i64_align,
            PrimitiveTy::Str => dl.pointer_align,
        }
    }
}

/// The name and ordered type arguments shared by `struct` and `enum`
/// headers; which of the two a given value identifies is carried by the
/// surrounding [TypeHeader] variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeHeader {
    /// The interned name of the type.
    pub name: Identifier,

    /// The canonical handles of the type arguments, in order.
    pub args: SmallVec<[TypeId; 4]>,
}

impl CompositeHeader {
    /// Create a header with the given name and type arguments.
    pub fn new(name: impl Into<Identifier>, args: impl IntoIterator<Item = TypeId>) -> Self {
        Self { name: name.into(), args: args.into_iter().collect() }
    }
}

/// The information necessary to uniquely identify a type at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeHeader {
    /// A built-in type, identified by its tag alone.
    Primitive(PrimitiveTy),

    /// A product type: name plus ordered type arguments.
    Struct(CompositeHeader),

    /// A sum type: name plus ordered type arguments.
    Enum(CompositeHeader),
}

impl TypeHeader {
    /// Create a `struct` header with the given name and arguments.
    pub fn product(name: impl Into<Identifier>, args: impl IntoIterator<Item = TypeId>) -> Self {
        TypeHeader::Struct(CompositeHeader::new(name, args))
    }

    /// Create an `enum` header with the given name and arguments.
    pub fn sum(name: impl Into<Identifier>, args: impl IntoIterator<Item = TypeId>) -> Self {
        TypeHeader::Enum(CompositeHeader::new(name, args))
    }

    /// Check whether this header identifies a primitive type.
    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeHeader::Primitive(_))
    }

    /// The composite payload of the header, if it has one.
    pub fn as_composite(&self) -> Option<&CompositeHeader> {
        match self {
            TypeHeader::Primitive(_) => None,
            TypeHeader::Struct(composite) | TypeHeader::Enum(composite) => Some(composite),
        }
    }
}

impl From<PrimitiveTy> for TypeHeader {
    fn from(primitive: PrimitiveTy) -> Self {
        TypeHeader::Primitive(primitive)
    }
}

/// A type handle and a flag that is set if instances of the field are
/// stored through a single-pointer indirection. Indirection is how the
/// front-end breaks size cycles in recursive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Constructor)]
pub struct Field {
    ty: TypeId,
    out_of_line: bool,
}

impl Field {
    /// A field stored directly within its parent.
    pub fn inline(ty: TypeId) -> Self {
        Self::new(ty, false)
    }

    /// A field stored behind a lazily allocated pointer.
    pub fn indirect(ty: TypeId) -> Self {
        Self::new(ty, true)
    }

    /// The type of the field.
    #[inline]
    pub fn ty(self) -> TypeId {
        self.ty
    }

    /// Whether the field is stored out-of-line.
    #[inline]
    pub fn is_out_of_line(self) -> bool {
        self.out_of_line
    }
}

//! Textual forms of types and values. Type descriptions render the
//! interned header (`Name<Arg, …>`); instance dumps walk the metatype
//! and write an ASCII rendering of the value to a caller-supplied byte
//! sink. The dump format is stable and exercised by golden tests.

use std::{
    ffi::{c_char, CStr},
    fmt,
    io::{self, Write},
};

use itertools::Itertools;
use karst_target::Size;

use crate::{
    error::TypeResult,
    store::TypeStore,
    ty::{PrimitiveTy, TypeHeader, TypeId},
};

/// Pairs an interned item with the store that owns it, so that the
/// item can be formatted without threading the store through `fmt`.
pub struct ForFormatting<'s, T> {
    /// The item that is being printed.
    pub item: T,

    /// The store the item is interned in.
    pub store: &'s TypeStore,
}

pub trait WriteTy: Sized {
    fn for_formatting(self, store: &TypeStore) -> ForFormatting<'_, Self> {
        ForFormatting { item: self, store }
    }
}

impl WriteTy for TypeId {}

impl fmt::Display for ForFormatting<'_, TypeId> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(entry) = self.store.entries.get(self.item) else {
            // A handle minted by another store; all we can show is the
            // raw index.
            return write!(f, "ty#{}", self.item.index());
        };

        match &entry.header {
            TypeHeader::Primitive(primitive) => write!(f, "{}", primitive.name()),
            TypeHeader::Struct(composite) | TypeHeader::Enum(composite) => {
                write!(f, "{}", composite.name)?;
                if !composite.args.is_empty() {
                    write!(
                        f,
                        "<{}>",
                        composite.args.iter().map(|arg| arg.for_formatting(self.store)).join(", ")
                    )?;
                }
                Ok(())
            }
        }
    }
}

impl TypeStore {
    /// A description of the type identified by `ty`, e.g.
    /// `List.Cons<Int64>`.
    pub fn description(&self, ty: TypeId) -> String {
        ty.for_formatting(self).to_string()
    }

    /// Write a textual representation of the instance of `ty` stored
    /// at `source` to `sink`. Errors from the sink propagate unchanged.
    ///
    /// # Safety
    ///
    /// `source` must hold an initialized instance of `ty`; string
    /// primitives must be null or point at a nul-terminated buffer.
    pub unsafe fn dump_instance(
        &self,
        sink: &mut dyn io::Write,
        ty: TypeId,
        source: *mut u8,
    ) -> TypeResult<()> {
        match self.header(ty)? {
            TypeHeader::Primitive(primitive) => self.dump_primitive(sink, *primitive, source),
            TypeHeader::Struct(_) => self.dump_struct(sink, ty, source),
            TypeHeader::Enum(_) => self.dump_enum(sink, ty, source),
        }
    }

    unsafe fn dump_primitive(
        &self,
        sink: &mut dyn io::Write,
        primitive: PrimitiveTy,
        source: *mut u8,
    ) -> TypeResult<()> {
        match primitive {
            PrimitiveTy::Bool => {
                write!(sink, "{}", if source.read() != 0 { "true" } else { "false" })?
            }
            PrimitiveTy::I32 => write!(sink, "{}", source.cast::<i32>().read())?,
            PrimitiveTy::I64 => write!(sink, "{}", source.cast::<i64>().read())?,
            PrimitiveTy::Str => {
                let string = source.cast::<*const c_char>().read();
                if !string.is_null() {
                    sink.write_all(CStr::from_ptr(string).to_bytes())?;
                }
            }
        }

        Ok(())
    }

    unsafe fn dump_struct(
        &self,
        sink: &mut dyn io::Write,
        ty: TypeId,
        source: *mut u8,
    ) -> TypeResult<()> {
        let metatype = self.metatype(ty)?;

        write!(sink, "{}(", ty.for_formatting(self))?;
        for (index, &field) in metatype.fields().iter().enumerate() {
            if index > 0 {
                write!(sink, ", ")?;
            }
            let address = self.projected_address(field, metatype.offsets()[index], source)?;
            self.dump_instance(&mut *sink, field.ty(), address)?;
        }
        write!(sink, ")")?;

        Ok(())
    }

    unsafe fn dump_enum(
        &self,
        sink: &mut dyn io::Write,
        ty: TypeId,
        source: *mut u8,
    ) -> TypeResult<()> {
        let metatype = self.metatype(ty)?;
        let tag = self.read_tag(metatype, source);
        let case = self.case_field(ty, metatype, tag)?;

        write!(sink, "{}(", ty.for_formatting(self))?;
        let payload = self.projected_address(case, Size::ZERO, source)?;
        self.dump_instance(&mut *sink, case.ty(), payload)?;
        write!(sink, ")")?;

        Ok(())
    }

    /// A description of the instance of `ty` stored at `source`.
    ///
    /// # Safety
    ///
    /// As for [`Self::dump_instance`].
    pub unsafe fn describe_instance(&self, ty: TypeId, source: *mut u8) -> TypeResult<String> {
        let mut sink = Vec::new();
        self.dump_instance(&mut sink, ty, source)?;
        Ok(String::from_utf8_lossy(&sink).into_owned())
    }
}

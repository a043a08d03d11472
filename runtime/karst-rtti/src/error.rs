//! The failure model of the type store and the value protocol.
//!
//! Every invariant violation surfaces synchronously as a [TypeError]
//! whose message names the offending type; no operation performs a
//! partial update that remains visible after a failure.

use std::io;

use karst_alloc::AllocError;
use thiserror::Error;

pub type TypeResult<T> = Result<T, TypeError>;

/// Errors raised by the type store and the value protocol.
#[derive(Debug, Error)]
pub enum TypeError {
    /// A handle with no entry in the store, e.g. one minted by a
    /// different store.
    #[error("{description} is unknown")]
    UnknownType { description: String },

    /// A layout query or value operation on a type that was declared
    /// but never defined.
    #[error("{description} is not defined")]
    UndefinedType { description: String },

    /// `define` called a second time on the same handle.
    #[error("{description} is already defined")]
    Redefinition { description: String },

    /// A primitive boundary copy was given a host value whose size
    /// differs from the primitive's size.
    #[error("{description} occupies {expected} bytes, but the host value occupies {actual}")]
    ShapeMismatch { description: String, expected: u64, actual: u64 },

    /// A field index outside the declared field count, or a case tag
    /// outside the case count.
    #[error("{description} has no field or case at index {index}")]
    IndexOutOfRange { description: String, index: usize },

    /// The aligned allocator could not satisfy a request made on
    /// behalf of the named type.
    #[error("failed to allocate storage for {description}")]
    Allocation {
        description: String,
        #[source]
        source: AllocError,
    },

    /// The byte sink of a textual dump reported an error.
    #[error(transparent)]
    Io(#[from] io::Error),
}

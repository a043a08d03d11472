//! Interned type-name storage utilities and wrappers.
//!
//! Composite type headers borrow their names from a process-wide
//! interner, so name equality is identity equality and headers can be
//! hashed and compared without touching string contents.

use std::{
    borrow::Cow,
    fmt::{Debug, Display},
    sync::atomic::{AtomicU32, Ordering},
};

use dashmap::DashMap;
use lazy_static::lazy_static;

use crate::hashing::FnvBuildHasher;

/// A handle to an interned name. Two [Identifier]s are equal iff the
/// strings they were created from are equal.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Identifier(u32);

impl Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", IDENTIFIER_MAP.get_ident(*self))
    }
}

impl Debug for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Identifier").field(&IDENTIFIER_MAP.get_ident(*self)).field(&self.0).finish()
    }
}

// Utility methods for converting from a String to an Identifier and vice versa.

impl From<&str> for Identifier {
    fn from(name: &str) -> Self {
        IDENTIFIER_MAP.create_ident(name)
    }
}

impl From<String> for Identifier {
    fn from(name: String) -> Self {
        IDENTIFIER_MAP.create_ident(name.as_str())
    }
}

impl From<Identifier> for &str {
    fn from(ident: Identifier) -> Self {
        IDENTIFIER_MAP.get_ident(ident)
    }
}

impl From<Identifier> for String {
    fn from(ident: Identifier) -> Self {
        String::from(IDENTIFIER_MAP.get_ident(ident))
    }
}

impl From<Identifier> for Cow<'static, str> {
    fn from(ident: Identifier) -> Self {
        Cow::from(IDENTIFIER_MAP.get_ident(ident))
    }
}

impl Identifier {
    /// Access the interned string behind this identifier.
    pub fn as_str(self) -> &'static str {
        IDENTIFIER_MAP.get_ident(self)
    }
}

lazy_static! {
    pub static ref IDENTIFIER_MAP: IdentifierMap = IdentifierMap::new();
}

/// Struct representing a globally accessible identifier map. The struct
/// contains an identifier map and another map for reverse lookups.
#[derive(Debug, Default)]
pub struct IdentifierMap {
    reverse_identifiers: DashMap<&'static str, Identifier, FnvBuildHasher>,
    identifiers: DashMap<Identifier, &'static str, FnvBuildHasher>,
    counter: AtomicU32,
}

impl IdentifierMap {
    /// Function to create a new identifier map instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Function to create an identifier in the identifier map.
    pub fn create_ident(&self, ident_str: &str) -> Identifier {
        if let Some(ident) = self.reverse_identifiers.get(ident_str) {
            return *ident;
        }

        // We need to copy the string into storage that lives as long as
        // the process, so that lookups can hand out plain `&'static str`.
        // Entries are never removed, so the one-time leak is the
        // lifetime of the table itself.
        let ident_str_alloc: &'static str = Box::leak(ident_str.to_owned().into_boxed_str());
        *self.reverse_identifiers.entry(ident_str_alloc).or_insert_with(|| {
            let ident = Identifier(self.counter.fetch_add(1, Ordering::Relaxed));
            self.identifiers.insert(ident, ident_str_alloc);
            ident
        })
    }

    /// Function to lookup an identifier by an [Identifier] value in the
    /// identifier map.
    pub fn get_ident(&self, ident: Identifier) -> &'static str {
        self.identifiers.get(&ident).unwrap().value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_is_idempotent() {
        let a = Identifier::from("List");
        let b = Identifier::from("List");

        assert_eq!(a, b);
        assert_eq!(a.as_str(), "List");
    }

    #[test]
    fn test_distinct_names_distinct_ids() {
        assert_ne!(Identifier::from("List.Cons"), Identifier::from("List.Empty"));
    }

    #[test]
    fn test_display_round_trip() {
        let ident = Identifier::from("Pair");

        assert_eq!(ident.to_string(), "Pair");
        assert_eq!(String::from(ident), "Pair");
    }
}

//! # Interned String Identifiers
//!
//! `StrId` is a cheap `Copy` handle to a process-wide interned string.
//! Component type names, level ids, template ids and params keys all use it.
//! Interned strings live for the rest of the process.

use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

fn interner() -> &'static RwLock<HashSet<&'static str>> {
    static INTERNER: OnceLock<RwLock<HashSet<&'static str>>> = OnceLock::new();
    INTERNER.get_or_init(|| RwLock::new(HashSet::new()))
}

/// Interned string identifier.
///
/// Equality, hashing and ordering follow the string contents, so ids are
/// stable keys for sorted persistence.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StrId(&'static str);

impl StrId {
    /// The empty id, used as "none".
    pub const EMPTY: Self = Self("");

    /// Interns `s` and returns its id.
    #[must_use]
    pub fn new(s: &str) -> Self {
        if s.is_empty() {
            return Self::EMPTY;
        }

        if let Some(existing) = interner().read().get(s) {
            return Self(*existing);
        }

        let mut table = interner().write();
        // Another thread may have won the race between the locks
        if let Some(existing) = table.get(s) {
            return Self(*existing);
        }
        let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
        table.insert(leaked);
        Self(leaked)
    }

    /// Returns the interned string.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.0
    }

    /// True for [`StrId::EMPTY`].
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0.is_empty()
    }
}

impl Default for StrId {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for StrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StrId({:?})", self.0)
    }
}

impl fmt::Display for StrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.0)
    }
}

impl From<&str> for StrId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Serialize for StrId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

impl<'de> Deserialize<'de> for StrId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(&s))
    }
}

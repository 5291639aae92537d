//! Revision tracking for values a shader may read.

use std::sync::atomic::{AtomicU32, Ordering};

/// Process-wide source of binding identities. Zero is reserved for "never bound".
static NEXT_GLOBAL_ID: AtomicU32 = AtomicU32::new(1);

/// Identity plus revision of a binding.
///
/// Two versions are the same unchanged binding iff both fields are equal.
/// `global_id` tells *which* binding produced the value, `revision` tells how
/// many times it changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Version {
    pub global_id: u32,
    pub revision: u32,
}

impl Version {
    /// The version of nothing. Never equal to the version of a live binding.
    pub const NONE: Self = Self {
        global_id: 0,
        revision: 0,
    };

    /// Pack into a single word, used by lock-free commit slots.
    pub const fn pack(self) -> u64 {
        ((self.global_id as u64) << 32) | self.revision as u64
    }

    /// Inverse of [`Version::pack`].
    pub const fn unpack(packed: u64) -> Self {
        Self {
            global_id: (packed >> 32) as u32,
            revision: packed as u32,
        }
    }
}

/// A version with a unique identity that can be bumped.
#[derive(Debug)]
pub struct VersionedObject {
    version: Version,
}

impl VersionedObject {
    /// Create a new object with a fresh global id and revision zero.
    pub fn new() -> Self {
        Self {
            version: Version {
                global_id: NEXT_GLOBAL_ID.fetch_add(1, Ordering::Relaxed),
                revision: 0,
            },
        }
    }

    /// Record one mutation.
    pub fn increment(&mut self) {
        self.version.revision = self.version.revision.wrapping_add(1);
    }

    /// Current version.
    pub fn version(&self) -> Version {
        self.version
    }
}

impl Default for VersionedObject {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_ids_are_unique() {
        let a = VersionedObject::new();
        let b = VersionedObject::new();
        assert_ne!(a.version().global_id, b.version().global_id);
        assert_ne!(a.version().global_id, 0);
    }

    #[test]
    fn test_increment_keeps_identity() {
        let mut object = VersionedObject::new();
        let before = object.version();
        object.increment();
        let after = object.version();
        assert_eq!(before.global_id, after.global_id);
        assert_eq!(after.revision, before.revision + 1);
        assert_ne!(before, after);
    }

    #[test]
    fn test_pack_unpack() {
        let version = Version {
            global_id: 7,
            revision: 42,
        };
        assert_eq!(Version::unpack(version.pack()), version);
        assert_eq!(Version::unpack(0), Version::NONE);
    }
}

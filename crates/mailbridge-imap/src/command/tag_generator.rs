//! IMAP command tag generator.

use std::sync::atomic::{AtomicU32, Ordering};

/// Generates sequential command tags: `A0001`, `A0002`, ...
///
/// One generator lives for the lifetime of a connection, so tags never repeat
/// within a session.
#[derive(Debug)]
pub struct TagGenerator {
    counter: AtomicU32,
    prefix: char,
}

impl TagGenerator {
    /// Creates a new tag generator with the given prefix.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self {
            counter: AtomicU32::new(1),
            prefix,
        }
    }

    /// Generates the next tag.
    #[must_use]
    pub fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}{:04}", self.prefix, n)
    }

    /// Number of tags handed out so far.
    #[must_use]
    pub fn issued(&self) -> u32 {
        self.counter.load(Ordering::Relaxed).saturating_sub(1)
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('A')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_generation() {
        let generator = TagGenerator::default();
        assert_eq!(generator.next(), "A0001");
        assert_eq!(generator.next(), "A0002");
        assert_eq!(generator.issued(), 2);
    }

    #[test]
    fn test_custom_prefix_and_width() {
        let generator = TagGenerator::new('T');
        for _ in 1..100 {
            let _ = generator.next();
        }
        assert_eq!(generator.next(), "T0100");
    }

    #[test]
    fn test_uniqueness() {
        let generator = TagGenerator::default();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(generator.next()), "duplicate tag generated");
        }
    }
}

//! Which message types are coalesced instead of queued.

use std::collections::HashSet;

/// Message type sent on every keystroke in the chat UI.
pub const TYPING_INDICATOR: &str = "chat:typing";

/// Set of high-frequency, low-importance message types routed through the
/// coalescing buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferPolicy {
    types: HashSet<String>,
}

impl BufferPolicy {
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            types: types.into_iter().map(Into::into).collect(),
        }
    }

    #[inline]
    pub fn is_buffered(&self, kind: &str) -> bool {
        self.types.contains(kind)
    }
}

impl Default for BufferPolicy {
    fn default() -> Self {
        Self::new([TYPING_INDICATOR])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_buffers_typing() {
        let policy = BufferPolicy::default();
        assert!(policy.is_buffered("chat:typing"));
        assert!(!policy.is_buffered("chat:message"));
    }

    #[test]
    fn test_empty_policy_buffers_nothing() {
        let policy = BufferPolicy::new(Vec::<String>::new());
        assert!(!policy.is_buffered(TYPING_INDICATOR));
    }
}

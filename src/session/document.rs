//! Authoritative document text for this process
//!
//! Every write is a full replacement: no versions, no merge. Whatever is
//! applied last wins.

/// Process-local copy of the shared document
#[derive(Debug, Default, Clone)]
pub struct DocumentStore {
    content: String,
}

impl DocumentStore {
    /// Empty document, the state every process starts from
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> &str {
        &self.content
    }

    /// Overwrite the document
    pub fn apply(&mut self, content: impl Into<String>) {
        self.content = content.into();
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_starts_empty() {
        let store = DocumentStore::new();
        assert_eq!(store.read(), "");
        assert!(store.is_empty());
    }

    #[test]
    fn test_apply_replaces_whole_content() {
        let mut store = DocumentStore::new();
        store.apply("hello world");
        store.apply("bye");
        assert_eq!(store.read(), "bye");
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_apply_same_content_twice_is_idempotent() {
        let mut store = DocumentStore::new();
        store.apply("same");
        let before = store.read().to_string();
        store.apply("same");
        assert_eq!(store.read(), before);
    }

    proptest! {
        #[test]
        fn prop_last_write_wins(writes in proptest::collection::vec(".*", 1..20)) {
            let mut store = DocumentStore::new();
            for w in &writes {
                store.apply(w.clone());
            }
            prop_assert_eq!(store.read(), writes.last().unwrap().as_str());
        }
    }
}

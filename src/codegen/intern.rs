use rustc_hash::FxHashMap;

/// Append-only table assigning each distinct string a stable index.
///
/// The generated unit refers to symbols, method names, globals and string
/// literals by their index in one of these tables.
#[derive(Debug, Clone, Default)]
pub struct InternTable {
    index: FxHashMap<String, usize>,
    entries: Vec<String>,
}

impl InternTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `value`, adding it on first sight.
    pub fn intern(&mut self, value: &str) -> usize {
        if let Some(&i) = self.index.get(value) {
            return i;
        }
        let i = self.entries.len();
        self.entries.push(value.to_string());
        self.index.insert(value.to_string(), i);
        i
    }

    pub fn get(&self, value: &str) -> Option<usize> {
        self.index.get(value).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in index order.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_idempotent() {
        let mut table = InternTable::new();
        let a = table.intern("fib");
        let b = table.intern("puts");
        assert_eq!(table.intern("fib"), a);
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_indices_follow_first_insertion() {
        let mut table = InternTable::new();
        table.intern("b");
        table.intern("a");
        table.intern("b");
        assert_eq!(table.entries(), &["b".to_string(), "a".to_string()]);
        assert_eq!(table.get("a"), Some(1));
        assert_eq!(table.get("c"), None);
    }
}
